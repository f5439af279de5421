//! # Lifecycle & Orchestration
//!
//! The [`Orchestrator`] drives every service through
//! `Created → SetupDone → Started → Stopped`, with `Failed` reachable from any of the first
//! three states. A run has five phases:
//!
//! 1. **Setup**: every `setup` call runs concurrently in a private directory
//!    (`<root>/<name>`). Each may return a genesis modifier. The first failure aborts the
//!    run without waiting for the other setups; so does cancellation.
//! 2. **Genesis**: the modifiers are folded in service order and the result is written once
//!    to `<root>/genesis.json`.
//! 3. **Start**: waves from the [`DependencyResolver`] run in order. Start calls within a wave
//!    run concurrently, each bounded by the start timeout. A wave's endpoints are published
//!    before the next wave takes its registry snapshot.
//! 4. **Running**: the orchestrator waits for the cancellation token.
//! 5. **Shutdown**: `stop` is called in strict reverse start order, one at a time, each
//!    bounded by the grace period. An overrun is recorded and the next service is stopped anyway.
//!
//! Dependency resolution runs before setup, so a malformed service set fails before any
//! service touches disk.
//!
//! A start failure stops further waves, tears down everything already started, and returns
//! [`Error::Start`] carrying the triggering [`StartError`] and every [`StopError`] hit on the
//! way down.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::endpoints::{EndpointRegistry, Endpoints, RandomSource};
use crate::error::{BoxError, Error, Result, StartError, StartFailure, StopError, StopFailure};
use crate::genesis::{GenesisComposer, GenesisDoc, Modifier};
use crate::resolver::{DependencyResolver, ServiceDeps, Wave};
use crate::service::Service;

pub const DEFAULT_START_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(10);

/// Per-service lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Created,
    SetupDone,
    Started,
    Stopped,
    Failed,
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Tunables for a run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Upper bound on a single `start` call.
    pub start_timeout: Duration,
    /// Upper bound on a single `stop` call during shutdown.
    pub stop_grace: Duration,
    /// Addresses published before the first wave. Their labels count as satisfied, so a
    /// service may need them without any service in the set providing them.
    pub external_endpoints: Endpoints,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            start_timeout: DEFAULT_START_TIMEOUT,
            stop_grace: DEFAULT_STOP_GRACE,
            external_endpoints: Endpoints::new(),
        }
    }
}

/// Boots a set of interdependent services and tears them down again.
///
/// # Example
///
/// ```ignore
/// let ctx = CancellationToken::new();
/// let mut orchestrator = Orchestrator::new(root_dir, GenesisDoc::default(), services);
/// orchestrator.run(ctx).await?;
/// ```
pub struct Orchestrator {
    root_dir: PathBuf,
    base_genesis: GenesisDoc,
    services: Vec<Box<dyn Service>>,
    states: Vec<ServiceState>,
    registry: Arc<EndpointRegistry>,
    options: RunOptions,
}

impl Orchestrator {
    pub fn new(
        root_dir: impl Into<PathBuf>,
        base_genesis: GenesisDoc,
        services: Vec<Box<dyn Service>>,
    ) -> Self {
        let states = vec![ServiceState::Created; services.len()];
        Self {
            root_dir: root_dir.into(),
            base_genesis,
            services,
            states,
            registry: Arc::new(EndpointRegistry::new()),
            options: RunOptions::default(),
        }
    }

    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    /// Replace the random source used for `resolve_one` on the registry and its snapshots.
    pub fn with_random_source(mut self, random: Arc<dyn RandomSource>) -> Self {
        self.registry = Arc::new(EndpointRegistry::with_random(random));
        self
    }

    /// The registry of this run. Stays readable after `run` returns.
    pub fn registry(&self) -> Arc<EndpointRegistry> {
        self.registry.clone()
    }

    pub fn state(&self, name: &str) -> Option<ServiceState> {
        self.services
            .iter()
            .position(|s| s.name() == name)
            .map(|idx| self.states[idx])
    }

    /// The start order as service names, without running anything.
    pub fn plan(&self) -> Result<Vec<Vec<String>>> {
        self.unique_names()?;
        let waves = self.resolve()?;
        Ok(waves
            .iter()
            .map(|wave| wave.iter().map(|&idx| self.services[idx].name()).collect())
            .collect())
    }

    /// Run every phase to completion. Returns once shutdown has finished.
    ///
    /// Cancelling `ctx` at any point leads to an orderly shutdown of whatever has started.
    /// That is not an error: `Ok(())` is returned if every stop call succeeded.
    pub async fn run(&mut self, ctx: CancellationToken) -> Result<()> {
        let names = self.unique_names()?;
        let waves = self.resolve()?;
        info!(
            services = names.len(),
            waves = waves.len(),
            root_dir = %self.root_dir.display(),
            "Resolved start order"
        );

        let dirs = prepare_dirs(&self.root_dir, &names).await?;
        let Some(modifiers) = self.setup_all(&ctx, &names, &dirs).await? else {
            info!("Cancelled during setup, nothing started");
            return Ok(());
        };
        if ctx.is_cancelled() {
            info!("Cancelled after setup, nothing started");
            return Ok(());
        }

        let mut composer = GenesisComposer::new(self.base_genesis.clone());
        for (service, modifier) in modifiers {
            composer.push(service, modifier);
        }
        let genesis = composer.finalize(&self.root_dir).await?;

        if !self.options.external_endpoints.is_empty() {
            info!(endpoints = %self.options.external_endpoints, "Publishing external endpoints");
            self.registry.publish_all(&self.options.external_endpoints);
        }

        // Every service that may hold resources, in the order its start was issued.
        let mut teardown = Vec::new();
        if let Err(cause) = self
            .start_waves(&ctx, &names, &dirs, &waves, genesis, &mut teardown)
            .await
        {
            error!(service = %cause.service, error = %cause.failure, "Start failed, unwinding");
            let cleanup = self.shutdown(&names, &teardown).await;
            return Err(Error::Start { cause, cleanup });
        }

        if !ctx.is_cancelled() {
            info!(services = teardown.len(), "All services running");
            ctx.cancelled().await;
        }
        info!("Shutdown requested");

        let failures = self.shutdown(&names, &teardown).await;
        if failures.is_empty() {
            info!("Shutdown complete");
            Ok(())
        } else {
            Err(Error::Shutdown { failures })
        }
    }

    fn resolve(&self) -> Result<Vec<Wave>> {
        let deps: Vec<ServiceDeps> = self
            .services
            .iter()
            .map(|s| ServiceDeps::of(s.as_ref()))
            .collect();
        DependencyResolver::new()
            .with_external_labels(self.options.external_endpoints.labels())
            .resolve(&deps)
    }

    fn unique_names(&self) -> Result<Vec<String>> {
        let mut seen = BTreeSet::new();
        let mut names = Vec::with_capacity(self.services.len());
        for service in &self.services {
            let name = service.name();
            if !seen.insert(name.clone()) {
                return Err(Error::DuplicateService { service: name });
            }
            names.push(name);
        }
        Ok(names)
    }

    fn transition(&mut self, idx: usize, names: &[String], to: ServiceState) {
        let from = self.states[idx];
        if from == ServiceState::Failed {
            return;
        }
        debug!(service = %names[idx], %from, %to, "State transition");
        self.states[idx] = to;
    }

    /// Run every setup concurrently. The first failure aborts the remaining setups, as does
    /// cancellation of `ctx`; the latter yields `Ok(None)`.
    async fn setup_all(
        &mut self,
        ctx: &CancellationToken,
        names: &[String],
        dirs: &[PathBuf],
    ) -> Result<Option<Vec<(String, Modifier)>>> {
        let mut outcomes: Vec<Option<Option<Modifier>>> =
            std::iter::repeat_with(|| None).take(self.services.len()).collect();
        let mut failure: Option<(usize, BoxError)> = None;
        let mut cancelled = false;
        {
            let base = &self.base_genesis;
            let mut pending: FuturesUnordered<_> = self
                .services
                .iter_mut()
                .zip(dirs)
                .enumerate()
                .map(|(idx, (service, dir))| async move { (idx, service.setup(ctx, dir, base).await) })
                .collect();

            loop {
                tokio::select! {
                    biased;
                    _ = ctx.cancelled() => {
                        cancelled = true;
                        break;
                    }
                    next = pending.next() => match next {
                        Some((idx, Ok(modifier))) => outcomes[idx] = Some(modifier),
                        Some((idx, Err(source))) => {
                            failure = Some((idx, source));
                            break;
                        }
                        None => break,
                    },
                }
            }
        }

        let mut modifiers = Vec::new();
        for (idx, outcome) in outcomes.into_iter().enumerate() {
            if let Some(modifier) = outcome {
                self.transition(idx, names, ServiceState::SetupDone);
                if let Some(modifier) = modifier {
                    modifiers.push((names[idx].clone(), modifier));
                }
            }
        }

        if let Some((idx, source)) = failure {
            error!(service = %names[idx], error = %source, "Setup failed, abandoning the others");
            self.transition(idx, names, ServiceState::Failed);
            return Err(Error::Config {
                service: names[idx].clone(),
                source,
            });
        }
        if cancelled {
            return Ok(None);
        }

        info!(modifiers = modifiers.len(), "Setup complete");
        Ok(Some(modifiers))
    }

    async fn start_waves(
        &mut self,
        ctx: &CancellationToken,
        names: &[String],
        dirs: &[PathBuf],
        waves: &[Wave],
        genesis: Arc<GenesisDoc>,
        teardown: &mut Vec<usize>,
    ) -> Result<(), StartError> {
        let start_timeout = self.options.start_timeout;

        for (number, wave) in waves.iter().enumerate() {
            if ctx.is_cancelled() {
                info!(wave = number + 1, "Cancelled before wave, not starting it");
                return Ok(());
            }

            let inputs = self.registry.snapshot();
            info!(
                wave = number + 1,
                services = ?wave.iter().map(|&idx| names[idx].as_str()).collect::<Vec<_>>(),
                "Starting wave"
            );

            let members = self
                .services
                .iter_mut()
                .enumerate()
                .filter(|(idx, _)| wave.contains(idx));
            let outcomes = join_all(members.map(|(idx, service)| {
                let inputs = inputs.clone();
                let genesis = genesis.clone();
                let dir = dirs[idx].as_path();
                let span = info_span!("start", service = %names[idx]);
                async move {
                    let provided = service.endpoints_provided();
                    let outcome =
                        timeout(start_timeout, service.start(ctx, dir, genesis, inputs)).await;
                    (idx, provided, outcome)
                }
                .instrument(span)
            }))
            .await;

            let mut failures = Vec::new();
            for (idx, provided, outcome) in outcomes {
                let service = names[idx].clone();
                match outcome {
                    Ok(Ok(endpoints)) => {
                        teardown.push(idx);
                        self.transition(idx, names, ServiceState::Started);
                        self.registry.publish_all(&endpoints);
                        info!(%service, %endpoints, "Service started");

                        for label in endpoints.labels().filter(|l| !provided.contains(*l)) {
                            warn!(%service, %label, "Published an undeclared endpoint");
                        }
                        if let Some(label) = provided.iter().find(|l| !endpoints.contains(l)) {
                            failures.push(StartError {
                                service,
                                failure: StartFailure::MissingEndpoint(label.clone()),
                            });
                        }
                    }
                    Ok(Err(source)) => {
                        self.transition(idx, names, ServiceState::Failed);
                        failures.push(StartError {
                            service,
                            failure: StartFailure::Failed(source),
                        });
                    }
                    Err(_) => {
                        // The process may be half up. It still gets a best-effort stop.
                        teardown.push(idx);
                        self.transition(idx, names, ServiceState::Failed);
                        failures.push(StartError {
                            service,
                            failure: StartFailure::TimedOut(start_timeout),
                        });
                    }
                }
            }

            let mut failures = failures.into_iter();
            if let Some(cause) = failures.next() {
                for other in failures {
                    error!(service = %other.service, error = %other.failure, "Start failed in the same wave");
                }
                return Err(cause);
            }
        }

        Ok(())
    }

    async fn shutdown(&mut self, names: &[String], teardown: &[usize]) -> Vec<StopError> {
        let grace = self.options.stop_grace;
        let stop_ctx = CancellationToken::new();
        let mut failures = Vec::new();

        for &idx in teardown.iter().rev() {
            let service = names[idx].clone();
            info!(%service, "Stopping service");
            let outcome = timeout(grace, self.services[idx].stop(&stop_ctx))
                .instrument(info_span!("stop", %service))
                .await;
            match outcome {
                Ok(Ok(())) => self.transition(idx, names, ServiceState::Stopped),
                Ok(Err(source)) => {
                    warn!(%service, error = %source, "Stop failed");
                    self.transition(idx, names, ServiceState::Failed);
                    failures.push(StopError {
                        service,
                        failure: StopFailure::Failed(source),
                    });
                }
                Err(_) => {
                    warn!(%service, ?grace, "Stop exceeded grace period, moving on");
                    self.transition(idx, names, ServiceState::Failed);
                    failures.push(StopError {
                        service,
                        failure: StopFailure::GracePeriodExceeded(grace),
                    });
                }
            }
        }

        failures
    }
}

async fn prepare_dirs(root_dir: &Path, names: &[String]) -> Result<Vec<PathBuf>> {
    let mut dirs = Vec::with_capacity(names.len());
    for name in names {
        let dir = root_dir.join(name);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| Error::Io {
                path: dir.clone(),
                source,
            })?;
        dirs.push(dir);
    }
    Ok(dirs)
}

/// Run `services` under `root_dir` with default options until `ctx` is cancelled.
pub async fn run(
    ctx: CancellationToken,
    root_dir: impl Into<PathBuf>,
    base_genesis: GenesisDoc,
    services: Vec<Box<dyn Service>>,
) -> Result<()> {
    Orchestrator::new(root_dir, base_genesis, services)
        .run(ctx)
        .await
}
