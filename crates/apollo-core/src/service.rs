//! # Service Trait
//!
//! The `Service` trait is the contract every node-like collaborator (consensus, bridge, light,
//! faucet, ...) implements to be driven by the [`Orchestrator`](crate::Orchestrator). It names
//! the service, declares the endpoint labels it needs and provides, and exposes the three
//! lifecycle hooks: `setup`, `start` and `stop`.
//!
//! # Architecture Note
//! Labels are the only coupling between services. A bridge never holds a reference to the
//! consensus service; it declares that it needs `consensus-rpc` and receives whatever address
//! the provider published, through the registry snapshot handed to `start`.
//!
//! Adding a new kind of node means implementing this trait, nothing more.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::endpoints::Endpoints;
use crate::error::BoxError;
use crate::genesis::{GenesisDoc, Modifier};

/// A string naming a logical resource a service exposes or requires (e.g. an RPC address).
pub type Label = String;

/// Contract implemented by every orchestrated service.
///
/// # Async & Context
/// The hooks are `#[async_trait]` so implementations can await network round-trips and
/// process bootstrap. Each receives the run's [`CancellationToken`]; long waits should
/// `select!` on it and bail out early. `setup` and `start` take `&mut self`: the orchestrator
/// owns each service exclusively for the duration of the run and never calls two hooks of the
/// same service concurrently.
#[async_trait]
pub trait Service: Send {
    /// Unique identifier, used for working-directory naming and error attribution.
    fn name(&self) -> String;

    /// Labels that must have at least one published address before `start` is called.
    fn endpoints_needed(&self) -> BTreeSet<Label>;

    /// Labels this service publishes addresses for once started.
    fn endpoints_provided(&self) -> BTreeSet<Label>;

    /// Prepare private state in `work_dir`. May contribute a genesis [`Modifier`].
    ///
    /// `pending_genesis` is the base document, before any modifier has run.
    async fn setup(
        &mut self,
        ctx: &CancellationToken,
        work_dir: &Path,
        pending_genesis: &GenesisDoc,
    ) -> Result<Option<Modifier>, BoxError>;

    /// Bring the service to its ready state and return the addresses it now provides.
    ///
    /// `inputs` already holds at least one address for every label in
    /// [`endpoints_needed`](Service::endpoints_needed).
    async fn start(
        &mut self,
        ctx: &CancellationToken,
        work_dir: &Path,
        genesis: Arc<GenesisDoc>,
        inputs: Endpoints,
    ) -> Result<Endpoints, BoxError>;

    /// Release everything `start` acquired. Bounded by the orchestrator's grace period.
    async fn stop(&mut self, ctx: &CancellationToken) -> Result<(), BoxError>;
}

/// Helper for building label sets from string literals.
pub fn labels<I, S>(items: I) -> BTreeSet<Label>
where
    I: IntoIterator<Item = S>,
    S: Into<Label>,
{
    items.into_iter().map(Into::into).collect()
}
