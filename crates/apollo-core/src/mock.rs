//! # Mock Services & Testing Guide
//!
//! [`MockService`] implements [`Service`] entirely in memory. Its labels, returned endpoints,
//! failures and delays are scripted with a fluent builder, and every hook invocation is
//! appended to a shared [`CallLog`]. Handing the same log to several mocks gives one global
//! timeline, so ordering properties can be asserted without real network processes.
//!
//! ## When to use Mocks vs Real Nodes
//!
//! | Feature | MockService | Real node services |
//! |---------|-------------|--------------------|
//! | **Speed** | Instant | Binds sockets, does round-trips |
//! | **Determinism** | Fully scripted | Subject to the scheduler and the OS |
//! | **Failure injection** | `fail_start`, `stop_delay`, ... | Hard to provoke |
//! | **Use case** | Orchestrator ordering and teardown | End-to-end wiring of endpoints |
//!
//! ## Example
//!
//! ```rust
//! use apollo_core::mock::{CallLog, MockService};
//! use apollo_core::{GenesisDoc, Orchestrator};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() {
//!     let log = CallLog::default();
//!     let services = vec![
//!         MockService::new("consensus", &log).provides(["rpc"]).boxed(),
//!         MockService::new("bridge", &log).needs(["rpc"]).fail_start("no header").boxed(),
//!     ];
//!
//!     let root = std::env::temp_dir().join("apollo-mock-doc");
//!     let mut orchestrator = Orchestrator::new(root, GenesisDoc::default(), services);
//!     let err = orchestrator.run(CancellationToken::new()).await.unwrap_err();
//!
//!     assert_eq!(err.service(), Some("bridge"));
//!     assert_eq!(log.stops(), vec!["consensus"]);
//! }
//! ```

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::endpoints::Endpoints;
use crate::error::BoxError;
use crate::genesis::{GenesisDoc, Modifier};
use crate::service::{labels, Label, Service};

/// One hook invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Setup(String),
    Start(String),
    Stop(String),
}

/// What a mock saw when its `start` was called.
#[derive(Debug, Clone)]
pub struct StartRecord {
    pub service: String,
    pub work_dir: PathBuf,
    pub inputs: Endpoints,
    pub genesis: Arc<GenesisDoc>,
}

/// Shared, ordered record of hook invocations across any number of mocks.
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    calls: Arc<Mutex<Vec<Call>>>,
    starts: Arc<Mutex<Vec<StartRecord>>>,
}

impl CallLog {
    fn push(&self, call: Call) {
        self.calls.lock().push(call);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn setups(&self) -> Vec<String> {
        self.filter(|c| match c {
            Call::Setup(name) => Some(name),
            _ => None,
        })
    }

    /// Names of services whose `start` was entered, in call order.
    pub fn starts(&self) -> Vec<String> {
        self.filter(|c| match c {
            Call::Start(name) => Some(name),
            _ => None,
        })
    }

    pub fn stops(&self) -> Vec<String> {
        self.filter(|c| match c {
            Call::Stop(name) => Some(name),
            _ => None,
        })
    }

    pub fn count(&self, call: &Call) -> usize {
        self.calls.lock().iter().filter(|c| *c == call).count()
    }

    pub fn start_records(&self) -> Vec<StartRecord> {
        self.starts.lock().clone()
    }

    fn filter(&self, pick: impl Fn(&Call) -> Option<&String>) -> Vec<String> {
        self.calls.lock().iter().filter_map(pick).cloned().collect()
    }
}

/// A scriptable [`Service`].
pub struct MockService {
    name: String,
    needed: BTreeSet<Label>,
    provided: BTreeSet<Label>,
    endpoints: Option<Endpoints>,
    modifier: Option<Modifier>,
    setup_error: Option<String>,
    start_error: Option<String>,
    stop_error: Option<String>,
    setup_delay: Duration,
    start_delay: Duration,
    stop_delay: Duration,
    log: CallLog,
}

impl MockService {
    pub fn new(name: impl Into<String>, log: &CallLog) -> Self {
        Self {
            name: name.into(),
            needed: BTreeSet::new(),
            provided: BTreeSet::new(),
            endpoints: None,
            modifier: None,
            setup_error: None,
            start_error: None,
            stop_error: None,
            setup_delay: Duration::ZERO,
            start_delay: Duration::ZERO,
            stop_delay: Duration::ZERO,
            log: log.clone(),
        }
    }

    pub fn needs<I, S>(mut self, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Label>,
    {
        self.needed.extend(labels(items));
        self
    }

    /// Declare provided labels. Unless [`returns`](Self::returns) is used, `start` publishes
    /// `mock://<name>/<label>` for each of them.
    pub fn provides<I, S>(mut self, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Label>,
    {
        self.provided.extend(labels(items));
        self
    }

    /// Return exactly `endpoints` from `start`, regardless of the declared labels.
    pub fn returns(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = Some(endpoints);
        self
    }

    pub fn with_modifier(mut self, modifier: Modifier) -> Self {
        self.modifier = Some(modifier);
        self
    }

    pub fn fail_setup(mut self, message: impl Into<String>) -> Self {
        self.setup_error = Some(message.into());
        self
    }

    pub fn fail_start(mut self, message: impl Into<String>) -> Self {
        self.start_error = Some(message.into());
        self
    }

    pub fn fail_stop(mut self, message: impl Into<String>) -> Self {
        self.stop_error = Some(message.into());
        self
    }

    pub fn setup_delay(mut self, delay: Duration) -> Self {
        self.setup_delay = delay;
        self
    }

    pub fn start_delay(mut self, delay: Duration) -> Self {
        self.start_delay = delay;
        self
    }

    pub fn stop_delay(mut self, delay: Duration) -> Self {
        self.stop_delay = delay;
        self
    }

    pub fn boxed(self) -> Box<dyn Service> {
        Box::new(self)
    }
}

#[async_trait]
impl Service for MockService {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn endpoints_needed(&self) -> BTreeSet<Label> {
        self.needed.clone()
    }

    fn endpoints_provided(&self) -> BTreeSet<Label> {
        self.provided.clone()
    }

    async fn setup(
        &mut self,
        _ctx: &CancellationToken,
        _work_dir: &Path,
        _pending_genesis: &GenesisDoc,
    ) -> Result<Option<Modifier>, BoxError> {
        self.log.push(Call::Setup(self.name.clone()));
        if !self.setup_delay.is_zero() {
            tokio::time::sleep(self.setup_delay).await;
        }
        match &self.setup_error {
            Some(message) => Err(message.clone().into()),
            None => Ok(self.modifier.take()),
        }
    }

    async fn start(
        &mut self,
        _ctx: &CancellationToken,
        work_dir: &Path,
        genesis: Arc<GenesisDoc>,
        inputs: Endpoints,
    ) -> Result<Endpoints, BoxError> {
        self.log.push(Call::Start(self.name.clone()));
        self.log.starts.lock().push(StartRecord {
            service: self.name.clone(),
            work_dir: work_dir.to_path_buf(),
            inputs,
            genesis,
        });

        if !self.start_delay.is_zero() {
            tokio::time::sleep(self.start_delay).await;
        }
        if let Some(message) = &self.start_error {
            return Err(message.clone().into());
        }

        Ok(self.endpoints.clone().unwrap_or_else(|| {
            let mut endpoints = Endpoints::new();
            for label in &self.provided {
                endpoints.add(label.clone(), [format!("mock://{}/{label}", self.name)]);
            }
            endpoints
        }))
    }

    async fn stop(&mut self, _ctx: &CancellationToken) -> Result<(), BoxError> {
        self.log.push(Call::Stop(self.name.clone()));
        if !self.stop_delay.is_zero() {
            tokio::time::sleep(self.stop_delay).await;
        }
        match &self.stop_error {
            Some(message) => Err(message.clone().into()),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_records_calls_in_order() {
        let log = CallLog::default();
        let mut service = MockService::new("node", &log).provides(["rpc"]);
        let ctx = CancellationToken::new();
        let genesis = Arc::new(GenesisDoc::default());

        assert!(service
            .setup(&ctx, Path::new("/tmp"), &genesis)
            .await
            .unwrap()
            .is_none());
        let endpoints = service
            .start(&ctx, Path::new("/tmp"), genesis, Endpoints::new())
            .await
            .unwrap();
        service.stop(&ctx).await.unwrap();

        assert_eq!(endpoints.resolve_all("rpc"), ["mock://node/rpc".to_string()]);
        assert_eq!(
            log.calls(),
            vec![
                Call::Setup("node".into()),
                Call::Start("node".into()),
                Call::Stop("node".into())
            ]
        );
        assert_eq!(log.count(&Call::Stop("node".into())), 1);
    }

    #[tokio::test]
    async fn scripted_failures_surface() {
        let log = CallLog::default();
        let mut service = MockService::new("flaky", &log)
            .fail_start("port in use")
            .fail_stop("already gone");
        let ctx = CancellationToken::new();

        let err = service
            .start(&ctx, Path::new("/tmp"), Arc::new(GenesisDoc::default()), Endpoints::new())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "port in use");
        assert_eq!(service.stop(&ctx).await.unwrap_err().to_string(), "already gone");
        assert_eq!(log.starts(), vec!["flaky"]);
    }
}
