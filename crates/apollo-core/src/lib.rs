//! # Apollo Core
//!
//! This crate boots a small network of interdependent, long-running services in the right
//! order. It knows nothing about consensus or networking: each node is an opaque
//! [`Service`] that declares which endpoint labels it needs and provides. The core resolves a
//! start order from those labels, composes one shared genesis document from per-service
//! contributions, starts services wave by wave while publishing their addresses, and tears
//! everything down in reverse order when the run is cancelled or a start fails.
//!
//! ## Architecture Overview
//!
//! Leaves first:
//!
//! 1. **[`EndpointRegistry`]**: synchronized, append-only `label → addresses` map with random
//!    and exhaustive lookup. Start calls receive an [`Endpoints`] snapshot of it.
//! 2. **[`GenesisComposer`]**: folds a base [`GenesisDoc`] through each service's optional
//!    [`Modifier`], then writes the result once.
//! 3. **[`DependencyResolver`]**: turns needed/provided labels into waves; rejects
//!    unprovided labels and cycles.
//! 4. **[`Orchestrator`]**: drives every service through setup, genesis, start, running and
//!    shutdown using the three components above.
//!
//! ## Usage
//!
//! ```rust
//! use apollo_core::mock::{CallLog, MockService};
//! use apollo_core::{run, GenesisDoc};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() {
//!     let log = CallLog::default();
//!     let services = vec![
//!         MockService::new("consensus", &log).provides(["rpc", "grpc"]).boxed(),
//!         MockService::new("bridge", &log).needs(["rpc", "grpc"]).provides(["p2p"]).boxed(),
//!     ];
//!
//!     // Already cancelled: the run returns before any service is set up.
//!     let ctx = CancellationToken::new();
//!     ctx.cancel();
//!     let root = std::env::temp_dir().join("apollo-core-doc");
//!     run(ctx, root, GenesisDoc::default(), services).await.unwrap();
//!     assert!(log.calls().is_empty());
//! }
//! ```
//!
//! ## Concurrency Model
//!
//! - Setup calls run concurrently; they only touch their own `<root>/<name>` directory.
//! - Start calls within a wave run concurrently, each bounded by a timeout. Waves run strictly
//!   one after another and a wave's endpoints are published before the next one begins.
//! - Stop calls run one at a time, in reverse start order, each bounded by a grace period.
//! - The registry is the only structure mutated concurrently; all access goes through one lock.
//!
//! ## Testing
//!
//! See the [`mock`] module for [`MockService`](mock::MockService) and the shared
//! [`CallLog`](mock::CallLog) used to assert call ordering.

pub mod endpoints;
pub mod error;
pub mod genesis;
pub mod lifecycle;
pub mod mock;
pub mod resolver;
pub mod service;
pub mod tracing;

// Re-export core types for convenience
pub use endpoints::{EndpointRegistry, Endpoints, NoEndpoint, RandomSource, RoundRobin, ThreadRandom};
pub use error::{BoxError, Error, Phase, Result, StartError, StartFailure, StopError, StopFailure};
pub use genesis::{modifier, Account, GenesisComposer, GenesisDoc, Modifier, Validator, GENESIS_FILE};
pub use lifecycle::{run, Orchestrator, RunOptions, ServiceState};
pub use resolver::{DependencyResolver, ServiceDeps, Wave};
pub use service::{labels, Label, Service};
