//! # Apollo Node
//!
//! The concrete devnet built on [`apollo_core`]: a consensus node, a faucet, bridge nodes and
//! light nodes, each implemented as a [`Service`](apollo_core::Service) running an
//! in-process [`LocalNode`](node::LocalNode).
//!
//! ## Components
//!
//! - **[consensus]**: the chain itself. Registers the genesis validator.
//! - **[faucet]**: funds a genesis account and serves it once consensus is up.
//! - **[bridge]**: fetches the trusted header hash from consensus and advertises a p2p peer.
//! - **[light]**: dials a random bridge peer and checks it follows the same chain.
//! - **[factory]**: assembles a service set from a [`NetworkConfig`](config::NetworkConfig).
//!
//! Start order falls out of the endpoint labels alone:
//!
//! ```text
//! wave 1: consensus-node
//! wave 2: faucet, bridge-node-26658
//! wave 3: light-node-26659, light-node-26660
//! ```

pub mod bridge;
pub mod config;
pub mod consensus;
pub mod error;
pub mod factory;
pub mod faucet;
pub mod light;
pub mod node;
pub mod util;

pub use config::NetworkConfig;
pub use error::NodeError;
pub use factory::{create_services, network_services};
