//! # Observability & Tracing
//!
//! [`setup_tracing`] initializes structured logging for a run. Every phase transition, wave
//! boundary, endpoint publication and collected failure is emitted as a `tracing` event with
//! structured fields (`service`, `wave`, `label`, `endpoints`).
//!
//! ## Configuration
//!
//! `RUST_LOG` wins when set; otherwise the level passed by the caller (usually the CLI's
//! `--log-level`) is used. The compact format hides the module path (`with_target(false)`)
//! since the `service` field already says where an event comes from.
//!
//! ```bash
//! # Phase and wave progress
//! RUST_LOG=info apollo run
//!
//! # Registry publications and state transitions
//! RUST_LOG=debug apollo run
//!
//! # Only the orchestration core
//! RUST_LOG=apollo_core=debug apollo run
//! ```
//!
//! ## Example Output
//!
//! ```text
//! INFO Resolved start order services=5 waves=3 root_dir=/home/me/.apollo
//! INFO Setup complete modifiers=2
//! INFO Genesis finalized path=/home/me/.apollo/genesis.json chain_id=apollo-devnet validators=1 accounts=1
//! INFO Starting wave wave=1 services=["consensus-node"]
//! INFO Service started service=consensus-node endpoints=consensus-grpc: [127.0.0.1:41523]  consensus-rpc: [127.0.0.1:39011]
//! INFO Starting wave wave=2 services=["bridge-node-26658", "faucet"]
//! ```

use tracing_subscriber::EnvFilter;

/// Install the global subscriber. Safe to call more than once; later calls are no-ops.
pub fn setup_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .try_init();
}
