//! The light node: samples data from a bridge it trusts and exposes a user-facing RPC.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use apollo_core::{labels, BoxError, Endpoints, GenesisDoc, Label, Modifier, Service};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::bridge::{PeerInfo, BRIDGE_P2P};
use crate::consensus::{CONSENSUS_GRPC, CONSENSUS_RPC};
use crate::error::NodeError;
use crate::node::{query_status, LocalNode, NodeStatus};
use crate::util::configure_random_consensus_endpoint;

pub const LIGHT_SERVICE_NAME: &str = "light-node";
pub const LIGHT_RPC: &str = "light-rpc";
pub const LIGHT_API_DOCS: &str = "light-api-docs";
pub const DOCS_ENDPOINT: &str = "https://node-rpc-docs.celestia.org";

pub struct LightService {
    rpc_port: u16,
    node: Option<LocalNode>,
}

impl LightService {
    pub fn new(rpc_port: u16) -> Self {
        Self {
            rpc_port,
            node: None,
        }
    }
}

/// Dial the bridge advertised in `peer` and make sure it follows the chain we trust.
#[instrument(skip_all, fields(peer = %peer.id))]
async fn verify_bridge(
    ctx: &CancellationToken,
    peer: &PeerInfo,
    trusted_hash: &str,
) -> Result<(), NodeError> {
    let addr = peer
        .addrs
        .first()
        .ok_or_else(|| NodeError::InvalidEndpoint(format!("bridge peer {} has no address", peer.id)))?;
    let status = query_status(ctx, addr).await?;
    if status.hash != trusted_hash {
        return Err(NodeError::HashMismatch {
            expected: trusted_hash.to_string(),
            actual: status.hash,
        });
    }
    Ok(())
}

#[async_trait]
impl Service for LightService {
    fn name(&self) -> String {
        format!("{LIGHT_SERVICE_NAME}-{}", self.rpc_port)
    }

    fn endpoints_needed(&self) -> BTreeSet<Label> {
        labels([CONSENSUS_RPC, CONSENSUS_GRPC, BRIDGE_P2P])
    }

    fn endpoints_provided(&self) -> BTreeSet<Label> {
        labels([LIGHT_RPC, LIGHT_API_DOCS])
    }

    async fn setup(
        &mut self,
        _ctx: &CancellationToken,
        _work_dir: &Path,
        _pending_genesis: &GenesisDoc,
    ) -> Result<Option<Modifier>, BoxError> {
        Ok(None)
    }

    async fn start(
        &mut self,
        ctx: &CancellationToken,
        _work_dir: &Path,
        genesis: Arc<GenesisDoc>,
        inputs: Endpoints,
    ) -> Result<Endpoints, BoxError> {
        let core = configure_random_consensus_endpoint(ctx, &inputs).await?;

        let peer: PeerInfo = serde_json::from_str(&inputs.resolve_one(BRIDGE_P2P)?)?;
        verify_bridge(ctx, &peer, &core.trusted_hash).await?;
        debug!(service = %self.name(), bridge = %peer.id, "Trusted bridge peer");

        let status = NodeStatus {
            node: self.name(),
            chain_id: genesis.chain_id.clone(),
            height: genesis.initial_height,
            hash: core.trusted_hash,
        };
        let node = LocalNode::spawn(status, &[self.rpc_port]).await?;

        let mut endpoints = Endpoints::new();
        if let Some(rpc) = node.addr(0) {
            endpoints
                .add(LIGHT_RPC, [format!("http://{rpc}")])
                .add(LIGHT_API_DOCS, [DOCS_ENDPOINT]);
        }
        info!(service = %self.name(), bridge = %peer.id, "Light node syncing");
        self.node = Some(node);
        Ok(endpoints)
    }

    async fn stop(&mut self, _ctx: &CancellationToken) -> Result<(), BoxError> {
        if let Some(node) = self.node.take() {
            node.shutdown().await?;
        }
        Ok(())
    }
}
