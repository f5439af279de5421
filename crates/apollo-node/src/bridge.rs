//! The bridge node: follows consensus and serves headers to light nodes over p2p.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use apollo_core::{labels, BoxError, Endpoints, GenesisDoc, Label, Modifier, Service};
use async_trait::async_trait;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::consensus::{CONSENSUS_GRPC, CONSENSUS_RPC};
use crate::error::NodeError;
use crate::node::{LocalNode, NodeStatus};
use crate::util::configure_random_consensus_endpoint;

pub const BRIDGE_SERVICE_NAME: &str = "bridge-node";
pub const BRIDGE_RPC: &str = "bridge-rpc";
pub const BRIDGE_P2P: &str = "bridge-p2p";

const PEER_ID_FILE: &str = "peer_id";

/// The value published under [`BRIDGE_P2P`]: who the bridge is and where to dial it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerInfo {
    pub id: String,
    pub addrs: Vec<String>,
}

pub struct BridgeService {
    rpc_port: u16,
    peer_id: Option<String>,
    node: Option<LocalNode>,
}

impl BridgeService {
    pub fn new(rpc_port: u16) -> Self {
        Self {
            rpc_port,
            peer_id: None,
            node: None,
        }
    }
}

/// Reuse the identity stored in `work_dir`, or generate and store a new one.
pub(crate) async fn load_or_create_peer_id(work_dir: &Path) -> Result<String, NodeError> {
    let path = work_dir.join(PEER_ID_FILE);
    match tokio::fs::read_to_string(&path).await {
        Ok(existing) if !existing.trim().is_empty() => return Ok(existing.trim().to_string()),
        Ok(_) => {}
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(source) => return Err(NodeError::Io { path, source }),
    }

    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    let id = hex::encode(bytes);
    tokio::fs::write(&path, &id)
        .await
        .map_err(|source| NodeError::Io { path, source })?;
    Ok(id)
}

#[async_trait]
impl Service for BridgeService {
    fn name(&self) -> String {
        format!("{BRIDGE_SERVICE_NAME}-{}", self.rpc_port)
    }

    fn endpoints_needed(&self) -> BTreeSet<Label> {
        labels([CONSENSUS_RPC, CONSENSUS_GRPC])
    }

    fn endpoints_provided(&self) -> BTreeSet<Label> {
        labels([BRIDGE_RPC, BRIDGE_P2P])
    }

    async fn setup(
        &mut self,
        _ctx: &CancellationToken,
        work_dir: &Path,
        _pending_genesis: &GenesisDoc,
    ) -> Result<Option<Modifier>, BoxError> {
        self.peer_id = Some(load_or_create_peer_id(work_dir).await?);
        Ok(None)
    }

    async fn start(
        &mut self,
        ctx: &CancellationToken,
        work_dir: &Path,
        genesis: Arc<GenesisDoc>,
        inputs: Endpoints,
    ) -> Result<Endpoints, BoxError> {
        let core = configure_random_consensus_endpoint(ctx, &inputs).await?;
        let id = match &self.peer_id {
            Some(id) => id.clone(),
            None => load_or_create_peer_id(work_dir).await?,
        };

        let status = NodeStatus {
            node: self.name(),
            chain_id: genesis.chain_id.clone(),
            height: genesis.initial_height,
            hash: core.trusted_hash,
        };
        let node = LocalNode::spawn(status, &[self.rpc_port, 0]).await?;

        let mut endpoints = Endpoints::new();
        if let (Some(rpc), Some(p2p)) = (node.addr(0), node.addr(1)) {
            let peer = PeerInfo {
                id,
                addrs: vec![p2p.to_string()],
            };
            endpoints
                .add(BRIDGE_RPC, [format!("http://{rpc}")])
                .add(BRIDGE_P2P, [serde_json::to_string(&peer)?]);
        }
        info!(
            service = %self.name(),
            core = %format!("{}:{}", core.host, core.rpc_port),
            "Bridge following consensus"
        );
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
