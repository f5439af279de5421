//! The consensus node: the root of every devnet.
//!
//! It registers itself as the single genesis validator and serves its status (with a header
//! hash derived from the finalized genesis) on an RPC and a gRPC port.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use apollo_core::{labels, modifier, BoxError, Endpoints, GenesisDoc, Label, Modifier, Service};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::node::{LocalNode, NodeStatus};
use crate::util::genesis_hash;

pub const CONSENSUS_SERVICE_NAME: &str = "consensus-node";
pub const CONSENSUS_RPC: &str = "consensus-rpc";
pub const CONSENSUS_GRPC: &str = "consensus-grpc";

pub const DEFAULT_VOTING_POWER: u64 = 100;

pub struct ConsensusService {
    voting_power: u64,
    node: Option<LocalNode>,
}

impl ConsensusService {
    pub fn new(voting_power: u64) -> Self {
        Self {
            voting_power,
            node: None,
        }
    }
}

impl Default for ConsensusService {
    fn default() -> Self {
        Self::new(DEFAULT_VOTING_POWER)
    }
}

#[async_trait]
impl Service for ConsensusService {
    fn name(&self) -> String {
        CONSENSUS_SERVICE_NAME.to_string()
    }

    fn endpoints_needed(&self) -> BTreeSet<Label> {
        BTreeSet::new()
    }

    fn endpoints_provided(&self) -> BTreeSet<Label> {
        labels([CONSENSUS_RPC, CONSENSUS_GRPC])
    }

    async fn setup(
        &mut self,
        _ctx: &CancellationToken,
        _work_dir: &Path,
        _pending_genesis: &GenesisDoc,
    ) -> Result<Option<Modifier>, BoxError> {
        let power = self.voting_power;
        Ok(Some(modifier(move |genesis| {
            Ok(genesis.with_validator(CONSENSUS_SERVICE_NAME, power))
        })))
    }

    async fn start(
        &mut self,
        _ctx: &CancellationToken,
        _work_dir: &Path,
        genesis: Arc<GenesisDoc>,
        _inputs: Endpoints,
    ) -> Result<Endpoints, BoxError> {
        let status = NodeStatus {
            node: CONSENSUS_SERVICE_NAME.to_string(),
            chain_id: genesis.chain_id.clone(),
            height: genesis.initial_height,
            hash: genesis_hash(&genesis)?,
        };
        info!(chain_id = %status.chain_id, hash = %status.hash, "Consensus node producing blocks");

        let node = LocalNode::spawn(status, &[0, 0]).await?;
        let mut endpoints = Endpoints::new();
        if let (Some(rpc), Some(grpc)) = (node.addr(0), node.addr(1)) {
            endpoints
                .add(CONSENSUS_RPC, [format!("http://{rpc}")])
                .add(CONSENSUS_GRPC, [grpc.to_string()]);
        }
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::fetch_trusted_hash;

    #[tokio::test]
    async fn registers_validator_and_serves_genesis_hash() {
        let ctx = CancellationToken::new();
        let dir = tempfile::tempdir().unwrap();
        let mut service = ConsensusService::new(7);

        let contribute = service
            .setup(&ctx, dir.path(), &GenesisDoc::default())
            .await
            .unwrap()
            .unwrap();
        let genesis = Arc::new(contribute(GenesisDoc::new("test")).unwrap());
        assert_eq!(genesis.validators[0].power, 7);

        let endpoints = service
            .start(&ctx, dir.path(), genesis.clone(), Endpoints::new())
            .await
            .unwrap();
        assert!(endpoints.contains(CONSENSUS_GRPC));

        let rpc = endpoints.resolve_one(CONSENSUS_RPC).unwrap();
        assert_eq!(
            fetch_trusted_hash(&ctx, &rpc).await.unwrap(),
            genesis_hash(&genesis).unwrap()
        );

        service.stop(&ctx).await.unwrap();
        // A second stop is a no-op.
        service.stop(&ctx).await.unwrap();
    }
}
