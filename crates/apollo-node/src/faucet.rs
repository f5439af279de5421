//! The faucet: a pre-funded genesis account handing out tokens to devnet users.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use apollo_core::{labels, modifier, BoxError, Endpoints, GenesisDoc, Label, Modifier, Service};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::FaucetConfig;
use crate::consensus::CONSENSUS_RPC;
use crate::error::NodeError;
use crate::node::{query_status, LocalNode, NodeStatus};

pub const FAUCET_SERVICE_NAME: &str = "faucet";
pub const FAUCET: &str = "faucet";

pub struct FaucetService {
    config: FaucetConfig,
    node: Option<LocalNode>,
}

impl FaucetService {
    pub fn new(config: FaucetConfig) -> Self {
        Self { config, node: None }
    }
}

#[async_trait]
impl Service for FaucetService {
    fn name(&self) -> String {
        FAUCET_SERVICE_NAME.to_string()
    }

    fn endpoints_needed(&self) -> BTreeSet<Label> {
        labels([CONSENSUS_RPC])
    }

    fn endpoints_provided(&self) -> BTreeSet<Label> {
        labels([FAUCET])
    }

    async fn setup(
        &mut self,
        _ctx: &CancellationToken,
        _work_dir: &Path,
        _pending_genesis: &GenesisDoc,
    ) -> Result<Option<Modifier>, BoxError> {
        let account = self.config.account.clone();
        let balance = self.config.initial_balance;
        Ok(Some(modifier(move |genesis| {
            Ok(genesis.fund_account(account, balance))
        })))
    }

    async fn start(
        &mut self,
        ctx: &CancellationToken,
        _work_dir: &Path,
        genesis: Arc<GenesisDoc>,
        inputs: Endpoints,
    ) -> Result<Endpoints, BoxError> {
        let rpc = inputs.resolve_one(CONSENSUS_RPC)?;
        let consensus = query_status(ctx, &rpc).await?;
        if consensus.chain_id != genesis.chain_id {
            return Err(NodeError::Protocol {
                endpoint: rpc,
                message: format!(
                    "consensus follows {}, expected {}",
                    consensus.chain_id, genesis.chain_id
                ),
            }
            .into());
        }

        let status = NodeStatus {
            node: FAUCET_SERVICE_NAME.to_string(),
            chain_id: genesis.chain_id.clone(),
            height: consensus.height,
            hash: consensus.hash,
        };
        let node = LocalNode::spawn(status, &[self.config.port]).await?;

        let mut endpoints = Endpoints::new();
        if let Some(addr) = node.addr(0) {
            endpoints.add(FAUCET, [format!("http://{addr}")]);
        }
        info!(account = %self.config.account, balance = self.config.initial_balance, "Faucet ready");
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

    #[tokio::test]
    async fn funds_the_configured_account() {
        let config = FaucetConfig {
            account: "faucet-acc".into(),
            initial_balance: 500,
            ..FaucetConfig::default()
        };
        let mut faucet = FaucetService::new(config);
        let ctx = CancellationToken::new();

        let contribute = faucet
            .setup(&ctx, Path::new("."), &GenesisDoc::default())
            .await
            .unwrap()
            .unwrap();
        let genesis = contribute(GenesisDoc::default().fund_account("faucet-acc", 1)).unwrap();
        assert_eq!(genesis.accounts.len(), 1);
        assert_eq!(genesis.accounts[0].balance, 501);
    }

    #[tokio::test]
    async fn refuses_consensus_on_another_chain() {
        let consensus = LocalNode::spawn(
            NodeStatus {
                node: "consensus-node".into(),
                chain_id: "other".into(),
                height: 1,
                hash: "ab".into(),
            },
            &[0],
        )
        .await
        .unwrap();
        let mut inputs = Endpoints::new();
        inputs.add(CONSENSUS_RPC, [format!("http://{}", consensus.addr(0).unwrap())]);

        let mut faucet = FaucetService::new(FaucetConfig::default());
        let err = faucet
            .start(
                &CancellationToken::new(),
                Path::new("."),
                Arc::new(GenesisDoc::new("mine")),
                inputs,
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("consensus follows other"));
        consensus.shutdown().await.unwrap();
    }
}
