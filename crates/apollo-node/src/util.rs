//! Endpoint parsing and consensus discovery shared by the bridge and light services.

use apollo_core::{Endpoints, GenesisDoc};
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::consensus::{CONSENSUS_GRPC, CONSENSUS_RPC};
use crate::error::NodeError;
use crate::node::query_status;

/// Where a data-availability node finds its consensus node, and which header it trusts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreEndpoint {
    pub host: String,
    pub rpc_port: u16,
    pub grpc_port: u16,
    pub trusted_hash: String,
}

/// Port of an endpoint: the last `:` segment, cut at the first `/`.
///
/// ```
/// use apollo_node::util::parse_port;
///
/// assert_eq!(parse_port("http://localhost:26657").unwrap(), 26657);
/// assert_eq!(parse_port("tcp://127.0.0.1:9090/websocket").unwrap(), 9090);
/// assert!(parse_port("localhost").is_err());
/// ```
pub fn parse_port(endpoint: &str) -> Result<u16, NodeError> {
    let last = endpoint.rsplit(':').next().unwrap_or_default();
    let port = last.split('/').next().unwrap_or_default();
    port.parse()
        .map_err(|_| NodeError::InvalidEndpoint(endpoint.to_string()))
}

/// `host:port` of an endpoint, without scheme or path.
pub fn socket_addr(endpoint: &str) -> Result<String, NodeError> {
    let rest = endpoint
        .split_once("://")
        .map_or(endpoint, |(_, rest)| rest);
    let addr = rest.split('/').next().unwrap_or_default();
    match addr.rsplit_once(':') {
        Some((host, _)) if !host.is_empty() => {
            parse_port(addr)?;
            Ok(addr.to_string())
        }
        _ => Err(NodeError::InvalidEndpoint(endpoint.to_string())),
    }
}

fn host(endpoint: &str) -> Result<String, NodeError> {
    let addr = socket_addr(endpoint)?;
    let (host, _) = addr
        .rsplit_once(':')
        .ok_or_else(|| NodeError::InvalidEndpoint(endpoint.to_string()))?;
    Ok(host.to_string())
}

/// Hash of the first header as reported by the consensus node at `rpc`.
pub async fn fetch_trusted_hash(ctx: &CancellationToken, rpc: &str) -> Result<String, NodeError> {
    let status = query_status(ctx, rpc).await?;
    if status.hash.is_empty() {
        return Err(NodeError::Protocol {
            endpoint: rpc.to_string(),
            message: "empty header hash".into(),
        });
    }
    Ok(status.hash)
}

/// Pick a random consensus node from `inputs` and fetch the hash to trust from it.
#[instrument(skip(ctx, inputs), err)]
pub async fn configure_random_consensus_endpoint(
    ctx: &CancellationToken,
    inputs: &Endpoints,
) -> Result<CoreEndpoint, NodeError> {
    let rpc = inputs.resolve_one(CONSENSUS_RPC)?;
    let grpc = inputs.resolve_one(CONSENSUS_GRPC)?;

    let trusted_hash = fetch_trusted_hash(ctx, &rpc).await?;
    Ok(CoreEndpoint {
        host: host(&rpc)?,
        rpc_port: parse_port(&rpc)?,
        grpc_port: parse_port(&grpc)?,
        trusted_hash,
    })
}

/// Hash of the first header of a chain: SHA-256 over the serialized genesis document.
pub fn genesis_hash(genesis: &GenesisDoc) -> Result<String, NodeError> {
    let bytes = genesis.to_json()?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{LocalNode, NodeStatus};

    #[test]
    fn port_parsing() {
        assert_eq!(parse_port("127.0.0.1:1").unwrap(), 1);
        assert_eq!(parse_port("http://localhost:26657/").unwrap(), 26657);
        assert!(parse_port("http://localhost:rpc").is_err());
        assert!(parse_port("127.0.0.1:70000").is_err());
    }

    #[test]
    fn socket_addr_strips_scheme_and_path() {
        assert_eq!(socket_addr("http://127.0.0.1:26657/websocket").unwrap(), "127.0.0.1:26657");
        assert_eq!(socket_addr("localhost:9090").unwrap(), "localhost:9090");
        assert!(socket_addr("https://node-rpc-docs.celestia.org").is_err());
        assert!(socket_addr(":9090").is_err());
    }

    #[test]
    fn genesis_hash_tracks_content() {
        let base = GenesisDoc::new("a");
        let same = genesis_hash(&base).unwrap();
        assert_eq!(same.len(), 64);
        assert_eq!(genesis_hash(&GenesisDoc::new("a")).unwrap(), same);
        assert_ne!(genesis_hash(&base.with_validator("v", 1)).unwrap(), same);
    }

    #[tokio::test]
    async fn configures_from_a_live_consensus_node() {
        let status = NodeStatus {
            node: "consensus-node".into(),
            chain_id: "test".into(),
            height: 1,
            hash: "cafe".into(),
        };
        let node = LocalNode::spawn(status, &[0, 0]).await.unwrap();
        let rpc = node.addr(0).unwrap();
        let grpc = node.addr(1).unwrap();

        let mut inputs = Endpoints::new();
        inputs
            .add(CONSENSUS_RPC, [format!("http://{rpc}")])
            .add(CONSENSUS_GRPC, [grpc.to_string()]);

        let core = configure_random_consensus_endpoint(&CancellationToken::new(), &inputs)
            .await
            .unwrap();
        assert_eq!(
            core,
            CoreEndpoint {
                host: "127.0.0.1".into(),
                rpc_port: rpc.port(),
                grpc_port: grpc.port(),
                trusted_hash: "cafe".into(),
            }
        );
        node.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn missing_consensus_label_is_reported() {
        let err = configure_random_consensus_endpoint(&CancellationToken::new(), &Endpoints::new())
            .await
            .unwrap_err();
        assert!(matches!(err, NodeError::MissingEndpoint(_)));
    }
}
