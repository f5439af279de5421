//! # Local Node Process
//!
//! A [`LocalNode`] is the in-process stand-in for a devnet node binary. It binds one TCP
//! listener per exposed port on `127.0.0.1` and answers every connection with a single
//! newline-terminated JSON [`NodeStatus`] record, then closes it. That is enough for
//! downstream services to discover each other, fetch a trusted hash, and verify that two
//! nodes agree on the chain they follow.
//!
//! Listeners run as tokio tasks and stop when the node's [`CancellationToken`] fires.
//! [`LocalNode::shutdown`] cancels the token and joins every task. Dropping a node, including
//! one whose spawn failed halfway, cancels the token too, so no listener outlives its node.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::error::NodeError;
use crate::util::socket_addr;

/// What a node reports about itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeStatus {
    pub node: String,
    pub chain_id: String,
    pub height: u64,
    /// Hash of the header at `height`, hex encoded.
    pub hash: String,
}

pub struct LocalNode {
    addrs: Vec<SocketAddr>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl LocalNode {
    /// Bind one listener per entry of `ports` (`0` picks a free port) and start serving.
    pub async fn spawn(status: NodeStatus, ports: &[u16]) -> Result<Self, NodeError> {
        let status = Arc::new(status);
        let mut node = Self {
            addrs: Vec::with_capacity(ports.len()),
            cancel: CancellationToken::new(),
            tasks: Vec::with_capacity(ports.len()),
        };

        for &port in ports {
            let addr = format!("127.0.0.1:{port}");
            let listener = TcpListener::bind(&addr)
                .await
                .map_err(|source| NodeError::Bind {
                    addr: addr.clone(),
                    source,
                })?;
            let local = listener
                .local_addr()
                .map_err(|source| NodeError::Bind { addr, source })?;
            debug!(node = %status.node, addr = %local, "Listening");

            node.addrs.push(local);
            node.tasks
                .push(tokio::spawn(serve(listener, status.clone(), node.cancel.clone())));
        }

        Ok(node)
    }

    /// Bound address of the `index`-th requested port.
    pub fn addr(&self, index: usize) -> Option<SocketAddr> {
        self.addrs.get(index).copied()
    }

    pub async fn shutdown(mut self) -> Result<(), NodeError> {
        self.cancel.cancel();
        for task in std::mem::take(&mut self.tasks) {
            task.await?;
        }
        Ok(())
    }
}

impl Drop for LocalNode {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn serve(listener: TcpListener, status: Arc<NodeStatus>, cancel: CancellationToken) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    if let Err(err) = reply(stream, &status).await {
                        debug!(node = %status.node, %peer, error = %err, "Status reply failed");
                    }
                }
                Err(err) => warn!(node = %status.node, error = %err, "Accept failed"),
            },
        }
    }
}

async fn reply(mut stream: TcpStream, status: &NodeStatus) -> std::io::Result<()> {
    let mut line = serde_json::to_vec(status)?;
    line.push(b'\n');
    stream.write_all(&line).await?;
    stream.shutdown().await
}

/// Upper bound on one status round-trip.
pub const STATUS_TIMEOUT: Duration = Duration::from_secs(10);

/// Read the status of `endpoint`, giving up when `ctx` is cancelled or after
/// [`STATUS_TIMEOUT`].
pub async fn query_status(
    ctx: &CancellationToken,
    endpoint: &str,
) -> Result<NodeStatus, NodeError> {
    query_status_within(ctx, endpoint, STATUS_TIMEOUT).await
}

#[instrument(level = "debug", skip(ctx))]
pub async fn query_status_within(
    ctx: &CancellationToken,
    endpoint: &str,
    limit: Duration,
) -> Result<NodeStatus, NodeError> {
    tokio::select! {
        _ = ctx.cancelled() => Err(NodeError::Cancelled {
            endpoint: endpoint.to_string(),
        }),
        outcome = tokio::time::timeout(limit, read_status(endpoint)) => {
            outcome.map_err(|_| NodeError::Timeout {
                endpoint: endpoint.to_string(),
                limit,
            })?
        }
    }
}

/// Connect to `endpoint` (scheme and path are ignored) and read its status record.
async fn read_status(endpoint: &str) -> Result<NodeStatus, NodeError> {
    let addr = socket_addr(endpoint)?;
    let stream = TcpStream::connect(addr)
        .await
        .map_err(|source| NodeError::Connect {
            endpoint: endpoint.to_string(),
            source,
        })?;

    let mut line = String::new();
    BufReader::new(stream)
        .read_line(&mut line)
        .await
        .map_err(|source| NodeError::Connect {
            endpoint: endpoint.to_string(),
            source,
        })?;

    serde_json::from_str(line.trim_end()).map_err(|err| NodeError::Protocol {
        endpoint: endpoint.to_string(),
        message: err.to_string(),
    })
}
