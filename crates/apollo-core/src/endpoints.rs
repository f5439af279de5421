//! # Endpoint Registry
//!
//! Services find each other only through labels. Once a service has started, the addresses it
//! returned are published here under their labels, and every later start call receives an
//! [`Endpoints`] snapshot of the registry.
//!
//! - [`EndpointRegistry`]: the shared, synchronized, append-only map for one run.
//! - [`Endpoints`]: a plain label → addresses map. Used both as the snapshot handed to
//!   `Service::start` and as the value a service returns to announce what it provides.
//! - [`RandomSource`]: the narrow interface behind `resolve_one`, so tests can pin the choice.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use rand::Rng;
use tracing::debug;

use crate::service::Label;

/// No address has been published under the requested label.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("no endpoints published for {label}")]
pub struct NoEndpoint {
    pub label: Label,
}

/// Chooses an index in `0..len`. `len` is never zero.
pub trait RandomSource: Send + Sync {
    fn pick(&self, len: usize) -> usize;
}

/// Uniform choice backed by the thread-local RNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn pick(&self, len: usize) -> usize {
        rand::thread_rng().gen_range(0..len)
    }
}

/// Deterministic choice cycling through indices; each call advances by one.
#[derive(Debug, Default)]
pub struct RoundRobin {
    next: AtomicUsize,
}

impl RandomSource for RoundRobin {
    fn pick(&self, len: usize) -> usize {
        self.next.fetch_add(1, Ordering::Relaxed) % len
    }
}

/// Label → ordered addresses.
#[derive(Clone)]
pub struct Endpoints {
    entries: BTreeMap<Label, Vec<String>>,
    random: Arc<dyn RandomSource>,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self::with_random(Arc::new(ThreadRandom))
    }
}

impl Endpoints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_random(random: Arc<dyn RandomSource>) -> Self {
        Self {
            entries: BTreeMap::new(),
            random,
        }
    }

    /// Append addresses under `label`. Existing entries are kept.
    pub fn add<I, S>(&mut self, label: impl Into<Label>, addresses: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entries
            .entry(label.into())
            .or_default()
            .extend(addresses.into_iter().map(Into::into));
        self
    }

    /// Append every entry of `other`.
    pub fn merge(&mut self, other: &Endpoints) {
        for (label, addresses) in &other.entries {
            self.add(label.clone(), addresses.iter().cloned());
        }
    }

    /// One address for `label`, chosen through the injected [`RandomSource`].
    pub fn resolve_one(&self, label: &str) -> Result<String, NoEndpoint> {
        match self.entries.get(label) {
            Some(addresses) if !addresses.is_empty() => {
                Ok(addresses[self.random.pick(addresses.len())].clone())
            }
            _ => Err(NoEndpoint {
                label: label.to_string(),
            }),
        }
    }

    /// Every address published for `label`, in publication order.
    pub fn resolve_all(&self, label: &str) -> &[String] {
        self.entries.get(label).map(Vec::as_slice).unwrap_or_default()
    }

    /// True if at least one address is published for `label`.
    pub fn contains(&self, label: &str) -> bool {
        !self.resolve_all(label).is_empty()
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .filter(|(_, addresses)| !addresses.is_empty())
            .map(|(label, _)| label.as_str())
    }

    /// Labels with at least one address, in label order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries
            .iter()
            .filter(|(_, addresses)| !addresses.is_empty())
            .map(|(label, addresses)| (label.as_str(), addresses.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.labels().next().is_none()
    }
}

impl fmt::Debug for Endpoints {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.entries.iter()).finish()
    }
}

impl fmt::Display for Endpoints {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (label, addresses) in self.iter() {
            if !first {
                f.write_str("  ")?;
            }
            first = false;
            write!(f, "{label}: [{}]", addresses.join(", "))?;
        }
        Ok(())
    }
}

impl PartialEq for Endpoints {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

/// Shared label → addresses map for a single run.
///
/// # Concurrency Model
/// All access goes through one `RwLock`. A publish appends every address for a label while
/// holding the write lock, so readers see either none or all of a published batch. Reads
/// clone what they need and release the lock: a snapshot may be stale, never half-written.
/// Entries are only ever appended within a run.
pub struct EndpointRegistry {
    entries: RwLock<BTreeMap<Label, Vec<String>>>,
    random: Arc<dyn RandomSource>,
}

impl Default for EndpointRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl EndpointRegistry {
    pub fn new() -> Self {
        Self::with_random(Arc::new(ThreadRandom))
    }

    pub fn with_random(random: Arc<dyn RandomSource>) -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            random,
        }
    }

    /// Append `addresses` under `label`.
    pub fn publish<I, S>(&self, label: impl Into<Label>, addresses: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let label = label.into();
        let addresses: Vec<String> = addresses.into_iter().map(Into::into).collect();
        debug!(%label, ?addresses, "Publishing endpoints");
        self.entries
            .write()
            .entry(label)
            .or_default()
            .extend(addresses);
    }

    /// Append every label of `endpoints` under a single write lock.
    pub fn publish_all(&self, endpoints: &Endpoints) {
        let mut entries = self.entries.write();
        for (label, addresses) in endpoints.iter() {
            debug!(%label, ?addresses, "Publishing endpoints");
            entries
                .entry(label.to_string())
                .or_default()
                .extend(addresses.iter().cloned());
        }
    }

    pub fn resolve_one(&self, label: &str) -> Result<String, NoEndpoint> {
        let entries = self.entries.read();
        match entries.get(label) {
            Some(addresses) if !addresses.is_empty() => {
                Ok(addresses[self.random.pick(addresses.len())].clone())
            }
            _ => Err(NoEndpoint {
                label: label.to_string(),
            }),
        }
    }

    pub fn resolve_all(&self, label: &str) -> Vec<String> {
        self.entries.read().get(label).cloned().unwrap_or_default()
    }

    /// Consistent copy of every published label. Shares this registry's random source.
    pub fn snapshot(&self) -> Endpoints {
        Endpoints {
            entries: self.entries.read().clone(),
            random: self.random.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn resolve_one_returns_a_published_member() {
        let registry = EndpointRegistry::new();
        registry.publish("light-rpc", ["a", "b", "c"]);

        let members: HashSet<_> = ["a", "b", "c"].into_iter().map(String::from).collect();
        let mut seen = HashSet::new();
        for _ in 0..200 {
            let picked = registry.resolve_one("light-rpc").unwrap();
            assert!(members.contains(&picked));
            seen.insert(picked);
        }
        assert!(seen.len() > 1, "200 uniform picks should hit more than one entry");
    }

    #[test]
    fn resolve_one_on_missing_label_fails() {
        let registry = EndpointRegistry::new();
        assert_eq!(
            registry.resolve_one("grpc"),
            Err(NoEndpoint {
                label: "grpc".into()
            })
        );
        assert!(registry.resolve_all("grpc").is_empty());
    }

    #[test]
    fn publish_appends_and_never_drops() {
        let registry = EndpointRegistry::new();
        registry.publish("rpc", ["a"]);
        registry.publish("rpc", ["b", "c"]);
        let mut extra = Endpoints::new();
        extra.add("rpc", ["d"]).add("p2p", ["e"]);
        registry.publish_all(&extra);

        assert_eq!(registry.resolve_all("rpc"), vec!["a", "b", "c", "d"]);
        assert_eq!(registry.resolve_all("p2p"), vec!["e"]);
    }

    #[test]
    fn snapshot_is_not_affected_by_later_publishes() {
        let registry = EndpointRegistry::new();
        registry.publish("rpc", ["a"]);
        let snapshot = registry.snapshot();
        registry.publish("rpc", ["b"]);

        assert_eq!(snapshot.resolve_all("rpc"), ["a".to_string()]);
        assert_eq!(registry.resolve_all("rpc").len(), 2);
    }

    #[test]
    fn round_robin_makes_resolution_deterministic() {
        let mut endpoints = Endpoints::with_random(Arc::new(RoundRobin::default()));
        endpoints.add("rpc", ["a", "b"]);

        assert_eq!(endpoints.resolve_one("rpc").unwrap(), "a");
        assert_eq!(endpoints.resolve_one("rpc").unwrap(), "b");
        assert_eq!(endpoints.resolve_one("rpc").unwrap(), "a");
    }

    #[test]
    fn display_lists_labels_in_order() {
        let mut endpoints = Endpoints::new();
        endpoints.add("rpc", ["a", "b"]).add("grpc", ["c"]).add("empty", Vec::<String>::new());
        assert_eq!(endpoints.to_string(), "grpc: [c]  rpc: [a, b]");
        assert_eq!(endpoints.labels().collect::<Vec<_>>(), vec!["grpc", "rpc"]);
        assert!(!endpoints.contains("empty"));
        assert_eq!(endpoints.iter().count(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn readers_never_observe_partial_batches() {
        let registry = Arc::new(EndpointRegistry::new());
        let mut writers = Vec::new();
        for w in 0..4 {
            let registry = registry.clone();
            writers.push(tokio::spawn(async move {
                for i in 0..250 {
                    registry.publish("batch", (0..3).map(|k| format!("{w}-{i}-{k}")));
                    tokio::task::yield_now().await;
                }
            }));
        }

        let reader = {
            let registry = registry.clone();
            tokio::spawn(async move {
                for _ in 0..1000 {
                    assert_eq!(registry.resolve_all("batch").len() % 3, 0);
                    assert_eq!(registry.snapshot().resolve_all("batch").len() % 3, 0);
                    tokio::task::yield_now().await;
                }
            })
        };

        for writer in writers {
            writer.await.unwrap();
        }
        reader.await.unwrap();
        assert_eq!(registry.resolve_all("batch").len(), 4 * 250 * 3);
    }
}
