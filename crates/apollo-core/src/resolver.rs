//! # Dependency Resolution
//!
//! Derives a wave-ordered start sequence from each service's needed and provided labels.
//!
//! An edge runs from a provider to a consumer wherever a provided label is also a needed one.
//! Waves are computed Kahn-style: the next wave is every remaining service whose providers have
//! all been placed in earlier waves. Ties keep input order, so the result is
//! deterministic for a given service list.
//!
//! Two configurations are rejected before anything starts:
//! - a needed label with no provider at all ([`Error::UnresolvedDependency`]), unless the label
//!   was declared external with [`DependencyResolver::with_external_labels`];
//! - a cycle ([`Error::DependencyCycle`]), detected when no further wave can be formed while
//!   services remain.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::error::{Error, Result};
use crate::service::{Label, Service};

/// Indices into the resolved service list. Members of a wave have no ordering among them.
pub type Wave = Vec<usize>;

/// The label declarations of one service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDeps {
    pub name: String,
    pub needed: BTreeSet<Label>,
    pub provided: BTreeSet<Label>,
}

impl ServiceDeps {
    pub fn new(name: impl Into<String>, needed: BTreeSet<Label>, provided: BTreeSet<Label>) -> Self {
        Self {
            name: name.into(),
            needed,
            provided,
        }
    }

    pub fn of(service: &dyn Service) -> Self {
        Self::new(
            service.name(),
            service.endpoints_needed(),
            service.endpoints_provided(),
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct DependencyResolver {
    external: BTreeSet<Label>,
}

impl DependencyResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Labels supplied from outside the service set. They count as already satisfied.
    pub fn with_external_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Label>,
    {
        self.external.extend(labels.into_iter().map(Into::into));
        self
    }

    pub fn resolve(&self, services: &[ServiceDeps]) -> Result<Vec<Wave>> {
        let mut providers: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
        for (idx, service) in services.iter().enumerate() {
            for label in &service.provided {
                providers.entry(label.as_str()).or_default().push(idx);
            }
        }

        // deps[i]: every service that must be placed before service i.
        let mut deps: Vec<BTreeSet<usize>> = Vec::with_capacity(services.len());
        for service in services {
            let mut needs = BTreeSet::new();
            for label in &service.needed {
                match providers.get(label.as_str()) {
                    Some(found) => needs.extend(found.iter().copied()),
                    None if self.external.contains(label) => {}
                    None => {
                        return Err(Error::UnresolvedDependency {
                            service: service.name.clone(),
                            label: label.clone(),
                        })
                    }
                }
            }
            deps.push(needs);
        }

        let mut placed = vec![false; services.len()];
        let mut remaining: Vec<usize> = (0..services.len()).collect();
        let mut waves = Vec::new();

        while !remaining.is_empty() {
            let (wave, blocked): (Vec<usize>, Vec<usize>) = remaining
                .iter()
                .partition(|&&idx| deps[idx].iter().all(|&dep| placed[dep]));

            if wave.is_empty() {
                let members = cycle_members(&blocked, &deps);
                return Err(Error::DependencyCycle {
                    services: members
                        .into_iter()
                        .map(|idx| services[idx].name.clone())
                        .collect(),
                });
            }

            for &idx in &wave {
                placed[idx] = true;
            }
            debug!(
                wave = waves.len() + 1,
                services = ?wave.iter().map(|&i| services[i].name.as_str()).collect::<Vec<_>>(),
                "Resolved wave"
            );
            waves.push(wave);
            remaining = blocked;
        }

        Ok(waves)
    }
}

/// Narrow the blocked set down to services on or between cycles by repeatedly dropping
/// those no other blocked service is waiting on.
fn cycle_members(blocked: &[usize], deps: &[BTreeSet<usize>]) -> Vec<usize> {
    let mut members: BTreeSet<usize> = blocked.iter().copied().collect();
    loop {
        let waited_on: BTreeSet<usize> = members
            .iter()
            .flat_map(|&idx| deps[idx].iter().copied())
            .filter(|dep| members.contains(dep))
            .collect();
        let before = members.len();
        members.retain(|idx| waited_on.contains(idx));
        if members.len() == before {
            return members.into_iter().collect();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::labels;
    use rand::rngs::StdRng;
    use rand::seq::SliceRandom;
    use rand::{Rng, SeedableRng};

    fn deps(name: &str, needed: &[&str], provided: &[&str]) -> ServiceDeps {
        ServiceDeps::new(name, labels(needed.iter().copied()), labels(provided.iter().copied()))
    }

    fn names<'a>(services: &'a [ServiceDeps], waves: &[Wave]) -> Vec<Vec<&'a str>> {
        waves
            .iter()
            .map(|wave| wave.iter().map(|&i| services[i].name.as_str()).collect())
            .collect()
    }

    #[test]
    fn consensus_bridge_light_layering() {
        let services = vec![
            deps("light-1", &["rpc", "grpc", "p2p"], &["light-rpc"]),
            deps("bridge", &["rpc", "grpc"], &["p2p"]),
            deps("consensus", &[], &["rpc", "grpc"]),
            deps("light-2", &["rpc", "grpc", "p2p"], &["light-rpc"]),
        ];

        let waves = DependencyResolver::new().resolve(&services).unwrap();
        assert_eq!(
            names(&services, &waves),
            vec![vec!["consensus"], vec!["bridge"], vec!["light-1", "light-2"]]
        );
    }

    #[test]
    fn independent_services_share_the_first_wave() {
        let services = vec![deps("a", &[], &["x"]), deps("b", &[], &[]), deps("c", &[], &["y"])];
        let waves = DependencyResolver::new().resolve(&services).unwrap();
        assert_eq!(waves, vec![vec![0, 1, 2]]);
    }

    #[test]
    fn empty_service_list_has_no_waves() {
        assert!(DependencyResolver::new().resolve(&[]).unwrap().is_empty());
    }

    #[test]
    fn unprovided_label_is_rejected() {
        let services = vec![deps("consensus", &[], &["rpc"]), deps("light", &["rpc", "p2p"], &[])];
        match DependencyResolver::new().resolve(&services) {
            Err(Error::UnresolvedDependency { service, label }) => {
                assert_eq!(service, "light");
                assert_eq!(label, "p2p");
            }
            other => panic!("expected unresolved dependency, got {other:?}"),
        }
    }

    #[test]
    fn external_labels_are_opt_in() {
        let services = vec![deps("light", &["rpc"], &["light-rpc"])];
        let waves = DependencyResolver::new()
            .with_external_labels(["rpc"])
            .resolve(&services)
            .unwrap();
        assert_eq!(waves, vec![vec![0]]);
    }

    #[test]
    fn two_service_cycle_names_both() {
        let services = vec![deps("A", &["X"], &["Y"]), deps("B", &["Y"], &["X"])];
        match DependencyResolver::new().resolve(&services) {
            Err(Error::DependencyCycle { services }) => assert_eq!(services, vec!["A", "B"]),
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn cycle_report_excludes_bystanders() {
        let services = vec![
            deps("root", &[], &["r"]),
            deps("A", &["r", "X"], &["Y"]),
            deps("B", &["Y"], &["X"]),
            deps("downstream", &["Y"], &["z"]),
        ];
        match DependencyResolver::new().resolve(&services) {
            Err(Error::DependencyCycle { services }) => assert_eq!(services, vec!["A", "B"]),
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let services = vec![deps("loop", &["x"], &["x"])];
        assert!(matches!(
            DependencyResolver::new().resolve(&services),
            Err(Error::DependencyCycle { services }) if services == vec!["loop"]
        ));
    }

    #[test]
    fn consumers_always_follow_every_provider() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let count = rng.gen_range(1..12);
            let mut services: Vec<ServiceDeps> = (0..count)
                .map(|i| {
                    // Only earlier services are eligible providers, so the set is acyclic.
                    let needed: Vec<String> = (0..i)
                        .filter(|_| rng.gen_bool(0.3))
                        .map(|j| format!("l{j}"))
                        .collect();
                    ServiceDeps::new(format!("s{i}"), labels(needed), labels([format!("l{i}")]))
                })
                .collect();
            services.shuffle(&mut rng);

            let waves = DependencyResolver::new().resolve(&services).unwrap();
            let mut wave_of = vec![usize::MAX; services.len()];
            for (w, wave) in waves.iter().enumerate() {
                for &idx in wave {
                    wave_of[idx] = w;
                }
            }
            assert!(wave_of.iter().all(|&w| w != usize::MAX));

            for (consumer, service) in services.iter().enumerate() {
                for (provider, other) in services.iter().enumerate() {
                    if other.provided.iter().any(|l| service.needed.contains(l)) {
                        assert!(wave_of[provider] < wave_of[consumer]);
                    }
                }
            }
        }
    }
}
