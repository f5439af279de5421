//! Builds the service set of a devnet.

use apollo_core::Service;

use crate::bridge::BridgeService;
use crate::config::NetworkConfig;
use crate::consensus::ConsensusService;
use crate::faucet::FaucetService;
use crate::light::LightService;

/// Bridges first, then light nodes, on consecutive RPC ports starting at `base_rpc_port`.
pub fn create_services(
    bridge_count: usize,
    light_count: usize,
    base_rpc_port: u16,
) -> Vec<Box<dyn Service>> {
    let mut services: Vec<Box<dyn Service>> = Vec::with_capacity(bridge_count + light_count);
    let mut rpc_port = base_rpc_port;
    for _ in 0..bridge_count {
        services.push(Box::new(BridgeService::new(rpc_port)));
        rpc_port = rpc_port.wrapping_add(1);
    }
    for _ in 0..light_count {
        services.push(Box::new(LightService::new(rpc_port)));
        rpc_port = rpc_port.wrapping_add(1);
    }
    services
}

/// The full network described by `config`: consensus, the optional faucet, then the
/// data-availability nodes.
pub fn network_services(config: &NetworkConfig) -> Vec<Box<dyn Service>> {
    let mut services: Vec<Box<dyn Service>> = vec![Box::new(ConsensusService::default())];
    if config.faucet.enabled {
        services.push(Box::new(FaucetService::new(config.faucet.clone())));
    }
    services.extend(create_services(
        config.bridge_count,
        config.light_count,
        config.base_rpc_port,
    ));
    services
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FaucetConfig;

    fn names(services: &[Box<dyn Service>]) -> Vec<String> {
        services.iter().map(|s| s.name()).collect()
    }

    #[test]
    fn ports_are_consecutive_bridges_first() {
        let services = create_services(2, 2, 26658);
        assert_eq!(
            names(&services),
            vec![
                "bridge-node-26658",
                "bridge-node-26659",
                "light-node-26660",
                "light-node-26661"
            ]
        );
    }

    #[test]
    fn faucet_is_optional() {
        let mut config = NetworkConfig::default();
        assert_eq!(network_services(&config).len(), 5);

        config.faucet = FaucetConfig {
            enabled: false,
            ..FaucetConfig::default()
        };
        let services = network_services(&config);
        assert_eq!(names(&services)[0], "consensus-node");
        assert!(!names(&services).contains(&"faucet".to_string()));
    }
}
