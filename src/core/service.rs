//! A [`Service`] pairs an immutable service configuration with the
//! [`Balancer`] instantiated for it at startup.

use thiserror::Error;

use crate::{
    config::models::{ServiceConfig, Strategy},
    core::{
        balancer::{Balancer, BalancerError},
        hash_source::HashSource,
    },
};

#[derive(Debug, Error)]
pub enum ServiceBuildError {
    #[error("service '{service}': {source}")]
    Balancer {
        service: String,
        #[source]
        source: BalancerError,
    },
}

pub struct Service {
    pub config: ServiceConfig,
    pub balancer: Balancer,
}

impl Service {
    /// Construct a service's balancer from its configuration, dispatching on
    /// `strategy` and validating strategy-specific options.
    pub fn build(config: ServiceConfig) -> Result<Self, ServiceBuildError> {
        let wrap = |err| ServiceBuildError::Balancer {
            service: config.name.clone(),
            source: err,
        };

        let balancer = match config.strategy {
            Strategy::RoundRobin => {
                Balancer::round_robin(config.backends.clone()).map_err(wrap)?
            }
            Strategy::Random => Balancer::random(config.backends.clone()).map_err(wrap)?,
            Strategy::WeightedRoundRobin => {
                let weights = read_weights(&config)?;
                Balancer::weighted_round_robin(config.backends.clone(), weights).map_err(wrap)?
            }
            Strategy::ConsistentHash => {
                let source = build_hash_source(&config)?;
                let fallback_to_ip = read_fallback_to_ip(&config)?.then_some(HashSource::Ip);
                Balancer::consistent_hash_modulo(config.backends.clone(), source, fallback_to_ip)
                    .map_err(wrap)?
            }
        };

        Ok(Self { config, balancer })
    }
}

fn read_weights(config: &ServiceConfig) -> Result<Vec<u64>, ServiceBuildError> {
    let wrap = |err| ServiceBuildError::Balancer {
        service: config.name.clone(),
        source: err,
    };

    let weights = config
        .strategy_config
        .get("weights")
        .and_then(|v| v.as_array())
        .ok_or_else(|| wrap(BalancerError::InvalidWeights))?;

    weights
        .iter()
        .map(|v| v.as_u64().filter(|n| *n > 0))
        .collect::<Option<Vec<u64>>>()
        .ok_or_else(|| wrap(BalancerError::InvalidWeights))
}

fn build_hash_source(config: &ServiceConfig) -> Result<HashSource, ServiceBuildError> {
    let wrap = |err| ServiceBuildError::Balancer {
        service: config.name.clone(),
        source: err,
    };

    let source_name = config
        .strategy_config
        .get("source")
        .and_then(|v| v.as_str())
        .ok_or_else(|| wrap(BalancerError::MissingHashSource))?;

    match source_name.to_ascii_uppercase().as_str() {
        "IP" => Ok(HashSource::Ip),
        "HEADER" => {
            let key_name = config
                .strategy_config
                .get("key")
                .and_then(|v| v.as_str())
                .ok_or_else(|| wrap(BalancerError::MissingHeaderKey))?
                .to_string();
            Ok(HashSource::Header { key_name })
        }
        "COOKIE" => {
            let cookie_key = config
                .strategy_config
                .get("cookie_key")
                .and_then(|v| v.as_str())
                .map(str::to_string);
            let inject_if_missing = read_bool_option(config, "inject_if_missing")?;
            let cookie_name = config
                .strategy_config
                .get("name")
                .and_then(|v| v.as_str())
                .map(str::to_string);

            let cookie_name = match (cookie_name, inject_if_missing) {
                (Some(name), _) => name,
                (None, true) => crate::core::hash_source::DEFAULT_COOKIE_NAME.to_string(),
                (None, false) => return Err(wrap(BalancerError::MissingCookieName)),
            };

            Ok(HashSource::Cookie {
                cookie_name,
                cookie_key,
                inject_if_missing,
            })
        }
        _ => Err(wrap(BalancerError::UnknownStrategy(source_name.to_string()))),
    }
}

fn read_fallback_to_ip(config: &ServiceConfig) -> Result<bool, ServiceBuildError> {
    read_bool_option(config, "fallback_to_ip")
}

fn read_bool_option(config: &ServiceConfig, key: &'static str) -> Result<bool, ServiceBuildError> {
    match config.strategy_config.get(key) {
        None => Ok(false),
        Some(value) => value.as_bool().ok_or_else(|| ServiceBuildError::Balancer {
            service: config.name.clone(),
            source: BalancerError::InvalidBoolOption(key),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::models::ServiceConfig;
    use serde_json::json;

    fn base_config() -> ServiceConfig {
        ServiceConfig {
            name: "svc".to_string(),
            path_prefix: "/svc".to_string(),
            strategy: Strategy::RoundRobin,
            strategy_config: Default::default(),
            backends: vec!["http://127.0.0.1:9000".to_string()],
            health: None,
        }
    }

    #[test]
    fn round_robin_needs_no_strategy_config() {
        let config = base_config();
        assert!(Service::build(config).is_ok());
    }

    #[test]
    fn weighted_round_robin_reads_weights() {
        let mut config = base_config();
        config.strategy = Strategy::WeightedRoundRobin;
        config.backends = vec!["a".into(), "b".into()];
        config
            .strategy_config
            .insert("weights".to_string(), json!([3, 1]));
        assert!(Service::build(config).is_ok());
    }

    #[test]
    fn weighted_round_robin_missing_weights_errors() {
        let mut config = base_config();
        config.strategy = Strategy::WeightedRoundRobin;
        assert!(Service::build(config).is_err());
    }

    #[test]
    fn consistent_hash_requires_source() {
        let mut config = base_config();
        config.strategy = Strategy::ConsistentHash;
        assert!(Service::build(config).is_err());
    }

    #[test]
    fn consistent_hash_header_requires_key() {
        let mut config = base_config();
        config.strategy = Strategy::ConsistentHash;
        config
            .strategy_config
            .insert("source".to_string(), json!("header"));
        assert!(Service::build(config).is_err());
    }

    #[test]
    fn consistent_hash_cookie_allows_inject_without_name() {
        let mut config = base_config();
        config.strategy = Strategy::ConsistentHash;
        config
            .strategy_config
            .insert("source".to_string(), json!("cookie"));
        config
            .strategy_config
            .insert("inject_if_missing".to_string(), json!(true));
        assert!(Service::build(config).is_ok());
    }

    #[test]
    fn no_backends_is_a_build_error() {
        let mut config = base_config();
        config.backends = vec![];
        assert!(Service::build(config).is_err());
    }
}
