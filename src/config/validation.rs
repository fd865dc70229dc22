//! Startup-time validation of a loaded [`ServerConfig`]. Every error here is
//! fatal: the process logs it and exits rather than serving with a broken
//! configuration.

use std::collections::HashSet;

use thiserror::Error;

use crate::config::models::{RoutingStrategy, ServerConfig, Strategy};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("no services configured")]
    NoServices,
    #[error("service '{0}' has an empty path_prefix")]
    EmptyPathPrefix(String),
    #[error("duplicate path_prefix '{0}' declared by services '{1}' and '{2}'")]
    DuplicatePathPrefix(String, String, String),
    #[error("service '{0}' declares no backends")]
    NoBackends(String),
    #[error("service '{0}' backend '{1}' is not a valid absolute URL")]
    InvalidBackendUrl(String, String),
    #[error(
        "balancer.routing_strategy 'simple' is not implemented; use 'hybrid' or leave unset"
    )]
    UnsupportedRoutingStrategy,
    #[error("service '{service}': {reason}")]
    StrategyConfig { service: String, reason: String },
    #[error("service '{0}' health.frequency must be a positive number of milliseconds")]
    InvalidHealthFrequency(String),
    #[error("service '{0}' health.health-endpoint must not be empty")]
    EmptyHealthEndpoint(String),
    #[error("service '{0}' health.type '{1}' is not supported; only 'http' is implemented")]
    UnsupportedHealthCheckType(String, String),
}

pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validates cross-field invariants that `serde` deserialization alone
/// cannot express: non-empty backend lists, well-formed backend URLs,
/// unique path prefixes, and strategy-specific required options. Building
/// each service's [`crate::core::balancer::Balancer`] re-validates the
/// strategy-specific options, so this pass focuses on what must hold before
/// that construction is even attempted.
pub struct ServerConfigValidator;

impl ServerConfigValidator {
    pub fn validate(config: &ServerConfig) -> ValidationResult<()> {
        if config.services.is_empty() {
            return Err(ValidationError::NoServices);
        }

        if config.balancer.routing_strategy == RoutingStrategy::Simple {
            return Err(ValidationError::UnsupportedRoutingStrategy);
        }

        let mut seen_prefixes: HashSet<String> = HashSet::new();
        let mut owners: Vec<(String, String)> = Vec::new();

        for service in &config.services {
            if service.path_prefix.trim().is_empty() {
                return Err(ValidationError::EmptyPathPrefix(service.name.clone()));
            }
            if service.backends.is_empty() {
                return Err(ValidationError::NoBackends(service.name.clone()));
            }
            for backend in &service.backends {
                if url::Url::parse(backend).is_err() {
                    return Err(ValidationError::InvalidBackendUrl(
                        service.name.clone(),
                        backend.clone(),
                    ));
                }
            }

            if !seen_prefixes.insert(service.path_prefix.clone()) {
                let (_, other_owner) = owners
                    .iter()
                    .find(|(prefix, _)| prefix == &service.path_prefix)
                    .expect("prefix seen implies an owner was recorded");
                return Err(ValidationError::DuplicatePathPrefix(
                    service.path_prefix.clone(),
                    other_owner.clone(),
                    service.name.clone(),
                ));
            }
            owners.push((service.path_prefix.clone(), service.name.clone()));

            validate_strategy_config(service.name.as_str(), service.strategy, &service.strategy_config)?;

            if let Some(health) = &service.health {
                if health.kind.to_ascii_lowercase() != "http" {
                    return Err(ValidationError::UnsupportedHealthCheckType(
                        service.name.clone(),
                        health.kind.clone(),
                    ));
                }
                if health.frequency <= 0 {
                    return Err(ValidationError::InvalidHealthFrequency(service.name.clone()));
                }
                if health.endpoint.trim().is_empty() {
                    return Err(ValidationError::EmptyHealthEndpoint(service.name.clone()));
                }
            }
        }

        Ok(())
    }
}

fn validate_strategy_config(
    service: &str,
    strategy: Strategy,
    strategy_config: &std::collections::HashMap<String, serde_json::Value>,
) -> ValidationResult<()> {
    match strategy {
        Strategy::RoundRobin | Strategy::Random => Ok(()),
        Strategy::WeightedRoundRobin => match strategy_config.get("weights").and_then(|v| v.as_array()) {
            Some(weights) if !weights.is_empty() => Ok(()),
            _ => Err(ValidationError::StrategyConfig {
                service: service.to_string(),
                reason: "weighted_round_robin requires a non-empty strategy_config.weights list"
                    .to_string(),
            }),
        },
        Strategy::ConsistentHash => {
            let source = strategy_config.get("source").and_then(|v| v.as_str());
            match source.map(str::to_ascii_uppercase).as_deref() {
                Some("IP") | Some("COOKIE") => Ok(()),
                Some("HEADER") => {
                    if strategy_config.get("key").and_then(|v| v.as_str()).is_some() {
                        Ok(())
                    } else {
                        Err(ValidationError::StrategyConfig {
                            service: service.to_string(),
                            reason: "consistent_hash source=header requires strategy_config.key"
                                .to_string(),
                        })
                    }
                }
                _ => Err(ValidationError::StrategyConfig {
                    service: service.to_string(),
                    reason: "consistent_hash requires strategy_config.source (ip, header, cookie)"
                        .to_string(),
                }),
            }
        }
    }
}
