//! Deserialization targets for the YAML configuration schema.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Top-level configuration file schema.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub server: ListenerConfig,
    #[serde(default)]
    pub balancer: BalancerConfig,
    #[serde(default)]
    pub services: Vec<ServiceConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server: ListenerConfig::default(),
            balancer: BalancerConfig::default(),
            services: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ListenerConfig {
    #[serde(default = "default_bind_ip")]
    pub bind_ip: String,
    #[serde(default = "default_bind_port")]
    pub bind_port: i32,
    #[serde(default)]
    pub read_time_out: i64,
    #[serde(default)]
    pub write_time_out: i64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_ip: default_bind_ip(),
            bind_port: default_bind_port(),
            read_time_out: 0,
            write_time_out: 0,
        }
    }
}

fn default_bind_ip() -> String {
    "127.0.0.1".to_string()
}

fn default_bind_port() -> i32 {
    10000
}

/// How the router resolves the `balancer.routing_strategy` value. `Hybrid`
/// is the only strategy implemented by [`crate::core::router::Router`];
/// `Simple` is accepted for config compatibility but rejected at
/// validation time (see `config::validation`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RoutingStrategy {
    Hybrid,
    Simple,
}

impl Default for RoutingStrategy {
    fn default() -> Self {
        RoutingStrategy::Simple
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BalancerConfig {
    #[serde(default, deserialize_with = "deserialize_routing_strategy")]
    pub routing_strategy: RoutingStrategy,
}

impl Default for BalancerConfig {
    fn default() -> Self {
        Self {
            routing_strategy: RoutingStrategy::default(),
        }
    }
}

fn deserialize_routing_strategy<'de, D>(deserializer: D) -> Result<RoutingStrategy, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    match raw.as_str() {
        "" | "simple" => Ok(RoutingStrategy::Simple),
        "hybrid" => Ok(RoutingStrategy::Hybrid),
        other => Err(serde::de::Error::custom(format!(
            "unsupported routing strategy '{other}', use 'hybrid' or 'simple'"
        ))),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    RoundRobin,
    Random,
    WeightedRoundRobin,
    ConsistentHash,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
    pub name: String,
    pub path_prefix: String,
    pub strategy: Strategy,
    #[serde(default)]
    pub strategy_config: HashMap<String, serde_json::Value>,
    pub backends: Vec<String>,
    #[serde(default)]
    pub health: Option<HealthConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HealthConfig {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "health-endpoint")]
    pub endpoint: String,
    pub frequency: i64,
}
