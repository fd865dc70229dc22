//! The four pluggable backend-selection strategies, unified behind a tagged
//! enum rather than a trait object: the variants share no state and dispatch
//! is monomorphic, so a sum type is both simpler and cheaper than
//! `Box<dyn Trait>`.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use arc_swap::ArcSwap;
use rand::Rng;
use thiserror::Error;

use crate::core::hash_source::HashSource;

#[derive(Debug, Error)]
pub enum BalancerError {
    #[error("no healthy backend available")]
    NoHealthyBackend,
    #[error("unable to derive a hash key for this request")]
    KeyDerivationFailed,
    #[error("service has no declared backends")]
    NoBackendsDeclared,
    #[error("unknown load-balancing strategy: {0}")]
    UnknownStrategy(String),
    #[error("strategy_config.weights must list one positive integer per backend")]
    InvalidWeights,
    #[error("strategy_config.source is required for consistent_hash")]
    MissingHashSource,
    #[error("strategy_config.key is required when source=header")]
    MissingHeaderKey,
    #[error(
        "strategy_config.name is required for source=cookie unless inject_if_missing is set"
    )]
    MissingCookieName,
    #[error("strategy_config.{0} must be a boolean")]
    InvalidBoolOption(&'static str),
}

/// Immutable snapshot of a balancer's live backend set. Swapped wholesale by
/// `set_healthy_backends` so that `pick` never observes a torn read across
/// `backends`/`weights`/`total_weight`.
#[derive(Debug)]
struct BackendSnapshot {
    backends: Vec<String>,
    /// Declared weight for each entry in `backends`, aligned by index.
    weights: Vec<u64>,
    total_weight: u64,
}

impl BackendSnapshot {
    fn uniform(backends: Vec<String>) -> Self {
        let weights = vec![1; backends.len()];
        let total_weight = weights.len() as u64;
        Self {
            backends,
            weights,
            total_weight,
        }
    }
}

/// Returns true if `a` and `b` contain the same elements, ignoring order
/// (duplicates are not expected in a declared backend list, so plain
/// membership comparison is sufficient here).
fn same_backend_set(a: &[String], b: &[String]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().all(|item| b.contains(item))
}

fn gcd(a: u64, b: u64) -> u64 {
    if b == 0 { a } else { gcd(b, a % b) }
}

struct RoundRobinState {
    counter: AtomicU64,
    live: ArcSwap<BackendSnapshot>,
}

struct WeightedRoundRobinState {
    counter: AtomicU64,
    live: ArcSwap<BackendSnapshot>,
    /// Declared universe, used to re-derive weights for survivors on
    /// `set_healthy_backends`.
    declared_backends: Vec<String>,
    declared_weights: Vec<u64>,
}

struct RandomState {
    live: ArcSwap<BackendSnapshot>,
}

struct ConsistentHashState {
    live: ArcSwap<BackendSnapshot>,
    source: HashSource,
    fallback_to_ip: Option<HashSource>,
}

/// A per-service backend-selection strategy.
pub enum Balancer {
    RoundRobin(RoundRobinState),
    Random(RandomState),
    WeightedRoundRobin(WeightedRoundRobinState),
    ConsistentHashModulo(ConsistentHashState),
}

/// Carried on an axum request extension by a consistent-hash cookie source
/// that minted a fresh value, so the dispatcher can emit `Set-Cookie`.
#[derive(Debug, Clone)]
pub struct InjectCookie(pub String);

impl Balancer {
    pub fn round_robin(backends: Vec<String>) -> Result<Self, BalancerError> {
        if backends.is_empty() {
            return Err(BalancerError::NoBackendsDeclared);
        }
        Ok(Balancer::RoundRobin(RoundRobinState {
            counter: AtomicU64::new(0),
            live: ArcSwap::new(Arc::new(BackendSnapshot::uniform(backends))),
        }))
    }

    pub fn random(backends: Vec<String>) -> Result<Self, BalancerError> {
        if backends.is_empty() {
            return Err(BalancerError::NoBackendsDeclared);
        }
        Ok(Balancer::Random(RandomState {
            live: ArcSwap::new(Arc::new(BackendSnapshot::uniform(backends))),
        }))
    }

    pub fn weighted_round_robin(
        backends: Vec<String>,
        weights: Vec<u64>,
    ) -> Result<Self, BalancerError> {
        if backends.is_empty() {
            return Err(BalancerError::NoBackendsDeclared);
        }
        if weights.len() != backends.len() || weights.iter().any(|w| *w == 0) {
            return Err(BalancerError::InvalidWeights);
        }

        let normalized = normalize_weights(&weights);
        let total_weight = normalized.iter().sum();

        Ok(Balancer::WeightedRoundRobin(WeightedRoundRobinState {
            counter: AtomicU64::new(0),
            live: ArcSwap::new(Arc::new(BackendSnapshot {
                backends: backends.clone(),
                weights: normalized,
                total_weight,
            })),
            declared_backends: backends,
            declared_weights: weights,
        }))
    }

    pub fn consistent_hash_modulo(
        backends: Vec<String>,
        source: HashSource,
        fallback_to_ip: Option<HashSource>,
    ) -> Result<Self, BalancerError> {
        if backends.is_empty() {
            return Err(BalancerError::NoBackendsDeclared);
        }
        Ok(Balancer::ConsistentHashModulo(ConsistentHashState {
            live: ArcSwap::new(Arc::new(BackendSnapshot::uniform(backends))),
            source,
            fallback_to_ip,
        }))
    }

    /// Select a backend for this request. `request` carries whatever the
    /// consistent-hash sources need (headers, cookies, remote address) and
    /// is where a freshly minted cookie is recorded via [`InjectCookie`].
    pub fn pick(&self, request: &mut http::Request<axum::body::Body>) -> Result<String, BalancerError> {
        match self {
            Balancer::RoundRobin(state) => {
                let snapshot = state.live.load();
                if snapshot.backends.is_empty() {
                    return Err(BalancerError::NoHealthyBackend);
                }
                let index = state.counter.fetch_add(1, Ordering::Relaxed) as usize
                    % snapshot.backends.len();
                Ok(snapshot.backends[index].clone())
            }
            Balancer::Random(state) => {
                let snapshot = state.live.load();
                if snapshot.backends.is_empty() {
                    return Err(BalancerError::NoHealthyBackend);
                }
                let index = rand::rng().random_range(0..snapshot.backends.len());
                Ok(snapshot.backends[index].clone())
            }
            Balancer::WeightedRoundRobin(state) => {
                let snapshot = state.live.load();
                if snapshot.backends.is_empty() || snapshot.total_weight == 0 {
                    return Err(BalancerError::NoHealthyBackend);
                }
                let index = state.counter.fetch_add(1, Ordering::Relaxed) % snapshot.total_weight;
                let mut accumulated = 0u64;
                for (backend, weight) in snapshot.backends.iter().zip(snapshot.weights.iter()) {
                    accumulated += weight;
                    if index < accumulated {
                        return Ok(backend.clone());
                    }
                }
                Err(BalancerError::NoHealthyBackend)
            }
            Balancer::ConsistentHashModulo(state) => {
                let snapshot = state.live.load();
                if snapshot.backends.is_empty() {
                    return Err(BalancerError::NoHealthyBackend);
                }

                let mut key = state.source.get_source(request);
                if key.is_empty()
                    && let Some(fallback) = &state.fallback_to_ip
                {
                    key = fallback.get_source(request);
                }
                if key.is_empty() {
                    return Err(BalancerError::KeyDerivationFailed);
                }

                let mut hasher = twox_hash::XxHash64::with_seed(0);
                std::hash::Hasher::write(&mut hasher, key.as_bytes());
                let hash = std::hash::Hasher::finish(&hasher);
                let index = (hash % snapshot.backends.len() as u64) as usize;
                Ok(snapshot.backends[index].clone())
            }
        }
    }

    /// Replace the live backend set if it differs from the current one
    /// (order-insensitive membership comparison) — a no-op otherwise.
    pub fn set_healthy_backends(&self, healthy: Vec<String>) {
        match self {
            Balancer::RoundRobin(state) => {
                let current = state.live.load();
                if same_backend_set(&current.backends, &healthy) {
                    return;
                }
                state
                    .live
                    .store(Arc::new(BackendSnapshot::uniform(healthy)));
            }
            Balancer::Random(state) => {
                let current = state.live.load();
                if same_backend_set(&current.backends, &healthy) {
                    return;
                }
                state
                    .live
                    .store(Arc::new(BackendSnapshot::uniform(healthy)));
            }
            Balancer::ConsistentHashModulo(state) => {
                let current = state.live.load();
                if same_backend_set(&current.backends, &healthy) {
                    return;
                }
                state
                    .live
                    .store(Arc::new(BackendSnapshot::uniform(healthy)));
            }
            Balancer::WeightedRoundRobin(state) => {
                let current = state.live.load();
                if same_backend_set(&current.backends, &healthy) {
                    return;
                }

                // Intersect with the declared universe (preserving declared
                // order) and carry over each survivor's declared weight.
                let mut surviving_backends = Vec::new();
                let mut surviving_weights = Vec::new();
                for (backend, weight) in state
                    .declared_backends
                    .iter()
                    .zip(state.declared_weights.iter())
                {
                    if healthy.contains(backend) {
                        surviving_backends.push(backend.clone());
                        surviving_weights.push(*weight);
                    }
                }

                let normalized_weights = normalize_weights(&surviving_weights);
                let total_weight = normalized_weights.iter().sum();
                state.live.store(Arc::new(BackendSnapshot {
                    backends: surviving_backends,
                    weights: normalized_weights,
                    total_weight,
                }));
            }
        }
    }
}

fn normalize_weights(weights: &[u64]) -> Vec<u64> {
    if weights.is_empty() {
        return Vec::new();
    }
    let divisor = weights.iter().copied().fold(0, gcd);
    if divisor <= 1 {
        return weights.to_vec();
    }
    weights.iter().map(|w| w / divisor).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> http::Request<axum::body::Body> {
        http::Request::builder()
            .uri("/")
            .body(axum::body::Body::empty())
            .unwrap()
    }

    #[test]
    fn round_robin_cycles_in_declared_order() {
        let balancer =
            Balancer::round_robin(vec!["u1".into(), "u2".into(), "u3".into()]).unwrap();
        let mut picks = Vec::new();
        for _ in 0..6 {
            picks.push(balancer.pick(&mut request()).unwrap());
        }
        assert_eq!(picks, vec!["u1", "u2", "u3", "u1", "u2", "u3"]);
    }

    #[test]
    fn round_robin_empty_backends_rejected_at_construction() {
        assert!(matches!(
            Balancer::round_robin(vec![]),
            Err(BalancerError::NoBackendsDeclared)
        ));
    }

    #[test]
    fn round_robin_counter_not_reset_on_topology_change() {
        let balancer = Balancer::round_robin(vec!["u1".into(), "u2".into()]).unwrap();
        balancer.pick(&mut request()).unwrap();
        balancer.pick(&mut request()).unwrap();
        balancer.set_healthy_backends(vec!["u1".into(), "u2".into(), "u3".into()]);
        // counter continues from 2, so next pick is index 2 % 3 = 2 -> "u3"
        assert_eq!(balancer.pick(&mut request()).unwrap(), "u3");
    }

    #[test]
    fn weighted_round_robin_prefix_sum_pattern() {
        let balancer = Balancer::weighted_round_robin(
            vec!["a".into(), "b".into(), "c".into()],
            vec![3, 1, 2],
        )
        .unwrap();
        let picks: Vec<_> = (0..7).map(|_| balancer.pick(&mut request()).unwrap()).collect();
        assert_eq!(picks, vec!["a", "a", "a", "b", "c", "c", "a"]);
    }

    #[test]
    fn weighted_round_robin_rejects_length_mismatch() {
        assert!(matches!(
            Balancer::weighted_round_robin(vec!["a".into(), "b".into()], vec![1]),
            Err(BalancerError::InvalidWeights)
        ));
    }

    #[test]
    fn weighted_round_robin_rejects_zero_weight() {
        assert!(matches!(
            Balancer::weighted_round_robin(vec!["a".into()], vec![0]),
            Err(BalancerError::InvalidWeights)
        ));
    }

    #[test]
    fn weighted_round_robin_normalizes_by_gcd() {
        let balancer =
            Balancer::weighted_round_robin(vec!["a".into(), "b".into()], vec![4, 2]).unwrap();
        // normalized weights become 2,1 -> total 3; pattern across 3 picks: a,a,b
        let picks: Vec<_> = (0..3).map(|_| balancer.pick(&mut request()).unwrap()).collect();
        assert_eq!(picks, vec!["a", "a", "b"]);
    }

    #[test]
    fn weighted_round_robin_single_survivor_normalizes_to_one() {
        let balancer = Balancer::weighted_round_robin(
            vec!["a".into(), "b".into()],
            vec![10, 20],
        )
        .unwrap();
        balancer.set_healthy_backends(vec!["a".into()]);
        assert_eq!(balancer.pick(&mut request()).unwrap(), "a");
        assert_eq!(balancer.pick(&mut request()).unwrap(), "a");
    }

    #[test]
    fn random_pick_stays_within_backend_set() {
        let backends = vec!["u1".to_string(), "u2".to_string(), "u3".to_string()];
        let balancer = Balancer::random(backends.clone()).unwrap();
        for _ in 0..20 {
            let pick = balancer.pick(&mut request()).unwrap();
            assert!(backends.contains(&pick));
        }
    }

    #[test]
    fn set_healthy_backends_is_noop_for_equal_set() {
        let balancer = Balancer::round_robin(vec!["u1".into(), "u2".into()]).unwrap();
        balancer.pick(&mut request()).unwrap();
        // same elements, different order: must not reset anything observable
        balancer.set_healthy_backends(vec!["u2".into(), "u1".into()]);
        // counter was at 1 (one pick consumed); next pick continues from there
        let next = balancer.pick(&mut request()).unwrap();
        assert_eq!(next, "u2");
    }

    #[test]
    fn no_healthy_backend_after_all_unhealthy() {
        let balancer = Balancer::round_robin(vec!["u1".into()]).unwrap();
        balancer.set_healthy_backends(vec![]);
        assert!(matches!(
            balancer.pick(&mut request()),
            Err(BalancerError::NoHealthyBackend)
        ));
    }
}
