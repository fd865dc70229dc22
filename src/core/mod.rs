//! Business logic: request routing, backend selection, and the service
//! model that ties a configured service to its balancer.

pub mod balancer;
pub mod hash_source;
pub mod path_utils;
pub mod router;
pub mod service;

pub use balancer::{Balancer, BalancerError, InjectCookie};
pub use hash_source::HashSource;
pub use router::{RouteEntry, Router};
pub use service::{Service, ServiceBuildError};
