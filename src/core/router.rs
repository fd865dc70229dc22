//! Hybrid path-prefix router: three fixed-depth hash tables for the common
//! shallow case, a length-sorted list for longer prefixes, and an optional
//! base ("/") route.

use std::{collections::HashMap, sync::Arc};

use crate::core::{path_utils, service::Service};

/// A single routed prefix, pointing back at the service it belongs to.
#[derive(Clone)]
pub struct RouteEntry {
    pub path: String,
    pub service: Arc<Service>,
}

/// Hybrid path-prefix matcher built once at startup from the service list.
pub struct Router {
    depth1: HashMap<String, RouteEntry>,
    depth2: HashMap<String, RouteEntry>,
    depth3: HashMap<String, RouteEntry>,
    base_route: Option<RouteEntry>,
    long_routes: Vec<RouteEntry>,
}

impl Router {
    /// Build the router from the already-constructed services, normalizing
    /// and bucketing each service's path prefix by segment count.
    pub fn build(services: &[Arc<Service>]) -> Self {
        let mut depth1 = HashMap::new();
        let mut depth2 = HashMap::new();
        let mut depth3 = HashMap::new();
        let mut base_route = None;
        let mut long_routes = Vec::new();

        for service in services {
            let normalized = path_utils::normalize(&service.config.path_prefix);
            let segment_count = if normalized == "/" {
                0
            } else {
                normalized.trim_start_matches('/').split('/').count()
            };

            let entry = RouteEntry {
                path: normalized.clone(),
                service: service.clone(),
            };

            match segment_count {
                0 => base_route = Some(entry),
                1 => {
                    depth1.insert(normalized, entry);
                }
                2 => {
                    depth2.insert(normalized, entry);
                }
                3 => {
                    depth3.insert(normalized, entry);
                }
                _ => long_routes.push(entry),
            }
        }

        long_routes.sort_by_key(|entry| std::cmp::Reverse(entry.path.len()));

        Self {
            depth1,
            depth2,
            depth3,
            base_route,
            long_routes,
        }
    }

    /// Look up the service whose prefix matches `path`. The request path is
    /// taken as-is (case-sensitive); configured prefixes were lowercased at
    /// build time, so callers wanting case-insensitive matching should
    /// lowercase `path` themselves before calling this.
    pub fn route(&self, path: &str) -> Option<&RouteEntry> {
        let (d3, d2, d1, more_than_three) = path_utils::extract_prefixes(path);

        if more_than_three {
            for route in &self.long_routes {
                if let Some(rest) = path.strip_prefix(route.path.as_str())
                    && rest
                        .chars()
                        .next()
                        .is_none_or(|c| c == '/' || c == '?')
                {
                    return Some(route);
                }
            }
        }

        if !d3.is_empty()
            && let Some(route) = self.depth3.get(&d3)
        {
            return Some(route);
        }
        if !d2.is_empty()
            && let Some(route) = self.depth2.get(&d2)
        {
            return Some(route);
        }
        if !d1.is_empty()
            && let Some(route) = self.depth1.get(&d1)
        {
            return Some(route);
        }

        self.base_route.as_ref()
    }
}
