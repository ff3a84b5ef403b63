//! Matching concrete request paths against the route table

use crate::error::MetadataError;
use crate::metadata::ActionMetadata;
use crate::path::{placeholders, route_shape, to_matcher_syntax};
use crate::path_params::RouteParams;
use crate::table::RouteTable;
use http::Method;
use std::collections::HashMap;
use std::sync::Arc;

/// Result of matching one request.
#[derive(Debug)]
pub enum MatchOutcome {
    Found(RouteMatch),
    NotFound,
    /// The path exists for other verbs
    MethodNotAllowed(Vec<Method>),
}

/// A matched action with its captured route parameters.
#[derive(Debug, Clone)]
pub struct RouteMatch {
    pub action: Arc<ActionMetadata>,
    pub params: RouteParams,
}

/// All actions sharing one path shape. The first inserted pattern names the
/// matcher's captures; each action keeps its own placeholder names.
struct Slot {
    routes: Vec<(Method, Arc<ActionMetadata>, Vec<String>)>,
}

/// Path matcher over a [`RouteTable`], backed by `matchit`.
pub struct RouteMatcher {
    inner: matchit::Router<usize>,
    slots: Vec<Slot>,
}

impl RouteMatcher {
    pub fn new(table: &RouteTable) -> Result<Self, MetadataError> {
        let mut inner = matchit::Router::new();
        let mut slots: Vec<Slot> = Vec::new();
        let mut by_shape: HashMap<String, usize> = HashMap::new();

        for entry in table.entries() {
            let invalid = |source| MetadataError::InvalidRoute {
                route: entry.path.clone(),
                source,
            };
            let shape = route_shape(&entry.path).map_err(invalid)?;
            let names = placeholders(&entry.path).map_err(invalid)?;

            let slot = match by_shape.get(&shape) {
                Some(&slot) => slot,
                None => {
                    let pattern = to_matcher_syntax(&entry.path).map_err(invalid)?;
                    inner
                        .insert(pattern, slots.len())
                        .map_err(|e| MetadataError::Unroutable {
                            route: entry.path.clone(),
                            reason: e.to_string(),
                        })?;
                    by_shape.insert(shape, slots.len());
                    slots.push(Slot { routes: Vec::new() });
                    slots.len() - 1
                }
            };
            slots[slot]
                .routes
                .push((entry.verb.clone(), Arc::clone(&entry.action), names));
        }

        Ok(Self { inner, slots })
    }

    /// Match a concrete path and verb.
    pub fn match_route(&self, verb: &Method, path: &str) -> MatchOutcome {
        let Ok(matched) = self.inner.at(path) else {
            return MatchOutcome::NotFound;
        };
        let Some(slot) = self.slots.get(*matched.value) else {
            return MatchOutcome::NotFound;
        };

        match slot.routes.iter().find(|(method, _, _)| method == verb) {
            Some((_, action, names)) => {
                let params = names
                    .iter()
                    .zip(matched.params.iter().map(|(_, value)| value))
                    .map(|(name, value)| (name.as_str(), value))
                    .collect();
                MatchOutcome::Found(RouteMatch {
                    action: Arc::clone(action),
                    params,
                })
            }
            None => MatchOutcome::MethodNotAllowed(
                slot.routes.iter().map(|(method, _, _)| method.clone()).collect(),
            ),
        }
    }
}
