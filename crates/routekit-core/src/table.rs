//! The built, immutable route table

use crate::metadata::{
    ActionMetadata, ControllerMetadata, ParamKind, ResponseAnnotations,
};
use http::Method;
use std::sync::Arc;

/// One routable (verb, path) pair.
#[derive(Debug, Clone)]
pub struct RouteEntry {
    pub verb: Method,
    pub path: String,
    pub action: Arc<ActionMetadata>,
}

/// A (verb, path) declared twice inside one controller. The later
/// declaration won.
///
/// `replaced` and `replaced_by` are qualified `Target.method` names, as
/// returned by `ActionMetadata::qualified_name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteOverride {
    pub controller: String,
    pub verb: Method,
    pub path: String,
    /// Qualified name of the action that lost
    pub replaced: String,
    /// Qualified name of the action that won
    pub replaced_by: String,
}

/// Comparable summary of one route entry.
///
/// Handlers, middlewares and interceptors are compared by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteFingerprint {
    pub verb: Method,
    pub path: String,
    pub action: String,
    pub params: Vec<(usize, ParamKind, Option<String>, bool)>,
    pub before: Vec<String>,
    pub after: Vec<String>,
    pub error: Vec<String>,
    pub interceptors: Vec<String>,
    pub response: ResponseAnnotations,
}

/// Routes produced by [`MetadataBuilder`](crate::builder::MetadataBuilder).
///
/// Entries are ordered by controller registration order, then by action
/// order within the controller.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    entries: Vec<RouteEntry>,
    controllers: Vec<ControllerMetadata>,
    overrides: Vec<RouteOverride>,
}

impl RouteTable {
    pub(crate) fn new(
        entries: Vec<RouteEntry>,
        controllers: Vec<ControllerMetadata>,
        overrides: Vec<RouteOverride>,
    ) -> Self {
        Self {
            entries,
            controllers,
            overrides,
        }
    }

    pub fn entries(&self) -> &[RouteEntry] {
        &self.entries
    }

    pub fn controllers(&self) -> &[ControllerMetadata] {
        &self.controllers
    }

    pub fn overrides(&self) -> &[RouteOverride] {
        &self.overrides
    }

    /// Look up an entry by verb and route pattern (not a concrete path).
    pub fn find(&self, verb: &Method, pattern: &str) -> Option<&RouteEntry> {
        self.entries
            .iter()
            .find(|entry| entry.verb == *verb && entry.path == pattern)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn fingerprint(&self) -> Vec<RouteFingerprint> {
        self.entries
            .iter()
            .map(|entry| {
                let action = &entry.action;
                let names = |chain: &[crate::metadata::MiddlewareRef]| {
                    chain.iter().map(|m| m.name().to_string()).collect()
                };
                RouteFingerprint {
                    verb: entry.verb.clone(),
                    path: entry.path.clone(),
                    action: action.qualified_name(),
                    params: action
                        .params
                        .iter()
                        .map(|p| (p.index, p.kind, p.name.clone(), p.required))
                        .collect(),
                    before: names(&action.before),
                    after: names(&action.after),
                    error: names(&action.error),
                    interceptors: action
                        .interceptors
                        .iter()
                        .map(|i| i.interceptor.name().to_string())
                        .collect(),
                    response: action.response.clone(),
                }
            })
            .collect()
    }
}
