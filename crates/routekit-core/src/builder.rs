//! Building the route table from registered descriptors
//!
//! The builder runs once at start-up. It validates everything that can be
//! validated without a request (parameter indices and names, controller
//! links, middleware phases, route syntax and uniqueness) and links the
//! descriptors into [`ActionMetadata`] values.
//!
//! Chains are merged per action:
//!
//! ```text
//! before: global-before → controller-before → action-before
//! after:  action-after → controller-after → global-after
//! error:  global → controller → action
//! interceptors: global → controller → action
//! ```
//!
//! Each group is sorted by ascending priority; ties keep registration order.
//! Controller-scoped entries of ancestor controllers apply to their
//! descendants.

use crate::config::RoutingConfig;
use crate::error::MetadataError;
use crate::metadata::{
    ActionArgs, ActionMetadata, ControllerArgs, ControllerMetadata, ControllerRef,
    InterceptorArgs, InterceptorRef, MiddlewareArgs, MiddlewareHandle, MiddlewarePhase,
    MiddlewareRef, MiddlewareTarget, ParamArgs, ParamKind, ParamMetadata, ResponseAnnotations,
};
use crate::path::{join_route, placeholders, route_shape};
use crate::storage::{filter_by_target_and_method, MetadataStorage};
use crate::table::{RouteEntry, RouteOverride, RouteTable};
use http::Method;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Turns a [`MetadataStorage`] into a [`RouteTable`].
///
/// Building is deterministic: the same storage and configuration always
/// produce the same table (see [`RouteTable::fingerprint`]).
pub struct MetadataBuilder<'a> {
    storage: &'a MetadataStorage,
    config: &'a RoutingConfig,
}

/// An action as mounted on a controller, possibly inherited.
#[derive(Clone, Copy)]
struct Mounted<'a> {
    declared_by: &'a str,
    args: &'a ActionArgs,
}

impl<'a> MetadataBuilder<'a> {
    pub fn new(storage: &'a MetadataStorage, config: &'a RoutingConfig) -> Self {
        Self { storage, config }
    }

    pub fn build(&self) -> Result<RouteTable, MetadataError> {
        crate::trace_debug!(
            descriptors = self.storage.len(),
            "building route table"
        );

        let controllers = self.index_controllers()?;
        let lineages = self.lineages(&controllers)?;
        let own_actions = self.group_actions(&controllers)?;
        let params = self.resolve_params(&own_actions)?;
        self.check_middlewares(&controllers, &own_actions)?;
        self.check_interceptors(&controllers, &own_actions)?;
        self.check_response_handlers(&own_actions)?;

        let mut entries = Vec::new();
        let mut resolved_controllers = Vec::with_capacity(controllers.len());
        let mut overrides = Vec::new();
        let mut claimed: HashMap<(Method, String), String> = HashMap::new();

        for controller in self.storage.controllers() {
            let lineage = &lineages[controller.target.as_str()];
            let mounted = effective_actions(lineage, &own_actions);

            let controller_ref = ControllerRef {
                target: controller.target.clone(),
                route: controller.route.clone(),
                kind: controller.kind,
                transform_response: controller.transform_response,
            };
            let roles = lineage
                .iter()
                .find_map(|target| controllers[target].roles.clone());

            let controller_before =
                self.controller_steps(lineage, MiddlewarePhase::ControllerBefore);
            let controller_after = self.controller_steps(lineage, MiddlewarePhase::ControllerAfter);

            // (verb, route shape) → position in `actions`
            let mut seen: HashMap<(Method, String), usize> = HashMap::new();
            let mut actions: Vec<Arc<ActionMetadata>> = Vec::new();

            for action in mounted {
                let metadata = self.link_action(
                    &controller_ref,
                    lineage,
                    action,
                    &params,
                    roles.as_ref(),
                    &controller_before,
                    &controller_after,
                )?;
                let shape = route_shape(&metadata.path).map_err(|source| {
                    MetadataError::InvalidRoute {
                        route: metadata.path.clone(),
                        source,
                    }
                })?;
                let key = (metadata.verb.clone(), shape);

                if let Some(&position) = seen.get(&key) {
                    let replaced = actions[position].qualified_name();
                    let replaced_by = metadata.qualified_name();
                    crate::trace_warn!(
                        controller = %controller.target,
                        verb = %metadata.verb,
                        path = %metadata.path,
                        replaced = %replaced,
                        replaced_by = %replaced_by,
                        "route declared twice in one controller, later declaration wins"
                    );
                    overrides.push(RouteOverride {
                        controller: controller.target.clone(),
                        verb: metadata.verb.clone(),
                        path: metadata.path.clone(),
                        replaced,
                        replaced_by,
                    });
                    actions[position] = Arc::new(metadata);
                } else {
                    seen.insert(key, actions.len());
                    actions.push(Arc::new(metadata));
                }
            }

            for action in &actions {
                let key = (action.verb.clone(), route_shape_unchecked(&action.path));
                if let Some(existing) = claimed.get(&key) {
                    return Err(MetadataError::RouteConflict {
                        verb: action.verb.clone(),
                        path: action.path.clone(),
                        existing: existing.clone(),
                        new: action.qualified_name(),
                    });
                }
                claimed.insert(key, action.qualified_name());
                entries.push(RouteEntry {
                    verb: action.verb.clone(),
                    path: action.path.clone(),
                    action: Arc::clone(action),
                });
            }

            resolved_controllers.push(ControllerMetadata {
                target: controller.target.clone(),
                route: controller.route.clone(),
                kind: controller.kind,
                extends: controller.extends.clone(),
                roles,
                actions,
                before: controller_before,
                after: controller_after,
            });
        }

        crate::trace_info!(
            routes = entries.len(),
            controllers = resolved_controllers.len(),
            overrides = overrides.len(),
            "route table built"
        );
        Ok(RouteTable::new(entries, resolved_controllers, overrides))
    }

    fn index_controllers(&self) -> Result<HashMap<&'a str, &'a ControllerArgs>, MetadataError> {
        let mut index = HashMap::new();
        for controller in self.storage.controllers() {
            if index.insert(controller.target.as_str(), controller).is_some() {
                return Err(MetadataError::DuplicateController {
                    target: controller.target.clone(),
                });
            }
        }
        Ok(index)
    }

    /// For every controller: itself, then its ancestors, nearest first.
    fn lineages(
        &self,
        controllers: &HashMap<&'a str, &'a ControllerArgs>,
    ) -> Result<HashMap<&'a str, Vec<&'a str>>, MetadataError> {
        let mut lineages = HashMap::with_capacity(controllers.len());
        for controller in self.storage.controllers() {
            let mut lineage = vec![controller.target.as_str()];
            let mut visited: HashSet<&str> = HashSet::from([controller.target.as_str()]);
            let mut current = controller;
            while let Some(parent) = current.extends.as_deref() {
                let Some(next) = controllers.get(parent) else {
                    return Err(MetadataError::UnknownParent {
                        target: current.target.clone(),
                        parent: parent.to_string(),
                    });
                };
                if !visited.insert(next.target.as_str()) {
                    return Err(MetadataError::InheritanceCycle {
                        target: controller.target.clone(),
                    });
                }
                lineage.push(next.target.as_str());
                current = *next;
            }
            lineages.insert(controller.target.as_str(), lineage);
        }
        Ok(lineages)
    }

    /// Actions per declaring controller, in registration order. A method
    /// registered twice keeps its first position and the later arguments.
    fn group_actions(
        &self,
        controllers: &HashMap<&'a str, &'a ControllerArgs>,
    ) -> Result<HashMap<&'a str, Vec<&'a ActionArgs>>, MetadataError> {
        let mut grouped: HashMap<&str, Vec<&ActionArgs>> = HashMap::new();
        for action in self.storage.actions() {
            if !controllers.contains_key(action.target.as_str()) {
                return Err(MetadataError::UnknownController {
                    target: action.target.clone(),
                    method: action.method.clone(),
                });
            }
            let list = grouped.entry(action.target.as_str()).or_default();
            match list.iter_mut().find(|a| a.method == action.method) {
                Some(slot) => {
                    crate::trace_warn!(
                        action = %format!("{}.{}", action.target, action.method),
                        "action registered twice, later registration wins"
                    );
                    *slot = action;
                }
                None => list.push(action),
            }
        }
        Ok(grouped)
    }

    fn resolve_params(
        &self,
        own_actions: &HashMap<&'a str, Vec<&'a ActionArgs>>,
    ) -> Result<HashMap<(&'a str, &'a str), Vec<ParamMetadata>>, MetadataError> {
        let mut groups: Vec<((&str, &str), Vec<&ParamArgs>)> = Vec::new();
        for param in self.storage.params() {
            let key = (param.target.as_str(), param.method.as_str());
            match groups.iter_mut().find(|(k, _)| *k == key) {
                Some((_, list)) => list.push(param),
                None => groups.push((key, vec![param])),
            }
        }

        let mut resolved = HashMap::with_capacity(groups.len());
        for ((target, method), mut list) in groups {
            if !has_action(own_actions, target, method) {
                let first = list[0];
                return Err(MetadataError::OrphanParam {
                    target: target.to_string(),
                    method: method.to_string(),
                    index: first.index,
                });
            }

            list.sort_by_key(|p| p.index);
            let mut params = Vec::with_capacity(list.len());
            for (expected, param) in list.into_iter().enumerate() {
                if expected > 0 && param.index == expected - 1 {
                    return Err(MetadataError::DuplicateParamIndex {
                        target: target.to_string(),
                        method: method.to_string(),
                        index: param.index,
                    });
                }
                if param.index != expected {
                    return Err(MetadataError::NonContiguousParams {
                        target: target.to_string(),
                        method: method.to_string(),
                        expected,
                        found: param.index,
                    });
                }
                params.push(self.param_metadata(param)?);
            }
            resolved.insert((target, method), params);
        }
        Ok(resolved)
    }

    fn param_metadata(&self, param: &ParamArgs) -> Result<ParamMetadata, MetadataError> {
        let name = param.name.as_deref().filter(|n| !n.is_empty());
        if param.kind.requires_name() && name.is_none() {
            return Err(MetadataError::MissingParamName {
                target: param.target.clone(),
                method: param.method.clone(),
                index: param.index,
                kind: param.kind,
            });
        }
        if param.kind.forbids_name() && param.name.is_some() {
            return Err(MetadataError::UnexpectedParamName {
                target: param.target.clone(),
                method: param.method.clone(),
                index: param.index,
                kind: param.kind,
            });
        }

        let required = param
            .kind
            .fixed_required()
            .or(param.required)
            .unwrap_or(self.config.defaults.param_required);

        Ok(ParamMetadata {
            index: param.index,
            kind: param.kind,
            name: name.map(str::to_string),
            shape: param.shape.clone(),
            parse_json: param.parse_json,
            required,
            transform: param.transform,
            upload: param.upload.clone(),
        })
    }

    fn check_middlewares(
        &self,
        controllers: &HashMap<&'a str, &'a ControllerArgs>,
        own_actions: &HashMap<&'a str, Vec<&'a ActionArgs>>,
    ) -> Result<(), MetadataError> {
        for middleware in self.storage.middlewares() {
            let handle_fits = match middleware.handle {
                MiddlewareHandle::Error(_) => middleware.phase == MiddlewarePhase::Error,
                MiddlewareHandle::Step(_) => middleware.phase != MiddlewarePhase::Error,
            };
            if !handle_fits {
                return Err(MetadataError::HandleMismatch {
                    name: middleware.name().to_string(),
                    phase: middleware.phase,
                });
            }

            let target_fits = match (middleware.phase, &middleware.target) {
                (MiddlewarePhase::Error, _) => true,
                (
                    MiddlewarePhase::GlobalBefore | MiddlewarePhase::GlobalAfter,
                    MiddlewareTarget::Global,
                ) => true,
                (
                    MiddlewarePhase::ControllerBefore | MiddlewarePhase::ControllerAfter,
                    MiddlewareTarget::Controller(_),
                ) => true,
                (
                    MiddlewarePhase::ActionBefore | MiddlewarePhase::ActionAfter,
                    MiddlewareTarget::Action { .. },
                ) => true,
                _ => false,
            };
            if !target_fits {
                return Err(MetadataError::PhaseTargetMismatch {
                    name: middleware.name().to_string(),
                    phase: middleware.phase,
                    target: middleware.target.clone(),
                });
            }

            check_target("middleware", &middleware.target, controllers, own_actions)?;
        }
        Ok(())
    }

    fn check_interceptors(
        &self,
        controllers: &HashMap<&'a str, &'a ControllerArgs>,
        own_actions: &HashMap<&'a str, Vec<&'a ActionArgs>>,
    ) -> Result<(), MetadataError> {
        for interceptor in self.storage.interceptors() {
            check_target("interceptor", &interceptor.target, controllers, own_actions)?;
        }
        Ok(())
    }

    fn check_response_handlers(
        &self,
        own_actions: &HashMap<&'a str, Vec<&'a ActionArgs>>,
    ) -> Result<(), MetadataError> {
        for handler in self.storage.response_handlers() {
            if !has_action(own_actions, &handler.target, &handler.method) {
                return Err(MetadataError::OrphanDescriptor {
                    descriptor: "response handler",
                    target: handler.target.clone(),
                    method: handler.method.clone(),
                });
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn link_action(
        &self,
        controller: &ControllerRef,
        lineage: &[&str],
        action: Mounted<'a>,
        params: &HashMap<(&'a str, &'a str), Vec<ParamMetadata>>,
        controller_roles: Option<&Vec<String>>,
        controller_before: &[MiddlewareRef],
        controller_after: &[MiddlewareRef],
    ) -> Result<ActionMetadata, MetadataError> {
        let args = action.args;
        let path = join_route(&[
            self.config.route_prefix.as_deref().unwrap_or_default(),
            controller.route.as_str(),
            args.route.as_str(),
        ]);
        let names = placeholders(&path).map_err(|source| MetadataError::InvalidRoute {
            route: path.clone(),
            source,
        })?;

        let params = params
            .get(&(action.declared_by, args.method.as_str()))
            .cloned()
            .unwrap_or_default();
        for param in params.iter().filter(|p| p.kind == ParamKind::Param) {
            let name = param.name.as_deref().unwrap_or_default();
            if !names.iter().any(|n| n == name) {
                return Err(MetadataError::UnknownRouteParam {
                    target: action.declared_by.to_string(),
                    method: args.method.clone(),
                    name: name.to_string(),
                    route: path,
                });
            }
        }

        let is_action = |target: &MiddlewareTarget| {
            matches!(target, MiddlewareTarget::Action { target, method }
                if target == action.declared_by && *method == args.method)
        };
        let in_lineage = |target: &MiddlewareTarget| {
            matches!(target, MiddlewareTarget::Controller(t) if lineage.contains(&t.as_str()))
        };
        let is_global = |target: &MiddlewareTarget| matches!(target, MiddlewareTarget::Global);

        let mut before = self.steps(MiddlewarePhase::GlobalBefore, is_global);
        before.extend_from_slice(controller_before);
        before.extend(self.steps(MiddlewarePhase::ActionBefore, is_action));

        let mut after = self.steps(MiddlewarePhase::ActionAfter, is_action);
        after.extend_from_slice(controller_after);
        after.extend(self.steps(MiddlewarePhase::GlobalAfter, is_global));

        let mut error = self.steps(MiddlewarePhase::Error, is_global);
        error.extend(self.steps(MiddlewarePhase::Error, in_lineage));
        error.extend(self.steps(MiddlewarePhase::Error, is_action));

        let mut interceptors = self.interceptors(is_global);
        interceptors.extend(self.interceptors(in_lineage));
        interceptors.extend(self.interceptors(is_action));

        let response = ResponseAnnotations::fold(filter_by_target_and_method(
            self.storage.response_handlers(),
            action.declared_by,
            &args.method,
        ));

        Ok(ActionMetadata {
            controller: controller.clone(),
            declared_by: action.declared_by.to_string(),
            method: args.method.clone(),
            verb: args.verb.clone(),
            path,
            params,
            before,
            after,
            error,
            interceptors,
            response,
            roles: args.roles.clone().or_else(|| controller_roles.cloned()),
            handler: args.handler.clone(),
        })
    }

    fn controller_steps(&self, lineage: &[&str], phase: MiddlewarePhase) -> Vec<MiddlewareRef> {
        self.steps(phase, |target| {
            matches!(target, MiddlewareTarget::Controller(t) if lineage.contains(&t.as_str()))
        })
    }

    /// Middlewares of one phase whose target matches, sorted by priority.
    fn steps(
        &self,
        phase: MiddlewarePhase,
        matches: impl Fn(&MiddlewareTarget) -> bool,
    ) -> Vec<MiddlewareRef> {
        let mut steps: Vec<&MiddlewareArgs> = self
            .storage
            .middlewares()
            .iter()
            .filter(|m| m.phase == phase && matches(&m.target))
            .collect();
        steps.sort_by_key(|m| m.priority);
        steps
            .into_iter()
            .map(|m| MiddlewareRef {
                phase: m.phase,
                priority: m.priority,
                handle: m.handle.clone(),
            })
            .collect()
    }

    fn interceptors(&self, matches: impl Fn(&MiddlewareTarget) -> bool) -> Vec<InterceptorRef> {
        let mut list: Vec<&InterceptorArgs> = self
            .storage
            .interceptors()
            .iter()
            .filter(|i| matches(&i.target))
            .collect();
        list.sort_by_key(|i| i.priority);
        list.into_iter()
            .map(|i| InterceptorRef {
                priority: i.priority,
                interceptor: Arc::clone(&i.interceptor),
            })
            .collect()
    }
}

/// Actions of the first controller in `lineage`, inherited ones first.
/// A method redeclared further down the lineage replaces the inherited one
/// in place.
fn effective_actions<'a>(
    lineage: &[&'a str],
    own_actions: &HashMap<&'a str, Vec<&'a ActionArgs>>,
) -> Vec<Mounted<'a>> {
    let mut mounted: Vec<Mounted<'a>> = Vec::new();
    for &target in lineage.iter().rev() {
        for &args in own_actions.get(target).into_iter().flatten() {
            let action = Mounted {
                declared_by: target,
                args,
            };
            match mounted.iter_mut().find(|m| m.args.method == args.method) {
                Some(slot) => *slot = action,
                None => mounted.push(action),
            }
        }
    }
    mounted
}

fn has_action(own_actions: &HashMap<&str, Vec<&ActionArgs>>, target: &str, method: &str) -> bool {
    own_actions
        .get(target)
        .is_some_and(|actions| actions.iter().any(|a| a.method == method))
}

fn check_target(
    descriptor: &'static str,
    target: &MiddlewareTarget,
    controllers: &HashMap<&str, &ControllerArgs>,
    own_actions: &HashMap<&str, Vec<&ActionArgs>>,
) -> Result<(), MetadataError> {
    match target {
        MiddlewareTarget::Global => Ok(()),
        MiddlewareTarget::Controller(t) if controllers.contains_key(t.as_str()) => Ok(()),
        MiddlewareTarget::Controller(t) => Err(MetadataError::UnknownControllerTarget {
            descriptor,
            target: t.clone(),
        }),
        MiddlewareTarget::Action { target, method } if has_action(own_actions, target, method) => {
            Ok(())
        }
        MiddlewareTarget::Action { target, method } => Err(MetadataError::OrphanDescriptor {
            descriptor,
            target: target.clone(),
            method: method.clone(),
        }),
    }
}

/// Paths reaching this point were validated by `placeholders`.
fn route_shape_unchecked(path: &str) -> String {
    route_shape(path).unwrap_or_else(|_| path.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::ActionHandler;
    use crate::metadata::{ControllerArgs, ParamArgs, ResponseHandlerKind};
    use crate::middleware::{error_fn, from_fn, Flow};
    use http::StatusCode;
    use proptest::prelude::*;
    use serde_json::json;

    fn handler() -> ActionHandler {
        ActionHandler::sync(|_args| Ok::<_, crate::error::HttpError>(json!({})))
    }

    fn step(name: &'static str) -> impl crate::middleware::Middleware {
        from_fn(|_ctx| Ok(Flow::Continue)).named(name)
    }

    fn blog_storage() -> MetadataStorage {
        let mut storage = MetadataStorage::new();
        storage
            .register_controller(ControllerArgs::json("BlogController", "/blogs"))
            .register_action("BlogController", "list", ActionArgs::get("/", handler()))
            .register_action("BlogController", "get", ActionArgs::get("/:id", handler()))
            .register_param("BlogController", "get", 0, ParamArgs::param("id"))
            .register_param("BlogController", "list", 0, ParamArgs::query("page"));
        storage
    }

    fn build(storage: &MetadataStorage) -> Result<RouteTable, MetadataError> {
        MetadataBuilder::new(storage, &RoutingConfig::default()).build()
    }

    #[test]
    fn builds_routes_with_prefix() {
        let storage = blog_storage();
        let config = RoutingConfig::default().route_prefix("/api/");
        let table = MetadataBuilder::new(&storage, &config).build().unwrap();
        let paths: Vec<_> = table.entries().iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["/api/blogs", "/api/blogs/:id"]);

        let get = table.find(&Method::GET, "/api/blogs/:id").unwrap();
        assert!(get.action.params[0].required);
        let list = table.find(&Method::GET, "/api/blogs").unwrap();
        assert!(!list.action.params[0].required);
    }

    #[test]
    fn unset_prefix_leaves_routes_untouched() {
        let storage = blog_storage();
        let config = RoutingConfig::default();
        assert!(config.route_prefix.is_none());

        let table = MetadataBuilder::new(&storage, &config).build().unwrap();
        let paths: Vec<_> = table.entries().iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["/blogs", "/blogs/:id"]);

        let prefixed = RoutingConfig::default().route_prefix("v1");
        let table = MetadataBuilder::new(&storage, &prefixed).build().unwrap();
        assert!(table.find(&Method::GET, "/v1/blogs/:id").is_some());
        assert!(table.find(&Method::GET, "/blogs/:id").is_none());
    }

    #[test]
    fn default_required_applies_to_configurable_kinds() {
        let storage = blog_storage();
        let config = RoutingConfig::default().params_required_by_default(true);
        let table = MetadataBuilder::new(&storage, &config).build().unwrap();
        let list = table.find(&Method::GET, "/blogs").unwrap();
        assert!(list.action.params[0].required);
    }

    #[test]
    fn rejects_index_gaps_and_duplicates() {
        let mut storage = blog_storage();
        storage.register_param("BlogController", "list", 2, ParamArgs::query("size"));
        assert!(matches!(
            build(&storage),
            Err(MetadataError::NonContiguousParams { expected: 1, found: 2, .. })
        ));

        let mut storage = blog_storage();
        storage.register_param("BlogController", "list", 0, ParamArgs::query("size"));
        assert!(matches!(
            build(&storage),
            Err(MetadataError::DuplicateParamIndex { index: 0, .. })
        ));
    }

    #[test]
    fn rejects_name_violations() {
        let mut storage = blog_storage();
        storage.register_param("BlogController", "list", 1, ParamArgs::query(""));
        assert!(matches!(build(&storage), Err(MetadataError::MissingParamName { .. })));

        let mut storage = blog_storage();
        let mut body = ParamArgs::body();
        body.name = Some("payload".into());
        storage.register_param("BlogController", "list", 1, body);
        assert!(matches!(build(&storage), Err(MetadataError::UnexpectedParamName { .. })));
    }

    #[test]
    fn rejects_unknown_placeholders_and_orphans() {
        let mut storage = blog_storage();
        storage.register_param("BlogController", "list", 1, ParamArgs::param("id"));
        assert!(matches!(build(&storage), Err(MetadataError::UnknownRouteParam { .. })));

        let mut storage = blog_storage();
        storage.register_param("BlogController", "missing", 0, ParamArgs::body());
        assert!(matches!(build(&storage), Err(MetadataError::OrphanParam { .. })));

        let mut storage = blog_storage();
        storage.register_action("VideoController", "list", ActionArgs::get("/", handler()));
        assert!(matches!(build(&storage), Err(MetadataError::UnknownController { .. })));
    }

    #[test]
    fn later_duplicate_wins_inside_controller() {
        let mut storage = blog_storage();
        storage.register_action("BlogController", "listAgain", ActionArgs::get("", handler()));
        let table = build(&storage).unwrap();

        assert_eq!(table.len(), 2);
        assert_eq!(
            table.find(&Method::GET, "/blogs").unwrap().action.method,
            "listAgain"
        );
        assert_eq!(table.overrides().len(), 1);
        assert_eq!(table.overrides()[0].replaced, "BlogController.list");
        assert_eq!(table.overrides()[0].replaced_by, "BlogController.listAgain");
    }

    #[test]
    fn conflicts_across_controllers() {
        let mut storage = blog_storage();
        storage
            .register_controller(ControllerArgs::new("PostController", "/"))
            .register_action("PostController", "get", ActionArgs::get("/blogs/{slug}", handler()))
            .register_param("PostController", "get", 0, ParamArgs::param("slug"));
        match build(&storage) {
            Err(MetadataError::RouteConflict { existing, new, .. }) => {
                assert_eq!(existing, "BlogController.get");
                assert_eq!(new, "PostController.get");
            }
            other => panic!("expected a conflict, got {:?}", other.map(|t| t.len())),
        }
    }

    #[test]
    fn middleware_chains_are_merged_in_order() {
        let mut storage = blog_storage();
        storage
            .register_middleware(MiddlewareArgs::action_after("BlogController", "list", 0, step("action-after")))
            .register_middleware(MiddlewareArgs::global_before(5, step("global-5")))
            .register_middleware(MiddlewareArgs::controller_before("BlogController", 0, step("ctrl")))
            .register_middleware(MiddlewareArgs::global_before(-1, step("global-neg")))
            .register_middleware(MiddlewareArgs::action_before("BlogController", "list", 0, step("action")))
            .register_middleware(MiddlewareArgs::global_before(5, step("global-5b")))
            .register_middleware(MiddlewareArgs::global_after(0, step("global-after")))
            .register_middleware(MiddlewareArgs::controller_after("BlogController", 0, step("ctrl-after")));
        let table = build(&storage).unwrap();
        let list = &table.find(&Method::GET, "/blogs").unwrap().action;

        let before: Vec<_> = list.before.iter().map(|m| m.name()).collect();
        assert_eq!(before, vec!["global-neg", "global-5", "global-5b", "ctrl", "action"]);
        let after: Vec<_> = list.after.iter().map(|m| m.name()).collect();
        assert_eq!(after, vec!["action-after", "ctrl-after", "global-after"]);

        let get = &table.find(&Method::GET, "/blogs/:id").unwrap().action;
        assert_eq!(get.before.len(), 4);
    }

    #[test]
    fn phase_and_target_must_agree() {
        let mut storage = blog_storage();
        storage.register_middleware(MiddlewareArgs {
            phase: MiddlewarePhase::GlobalBefore,
            priority: 0,
            target: MiddlewareTarget::Controller("BlogController".into()),
            handle: MiddlewareHandle::Step(Arc::new(step("misplaced"))),
        });
        assert!(matches!(build(&storage), Err(MetadataError::PhaseTargetMismatch { .. })));

        let mut storage = blog_storage();
        storage.register_middleware(MiddlewareArgs::controller_before("Nope", 0, step("x")));
        assert!(matches!(
            build(&storage),
            Err(MetadataError::UnknownControllerTarget { .. })
        ));

        let mut storage = blog_storage();
        storage.register_middleware(MiddlewareArgs {
            phase: MiddlewarePhase::Error,
            priority: 0,
            target: MiddlewareTarget::Global,
            handle: MiddlewareHandle::Step(Arc::new(step("not-an-error-step"))),
        });
        assert!(matches!(build(&storage), Err(MetadataError::HandleMismatch { .. })));
    }

    #[test]
    fn error_middlewares_are_scoped() {
        let mut storage = blog_storage();
        storage
            .register_middleware(MiddlewareArgs::error_for(
                MiddlewareTarget::action("BlogController", "get"),
                0,
                error_fn(|_e, _c| Ok(Flow::Continue)).named("action-error"),
            ))
            .register_middleware(MiddlewareArgs::error(
                9,
                error_fn(|_e, _c| Ok(Flow::Continue)).named("global-error"),
            ));
        let table = build(&storage).unwrap();
        let names = |path: &str| -> Vec<String> {
            table.find(&Method::GET, path).unwrap().action.error.iter().map(|m| m.name().to_string()).collect()
        };
        assert_eq!(names("/blogs/:id"), vec!["global-error", "action-error"]);
        assert_eq!(names("/blogs"), vec!["global-error"]);
    }

    #[test]
    fn inheritance_mounts_parent_actions() {
        let mut storage = MetadataStorage::new();
        storage
            .register_controller(ControllerArgs::new("Crud", "/base"))
            .register_action("Crud", "list", ActionArgs::get("/", handler()))
            .register_action("Crud", "remove", ActionArgs::delete("/:id", handler()))
            .register_param("Crud", "remove", 0, ParamArgs::param("id"))
            .register_response_handler("Crud", "remove", ResponseHandlerKind::HttpCode(StatusCode::NO_CONTENT))
            .register_controller(ControllerArgs::new("Users", "/users").extends("Crud"))
            .register_action("Users", "list", ActionArgs::get("/", handler()))
            .register_middleware(MiddlewareArgs::controller_before("Crud", 0, step("crud-guard")));
        let table = build(&storage).unwrap();

        let remove = &table.find(&Method::DELETE, "/users/:id").unwrap().action;
        assert_eq!(remove.declared_by, "Crud");
        assert_eq!(remove.controller.target, "Users");
        assert_eq!(remove.response.status, Some(StatusCode::NO_CONTENT));
        assert_eq!(remove.before[0].name(), "crud-guard");

        let list = &table.find(&Method::GET, "/users").unwrap().action;
        assert_eq!(list.declared_by, "Users");
        assert_eq!(table.len(), 4);
    }

    #[test]
    fn inheritance_errors() {
        let mut storage = MetadataStorage::new();
        storage.register_controller(ControllerArgs::new("A", "/a").extends("Missing"));
        assert!(matches!(build(&storage), Err(MetadataError::UnknownParent { .. })));

        let mut storage = MetadataStorage::new();
        storage
            .register_controller(ControllerArgs::new("A", "/a").extends("B"))
            .register_controller(ControllerArgs::new("B", "/b").extends("A"));
        assert!(matches!(build(&storage), Err(MetadataError::InheritanceCycle { .. })));

        let mut storage = MetadataStorage::new();
        storage
            .register_controller(ControllerArgs::new("A", "/a"))
            .register_controller(ControllerArgs::new("A", "/b"));
        assert!(matches!(build(&storage), Err(MetadataError::DuplicateController { .. })));
    }

    #[test]
    fn roles_fall_back_to_controller() {
        let mut storage = MetadataStorage::new();
        storage
            .register_controller(ControllerArgs::new("Admin", "/admin").authorized(["admin"]))
            .register_action("Admin", "stats", ActionArgs::get("/stats", handler()))
            .register_action(
                "Admin",
                "health",
                ActionArgs::get("/health", handler()).authorized(Vec::<String>::new()),
            );
        let table = build(&storage).unwrap();
        assert_eq!(
            table.find(&Method::GET, "/admin/stats").unwrap().action.roles,
            Some(vec!["admin".to_string()])
        );
        assert_eq!(
            table.find(&Method::GET, "/admin/health").unwrap().action.roles,
            Some(vec![])
        );
    }

    proptest! {
        #[test]
        fn builds_are_idempotent(priorities in proptest::collection::vec(-5i32..5, 0..8)) {
            let mut storage = blog_storage();
            for (i, priority) in priorities.iter().enumerate() {
                let name: &'static str = Box::leak(format!("m{}", i).into_boxed_str());
                storage.register_middleware(MiddlewareArgs::global_before(*priority, step(name)));
            }
            let first = build(&storage).unwrap().fingerprint();
            let second = build(&storage).unwrap().fingerprint();
            prop_assert_eq!(&first, &second);

            let before = &first[0].before;
            let mut expected: Vec<(i32, usize)> =
                priorities.iter().enumerate().map(|(i, p)| (*p, i)).collect();
            expected.sort();
            let expected: Vec<String> = expected.into_iter().map(|(_, i)| format!("m{}", i)).collect();
            prop_assert_eq!(before, &expected);
        }

        #[test]
        fn any_index_permutation_is_accepted(count in 1usize..6, seed in any::<u64>()) {
            let mut indices: Vec<usize> = (0..count).collect();
            // deterministic shuffle
            let mut state = seed;
            for i in (1..indices.len()).rev() {
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                indices.swap(i, (state >> 33) as usize % (i + 1));
            }
            let mut storage = blog_storage();
            storage.register_action("BlogController", "search", ActionArgs::get("/search", handler()));
            for index in &indices {
                storage.register_param("BlogController", "search", *index, ParamArgs::query(format!("q{}", index)));
            }
            let table = build(&storage).unwrap();
            let search = &table.find(&Method::GET, "/blogs/search").unwrap().action;
            let seen: Vec<usize> = search.params.iter().map(|p| p.index).collect();
            prop_assert_eq!(seen, (0..count).collect::<Vec<_>>());
        }
    }
}
