//! Metadata storage
//!
//! Registrations accumulate here, in order, before anything is built. The
//! storage is a plain value: create one per application (or per test) and
//! hand it to the builder.

use crate::metadata::{
    ActionArgs, ControllerArgs, Descriptor, InterceptorArgs, MiddlewareArgs, ParamArgs,
    ResponseHandlerArgs, ResponseHandlerKind,
};

/// Descriptors that belong to a `(target, method)` pair.
pub trait TargetBound {
    fn target(&self) -> &str;
    fn method(&self) -> Option<&str>;
}

impl TargetBound for ControllerArgs {
    fn target(&self) -> &str {
        &self.target
    }
    fn method(&self) -> Option<&str> {
        None
    }
}

impl TargetBound for ActionArgs {
    fn target(&self) -> &str {
        &self.target
    }
    fn method(&self) -> Option<&str> {
        Some(&self.method)
    }
}

impl TargetBound for ParamArgs {
    fn target(&self) -> &str {
        &self.target
    }
    fn method(&self) -> Option<&str> {
        Some(&self.method)
    }
}

impl TargetBound for ResponseHandlerArgs {
    fn target(&self) -> &str {
        &self.target
    }
    fn method(&self) -> Option<&str> {
        Some(&self.method)
    }
}

/// Ordered sub-sequence of `list` bound to `target`.
pub fn filter_by_target<'a, T: TargetBound>(list: &'a [T], target: &'a str) -> Vec<&'a T> {
    list.iter().filter(|item| item.target() == target).collect()
}

/// Ordered sub-sequence of `list` bound to `target.method`.
pub fn filter_by_target_and_method<'a, T: TargetBound>(
    list: &'a [T],
    target: &'a str,
    method: &'a str,
) -> Vec<&'a T> {
    list.iter()
        .filter(|item| item.target() == target && item.method() == Some(method))
        .collect()
}

/// Registry of every declared descriptor.
#[derive(Debug, Clone, Default)]
pub struct MetadataStorage {
    controllers: Vec<ControllerArgs>,
    actions: Vec<ActionArgs>,
    params: Vec<ParamArgs>,
    middlewares: Vec<MiddlewareArgs>,
    interceptors: Vec<InterceptorArgs>,
    response_handlers: Vec<ResponseHandlerArgs>,
}

impl MetadataStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a descriptor to the list of its kind. No deduplication happens
    /// here; conflicts are the builder's business.
    pub fn add(&mut self, descriptor: impl Into<Descriptor>) -> &mut Self {
        match descriptor.into() {
            Descriptor::Controller(args) => self.controllers.push(args),
            Descriptor::Action(args) => self.actions.push(args),
            Descriptor::Param(args) => self.params.push(args),
            Descriptor::Middleware(args) => self.middlewares.push(args),
            Descriptor::Interceptor(args) => self.interceptors.push(args),
            Descriptor::ResponseHandler(args) => self.response_handlers.push(args),
        }
        self
    }

    pub fn register_controller(&mut self, args: ControllerArgs) -> &mut Self {
        self.add(args)
    }

    /// Register `args` as method `method` of controller `target`.
    pub fn register_action(&mut self, target: &str, method: &str, args: ActionArgs) -> &mut Self {
        self.add(args.bind(target, method))
    }

    /// Register `args` as argument `index` of `target.method`.
    pub fn register_param(
        &mut self,
        target: &str,
        method: &str,
        index: usize,
        args: ParamArgs,
    ) -> &mut Self {
        self.add(args.bind(target, method, index))
    }

    pub fn register_middleware(&mut self, args: MiddlewareArgs) -> &mut Self {
        self.add(args)
    }

    pub fn register_interceptor(&mut self, args: InterceptorArgs) -> &mut Self {
        self.add(args)
    }

    pub fn register_response_handler(
        &mut self,
        target: &str,
        method: &str,
        kind: ResponseHandlerKind,
    ) -> &mut Self {
        self.add(ResponseHandlerArgs {
            target: target.to_string(),
            method: method.to_string(),
            kind,
        })
    }

    pub fn controllers(&self) -> &[ControllerArgs] {
        &self.controllers
    }

    pub fn actions(&self) -> &[ActionArgs] {
        &self.actions
    }

    pub fn params(&self) -> &[ParamArgs] {
        &self.params
    }

    pub fn middlewares(&self) -> &[MiddlewareArgs] {
        &self.middlewares
    }

    pub fn interceptors(&self) -> &[InterceptorArgs] {
        &self.interceptors
    }

    pub fn response_handlers(&self) -> &[ResponseHandlerArgs] {
        &self.response_handlers
    }

    /// Number of descriptors across every list.
    pub fn len(&self) -> usize {
        self.controllers.len()
            + self.actions.len()
            + self.params.len()
            + self.middlewares.len()
            + self.interceptors.len()
            + self.response_handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clear every list.
    pub fn reset(&mut self) {
        self.controllers.clear();
        self.actions.clear();
        self.params.clear();
        self.middlewares.clear();
        self.interceptors.clear();
        self.response_handlers.clear();
    }
}
