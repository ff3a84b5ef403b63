//! # routekit
//!
//! Controller-based HTTP routing for Rust.
//!
//! Controllers, actions, parameters, middlewares and response annotations are
//! registered as metadata. [`App::build`] checks every descriptor, links them
//! into a route table and returns an [`Application`] that matches requests,
//! resolves action arguments, runs the middleware chains and maps results to
//! responses.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use routekit::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let mut storage = MetadataStorage::new();
//!     storage
//!         .register_controller(ControllerArgs::json("BlogController", "/blogs"))
//!         .register_action(
//!             "BlogController",
//!             "get",
//!             ActionArgs::get("/:id", ActionHandler::sync(|args| {
//!                 let id: u64 = args.value(0)?;
//!                 Ok::<_, HttpError>(json!({ "id": id }))
//!             })),
//!         )
//!         .register_param("BlogController", "get", 0, ParamArgs::param("id").shape(ValueShape::Integer));
//!
//!     App::new(storage)
//!         .config(RoutingConfig::from_env()?)
//!         .run("127.0.0.1:8080")
//!         .await
//! }
//! ```
//!
//! ## Features
//!
//! - `tracing` (default) - structured logs for builds and dispatched requests
//! - `test-utils` - [`TestClient`] for driving an application without a socket

// Re-export core functionality
pub use routekit_core::*;

/// Value shapes and validation primitives
pub mod validate {
    pub use routekit_validate::*;
}

/// Prelude module - import everything you need with `use routekit::prelude::*`
pub mod prelude {
    pub use routekit_core::{
        // App builder
        App,
        Application,
        // Metadata
        ActionArgs,
        ActionHandler,
        Arguments,
        ControllerArgs,
        InterceptorArgs,
        MetadataStorage,
        MiddlewareArgs,
        MiddlewareTarget,
        ParamArgs,
        ResponseHandlerKind,
        // Pipeline
        ActionOutput,
        AuthorizationChecker,
        CurrentUserChecker,
        ErrorMiddleware,
        Flow,
        Interceptor,
        Middleware,
        RequestContext,
        UploadOptions,
        UploadedFile,
        // Configuration
        RoutingConfig,
        ValidationPolicy,
        // Errors
        HttpError,
        MetadataError,
        Result,
        // Responses
        Html,
        Json,
        StatusCode,
        ValueShape,
    };

    pub use routekit_core::{error_fn, from_fn, interceptor_fn};

    #[cfg(feature = "test-utils")]
    pub use routekit_core::{TestClient, TestRequest, TestResponse};

    // Re-export validation - use validator derive macro directly
    pub use validator::Validate;

    // Re-export commonly used external types
    pub use serde::{Deserialize, Serialize};
    pub use serde_json::{json, Value};
    pub use tracing::{debug, error, info, trace, warn};
}
