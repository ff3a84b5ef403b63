//! routekit application builder

use crate::auth::{AuthorizationChecker, CurrentUserChecker};
use crate::builder::MetadataBuilder;
use crate::config::RoutingConfig;
use crate::error::MetadataError;
use crate::executor::ActionExecutor;
use crate::matcher::RouteMatcher;
use crate::response::ViewRenderer;
use crate::server::{HyperDriver, Server};
use crate::storage::MetadataStorage;
use crate::table::RouteTable;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Main application builder
///
/// Takes the registered descriptors and the routing configuration, and
/// builds an [`Application`] once every descriptor checks out.
///
/// # Example
///
/// ```rust,ignore
/// use routekit::prelude::*;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
///     let mut storage = MetadataStorage::new();
///     storage
///         .register_controller(ControllerArgs::json("BlogController", "/blogs"))
///         .register_action("BlogController", "list", ActionArgs::get("/", list_blogs()));
///
///     App::new(storage)
///         .config(RoutingConfig::from_env()?)
///         .run("127.0.0.1:8080")
///         .await
/// }
/// ```
pub struct App {
    storage: MetadataStorage,
    config: RoutingConfig,
    authorization: Option<Arc<dyn AuthorizationChecker>>,
    current_user: Option<Arc<dyn CurrentUserChecker>>,
    renderer: Option<Arc<dyn ViewRenderer>>,
}

impl App {
    /// Create a new application over `storage`
    pub fn new(storage: MetadataStorage) -> Self {
        // Initialize tracing if not already done
        let _ = tracing_subscriber::registry()
            .with(
                EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| EnvFilter::new("info,routekit=debug,routekit_core=debug")),
            )
            .with(tracing_subscriber::fmt::layer())
            .try_init();

        Self {
            storage,
            config: RoutingConfig::default(),
            authorization: None,
            current_user: None,
            renderer: None,
        }
    }

    pub fn config(mut self, config: RoutingConfig) -> Self {
        self.config = config;
        self
    }

    /// Decides access to actions and controllers that declare roles
    pub fn authorization_checker(mut self, checker: impl AuthorizationChecker) -> Self {
        self.authorization = Some(Arc::new(checker));
        self
    }

    /// Supplies `CurrentUser` parameters
    pub fn current_user_checker(mut self, checker: impl CurrentUserChecker) -> Self {
        self.current_user = Some(Arc::new(checker));
        self
    }

    /// Renders actions annotated with a template
    pub fn view_renderer(mut self, renderer: impl ViewRenderer) -> Self {
        self.renderer = Some(Arc::new(renderer));
        self
    }

    /// Validate and link every descriptor.
    pub fn build(self) -> Result<Application, MetadataError> {
        let table = MetadataBuilder::new(&self.storage, &self.config).build()?;
        let matcher = RouteMatcher::new(&table)?;
        let config = Arc::new(self.config);

        let mut executor = ActionExecutor::new(Arc::clone(&config));
        if let Some(checker) = self.authorization {
            executor = executor.with_authorization_checker(checker);
        }
        if let Some(checker) = self.current_user {
            executor = executor.with_current_user_checker(checker);
        }
        if let Some(renderer) = self.renderer {
            executor = executor.with_view_renderer(renderer);
        }

        for entry in table.entries() {
            crate::trace_debug!(verb = %entry.verb, path = %entry.path, action = %entry.action.qualified_name(), "route");
        }

        Ok(Application {
            table: Arc::new(table),
            matcher: Arc::new(matcher),
            executor,
            config,
        })
    }

    /// Build and serve on `addr`.
    pub async fn run(self, addr: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.build()?.run(addr).await
    }
}

/// A built application: route table, matcher and executor.
#[derive(Clone)]
pub struct Application {
    table: Arc<RouteTable>,
    matcher: Arc<RouteMatcher>,
    executor: ActionExecutor,
    config: Arc<RoutingConfig>,
}

impl Application {
    pub fn table(&self) -> &RouteTable {
        &self.table
    }

    pub fn config(&self) -> &RoutingConfig {
        &self.config
    }

    pub fn executor(&self) -> &ActionExecutor {
        &self.executor
    }

    pub(crate) fn matcher(&self) -> &Arc<RouteMatcher> {
        &self.matcher
    }

    /// The hyper driver for this application.
    pub fn driver(&self) -> HyperDriver {
        HyperDriver::new(Arc::clone(&self.matcher), self.config.body_limit)
    }

    pub fn into_server(self) -> Server {
        Server::new(self.driver(), self.executor)
    }

    /// Serve on `addr`.
    pub async fn run(self, addr: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        crate::trace_info!(routes = self.table.len(), "starting routekit on http://{}", addr);
        self.into_server().run(addr).await
    }
}
