//! Blog API demo for routekit
//!
//! Demonstrates:
//! - JSON controllers with route, query and body parameters
//! - Typed, validated request bodies
//! - Before middleware and error middleware
//! - Role-based authorization through a pluggable checker
//! - File uploads
//!
//! Run with: cargo run -p blog-api
//! Then try: curl http://127.0.0.1:8080/api/blogs

use routekit::prelude::*;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

// ============================================
// Data Models
// ============================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Blog {
    pub id: u64,
    pub title: String,
    pub body: String,
}

/// Request body for creating a blog
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct CreateBlog {
    #[validate(length(min = 1, max = 120, message = "Title must be 1-120 characters"))]
    pub title: String,
    #[validate(length(max = 5000))]
    pub body: String,
}

// ============================================
// Store
// ============================================

#[derive(Default)]
pub struct BlogStore {
    blogs: RwLock<BTreeMap<u64, Blog>>,
}

impl BlogStore {
    fn seeded() -> Self {
        let store = Self::default();
        store.insert("About me".to_string(), "Hello.".to_string());
        store
    }

    fn insert(&self, title: String, body: String) -> Blog {
        let mut blogs = self.blogs.write().unwrap_or_else(|e| e.into_inner());
        let id = blogs.keys().next_back().map_or(1, |last| last + 1);
        let blog = Blog { id, title, body };
        blogs.insert(id, blog.clone());
        blog
    }

    fn get(&self, id: u64) -> Option<Blog> {
        self.blogs.read().unwrap_or_else(|e| e.into_inner()).get(&id).cloned()
    }

    fn page(&self, page: u64, size: u64) -> Vec<Blog> {
        self.blogs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .skip(((page.max(1) - 1) * size) as usize)
            .take(size as usize)
            .cloned()
            .collect()
    }

    fn remove(&self, id: u64) -> Option<Blog> {
        self.blogs.write().unwrap_or_else(|e| e.into_inner()).remove(&id)
    }
}

// ============================================
// Registration
// ============================================

fn register_blogs(storage: &mut MetadataStorage, store: Arc<BlogStore>) {
    storage
        .register_controller(ControllerArgs::json("BlogController", "/blogs"))
        .register_action(
            "BlogController",
            "list",
            ActionArgs::get(
                "/",
                ActionHandler::bound(Arc::clone(&store), |store, args| async move {
                    let page: Option<u64> = args.optional(0)?;
                    let blogs = store.page(page.unwrap_or(1), 20);
                    Ok::<_, HttpError>(Json(blogs))
                }),
            ),
        )
        .register_param(
            "BlogController",
            "list",
            0,
            ParamArgs::query("page").shape(ValueShape::Integer),
        )
        .register_action(
            "BlogController",
            "get",
            ActionArgs::get(
                "/:id",
                ActionHandler::bound(Arc::clone(&store), |store, args| async move {
                    let id: u64 = args.value(0)?;
                    store
                        .get(id)
                        .map(Json)
                        .ok_or_else(|| HttpError::not_found(format!("Blog {} was not found.", id)))
                }),
            ),
        )
        .register_param(
            "BlogController",
            "get",
            0,
            ParamArgs::param("id").shape(ValueShape::Integer),
        )
        .register_action(
            "BlogController",
            "create",
            ActionArgs::post(
                "/",
                ActionHandler::bound(Arc::clone(&store), |store, args| async move {
                    let input: CreateBlog = args.value(0)?;
                    Ok::<_, HttpError>(Json(store.insert(input.title, input.body)))
                }),
            ),
        )
        .register_param(
            "BlogController",
            "create",
            0,
            ParamArgs::body()
                .shape(ValueShape::of::<CreateBlog>())
                .required(true),
        )
        .register_response_handler(
            "BlogController",
            "create",
            ResponseHandlerKind::HttpCode(StatusCode::CREATED),
        )
        .register_action(
            "BlogController",
            "remove",
            ActionArgs::delete(
                "/:id",
                ActionHandler::bound(store, |store, args| async move {
                    let id: u64 = args.value(0)?;
                    store
                        .remove(id)
                        .map(|_| ())
                        .ok_or_else(|| HttpError::not_found(format!("Blog {} was not found.", id)))
                }),
            )
            .authorized(["admin"]),
        )
        .register_param(
            "BlogController",
            "remove",
            0,
            ParamArgs::param("id").shape(ValueShape::Integer),
        )
        .register_response_handler(
            "BlogController",
            "remove",
            ResponseHandlerKind::OnUndefined(StatusCode::NO_CONTENT),
        );
}

fn register_videos(storage: &mut MetadataStorage) {
    storage
        .register_controller(ControllerArgs::json("VideoController", "/videos"))
        .register_action(
            "VideoController",
            "list",
            ActionArgs::get(
                "/",
                ActionHandler::sync(|_args| {
                    Err::<Value, _>(HttpError::not_found("Videos were not found."))
                }),
            ),
        )
        .register_action(
            "VideoController",
            "upload",
            ActionArgs::post(
                "/",
                ActionHandler::sync(|args| -> Result<Value, HttpError> {
                    let files = args.files(0)?;
                    let names: Vec<_> = files
                        .iter()
                        .map(|f| json!({"name": f.file_name(), "size": f.size()}))
                        .collect();
                    Ok(json!({ "uploaded": names }))
                }),
            ),
        )
        .register_param(
            "VideoController",
            "upload",
            0,
            ParamArgs::uploaded_files("videos")
                .required(true)
                .upload(
                    UploadOptions::new()
                        .max_file_size(10 * 1024 * 1024)
                        .allow_content_type("video/mp4")
                        .max_files(3),
                ),
        );
}

fn register_middlewares(storage: &mut MetadataStorage) {
    storage
        .register_middleware(MiddlewareArgs::global_before(
            0,
            from_fn(|ctx| {
                ctx.response().header("x-powered-by", "routekit")?;
                Ok(Flow::Continue)
            })
            .named("powered_by"),
        ))
        .register_middleware(MiddlewareArgs::error(
            0,
            error_fn(|err, ctx| {
                warn!(request_id = %ctx.request_id(), status = err.status.as_u16(), "request failed");
                Ok(Flow::Continue)
            })
            .named("log_errors"),
        ));
}

/// Requests carrying `x-role: admin` may run admin actions.
fn role_checker(ctx: &RequestContext, roles: &[String]) -> bool {
    ctx.headers()
        .get("x-role")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|role| roles.iter().any(|r| r == role))
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
    routekit::load_dotenv();

    let mut storage = MetadataStorage::new();
    register_blogs(&mut storage, Arc::new(BlogStore::seeded()));
    register_videos(&mut storage);
    register_middlewares(&mut storage);

    let config = RoutingConfig::from_env()?.route_prefix("/api");

    App::new(storage)
        .config(config)
        .authorization_checker(role_checker)
        .run("127.0.0.1:8080")
        .await
}
