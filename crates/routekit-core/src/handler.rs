//! Action handlers and their argument list
//!
//! Parameter declarations are erased into a positional [`Arguments`] list;
//! a handler is any closure taking that list and returning something that
//! converts into an [`ActionOutput`]:
//!
//! ```rust,ignore
//! let handler = ActionHandler::new(|args: Arguments| async move {
//!     let id: u64 = args.value(0)?;
//!     let blog = repository.find(id).await?;
//!     Ok::<_, HttpError>(Json(blog))
//! });
//! ```

use crate::context::{RequestHead, ResponseWriter};
use crate::error::HttpError;
use crate::multipart::UploadedFile;
use crate::response::{ActionOutput, IntoActionOutput};
use futures_util::future::BoxFuture;
use routekit_validate::ValidationError;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Outcome of invoking an action.
pub type ActionResult = Result<ActionOutput, HttpError>;

type HandlerFn = dyn Fn(Arguments) -> BoxFuture<'static, ActionResult> + Send + Sync;

/// Type-erased action callable.
#[derive(Clone)]
pub struct ActionHandler {
    inner: Arc<HandlerFn>,
}

impl ActionHandler {
    /// Wrap an async closure.
    pub fn new<F, Fut, R, E>(f: F) -> Self
    where
        F: Fn(Arguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, E>> + Send + 'static,
        R: IntoActionOutput,
        E: Into<HttpError>,
    {
        let f = Arc::new(f);
        Self {
            inner: Arc::new(move |args| {
                let f = Arc::clone(&f);
                Box::pin(async move { f(args).await.map_err(Into::into)?.into_output() })
            }),
        }
    }

    /// Wrap a synchronous closure. It runs when the returned future is first polled.
    pub fn sync<F, R, E>(f: F) -> Self
    where
        F: Fn(Arguments) -> Result<R, E> + Send + Sync + 'static,
        R: IntoActionOutput + Send + 'static,
        E: Into<HttpError> + Send + 'static,
    {
        Self::new(move |args| std::future::ready(f(args)))
    }

    /// Wrap a method of a shared controller instance.
    pub fn bound<C, F, Fut, R, E>(instance: Arc<C>, f: F) -> Self
    where
        C: Send + Sync + 'static,
        F: Fn(Arc<C>, Arguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, E>> + Send + 'static,
        R: IntoActionOutput,
        E: Into<HttpError>,
    {
        Self::new(move |args| f(Arc::clone(&instance), args))
    }

    pub(crate) fn call(&self, args: Arguments) -> BoxFuture<'static, ActionResult> {
        (self.inner)(args)
    }
}

impl fmt::Debug for ActionHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ActionHandler")
    }
}

/// One resolved argument.
#[derive(Debug, Clone)]
pub enum Argument {
    Request(Arc<RequestHead>),
    Response(ResponseWriter),
    Value(Value),
    File(UploadedFile),
    Files(Vec<UploadedFile>),
    /// Optional parameter that was not provided
    Undefined,
}

impl Argument {
    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }
}

/// Positional arguments of one action invocation.
#[derive(Debug, Clone, Default)]
pub struct Arguments {
    values: Vec<Argument>,
    violations: Vec<(usize, ValidationError)>,
}

impl Arguments {
    pub fn new(values: Vec<Argument>) -> Self {
        Self {
            values,
            violations: Vec::new(),
        }
    }

    pub(crate) fn with_violations(mut self, violations: Vec<(usize, ValidationError)>) -> Self {
        self.violations = violations;
        self
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Argument> {
        self.values.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Argument> {
        self.values.iter()
    }

    /// Raw JSON value of argument `index`.
    pub fn raw(&self, index: usize) -> Option<&Value> {
        match self.values.get(index) {
            Some(Argument::Value(value)) => Some(value),
            _ => None,
        }
    }

    /// Deserialize argument `index`. An undefined argument deserializes from
    /// `null`, so `Option<T>` reads optional parameters.
    pub fn value<T: DeserializeOwned>(&self, index: usize) -> Result<T, HttpError> {
        let value = match self.values.get(index) {
            Some(Argument::Value(value)) => value.clone(),
            Some(Argument::Undefined) => Value::Null,
            Some(other) => return Err(wrong_kind(index, "a value", other)),
            None => return Err(missing(index)),
        };
        serde_json::from_value(value).map_err(|e| {
            HttpError::bad_request(format!("Invalid value for argument {}: {}", index, e))
        })
    }

    /// Like [`value`](Self::value), but `None` when the argument is undefined.
    pub fn optional<T: DeserializeOwned>(&self, index: usize) -> Result<Option<T>, HttpError> {
        match self.values.get(index) {
            Some(Argument::Undefined) => Ok(None),
            _ => self.value(index).map(Some),
        }
    }

    pub fn request(&self, index: usize) -> Result<Arc<RequestHead>, HttpError> {
        match self.values.get(index) {
            Some(Argument::Request(head)) => Ok(Arc::clone(head)),
            Some(other) => Err(wrong_kind(index, "the request", other)),
            None => Err(missing(index)),
        }
    }

    pub fn response(&self, index: usize) -> Result<ResponseWriter, HttpError> {
        match self.values.get(index) {
            Some(Argument::Response(writer)) => Ok(writer.clone()),
            Some(other) => Err(wrong_kind(index, "the response", other)),
            None => Err(missing(index)),
        }
    }

    pub fn file(&self, index: usize) -> Result<Option<UploadedFile>, HttpError> {
        match self.values.get(index) {
            Some(Argument::File(file)) => Ok(Some(file.clone())),
            Some(Argument::Undefined) => Ok(None),
            Some(other) => Err(wrong_kind(index, "a file", other)),
            None => Err(missing(index)),
        }
    }

    pub fn files(&self, index: usize) -> Result<Vec<UploadedFile>, HttpError> {
        match self.values.get(index) {
            Some(Argument::Files(files)) => Ok(files.clone()),
            Some(Argument::Undefined) => Ok(Vec::new()),
            Some(other) => Err(wrong_kind(index, "a file list", other)),
            None => Err(missing(index)),
        }
    }

    /// Violations attached instead of failing (`ValidationPolicy::Attach`).
    pub fn violations(&self) -> &[(usize, ValidationError)] {
        &self.violations
    }
}

fn missing(index: usize) -> HttpError {
    HttpError::internal("Action argument mismatch")
        .with_internal(format!("no argument declared at index {}", index))
}

fn wrong_kind(index: usize, expected: &str, found: &Argument) -> HttpError {
    HttpError::internal("Action argument mismatch").with_internal(format!(
        "argument {} is not {}: {:?}",
        index, expected, found
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use serde_json::json;

    #[test]
    fn typed_access() {
        let args = Arguments::new(vec![
            Argument::Value(json!(7)),
            Argument::Undefined,
            Argument::Value(json!("x")),
        ]);
        assert_eq!(args.value::<u32>(0).unwrap(), 7);
        assert_eq!(args.value::<Option<u32>>(1).unwrap(), None);
        assert_eq!(args.optional::<u32>(1).unwrap(), None);
        assert_eq!(args.value::<u32>(2).unwrap_err().kind, ErrorKind::BadRequest);
        assert_eq!(args.value::<u32>(9).unwrap_err().kind, ErrorKind::Internal);
        assert!(args.request(0).is_err());
    }

    #[tokio::test]
    async fn sync_and_async_handlers() {
        let sync = ActionHandler::sync(|args: Arguments| args.value::<String>(0));
        let output = sync
            .call(Arguments::new(vec![Argument::Value(json!("hi"))]))
            .await
            .unwrap();
        assert!(matches!(output, ActionOutput::Text(ref s) if s == "hi"));

        let failing = ActionHandler::new(|_args| async {
            Err::<(), _>(HttpError::not_found("gone"))
        });
        let err = failing.call(Arguments::default()).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn bound_handlers_share_instance() {
        struct Counter {
            step: u64,
        }
        let handler = ActionHandler::bound(Arc::new(Counter { step: 5 }), |c, args| async move {
            let n: u64 = args.value(0)?;
            Ok::<_, HttpError>(json!(n + c.step))
        });
        let output = handler
            .call(Arguments::new(vec![Argument::Value(json!(1))]))
            .await
            .unwrap();
        assert!(matches!(output, ActionOutput::Json(ref v) if *v == json!(6)));
    }
}
