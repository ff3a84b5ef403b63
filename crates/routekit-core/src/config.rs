//! Routing configuration
//!
//! [`RoutingConfig`] carries every switch the builder, resolver, executor and
//! response mapper read. It can be built in code with the setters, parsed
//! from any serde format, or loaded from `ROUTEKIT_*` environment variables:
//!
//! ```ignore
//! use routekit_core::config::{load_dotenv, RoutingConfig};
//!
//! load_dotenv();
//! let config = RoutingConfig::from_env()?.route_prefix("/api");
//! ```
//!
//! | Variable | Field |
//! |----------|-------|
//! | `ROUTEKIT_ROUTE_PREFIX` | `route_prefix` |
//! | `ROUTEKIT_DEFAULT_ERROR_HANDLER` | `default_error_handler` |
//! | `ROUTEKIT_CLASS_TRANSFORMER` | `class_transformer` |
//! | `ROUTEKIT_VALIDATION` | `validation.enabled` |
//! | `ROUTEKIT_VALIDATION_POLICY` | `validation.policy` (`reject` / `attach`) |
//! | `ROUTEKIT_NULL_RESULT_CODE` | `defaults.null_result_code` |
//! | `ROUTEKIT_UNDEFINED_RESULT_CODE` | `defaults.undefined_result_code` |
//! | `ROUTEKIT_PARAM_REQUIRED` | `defaults.param_required` |
//! | `ROUTEKIT_ERROR_FORMAT` | `error_format` (`text` / `json`) |
//! | `ROUTEKIT_EXPOSE_INTERNAL_ERRORS` | `expose_internal_errors` |
//! | `ROUTEKIT_BODY_LIMIT` | `body_limit` |
//! | `ROUTEKIT_TRANSFORM_EXCLUDE` | `transform.exclude` (comma separated) |
//! | `ROUTEKIT_TRANSFORM_EXCLUDE_PREFIXES` | `transform.exclude_prefixes` |

use serde::{Deserialize, Serialize};

/// Default request body limit (1 MiB)
pub const DEFAULT_BODY_LIMIT: usize = 1024 * 1024;

/// Prefix of every environment variable read by [`RoutingConfig::from_env`].
pub const ENV_PREFIX: &str = "ROUTEKIT_";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("configuration error: {0}")]
    Env(#[from] envy::Error),
}

/// What to do with validation violations on typed parameters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationPolicy {
    /// Fail the request with a `ParamValidation` error
    #[default]
    Reject,
    /// Keep the raw value and attach the violations to the argument list
    Attach,
}

/// Body format of errors answered by the built-in fallback.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorFormat {
    /// Plain text message (the JSON envelope is still used for field violations)
    #[default]
    Text,
    /// Always the JSON envelope
    Json,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationOptions {
    pub enabled: bool,
    pub policy: ValidationPolicy,
}

/// Rules applied to JSON results before they are written.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformOptions {
    /// Keys removed at any depth
    pub exclude: Vec<String>,
    /// Keys starting with one of these are removed at any depth (e.g. `_`)
    pub exclude_prefixes: Vec<String>,
    /// When set, top-level objects keep only these keys
    pub expose: Option<Vec<String>>,
}

impl TransformOptions {
    pub fn is_noop(&self) -> bool {
        self.exclude.is_empty() && self.exclude_prefixes.is_empty() && self.expose.is_none()
    }
}

/// Status codes and requiredness used when an action does not say otherwise.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultsOptions {
    pub null_result_code: Option<u16>,
    pub undefined_result_code: Option<u16>,
    /// Default `required` for parameters that leave it unset
    pub param_required: bool,
}

/// Configuration for building and serving a route table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Prefix mounted before every controller route
    pub route_prefix: Option<String>,
    /// Answer failures with status + message even when error middlewares are registered
    pub default_error_handler: bool,
    /// Deserialize typed parameters into their Rust type
    pub class_transformer: bool,
    pub transform: TransformOptions,
    pub validation: ValidationOptions,
    pub defaults: DefaultsOptions,
    pub error_format: ErrorFormat,
    /// Put internal error details in response bodies
    pub expose_internal_errors: bool,
    /// Maximum request body size in bytes
    pub body_limit: usize,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            route_prefix: None,
            default_error_handler: true,
            class_transformer: true,
            transform: TransformOptions::default(),
            validation: ValidationOptions::default(),
            defaults: DefaultsOptions::default(),
            error_format: ErrorFormat::default(),
            expose_internal_errors: false,
            body_limit: DEFAULT_BODY_LIMIT,
        }
    }
}

/// Flat view of the configuration as environment variables.
#[derive(Debug, Default, Deserialize)]
struct EnvOverrides {
    route_prefix: Option<String>,
    default_error_handler: Option<bool>,
    class_transformer: Option<bool>,
    validation: Option<bool>,
    validation_policy: Option<ValidationPolicy>,
    null_result_code: Option<u16>,
    undefined_result_code: Option<u16>,
    param_required: Option<bool>,
    error_format: Option<ErrorFormat>,
    expose_internal_errors: Option<bool>,
    body_limit: Option<usize>,
    transform_exclude: Option<Vec<String>>,
    transform_exclude_prefixes: Option<Vec<String>>,
}

impl RoutingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overlaid with the `ROUTEKIT_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(std::env::vars())
    }

    /// Defaults overlaid with `ROUTEKIT_*` entries of `vars`.
    pub fn from_vars<I>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let overrides: EnvOverrides = envy::prefixed(ENV_PREFIX).from_iter(vars)?;
        Ok(Self::default().apply(overrides))
    }

    fn apply(mut self, env: EnvOverrides) -> Self {
        if env.route_prefix.is_some() {
            self.route_prefix = env.route_prefix;
        }
        if let Some(v) = env.default_error_handler {
            self.default_error_handler = v;
        }
        if let Some(v) = env.class_transformer {
            self.class_transformer = v;
        }
        if let Some(v) = env.validation {
            self.validation.enabled = v;
        }
        if let Some(v) = env.validation_policy {
            self.validation.policy = v;
        }
        if env.null_result_code.is_some() {
            self.defaults.null_result_code = env.null_result_code;
        }
        if env.undefined_result_code.is_some() {
            self.defaults.undefined_result_code = env.undefined_result_code;
        }
        if let Some(v) = env.param_required {
            self.defaults.param_required = v;
        }
        if let Some(v) = env.error_format {
            self.error_format = v;
        }
        if let Some(v) = env.expose_internal_errors {
            self.expose_internal_errors = v;
        }
        if let Some(v) = env.body_limit {
            self.body_limit = v;
        }
        if let Some(v) = env.transform_exclude {
            self.transform.exclude = v;
        }
        if let Some(v) = env.transform_exclude_prefixes {
            self.transform.exclude_prefixes = v;
        }
        self
    }

    pub fn route_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.route_prefix = Some(prefix.into());
        self
    }

    pub fn default_error_handler(mut self, enabled: bool) -> Self {
        self.default_error_handler = enabled;
        self
    }

    pub fn class_transformer(mut self, enabled: bool) -> Self {
        self.class_transformer = enabled;
        self
    }

    pub fn transform(mut self, transform: TransformOptions) -> Self {
        self.transform = transform;
        self
    }

    pub fn validation(mut self, enabled: bool) -> Self {
        self.validation.enabled = enabled;
        self
    }

    pub fn validation_policy(mut self, policy: ValidationPolicy) -> Self {
        self.validation.policy = policy;
        self
    }

    pub fn null_result_code(mut self, code: u16) -> Self {
        self.defaults.null_result_code = Some(code);
        self
    }

    pub fn undefined_result_code(mut self, code: u16) -> Self {
        self.defaults.undefined_result_code = Some(code);
        self
    }

    pub fn params_required_by_default(mut self, required: bool) -> Self {
        self.defaults.param_required = required;
        self
    }

    pub fn error_format(mut self, format: ErrorFormat) -> Self {
        self.error_format = format;
        self
    }

    pub fn expose_internal_errors(mut self, expose: bool) -> Self {
        self.expose_internal_errors = expose;
        self
    }

    pub fn body_limit(mut self, limit: usize) -> Self {
        self.body_limit = limit;
        self
    }
}

/// Load a `.env` file from the current directory, if there is one.
///
/// Variables already present in the environment win.
pub fn load_dotenv() {
    let _ = dotenvy::dotenv();
}

/// Load environment variables from a specific file.
pub fn load_dotenv_from<P: AsRef<std::path::Path>>(path: P) {
    let _ = dotenvy::from_path(path);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults() {
        let config = RoutingConfig::default();
        assert!(config.default_error_handler);
        assert!(config.class_transformer);
        assert!(!config.validation.enabled);
        assert!(!config.expose_internal_errors);
        assert_eq!(config.error_format, ErrorFormat::Text);
        assert_eq!(config.body_limit, DEFAULT_BODY_LIMIT);
    }

    #[test]
    fn environment_overrides() {
        let config = RoutingConfig::from_vars(vars(&[
            ("ROUTEKIT_ROUTE_PREFIX", "/api"),
            ("ROUTEKIT_DEFAULT_ERROR_HANDLER", "false"),
            ("ROUTEKIT_VALIDATION", "true"),
            ("ROUTEKIT_VALIDATION_POLICY", "attach"),
            ("ROUTEKIT_NULL_RESULT_CODE", "404"),
            ("ROUTEKIT_ERROR_FORMAT", "json"),
            ("ROUTEKIT_TRANSFORM_EXCLUDE", "password,secret"),
            ("UNRELATED", "ignored"),
        ]))
        .unwrap();

        assert_eq!(config.route_prefix.as_deref(), Some("/api"));
        assert!(!config.default_error_handler);
        assert!(config.validation.enabled);
        assert_eq!(config.validation.policy, ValidationPolicy::Attach);
        assert_eq!(config.defaults.null_result_code, Some(404));
        assert_eq!(config.error_format, ErrorFormat::Json);
        assert_eq!(config.transform.exclude, vec!["password", "secret"]);
        assert!(config.class_transformer);
    }

    #[test]
    fn invalid_environment_value() {
        let err = RoutingConfig::from_vars(vars(&[("ROUTEKIT_BODY_LIMIT", "lots")])).unwrap_err();
        assert!(err.to_string().starts_with("configuration error"));
    }

    #[test]
    fn deserializes_partial_documents() {
        let config: RoutingConfig = serde_json::from_str(
            r#"{"route_prefix": "/v1", "validation": {"enabled": true}, "defaults": {"undefined_result_code": 404}}"#,
        )
        .unwrap();
        assert_eq!(config.route_prefix.as_deref(), Some("/v1"));
        assert!(config.validation.enabled);
        assert_eq!(config.validation.policy, ValidationPolicy::Reject);
        assert_eq!(config.defaults.undefined_result_code, Some(404));
        assert!(config.default_error_handler);
    }

    #[test]
    fn setters_chain() {
        let config = RoutingConfig::new()
            .route_prefix("/api")
            .default_error_handler(false)
            .validation(true)
            .null_result_code(404)
            .body_limit(64);
        assert_eq!(config.route_prefix.as_deref(), Some("/api"));
        assert!(!config.default_error_handler);
        assert_eq!(config.body_limit, 64);
    }
}
