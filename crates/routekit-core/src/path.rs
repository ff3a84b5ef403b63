//! Route path utilities
//!
//! Action routes are joined from three parts (global prefix, controller base,
//! action path) and may spell placeholders either as `:name` or `{name}`.
//! Placeholders are kept verbatim in the final path; they are only rewritten
//! into the matcher syntax when the matcher is built.

use std::fmt;

/// Route path syntax error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    /// Path must start with '/'
    MustStartWithSlash { path: String },
    /// Nested or unclosed braces
    UnbalancedBraces { path: String, position: usize },
    /// `{}` or a bare `:`
    EmptyParameterName { path: String, position: usize },
    /// Parameter names are identifiers
    InvalidParameterName {
        path: String,
        name: String,
        position: usize,
    },
    /// Placeholders must span a whole segment
    PartialSegment { path: String, position: usize },
    /// Only the last segment may be a `*` wildcard
    MisplacedWildcard { path: String, position: usize },
    InvalidCharacter {
        path: String,
        character: char,
        position: usize,
    },
}

impl fmt::Display for PathError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathError::MustStartWithSlash { path } => {
                write!(f, "route path must start with '/', got \"{}\"", path)
            }
            PathError::UnbalancedBraces { path, position } => {
                write!(f, "unbalanced brace at position {} in \"{}\"", position, path)
            }
            PathError::EmptyParameterName { path, position } => {
                write!(f, "empty parameter name at position {} in \"{}\"", position, path)
            }
            PathError::InvalidParameterName {
                path,
                name,
                position,
            } => write!(
                f,
                "invalid parameter name '{}' at position {} in \"{}\"; names must be identifiers",
                name, position, path
            ),
            PathError::PartialSegment { path, position } => write!(
                f,
                "placeholder at position {} must span the whole segment in \"{}\"",
                position, path
            ),
            PathError::MisplacedWildcard { path, position } => write!(
                f,
                "wildcard at position {} must be the last segment in \"{}\"",
                position, path
            ),
            PathError::InvalidCharacter {
                path,
                character,
                position,
            } => write!(
                f,
                "invalid character '{}' at position {} in \"{}\"",
                character, position, path
            ),
        }
    }
}

impl std::error::Error for PathError {}

/// A parsed route segment
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment<'a> {
    Static(&'a str),
    Param(&'a str),
    Wildcard(&'a str),
}

/// Join route parts, collapsing duplicate slashes and dropping the trailing one.
///
/// ```
/// use routekit_core::path::join_route;
///
/// assert_eq!(join_route(&["/api/", "/blogs/", ":id"]), "/api/blogs/:id");
/// assert_eq!(join_route(&["", "/"]), "/");
/// ```
pub fn join_route(parts: &[&str]) -> String {
    let mut result = String::new();
    for part in parts {
        for segment in part.split('/').filter(|s| !s.is_empty()) {
            result.push('/');
            result.push_str(segment);
        }
    }
    if result.is_empty() {
        result.push('/');
    }
    result
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_')
}

fn parse(path: &str) -> Result<Vec<Segment<'_>>, PathError> {
    if !path.starts_with('/') {
        return Err(PathError::MustStartWithSlash {
            path: path.to_string(),
        });
    }

    let mut segments = Vec::new();
    let mut offset = 1;
    let raw_segments: Vec<&str> = path[1..].split('/').collect();
    let last = raw_segments.len().saturating_sub(1);

    for (i, raw) in raw_segments.iter().enumerate() {
        let position = offset;
        offset += raw.len() + 1;
        if raw.is_empty() {
            continue;
        }

        let segment = if let Some(rest) = raw.strip_prefix('{') {
            let name = rest.strip_suffix('}').ok_or(PathError::UnbalancedBraces {
                path: path.to_string(),
                position,
            })?;
            if name.contains('{') || name.contains('}') {
                return Err(PathError::UnbalancedBraces {
                    path: path.to_string(),
                    position,
                });
            }
            Segment::Param(name)
        } else if let Some(name) = raw.strip_prefix(':') {
            Segment::Param(name)
        } else if let Some(name) = raw.strip_prefix('*') {
            if i != last {
                return Err(PathError::MisplacedWildcard {
                    path: path.to_string(),
                    position,
                });
            }
            Segment::Wildcard(name)
        } else {
            if let Some((index, ch)) = raw
                .char_indices()
                .find(|(_, c)| !c.is_alphanumeric() && !"-_.~@+".contains(*c))
            {
                return Err(match ch {
                    '{' | '}' | ':' | '*' => PathError::PartialSegment {
                        path: path.to_string(),
                        position: position + index,
                    },
                    _ => PathError::InvalidCharacter {
                        path: path.to_string(),
                        character: ch,
                        position: position + index,
                    },
                });
            }
            Segment::Static(raw)
        };

        if let Segment::Param(name) | Segment::Wildcard(name) = segment {
            if name.is_empty() {
                return Err(PathError::EmptyParameterName {
                    path: path.to_string(),
                    position,
                });
            }
            if !is_identifier(name) {
                return Err(PathError::InvalidParameterName {
                    path: path.to_string(),
                    name: name.to_string(),
                    position,
                });
            }
        }
        segments.push(segment);
    }

    Ok(segments)
}

/// Validate route syntax.
pub fn validate_route(path: &str) -> Result<(), PathError> {
    parse(path).map(|_| ())
}

/// Names of the placeholders in a route, in order of appearance.
pub fn placeholders(path: &str) -> Result<Vec<String>, PathError> {
    Ok(parse(path)?
        .into_iter()
        .filter_map(|segment| match segment {
            Segment::Param(name) | Segment::Wildcard(name) => Some(name.to_string()),
            Segment::Static(_) => None,
        })
        .collect())
}

/// Rewrite placeholders into matcher syntax (`{id}` → `:id`).
pub(crate) fn to_matcher_syntax(path: &str) -> Result<String, PathError> {
    let segments = parse(path)?;
    if segments.is_empty() {
        return Ok("/".to_string());
    }
    let mut result = String::with_capacity(path.len());
    for segment in segments {
        result.push('/');
        match segment {
            Segment::Static(s) => result.push_str(s),
            Segment::Param(name) => {
                result.push(':');
                result.push_str(name);
            }
            Segment::Wildcard(name) => {
                result.push('*');
                result.push_str(name);
            }
        }
    }
    Ok(result)
}

/// Shape of a route with placeholder names erased, used for conflict checks:
/// `/users/:id` and `/users/{user_id}` have the same shape.
pub(crate) fn route_shape(path: &str) -> Result<String, PathError> {
    let segments = parse(path)?;
    if segments.is_empty() {
        return Ok("/".to_string());
    }
    let mut result = String::with_capacity(path.len());
    for segment in segments {
        result.push('/');
        match segment {
            Segment::Static(s) => result.push_str(s),
            Segment::Param(_) => result.push(':'),
            Segment::Wildcard(_) => result.push('*'),
        }
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn join_collapses_and_trims() {
        assert_eq!(join_route(&["/api", "/blogs"]), "/api/blogs");
        assert_eq!(join_route(&["/api/", "//blogs//", "/:id/"]), "/api/blogs/:id");
        assert_eq!(join_route(&["", "", ""]), "/");
        assert_eq!(join_route(&["/", "/videos"]), "/videos");
    }

    #[test]
    fn both_placeholder_styles() {
        assert_eq!(
            placeholders("/users/:user_id/posts/{post_id}").unwrap(),
            vec!["user_id", "post_id"]
        );
        assert_eq!(
            to_matcher_syntax("/users/{id}/files/*rest").unwrap(),
            "/users/:id/files/*rest"
        );
        assert_eq!(
            route_shape("/users/{id}").unwrap(),
            route_shape("/users/:uid").unwrap()
        );
    }

    #[test]
    fn invalid_routes() {
        assert!(matches!(
            validate_route("users"),
            Err(PathError::MustStartWithSlash { .. })
        ));
        assert!(matches!(
            validate_route("/users/{id"),
            Err(PathError::UnbalancedBraces { .. })
        ));
        assert!(matches!(
            validate_route("/users/{}"),
            Err(PathError::EmptyParameterName { .. })
        ));
        assert!(matches!(
            validate_route("/users/:1d"),
            Err(PathError::InvalidParameterName { .. })
        ));
        assert!(matches!(
            validate_route("/users/id{x}"),
            Err(PathError::PartialSegment { .. })
        ));
        assert!(matches!(
            validate_route("/files/*rest/more"),
            Err(PathError::MisplacedWildcard { .. })
        ));
        assert!(matches!(
            validate_route("/a b"),
            Err(PathError::InvalidCharacter { character: ' ', .. })
        ));
    }

    #[test]
    fn valid_routes() {
        for path in ["/", "/blogs", "/blogs/:id", "/v1.2/items/{item_id}", "/static/*path"] {
            assert!(validate_route(path).is_ok(), "{}", path);
        }
    }

    proptest! {
        #[test]
        fn prop_join_is_normalized(parts in prop::collection::vec("[a-z/]{0,8}", 0..5)) {
            let refs: Vec<&str> = parts.iter().map(String::as_str).collect();
            let joined = join_route(&refs);
            prop_assert!(joined.starts_with('/'));
            prop_assert!(!joined.contains("//"));
            prop_assert!(joined == "/" || !joined.ends_with('/'));
            prop_assert_eq!(join_route(&[joined.as_str()]), joined.clone());
        }
    }
}
