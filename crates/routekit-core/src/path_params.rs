//! Captured route parameters
//!
//! Most routes capture one to four placeholders, so values are kept inline
//! in a `SmallVec` and only spill to the heap for longer routes.

use serde_json::{Map, Value};
use smallvec::SmallVec;

/// Number of captures stored without heap allocation.
pub const INLINE_PARAMS: usize = 4;

/// Route parameters captured by the matcher, in route order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteParams {
    inner: SmallVec<[(String, String); INLINE_PARAMS]>,
}

impl RouteParams {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a capture. A later capture with the same name shadows the earlier one.
    #[inline]
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.inner.iter_mut().find(|(k, _)| *k == name) {
            Some(slot) => slot.1 = value,
            None => self.inner.push((name, value)),
        }
    }

    #[inline]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.inner
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inner.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// All captures as a JSON object of strings.
    pub fn to_json(&self) -> Value {
        Value::Object(
            self.inner
                .iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect::<Map<_, _>>(),
        )
    }
}

impl<K, V> FromIterator<(K, V)> for RouteParams
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Self::new();
        for (k, v) in iter {
            params.insert(k, v);
        }
        params
    }
}

impl<'k, 'v> From<matchit::Params<'k, 'v>> for RouteParams {
    fn from(params: matchit::Params<'k, 'v>) -> Self {
        params.iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn stays_inline_for_short_routes() {
        let params: RouteParams = [("a", "1"), ("b", "2"), ("c", "3")].into_iter().collect();
        assert_eq!(params.len(), 3);
        assert!(!params.inner.spilled());
        assert_eq!(params.get("b"), Some("2"));
        assert_eq!(params.get("z"), None);
    }

    #[test]
    fn later_capture_shadows() {
        let mut params = RouteParams::new();
        params.insert("id", "1");
        params.insert("id", "2");
        assert_eq!(params.len(), 1);
        assert_eq!(params.get("id"), Some("2"));
    }

    #[test]
    fn json_view() {
        let params: RouteParams = [("id", "42")].into_iter().collect();
        assert_eq!(params.to_json(), json!({"id": "42"}));
    }
}
