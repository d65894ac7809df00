//! The CMS object: a nested, string-keyed map carrying request metadata
//! and body across every transport. Every listener produces one; every
//! predicate and handler reads from it.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

/// Canonical top-level keys a listener populates before handing a
/// message to the dispatcher. Handlers are free to read arbitrary keys;
/// these are the ones every transport agrees to fill in.
pub mod keys {
    pub const REQUEST: &str = "request";
    pub const HEADERS: &str = "headers";
    pub const COOKIE: &str = "cookie";
    pub const FORM: &str = "form";
    pub const BODY: &str = "body";
    pub const CMS: &str = "cms";
}

/// Request-line metadata assembled by a listener into the `request` key.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct RequestInfo {
    pub method: String,
    pub url: String,
    pub raw_url: String,
    pub path: String,
    #[serde(default)]
    pub query: HashMap<String, Vec<String>>,
    pub client_ip: Option<String>,
    pub request_id: String,
    pub host: Option<String>,
    pub port: Option<u16>,
}

/// Server-assigned timestamps, stamped into the `cms` key. `received_at`
/// is stamped by the listener on arrival; `completed_at` is stamped by
/// the dispatcher once the handler returns, so it is absent while a
/// request is still in flight.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct CmsTimestamps {
    pub received_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// The nested cross-transport payload. Backed by a `serde_json::Map` so
/// arbitrary listener- or handler-defined keys round-trip without a
/// schema, while the well-known keys get typed accessors.
#[derive(Debug, Clone, Default)]
pub struct CmsObject {
    inner: Map<String, Value>,
}

impl CmsObject {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new object with `request` populated and `cms.received_at`
    /// stamped to now, as every listener does on arrival.
    #[must_use]
    pub fn for_request(request: RequestInfo, now: DateTime<Utc>) -> Self {
        let mut cms = Self::new();
        cms.set(keys::REQUEST, serde_json::to_value(request).unwrap_or(Value::Null));
        cms.set(
            keys::CMS,
            serde_json::to_value(CmsTimestamps {
                received_at: Some(now),
                completed_at: None,
            })
            .unwrap_or(Value::Null),
        );
        cms
    }

    /// Stamp `cms.completed_at`, called by the dispatcher once the
    /// handler has returned.
    pub fn mark_completed(&mut self, now: DateTime<Utc>) {
        let mut timestamps = self.timestamps();
        timestamps.completed_at = Some(now);
        self.set(keys::CMS, serde_json::to_value(timestamps).unwrap_or(Value::Null));
    }

    #[must_use]
    pub fn timestamps(&self) -> CmsTimestamps {
        self.inner
            .get(keys::CMS)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn request(&self) -> Option<RequestInfo> {
        self.inner.get(keys::REQUEST).and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Set a top-level key.
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.inner.insert(key.into(), value);
    }

    /// Read a top-level key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.inner.get(key)
    }

    /// Resolve a dotted path (`"request.method"`) against the object,
    /// used by the `equal`/`in_list` predicates.
    #[must_use]
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut current = self.inner.get(path.split('.').next()?)?;
        for segment in path.split('.').skip(1) {
            current = current.get(segment)?;
        }
        Some(current)
    }

    #[must_use]
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.inner
    }

    #[must_use]
    pub fn into_value(self) -> Value {
        Value::Object(self.inner)
    }

    #[must_use]
    pub fn as_value(&self) -> Value {
        Value::Object(self.inner.clone())
    }
}

impl From<CmsObject> for Value {
    fn from(cms: CmsObject) -> Self {
        cms.into_value()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dotted_path_resolves_nested_fields() {
        let mut cms = CmsObject::new();
        cms.set(
            keys::REQUEST,
            serde_json::json!({"method": "GET", "path": "/users/42"}),
        );
        assert_eq!(cms.get_path("request.method").unwrap(), "GET");
        assert_eq!(cms.get_path("request.path").unwrap(), "/users/42");
        assert!(cms.get_path("request.missing").is_none());
        assert!(cms.get_path("missing.nested").is_none());
    }

    #[test]
    fn timestamps_round_trip() {
        let now = Utc::now();
        let mut cms = CmsObject::for_request(RequestInfo::default(), now);
        assert_eq!(cms.timestamps().received_at, Some(now));
        assert!(cms.timestamps().completed_at.is_none());

        let later = now + chrono::Duration::milliseconds(5);
        cms.mark_completed(later);
        assert_eq!(cms.timestamps().completed_at, Some(later));
        assert_eq!(cms.timestamps().received_at, Some(now));
    }
}
