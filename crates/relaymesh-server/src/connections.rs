//! `settings.connections.<kind>.<name>` (§C.3): preconfigured connection
//! strings, resolved by handlers through the DI container rather than a
//! raw `HashMap` lookup, to stay consistent with the rest of the DI
//! story (§4.3).

use std::collections::HashMap;

/// A generic-singleton-shaped lookup of connection strings grouped by
/// kind (e.g. `"db"`, `"cache"`) and name (e.g. `"primary"`). Registered
/// into the container as a singleton; handlers resolve it and call
/// [`ConnectionStrings::get`] themselves, since the (kind, name) pair is
/// only known at the call site, not at the handler's DI-declaration
/// time.
#[derive(Debug, Clone, Default)]
pub struct ConnectionStrings {
    by_kind: HashMap<String, HashMap<String, String>>,
}

impl ConnectionStrings {
    #[must_use]
    pub fn new(by_kind: HashMap<String, HashMap<String, String>>) -> Self {
        Self { by_kind }
    }

    #[must_use]
    pub fn get(&self, kind: &str, name: &str) -> Option<&str> {
        self.by_kind.get(kind)?.get(name).map(String::as_str)
    }

    #[must_use]
    pub fn kind(&self, kind: &str) -> Option<&HashMap<String, String>> {
        self.by_kind.get(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn looks_up_by_kind_and_name() {
        let mut by_kind = HashMap::new();
        by_kind.insert(
            "db".to_string(),
            HashMap::from([("primary".to_string(), "postgres://primary".to_string())]),
        );
        let connections = ConnectionStrings::new(by_kind);
        assert_eq!(connections.get("db", "primary"), Some("postgres://primary"));
        assert_eq!(connections.get("db", "missing"), None);
        assert_eq!(connections.get("cache", "primary"), None);
    }
}
