//! The context-type detector (§4.4, §C.2): decides which `ContextKind`
//! an incoming HTTP message is dispatched as. Only HTTP messages are
//! ambiguous — WebSocket, TCP, and AMQP messages carry their Context
//! variant by construction (they arrive on transport-specific
//! listeners) and never consult this detector.

use std::collections::HashSet;

use relaymesh_core::ContextKind;

/// One compiled glob segment. `*` matches exactly one path segment;
/// `**` matches the remainder (must be the final segment), mirroring
/// `relaymesh_core::predicate::UrlPredicate`'s `:name`/`:*name` capture
/// syntax but without naming captures, since router patterns only
/// select a Context variant and never bind URL segments.
#[derive(Debug, Clone)]
enum GlobSegment {
    Literal(String),
    Single,
    Greedy,
}

/// A compiled router pattern (§4.4, §C.2). The literal pattern `"*"`
/// (no slashes) short-circuits to "matches any URL", the Rust-idiomatic
/// reading of `context_factory.py`'s wildcard-key handling for the
/// "this context type handles everything else" case.
#[derive(Debug, Clone)]
pub struct GlobPattern {
    raw: String,
    segments: Vec<GlobSegment>,
}

impl GlobPattern {
    #[must_use]
    pub fn compile(pattern: &str) -> Self {
        let segments = pattern
            .trim_matches('/')
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|raw| match raw {
                "**" => GlobSegment::Greedy,
                "*" => GlobSegment::Single,
                literal => GlobSegment::Literal(literal.to_string()),
            })
            .collect();
        Self {
            raw: pattern.to_string(),
            segments,
        }
    }

    #[must_use]
    pub fn matches(&self, url: &str) -> bool {
        if self.raw.trim_matches('/') == "*" {
            return true;
        }
        let parts: Vec<&str> = url.trim_matches('/').split('/').filter(|s| !s.is_empty()).collect();
        let mut parts_iter = parts.iter();
        for segment in &self.segments {
            match segment {
                GlobSegment::Greedy => return true,
                GlobSegment::Single => {
                    if parts_iter.next().is_none() {
                        return false;
                    }
                }
                GlobSegment::Literal(literal) => match parts_iter.next() {
                    Some(part) if part.eq_ignore_ascii_case(literal) => {}
                    _ => return false,
                },
            }
        }
        parts_iter.next().is_none()
    }
}

/// The resolved router configuration a [`ContextDetector`] consults.
#[derive(Debug, Clone)]
pub enum RouterConfig {
    /// Every HTTP message resolves to this variant, regardless of URL.
    Single(ContextKind),
    /// Scan `(variant, patterns)` pairs in order; first pattern match
    /// wins. Order here is registration/declaration order and must be
    /// preserved by the caller (§4.4's "scans patterns in order").
    PatternMap(Vec<(ContextKind, Vec<GlobPattern>)>),
    /// Auto-generated from handler registrations' declared URL patterns
    /// (§4.4's default case).
    Auto,
}

/// Selects which `ContextKind` an HTTP message is dispatched as.
/// Built once at `Host`/`Dispatcher` startup, before the first message
/// is processed (§4.4).
pub struct ContextDetector {
    config: RouterConfig,
    auto_routes: Vec<(ContextKind, GlobPattern)>,
}

impl ContextDetector {
    #[must_use]
    pub fn new(config: RouterConfig) -> Self {
        Self {
            config,
            auto_routes: Vec::new(),
        }
    }

    /// Feed one HTTP-capable registration's declared URL pattern into
    /// the auto-detector. No-op when `config` isn't `RouterConfig::Auto`.
    pub(crate) fn observe(&mut self, kind: ContextKind, pattern: &str) {
        if matches!(self.config, RouterConfig::Auto) {
            self.auto_routes.push((kind, GlobPattern::compile(pattern)));
        }
    }

    /// Resolve the Context variant for an incoming HTTP URL, per §4.4's
    /// three-way policy. Returns `None` for an unmatched URL under
    /// `PatternMap`/`Auto` with more than one variant registered; the
    /// dispatcher turns that into a 404-equivalent error.
    #[must_use]
    pub fn detect(&self, url: &str) -> Option<ContextKind> {
        match &self.config {
            RouterConfig::Single(kind) => Some(*kind),
            RouterConfig::PatternMap(map) => map
                .iter()
                .find(|(_, patterns)| patterns.iter().any(|p| p.matches(url)))
                .map(|(kind, _)| *kind),
            RouterConfig::Auto => {
                let distinct: HashSet<ContextKind> = self.auto_routes.iter().map(|(kind, _)| *kind).collect();
                if distinct.len() <= 1 {
                    return distinct.into_iter().next();
                }
                self.auto_routes
                    .iter()
                    .find(|(_, pattern)| pattern.matches(url))
                    .map(|(kind, _)| *kind)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob_pattern_matches_literal_and_single_wildcard() {
        let pattern = GlobPattern::compile("/api/*/widgets");
        assert!(pattern.matches("/api/v1/widgets"));
        assert!(!pattern.matches("/api/v1/v2/widgets"));
        assert!(!pattern.matches("/api/widgets"));
    }

    #[test]
    fn glob_pattern_star_alone_matches_everything() {
        let pattern = GlobPattern::compile("*");
        assert!(pattern.matches("/anything/at/all"));
        assert!(pattern.matches("/"));
    }

    #[test]
    fn glob_pattern_greedy_matches_remainder() {
        let pattern = GlobPattern::compile("/assets/**");
        assert!(pattern.matches("/assets/css/site.css"));
        assert!(!pattern.matches("/other/css/site.css"));
    }

    #[test]
    fn single_router_config_ignores_url() {
        let detector = ContextDetector::new(RouterConfig::Single(ContextKind::HttpRest));
        assert_eq!(detector.detect("/whatever"), Some(ContextKind::HttpRest));
    }

    #[test]
    fn pattern_map_scans_in_order() {
        let config = RouterConfig::PatternMap(vec![
            (ContextKind::HttpRest, vec![GlobPattern::compile("/api/*")]),
            (ContextKind::HttpWeb, vec![GlobPattern::compile("*")]),
        ]);
        let detector = ContextDetector::new(config);
        assert_eq!(detector.detect("/api/widgets"), Some(ContextKind::HttpRest));
        assert_eq!(detector.detect("/index.html"), Some(ContextKind::HttpWeb));
    }

    #[test]
    fn auto_detector_resolves_single_variant_unconditionally() {
        let mut detector = ContextDetector::new(RouterConfig::Auto);
        detector.observe(ContextKind::HttpRest, "/users/*");
        assert_eq!(detector.detect("/totally/unrelated"), Some(ContextKind::HttpRest));
    }

    #[test]
    fn auto_detector_scans_multiple_variants_in_observation_order() {
        let mut detector = ContextDetector::new(RouterConfig::Auto);
        detector.observe(ContextKind::HttpRest, "/api/*");
        detector.observe(ContextKind::HttpWeb, "*");
        assert_eq!(detector.detect("/api/widgets"), Some(ContextKind::HttpRest));
        assert_eq!(detector.detect("/index.html"), Some(ContextKind::HttpWeb));
    }
}
