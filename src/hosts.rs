//! Host extraction from router match expressions.

use regex::Regex;
use std::sync::OnceLock;

/// Pulls the literal host names out of a router's match expression.
pub trait HostExtractor: Send + Sync {
    /// Return every host the expression governs, lower-cased. Expressions
    /// that do not match yield an empty list.
    fn extract_hosts(&self, expr: &str) -> Vec<String>;
}

static HOST_RULE_REGEX: OnceLock<Regex> = OnceLock::new();

fn host_rule_regex() -> &'static Regex {
    HOST_RULE_REGEX
        .get_or_init(|| Regex::new(r"Host(?:SNI)?\(`([^`]+)`\)").expect("Host rule regex is valid"))
}

/// Extractor for Traefik's ``Host(`…`)`` and ``HostSNI(`…`)`` matchers.
#[derive(Debug, Clone, Copy, Default)]
pub struct TraefikRuleMatcher;

impl HostExtractor for TraefikRuleMatcher {
    fn extract_hosts(&self, expr: &str) -> Vec<String> {
        host_rule_regex()
            .captures_iter(expr)
            .filter_map(|caps| caps.get(1))
            .map(|m| m.as_str().to_ascii_lowercase())
            .collect()
    }
}
