//! Link extraction from free text.
//!
//! Each preview backend contributes one or more patterns describing the
//! links it understands. Patterns are kept in registration order; a
//! pattern registered twice is stored once.

use regex::Regex;

use crate::error::BackendError;

/// Ordered set of compiled link patterns.
#[derive(Debug, Clone, Default)]
pub struct LinkPatterns {
    patterns: Vec<Regex>,
}

impl LinkPatterns {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a compiled pattern unless an identical one is already present.
    pub fn register(&mut self, pattern: Regex) -> &mut Self {
        if !self.patterns.iter().any(|p| p.as_str() == pattern.as_str()) {
            self.patterns.push(pattern);
        }
        self
    }

    /// Compiles and adds a pattern.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Config`] if `pattern` is not a valid regex.
    pub fn register_str(&mut self, pattern: &str) -> Result<&mut Self, BackendError> {
        let re = Regex::new(pattern)
            .map_err(|e| BackendError::Config(format!("invalid link pattern {pattern}: {e}")))?;
        Ok(self.register(re))
    }

    /// Number of distinct patterns.
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// Returns `true` if no pattern is registered.
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Whether any pattern matches at the start of `link`.
    pub fn can_preview(&self, link: &str) -> bool {
        self.patterns
            .iter()
            .any(|p| p.find(link).is_some_and(|m| m.start() == 0))
    }

    /// Every candidate link in `text`.
    ///
    /// For each pattern in registration order, all non-overlapping matches
    /// are collected. When a pattern has a capture group, the first group is
    /// returned instead of the whole match. Results are not de-duplicated.
    pub fn extract(&self, text: &str) -> Vec<String> {
        let mut links = Vec::new();
        for pattern in &self.patterns {
            for caps in pattern.captures_iter(text) {
                let m = caps.get(1).or_else(|| caps.get(0));
                if let Some(m) = m {
                    links.push(m.as_str().to_owned());
                }
            }
        }
        links
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patterns() -> LinkPatterns {
        let mut p = LinkPatterns::new();
        p.register_str(r"((?:https?://)?e621\.net/posts/\d+)")
            .expect("valid")
            .register_str(r"(?:https?://)?(bsky\.app/profile/[^/]+/post/[^/\s]+)")
            .expect("valid");
        p
    }

    #[test]
    fn duplicate_pattern_stored_once() {
        let mut p = patterns();
        p.register_str(r"((?:https?://)?e621\.net/posts/\d+)").expect("valid");
        assert_eq!(p.len(), 2);
    }

    #[test]
    fn invalid_pattern_is_config_error() {
        let mut p = LinkPatterns::new();
        let err = p.register_str("(unclosed").unwrap_err();
        assert!(matches!(err, BackendError::Config(_)));
    }

    #[test]
    fn can_preview_anchors_at_start() {
        let p = patterns();
        assert!(p.can_preview("https://e621.net/posts/123"));
        assert!(p.can_preview("e621.net/posts/123"));
        assert!(!p.can_preview("see https://e621.net/posts/123"));
        assert!(!p.can_preview("https://example.com"));
    }

    #[test]
    fn extract_uses_first_group() {
        let p = patterns();
        let links = p.extract("look https://bsky.app/profile/alice.test/post/3k2 now");
        assert_eq!(links, vec!["bsky.app/profile/alice.test/post/3k2"]);
    }

    #[test]
    fn extract_orders_by_pattern_then_position() {
        let p = patterns();
        let text = "bsky.app/profile/a/post/1 e621.net/posts/2 https://e621.net/posts/3";
        let links = p.extract(text);
        assert_eq!(
            links,
            vec![
                "e621.net/posts/2",
                "https://e621.net/posts/3",
                "bsky.app/profile/a/post/1",
            ]
        );
    }

    #[test]
    fn extract_keeps_duplicates() {
        let p = patterns();
        let links = p.extract("e621.net/posts/9 e621.net/posts/9");
        assert_eq!(links.len(), 2);
    }

    #[test]
    fn extract_without_matches_is_empty() {
        assert!(patterns().extract("nothing to see here").is_empty());
        assert!(LinkPatterns::new().extract("e621.net/posts/1").is_empty());
    }
}
