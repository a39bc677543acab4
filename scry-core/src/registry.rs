//! Ordered backend registry keyed by discriminator.
//!
//! Registries are built once at startup by an explicit builder function
//! and only read afterwards, so they need no locking. Registering a key
//! twice keeps both entries; lookups return the first one registered.

use crate::error::BackendError;

/// A registry mapping discriminators (engine names, hosts, schemes) to handlers.
#[derive(Debug, Clone)]
pub struct Registry<H> {
    kind: &'static str,
    entries: Vec<(String, H)>,
}

impl<H> Registry<H> {
    /// Creates an empty registry. `kind` names the discriminator in errors
    /// (e.g. `"engine"`, `"domain"`).
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            entries: Vec::new(),
        }
    }

    /// Appends a handler under `key`.
    pub fn register(&mut self, key: impl Into<String>, handler: H) -> &mut Self {
        let key = key.into();
        tracing::trace!(kind = self.kind, key = %key, "handler registered");
        self.entries.push((key, handler));
        self
    }

    /// Registers the same handler under several keys.
    pub fn register_all<K>(&mut self, keys: &[K], handler: H) -> &mut Self
    where
        K: AsRef<str>,
        H: Clone,
    {
        for key in keys {
            self.register(key.as_ref(), handler.clone());
        }
        self
    }

    /// Number of registered entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registered keys in registration order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// Handlers in registration order.
    pub fn handlers(&self) -> impl Iterator<Item = &H> {
        self.entries.iter().map(|(_, h)| h)
    }

    /// First handler registered under exactly `key`.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::NotImplemented`] if no handler has that key.
    pub fn find(&self, key: &str) -> Result<&H, BackendError> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, h)| h)
            .ok_or_else(|| BackendError::NotImplemented(format!("no {} handler for {key}", self.kind)))
    }

    /// Selects and prepares handlers.
    ///
    /// - `None`: every handler, in registration order; handlers whose
    ///   `prepare` returns `None` (disabled) are skipped.
    /// - `Some(key)`: the handler registered under `key`, which must prepare
    ///   successfully.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::NotImplemented`] when `key` is unknown or
    /// its handler is disabled. Never returns an empty list for a key.
    pub fn resolve<T, F>(&self, key: Option<&str>, mut prepare: F) -> Result<Vec<T>, BackendError>
    where
        F: FnMut(&H) -> Option<T>,
    {
        match key {
            None => Ok(self.handlers().filter_map(&mut prepare).collect()),
            Some(key) => {
                let handler = self.find(key)?;
                prepare(handler).map(|t| vec![t]).ok_or_else(|| {
                    BackendError::NotImplemented(format!("{} {key} is disabled", self.kind))
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> Registry<&'static str> {
        let mut r = Registry::new("engine");
        r.register("iqdb", "iqdb-handler")
            .register("saucenao", "saucenao-handler")
            .register("tracemoe", "tracemoe-handler");
        r
    }

    #[test]
    fn find_exact_key() {
        assert_eq!(registry().find("saucenao"), Ok(&"saucenao-handler"));
    }

    #[test]
    fn find_unknown_key_is_not_implemented() {
        let err = registry().find("bing").unwrap_err();
        assert!(err.is_not_implemented());
        assert!(err.to_string().contains("engine"));
    }

    #[test]
    fn duplicate_key_first_registered_wins() {
        let mut r = Registry::new("domain");
        r.register("x.com", 1).register("x.com", 2);
        assert_eq!(r.len(), 2);
        assert_eq!(r.find("x.com"), Ok(&1));
    }

    #[test]
    fn resolve_all_preserves_order_and_skips_disabled() {
        let prepared = registry()
            .resolve(None, |h| (*h != "saucenao-handler").then(|| h.to_uppercase()))
            .expect("resolve");
        assert_eq!(prepared, vec!["IQDB-HANDLER", "TRACEMOE-HANDLER"]);
    }

    #[test]
    fn resolve_named_returns_single() {
        let prepared = registry()
            .resolve(Some("tracemoe"), |h| Some(*h))
            .expect("resolve");
        assert_eq!(prepared, vec!["tracemoe-handler"]);
    }

    #[test]
    fn resolve_named_disabled_is_not_implemented() {
        let err = registry()
            .resolve(Some("iqdb"), |_| None::<()>)
            .unwrap_err();
        assert!(err.is_not_implemented());
    }

    #[test]
    fn resolve_unknown_never_returns_empty() {
        let result = registry().resolve(Some("yandex"), |h| Some(*h));
        assert!(matches!(result, Err(BackendError::NotImplemented(_))));
    }

    #[test]
    fn register_all_shares_handler() {
        let mut r = Registry::new("domain");
        r.register_all(&["bilibili.com", "www.bilibili.com"], "video");
        assert_eq!(r.keys().collect::<Vec<_>>(), vec!["bilibili.com", "www.bilibili.com"]);
        assert_eq!(r.find("www.bilibili.com"), Ok(&"video"));
    }
}
