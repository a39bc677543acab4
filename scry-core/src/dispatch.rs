//! Domain-then-scheme dispatch for links.
//!
//! A link is first routed by its host (`e621.net`, `bsky.app`). When no
//! domain handler exists the lookup is retried by scheme (`at`, `https`).
//! Links without a scheme are treated as `https://` links.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::BackendError;
use crate::registry::Registry;

/// A link split into the parts dispatch needs.
///
/// Parsing is deliberately lenient: authorities such as `did:plc:abc` in
/// `at://` URIs are kept whole instead of being rejected as bad ports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    raw: String,
    scheme: String,
    host: String,
}

/// A scheme prefix at the very start of a link (RFC 3986 scheme syntax).
fn scheme_prefix() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z][A-Za-z0-9+.\-]*://").expect("scheme pattern must compile")
    })
}

impl Link {
    /// Parses `input`, prepending `https://` when it has no scheme.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::InvalidInput`] when no scheme or host can be
    /// extracted.
    pub fn parse(input: &str) -> Result<Self, BackendError> {
        let input = input.trim();
        // Only a leading scheme counts; `://` inside a query string does not.
        let raw = if scheme_prefix().is_match(input) {
            input.to_owned()
        } else {
            format!("https://{input}")
        };

        let Some((scheme, rest)) = raw.split_once("://") else {
            return Err(BackendError::InvalidInput(format!("no scheme in {input}")));
        };

        let authority = rest
            .split(['/', '?', '#'])
            .next()
            .unwrap_or_default();
        let host = authority.rsplit_once('@').map_or(authority, |(_, h)| h);
        let host = match host.rsplit_once(':') {
            Some((h, port)) if !port.is_empty() && port.chars().all(|c| c.is_ascii_digit()) => h,
            _ => host,
        };
        if host.is_empty() {
            return Err(BackendError::InvalidInput(format!("no host in {input}")));
        }
        if host.chars().any(char::is_whitespace) {
            return Err(BackendError::InvalidInput(format!("invalid host in {input}")));
        }

        Ok(Self {
            scheme: scheme.to_ascii_lowercase(),
            host: host.to_ascii_lowercase(),
            raw,
        })
    }

    /// The full link, always including a scheme.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Lower-cased scheme.
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Lower-cased host, without user info or port.
    pub fn host(&self) -> &str {
        &self.host
    }
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Which strategy selected the handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Matched by host.
    Domain,
    /// Matched by scheme after the host lookup failed.
    Scheme,
}

/// A handler selected for a link.
#[derive(Debug)]
pub struct Resolved<'a, H> {
    /// The handler to prepare a task with.
    pub handler: &'a H,
    /// The parsed link.
    pub link: Link,
    /// How the handler was found.
    pub route: Route,
}

/// Two registries consulted in order: domains, then schemes.
#[derive(Debug, Clone)]
pub struct LinkDispatcher<H> {
    domains: Registry<H>,
    schemes: Registry<H>,
}

impl<H> Default for LinkDispatcher<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> LinkDispatcher<H> {
    /// Creates a dispatcher with no handlers.
    pub fn new() -> Self {
        Self {
            domains: Registry::new("domain"),
            schemes: Registry::new("scheme"),
        }
    }

    /// Registers a handler for an exact host.
    pub fn register_domain(&mut self, domain: &str, handler: H) -> &mut Self {
        self.domains.register(domain.to_ascii_lowercase(), handler);
        self
    }

    /// Registers a handler for a scheme.
    pub fn register_scheme(&mut self, scheme: &str, handler: H) -> &mut Self {
        self.schemes.register(scheme.to_ascii_lowercase(), handler);
        self
    }

    /// Domain registry.
    pub fn domains(&self) -> &Registry<H> {
        &self.domains
    }

    /// Scheme registry.
    pub fn schemes(&self) -> &Registry<H> {
        &self.schemes
    }

    /// Selects the handler for `input`.
    ///
    /// # Errors
    ///
    /// - [`BackendError::InvalidInput`] if `input` has no host.
    /// - [`BackendError::NotImplemented`] if neither a domain nor a scheme
    ///   handler is registered.
    pub fn resolve(&self, input: &str) -> Result<Resolved<'_, H>, BackendError> {
        let link = Link::parse(input)?;

        match self.domains.find(link.host()) {
            Ok(handler) => {
                tracing::debug!(host = link.host(), "link dispatched by domain");
                return Ok(Resolved {
                    handler,
                    link,
                    route: Route::Domain,
                });
            }
            Err(e) if e.is_not_implemented() => {}
            Err(e) => return Err(e),
        }

        match self.schemes.find(link.scheme()) {
            Ok(handler) => {
                tracing::debug!(scheme = link.scheme(), "link dispatched by scheme");
                Ok(Resolved {
                    handler,
                    link,
                    route: Route::Scheme,
                })
            }
            Err(e) if e.is_not_implemented() => Err(BackendError::NotImplemented(format!(
                "preview for {link} is not implemented"
            ))),
            Err(e) => Err(e),
        }
    }
}
