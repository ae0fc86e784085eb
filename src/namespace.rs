//! User identifier sanitization.
//!
//! A namespace is the unit of isolation: one directory under the data root
//! holding one user's append log and bulk document. Raw user strings come from
//! clients and may contain anything, so they are reduced to a filesystem-safe
//! token before they touch a path.

use std::fmt;

/// Token used when sanitization leaves nothing behind.
///
/// Every caller without a usable identifier lands here, so unrelated clients
/// share this namespace.
pub const FALLBACK_NAMESPACE: &str = "default";

/// Reduce `raw` to ASCII letters, digits, `-` and `_`, keeping their order.
///
/// Returns [`FALLBACK_NAMESPACE`] when no character survives. Total and
/// idempotent.
pub fn sanitize(raw: &str) -> String {
    let token: String = raw
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect();
    if token.is_empty() {
        FALLBACK_NAMESPACE.to_string()
    } else {
        token
    }
}

/// A sanitized, never-empty namespace token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Namespace(String);

impl Namespace {
    /// Sanitize `raw` into a namespace.
    pub fn new(raw: &str) -> Namespace {
        Namespace(sanitize(raw))
    }

    /// Sanitize `primary`; if that yields the fallback token, sanitize
    /// `fallback` instead.
    ///
    /// Request handlers pass the identifier embedded in the payload as
    /// `primary` and the `?user=` query parameter as `fallback`.
    pub fn resolve(primary: &str, fallback: Option<&str>) -> Namespace {
        let ns = Namespace::new(primary);
        if ns.is_fallback() {
            Namespace::new(fallback.unwrap_or_default())
        } else {
            ns
        }
    }

    /// The shared fallback namespace.
    pub fn fallback() -> Namespace {
        Namespace(FALLBACK_NAMESPACE.to_string())
    }

    /// Returns `true` if this is the shared fallback namespace.
    pub fn is_fallback(&self) -> bool {
        self.0 == FALLBACK_NAMESPACE
    }

    /// The token as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Namespace {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
