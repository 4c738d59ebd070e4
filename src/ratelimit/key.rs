//! Limiter key composition.

use std::fmt;
use std::net::IpAddr;

/// A key that names one throttling domain.
///
/// The core treats keys as opaque. Callers compose them from a base name
/// plus, optionally, an already-authenticated user id or a trusted client
/// address, so that each user or source gets its own limiter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LimiterKey(String);

impl LimiterKey {
    /// A key shared by every caller of `base`.
    pub fn global(base: &str) -> Self {
        Self(base.to_string())
    }

    /// A key scoped to one authenticated user: `<base>_user<user_id>`.
    pub fn per_user(base: &str, user_id: &str) -> Self {
        Self(format!("{}_user{}", base, user_id))
    }

    /// A key scoped to one client address: `<base>_ip_<ip>`.
    pub fn per_ip(base: &str, ip: IpAddr) -> Self {
        Self(format!("{}_ip_{}", base, ip))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LimiterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
