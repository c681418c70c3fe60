//! RAII guard for environment variables in tests.
//!
//! The standalone MCP server and the config layer read credentials from the
//! process environment. Tests that touch those variables snapshot them with
//! [`EnvGuard`] so they are restored even when an assertion panics. Such tests
//! must also be `#[serial]`: the environment is process-global.

use std::env;
use std::ffi::{OsStr, OsString};

/// Restores one environment variable (value or absence) on drop.
///
/// ```ignore
/// #[test]
/// #[serial]
/// fn reads_token() {
///     let _token = unsafe { EnvGuard::set("SENTRY_AUTH_TOKEN", "t") };
///     // restored when `_token` drops
/// }
/// ```
pub struct EnvGuard {
    key: String,
    original: Option<OsString>,
}

impl EnvGuard {
    /// Snapshot `key` without changing it.
    pub fn new(key: &str) -> Self {
        Self {
            key: key.to_string(),
            original: env::var_os(key),
        }
    }

    /// Snapshot `key`, then set it.
    ///
    /// # Safety
    /// Calls `std::env::set_var`; only sound while no other thread reads the
    /// environment, hence `#[serial]`.
    pub unsafe fn set(key: &str, value: impl AsRef<OsStr>) -> Self {
        let guard = Self::new(key);
        unsafe { env::set_var(key, value) };
        guard
    }

    /// Snapshot `key`, then unset it.
    ///
    /// # Safety
    /// Same contract as [`EnvGuard::set`].
    pub unsafe fn remove(key: &str) -> Self {
        let guard = Self::new(key);
        unsafe { env::remove_var(key) };
        guard
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        // SAFETY: guarded tests are #[serial].
        match &self.original {
            Some(val) => unsafe { env::set_var(&self.key, val) },
            None => unsafe { env::remove_var(&self.key) },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_set_restores_previous_value() {
        let key = "LOOKOUT_GUARD_EXISTING";
        unsafe { env::set_var(key, "before") };
        {
            let _guard = unsafe { EnvGuard::set(key, "during") };
            assert_eq!(env::var(key).unwrap(), "during");
        }
        assert_eq!(env::var(key).unwrap(), "before");
        unsafe { env::remove_var(key) };
    }

    #[test]
    #[serial]
    fn test_set_restores_absence() {
        let key = "LOOKOUT_GUARD_ABSENT";
        unsafe { env::remove_var(key) };
        {
            let _guard = unsafe { EnvGuard::set(key, "temporary") };
            assert!(env::var(key).is_ok());
        }
        assert!(env::var(key).is_err());
    }

    #[test]
    #[serial]
    fn test_remove_restores_value() {
        let key = "LOOKOUT_GUARD_REMOVE";
        unsafe { env::set_var(key, "keep") };
        {
            let _guard = unsafe { EnvGuard::remove(key) };
            assert!(env::var(key).is_err());
        }
        assert_eq!(env::var(key).unwrap(), "keep");
        unsafe { env::remove_var(key) };
    }
}
