//! Pluggable server-side authentication.
//!
//! Each plugin only has to answer "does this response prove the client
//! knows the credential for this user, given this scramble" — the
//! fast-path / switch / more-data bookkeeping lives in
//! `conn::connection`, which drives an `AuthEngine`.

pub mod clear_password;
pub mod native_password;
pub mod trust;

use std::collections::HashMap;

use crate::session::User;

pub const MYSQL_NATIVE_PASSWORD: &str = "mysql_native_password";
pub const CLEAR_PASSWORD: &str = "mysql_clear_password";
pub const TRUST: &str = "trust";

/// What a plugin concludes about one authentication round.
pub enum Decision {
    /// The response proves the credential; authentication succeeds. The
    /// plugin decides the authenticated identity, which need not be the
    /// login name the client handed over; `None` keeps it unchanged.
    Success(Option<String>),
    /// The response is wrong or malformed; authentication fails.
    Forbidden(Option<String>),
    /// The plugin needs another round trip; `data` is sent as
    /// `AUTH_MORE_DATA` and the client's next packet is passed to
    /// `advance`.
    Challenge(Vec<u8>),
}

/// A single authentication mechanism, identified on the wire by `name()`.
pub trait AuthPlugin: Send + Sync {
    fn name(&self) -> &'static str;

    /// The client-side plugin name this plugin requires the client to have
    /// announced before it will judge a response without first forcing an
    /// `AuthSwitchRequest`. `None` means the plugin doesn't care what the
    /// client announced (e.g. `trust`), so the handshake takes the direct
    /// path even when the names differ.
    fn client_plugin_name(&self) -> Option<&str> {
        Some(self.name())
    }

    /// Judges the client's initial auth response (from the handshake
    /// response, or from the post-switch reply).
    fn start(&self, user: &User, scramble: &[u8], response: &[u8]) -> Decision;

    /// Judges a further round after `start` or a prior `advance` returned
    /// `Decision::Challenge`. Built-in plugins are single-round and reject
    /// any continuation.
    fn advance(&self, _user: &User, _scramble: &[u8], _data: &[u8]) -> Decision {
        Decision::Forbidden(Some("plugin does not support additional auth rounds".into()))
    }
}

/// Registry of the plugins this server supports, keyed by wire name.
pub struct AuthEngine {
    plugins: HashMap<&'static str, Box<dyn AuthPlugin>>,
    default_plugin: &'static str,
}

impl AuthEngine {
    pub fn new() -> Self {
        let mut plugins: HashMap<&'static str, Box<dyn AuthPlugin>> = HashMap::new();
        plugins.insert(
            MYSQL_NATIVE_PASSWORD,
            Box::new(native_password::NativePassword),
        );
        plugins.insert(CLEAR_PASSWORD, Box::new(clear_password::ClearPassword));
        plugins.insert(TRUST, Box::new(trust::Trust));
        AuthEngine {
            plugins,
            default_plugin: MYSQL_NATIVE_PASSWORD,
        }
    }

    pub fn default_plugin_name(&self) -> &'static str {
        self.default_plugin
    }

    pub fn plugin(&self, name: &str) -> Option<&dyn AuthPlugin> {
        self.plugins.get(name).map(|b| b.as_ref())
    }

    /// Adds or replaces a plugin under its own `name()`, so an embedder can
    /// extend the engine with a custom mechanism beyond the three built-ins.
    pub fn register(&mut self, plugin: Box<dyn AuthPlugin>) {
        self.plugins.insert(plugin.name(), plugin);
    }
}

impl Default for AuthEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn every_built_in_plugin_is_registered() {
        let engine = AuthEngine::new();
        assert!(engine.plugin(MYSQL_NATIVE_PASSWORD).is_some());
        assert!(engine.plugin(CLEAR_PASSWORD).is_some());
        assert!(engine.plugin(TRUST).is_some());
        assert!(engine.plugin("unknown_plugin").is_none());
    }

    #[test]
    fn default_plugin_is_native_password() {
        let engine = AuthEngine::new();
        assert_eq!(engine.default_plugin_name(), MYSQL_NATIVE_PASSWORD);
    }

    struct AlwaysDenies;

    impl AuthPlugin for AlwaysDenies {
        fn name(&self) -> &'static str {
            "always_denies"
        }

        fn start(&self, _user: &User, _scramble: &[u8], _response: &[u8]) -> Decision {
            Decision::Forbidden(None)
        }
    }

    #[test]
    fn register_adds_a_custom_plugin() {
        let mut engine = AuthEngine::new();
        assert!(engine.plugin("always_denies").is_none());
        engine.register(Box::new(AlwaysDenies));
        assert!(engine.plugin("always_denies").is_some());
    }
}
