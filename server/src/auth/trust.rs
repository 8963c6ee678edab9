use super::{AuthPlugin, Decision};
use crate::session::User;

/// Accepts any response unconditionally. Intended for local development
/// identity providers, never for a production account.
pub struct Trust;

impl AuthPlugin for Trust {
    fn name(&self) -> &'static str {
        super::TRUST
    }

    fn client_plugin_name(&self) -> Option<&str> {
        None
    }

    fn start(&self, _user: &User, _scramble: &[u8], _response: &[u8]) -> Decision {
        Decision::Success(None)
    }
}
