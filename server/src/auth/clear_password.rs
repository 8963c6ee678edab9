use super::{AuthPlugin, Decision};
use crate::session::User;

/// `mysql_clear_password`: the client sends the plaintext password,
/// null-terminated. Only meaningful over a secure transport; this server
/// doesn't enforce that itself (TLS is out of scope).
pub struct ClearPassword;

impl AuthPlugin for ClearPassword {
    fn name(&self) -> &'static str {
        super::CLEAR_PASSWORD
    }

    fn start(&self, user: &User, _scramble: &[u8], response: &[u8]) -> Decision {
        let response = response.strip_suffix(&[0]).unwrap_or(response);
        if response == user.credential.as_slice() {
            Decision::Success(None)
        } else {
            Decision::Forbidden(None)
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn matches_plaintext_credential() {
        let user = User {
            username: "root".into(),
            credential: b"hunter2".to_vec(),
            plugin: super::super::CLEAR_PASSWORD.into(),
            default_database: None,
        };
        assert!(matches!(
            ClearPassword.start(&user, b"", b"hunter2"),
            Decision::Success(_)
        ));
        assert!(matches!(
            ClearPassword.start(&user, b"", b"hunter2\0"),
            Decision::Success(_)
        ));
    }

    #[test]
    fn rejects_mismatched_password() {
        let user = User {
            username: "root".into(),
            credential: b"hunter2".to_vec(),
            plugin: super::super::CLEAR_PASSWORD.into(),
            default_database: None,
        };
        assert!(matches!(
            ClearPassword.start(&user, b"", b"wrong"),
            Decision::Forbidden(_)
        ));
    }
}
