use sha1::{Digest, Sha1};

use super::{AuthPlugin, Decision};
use crate::session::User;

fn sha1(data: &[u8]) -> Vec<u8> {
    let mut hasher = Sha1::new();
    hasher.update(data);
    hasher.finalize().to_vec()
}

fn xor(a: &[u8], b: &[u8]) -> Vec<u8> {
    a.iter().zip(b.iter().cycle()).map(|(x, y)| x ^ y).collect()
}

/// `mysql_native_password`: the client proves it knows the password
/// without sending it, using `SHA1(password) XOR SHA1(scramble ||
/// SHA1(SHA1(password)))`. `User::credential` stores `SHA1(SHA1(password))`
/// (MySQL's "authentication string"), so verification recovers
/// `SHA1(password)` from the response and re-hashes it for comparison.
pub struct NativePassword;

impl AuthPlugin for NativePassword {
    fn name(&self) -> &'static str {
        super::MYSQL_NATIVE_PASSWORD
    }

    fn start(&self, user: &User, scramble: &[u8], response: &[u8]) -> Decision {
        if response.is_empty() && user.credential.is_empty() {
            return Decision::Success(None);
        }
        if response.len() != 20 || user.credential.len() != 20 {
            return Decision::Forbidden(None);
        }

        let mixin = sha1(&[scramble, &user.credential].concat());
        let stage1 = xor(response, &mixin);
        if sha1(&stage1) == user.credential {
            Decision::Success(None)
        } else {
            Decision::Forbidden(None)
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn client_response(password: &[u8], scramble: &[u8]) -> (Vec<u8>, Vec<u8>) {
        let stage1 = sha1(password);
        let stored_hash = sha1(&stage1);
        let mixin = sha1(&[scramble, stored_hash.as_slice()].concat());
        (xor(&stage1, &mixin), stored_hash)
    }

    #[test]
    fn accepts_a_correctly_hashed_response() {
        let scramble = b"01234567890123456789";
        let (response, stored_hash) = client_response(b"hunter2", scramble);
        let user = User {
            username: "root".into(),
            credential: stored_hash,
            plugin: super::super::MYSQL_NATIVE_PASSWORD.into(),
            default_database: None,
        };
        assert!(matches!(
            NativePassword.start(&user, scramble, &response),
            Decision::Success(_)
        ));
    }

    #[test]
    fn rejects_the_wrong_password() {
        let scramble = b"01234567890123456789";
        let (response, stored_hash) = client_response(b"hunter2", scramble);
        let user = User {
            username: "root".into(),
            credential: stored_hash,
            plugin: super::super::MYSQL_NATIVE_PASSWORD.into(),
            default_database: None,
        };
        let (wrong_response, _) = client_response(b"wrong", scramble);
        let _ = response;
        assert!(matches!(
            NativePassword.start(&user, scramble, &wrong_response),
            Decision::Forbidden(_)
        ));
    }

    #[test]
    fn empty_password_and_empty_response_is_accepted() {
        let user = User {
            username: "anon".into(),
            credential: Vec::new(),
            plugin: super::super::MYSQL_NATIVE_PASSWORD.into(),
            default_database: None,
        };
        assert!(matches!(
            NativePassword.start(&user, b"01234567890123456789", &[]),
            Decision::Success(_)
        ));
    }
}
