use crate::codec::write_null_term_string;
use crate::packet::response_type;

/// Sent to ask the client to restart authentication with a different
/// plugin, carrying a fresh challenge for that plugin.
pub struct AuthSwitchRequest<'a> {
    pub plugin_name: &'a str,
    pub auth_plugin_data: &'a [u8],
}

impl<'a> AuthSwitchRequest<'a> {
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.push(response_type::AUTH_SWITCH);
        write_null_term_string(&mut buf, self.plugin_name).unwrap();
        buf.extend_from_slice(self.auth_plugin_data);
        buf
    }
}

/// Sent mid-exchange when a plugin needs another round trip without
/// switching plugins (`more_data` rounds, e.g. `caching_sha2_password`).
pub struct AuthMoreData<'a> {
    pub data: &'a [u8],
}

impl<'a> AuthMoreData<'a> {
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(1 + self.data.len());
        buf.push(response_type::AUTH_MORE_DATA);
        buf.extend_from_slice(self.data);
        buf
    }
}
