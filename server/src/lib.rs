pub mod admin;
pub mod auth;
pub mod codec;
pub mod conn;
pub mod declar;
pub mod framer;
pub mod packet;
pub mod server;
pub mod session;

/// Packet framing constants.
pub const PACKET_HEADER_SIZE: usize = 4;
pub const MAX_PAYLOAD_LEN: usize = 0xFF_FF_FF;
pub const NULL_TERMINATOR: u8 = 0;

/// Length of the handshake's combined auth-plugin-data nonce.
pub const AUTH_PLUGIN_DATA_LEN: usize = 20;
