use bitflags::bitflags;

bitflags! {
    /// Capability flags negotiated between client and server during the
    /// handshake. Effective capabilities are the bitwise AND of the
    /// server-advertised set and the client-requested set.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Capabilities: u32 {
        const LONG_PASSWORD                  = 0x0000_0001;
        const FOUND_ROWS                     = 0x0000_0002;
        const LONG_FLAG                      = 0x0000_0004;
        const CONNECT_WITH_DB                = 0x0000_0008;
        const NO_SCHEMA                      = 0x0000_0010;
        const COMPRESS                       = 0x0000_0020;
        const ODBC                           = 0x0000_0040;
        const LOCAL_FILES                    = 0x0000_0080;
        const IGNORE_SPACE                   = 0x0000_0100;
        const PROTOCOL_41                    = 0x0000_0200;
        const INTERACTIVE                    = 0x0000_0400;
        const SSL                            = 0x0000_0800;
        const IGNORE_SIGPIPE                 = 0x0000_1000;
        const TRANSACTIONS                   = 0x0000_2000;
        const RESERVED                       = 0x0000_4000;
        const SECURE_CONNECTION              = 0x0000_8000;
        const MULTI_STATEMENTS               = 0x0001_0000;
        const MULTI_RESULTS                  = 0x0002_0000;
        const PS_MULTI_RESULTS               = 0x0004_0000;
        const PLUGIN_AUTH                    = 0x0008_0000;
        const CONNECT_ATTRS                  = 0x0010_0000;
        const PLUGIN_AUTH_LENENC_CLIENT_DATA = 0x0020_0000;
        const CAN_HANDLE_EXPIRED_PASSWORDS   = 0x0040_0000;
        const SESSION_TRACK                  = 0x0080_0000;
        const DEPRECATE_EOF                  = 0x0100_0000;
        const OPTIONAL_RESULTSET_METADATA    = 0x0200_0000;
        const ZSTD_COMPRESSION_ALGORITHM     = 0x0400_0000;
        const QUERY_ATTRIBUTES                = 0x0800_0000;
        const MULTI_FACTOR_AUTHENTICATION    = 0x1000_0000;
    }
}

impl Capabilities {
    /// The set this server advertises in the initial handshake packet.
    pub fn server_default() -> Self {
        Capabilities::LONG_PASSWORD
            | Capabilities::FOUND_ROWS
            | Capabilities::LONG_FLAG
            | Capabilities::CONNECT_WITH_DB
            | Capabilities::PROTOCOL_41
            | Capabilities::TRANSACTIONS
            | Capabilities::SECURE_CONNECTION
            | Capabilities::PLUGIN_AUTH
            | Capabilities::CONNECT_ATTRS
            | Capabilities::PLUGIN_AUTH_LENENC_CLIENT_DATA
            | Capabilities::SESSION_TRACK
            | Capabilities::DEPRECATE_EOF
            | Capabilities::ZSTD_COMPRESSION_ALGORITHM
            | Capabilities::QUERY_ATTRIBUTES
    }
}
