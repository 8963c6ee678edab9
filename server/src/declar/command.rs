use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Command-phase request codes (byte 0 of every command packet).
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum Command {
    Quit = 0x01,
    Query = 0x03,
    Debug = 0x0D,
    Ping = 0x0E,
    ChangeUser = 0x11,
    StmtPrepare = 0x16,
    StmtExecute = 0x17,
    StmtSendLongData = 0x18,
    StmtClose = 0x19,
    StmtReset = 0x1A,
    StmtFetch = 0x1C,
    ResetConnection = 0x1F,
}
