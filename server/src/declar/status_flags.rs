use bitflags::bitflags;

bitflags! {
    /// Server status bits surfaced in OK/EOF packets.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct StatusFlags: u16 {
        const IN_TRANS              = 0x0001;
        const AUTOCOMMIT             = 0x0002;
        const MORE_RESULTS_EXISTS   = 0x0008;
        const NO_GOOD_INDEX_USED    = 0x0010;
        const NO_INDEX_USED         = 0x0020;
        const CURSOR_EXISTS         = 0x0040;
        const LAST_ROW_SENT         = 0x0080;
        const DB_DROPPED            = 0x0100;
        const NO_BACKSLASH_ESCAPES  = 0x0200;
        const METADATA_CHANGED      = 0x0400;
        const QUERY_WAS_SLOW        = 0x0800;
        const PS_OUT_PARAMS         = 0x1000;
        const IN_TRANS_READONLY     = 0x2000;
        const SESSION_STATE_CHANGED = 0x4000;
    }
}

#[cfg(test)]
mod test {
    use super::StatusFlags;

    #[test]
    fn default_session_is_autocommit() {
        let status = StatusFlags::AUTOCOMMIT;
        assert!(status.contains(StatusFlags::AUTOCOMMIT));
        assert!(!status.contains(StatusFlags::CURSOR_EXISTS));
    }
}
