//! XenStore operation codes.
//!
//! Codes are assigned sequentially from 0 in protocol order. `Invalid`
//! (0xFFFF) is never sent on the wire.

use std::fmt;

/// Operation carried in a packet header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Operation {
    Debug = 0,
    Directory = 1,
    Read = 2,
    GetPermissions = 3,
    Watch = 4,
    UnWatch = 5,
    StartTransaction = 6,
    EndTransaction = 7,
    Introduce = 8,
    Release = 9,
    GetDomainPath = 10,
    Write = 11,
    Mkdir = 12,
    Rm = 13,
    SetPermissions = 14,
    WatchEvent = 15,
    Error = 16,
    IsDomainIntroduced = 17,
    Resume = 18,
    SetTarget = 19,
    Restrict = 20,
    ResetWatches = 21,
    Invalid = 0xFFFF,
}

impl Operation {
    /// Decode a wire operation code.
    pub fn from_u32(code: u32) -> Option<Self> {
        let op = match code {
            0 => Self::Debug,
            1 => Self::Directory,
            2 => Self::Read,
            3 => Self::GetPermissions,
            4 => Self::Watch,
            5 => Self::UnWatch,
            6 => Self::StartTransaction,
            7 => Self::EndTransaction,
            8 => Self::Introduce,
            9 => Self::Release,
            10 => Self::GetDomainPath,
            11 => Self::Write,
            12 => Self::Mkdir,
            13 => Self::Rm,
            14 => Self::SetPermissions,
            15 => Self::WatchEvent,
            16 => Self::Error,
            17 => Self::IsDomainIntroduced,
            18 => Self::Resume,
            19 => Self::SetTarget,
            20 => Self::Restrict,
            21 => Self::ResetWatches,
            0xFFFF => Self::Invalid,
            _ => return None,
        };
        Some(op)
    }

    /// The wire code for this operation.
    pub fn as_u32(self) -> u32 {
        self as u32
    }

    /// Protocol name, as used by the C tooling (`XS_READ` without the prefix).
    pub fn name(self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Directory => "DIRECTORY",
            Self::Read => "READ",
            Self::GetPermissions => "GET_PERMS",
            Self::Watch => "WATCH",
            Self::UnWatch => "UNWATCH",
            Self::StartTransaction => "TRANSACTION_START",
            Self::EndTransaction => "TRANSACTION_END",
            Self::Introduce => "INTRODUCE",
            Self::Release => "RELEASE",
            Self::GetDomainPath => "GET_DOMAIN_PATH",
            Self::Write => "WRITE",
            Self::Mkdir => "MKDIR",
            Self::Rm => "RM",
            Self::SetPermissions => "SET_PERMS",
            Self::WatchEvent => "WATCH_EVENT",
            Self::Error => "ERROR",
            Self::IsDomainIntroduced => "IS_DOMAIN_INTRODUCED",
            Self::Resume => "RESUME",
            Self::SetTarget => "SET_TARGET",
            Self::Restrict => "RESTRICT",
            Self::ResetWatches => "RESET_WATCHES",
            Self::Invalid => "INVALID",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_sequential() {
        assert_eq!(Operation::Debug.as_u32(), 0);
        assert_eq!(Operation::Watch.as_u32(), 4);
        assert_eq!(Operation::Write.as_u32(), 11);
        assert_eq!(Operation::WatchEvent.as_u32(), 15);
        assert_eq!(Operation::Error.as_u32(), 16);
        assert_eq!(Operation::ResetWatches.as_u32(), 21);
        assert_eq!(Operation::Invalid.as_u32(), 0xFFFF);
    }

    #[test]
    fn from_u32_matches_as_u32() {
        for code in 0..=21u32 {
            let op = Operation::from_u32(code).expect("code in range should decode");
            assert_eq!(op.as_u32(), code);
        }
        assert_eq!(Operation::from_u32(0xFFFF), Some(Operation::Invalid));
        assert_eq!(Operation::from_u32(22), None);
    }

    #[test]
    fn display_uses_protocol_name() {
        assert_eq!(Operation::GetDomainPath.to_string(), "GET_DOMAIN_PATH");
    }
}
