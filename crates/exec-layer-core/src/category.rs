use serde::{Deserialize, Serialize};
use std::fmt;

/// Error categories shared by every process in the tool.
///
/// A category doubles as the process exit code, so a helper that fails with
/// a given category can be classified by its parent from the exit status alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCategory {
    Assert,
    Checksum,
    Config,
    FileInvalid,
    Format,
    CommandRequired,
    OptionInvalid,
    OptionInvalidValue,
    Protocol,
    PathNotEmpty,
    FileOpen,
    FileRead,
    ParameterRequired,
    HostConnect,
    LockAcquire,
    FileMissing,
    FileWrite,
    ProtocolTimeout,
    PathMissing,
    FileClose,
    Memory,
    Crypto,
    ParamInvalid,
    Kernel,
    Service,
    Execute,
    Runtime,
    Invalid,
    Unhandled,
    Unknown,
}

const TABLE: &[(ErrorCategory, i32, &str)] = &[
    (ErrorCategory::Assert, 25, "AssertError"),
    (ErrorCategory::Checksum, 26, "ChecksumError"),
    (ErrorCategory::Config, 27, "ConfigError"),
    (ErrorCategory::FileInvalid, 28, "FileInvalidError"),
    (ErrorCategory::Format, 29, "FormatError"),
    (ErrorCategory::CommandRequired, 30, "CommandRequiredError"),
    (ErrorCategory::OptionInvalid, 31, "OptionInvalidError"),
    (ErrorCategory::OptionInvalidValue, 32, "OptionInvalidValueError"),
    (ErrorCategory::Protocol, 39, "ProtocolError"),
    (ErrorCategory::PathNotEmpty, 40, "PathNotEmptyError"),
    (ErrorCategory::FileOpen, 41, "FileOpenError"),
    (ErrorCategory::FileRead, 42, "FileReadError"),
    (ErrorCategory::ParameterRequired, 43, "ParameterRequiredError"),
    (ErrorCategory::HostConnect, 49, "HostConnectError"),
    (ErrorCategory::LockAcquire, 50, "LockAcquireError"),
    (ErrorCategory::FileMissing, 55, "FileMissingError"),
    (ErrorCategory::FileWrite, 64, "FileWriteError"),
    (ErrorCategory::ProtocolTimeout, 66, "ProtocolTimeoutError"),
    (ErrorCategory::PathMissing, 73, "PathMissingError"),
    (ErrorCategory::FileClose, 79, "FileCloseError"),
    (ErrorCategory::Memory, 94, "MemoryError"),
    (ErrorCategory::Crypto, 95, "CryptoError"),
    (ErrorCategory::ParamInvalid, 96, "ParamInvalidError"),
    (ErrorCategory::Kernel, 100, "KernelError"),
    (ErrorCategory::Service, 101, "ServiceError"),
    (ErrorCategory::Execute, 102, "ExecuteError"),
    (ErrorCategory::Runtime, 122, "RuntimeError"),
    (ErrorCategory::Invalid, 123, "InvalidError"),
    (ErrorCategory::Unhandled, 124, "UnhandledError"),
    (ErrorCategory::Unknown, 125, "UnknownError"),
];

impl ErrorCategory {
    /// Lowest code assigned to a category
    pub const MIN_CODE: i32 = 25;
    /// Highest code assigned to a category
    pub const MAX_CODE: i32 = 125;

    fn entry(self) -> &'static (ErrorCategory, i32, &'static str) {
        TABLE
            .iter()
            .find(|(category, _, _)| *category == self)
            .unwrap_or(&TABLE[TABLE.len() - 1])
    }

    /// Exit code a process uses to report this category
    pub fn code(self) -> i32 {
        self.entry().1
    }

    pub fn name(self) -> &'static str {
        self.entry().2
    }

    /// Map an exit code back to its category.
    ///
    /// Codes outside the table, including 0, map to [`ErrorCategory::Unknown`].
    pub fn from_code(code: i32) -> Self {
        TABLE
            .iter()
            .find(|(_, c, _)| *c == code)
            .map(|(category, _, _)| *category)
            .unwrap_or(ErrorCategory::Unknown)
    }

    pub fn all() -> impl Iterator<Item = ErrorCategory> {
        TABLE.iter().map(|(category, _, _)| *category)
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    #[test]
    fn test_codes_are_unique() {
        let codes: HashSet<i32> = ErrorCategory::all().map(ErrorCategory::code).collect();
        assert_eq!(codes.len(), TABLE.len());
    }

    #[test]
    fn test_well_known_codes() {
        assert_eq!(ErrorCategory::Assert.code(), 25);
        assert_eq!(ErrorCategory::Kernel.code(), 100);
        assert_eq!(ErrorCategory::Execute.code(), 102);
        assert_eq!(ErrorCategory::Unknown.code(), ErrorCategory::MAX_CODE);
        assert_eq!(ErrorCategory::from_code(102), ErrorCategory::Execute);
        assert_eq!(ErrorCategory::from_code(27), ErrorCategory::Config);
    }

    #[test]
    fn test_unmapped_codes_are_unknown() {
        assert_eq!(ErrorCategory::from_code(0), ErrorCategory::Unknown);
        assert_eq!(ErrorCategory::from_code(1), ErrorCategory::Unknown);
        assert_eq!(ErrorCategory::from_code(255), ErrorCategory::Unknown);
        assert_eq!(ErrorCategory::from_code(-1), ErrorCategory::Unknown);
    }

    #[test]
    fn test_display_uses_name() {
        assert_eq!(ErrorCategory::Execute.to_string(), "ExecuteError");
        assert_eq!(format!("{}", ErrorCategory::FileRead), "FileReadError");
    }

    proptest! {
        #[test]
        fn test_every_table_code_maps_back(code in ErrorCategory::MIN_CODE..=ErrorCategory::MAX_CODE) {
            let category = ErrorCategory::from_code(code);
            if category != ErrorCategory::Unknown {
                prop_assert_eq!(category.code(), code);
            }
        }
    }
}
