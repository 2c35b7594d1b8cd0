//! Result codes and connection states reported by the native client

use std::fmt;

const RC_PREFIX: &str = "PC_RC_";
const ST_PREFIX: &str = "PC_ST_";

/// Outcome of a native operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultCode {
    Ok,
    Error,
    Timeout,
    InvalidJson,
    InvalidArg,
    NoTrans,
    InvalidThread,
    TransError,
    InvalidRoute,
    InvalidState,
    NotFound,
    Reset,
}

impl ResultCode {
    /// Native name, including the `PC_RC_` prefix.
    pub fn native_name(self) -> &'static str {
        match self {
            ResultCode::Ok => "PC_RC_OK",
            ResultCode::Error => "PC_RC_ERROR",
            ResultCode::Timeout => "PC_RC_TIMEOUT",
            ResultCode::InvalidJson => "PC_RC_INVALID_JSON",
            ResultCode::InvalidArg => "PC_RC_INVALID_ARG",
            ResultCode::NoTrans => "PC_RC_NO_TRANS",
            ResultCode::InvalidThread => "PC_RC_INVALID_THREAD",
            ResultCode::TransError => "PC_RC_TRANS_ERROR",
            ResultCode::InvalidRoute => "PC_RC_INVALID_ROUTE",
            ResultCode::InvalidState => "PC_RC_INVALID_STATE",
            ResultCode::NotFound => "PC_RC_NOT_FOUND",
            ResultCode::Reset => "PC_RC_RESET",
        }
    }

    /// Short reason handed to scripts, e.g. `"NOT_FOUND"`.
    pub fn reason(self) -> &'static str {
        let name = self.native_name();
        name.strip_prefix(RC_PREFIX).unwrap_or(name)
    }

    pub fn is_ok(self) -> bool {
        self == ResultCode::Ok
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.reason())
    }
}

impl std::error::Error for ResultCode {}

/// Connection state of a native client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientState {
    Inited,
    Connecting,
    Connected,
    Disconnecting,
    Unknown,
}

impl ClientState {
    pub fn native_name(self) -> &'static str {
        match self {
            ClientState::Inited => "PC_ST_INITED",
            ClientState::Connecting => "PC_ST_CONNECTING",
            ClientState::Connected => "PC_ST_CONNECTED",
            ClientState::Disconnecting => "PC_ST_DISCONNECTING",
            ClientState::Unknown => "PC_ST_UNKNOWN",
        }
    }

    /// State name without the `PC_ST_` prefix, e.g. `"CONNECTED"`.
    pub fn name(self) -> &'static str {
        let name = self.native_name();
        name.strip_prefix(ST_PREFIX).unwrap_or(name)
    }
}

impl fmt::Display for ClientState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
