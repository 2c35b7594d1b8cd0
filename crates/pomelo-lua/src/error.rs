use pomelo_native::{ConfigError, ResultCode};
use thiserror::Error;

/// Errors raised by the bridge.
///
/// Only [`PomeloError::Native`] is an operational error; the Lua surface turns
/// it into a `(nil, reason)` return. Everything else is a caller bug and is
/// raised as a Lua error.
#[derive(Debug, Error)]
pub enum PomeloError {
    #[error("Client already closed")]
    Closed,

    #[error("bad argument #{position} to '{function}' ({message})")]
    BadArgument {
        position: usize,
        function: &'static str,
        message: String,
    },

    #[error("invalid client config: {0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Native(ResultCode),

    #[error(transparent)]
    Lua(#[from] mlua::Error),
}

impl PomeloError {
    pub fn bad_argument(position: usize, function: &'static str, message: impl Into<String>) -> Self {
        Self::BadArgument {
            position,
            function,
            message: message.into(),
        }
    }
}

impl From<ResultCode> for PomeloError {
    fn from(rc: ResultCode) -> Self {
        Self::Native(rc)
    }
}

impl From<PomeloError> for mlua::Error {
    fn from(err: PomeloError) -> Self {
        match err {
            PomeloError::Lua(e) => e,
            other => mlua::Error::external(other),
        }
    }
}

pub type PomeloResult<T> = Result<T, PomeloError>;
