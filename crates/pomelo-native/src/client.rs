//! The interface every native client implementation provides

use crate::codes::{ClientState, ResultCode};
use crate::config::ClientConfig;
use crate::event::{Delivery, Timeout, Token};

/// A native protocol client driven by explicit polling.
///
/// Implementations never call back into the caller. Events and completions
/// are buffered and handed over, in delivery order, by [`NativeClient::poll`];
/// this keeps the caller free to issue new operations from whatever code it
/// runs while routing them.
pub trait NativeClient {
    fn connect(
        &mut self,
        host: &str,
        port: u16,
        handshake_opts: Option<&str>,
    ) -> Result<(), ResultCode>;

    fn disconnect(&mut self) -> Result<(), ResultCode>;

    /// Submit a request; exactly one completion carrying `token` follows on a
    /// later poll unless the client is cleaned up first.
    fn request(
        &mut self,
        route: &str,
        message: &str,
        timeout: Timeout,
        token: Token,
    ) -> Result<(), ResultCode>;

    /// Submit a notify. A completion is only delivered when `token` is set.
    fn notify(
        &mut self,
        route: &str,
        message: &str,
        timeout: Timeout,
        token: Option<Token>,
    ) -> Result<(), ResultCode>;

    fn state(&self) -> ClientState;

    fn conn_quality(&self) -> i32;

    fn config(&self) -> &ClientConfig;

    /// Run one poll step and hand over everything it produced.
    fn poll(&mut self) -> Result<Vec<Delivery>, ResultCode>;

    /// Release native resources. Pending operations are dropped silently.
    fn cleanup(&mut self);
}
