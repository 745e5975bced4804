//! Runtime errors.

use std::io;

use thiserror::Error;

/// Errors that stop the runtime.
///
/// Session failures do not stop the runtime. The session is torn down, the
/// state stream reports `Disconnected` and the caller may connect again.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Transport I/O failed
    #[error("transport error: {0}")]
    Transport(#[from] io::Error),
}
