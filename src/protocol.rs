//! FTP constants and reply handling on top of `suppaftp`
//!
//! The control channel itself belongs to [`suppaftp::FtpStream`]. This module
//! turns its errors into [`MirrorError`]s carrying the failed command.

use crate::error::MirrorError;
use suppaftp::FtpError;

pub const DEFAULT_PORT: u16 = 21;

/// Chunk size used for file streams on the data connection
pub const TRANSFER_CHUNK: usize = 16 * 1024;

pub mod timeouts {
    /// TCP connect timeout for the control connection (ms)
    pub const CONNECT_MS: u64 = 10_000;

    /// Read/write timeout on the established control connection (ms)
    pub const IO_MS: u64 = 60_000;
}

/// Reply text without the leading code, e.g. `550 No such file` -> `No such file`
pub fn reply_text(raw: &str) -> &str {
    let raw = raw.trim();
    match raw.get(..3) {
        Some(code) if code.bytes().all(|b| b.is_ascii_digit()) => {
            raw[3..].trim_start_matches(['-', ' '])
        }
        _ => raw,
    }
}

/// Map a `suppaftp` error for `command`.
///
/// A server reply the command did not expect is `Rejected` with the reply
/// code; everything else is a transport failure.
pub fn ftp_error(command: &str, error: FtpError) -> MirrorError {
    match error {
        FtpError::UnexpectedResponse(response) => {
            let body = String::from_utf8_lossy(response.body.as_ref()).to_string();
            MirrorError::Rejected {
                command: command.to_string(),
                code: response.status.code() as u16,
                message: reply_text(&body).to_string(),
            }
        }
        FtpError::ConnectionError(e) => crate::error!(Connection, "{}: {}", command, e),
        other => crate::error!(Connection, "{}: {}", command, other),
    }
}
