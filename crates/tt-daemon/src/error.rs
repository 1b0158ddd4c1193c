use thiserror::Error;

use crate::protocol::MAX_FRAME_LEN;

/// Daemon and client errors.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid frame JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("frame of {0} bytes exceeds the {MAX_FRAME_LEN} byte limit")]
    FrameTooLarge(usize),
    #[error("connection closed by peer")]
    ConnectionClosed,
    /// The daemon answered with an error frame.
    #[error("daemon error ({kind}): {message}")]
    Remote { kind: String, message: String },
    #[error("unexpected response: {0}")]
    UnexpectedResponse(&'static str),
}

impl DaemonError {
    /// True when the daemon reported a "not found" store error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Remote { kind, .. } if kind == "not_found")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_comes_only_from_error_frames() {
        let remote = DaemonError::Remote {
            kind: "not_found".to_string(),
            message: "entry #2 not found".to_string(),
        };
        assert!(remote.is_not_found());
        let other = DaemonError::Remote {
            kind: "empty_name".to_string(),
            message: "entry name cannot be empty".to_string(),
        };
        assert!(!other.is_not_found());
        assert!(!DaemonError::ConnectionClosed.is_not_found());
    }
}
