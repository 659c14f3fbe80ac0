use std::io;
use std::sync::Arc;
use thiserror::Error;

/// Failure while reading container metadata.
///
/// Every variant is an I/O-class error: the reader could not make sense of
/// the byte stream it was given. The type is `Clone` so a reader can hand
/// the same failure back from every accessor after a failed parse.
#[derive(Error, Debug, Clone)]
pub enum MetadataError {
    #[error("Source not set")]
    SourceNotSet,
    #[error("Invalid signature: {found} (is this a {format}?)")]
    InvalidSignature { format: &'static str, found: String },
    #[error("Invalid {format} version: {found}")]
    InvalidVersion { format: &'static str, found: String },
    #[error("Malformed {format} data: {reason}")]
    Malformed { format: &'static str, reason: String },
    #[error("IO error: {0}")]
    Io(Arc<io::Error>),
}

impl MetadataError {
    /// True when the stream ended in the middle of a field.
    pub fn is_truncation(&self) -> bool {
        matches!(self, MetadataError::Io(e) if e.kind() == io::ErrorKind::UnexpectedEof)
    }
}

impl From<io::Error> for MetadataError {
    fn from(e: io::Error) -> Self {
        MetadataError::Io(Arc::new(e))
    }
}

/// Uppercase hex, as shown in signature errors.
pub(crate) fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02X}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_detected_only_for_eof() {
        let eof: MetadataError = io::Error::from(io::ErrorKind::UnexpectedEof).into();
        assert!(eof.is_truncation());
        let other: MetadataError = io::Error::from(io::ErrorKind::PermissionDenied).into();
        assert!(!other.is_truncation());
        assert!(!MetadataError::SourceNotSet.is_truncation());
    }

    #[test]
    fn signature_message_carries_hex() {
        let e = MetadataError::InvalidSignature {
            format: "GIF",
            found: hex(&[0x89, b'P', b'N']),
        };
        assert_eq!(e.to_string(), "Invalid signature: 89504E (is this a GIF?)");
    }
}
