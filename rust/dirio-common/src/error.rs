use std::sync::Arc;

use thiserror::Error;

/// The error type shared by all dirio crates.
///
/// The kind is reference counted, so cloning an `Error` yields the same underlying
/// error value. A poisoned writer relies on this to hand out its terminal error on
/// every subsequent call.
#[derive(Debug, Clone, Error)]
#[error(transparent)]
pub struct Error(Arc<ErrorKind>);

impl Error {
    pub fn kind(&self) -> &ErrorKind {
        self.0.as_ref()
    }

    /// Returns `true` if `other` is a clone of this very error (not merely an
    /// equal-looking one).
    pub fn same_as(&self, other: &Error) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn invalid_arg(name: impl Into<String>, message: impl Into<String>) -> Error {
        ErrorKind::InvalidArgument {
            name: name.into(),
            message: message.into(),
        }
        .into()
    }

    pub fn resource_exhausted(context: impl Into<String>, code: i32) -> Error {
        ErrorKind::ResourceExhausted {
            context: context.into(),
            code,
        }
        .into()
    }

    pub fn topology_unavailable(phase: &'static str, reason: impl Into<String>) -> Error {
        ErrorKind::TopologyUnavailable {
            phase,
            reason: reason.into(),
        }
        .into()
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Error {
        ErrorKind::Io {
            context: context.into(),
            source,
        }
        .into()
    }

    /// The `std::io::ErrorKind` that best describes this error.
    pub fn io_kind(&self) -> std::io::ErrorKind {
        match self.kind() {
            ErrorKind::InvalidArgument { .. } => std::io::ErrorKind::InvalidInput,
            ErrorKind::ResourceExhausted { .. } => std::io::ErrorKind::OutOfMemory,
            ErrorKind::TopologyUnavailable { .. } => std::io::ErrorKind::Unsupported,
            ErrorKind::Io { source, .. } => source.kind(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ErrorKind {
    #[error("invalid argument {name}: {message}")]
    InvalidArgument { name: String, message: String },

    #[error("resource exhausted during {context} (os error {code})")]
    ResourceExhausted { context: String, code: i32 },

    #[error("topology unavailable from {phase} probe: {reason}")]
    TopologyUnavailable { phase: &'static str, reason: String },

    #[error("IO error for '{context}': {source}")]
    Io {
        context: String,
        source: std::io::Error,
    },
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Error(Arc::new(kind))
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::io("", e)
    }
}

impl From<Error> for std::io::Error {
    fn from(e: Error) -> Self {
        std::io::Error::new(e.io_kind(), e)
    }
}

#[cfg(test)]
mod tests {
    use super::{Error, ErrorKind};

    #[test]
    fn test_clone_is_same_error() {
        let e = Error::io("write block", std::io::ErrorKind::BrokenPipe.into());
        let c = e.clone();
        assert!(e.same_as(&c));

        let other = Error::io("write block", std::io::ErrorKind::BrokenPipe.into());
        assert!(!e.same_as(&other));
    }

    #[test]
    fn test_into_io_error_keeps_kind() {
        let e = Error::io("read", std::io::ErrorKind::UnexpectedEof.into());
        let io: std::io::Error = e.into();
        assert_eq!(io.kind(), std::io::ErrorKind::UnexpectedEof);

        let e = Error::invalid_arg("alignment", "alignment.is_power_of_two()");
        let io: std::io::Error = e.into();
        assert_eq!(io.kind(), std::io::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_display() {
        let e = Error::resource_exhausted("aligned allocation", 12);
        assert!(matches!(e.kind(), ErrorKind::ResourceExhausted { code: 12, .. }));
        assert_eq!(
            e.to_string(),
            "resource exhausted during aligned allocation (os error 12)"
        );
    }
}
