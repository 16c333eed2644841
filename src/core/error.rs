use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Io,
    Parse,
    NotFound,
    InvalidArgument,
    InvalidState,
    Internal,
    /// Truncated or short node/vector/postings record in a published file
    MalformedSegment,
    /// A vector or postings offset is unset where the read path needs it
    MissingOffset,
    /// Key id allocation raced or the key registry is inconsistent
    KeyRegistrationConflict,
    /// The value has no on-disk representation
    UnsupportedValueType,
    /// A key was reused with a value type other than the one it was registered with
    KeyTypeConflict,
}

#[derive(Debug)]
pub struct Error {
    pub kind: ErrorKind,
    pub context: String,
}

impl Error {
    pub fn new(kind: ErrorKind, context: String) -> Self {
        Error { kind, context }
    }

    pub fn malformed(context: impl Into<String>) -> Self {
        Error::new(ErrorKind::MalformedSegment, context.into())
    }

    pub fn missing_offset(context: impl Into<String>) -> Self {
        Error::new(ErrorKind::MissingOffset, context.into())
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.context)
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        // A short read inside a fixed-width record means the file was cut off
        let kind = if err.kind() == std::io::ErrorKind::UnexpectedEof {
            ErrorKind::MalformedSegment
        } else {
            ErrorKind::Io
        };

        Error {
            kind,
            context: err.to_string(),
        }
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error {
            kind: ErrorKind::Parse,
            context: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
