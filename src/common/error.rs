use std::fmt;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Every error the buffer manager and heap file can surface.
///
/// `InternalInvariant` is reserved for states that should be unreachable
/// under correct usage (e.g. a directory chain that does not contain an
/// entry it is known to index) — it is not meant to be handled, only
/// logged and propagated.
#[derive(Debug)]
pub enum Error {
    InvalidArgument(String),
    PoolExhausted,
    InternalInvariant(String),
    Io(std::io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            Error::PoolExhausted => write!(f, "buffer pool exhausted: no evictable frame"),
            Error::InternalInvariant(msg) => write!(f, "internal invariant violated: {msg}"),
            Error::Io(err) => write!(f, "disk I/O error: {err}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl Error {
    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        Error::InvalidArgument(msg.into())
    }

    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Error::InternalInvariant(msg.into())
    }
}
