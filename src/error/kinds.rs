use std::path::PathBuf;
use std::{fmt, io};

use crate::error::mongo::format_mongodb_error;

/// Crate-wide `Result` type using [`DumpError`] as the error.
///
/// This alias is re-exported by the parent `error` module and is intended
/// to be used throughout the crate for fallible operations.
pub type Result<T> = std::result::Result<T, DumpError>;

/// Top-level error type for transfer runs.
///
/// Everything that reaches `main` through this type is fatal. Per-line
/// decode failures and per-record upsert failures are contained where they
/// happen and never travel up as a `DumpError`.
#[derive(Debug)]
pub enum DumpError {
    /// Configuration errors, raised before any I/O begins.
    Config(ConfigError),

    /// Store transport errors.
    Transport(TransportError),

    /// I/O errors without path context.
    Io(io::Error),

    /// File operation failed on a known path.
    File {
        op: &'static str,
        path: PathBuf,
        source: io::Error,
    },

    /// MongoDB driver errors.
    MongoDb(mongodb::error::Error),

    /// Generic error with a free-form message.
    Generic(String),
}

/// Configuration-specific errors.
#[derive(Debug)]
pub enum ConfigError {
    /// Config file not found.
    FileNotFound(String),

    /// Invalid config format.
    InvalidFormat(String),

    /// Missing required field.
    MissingField(String),

    /// Invalid field value.
    InvalidValue { field: String, value: String },

    /// Query filter is not valid JSON.
    InvalidQuery(String),

    /// Glob pattern could not be parsed.
    InvalidPattern { pattern: String, reason: String },

    /// Glob pattern matched nothing.
    NoFilesMatched(String),

    /// Endpoint scheme has no store backend.
    UnsupportedEndpoint(String),
}

/// Store transport errors.
#[derive(Debug)]
pub enum TransportError {
    /// Failed to establish a connection.
    ConnectionFailed(String),

    /// The request could not be sent or its response could not be read.
    RequestFailed { transient: bool, message: String },

    /// The store answered with a non-success status.
    Status { status: u16, body: String },

    /// The response did not have the expected shape.
    MalformedResponse(String),

    /// A scroll page pull failed.
    ScrollFailed(String),

    /// A bulk upsert call failed outright.
    BulkFailed(String),
}

/// Errors decoding one line of an input file.
///
/// Never fatal: the import pipeline logs and counts them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The line is not a JSON object with the expected fields.
    Malformed(String),

    /// The `id` field is absent or empty.
    MissingId,

    /// `source` is a JSON value other than an object or null.
    InvalidSource(&'static str),
}

/* ========================= Classification ========================= */

impl DumpError {
    /// Whether the failure may go away if the same call is repeated.
    ///
    /// Store clients use this to decide which failures their retry policy
    /// absorbs.
    pub fn is_transient(&self) -> bool {
        match self {
            DumpError::Transport(e) => e.is_transient(),
            DumpError::MongoDb(e) => {
                use mongodb::error::ErrorKind;
                matches!(
                    e.kind.as_ref(),
                    ErrorKind::Io(_)
                        | ErrorKind::ServerSelection { .. }
                        | ErrorKind::ConnectionPoolCleared { .. }
                )
            }
            _ => false,
        }
    }

    /// Failure serializing something this process built itself.
    pub(crate) fn encoding(what: &str, err: serde_json::Error) -> Self {
        DumpError::Generic(format!("Error encoding {what}: {err}"))
    }

    /// A store response that could not be parsed.
    pub(crate) fn malformed(err: serde_json::Error) -> Self {
        DumpError::Transport(TransportError::MalformedResponse(err.to_string()))
    }

    pub(crate) fn file(op: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        DumpError::File {
            op,
            path: path.into(),
            source,
        }
    }
}

impl TransportError {
    /// Whether the failure may go away if the same call is repeated.
    pub fn is_transient(&self) -> bool {
        match self {
            TransportError::ConnectionFailed(_) => true,
            TransportError::RequestFailed { transient, .. } => *transient,
            TransportError::Status { status, .. } => matches!(status, 429 | 502 | 503 | 504),
            _ => false,
        }
    }
}

/* ========================= Display & Error impls ========================= */

impl fmt::Display for DumpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DumpError::Config(e) => write!(f, "Configuration error: {e}"),
            DumpError::Transport(e) => write!(f, "Transport error: {e}"),
            DumpError::Io(e) => write!(f, "I/O error: {e}"),
            DumpError::File { op, path, source } => {
                write!(f, "Error {op} file {:?}: {source}", path.display().to_string())
            }
            DumpError::MongoDb(e) => format_mongodb_error(f, e),
            DumpError::Generic(msg) => write!(f, "{msg}"),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::FileNotFound(path) => write!(f, "Config file not found: {path}"),
            ConfigError::InvalidFormat(msg) => write!(f, "Invalid config format: {msg}"),
            ConfigError::MissingField(field) => write!(f, "Missing required field: {field}"),
            ConfigError::InvalidValue { field, value } => {
                write!(f, "Invalid value '{value}' for field '{field}'")
            }
            ConfigError::InvalidQuery(msg) => write!(f, "Invalid query: {msg}"),
            ConfigError::InvalidPattern { pattern, reason } => {
                write!(f, "Invalid file pattern {pattern:?}: {reason}")
            }
            ConfigError::NoFilesMatched(pattern) => {
                write!(f, "No files found matching {pattern:?}")
            }
            ConfigError::UnsupportedEndpoint(endpoint) => {
                write!(f, "Unsupported store endpoint: {endpoint}")
            }
        }
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::ConnectionFailed(msg) => write!(f, "Failed to connect: {msg}"),
            TransportError::RequestFailed { message, .. } => {
                write!(f, "Request failed: {message}")
            }
            TransportError::Status { status, body } => {
                write!(f, "Store returned status {status}: {body}")
            }
            TransportError::MalformedResponse(msg) => write!(f, "Malformed response: {msg}"),
            TransportError::ScrollFailed(msg) => write!(f, "Error scrolling: {msg}"),
            TransportError::BulkFailed(msg) => write!(f, "Error during bulk upsert: {msg}"),
        }
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::Malformed(msg) => write!(f, "malformed record: {msg}"),
            DecodeError::MissingId => write!(f, "record has no id"),
            DecodeError::InvalidSource(kind) => {
                write!(f, "record source must be an object or null, found {kind}")
            }
        }
    }
}

impl std::error::Error for DumpError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DumpError::Io(e) => Some(e),
            DumpError::File { source, .. } => Some(source),
            DumpError::MongoDb(e) => Some(e),
            _ => None,
        }
    }
}
impl std::error::Error for ConfigError {}
impl std::error::Error for TransportError {}
impl std::error::Error for DecodeError {}

/* ========================= Conversions to DumpError ========================= */

impl From<io::Error> for DumpError {
    fn from(err: io::Error) -> Self {
        DumpError::Io(err)
    }
}

impl From<mongodb::error::Error> for DumpError {
    fn from(err: mongodb::error::Error) -> Self {
        DumpError::MongoDb(err)
    }
}

impl From<reqwest::Error> for DumpError {
    fn from(err: reqwest::Error) -> Self {
        let transient = err.is_connect() || err.is_timeout();
        if err.is_decode() {
            return DumpError::Transport(TransportError::MalformedResponse(err.to_string()));
        }
        DumpError::Transport(TransportError::RequestFailed {
            transient,
            message: err.to_string(),
        })
    }
}

impl From<ConfigError> for DumpError {
    fn from(err: ConfigError) -> Self {
        DumpError::Config(err)
    }
}

impl From<TransportError> for DumpError {
    fn from(err: TransportError) -> Self {
        DumpError::Transport(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_transience() {
        assert!(TransportError::ConnectionFailed("refused".into()).is_transient());
        assert!(
            TransportError::Status {
                status: 503,
                body: String::new()
            }
            .is_transient()
        );
        assert!(
            !TransportError::Status {
                status: 400,
                body: String::new()
            }
            .is_transient()
        );
        assert!(!TransportError::MalformedResponse("x".into()).is_transient());
    }

    #[test]
    fn test_config_errors_are_not_transient() {
        let err: DumpError = ConfigError::NoFilesMatched("dump.*".into()).into();
        assert!(!err.is_transient());
        assert_eq!(
            err.to_string(),
            "Configuration error: No files found matching \"dump.*\""
        );
    }

    #[test]
    fn test_serde_failures_keep_their_origin() {
        let err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let local = DumpError::encoding("record 7", err);
        assert!(matches!(local, DumpError::Generic(_)));
        assert!(local.to_string().starts_with("Error encoding record 7: "));
        assert!(!local.is_transient());

        let err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert!(matches!(
            DumpError::malformed(err),
            DumpError::Transport(TransportError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_file_error_display() {
        let err = DumpError::file(
            "creating",
            "out/dump.json.gz",
            io::Error::new(io::ErrorKind::NotFound, "missing directory"),
        );
        let text = err.to_string();
        assert!(text.contains("creating"));
        assert!(text.contains("out/dump.json.gz"));
    }
}
