//! Error handling for transfer runs.
//!
//! Errors fall into two groups:
//! - Fatal errors (configuration, transport, file I/O) travel up to `main`
//!   as a [`DumpError`] and end the run with a non-zero exit status
//! - Per-record errors (a malformed input line, a document rejected inside
//!   a bulk request) are logged and counted where they happen
//!
//! MongoDB driver errors are rendered as structured JSON through
//! [`mongo::extract_error_info`].

pub mod kinds;
pub mod mongo;

// Re-export commonly used types
pub use kinds::{ConfigError, DecodeError, DumpError, Result, TransportError};
pub use mongo::ErrorInfo;
