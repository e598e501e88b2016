//! Error handling.
//!

mod raise;

use std::fmt::{self, Display, Formatter};
use std::io::{self, Error as IoError};

#[doc(hidden)]
pub use http::StatusCode; // Required for the raise macro.

use crate::response::Response;

/// A type alias for `Box<dyn Error + Send + Sync>`.
///
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// An error that is converted to a response with the status it carries.
///
/// Any type that implements `std::error::Error` converts into an `Error` with
/// a `500 Internal Server Error` status, which lets handlers propagate
/// template, JSON, and I/O failures with `?`.
///
#[derive(Debug)]
pub struct Error {
    status: StatusCode,
    kind: ErrorKind,
}

#[derive(Debug)]
enum ErrorKind {
    Message(String),
    Other(BoxError),
}

impl Error {
    /// Returns a new error with the provided status and message.
    ///
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            kind: ErrorKind::Message(message.into()),
        }
    }

    /// Returns a new error with the provided status and source.
    ///
    pub fn from_source(status: StatusCode, source: BoxError) -> Self {
        Self {
            status,
            kind: ErrorKind::Other(source),
        }
    }

    /// Returns a new error with the provided source a status code derived from
    /// the [`ErrorKind`](io::ErrorKind).
    ///
    pub fn from_io_error(error: IoError) -> Self {
        let status = match error.kind() {
            // Generally indicates a malformed request.
            io::ErrorKind::InvalidData | io::ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,

            // Implies restricted access.
            io::ErrorKind::IsADirectory
            | io::ErrorKind::NotADirectory
            | io::ErrorKind::PermissionDenied => StatusCode::FORBIDDEN,

            // Indicates a missing resource.
            io::ErrorKind::NotFound => StatusCode::NOT_FOUND,

            // Any other kind is treated as an internal server error.
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        Self::from_source(status, Box::new(error))
    }

    /// Returns the status code of the response generated from self.
    ///
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Returns a reference to the error source.
    ///
    pub fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        if let ErrorKind::Other(source) = &self.kind {
            Some(&**source)
        } else {
            None
        }
    }

    /// Returns the message of self followed by the message of each error in
    /// the source chain, one per line.
    ///
    pub fn detail(&self) -> String {
        let mut detail = self.to_string();
        let mut source = self.source().and_then(|error| error.source());

        while let Some(error) = source {
            detail.push_str("\ncaused by: ");
            detail.push_str(&error.to_string());
            source = error.source();
        }

        detail
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match &self.kind {
            ErrorKind::Other(source) => Display::fmt(&**source, f),
            ErrorKind::Message(message) => Display::fmt(&**message, f),
        }
    }
}

impl<E> From<E> for Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn from(source: E) -> Self {
        Self::from_source(StatusCode::INTERNAL_SERVER_ERROR, Box::new(source))
    }
}

impl From<Error> for Response {
    fn from(error: Error) -> Self {
        Response::text(error.to_string()).with_status(error.status)
    }
}
