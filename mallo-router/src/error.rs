use http::Method;
use std::fmt::{self, Display, Formatter};

/// A route pattern could not be compiled or registered.
///
#[derive(Debug)]
pub struct PatternError {
    pattern: String,
    reason: Reason,
}

#[derive(Debug, PartialEq)]
pub(crate) enum Reason {
    DuplicateName(String),
    DuplicateRoute(Method),
    EmptyName,
    PathNotLast(String),
    UnknownKind(String),
}

/// Reverse lookup with [`Router::url_for`](crate::Router::url_for) failed.
///
#[derive(Debug, PartialEq)]
pub enum UrlForError {
    /// No route is registered under the requested name.
    RouteNotFound(String),

    /// The named route requires a parameter that was not provided.
    ParamMismatch { route: String, param: String },
}

impl PatternError {
    pub(crate) fn new(pattern: &str, reason: Reason) -> Self {
        Self {
            pattern: pattern.to_owned(),
            reason,
        }
    }

    /// Returns the source text of the pattern that failed to compile.
    ///
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    #[cfg(test)]
    pub(crate) fn reason(&self) -> &Reason {
        &self.reason
    }
}

impl std::error::Error for PatternError {}

impl Display for PatternError {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "invalid route pattern \"{}\": ", self.pattern)?;

        match &self.reason {
            Reason::DuplicateName(name) => {
                write!(f, "parameter \"{}\" appears more than once", name)
            }
            Reason::DuplicateRoute(method) => {
                write!(f, "a {} route is already registered for it", method)
            }
            Reason::EmptyName => f.write_str("parameters must be named"),
            Reason::PathNotLast(name) => {
                write!(f, "path parameter \"{}\" must be the last segment", name)
            }
            Reason::UnknownKind(kind) => write!(f, "unknown converter \"{}\"", kind),
        }
    }
}

impl std::error::Error for UrlForError {}

impl Display for UrlForError {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Self::RouteNotFound(name) => write!(f, "no route is named \"{}\"", name),
            Self::ParamMismatch { route, param } => {
                write!(f, "route \"{}\" requires the parameter \"{}\"", route, param)
            }
        }
    }
}
