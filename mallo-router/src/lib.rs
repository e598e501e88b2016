#![forbid(unsafe_code)]

mod error;
mod params;
mod pattern;
mod router;

pub use error::{PatternError, UrlForError};
pub use params::{ParamValue, Params};
pub use pattern::{Kind, Pattern, Segment};
pub use router::{Resolved, Route, Router};
