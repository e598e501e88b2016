//! A small HTML template language.
//!
//! ```text
//! {{ user.name }}            escaped output
//! {{ article.body | safe }}  raw output
//! {% if [not] path %} ... {% endif %}
//! {% for item in path %} ... {% endfor %}
//! ```
//!

mod engine;
mod node;
mod parser;
mod render;

use std::fmt::{self, Display, Formatter};
use std::io;
use std::path::PathBuf;

pub use engine::{Template, TemplateEngine};
pub use node::{Condition, Node, Path};
pub use parser::parse;
pub use render::{escape_html, is_truthy, render};

/// An error that occurred while loading, parsing, or rendering a template.
///
#[derive(Debug)]
pub enum TemplateError {
    /// The template source is malformed.
    Syntax { line: usize, message: String },

    /// The template file could not be read.
    Io { path: PathBuf, source: io::Error },

    /// The render context could not be converted to JSON.
    Context(serde_json::Error),
}

impl TemplateError {
    pub(crate) fn syntax(line: usize, message: impl Into<String>) -> Self {
        Self::Syntax {
            line,
            message: message.into(),
        }
    }
}

impl std::error::Error for TemplateError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Syntax { .. } => None,
            Self::Io { source, .. } => Some(source),
            Self::Context(source) => Some(source),
        }
    }
}

impl Display for TemplateError {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Self::Syntax { line, message } => {
                write!(f, "template syntax error on line {}: {}", line, message)
            }
            Self::Io { path, .. } => {
                write!(f, "unable to read template \"{}\"", path.display())
            }
            Self::Context(_) => f.write_str("template context is not serializable"),
        }
    }
}
