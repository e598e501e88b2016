#![forbid(unsafe_code)]

//! A minimal web toolkit: typed path routing, signed cookie sessions with
//! CSRF protection, and a small HTML template language.
//!
//! ```no_run
//! use mallo::{App, Config, Server};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), mallo::Error> {
//!     let mut app = App::new(Config::from_env());
//!
//!     app.route("/").get(|_, _| Ok("<h1>Hello</h1>"))?;
//!
//!     Server::new(app).listen(("127.0.0.1", 8080)).await
//! }
//! ```
//!

pub mod error;
pub mod session;
pub mod template;

mod app;
mod config;
mod request;
mod response;
mod server;
mod static_files;

pub use app::{App, Handler, RouteBuilder, STATIC_ROUTE};
pub use config::Config;
pub use error::Error;
pub use http;
pub use mallo_router::{ParamValue, Params, PatternError, UrlForError};
pub use request::{Request, UploadedFile};
pub use response::{Body, HandlerResult, Response};
pub use server::Server;
pub use session::{Session, SessionStore};
pub use template::{TemplateEngine, TemplateError};

/// The result type returned by handlers.
///
pub type Result<T = HandlerResult, E = Error> = std::result::Result<T, E>;
