//! Serve an [App](crate::App) over HTTP/1.1.
//!

mod serve;
mod server;
mod shutdown;

pub use server::Server;
