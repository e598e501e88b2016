//! Signed-cookie sessions and CSRF protection.
//!

pub mod csrf;

mod store;

pub use store::{Session, SessionStore};
