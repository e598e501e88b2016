use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};

/// The default limit for request bodies: 10 MiB.
const DEFAULT_MAX_REQUEST_SIZE: usize = 10 * 1024 * 1024;

/// The default `max-age` of static files outside of debug mode.
const DEFAULT_STATIC_CACHE_SECONDS: u64 = 3600;

/// Application settings.
///
/// Every field has a default, so a partial document deserializes into a
/// complete `Config`. The builder methods consume and return self.
///
/// ```
/// use mallo::Config;
///
/// let config = Config::new().debug(true).secret_key("change me");
///
/// assert!(config.is_debug());
/// assert_eq!(config.static_max_age(), 0);
/// ```
///
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    debug: bool,
    secret_key: Option<String>,
    csrf_protect: bool,
    session_cookie: String,
    auto_escape: bool,
    security_headers: bool,
    enable_logging: bool,
    static_folder: PathBuf,
    static_url_path: String,
    static_cache_seconds: Option<u64>,
    error_pages: HashMap<u16, PathBuf>,
    max_request_size: usize,
}

impl Config {
    pub fn new() -> Self {
        Default::default()
    }

    /// Returns the default config with `debug` and `secret_key` read from the
    /// `MALLO_DEBUG` and `MALLO_SECRET_KEY` environment variables.
    ///
    pub fn from_env() -> Self {
        let mut config = Self::new();

        if let Ok(value) = env::var("MALLO_DEBUG") {
            config.debug = matches!(value.trim(), "1" | "true" | "yes");
        }

        if let Ok(secret) = env::var("MALLO_SECRET_KEY")
            && !secret.is_empty()
        {
            config.secret_key = Some(secret);
        }

        config
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Sets the secret used to sign session cookies. Sessions and CSRF
    /// protection are disabled until a secret is set. An empty secret is the
    /// same as no secret.
    ///
    pub fn secret_key(mut self, secret: impl Into<String>) -> Self {
        self.secret_key = Some(secret.into()).filter(|secret| !secret.is_empty());
        self
    }

    pub fn csrf_protect(mut self, enabled: bool) -> Self {
        self.csrf_protect = enabled;
        self
    }

    pub fn session_cookie(mut self, name: impl Into<String>) -> Self {
        self.session_cookie = name.into();
        self
    }

    pub fn auto_escape(mut self, enabled: bool) -> Self {
        self.auto_escape = enabled;
        self
    }

    pub fn security_headers(mut self, enabled: bool) -> Self {
        self.security_headers = enabled;
        self
    }

    pub fn enable_logging(mut self, enabled: bool) -> Self {
        self.enable_logging = enabled;
        self
    }

    pub fn static_folder(mut self, folder: impl Into<PathBuf>) -> Self {
        self.static_folder = folder.into();
        self
    }

    pub fn static_url_path(mut self, prefix: impl Into<String>) -> Self {
        self.static_url_path = prefix.into();
        self
    }

    pub fn static_cache_seconds(mut self, seconds: u64) -> Self {
        self.static_cache_seconds = Some(seconds);
        self
    }

    /// Renders the template at `path` in place of the plain-text body of
    /// responses with the given status.
    ///
    pub fn error_page(mut self, status: u16, path: impl Into<PathBuf>) -> Self {
        self.error_pages.insert(status, path.into());
        self
    }

    pub fn max_request_size(mut self, bytes: usize) -> Self {
        self.max_request_size = bytes;
        self
    }
}

impl Config {
    pub fn is_debug(&self) -> bool {
        self.debug
    }

    /// Returns the non-empty secret key, if one is configured.
    ///
    pub fn secret(&self) -> Option<&str> {
        self.secret_key.as_deref().filter(|secret| !secret.is_empty())
    }

    pub fn is_csrf_protected(&self) -> bool {
        self.csrf_protect
    }

    pub fn cookie_name(&self) -> &str {
        &self.session_cookie
    }

    pub fn is_auto_escape(&self) -> bool {
        self.auto_escape
    }

    pub fn has_security_headers(&self) -> bool {
        self.security_headers
    }

    pub fn is_logging_enabled(&self) -> bool {
        self.enable_logging
    }

    pub fn static_dir(&self) -> &Path {
        &self.static_folder
    }

    /// Returns the url prefix of static files without a trailing slash.
    ///
    pub fn static_prefix(&self) -> &str {
        self.static_url_path.trim_end_matches('/')
    }

    /// Returns the configured `max-age` of static files. When unset, static
    /// files are not cached in debug mode.
    ///
    pub fn static_max_age(&self) -> u64 {
        match self.static_cache_seconds {
            Some(seconds) => seconds,
            None if self.debug => 0,
            None => DEFAULT_STATIC_CACHE_SECONDS,
        }
    }

    pub fn error_page_for(&self, status: u16) -> Option<&Path> {
        self.error_pages.get(&status).map(PathBuf::as_path)
    }

    pub fn request_size_limit(&self) -> usize {
        self.max_request_size
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            debug: false,
            secret_key: None,
            csrf_protect: true,
            session_cookie: "mallo_session".to_owned(),
            auto_escape: true,
            security_headers: true,
            enable_logging: true,
            static_folder: PathBuf::from("static"),
            static_url_path: "/static".to_owned(),
            static_cache_seconds: None,
            error_pages: HashMap::new(),
            max_request_size: DEFAULT_MAX_REQUEST_SIZE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Config;

    #[test]
    fn defaults() {
        let config = Config::default();

        assert!(!config.is_debug());
        assert!(config.secret().is_none());
        assert!(config.is_csrf_protected());
        assert_eq!(config.cookie_name(), "mallo_session");
        assert_eq!(config.static_prefix(), "/static");
        assert_eq!(config.static_max_age(), 3600);
        assert_eq!(config.request_size_limit(), 10 * 1024 * 1024);
    }

    #[test]
    fn partial_documents_fill_defaults() {
        let json = r#"{ "debug": true, "secret_key": "s3cret", "error_pages": { "404": "404.html" } }"#;
        let config: Config = serde_json::from_str(json).unwrap();

        assert!(config.is_debug());
        assert_eq!(config.secret(), Some("s3cret"));
        assert_eq!(config.static_max_age(), 0);
        assert!(config.error_page_for(404).is_some());
        assert!(config.is_auto_escape());
    }

    #[test]
    fn empty_secrets_are_unset() {
        assert!(Config::new().secret_key("").secret().is_none());
        assert_eq!(Config::new().secret_key("k").secret(), Some("k"));

        let config: Config = serde_json::from_str(r#"{ "secret_key": "" }"#).unwrap();
        assert!(config.secret().is_none());
    }

    #[test]
    fn explicit_cache_seconds_win_in_debug() {
        let config = Config::new().debug(true).static_cache_seconds(60);

        assert_eq!(config.static_max_age(), 60);
    }
}
