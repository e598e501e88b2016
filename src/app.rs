use bytes::Bytes;
use http::header::{self, HeaderValue};
use http::{Method, StatusCode};
use mallo_router::{PatternError, Resolved, Router, UrlForError};
use serde::Serialize;
use std::any::Any;
use std::collections::HashMap;
use std::fmt::{self, Debug, Display, Formatter};
use std::marker::PhantomData;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use crate::config::Config;
use crate::error::Error;
use crate::request::Request;
use crate::response::{HandlerResult, Response};
use crate::session::{Session, SessionStore, csrf};
use crate::static_files::StaticFiles;
use crate::template::{TemplateEngine, TemplateError, escape_html};

/// The name of the route that serves static files.
pub const STATIC_ROUTE: &str = "static";

/// Responds to the requests of one route.
///
/// Closures with the signature `Fn(&Request, &App) -> mallo::Result<R>` are
/// registered directly with [`RouteBuilder`]. Implement this trait for
/// handlers that carry their own state.
///
pub trait Handler: Send + Sync + 'static {
    fn call(&self, request: &Request, app: &App) -> Result<HandlerResult, Error>;
}

/// An application: routes, settings, the template engine, and the session
/// store.
///
/// ```
/// use mallo::{App, Config};
///
/// let mut app = App::new(Config::new());
///
/// app.route("/hello/<name>")
///     .named("hello")
///     .get(|request, _| {
///         let name = request.param("name").map(ToString::to_string);
///         Ok(format!("<p>Hello, {}!</p>", name.unwrap_or_default()))
///     })
///     .unwrap();
///
/// assert_eq!(app.url_for("hello", [("name", "ada")]).unwrap(), "/hello/ada");
/// ```
///
pub struct App {
    config: Config,
    router: Router<Arc<dyn Handler>>,
    templates: TemplateEngine,
    sessions: Option<SessionStore>,
    error_handlers: HashMap<StatusCode, Arc<dyn Handler>>,
}

/// Registers handlers for one path pattern.
///
/// Returned by [`App::route`].
///
pub struct RouteBuilder<'a> {
    app: &'a mut App,
    pattern: String,
    name: Option<String>,
}

struct HandlerFn<F, R> {
    f: F,
    _result: PhantomData<fn() -> R>,
}

impl<F, R> Handler for HandlerFn<F, R>
where
    F: Fn(&Request, &App) -> Result<R, Error> + Send + Sync + 'static,
    R: Into<HandlerResult> + 'static,
{
    fn call(&self, request: &Request, app: &App) -> Result<HandlerResult, Error> {
        (self.f)(request, app).map(Into::into)
    }
}

fn handler_fn<F, R>(f: F) -> Arc<dyn Handler>
where
    F: Fn(&Request, &App) -> Result<R, Error> + Send + Sync + 'static,
    R: Into<HandlerResult> + 'static,
{
    Arc::new(HandlerFn {
        f,
        _result: PhantomData,
    })
}

impl App {
    /// Returns a new application.
    ///
    /// Sessions and CSRF protection are enabled when `config` has a secret
    /// key. If the configured static folder exists, a `GET` route named
    /// `static` serves its files.
    ///
    pub fn new(config: Config) -> Self {
        let sessions = config
            .secret()
            .map(|secret| SessionStore::new(secret, config.cookie_name()));

        let mut app = Self {
            templates: TemplateEngine::new(config.is_auto_escape()),
            router: Router::new(),
            error_handlers: HashMap::new(),
            sessions,
            config,
        };

        let static_dir = app.config.static_dir().to_owned();

        if static_dir.is_dir() {
            let pattern = format!("{}/<path:filename>", app.config.static_prefix());
            let files = StaticFiles::new(static_dir, app.config.static_max_age());

            if let Err(error) = app.route(&pattern).named(STATIC_ROUTE).handle(Method::GET, files) {
                tracing::warn!(%error, "static files are not served");
            }
        }

        app
    }

    /// Starts registering handlers for `pattern`.
    ///
    pub fn route(&mut self, pattern: &str) -> RouteBuilder<'_> {
        RouteBuilder {
            app: self,
            pattern: pattern.to_owned(),
            name: None,
        }
    }

    /// Replaces the default response for errors with `status`. The handler
    /// runs for 403, 404, 405, and 500 responses generated by the
    /// dispatcher and for errors returned by route handlers.
    ///
    /// Text and JSON results are sent with `status`. Explicit responses are
    /// sent as is.
    ///
    pub fn error_handler<F, R>(&mut self, status: StatusCode, handler: F) -> &mut Self
    where
        F: Fn(&Request, &App) -> Result<R, Error> + Send + Sync + 'static,
        R: Into<HandlerResult> + 'static,
    {
        self.error_handlers.insert(status, handler_fn(handler));
        self
    }

    /// Builds the path of the route registered under `name`.
    ///
    pub fn url_for<I, K, V>(&self, name: &str, params: I) -> Result<String, UrlForError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Display,
    {
        self.router.url_for(name, params)
    }

    /// Renders the template file at `path` with the application's escaping
    /// policy. Templates are reparsed on every render in debug mode.
    ///
    pub fn render_template<C>(&self, path: impl AsRef<Path>, context: &C) -> Result<String, TemplateError>
    where
        C: Serialize + ?Sized,
    {
        self.templates
            .render_file(path, self.config.is_debug(), context)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn router(&self) -> &Router<Arc<dyn Handler>> {
        &self.router
    }

    pub fn templates(&self) -> &TemplateEngine {
        &self.templates
    }

    /// Returns the session store. `None` when no secret key is configured.
    ///
    pub fn sessions(&self) -> Option<&SessionStore> {
        self.sessions.as_ref()
    }
}

impl App {
    /// Handles one request end to end.
    ///
    /// Handler errors and panics are converted to `500` responses for this
    /// request. This method never panics.
    ///
    pub fn dispatch(&self, request: http::Request<Bytes>) -> http::Response<Bytes> {
        let started = Instant::now();
        let mut request = Request::new(request);
        let created = self.load_session(&mut request);

        let response = self.respond(&mut request);
        let response = self.finalize(response, created.as_ref());

        if self.config.is_logging_enabled() {
            let elapsed = started.elapsed().as_secs_f64() * 1000.0;

            tracing::info!(
                "{} {} -> {} ({:.2}ms)",
                request.method(),
                request.path(),
                response.status().as_u16(),
                elapsed,
            );
        }

        match response.into_http() {
            Ok(response) => response,
            Err(error) => {
                tracing::error!(%error, "failed to encode the response");
                internal_server_error()
            }
        }
    }

    /// Attaches the session of the request. Returns the session if it was
    /// created for this request.
    ///
    fn load_session(&self, request: &mut Request) -> Option<Session> {
        let store = self.sessions.as_ref()?;
        let (session, created) = store.load(request.cookies());

        request.set_session(session.clone());
        created.then_some(session)
    }

    fn respond(&self, request: &mut Request) -> Response {
        if self.sessions.is_some()
            && self.config.is_csrf_protected()
            && csrf::requires_token(request.method())
            && !csrf::verify(request)
        {
            tracing::warn!(
                method = %request.method(),
                path = request.path(),
                "rejected a request without a valid csrf token",
            );

            let error = Error::new(StatusCode::FORBIDDEN, "The CSRF token is missing or invalid.");
            return self.failure(request, error);
        }

        let handler = match self.router.resolve(request.method(), request.path()) {
            Resolved::Found(route, params) => {
                let handler = Arc::clone(route.handler());

                request.set_params(params);
                handler
            }
            Resolved::MethodNotAllowed(allowed) => {
                let message = format!("{} is not allowed for this url.", request.method());
                let mut response = self.failure(request, Error::new(StatusCode::METHOD_NOT_ALLOWED, message));
                let allow = allowed.iter().map(Method::as_str).collect::<Vec<_>>().join(", ");

                if let Ok(value) = HeaderValue::try_from(allow) {
                    response.headers_mut().entry(header::ALLOW).or_insert(value);
                }

                return response;
            }
            Resolved::NotFound => {
                let message = format!("{} was not found on this server.", request.path());
                return self.failure(request, Error::new(StatusCode::NOT_FOUND, message));
            }
        };

        match invoke(&*handler, request, self) {
            Ok(result) => result.into_response(),
            Err(error) => {
                tracing::error!(
                    method = %request.method(),
                    path = request.path(),
                    error = %error.detail(),
                    "handler failed",
                );

                self.failure(request, error)
            }
        }
    }

    /// Returns the response for `error`: the registered error handler, the
    /// configured error page, or a small built-in page.
    ///
    fn failure(&self, request: &Request, error: Error) -> Response {
        let status = error.status();

        if let Some(handler) = self.error_handlers.get(&status) {
            match invoke(&**handler, request, self) {
                Ok(HandlerResult::Explicit(response)) => return response,
                Ok(result) => return result.into_response().with_status(status),
                Err(error) => {
                    tracing::error!(error = %error.detail(), "error handler for {} failed", status);
                }
            }
        }

        if let Some(page) = self.config.error_page_for(status.as_u16()) {
            let context = ErrorContext {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or_default(),
                message: error.to_string(),
                path: request.path(),
            };

            match self.render_template(page, &context) {
                Ok(html) => return Response::html(html).with_status(status),
                Err(error) => {
                    tracing::error!(%error, page = %page.display(), "error page failed to render");
                }
            }
        }

        Response::html(self.error_page(status, &error)).with_status(status)
    }

    fn error_page(&self, status: StatusCode, error: &Error) -> String {
        let mut html = format!(
            "<h1>{} {}</h1>",
            status.as_u16(),
            status.canonical_reason().unwrap_or_default()
        );

        if status.is_server_error() {
            // Internal details are only shown while debugging.
            if self.config.is_debug() {
                html.push_str("<pre>");
                escape_html(&mut html, &error.detail());
                html.push_str("</pre>");
            }
        } else {
            html.push_str("<p>");
            escape_html(&mut html, &error.to_string());
            html.push_str("</p>");
        }

        html
    }

    /// Applies the headers every response carries and issues the session
    /// cookie of a newly created session.
    ///
    fn finalize(&self, mut response: Response, created: Option<&Session>) -> Response {
        let headers = response.headers_mut();

        headers
            .entry(header::SERVER)
            .or_insert(HeaderValue::from_static("Mallo"));

        if self.config.has_security_headers() {
            let defaults = [
                (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
                (header::X_FRAME_OPTIONS, "DENY"),
                (header::REFERRER_POLICY, "same-origin"),
            ];

            for (name, value) in defaults {
                headers.entry(name).or_insert(HeaderValue::from_static(value));
            }
        }

        if self.config.is_debug() {
            let no_cache = [
                (header::CACHE_CONTROL, "no-store, no-cache, must-revalidate, max-age=0"),
                (header::PRAGMA, "no-cache"),
                (header::EXPIRES, "0"),
            ];

            for (name, value) in no_cache {
                headers.insert(name, HeaderValue::from_static(value));
            }
        }

        if let Some(session) = created
            && let Some(store) = &self.sessions
        {
            store.issue(session, response.cookies_mut());
        }

        response
    }
}

impl Debug for App {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let routes: Vec<_> = self
            .router
            .iter()
            .map(|route| format!("{} {}", route.method(), route.pattern()))
            .collect();

        f.debug_struct("App")
            .field("config", &self.config)
            .field("routes", &routes)
            .finish()
    }
}

impl<'a> RouteBuilder<'a> {
    /// Names the handlers registered after this call for reverse lookup with
    /// [`App::url_for`].
    ///
    pub fn named(mut self, name: &str) -> Self {
        self.name = Some(name.to_owned());
        self
    }

    pub fn get<F, R>(self, handler: F) -> Result<Self, PatternError>
    where
        F: Fn(&Request, &App) -> Result<R, Error> + Send + Sync + 'static,
        R: Into<HandlerResult> + 'static,
    {
        self.to(Method::GET, handler)
    }

    pub fn post<F, R>(self, handler: F) -> Result<Self, PatternError>
    where
        F: Fn(&Request, &App) -> Result<R, Error> + Send + Sync + 'static,
        R: Into<HandlerResult> + 'static,
    {
        self.to(Method::POST, handler)
    }

    pub fn put<F, R>(self, handler: F) -> Result<Self, PatternError>
    where
        F: Fn(&Request, &App) -> Result<R, Error> + Send + Sync + 'static,
        R: Into<HandlerResult> + 'static,
    {
        self.to(Method::PUT, handler)
    }

    pub fn patch<F, R>(self, handler: F) -> Result<Self, PatternError>
    where
        F: Fn(&Request, &App) -> Result<R, Error> + Send + Sync + 'static,
        R: Into<HandlerResult> + 'static,
    {
        self.to(Method::PATCH, handler)
    }

    pub fn delete<F, R>(self, handler: F) -> Result<Self, PatternError>
    where
        F: Fn(&Request, &App) -> Result<R, Error> + Send + Sync + 'static,
        R: Into<HandlerResult> + 'static,
    {
        self.to(Method::DELETE, handler)
    }

    /// Registers `handler` for an arbitrary method.
    ///
    pub fn to<F, R>(self, method: Method, handler: F) -> Result<Self, PatternError>
    where
        F: Fn(&Request, &App) -> Result<R, Error> + Send + Sync + 'static,
        R: Into<HandlerResult> + 'static,
    {
        self.add(method, handler_fn(handler))
    }

    /// Registers a [`Handler`] implementation for `method`.
    ///
    pub fn handle<H>(self, method: Method, handler: H) -> Result<Self, PatternError>
    where
        H: Handler,
    {
        self.add(method, Arc::new(handler))
    }

    fn add(self, method: Method, handler: Arc<dyn Handler>) -> Result<Self, PatternError> {
        self.app
            .router
            .add(method, &self.pattern, self.name.as_deref(), handler)?;

        Ok(self)
    }
}

#[derive(Serialize)]
struct ErrorContext<'a> {
    status: u16,
    reason: &'a str,
    message: String,
    path: &'a str,
}

/// Calls `handler`, converting a panic into an error.
///
fn invoke(handler: &dyn Handler, request: &Request, app: &App) -> Result<HandlerResult, Error> {
    match panic::catch_unwind(AssertUnwindSafe(|| handler.call(request, app))) {
        Ok(result) => result,
        Err(payload) => Err(Error::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("handler panicked: {}", panic_message(&*payload)),
        )),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown panic payload"
    }
}

fn internal_server_error() -> http::Response<Bytes> {
    let mut response = http::Response::new(Bytes::from_static(b"Internal Server Error"));

    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use http::{Method, StatusCode, header};
    use serde_json::json;

    use super::App;
    use crate::config::Config;
    use crate::response::Response;

    fn get(app: &App, uri: &str) -> http::Response<Bytes> {
        app.dispatch(http::Request::get(uri).body(Bytes::new()).unwrap())
    }

    fn body(response: &http::Response<Bytes>) -> &str {
        std::str::from_utf8(response.body()).unwrap()
    }

    fn app() -> App {
        App::new(Config::new().static_folder("/nonexistent/static").enable_logging(false))
    }

    #[test]
    fn typed_params_reach_the_handler() {
        let mut app = app();

        app.route("/user/<int:id>")
            .get(|request, _| {
                let id = request.param("id").and_then(|id| id.as_int()).unwrap_or(-1);
                Ok(format!("user {}", id))
            })
            .unwrap();

        let response = get(&app, "/user/42");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body(&response), "user 42");
        assert_eq!(get(&app, "/user/abc").status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn default_headers_do_not_override_handler_headers() {
        let mut app = app();

        app.route("/frame")
            .get(|_, _| {
                let response = Response::html("ok").with_header(
                    header::X_FRAME_OPTIONS,
                    header::HeaderValue::from_static("SAMEORIGIN"),
                );

                Ok(response)
            })
            .unwrap();

        let response = get(&app, "/frame");

        assert_eq!(response.headers()[header::X_FRAME_OPTIONS], "SAMEORIGIN");
        assert_eq!(response.headers()[header::X_CONTENT_TYPE_OPTIONS], "nosniff");
        assert_eq!(response.headers()[header::REFERRER_POLICY], "same-origin");
        assert_eq!(response.headers()[header::SERVER], "Mallo");
    }

    #[test]
    fn security_headers_can_be_disabled() {
        let app = App::new(
            Config::new()
                .static_folder("/nonexistent/static")
                .security_headers(false),
        );

        let response = get(&app, "/missing");

        assert!(response.headers().get(header::X_FRAME_OPTIONS).is_none());
        assert_eq!(response.headers()[header::SERVER], "Mallo");
    }

    #[test]
    fn debug_mode_disables_caching() {
        let app = App::new(Config::new().static_folder("/nonexistent/static").debug(true));
        let response = get(&app, "/missing");

        assert_eq!(
            response.headers()[header::CACHE_CONTROL],
            "no-store, no-cache, must-revalidate, max-age=0"
        );
        assert_eq!(response.headers()[header::PRAGMA], "no-cache");
    }

    #[test]
    fn handler_errors_and_panics_are_500() {
        let mut app = app();

        app.route("/fail")
            .get(|_, _| -> crate::Result<String> { crate::raise!(message = "database is down") })
            .unwrap();

        app.route("/panic")
            .get(|_, _| -> crate::Result<String> { panic!("boom") })
            .unwrap();

        for uri in ["/fail", "/panic"] {
            let response = get(&app, uri);

            assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
            assert_eq!(body(&response), "<h1>500 Internal Server Error</h1>");
        }
    }

    #[test]
    fn debug_mode_shows_error_detail() {
        let mut app = App::new(Config::new().static_folder("/nonexistent/static").debug(true));

        app.route("/fail")
            .get(|_, _| -> crate::Result<String> { crate::raise!(message = "a < b") })
            .unwrap();

        let response = get(&app, "/fail");

        assert!(body(&response).contains("<pre>a &lt; b</pre>"));
    }

    #[test]
    fn handler_status_errors_keep_their_status() {
        let mut app = app();

        app.route("/teapot")
            .get(|_, _| -> crate::Result<String> { crate::raise!(403, message = "members only") })
            .unwrap();

        let response = get(&app, "/teapot");

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(body(&response), "<h1>403 Forbidden</h1><p>members only</p>");
    }

    #[test]
    fn custom_error_handlers() {
        let mut app = app();

        app.error_handler(StatusCode::NOT_FOUND, |request, _| {
            Ok(json!({ "missing": request.path() }))
        });

        let response = get(&app, "/nowhere");

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
        assert_eq!(body(&response), r#"{"missing":"/nowhere"}"#);
    }

    #[test]
    fn method_not_allowed_lists_allowed_methods() {
        let mut app = app();

        app.route("/items")
            .get(|_, _| Ok("list"))
            .unwrap()
            .put(|_, _| Ok("replace"))
            .unwrap();

        let response = app.dispatch(
            http::Request::builder()
                .method(Method::PATCH)
                .uri("/items")
                .body(Bytes::new())
                .unwrap(),
        );

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers()[header::ALLOW], "GET, PUT");
    }

    #[test]
    fn duplicate_routes_are_rejected() {
        let mut app = app();

        assert!(app.route("/a").get(|_, _| Ok("a")).is_ok());
        assert!(app.route("/a").get(|_, _| Ok("b")).is_err());
        assert!(app.route("/b/<uuid:id>").get(|_, _| Ok("c")).is_err());
    }
}
