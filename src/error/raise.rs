/// Return early with a new error or decorate an existing one.
///
/// # Examples
///
/// Return an error that uses the canonical reason phrase of the provided
/// status code.
///
/// ```
/// use mallo::{App, Request};
///
/// fn show(request: &Request, _: &App) -> mallo::Result<String> {
///     let Some(name) = request.query("name") else {
///         mallo::raise!(400, message = "missing query parameter: name");
///     };
///
///     Ok(format!("<p>{}</p>", name))
/// }
/// ```
///
/// ### Decorate an existing error.
///
/// The generic impl of `From<E> for Error` uses `500` as the status code. Use
/// `raise!` when a more specific status is known at the call site.
///
/// ```
/// use std::io;
/// use mallo::raise;
///
/// fn invalid_input() -> io::Result<()> {
///     Err(io::ErrorKind::InvalidInput.into())
/// }
///
/// # fn run() -> mallo::Result<()> {
/// invalid_input().or_else(|error| raise!(400, error))?;
/// # Ok(())
/// # }
/// ```
///
#[macro_export]
macro_rules! raise {
    (@ctor $status:expr, message = $message:expr $(,)?) => {
        return Err($crate::Error::new($status, $message))
    };
    (@ctor $status:expr, boxed = $source:expr $(,)?) => {
        return Err($crate::Error::from_source($status, $source))
    };
    (@ctor $status:expr, $source:expr $(,)?) => {
        return Err($crate::Error::from_source($status, Box::new($source)))
    };
    (@ctor $status:expr) => {{
        let status = $status;
        let message = status.canonical_reason().unwrap_or_default().to_owned();
        return Err($crate::Error::new(status, message))
    }};

    (boxed = $source:expr $(,)?) => { $crate::raise!(500, boxed = $source) };
    (message = $message:expr $(,)?) => { $crate::raise!(500, message = $message) };

    (400 $($args:tt)*) => { $crate::raise!(BAD_REQUEST $($args)*) };
    (401 $($args:tt)*) => { $crate::raise!(UNAUTHORIZED $($args)*) };
    (403 $($args:tt)*) => { $crate::raise!(FORBIDDEN $($args)*) };
    (404 $($args:tt)*) => { $crate::raise!(NOT_FOUND $($args)*) };
    (405 $($args:tt)*) => { $crate::raise!(METHOD_NOT_ALLOWED $($args)*) };
    (409 $($args:tt)*) => { $crate::raise!(CONFLICT $($args)*) };
    (413 $($args:tt)*) => { $crate::raise!(PAYLOAD_TOO_LARGE $($args)*) };
    (415 $($args:tt)*) => { $crate::raise!(UNSUPPORTED_MEDIA_TYPE $($args)*) };
    (422 $($args:tt)*) => { $crate::raise!(UNPROCESSABLE_ENTITY $($args)*) };
    (500 $($args:tt)*) => { $crate::raise!(INTERNAL_SERVER_ERROR $($args)*) };
    (503 $($args:tt)*) => { $crate::raise!(SERVICE_UNAVAILABLE $($args)*) };

    ($status:ident $($args:tt)*) => {
        $crate::raise!(@ctor $crate::error::StatusCode::$status $($args)*)
    };
}
