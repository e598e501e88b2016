use bytes::Bytes;
use cookie::{Cookie, CookieJar};
use http::header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE, LOCATION, SET_COOKIE};
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use serde::Serialize;
use serde_json::Value;
use std::fmt::{self, Debug, Formatter};

use super::{APPLICATION_JSON, APPLICATION_OCTET_STREAM, TEXT_HTML, TEXT_PLAIN};
use crate::error::Error;

/// The body of a [`Response`].
///
#[derive(Clone, Debug, PartialEq)]
pub enum Body {
    Text(String),
    Json(Value),
    Bytes(Bytes),
}

/// An outbound response.
///
/// Cookies added to the jar returned by [`Response::cookies_mut`] are
/// serialized into `Set-Cookie` headers when the response is sent.
///
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    cookies: CookieJar,
    body: Body,
}

impl Response {
    pub fn new(body: Body) -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            cookies: CookieJar::new(),
            body,
        }
    }

    /// Returns a `text/html` response.
    ///
    pub fn html(body: impl Into<String>) -> Self {
        Self::new(Body::Text(body.into())).with_header(CONTENT_TYPE, TEXT_HTML)
    }

    /// Returns a `text/plain` response.
    ///
    pub fn text(body: impl Into<String>) -> Self {
        Self::new(Body::Text(body.into())).with_header(CONTENT_TYPE, TEXT_PLAIN)
    }

    /// Serializes `body` and returns an `application/json` response.
    ///
    /// # Errors
    ///
    /// Returns an error if `body` cannot be represented as JSON.
    ///
    pub fn json<T>(body: &T) -> Result<Self, Error>
    where
        T: Serialize,
    {
        Ok(Self::json_value(serde_json::to_value(body)?))
    }

    pub fn json_value(body: Value) -> Self {
        Self::new(Body::Json(body)).with_header(CONTENT_TYPE, APPLICATION_JSON)
    }

    /// Returns a response with a binary body and the provided content type.
    ///
    pub fn bytes(content_type: HeaderValue, body: impl Into<Bytes>) -> Self {
        Self::new(Body::Bytes(body.into())).with_header(CONTENT_TYPE, content_type)
    }

    /// Returns a `302 Found` response that redirects to `location`.
    ///
    /// # Errors
    ///
    /// Returns an error if `location` is not a valid header value.
    ///
    pub fn redirect(location: &str) -> Result<Self, Error> {
        let location = HeaderValue::try_from(location)?;

        Ok(Self::new(Body::Text(String::new()))
            .with_status(StatusCode::FOUND)
            .with_header(LOCATION, location))
    }

    /// Returns a response that prompts the client to download `body` as a
    /// file named `filename`. The content type is guessed from the
    /// extension.
    ///
    /// # Errors
    ///
    /// Returns an error if the content disposition is not a valid header
    /// value.
    ///
    pub fn attachment(filename: &str, body: impl Into<Bytes>) -> Result<Self, Error> {
        let content_type = mime_guess::from_path(filename)
            .first_raw()
            .map_or(APPLICATION_OCTET_STREAM, HeaderValue::from_static);

        let disposition = {
            let name: String = filename
                .chars()
                .filter(|c| !matches!(c, '"' | '\\' | '\r' | '\n'))
                .collect();

            HeaderValue::try_from(format!("attachment; filename=\"{}\"", name))?
        };

        Ok(Self::bytes(content_type, body).with_header(CONTENT_DISPOSITION, disposition))
    }

    /// Consumes self and returns it with `status`.
    ///
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    /// Consumes self and returns it with the header `name` set to `value`.
    /// An existing value is replaced.
    ///
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }
}

impl Response {
    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn status_mut(&mut self) -> &mut StatusCode {
        &mut self.status
    }

    /// A shorthand method for `*self.status_mut() = status`.
    ///
    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    /// Returns the body if it is text.
    ///
    pub fn body_str(&self) -> Option<&str> {
        if let Body::Text(text) = &self.body {
            Some(text)
        } else {
            None
        }
    }

    /// Returns a reference to the response cookies.
    ///
    pub fn cookies(&self) -> &CookieJar {
        &self.cookies
    }

    /// Returns a mutable reference to the response cookies.
    ///
    pub fn cookies_mut(&mut self) -> &mut CookieJar {
        &mut self.cookies
    }

    pub fn set_cookie(&mut self, cookie: impl Into<Cookie<'static>>) {
        self.cookies.add(cookie);
    }

    /// Instructs the client to remove the cookie `name` set at the path `/`.
    ///
    pub fn delete_cookie(&mut self, name: &str) {
        let mut cookie = Cookie::build((name.to_owned(), "")).path("/").build();

        // Indicates to the client that the cookie should be removed.
        cookie.make_removal();
        self.cookies.add(cookie);
    }

    /// Consumes the response and returns its http representation. Cookies
    /// that changed are mapped to `Set-Cookie` headers and `Content-Length`
    /// is set from the encoded body.
    ///
    /// # Errors
    ///
    /// Returns an error if a JSON body cannot be encoded or if a cookie is
    /// not a valid header value.
    ///
    pub fn into_http(self) -> Result<http::Response<Bytes>, Error> {
        let Self {
            status,
            mut headers,
            cookies,
            body,
        } = self;

        let body = match body {
            Body::Text(text) => Bytes::from(text),
            Body::Json(json) => Bytes::from(serde_json::to_vec(&json)?),
            Body::Bytes(bytes) => bytes,
        };

        for cookie in cookies.delta() {
            let value = HeaderValue::try_from(cookie.encoded().to_string())?;
            headers.append(SET_COOKIE, value);
        }

        headers.insert(CONTENT_LENGTH, HeaderValue::from(body.len()));

        let mut response = http::Response::new(body);

        *response.status_mut() = status;
        *response.headers_mut() = headers;

        Ok(response)
    }
}

impl Debug for Response {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("body", &self.body)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use http::StatusCode;
    use http::header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE, LOCATION, SET_COOKIE};
    use serde_json::json;

    use super::Response;

    #[test]
    fn html_into_http() {
        let response = Response::html("<p>hi</p>").into_http().unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_TYPE], "text/html; charset=utf-8");
        assert_eq!(response.headers()[CONTENT_LENGTH], "9");
        assert_eq!(&response.body()[..], b"<p>hi</p>");
    }

    #[test]
    fn json_into_http() {
        let response = Response::json(&json!({ "ok": true }))
            .unwrap()
            .with_status(StatusCode::CREATED)
            .into_http()
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
        assert_eq!(&response.body()[..], br#"{"ok":true}"#);
    }

    #[test]
    fn redirect() {
        let response = Response::redirect("/login?next=%2F").unwrap();

        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers()[LOCATION], "/login?next=%2F");
        assert!(Response::redirect("/bad\nheader").is_err());
    }

    #[test]
    fn attachment_guesses_content_type() {
        let response = Response::attachment("report \"q1\".csv", "a,b\n1,2\n").unwrap();

        assert_eq!(response.headers()[CONTENT_TYPE], "text/csv");
        assert_eq!(
            response.headers()[CONTENT_DISPOSITION],
            "attachment; filename=\"report q1.csv\""
        );
    }

    #[test]
    fn cookies_become_set_cookie_headers() {
        let mut response = Response::text("ok");

        response.set_cookie(("theme", "dark mode"));
        response.delete_cookie("stale");

        let response = response.into_http().unwrap();
        let mut values: Vec<_> = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .map(|value| value.to_str().unwrap().to_owned())
            .collect();

        values.sort();

        assert_eq!(values.len(), 2);
        assert!(values[0].starts_with("stale=; Path=/; Max-Age=0"));
        assert_eq!(values[1], "theme=dark%20mode");
    }
}
