use bytes::Bytes;
use cookie::{Cookie, CookieJar};
use http::header::{CONTENT_TYPE, COOKIE};
use http::{HeaderMap, Method};
use mallo_router::{ParamValue, Params};
use percent_encoding::percent_decode_str;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt::{self, Debug, Formatter};

use super::body::ParsedBody;
use super::multipart::UploadedFile;
use super::query_parser::{QueryPairs, parse_urlencoded};
use crate::error::{Error, StatusCode};
use crate::session::Session;

/// An inbound request with its body, cookies, and route params decoded.
///
/// Handlers receive a shared reference. The only mutable state reachable
/// from a request is the [`Session`] it carries.
///
pub struct Request {
    method: Method,
    path: String,
    query_string: String,
    headers: HeaderMap,
    query: QueryPairs,
    body: Bytes,
    parsed: ParsedBody,
    cookies: CookieJar,
    params: Params,
    session: Option<Session>,
}

impl Request {
    /// Builds a request from its http representation. The path is
    /// percent-decoded and the body is parsed by content type.
    ///
    pub fn new(request: http::Request<Bytes>) -> Self {
        let (parts, body) = request.into_parts();

        let path = percent_decode_str(parts.uri.path())
            .decode_utf8_lossy()
            .into_owned();

        let query_string = parts.uri.query().unwrap_or_default().to_owned();
        let query = parse_urlencoded(&query_string);

        let parsed = {
            let content_type = last_value(&parts.headers, CONTENT_TYPE.as_str());
            ParsedBody::parse(content_type.unwrap_or_default(), &body)
        };

        let cookies = parse_cookies(&parts.headers);

        Self {
            method: parts.method,
            path,
            query_string,
            headers: parts.headers,
            query,
            body,
            parsed,
            cookies,
            params: Params::new(),
            session: None,
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the percent-decoded path of the request uri.
    ///
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query_string(&self) -> &str {
        &self.query_string
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns the value of the header `name`. When the header is repeated,
    /// the last value wins. Values that are not visible ASCII are ignored.
    ///
    pub fn header(&self, name: &str) -> Option<&str> {
        last_value(&self.headers, name)
    }

    /// Returns the first value of the query parameter `name`.
    ///
    pub fn query(&self, name: &str) -> Option<&str> {
        first(&self.query, name)
    }

    /// Returns every value of the query parameter `name` in order.
    ///
    pub fn query_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> {
        all(&self.query, name)
    }

    /// Returns the first value of the form field `name` from a urlencoded or
    /// multipart body.
    ///
    pub fn form(&self, name: &str) -> Option<&str> {
        first(&self.parsed.form, name)
    }

    pub fn form_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> {
        all(&self.parsed.form, name)
    }

    /// Returns the first file uploaded under the field `name`.
    ///
    pub fn file(&self, name: &str) -> Option<&UploadedFile> {
        self.parsed
            .files
            .iter()
            .find_map(|(key, file)| (key == name).then_some(file))
    }

    pub fn files(&self) -> impl Iterator<Item = (&str, &UploadedFile)> {
        self.parsed
            .files
            .iter()
            .map(|(key, file)| (key.as_str(), file))
    }

    /// Returns the body as JSON if the request was sent as
    /// `application/json` and the body is well formed.
    ///
    pub fn json(&self) -> Option<&Value> {
        self.parsed.json.as_ref()
    }

    /// Deserializes the JSON body into `T`.
    ///
    /// # Errors
    ///
    /// Responds with `400 Bad Request` if the body is missing or does not
    /// match `T`.
    ///
    pub fn parse_json<T>(&self) -> Result<T, Error>
    where
        T: DeserializeOwned,
    {
        serde_json::from_slice(&self.body)
            .map_err(|error| Error::from_source(StatusCode::BAD_REQUEST, Box::new(error)))
    }

    /// Returns the raw request body.
    ///
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Returns the value of the request cookie `name`.
    ///
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(Cookie::value)
    }

    pub fn cookies(&self) -> &CookieJar {
        &self.cookies
    }

    /// Returns the converted value of the route parameter `name`.
    ///
    pub fn param(&self, name: &str) -> Option<&ParamValue> {
        self.params.get(name)
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Returns the session of the request. Sessions exist only when the
    /// application is configured with a secret key.
    ///
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Returns the CSRF token to embed in forms. The token is stable for the
    /// lifetime of the session.
    ///
    pub fn csrf_token(&self) -> Option<&str> {
        self.session.as_ref().map(Session::csrf_token)
    }

    /// Returns true if the request was sent with
    /// `X-Requested-With: XMLHttpRequest`.
    ///
    pub fn is_xhr(&self) -> bool {
        self.header("x-requested-with") == Some("XMLHttpRequest")
    }
}

impl Request {
    pub(crate) fn set_params(&mut self, params: Params) {
        self.params = params;
    }

    pub(crate) fn set_session(&mut self, session: Session) {
        self.session = Some(session);
    }
}

impl Debug for Request {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("query", &self.query)
            .field("params", &self.params)
            .finish()
    }
}

fn first<'a>(pairs: &'a QueryPairs, name: &str) -> Option<&'a str> {
    pairs
        .iter()
        .find_map(|(key, value)| (key == name).then_some(value.as_str()))
}

fn all<'a>(pairs: &'a QueryPairs, name: &'a str) -> impl Iterator<Item = &'a str> {
    pairs
        .iter()
        .filter(move |(key, _)| key == name)
        .map(|(_, value)| value.as_str())
}

fn last_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(name)
        .iter()
        .next_back()
        .and_then(|value| value.to_str().ok())
}

fn parse_cookies(headers: &HeaderMap) -> CookieJar {
    let mut jar = CookieJar::new();

    for header in headers.get_all(COOKIE) {
        let Ok(input) = header.to_str() else {
            continue;
        };

        for result in Cookie::split_parse_encoded(input.to_owned()) {
            match result {
                Ok(cookie) => jar.add_original(cookie),
                Err(error) => {
                    tracing::debug!(%error, "skipping a malformed cookie");
                }
            }
        }
    }

    jar
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use http::Method;

    use super::Request;

    fn request(builder: http::request::Builder, body: &'static [u8]) -> Request {
        Request::new(builder.body(Bytes::from_static(body)).unwrap())
    }

    #[test]
    fn decodes_path_and_query() {
        let request = request(
            http::Request::get("/caf%C3%A9/a%20b?tag=x&tag=y&q=hello+world"),
            b"",
        );

        assert_eq!(request.method(), Method::GET);
        assert_eq!(request.path(), "/café/a b");
        assert_eq!(request.query("tag"), Some("x"));
        assert_eq!(request.query_all("tag").collect::<Vec<_>>(), ["x", "y"]);
        assert_eq!(request.query("q"), Some("hello world"));
        assert_eq!(request.query("missing"), None);
    }

    #[test]
    fn last_header_value_wins() {
        let request = request(
            http::Request::get("/")
                .header("X-Forwarded-For", "10.0.0.1")
                .header("x-forwarded-for", "10.0.0.2")
                .header("X-Requested-With", "XMLHttpRequest"),
            b"",
        );

        assert_eq!(request.header("X-FORWARDED-FOR"), Some("10.0.0.2"));
        assert!(request.is_xhr());
    }

    #[test]
    fn form_fields_and_cookies() {
        let request = request(
            http::Request::post("/login")
                .header("content-type", "application/x-www-form-urlencoded")
                .header("cookie", "theme=dark; lang=en%20US"),
            b"user=ada&remember=on&user=grace",
        );

        assert_eq!(request.form("user"), Some("ada"));
        assert_eq!(request.form_all("user").count(), 2);
        assert_eq!(request.cookie("theme"), Some("dark"));
        assert_eq!(request.cookie("lang"), Some("en US"));
        assert!(request.session().is_none());
        assert!(request.csrf_token().is_none());
    }

    #[test]
    fn json_body() {
        #[derive(serde::Deserialize)]
        struct Payload {
            n: u8,
        }

        let request = request(
            http::Request::put("/items/1").header("content-type", "application/json"),
            br#"{"n":3}"#,
        );

        assert_eq!(request.json().and_then(|json| json["n"].as_u64()), Some(3));
        assert_eq!(request.parse_json::<Payload>().unwrap().n, 3);
    }

    #[test]
    fn bad_json_is_a_bad_request() {
        #[derive(Debug, serde::Deserialize)]
        struct Payload {
            _n: u8,
        }

        let request = request(http::Request::post("/"), b"nope");
        let error = request.parse_json::<Payload>().unwrap_err();

        assert_eq!(error.status(), http::StatusCode::BAD_REQUEST);
    }
}
