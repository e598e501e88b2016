use http::StatusCode;
use http::header::{self, HeaderValue};
use httpdate::HttpDate;
use mallo_router::ParamValue;
use sha2::{Digest, Sha256};
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use crate::app::{App, Handler};
use crate::error::Error;
use crate::request::Request;
use crate::response::{Body, HandlerResult, Response};

/// Serves the files of a directory through the `filename` path parameter.
///
#[derive(Debug)]
pub(crate) struct StaticFiles {
    root: PathBuf,
    max_age: u64,
}

impl StaticFiles {
    pub(crate) fn new(root: PathBuf, max_age: u64) -> Self {
        Self { root, max_age }
    }

    /// Joins `filename` to the root directory. Returns `None` if the name
    /// would escape the root.
    ///
    fn resolve(&self, filename: &str) -> Option<PathBuf> {
        let relative = Path::new(filename);
        let is_safe = relative
            .components()
            .all(|component| matches!(component, Component::Normal(_) | Component::CurDir));

        if is_safe && !filename.contains('\\') {
            Some(self.root.join(relative))
        } else {
            None
        }
    }

    fn cache_control(&self) -> HeaderValue {
        if self.max_age == 0 {
            HeaderValue::from_static("no-store")
        } else {
            HeaderValue::try_from(format!("public, max-age={}", self.max_age))
                .unwrap_or_else(|_| HeaderValue::from_static("no-store"))
        }
    }
}

impl Handler for StaticFiles {
    fn call(&self, request: &Request, _: &App) -> Result<HandlerResult, Error> {
        let not_found = || Error::new(StatusCode::NOT_FOUND, "File not found");

        let path = request
            .param("filename")
            .and_then(ParamValue::as_str)
            .and_then(|filename| self.resolve(filename))
            .ok_or_else(not_found)?;

        let (content, modified) = match read_file(&path) {
            Ok(file) => file,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Err(not_found()),
            Err(error) => return Err(Error::from_io_error(error)),
        };

        let etag = HeaderValue::try_from(etag(&content))?;
        let last_modified = HeaderValue::try_from(HttpDate::from(modified).to_string())?;

        if request.header("if-none-match") == etag.to_str().ok() {
            let response = Response::new(Body::Bytes(Default::default()))
                .with_status(StatusCode::NOT_MODIFIED)
                .with_header(header::ETAG, etag)
                .with_header(header::LAST_MODIFIED, last_modified);

            return Ok(response.into());
        }

        let content_type = mime_guess::from_path(&path)
            .first_raw()
            .map_or(HeaderValue::from_static("application/octet-stream"), HeaderValue::from_static);

        let response = Response::bytes(content_type, content)
            .with_header(header::ETAG, etag)
            .with_header(header::LAST_MODIFIED, last_modified)
            .with_header(header::CACHE_CONTROL, self.cache_control());

        Ok(response.into())
    }
}

fn read_file(path: &Path) -> io::Result<(Vec<u8>, std::time::SystemTime)> {
    let metadata = fs::metadata(path)?;

    if !metadata.is_file() {
        return Err(io::ErrorKind::NotFound.into());
    }

    Ok((fs::read(path)?, metadata.modified()?))
}

/// Returns a quoted entity tag derived from the SHA-256 digest of `content`.
///
fn etag(content: &[u8]) -> String {
    let digest = format!("{:x}", Sha256::digest(content));
    format!("\"{}\"", &digest[..32])
}
