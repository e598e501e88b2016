use bytes::Bytes;
use serde_json::Value;

use super::multipart::{self, UploadedFile};
use super::query_parser::{QueryPairs, parse_urlencoded};

/// The decoded representation of a request body, chosen by content type.
///
#[derive(Debug, Default)]
pub struct ParsedBody {
    pub form: QueryPairs,
    pub files: Vec<(String, UploadedFile)>,
    pub json: Option<Value>,
}

impl ParsedBody {
    /// Decodes `body` according to `content_type`. Bodies that fail to decode
    /// produce an empty `ParsedBody`; the raw bytes remain available on the
    /// request.
    ///
    pub fn parse(content_type: &str, body: &Bytes) -> Self {
        let mut parsed = Self::default();

        if body.is_empty() {
            return parsed;
        }

        let mime = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        match mime.as_str() {
            "application/x-www-form-urlencoded" => {
                parsed.form = parse_urlencoded(&String::from_utf8_lossy(body));
            }
            "application/json" => match serde_json::from_slice(body) {
                Ok(json) => parsed.json = Some(json),
                Err(error) => {
                    tracing::debug!(%error, "ignoring a malformed json body");
                }
            },
            "multipart/form-data" => {
                let result = multipart::parse_boundary(content_type)
                    .and_then(|boundary| multipart::parse_multipart(boundary, body));

                match result {
                    Ok(multipart) => {
                        parsed.form = multipart.fields;
                        parsed.files = multipart.files;
                    }
                    Err(error) => {
                        tracing::debug!(%error, "ignoring a malformed multipart body");
                    }
                }
            }
            _ => {}
        }

        parsed
    }
}
