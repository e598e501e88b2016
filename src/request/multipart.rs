use bytes::Bytes;
use std::fmt::{self, Display, Formatter};

use super::query_parser::QueryPairs;

/// A file uploaded with a `multipart/form-data` body.
///
#[derive(Clone, Debug)]
pub struct UploadedFile {
    filename: String,
    content_type: String,
    content: Bytes,
}

/// The fields and files of a parsed multipart body, in body order.
///
#[derive(Debug, Default)]
pub struct Multipart {
    pub fields: QueryPairs,
    pub files: Vec<(String, UploadedFile)>,
}

#[derive(Debug, PartialEq)]
pub enum MultipartError {
    MissingBoundary,
    UnexpectedEof,
    MalformedPart,
}

impl UploadedFile {
    /// Returns the filename exactly as the client sent it.
    ///
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Returns the filename with path separators replaced and every character
    /// other than alphanumerics, whitespace, `.`, `_`, and `-` removed.
    ///
    pub fn secure_filename(&self) -> String {
        let mut name: String = self
            .filename
            .chars()
            .map(|c| if c == '/' || c == '\\' { '_' } else { c })
            .filter(|c| c.is_alphanumeric() || c.is_whitespace() || matches!(c, '.' | '_' | '-'))
            .collect();

        if name.len() > 255 {
            let ext = match name.rfind('.') {
                Some(index) if index > 0 => name.split_off(index),
                _ => String::new(),
            };

            let mut end = 255usize.saturating_sub(ext.len());
            while !name.is_char_boundary(end) {
                end -= 1;
            }

            name.truncate(end);
            name.push_str(&ext);
        }

        name.trim().to_owned()
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn content(&self) -> &Bytes {
        &self.content
    }

    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

impl std::error::Error for MultipartError {}

impl Display for MultipartError {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Self::MissingBoundary => f.write_str("multipart body without a boundary"),
            Self::UnexpectedEof => f.write_str("multipart body ended before the closing boundary"),
            Self::MalformedPart => f.write_str("multipart part without a header block"),
        }
    }
}

/// Extracts the boundary parameter of a `multipart/form-data` content type.
///
pub fn parse_boundary(content_type: &str) -> Result<&str, MultipartError> {
    content_type
        .split(';')
        .skip(1)
        .filter_map(|param| param.trim().split_once('='))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("boundary"))
        .map(|(_, value)| value.trim().trim_matches('"'))
        .filter(|boundary| !boundary.is_empty())
        .ok_or(MultipartError::MissingBoundary)
}

/// Splits `body` on `boundary` and sorts each part into a field or a file.
///
/// Parts without a `form-data` disposition or without a name are skipped.
/// Values of fields are decoded as UTF-8, lossily.
///
pub fn parse_multipart(boundary: &str, body: &Bytes) -> Result<Multipart, MultipartError> {
    let delimiter = format!("--{}", boundary).into_bytes();
    let mut multipart = Multipart::default();

    let Some(mut start) = find(body, &delimiter, 0) else {
        return Err(MultipartError::UnexpectedEof);
    };

    loop {
        start += delimiter.len();

        if body[start..].starts_with(b"--") {
            break;
        }

        let Some(end) = find(body, &delimiter, start) else {
            return Err(MultipartError::UnexpectedEof);
        };

        let part = trim_crlf(body.slice(start..end));
        let Some(split) = find(&part, b"\r\n\r\n", 0) else {
            return Err(MultipartError::MalformedPart);
        };

        let head = String::from_utf8_lossy(&part[..split]);
        let content = part.slice(split + 4..);

        if let Some((name, filename, content_type)) = parse_part_head(&head) {
            match filename {
                Some(filename) => multipart.files.push((
                    name,
                    UploadedFile {
                        filename,
                        content_type: content_type
                            .unwrap_or_else(|| "application/octet-stream".to_owned()),
                        content,
                    },
                )),
                None => {
                    let value = String::from_utf8_lossy(&content).into_owned();
                    multipart.fields.push((name, value));
                }
            }
        }

        start = end;
    }

    Ok(multipart)
}

/// Returns the field name, filename, and content type of a part.
///
fn parse_part_head(head: &str) -> Option<(String, Option<String>, Option<String>)> {
    let mut disposition = None;
    let mut content_type = None;

    for line in head.split("\r\n") {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };

        if key.trim().eq_ignore_ascii_case("content-disposition") {
            disposition = Some(value.trim());
        } else if key.trim().eq_ignore_ascii_case("content-type") {
            content_type = Some(value.trim().to_owned());
        }
    }

    let mut params = disposition?.split(';').map(str::trim);

    if params.next() != Some("form-data") {
        return None;
    }

    let mut name = None;
    let mut filename = None;

    for param in params {
        if let Some(value) = param.strip_prefix("name=") {
            name = Some(value.trim_matches('"').to_owned());
        } else if let Some(value) = param.strip_prefix("filename=") {
            filename = Some(value.trim_matches('"').to_owned());
        }
    }

    Some((name.filter(|name| !name.is_empty())?, filename, content_type))
}

fn trim_crlf(mut part: Bytes) -> Bytes {
    if part.starts_with(b"\r\n") {
        part = part.slice(2..);
    }

    if part.ends_with(b"\r\n") {
        part = part.slice(..part.len() - 2);
    }

    part
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    haystack
        .get(from..)?
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|index| index + from)
}
