use std::fmt::{self, Display, Formatter};

/// A dotted lookup path such as `user.name` or `rows.0`.
///
#[derive(Clone, Debug, PartialEq)]
pub struct Path {
    segments: Vec<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Condition {
    pub path: Path,
    pub negated: bool,
}

/// One node of a parsed template.
///
#[derive(Clone, Debug, PartialEq)]
pub enum Node {
    /// Literal text emitted as is.
    Text(String),

    /// `{{ path }}` or `{{ path | safe }}`.
    Variable { path: Path, escape: bool },

    /// `{% if [not] path %} ... {% endif %}`.
    If { condition: Condition, body: Vec<Node> },

    /// `{% for item in path %} ... {% endfor %}`.
    For {
        item: String,
        collection: Path,
        body: Vec<Node>,
    },
}

impl Path {
    /// Parses a dotted path. Returns `None` if a segment is empty or contains
    /// a character other than an ASCII alphanumeric or `_`.
    ///
    pub fn parse(input: &str) -> Option<Self> {
        let segments: Vec<String> = input
            .split('.')
            .map(|segment| is_identifier(segment).then(|| segment.to_owned()))
            .collect::<Option<_>>()?;

        Some(Self { segments })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Returns the first segment, which names either a loop variable or a
    /// top-level key of the context.
    ///
    pub fn head(&self) -> &str {
        // Paths always have at least one segment.
        self.segments.first().map_or("", String::as_str)
    }

    pub fn tail(&self) -> &[String] {
        self.segments.get(1..).unwrap_or_default()
    }
}

impl Display for Path {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str(&self.segments.join("."))
    }
}

pub(crate) fn is_identifier(input: &str) -> bool {
    !input.is_empty()
        && input
            .bytes()
            .all(|byte| byte.is_ascii_alphanumeric() || byte == b'_')
}

#[cfg(test)]
mod tests {
    use super::Path;

    #[test]
    fn parse_dotted_paths() {
        let path = Path::parse("user.address.0").unwrap();

        assert_eq!(path.head(), "user");
        assert_eq!(path.tail(), ["address", "0"]);
        assert_eq!(path.to_string(), "user.address.0");

        assert!(Path::parse("").is_none());
        assert!(Path::parse("a..b").is_none());
        assert!(Path::parse("a.b-c").is_none());
        assert!(Path::parse("a b").is_none());
    }
}
