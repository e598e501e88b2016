use std::fmt::{self, Display, Formatter};
use std::sync::Arc;

use crate::error::{PatternError, Reason};
use crate::params::{ParamValue, Params};

/// The converter applied to a parameter segment.
///
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Kind {
    /// `<name>` matches exactly one non-empty segment.
    Str,

    /// `<int:name>` matches one segment of ASCII digits that fits in an `i64`.
    Int,

    /// `<float:name>` matches one segment of ASCII digits with an optional
    /// fractional part, such as `3`, `3.` or `3.25`.
    Float,

    /// `<path:name>` matches the remainder of the path, slashes included.
    Path,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Segment {
    Static(String),
    Param(Arc<str>, Kind),
}

/// A compiled path pattern.
///
/// Patterns are split on `/` and compared segment by segment. A segment of
/// the form `<name>` or `<kind:name>` is a parameter. Every other segment is
/// compared byte for byte.
///
/// ```
/// use mallo_router::{ParamValue, Pattern};
///
/// let pattern = Pattern::compile("/user/<int:id>").unwrap();
/// let params = pattern.matches("/user/42").unwrap();
///
/// assert_eq!(params.get("id"), Some(&ParamValue::Int(42)));
/// assert!(pattern.matches("/user/abc").is_none());
/// ```
///
#[derive(Clone, Debug)]
pub struct Pattern {
    source: String,
    segments: Vec<Segment>,
}

impl Kind {
    fn from_label(label: &str) -> Option<Self> {
        match label {
            "str" | "string" => Some(Self::Str),
            "int" => Some(Self::Int),
            "float" => Some(Self::Float),
            "path" => Some(Self::Path),
            _ => None,
        }
    }

    fn convert(self, input: &str) -> Option<ParamValue> {
        match self {
            Self::Str | Self::Path => Some(ParamValue::Str(input.to_owned())),
            Self::Int if is_digits(input) => input.parse().ok().map(ParamValue::Int),
            Self::Float if is_decimal(input) => input
                .parse::<f64>()
                .ok()
                .filter(|value| value.is_finite())
                .map(ParamValue::Float),
            Self::Int | Self::Float => None,
        }
    }
}

/// Returns true if `input` is a non-empty run of ASCII digits. Signs are
/// rejected so `/user/+5` and `/user/5` never name the same resource.
///
fn is_digits(input: &str) -> bool {
    !input.is_empty() && input.bytes().all(|byte| byte.is_ascii_digit())
}

/// Returns true if `input` is a digit run followed by an optional `.` and an
/// optional digit run. Exponents and a leading `.` are rejected.
///
fn is_decimal(input: &str) -> bool {
    match input.split_once('.') {
        Some((whole, fraction)) => {
            is_digits(whole) && fraction.bytes().all(|byte| byte.is_ascii_digit())
        }
        None => is_digits(input),
    }
}

impl Segment {
    pub fn param_name(&self) -> Option<&str> {
        if let Self::Param(name, _) = self {
            Some(&**name)
        } else {
            None
        }
    }
}

impl Pattern {
    pub fn compile(pattern: &str) -> Result<Self, PatternError> {
        let mut segments: Vec<Segment> = Vec::new();

        for input in pattern.split('/') {
            if let Some(Segment::Param(name, Kind::Path)) = segments.last() {
                let reason = Reason::PathNotLast(name.to_string());
                return Err(PatternError::new(pattern, reason));
            }

            let segment = parse_segment(pattern, input)?;

            if let Some(name) = segment.param_name()
                && segments.iter().any(|other| other.param_name() == Some(name))
            {
                let reason = Reason::DuplicateName(name.to_owned());
                return Err(PatternError::new(pattern, reason));
            }

            segments.push(segment);
        }

        Ok(Self {
            source: pattern.to_owned(),
            segments,
        })
    }

    /// Matches `path` against self. Returns the converted parameters when
    /// every segment matches, otherwise `None`.
    ///
    pub fn matches(&self, path: &str) -> Option<Params> {
        let mut params = Params::new();
        let mut input = Some(path);

        for segment in &self.segments {
            let current = input?;

            if let Segment::Param(name, Kind::Path) = segment {
                // Path parameters are always last. Take the rest of the input.
                if current.is_empty() {
                    return None;
                }

                params.push(Arc::clone(name), ParamValue::Str(current.to_owned()));
                input = None;
                break;
            }

            let (head, tail) = match current.split_once('/') {
                Some((head, tail)) => (head, Some(tail)),
                None => (current, None),
            };

            input = tail;

            match segment {
                Segment::Static(literal) => {
                    if literal != head {
                        return None;
                    }
                }
                Segment::Param(name, kind) => {
                    if head.is_empty() {
                        return None;
                    }

                    params.push(Arc::clone(name), kind.convert(head)?);
                }
            }
        }

        // Left over segments mean the path is longer than the pattern.
        if input.is_some() {
            None
        } else {
            Some(params)
        }
    }

    /// Rebuilds a concrete path by substituting a value for each parameter.
    /// Returns the name of the first parameter that `lookup` cannot supply.
    ///
    pub fn expand<F>(&self, mut lookup: F) -> Result<String, &str>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let mut parts = Vec::with_capacity(self.segments.len());

        for segment in &self.segments {
            match segment {
                Segment::Static(literal) => parts.push(literal.clone()),
                Segment::Param(name, _) => match lookup(name.as_ref()) {
                    Some(value) => parts.push(value),
                    None => return Err(&**name),
                },
            }
        }

        Ok(parts.join("/"))
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn param_names(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(Segment::param_name)
    }
}

impl Display for Pattern {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn parse_segment(pattern: &str, input: &str) -> Result<Segment, PatternError> {
    let Some(inner) = input
        .strip_prefix('<')
        .and_then(|rest| rest.strip_suffix('>'))
    else {
        return Ok(Segment::Static(input.to_owned()));
    };

    let (kind, name) = match inner.split_once(':') {
        None => (Kind::Str, inner.trim()),
        Some((label, name)) => {
            let label = label.trim();

            match Kind::from_label(label) {
                Some(kind) => (kind, name.trim()),
                None => {
                    let reason = Reason::UnknownKind(label.to_owned());
                    return Err(PatternError::new(pattern, reason));
                }
            }
        }
    };

    if name.is_empty() {
        return Err(PatternError::new(pattern, Reason::EmptyName));
    }

    Ok(Segment::Param(name.into(), kind))
}

#[cfg(test)]
mod tests {
    use super::{Kind, Pattern, Segment};
    use crate::error::Reason;
    use crate::params::ParamValue;

    fn compile(pattern: &str) -> Pattern {
        match Pattern::compile(pattern) {
            Ok(compiled) => compiled,
            Err(error) => panic!("{}", error),
        }
    }

    #[test]
    fn compile_segments() {
        let pattern = compile("/user/<int:id>/<name>/files/<path:rest>");

        assert_eq!(
            pattern.segments(),
            &[
                Segment::Static("".to_owned()),
                Segment::Static("user".to_owned()),
                Segment::Param("id".into(), Kind::Int),
                Segment::Param("name".into(), Kind::Str),
                Segment::Static("files".to_owned()),
                Segment::Param("rest".into(), Kind::Path),
            ]
        );
        assert_eq!(pattern.param_names().collect::<Vec<_>>(), ["id", "name", "rest"]);
    }

    #[test]
    fn compile_ignores_whitespace_in_params() {
        let pattern = compile("/post/<int: id>");

        assert_eq!(pattern.segments()[2], Segment::Param("id".into(), Kind::Int));
    }

    #[test]
    fn compile_errors() {
        let cases = [
            ("/a/<id>/<int:id>", Reason::DuplicateName("id".to_owned())),
            ("/a/<uuid:id>", Reason::UnknownKind("uuid".to_owned())),
            ("/a/<>", Reason::EmptyName),
            ("/a/<int:>", Reason::EmptyName),
            ("/a/<path:rest>/b", Reason::PathNotLast("rest".to_owned())),
        ];

        for (pattern, expected) in cases {
            match Pattern::compile(pattern) {
                Ok(_) => panic!("expected {} to fail", pattern),
                Err(error) => {
                    assert_eq!(error.reason(), &expected, "{}", pattern);
                    assert_eq!(error.pattern(), pattern);
                }
            }
        }
    }

    #[test]
    fn match_static() {
        let pattern = compile("/about/team");

        assert!(pattern.matches("/about/team").is_some_and(|p| p.is_empty()));
        assert!(pattern.matches("/about/Team").is_none());
        assert!(pattern.matches("/about").is_none());
        assert!(pattern.matches("/about/team/extra").is_none());
        assert!(pattern.matches("/about/team/").is_none());
    }

    #[test]
    fn match_root() {
        let pattern = compile("/");

        assert!(pattern.matches("/").is_some());
        assert!(pattern.matches("").is_none());
        assert!(pattern.matches("/a").is_none());
    }

    #[test]
    fn match_string_param() {
        let pattern = compile("/user/<name>");
        let params = pattern.matches("/user/betrand").unwrap();

        assert_eq!(params.get("name"), Some(&ParamValue::Str("betrand".to_owned())));
        assert!(pattern.matches("/user/").is_none());
        assert!(pattern.matches("/user/a/b").is_none());
    }

    #[test]
    fn typed_params_reject_as_non_match() {
        let int = compile("/user/<int:id>");
        let float = compile("/price/<float:value>");

        assert_eq!(
            int.matches("/user/123").unwrap().get("id"),
            Some(&ParamValue::Int(123))
        );
        assert!(int.matches("/user/abc").is_none());
        assert!(int.matches("/user/1.5").is_none());
        assert!(int.matches("/user/99999999999999999999").is_none());

        for unsigned in ["/user/+5", "/user/-5", "/user/ 5", "/user/5e2"] {
            assert!(int.matches(unsigned).is_none(), "{}", unsigned);
        }

        assert_eq!(
            float.matches("/price/2.5").unwrap().get("value"),
            Some(&ParamValue::Float(2.5))
        );
        assert_eq!(
            float.matches("/price/3").unwrap().get("value"),
            Some(&ParamValue::Float(3.0))
        );
        assert!(float.matches("/price/cheap").is_none());
        assert!(float.matches("/price/NaN").is_none());
        assert!(float.matches("/price/inf").is_none());
        assert_eq!(
            float.matches("/price/7.").unwrap().get("value"),
            Some(&ParamValue::Float(7.0))
        );

        for malformed in [
            "/price/1e3",
            "/price/-2.5",
            "/price/.5",
            "/price/+1",
            "/price/1.2.3",
            "/price/1.e5",
        ] {
            assert!(float.matches(malformed).is_none(), "{}", malformed);
        }
    }

    #[test]
    fn path_param_captures_slashes() {
        let pattern = compile("/files/<path:p>");

        assert_eq!(
            pattern.matches("/files/a/b/c").unwrap().get("p"),
            Some(&ParamValue::Str("a/b/c".to_owned()))
        );
        assert_eq!(
            pattern.matches("/files/a").unwrap().get("p"),
            Some(&ParamValue::Str("a".to_owned()))
        );
        assert!(pattern.matches("/files/").is_none());
        assert!(pattern.matches("/files").is_none());
    }

    #[test]
    fn matched_keys_equal_param_names() {
        let pattern = compile("/<a>/<int:b>/<float:c>/<path:d>");
        let paths = ["/x/1/2.0/y/z", "/x/1/2/y", "/x/y/2/z", "/x/1/2", "/"];

        for path in paths {
            if let Some(params) = pattern.matches(path) {
                let keys: Vec<_> = params.keys().collect();
                let names: Vec<_> = pattern.param_names().collect();

                assert_eq!(keys, names, "{}", path);
            }
        }

        assert!(pattern.matches("/x/1/2.0/y/z").is_some());
        assert!(pattern.matches("/x/y/2/z").is_none());
    }

    #[test]
    fn expand_substitutes_params() {
        let pattern = compile("/user/<int:id>/<path:rest>");
        let expanded = pattern.expand(|name| match name {
            "id" => Some("5".to_owned()),
            "rest" => Some("a/b".to_owned()),
            _ => None,
        });

        assert_eq!(expanded, Ok("/user/5/a/b".to_owned()));
        assert_eq!(pattern.expand(|_| None), Err("id"));
    }
}
