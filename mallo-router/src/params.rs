use smallvec::SmallVec;
use std::fmt::{self, Display, Formatter};
use std::slice;
use std::sync::Arc;

/// The converted value of a path parameter.
///
/// `path` parameters are stored as [`ParamValue::Str`].
///
#[derive(Clone, Debug, PartialEq)]
pub enum ParamValue {
    Str(String),
    Int(i64),
    Float(f64),
}

/// The named parameters extracted from a matched path, in pattern order.
///
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Params {
    entries: SmallVec<[(Arc<str>, ParamValue); 4]>,
}

impl ParamValue {
    pub fn as_str(&self) -> Option<&str> {
        if let Self::Str(value) = self {
            Some(value)
        } else {
            None
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        if let Self::Int(value) = self {
            Some(*value)
        } else {
            None
        }
    }

    /// Returns the value as a float. Integers are widened.
    ///
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(value) => Some(*value),
            Self::Int(value) => Some(*value as f64),
            Self::Str(_) => None,
        }
    }
}

impl Display for ParamValue {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Self::Str(value) => Display::fmt(value, f),
            Self::Int(value) => Display::fmt(value, f),
            Self::Float(value) => Display::fmt(value, f),
        }
    }
}

impl Params {
    pub fn new() -> Self {
        Default::default()
    }

    /// Returns the value of the parameter `name`.
    ///
    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.entries
            .iter()
            .find_map(|(key, value)| (&**key == name).then_some(value))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> slice::Iter<'_, (Arc<str>, ParamValue)> {
        self.entries.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| &**key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn push(&mut self, name: Arc<str>, value: ParamValue) {
        self.entries.push((name, value));
    }
}

impl<'a> IntoIterator for &'a Params {
    type Item = &'a (Arc<str>, ParamValue);
    type IntoIter = slice::Iter<'a, (Arc<str>, ParamValue)>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::{ParamValue, Params};

    #[test]
    fn get_by_name() {
        let mut params = Params::new();

        params.push("id".into(), ParamValue::Int(7));
        params.push("slug".into(), ParamValue::Str("hello".to_owned()));

        assert_eq!(params.get("id"), Some(&ParamValue::Int(7)));
        assert_eq!(params.get("slug").and_then(ParamValue::as_str), Some("hello"));
        assert_eq!(params.get("missing"), None);
        assert_eq!(params.keys().collect::<Vec<_>>(), ["id", "slug"]);
    }

    #[test]
    fn display_is_the_plain_value() {
        assert_eq!(ParamValue::Int(-3).to_string(), "-3");
        assert_eq!(ParamValue::Float(1.5).to_string(), "1.5");
        assert_eq!(ParamValue::Str("a/b".to_owned()).to_string(), "a/b");
    }
}
