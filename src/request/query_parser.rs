use percent_encoding::percent_decode_str;
use std::borrow::Cow;
use std::iter::Peekable;
use std::str::CharIndices;

/// Decoded `(name, value)` pairs in the order they appear in the input.
///
pub type QueryPairs = Vec<(String, String)>;

/// Parses an `application/x-www-form-urlencoded` string. The same rules apply
/// to a url query string.
///
/// Names and values are percent-decoded and `+` is read as a space. Entries
/// with an empty name or an empty value are skipped. Repeated names are kept
/// in input order.
///
pub fn parse_urlencoded(input: &str) -> QueryPairs {
    let mut pairs = Vec::with_capacity(8);
    let mut input = QueryParserInput::new(input);

    while let Some((name, value)) = parse_entry(&mut input) {
        if !name.is_empty() && !value.is_empty() {
            pairs.push((name, value));
        }
    }

    pairs
}

fn decode(raw: &str) -> String {
    let raw = if raw.contains('+') {
        Cow::Owned(raw.replace('+', " "))
    } else {
        Cow::Borrowed(raw)
    };

    percent_decode_str(&raw).decode_utf8_lossy().into_owned()
}

fn parse_name(input: &mut QueryParserInput) -> Option<Option<String>> {
    // Get the start index of the name by peeking at the next index of input.
    let start = input.peek()?;
    // Continue consuming the input until we reach the terminating equal sign
    // or the end of the entry.
    let end = input.take_until(|next| next == '=' || next == '&');

    if !input.next_is('=') {
        // An entry without an equal sign has no value. Skip the ampersand so
        // the following entry can be parsed.
        input.take_while('&');
        return Some(None);
    }

    // Move past and ignore any additional occurences of the equal sign.
    input.take_while('=');

    Some(Some(decode(&input.value[start..end])))
}

fn parse_value(input: &mut QueryParserInput) -> String {
    let start = input.peek().unwrap_or(input.value.len());
    // Continue consuming the input until we reach the terminating ampersand.
    let end = input.take_until(|next| next == '&');

    // Move past and ignore any additional occurences of the ampersand character.
    input.take_while('&');

    decode(&input.value[start..end])
}

fn parse_entry(input: &mut QueryParserInput) -> Option<(String, String)> {
    Some(match parse_name(input)? {
        Some(name) => (name, parse_value(input)),
        None => (String::new(), String::new()),
    })
}

struct QueryParserInput<'a> {
    chars: Peekable<CharIndices<'a>>,
    value: &'a str,
}

impl<'a> QueryParserInput<'a> {
    fn new(value: &'a str) -> Self {
        Self {
            chars: value.char_indices().peekable(),
            value,
        }
    }

    fn peek(&mut self) -> Option<usize> {
        self.chars.peek().map(|(index, _)| *index)
    }

    fn next_is(&mut self, expected: char) -> bool {
        self.chars.peek().is_some_and(|(_, next)| *next == expected)
    }

    fn take_while(&mut self, predicate: char) -> usize {
        while let Some((index, next)) = self.chars.peek() {
            if predicate != *next {
                return *index;
            }

            self.chars.next();
        }

        self.value.len()
    }

    fn take_until(&mut self, predicate: impl Fn(char) -> bool) -> usize {
        while let Some((index, next)) = self.chars.peek() {
            if predicate(*next) {
                return *index;
            }

            self.chars.next();
        }

        self.value.len()
    }
}

#[cfg(test)]
mod tests {
    use super::parse_urlencoded;

    #[test]
    fn parse_query_strings() {
        let cases: [(&str, Vec<(&str, &str)>); 14] = [
            (
                "query=books&category=fiction&sort=asc",
                vec![("query", "books"), ("category", "fiction"), ("sort", "asc")],
            ),
            (
                "query=hello%20world&category=%E2%9C%93",
                vec![("query", "hello world"), ("category", "✓")],
            ),
            (
                "category=books&category=electronics",
                vec![("category", "books"), ("category", "electronics")],
            ),
            ("query=books&category=", vec![("query", "books")]),
            ("query=100%25+organic", vec![("query", "100% organic")]),
            ("a+b=c+d", vec![("a b", "c d")]),
            ("", vec![]),
            (
                "query=books&&category=fiction",
                vec![("query", "books"), ("category", "fiction")],
            ),
            (
                "query==books&category=fiction",
                vec![("query", "books"), ("category", "fiction")],
            ),
            (
                "query=books&category&sort=asc",
                vec![("query", "books"), ("sort", "asc")],
            ),
            ("query=books&=fiction", vec![("query", "books")]),
            ("query=books&", vec![("query", "books")]),
            ("qu%65ry=books", vec![("query", "books")]),
            ("query=%C3%28", vec![("query", "\u{FFFD}(")]),
        ];

        for (input, expected) in cases {
            let expected: Vec<_> = expected
                .into_iter()
                .map(|(name, value)| (name.to_owned(), value.to_owned()))
                .collect();

            assert_eq!(parse_urlencoded(input), expected, "{}", input);
        }
    }
}
