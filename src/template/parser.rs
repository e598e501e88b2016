use super::TemplateError;
use super::node::{Condition, Node, Path, is_identifier};

/// A lexical unit of template source.
///
#[derive(Debug, PartialEq)]
enum Token<'a> {
    Text(&'a str),
    Variable(&'a str, usize),
    Tag(&'a str, usize),
}

/// The block that a nested parse is collecting the body of.
///
#[derive(Clone, Copy)]
enum Block {
    If(usize),
    For(usize),
}

/// Parses template source into a sequence of nodes.
///
/// ```
/// use mallo::template::{Node, parse};
///
/// let nodes = parse("Hi {{ name }}!").unwrap();
/// assert_eq!(nodes.len(), 3);
/// assert!(matches!(&nodes[1], Node::Variable { escape: true, .. }));
/// ```
///
pub fn parse(source: &str) -> Result<Vec<Node>, TemplateError> {
    let tokens = tokenize(source)?;
    let mut iter = tokens.into_iter();

    parse_nodes(&mut iter, None)
}

fn tokenize(source: &str) -> Result<Vec<Token<'_>>, TemplateError> {
    let mut tokens = Vec::new();
    let mut rest = source;
    let mut line = 1;

    while let Some(start) = find_open(rest) {
        let (text, tail) = rest.split_at(start);
        let close = if tail.starts_with("{{") { "}}" } else { "%}" };

        if !text.is_empty() {
            tokens.push(Token::Text(text));
            line += count_lines(text);
        }

        let Some(end) = tail[2..].find(close) else {
            let message = format!("unterminated \"{}\" delimiter", &tail[..2]);
            return Err(TemplateError::syntax(line, message));
        };

        let inner = &tail[2..end + 2];

        tokens.push(if close == "}}" {
            Token::Variable(inner.trim(), line)
        } else {
            Token::Tag(inner.trim(), line)
        });

        line += count_lines(inner);
        rest = &tail[end + 4..];
    }

    if !rest.is_empty() {
        tokens.push(Token::Text(rest));
    }

    Ok(tokens)
}

fn find_open(input: &str) -> Option<usize> {
    let variable = input.find("{{");
    let tag = input.find("{%");

    match (variable, tag) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

fn count_lines(input: &str) -> usize {
    input.bytes().filter(|byte| *byte == b'\n').count()
}

fn parse_nodes<'a, I>(tokens: &mut I, block: Option<Block>) -> Result<Vec<Node>, TemplateError>
where
    I: Iterator<Item = Token<'a>>,
{
    let mut nodes = Vec::new();

    while let Some(token) = tokens.next() {
        match token {
            Token::Text(text) => nodes.push(Node::Text(text.to_owned())),
            Token::Variable(expr, line) => nodes.push(parse_variable(expr, line)?),
            Token::Tag(tag, line) => {
                let (keyword, args) = match tag.split_once(char::is_whitespace) {
                    Some((keyword, args)) => (keyword, args.trim()),
                    None => (tag, ""),
                };

                match (keyword, block) {
                    ("if", _) => {
                        let condition = parse_condition(args, line)?;
                        let body = parse_nodes(tokens, Some(Block::If(line)))?;

                        nodes.push(Node::If { condition, body });
                    }
                    ("for", _) => {
                        let (item, collection) = parse_loop(args, line)?;
                        let body = parse_nodes(tokens, Some(Block::For(line)))?;

                        nodes.push(Node::For {
                            item,
                            collection,
                            body,
                        });
                    }
                    ("endif", Some(Block::If(_))) | ("endfor", Some(Block::For(_))) => {
                        if !args.is_empty() {
                            let message = format!("unexpected arguments to \"{}\"", keyword);
                            return Err(TemplateError::syntax(line, message));
                        }

                        return Ok(nodes);
                    }
                    ("endif" | "endfor", _) => {
                        let message = format!("\"{}\" without a matching opening tag", keyword);
                        return Err(TemplateError::syntax(line, message));
                    }
                    _ => {
                        let message = format!("unknown tag \"{}\"", keyword);
                        return Err(TemplateError::syntax(line, message));
                    }
                }
            }
        }
    }

    match block {
        None => Ok(nodes),
        Some(Block::If(line)) => Err(TemplateError::syntax(line, "unclosed \"if\" tag")),
        Some(Block::For(line)) => Err(TemplateError::syntax(line, "unclosed \"for\" tag")),
    }
}

fn parse_variable(expr: &str, line: usize) -> Result<Node, TemplateError> {
    let mut parts = expr.split('|').map(str::trim);
    let path = parse_path(parts.next().unwrap_or_default(), line)?;
    let mut escape = true;

    for filter in parts {
        if filter == "safe" {
            escape = false;
        } else {
            let message = format!("unknown filter \"{}\"", filter);
            return Err(TemplateError::syntax(line, message));
        }
    }

    Ok(Node::Variable { path, escape })
}

fn parse_condition(args: &str, line: usize) -> Result<Condition, TemplateError> {
    let (negated, expr) = match args.strip_prefix("not") {
        Some(rest) if rest.starts_with(char::is_whitespace) => (true, rest.trim()),
        _ => (false, args),
    };

    Ok(Condition {
        path: parse_path(expr, line)?,
        negated,
    })
}

fn parse_loop(args: &str, line: usize) -> Result<(String, Path), TemplateError> {
    let mut words = args.split_whitespace();

    match (words.next(), words.next(), words.next(), words.next()) {
        (Some(item), Some("in"), Some(collection), None) if is_identifier(item) => {
            Ok((item.to_owned(), parse_path(collection, line)?))
        }
        _ => {
            let message = format!("malformed \"for\" tag: expected \"for <name> in <path>\", found \"for {}\"", args);
            Err(TemplateError::syntax(line, message))
        }
    }
}

fn parse_path(expr: &str, line: usize) -> Result<Path, TemplateError> {
    Path::parse(expr).ok_or_else(|| {
        let message = format!("invalid variable path \"{}\"", expr);
        TemplateError::syntax(line, message)
    })
}
