use serde_json::Value;

use super::node::{Condition, Node, Path};

/// A loop variable bound for the duration of one iteration.
///
struct Scope<'a> {
    parent: Option<&'a Scope<'a>>,
    name: &'a str,
    value: &'a Value,
}

/// Renders `nodes` against `context`.
///
/// Lookups that miss render as the empty string. When `auto_escape` is
/// false, variables are emitted verbatim regardless of the `safe` filter.
///
pub fn render(nodes: &[Node], context: &Value, auto_escape: bool) -> String {
    let mut output = String::new();

    render_into(&mut output, nodes, context, None, auto_escape);
    output
}

fn render_into(
    output: &mut String,
    nodes: &[Node],
    context: &Value,
    scope: Option<&Scope>,
    auto_escape: bool,
) {
    for node in nodes {
        match node {
            Node::Text(text) => output.push_str(text),
            Node::Variable { path, escape } => {
                if let Some(value) = lookup(path, context, scope) {
                    write_value(output, value, *escape && auto_escape);
                }
            }
            Node::If { condition, body } => {
                if evaluate(condition, context, scope) {
                    render_into(output, body, context, scope, auto_escape);
                }
            }
            Node::For {
                item,
                collection,
                body,
            } => {
                let Some(Value::Array(items)) = lookup(collection, context, scope) else {
                    continue;
                };

                for value in items {
                    let child = Scope {
                        parent: scope,
                        name: item,
                        value,
                    };

                    render_into(output, body, context, Some(&child), auto_escape);
                }
            }
        }
    }
}

/// Resolves `path` against the innermost loop variable with a matching name,
/// or the top-level context when no loop variable matches.
///
fn lookup<'a>(path: &Path, context: &'a Value, scope: Option<&Scope<'a>>) -> Option<&'a Value> {
    let head = path.head();
    let mut frame = scope;

    let mut value = loop {
        match frame {
            Some(current) if current.name == head => break current.value,
            Some(current) => frame = current.parent,
            None => break context.get(head)?,
        }
    };

    for segment in path.tail() {
        value = match value {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    Some(value)
}

fn evaluate(condition: &Condition, context: &Value, scope: Option<&Scope>) -> bool {
    let truthy = lookup(&condition.path, context, scope).is_some_and(is_truthy);
    truthy != condition.negated
}

/// Returns false for null, false, zero, and empty strings, arrays, and
/// objects.
///
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(boolean) => *boolean,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(string) => !string.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

fn write_value(output: &mut String, value: &Value, escape: bool) {
    let text = match value {
        Value::Null => return,
        Value::String(string) => string.clone(),
        other => other.to_string(),
    };

    if escape {
        escape_html(output, &text);
    } else {
        output.push_str(&text);
    }
}

/// Appends `input` to `output` with `& < > " '` replaced by entities.
///
pub fn escape_html(output: &mut String, input: &str) {
    for c in input.chars() {
        match c {
            '&' => output.push_str("&amp;"),
            '<' => output.push_str("&lt;"),
            '>' => output.push_str("&gt;"),
            '"' => output.push_str("&quot;"),
            '\'' => output.push_str("&#x27;"),
            _ => output.push(c),
        }
    }
}
