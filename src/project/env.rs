use std::collections::HashMap;
use std::path::Path;

use serde_yaml::Value;
use tracing::warn;

use super::ProjectError;

/// Variables visible to interpolation: `.env` entries overlaid by the process environment.
pub type Environment = HashMap<String, String>;

/// Parse dotenv content. Supports `export` prefixes, comments, and single or
/// double quoted values; later keys win.
pub fn parse_dotenv(contents: &str) -> Environment {
    let mut vars = Environment::new();
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        vars.insert(key.to_string(), unquote(value.trim()));
    }
    vars
}

fn unquote(value: &str) -> String {
    if value.len() >= 2 {
        if let Some(inner) = value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')) {
            return inner.to_string();
        }
        if let Some(inner) = value.strip_prefix('"').and_then(|v| v.strip_suffix('"')) {
            return inner.replace("\\n", "\n").replace("\\\"", "\"");
        }
    }
    // Unquoted values may carry a trailing ` # comment`.
    match value.find(" #") {
        Some(idx) => value[..idx].trim_end().to_string(),
        None => value.to_string(),
    }
}

pub fn read_dotenv(path: &Path) -> Result<Environment, ProjectError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ProjectError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(parse_dotenv(&contents))
}

/// Substitute `$VAR`, `${VAR}` and the `:-`, `-`, `:?`, `?`, `:+`, `+`
/// modifiers in `input`. `$$` yields a literal `$`.
pub fn interpolate(input: &str, env: &Environment) -> Result<String, ProjectError> {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        if let Some(tail) = after.strip_prefix('$') {
            out.push('$');
            rest = tail;
        } else if let Some(braced) = after.strip_prefix('{') {
            let end = matching_brace(braced).ok_or_else(|| ProjectError::Interpolation {
                expression: input.to_string(),
                message: "unterminated ${".to_string(),
            })?;
            out.push_str(&expand(&braced[..end], env)?);
            rest = &braced[end + 1..];
        } else {
            let len = after
                .char_indices()
                .take_while(|&(i, c)| {
                    c == '_' || c.is_ascii_alphabetic() || (i > 0 && c.is_ascii_digit())
                })
                .count();
            if len == 0 {
                out.push('$');
                rest = after;
            } else {
                out.push_str(&lookup(&after[..len], env));
                rest = &after[len..];
            }
        }
    }
    out.push_str(rest);
    Ok(out)
}

// Index of the `}` closing an already-opened `${`, honouring nesting in defaults.
fn matching_brace(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (i, c) in s.char_indices() {
        match c {
            '{' => depth += 1,
            '}' if depth == 0 => return Some(i),
            '}' => depth -= 1,
            _ => {}
        }
    }
    None
}

fn lookup(name: &str, env: &Environment) -> String {
    match env.get(name) {
        Some(value) => value.clone(),
        None => {
            warn!(variable = name, "variable is not set, defaulting to a blank string");
            String::new()
        }
    }
}

fn expand(expr: &str, env: &Environment) -> Result<String, ProjectError> {
    let name_len = expr
        .char_indices()
        .take_while(|&(_, c)| c == '_' || c.is_ascii_alphanumeric())
        .count();
    let (name, op) = expr.split_at(name_len);
    if name.is_empty() {
        return Err(ProjectError::Interpolation {
            expression: format!("${{{expr}}}"),
            message: "missing variable name".to_string(),
        });
    }

    let value = env.get(name);
    let set_non_empty = value.is_some_and(|v| !v.is_empty());
    let fail = |message: &str| ProjectError::Interpolation {
        expression: format!("${{{expr}}}"),
        message: if message.is_empty() {
            format!("required variable {name} is missing a value")
        } else {
            message.to_string()
        },
    };

    let (modifier, arg) = if let Some(arg) = op.strip_prefix(":-") {
        (":-", arg)
    } else if let Some(arg) = op.strip_prefix(":?") {
        (":?", arg)
    } else if let Some(arg) = op.strip_prefix(":+") {
        (":+", arg)
    } else if let Some(arg) = op.strip_prefix('-') {
        ("-", arg)
    } else if let Some(arg) = op.strip_prefix('?') {
        ("?", arg)
    } else if let Some(arg) = op.strip_prefix('+') {
        ("+", arg)
    } else if op.is_empty() {
        ("", "")
    } else {
        return Err(ProjectError::Interpolation {
            expression: format!("${{{expr}}}"),
            message: format!("unsupported modifier {op:?}"),
        });
    };

    match modifier {
        ":-" if !set_non_empty => interpolate(arg, env),
        "-" if value.is_none() => interpolate(arg, env),
        ":?" if !set_non_empty => Err(fail(arg)),
        "?" if value.is_none() => Err(fail(arg)),
        ":+" => Ok(if set_non_empty { interpolate(arg, env)? } else { String::new() }),
        "+" => Ok(if value.is_some() { interpolate(arg, env)? } else { String::new() }),
        "" => Ok(lookup(name, env)),
        _ => Ok(value.cloned().unwrap_or_default()),
    }
}

/// Interpolate every string scalar in a YAML tree. Mapping keys are left alone.
pub fn interpolate_value(value: &mut Value, env: &Environment) -> Result<(), ProjectError> {
    match value {
        Value::String(s) => {
            if s.contains('$') {
                *s = interpolate(s, env)?;
            }
        }
        Value::Sequence(items) => {
            for item in items {
                interpolate_value(item, env)?;
            }
        }
        Value::Mapping(map) => {
            for (_, item) in map.iter_mut() {
                interpolate_value(item, env)?;
            }
        }
        Value::Tagged(tagged) => interpolate_value(&mut tagged.value, env)?,
        Value::Null | Value::Bool(_) | Value::Number(_) => {}
    }
    Ok(())
}
