//! Pipeline arguments and `{{name}}` placeholder substitution.

use serde_json::{Map, Value};

use crate::EngineError;

pub type Args = Map<String, Value>;

/// Merges provided args over the pipeline's declared params. A declared
/// param with a `null` default must be provided.
pub fn resolve_args(declared: &Args, provided: &Args) -> Result<Args, EngineError> {
    let mut resolved = Args::new();
    for (name, default) in declared {
        match provided.get(name) {
            Some(value) if !value.is_null() => {
                resolved.insert(name.clone(), value.clone());
            }
            _ if !default.is_null() => {
                resolved.insert(name.clone(), default.clone());
            }
            _ => return Err(EngineError::MissingArg(name.clone())),
        }
    }
    for (name, value) in provided {
        resolved.entry(name.clone()).or_insert_with(|| value.clone());
    }
    Ok(resolved)
}

/// Replaces placeholders in every string of `value`. A string that is only a
/// placeholder takes the argument's JSON value; otherwise the argument is
/// spliced in as text.
pub fn substitute(value: &Value, args: &Args) -> Result<Value, EngineError> {
    match value {
        Value::String(s) => substitute_str(s, args),
        Value::Array(items) => items
            .iter()
            .map(|v| substitute(v, args))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::Object(map) => substitute_map(map, args).map(Value::Object),
        other => Ok(other.clone()),
    }
}

pub fn substitute_map(map: &Args, args: &Args) -> Result<Args, EngineError> {
    map.iter()
        .map(|(k, v)| Ok((k.clone(), substitute(v, args)?)))
        .collect()
}

fn substitute_str(s: &str, args: &Args) -> Result<Value, EngineError> {
    if let Some(name) = whole_placeholder(s) {
        return lookup(name, args).cloned();
    }

    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(start) = rest.find("{{") {
        let Some(len) = rest[start + 2..].find("}}") else { break };
        let name = rest[start + 2..start + 2 + len].trim();
        out.push_str(&rest[..start]);
        match lookup(name, args)? {
            Value::String(v) => out.push_str(v),
            v => out.push_str(&v.to_string()),
        }
        rest = &rest[start + 2 + len + 2..];
    }
    out.push_str(rest);
    Ok(Value::String(out))
}

fn whole_placeholder(s: &str) -> Option<&str> {
    let inner = s.trim().strip_prefix("{{")?.strip_suffix("}}")?;
    (!inner.contains("{{") && !inner.contains("}}")).then(|| inner.trim())
}

fn lookup<'a>(name: &str, args: &'a Args) -> Result<&'a Value, EngineError> {
    args.get(name).ok_or_else(|| EngineError::MissingArg(name.to_string()))
}
