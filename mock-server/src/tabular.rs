//! Minimal tabular TOON support and path handling for the mock service.
//!
//! Only the single-table form is understood:
//!
//! ```text
//! users[2]{id,name}:
//!   1,Alice
//!   2,Bob
//! ```
//!
//! Paths are `key`, `key[field==value]` or `key[field==value].field`, always
//! addressing the array stored under a top-level key.

use serde_json::{Map, Number, Value};

/// Decode tabular TOON into `{key: [row, ...]}`.
pub fn decode(text: &str, delimiter: char) -> Result<Value, String> {
    let mut lines = text.lines().map(str::trim).filter(|line| !line.is_empty());
    let header = lines.next().ok_or("content is empty")?;
    let (key, declared, fields) = parse_header(header, delimiter)?;

    let mut rows = Vec::new();
    for line in lines {
        let cells = split_row(line, delimiter);
        if cells.len() != fields.len() {
            return Err(format!(
                "row {} has {} values, expected {}",
                rows.len() + 1,
                cells.len(),
                fields.len()
            ));
        }
        let row: Map<String, Value> = fields
            .iter()
            .cloned()
            .zip(cells.iter().map(|cell| parse_scalar(cell)))
            .collect();
        rows.push(Value::Object(row));
    }
    if rows.len() != declared {
        return Err(format!("declared {declared} rows, found {}", rows.len()));
    }

    let mut root = Map::new();
    root.insert(key, Value::Array(rows));
    Ok(Value::Object(root))
}

fn parse_header(header: &str, delimiter: char) -> Result<(String, usize, Vec<String>), String> {
    let body = header
        .strip_suffix(':')
        .ok_or_else(|| format!("header {header:?} must end with ':'"))?;
    let open = body.find('[').ok_or("header is missing '[N]'")?;
    let close = body.find(']').ok_or("header is missing ']'")?;
    let key = body[..open].trim();
    if key.is_empty() || close < open {
        return Err(format!("invalid header {header:?}"));
    }
    let count: String = body[open + 1..close]
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();
    let declared = count
        .parse::<usize>()
        .map_err(|_| format!("invalid row count in {header:?}"))?;

    let rest = &body[close + 1..];
    let fields = rest
        .strip_prefix('{')
        .and_then(|r| r.strip_suffix('}'))
        .ok_or_else(|| format!("header {header:?} is missing '{{fields}}'"))?;
    let fields: Vec<String> = fields
        .split(delimiter)
        .map(|f| f.trim().to_string())
        .filter(|f| !f.is_empty())
        .collect();
    if fields.is_empty() {
        return Err("header declares no fields".to_string());
    }
    Ok((key.to_string(), declared, fields))
}

fn split_row(line: &str, delimiter: char) -> Vec<String> {
    let mut cells = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    for c in line.chars() {
        match c {
            '"' => {
                quoted = !quoted;
                current.push(c);
            }
            c if c == delimiter && !quoted => cells.push(std::mem::take(&mut current)),
            c => current.push(c),
        }
    }
    cells.push(current);
    cells.into_iter().map(|c| c.trim().to_string()).collect()
}

pub fn parse_scalar(raw: &str) -> Value {
    let raw = raw.trim();
    match raw {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        "null" => return Value::Null,
        _ => {}
    }
    if let Some(inner) = raw.strip_prefix('"').and_then(|r| r.strip_suffix('"')) {
        return Value::String(inner.to_string());
    }
    if let Ok(n) = raw.parse::<i64>() {
        return Value::Number(n.into());
    }
    if let Some(n) = raw.parse::<f64>().ok().and_then(Number::from_f64) {
        return Value::Number(n);
    }
    Value::String(raw.to_string())
}

/// Encode `{key: [objects]}` as tabular TOON. Field order follows the first
/// row.
pub fn encode(value: &Value, delimiter: char) -> Result<String, String> {
    let root = value.as_object().ok_or("expected a JSON object")?;
    if root.len() != 1 {
        return Err("expected an object with exactly one key".to_string());
    }
    let (key, rows) = root.iter().next().ok_or("expected a JSON object")?;
    let rows = rows
        .as_array()
        .ok_or_else(|| format!("`{key}` must be an array"))?;
    let fields: Vec<String> = match rows.first() {
        Some(Value::Object(first)) => first.keys().cloned().collect(),
        Some(_) => return Err(format!("`{key}` must contain objects")),
        None => Vec::new(),
    };

    let sep = delimiter.to_string();
    let mut out = format!("{key}[{}]{{{}}}:", rows.len(), fields.join(&sep));
    for row in rows {
        let row = row
            .as_object()
            .ok_or_else(|| format!("`{key}` must contain objects"))?;
        let cells: Vec<String> = fields
            .iter()
            .map(|f| render_scalar(row.get(f).unwrap_or(&Value::Null), delimiter))
            .collect();
        out.push_str("\n  ");
        out.push_str(&cells.join(&sep));
    }
    Ok(out)
}

fn render_scalar(value: &Value, delimiter: char) -> String {
    match value {
        Value::String(s) if s.contains(delimiter) || s.is_empty() => format!("\"{s}\""),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Type names reported in `schema_fields`.
pub fn infer_schema(data: &Value) -> Map<String, Value> {
    let first = data
        .as_object()
        .and_then(|root| root.values().next())
        .and_then(Value::as_array)
        .and_then(|rows| rows.first())
        .and_then(Value::as_object);
    first
        .map(|row| {
            row.iter()
                .map(|(k, v)| (k.clone(), Value::String(type_name(v).to_string())))
                .collect()
        })
        .unwrap_or_default()
}

pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

pub fn row_count(data: &Value) -> usize {
    data.as_object()
        .map(|root| root.values().filter_map(Value::as_array).map(Vec::len).sum())
        .unwrap_or(0)
}

/// A parsed `key[field==value].field` path.
#[derive(Debug, Clone, PartialEq)]
pub struct Path {
    pub key: String,
    pub filter: Option<(String, Value)>,
    pub field: Option<String>,
}

impl Path {
    pub fn parse(raw: &str) -> Result<Self, String> {
        let raw = raw.trim();
        let key_end = raw.find(|c: char| c == '[' || c == '.').unwrap_or(raw.len());
        let key = &raw[..key_end];
        if key.is_empty() {
            return Err(format!("path {raw:?} has no key"));
        }

        let mut rest = &raw[key_end..];
        let mut filter = None;
        if let Some(after) = rest.strip_prefix('[') {
            let close = after
                .find(']')
                .ok_or_else(|| format!("unclosed '[' in path {raw:?}"))?;
            let (name, value) = after[..close]
                .split_once("==")
                .ok_or_else(|| format!("filter in {raw:?} must look like field==value"))?;
            filter = Some((name.trim().to_string(), parse_scalar(value)));
            rest = &after[close + 1..];
        }

        let field = if rest.is_empty() {
            None
        } else {
            match rest.strip_prefix('.') {
                Some(f) if !f.is_empty() => Some(f.to_string()),
                _ => return Err(format!("unexpected {rest:?} in path {raw:?}")),
            }
        };

        Ok(Self {
            key: key.to_string(),
            filter,
            field,
        })
    }

    fn matches(&self, row: &Value) -> bool {
        match &self.filter {
            Some((name, expected)) => row.get(name) == Some(expected),
            None => true,
        }
    }
}

fn target<'a>(data: &'a mut Value, key: &str) -> Result<&'a mut Vec<Value>, String> {
    data.get_mut(key)
        .and_then(Value::as_array_mut)
        .ok_or_else(|| format!("no array at '{key}'"))
}

/// Set `path.field` on every row matched by the path filter.
pub fn update_value(data: &mut Value, path: &str, value: &Value) -> Result<usize, String> {
    let path = Path::parse(path)?;
    let field = path
        .field
        .clone()
        .ok_or("update path must end with .field")?;
    let mut modified = 0;
    for row in target(data, &path.key)?.iter_mut() {
        if path.matches(row) {
            if let Some(obj) = row.as_object_mut() {
                obj.insert(field.clone(), value.clone());
                modified += 1;
            }
        }
    }
    if modified == 0 {
        return Err(format!("no items matched '{}'", path.key));
    }
    Ok(modified)
}

pub fn insert_item(data: &mut Value, path: &str, item: &Map<String, Value>) -> Result<usize, String> {
    let path = Path::parse(path)?;
    target(data, &path.key)?.push(Value::Object(item.clone()));
    Ok(1)
}

/// Remove rows whose fields equal every entry of `selector`.
pub fn delete_items(data: &mut Value, path: &str, selector: &Map<String, Value>) -> Result<usize, String> {
    let path = Path::parse(path)?;
    let rows = target(data, &path.key)?;
    let before = rows.len();
    rows.retain(|row| !selector.iter().all(|(k, v)| row.get(k) == Some(v)));
    Ok(before - rows.len())
}

/// Check `item` against the table schema. Returns the list of problems.
pub fn validate_item(schema: &Map<String, Value>, item: &Map<String, Value>) -> Vec<String> {
    let mut errors = Vec::new();
    for (field, expected) in schema {
        let expected = expected.as_str().unwrap_or("string");
        match item.get(field) {
            None => errors.push(format!("Required field '{field}' is missing")),
            Some(value) if type_name(value) != expected => errors.push(format!(
                "Field '{field}' has wrong type: expected {expected}, got {}",
                type_name(value)
            )),
            Some(_) => {}
        }
    }
    errors
}

/// Rough token estimate: a quarter token per character plus half a token
/// per punctuation mark.
pub fn estimate_tokens(text: &str) -> u64 {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let specials = text
        .chars()
        .filter(|c| ",:.;!?{}[]()".contains(*c))
        .count();
    (collapsed.chars().count() as u64).div_ceil(4) + (specials as u64).div_ceil(2)
}
