//! Template filters available to manifest sources
//!
//! A deliberately small, Helm-flavoured set: manifests shipped with the
//! platform only need encoding, quoting and YAML embedding.

use base64::Engine as _;
use minijinja::{Error, ErrorKind, Value};

/// Render a value as YAML without the document marker
///
/// Usage: {{ values.resources | toyaml | nindent(10) }}
pub fn toyaml(value: Value) -> Result<String, Error> {
    let json: serde_json::Value = serde_json::to_value(&value)
        .map_err(|e| Error::new(ErrorKind::InvalidOperation, e.to_string()))?;
    let yaml = serde_yaml::to_string(&json)
        .map_err(|e| Error::new(ErrorKind::InvalidOperation, e.to_string()))?;
    Ok(yaml.trim_start_matches("---\n").trim_end().to_string())
}

/// Base64 encode a string
///
/// Usage: {{ values.password | b64encode }}
#[must_use]
pub fn b64encode(value: String) -> String {
    base64::engine::general_purpose::STANDARD.encode(value.as_bytes())
}

/// Wrap in double quotes, escaping embedded quotes
///
/// Usage: {{ values.version | quote }}
#[must_use]
pub fn quote(value: Value) -> String {
    let raw = match value.as_str() {
        Some(s) => s.to_string(),
        None => value.to_string(),
    };
    format!("\"{}\"", raw.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Newline followed by the text indented by `spaces`
///
/// Usage: {{ values.labels | toyaml | nindent(4) }}
#[must_use]
pub fn nindent(value: String, spaces: usize) -> String {
    let pad = " ".repeat(spaces);
    let body: Vec<String> = value
        .lines()
        .map(|line| {
            if line.is_empty() {
                String::new()
            } else {
                format!("{}{}", pad, line)
            }
        })
        .collect();
    format!("\n{}", body.join("\n"))
}

/// Fail rendering when a value is missing or empty
///
/// Usage: {{ values.domain | required("domain must be set") }}
pub fn required(value: Value, message: Option<String>) -> Result<Value, Error> {
    let missing = value.is_undefined()
        || value.is_none()
        || value.as_str().is_some_and(str::is_empty);
    if missing {
        Err(Error::new(
            ErrorKind::InvalidOperation,
            message.unwrap_or_else(|| "required value is missing".to_string()),
        ))
    } else {
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_b64encode() {
        assert_eq!(b64encode("minio".to_string()), "bWluaW8=");
    }

    #[test]
    fn test_quote_escapes() {
        assert_eq!(quote(Value::from("say \"hi\"")), "\"say \\\"hi\\\"\"");
        assert_eq!(quote(Value::from(3)), "\"3\"");
    }

    #[test]
    fn test_nindent() {
        assert_eq!(nindent("a: 1\nb: 2".to_string(), 2), "\n  a: 1\n  b: 2");
    }

    #[test]
    fn test_toyaml() {
        let value = Value::from_serialize(serde_json::json!({"cpu": "100m"}));
        assert_eq!(toyaml(value).unwrap(), "cpu: 100m");
    }

    #[test]
    fn test_required() {
        assert!(required(Value::UNDEFINED, None).is_err());
        assert!(required(Value::from(""), Some("need it".to_string())).is_err());
        assert!(required(Value::from("set"), None).is_ok());
    }
}
