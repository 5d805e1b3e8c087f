//! Parsing of tool outputs into flat environment maps.

use serde_json::Value;

use crate::adapter::EnvMap;
use crate::error::{IacError, IacResult};

/// Render a parameter or output value as the string handed to a tool or
/// stored in the environment. Strings stay as-is, everything else is JSON.
pub fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Parse `terraform output -json`.
///
/// The document maps output names to `{ "value": …, "type": …, "sensitive": … }`.
pub fn parse_terraform_outputs(json: &str) -> IacResult<EnvMap> {
    let trimmed = json.trim();
    if trimmed.is_empty() {
        return Ok(EnvMap::new());
    }

    let doc: Value = serde_json::from_str(trimmed)?;
    let outputs = doc.as_object().ok_or_else(|| IacError::OutputParse {
        tool: "terraform".to_string(),
        message: "expected a JSON object".to_string(),
    })?;

    let mut env = EnvMap::new();
    for (key, output) in outputs {
        let value = output.get("value").ok_or_else(|| IacError::OutputParse {
            tool: "terraform".to_string(),
            message: format!("output '{}' has no value", key),
        })?;
        env.insert(key.clone(), render_value(value));
    }
    Ok(env)
}

/// Parse a CDK `--outputs-file`.
///
/// The document maps stack names to `{ OutputKey: value }`. Stacks are
/// flattened in document order; a later stack wins on key collision.
pub fn parse_cdk_outputs(json: &str) -> IacResult<EnvMap> {
    let trimmed = json.trim();
    if trimmed.is_empty() {
        return Ok(EnvMap::new());
    }

    let doc: Value = serde_json::from_str(trimmed)?;
    let stacks = doc.as_object().ok_or_else(|| IacError::OutputParse {
        tool: "cdk".to_string(),
        message: "expected a JSON object".to_string(),
    })?;

    let mut env = EnvMap::new();
    for (stack, outputs) in stacks {
        let outputs = outputs.as_object().ok_or_else(|| IacError::OutputParse {
            tool: "cdk".to_string(),
            message: format!("stack '{}' outputs are not an object", stack),
        })?;
        for (key, value) in outputs {
            env.insert(key.clone(), render_value(value));
        }
    }
    Ok(env)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_render_value() {
        assert_eq!(render_value(&json!("plain")), "plain");
        assert_eq!(render_value(&json!(3)), "3");
        assert_eq!(render_value(&json!(["a", "b"])), r#"["a","b"]"#);
    }

    #[test]
    fn test_parse_terraform_outputs() {
        let json = r#"{
            "bucket": {"sensitive": false, "type": "string", "value": "my-bucket"},
            "ports": {"sensitive": false, "type": ["list", "number"], "value": [80, 443]}
        }"#;

        let env = parse_terraform_outputs(json).unwrap();
        assert_eq!(env.get("bucket").unwrap(), "my-bucket");
        assert_eq!(env.get("ports").unwrap(), "[80,443]");
    }

    #[test]
    fn test_parse_terraform_outputs_empty() {
        assert!(parse_terraform_outputs("{}").unwrap().is_empty());
        assert!(parse_terraform_outputs("  ").unwrap().is_empty());
    }

    #[test]
    fn test_parse_terraform_outputs_missing_value() {
        let err = parse_terraform_outputs(r#"{"x": {"type": "string"}}"#).unwrap_err();
        assert!(matches!(err, IacError::OutputParse { .. }));
    }

    #[test]
    fn test_parse_cdk_outputs_flattens_stacks() {
        let json = r#"{
            "StackA": {"ApiUrl": "https://a.example.com"},
            "StackB": {"QueueUrl": "https://sqs.example.com/q"}
        }"#;

        let env = parse_cdk_outputs(json).unwrap();
        assert_eq!(env.len(), 2);
        assert_eq!(env.get("ApiUrl").unwrap(), "https://a.example.com");
    }

    #[test]
    fn test_parse_cdk_outputs_empty() {
        assert!(parse_cdk_outputs("").unwrap().is_empty());
        assert!(parse_cdk_outputs("\n").unwrap().is_empty());
        assert!(parse_cdk_outputs("{}").unwrap().is_empty());
    }
}
