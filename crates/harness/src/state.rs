//! Outputs captured from a successful apply

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{HarnessError, HarnessResult};

/// Named string outputs of an applied root module
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProvisionedState {
    outputs: BTreeMap<String, String>,
}

impl ProvisionedState {
    pub fn new(outputs: BTreeMap<String, String>) -> Self {
        Self { outputs }
    }

    /// Build from `terraform output -json` text
    ///
    /// The document maps each output name to an object carrying `value`,
    /// `type` and `sensitive`; only `value` is kept.
    pub fn from_output_json(json: &str) -> HarnessResult<Self> {
        let raw: BTreeMap<String, Value> = serde_json::from_str(json)?;
        let mut outputs = BTreeMap::new();
        for (name, entry) in raw {
            let value = entry.get("value").ok_or_else(|| {
                HarnessError::Engine(format!("output '{}' has no value field", name))
            })?;
            outputs.insert(name, render_value(value));
        }
        Ok(Self { outputs })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.outputs.get(key).map(String::as_str)
    }

    /// Look up an output that the scenario cannot do without
    pub fn require(&self, key: &str) -> HarnessResult<&str> {
        self.get(key)
            .ok_or_else(|| HarnessError::MissingOutput(key.to_string()))
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.outputs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl FromIterator<(String, String)> for ProvisionedState {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            outputs: iter.into_iter().collect(),
        }
    }
}

/// Strings are unquoted; everything else keeps its compact JSON form
pub fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_output_json() {
        let json = r#"{
  "nic_name": {"sensitive": false, "type": "string", "value": "shet0028-nic"},
  "vm_image_version": {"sensitive": false, "type": "string", "value": "18.04.202310010"},
  "public_ips": {"sensitive": false, "type": ["list", "string"], "value": ["20.1.2.3"]},
  "instance_count": {"sensitive": false, "type": "number", "value": 1}
}"#;
        let state = ProvisionedState::from_output_json(json).unwrap();
        assert_eq!(state.len(), 4);
        assert_eq!(state.get("nic_name"), Some("shet0028-nic"));
        assert_eq!(state.get("vm_image_version"), Some("18.04.202310010"));
        assert_eq!(state.get("public_ips"), Some(r#"["20.1.2.3"]"#));
        assert_eq!(state.get("instance_count"), Some("1"));
    }

    #[test]
    fn test_empty_outputs() {
        let state = ProvisionedState::from_output_json("{}").unwrap();
        assert!(state.is_empty());
    }

    #[test]
    fn test_entry_without_value_is_rejected() {
        let err = ProvisionedState::from_output_json(r#"{"vm_name": {"type": "string"}}"#)
            .unwrap_err();
        assert!(matches!(err, HarnessError::Engine(_)));
    }

    #[test]
    fn test_require_names_missing_key() {
        let state: ProvisionedState =
            [("vm_name".to_string(), "vm1".to_string())].into_iter().collect();
        assert_eq!(state.require("vm_name").unwrap(), "vm1");
        match state.require("nic_name") {
            Err(HarnessError::MissingOutput(key)) => assert_eq!(key, "nic_name"),
            other => panic!("unexpected: {:?}", other),
        }
    }
}
