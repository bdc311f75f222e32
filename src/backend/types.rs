//! # Wire Types
//!
//! YAML bodies exchanged with the ruler and alertmanager config APIs.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A rule group as stored by the ruler
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct RuleGroup {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,
    #[serde(default)]
    pub rules: Vec<RuleNode>,
}

/// One alerting (`alert`) or recording (`record`) rule
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct RuleNode {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert: Option<String>,
    pub expr: String,
    #[serde(default, rename = "for", skip_serializing_if = "Option::is_none")]
    pub for_: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keep_firing_for: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

/// Ruler listing: namespace to rule groups
pub type RuleNamespaces = BTreeMap<String, Vec<RuleGroup>>;

/// Body of `POST/GET /api/v1/alerts`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct AlertmanagerConfig {
    #[serde(default)]
    pub template_files: BTreeMap<String, String>,
    #[serde(default)]
    pub alertmanager_config: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_group_yaml_uses_ruler_field_names() {
        let group = RuleGroup {
            name: "example".to_string(),
            rules: vec![RuleNode {
                alert: Some("Down".to_string()),
                expr: "up == 0".to_string(),
                for_: Some("5m".to_string()),
                ..RuleNode::default()
            }],
            ..RuleGroup::default()
        };
        let yaml = serde_yaml::to_string(&group).expect("group should encode");
        assert!(yaml.contains("for: 5m"));
        assert!(!yaml.contains("record"));
        assert!(!yaml.contains("interval"));
    }

    #[test]
    fn test_alertmanager_payload_decodes_without_templates() {
        let payload: AlertmanagerConfig =
            serde_yaml::from_str("alertmanager_config: |\n  route:\n    receiver: x\n")
                .expect("payload should decode");
        assert!(payload.template_files.is_empty());
        assert!(payload.alertmanager_config.contains("receiver: x"));
    }
}
