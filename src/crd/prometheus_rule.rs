//! # PrometheusRule
//!
//! Client-side model of the Prometheus Operator `PrometheusRule` kind
//! (`monitoring.coreos.com/v1`). The CRD is installed by the Prometheus Operator;
//! this controller only reads it and manages its finalizer.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

#[derive(kube::CustomResource, Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "PrometheusRule",
    group = "monitoring.coreos.com",
    version = "v1",
    namespaced
)]
pub struct PrometheusRuleSpec {
    /// Rule groups declared by the resource
    #[serde(default)]
    pub groups: Vec<PrometheusRuleGroup>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
pub struct PrometheusRuleGroup {
    pub name: String,
    /// Evaluation interval, e.g. `1m`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,
    /// Limit the number of alerts / series a rule may produce
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,
    #[serde(default)]
    pub rules: Vec<PrometheusRuleEntry>,
}

/// One alerting or recording rule
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
pub struct PrometheusRuleEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<String>,
    /// PromQL expression; the Prometheus Operator accepts strings and integers
    #[serde(deserialize_with = "deserialize_expr")]
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

fn deserialize_expr<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum IntOrString {
        Int(i64),
        String(String),
    }

    Ok(match IntOrString::deserialize(deserializer)? {
        IntOrString::Int(value) => value.to_string(),
        IntOrString::String(value) => value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expr_accepts_integer() {
        let entry: PrometheusRuleEntry =
            serde_json::from_value(serde_json::json!({"record": "one", "expr": 1}))
                .expect("rule should deserialize");
        assert_eq!(entry.expr, "1");
    }

    #[test]
    fn test_rule_fields_deserialize() {
        let spec: PrometheusRuleSpec = serde_json::from_value(serde_json::json!({
            "groups": [{
                "name": "example",
                "interval": "30s",
                "rules": [{
                    "alert": "HighErrorRate",
                    "expr": "rate(errors_total[5m]) > 1",
                    "for": "10m",
                    "keep_firing_for": "5m",
                    "labels": {"severity": "page"},
                    "annotations": {"summary": "errors"}
                }]
            }]
        }))
        .expect("spec should deserialize");

        let rule = &spec.groups[0].rules[0];
        assert_eq!(rule.alert.as_deref(), Some("HighErrorRate"));
        assert_eq!(rule.for_.as_deref(), Some("10m"));
        assert_eq!(rule.keep_firing_for.as_deref(), Some("5m"));
        assert_eq!(spec.groups[0].interval.as_deref(), Some("30s"));
    }
}
