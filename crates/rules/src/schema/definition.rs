//! Raw rule documents as stored in JSON or YAML.

use serde::{Deserialize, Serialize};

use safevision_core::{Point, Severity};

/// A rule exactly as the rule store hands it over.
///
/// `type` stays a string here so that an unsupported kind surfaces as a
/// [`ConfigError::UnknownType`](super::ConfigError) for this rule alone
/// instead of failing the whole snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuleDefinition {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub rule_type: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub severity: Severity,
    /// Kind-specific parameters, validated by [`RuleDefinition::compile`](super::RuleDefinition::compile).
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub params: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone: Option<Zone>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<SafetyLine>,
}

pub(crate) fn default_true() -> bool {
    true
}

impl RuleDefinition {
    /// Minimal definition with empty params, mostly useful for tests and tooling.
    pub fn new(id: impl Into<String>, rule_type: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            description: None,
            rule_type: rule_type.into(),
            enabled: true,
            severity: Severity::default(),
            params: serde_json::Value::Null,
            zone: None,
            line: None,
        }
    }

    pub fn with_params(mut self, params: serde_json::Value) -> Self {
        self.params = params;
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_zone(mut self, zone: Zone) -> Self {
        self.zone = Some(zone);
        self
    }

    pub fn with_line(mut self, line: SafetyLine) -> Self {
        self.line = Some(line);
        self
    }
}

/// Polygonal danger area in pixel coordinates.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Zone {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub polygon: Vec<Point>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub danger_level: Option<String>,
}

/// Two-point safety line in pixel coordinates.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SafetyLine {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub points: Vec<Point>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<String>,
}
