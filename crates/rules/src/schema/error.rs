//! Load-time configuration errors.

use safevision_core::RuleKind;

/// A rule definition that cannot be turned into a runnable rule.
///
/// Raised once per rule at load time; the engine logs it and skips the rule.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// `type` is not one of the supported rule kinds.
    #[error("rule '{rule_id}': unknown rule type '{rule_type}'")]
    UnknownType { rule_id: String, rule_type: String },

    /// `params` failed to deserialize into the kind's parameter struct.
    #[error("rule '{rule_id}': invalid params: {message}")]
    InvalidParams { rule_id: String, message: String },

    /// The kind needs a zone or a line and none was supplied.
    #[error("rule '{rule_id}': {kind} requires a {geometry}")]
    MissingGeometry {
        rule_id: String,
        kind: RuleKind,
        geometry: &'static str,
    },

    /// Zone or line present but malformed.
    #[error("rule '{rule_id}': invalid geometry: {message}")]
    InvalidGeometry { rule_id: String, message: String },

    /// A parameter value outside its permitted range.
    #[error("rule '{rule_id}': {message}")]
    Invalid { rule_id: String, message: String },
}

impl ConfigError {
    pub fn rule_id(&self) -> &str {
        match self {
            ConfigError::UnknownType { rule_id, .. }
            | ConfigError::InvalidParams { rule_id, .. }
            | ConfigError::MissingGeometry { rule_id, .. }
            | ConfigError::InvalidGeometry { rule_id, .. }
            | ConfigError::Invalid { rule_id, .. } => rule_id,
        }
    }
}
