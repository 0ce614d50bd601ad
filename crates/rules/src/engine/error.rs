use crate::loader::RuleError;
use crate::schema::ConfigError;
use crate::store::StoreError;
use crate::variants::EvaluationError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The rule source could not produce definitions or config.
    #[error("rule source error: {0}")]
    Source(#[from] RuleError),

    /// An alert could not be persisted and is lost.
    #[error("failed to persist alert for rule '{rule_id}': {source}")]
    Persistence {
        rule_id: String,
        #[source]
        source: StoreError,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Evaluation(#[from] EvaluationError),
}
