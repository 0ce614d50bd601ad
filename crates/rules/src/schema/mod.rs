//! Rule definition schema with serde deserialization.
//!
//! Defines the types read from the rule store:
//! - `RuleDefinition`: the raw, loosely typed document (`type` + `params`)
//! - `Zone` / `SafetyLine`: geometry embedded in a definition
//! - `CompiledRule` / `RuleSpec`: the validated, strongly typed form, built
//!   once at load time by [`RuleDefinition::compile`]

mod compile;
mod definition;
mod error;
mod params;

pub use compile::*;
pub use definition::*;
pub use error::*;
pub use params::*;
