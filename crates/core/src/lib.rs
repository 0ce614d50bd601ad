pub mod alert;
pub mod config;
pub mod detection;
pub mod error;

pub use alert::*;
pub use config::GlobalConfig;
pub use detection::*;
pub use error::*;
