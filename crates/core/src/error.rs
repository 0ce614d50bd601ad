use thiserror::Error;

#[derive(Error, Debug)]
pub enum SafeVisionError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for SafeVisionError {
    fn from(e: serde_json::Error) -> Self {
        SafeVisionError::Serialize(e.to_string())
    }
}

impl From<serde_yaml::Error> for SafeVisionError {
    fn from(e: serde_yaml::Error) -> Self {
        SafeVisionError::Serialize(e.to_string())
    }
}
