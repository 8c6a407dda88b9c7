use thiserror::Error;

#[derive(Error, Debug)]
pub enum TopicWeaveError {
    #[error("Topic store error: {0}")]
    Store(String),

    #[error("Source provider error: {0}")]
    Provider(String),

    #[error("Suggestion generator error: {0}")]
    Generator(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}
