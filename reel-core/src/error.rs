/// Errors surfaced by the model context, the orchestrator and the artifact writer.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Startup could not complete. Never produced while serving.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The model failed or handed back inconsistent output.
    #[error("inference failed: {0}")]
    Inference(String),

    /// An artifact could not be encoded or written.
    #[error("failed to persist artifact: {0}")]
    Persistence(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
