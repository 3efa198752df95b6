#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    Config(#[from] figment::Error),
    #[error("Unknown log level {0:?}")]
    LogLevel(String),
    #[error("Failed to initialise logger: {0}")]
    Logger(#[from] log::SetLoggerError),
    #[error(transparent)]
    Wrapper(#[from] memo_debounce::Error),
    #[error("Failed to encode report: {0}")]
    Report(#[from] serde_json::Error),
}
