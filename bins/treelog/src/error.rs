#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("config: {0}")]
    Config(String),

    #[error("cannot open {path}: {source}")]
    Open {
        path: String,
        source: std::io::Error,
    },

    #[error("{0}")]
    Stream(#[from] treelog::StreamError),

    #[error("output: {0}")]
    Output(#[from] std::io::Error),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("reader task: {0}")]
    Task(#[from] tokio::task::JoinError),
}
