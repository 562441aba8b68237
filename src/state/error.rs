use snafu::Snafu;
use std::path::PathBuf;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum StoreError {
    #[snafu(display("thread '{thread_id}' was not found"))]
    NotFound { thread_id: String },
    #[snafu(display("failed to {action} thread store at {}", path.display()))]
    Io {
        action: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("thread store at {} is not valid JSON", path.display()))]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SubmitError {
    #[snafu(display("a response is already streaming into thread '{thread_id}'"))]
    ConcurrencyViolation { thread_id: String },
    #[snafu(display("cannot submit an empty prompt"))]
    EmptyPrompt,
    #[snafu(display("thread '{thread_id}' has no prompt to retry"))]
    NothingToRetry { thread_id: String },
    #[snafu(display("failed to record the turn: {source}"))]
    Store { source: StoreError },
}
