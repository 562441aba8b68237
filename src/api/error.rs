use snafu::Snafu;

/// A request that failed as a whole. Never retried automatically.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum TransportError {
    #[snafu(display(
        "cannot reach local endpoint '{url}': {source}. Start the local server or update CHATBLOCKS_API_URL."
    ))]
    LocalUnreachable { url: String, source: reqwest::Error },
    #[snafu(display("cannot reach endpoint '{url}': {source}"))]
    Connect { url: String, source: reqwest::Error },
    #[snafu(display("request to '{url}' timed out: {source}"))]
    Timeout { url: String, source: reqwest::Error },
    #[snafu(display("endpoint '{url}' returned HTTP {status}"))]
    Status { url: String, status: u16 },
    #[snafu(display("endpoint '{url}' returned no readable body"))]
    EmptyBody { url: String },
    #[snafu(display("stream from '{url}' was interrupted: {details}"))]
    Interrupted { url: String, details: String },
}

impl TransportError {
    /// True when the failure happened before the response body was opened.
    pub fn is_before_body(&self) -> bool {
        !matches!(self, TransportError::Interrupted { .. })
    }
}
