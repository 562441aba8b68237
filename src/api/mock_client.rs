use super::client::{AskRequest, ByteStream, StreamSource};
use super::error::TransportError;
use bytes::Bytes;
use futures::future::BoxFuture;
use futures::{stream, StreamExt};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::oneshot;

const MOCK_URL: &str = "mock://chatblocks";

/// One scripted reply.
pub enum MockResponse {
    /// Event-stream records; each gets a trailing blank line if it lacks one.
    Records(Vec<String>),
    /// Raw byte chunks delivered exactly as given.
    Raw(Vec<Vec<u8>>),
    /// Non-success status before any body is read.
    Status(u16),
    /// Records followed by a mid-stream failure.
    Interrupted { records: Vec<String>, details: String },
    /// Records, then the stream stays open until `release` fires or is dropped.
    Held {
        records: Vec<String>,
        release: oneshot::Receiver<()>,
    },
}

/// Scripted stream source for tests and offline demos. Replies are consumed
/// in order; every request is recorded.
#[derive(Clone)]
pub struct MockApiClient {
    responses: Arc<Mutex<VecDeque<MockResponse>>>,
    requests: Arc<Mutex<Vec<AskRequest>>>,
}

impl MockApiClient {
    pub fn new(responses: Vec<Vec<String>>) -> Self {
        Self::from_responses(responses.into_iter().map(MockResponse::Records).collect())
    }

    pub fn from_responses(responses: Vec<MockResponse>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses.into())),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn requests(&self) -> Vec<AskRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn next_response(&self) -> Option<MockResponse> {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
    }
}

fn framed(records: Vec<String>) -> Vec<Result<Bytes, TransportError>> {
    records
        .into_iter()
        .map(|record| {
            let record = if record.ends_with("\n\n") {
                record
            } else {
                format!("{record}\n\n")
            };
            Ok(Bytes::from(record))
        })
        .collect()
}

impl StreamSource for MockApiClient {
    fn open<'a>(
        &'a self,
        request: &'a AskRequest,
    ) -> BoxFuture<'a, Result<ByteStream, TransportError>> {
        Box::pin(async move {
            self.requests
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(request.clone());

            let Some(response) = self.next_response() else {
                return Err(TransportError::EmptyBody {
                    url: MOCK_URL.to_string(),
                });
            };

            let bytes: ByteStream = match response {
                MockResponse::Records(records) => Box::pin(stream::iter(framed(records))),
                MockResponse::Raw(chunks) => Box::pin(stream::iter(
                    chunks.into_iter().map(|chunk| Ok(Bytes::from(chunk))),
                )),
                MockResponse::Status(status) => {
                    return Err(TransportError::Status {
                        url: MOCK_URL.to_string(),
                        status,
                    })
                }
                MockResponse::Interrupted { records, details } => {
                    let failure = Err(TransportError::Interrupted {
                        url: MOCK_URL.to_string(),
                        details,
                    });
                    Box::pin(stream::iter(framed(records)).chain(stream::iter([failure])))
                }
                MockResponse::Held { records, release } => {
                    let hold = stream::once(async move {
                        let _ = release.await;
                        None
                    })
                    .filter_map(futures::future::ready);
                    Box::pin(stream::iter(framed(records)).chain(hold))
                }
            };
            Ok(bytes)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::open_frames;

    #[tokio::test]
    async fn test_records_are_framed_and_requests_recorded() {
        let mock = MockApiClient::new(vec![vec![
            "event: token\ndata: {\"text\":\"a\"}".to_string(),
        ]]);
        let frames: Vec<_> = open_frames(&mock, &AskRequest::new("hi"))
            .await
            .unwrap()
            .collect()
            .await;
        assert_eq!(frames.len(), 1);
        assert_eq!(mock.requests()[0].prompt, "hi");
    }

    #[tokio::test]
    async fn test_exhausted_script_fails_before_body() {
        let mock = MockApiClient::new(Vec::new());
        let error = match open_frames(&mock, &AskRequest::new("hi")).await {
            Ok(_) => panic!("no scripted response"),
            Err(error) => error,
        };
        assert!(error.is_before_body());
    }
}
