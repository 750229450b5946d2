mod credentials;
pub mod http;

#[cfg(feature = "reqwest")]
mod native;

pub use self::credentials::{CredentialProvider, NoCredentials, SessionCredentials, StaticToken};
pub use self::http::{
    HttpError, HttpHeaders, HttpMethod, HttpRequest, HttpResponse, HttpResult,
    HttpTransport, RequestBody, ValidatedUrl,
};

#[cfg(feature = "reqwest")]
pub use self::native::ReqwestTransport;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing {
    //! Scripted transport for exercising the core without a backend.

    use super::*;
    use serde_json::Value;
    use std::collections::VecDeque;
    use std::sync::{Mutex, PoisonError};
    use tokio::sync::oneshot;

    enum Scripted {
        Respond { status: u16, body: Vec<u8> },
        Fail(HttpError),
        Gated {
            release: oneshot::Receiver<()>,
            status: u16,
            body: Vec<u8>,
        },
    }

    /// Replies in FIFO order, one scripted entry per executed request.
    #[derive(Default)]
    pub struct FakeTransport {
        script: Mutex<VecDeque<Scripted>>,
        requests: Mutex<Vec<HttpRequest>>,
    }

    impl FakeTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn push_json(&self, status: u16, body: &Value) {
            self.push_raw(status, body.to_string().into_bytes());
        }

        pub fn push_raw(&self, status: u16, body: impl Into<Vec<u8>>) {
            self.push(Scripted::Respond {
                status,
                body: body.into(),
            });
        }

        pub fn push_error(&self, error: HttpError) {
            self.push(Scripted::Fail(error));
        }

        /// The response is held back until the returned sender fires.
        pub fn push_gated_json(&self, status: u16, body: &Value) -> oneshot::Sender<()> {
            let (tx, rx) = oneshot::channel();
            self.push(Scripted::Gated {
                release: rx,
                status,
                body: body.to_string().into_bytes(),
            });
            tx
        }

        pub fn requests(&self) -> Vec<HttpRequest> {
            self.requests
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }

        pub fn request_count(&self) -> usize {
            self.requests
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .len()
        }

        fn push(&self, entry: Scripted) {
            self.script
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push_back(entry);
        }
    }

    #[async_trait::async_trait]
    impl HttpTransport for FakeTransport {
        async fn execute(&self, request: HttpRequest) -> HttpResult {
            let request_id = request.request_id().to_string();
            self.requests
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(request);

            let next = self
                .script
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .pop_front();

            let (status, body) = match next {
                Some(Scripted::Respond { status, body }) => (status, body),
                Some(Scripted::Fail(error)) => return Err(error),
                Some(Scripted::Gated {
                    release,
                    status,
                    body,
                }) => {
                    if release.await.is_err() {
                        return Err(HttpError::Cancelled { request_id });
                    }
                    (status, body)
                }
                None => {
                    return Err(HttpError::ConnectionError {
                        host: "fake".into(),
                        message: "no scripted response left".into(),
                    })
                }
            };

            Ok(HttpResponse::new(status, HttpHeaders::new(), body, request_id, 0))
        }
    }
}
