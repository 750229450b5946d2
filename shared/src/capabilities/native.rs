use std::time::{Duration, Instant};

use tracing::{debug, instrument};

use super::http::{HttpError, HttpHeaders, HttpRequest, HttpResponse, HttpResult, HttpTransport, RequestBody};
use crate::config::ConsoleConfig;
use crate::model::MultipartForm;

/// Transport for hosts that run the core natively instead of through a shell.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(config: &ConsoleConfig) -> Result<Self, HttpError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| HttpError::InvalidRequest {
                reason: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl HttpTransport for ReqwestTransport {
    #[instrument(skip(self, request), fields(method = %request.method(), request_id = %request.request_id()))]
    async fn execute(&self, request: HttpRequest) -> HttpResult {
        let started = Instant::now();
        let request_id = request.request_id().to_string();
        let timeout_ms = request.timeout_ms();
        let max_response_size = request.max_response_size();
        let host = request.url().host().to_string();

        let method = reqwest::Method::from_bytes(request.method().as_str().as_bytes())
            .map_err(|e| HttpError::InvalidRequest {
                reason: e.to_string(),
            })?;

        let mut builder = self
            .client
            .request(method, request.url().as_str())
            .timeout(Duration::from_millis(timeout_ms));
        for (name, value) in request.headers().iter() {
            builder = builder.header(name, value);
        }

        builder = match request.into_body() {
            RequestBody::Empty => builder,
            RequestBody::Json(bytes) => builder.body(bytes),
            RequestBody::Multipart(form) => builder.multipart(to_reqwest_form(form)?),
        };

        let mut response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                HttpError::Timeout {
                    timeout_ms,
                    request_id: request_id.clone(),
                }
            } else {
                HttpError::ConnectionError {
                    host: host.clone(),
                    message: e.to_string(),
                }
            }
        })?;

        let status = response.status().as_u16();
        let headers: Vec<(String, String)> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        if let Some(declared) = response.content_length() {
            let declared = usize::try_from(declared).unwrap_or(usize::MAX);
            if declared > max_response_size {
                return Err(HttpError::ResponseTooLarge {
                    size: declared,
                    max: max_response_size,
                });
            }
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(|e| HttpError::ConnectionError {
            host: host.clone(),
            message: format!("failed to read body: {e}"),
        })? {
            append_capped(&mut body, &chunk, max_response_size)?;
        }

        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        debug!(status, duration_ms, "response received");

        Ok(HttpResponse::new(
            status,
            HttpHeaders::from(headers),
            body,
            request_id,
            duration_ms,
        ))
    }
}

/// Stops reading as soon as the body outgrows `max`.
fn append_capped(body: &mut Vec<u8>, chunk: &[u8], max: usize) -> Result<(), HttpError> {
    let size = body.len().saturating_add(chunk.len());
    if size > max {
        return Err(HttpError::ResponseTooLarge { size, max });
    }
    body.extend_from_slice(chunk);
    Ok(())
}

fn to_reqwest_form(form: MultipartForm) -> Result<reqwest::multipart::Form, HttpError> {
    let mut out = reqwest::multipart::Form::new();
    for (name, value) in form.texts() {
        out = out.text(name.to_string(), value.to_string());
    }
    for (name, part) in form.files() {
        let mut file = reqwest::multipart::Part::bytes(part.data.to_vec())
            .file_name(part.file_name.clone());
        if let Some(content_type) = &part.content_type {
            file = file
                .mime_str(content_type)
                .map_err(|e| HttpError::InvalidRequest {
                    reason: format!("invalid content type '{content_type}': {e}"),
                })?;
        }
        out = out.part(name.to_string(), file);
    }
    Ok(out)
}
