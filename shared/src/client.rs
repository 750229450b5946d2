//! REST access for one resource collection.

use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::capabilities::http::{ValidatedUrl, JSON_CONTENT_TYPE};
use crate::capabilities::{CredentialProvider, HttpMethod, HttpRequest, HttpTransport};
use crate::config::ConsoleConfig;
use crate::list_state::QuerySpec;
use crate::model::{Draft, Resource, ResourceId};
use crate::resources::ResourceKind;
use crate::{envelope_message, AppResult, ErrorInfo, ErrorKind, FALLBACK_ID_FIELD};

const COLLECTION_KEYS: [&str; 3] = ["data", "items", "results"];

#[derive(Clone)]
pub struct ResourceClient {
    base: Url,
    config: ConsoleConfig,
    transport: Arc<dyn HttpTransport>,
    credentials: Arc<dyn CredentialProvider>,
}

impl std::fmt::Debug for ResourceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceClient")
            .field("base", &self.base.as_str())
            .finish_non_exhaustive()
    }
}

impl ResourceClient {
    /// `resource_path` is relative to the configured API root, e.g. `"users"`.
    pub fn new(
        config: ConsoleConfig,
        resource_path: &str,
        transport: Arc<dyn HttpTransport>,
        credentials: Arc<dyn CredentialProvider>,
    ) -> AppResult<Self> {
        config.validate()?;
        let mut base = config.base_url()?;
        push_segments(&mut base, resource_path.split('/'))?;
        Ok(Self {
            base,
            config,
            transport,
            credentials,
        })
    }

    pub fn for_kind(
        kind: ResourceKind,
        config: ConsoleConfig,
        transport: Arc<dyn HttpTransport>,
        credentials: Arc<dyn CredentialProvider>,
    ) -> AppResult<Self> {
        Self::new(config, kind.path(), transport, credentials)
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    pub fn config(&self) -> &ConsoleConfig {
        &self.config
    }

    /// Raw call against `path` below the resource base. `""` addresses the
    /// collection itself.
    #[instrument(skip(self, body), fields(base = %self.base))]
    pub async fn request(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<Draft>,
    ) -> AppResult<Value> {
        let mut url = self.base.clone();
        push_segments(&mut url, path.split('/'))?;
        self.send(method, url, body).await
    }

    pub async fn list<T: DeserializeOwned>(&self) -> AppResult<Vec<Resource<T>>> {
        let value = self.send(HttpMethod::Get, self.base.clone(), None).await?;
        self.decode_collection(value)
    }

    /// Like [`list`](Self::list) but forwards the query to the backend.
    pub async fn list_matching<T: DeserializeOwned>(
        &self,
        query: &QuerySpec,
    ) -> AppResult<Vec<Resource<T>>> {
        let mut url = self.base.clone();
        url.query_pairs_mut()
            .extend_pairs(query.to_query_pairs(&self.config));
        let value = self.send(HttpMethod::Get, url, None).await?;
        self.decode_collection(value)
    }

    pub async fn get<T: DeserializeOwned>(&self, id: &ResourceId) -> AppResult<Resource<T>> {
        let value = self.send(HttpMethod::Get, self.entity_url(id)?, None).await?;
        self.decode_single(value)
    }

    pub async fn create<T: DeserializeOwned>(&self, draft: Draft) -> AppResult<Resource<T>> {
        let value = self
            .send(HttpMethod::Post, self.base.clone(), Some(draft))
            .await?;
        self.decode_single(value)
    }

    /// A backend that answers with an empty body is assumed to have stored
    /// the JSON draft as sent.
    pub async fn update<T: DeserializeOwned>(
        &self,
        id: &ResourceId,
        draft: Draft,
    ) -> AppResult<Resource<T>> {
        self.update_over(id, draft, None).await
    }

    /// Like [`update`](Self::update), with `current` as the stored fields a
    /// partial draft lands on when the reply is empty.
    pub async fn update_over<T: DeserializeOwned>(
        &self,
        id: &ResourceId,
        draft: Draft,
        current: Option<Value>,
    ) -> AppResult<Resource<T>> {
        let echo = match &draft {
            Draft::Json(Value::Object(fields)) => Some(fields.clone()),
            _ => None,
        };
        let value = self
            .send(HttpMethod::Put, self.entity_url(id)?, Some(draft))
            .await?;

        match (value, echo) {
            (Value::Null, Some(changes)) => {
                let mut fields = match current {
                    Some(Value::Object(fields)) => fields,
                    _ => serde_json::Map::new(),
                };
                fields.extend(changes);
                fields
                    .entry(self.config.id_field.clone())
                    .or_insert_with(|| Value::String(id.to_string()));
                Resource::from_json(Value::Object(fields), &self.config.id_field)
            }
            (value, _) => self.decode_single(value),
        }
    }

    pub async fn delete(&self, id: &ResourceId) -> AppResult<()> {
        self.send(HttpMethod::Delete, self.entity_url(id)?, None)
            .await
            .map(|_| ())
    }

    fn entity_url(&self, id: &ResourceId) -> AppResult<Url> {
        if id.as_str().is_empty() {
            return Err(ErrorInfo::invalid_request("resource id cannot be empty"));
        }
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| ErrorInfo::invalid_request("base URL cannot carry a path"))?
            .pop_if_empty()
            .push(id.as_str());
        Ok(url)
    }

    async fn send(&self, method: HttpMethod, url: Url, body: Option<Draft>) -> AppResult<Value> {
        let Some(token) = self.credentials.token() else {
            warn!(%method, "no credentials, request not sent");
            return Err(ErrorInfo::unauthenticated());
        };

        let mut request = HttpRequest::new(method, ValidatedUrl::from_url(&url)?)
            .with_timeout_ms(self.config.timeout_ms)?
            .with_header("Accept", JSON_CONTENT_TYPE)?
            .with_header("Authorization", format!("Bearer {}", token.expose_secret()))?;
        request = match body {
            None => request,
            Some(Draft::Json(value)) => request.with_json(&value)?,
            Some(Draft::Multipart(form)) => request.with_multipart(form)?,
        };

        debug!(%method, url = %url, request_id = request.request_id(), "sending request");
        let response = self.transport.execute(request).await.map_err(|e| {
            warn!(%method, url = %url, error = %e, "transport failure");
            ErrorInfo::from(e)
        })?;

        let result = interpret_response(response.status(), response.body());
        match &result {
            Ok(_) => debug!(status = response.status(), duration_ms = response.duration_ms(), "request succeeded"),
            Err(e) => warn!(status = response.status(), code = e.code(), "request failed"),
        }
        result
    }

    fn decode_collection<T: DeserializeOwned>(&self, value: Value) -> AppResult<Vec<Resource<T>>> {
        decode_collection(value, &self.config.id_field)
    }

    fn decode_single<T: DeserializeOwned>(&self, value: Value) -> AppResult<Resource<T>> {
        let value = single_item(value, &self.config.id_field)?;
        Resource::from_json(value, &self.config.id_field)
    }
}

/// Classify a received response. Shared by the async client and the shell.
pub fn interpret_response(status: u16, body: &[u8]) -> AppResult<Value> {
    let is_blank = body.iter().all(u8::is_ascii_whitespace);

    if !(200..300).contains(&status) {
        let parsed = (!is_blank).then(|| {
            serde_json::from_slice(body)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(body).into_owned()))
        });
        return Err(ErrorInfo::http(status, parsed));
    }

    if is_blank {
        return Ok(Value::Null);
    }

    let value: Value = serde_json::from_slice(body)
        .map_err(|e| ErrorInfo::decode(format!("response is not valid JSON: {e}")).with_status(status))?;

    if envelope_reports_failure(&value) {
        let message =
            envelope_message(&value).unwrap_or_else(|| "request was not successful".to_string());
        return Err(ErrorInfo::new(ErrorKind::Http, message)
            .with_status(status)
            .with_body(value));
    }
    Ok(value)
}

fn envelope_reports_failure(value: &Value) -> bool {
    let Some(obj) = value.as_object() else {
        return false;
    };
    if obj.get("success") == Some(&Value::Bool(false)) {
        return true;
    }
    obj.get("status")
        .and_then(Value::as_str)
        .is_some_and(|s| s.eq_ignore_ascii_case("error") || s.eq_ignore_ascii_case("fail"))
}

pub(crate) fn decode_collection<T: DeserializeOwned>(
    value: Value,
    id_field: &str,
) -> AppResult<Vec<Resource<T>>> {
    collection_items(value)?
        .into_iter()
        .map(|item| Resource::from_json(item, id_field))
        .collect()
}

/// A bare array, or an envelope holding one under a well-known key.
/// `data` may itself be an envelope one level down.
fn collection_items(value: Value) -> AppResult<Vec<Value>> {
    match value {
        Value::Array(items) => Ok(items),
        Value::Null => Ok(Vec::new()),
        Value::Object(mut obj) => {
            for key in COLLECTION_KEYS {
                match obj.remove(key) {
                    Some(Value::Array(items)) => return Ok(items),
                    Some(inner @ Value::Object(_)) if key == "data" => {
                        return collection_items(inner)
                    }
                    _ => {}
                }
            }
            Err(ErrorInfo::decode("response object holds no collection"))
        }
        other => Err(ErrorInfo::decode(format!(
            "expected a collection, got {}",
            json_type(&other)
        ))),
    }
}

/// The object itself, or an envelope's `data` when the outer object has no id.
fn single_item(value: Value, id_field: &str) -> AppResult<Value> {
    match value {
        Value::Object(mut obj) => {
            let has_id = obj.contains_key(id_field) || obj.contains_key(FALLBACK_ID_FIELD);
            if !has_id && matches!(obj.get("data"), Some(Value::Object(_))) {
                if let Some(inner) = obj.remove("data") {
                    return Ok(inner);
                }
            }
            Ok(Value::Object(obj))
        }
        other => Err(ErrorInfo::decode(format!(
            "expected a resource object, got {}",
            json_type(&other)
        ))),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn push_segments<'a>(url: &mut Url, segments: impl Iterator<Item = &'a str>) -> AppResult<()> {
    let mut path = url
        .path_segments_mut()
        .map_err(|()| ErrorInfo::invalid_request("base URL cannot carry a path"))?;
    path.pop_if_empty();
    for segment in segments.filter(|s| !s.is_empty()) {
        path.push(segment);
    }
    Ok(())
}
