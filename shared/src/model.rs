use bytes::Bytes;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::{AppResult, ErrorInfo, FALLBACK_ID_FIELD};

// --- Typed IDs ---

macro_rules! typed_id {
    ($name:ident) => {
        #[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

typed_id!(ResourceId);
typed_id!(SessionId);

impl SessionId {
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

// --- Resource: identity plus payload ---

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Resource<T> {
    pub id: ResourceId,
    pub data: T,
}

impl<T> Resource<T> {
    pub fn new(id: impl Into<ResourceId>, data: T) -> Self {
        Self {
            id: id.into(),
            data,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Resource<U> {
        Resource {
            id: self.id,
            data: f(self.data),
        }
    }
}

impl<T: DeserializeOwned> Resource<T> {
    /// Decode one backend object. The id field stays in the object so `T`
    /// may declare it too.
    pub fn from_json(value: Value, id_field: &str) -> AppResult<Self> {
        let id = extract_id(&value, id_field)?;
        let data = serde_json::from_value(value)
            .map_err(|e| ErrorInfo::decode(format!("resource '{id}' has unexpected shape: {e}")))?;
        Ok(Self { id, data })
    }
}

impl<T: Serialize> Resource<T> {
    pub fn data_json(&self) -> AppResult<Value> {
        serde_json::to_value(&self.data)
            .map_err(|e| ErrorInfo::decode(format!("failed to serialize '{}': {e}", self.id)))
    }
}

fn extract_id(value: &Value, id_field: &str) -> AppResult<ResourceId> {
    let obj = value
        .as_object()
        .ok_or_else(|| ErrorInfo::decode("resource is not a JSON object"))?;

    let raw = obj
        .get(id_field)
        .or_else(|| (id_field != FALLBACK_ID_FIELD).then(|| obj.get(FALLBACK_ID_FIELD)).flatten())
        .ok_or_else(|| ErrorInfo::decode(format!("resource has no '{id_field}' field")))?;

    match raw {
        Value::String(s) if !s.trim().is_empty() => Ok(ResourceId::new(s.trim())),
        Value::Number(n) if n.is_i64() || n.is_u64() => Ok(ResourceId::new(n.to_string())),
        other => Err(ErrorInfo::decode(format!(
            "resource id must be a non-empty string or integer, got {other}"
        ))),
    }
}

// --- Drafts ---

/// A candidate value submitted by a form.
#[derive(Clone, Debug, PartialEq)]
pub enum Draft {
    Json(Value),
    Multipart(MultipartForm),
}

impl Draft {
    pub fn json<T: Serialize>(value: &T) -> AppResult<Self> {
        serde_json::to_value(value)
            .map(Self::Json)
            .map_err(|e| ErrorInfo::invalid_request(format!("draft is not serializable: {e}")))
    }

    #[must_use]
    pub fn is_multipart(&self) -> bool {
        matches!(self, Self::Multipart(_))
    }
}

impl From<Value> for Draft {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

impl From<MultipartForm> for Draft {
    fn from(form: MultipartForm) -> Self {
        Self::Multipart(form)
    }
}

/// Don't keep file contents anywhere but here; they go straight to the transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FilePart {
    pub file_name: String,
    pub content_type: Option<String>,
    pub data: Bytes,
}

impl FilePart {
    pub fn new(file_name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: None,
            data: data.into(),
        }
    }

    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MultipartForm {
    texts: Vec<(String, String)>,
    files: Vec<(String, FilePart)>,
}

impl MultipartForm {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.texts.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn file(mut self, name: impl Into<String>, part: FilePart) -> Self {
        self.files.push((name.into(), part));
        self
    }

    pub fn texts(&self) -> impl Iterator<Item = (&str, &str)> {
        self.texts.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn files(&self) -> impl Iterator<Item = (&str, &FilePart)> {
        self.files.iter().map(|(n, p)| (n.as_str(), p))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.texts.is_empty() && self.files.is_empty()
    }
}
