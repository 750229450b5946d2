//! Modal form state: which dialog is open, the draft being edited, and
//! per-field validation. Nothing here touches the network or a list.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::debug;

use crate::model::{Draft, FilePart, MultipartForm, ResourceId, SessionId};
use crate::{AppResult, ErrorInfo};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "mode", content = "id", rename_all = "snake_case")]
pub enum DialogMode {
    #[default]
    Closed,
    Create,
    Edit(ResourceId),
    ConfirmDelete(ResourceId),
}

impl DialogMode {
    pub fn is_open(&self) -> bool {
        !matches!(self, Self::Closed)
    }

    pub fn target(&self) -> Option<&ResourceId> {
        match self {
            Self::Edit(id) | Self::ConfirmDelete(id) => Some(id),
            Self::Closed | Self::Create => None,
        }
    }
}

// ============================================================================
// Rules
// ============================================================================

type Check = Box<dyn Fn(&Value) -> bool + Send + Sync>;

struct FieldRule {
    field: String,
    message: String,
    check: Check,
}

/// Ordered validation rules. A field may carry several; the first failing
/// one supplies its message.
#[derive(Default)]
pub struct FormRules {
    rules: Vec<FieldRule>,
}

impl std::fmt::Debug for FormRules {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.rules.iter().map(|r| (&r.field, &r.message)))
            .finish()
    }
}

impl FormRules {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn rule(
        mut self,
        field: impl Into<String>,
        message: impl Into<String>,
        check: impl Fn(&Value) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.rules.push(FieldRule {
            field: field.into(),
            message: message.into(),
            check: Box::new(check),
        });
        self
    }

    #[must_use]
    pub fn required(self, field: &str) -> Self {
        let message = format!("{field} is required");
        self.rule(field, message, rules::required)
    }

    #[must_use]
    pub fn min_len(self, field: &str, min: usize) -> Self {
        let message = format!("{field} must be at least {min} characters");
        self.rule(field, message, move |v| rules::min_len(v, min))
    }

    #[must_use]
    pub fn max_len(self, field: &str, max: usize) -> Self {
        let message = format!("{field} must be at most {max} characters");
        self.rule(field, message, move |v| rules::max_len(v, max))
    }

    #[must_use]
    pub fn email(self, field: &str) -> Self {
        let message = format!("{field} must be a valid email address");
        self.rule(field, message, rules::email)
    }

    #[must_use]
    pub fn positive_number(self, field: &str) -> Self {
        let message = format!("{field} must be a positive number");
        self.rule(field, message, rules::positive_number)
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        let mut seen = Vec::new();
        self.rules.iter().filter_map(move |r| {
            if seen.contains(&r.field.as_str()) {
                None
            } else {
                seen.push(r.field.as_str());
                Some(r.field.as_str())
            }
        })
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Predicates behind the [`FormRules`] helpers. Everything except
/// [`required`](rules::required) accepts an absent value.
pub mod rules {
    use serde_json::Value;

    fn is_blank(value: &Value) -> bool {
        match value {
            Value::Null => true,
            Value::String(s) => s.trim().is_empty(),
            Value::Array(items) => items.is_empty(),
            _ => false,
        }
    }

    pub fn required(value: &Value) -> bool {
        !is_blank(value)
    }

    pub fn min_len(value: &Value, min: usize) -> bool {
        match value {
            Value::String(s) => s.trim().is_empty() || s.chars().count() >= min,
            _ => true,
        }
    }

    pub fn max_len(value: &Value, max: usize) -> bool {
        match value {
            Value::String(s) => s.chars().count() <= max,
            _ => true,
        }
    }

    /// Text on both sides of a single `@`.
    pub fn email(value: &Value) -> bool {
        match value {
            Value::String(s) if !s.trim().is_empty() => s
                .trim()
                .split_once('@')
                .is_some_and(|(local, domain)| {
                    !local.is_empty() && !domain.is_empty() && !domain.contains('@')
                }),
            _ => is_blank(value),
        }
    }

    /// Numbers and numeric strings greater than zero.
    pub fn positive_number(value: &Value) -> bool {
        match value {
            Value::Number(n) => n.as_f64().is_some_and(|n| n > 0.0),
            Value::String(s) if !s.trim().is_empty() => {
                s.trim().parse::<f64>().is_ok_and(|n| n.is_finite() && n > 0.0)
            }
            _ => is_blank(value),
        }
    }
}

// ============================================================================
// Binder
// ============================================================================

#[derive(Debug, Clone)]
pub struct DialogFormBinder {
    mode: DialogMode,
    session: SessionId,
    values: Map<String, Value>,
    files: BTreeMap<String, FilePart>,
    errors: BTreeMap<String, String>,
    submission_error: Option<ErrorInfo>,
}

impl Default for DialogFormBinder {
    fn default() -> Self {
        Self::new()
    }
}

impl DialogFormBinder {
    pub fn new() -> Self {
        Self {
            mode: DialogMode::Closed,
            session: SessionId::generate(),
            values: Map::new(),
            files: BTreeMap::new(),
            errors: BTreeMap::new(),
            submission_error: None,
        }
    }

    pub fn mode(&self) -> &DialogMode {
        &self.mode
    }

    pub fn session(&self) -> &SessionId {
        &self.session
    }

    pub fn is_open(&self) -> bool {
        self.mode.is_open()
    }

    pub fn open_create(&mut self) {
        self.reset(DialogMode::Create);
    }

    /// Pre-fills the draft from the resource's JSON object.
    pub fn open_edit(&mut self, id: ResourceId, initial: &Value) {
        self.reset(DialogMode::Edit(id));
        if let Value::Object(fields) = initial {
            self.values = fields.clone();
        }
    }

    pub fn open_delete(&mut self, id: ResourceId) {
        self.reset(DialogMode::ConfirmDelete(id));
    }

    pub fn close(&mut self) {
        self.reset(DialogMode::Closed);
    }

    fn reset(&mut self, mode: DialogMode) {
        self.mode = mode;
        self.session = SessionId::generate();
        self.values.clear();
        self.files.clear();
        self.errors.clear();
        self.submission_error = None;
        debug!(mode = ?self.mode, session = %self.session, "dialog reset");
    }

    pub fn set_field(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        self.files.remove(&name);
        self.values.insert(name, value.into());
    }

    pub fn set_file(&mut self, name: impl Into<String>, file: FilePart) {
        let name = name.into();
        self.values.remove(&name);
        self.files.insert(name, file);
    }

    pub fn clear_field(&mut self, name: &str) {
        self.values.remove(name);
        self.files.remove(name);
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn file(&self, name: &str) -> Option<&FilePart> {
        self.files.get(name)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.values
    }

    /// A file input validates as its file name.
    fn value_for(&self, name: &str) -> Value {
        if let Some(value) = self.values.get(name) {
            return value.clone();
        }
        self.files
            .get(name)
            .map_or(Value::Null, |f| Value::String(f.file_name.clone()))
    }

    /// Recomputes every ruled field's error. Fields without rules are
    /// left alone.
    pub fn validate(&mut self, rules: &FormRules) -> bool {
        let mut failures: BTreeMap<String, String> = BTreeMap::new();
        for rule in &rules.rules {
            if failures.contains_key(&rule.field) {
                continue;
            }
            if !(rule.check)(&self.value_for(&rule.field)) {
                failures.insert(rule.field.clone(), rule.message.clone());
            }
        }

        for field in rules.fields() {
            match failures.remove(field) {
                Some(message) => {
                    self.errors.insert(field.to_string(), message);
                }
                None => {
                    self.errors.remove(field);
                }
            }
        }
        !self.has_errors()
    }

    pub fn field_error(&self, name: &str) -> Option<&str> {
        self.errors.get(name).map(String::as_str)
    }

    pub fn errors(&self) -> &BTreeMap<String, String> {
        &self.errors
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// The draft to submit, or a validation error naming the failing fields.
    pub fn validated_draft(&mut self, rules: &FormRules) -> AppResult<Draft> {
        if !self.validate(rules) {
            let names: Vec<&str> = self.errors.keys().map(String::as_str).collect();
            let body = serde_json::to_value(&self.errors).unwrap_or(Value::Null);
            return Err(
                ErrorInfo::validation(format!("invalid fields: {}", names.join(", "))).with_body(body),
            );
        }
        Ok(self.draft())
    }

    /// Current draft without validation.
    pub fn draft(&self) -> Draft {
        if self.files.is_empty() {
            return Draft::Json(Value::Object(self.values.clone()));
        }

        let mut form = MultipartForm::new();
        for (name, value) in &self.values {
            match value {
                Value::Null => {}
                Value::String(s) => form = form.text(name.clone(), s.clone()),
                other => form = form.text(name.clone(), other.to_string()),
            }
        }
        for (name, file) in &self.files {
            form = form.file(name.clone(), file.clone());
        }
        Draft::Multipart(form)
    }

    pub fn set_submission_error(&mut self, error: ErrorInfo) {
        self.submission_error = Some(error);
    }

    pub fn submission_error(&self) -> Option<&ErrorInfo> {
        self.submission_error.as_ref()
    }

    pub fn clear_submission_error(&mut self) {
        self.submission_error = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn user_rules() -> FormRules {
        FormRules::new()
            .required("name")
            .required("email")
            .email("email")
            .min_len("password", 8)
    }

    #[test]
    fn test_validate_flags_and_clears() {
        let mut form = DialogFormBinder::new();
        form.open_create();
        form.set_field("email", "not-an-email");

        assert!(!form.validate(&user_rules()));
        assert_eq!(form.field_error("name"), Some("name is required"));
        assert_eq!(form.field_error("email"), Some("email must be a valid email address"));
        assert_eq!(form.field_error("password"), None);

        form.set_field("name", "Alice");
        form.set_field("email", "alice@example.com");
        assert!(form.validate(&user_rules()));
        assert!(!form.has_errors());
    }

    #[test]
    fn test_first_failing_rule_wins() {
        let mut form = DialogFormBinder::new();
        form.open_create();
        form.validate(&user_rules());
        assert_eq!(form.field_error("email"), Some("email is required"));
    }

    #[test]
    fn test_validated_draft_lists_failures() {
        let mut form = DialogFormBinder::new();
        form.open_create();
        form.set_field("password", "short");

        let err = form.validated_draft(&user_rules()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
        assert!(err.message.contains("name"));
        assert!(err.message.contains("password"));
        assert_eq!(
            err.body.unwrap()["password"],
            json!("password must be at least 8 characters")
        );
    }

    #[test]
    fn test_json_draft() {
        let mut form = DialogFormBinder::new();
        form.open_create();
        form.set_field("name", "Alice");
        form.set_field("email", "a@b.c");
        form.set_field("age", 30);

        let draft = form.validated_draft(&user_rules()).unwrap();
        assert_eq!(draft, Draft::Json(json!({"name": "Alice", "email": "a@b.c", "age": 30})));
    }

    #[test]
    fn test_file_field_makes_multipart() {
        let rules = FormRules::new().required("title").required("audio");
        let mut form = DialogFormBinder::new();
        form.open_create();
        form.set_field("title", "Morning");
        form.set_field("priority", 2);

        assert!(!form.validate(&rules));
        form.set_file("audio", FilePart::new("a.mp3", vec![1u8, 2]));

        let draft = form.validated_draft(&rules).unwrap();
        assert_matches!(draft, Draft::Multipart(ref multipart) => {
            let texts: Vec<_> = multipart.texts().collect();
            assert!(texts.contains(&("title", "Morning")));
            assert!(texts.contains(&("priority", "2")));
            assert_eq!(multipart.files().count(), 1);
        });
    }

    #[test]
    fn test_open_edit_prefills_and_new_session() {
        let mut form = DialogFormBinder::new();
        form.open_create();
        let first = form.session().clone();
        form.set_submission_error(ErrorInfo::http(400, None));

        form.open_edit("u1".into(), &json!({"name": "Alice", "role": "admin"}));
        assert_eq!(form.mode(), &DialogMode::Edit("u1".into()));
        assert_eq!(form.field("name"), Some(&json!("Alice")));
        assert!(form.submission_error().is_none());
        assert_ne!(form.session(), &first);
    }

    #[test]
    fn test_close_discards_draft() {
        let mut form = DialogFormBinder::new();
        form.open_create();
        form.set_field("name", "x");
        form.validate(&FormRules::new().min_len("name", 3));
        form.close();

        assert!(!form.is_open());
        assert!(form.field("name").is_none());
        assert!(!form.has_errors());
    }

    #[test]
    fn test_clear_field() {
        let mut form = DialogFormBinder::new();
        form.set_file("doc", FilePart::new("a.pdf", vec![0u8]));
        form.clear_field("doc");
        assert!(form.file("doc").is_none());
        assert!(!form.draft().is_multipart());
    }

    #[test]
    fn test_rule_helpers() {
        assert!(!rules::required(&json!("  ")));
        assert!(!rules::required(&Value::Null));
        assert!(rules::required(&json!(0)));

        assert!(rules::email(&json!("a@b")));
        assert!(!rules::email(&json!("@b")));
        assert!(!rules::email(&json!("a@")));
        assert!(!rules::email(&json!("a@b@c")));
        assert!(rules::email(&Value::Null));

        assert!(rules::positive_number(&json!(1.5)));
        assert!(rules::positive_number(&json!("42")));
        assert!(!rules::positive_number(&json!(0)));
        assert!(!rules::positive_number(&json!("-3")));
        assert!(!rules::positive_number(&json!("abc")));

        assert!(rules::max_len(&json!("héllo"), 5));
        assert!(!rules::max_len(&json!("toolong"), 5));
        assert!(rules::min_len(&json!("ab"), 1));
    }

    #[test]
    fn test_dialog_mode_serializes_tagged() {
        assert_eq!(
            serde_json::to_value(DialogMode::Edit("u1".into())).unwrap(),
            json!({"mode": "edit", "id": "u1"})
        );
        assert_eq!(
            serde_json::to_value(DialogMode::Closed).unwrap(),
            json!({"mode": "closed"})
        );
    }
}
