//! One list screen: the collection, its mutations and its dialog, wired
//! together the way every admin page uses them.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::capabilities::{CredentialProvider, HttpTransport};
use crate::client::ResourceClient;
use crate::config::ConsoleConfig;
use crate::form::{DialogFormBinder, DialogMode, FormRules};
use crate::list_state::{ListHandle, ListState, ListStatus, LoadOutcome};
use crate::model::{Resource, ResourceId};
use crate::mutation::{MutationCoordinator, MutationTarget};
use crate::resources::ResourceKind;
use crate::{AppResult, ErrorInfo};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToastKind {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToastMessage {
    pub message: String,
    pub kind: ToastKind,
}

impl ToastMessage {
    pub fn new(kind: ToastKind, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind,
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(ToastKind::Info, message)
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(ToastKind::Success, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(ToastKind::Warning, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(ToastKind::Error, message)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowView {
    pub id: ResourceId,
    pub data: Value,
}

/// Everything a renderer needs for one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreenView {
    pub rows: Vec<RowView>,
    pub total_count: usize,
    pub total_pages: usize,
    pub page: usize,
    pub page_size: usize,
    pub search_term: String,
    pub status: ListStatus,
    pub error_message: Option<String>,
    pub dialog: DialogMode,
    pub field_errors: BTreeMap<String, String>,
    pub submission_error: Option<String>,
    pub pending: bool,
    pub toast: Option<ToastMessage>,
    pub needs_reauth: bool,
}

pub struct ResourceScreen<T> {
    client: ResourceClient,
    list: ListHandle<T>,
    mutations: MutationCoordinator<T>,
    form: DialogFormBinder,
    rules: FormRules,
    toast: Option<ToastMessage>,
    needs_reauth: bool,
}

impl<T> ResourceScreen<T>
where
    T: DeserializeOwned + Serialize + Clone + Send + Sync + 'static,
{
    pub fn new(client: ResourceClient, list: ListState<T>, rules: FormRules) -> Self {
        let list = ListHandle::new(list);
        let mutations = MutationCoordinator::new(client.clone(), list.clone());
        Self {
            client,
            list,
            mutations,
            form: DialogFormBinder::new(),
            rules,
            toast: None,
            needs_reauth: false,
        }
    }

    /// Screen for a catalogued collection, searching its default fields.
    pub fn for_kind(
        kind: ResourceKind,
        config: ConsoleConfig,
        transport: Arc<dyn HttpTransport>,
        credentials: Arc<dyn CredentialProvider>,
        rules: FormRules,
    ) -> AppResult<Self> {
        let query = crate::list_state::QuerySpec::with_page_size(config.default_page_size)?;
        let client = ResourceClient::for_kind(kind, config, transport, credentials)?;
        let list = kind
            .default_search_fields()
            .iter()
            .fold(ListState::new().with_query(query)?, |list, &name| {
                list.with_search_field(name, move |data: &T| serialized_text(data, name))
            });
        Ok(Self::new(client, list, rules))
    }

    pub fn client(&self) -> &ResourceClient {
        &self.client
    }

    pub fn list(&self) -> &ListHandle<T> {
        &self.list
    }

    pub fn mutations(&self) -> &MutationCoordinator<T> {
        &self.mutations
    }

    pub fn form(&self) -> &DialogFormBinder {
        &self.form
    }

    pub fn form_mut(&mut self) -> &mut DialogFormBinder {
        &mut self.form
    }

    pub fn toast(&self) -> Option<&ToastMessage> {
        self.toast.as_ref()
    }

    pub fn dismiss_toast(&mut self) {
        self.toast = None;
    }

    pub fn needs_reauth(&self) -> bool {
        self.needs_reauth
    }

    pub async fn mount(&mut self) -> LoadOutcome {
        self.refresh().await
    }

    #[instrument(skip(self), fields(base = %self.client.base_url()))]
    pub async fn refresh(&mut self) -> LoadOutcome {
        let outcome = self.list.load(self.client.list::<T>()).await;
        match &outcome {
            LoadOutcome::Ready { count } => {
                info!(count, "list refreshed");
                self.needs_reauth = false;
            }
            LoadOutcome::Failed(error) => {
                self.note_failure(error);
            }
            LoadOutcome::Stale => {}
        }
        outcome
    }

    pub async fn set_search_term(&self, term: impl Into<String>) {
        self.list.write().await.set_search_term(term);
    }

    pub async fn set_page(&self, page: usize) {
        self.list.write().await.set_page(page);
    }

    pub async fn set_page_size(&self, page_size: usize) -> AppResult<()> {
        self.list.write().await.set_page_size(page_size)
    }

    pub async fn set_predicate(&self, key: impl Into<String>, value: Value) {
        self.list.write().await.set_predicate(key, value);
    }

    pub fn open_create(&mut self) {
        self.retire_session();
        self.form.open_create();
    }

    /// Opens the edit dialog pre-filled from the listed resource.
    pub async fn open_edit(&mut self, id: &ResourceId) -> AppResult<()> {
        let initial = {
            let list = self.list.read().await;
            let resource = list.get(id).ok_or_else(|| ErrorInfo::not_found(id))?;
            resource.data_json()?
        };
        self.retire_session();
        self.form.open_edit(id.clone(), &initial);
        Ok(())
    }

    pub async fn open_delete(&mut self, id: &ResourceId) -> AppResult<()> {
        if !self.list.read().await.contains(id) {
            return Err(ErrorInfo::not_found(id));
        }
        self.retire_session();
        self.form.open_delete(id.clone());
        Ok(())
    }

    pub fn close_dialog(&mut self) {
        self.retire_session();
        self.form.close();
    }

    /// Every dialog reset starts a new form session; the old session's
    /// failed create, if any, is no longer reachable.
    fn retire_session(&self) {
        self.mutations
            .forget(&MutationTarget::Session(self.form.session().clone()));
    }

    /// Runs the open dialog's action. On success the dialog closes; on
    /// failure it stays open holding the error.
    #[instrument(skip(self), fields(mode = ?self.form.mode()))]
    pub async fn submit(&mut self) -> AppResult<()> {
        let mode = self.form.mode().clone();
        let (result, done) = match mode {
            DialogMode::Closed => {
                return Err(ErrorInfo::invalid_state("no dialog is open"));
            }
            DialogMode::Create => {
                let draft = self.validated_draft()?;
                let session = self.form.session().clone();
                let result = self.mutations.create_in(&session, draft).await;
                (result.map(|_| ()), "Created successfully")
            }
            DialogMode::Edit(id) => {
                let draft = self.validated_draft()?;
                let result = self.mutations.update(&id, draft).await;
                (result.map(|_| ()), "Updated successfully")
            }
            DialogMode::ConfirmDelete(id) => {
                (self.mutations.remove(&id).await, "Deleted successfully")
            }
        };

        match result {
            Ok(()) => {
                self.form.close();
                self.toast = Some(ToastMessage::success(done));
                Ok(())
            }
            Err(error) => {
                self.form.set_submission_error(error.clone());
                self.note_failure(&error);
                Err(error)
            }
        }
    }

    fn validated_draft(&mut self) -> AppResult<crate::model::Draft> {
        self.form.validated_draft(&self.rules).inspect_err(|error| {
            warn!(message = %error.message, "form rejected before submit");
            self.toast = Some(ToastMessage::warning("Please fix the highlighted fields."));
        })
    }

    fn note_failure(&mut self, error: &ErrorInfo) {
        if error.is_auth_failure() {
            self.needs_reauth = true;
        }
        self.toast = Some(ToastMessage::error(error.user_facing_message()));
    }

    pub async fn view(&self) -> ScreenView {
        let list = self.list.read().await;
        let filtered = list.filtered_view();
        let rows = filtered.rows.iter().map(|r| row_view(r)).collect();

        ScreenView {
            rows,
            total_count: filtered.total_count,
            total_pages: filtered.total_pages,
            page: filtered.page,
            page_size: list.query().page_size(),
            search_term: list.query().search_term().to_string(),
            status: list.status(),
            error_message: list.error().map(ErrorInfo::user_facing_message),
            dialog: self.form.mode().clone(),
            field_errors: self.form.errors().clone(),
            submission_error: self
                .form
                .submission_error()
                .map(ErrorInfo::user_facing_message),
            pending: list.status() == ListStatus::Loading || self.mutations.has_pending(),
            toast: self.toast.clone(),
            needs_reauth: self.needs_reauth,
        }
    }
}

pub(crate) fn row_view<T: Serialize>(resource: &Resource<T>) -> RowView {
    let data = resource.data_json().unwrap_or_else(|e| {
        warn!(id = %resource.id, code = e.code(), "row not serializable");
        Value::Null
    });
    RowView {
        id: resource.id.clone(),
        data,
    }
}

fn serialized_text<T: Serialize>(data: &T, field: &str) -> String {
    match serde_json::to_value(data) {
        Ok(Value::Object(obj)) => match obj.get(field) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        },
        _ => String::new(),
    }
}
