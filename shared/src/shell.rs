//! Crux binding: the same list logic driven by events, with HTTP and
//! rendering carried out by the host shell.

use crux_core::render::Render;
use crux_http::Http;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, warn};
use url::Url;

use crate::client::{decode_collection, interpret_response};
use crate::config::ConsoleConfig;
use crate::form::DialogMode;
use crate::list_state::{ListState, ListStatus, LoadOutcome, LoadTicket};
use crate::model::Resource;
use crate::screen::{row_view, ScreenView, ToastMessage};
use crate::{AppResult, ErrorInfo};

/// What came back for one fetch, stripped of shell types.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Response { status: u16, body: Vec<u8> },
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    Configure {
        base_url: String,
        path: String,
        token: Option<String>,
    },
    Mount,
    SearchChanged(String),
    PageChanged(usize),
    PredicateChanged {
        key: String,
        value: Value,
    },
    Dismiss,

    #[serde(skip)]
    Fetched {
        ticket: LoadTicket,
        outcome: FetchOutcome,
    },
}

#[derive(Default)]
pub struct Model {
    config: ConsoleConfig,
    endpoint: Option<Url>,
    token: Option<SecretString>,
    list: ListState<Value>,
    toast: Option<ToastMessage>,
    needs_reauth: bool,
}

impl Model {
    pub fn list(&self) -> &ListState<Value> {
        &self.list
    }

    pub fn configure(&mut self, base_url: String, path: &str, token: Option<String>) {
        let config = ConsoleConfig {
            base_url,
            ..self.config.clone()
        };
        let endpoint = config.base_url().map_err(ErrorInfo::from).and_then(|mut url| {
            url.path_segments_mut()
                .map_err(|()| ErrorInfo::invalid_request("base URL cannot carry a path"))?
                .pop_if_empty()
                .extend(path.split('/').filter(|s| !s.is_empty()));
            Ok(url)
        });

        match endpoint {
            Ok(url) => {
                debug!(endpoint = %url, "shell configured");
                self.endpoint = Some(url);
                self.config = config;
            }
            Err(error) => {
                warn!(code = error.code(), "rejected shell configuration");
                self.endpoint = None;
                self.toast = Some(ToastMessage::error(error.user_facing_message()));
            }
        }
        self.token = token
            .filter(|t| !t.trim().is_empty())
            .map(SecretString::new);
        self.needs_reauth = false;
    }

    /// Starts a load and returns what to fetch, or settles the load right
    /// away when it cannot be sent.
    fn prepare_fetch(&mut self) -> Option<(LoadTicket, Url, String)> {
        let ticket = self.list.begin_load();
        let failure = match (&self.endpoint, &self.token) {
            (Some(url), Some(token)) => {
                return Some((ticket, url.clone(), format!("Bearer {}", token.expose_secret())));
            }
            (None, _) => ErrorInfo::invalid_state("list endpoint is not configured"),
            (Some(_), None) => ErrorInfo::unauthenticated(),
        };
        self.apply_result(ticket, Err(failure));
        None
    }

    pub fn apply_fetched(&mut self, ticket: LoadTicket, outcome: FetchOutcome) -> LoadOutcome {
        let result = match outcome {
            FetchOutcome::Response { status, body } => interpret_response(status, &body)
                .and_then(|value| decode_collection(value, &self.config.id_field)),
            FetchOutcome::Failed(message) => Err(ErrorInfo::network(message)),
        };
        self.apply_result(ticket, result)
    }

    fn apply_result(
        &mut self,
        ticket: LoadTicket,
        result: AppResult<Vec<Resource<Value>>>,
    ) -> LoadOutcome {
        let outcome = self.list.finish_load(ticket, result);
        match &outcome {
            LoadOutcome::Ready { .. } => self.needs_reauth = false,
            LoadOutcome::Failed(error) => {
                self.needs_reauth |= error.is_auth_failure();
                self.toast = Some(ToastMessage::error(error.user_facing_message()));
            }
            LoadOutcome::Stale => {}
        }
        outcome
    }
}

#[derive(crux_core::macros::Effect)]
pub struct Capabilities {
    pub http: Http<Event>,
    pub render: Render<Event>,
}

#[derive(Default)]
pub struct App;

impl crux_core::App for App {
    type Event = Event;
    type Model = Model;
    type ViewModel = ScreenView;
    type Capabilities = Capabilities;

    fn update(&self, event: Event, model: &mut Model, caps: &Capabilities) {
        match event {
            Event::Configure {
                base_url,
                path,
                token,
            } => model.configure(base_url, &path, token),
            Event::Mount => {
                if let Some((ticket, url, bearer)) = model.prepare_fetch() {
                    caps.http
                        .get(url.as_str())
                        .header("Authorization", bearer.as_str())
                        .header("Accept", "application/json")
                        .send(move |result| {
                            let outcome = match result {
                                Ok(mut response) => FetchOutcome::Response {
                                    status: u16::from(response.status()),
                                    body: response.take_body().unwrap_or_default(),
                                },
                                Err(e) => FetchOutcome::Failed(e.to_string()),
                            };
                            Event::Fetched { ticket, outcome }
                        });
                }
            }
            Event::SearchChanged(term) => model.list.set_search_term(term),
            Event::PageChanged(page) => model.list.set_page(page),
            Event::PredicateChanged { key, value } => model.list.set_predicate(key, value),
            Event::Dismiss => model.toast = None,
            Event::Fetched { ticket, outcome } => {
                model.apply_fetched(ticket, outcome);
            }
        }
        caps.render.render();
    }

    fn view(&self, model: &Model) -> ScreenView {
        let filtered = model.list.filtered_view();
        ScreenView {
            rows: filtered.rows.iter().map(|r| row_view(r)).collect(),
            total_count: filtered.total_count,
            total_pages: filtered.total_pages,
            page: filtered.page,
            page_size: model.list.query().page_size(),
            search_term: model.list.query().search_term().to_string(),
            status: model.list.status(),
            error_message: model.list.error().map(ErrorInfo::user_facing_message),
            dialog: DialogMode::Closed,
            field_errors: BTreeMap::new(),
            submission_error: None,
            pending: model.list.status() == ListStatus::Loading,
            toast: model.toast.clone(),
            needs_reauth: model.needs_reauth,
        }
    }
}
