use admin_console::{
    ConsoleConfig, HttpError, HttpRequest, HttpResponse, HttpTransport, ListStatus, LoadOutcome,
    MutationTarget, ResourceKind, ResourceScreen, SessionCredentials, ToastKind,
};
use admin_console::capabilities::HttpHeaders;
use admin_console::{DialogMode, FormRules};
use assert_matches::assert_matches;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Subscription {
    name: String,
    plan: String,
    status: String,
}

/// Minimal backend stand-in: canned replies in order, requests recorded.
#[derive(Default)]
struct Backend {
    replies: Mutex<VecDeque<(u16, Value)>>,
    seen: Mutex<Vec<(String, String, Option<String>)>>,
}

impl Backend {
    fn reply(&self, status: u16, body: Value) {
        self.replies.lock().unwrap().push_back((status, body));
    }

    fn seen(&self) -> Vec<(String, String, Option<String>)> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl HttpTransport for Backend {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        self.seen.lock().unwrap().push((
            request.method().to_string(),
            request.url().as_str().to_string(),
            request.headers().get("Authorization").map(str::to_string),
        ));
        let (status, body) = self.replies.lock().unwrap().pop_front().ok_or_else(|| {
            HttpError::ConnectionError {
                host: request.url().host().to_string(),
                message: "backend unreachable".into(),
            }
        })?;
        let bytes = if body.is_null() {
            Vec::new()
        } else {
            body.to_string().into_bytes()
        };
        Ok(HttpResponse::new(
            status,
            HttpHeaders::new(),
            bytes,
            request.request_id().to_string(),
            1,
        ))
    }
}

fn subscriptions() -> Value {
    json!({
        "success": true,
        "data": (0..25)
            .map(|i| json!({
                "_id": format!("s{i}"),
                "name": format!("Subscriber {i}"),
                "plan": if i < 5 { "gold" } else { "basic" },
                "status": "active",
            }))
            .collect::<Vec<_>>()
    })
}

fn screen(
    backend: &Arc<Backend>,
    credentials: &Arc<SessionCredentials>,
) -> ResourceScreen<Subscription> {
    ResourceScreen::for_kind(
        ResourceKind::Subscriptions,
        ConsoleConfig {
            base_url: "https://admin.example.com/api/v1".into(),
            ..Default::default()
        },
        backend.clone(),
        credentials.clone(),
        FormRules::new().required("name").required("plan"),
    )
    .unwrap()
}

#[tokio::test]
async fn browse_filter_and_page() {
    let backend = Arc::new(Backend::default());
    backend.reply(200, subscriptions());
    let credentials = Arc::new(SessionCredentials::with_token("jwt-1"));
    let mut screen = screen(&backend, &credentials);

    assert_eq!(screen.mount().await, LoadOutcome::Ready { count: 25 });
    let (method, url, auth) = &backend.seen()[0];
    assert_eq!(method, "GET");
    assert_eq!(url, "https://admin.example.com/api/v1/subscriptions");
    assert_eq!(auth.as_deref(), Some("Bearer jwt-1"));

    screen.set_page(3).await;
    let view = screen.view().await;
    assert_eq!(view.page, 3);
    assert_eq!(view.total_pages, 3);
    assert_eq!(view.rows.len(), 5);

    screen.set_predicate("plan", json!("gold")).await;
    let view = screen.view().await;
    assert_eq!(view.page, 1);
    assert_eq!(view.total_count, 5);
    assert_eq!(view.rows[0].id.as_str(), "s0");

    screen.set_predicate("plan", Value::Null).await;
    screen.set_search_term("subscriber 1").await;
    let view = screen.view().await;
    // "Subscriber 1" and "Subscriber 10".."19"
    assert_eq!(view.total_count, 11);
}

#[tokio::test]
async fn failed_refresh_keeps_last_good_rows() {
    let backend = Arc::new(Backend::default());
    backend.reply(200, subscriptions());
    backend.reply(503, json!({"message": "maintenance"}));
    let credentials = Arc::new(SessionCredentials::with_token("jwt-1"));
    let mut screen = screen(&backend, &credentials);

    screen.mount().await;
    let outcome = screen.refresh().await;
    assert_matches!(outcome, LoadOutcome::Failed(ref e) if e.status == Some(503));

    let view = screen.view().await;
    assert_eq!(view.status, ListStatus::Error);
    assert_eq!(view.total_count, 25);
    assert!(!view.needs_reauth);
    assert_eq!(view.toast.unwrap().kind, ToastKind::Error);
}

#[tokio::test]
async fn expired_session_then_login_again() {
    let backend = Arc::new(Backend::default());
    backend.reply(401, json!({"error": "token expired"}));
    backend.reply(200, subscriptions());
    let credentials = Arc::new(SessionCredentials::with_token("old"));
    let mut screen = screen(&backend, &credentials);

    screen.mount().await;
    assert!(screen.needs_reauth());

    credentials.set("fresh");
    assert_eq!(screen.refresh().await, LoadOutcome::Ready { count: 25 });
    assert!(!screen.needs_reauth());
    assert_eq!(backend.seen()[1].2.as_deref(), Some("Bearer fresh"));
}

#[tokio::test]
async fn logged_out_screen_never_calls_backend() {
    let backend = Arc::new(Backend::default());
    let credentials = Arc::new(SessionCredentials::new());
    let mut screen = screen(&backend, &credentials);

    assert_matches!(screen.mount().await, LoadOutcome::Failed(ref e) if e.is_auth_failure());
    assert!(screen.needs_reauth());
    assert!(backend.seen().is_empty());
}

#[tokio::test]
async fn edit_then_delete_round() {
    let backend = Arc::new(Backend::default());
    backend.reply(200, subscriptions());
    backend.reply(200, Value::Null);
    backend.reply(200, json!({"success": true}));
    let credentials = Arc::new(SessionCredentials::with_token("jwt"));
    let mut screen = screen(&backend, &credentials);
    screen.mount().await;

    screen.open_edit(&"s2".into()).await.unwrap();
    screen.form_mut().set_field("plan", "gold");
    screen.submit().await.unwrap();
    {
        let list = screen.list().read().await;
        assert_eq!(list.get(&"s2".into()).unwrap().data.plan, "gold");
    }
    assert_eq!(backend.seen()[1].0, "PUT");

    screen.open_delete(&"s2".into()).await.unwrap();
    assert_eq!(screen.form().mode(), &DialogMode::ConfirmDelete("s2".into()));
    screen.submit().await.unwrap();

    let view = screen.view().await;
    assert_eq!(view.total_count, 24);
    assert_eq!(view.dialog, DialogMode::Closed);
    assert!(!screen
        .mutations()
        .is_pending(&MutationTarget::Entity("s2".into())));
    assert_eq!(backend.seen()[2].1, "https://admin.example.com/api/v1/subscriptions/s2");
}
