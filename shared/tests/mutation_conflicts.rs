use admin_console::capabilities::HttpHeaders;
use admin_console::{
    ConsoleConfig, Draft, ErrorKind, FilePart, HttpError, HttpRequest, HttpResponse,
    HttpTransport, ListHandle, ListState, MultipartForm, MutationCoordinator, MutationState,
    MutationTarget, RequestBody, Resource, ResourceClient, ResourceKind, StaticToken,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct AudioNotification {
    title: String,
}

/// Holds every request until `open` is notified, then echoes the JSON body
/// back with an id.
#[derive(Default)]
struct SlowBackend {
    open: Notify,
    calls: AtomicUsize,
    bodies: Mutex<Vec<RequestBody>>,
}

#[async_trait::async_trait]
impl HttpTransport for SlowBackend {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        self.open.notified().await;

        let request_id = request.request_id().to_string();
        let body = request.into_body();
        let reply = match &body {
            RequestBody::Json(bytes) => {
                let mut value: serde_json::Value = serde_json::from_slice(bytes).unwrap();
                value["id"] = json!(format!("a{n}"));
                value
            }
            RequestBody::Multipart(form) => {
                let title = form
                    .texts()
                    .find(|(name, _)| *name == "title")
                    .map(|(_, v)| v.to_string())
                    .unwrap_or_default();
                json!({"id": format!("a{n}"), "title": title})
            }
            RequestBody::Empty => json!({}),
        };
        self.bodies.lock().unwrap().push(body);

        Ok(HttpResponse::new(
            201,
            HttpHeaders::new(),
            reply.to_string().into_bytes(),
            request_id,
            0,
        ))
    }
}

fn coordinator(backend: &Arc<SlowBackend>) -> MutationCoordinator<AudioNotification> {
    let client = ResourceClient::for_kind(
        ResourceKind::AudioNotifications,
        ConsoleConfig::default(),
        backend.clone(),
        Arc::new(StaticToken::new("t")),
    )
    .unwrap();
    MutationCoordinator::new(client, ListHandle::new(ListState::new()))
}

async fn wait_for_calls(backend: &SlowBackend, n: usize) {
    while backend.calls.load(Ordering::SeqCst) < n {
        tokio::task::yield_now().await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn double_submit_is_rejected_until_settled() {
    let backend = Arc::new(SlowBackend::default());
    let coord = coordinator(&backend);

    let first = tokio::spawn({
        let coord = coord.clone();
        async move { coord.create(json!({"title": "Morning"}).into()).await }
    });
    wait_for_calls(&backend, 1).await;

    let second = coord.create(json!({"title": "Morning"}).into()).await;
    assert_eq!(second.unwrap_err().kind, ErrorKind::Conflict);
    assert!(coord.is_pending(&MutationTarget::Collection));

    backend.open.notify_one();
    let created = first.await.unwrap().unwrap();
    assert_eq!(created.id.as_str(), "a0");

    let record = coord.mutation(&MutationTarget::Collection).unwrap();
    assert_eq!(record.state, MutationState::Success);
    assert!(coord.pending().is_empty());
    assert_eq!(coord.list().read().await.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn uploads_go_out_as_multipart() {
    let backend = Arc::new(SlowBackend::default());
    let coord = coordinator(&backend);
    backend.open.notify_one();

    let form = MultipartForm::new().text("title", "Chime").file(
        "audio",
        FilePart::new("chime.mp3", vec![0u8; 16]).with_content_type("audio/mpeg"),
    );
    let created: Resource<AudioNotification> = coord.create(Draft::from(form)).await.unwrap();
    assert_eq!(created.data.title, "Chime");

    let bodies = backend.bodies.lock().unwrap();
    let RequestBody::Multipart(sent) = &bodies[0] else {
        panic!("expected a multipart body");
    };
    let (_, file) = sent.files().next().unwrap();
    assert_eq!(file.file_name, "chime.mp3");
}
