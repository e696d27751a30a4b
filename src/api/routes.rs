//! HTTP route handlers.

use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::Json,
    routing::{get, patch},
    Router,
};
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::cache::{InMemoryCache, ProcessedCounter, SharedCache, SummaryCache, SummarySnapshot};
use crate::config::Config;
use crate::consumer::{Consumer, SimulatedEnricher};
use crate::events::Dispatch;
use crate::gateway::{Gateway, GatewayError};
use crate::store::{create_task_store, SharedTaskStore};
use crate::task::Task;

use super::types::*;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub gateway: Gateway,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

/// Collaborators built once at startup and handed to each component.
struct Services {
    gateway: Gateway,
    dispatch: Dispatch,
    store: SharedTaskStore,
    counter: ProcessedCounter,
}

fn wire(config: &Config, store: SharedTaskStore) -> Services {
    let cache: SharedCache = Arc::new(InMemoryCache::new());
    let dispatch = Dispatch::new(config.dispatch_mode);
    let counter = ProcessedCounter::new(Arc::clone(&cache));
    let gateway = Gateway::new(
        Arc::clone(&store),
        dispatch.publisher(),
        SummaryCache::new(cache, config.summary_ttl),
        counter.clone(),
        config.page_size,
    );
    Services {
        gateway,
        dispatch,
        store,
        counter,
    }
}

/// Build the router over an already wired gateway.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/healthz", get(health))
        .route("/api/tasks", get(list_tasks).post(create_task))
        .route("/api/tasks/summary", get(get_summary))
        .route("/api/tasks/:id", get(get_task))
        .route("/api/tasks/:id/complete", patch(complete_task))
        .route("/api/stats", get(get_stats))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP server and, if enabled, the in-process consumer.
pub async fn serve(config: Config) -> anyhow::Result<()> {
    config.validate()?;

    // Store connectivity and schema setup are fatal on failure.
    let store = create_task_store(config.store_type()).await?;
    tracing::info!(
        persistent = store.is_persistent(),
        "Task store initialized from {}",
        config.database_url
    );

    let services = wire(&config, store);
    let shutdown = CancellationToken::new();

    let consumer = if config.consumer_enabled {
        let consumer = Consumer::subscribe(
            &services.dispatch,
            Arc::clone(&services.store),
            services.counter.clone(),
            Arc::new(SimulatedEnricher::new(&config.enrich)),
        );
        Some(tokio::spawn(consumer.run(shutdown.clone())))
    } else {
        // Queue dispatch requires a consumer, so only broadcast reaches here.
        tracing::info!("Consumer disabled; task-created events have no subscriber and are dropped");
        None
    };

    let addr = config.listen_addr();
    let state = Arc::new(AppState {
        config,
        gateway: services.gateway,
    });
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    // Unsubscribe and release; in-flight enrichment is not awaited.
    shutdown.cancel();
    services.dispatch.close();
    if let Some(handle) = consumer {
        if let Err(e) = handle.await {
            tracing::error!("Consumer task failed: {}", e);
        }
    }

    tracing::info!("Graceful shutdown complete");
    Ok(())
}

/// Wait for SIGTERM/SIGINT, then cancel `shutdown`.
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
        _ = shutdown.cancelled() => {},
    }

    tracing::info!("Shutdown signal received, stopping consumer...");
    shutdown.cancel();
}

fn api_error(err: GatewayError) -> ApiError {
    let (status, message) = match &err {
        GatewayError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
        GatewayError::NotFound(_) => (StatusCode::NOT_FOUND, "Task not found".to_string()),
        GatewayError::Dependency(_) => {
            tracing::error!("Request failed: {}", err);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            )
        }
    };
    (status, Json(ErrorResponse { error: message }))
}

/// Malformed bodies and query strings are client input errors like any other.
fn rejection_error(rejection: impl std::fmt::Display) -> ApiError {
    api_error(GatewayError::Validation(rejection.to_string()))
}

/// Health check endpoint.
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn list_tasks(
    State(state): State<Arc<AppState>>,
    query: Result<Query<ListTasksQuery>, QueryRejection>,
) -> Result<Json<Vec<Task>>, ApiError> {
    let Query(query) = query.map_err(rejection_error)?;
    state
        .gateway
        .list_tasks(query.limit)
        .await
        .map(Json)
        .map_err(api_error)
}

async fn create_task(
    State(state): State<Arc<AppState>>,
    req: Result<Json<CreateTaskRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Task>), ApiError> {
    let Json(req) = req.map_err(rejection_error)?;
    let task = state
        .gateway
        .create_task(&req.title, req.description.as_deref())
        .await
        .map_err(api_error)?;
    Ok((StatusCode::CREATED, Json(task)))
}

async fn get_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Task>, ApiError> {
    let id = Gateway::parse_task_id(&id).map_err(api_error)?;
    state.gateway.get_task(id).await.map(Json).map_err(api_error)
}

async fn complete_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Task>, ApiError> {
    let id = Gateway::parse_task_id(&id).map_err(api_error)?;
    state
        .gateway
        .complete_task(id)
        .await
        .map(Json)
        .map_err(api_error)
}

async fn get_summary(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SummarySnapshot>, ApiError> {
    state.gateway.get_summary().await.map(Json).map_err(api_error)
}

async fn get_stats(State(state): State<Arc<AppState>>) -> Result<Json<StatsResponse>, ApiError> {
    let tasks_processed = state.gateway.processed_count().await.map_err(api_error)?;
    Ok(Json(StatsResponse { tasks_processed }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DispatchMode, EnrichConfig};
    use crate::store::{InMemoryTaskStore, StoreError, TaskStore};
    use crate::task::TaskCounts;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::{json, Value};
    use std::time::Duration;
    use tower::ServiceExt;
    use uuid::Uuid;

    fn test_config() -> Config {
        Config {
            enrich: EnrichConfig {
                base_delay: Duration::ZERO,
                jitter: Duration::ZERO,
            },
            ..Config::in_memory()
        }
    }

    fn app_with_store(store: SharedTaskStore) -> (Router, Services) {
        let config = test_config();
        let services = wire(&config, store);
        let state = Arc::new(AppState {
            config,
            gateway: services.gateway.clone(),
        });
        (router(state), services)
    }

    fn app() -> (Router, Services) {
        app_with_store(Arc::new(InMemoryTaskStore::new()))
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let req = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let resp = app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), 1_000_000)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let (app, _) = app();
        for path in ["/health", "/healthz"] {
            let (status, body) = send(&app, "GET", path, None).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["status"], "ok");
        }
    }

    #[tokio::test]
    async fn create_returns_201_with_pending_task() {
        let (app, _) = app();
        let (status, body) = send(&app, "POST", "/api/tasks", Some(json!({"title": "A"}))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["title"], "A");
        assert_eq!(body["description"], "");
        assert_eq!(body["status"], "pending");
        assert!(body["completed_at"].is_null());
        assert!(body["created_at"].is_string());
    }

    #[tokio::test]
    async fn create_without_title_is_a_validation_error() {
        let (app, _) = app();
        let (status, body) = send(&app, "POST", "/api/tasks", Some(json!({"description": "x"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());

        let (_, list) = send(&app, "GET", "/api/tasks", None).await;
        assert_eq!(list, json!([]));
    }

    async fn post_raw(app: &Router, content_type: Option<&str>, body: &str) -> (StatusCode, Value) {
        let mut builder = Request::builder().method("POST").uri("/api/tasks");
        if let Some(content_type) = content_type {
            builder = builder.header("content-type", content_type);
        }
        let req = builder.body(Body::from(body.to_string())).unwrap();
        let resp = app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), 1_000_000)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn malformed_create_bodies_are_validation_errors() {
        let (app, _) = app();
        let cases = [
            (Some("application/json"), r#"{"title": 5}"#),
            (Some("application/json"), r#"{"title": null}"#),
            (Some("application/json"), "{not json"),
            (None, r#"{"title": "A"}"#),
            (Some("text/plain"), r#"{"title": "A"}"#),
        ];
        for (content_type, body) in cases {
            let (status, reply) = post_raw(&app, content_type, body).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{:?} {}", content_type, body);
            assert!(reply["error"].is_string(), "{:?} {}", content_type, body);
        }

        let (_, list) = send(&app, "GET", "/api/tasks", None).await;
        assert_eq!(list, json!([]));
    }

    #[tokio::test]
    async fn malformed_limit_is_a_validation_error() {
        let (app, _) = app();
        let (status, body) = send(&app, "GET", "/api/tasks?limit=abc", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn serve_rejects_queue_without_consumer() {
        let config = Config {
            dispatch_mode: DispatchMode::Queue,
            consumer_enabled: false,
            ..test_config()
        };
        assert!(serve(config).await.is_err());
    }

    #[tokio::test]
    async fn summary_tracks_create_and_complete() {
        let (app, _) = app();
        let (_, task) = send(&app, "POST", "/api/tasks", Some(json!({"title": "A"}))).await;
        assert_eq!(task["status"], "pending");

        let (status, summary) = send(&app, "GET", "/api/tasks/summary", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(summary, json!({"total": 1, "completed": 0, "pending": 1}));

        let id = task["id"].as_str().unwrap();
        let (status, done) =
            send(&app, "PATCH", &format!("/api/tasks/{}/complete", id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(done["status"], "completed");
        assert!(done["completed_at"].is_string());

        let (_, summary) = send(&app, "GET", "/api/tasks/summary", None).await;
        assert_eq!(summary, json!({"total": 1, "completed": 1, "pending": 0}));
    }

    #[tokio::test]
    async fn complete_unknown_or_malformed_id_is_404() {
        let (app, _) = app();
        send(&app, "POST", "/api/tasks", Some(json!({"title": "A"}))).await;
        let (_, before) = send(&app, "GET", "/api/tasks/summary", None).await;

        let unknown = format!("/api/tasks/{}/complete", Uuid::new_v4());
        let (status, body) = send(&app, "PATCH", &unknown, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Task not found");

        let (status, _) = send(&app, "PATCH", "/api/tasks/nope/complete", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, after) = send(&app, "GET", "/api/tasks/summary", None).await;
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn list_is_newest_first() {
        let (app, _) = app();
        let mut ids = Vec::new();
        for title in ["first", "second", "third"] {
            let (_, task) = send(&app, "POST", "/api/tasks", Some(json!({"title": title}))).await;
            ids.push(task["id"].clone());
        }
        ids.reverse();

        let (status, list) = send(&app, "GET", "/api/tasks", None).await;
        assert_eq!(status, StatusCode::OK);
        let listed: Vec<Value> = list
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["id"].clone())
            .collect();
        assert_eq!(listed, ids);

        let (_, limited) = send(&app, "GET", "/api/tasks?limit=1", None).await;
        assert_eq!(limited.as_array().unwrap().len(), 1);
        assert_eq!(limited[0]["id"], ids[0]);
    }

    #[tokio::test]
    async fn get_task_by_id() {
        let (app, _) = app();
        let (_, task) = send(&app, "POST", "/api/tasks", Some(json!({"title": "A"}))).await;
        let id = task["id"].as_str().unwrap();

        let (status, fetched) = send(&app, "GET", &format!("/api/tasks/{}", id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched, task);

        let missing = format!("/api/tasks/{}", Uuid::new_v4());
        let (status, _) = send(&app, "GET", &missing, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn consumer_enriches_created_task() {
        let (app, services) = app();
        let consumer = Consumer::subscribe(
            &services.dispatch,
            Arc::clone(&services.store),
            services.counter.clone(),
            Arc::new(SimulatedEnricher::new(&test_config().enrich)),
        );
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(consumer.run(shutdown.clone()));

        let (_, task) = send(&app, "POST", "/api/tasks", Some(json!({"title": "A"}))).await;
        let id = task["id"].as_str().unwrap().to_string();

        let mut processed = 0;
        for _ in 0..100 {
            let (_, stats) = send(&app, "GET", "/api/stats", None).await;
            processed = stats["tasks_processed"].as_i64().unwrap();
            if processed == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(processed, 1);

        let (_, fetched) = send(&app, "GET", &format!("/api/tasks/{}", id), None).await;
        assert!(fetched["description"]
            .as_str()
            .unwrap()
            .starts_with("\n[worker] Processed at "));

        shutdown.cancel();
        assert_eq!(handle.await.unwrap().handled, 1);
    }

    #[tokio::test]
    async fn create_without_consumer_leaves_counter_at_zero() {
        let (app, services) = app();
        assert!(matches!(services.dispatch, Dispatch::Broadcast(_)));

        let (_, task) = send(&app, "POST", "/api/tasks", Some(json!({"title": "A"}))).await;
        let (_, stats) = send(&app, "GET", "/api/stats", None).await;
        assert_eq!(stats["tasks_processed"], 0);

        let id = task["id"].as_str().unwrap();
        let (_, fetched) = send(&app, "GET", &format!("/api/tasks/{}", id), None).await;
        assert_eq!(fetched["description"], "");
    }

    struct UnavailableStore;

    #[async_trait]
    impl TaskStore for UnavailableStore {
        fn is_persistent(&self) -> bool {
            true
        }
        async fn create(&self, _: &str, _: Option<&str>) -> Result<Task, StoreError> {
            Err(StoreError::Backend("connection refused".into()))
        }
        async fn get(&self, _: Uuid) -> Result<Task, StoreError> {
            Err(StoreError::Backend("connection refused".into()))
        }
        async fn list_recent(&self, _: usize) -> Result<Vec<Task>, StoreError> {
            Err(StoreError::Backend("connection refused".into()))
        }
        async fn complete(&self, _: Uuid) -> Result<Task, StoreError> {
            Err(StoreError::Backend("connection refused".into()))
        }
        async fn append_description(&self, _: Uuid, _: &str) -> Result<(), StoreError> {
            Err(StoreError::Backend("connection refused".into()))
        }
        async fn counts(&self) -> Result<TaskCounts, StoreError> {
            Err(StoreError::Backend("connection refused".into()))
        }
    }

    #[tokio::test]
    async fn store_failures_become_generic_500() {
        let (app, _) = app_with_store(Arc::new(UnavailableStore));
        let complete = format!("/api/tasks/{}/complete", Uuid::new_v4());
        let requests: [(&str, &str, Option<Value>); 4] = [
            ("GET", "/api/tasks", None),
            ("POST", "/api/tasks", Some(json!({"title": "A"}))),
            ("PATCH", complete.as_str(), None),
            ("GET", "/api/tasks/summary", None),
        ];
        for (method, uri, body) in requests {
            let (status, body) = send(&app, method, uri, body).await;
            assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR, "{} {}", method, uri);
            assert_eq!(body["error"], "Internal server error");
        }
    }

    #[tokio::test]
    async fn queue_dispatch_still_enriches() {
        let config = Config {
            dispatch_mode: DispatchMode::Queue,
            ..test_config()
        };
        let services = wire(&config, Arc::new(InMemoryTaskStore::new()));
        let task = services.gateway.create_task("A", None).await.unwrap();

        // Queued before any worker attached; still delivered.
        let consumer = Consumer::subscribe(
            &services.dispatch,
            Arc::clone(&services.store),
            services.counter.clone(),
            Arc::new(SimulatedEnricher::new(&config.enrich)),
        );
        services.dispatch.close();
        let report = consumer.run(CancellationToken::new()).await;

        assert_eq!(report.handled, 1);
        assert_eq!(services.gateway.processed_count().await.unwrap(), 1);
        assert!(services
            .gateway
            .get_task(task.id)
            .await
            .unwrap()
            .description
            .contains("[worker] Processed at"));
    }
}
