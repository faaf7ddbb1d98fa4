use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

use crate::{
    report::{EndTrigger, ShiftReport},
    service::ShiftService,
    shift::EndOutcome,
    types::{ChatId, ShiftEvent, ShiftState, UserId},
};

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ShiftService>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    50
}

#[derive(Debug, Serialize)]
pub struct ChatOverview {
    pub chat_id: ChatId,
    pub enabled: bool,
    pub main_user: Option<UserId>,
    pub users: usize,
    pub count: u32,
    pub goal: u32,
}

#[derive(Debug, Serialize)]
pub struct ShiftView {
    pub state: ShiftState,
    pub summary: Option<ShiftReport>,
}

type ApiError = (StatusCode, String);

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/chats", get(list_chats))
        .route("/api/chats/{chat_id}/shift", get(chat_shift))
        .route("/api/chats/{chat_id}/events", get(chat_events))
        .route("/api/chats/{chat_id}/reports", get(chat_reports))
        .route("/api/chats/{chat_id}/report", post(end_shift))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

async fn list_chats(State(state): State<AppState>) -> Json<Vec<ChatOverview>> {
    let store = state.service.store();
    let mut chats = Vec::new();
    for chat_id in store.chat_ids().await {
        if let Some(shift) = store.get(chat_id).await {
            chats.push(ChatOverview {
                chat_id,
                enabled: shift.config.enabled,
                main_user: shift.main_user,
                users: shift.users.len(),
                count: shift.users.values().map(|user| user.count).sum(),
                goal: shift.goal,
            });
        }
    }
    Json(chats)
}

async fn chat_shift(
    State(state): State<AppState>,
    Path(chat_id): Path<ChatId>,
) -> Result<Json<ShiftView>, ApiError> {
    let Some(shift) = state.service.chat_state(chat_id).await else {
        return Err(not_found(chat_id));
    };
    let summary = state.service.summary(chat_id, Utc::now()).await;
    Ok(Json(ShiftView {
        state: shift,
        summary,
    }))
}

async fn chat_events(
    State(state): State<AppState>,
    Path(chat_id): Path<ChatId>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<ShiftEvent>>, ApiError> {
    let events = state
        .service
        .repository()
        .list_events(chat_id, query.limit)
        .await
        .map_err(internal_error)?;
    Ok(Json(events))
}

async fn chat_reports(
    State(state): State<AppState>,
    Path(chat_id): Path<ChatId>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<ShiftReport>>, ApiError> {
    let reports = state
        .service
        .repository()
        .list_reports(chat_id, query.limit)
        .await
        .map_err(internal_error)?;
    Ok(Json(reports))
}

async fn end_shift(
    State(state): State<AppState>,
    Path(chat_id): Path<ChatId>,
) -> Result<Json<EndOutcome>, ApiError> {
    if !state.service.store().contains(chat_id).await {
        return Err(not_found(chat_id));
    }
    let outcome = state
        .service
        .end_shift(chat_id, Utc::now(), EndTrigger::Manual)
        .await
        .map_err(internal_error)?;
    Ok(Json(outcome))
}

fn not_found(chat_id: ChatId) -> ApiError {
    (StatusCode::NOT_FOUND, format!("unknown chat {chat_id}"))
}

fn internal_error(error: anyhow::Error) -> ApiError {
    (StatusCode::INTERNAL_SERVER_ERROR, error.to_string())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{Body, to_bytes},
        http::{Request, StatusCode},
    };
    use chrono::Utc;
    use tower::ServiceExt;

    use crate::{
        config::ShiftRules,
        export::LogExporter,
        keywords::KeywordPolicy,
        notify::LogNotifier,
        service::ShiftService,
        speech::DisabledSpeechAnalyzer,
        storage::InMemoryShiftRepository,
        store::ShiftStore,
    };

    use super::{AppState, router};

    fn service() -> Arc<ShiftService> {
        Arc::new(ShiftService::new(
            ShiftStore::default(),
            Arc::new(InMemoryShiftRepository::default()),
            Arc::new(LogExporter),
            Arc::new(DisabledSpeechAnalyzer),
            Arc::new(LogNotifier),
            KeywordPolicy::default(),
            ShiftRules::default(),
        ))
    }

    async fn call(service: &Arc<ShiftService>, method: &str, uri: &str) -> (StatusCode, String) {
        let response = router(AppState {
            service: service.clone(),
        })
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .expect("request should build"),
        )
        .await
        .expect("router should respond");

        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body should read");
        (status, String::from_utf8_lossy(&body).into_owned())
    }

    #[tokio::test]
    async fn health_and_unknown_chat() {
        let service = service();
        assert_eq!(call(&service, "GET", "/health").await, (StatusCode::OK, "ok".to_owned()));
        assert_eq!(call(&service, "GET", "/api/chats/7/shift").await.0, StatusCode::NOT_FOUND);
        assert_eq!(call(&service, "POST", "/api/chats/7/report").await.0, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn lists_chats_and_ends_shift_over_http() {
        let service = service();
        service
            .join(-100, 10, "Anna", None, Utc::now())
            .await
            .expect("join should succeed");

        let (status, body) = call(&service, "GET", "/api/chats").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("\"chat_id\":-100"));

        let (status, body) = call(&service, "GET", "/api/chats/-100/shift").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("Anna"));

        let (status, body) = call(&service, "POST", "/api/chats/-100/report").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("Report"));

        let (_, body) = call(&service, "GET", "/api/chats/-100/reports?limit=5").await;
        assert!(body.contains("\"chat_id\":-100"));
        let (_, body) = call(&service, "GET", "/api/chats/-100/events").await;
        assert!(body.contains("joined"));
    }
}
