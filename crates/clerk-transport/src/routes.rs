//! Route handlers and router assembly.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{HeaderName, HeaderValue},
    response::{IntoResponse, sse::Sse},
    routing::{delete, get, post},
};
use clerk_core::events::sse_stream;
use clerk_session::SessionSnapshot;
use clerk_store::{Preferences, Profile};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    error::ApiError,
    protocol::{
        Ack, ActionResultRequest, AnswerRequest, DeletePreferenceResponse, DocumentsResponse,
        HealthResponse, PageDataRequest, ParsedDocumentResponse, SavePreferencesRequest,
        SavePreferencesResponse, SessionQuery, StartResponse, StopRequest,
    },
    state::AppState,
};

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Build the application router.
pub fn router(state: AppState) -> Router {
    let autofill = Router::new()
        .route("/start", post(start_autofill))
        .route("/status", get(autofill_status))
        .route("/answer", post(provide_answer))
        .route("/page-data", post(receive_page_data))
        .route("/action-result", post(receive_action_result))
        .route("/stop", post(stop_autofill))
        .route("/session", get(session_snapshot))
        .route("/session/{session_id}", delete(remove_session));

    let api = Router::new()
        .nest("/autofill", autofill)
        .route("/health", get(health))
        .route("/profile", get(get_profile).put(save_profile))
        .route("/preferences", get(get_preferences).put(save_preferences))
        .route("/preferences/{key}", delete(delete_preference))
        .route("/documents", get(list_documents))
        .route("/documents/{name}", get(parse_document));

    Router::new()
        .nest("/api", api)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// Autofill session control

async fn start_autofill(State(state): State<AppState>) -> ApiResult<StartResponse> {
    let session = state.registry.create().await;
    session.start(state.worker())?;
    tracing::info!(session_id = %session.id(), "started autofill session");
    Ok(Json(StartResponse {
        session_id: session.id().to_string(),
    }))
}

/// SSE stream of progress events; ends after the terminal event.
async fn autofill_status(
    State(state): State<AppState>,
    Query(query): Query<SessionQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state.registry.get(&query.session_id).await?;
    let stream = sse_stream(session.event_stream());
    Ok((
        [(
            HeaderName::from_static("x-accel-buffering"),
            HeaderValue::from_static("no"),
        )],
        Sse::new(stream),
    ))
}

async fn provide_answer(
    State(state): State<AppState>,
    Json(req): Json<AnswerRequest>,
) -> ApiResult<Ack> {
    let session = state.registry.get(&req.session_id).await?;
    session.provide_answer(req.answer)?;
    Ok(Json(Ack::OK))
}

async fn receive_page_data(
    State(state): State<AppState>,
    Json(req): Json<PageDataRequest>,
) -> ApiResult<Ack> {
    let session = state.registry.get(&req.session_id).await?;
    if !session.provide_page_data(req.data) {
        tracing::debug!(session_id = %req.session_id, "page data arrived with no scan pending");
    }
    Ok(Json(Ack::OK))
}

async fn receive_action_result(
    State(state): State<AppState>,
    Json(req): Json<ActionResultRequest>,
) -> ApiResult<Ack> {
    let session = state.registry.get(&req.session_id).await?;
    if !session.provide_action_result(req.result) {
        tracing::debug!(session_id = %req.session_id, "action result arrived with no action pending");
    }
    Ok(Json(Ack::OK))
}

async fn stop_autofill(
    State(state): State<AppState>,
    Json(req): Json<StopRequest>,
) -> ApiResult<Ack> {
    let session = state.registry.get(&req.session_id).await?;
    session.stop();
    tracing::info!(session_id = %req.session_id, "stop requested");
    Ok(Json(Ack::OK))
}

async fn session_snapshot(
    State(state): State<AppState>,
    Query(query): Query<SessionQuery>,
) -> ApiResult<SessionSnapshot> {
    let session = state.registry.get(&query.session_id).await?;
    Ok(Json(session.snapshot()))
}

async fn remove_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Ack> {
    if !state.registry.remove(&session_id).await {
        return Err(clerk_core::SessionError::NotFound(session_id).into());
    }
    Ok(Json(Ack::OK))
}

// Records

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let documents_count = state.documents.count().await.unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to count documents");
        0
    });
    Json(HealthResponse {
        status: "ok".to_string(),
        documents_count,
        profile_cached: state.profile.is_cached().await,
        preferences_count: state.preferences.load().await.len(),
        active_sessions: state.registry.len().await,
    })
}

async fn get_profile(State(state): State<AppState>) -> Json<Profile> {
    Json(state.profile.load().await)
}

/// Replace the stored profile and echo it back.
async fn save_profile(
    State(state): State<AppState>,
    Json(profile): Json<Profile>,
) -> ApiResult<Profile> {
    state.profile.save(&profile).await?;
    Ok(Json(profile))
}

async fn get_preferences(State(state): State<AppState>) -> Json<Preferences> {
    Json(state.preferences.load().await)
}

async fn save_preferences(
    State(state): State<AppState>,
    Json(req): Json<SavePreferencesRequest>,
) -> ApiResult<SavePreferencesResponse> {
    if req.preferences.is_empty() {
        return Err(ApiError::BadRequest("No preferences provided.".to_string()));
    }
    let outcome = state.preferences.merge(req.entries()).await?;
    Ok(Json(SavePreferencesResponse {
        merged: outcome.saved,
        total: outcome.total,
    }))
}

async fn delete_preference(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> ApiResult<DeletePreferenceResponse> {
    let total = state
        .preferences
        .remove(&key)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Preference key not found: {key:?}")))?;
    Ok(Json(DeletePreferenceResponse {
        deleted: key,
        total,
    }))
}

async fn list_documents(State(state): State<AppState>) -> ApiResult<DocumentsResponse> {
    let documents = state.documents.list().await?;
    Ok(Json(DocumentsResponse {
        total: documents.len(),
        documents,
    }))
}

async fn parse_document(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<ParsedDocumentResponse> {
    let content = state.documents.parse(&name).await?;
    tracing::debug!(document = %name, bytes = content.len(), "document parsed");
    Ok(Json(ParsedDocumentResponse {
        filename: name,
        content,
    }))
}
