use crate::errors::AppError;
use crate::host::HostCommand;
use crate::models::{
    PageMessage, StoreData, TabActivatedRequest, TabId, TabUpdatedRequest, TrackerMessage,
};
use crate::service::TrackerEvent;
use crate::state::AppState;
use crate::tracker::TrackerSnapshot;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

pub async fn installed(State(state): State<AppState>) -> Result<StatusCode, AppError> {
    state
        .tracker
        .send(TrackerEvent::Startup { installed: true })
        .await?;
    Ok(StatusCode::ACCEPTED)
}

pub async fn startup(State(state): State<AppState>) -> Result<StatusCode, AppError> {
    state
        .tracker
        .send(TrackerEvent::Startup { installed: false })
        .await?;
    Ok(StatusCode::ACCEPTED)
}

pub async fn connect_page(State(state): State<AppState>, Path(tab): Path<TabId>) -> StatusCode {
    state.host.connect_page(tab).await;
    StatusCode::NO_CONTENT
}

pub async fn disconnect_page(State(state): State<AppState>, Path(tab): Path<TabId>) -> StatusCode {
    state.host.disconnect_page(tab).await;
    StatusCode::NO_CONTENT
}

pub async fn page_messages(
    State(state): State<AppState>,
    Path(tab): Path<TabId>,
) -> Result<Json<Vec<PageMessage>>, AppError> {
    state
        .host
        .take_page_messages(tab)
        .await
        .map(Json)
        .ok_or_else(|| AppError::not_found(format!("no page connected in tab {tab}")))
}

pub async fn tab_message(
    State(state): State<AppState>,
    Path(tab): Path<TabId>,
    Json(message): Json<TrackerMessage>,
) -> Result<StatusCode, AppError> {
    state.tracker.message(Some(tab), message).await?;
    Ok(StatusCode::ACCEPTED)
}

pub async fn message(
    State(state): State<AppState>,
    Json(message): Json<TrackerMessage>,
) -> Result<StatusCode, AppError> {
    if !matches!(message, TrackerMessage::UpdateTimer { .. }) {
        return Err(AppError::bad_request("message needs a sender tab"));
    }
    state.tracker.message(None, message).await?;
    Ok(StatusCode::ACCEPTED)
}

pub async fn tab_activated(
    State(state): State<AppState>,
    Path(tab): Path<TabId>,
    payload: Option<Json<TabActivatedRequest>>,
) -> Result<StatusCode, AppError> {
    let url = payload.and_then(|Json(body)| body.url);
    state.host.tab_activated(tab, url.clone()).await;
    state
        .tracker
        .send(TrackerEvent::TabActivated { tab, url })
        .await?;
    Ok(StatusCode::ACCEPTED)
}

pub async fn tab_updated(
    State(state): State<AppState>,
    Path(tab): Path<TabId>,
    Json(payload): Json<TabUpdatedRequest>,
) -> Result<StatusCode, AppError> {
    state.host.tab_updated(tab, payload.url.clone()).await;
    state
        .tracker
        .send(TrackerEvent::TabUpdated {
            tab,
            complete: payload.status == "complete",
            url: payload.url,
        })
        .await?;
    Ok(StatusCode::ACCEPTED)
}

pub async fn tab_removed(
    State(state): State<AppState>,
    Path(tab): Path<TabId>,
) -> Result<StatusCode, AppError> {
    state.host.tab_removed(tab).await;
    state.tracker.send(TrackerEvent::TabRemoved { tab }).await?;
    Ok(StatusCode::ACCEPTED)
}

pub async fn host_commands(State(state): State<AppState>) -> Json<Vec<HostCommand>> {
    Json(state.host.take_commands().await)
}

pub async fn settings(State(state): State<AppState>) -> Result<Json<StoreData>, AppError> {
    Ok(Json(state.store.load().await?))
}

pub async fn tracking(State(state): State<AppState>) -> Result<Json<TrackerSnapshot>, AppError> {
    Ok(Json(state.tracker.snapshot().await?))
}
