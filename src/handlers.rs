// handlers.rs
use std::convert::Infallible;

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use serde_json::json;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use tracing::warn;

use crate::error::SyncError;
use crate::feed::FeedEvent;
use crate::models::{
    Author, CreatePollRequest, LogEntry, Poll, RemovePollRequest, SendMessageRequest, VoteRequest,
};
use crate::routes::AppState;

/// Current poll, or 404 when none is active.
pub async fn get_poll(State(app): State<AppState>) -> Result<Json<Poll>, SyncError> {
    app.authority
        .current_poll()
        .await?
        .map(Json)
        .ok_or(SyncError::NotFound)
}

/// Create a poll, replacing any prior one.
pub async fn create_poll(
    State(app): State<AppState>,
    Json(req): Json<CreatePollRequest>,
) -> Result<Json<Poll>, SyncError> {
    app.authority
        .create_poll(req.question, req.options, req.actor)
        .await
        .map(Json)
}

pub async fn vote(
    State(app): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<VoteRequest>,
) -> Result<Json<Poll>, SyncError> {
    app.authority
        .vote(id, req.option_index, req.actor)
        .await
        .map(Json)
}

pub async fn unvote(
    State(app): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<VoteRequest>,
) -> Result<Json<Poll>, SyncError> {
    app.authority
        .unvote(id, req.option_index, req.actor)
        .await
        .map(Json)
}

pub async fn remove_poll(
    State(app): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<RemovePollRequest>,
) -> Result<Json<serde_json::Value>, SyncError> {
    app.authority.remove_poll(id, req.actor).await?;
    Ok(Json(json!({ "status": "poll removed" })))
}

/// The bounded message window, oldest to newest.
pub async fn get_messages(State(app): State<AppState>) -> Result<Json<Vec<LogEntry>>, SyncError> {
    app.authority.messages().await.map(Json)
}

pub async fn send_message(
    State(app): State<AppState>,
    Json(req): Json<SendMessageRequest>,
) -> Result<Json<LogEntry>, SyncError> {
    let author = Author {
        id: req.actor,
        nickname: req.nickname,
        avatar: req.avatar,
    };
    app.authority.send_message(req.text, author).await.map(Json)
}

/// Server-push stream: the current snapshot first, then every change in
/// commit order.
pub async fn subscribe(
    State(app): State<AppState>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, SyncError> {
    let subscription = app.authority.subscribe().await?;
    let backlog =
        tokio_stream::iter(subscription.backlog).map(|event| Ok::<_, Infallible>(to_sse(&event)));
    // A lagged subscriber is cut off here; reconnecting replays the
    // snapshot.
    let live = BroadcastStream::new(subscription.live)
        .map_while(|polled| polled.ok())
        .map(|event| Ok::<_, Infallible>(to_sse(&event)));
    Ok(Sse::new(backlog.chain(live)).keep_alive(KeepAlive::default()))
}

fn to_sse(event: &FeedEvent) -> Event {
    let sse = Event::default().event(event.name());
    match serde_json::to_string(event) {
        Ok(payload) => sse.data(payload),
        Err(err) => {
            warn!(error = %err, "could not encode feed event");
            sse.data("{}")
        }
    }
}
