//! Slack Events API endpoint.
//!
//! Answers URL verification, turns `app_mention` events into queued
//! generations, and acknowledges everything else. The reply always goes
//! out before any generation work starts; results arrive later as a
//! channel message.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::{routing::post, Router};
use reelgen_core::generation::GenerationRequest;
use reelgen_worker::{QueueError, WorkItem};
use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Set by Slack on redeliveries of an event it considers unacknowledged.
const RETRY_HEADER: &str = "x-slack-retry-num";

/// Outer event envelope. Only the fields the service acts on are modelled.
#[derive(Debug, Deserialize)]
pub struct EventEnvelope {
    #[serde(default)]
    pub challenge: Option<String>,
    #[serde(default)]
    pub event: Option<SlackEvent>,
}

#[derive(Debug, Deserialize)]
pub struct SlackEvent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub channel: Option<String>,
}

/// POST /slack/events
async fn events(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Response> {
    let envelope: EventEnvelope = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("Invalid event payload: {e}")))?;

    if let Some(challenge) = envelope.challenge {
        tracing::info!("Answering Slack URL verification");
        return Ok(challenge.into_response());
    }

    if let Some(retry) = headers.get(RETRY_HEADER) {
        tracing::debug!(retry = ?retry, "Ignoring Slack event redelivery");
        return Ok("OK".into_response());
    }

    match envelope.event {
        Some(event) if event.kind == "app_mention" => match event.channel {
            Some(channel) => enqueue(&state, channel, &event.text)?,
            None => tracing::warn!("app_mention without a channel, ignoring"),
        },
        Some(event) => tracing::debug!(kind = %event.kind, "Ignoring Slack event"),
        None => tracing::debug!("Slack callback without an event"),
    }

    Ok("OK".into_response())
}

fn enqueue(state: &AppState, channel: String, text: &str) -> AppResult<()> {
    let generation = &state.generation;
    let request = GenerationRequest::new(
        text,
        generation.frame_count,
        generation.total_duration,
        generation.backend_kind,
    )?;
    let item = WorkItem::new(channel, request);
    let request_id = item.id;

    match state.queue.submit(item) {
        Ok(()) => {
            tracing::info!(%request_id, depth = state.queue.depth(), "Generation queued");
            Ok(())
        }
        Err(QueueError::Full(item)) => {
            tracing::warn!(%request_id, channel = %item.channel, "Queue full, rejecting request");
            let delivery = Arc::clone(&state.delivery);
            tokio::spawn(async move {
                if let Err(e) = delivery.notify_busy(&item.channel).await {
                    tracing::error!(error = %e, "Failed to post busy notice");
                }
            });
            Ok(())
        }
        Err(QueueError::Closed(_)) => Err(AppError::Unavailable(
            "The worker pool is shutting down".to_string(),
        )),
    }
}

pub fn router() -> Router<AppState> {
    Router::new().route("/slack/events", post(events))
}
