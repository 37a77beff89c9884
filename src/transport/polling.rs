//! Polling delivery: submit once, then query the run until it settles.

use std::time::Duration;

use reqwest::header::HeaderMap;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::error::{ChatError, Result};
use crate::types::{Delivery, DeliveryEvent};
use crate::util::poll::{PollPolicy, PollStatus};

use super::http::ensure_success;

/// Status reported by the run endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Completed,
    Failed,
    /// Anything else (`queued`, `running`, …) is treated as still in progress.
    #[serde(other)]
    InProgress,
}

/// Body of `GET <agent_url>/<run_id>`.
#[derive(Debug, Clone, Deserialize)]
pub struct RunState {
    pub status: RunStatus,
    #[serde(default)]
    pub results: Vec<Value>,
}

impl RunState {
    /// The answer is the text of the last result entry.
    pub fn answer(&self) -> String {
        match self.results.last() {
            None => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(entry) => ["content", "text", "answer", "output"]
                .iter()
                .find_map(|key| entry.get(key).and_then(Value::as_str))
                .map(str::to_string)
                .unwrap_or_else(|| entry.to_string()),
        }
    }

    /// Failure detail is the serialized last result entry.
    pub fn failure_detail(&self) -> String {
        self.results
            .last()
            .map(Value::to_string)
            .unwrap_or_default()
    }
}

/// Pull the run identifier out of a submission envelope.
pub fn submission_run_id(envelope: &Value) -> Result<String> {
    ["id", "run_id", "runId"]
        .iter()
        .find_map(|key| envelope.get(key))
        .or_else(|| envelope.get("data").and_then(|d| d.get("id")))
        .and_then(|v| match v {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .ok_or_else(|| ChatError::protocol("submission response has no run id"))
}

/// Read a submission response as JSON.
pub async fn read_envelope(resp: reqwest::Response) -> Result<Value> {
    let body = resp
        .text()
        .await
        .map_err(|e| ChatError::Body(e.to_string()))?;
    Ok(serde_json::from_str(&body)?)
}

/// Poll `run_url` under `policy`, emitting the run id and then a single terminal item.
///
/// Each status query is bounded by `request_timeout`; a query that runs over
/// counts as one failed attempt.
pub fn deliver(
    client: reqwest::Client,
    headers: HeaderMap,
    run_url: String,
    run_id: String,
    policy: PollPolicy,
    request_timeout: Duration,
) -> Delivery {
    let stream = async_stream::stream! {
        yield Ok(DeliveryEvent::RunIdentified(run_id.clone()));

        let outcome = policy
            .poll_until(|attempt| poll_once(&client, &headers, &run_url, request_timeout, attempt))
            .await;

        match outcome {
            Ok(answer) => yield Ok(DeliveryEvent::completed_with(answer)),
            Err(e) => yield Err(e),
        }
    };

    Box::pin(stream)
}

async fn poll_once(
    client: &reqwest::Client,
    headers: &HeaderMap,
    run_url: &str,
    timeout: Duration,
    attempt: u32,
) -> Result<PollStatus<String>> {
    debug!(attempt, url = run_url, "Polling run status");

    let resp = client
        .get(run_url)
        .headers(headers.clone())
        .timeout(timeout)
        .send()
        .await?;
    let resp = ensure_success(resp).await?;
    let body = resp
        .text()
        .await
        .map_err(|e| ChatError::Body(e.to_string()))?;
    let state: RunState = serde_json::from_str(&body)?;

    match state.status {
        RunStatus::Completed => Ok(PollStatus::Ready(state.answer())),
        RunStatus::Failed => Err(ChatError::RemoteFailure {
            detail: state.failure_detail(),
        }),
        RunStatus::Pending | RunStatus::InProgress => Ok(PollStatus::Pending),
    }
}
