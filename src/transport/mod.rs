//! Transport adapter: talks to the hosted agent and normalizes its answers.
//!
//! Both delivery modes produce the same [`Delivery`] stream, so the session
//! never needs to know which one the service uses.

pub mod http;
pub mod polling;
pub mod streaming;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::HeaderMap;
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::config::AgentConfig;
use crate::error::ChatError;
use crate::types::{Delivery, DeliveryMode};

/// Per-session data the transport needs to open a new run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    /// Identifier generated once when the session starts.
    pub chat_id: String,
}

impl SessionContext {
    pub fn new(chat_id: impl Into<String>) -> Self {
        Self {
            chat_id: chat_id.into(),
        }
    }
}

/// Something that can ask an agent a question.
///
/// Failures that happen before any answer is available (connection refused,
/// non-success status) are returned directly. Failures after that arrive as
/// the final `Err` item of the [`Delivery`].
#[async_trait]
pub trait AgentTransport: Send + Sync {
    /// Open a new run with the first question of a conversation.
    async fn start(&self, question: &str, session: &SessionContext) -> Result<Delivery, ChatError>;

    /// Ask a follow-up question on an existing run.
    async fn continue_run(&self, run_id: &str, question: &str) -> Result<Delivery, ChatError>;
}

/// HTTP implementation of [`AgentTransport`].
pub struct HttpTransport {
    config: AgentConfig,
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(config: AgentConfig) -> Result<Self, ChatError> {
        let client = http::build_client(config.connect_timeout, config.read_timeout)?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    fn headers(&self) -> HeaderMap {
        http::bearer_headers(self.config.api_key.as_deref())
    }

    pub(crate) fn start_body(&self, question: &str, session: &SessionContext) -> Value {
        let mut vars = Map::new();
        for (key, value) in &self.config.extra_vars {
            vars.insert(key.clone(), value.clone().into());
        }
        vars.insert("question".into(), question.into());
        if let Some(ref name) = self.config.owner_name {
            vars.insert("contact_owner_name".into(), name.clone().into());
        }
        if let Some(ref email) = self.config.owner_email {
            vars.insert("contact_owner_email".into(), email.clone().into());
        }
        vars.insert(
            "current_date".into(),
            Utc::now().format("%Y-%m-%d").to_string().into(),
        );

        let chat_id = self
            .config
            .remote_chat_id
            .clone()
            .unwrap_or_else(|| session.chat_id.clone());

        let mut body = json!({
            "chat_id": chat_id,
            "vars": vars,
        });
        if let (Some(bundle), Some(obj)) = (&self.config.bundle, body.as_object_mut()) {
            obj.insert("bundle".into(), bundle.clone().into());
        }
        body
    }

    pub(crate) fn continue_body(&self, question: &str) -> Value {
        let mut body = json!({ "message": question });
        if let (Some(bundle), Some(obj)) = (&self.config.bundle, body.as_object_mut()) {
            obj.insert("bundle".into(), bundle.clone().into());
        }
        body
    }

    /// Turn an accepted response into a delivery using the configured strategy.
    ///
    /// `known_run_id` is the id the request was addressed to, if any.
    async fn deliver(
        &self,
        resp: reqwest::Response,
        known_run_id: Option<&str>,
    ) -> Result<Delivery, ChatError> {
        match self.config.delivery_mode {
            DeliveryMode::Stream => Ok(streaming::deliver(resp, &self.config.run_id_header)),
            DeliveryMode::Poll => {
                let run_id = match known_run_id {
                    Some(id) => id.to_string(),
                    None => {
                        let envelope = polling::read_envelope(resp).await?;
                        polling::submission_run_id(&envelope)?
                    }
                };
                Ok(polling::deliver(
                    self.client.clone(),
                    self.headers(),
                    self.config.run_url(&run_id),
                    run_id,
                    self.config.poll.clone(),
                    self.config.request_timeout,
                ))
            }
        }
    }
}

#[async_trait]
impl AgentTransport for HttpTransport {
    async fn start(&self, question: &str, session: &SessionContext) -> Result<Delivery, ChatError> {
        let body = self.start_body(question, session);

        debug!(
            url = %self.config.agent_url,
            mode = %self.config.delivery_mode,
            chat_id = %session.chat_id,
            "Starting agent run"
        );

        let resp = self
            .client
            .post(&self.config.agent_url)
            .headers(self.headers())
            .json(&body)
            .send()
            .await?;
        let resp = http::ensure_success(resp).await?;

        self.deliver(resp, None).await
    }

    async fn continue_run(&self, run_id: &str, question: &str) -> Result<Delivery, ChatError> {
        let body = self.continue_body(question);
        let url = self.config.run_url(run_id);

        debug!(%url, mode = %self.config.delivery_mode, "Continuing agent run");

        let resp = self
            .client
            .put(&url)
            .headers(self.headers())
            .json(&body)
            .send()
            .await?;
        let resp = http::ensure_success(resp).await?;

        self.deliver(resp, Some(run_id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport(config: AgentConfig) -> HttpTransport {
        HttpTransport::new(config).unwrap()
    }

    #[test]
    fn start_body_carries_question_identity_and_selector() {
        let t = transport(
            AgentConfig::new("http://localhost/agent")
                .with_bundle("default")
                .with_owner("Dana", "dana@example.com")
                .with_var("url", "https://example.com/contacts.csv"),
        );

        let body = t.start_body("find investors", &SessionContext::new("chat_1"));

        assert_eq!(body["chat_id"], "chat_1");
        assert_eq!(body["bundle"], "default");
        assert_eq!(body["vars"]["question"], "find investors");
        assert_eq!(body["vars"]["contact_owner_name"], "Dana");
        assert_eq!(body["vars"]["contact_owner_email"], "dana@example.com");
        assert_eq!(body["vars"]["url"], "https://example.com/contacts.csv");
        assert_eq!(body["vars"]["current_date"].as_str().map(str::len), Some(10));
    }

    #[test]
    fn remote_chat_id_overrides_session_id() {
        let t = transport(AgentConfig::new("http://localhost/agent").with_remote_chat_id("fixed"));
        let body = t.start_body("hi", &SessionContext::new("chat_1"));
        assert_eq!(body["chat_id"], "fixed");
        assert!(body.get("bundle").is_none());
    }

    #[test]
    fn question_cannot_be_overridden_by_extra_vars() {
        let t = transport(AgentConfig::new("http://localhost/agent").with_var("question", "evil"));
        let body = t.start_body("real question", &SessionContext::new("chat_1"));
        assert_eq!(body["vars"]["question"], "real question");
    }

    #[test]
    fn continue_body_is_message_and_bundle() {
        let t = transport(AgentConfig::new("http://localhost/agent").with_bundle("prod"));
        let body = t.continue_body("and their emails?");
        assert_eq!(body, json!({"message": "and their emails?", "bundle": "prod"}));
    }
}
