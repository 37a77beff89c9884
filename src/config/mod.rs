//! Configuration (layered: code > env > `.env` file).

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use crate::error::{ChatError, Result};
use crate::types::DeliveryMode;
use crate::util::poll::PollPolicy;

/// Base URL used when only an agent id is configured.
pub const DEFAULT_API_BASE_URL: &str = "https://agents.toolhouse.ai";

/// Response header that may carry the run identifier of a streamed answer.
pub const DEFAULT_RUN_ID_HEADER: &str = "x-run-id";

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(120);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Everything the transport needs to talk to one hosted agent.
///
/// Built once and handed to [`HttpTransport`](crate::transport::HttpTransport);
/// nothing in the crate reads the environment after construction.
#[derive(Clone, PartialEq)]
pub struct AgentConfig {
    /// Full URL of the agent endpoint. Continuations and polls go to `<agent_url>/<run_id>`.
    pub agent_url: String,
    /// Bearer credential, if the service requires one.
    pub api_key: Option<String>,
    /// Environment/bundle selector sent with every request.
    pub bundle: Option<String>,
    /// Chat id sent with the first request. Falls back to the session's own id.
    pub remote_chat_id: Option<String>,
    pub owner_name: Option<String>,
    pub owner_email: Option<String>,
    /// Additional template variables sent alongside the question.
    pub extra_vars: BTreeMap<String, String>,
    pub delivery_mode: DeliveryMode,
    pub poll: PollPolicy,
    pub run_id_header: String,
    pub connect_timeout: Duration,
    /// Longest silence tolerated between reads of a response body.
    pub read_timeout: Duration,
    /// Total time allowed for a single poll request.
    pub request_timeout: Duration,
}

impl fmt::Debug for AgentConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentConfig")
            .field("agent_url", &self.agent_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("bundle", &self.bundle)
            .field("remote_chat_id", &self.remote_chat_id)
            .field("owner_name", &self.owner_name)
            .field("owner_email", &self.owner_email)
            .field("extra_vars", &self.extra_vars)
            .field("delivery_mode", &self.delivery_mode)
            .field("poll", &self.poll)
            .field("run_id_header", &self.run_id_header)
            .field("connect_timeout", &self.connect_timeout)
            .field("read_timeout", &self.read_timeout)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl AgentConfig {
    /// Create a config pointing at `agent_url` with defaults for everything else.
    pub fn new(agent_url: impl Into<String>) -> Self {
        Self {
            agent_url: agent_url.into().trim_end_matches('/').to_string(),
            api_key: None,
            bundle: None,
            remote_chat_id: None,
            owner_name: None,
            owner_email: None,
            extra_vars: BTreeMap::new(),
            delivery_mode: DeliveryMode::default(),
            poll: PollPolicy::default(),
            run_id_header: DEFAULT_RUN_ID_HEADER.to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Load from environment variables (`AGENTCHAT_*`), reading `.env` first if present.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv(); // load .env if present, ignore error
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let agent_url = match get("AGENTCHAT_AGENT_URL") {
            Some(url) => url,
            None => {
                let agent_id = get("AGENTCHAT_AGENT_ID").ok_or_else(|| {
                    ChatError::Configuration(
                        "set AGENTCHAT_AGENT_URL or AGENTCHAT_AGENT_ID".to_string(),
                    )
                })?;
                let base = get("AGENTCHAT_API_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string());
                format!("{}/{}", base.trim_end_matches('/'), agent_id)
            }
        };

        let mut config = Self::new(agent_url);
        config.api_key = get("AGENTCHAT_API_KEY");
        config.bundle = get("AGENTCHAT_BUNDLE");
        config.remote_chat_id = get("AGENTCHAT_CHAT_ID");
        config.owner_name = get("AGENTCHAT_OWNER_NAME");
        config.owner_email = get("AGENTCHAT_OWNER_EMAIL");

        if let Some(url) = get("AGENTCHAT_CONTACTS_URL") {
            config.extra_vars.insert("url".to_string(), url);
        }

        if let Some(mode) = get("AGENTCHAT_DELIVERY_MODE") {
            config.delivery_mode = mode.parse().map_err(|_| {
                ChatError::Configuration(format!(
                    "AGENTCHAT_DELIVERY_MODE must be 'stream' or 'poll', got '{mode}'"
                ))
            })?;
        }
        if let Some(attempts) = get("AGENTCHAT_POLL_ATTEMPTS") {
            config.poll.max_attempts = parse_number("AGENTCHAT_POLL_ATTEMPTS", &attempts)?;
        }
        if let Some(ms) = get("AGENTCHAT_POLL_INTERVAL_MS") {
            config.poll.interval =
                Duration::from_millis(parse_number("AGENTCHAT_POLL_INTERVAL_MS", &ms)?);
        }

        Ok(config)
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_bundle(mut self, bundle: impl Into<String>) -> Self {
        self.bundle = Some(bundle.into());
        self
    }

    pub fn with_remote_chat_id(mut self, chat_id: impl Into<String>) -> Self {
        self.remote_chat_id = Some(chat_id.into());
        self
    }

    pub fn with_owner(mut self, name: impl Into<String>, email: impl Into<String>) -> Self {
        self.owner_name = Some(name.into());
        self.owner_email = Some(email.into());
        self
    }

    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_vars.insert(key.into(), value.into());
        self
    }

    pub fn with_delivery_mode(mut self, mode: DeliveryMode) -> Self {
        self.delivery_mode = mode;
        self
    }

    pub fn with_poll_policy(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    pub fn with_run_id_header(mut self, header: impl Into<String>) -> Self {
        self.run_id_header = header.into();
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Cap on each poll request. Streamed answers are bounded only by the read timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// URL addressing an existing run.
    pub fn run_url(&self, run_id: &str) -> String {
        format!("{}/{}", self.agent_url, run_id)
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| ChatError::Configuration(format!("{key} must be a number, got '{value}'")))
}
