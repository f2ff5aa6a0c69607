use reqwest::blocking::Client;
use serde_json::{Value, json};

use crate::error::RegistryError;

const SLACK_POST_MESSAGE: &str = "https://slack.com/api/chat.postMessage";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Good,
    Danger,
}

impl Severity {
    fn color(self) -> &'static str {
        match self {
            Severity::Info => "#005e99",
            Severity::Good => "good",
            Severity::Danger => "danger",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub text: String,
    pub severity: Severity,
    pub fields: Vec<(String, String)>,
}

impl Notice {
    pub fn new(text: impl Into<String>, severity: Severity) -> Self {
        Self {
            text: text.into(),
            severity,
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, title: &str, value: impl ToString) -> Self {
        self.fields.push((title.to_string(), value.to_string()));
        self
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notice: &Notice) -> Result<(), RegistryError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notice: &Notice) -> Result<(), RegistryError> {
        tracing::info!(fields = ?notice.fields, "{}", notice.text);
        Ok(())
    }
}

#[derive(Clone)]
pub struct SlackNotifier {
    client: Client,
    token: String,
    channels: Vec<String>,
}

impl SlackNotifier {
    pub fn new(token: &str, channels: Vec<String>) -> Result<Self, RegistryError> {
        let client = Client::builder()
            .build()
            .map_err(|err| RegistryError::Notify(err.to_string()))?;
        Ok(Self {
            client,
            token: token.to_string(),
            channels,
        })
    }
}

impl Notifier for SlackNotifier {
    fn notify(&self, notice: &Notice) -> Result<(), RegistryError> {
        for channel in &self.channels {
            let response = self
                .client
                .post(SLACK_POST_MESSAGE)
                .bearer_auth(&self.token)
                .json(&slack_message(channel, notice))
                .send()
                .map_err(|err| RegistryError::Notify(err.to_string()))?;
            if !response.status().is_success() {
                return Err(RegistryError::Notify(format!(
                    "slack returned status {} for channel {channel}",
                    response.status().as_u16()
                )));
            }
        }
        Ok(())
    }
}

fn slack_message(channel: &str, notice: &Notice) -> Value {
    let fields = notice
        .fields
        .iter()
        .map(|(title, value)| json!({"title": title, "value": value, "short": true}))
        .collect::<Vec<_>>();
    json!({
        "username": "File Registry Bot",
        "icon_emoji": ":file_folder:",
        "channel": channel,
        "attachments": [{
            "fallback": notice.text,
            "text": notice.text,
            "fields": fields,
            "color": notice.severity.color(),
        }],
    })
}
