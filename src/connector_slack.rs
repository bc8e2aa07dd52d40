//! Slack workspace source adapter.
//!
//! Lists channels with `conversations.list`, then reads up to
//! `history_limit` messages per channel with `conversations.history`.
//! Slack reports most failures as HTTP 200 with `"ok": false`; those are
//! mapped onto [`SourceError`] here. Join and leave notices are skipped.

use async_trait::async_trait;
use serde::Deserialize;
use sift_core::filter::ContentFilter;
use sift_core::models::{RawItem, SourceKind};

use crate::config::{Credentials, RemoteConfig, SlackConnectorConfig};
use crate::error::{ConfigError, SourceError};
use crate::http::{join_url, RemoteClient};
use crate::traits::{CancelToken, ItemSink, ScanReport, SourceAdapter};

pub struct SlackAdapter {
    name: String,
    config: SlackConnectorConfig,
    client: RemoteClient,
    filter: ContentFilter,
}

#[derive(Debug, Deserialize)]
struct Channel {
    id: String,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct Message {
    #[serde(default)]
    text: String,
    ts: String,
    #[serde(default)]
    subtype: Option<String>,
}

const AUTH_ERRORS: &[&str] = &[
    "invalid_auth",
    "not_authed",
    "account_inactive",
    "token_revoked",
    "token_expired",
    "missing_scope",
];

impl SlackAdapter {
    pub fn new(
        config: SlackConnectorConfig,
        credentials: &Credentials,
        remote: &RemoteConfig,
    ) -> Result<Self, ConfigError> {
        let token = Credentials::require(&credentials.slack_token, "slack", "slack_token")?;
        let client = RemoteClient::new(remote, token, &[])?;
        Ok(Self {
            name: "slack".to_string(),
            config,
            client,
            filter: ContentFilter::messages(),
        })
    }

    /// `GET {api}/{method}?{params}`, checking Slack's `ok` envelope.
    async fn call(
        &self,
        method: &str,
        params: &[(&str, &str)],
        cancel: &CancelToken,
    ) -> Result<serde_json::Value, SourceError> {
        let mut url = join_url(&self.config.api_base, &[method])?;
        if !params.is_empty() {
            url.query_pairs_mut().extend_pairs(params);
        }
        let json = self.client.get_json(&url, cancel).await?;
        if json.get("ok").and_then(|v| v.as_bool()) == Some(true) {
            return Ok(json);
        }
        let error = json
            .get("error")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown_error")
            .to_string();
        if AUTH_ERRORS.contains(&error.as_str()) {
            Err(SourceError::Auth {
                url: url.to_string(),
                detail: error,
            })
        } else if error == "ratelimited" {
            Err(SourceError::Transient {
                url: url.to_string(),
                detail: error,
            })
        } else {
            Err(SourceError::Protocol {
                url: url.to_string(),
                detail: error,
            })
        }
    }

    async fn list_channels(&self, cancel: &CancelToken) -> Result<Vec<Channel>, SourceError> {
        let json = self.call("conversations.list", &[], cancel).await?;
        parse_field(&json, "channels", &self.config.api_base)
    }

    async fn history(&self, channel: &str, cancel: &CancelToken) -> Result<Vec<Message>, SourceError> {
        let limit = self.config.history_limit.to_string();
        let json = self
            .call(
                "conversations.history",
                &[("channel", channel), ("limit", &limit)],
                cancel,
            )
            .await?;
        parse_field(&json, "messages", &self.config.api_base)
    }

    /// `https://{workspace}.slack.com/archives/{channel}/p{ts without '.'}`
    pub fn permalink(&self, channel: &str, ts: &str) -> String {
        format!(
            "https://{}.slack.com/archives/{}/p{}",
            self.config.workspace,
            channel,
            ts.replace('.', "")
        )
    }
}

fn parse_field<T: for<'de> Deserialize<'de>>(
    json: &serde_json::Value,
    field: &str,
    url: &str,
) -> Result<Vec<T>, SourceError> {
    let value = json.get(field).cloned().unwrap_or(serde_json::Value::Array(vec![]));
    serde_json::from_value(value).map_err(|e| SourceError::Protocol {
        url: url.to_string(),
        detail: format!("bad '{field}' field: {e}"),
    })
}

fn is_system_notice(message: &Message) -> bool {
    matches!(
        message.subtype.as_deref(),
        Some("channel_join") | Some("channel_leave")
    ) || message.text.contains("has joined the channel")
}

#[async_trait]
impl SourceAdapter for SlackAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Chat
    }

    fn filter(&self) -> &ContentFilter {
        &self.filter
    }

    async fn scan(&self, sink: ItemSink) -> Result<ScanReport, SourceError> {
        let cancel = sink.cancel_token().clone();
        let channels = self.list_channels(&cancel).await?;
        tracing::info!(channels = channels.len(), "listing Slack channels");

        let mut report = ScanReport::default();
        for channel in channels {
            let messages = match self.history(&channel.id, &cancel).await {
                Ok(m) => m,
                Err(SourceError::Cancelled) => return Err(SourceError::Cancelled),
                Err(e) if e.is_auth() => return Err(e),
                Err(e) => {
                    tracing::warn!(channel = %channel.name, error = %e, "history unavailable; skipping channel");
                    report.record_failure(format!("#{}: {e}", channel.name));
                    continue;
                }
            };

            for message in messages {
                if is_system_notice(&message) || message.text.trim().is_empty() {
                    continue;
                }
                let name = format!("{}-p{}", channel.name, message.ts.replace('.', ""));
                let location = self.permalink(&channel.id, &message.ts);
                sink.emit(RawItem::text(SourceKind::Chat, name, location, message.text))
                    .await?;
                report.emitted += 1;
            }
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter() -> SlackAdapter {
        let creds = Credentials {
            slack_token: Some("xoxb-test".into()),
            ..Default::default()
        };
        SlackAdapter::new(
            SlackConnectorConfig {
                workspace: "acme".into(),
                ..Default::default()
            },
            &creds,
            &RemoteConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn permalink_strips_timestamp_dot() {
        assert_eq!(
            adapter().permalink("C024BE91L", "1355517523.000005"),
            "https://acme.slack.com/archives/C024BE91L/p1355517523000005"
        );
    }

    #[test]
    fn join_notices_are_system_messages() {
        let join = Message {
            text: "<@U1> has joined the channel".into(),
            ts: "1.0".into(),
            subtype: None,
        };
        let leave = Message {
            text: "bye".into(),
            ts: "1.0".into(),
            subtype: Some("channel_leave".into()),
        };
        let normal = Message {
            text: "ship it".into(),
            ts: "1.0".into(),
            subtype: None,
        };
        assert!(is_system_notice(&join));
        assert!(is_system_notice(&leave));
        assert!(!is_system_notice(&normal));
    }

    #[test]
    fn missing_token_is_a_config_error() {
        let err = SlackAdapter::new(
            SlackConnectorConfig::default(),
            &Credentials::default(),
            &RemoteConfig::default(),
        )
        .err()
        .unwrap();
        assert!(matches!(err, ConfigError::MissingCredential { key: "slack_token", .. }));
    }
}
