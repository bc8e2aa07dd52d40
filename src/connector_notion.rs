//! Notion knowledge-base source adapter.
//!
//! Pages are enumerated with `POST {api}/search` filtered to pages,
//! following `next_cursor` while `has_more`. Each page's top-level block
//! children are fetched with `GET {api}/blocks/{id}/children` and the
//! plain text of every text-bearing block is joined with newlines.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use sift_core::filter::ContentFilter;
use sift_core::models::{RawItem, SourceKind};

use crate::config::{Credentials, NotionConnectorConfig, RemoteConfig};
use crate::error::{ConfigError, SourceError};
use crate::http::{join_url, RemoteClient};
use crate::traits::{CancelToken, ItemSink, ScanReport, SourceAdapter};

/// Bound on search pagination so a misbehaving cursor cannot loop forever.
const MAX_SEARCH_PAGES: usize = 100;

/// Block types whose `rich_text` carries user-visible text.
const TEXT_BLOCKS: &[&str] = &[
    "paragraph",
    "heading_1",
    "heading_2",
    "heading_3",
    "bulleted_list_item",
    "numbered_list_item",
    "to_do",
    "toggle",
    "quote",
    "callout",
    "code",
];

pub struct NotionAdapter {
    name: String,
    config: NotionConnectorConfig,
    client: RemoteClient,
    filter: ContentFilter,
}

#[derive(Debug, Deserialize)]
struct Page {
    id: String,
    #[serde(default)]
    url: Option<String>,
}

impl NotionAdapter {
    pub fn new(
        config: NotionConnectorConfig,
        credentials: &Credentials,
        remote: &RemoteConfig,
    ) -> Result<Self, ConfigError> {
        let token = Credentials::require(&credentials.notion_token, "notion", "notion_token")?;
        let client = RemoteClient::new(remote, token, &[("notion-version", config.notion_version.as_str())])?;
        Ok(Self {
            name: "notion".to_string(),
            config,
            client,
            filter: ContentFilter::messages(),
        })
    }

    async fn list_pages(&self, cancel: &CancelToken) -> Result<Vec<Page>, SourceError> {
        let url = join_url(&self.config.api_base, &["search"])?;
        let mut pages = Vec::new();
        let mut cursor: Option<String> = None;

        for _ in 0..MAX_SEARCH_PAGES {
            let mut body = json!({
                "filter": { "property": "object", "value": "page" },
                "page_size": 100,
            });
            if let Some(c) = &cursor {
                body["start_cursor"] = json!(c);
            }
            let response = self.client.post_json(&url, &body, cancel).await?;
            let results = response.get("results").cloned().unwrap_or(Value::Array(vec![]));
            let batch: Vec<Page> = serde_json::from_value(results).map_err(|e| SourceError::Protocol {
                url: url.to_string(),
                detail: e.to_string(),
            })?;
            pages.extend(batch);

            let has_more = response.get("has_more").and_then(Value::as_bool).unwrap_or(false);
            cursor = response
                .get("next_cursor")
                .and_then(Value::as_str)
                .map(str::to_string);
            if !has_more || cursor.is_none() {
                break;
            }
        }
        Ok(pages)
    }

    async fn page_text(&self, page_id: &str, cancel: &CancelToken) -> Result<String, SourceError> {
        let mut url = join_url(&self.config.api_base, &["blocks", page_id, "children"])?;
        url.query_pairs_mut().append_pair("page_size", "100");
        let response = self.client.get_json(&url, cancel).await?;
        let blocks = response
            .get("results")
            .and_then(Value::as_array)
            .ok_or_else(|| SourceError::Protocol {
                url: url.to_string(),
                detail: "missing results array".into(),
            })?;
        Ok(blocks_text(blocks))
    }
}

/// Plain text of text-bearing blocks, one block per line.
fn blocks_text(blocks: &[Value]) -> String {
    blocks
        .iter()
        .filter_map(|block| {
            let kind = block.get("type")?.as_str()?;
            if !TEXT_BLOCKS.contains(&kind) {
                return None;
            }
            let spans = block.get(kind)?.get("rich_text")?.as_array()?;
            let line: String = spans
                .iter()
                .filter_map(|s| s.get("plain_text").and_then(Value::as_str))
                .collect();
            Some(line)
        })
        .filter(|line| !line.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait]
impl SourceAdapter for NotionAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> SourceKind {
        SourceKind::KnowledgeBase
    }

    fn filter(&self) -> &ContentFilter {
        &self.filter
    }

    async fn scan(&self, sink: ItemSink) -> Result<ScanReport, SourceError> {
        let cancel = sink.cancel_token().clone();
        let pages = self.list_pages(&cancel).await?;
        tracing::info!(pages = pages.len(), "listing Notion pages");

        let mut report = ScanReport::default();
        for page in pages {
            let text = match self.page_text(&page.id, &cancel).await {
                Ok(t) => t,
                Err(SourceError::Cancelled) => return Err(SourceError::Cancelled),
                Err(e) if e.is_auth() => return Err(e),
                Err(e) => {
                    tracing::warn!(page = %page.id, error = %e, "skipping page");
                    report.record_failure(format!("page {}: {e}", page.id));
                    continue;
                }
            };
            let location = page
                .url
                .clone()
                .unwrap_or_else(|| format!("https://www.notion.so/{}", page.id.replace('-', "")));
            sink.emit(RawItem::text(SourceKind::KnowledgeBase, page.id, location, text))
                .await?;
            report.emitted += 1;
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_text_keeps_text_blocks_in_order() {
        let blocks: Vec<Value> = serde_json::from_value(json!([
            { "type": "heading_1", "heading_1": { "rich_text": [{ "plain_text": "Trip" }] } },
            { "type": "image", "image": { "caption": [] } },
            { "type": "paragraph", "paragraph": { "rich_text": [
                { "plain_text": "Pack " }, { "plain_text": "sunscreen" }
            ] } },
            { "type": "paragraph", "paragraph": { "rich_text": [] } },
            { "type": "to_do", "to_do": { "rich_text": [{ "plain_text": "Book flights" }] } }
        ]))
        .unwrap();
        assert_eq!(blocks_text(&blocks), "Trip\nPack sunscreen\nBook flights");
    }

    #[test]
    fn missing_token_is_a_config_error() {
        assert!(NotionAdapter::new(
            NotionConnectorConfig::default(),
            &Credentials::default(),
            &RemoteConfig::default()
        )
        .is_err());
    }
}
