use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::SnapshotLoader;
use crate::models::ConversationSummary;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpLoaderConfig {
    /// API root, e.g. `https://api.example.com/v1`
    pub base_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
}

/// The endpoint answers with either a bare array or a `data` envelope
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ConversationsResponse {
    Bare(Vec<ConversationSummary>),
    Wrapped { data: Vec<ConversationSummary> },
}

impl ConversationsResponse {
    fn into_summaries(self) -> Vec<ConversationSummary> {
        match self {
            ConversationsResponse::Bare(list) => list,
            ConversationsResponse::Wrapped { data } => data,
        }
    }
}

/// Conversation list client
pub struct HttpSnapshotLoader {
    config: HttpLoaderConfig,
    client: reqwest::Client,
}

impl HttpSnapshotLoader {
    pub fn new(config: HttpLoaderConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn conversations_url(&self) -> String {
        format!("{}/conversations", self.config.base_url.trim_end_matches('/'))
    }

    /// Fetch all conversation summaries visible to the configured user
    pub async fn get_conversations(&self) -> Result<Vec<ConversationSummary>> {
        let url = self.conversations_url();

        let mut request = self.client.get(&url).header("Accept", "application/json");
        if let Some(token) = &self.config.api_token {
            request = request.header("Authorization", format!("Bearer {}", token));
        }
        if let Some(tenant_id) = &self.config.tenant_id {
            request = request.header("X-Tenant-Id", tenant_id);
        }

        let response = request
            .send()
            .await
            .context("Failed to send conversations request")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("Conversations API error ({}): {}", status, error_text);
        }

        let body: ConversationsResponse = response
            .json()
            .await
            .context("Failed to parse conversations response")?;

        Ok(body.into_summaries())
    }
}

impl SnapshotLoader for HttpSnapshotLoader {
    async fn fetch(&self) -> Result<Vec<ConversationSummary>> {
        self.get_conversations().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bare_and_wrapped_responses() {
        let bare = r#"[{"id": "c1", "unread_count": 2, "participants": [{"id": "g1", "name": "Ann"}]}]"#;
        let parsed: ConversationsResponse = serde_json::from_str(bare).unwrap();
        let list = parsed.into_summaries();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].unread_count, 2);
        assert_eq!(list[0].participants[0].name.as_deref(), Some("Ann"));

        let wrapped = r#"{"data": [{"id": "c1"}, {"id": "c2", "unread_count": 1, "last_message": null}]}"#;
        let parsed: ConversationsResponse = serde_json::from_str(wrapped).unwrap();
        let list = parsed.into_summaries();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].unread_count, 0);
        assert!(list[1].last_message.is_none());
    }

    #[test]
    fn test_url_joins_base() {
        let loader = HttpSnapshotLoader::new(HttpLoaderConfig {
            base_url: "https://api.example.com/v1/".to_string(),
            api_token: None,
            tenant_id: None,
        });
        assert_eq!(loader.conversations_url(), "https://api.example.com/v1/conversations");
    }
}
