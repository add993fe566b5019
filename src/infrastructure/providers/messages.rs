//! Anthropic-style messages adapter

use async_trait::async_trait;
use serde::Deserialize;

use super::http_client::HttpClientTrait;
use super::locale_instruction;
use crate::domain::collection::Citation;
use crate::domain::key_pool::Credential;
use crate::domain::provider::{
    ProviderAdapter, ProviderAnswer, ProviderError, ProviderQuery, Submission,
};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";

#[derive(Debug)]
pub struct MessagesAdapter<C: HttpClientTrait> {
    name: String,
    client: C,
    base_url: String,
    model: String,
    max_tokens: u32,
}

impl<C: HttpClientTrait> MessagesAdapter<C> {
    pub fn new(name: impl Into<String>, client: C, model: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: model.into(),
            max_tokens: 2048,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    fn url(&self) -> String {
        format!("{}/v1/messages", self.base_url)
    }

    fn build_request(&self, query: &ProviderQuery) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "system": locale_instruction(query),
            "messages": [{ "role": "user", "content": query.query_text }],
        })
    }

    fn parse_response(&self, json: serde_json::Value) -> Result<ProviderAnswer, ProviderError> {
        let response: MessagesResponse = serde_json::from_value(json)
            .map_err(|e| ProviderError::fatal(format!("Failed to parse response: {}", e)))?;

        let mut text = String::new();
        let mut citations: Vec<Citation> = Vec::new();

        for block in response.content.into_iter().filter(|b| b.block_type == "text") {
            text.push_str(block.text.as_deref().unwrap_or_default());
            for cited in block.citations {
                let Some(url) = cited.url else { continue };
                if citations.iter().any(|c| c.url == url) {
                    continue;
                }
                let citation = Citation::from_url(url);
                citations.push(match cited.title {
                    Some(title) => citation.with_title(title),
                    None => citation,
                });
            }
        }

        if text.trim().is_empty() {
            return Err(ProviderError::retryable("Empty answer"));
        }

        let mut answer = ProviderAnswer::new(text).with_citations(citations);
        if let Some(model) = response.model {
            answer = answer.with_metadata("model", serde_json::json!(model));
        }
        if let Some(reason) = response.stop_reason {
            answer = answer.with_metadata("stop_reason", serde_json::json!(reason));
        }

        Ok(answer)
    }
}

#[async_trait]
impl<C: HttpClientTrait> ProviderAdapter for MessagesAdapter<C> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn submit(
        &self,
        query: &ProviderQuery,
        credential: &Credential,
    ) -> Result<Submission, ProviderError> {
        let headers = vec![
            ("x-api-key", credential.secret()),
            ("anthropic-version", API_VERSION),
            ("Content-Type", "application/json"),
        ];

        let json = self
            .client
            .post_json(&self.url(), headers, &self.build_request(query))
            .await?;

        self.parse_response(json).map(Submission::Completed)
    }
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    model: Option<String>,
    content: Vec<ContentBlock>,
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    text: Option<String>,
    #[serde(default)]
    citations: Vec<BlockCitation>,
}

#[derive(Debug, Deserialize)]
struct BlockCitation {
    url: Option<String>,
    title: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::providers::http_client::mock::MockHttpClient;

    const URL: &str = "https://api.anthropic.com/v1/messages";

    fn query() -> ProviderQuery {
        ProviderQuery {
            query_text: "which project tools do teams like".to_string(),
            locale: "en-GB".to_string(),
            country: "GB".to_string(),
        }
    }

    #[tokio::test]
    async fn test_text_blocks_joined_and_citations_collected() {
        let client = MockHttpClient::new().with_response(
            URL,
            serde_json::json!({
                "model": "claude-x",
                "stop_reason": "end_turn",
                "content": [
                    {
                        "type": "text",
                        "text": "Acme is popular. ",
                        "citations": [
                            { "type": "web_search_result_location", "url": "https://acme.com/", "title": "Acme" }
                        ]
                    },
                    { "type": "server_tool_use", "id": "t1" },
                    { "type": "text", "text": "Zoom too." }
                ]
            }),
        );
        let adapter = MessagesAdapter::new("assistant-b", client, "claude-x");

        let Submission::Completed(answer) = adapter
            .submit(&query(), &Credential::new("k", "secret"))
            .await
            .unwrap()
        else {
            panic!("expected a completed submission");
        };

        assert_eq!(answer.text, "Acme is popular. Zoom too.");
        assert_eq!(answer.citations.len(), 1);
        assert_eq!(answer.citations[0].title.as_deref(), Some("Acme"));
        assert_eq!(answer.metadata["stop_reason"], "end_turn");
    }

    #[tokio::test]
    async fn test_api_key_header_and_system_prompt() {
        let client = MockHttpClient::new().with_response(
            URL,
            serde_json::json!({ "content": [{ "type": "text", "text": "ok" }] }),
        );
        let adapter = MessagesAdapter::new("assistant-b", client, "claude-x").with_max_tokens(512);

        adapter
            .submit(&query(), &Credential::new("k", "secret"))
            .await
            .unwrap();

        let body = adapter.client.last_body().unwrap();
        assert_eq!(body["max_tokens"], 512);
        assert!(body["system"].as_str().unwrap().contains("GB"));
        assert_eq!(adapter.client.last_header("x-api-key").as_deref(), Some("secret"));
    }

    #[tokio::test]
    async fn test_empty_answer_is_retryable() {
        let client = MockHttpClient::new()
            .with_response(URL, serde_json::json!({ "content": [] }));
        let adapter = MessagesAdapter::new("assistant-b", client, "claude-x");

        let err = adapter
            .submit(&query(), &Credential::new("k", "secret"))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }
}
