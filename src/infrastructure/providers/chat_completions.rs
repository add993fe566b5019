//! OpenAI-compatible chat completions adapter

use async_trait::async_trait;
use serde::Deserialize;

use super::http_client::HttpClientTrait;
use super::locale_instruction;
use crate::domain::collection::Citation;
use crate::domain::key_pool::Credential;
use crate::domain::provider::{
    ProviderAdapter, ProviderAnswer, ProviderError, ProviderQuery, Submission,
};

const DEFAULT_BASE_URL: &str = "https://api.openai.com";

/// Any upstream speaking the chat completions dialect. Citations are read
/// from a top-level `citations` list or from `url_citation` annotations.
#[derive(Debug)]
pub struct ChatCompletionsAdapter<C: HttpClientTrait> {
    name: String,
    client: C,
    base_url: String,
    model: String,
    max_tokens: Option<u32>,
}

impl<C: HttpClientTrait> ChatCompletionsAdapter<C> {
    pub fn new(name: impl Into<String>, client: C, model: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: model.into(),
            max_tokens: None,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    fn url(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url)
    }

    fn build_request(&self, query: &ProviderQuery) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": locale_instruction(query) },
                { "role": "user", "content": query.query_text },
            ],
        });

        if let Some(max_tokens) = self.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }

        body
    }

    fn parse_response(&self, json: serde_json::Value) -> Result<ProviderAnswer, ProviderError> {
        let response: ChatResponse = serde_json::from_value(json)
            .map_err(|e| ProviderError::fatal(format!("Failed to parse response: {}", e)))?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::fatal("No choices in response"))?;

        let text = choice.message.content.unwrap_or_default();
        if text.trim().is_empty() {
            return Err(ProviderError::retryable("Empty answer"));
        }

        let mut citations: Vec<Citation> = Vec::new();
        let mut push = |citation: Citation| {
            if !citations.iter().any(|c| c.url == citation.url) {
                citations.push(citation);
            }
        };
        for url in response.citations {
            push(Citation::from_url(url));
        }
        for annotation in choice.message.annotations {
            if let Some(cited) = annotation.url_citation {
                let citation = Citation::from_url(cited.url);
                push(match cited.title {
                    Some(title) => citation.with_title(title),
                    None => citation,
                });
            }
        }

        let mut answer = ProviderAnswer::new(text).with_citations(citations);
        if let Some(model) = response.model {
            answer = answer.with_metadata("model", serde_json::json!(model));
        }
        if let Some(usage) = response.usage {
            answer = answer.with_metadata("usage", usage);
        }

        Ok(answer)
    }
}

#[async_trait]
impl<C: HttpClientTrait> ProviderAdapter for ChatCompletionsAdapter<C> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn submit(
        &self,
        query: &ProviderQuery,
        credential: &Credential,
    ) -> Result<Submission, ProviderError> {
        let auth = format!("Bearer {}", credential.secret());
        let headers = vec![
            ("Authorization", auth.as_str()),
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
struct ChatResponse {
    model: Option<String>,
    choices: Vec<ChatChoice>,
    #[serde(default)]
    citations: Vec<String>,
    usage: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
    #[serde(default)]
    annotations: Vec<Annotation>,
}

#[derive(Debug, Deserialize)]
struct Annotation {
    url_citation: Option<UrlCitation>,
}

#[derive(Debug, Deserialize)]
struct UrlCitation {
    url: String,
    title: Option<String>,
}
