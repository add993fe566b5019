//! Trigger-and-poll job API adapter
//!
//! `POST {base}/v1/jobs` either answers inline or queues a job;
//! `GET {base}/v1/jobs/{id}` reports `queued`, `running`, `completed` or
//! `failed`.

use async_trait::async_trait;
use serde::Deserialize;

use super::http_client::HttpClientTrait;
use crate::domain::collection::Citation;
use crate::domain::key_pool::Credential;
use crate::domain::provider::{
    JobHandle, JobStatus, ProviderAdapter, ProviderAnswer, ProviderError, ProviderQuery,
    Submission,
};

#[derive(Debug)]
pub struct AsyncJobAdapter<C: HttpClientTrait> {
    name: String,
    client: C,
    base_url: String,
}

impl<C: HttpClientTrait> AsyncJobAdapter<C> {
    pub fn new(name: impl Into<String>, client: C, base_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn jobs_url(&self) -> String {
        format!("{}/v1/jobs", self.base_url)
    }

    fn job_url(&self, handle: &JobHandle) -> String {
        format!("{}/v1/jobs/{}", self.base_url, handle)
    }

    fn parse_job(json: serde_json::Value) -> Result<JobResponse, ProviderError> {
        serde_json::from_value(json)
            .map_err(|e| ProviderError::fatal(format!("Failed to parse job response: {}", e)))
    }
}

#[async_trait]
impl<C: HttpClientTrait> ProviderAdapter for AsyncJobAdapter<C> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn submit(
        &self,
        query: &ProviderQuery,
        credential: &Credential,
    ) -> Result<Submission, ProviderError> {
        let auth = format!("Bearer {}", credential.secret());
        let body = serde_json::json!({
            "query": query.query_text,
            "locale": query.locale,
            "country": query.country,
        });

        let json = self
            .client
            .post_json(&self.jobs_url(), vec![("Authorization", auth.as_str())], &body)
            .await?;

        let job = Self::parse_job(json)?;
        match (job.status.as_str(), job.job_id.clone()) {
            ("queued" | "running", Some(id)) => Ok(Submission::Accepted(JobHandle::new(id))),
            ("queued" | "running", None) => Err(ProviderError::fatal("Job accepted without an id")),
            _ => match job.into_status()? {
                JobStatus::Completed(answer) => Ok(Submission::Completed(answer)),
                JobStatus::Failed(reason) => Err(ProviderError::fatal(reason)),
                JobStatus::Running => Err(ProviderError::fatal("Job accepted without an id")),
            },
        }
    }

    async fn poll(
        &self,
        handle: &JobHandle,
        credential: &Credential,
    ) -> Result<JobStatus, ProviderError> {
        let auth = format!("Bearer {}", credential.secret());
        let json = self
            .client
            .get_json(&self.job_url(handle), vec![("Authorization", auth.as_str())])
            .await?;

        Self::parse_job(json)?.into_status()
    }
}

#[derive(Debug, Deserialize)]
struct JobResponse {
    #[serde(alias = "id")]
    job_id: Option<String>,
    status: String,
    answer: Option<JobAnswer>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JobAnswer {
    text: String,
    #[serde(default)]
    citations: Vec<String>,
}

impl JobResponse {
    fn into_status(self) -> Result<JobStatus, ProviderError> {
        match self.status.as_str() {
            "completed" => {
                let answer = self
                    .answer
                    .ok_or_else(|| ProviderError::fatal("Completed job without an answer"))?;
                let citations = answer.citations.into_iter().map(Citation::from_url).collect();
                Ok(JobStatus::Completed(
                    ProviderAnswer::new(answer.text).with_citations(citations),
                ))
            }
            "failed" => Ok(JobStatus::Failed(
                self.error.unwrap_or_else(|| "job failed".to_string()),
            )),
            "queued" | "running" => Ok(JobStatus::Running),
            other => Err(ProviderError::fatal(format!("Unknown job status '{}'", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::providers::http_client::mock::MockHttpClient;

    const BASE: &str = "https://jobs.example.com";

    fn query() -> ProviderQuery {
        ProviderQuery {
            query_text: "best crm for agencies".to_string(),
            locale: "en-US".to_string(),
            country: "US".to_string(),
        }
    }

    fn credential() -> Credential {
        Credential::new("k1", "token")
    }

    #[tokio::test]
    async fn test_queued_job_is_accepted() {
        let client = MockHttpClient::new().with_response(
            "https://jobs.example.com/v1/jobs",
            serde_json::json!({ "job_id": "job-42", "status": "queued" }),
        );
        let adapter = AsyncJobAdapter::new("deep-research", client, BASE);

        let submission = adapter.submit(&query(), &credential()).await.unwrap();
        assert_eq!(submission, Submission::Accepted(JobHandle::new("job-42")));
        assert_eq!(
            adapter.client.last_header("Authorization").as_deref(),
            Some("Bearer token")
        );
    }

    #[tokio::test]
    async fn test_inline_completion() {
        let client = MockHttpClient::new().with_response(
            "https://jobs.example.com/v1/jobs",
            serde_json::json!({
                "status": "completed",
                "answer": { "text": "Acme CRM", "citations": ["https://acme.com"] }
            }),
        );
        let adapter = AsyncJobAdapter::new("deep-research", client, BASE);

        let Submission::Completed(answer) = adapter.submit(&query(), &credential()).await.unwrap()
        else {
            panic!("expected inline answer");
        };
        assert_eq!(answer.text, "Acme CRM");
        assert_eq!(answer.citations[0].url, "https://acme.com");
    }

    #[tokio::test]
    async fn test_queued_without_id_is_fatal() {
        let client = MockHttpClient::new().with_response(
            "https://jobs.example.com/v1/jobs",
            serde_json::json!({ "status": "queued" }),
        );
        let adapter = AsyncJobAdapter::new("deep-research", client, BASE);

        let err = adapter.submit(&query(), &credential()).await.unwrap_err();
        assert!(matches!(err, ProviderError::Fatal { .. }));
    }

    #[tokio::test]
    async fn test_poll_states() {
        let handle = JobHandle::new("job-42");
        let url = "https://jobs.example.com/v1/jobs/job-42";

        let running = AsyncJobAdapter::new(
            "deep-research",
            MockHttpClient::new().with_response(url, serde_json::json!({ "status": "running" })),
            BASE,
        );
        assert_eq!(running.poll(&handle, &credential()).await.unwrap(), JobStatus::Running);

        let failed = AsyncJobAdapter::new(
            "deep-research",
            MockHttpClient::new().with_response(
                url,
                serde_json::json!({ "status": "failed", "error": "quota" }),
            ),
            BASE,
        );
        assert_eq!(
            failed.poll(&handle, &credential()).await.unwrap(),
            JobStatus::Failed("quota".to_string())
        );

        let unknown = AsyncJobAdapter::new(
            "deep-research",
            MockHttpClient::new().with_response(url, serde_json::json!({ "status": "paused" })),
            BASE,
        );
        assert!(unknown.poll(&handle, &credential()).await.is_err());
    }
}
