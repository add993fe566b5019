//! Upstream answer providers

mod async_job;
mod chat_completions;
mod factory;
pub mod http_client;
mod messages;

pub use async_job::AsyncJobAdapter;
pub use chat_completions::ChatCompletionsAdapter;
pub use factory::{ProviderConfig, ProviderFactory, ProviderKind};
pub use http_client::{HttpClient, HttpClientTrait};
pub use messages::MessagesAdapter;

use crate::domain::provider::ProviderQuery;

/// System instruction pinning the answer to the requester's market
pub(crate) fn locale_instruction(query: &ProviderQuery) -> String {
    format!(
        "Answer as you would for a user with locale {} located in country {}. \
         Cite the web sources you rely on.",
        query.locale, query.country
    )
}
