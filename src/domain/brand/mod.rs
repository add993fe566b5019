//! Brand domain - what position and citation enrichment look for

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[cfg(test)]
use mockall::automock;

use crate::domain::error::DomainError;

/// A competitor and the names it goes by
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Competitor {
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub domains: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrandProfile {
    pub brand_id: String,
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub competitors: Vec<Competitor>,
    /// Domains the brand owns, e.g. `acme.com`
    #[serde(default)]
    pub owned_domains: Vec<String>,
}

impl BrandProfile {
    pub fn new(brand_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            brand_id: brand_id.into(),
            name: name.into(),
            aliases: Vec::new(),
            competitors: Vec::new(),
            owned_domains: Vec::new(),
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    pub fn with_competitor(mut self, competitor: Competitor) -> Self {
        self.competitors.push(competitor);
        self
    }

    pub fn with_owned_domain(mut self, domain: impl Into<String>) -> Self {
        self.owned_domains.push(domain.into().to_lowercase());
        self
    }

    /// Brand name followed by its aliases
    pub fn names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str()).chain(self.aliases.iter().map(String::as_str))
    }
}

impl Competitor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            aliases: Vec::new(),
            domains: Vec::new(),
        }
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domains.push(domain.into().to_lowercase());
        self
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str()).chain(self.aliases.iter().map(String::as_str))
    }
}

/// Source of brand profiles
#[cfg_attr(test, automock)]
#[async_trait]
pub trait BrandCatalog: Send + Sync {
    async fn get(&self, brand_id: &str) -> Result<Option<BrandProfile>, DomainError>;
}
