//! Brand catalog loaded from configuration

use std::collections::HashMap;

use async_trait::async_trait;

use crate::domain::brand::{BrandCatalog, BrandProfile};
use crate::domain::DomainError;

#[derive(Debug, Default)]
pub struct ConfigBrandCatalog {
    profiles: HashMap<String, BrandProfile>,
}

impl ConfigBrandCatalog {
    pub fn new(profiles: Vec<BrandProfile>) -> Result<Self, DomainError> {
        let mut by_id = HashMap::with_capacity(profiles.len());
        for mut profile in profiles {
            if profile.name.trim().is_empty() {
                return Err(DomainError::configuration(format!(
                    "Brand '{}' has an empty name",
                    profile.brand_id
                )));
            }

            profile.owned_domains = normalize(profile.owned_domains);
            for competitor in &mut profile.competitors {
                competitor.domains = normalize(std::mem::take(&mut competitor.domains));
            }

            let id = profile.brand_id.clone();
            if by_id.insert(id.clone(), profile).is_some() {
                return Err(DomainError::configuration(format!(
                    "Brand '{}' is defined more than once",
                    id
                )));
            }
        }

        Ok(Self { profiles: by_id })
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

fn normalize(domains: Vec<String>) -> Vec<String> {
    domains
        .into_iter()
        .map(|d| d.trim().to_lowercase())
        .map(|d| d.trim_start_matches("www.").to_string())
        .filter(|d| !d.is_empty())
        .collect()
}

#[async_trait]
impl BrandCatalog for ConfigBrandCatalog {
    async fn get(&self, brand_id: &str) -> Result<Option<BrandProfile>, DomainError> {
        Ok(self.profiles.get(brand_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lookup_and_domain_normalization() {
        let mut profile = BrandProfile::new("brand-acme", "Acme");
        profile.owned_domains.push(" WWW.Acme.com ".to_string());
        profile.owned_domains.push("www.".to_string());

        let catalog = ConfigBrandCatalog::new(vec![profile]).unwrap();

        let found = catalog.get("brand-acme").await.unwrap().unwrap();
        assert_eq!(found.owned_domains, vec!["acme.com"]);
        assert!(catalog.get("brand-other").await.unwrap().is_none());
    }

    #[test]
    fn test_duplicate_brand_rejected() {
        let err = ConfigBrandCatalog::new(vec![
            BrandProfile::new("brand-acme", "Acme"),
            BrandProfile::new("brand-acme", "Acme Again"),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }
}
