//! External source registry.

use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::error::CalFeedResult;

/// A named third-party feed with a publicly fetchable document URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalSource {
    pub name: String,
    pub url: String,
}

impl ExternalSource {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        ExternalSource {
            name: name.into(),
            url: url.into(),
        }
    }

    /// The URL to GET. `webcal://` subscription links are served over HTTPS.
    pub fn fetch_url(&self) -> String {
        let url = self.url.trim();
        match url.get(..9) {
            Some(scheme) if scheme.eq_ignore_ascii_case("webcal://") => {
                format!("https://{}", &url[9..])
            }
            _ => url.to_string(),
        }
    }
}

/// Looks up external sources by name.
pub trait SourceRegistry: Sync {
    /// Sources whose names appear in `names`. Unknown names are simply absent
    /// from the result.
    fn lookup(
        &self,
        names: &[String],
    ) -> impl Future<Output = CalFeedResult<Vec<ExternalSource>>> + Send;
}

/// A registry backed by a fixed list, typically the `[[sources]]` config table.
#[derive(Debug, Clone, Default)]
pub struct StaticSourceRegistry {
    sources: Vec<ExternalSource>,
}

impl StaticSourceRegistry {
    pub fn new(sources: Vec<ExternalSource>) -> Self {
        StaticSourceRegistry { sources }
    }

    pub fn sources(&self) -> &[ExternalSource] {
        &self.sources
    }
}

impl SourceRegistry for StaticSourceRegistry {
    async fn lookup(&self, names: &[String]) -> CalFeedResult<Vec<ExternalSource>> {
        Ok(self
            .sources
            .iter()
            .filter(|source| names.iter().any(|name| *name == source.name))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_webcal_urls_are_fetched_over_https() {
        let source = ExternalSource::new("Music", "webcal://calendar.example.edu/music.ics");
        assert_eq!(source.fetch_url(), "https://calendar.example.edu/music.ics");

        let source = ExternalSource::new("Art", " http://example.edu/art.ics ");
        assert_eq!(source.fetch_url(), "http://example.edu/art.ics");
    }

    #[tokio::test]
    async fn test_static_registry_returns_only_known_sources() {
        let registry = StaticSourceRegistry::new(vec![
            ExternalSource::new("Music", "http://example.edu/music.ics"),
            ExternalSource::new("Art", "http://example.edu/art.ics"),
        ]);

        let found = registry
            .lookup(&["Art".to_string(), "Physics".to_string()])
            .await
            .unwrap();

        assert_eq!(found, vec![ExternalSource::new("Art", "http://example.edu/art.ics")]);
    }
}
