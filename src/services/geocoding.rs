use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::services::http_fetch::{HttpFetcher, ProviderError};

/// One search hit as returned by Nominatim. Coordinates arrive as strings;
/// `boundingbox` is `[south, north, west, east]`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GeocodeHit {
    pub lat: String,
    pub lon: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub boundingbox: Vec<String>,
    #[serde(default)]
    pub address: Option<Value>,
}

#[async_trait]
pub trait GeocodingProvider: Send + Sync {
    async fn search(&self, query: &str, country_filter: &str, limit: u32) -> Result<Vec<GeocodeHit>, ProviderError>;
}

pub struct NominatimClient {
    fetcher: HttpFetcher,
    search_url: String,
}

impl NominatimClient {
    pub fn new(fetcher: HttpFetcher, search_url: &str) -> Self {
        Self {
            fetcher,
            search_url: search_url.to_string(),
        }
    }
}

#[async_trait]
impl GeocodingProvider for NominatimClient {
    async fn search(&self, query: &str, country_filter: &str, limit: u32) -> Result<Vec<GeocodeHit>, ProviderError> {
        let params = [
            ("q", query.to_string()),
            ("format", "json".to_string()),
            ("addressdetails", "1".to_string()),
            ("limit", limit.to_string()),
            ("countrycodes", country_filter.to_string()),
        ];
        let body = self.fetcher.get_text(&self.search_url, &params).await?;
        let hits: Vec<GeocodeHit> =
            serde_json::from_str(&body).map_err(|err| ProviderError::Malformed(err.to_string()))?;
        debug!(query, hits = hits.len(), "nominatim search");
        Ok(hits)
    }
}
