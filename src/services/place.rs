use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::domain::context::{BoundingBox, PlaceInfo};
use crate::services::cache::{Clock, TtlCache};
use crate::services::config::GeocodingConfig;
use crate::services::geocoding::{GeocodeHit, GeocodingProvider};
use crate::services::http_fetch::ProviderError;
use crate::services::rate_limiter::RateLimiter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GeocodingErrorKind {
    NotFound,
    AccessBlocked,
    RateLimited,
    ServiceUnavailable,
    Timeout,
    InvalidResponse,
    NetworkError,
}

impl fmt::Display for GeocodingErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            GeocodingErrorKind::NotFound => "NOT_FOUND",
            GeocodingErrorKind::AccessBlocked => "ACCESS_BLOCKED",
            GeocodingErrorKind::RateLimited => "RATE_LIMITED",
            GeocodingErrorKind::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            GeocodingErrorKind::Timeout => "TIMEOUT",
            GeocodingErrorKind::InvalidResponse => "INVALID_RESPONSE",
            GeocodingErrorKind::NetworkError => "NETWORK_ERROR",
        };
        f.write_str(label)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[error("{kind}: {message}")]
pub struct GeocodingError {
    pub kind: GeocodingErrorKind,
    pub message: String,
    pub status_code: Option<u16>,
    pub can_retry: bool,
}

impl GeocodingError {
    pub fn new(kind: GeocodingErrorKind, message: impl Into<String>, status_code: Option<u16>) -> Self {
        let can_retry = matches!(
            kind,
            GeocodingErrorKind::RateLimited
                | GeocodingErrorKind::ServiceUnavailable
                | GeocodingErrorKind::Timeout
                | GeocodingErrorKind::NetworkError
        );
        Self {
            kind,
            message: message.into(),
            status_code,
            can_retry,
        }
    }

    pub fn not_found(query: &str) -> Self {
        Self::new(GeocodingErrorKind::NotFound, format!("no match for \"{query}\""), None)
    }
}

impl From<&ProviderError> for GeocodingError {
    fn from(err: &ProviderError) -> Self {
        match err {
            ProviderError::Status { status: 403, .. } => Self::new(
                GeocodingErrorKind::AccessBlocked,
                "access blocked by geocoding provider (check User-Agent and usage policy)",
                Some(403),
            ),
            ProviderError::Status { status: 429, .. } => Self::new(
                GeocodingErrorKind::RateLimited,
                "geocoding provider rate limit exceeded",
                Some(429),
            ),
            ProviderError::Status { status, .. } if *status >= 500 => Self::new(
                GeocodingErrorKind::ServiceUnavailable,
                format!("geocoding provider unavailable ({status})"),
                Some(*status),
            ),
            ProviderError::Status { status, body } => Self::new(
                GeocodingErrorKind::InvalidResponse,
                format!("unexpected status {status}: {body}"),
                Some(*status),
            ),
            ProviderError::Timeout => Self::new(GeocodingErrorKind::Timeout, "geocoding request timed out", None),
            ProviderError::Network(message) => Self::new(GeocodingErrorKind::NetworkError, message.clone(), None),
            ProviderError::Malformed(message) | ProviderError::Configuration(message) => {
                Self::new(GeocodingErrorKind::InvalidResponse, message.clone(), None)
            }
        }
    }
}

struct FallbackCity {
    name: &'static str,
    lat: f64,
    lon: f64,
    display_name: &'static str,
}

const FALLBACK_CITIES: &[FallbackCity] = &[
    FallbackCity { name: "Antananarivo", lat: -18.8792, lon: 47.5079, display_name: "Antananarivo, Madagascar" },
    FallbackCity { name: "Toamasina", lat: -18.1443, lon: 49.4122, display_name: "Toamasina, Madagascar" },
    FallbackCity { name: "Antsirabe", lat: -19.8637, lon: 47.0366, display_name: "Antsirabe, Madagascar" },
    FallbackCity { name: "Mahajanga", lat: -15.7167, lon: 46.3167, display_name: "Mahajanga, Madagascar" },
    FallbackCity { name: "Fianarantsoa", lat: -21.4427, lon: 47.0857, display_name: "Fianarantsoa, Madagascar" },
    FallbackCity { name: "Toliara", lat: -23.3500, lon: 43.6667, display_name: "Toliara (Tuléar), Madagascar" },
    FallbackCity { name: "Antsiranana", lat: -12.2787, lon: 49.2917, display_name: "Antsiranana (Diego-Suarez), Madagascar" },
    FallbackCity { name: "Morondava", lat: -20.2867, lon: 44.2833, display_name: "Morondava, Madagascar" },
    FallbackCity { name: "Antsohihy", lat: -14.8789, lon: 47.9894, display_name: "Antsohihy, Madagascar" },
];

// Roughly 20 km around the city centre.
const FALLBACK_BBOXES: &[(&str, f64, f64, f64, f64, &str)] = &[
    ("Antananarivo", -18.9792, 47.4079, -18.7792, 47.6079, "Antananarivo, Madagascar"),
    ("Toamasina", -18.2443, 49.3122, -18.0443, 49.5122, "Toamasina, Madagascar"),
    ("Mahajanga", -15.8167, 46.2167, -15.6167, 46.4167, "Mahajanga, Madagascar"),
    ("Antsohihy", -14.9789, 47.8894, -14.7789, 48.0894, "Antsohihy, Madagascar"),
    ("Fianarantsoa", -21.5427, 46.9857, -21.3427, 47.1857, "Fianarantsoa, Madagascar"),
    ("Toliara", -23.4500, 43.5667, -23.2500, 43.7667, "Toliara (Tuléar), Madagascar"),
    ("Antsiranana", -12.3787, 49.1917, -12.1787, 49.3917, "Antsiranana (Diego-Suarez), Madagascar"),
];

/// Trims and collapses inner whitespace.
pub fn normalize_place_name(name: &str) -> String {
    name.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn fallback_place(normalized: &str) -> Option<PlaceInfo> {
    FALLBACK_CITIES
        .iter()
        .find(|city| city.name.eq_ignore_ascii_case(normalized))
        .map(|city| PlaceInfo {
            lat: city.lat,
            lon: city.lon,
            display_name: city.display_name.to_string(),
            address: None,
        })
}

pub fn fallback_bounding_box(normalized: &str) -> Option<BoundingBox> {
    FALLBACK_BBOXES
        .iter()
        .find(|(name, ..)| name.eq_ignore_ascii_case(normalized))
        .map(|(_, south, west, north, east, display_name)| BoundingBox {
            south: *south,
            west: *west,
            north: *north,
            east: *east,
            display_name: display_name.to_string(),
        })
}

fn place_from_hits(query: &str, hits: &[GeocodeHit]) -> Result<PlaceInfo, GeocodingError> {
    let hit = hits.first().ok_or_else(|| GeocodingError::not_found(query))?;
    let lat = hit.lat.trim().parse::<f64>();
    let lon = hit.lon.trim().parse::<f64>();
    match (lat, lon) {
        (Ok(lat), Ok(lon)) => Ok(PlaceInfo {
            lat,
            lon,
            display_name: hit.display_name.clone().unwrap_or_else(|| query.to_string()),
            address: hit.address.clone(),
        }),
        _ => Err(GeocodingError::new(
            GeocodingErrorKind::InvalidResponse,
            format!("unparseable coordinates for \"{query}\""),
            None,
        )),
    }
}

fn bbox_from_hits(query: &str, hits: &[GeocodeHit]) -> Result<BoundingBox, GeocodingError> {
    let hit = hits.first().ok_or_else(|| GeocodingError::not_found(query))?;
    let corners: Vec<f64> = hit
        .boundingbox
        .iter()
        .filter_map(|corner| corner.trim().parse::<f64>().ok())
        .collect();
    if corners.len() != 4 {
        return Err(GeocodingError::new(
            GeocodingErrorKind::InvalidResponse,
            format!("missing bounding box for \"{query}\""),
            None,
        ));
    }
    Ok(BoundingBox {
        south: corners[0],
        north: corners[1],
        west: corners[2],
        east: corners[3],
        display_name: hit.display_name.clone().unwrap_or_else(|| query.to_string()),
    })
}

/// Resolves free-text place names through a rate-limited geocoder with a
/// static table of known cities as the last resort.
pub struct PlaceResolver {
    provider: Arc<dyn GeocodingProvider>,
    limiter: Arc<RateLimiter>,
    bbox_cache: TtlCache<String, BoundingBox>,
    country_filter: String,
    max_attempts: u32,
    use_fallback: bool,
    backoff_unit: Duration,
}

impl PlaceResolver {
    pub fn new(
        provider: Arc<dyn GeocodingProvider>,
        limiter: Arc<RateLimiter>,
        config: &GeocodingConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            provider,
            limiter,
            bbox_cache: TtlCache::new(Duration::from_secs(config.bbox_ttl_secs), clock),
            country_filter: config.country_codes.clone(),
            max_attempts: config.max_attempts.max(1),
            use_fallback: config.use_fallback,
            backoff_unit: Duration::from_millis(250),
        }
    }

    pub fn with_backoff_unit(mut self, unit: Duration) -> Self {
        self.backoff_unit = unit;
        self
    }

    fn backoff(&self, kind: GeocodingErrorKind, attempt: u32) -> Duration {
        match kind {
            GeocodingErrorKind::RateLimited => self.backoff_unit * 4 * attempt,
            GeocodingErrorKind::Timeout => self.backoff_unit * 4 * attempt / 5,
            _ => self.backoff_unit * attempt,
        }
    }

    async fn search(&self, query: &str, limit: u32) -> Result<Vec<GeocodeHit>, GeocodingError> {
        let mut attempt = 1;
        loop {
            self.limiter.acquire().await;
            match self.provider.search(query, &self.country_filter, limit).await {
                Ok(hits) => return Ok(hits),
                Err(provider_error) => {
                    let err = GeocodingError::from(&provider_error);
                    if !err.can_retry || attempt >= self.max_attempts {
                        warn!(query, attempt, error = %err, "geocoding failed");
                        return Err(err);
                    }
                    let delay = self.backoff(err.kind, attempt);
                    warn!(query, attempt, error = %err, delay_ms = delay.as_millis() as u64, "geocoding retry");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    pub async fn resolve_place(&self, name: &str) -> Result<PlaceInfo, GeocodingError> {
        let normalized = normalize_place_name(name);
        if normalized.is_empty() {
            return Err(GeocodingError::new(GeocodingErrorKind::NotFound, "empty place name", None));
        }

        let outcome = match self.search(&normalized, 1).await {
            Ok(hits) => place_from_hits(&normalized, &hits),
            Err(err) => Err(err),
        };

        match outcome {
            Ok(place) => Ok(place),
            Err(err) => match self.use_fallback.then(|| fallback_place(&normalized)).flatten() {
                Some(place) => {
                    info!(place = %normalized, error = %err, "using fallback coordinates");
                    Ok(place)
                }
                None => Err(err),
            },
        }
    }

    pub async fn resolve_bounding_box(&self, name: &str) -> Result<BoundingBox, GeocodingError> {
        let normalized = normalize_place_name(name);
        if normalized.is_empty() {
            return Err(GeocodingError::new(GeocodingErrorKind::NotFound, "empty place name", None));
        }
        let cache_key = normalized.to_lowercase();
        if let Some(bbox) = self.bbox_cache.get(&cache_key) {
            debug!(place = %normalized, "bbox cache hit");
            return Ok(bbox);
        }

        let outcome = match self.search(&normalized, 1).await {
            Ok(hits) => bbox_from_hits(&normalized, &hits),
            Err(err) => Err(err),
        };

        let bbox = match outcome {
            Ok(bbox) => bbox,
            Err(err) => match self.use_fallback.then(|| fallback_bounding_box(&normalized)).flatten() {
                Some(bbox) => {
                    info!(place = %normalized, error = %err, "using fallback bounding box");
                    bbox
                }
                None => return Err(err),
            },
        };
        self.bbox_cache.insert(cache_key, bbox.clone());
        Ok(bbox)
    }
}
