use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::domain::calendar::Season;
use crate::domain::context::{
    CompactWeather, ContextBundle, Coordinates, EconomicContext, EssentialDemographics, PlaceInfo,
    ReducedIndicator,
};
use crate::domain::simulation::SimulationParameters;
use crate::services::cache::{Clock, TtlCache};
use crate::services::config::{
    ApiKeys, AppConfig, DemographicsConfig, EconomicConfig, WeatherConfig,
};
use crate::services::data_source::{ContextKind, ContextStore, StoreError};
use crate::services::http_fetch::{HttpFetcher, ProviderError, parse_json};
use crate::services::place::PlaceResolver;

pub const POPULATION_INDICATOR: &str = "SP.POP.TOTL";
pub const GDP_INDICATOR: &str = "NY.GDP.MKTP.CD";
pub const IMF_GDP_INDICATOR: &str = "NGDP_RPCH";

#[derive(Error, Debug)]
pub enum ContextError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("{0} not configured")]
    Configuration(String),
    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),
    #[error("provider rejected request: {message}")]
    ProviderRejected { message: String, can_retry: bool },
    #[error("malformed upstream payload: {0}")]
    MalformedUpstream(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ContextError {
    pub fn can_retry(&self) -> bool {
        match self {
            ContextError::ProviderUnavailable(_) => true,
            ContextError::ProviderRejected { can_retry, .. } => *can_retry,
            _ => false,
        }
    }
}

impl From<ProviderError> for ContextError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Status { status: 403, body } => ContextError::ProviderRejected {
                message: format!("403 {body}"),
                can_retry: false,
            },
            ProviderError::Status { status: 429, body } => ContextError::ProviderRejected {
                message: format!("429 {body}"),
                can_retry: true,
            },
            ProviderError::Status { status: 404, body } => ContextError::NotFound(body),
            ProviderError::Status { status, body } if status >= 500 => {
                ContextError::ProviderUnavailable(format!("{status} {body}"))
            }
            ProviderError::Status { status, body } => ContextError::ProviderRejected {
                message: format!("{status} {body}"),
                can_retry: false,
            },
            ProviderError::Timeout => ContextError::ProviderUnavailable("request timed out".to_string()),
            ProviderError::Network(message) => ContextError::ProviderUnavailable(message),
            ProviderError::Malformed(message) => ContextError::MalformedUpstream(message),
            ProviderError::Configuration(message) => ContextError::Configuration(message),
        }
    }
}

fn fill_template(template: &str, country: &str, indicator: &str) -> String {
    template
        .replace("{country}", country)
        .replace("{indicator}", indicator)
}

fn looks_like_xml(body: &str) -> bool {
    let trimmed = body.trim_start();
    trimmed.starts_with("<?xml") || trimmed.contains("<wb:error")
}

fn is_country_code(query: &str) -> bool {
    (2..=3).contains(&query.len()) && query.chars().all(|c| c.is_ascii_alphabetic())
}

/// Weather, economic and demographic signals behind a process cache and a
/// durable payload store. Raw provider payloads are stored; callers get the
/// reduced shapes.
pub struct ContextService {
    weather_fetcher: HttpFetcher,
    economic_fetcher: HttpFetcher,
    demographics_fetcher: HttpFetcher,
    weather: WeatherConfig,
    economic: EconomicConfig,
    demographics: DemographicsConfig,
    keys: ApiKeys,
    store: Arc<dyn ContextStore>,
    weather_cache: TtlCache<String, Value>,
    economic_cache: TtlCache<String, Value>,
    demographic_cache: TtlCache<String, Value>,
    places: Option<Arc<PlaceResolver>>,
}

impl ContextService {
    pub fn new(
        config: &AppConfig,
        keys: ApiKeys,
        store: Arc<dyn ContextStore>,
        clock: Arc<dyn Clock>,
        places: Option<Arc<PlaceResolver>>,
    ) -> Result<Self, ContextError> {
        let user_agent = config.geocoding.user_agent.as_str();
        let ttl = Duration::from_secs(config.context.cache_ttl_secs);
        Ok(Self {
            weather_fetcher: HttpFetcher::new(Duration::from_secs(config.weather.timeout_secs), user_agent)?,
            economic_fetcher: HttpFetcher::new(Duration::from_secs(config.economic.timeout_secs), user_agent)?,
            demographics_fetcher: HttpFetcher::new(
                Duration::from_secs(config.demographics.timeout_secs),
                user_agent,
            )?,
            weather: config.weather.clone(),
            economic: config.economic.clone(),
            demographics: config.demographics.clone(),
            keys,
            store,
            weather_cache: TtlCache::new(ttl, clock.clone()),
            economic_cache: TtlCache::new(ttl, clock.clone()),
            demographic_cache: TtlCache::new(ttl, clock),
            places,
        })
    }

    fn cache_for(&self, kind: ContextKind) -> &TtlCache<String, Value> {
        match kind {
            ContextKind::Weather => &self.weather_cache,
            ContextKind::Economic => &self.economic_cache,
            ContextKind::Demographic => &self.demographic_cache,
        }
    }

    async fn lookup(&self, kind: ContextKind, key: &str) -> Result<Option<Value>, ContextError> {
        let cache = self.cache_for(kind);
        if let Some(payload) = cache.get(&key.to_string()) {
            debug!(?kind, key, "context cache hit");
            return Ok(Some(payload));
        }
        if let Some(payload) = self.store.load(kind, key).await? {
            debug!(?kind, key, "context store hit");
            cache.insert(key.to_string(), payload.clone());
            return Ok(Some(payload));
        }
        Ok(None)
    }

    async fn remember(&self, kind: ContextKind, key: &str, payload: &Value) {
        if let Err(err) = self.store.save(kind, key, payload).await {
            warn!(?kind, key, error = %err, "failed to persist context payload");
        }
        self.cache_for(kind).insert(key.to_string(), payload.clone());
    }

    pub async fn fetch_weather(
        &self,
        lat: f64,
        lon: f64,
        date: Option<NaiveDate>,
    ) -> Result<CompactWeather, ContextError> {
        let key = match date {
            Some(date) => format!("{lat}_{lon}_{date}"),
            None => format!("{lat}_{lon}_current"),
        };
        if let Some(payload) = self.lookup(ContextKind::Weather, &key).await? {
            return Ok(CompactWeather::from_provider_payload(&payload));
        }

        let api_key = self
            .keys
            .openweather
            .clone()
            .ok_or_else(|| ContextError::Configuration("OPENWEATHER_API_KEY".to_string()))?;
        let query = [
            ("lat", lat.to_string()),
            ("lon", lon.to_string()),
            ("appid", api_key),
            ("units", self.weather.units.clone()),
        ];
        let payload = self
            .weather_fetcher
            .get_json(&self.weather.current_url, &query)
            .await?;
        info!(lat, lon, "weather fetched");
        self.remember(ContextKind::Weather, &key, &payload).await;
        Ok(CompactWeather::from_provider_payload(&payload))
    }

    async fn fetch_world_bank_payload(&self, country: &str, indicator: &str) -> Result<Value, ContextError> {
        let url = fill_template(&self.economic.indicator_url_template, country, indicator);
        let body = self.economic_fetcher.get_text(&url, &[]).await?;
        if !looks_like_xml(&body) {
            if let Ok(payload) = parse_json(&body) {
                return Ok(payload);
            }
        }

        let canonical = fill_template(&self.economic.canonical_url_template, country, indicator);
        warn!(url, canonical, "indicator provider returned a non-JSON body, retrying canonical URL");
        let body = self.economic_fetcher.get_text(&canonical, &[]).await?;
        if looks_like_xml(&body) {
            return Err(ContextError::MalformedUpstream(format!(
                "indicator {indicator} for {country} returned XML"
            )));
        }
        Ok(parse_json(&body)?)
    }

    pub async fn fetch_economic_indicator(
        &self,
        country: &str,
        indicator: &str,
    ) -> Result<ReducedIndicator, ContextError> {
        let key = format!("{country}_{indicator}");
        let points = self.economic.recent_points;
        if let Some(payload) = self.lookup(ContextKind::Economic, &key).await? {
            if let Some(reduced) = ReducedIndicator::from_world_bank(country, indicator, &payload, points) {
                return Ok(reduced);
            }
        }

        let payload = self.fetch_world_bank_payload(country, indicator).await?;
        let reduced = ReducedIndicator::from_world_bank(country, indicator, &payload, points).ok_or_else(|| {
            ContextError::MalformedUpstream(format!("no data rows for {indicator} in {country}"))
        })?;
        info!(country, indicator, points = reduced.recent.len(), "indicator fetched");
        self.remember(ContextKind::Economic, &key, &payload).await;
        Ok(reduced)
    }

    /// Secondary indicator source. Returned as the raw provider payload.
    pub async fn fetch_imf_indicator(&self, country: &str, indicator: &str) -> Result<Value, ContextError> {
        let template = self
            .economic
            .imf_url_template
            .as_deref()
            .ok_or_else(|| ContextError::Configuration("IMF indicator URL".to_string()))?;
        let key = format!("imf_{country}_{indicator}");
        if let Some(payload) = self.lookup(ContextKind::Economic, &key).await? {
            return Ok(payload);
        }

        let mut url = fill_template(template, country, indicator);
        if let Some(api_key) = &self.keys.imf {
            if !url.contains("api_key=") {
                let separator = if url.contains('?') { '&' } else { '?' };
                url = format!("{url}{separator}api_key={api_key}");
            }
        }
        let payload = self.economic_fetcher.get_json(&url, &[]).await?;
        self.remember(ContextKind::Economic, &key, &payload).await;
        Ok(payload)
    }

    pub async fn fetch_demographics(&self, country: &str) -> Result<EssentialDemographics, ContextError> {
        let query = country.trim();
        if let Some(payload) = self.lookup(ContextKind::Demographic, query).await? {
            if let Some(reduced) = EssentialDemographics::from_provider_payload(query, &payload) {
                return Ok(reduced);
            }
        }

        let base = self.demographics.base_url.trim_end_matches('/');
        let url = if is_country_code(query) {
            format!("{base}/alpha/{query}")
        } else {
            format!("{base}/name/{query}")
        };
        let payload = self.demographics_fetcher.get_json(&url, &[]).await?;
        let reduced = EssentialDemographics::from_provider_payload(query, &payload)
            .ok_or_else(|| ContextError::MalformedUpstream(format!("no country entry for {query}")))?;
        info!(country = query, "demographics fetched");
        self.remember(ContextKind::Demographic, query, &payload).await;
        Ok(reduced)
    }

    async fn fetch_economic_context(&self, country: &str, errors: &mut Vec<String>) -> Option<EconomicContext> {
        let (population, gdp, imf_gdp) = tokio::join!(
            self.fetch_economic_indicator(country, POPULATION_INDICATOR),
            self.fetch_economic_indicator(country, GDP_INDICATOR),
            self.fetch_imf_indicator(country, IMF_GDP_INDICATOR),
        );
        let mut economic = EconomicContext::default();
        match population {
            Ok(indicator) => economic.population = Some(indicator),
            Err(err) => errors.push(format!("economic.population: {err}")),
        }
        match gdp {
            Ok(indicator) => economic.gdp = Some(indicator),
            Err(err) => errors.push(format!("economic.gdp: {err}")),
        }
        match imf_gdp {
            Ok(payload) => economic.imf_gdp = Some(payload),
            Err(err) => debug!(error = %err, "imf indicator skipped"),
        }
        (!economic.is_empty()).then_some(economic)
    }

    /// Best-effort context for a run. Each signal fails on its own; failures
    /// are listed in `errors` and never abort the others.
    pub async fn fetch_context_for_simulation(&self, params: &SimulationParameters) -> ContextBundle {
        let mut bundle = ContextBundle {
            season: Some(Season::for_date(params.start_date)),
            ..ContextBundle::default()
        };

        let place: Option<PlaceInfo> = match (&params.city, &self.places) {
            (Some(city), Some(places)) if params.location.is_none() => match places.resolve_place(city).await {
                Ok(place) => Some(place),
                Err(err) => {
                    bundle.errors.push(format!("place: {err}"));
                    None
                }
            },
            _ => None,
        };
        let coordinates: Option<Coordinates> = params
            .location
            .or_else(|| place.as_ref().map(PlaceInfo::coordinates));
        let country = params
            .country
            .clone()
            .or_else(|| place.as_ref().and_then(PlaceInfo::country_code));
        bundle.place = place;

        let weather_task = async {
            match coordinates {
                Some(coords) => Some(self.fetch_weather(coords.lat, coords.lon, None).await),
                None => None,
            }
        };
        let economic_task = async {
            let mut errors = Vec::new();
            let economic = match &country {
                Some(country) => self.fetch_economic_context(country, &mut errors).await,
                None => None,
            };
            (economic, errors)
        };
        let demographics_task = async {
            match &country {
                Some(country) => Some(self.fetch_demographics(country).await),
                None => None,
            }
        };

        let (weather, (economic, economic_errors), demographics) =
            tokio::join!(weather_task, economic_task, demographics_task);

        match weather {
            Some(Ok(weather)) => bundle.weather = Some(weather),
            Some(Err(err)) => bundle.errors.push(format!("weather: {err}")),
            None => {}
        }
        bundle.economic = economic;
        bundle.errors.extend(economic_errors);
        match demographics {
            Some(Ok(demographics)) => bundle.demographics = Some(demographics),
            Some(Err(err)) => bundle.errors.push(format!("demographics: {err}")),
            None => {}
        }

        if !bundle.errors.is_empty() {
            warn!(errors = ?bundle.errors, "partial simulation context");
        }
        bundle
    }
}
