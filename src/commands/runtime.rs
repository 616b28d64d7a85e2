use std::sync::Arc;
use std::time::Duration;

use revsim::domain::context::Coordinates;
use revsim::domain::simulation::SimulationParameters;
use revsim::services::ai_pipeline::AnalysisPipeline;
use revsim::services::cache::SystemClock;
use revsim::services::config::{ApiKeys, AppConfig};
use revsim::services::context::{ContextError, ContextService};
use revsim::services::data_source::SimulationStore;
use revsim::services::dataset_yaml::load_dataset;
use revsim::services::geocoding::NominatimClient;
use revsim::services::http_fetch::{HttpFetcher, ProviderError};
use revsim::services::llm_provider::model_from_config;
use revsim::services::memory_store::{InMemoryContextStore, InMemorySimulationStore};
use revsim::services::place::PlaceResolver;
use revsim::services::prediction_methods::RemoteModelEstimator;
use revsim::services::rate_limiter::RateLimiter;
use revsim::services::simulation::{SimulationError, SimulationService};
use revsim::services::simulation_archive::YamlSimulationStore;
use tracing::warn;

use crate::commands::base_commands::LocationArgs;

pub fn place_resolver(config: &AppConfig) -> Result<PlaceResolver, ProviderError> {
    let geocoding = &config.geocoding;
    let fetcher = HttpFetcher::new(Duration::from_secs(geocoding.timeout_secs), &geocoding.user_agent)?;
    let provider = Arc::new(NominatimClient::new(fetcher, &geocoding.search_url));
    Ok(PlaceResolver::new(
        provider,
        Arc::new(RateLimiter::new(geocoding.min_interval())),
        geocoding,
        Arc::new(SystemClock),
    ))
}

pub fn context_service(config: &AppConfig) -> Result<ContextService, ContextError> {
    let places = place_resolver(config)?;
    ContextService::new(
        config,
        ApiKeys::from_env(),
        Arc::new(InMemoryContextStore::new()),
        Arc::new(SystemClock),
        Some(Arc::new(places)),
    )
}

pub fn open_store(path: Option<&str>) -> Result<Arc<dyn SimulationStore>, SimulationError> {
    match path {
        Some(path) => Ok(Arc::new(YamlSimulationStore::open(path)?)),
        None => Ok(Arc::new(InMemorySimulationStore::new())),
    }
}

pub struct ServiceOptions<'a> {
    pub dataset: &'a str,
    pub store: Option<&'a str>,
    pub with_context: bool,
    pub with_ai: bool,
}

/// Simulation service over a dataset file with the enrichment the options ask for.
pub fn simulation_service(config: &AppConfig, options: &ServiceOptions<'_>) -> Result<SimulationService, SimulationError> {
    let dataset = Arc::new(load_dataset(options.dataset)?);
    let store = open_store(options.store)?;
    let mut service = SimulationService::new(dataset.clone(), dataset, store);

    if options.with_context {
        let context = context_service(config).map_err(|err| SimulationError::Configuration(err.to_string()))?;
        service = service.with_context(Arc::new(context));
    }
    if options.with_ai {
        match model_from_config(&config.llm, &ApiKeys::from_env()) {
            Ok(model) => {
                service = service.with_pipeline(Arc::new(AnalysisPipeline::new(model, config.llm.max_retries)));
            }
            Err(err) => {
                warn!(error = %err, "model analysis disabled");
                service = service.with_enrichment_unavailable(err.to_string());
            }
        }
        match RemoteModelEstimator::from_config(&config.model_service) {
            Ok(Some(estimator)) => service = service.with_estimator(Arc::new(estimator)),
            Ok(None) => {}
            Err(err) => warn!(error = %err, "model service disabled"),
        }
    }
    Ok(service)
}

pub fn apply_location(parameters: &mut SimulationParameters, location: &LocationArgs) {
    parameters.city = location.city.clone();
    parameters.country = location.country.clone();
    parameters.location = match (location.lat, location.lon) {
        (Some(lat), Some(lon)) => Some(Coordinates { lat, lon }),
        _ => None,
    };
}
