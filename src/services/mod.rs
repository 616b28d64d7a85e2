pub mod ai_pipeline;
pub mod analysis_schema;
pub mod cache;
pub mod config;
pub mod context;
pub mod data_source;
pub mod dataset_yaml;
pub mod geocoding;
pub mod http_fetch;
pub mod llm_parser;
pub mod llm_provider;
pub mod memory_store;
pub mod normalization;
pub mod place;
pub mod prediction_methods;
pub mod rate_limiter;
pub mod response_projection;
pub mod series_plot;
pub mod simulation;
pub mod simulation_archive;
pub mod simulation_types;
