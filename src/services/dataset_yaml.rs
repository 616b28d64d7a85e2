use std::fs;

use serde::Deserialize;

use crate::domain::calendar::{first_of_month, parse_date};
use crate::domain::revenue::{PredictionPeriod, PredictionPoint, RevenueBaseline};
use crate::services::data_source::StoreError;
use crate::services::memory_store::InMemoryDataset;

#[derive(Deserialize)]
struct DatasetRecord {
    #[serde(default)]
    revenues: Vec<RevenueRecord>,
    #[serde(default)]
    predictions: Vec<PredictionRecord>,
}

#[derive(Deserialize)]
struct RevenueRecord {
    id: String,
    name: String,
    amount: f64,
    #[serde(default)]
    municipality_id: Option<String>,
}

#[derive(Deserialize)]
struct PredictionRecord {
    predicted_date: String,
    predicted_amount: f64,
    #[serde(default)]
    period: PredictionPeriod,
}

pub fn deserialize_dataset_from_yaml_str(yaml: &str) -> Result<InMemoryDataset, StoreError> {
    let record: DatasetRecord =
        serde_yaml::from_str(yaml).map_err(|err| StoreError::Parse(err.to_string()))?;

    let revenues = record
        .revenues
        .into_iter()
        .map(|revenue| RevenueBaseline {
            id: revenue.id,
            name: revenue.name,
            amount: revenue.amount,
            municipality_id: revenue.municipality_id,
        })
        .collect();

    let mut predictions = Vec::with_capacity(record.predictions.len());
    for prediction in record.predictions {
        let date = parse_date(&prediction.predicted_date).ok_or_else(|| {
            StoreError::Parse(format!(
                "invalid predicted_date: {}",
                prediction.predicted_date
            ))
        })?;
        predictions.push(PredictionPoint {
            predicted_date: first_of_month(date),
            predicted_amount: prediction.predicted_amount,
            period: prediction.period,
        });
    }

    Ok(InMemoryDataset::new(revenues, predictions))
}

pub fn load_dataset(filepath: &str) -> Result<InMemoryDataset, StoreError> {
    let contents = fs::read_to_string(filepath)
        .map_err(|err| StoreError::Io(format!("failed to read dataset {filepath}: {err}")))?;
    deserialize_dataset_from_yaml_str(&contents)
}
