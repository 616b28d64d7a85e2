use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::domain::analysis::{
    AiOpportunity, AiRecommendation, AiRisk, AnalysisResult, Disposition, PredictionValue,
};
use crate::domain::calendar::Season;
use crate::domain::simulation::{Frequency, Simulation};

pub const DEFAULT_TARGET_YEAR: i32 = 2024;

const POPULATION_KEYS: &[&str] = &["population", "SPOP", "SP_POP_TOTL"];
const GDP_KEYS: &[&str] = &["gdp", "NY_GDP_MKTP_CD"];

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ParametersView {
    pub revenue_id: String,
    pub original_amount: f64,
    pub new_amount: f64,
    pub frequency: Frequency,
    pub duration_months: u32,
    pub start_date: String,
    pub devise: String,
    pub season: Season,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct WeatherView {
    pub city: Option<String>,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub description: Option<String>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct AiView {
    pub model: Option<String>,
    pub provider: Option<String>,
    pub disposition: Option<Disposition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub confidence: Option<f64>,
    pub prediction_summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_values: Option<Vec<PredictionValue>>,
    pub interpretation: Option<String>,
    pub risks: Vec<AiRisk>,
    pub opportunities: Vec<AiOpportunity>,
    pub recommendations: Vec<AiRecommendation>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct AnalysisView {
    pub analysis_id: String,
    pub summary: String,
    pub baseline_total: f64,
    pub simulated_total: f64,
    pub delta_total: f64,
    pub percent_change: Option<f64>,
    pub months: Vec<String>,
    pub baseline_series: Vec<f64>,
    pub simulated_series: Vec<f64>,
    pub ai_analysis: Option<AiView>,
}

/// Stable external shape of one simulation run.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct SimulationResponse {
    pub simulation_id: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub parameters: ParametersView,
    pub weather: Option<WeatherView>,
    pub economic: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub context_errors: Vec<String>,
    pub analysis_results: AnalysisView,
}

fn to_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok().filter(|number| number.is_finite()),
        _ => None,
    }
}

fn text_at<'a>(value: &'a Value, pointers: &[&str]) -> Option<&'a str> {
    pointers
        .iter()
        .find_map(|pointer| value.pointer(pointer).and_then(Value::as_str))
}

fn number_at(value: &Value, pointers: &[&str]) -> Option<f64> {
    pointers
        .iter()
        .find_map(|pointer| value.pointer(pointer).and_then(to_number))
}

/// Accepts both the reduced weather shape and a raw provider payload.
pub fn extract_weather(weather: &Value) -> Option<WeatherView> {
    let view = WeatherView {
        city: text_at(weather, &["/location", "/name"]).map(str::to_string),
        temperature: number_at(weather, &["/temp", "/main/temp"]),
        humidity: number_at(weather, &["/humidity", "/main/humidity"]),
        description: text_at(weather, &["/description", "/weather/0/description"]).map(str::to_string),
    };
    let empty = view.city.is_none()
        && view.temperature.is_none()
        && view.humidity.is_none()
        && view.description.is_none();
    (!empty).then_some(view)
}

/// Value for `year` in a list of `{date, value}` entries, else the first
/// non-null value.
fn year_value(entries: &[Value], year: &str) -> Option<f64> {
    let dated = entries.iter().find(|entry| {
        let date = match entry.get("date") {
            Some(Value::String(date)) => date.clone(),
            Some(Value::Number(date)) => date.to_string(),
            _ => return false,
        };
        date == year && entry.get("value").is_some_and(|value| !value.is_null())
    });
    dated
        .or_else(|| {
            entries
                .iter()
                .find(|entry| entry.get("value").is_some_and(|value| !value.is_null()))
        })
        .and_then(|entry| entry.get("value"))
        .and_then(to_number)
}

/// Single value from a World Bank `[meta, rows]` payload, a reduced
/// `{recent: [...]}` indicator or a plain number.
pub fn indicator_value(indicator: &Value, year: i32) -> Option<f64> {
    let year = year.to_string();
    match indicator {
        Value::Array(parts) => match parts.get(1) {
            Some(Value::Array(rows)) => year_value(rows, &year),
            _ => None,
        },
        Value::Object(fields) => match fields.get("recent") {
            Some(Value::Array(recent)) => year_value(recent, &year),
            _ => None,
        },
        Value::Number(_) => to_number(indicator),
        _ => None,
    }
}

fn first_indicator<'a>(economic: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .find_map(|key| economic.get(*key).filter(|value| !value.is_null()))
}

pub fn extract_economics(economic: &Value, year: i32) -> Map<String, Value> {
    let population = first_indicator(economic, POPULATION_KEYS).and_then(|value| indicator_value(value, year));
    let gdp = first_indicator(economic, GDP_KEYS).and_then(|value| indicator_value(value, year));
    let mut out = Map::new();
    out.insert(format!("population_{year}"), population.map_or(Value::Null, Value::from));
    out.insert(format!("gdp_{year}_usd"), gdp.map_or(Value::Null, Value::from));
    out
}

fn ai_view(analysis: &AnalysisResult) -> Option<AiView> {
    if let Some(error) = &analysis.ai_error {
        if analysis.ai_disposition != Some(Disposition::Fallback) {
            return Some(AiView {
                model: analysis.ai_model.clone(),
                provider: analysis.ai_provider.clone(),
                disposition: analysis.ai_disposition,
                error: Some(error.clone()),
                confidence: None,
                prediction_summary: None,
                key_values: None,
                interpretation: None,
                risks: Vec::new(),
                opportunities: Vec::new(),
                recommendations: Vec::new(),
            });
        }
    }
    let ai = analysis.ai_analysis.as_ref()?;
    Some(AiView {
        model: analysis.ai_model.clone(),
        provider: analysis.ai_provider.clone(),
        disposition: analysis.ai_disposition,
        error: analysis.ai_error.clone(),
        confidence: Some(ai.confidence),
        prediction_summary: ai.prediction.as_ref().map(|prediction| prediction.summary.clone()),
        key_values: ai.prediction.as_ref().map(|prediction| prediction.values.clone()),
        interpretation: Some(ai.interpretation.clone()),
        risks: ai.risks.clone(),
        opportunities: ai.opportunities.clone(),
        recommendations: ai.recommendations.clone(),
    })
}

pub fn project_response(simulation: &Simulation, analysis: &AnalysisResult, target_year: i32) -> SimulationResponse {
    let parameters = &simulation.parameters;
    let result = &analysis.result;
    SimulationResponse {
        simulation_id: simulation.id.clone(),
        status: simulation.status.to_string(),
        created_at: simulation.created_at,
        parameters: ParametersView {
            revenue_id: parameters.revenue_id.clone(),
            original_amount: simulation.original_amount,
            new_amount: parameters.new_amount,
            frequency: parameters.frequency,
            duration_months: parameters.duration_months,
            start_date: parameters.start_date.format("%Y-%m-%d").to_string(),
            devise: parameters.currency.clone(),
            season: parameters
                .season
                .unwrap_or_else(|| Season::for_date(parameters.start_date)),
        },
        weather: simulation.weather_context.as_ref().and_then(extract_weather),
        economic: simulation
            .economic_context
            .as_ref()
            .map(|economic| extract_economics(economic, target_year)),
        context_errors: simulation.context_errors.clone(),
        analysis_results: AnalysisView {
            analysis_id: analysis.id.clone(),
            summary: analysis.summary.clone(),
            baseline_total: result.baseline_total,
            simulated_total: result.simulated_total,
            delta_total: result.delta_total,
            percent_change: result.percent_change,
            months: result.months.clone(),
            baseline_series: result.baseline_series.clone(),
            simulated_series: result.simulated_series.clone(),
            ai_analysis: ai_view(analysis),
        },
    }
}
