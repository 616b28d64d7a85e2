use std::fmt::Write as _;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::domain::analysis::{AiAnalysis, Disposition, NumericProjection};
use crate::domain::simulation::Simulation;
use crate::services::analysis_schema::{schema_for_prompt, validate_analysis};
use crate::services::llm_parser::{clean_llm_text, extract_json};
use crate::services::llm_provider::{GenerativeModel, LlmError};
use crate::services::normalization::normalize_shape;
use crate::services::prediction_methods::{PredictiveMethods, convergence_advisory};
use crate::services::simulation_types::EnrichmentContext;

pub const DEFAULT_MAX_RETRIES: u32 = 3;

fn pretty<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "null".to_string())
}

fn optional_section(out: &mut String, title: &str, value: Option<&Value>) {
    match value {
        Some(value) if !value.is_null() => {
            let _ = writeln!(out, "\n{title}:\n{}", pretty(value));
        }
        _ => {
            let _ = writeln!(out, "\n{title}: not available");
        }
    }
}

fn methods_section(out: &mut String, methods: &PredictiveMethods) {
    let _ = writeln!(out, "\nQuantitative methods (baseline {:.2}):", methods.baseline);
    for (name, method) in [
        ("linear trend", &methods.linear),
        ("seasonal cycle", &methods.seasonal),
        ("learned model", &methods.learned),
    ] {
        if method.used {
            let _ = writeln!(out, "- {name}: {:+.2}% ({})", method.change_percent, method.details);
        } else {
            let _ = writeln!(out, "- {name}: not used ({})", method.details);
        }
    }
    if let Some(average) = methods.average {
        let _ = writeln!(out, "- average change: {average:+.2}%");
    }
    if let Some(spread) = methods.spread() {
        let _ = writeln!(out, "{}", convergence_advisory(spread));
    }
}

/// Natural-language prompt for one simulation run.
pub fn build_prompt(
    simulation: &Simulation,
    projection: &NumericProjection,
    context: &EnrichmentContext,
    methods: Option<&PredictiveMethods>,
) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Analyse the revenue simulation below for the municipal revenue category \"{}\".",
        context.revenue.category
    );
    let _ = writeln!(
        out,
        "The amount changes from {:.2} to {:.2} {} ({} application) over {} months, \
from {} ({}) to {} ({}). Seasons covered: {}. Overall trend: {}.",
        context.revenue.original_amount,
        context.revenue.new_amount,
        simulation.parameters.currency,
        context.time.period,
        projection.months.len(),
        context.time.start_date,
        context.time.start_season,
        context.time.end_date,
        context.time.end_season,
        context
            .time
            .seasons_covered
            .iter()
            .map(|season| season.as_str())
            .collect::<Vec<_>>()
            .join(", "),
        context.time.trend,
    );
    if let Some(note) = &simulation.parameters.note {
        let _ = writeln!(out, "Analyst note: {note}");
    }

    let _ = writeln!(out, "\nSimulation parameters:\n{}", pretty(&simulation.parameters));
    let _ = writeln!(out, "\nNumeric result:\n{}", pretty(projection));
    optional_section(&mut out, "Weather", context.weather.as_ref());
    optional_section(&mut out, "Economic indicators", context.economy.as_ref());
    optional_section(&mut out, "Demographics", context.demography.as_ref());
    if let Some(methods) = methods {
        methods_section(&mut out, methods);
    }

    let _ = writeln!(
        out,
        "\nReturn one JSON object with prediction (summary and monthly values keyed by month), \
interpretation, risks, opportunities, prioritised recommendations, a confidence between 0 and 1, \
and metadata (time, weather, economy, demography)."
    );
    out
}

/// Prompt used on retries: the original request plus the literal schema.
pub fn reinforced_prompt(prompt: &str) -> String {
    format!(
        "{prompt}\n\nIMPORTANT: respond with valid JSON matching this schema exactly, with no other text: {}",
        schema_for_prompt()
    )
}

#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub analysis: AiAnalysis,
    pub disposition: Disposition,
    pub raw_text: Option<String>,
    pub attempts: u32,
}

enum Parsed {
    Direct(AiAnalysis),
    Normalized(AiAnalysis),
}

/// Clean, validate and, failing that, normalize one model reply.
fn interpret(raw: &str, months: &[String]) -> Result<Parsed, Vec<String>> {
    let cleaned = clean_llm_text(raw);
    let mut errors = match extract_json(&cleaned) {
        Some(value) => match validate_analysis(&value) {
            Ok(analysis) => return Ok(Parsed::Direct(analysis)),
            Err(errors) => errors,
        },
        None => vec!["no JSON object found in model output".to_string()],
    };
    if let Some(normalized) = normalize_shape(&cleaned, months) {
        match validate_analysis(&normalized) {
            Ok(analysis) => return Ok(Parsed::Normalized(analysis)),
            Err(more) => errors.extend(more),
        }
    }
    Err(errors)
}

/// Schema-enforcing wrapper around a generative model.
pub struct AnalysisPipeline {
    model: Arc<dyn GenerativeModel>,
    max_retries: u32,
    failures: Arc<AtomicU64>,
}

impl AnalysisPipeline {
    pub fn new(model: Arc<dyn GenerativeModel>, max_retries: u32) -> Self {
        Self {
            model,
            max_retries,
            failures: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn with_failure_counter(mut self, failures: Arc<AtomicU64>) -> Self {
        self.failures = failures;
        self
    }

    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    pub fn provider(&self) -> &str {
        self.model.provider()
    }

    pub fn model_name(&self) -> &str {
        self.model.model()
    }

    fn record_failure(&self, attempt: u32, errors: &[String], raw: Option<&str>) {
        let total = self.failures.fetch_add(1, Ordering::Relaxed) + 1;
        warn!(
            attempt,
            failures = total,
            errors = ?errors,
            raw = raw.unwrap_or(""),
            "model attempt failed"
        );
    }

    /// Runs the prompt through the model until a reply satisfies the
    /// analysis schema, falling back to a minimal analysis. Only an error
    /// from the first model call is returned.
    pub async fn run(&self, prompt: &str, months: &[String]) -> Result<PipelineOutcome, LlmError> {
        let mut attempts = 1;
        let mut last_raw = match self.model.generate(prompt).await {
            Ok(raw) => {
                match interpret(&raw, months) {
                    Ok(Parsed::Direct(analysis)) => {
                        debug!("model output accepted");
                        return Ok(self.outcome(analysis, Disposition::Accepted, Some(raw), attempts));
                    }
                    Ok(Parsed::Normalized(analysis)) => {
                        info!("model output accepted after normalization");
                        return Ok(self.outcome(analysis, Disposition::Normalized, Some(raw), attempts));
                    }
                    Err(errors) => self.record_failure(0, &errors, Some(&raw)),
                }
                Some(raw)
            }
            Err(LlmError::EmptyResponse) => {
                self.record_failure(0, &["empty model output".to_string()], None);
                None
            }
            Err(err) => return Err(err),
        };

        let retry_prompt = reinforced_prompt(prompt);
        for attempt in 1..=self.max_retries {
            attempts += 1;
            match self.model.generate(&retry_prompt).await {
                Ok(raw) => match interpret(&raw, months) {
                    Ok(Parsed::Direct(analysis)) | Ok(Parsed::Normalized(analysis)) => {
                        info!(attempt, "model output accepted on retry");
                        return Ok(self.outcome(analysis, Disposition::Retried, Some(raw), attempts));
                    }
                    Err(errors) => {
                        self.record_failure(attempt, &errors, Some(&raw));
                        last_raw = Some(raw);
                    }
                },
                Err(LlmError::EmptyResponse) => {
                    self.record_failure(attempt, &["empty model output".to_string()], None);
                }
                Err(err) => {
                    warn!(attempt, status = ?err.status(), error = %err, "model call failed during retry");
                    self.record_failure(attempt, &[err.to_string()], None);
                }
            }
        }

        warn!(attempts, "model output never satisfied the schema, using fallback analysis");
        Ok(self.outcome(AiAnalysis::fallback(), Disposition::Fallback, last_raw, attempts))
    }

    fn outcome(
        &self,
        analysis: AiAnalysis,
        disposition: Disposition,
        raw_text: Option<String>,
        attempts: u32,
    ) -> PipelineOutcome {
        PipelineOutcome {
            analysis,
            disposition,
            raw_text,
            attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::analysis::FALLBACK_INTERPRETATION;
    use crate::domain::calendar::month_sequence;
    use crate::services::http_fetch::ProviderError;
    use crate::services::normalization::PLACEHOLDER_INTERPRETATION;
    use crate::services::prediction_methods::MethodResult;
    use crate::test_support::{ScriptedModel, on_date, sample_simulation, sample_projection};

    const VALID: &str = r#"{"prediction": null, "interpretation": "Stable receipts", "risks": [],
        "opportunities": [], "recommendations": [{"priority": 1, "action": "Monitor"}],
        "confidence": 0.8, "metadata": {"time": null, "weather": "dry", "economy": null, "demography": null}}"#;

    fn months() -> Vec<String> {
        vec!["2026-01-01".to_string(), "2026-02-01".to_string()]
    }

    fn pipeline(model: Arc<ScriptedModel>) -> AnalysisPipeline {
        AnalysisPipeline::new(model, DEFAULT_MAX_RETRIES)
    }

    #[tokio::test]
    async fn fenced_valid_output_is_accepted_on_first_call() {
        let model = Arc::new(ScriptedModel::new(vec![Ok(format!("```json\n{VALID}\n```"))]));
        let pipeline = pipeline(model.clone());

        let outcome = pipeline.run("prompt", &months()).await.unwrap();

        assert_eq!(outcome.disposition, Disposition::Accepted);
        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.analysis.interpretation, "Stable receipts");
        assert_eq!(pipeline.failures(), 0);
        assert_eq!(model.prompts(), vec!["prompt".to_string()]);
    }

    #[tokio::test]
    async fn near_miss_output_is_normalized() {
        let reply = r#"Here is the analysis: {"prediction": {"summary": "up", "values": [1, 2]}, "risks": [], "recommendations": []}"#;
        let model = Arc::new(ScriptedModel::new(vec![Ok(reply.to_string())]));
        let pipeline = pipeline(model.clone());

        let outcome = pipeline.run("prompt", &months()).await.unwrap();

        assert_eq!(outcome.disposition, Disposition::Normalized);
        assert_eq!(outcome.analysis.interpretation, PLACEHOLDER_INTERPRETATION);
        assert_eq!(outcome.analysis.confidence, 0.5);
        let values = outcome.analysis.prediction.unwrap().values;
        assert_eq!(values[1].key, "2026-02-01");
        assert_eq!(values[1].value, 2.0);
        assert_eq!(model.calls(), 1);
    }

    #[tokio::test]
    async fn retry_uses_reinforced_prompt() {
        let model = Arc::new(ScriptedModel::new(vec![
            Ok("I cannot comply".to_string()),
            Ok(VALID.to_string()),
        ]));
        let pipeline = pipeline(model.clone());

        let outcome = pipeline.run("prompt", &months()).await.unwrap();

        assert_eq!(outcome.disposition, Disposition::Retried);
        assert_eq!(outcome.attempts, 2);
        assert_eq!(pipeline.failures(), 1);
        let prompts = model.prompts();
        assert!(prompts[1].starts_with("prompt\n\nIMPORTANT"));
        assert!(prompts[1].contains("\"recommendations\""));
    }

    #[tokio::test]
    async fn exhausted_retries_return_fallback() {
        let model = Arc::new(ScriptedModel::new(vec![
            Ok(r#"{"confidence": 7}"#.to_string()),
            Ok("still prose".to_string()),
            Err(LlmError::EmptyResponse),
            Err(LlmError::Provider(ProviderError::Timeout)),
        ]));
        let counter = Arc::new(AtomicU64::new(10));
        let pipeline = pipeline(model.clone()).with_failure_counter(counter.clone());

        let outcome = pipeline.run("prompt", &months()).await.unwrap();

        assert_eq!(outcome.disposition, Disposition::Fallback);
        assert_eq!(outcome.attempts, 4);
        assert_eq!(outcome.analysis, AiAnalysis::fallback());
        assert_eq!(outcome.analysis.interpretation, FALLBACK_INTERPRETATION);
        assert_eq!(outcome.raw_text.as_deref(), Some("still prose"));
        assert_eq!(counter.load(Ordering::Relaxed), 14);
    }

    #[tokio::test]
    async fn initial_provider_error_is_returned() {
        let model = Arc::new(ScriptedModel::new(vec![Err(LlmError::Provider(
            ProviderError::Status {
                status: 403,
                body: "denied".to_string(),
            },
        ))]));
        let pipeline = pipeline(model.clone());

        let err = pipeline.run("prompt", &months()).await.unwrap_err();

        assert_eq!(err.status(), Some(403));
        assert_eq!(model.calls(), 1);
    }

    #[tokio::test]
    async fn initial_empty_reply_goes_to_retries() {
        let model = Arc::new(ScriptedModel::new(vec![
            Err(LlmError::EmptyResponse),
            Ok(VALID.to_string()),
        ]));
        let pipeline = pipeline(model);

        let outcome = pipeline.run("prompt", &months()).await.unwrap();

        assert_eq!(outcome.disposition, Disposition::Retried);
        assert_eq!(pipeline.failures(), 1);
    }

    #[test]
    fn prompt_carries_context_and_advisory() {
        let simulation = sample_simulation();
        let projection = sample_projection();
        let months = month_sequence(on_date(2026, 1, 1), 3).unwrap();
        let context = EnrichmentContext::build(&simulation, &projection, &months);
        let methods = PredictiveMethods {
            baseline: 300.0,
            linear: MethodResult {
                used: true,
                change_percent: 10.0,
                details: "r2 0.99".to_string(),
            },
            seasonal: MethodResult {
                used: true,
                change_percent: 10.2,
                details: "factor 1.00".to_string(),
            },
            learned: MethodResult::default(),
            average: Some(10.1),
        };

        let prompt = build_prompt(&simulation, &projection, &context, Some(&methods));

        assert!(prompt.contains("\"Taxe de marché\""));
        assert!(prompt.contains("Seasons covered: winter, spring"));
        assert!(prompt.contains("Weather: not available"));
        assert!(prompt.contains("above 0.8"));
        assert!(prompt.contains("\"delta_total\": 600000.0"));
    }
}
