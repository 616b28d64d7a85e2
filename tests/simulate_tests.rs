use assert_cmd::prelude::*;
use assert_fs::prelude::*;
use predicates::prelude::*;
use serde_json::{Value, json};
use std::fs;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::task;
use warp::Filter;

const DATASET: &str = r#"
revenues:
  - id: rev-1
    name: Taxe de marché
    amount: 1000000
    municipality_id: muni-7
predictions:
  - predicted_date: 2026-01-01
    predicted_amount: 100
  - predicted_date: 2026-02-01
    predicted_amount: 200
  - predicted_date: 2026-03-01
    predicted_amount: 300
"#;

const ANALYSIS: &str = r#"{"prediction": {"summary": "Receipts rise sharply", "values": [{"key": "2026-01-01", "value": 200100}]},
"interpretation": "The new tariff dominates the baseline.", "risks": [{"description": "Trader pushback", "probability": 0.4, "impact": "medium"}],
"opportunities": [{"description": "Formalise stalls", "impact": 0.6}], "recommendations": [{"priority": 1, "action": "Phase in the tariff"}],
"confidence": 0.75, "metadata": {"time": null, "weather": null, "economy": null, "demography": null}}"#;

fn dataset_file() -> assert_fs::NamedTempFile {
    let file = assert_fs::NamedTempFile::new("dataset.yaml").unwrap();
    file.write_str(DATASET).unwrap();
    file
}

fn read_json(path: &std::path::Path) -> Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

#[test]
fn simulate_writes_projection_chart_and_report() {
    let dataset = dataset_file();
    let output = assert_fs::NamedTempFile::new("result.json").unwrap();
    let output_arg = output.path().to_str().unwrap().to_string();

    let mut cmd = assert_cmd::cargo_bin_cmd!("revsim");
    cmd.args([
        "simulate",
        "-d",
        dataset.path().to_str().unwrap(),
        "-r",
        "rev-1",
        "-a",
        "1200000",
        "-m",
        "3",
        "-s",
        "2026-01-15",
        "-o",
        &output_arg,
        "--no-ai",
        "--no-context",
    ]);

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Delta total: 600000.00"))
        .stdout(predicate::str::contains("Percent change: 100000.00%"))
        .stdout(predicate::str::contains("Simulation chart written to"));

    let response = read_json(output.path());
    let results = &response["analysis_results"];
    assert_eq!(results["baseline_total"], json!(600.0));
    assert_eq!(results["simulated_total"], json!(600600.0));
    assert_eq!(results["delta_total"], json!(600000.0));
    assert_eq!(results["percent_change"], json!(100000.0));
    assert_eq!(results["months"], json!(["2026-01-01", "2026-02-01", "2026-03-01"]));
    assert_eq!(results["ai_analysis"], Value::Null);
    assert_eq!(response["status"], "completed");
    assert_eq!(response["parameters"]["devise"], "MGA");
    assert_eq!(response["parameters"]["season"], "winter");

    let chart = fs::metadata(format!("{output_arg}.png")).unwrap();
    assert!(chart.len() > 0);
}

#[test]
fn annual_frequency_applies_delta_every_twelve_months() {
    let dataset = dataset_file();
    let output = assert_fs::NamedTempFile::new("annual.json").unwrap();
    let chart = assert_fs::NamedTempFile::new("annual.png").unwrap();

    let mut cmd = assert_cmd::cargo_bin_cmd!("revsim");
    cmd.args([
        "simulate",
        "-d",
        dataset.path().to_str().unwrap(),
        "-r",
        "rev-1",
        "-a",
        "1200000",
        "-f",
        "annual",
        "-m",
        "14",
        "-s",
        "2026-01-01",
        "-o",
        output.path().to_str().unwrap(),
        "--chart",
        chart.path().to_str().unwrap(),
        "--no-ai",
        "--no-context",
    ]);
    cmd.assert().success();

    let response = read_json(output.path());
    let baseline: Vec<f64> = serde_json::from_value(response["analysis_results"]["baseline_series"].clone()).unwrap();
    let simulated: Vec<f64> = serde_json::from_value(response["analysis_results"]["simulated_series"].clone()).unwrap();
    let bumped: Vec<usize> = (0..simulated.len())
        .filter(|index| simulated[*index] != baseline[*index])
        .collect();
    assert_eq!(bumped, vec![0, 12]);
    assert_eq!(response["analysis_results"]["delta_total"], json!(400000.0));
    chart.assert(predicate::path::exists());
}

#[test]
fn unknown_revenue_fails() {
    let dataset = dataset_file();
    let output = assert_fs::NamedTempFile::new("missing.json").unwrap();

    let mut cmd = assert_cmd::cargo_bin_cmd!("revsim");
    cmd.args([
        "simulate",
        "-d",
        dataset.path().to_str().unwrap(),
        "-r",
        "rev-404",
        "-a",
        "10",
        "-m",
        "3",
        "-o",
        output.path().to_str().unwrap(),
        "--no-ai",
        "--no-context",
    ]);

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Failed to run simulation: revenue rev-404 not found"));
    output.assert(predicate::path::missing());
}

#[test]
fn zero_duration_is_rejected() {
    let dataset = dataset_file();
    let output = assert_fs::NamedTempFile::new("zero.json").unwrap();

    let mut cmd = assert_cmd::cargo_bin_cmd!("revsim");
    cmd.args([
        "simulate",
        "-d",
        dataset.path().to_str().unwrap(),
        "-r",
        "rev-1",
        "-a",
        "10",
        "-m",
        "0",
        "-o",
        output.path().to_str().unwrap(),
        "--no-ai",
        "--no-context",
    ]);

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("invalid simulation parameters"));
}

#[test]
fn missing_model_key_keeps_numeric_result() {
    let dataset = dataset_file();
    let output = assert_fs::NamedTempFile::new("nokey.json").unwrap();

    let mut cmd = assert_cmd::cargo_bin_cmd!("revsim");
    cmd.env_remove("GEMINI_API_KEY");
    cmd.args([
        "simulate",
        "-d",
        dataset.path().to_str().unwrap(),
        "-r",
        "rev-1",
        "-a",
        "1200000",
        "-m",
        "3",
        "-s",
        "2026-01-01",
        "-o",
        output.path().to_str().unwrap(),
        "--no-context",
    ]);

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("AI error: GEMINI_API_KEY not configured"));

    let response = read_json(output.path());
    assert_eq!(response["analysis_results"]["delta_total"], json!(600000.0));
    assert_eq!(response["analysis_results"]["ai_analysis"]["error"], "GEMINI_API_KEY not configured");
}

async fn run_with_model(addr: std::net::SocketAddr, max_retries: u32) -> Value {
    let config_yaml = format!(
        r#"
llm:
  provider: gemini
  gemini_base_url: "http://{addr}/v1beta"
  max_retries: {max_retries}
  timeout_secs: 5
"#
    );
    let config_file = assert_fs::NamedTempFile::new("revsim.yaml").unwrap();
    config_file.write_str(&config_yaml).unwrap();
    let dataset = dataset_file();
    let output = assert_fs::NamedTempFile::new("ai.json").unwrap();

    let config_arg = config_file.path().to_str().unwrap().to_string();
    let dataset_arg = dataset.path().to_str().unwrap().to_string();
    let output_arg = output.path().to_str().unwrap().to_string();
    task::spawn_blocking(move || {
        let mut cmd = assert_cmd::cargo_bin_cmd!("revsim");
        cmd.env("GEMINI_API_KEY", "AIzaTestKey");
        cmd.args([
            "--config",
            &config_arg,
            "simulate",
            "-d",
            &dataset_arg,
            "-r",
            "rev-1",
            "-a",
            "1200000",
            "-m",
            "3",
            "-s",
            "2026-01-01",
            "-o",
            &output_arg,
            "--no-context",
        ]);
        cmd.assert().success();
    })
    .await
    .unwrap();

    read_json(output.path())
}

#[tokio::test]
async fn fenced_model_reply_is_accepted() {
    let route = warp::path!("v1beta" / "models" / String)
        .and(warp::post())
        .map(|_model: String| {
            let text = format!("```json\n{ANALYSIS}\n```");
            warp::reply::json(&json!({"candidates": [{"content": {"parts": [{"text": text}]}}]}))
        });
    let (addr, server) = warp::serve(route).bind_ephemeral(([127, 0, 0, 1], 0));
    tokio::spawn(server);

    let response = run_with_model(addr, 3).await;

    let ai = &response["analysis_results"]["ai_analysis"];
    assert_eq!(ai["disposition"], "accepted");
    assert_eq!(ai["provider"], "gemini");
    assert_eq!(ai["interpretation"], "The new tariff dominates the baseline.");
    assert_eq!(ai["prediction_summary"], "Receipts rise sharply");
    assert_eq!(ai["recommendations"][0]["action"], "Phase in the tariff");
    assert!(ai.get("error").is_none());
}

#[tokio::test]
async fn invalid_model_replies_fall_back_after_retries() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let route = warp::path!("v1beta" / "models" / String)
        .and(warp::post())
        .map(move |_model: String| {
            counter.fetch_add(1, Ordering::SeqCst);
            warp::reply::json(&json!({"candidates": [{"content": {"parts": [{"text": "I would rather not."}]}}]}))
        });
    let (addr, server) = warp::serve(route).bind_ephemeral(([127, 0, 0, 1], 0));
    tokio::spawn(server);

    let response = run_with_model(addr, 2).await;

    let ai = &response["analysis_results"]["ai_analysis"];
    assert_eq!(ai["disposition"], "fallback");
    assert_eq!(ai["confidence"], json!(0.0));
    assert_eq!(ai["risks"], json!([]));
    assert_eq!(ai["error"], "model output failed schema validation after 3 attempts");
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(response["analysis_results"]["delta_total"], json!(600000.0));
}

#[tokio::test]
async fn model_provider_error_is_attached_to_analysis() {
    let route = warp::any().map(|| {
        warp::reply::with_status("backend error", warp::http::StatusCode::SERVICE_UNAVAILABLE)
    });
    let (addr, server) = warp::serve(route).bind_ephemeral(([127, 0, 0, 1], 0));
    tokio::spawn(server);

    let response = run_with_model(addr, 3).await;

    let ai = &response["analysis_results"]["ai_analysis"];
    assert!(ai["error"].as_str().unwrap().contains("503"));
    assert_eq!(ai["interpretation"], Value::Null);
    assert_eq!(response["status"], "completed");
}
