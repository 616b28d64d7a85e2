use revsim::domain::simulation::Simulation;
use revsim::services::response_projection::SimulationResponse;

fn amount(value: f64) -> String {
    format!("{value:.2}")
}

pub fn format_simulation_report(response: &SimulationResponse) -> String {
    let parameters = &response.parameters;
    let results = &response.analysis_results;
    let percent = match results.percent_change {
        Some(value) => format!("{value:.2}%"),
        None => "n/a".to_string(),
    };

    let mut lines = Vec::new();
    lines.push("Revenue Simulation Report".to_string());
    lines.push(format!("Simulation: {}", response.simulation_id));
    lines.push(format!(
        "Revenue: {} ({} -> {} {})",
        parameters.revenue_id,
        amount(parameters.original_amount),
        amount(parameters.new_amount),
        parameters.devise
    ));
    lines.push(format!(
        "Period: {} over {} months from {} ({})",
        parameters.frequency, parameters.duration_months, parameters.start_date, parameters.season
    ));
    lines.push(format!("Baseline total: {}", amount(results.baseline_total)));
    lines.push(format!("Simulated total: {}", amount(results.simulated_total)));
    lines.push(format!("Delta total: {}", amount(results.delta_total)));
    lines.push(format!("Percent change: {percent}"));
    lines.push(format!("Summary: {}", results.summary));
    lines.push(String::new());
    lines.push("Month | Baseline | Simulated".to_string());
    lines.push("------|----------|----------".to_string());
    for (index, month) in results.months.iter().enumerate() {
        let baseline = results.baseline_series.get(index).copied().unwrap_or_default();
        let simulated = results.simulated_series.get(index).copied().unwrap_or_default();
        lines.push(format!("{month} | {} | {}", amount(baseline), amount(simulated)));
    }

    if !response.context_errors.is_empty() {
        lines.push(String::new());
        lines.push(format!("Context errors: {}", response.context_errors.join("; ")));
    }

    lines.push(String::new());
    match &results.ai_analysis {
        None => lines.push("AI analysis: skipped".to_string()),
        Some(ai) => {
            let disposition = ai
                .disposition
                .map(|disposition| disposition.to_string())
                .unwrap_or_else(|| "n/a".to_string());
            lines.push(format!("AI analysis: {disposition}"));
            if let Some(error) = &ai.error {
                lines.push(format!("AI error: {error}"));
            }
            if let Some(interpretation) = &ai.interpretation {
                lines.push(format!("Interpretation: {interpretation}"));
            }
            if let Some(confidence) = ai.confidence {
                lines.push(format!("Confidence: {confidence:.2}"));
            }
            for recommendation in &ai.recommendations {
                lines.push(format!("{}. {}", recommendation.priority, recommendation.action));
            }
        }
    }

    lines.join("\n")
}

pub fn format_simulation_row(simulation: &Simulation) -> String {
    format!(
        "{} | {} | {} | {} | {} | {}",
        simulation.id,
        simulation.created_at.format("%Y-%m-%d %H:%M:%S"),
        simulation.status,
        simulation.parameters.revenue_id,
        simulation.parameters.frequency,
        simulation.municipality_id.as_deref().unwrap_or("-")
    )
}
