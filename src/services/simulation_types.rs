use chrono::NaiveDate;
use serde::Serialize;
use serde_json::Value;

use crate::domain::analysis::NumericProjection;
use crate::domain::calendar::{Season, month_key};
use crate::domain::simulation::{Frequency, Simulation};

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct SeasonCoverage {
    pub start_season: Season,
    pub end_season: Season,
    pub seasons_covered: Vec<Season>,
}

impl SeasonCoverage {
    /// Distinct seasons in order of first appearance across `months`.
    pub fn for_months(months: &[NaiveDate]) -> Option<Self> {
        let first = months.first()?;
        let last = months.last()?;
        let mut seasons_covered = Vec::new();
        for season in months.iter().map(|month| Season::for_date(*month)) {
            if !seasons_covered.contains(&season) {
                seasons_covered.push(season);
            }
        }
        Some(Self {
            start_season: Season::for_date(*first),
            end_season: Season::for_date(*last),
            seasons_covered,
        })
    }
}

#[derive(Serialize, Debug, Clone)]
pub struct RevenueContext {
    pub id: String,
    pub category: String,
    pub original_amount: f64,
    pub new_amount: f64,
}

#[derive(Serialize, Debug, Clone)]
pub struct TimeContext {
    pub period: Frequency,
    pub start_date: String,
    pub end_date: String,
    pub start_season: Season,
    pub end_season: Season,
    pub seasons_covered: Vec<Season>,
    pub season: Season,
    pub trend: String,
}

/// Everything the prompt builder needs about one run.
#[derive(Serialize, Debug, Clone)]
pub struct EnrichmentContext {
    pub revenue: RevenueContext,
    pub time: TimeContext,
    pub weather: Option<Value>,
    pub economy: Option<Value>,
    pub demography: Option<Value>,
    pub months: Vec<String>,
    pub baseline_series: Vec<f64>,
    pub simulated_series: Vec<f64>,
}

fn trend_label(delta_total: f64) -> &'static str {
    if delta_total > 0.0 {
        "increase"
    } else if delta_total < 0.0 {
        "decrease"
    } else {
        "stable"
    }
}

impl EnrichmentContext {
    pub fn build(simulation: &Simulation, projection: &NumericProjection, months: &[NaiveDate]) -> Self {
        let parameters = &simulation.parameters;
        let start = months.first().copied().unwrap_or(parameters.start_date);
        let end = months.last().copied().unwrap_or(start);
        let coverage = SeasonCoverage::for_months(months).unwrap_or_else(|| {
            let season = Season::for_date(start);
            SeasonCoverage {
                start_season: season,
                end_season: season,
                seasons_covered: vec![season],
            }
        });
        let season = parameters.season.unwrap_or(coverage.start_season);

        Self {
            revenue: RevenueContext {
                id: parameters.revenue_id.clone(),
                category: simulation.recipe_type.clone(),
                original_amount: simulation.original_amount,
                new_amount: parameters.new_amount,
            },
            time: TimeContext {
                period: parameters.frequency,
                start_date: month_key(start),
                end_date: month_key(end),
                start_season: coverage.start_season,
                end_season: coverage.end_season,
                seasons_covered: coverage.seasons_covered,
                season,
                trend: trend_label(projection.delta_total).to_string(),
            },
            weather: simulation.weather_context.clone(),
            economy: simulation.economic_context.clone(),
            demography: simulation.demographic_context.clone(),
            months: projection.months.clone(),
            baseline_series: projection.baseline_series.clone(),
            simulated_series: projection.simulated_series.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::calendar::month_sequence;
    use crate::test_support::on_date;

    #[test]
    fn coverage_spans_season_boundaries() {
        let months = month_sequence(on_date(2026, 5, 14), 5).unwrap();

        let coverage = SeasonCoverage::for_months(&months).unwrap();

        assert_eq!(coverage.start_season, Season::Spring);
        assert_eq!(coverage.end_season, Season::Autumn);
        assert_eq!(
            coverage.seasons_covered,
            vec![Season::Spring, Season::Summer, Season::Autumn]
        );
    }

    #[test]
    fn a_full_year_covers_each_season_once() {
        let months = month_sequence(on_date(2026, 12, 1), 14).unwrap();

        let coverage = SeasonCoverage::for_months(&months).unwrap();

        assert_eq!(coverage.start_season, Season::Winter);
        assert_eq!(coverage.end_season, Season::Winter);
        assert_eq!(coverage.seasons_covered.len(), 4);
    }

    #[test]
    fn empty_months_have_no_coverage() {
        assert_eq!(SeasonCoverage::for_months(&[]), None);
    }
}
