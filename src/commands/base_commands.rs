use chrono::{Local, NaiveDate};
use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use revsim::domain::calendar::Season;
use revsim::domain::simulation::Frequency;

#[derive(Parser)]
#[command(author, version, about)]
pub struct CliArgs {
    /// Optional YAML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,
    #[command(subcommand)]
    pub command: Commands,
}

/// Where a command should look for a place: a name or explicit coordinates.
#[derive(Args, Clone, Debug, Default)]
pub struct LocationArgs {
    /// City name resolved through the geocoding provider
    #[arg(long)]
    pub city: Option<String>,
    /// ISO country code or country name
    #[arg(long)]
    pub country: Option<String>,
    /// Latitude, used together with --lon instead of --city
    #[arg(long, requires = "lon", allow_hyphen_values = true)]
    pub lat: Option<f64>,
    /// Longitude, used together with --lat
    #[arg(long, requires = "lat", allow_hyphen_values = true)]
    pub lon: Option<f64>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Project a revenue stream under a new amount and write the result as JSON
    Simulate {
        /// Dataset YAML with revenues and predictions
        #[arg(short, long)]
        dataset: String,
        /// Revenue identifier in the dataset
        #[arg(short, long)]
        revenue_id: String,
        /// New amount applied per occurrence
        #[arg(short = 'a', long)]
        new_amount: f64,
        /// How often the new amount applies (monthly or annual)
        #[arg(short, long, default_value_t = Frequency::Monthly)]
        frequency: Frequency,
        /// Number of months to project
        #[arg(short = 'm', long)]
        duration_months: u32,
        /// Simulation start date (YYYY-MM-DD)
        #[arg(short, long, default_value_t = default_start_date())]
        start_date: NaiveDate,
        /// Currency label, defaults to the configured currency
        #[arg(long)]
        currency: Option<String>,
        /// Season override (spring, summer, autumn, winter)
        #[arg(long)]
        season: Option<Season>,
        #[command(flatten)]
        location: LocationArgs,
        /// Municipality the run belongs to
        #[arg(long)]
        municipality: Option<String>,
        /// Free-text note passed to the analysis
        #[arg(long)]
        note: Option<String>,
        /// Weather context as JSON, replacing fetched weather
        #[arg(long)]
        weather: Option<String>,
        /// Economic context as JSON, replacing fetched indicators
        #[arg(long)]
        economic: Option<String>,
        /// Demographic context as JSON, replacing fetched demographics
        #[arg(long)]
        demographic: Option<String>,
        /// Simulation archive YAML; runs are kept in memory when omitted
        #[arg(long)]
        store: Option<String>,
        /// Output JSON file
        #[arg(short, long)]
        output: String,
        /// Output PNG chart, defaults to the output path with .png appended
        #[arg(long)]
        chart: Option<String>,
        /// Skip the model analysis
        #[arg(long)]
        no_ai: bool,
        /// Skip fetching external context
        #[arg(long)]
        no_context: bool,
    },
    /// List stored simulations, newest first
    List {
        /// Simulation archive YAML
        #[arg(long)]
        store: String,
        /// Only list runs of this municipality
        #[arg(long)]
        municipality: Option<String>,
    },
    /// Show one stored simulation as JSON
    Show {
        /// Simulation archive YAML
        #[arg(long)]
        store: String,
        /// Simulation identifier
        id: String,
        /// Write the JSON to this file instead of stdout
        #[arg(short, long)]
        output: Option<String>,
    },
    /// Fetch weather, economic and demographic context as JSON
    Context {
        #[command(flatten)]
        location: LocationArgs,
        /// Date used for the season (YYYY-MM-DD)
        #[arg(short, long, default_value_t = default_start_date())]
        date: NaiveDate,
    },
    /// Resolve a place name to coordinates
    Place {
        /// Place name
        name: String,
    },
    /// Resolve a place name to a bounding box
    Bbox {
        /// Place name
        name: String,
    },
    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn default_start_date() -> NaiveDate {
    Local::now().date_naive()
}
