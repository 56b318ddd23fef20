use crate::infra::{parse_dwelling_type, parse_quality, ScreeningBatch};
use crate::report::{failure_lines, render_summary, render_sweep};
use crate::server;
use clap::{Args, Parser, Subcommand};
use rust_decimal::Decimal;
use site_scanner::config::AppConfig;
use site_scanner::error::AppError;
use site_scanner::screening::feasibility::ProjectBrief;
use site_scanner::screening::views::summary_rows;
use site_scanner::screening::{
    CsvComparableStore, DwellingType, FeasibilityInputs, FeasibilityModel, HoldingPeriodSweep,
    QualityTier, ScoreAggregator, SiteScreeningService,
};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(
    name = "Site Scanner",
    about = "Screen residential development sites and run feasibility sweeps",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Screen a batch of parcels captured as JSON and print the ranked shortlist
    Screen(ScreenArgs),
    /// Run the feasibility model across holding periods for a single project
    Feasibility(FeasibilityArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

#[derive(Args, Debug)]
pub(crate) struct ScreenArgs {
    /// JSON batch of parcels with their layer observations
    #[arg(long)]
    pub(crate) input: PathBuf,
    /// Sales CSV export appended to any comparables in the batch
    #[arg(long)]
    pub(crate) comparables: Option<PathBuf>,
    /// Number of sites to show (defaults to the configured shortlist size)
    #[arg(long)]
    pub(crate) top: Option<usize>,
}

#[derive(Args, Debug)]
pub(crate) struct FeasibilityArgs {
    /// Purchase price of the land
    #[arg(long)]
    pub(crate) land_price: Decimal,
    /// Expected sale price of each finished dwelling
    #[arg(long)]
    pub(crate) end_value: Decimal,
    /// Number of dwellings to build
    #[arg(long, default_value_t = 2)]
    pub(crate) units: u32,
    /// house, townhouse or unit
    #[arg(long, value_parser = parse_dwelling_type, default_value = "house")]
    pub(crate) dwelling_type: DwellingType,
    /// Build quality tier (defaults to the configured tier)
    #[arg(long, value_parser = parse_quality)]
    pub(crate) quality: Option<QualityTier>,
    /// Demolition cost (defaults to the configured allowance)
    #[arg(long)]
    pub(crate) demolition: Option<Decimal>,
    /// Apply the bushfire construction uplift
    #[arg(long)]
    pub(crate) bushfire: bool,
    /// Comma separated holding periods in months (defaults to the configured sweep)
    #[arg(long, value_delimiter = ',')]
    pub(crate) months: Vec<u32>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Screen(args) => run_screen(args).await,
        Command::Feasibility(args) => run_feasibility(args),
    }
}

async fn run_screen(args: ScreenArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?.screening;
    let raw = fs::read_to_string(&args.input)?;
    let mut batch: ScreeningBatch = serde_json::from_str(&raw)?;

    if let Some(path) = args.comparables.as_ref() {
        let store = CsvComparableStore::from_path(path)?;
        for reconciliation in store.reconciliations() {
            if reconciliation.reconciliation.needs_review() {
                println!(
                    "Review parent title {}: lots do not account for the parent area",
                    reconciliation.parent_id
                );
            }
        }
        batch.comparables.extend_from_slice(store.comparables());
    }

    let top_n = args.top.or(batch.top_n).unwrap_or(config.scoring.top_n);
    let parts = batch.into_parts();
    let comparables = Arc::new(CsvComparableStore::from_comparables(parts.comparables));
    let service = SiteScreeningService::new(parts.spatial, comparables, parts.sewer, config);
    let report = service.screen_batch(parts.requests).await;

    let rows = summary_rows(&report.ranked(top_n));
    render_summary(&rows, &failure_lines(report.failures()));
    Ok(())
}

fn run_feasibility(args: FeasibilityArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?.screening;
    let months = if args.months.is_empty() {
        config.scenarios.holding_months.clone()
    } else {
        args.months
    };

    let brief = ProjectBrief {
        land_price: args.land_price,
        unit_count: args.units,
        end_value_per_unit: args.end_value,
        dwelling_type: args.dwelling_type,
        quality: args.quality,
        demolition: args.demolition,
        bushfire_prone: args.bushfire,
        holding_months: months.first().copied().unwrap_or_default(),
    };
    let inputs = FeasibilityInputs::from_brief(&config.feasibility, &brief);

    let sweep = HoldingPeriodSweep::new(
        FeasibilityModel::from_config(&config.feasibility),
        config.scenarios.finance_to_profit_limit,
    );
    let outcomes = sweep.sweep(&inputs, &months)?;
    let best = ScoreAggregator::new(config.scoring)
        .best_scenario(&outcomes)
        .map(|(index, _)| index);

    render_sweep(&outcomes, best);
    Ok(())
}
