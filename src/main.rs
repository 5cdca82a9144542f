use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use query::HistorySession;
use store::{EventStore, SqliteEventStore};
use types::{AggregatedView, DateRange};
use utils::{NumberFormatOptions, format_duration, format_number, get_local_timezone};

mod aggregate;
mod config;
mod decoder;
mod query;
mod store;
mod types;
mod utils;

#[derive(Parser)]
#[command(name = "spintrace")]
#[command(version)]
#[command(disable_help_subcommand = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    filter: FilterArgs,

    /// Output the dashboard as JSON instead of text
    #[arg(long)]
    json: bool,

    /// Use comma-separated number formatting
    #[arg(long)]
    number_comma: bool,

    /// Use human-readable number formatting (k, m, b)
    #[arg(short = 'H', long)]
    number_human: bool,

    /// Locale for number formatting (en, de, fr, es, it, ja, ko, zh)
    #[arg(long)]
    locale: Option<String>,

    /// Number of decimal places for human-readable formatting
    #[arg(long)]
    decimal_places: Option<usize>,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest a listening-history export archive, replacing any stored data
    Import(ImportArgs),
    /// Output the aggregated dashboard data as JSON
    Stats(StatsArgs),
    /// Delete all stored listening history
    Clear,
    /// Manage configuration
    Config(ConfigArgs),
}

#[derive(Args, Clone)]
struct FilterArgs {
    /// Only count plays on or after this date (YYYY-MM-DD or RFC3339)
    #[arg(long)]
    from: Option<String>,

    /// Only count plays on or before this date (YYYY-MM-DD or RFC3339)
    #[arg(long)]
    to: Option<String>,

    /// Length of the ranked artist/track lists (presets: 5, 10, 25, 50, 100)
    #[arg(long)]
    top: Option<usize>,
}

#[derive(Args)]
struct ImportArgs {
    /// Path to the exported archive (zip)
    archive: std::path::PathBuf,
}

#[derive(Args)]
struct StatsArgs {
    #[command(flatten)]
    filter: FilterArgs,

    /// Pretty-print JSON instead of a single line
    #[arg(long, default_value_t = false)]
    pretty: bool,
}

#[derive(Args)]
struct ConfigArgs {
    #[command(subcommand)]
    subcommand: ConfigSubcommands,
}

#[derive(Subcommand)]
enum ConfigSubcommands {
    /// Create default configuration file
    Init {
        #[arg(long, default_value_t = false)]
        overwrite: bool,
    },
    /// Show current configuration
    Show,
    /// Set configuration value (store-path, top-n, number-comma, number-human, locale, decimal-places)
    Set {
        key: String,
        value: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Load config file to get defaults
    let config = config::Config::load().unwrap_or(None).unwrap_or_default();

    // Create format options merging config defaults with CLI overrides
    let format_options = NumberFormatOptions {
        use_comma: cli.number_comma || config.formatting.number_comma,
        use_human: cli.number_human || config.formatting.number_human,
        locale: cli.locale.unwrap_or(config.formatting.locale.clone()),
        decimal_places: cli
            .decimal_places
            .unwrap_or(config.formatting.decimal_places),
    };

    match cli.command {
        None => {
            if let Err(e) = run_dashboard(&config, &cli.filter, cli.json, &format_options).await {
                eprintln!("Error: {e:#}");
                std::process::exit(1);
            }
        }
        Some(Commands::Import(args)) => {
            if let Err(e) = run_import(&config, args).await {
                eprintln!("Error importing archive: {e:#}");
                std::process::exit(1);
            }
        }
        Some(Commands::Stats(args)) => {
            if let Err(e) = run_stats(&config, args).await {
                eprintln!("Error generating JSON stats: {e:#}");
                std::process::exit(1);
            }
        }
        Some(Commands::Clear) => {
            if run_clear(&config).await {
                println!("🗑️  Listening history deleted.");
            } else {
                eprintln!("Could not delete listening history.");
                std::process::exit(1);
            }
        }
        Some(Commands::Config(config_args)) => {
            handle_config_subcommand(config_args);
        }
    }
}

/// Load stored events and apply the CLI's filter parameters.
async fn build_session(config: &config::Config, filter: &FilterArgs) -> Result<HistorySession> {
    for bound in [filter.from.as_deref(), filter.to.as_deref()]
        .into_iter()
        .flatten()
    {
        if utils::parse_instant(bound).is_none() {
            anyhow::bail!("unrecognized date '{bound}' (expected YYYY-MM-DD or RFC3339)");
        }
    }
    if filter.top == Some(0) {
        anyhow::bail!(
            "--top must be positive (presets: {:?})",
            query::TOP_N_PRESETS
        );
    }

    let store = SqliteEventStore::open(&config::history_db_path(config)?)?;
    if !store.exists().await {
        anyhow::bail!("no listening history found. Run `spintrace import <archive.zip>` first");
    }

    let events = store.read_all().await?;
    if events.is_empty() {
        anyhow::bail!("the stored listening history is empty. Re-import your archive");
    }

    let top_n = filter.top.unwrap_or(config.dashboard.top_n).max(1);
    let mut session = HistorySession::new(events, top_n);
    if filter.from.is_some() || filter.to.is_some() {
        session.set_range(DateRange {
            start_date: filter.from.clone(),
            end_date: filter.to.clone(),
        });
    }
    Ok(session)
}

async fn run_dashboard(
    config: &config::Config,
    filter: &FilterArgs,
    json: bool,
    format_options: &NumberFormatOptions,
) -> Result<()> {
    let session = build_session(config, filter).await?;

    if json {
        let out = simd_json::to_string_pretty(session.view())?;
        println!("{out}");
    } else {
        print_summary(&session, format_options);
    }
    Ok(())
}

fn print_summary(session: &HistorySession, fmt: &NumberFormatOptions) {
    let view = session.view();

    println!(
        "{} plays · {} · {} artists · {} tracks",
        format_number(view.total_tracks, fmt),
        format_duration(view.total_listening_time_ms),
        format_number(view.unique_artists, fmt),
        format_number(view.unique_tracks, fmt),
    );

    let range = session.range();
    if range.start_date.is_some() || range.end_date.is_some() {
        println!(
            "Range: {} → {}",
            range.start_date.as_deref().unwrap_or("…"),
            range.end_date.as_deref().unwrap_or("…"),
        );
    }

    if !view.top_artists.is_empty() {
        println!("\nTop artists:");
        for (rank, artist) in view.top_artists.iter().enumerate() {
            println!(
                "{:>3}. {:<40} {:>8} plays   {}",
                rank + 1,
                artist.name,
                format_number(artist.count, fmt),
                format_duration(artist.total_ms),
            );
        }
    }

    if !view.top_tracks.is_empty() {
        println!("\nTop tracks:");
        for (rank, track) in view.top_tracks.iter().enumerate() {
            println!(
                "{:>3}. {:<40} {:>8} plays   {}",
                rank + 1,
                format!("{} - {}", track.name, track.artist),
                format_number(track.count, fmt),
                format_duration(track.total_ms),
            );
        }
    }

    if !view.platform_usage.is_empty() {
        println!("\nPlatforms:");
        for platform in &view.platform_usage {
            println!(
                "     {:<20} {:>8} plays   {}",
                platform.platform,
                format_number(platform.count, fmt),
                format_duration(platform.total_ms),
            );
        }
    }

    if !view.listening_by_month.is_empty() {
        println!("\nBy month:");
        for bucket in &view.listening_by_month {
            println!(
                "     {:<10} {:>8} plays   {}",
                bucket.date,
                format_number(bucket.count, fmt),
                format_duration(bucket.total_ms),
            );
        }
    }

    if let Some(peak) = view.listening_by_hour.iter().max_by_key(|b| b.count) {
        println!(
            "\nBusiest hour: {}:00 with {} plays ({} local time)",
            peak.date,
            format_number(peak.count, fmt),
            get_local_timezone(),
        );
    }
}

async fn run_import(config: &config::Config, args: ImportArgs) -> Result<()> {
    let bytes = tokio::fs::read(&args.archive)
        .await
        .with_context(|| format!("Failed to read {}", args.archive.display()))?;

    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::with_template("{bar:40.green} {pos:>3}%")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    let events = decoder::decode_archive(bytes, |pct| bar.set_position(pct as u64)).await?;

    // Decoder reports up to 80%; the store handoff owns the tail.
    bar.set_position(90);
    let mut store = SqliteEventStore::open(&config::history_db_path(config)?)?;
    store.replace_all(&events).await?;
    bar.set_position(100);
    bar.finish_and_clear();

    let chunks = store.chunk_count()?;
    println!(
        "✅ Imported {} plays into {} storage chunk{}.",
        events.len(),
        chunks,
        if chunks == 1 { "" } else { "s" },
    );
    Ok(())
}

async fn run_stats(config: &config::Config, args: StatsArgs) -> Result<()> {
    let session = build_session(config, &args.filter).await?;
    let view: &AggregatedView = session.view();

    if args.pretty {
        let json = simd_json::to_string_pretty(view)?;
        println!("{json}");
    } else {
        let json = simd_json::to_string(view)?;
        println!("{json}");
    }

    Ok(())
}

/// Best-effort "forget my data": reports success as a flag, never a failure.
async fn run_clear(config: &config::Config) -> bool {
    let Ok(path) = config::history_db_path(config) else {
        return false;
    };
    let Ok(mut store) = SqliteEventStore::open(&path) else {
        return false;
    };
    store.clear().await
}

fn handle_config_subcommand(config_args: ConfigArgs) {
    match config_args.subcommand {
        ConfigSubcommands::Init { overwrite } => {
            if let Err(e) = config::create_default_config(overwrite) {
                eprintln!("Error creating config: {e}");
                std::process::exit(1);
            }
        }
        ConfigSubcommands::Show => {
            if let Err(e) = config::show_config() {
                eprintln!("Error showing config: {e}");
                std::process::exit(1);
            }
        }
        ConfigSubcommands::Set { key, value } => {
            if let Err(e) = config::set_config_value(&key, &value) {
                eprintln!("Error setting config: {e}");
                std::process::exit(1);
            }
        }
    }
}
