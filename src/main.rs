mod cli;

use chrono::{Datelike, Utc};
use clap::Parser;
use cli::{Cli, Commands};
use colored::*;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use redistribution_bot::{
    config::StorageBackend,
    error, export,
    storage::{self, compute_stats},
    telegram, utils, Config,
};

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("redistribution_bot=debug,info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();

    let config = match Config::load(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Run => {
            info!("Starting redistribution bot...");
            telegram::run_telegram_bot(config).await
        }

        Commands::Export { year, output } => {
            let year = year.unwrap_or_else(|| Utc::now().year());
            info!("Exporting listings from {}...", year);
            export_listings(&config, year, output).await
        }

        Commands::Stats { format } => {
            info!("Generating statistics...");
            show_stats(&config, &format).await
        }

        Commands::CheckChannel => check_channel(&config).await,

        Commands::Init => {
            info!("Initializing...");
            initialize(&config).await
        }
    };

    if let Err(e) = result {
        error!("{}", format!("Error: {}", e).red());
        std::process::exit(1);
    }
}

async fn export_listings(config: &Config, year: i32, output: Option<String>) -> error::Result<()> {
    let store = storage::open_store(config)?;
    let path = PathBuf::from(output.unwrap_or_else(|| export::default_filename(year)));

    let rows = export::export_year(store.as_ref(), year, &path).await?;
    if rows == 0 {
        println!("{}", format!("No listings found for {}.", year).yellow());
    }
    println!(
        "{} Exported {} listings to {}",
        "✅".green(),
        rows,
        path.display().to_string().cyan()
    );
    Ok(())
}

async fn show_stats(config: &Config, format: &str) -> error::Result<()> {
    let store = storage::open_store(config)?;
    let mut listings = store.all().await?;
    let stats = compute_stats(&listings);

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    // Table format
    println!("{}", "=== Redistribution Statistics ===".cyan().bold());
    println!("\nListings:");
    println!("  Total:          {}", stats.total_listings);
    println!("  Available:      {}", stats.available.to_string().green());
    println!("  Fully claimed:  {}", stats.claimed.to_string().cyan());
    println!("  Expired:        {}", stats.expired.to_string().yellow());

    println!("\nClaims:");
    println!("  Total:          {}", stats.total_claims);
    println!("  Pending:        {}", stats.pending_claims.to_string().yellow());
    println!("  Approved:       {}", stats.approved_claims.to_string().green());

    println!("\nUnits:");
    println!("  Listed:         {}", stats.units_listed);
    println!("  Redistributed:  {}", stats.units_redistributed.to_string().green());

    listings.sort_by(|a, b| b.1.created_at.cmp(&a.1.created_at));
    if !listings.is_empty() {
        let widths = [22, 24, 30, 10, 10];
        println!("\n{}", "Recent Listings:".yellow());
        utils::print_table_border(104);
        utils::print_table_row(&["Created", "Listing", "Item", "Status", "Remaining"], &widths);
        utils::print_table_border(104);

        for (id, listing) in listings.iter().take(10) {
            let created = utils::from_unix(listing.created_at)
                .map(|ts| utils::format_timestamp(&ts))
                .unwrap_or_default();
            utils::print_table_row(
                &[
                    &created,
                    &utils::truncate(id, 24),
                    &utils::truncate(&listing.item, 30),
                    listing.status.as_str(),
                    &format!("{}/{}", listing.remaining, listing.qty),
                ],
                &widths,
            );
        }
        utils::print_table_border(104);
    }

    Ok(())
}

async fn check_channel(config: &Config) -> error::Result<()> {
    if telegram::check_channel(config).await? {
        Ok(())
    } else {
        Err(error::RedistError::Config("channel check failed".to_string()))
    }
}

async fn initialize(config: &Config) -> error::Result<()> {
    println!("{}", "Initializing Redistribution Bot...".green());
    config.validate()?;
    println!("{}", "✓ Configuration loaded".green());

    let store = storage::open_store(config)?;
    let count = store.all().await?.len();
    println!("{}", format!("✓ Store reachable ({} listings)", count).green());

    println!("\n{}", "Configuration:".cyan());
    match config.storage.backend {
        StorageBackend::Firebase => println!("  Store:          Firebase ({})", config.storage.firebase_url),
        StorageBackend::Sqlite => println!("  Store:          SQLite ({})", config.storage.sqlite_path),
    }
    println!("  Channel:        {}", config.telegram.channel_id);
    println!("  Admins:         {}", config.telegram.admin_user_ids.len());
    println!("  Listing age:    {} days", config.listings.max_age_days);
    if config.listings.sweep_interval_secs > 0 {
        println!("  Expiry sweep:   every {}s", config.listings.sweep_interval_secs);
    } else {
        println!("  Expiry sweep:   disabled");
    }
    if config.server.enabled {
        println!("  Keep-alive:     port {}", config.server.port);
    }

    println!("\n{}", "Ready to use! Try running:".cyan());
    println!("  {} to check channel access", "redist-bot check-channel".yellow());
    println!("  {} to start the bot", "redist-bot run".yellow());
    println!("  {} to view statistics", "redist-bot stats".yellow());
    Ok(())
}
