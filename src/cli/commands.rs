use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "redist-bot")]
#[command(about = "Telegram bot for redistributing surplus hospital consumables")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file (extension optional)
    #[arg(short, long, global = true, default_value = "config/default")]
    pub config: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the bot: Telegram polling, keep-alive server and stale listing sweep
    Run,

    /// Export a year of listings as CSV
    Export {
        /// Calendar year (defaults to the current year)
        #[arg(short, long)]
        year: Option<i32>,

        /// Output file (defaults to redistribution_<year>.csv)
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Show listing and claim statistics
    Stats {
        /// Output format: table or json
        #[arg(short, long, default_value = "table")]
        format: String,
    },

    /// Check that the bot can post to the listings channel
    CheckChannel,

    /// Validate configuration and initialise the store
    Init,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_export_args() {
        let cli = Cli::parse_from(["redist-bot", "export", "--year", "2024", "-o", "out.csv"]);
        assert_eq!(cli.config, "config/default");
        assert!(matches!(
            cli.command,
            Commands::Export { year: Some(2024), output: Some(ref o) } if o == "out.csv"
        ));
    }

    #[test]
    fn test_global_config_flag() {
        let cli = Cli::parse_from(["redist-bot", "check-channel", "--config", "prod.toml"]);
        assert_eq!(cli.config, "prod.toml");
        assert!(matches!(cli.command, Commands::CheckChannel));
    }
}
