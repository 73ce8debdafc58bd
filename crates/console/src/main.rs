//! konkyo Console
//!
//! Terminal front end over the same query pipeline the gateway serves.

mod render;
mod session;

use anyhow::Context;
use clap::{Parser, Subcommand};
use konkyo_common::{config::AppConfig, VERSION};
use session::{OutputFormat, Session};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "konkyo", version, about = "Ask questions and get answers with their evidence span")]
struct Cli {
    /// Print each result as a JSON object
    #[arg(long, global = true)]
    json: bool,

    /// Configuration file to use instead of config/{default,APP_ENV,local}
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Answer a single question
    Query {
        /// The question
        text: String,
    },
    /// Read questions from stdin until `exit`
    Interactive,
    /// Answer every question in a file
    Batch {
        /// One question per line, or a JSON array of strings
        #[arg(short, long)]
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => AppConfig::from_file(&path.to_string_lossy())?,
        None => AppConfig::load()?,
    };

    // Logs go to stderr so answers stay pipeable
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if config.observability.json_logging {
        builder.json().init();
    } else {
        builder.init();
    }

    tracing::debug!("Starting konkyo console v{}", VERSION);

    let orchestrator = konkyo_common::build_orchestrator(&config)
        .await
        .context("failed to load the index; build it with `konkyo-ingest` first")?;

    let format = if cli.json { OutputFormat::Json } else { OutputFormat::Text };
    let stdout = std::io::stdout();
    let mut session = Session::new(&orchestrator, stdout.lock(), format);

    match cli.command {
        Command::Query { text } => session.ask(&text).await?,
        Command::Interactive => {
            let stdin = tokio::io::BufReader::new(tokio::io::stdin());
            session.interactive(stdin).await?;
        }
        Command::Batch { file } => {
            let raw = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("cannot read {}", file.display()))?;
            let queries = session::parse_batch_file(&raw)?;
            let failed = session.batch(&queries).await?;
            if failed > 0 {
                anyhow::bail!("{} of {} queries failed", failed, queries.len());
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_subcommands() {
        let cli = Cli::try_parse_from(["konkyo", "query", "コンバインとは何ですか"]).unwrap();
        assert!(matches!(cli.command, Command::Query { ref text } if text == "コンバインとは何ですか"));
        assert!(!cli.json);

        let cli = Cli::try_parse_from(["konkyo", "batch", "--file", "q.txt", "--json", "--config", "prod.toml"]).unwrap();
        assert!(cli.json);
        assert_eq!(cli.config, Some(PathBuf::from("prod.toml")));
        assert!(matches!(cli.command, Command::Batch { ref file } if file == &PathBuf::from("q.txt")));

        assert!(Cli::try_parse_from(["konkyo"]).is_err());
    }
}
