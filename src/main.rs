use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

mod analysis;
mod bypass;
mod finder;
mod links;
mod miner;
mod models;
mod page;
mod report;
mod router;
mod routes;
mod sanitizer;
mod session;
mod version;

use analysis::Analyzer;
use miner::ScriptFetcher;
use page::PageSnapshot;
use report::ReportGenerator;
use session::{Command, Session};

/// Per-request bound on the same-origin script fetch stage.
const FETCH_TIMEOUT_SECS: u64 = 5;

#[derive(Parser)]
#[command(name = "vuescout")]
#[command(about = "Detect Vue.js apps in page captures, enumerate routes, neutralize guards", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Check a page capture for a framework root
    Detect {
        /// Page snapshot (JSON capture)
        snapshot: PathBuf,

        /// Maximum DOM depth to search
        #[arg(long, default_value = "1000")]
        max_depth: usize,
    },

    /// Run the full analysis pipeline against a page capture
    Analyze {
        /// Page snapshot (JSON capture)
        snapshot: PathBuf,

        /// Output format (text, markdown, json)
        #[arg(short, long, default_value = "text")]
        format: String,

        /// Output file path (prints to stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Fetch same-origin external scripts over HTTP
        #[arg(long)]
        fetch: bool,

        /// Maximum DOM depth to search
        #[arg(long, default_value = "1000")]
        max_depth: usize,
    },

    /// Mine path literals from the capture's static surfaces only
    Paths {
        /// Page snapshot (JSON capture)
        snapshot: PathBuf,

        /// Fetch same-origin external scripts over HTTP
        #[arg(long)]
        fetch: bool,
    },
}

fn build_fetcher(fetch: bool) -> Result<ScriptFetcher> {
    if fetch {
        Ok(ScriptFetcher::http(Duration::from_secs(FETCH_TIMEOUT_SECS))?)
    } else {
        Ok(ScriptFetcher::disabled())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Detect { snapshot, max_depth } => {
            info!("Checking {} for a framework root...", snapshot.display());
            let page = PageSnapshot::load(&snapshot)?;
            let analyzer = Analyzer::new().with_max_depth(max_depth);

            let (mut session, mut rx) = Session::new(page, analyzer);
            session.handle(Command::Detect).await;

            while let Ok(message) = rx.try_recv() {
                if let session::OutboundMessage::Detection { detected, method } = message {
                    if detected {
                        println!("detected ({})", method);
                    } else {
                        println!("not detected ({})", method);
                    }
                }
            }
            Ok(())
        }

        Commands::Analyze {
            snapshot,
            format,
            output,
            fetch,
            max_depth,
        } => {
            info!("Analyzing {}...", snapshot.display());
            let page = PageSnapshot::load(&snapshot)?;
            let analyzer = Analyzer::new()
                .with_max_depth(max_depth)
                .with_fetcher(build_fetcher(fetch)?);

            let (mut session, mut rx) = Session::new(page, analyzer);
            session.handle(Command::Analyze).await;

            while let Ok(message) = rx.try_recv() {
                match message {
                    session::OutboundMessage::Detection { detected, method } => {
                        info!("detection: {} ({})", detected, method);
                    }
                    session::OutboundMessage::AnalysisError { error } => {
                        tracing::warn!("analysis error: {}", error);
                    }
                    session::OutboundMessage::RouterAnalysis { .. } => {}
                }
            }

            match session.last_result() {
                Some(result) => {
                    let generator = ReportGenerator::new(&format);
                    let rendered = generator.generate(result)?;
                    if let Some(out_path) = output {
                        generator.write_to_file(&rendered, &out_path)?;
                        println!("Report saved to: {}", out_path.display());
                    } else if format == "text" {
                        report::print_summary(result);
                    } else {
                        println!("{}", rendered);
                    }
                }
                None => println!("No framework root detected; nothing to analyze."),
            }
            Ok(())
        }

        Commands::Paths { snapshot, fetch } => {
            info!("Mining path definitions from {}...", snapshot.display());
            let page = PageSnapshot::load(&snapshot)?;
            let fetcher = build_fetcher(fetch)?;
            let sink = models::LogSink::new();

            let paths = miner::PathMiner::new(&page, &fetcher, &sink).discover().await;
            if paths.is_empty() {
                println!("No path definitions survived filtering.");
            } else {
                for def in &paths {
                    println!("{}\t{}\t{}", def.path, def.source, def.pattern);
                }
            }
            Ok(())
        }
    }
}
