use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use sternengeschichten_graph::config::PipelineConfig;
use sternengeschichten_graph::{export_graph, gaps, logging, run_pipeline};
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "sternengeschichten-graph")]
#[command(about = "Transcribe the Sternengeschichten podcast and graph which episodes cite each other", long_about = None)]
struct Cli {
    /// YAML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log file, overriding the configured one
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download, transcribe and cross-reference every episode in range
    Run(RunArgs),

    /// List episode numbers without a links file
    Gaps {
        /// Folder searched recursively for `*<N>.links` files
        folder: PathBuf,
    },

    /// Write the cross-reference graph as Graphviz
    Graph {
        /// Folder holding the links files (defaults to the cache directory)
        #[arg(long)]
        links_dir: Option<PathBuf>,

        /// Output directory for `<name>.gv`
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },
}

#[derive(Args)]
struct RunArgs {
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Worker pool size
    #[arg(short = 'j', long)]
    concurrency: Option<usize>,

    /// Catalog entries to skip
    #[arg(long)]
    skip: Option<usize>,

    /// Maximum number of episodes to process
    #[arg(long)]
    limit: Option<usize>,

    /// Per-episode time budget in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Keep downloaded and converted audio
    #[arg(long)]
    keep_audio: bool,
}

impl RunArgs {
    fn apply(self, config: &mut PipelineConfig) {
        if let Some(dir) = self.cache_dir {
            config.cache_dir = dir;
        }
        if self.concurrency.is_some() {
            config.concurrency = self.concurrency;
        }
        if let Some(skip) = self.skip {
            config.skip = skip;
        }
        if self.limit.is_some() {
            config.limit = self.limit;
        }
        if let Some(secs) = self.timeout {
            config.task_timeout_secs = secs;
        }
        if self.keep_audio {
            config.keep_audio = true;
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match execute(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{:#}", e);
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn execute(cli: Cli) -> anyhow::Result<()> {
    let mut config = PipelineConfig::load(cli.config.as_deref()).context("loading configuration")?;
    if cli.log_file.is_some() {
        config.log_file = cli.log_file;
    }
    logging::init(config.log_file.as_deref(), cli.verbose);

    match cli.command {
        Commands::Run(args) => {
            args.apply(&mut config);

            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    log::warn!("Interrupted, stopping running episodes");
                    on_signal.cancel();
                }
            });

            // Episode failures are reported in the summary, not through the exit code
            run_pipeline(&config, cancel).await?;
        }
        Commands::Gaps { folder } => {
            let missing = gaps::check_folder(&folder)?;
            if missing.is_empty() {
                println!("no missing episodes");
            } else {
                for number in missing {
                    println!("{}", number);
                }
            }
        }
        Commands::Graph { links_dir, output } => {
            let links_dir = links_dir.unwrap_or_else(|| config.cache_dir.clone());
            let path = export_graph(&links_dir, &config.graph.name, &output)
                .with_context(|| format!("building graph from {:?}", links_dir))?;
            println!("{}", path.display());
        }
    }
    Ok(())
}
