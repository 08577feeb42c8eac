use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use raincheck::audio::ArtifactKind;
use raincheck::orchestrator::RunOutcome;
use raincheck::{Config, Daemon, PlaybackItem, PurgeScope, trigger};

/// raincheck - ask the box whether it is raining
#[derive(Parser)]
#[command(name = "raincheck", version, about)]
struct Cli {
    /// Config file (defaults to ~/.config/raincheck/config.toml)
    #[arg(short, long, env = "RAINCHECK_CONFIG")]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the daemon (default); stdin lines act as triggers
    Run,
    /// Answer once, as if the button were pressed
    Ask,
    /// Run one remote settings sync
    Sync,
    /// Delete cached audio
    Purge {
        /// generated, internal or both
        #[arg(short, long, default_value = "generated")]
        scope: PurgeScope,
    },
    /// Synthesize and play a phrase
    TestTts {
        /// Text to speak
        #[arg(default_value = "Hello! This is a test of the text to speech system.")]
        text: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,raincheck=info",
        1 => "info,raincheck=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load(cli.config.as_deref())?;
    tracing::debug!(?config, "loaded configuration");

    let daemon = Daemon::new(config)?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => {
            tracing::info!("starting raincheck daemon");
            let (tx, rx) = trigger::channel();
            tokio::spawn(trigger::drive_stdin(tx));
            daemon.run(rx).await?;
        }
        Command::Ask => ask(&daemon).await?,
        Command::Sync => {
            daemon.cache().setup_directories()?;
            let changes = daemon.sync_controller().sync_once().await?;
            println!("{changes:#?}");
        }
        Command::Purge { scope } => {
            let removed = daemon.cache().purge(scope)?;
            println!("Removed {removed} audio file(s)");
        }
        Command::TestTts { text } => test_tts(&daemon, &text).await?,
    }

    Ok(())
}

async fn ask(daemon: &Daemon) -> anyhow::Result<()> {
    let cache = daemon.cache();
    cache.setup_directories()?;
    cache.prepare_internal_phrases().await;

    match daemon.orchestrator().run().await {
        RunOutcome::Completed => println!("Done"),
        RunOutcome::Rejected => println!("A request is already running"),
        RunOutcome::Failed(reason) => {
            println!("Request failed: {reason} (code {})", reason.code());
        }
    }
    Ok(())
}

async fn test_tts(daemon: &Daemon, text: &str) -> anyhow::Result<()> {
    const FILE_ID: &str = "test-tts";

    println!("Testing TTS with text: \"{text}\"\n");

    let cache = daemon.cache();
    cache.setup_directories()?;
    cache.invalidate_one(FILE_ID, ArtifactKind::Generated)?;

    println!("Synthesizing speech...");
    cache.ensure(FILE_ID, ArtifactKind::Generated, text).await?;
    let path = cache.artifact_path(FILE_ID, ArtifactKind::Generated)?;
    println!("Saved to {}", path.display());

    println!("Playing...");
    let queue = &daemon.orchestrator().services().queue;
    queue.enqueue(PlaybackItem::new(FILE_ID, ArtifactKind::Generated));
    queue.wait_until_idle().await;

    cache.invalidate_one(FILE_ID, ArtifactKind::Generated)?;
    println!("Done");
    Ok(())
}
