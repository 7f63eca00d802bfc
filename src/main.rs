use clap::Parser;
use journsync::config::{Cli, Command, ServeArgs, SyncArgs};
use journsync::logging::init_logging;
use journsync::remote::{serve, AgentState};
use journsync::{Config, Settings, SyncEngine};
use tracing::info;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Sync(args) => run_sync(args),
        Command::Serve(args) => run_agent(args),
    }
}

fn run_sync(args: SyncArgs) -> anyhow::Result<()> {
    // Convert CLI args to Config - this validates every task before anything runs
    let config = Config::try_from(args)?;
    let _guard = init_logging(&config.settings.log_level, config.settings.log_file.as_deref())?;
    info!(version = journsync::VERSION, "journsync starting");

    let mut engine = SyncEngine::new(config)?;
    let summary = engine.run()?;

    if summary.total.jobs_failed > 0 || summary.skipped() > 0 || summary.failed() > 0 {
        anyhow::bail!(
            "{} task(s) failed, {} skipped, {} batch job(s) failed",
            summary.failed(),
            summary.skipped(),
            summary.total.jobs_failed
        );
    }
    Ok(())
}

fn run_agent(args: ServeArgs) -> anyhow::Result<()> {
    let mut settings = Settings::load(args.config.as_deref())?;
    if let Some(listen) = args.listen {
        settings.listen = listen;
    }
    let _guard = init_logging(&settings.log_level, settings.log_file.as_deref())?;
    info!(version = journsync::VERSION, "journsync agent starting");

    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    runtime.block_on(async move {
        let listener = tokio::net::TcpListener::bind(&settings.listen).await?;
        let state = AgentState::new(settings)?;
        serve(listener, state).await?;
        Ok::<(), anyhow::Error>(())
    })
}
