use anyhow::Result;
use clap::Parser;
use snapkeep::cli::{AppContext, Cli, Commands};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();

    let cli = Cli::parse();

    let ctx = AppContext {
        quiet: cli.quiet,
        no_color: cli.no_color,
        dry_run: cli.dry_run,
    };

    match cli.command {
        Commands::Backup(args) => snapkeep::commands::backup_run(args, &ctx),
        Commands::Restore(args) => snapkeep::commands::restore_run(args, &ctx),
        Commands::History(args) => snapkeep::commands::history_run(args, &ctx),
        Commands::Schedule(args) => snapkeep::commands::schedule_run(args, &ctx),
        Commands::Archive(args) => snapkeep::commands::archive_run(args, &ctx),
        Commands::Unarchive(args) => snapkeep::commands::unarchive_run(args, &ctx),
        Commands::Init(args) => snapkeep::commands::init_run(args, &ctx),
        Commands::Completions(args) => snapkeep::commands::completions_run(args, &ctx),
    }
}
