use std::process;
use std::sync::Arc;

use tracing_subscriber::{filter::LevelFilter, fmt};

use aliquota_app::archive;
use aliquota_app::cli::{Cli, Commands, ExtractArgs, GroupsArgs, GroupsCommands, RunArgs};
use aliquota_app::clock::SystemClock;
use aliquota_app::config;
use aliquota_app::error::AppError;
use aliquota_app::notify::{DestinationRegistry, TelegramBroadcaster};
use aliquota_app::paths::AppPaths;
use aliquota_app::version::{UpdateVerdict, VersionComparator, VersionStore};
use aliquota_app::workflow::{WorkflowOutcome, WorkflowRunner};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(determine_log_level(&cli));

    if let Err(err) = run(cli).await {
        eprintln!("{err}");
        process::exit(1);
    }
}

fn init_tracing(level: LevelFilter) {
    let subscriber = fmt().with_max_level(level).with_target(false).finish();

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        tracing::warn!("Tracing subscriber already set; skipping re-initialization.");
    }
}

fn determine_log_level(cli: &Cli) -> LevelFilter {
    match cli.verbose {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

async fn run(cli: Cli) -> Result<(), AppError> {
    match cli.command {
        Some(Commands::Run(args)) => run_workflow(args, true).await,
        Some(Commands::Fetch(args)) => run_workflow(args, false).await,
        Some(Commands::Check) => run_check().await,
        Some(Commands::Extract(args)) => run_extract(args),
        Some(Commands::Groups(args)) => run_groups(args),
        None => {
            Cli::print_help();
            Ok(())
        }
    }
}

async fn run_workflow(args: RunArgs, gated: bool) -> Result<(), AppError> {
    let config = config::load()?;
    let paths = AppPaths::new(&config.storage.path)?;

    let mut runner = WorkflowRunner::from_config(&config, &paths, SystemClock)?;
    if let Some(output) = args.output {
        runner = runner.with_artifact_path(output);
    }
    if !args.no_broadcast
        && let Some(token) = config.telegram.token.clone()
    {
        let registry = DestinationRegistry::new(paths.groups_path());
        let broadcaster = TelegramBroadcaster::new(token, registry)?;
        runner = runner.with_broadcaster(Arc::new(broadcaster));
    }

    let outcome = if gated {
        runner.run_check_and_download().await?
    } else {
        runner.run_fetch().await?
    };

    match outcome {
        WorkflowOutcome::UpToDate { remote } => println!(
            "table already up to date (version {}, valid until {})",
            remote.version, remote.vigencia_ate
        ),
        WorkflowOutcome::Downloaded {
            artifact,
            bytes,
            remote,
        } => match remote {
            Some(remote) => println!(
                "downloaded version {} (valid until {}) to {} ({bytes} bytes)",
                remote.version,
                remote.vigencia_ate,
                artifact.display()
            ),
            None => println!(
                "downloaded table to {} ({bytes} bytes); version banner unavailable",
                artifact.display()
            ),
        },
    }
    Ok(())
}

async fn run_check() -> Result<(), AppError> {
    let config = config::load()?;
    let paths = AppPaths::new(&config.storage.path)?;
    let store = VersionStore::new(paths.version_record_path());
    let persisted = store.load()?;

    let comparator = VersionComparator::new(config.base_url()?)?;
    match comparator.check_for_update(persisted.as_ref()).await {
        Ok(UpdateVerdict::NeedsUpdate(remote)) => println!(
            "update needed: remote version {} (valid until {})",
            remote.version, remote.vigencia_ate
        ),
        Ok(UpdateVerdict::UpToDate(remote)) => println!(
            "up to date: version {} (valid until {})",
            remote.version, remote.vigencia_ate
        ),
        Err(err) => println!("version check failed ({err}); an update should be assumed"),
    }
    Ok(())
}

fn run_extract(args: ExtractArgs) -> Result<(), AppError> {
    let config = config::load()?;
    let paths = AppPaths::new(&config.storage.path)?;

    let archive_path = args.archive.unwrap_or_else(|| paths.artifact_path());
    let dest_dir = match args.dest {
        Some(dir) => dir,
        None => paths.extract_dir()?,
    };

    let out = archive::extract_state_member(&archive_path, &args.state, &dest_dir)?;
    println!("extracted {}", out.display());
    Ok(())
}

fn run_groups(args: GroupsArgs) -> Result<(), AppError> {
    let config = config::load()?;
    let paths = AppPaths::new(&config.storage.path)?;
    let registry = DestinationRegistry::new(paths.groups_path());

    match args.command {
        GroupsCommands::List => {
            let destinations = registry.list()?;
            if destinations.is_empty() {
                println!("no destinations registered");
            } else {
                println!("chat_id\tactive\tname");
                for (chat_id, destination) in destinations {
                    println!(
                        "{chat_id}\t{}\t{}",
                        destination.active, destination.name
                    );
                }
            }
        }
        GroupsCommands::Add {
            chat_id,
            name,
            activate,
        } => {
            registry.add(&chat_id, name.as_deref(), activate)?;
            println!("registered {chat_id} (active: {activate})");
        }
        GroupsCommands::Remove { chat_id } => {
            if registry.remove(&chat_id)? {
                println!("removed {chat_id}");
            } else {
                println!("unknown destination {chat_id}");
            }
        }
        GroupsCommands::Activate { chat_id } => {
            if registry.set_active(&chat_id, true)? {
                println!("activated {chat_id}");
            } else {
                println!("unknown destination {chat_id}");
            }
        }
        GroupsCommands::Deactivate { chat_id } => {
            if registry.set_active(&chat_id, false)? {
                println!("deactivated {chat_id}");
            } else {
                println!("unknown destination {chat_id}");
            }
        }
    }
    Ok(())
}
