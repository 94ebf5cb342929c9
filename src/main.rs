use std::process::ExitCode;

use anyhow::{Context, Error};
use clap::Parser;
use log::{error, info, LevelFilter};

use devicegraph::Devicegraph;
use storagectl::{
    cli::{Cli, Commands},
    commit::LogObserver,
    config::StorageConfig,
    FileLog, MultiLogger, Storage,
};

fn load_config(args: &Cli) -> Result<StorageConfig, Error> {
    let mut config = match &args.config {
        Some(path) => StorageConfig::load(path)?,
        None => StorageConfig::default(),
    };
    if let Commands::Commit { dry_run: true, .. } = args.command {
        config.dry_run = true;
    }
    Ok(config)
}

fn run(args: &Cli, config: &StorageConfig) -> Result<(), Error> {
    info!("storagectl version: {}", storagectl::STORAGECTL_VERSION);

    match &args.command {
        Commands::Check { file } => {
            let graph = Devicegraph::load(file, &Default::default())?;
            graph
                .check_consistency()
                .with_context(|| format!("Devicegraph '{}' is inconsistent", file.display()))?;
            println!("{graph}");
        }
        Commands::Probe { output } => {
            let storage = probed_storage(config)?;
            match output {
                Some(path) => storage.probed().save(path)?,
                None => print!("{}", storage.probed().to_yaml()?),
            }
        }
        Commands::Plan { staging, graphviz } => {
            let mut storage = probed_storage(config)?;
            let staging = Devicegraph::load(staging, storage.registry())?;
            storage.set_staging(staging);
            let actiongraph = storage.calculate_actiongraph()?;
            if let Some(path) = graphviz {
                actiongraph.write_graphviz(path)?;
            }
            print!("{actiongraph}");
        }
        Commands::Commit { staging, .. } => {
            let mut storage = probed_storage(config)?;
            let staging = Devicegraph::load(staging, storage.registry())?;
            storage.set_staging(staging);
            let report = storage.commit(&mut LogObserver)?;
            info!("Applied {} actions", report.applied.len());
        }
    }
    Ok(())
}

fn probed_storage(config: &StorageConfig) -> Result<Storage, Error> {
    let mut storage = Storage::from_config(config);
    storage.probe().context("Failed to probe storage")?;
    Ok(storage)
}

fn setup_logging(args: &Cli, config: &StorageConfig) -> Result<(), Error> {
    let mut multilogger = MultiLogger::new()
        // Add regular env_logger to output to stderr
        .with_logger(Box::new(
            env_logger::builder()
                .format_timestamp(None)
                .filter_level(args.verbosity)
                .build(),
        ))
        // Keep the graph internals out of trace output
        .with_target_filter("devicegraph", LevelFilter::Debug);

    if let Some(path) = &config.log_file {
        multilogger.add_logger(FileLog::new(path).into_logger());
    }

    multilogger.init().context("Logger already registered")
}

fn main() -> ExitCode {
    let args = Cli::parse();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e:?}");
            return ExitCode::from(1);
        }
    };

    if let Err(e) = setup_logging(&args, &config) {
        eprintln!("Failed to initialize logging: {e:?}");
        return ExitCode::from(1);
    }

    if let Err(e) = run(&args, &config) {
        error!("Failed to execute '{}' command: {e:?}", args.command);
        return ExitCode::from(2);
    }
    ExitCode::SUCCESS
}
