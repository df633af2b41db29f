mod cli;

use kfuse::documents::DocumentStore;
use kfuse::pipeline::BuildConfig;
use kfuse::plugin::{Loader, Registry};
use std::path::PathBuf;

fn main() {
    use clap::Parser;
    let cli = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_env("KFUSE_LOG"))
        .with_writer(std::io::stderr)
        .init();

    for new_path in cli.directory.iter() {
        match new_path.canonicalize() {
            Err(e) => {
                eprintln!(
                    "Failed to resolve path for -C/--directory {}\n{}",
                    new_path.display(),
                    e
                );
                std::process::exit(1);
            }
            Ok(cwd) => {
                if let Err(err) = std::env::set_current_dir(&cwd) {
                    eprintln!("Failed to set work directory to {}\n{}", cwd.display(), err,);
                    std::process::exit(1);
                }

                tracing::info!(directory=%cwd.display(), "Changed working directory");
            }
        }
    }

    let registry = Registry::builtin();
    let command_result = match cli.command {
        cli::Command::Build(build_cli) => build(build_cli, &registry),
        cli::Command::Dev(dev_cli) => dev(dev_cli, &registry),
    };

    if let Err(e) = command_result {
        for error in e.chain() {
            eprintln!("{error}")
        }
        std::process::exit(1);
    }
}

fn build_dir(dir: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    match dir {
        Some(dir) => Ok(dir),
        None => Ok(std::env::current_dir()?),
    }
}

pub fn build(cli: cli::BuildCommand, registry: &Registry) -> anyhow::Result<()> {
    let dir = build_dir(cli.dir)?;
    let documents = kfuse::pipeline::build(&dir, registry)?;

    output(&cli.output, &documents)?;
    Ok(())
}

fn output(output: &cli::OutputArgs, documents: &DocumentStore) -> anyhow::Result<()> {
    match output.format {
        cli::OutputFormat::Yaml => print!("{}", documents.to_yaml()?),
        cli::OutputFormat::Json => {
            serde_json::to_writer_pretty(std::io::stdout(), &documents.to_value())?;
            println!();
        }
    };

    Ok(())
}

/// (kfuse-)developer utilities
///
/// A quick way to expose internal structures for debugging purposes
pub fn dev(cli: cli::DevCommand, registry: &Registry) -> anyhow::Result<()> {
    use cli::DevSubCommand::*;

    match cli.command {
        Plugins => {
            for kind in registry.generator_kinds() {
                println!("generator   {kind}");
            }
            for kind in registry.transformer_kinds() {
                println!("transformer {kind}");
            }
        }
        Documents { dir } => {
            let loader = Loader::new(build_dir(dir)?);
            let config = BuildConfig::load(&loader)?;

            let mut documents = DocumentStore::new();
            for path in &config.resources {
                documents.load_path(&loader.resolve(path))?;
            }
            println!("{documents:#?}");
        }
    }

    Ok(())
}
