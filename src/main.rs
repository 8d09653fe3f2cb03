// src/main.rs

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dynamod::layout::ArtifactLayout;
use dynamod::{Config, Runtime, Toolchain};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Parser)]
#[command(name = "dynamod")]
#[command(author, version, about = "Inspect and exercise a dynamic module warehouse", long_about = None)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the toolchain fingerprint of this process
    Fingerprint,
    /// Show where a module's artifacts live and whether they are present
    Status {
        /// Fully-qualified module name (namespace_package_version)
        module: String,
    },
    /// Fetch a module from the remote store without loading it
    Sync {
        /// Fully-qualified module name (namespace_package_version)
        module: String,
    },
    /// Resolve a package version and invoke one method on it
    Invoke {
        /// Package name
        package: String,
        /// Requested version; falls back to the default version
        version: String,
        /// Method name passed to the module
        method: String,
        /// Opaque payload passed to the module
        #[arg(default_value = "")]
        payload: String,
    },
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display())),
        None => Ok(Config::default()),
    }
}

fn local_layout(config: &Config) -> Result<ArtifactLayout> {
    let root = config
        .local_root()
        .context("No local warehouse configured ([warehouse] local)")?;
    Ok(ArtifactLayout::new(root, Toolchain::current().clone()))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Some(Commands::Fingerprint) => {
            println!("{}", Toolchain::current());
            Ok(())
        }
        Some(Commands::Status { module }) => {
            dynamod::allowed::require_module_name(&module)?;
            let layout = local_layout(&config)?;
            println!("Module: {}", module);
            println!("  Directory: {}", layout.module_dir(&module).display());
            for artifact in ArtifactLayout::artifacts(&module) {
                let path = layout.artifact_path(&module, &artifact.file_name);
                let state = match std::fs::metadata(&path) {
                    Ok(meta) if meta.len() > 0 => format!("{} bytes", meta.len()),
                    Ok(_) => "empty".to_string(),
                    Err(_) if artifact.is_required() => "missing".to_string(),
                    Err(_) => "absent (optional)".to_string(),
                };
                println!("  {}: {}", artifact.file_name, state);
            }

            let runtime = Runtime::new(&config)?;
            let present = match runtime.warehouse().local() {
                Some(local) => local.exists(&module).await,
                None => false,
            };
            println!("  Present: {}", if present { "yes" } else { "no" });
            Ok(())
        }
        Some(Commands::Sync { module }) => {
            let runtime = Runtime::new(&config)?;
            info!("Syncing module {}", module);
            runtime.warehouse().prefetch(&module).await?;
            println!("Module {} is available locally", module);
            Ok(())
        }
        Some(Commands::Invoke {
            package,
            version,
            method,
            payload,
        }) => {
            let runtime = Runtime::new(&config)?;
            let module = runtime.get_package(&package, &version).await?;
            info!("Resolved {} {} to {}", package, version, module.name());
            let result = module.invoke(&method, &payload);
            runtime.shutdown().await;
            println!("{}", result?);
            Ok(())
        }
        None => {
            println!("dynamod v{}", env!("CARGO_PKG_VERSION"));
            println!("Run 'dynamod --help' for usage information");
            Ok(())
        }
    }
}
