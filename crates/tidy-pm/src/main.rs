//! Tidy CLI
//!
//! Thin front-end over the library: argument parsing, a console progress
//! renderer, and dispatch to the install/add/scan/run flows.

use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use tidy_pm::events::{Event, Progress};
use tidy_pm::{
    bin, paths, scanner, Installer, ManifestCache, PackageJson, RegistryClient, Resolver,
    ScriptRunner, Store,
};

#[derive(Parser)]
#[command(name = "tidy")]
#[command(about = "Fast, store-backed package installs for JavaScript projects")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Install dependencies from package.json (optionally extra packages)
    #[command(alias = "i")]
    Install {
        /// Additional packages to install alongside the manifest
        packages: Vec<String>,
    },

    /// Add packages to the manifest and install them
    #[command(alias = "a")]
    Add {
        /// Packages to add
        #[arg(required = true)]
        packages: Vec<String>,

        /// Add as development dependencies
        #[arg(short = 'D', long)]
        dev: bool,
    },

    /// Scan sources for undeclared imports, add and install them
    Scan,

    /// Run a script from package.json
    #[command(alias = "r")]
    Run {
        /// Script name
        script: String,
    },

    /// Cache maintenance
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },
}

#[derive(Subcommand)]
enum CacheCommands {
    /// Remove the on-disk manifest cache
    Clear,
}

/// Renders progress events to the terminal.
struct ConsoleProgress;

impl Progress for ConsoleProgress {
    fn event(&self, event: &Event) {
        match event {
            Event::ResolveStarted { roots } => {
                println!("Resolving {} root dependencies...", roots);
            }
            Event::Resolved {
                packages,
                from_cache,
            } => {
                if *from_cache {
                    println!("Resolved {} packages (cached)", packages);
                } else {
                    println!("Resolved {} packages", packages);
                }
            }
            Event::FetchFailed { name, message, .. } => {
                eprintln!("warning: could not resolve {}: {}", name, message);
            }
            Event::Installing { .. } => {}
            Event::Installed { name, version } => {
                println!("+ {}@{}", name, version);
            }
            Event::Skipped { .. } => {}
            Event::InstallFailed { name, message } => {
                eprintln!("error: {} failed to install: {}", name, message);
            }
        }
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    match Cli::parse().command {
        Commands::Install { packages } => install(packages),
        Commands::Add { packages, dev } => add(packages, dev),
        Commands::Scan => scan(),
        Commands::Run { script } => run(&script),
        Commands::Cache {
            command: CacheCommands::Clear,
        } => cache_clear(),
    }
}

fn install(extra: Vec<String>) -> anyhow::Result<()> {
    let root = paths::project_root()?;
    let mut manifest = load_or_default(&root)?;

    for package in extra {
        manifest.dependencies.insert(package, "latest".to_string());
    }

    if manifest.all_dependencies().is_empty() {
        println!("Nothing to install.");
        return Ok(());
    }

    resolve_and_install(&root, &manifest)
}

fn add(packages: Vec<String>, dev: bool) -> anyhow::Result<()> {
    let root = paths::project_root()?;
    let mut manifest = load_or_default(&root)?;
    let client = Arc::new(RegistryClient::new()?);

    for package in &packages {
        // Direct requests are validated up front so a bad name fails the
        // command instead of being silently dropped by the resolver.
        let fetched = client.manifest(package, "latest")?;
        let range = format!("^{}", fetched.version);

        if dev {
            manifest.dev_dependencies.insert(package.clone(), range);
        } else {
            manifest.dependencies.insert(package.clone(), range);
        }
    }

    manifest.save(&root)?;
    println!("Added {} package(s) to package.json", packages.len());

    resolve_and_install_with(&root, &manifest, client)
}

fn scan() -> anyhow::Result<()> {
    let root = paths::project_root()?;
    let report = scanner::scan_and_update(&root)?;

    if report.is_empty() {
        println!("No undeclared packages found.");
    } else {
        for name in &report.added {
            println!("+ {} (dependencies)", name);
        }
        for name in &report.added_dev {
            println!("+ {} (devDependencies)", name);
        }
    }

    let manifest = PackageJson::load(&root)?;
    resolve_and_install(&root, &manifest)
}

fn run(script: &str) -> anyhow::Result<()> {
    let root = paths::project_root()?;
    let manifest = PackageJson::load(&root)?;

    ScriptRunner::new(&root, manifest).run(script)?;
    Ok(())
}

fn cache_clear() -> anyhow::Result<()> {
    let cache = ManifestCache::new()?;
    cache.clear_disk()?;
    println!("Manifest cache cleared.");
    Ok(())
}

fn load_or_default(root: &std::path::Path) -> anyhow::Result<PackageJson> {
    if root.join(paths::MANIFEST_FILE).exists() {
        Ok(PackageJson::load(root)?)
    } else {
        Ok(PackageJson::default())
    }
}

fn resolve_and_install(root: &std::path::Path, manifest: &PackageJson) -> anyhow::Result<()> {
    let client = Arc::new(RegistryClient::new()?);
    resolve_and_install_with(root, manifest, client)
}

fn resolve_and_install_with(
    root: &std::path::Path,
    manifest: &PackageJson,
    client: Arc<RegistryClient>,
) -> anyhow::Result<()> {
    let progress: Arc<dyn Progress> = Arc::new(ConsoleProgress);

    let resolved = Resolver::new(client.clone(), root)
        .with_progress(progress.clone())
        .resolve(manifest)?;

    let store = Arc::new(Store::new()?);
    let report = Installer::new(store, client, root)
        .with_progress(progress)
        .install_all(&resolved);

    bin::link_binaries(root)?;

    if report.is_success() {
        println!(
            "Done: {} installed, {} already present.",
            report.installed, report.skipped
        );
        Ok(())
    } else {
        for failure in &report.failures {
            eprintln!("  {}: {}", failure.name, failure.message);
        }
        anyhow::bail!("{} package(s) failed to install", report.failures.len());
    }
}
