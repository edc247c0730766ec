mod auth;
mod config;
mod error;
mod export;
mod intake;
mod storage;
mod sync;
mod utils;

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use auth::AuthGate;
use config::{Backend, DriveConfig, DEFAULT_CONFIG_FILE};
use storage::{LocalObjectStore, ObjectStore};
use sync::{Durability, Reconciler};
use utils::format::format_file_size;

#[derive(Parser)]
#[command(name = "filedrive")]
#[command(about = "Local file drive backed by a durable object store")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, global = true, help = "Config file path")]
    config: Option<String>,

    #[arg(long, global = true, help = "Data directory path (overrides config)")]
    data: Option<String>,

    #[arg(long, global = true, help = "Keep files in memory only for this run")]
    memory: bool,

    #[arg(long, global = true, help = "Output as JSON")]
    json: bool,

    #[arg(long, global = true, help = "Account email")]
    email: Option<String>,

    #[arg(long, global = true, help = "Account password")]
    password: Option<String>,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Check credentials, optionally remembering the login
    Login {
        #[arg(long)]
        remember: bool,
    },
    /// Forget a remembered login
    Logout,
    /// Upload files into the drive
    Add {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// List stored files
    List,
    /// Delete a file by id
    Remove { id: String },
    /// Save a copy of a file
    Export {
        id: String,
        #[arg(long, default_value = ".", help = "Destination directory")]
        out: PathBuf,
    },
    /// Show drive and sync status
    Status,
    /// Check every record in the local store
    Verify,
    GenerateConfig {
        #[arg(long, default_value = DEFAULT_CONFIG_FILE, help = "Config file path")]
        output: String,
    },
}

type Drive = Reconciler<dyn ObjectStore>;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::GenerateConfig { output } = &cli.command {
        DriveConfig::default().save(output)?;
        if cli.json {
            println!("{}", serde_json::json!({"success": true, "config_file": output}));
        } else {
            println!("⚙️  Default configuration saved to: {}", output);
        }
        return Ok(());
    }

    let mut config = DriveConfig::load_or_create(cli.config.as_deref())?;
    if let Some(data) = &cli.data {
        config.data_directory = data.into();
    }
    if cli.memory {
        config.store.backend = Backend::Memory;
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    config.ensure_directories()?;
    let gate = AuthGate::new(config.auth.clone(), &config.data_directory);

    match cli.command {
        Commands::Login { remember } => {
            let (Some(email), Some(password)) = (cli.email.as_deref(), cli.password.as_deref()) else {
                anyhow::bail!("login requires --email and --password");
            };
            if let Err(e) = gate.login(email, password, remember) {
                report_error(cli.json, &e);
                return Err(e);
            }
            if cli.json {
                println!("{}", serde_json::json!({"success": true, "remembered": remember}));
            } else {
                println!("✅ Logged in as {}", email);
            }
            Ok(())
        }
        Commands::Logout => {
            let removed = gate.logout()?;
            if cli.json {
                println!("{}", serde_json::json!({"success": true, "was_logged_in": removed}));
            } else {
                println!("👋 Logged out");
            }
            Ok(())
        }
        Commands::Verify => verify(&config, cli.json).await,
        Commands::GenerateConfig { .. } => Ok(()),
        command => {
            if let Err(e) = gate.require(cli.email.as_deref(), cli.password.as_deref()) {
                let e = anyhow::Error::from(e);
                report_error(cli.json, &e);
                return Err(e);
            }

            let drive = Drive::new(config.object_store());
            drive.load().await;

            match command {
                Commands::Add { paths } => add(&drive, &config, paths, cli.json).await,
                Commands::List => list(&drive, cli.json),
                Commands::Remove { id } => remove(&drive, &id, cli.json).await,
                Commands::Export { id, out } => export(&drive, &id, &out, cli.json).await,
                Commands::Status => status(&drive, &config, cli.json),
                _ => Ok(()),
            }
        }
    }
}

fn report_error(json: bool, e: &anyhow::Error) {
    if json {
        println!("{}", serde_json::json!({"error": e.to_string()}));
    } else {
        eprintln!("❌ {}", e);
    }
}

fn durability_label(durability: Durability) -> &'static str {
    match durability {
        Durability::Pending => "pending",
        Durability::Persisted => "saved",
        Durability::Failed => "not saved",
    }
}

async fn add(drive: &Drive, config: &DriveConfig, paths: Vec<PathBuf>, json: bool) -> Result<()> {
    let mut added = Vec::new();
    let mut skipped = Vec::new();

    for path in paths {
        match intake::read_file(&path, config.max_object_size).await {
            Ok(file) => added.push(drive.add(file)),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping file");
                skipped.push((path, e.to_string()));
            }
        }
    }

    drive.settle().await;

    let results: Vec<_> = added
        .iter()
        .filter_map(|id| drive.get(id))
        .collect();

    if json {
        println!("{}", serde_json::json!({
            "added": results.iter().map(|o| serde_json::json!({
                "id": o.id(),
                "durability": o.durability,
            })).collect::<Vec<_>>(),
            "skipped": skipped.iter().map(|(p, reason)| serde_json::json!({
                "path": p.display().to_string(),
                "reason": reason,
            })).collect::<Vec<_>>(),
            "status": drive.status(),
        }));
    } else {
        println!("📤 Upload");
        println!("=========");
        for object in &results {
            println!(
                "   {} {} ({})",
                if object.durability == Durability::Persisted { "✅" } else { "⚠️ " },
                object.object.name,
                durability_label(object.durability)
            );
            println!("      id: {}", object.id());
        }
        for (path, reason) in &skipped {
            println!("   ❌ {}: {}", path.display(), reason);
        }
        if drive.is_degraded() {
            println!("   ⚠️  Storage unavailable: files are kept for this run only");
        }
    }

    Ok(())
}

fn list(drive: &Drive, json: bool) -> Result<()> {
    let objects = drive.objects();

    if json {
        let rows: Vec<_> = objects
            .iter()
            .map(|o| {
                serde_json::json!({
                    "id": o.id(),
                    "name": o.object.name,
                    "size": o.object.size,
                    "size_display": format_file_size(o.object.size),
                    "mime_type": o.object.mime_type,
                    "last_modified": o.object.last_modified,
                    "durability": o.durability,
                })
            })
            .collect();
        println!("{}", serde_json::json!({"files": rows, "count": objects.len()}));
        return Ok(());
    }

    println!("📁 My Drive");
    println!("===========");
    if drive.is_loading() {
        println!("   Loading files...");
        return Ok(());
    }
    if objects.is_empty() {
        println!("   No files uploaded yet");
        println!("   Use `filedrive add <paths...>` to add your files.");
        return Ok(());
    }

    println!("   {:<32} {:>12}  {:<24} {}", "Name", "Size", "Type", "Id");
    for object in &objects {
        let marker = if object.durability == Durability::Failed { " (not saved)" } else { "" };
        println!(
            "   {:<32} {:>12}  {:<24} {}{}",
            object.object.name,
            format_file_size(object.object.size),
            object.object.display_type(),
            object.id(),
            marker
        );
    }
    Ok(())
}

async fn remove(drive: &Drive, id: &str, json: bool) -> Result<()> {
    let was_present = drive.remove(id);
    drive.settle().await;
    let failed = drive.snapshot().counters.failed > 0;

    if json {
        println!("{}", serde_json::json!({
            "id": id,
            "found": was_present,
            "deleted": !failed,
        }));
    } else if failed {
        println!("⚠️  {} removed from the list but the store could not delete it", id);
    } else if was_present {
        println!("🗑️  Deleted {}", id);
    } else {
        println!("   No file with id {}", id);
    }
    Ok(())
}

async fn export(drive: &Drive, id: &str, out: &std::path::Path, json: bool) -> Result<()> {
    let Some(entry) = drive.get(id) else {
        let e = anyhow::anyhow!("no file with id {}", id);
        report_error(json, &e);
        return Err(e);
    };

    let path = export::export_object(&entry.object, out).await?;
    if json {
        println!("{}", serde_json::json!({"id": id, "path": path.display().to_string()}));
    } else {
        println!("📥 Saved {} to {}", entry.object.name, path.display());
    }
    Ok(())
}

fn status(drive: &Drive, config: &DriveConfig, json: bool) -> Result<()> {
    let snapshot = drive.snapshot();
    let total_bytes: u64 = snapshot.objects.iter().map(|o| o.object.size).sum();

    if json {
        println!("{}", serde_json::json!({
            "files": snapshot.objects.len(),
            "total_bytes": total_bytes,
            "sync_status": snapshot.status,
            "counters": snapshot.counters,
            "loading": snapshot.is_loading,
            "degraded": snapshot.degraded,
            "backend": config.store.backend,
            "data_directory": config.data_directory.display().to_string(),
        }));
    } else {
        println!("📊 Drive Status");
        println!("===============");
        if snapshot.degraded {
            println!("⚠️  Storage: unavailable (memory only)");
        } else {
            println!("✅ Storage: {:?}", config.store.backend);
        }
        println!("   Data directory: {}", config.data_directory.display());
        println!("   Files: {}", snapshot.objects.len());
        println!("   Total size: {}", format_file_size(total_bytes));
        println!("   Sync: {}", snapshot.status);
    }
    info!(files = snapshot.objects.len(), degraded = snapshot.degraded, "status reported");
    Ok(())
}

async fn verify(config: &DriveConfig, json: bool) -> Result<()> {
    if config.store.backend != Backend::Local {
        anyhow::bail!("verify only applies to the local backend");
    }

    let store = LocalObjectStore::new(&config.data_directory, &config.store);
    let report = match store.verify().await {
        Ok(report) => report,
        Err(e) => {
            let e = anyhow::Error::from(e);
            report_error(json, &e);
            return Err(e);
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("🔍 Verifying Store Integrity");
        println!("============================");
        println!("   Table: {}", store.table_dir().display());
        println!("   Records: {}", report.total_records);
        println!("   Valid: {}", report.valid_records);
        println!("   Payload: {}", format_file_size(report.total_payload_bytes));
        if report.corrupt_records.is_empty() {
            println!("✅ All records verified");
        } else {
            println!("❌ Corrupt records: {}", report.corrupt_records.len());
            for name in &report.corrupt_records {
                println!("   {}", name);
            }
        }
    }
    Ok(())
}
