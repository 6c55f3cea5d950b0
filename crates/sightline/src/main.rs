//! `sightline` - CLI for the sightline field log
//!
//! This binary records sightings to the local database, reports sync state,
//! and browses the offline reference library.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::fs;
use std::sync::Arc;

use clap::Parser;

use sightline::cli::{
    AddCommand, Cli, Command, ConfigCommand, EditCommand, LibraryCommand, OutputFormat,
    SightingCommand,
};
use sightline::library::{Library, LibraryItem};
use sightline::storage::SqliteBackend;
use sightline::sync::{LocalAckTransport, SyncReport};
use sightline::transfer;
use sightline::{
    init_logging, Config, NetworkMonitor, NetworkStatus, NewSighting, Position, SightingId,
    SightingPatch, SightingRecord, SightingsContext,
};

type CliResult = Result<(), Box<dyn std::error::Error>>;

/// Everything a store-backed command needs.
#[derive(Debug)]
struct Session {
    context: SightingsContext,
    backend: SqliteBackend,
    auto_sync: bool,
}

impl Session {
    async fn open(config: &Config, offline: bool) -> Result<Self, Box<dyn std::error::Error>> {
        let backend = SqliteBackend::open(config.database_path())?;
        let status = if offline {
            NetworkStatus::Offline
        } else {
            config.initial_network_status()
        };

        // Syncs run in the foreground here; a background one would be cut
        // short when the process exits.
        let mut settings = config.context_settings();
        settings.auto_sync_on_add = false;

        let context = SightingsContext::start(
            Arc::new(backend.clone()),
            Box::new(LocalAckTransport),
            NetworkMonitor::new(status),
            settings,
        )
        .await;

        Ok(Self {
            context,
            backend,
            auto_sync: config.sync.auto_sync_on_add,
        })
    }

    async fn sync_after_write(&self) {
        if self.auto_sync && self.context.network().is_online() {
            self.context.sync().await;
        }
    }

    fn find(&self, id: &SightingId) -> Option<SightingRecord> {
        self.context
            .snapshot()
            .records
            .into_iter()
            .find(|r| &r.id == id)
    }
}

#[tokio::main]
async fn main() -> CliResult {
    let cli = Cli::parse();

    init_logging(cli.verbosity());

    let config = Config::load_from(cli.config.clone())?;

    match cli.command {
        Command::Library(library_cmd) => handle_library(library_cmd),
        Command::Config(config_cmd) => handle_config(&config, config_cmd),
        Command::Sighting(sighting_cmd) => {
            let session = Session::open(&config, cli.offline).await?;
            handle_sighting(&session, sighting_cmd).await
        }
        Command::Sync(sync_cmd) => {
            let session = Session::open(&config, cli.offline).await?;
            handle_sync(&session, sync_cmd.json).await
        }
        Command::Status(status_cmd) => {
            let session = Session::open(&config, cli.offline).await?;
            handle_status(&session, status_cmd.json).await
        }
    }
}

async fn handle_sighting(session: &Session, cmd: SightingCommand) -> CliResult {
    match cmd {
        SightingCommand::Add(add) => handle_add(session, add).await,
        SightingCommand::List {
            unsynced,
            limit,
            format,
        } => {
            let snapshot = session.context.snapshot();
            let records: Vec<_> = snapshot
                .records
                .into_iter()
                .filter(|r| !unsynced || !r.synced)
                .take(limit.unwrap_or(usize::MAX))
                .collect();
            print_sightings(&records, format)
        }
        SightingCommand::Show { id, json } => {
            let id = SightingId::from(id);
            let record = session
                .find(&id)
                .ok_or_else(|| format!("No sighting with id {id}"))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&record)?);
            } else {
                print_sighting_detail(&record);
            }
            Ok(())
        }
        SightingCommand::Edit(edit) => handle_edit(session, edit).await,
        SightingCommand::Remove { id } => {
            let id = SightingId::from(id);
            if session.find(&id).is_none() {
                println!("No sighting with id {id}; nothing removed.");
                return Ok(());
            }
            if session.context.remove(&id).await {
                println!("Removed {id}");
                Ok(())
            } else {
                Err(format!("Could not remove {id}").into())
            }
        }
        SightingCommand::Import { file } => {
            let json = fs::read_to_string(&file)?;
            let entries = transfer::parse_entries(&json)?;
            let total = entries.len();
            let mut imported = 0;
            for entry in entries {
                if session.context.add(entry.into_new_sighting()).await.is_some() {
                    imported += 1;
                }
            }
            session.sync_after_write().await;
            println!("Imported {imported} of {total} sightings from {}", file.display());
            if imported < total {
                println!("{} entries were rejected; run with -v for details.", total - imported);
            }
            Ok(())
        }
        SightingCommand::Export { output } => {
            let json = transfer::export_json(&session.context.snapshot().records)?;
            match output {
                Some(path) => {
                    fs::write(&path, json)?;
                    println!("Exported to {}", path.display());
                }
                None => println!("{json}"),
            }
            Ok(())
        }
    }
}

async fn handle_add(session: &Session, add: AddCommand) -> CliResult {
    let mut new = NewSighting::new(add.species, Position::new(add.lat, add.lng));
    new.notes = add.notes;
    new.photo = add.photo;
    new.source = add.source.map(Into::into);
    new.captured_at = add.at;

    // Validate here too so the user sees why it was rejected.
    new.validate()?;

    let record = session
        .context
        .add(new)
        .await
        .ok_or("Could not save sighting")?;
    session.sync_after_write().await;

    let synced = session.find(&record.id).is_some_and(|r| r.synced);
    println!(
        "Recorded {} ({}){}",
        record.id,
        record.species,
        if synced { ", synced" } else { ", pending sync" }
    );
    Ok(())
}

async fn handle_edit(session: &Session, edit: EditCommand) -> CliResult {
    let id = SightingId::from(edit.id);
    let mut patch = SightingPatch::new();
    if let Some(species) = edit.species {
        patch = patch.species(species);
    }
    if let Some(notes) = edit.notes {
        patch = patch.notes(notes);
    }
    if edit.clear_notes {
        patch = patch.clear_notes();
    }
    if let Some(photo) = edit.photo {
        patch = patch.photo(photo);
    }
    if edit.clear_photo {
        patch = patch.clear_photo();
    }

    if patch.is_empty() {
        return Err("Nothing to change; pass --species, --notes or --photo".into());
    }
    patch.validate()?;

    if session.find(&id).is_none() {
        return Err(format!("No sighting with id {id}").into());
    }

    let record = session
        .context
        .update(&id, &patch)
        .await
        .ok_or_else(|| format!("Could not update {id}"))?;
    session.sync_after_write().await;
    println!("Updated {} ({})", record.id, record.species);
    Ok(())
}

async fn handle_sync(session: &Session, json: bool) -> CliResult {
    let report = session
        .context
        .sync()
        .await
        .ok_or("Sync failed; run with -v for details")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_sync_report(&report);
    }
    Ok(())
}

fn print_sync_report(report: &SyncReport) {
    if report.skipped_offline {
        println!("Offline; {} sightings pending.", report.pending);
        return;
    }
    if report.attempted == 0 {
        println!("Nothing to sync.");
        return;
    }
    println!(
        "Synced {} of {} sightings ({} failed, {} still pending).",
        report.synced, report.attempted, report.failed, report.pending
    );
}

async fn handle_status(session: &Session, json: bool) -> CliResult {
    let snapshot = session.context.snapshot();
    let stats = session.backend.stats().await?;

    if json {
        let status = serde_json::json!({
            "database_path": session.backend.path(),
            "online": snapshot.is_online,
            "total_sightings": snapshot.records.len(),
            "pending_sync": snapshot.pending_sync_count,
            "oldest_sighting": stats.oldest_sighting,
            "newest_sighting": stats.newest_sighting,
            "db_size_bytes": stats.db_size_bytes,
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        println!("sightline status");
        println!("----------------");
        println!("Database:      {}", session.backend.path().display());
        println!(
            "Network:       {}",
            if snapshot.is_online { "online" } else { "offline" }
        );
        println!("Sightings:     {}", snapshot.records.len());
        println!("Pending sync:  {}", snapshot.pending_sync_count);
        if let Some(oldest) = stats.oldest_sighting {
            println!("Oldest:        {}", oldest.format("%Y-%m-%d %H:%M"));
        }
        if let Some(newest) = stats.newest_sighting {
            println!("Newest:        {}", newest.format("%Y-%m-%d %H:%M"));
        }
        println!("Size:          {} bytes", stats.db_size_bytes);
    }
    Ok(())
}

fn print_sightings(records: &[SightingRecord], format: OutputFormat) -> CliResult {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(records)?),
        OutputFormat::Plain => {
            for r in records {
                println!(
                    "{}\t{}\t{}\t{}\t{}",
                    r.id,
                    r.captured_at.to_rfc3339(),
                    r.species,
                    r.position,
                    if r.synced { "synced" } else { "pending" }
                );
            }
        }
        OutputFormat::Table => {
            if records.is_empty() {
                println!("No sightings.");
                return Ok(());
            }
            println!(
                "{:<24} {:<16} {:<28} {:<22} {}",
                "ID", "CAPTURED", "SPECIES", "POSITION", "SYNC"
            );
            for r in records {
                println!(
                    "{:<24} {:<16} {:<28} {:<22} {}",
                    r.id.as_str(),
                    r.captured_at.format("%Y-%m-%d %H:%M"),
                    truncate(&r.species, 28),
                    r.position.to_string(),
                    if r.synced { "yes" } else { "pending" }
                );
            }
        }
    }
    Ok(())
}

fn print_sighting_detail(record: &SightingRecord) {
    println!("Id:        {}", record.id);
    println!("Species:   {}", record.species);
    println!("Position:  {}", record.position);
    println!("Captured:  {}", record.captured_at.to_rfc3339());
    if let Some(source) = record.source {
        println!("Source:    {source}");
    }
    println!("Synced:    {}", if record.synced { "yes" } else { "no" });
    println!("Photo:     {}", if record.has_photo() { "yes" } else { "no" });
    if let Some(notes) = &record.notes {
        println!();
        println!("{notes}");
    }
}

fn handle_library(cmd: LibraryCommand) -> CliResult {
    let library = Library::builtin()?;

    match cmd {
        LibraryCommand::Search {
            query,
            category,
            format,
        } => print_library_items(&library.search_in(category.into(), &query), format),
        LibraryCommand::List { category, format } => {
            print_library_items(&library.filter_by_category(category.into()), format)
        }
        LibraryCommand::Show { id, json } => {
            let item = library
                .get(&id)
                .ok_or_else(|| format!("No library entry with id {id}"))?;
            if json {
                println!("{}", serde_json::to_string_pretty(item)?);
            } else {
                print_library_detail(item);
            }
            Ok(())
        }
        LibraryCommand::Stats { json } => {
            let stats = library.stats();
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!("Library entries: {}", stats.total);
                for (category, count) in &stats.categories {
                    println!("  {category:<14} {count}");
                }
            }
            Ok(())
        }
    }
}

fn print_library_items(items: &[&LibraryItem], format: OutputFormat) -> CliResult {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(items)?),
        OutputFormat::Plain => {
            for item in items {
                println!("{}\t{}\t{}", item.id, item.category, item.title);
            }
        }
        OutputFormat::Table => {
            if items.is_empty() {
                println!("No matching entries.");
                return Ok(());
            }
            println!("{:<24} {:<14} {:<6} {}", "ID", "CATEGORY", "IUCN", "TITLE");
            for item in items {
                let status = item.status.map(|s| format!("{s:?}")).unwrap_or_default();
                println!(
                    "{:<24} {:<14} {:<6} {}",
                    item.id,
                    item.category.to_string(),
                    status,
                    item.title
                );
            }
        }
    }
    Ok(())
}

fn print_library_detail(item: &LibraryItem) {
    println!("{}", item.title);
    println!("{}", "=".repeat(item.title.chars().count()));
    if let Some(name) = &item.scientific_name {
        println!("Scientific name: {name}");
    }
    match &item.subcategory {
        Some(sub) => println!("Category:        {} / {sub}", item.category),
        None => println!("Category:        {}", item.category),
    }
    if let Some(status) = item.status {
        println!("IUCN status:     {status} / {}", status.english_label());
    }
    if !item.biomes.is_empty() {
        let biomes: Vec<_> = item.biomes.iter().map(ToString::to_string).collect();
        println!("Biomes:          {}", biomes.join(", "));
    }
    println!();
    println!("{}", item.description);
    println!();
    println!("{}", item.content);
    if !item.tags.is_empty() {
        println!();
        println!("Tags: {}", item.tags.join(", "));
    }
}

fn handle_config(config: &Config, cmd: ConfigCommand) -> CliResult {
    match cmd {
        ConfigCommand::Show { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Storage]");
                println!("  Database path:      {}", config.database_path().display());
                println!(
                    "  Operation timeout:  {} ms",
                    config.storage.operation_timeout_ms
                );
                println!();
                println!("[Sync]");
                println!("  Auto sync on add:   {}", config.sync.auto_sync_on_add);
                println!("  Batch size:         {}", config.sync.batch_size);
                println!("  Timeout:            {} ms", config.sync.timeout_ms);
                println!();
                println!("[Network]");
                println!("  Assume online:      {}", config.network.assume_online);
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            let path = file.unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            match Config::load_from(Some(path)) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => return Err(format!("Configuration error: {e}").into()),
            }
        }
    }
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
        out.push('…');
        out
    }
}
