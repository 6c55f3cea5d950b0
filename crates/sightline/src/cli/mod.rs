//! Command-line interface for sightline.
//!
//! This module provides the CLI structure for the `sightline` binary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{
    AddCommand, CategoryArg, ConfigCommand, EditCommand, LibraryCommand, OutputFormat,
    SightingCommand, SourceArg, StatusCommand, SyncCommand,
};

use crate::logging::Verbosity;

/// sightline - Field sighting log that works offline
///
/// Records animal and plant sightings to a local database and keeps track of
/// which ones still need to be synced.
#[derive(Debug, Parser)]
#[command(name = "sightline")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for info, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Treat the network as unavailable; nothing is synced
    #[arg(long, global = true)]
    pub offline: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Record, list and edit sightings
    #[command(subcommand)]
    Sighting(SightingCommand),

    /// Push pending sightings
    Sync(SyncCommand),

    /// Show storage and sync status
    Status(StatusCommand),

    /// Browse the offline reference library
    #[command(subcommand)]
    Library(LibraryCommand),

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> Verbosity {
        Verbosity::from_flags(self.verbose, self.quiet)
    }
}
