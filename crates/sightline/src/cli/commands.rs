//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{Args, Subcommand, ValueEnum};

use crate::library::{Category, CategoryFilter};
use crate::sighting::SightingSource;

/// Sighting log commands.
#[derive(Debug, Subcommand)]
pub enum SightingCommand {
    /// Record a new sighting
    Add(AddCommand),

    /// List sightings, newest first
    List {
        /// Only show sightings not yet synced
        #[arg(short, long)]
        unsynced: bool,

        /// Maximum number of results
        #[arg(short, long)]
        limit: Option<usize>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "table")]
        format: OutputFormat,
    },

    /// Show one sighting
    Show {
        /// Sighting id
        id: String,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Edit species, notes or photo of a sighting
    Edit(EditCommand),

    /// Delete a sighting
    Remove {
        /// Sighting id
        id: String,
    },

    /// Import sightings from a JSON export
    Import {
        /// JSON file holding an array of sightings
        file: PathBuf,
    },

    /// Export all sightings as JSON
    Export {
        /// Write to this file instead of stdout
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
}

/// Arguments for `sighting add`.
#[derive(Debug, Args)]
pub struct AddCommand {
    /// Species name
    pub species: String,

    /// Latitude in degrees
    #[arg(long, allow_negative_numbers = true)]
    pub lat: f64,

    /// Longitude in degrees
    #[arg(long, allow_negative_numbers = true)]
    pub lng: f64,

    /// Observation notes
    #[arg(short, long)]
    pub notes: Option<String>,

    /// Photo as a `data:image/...;base64,` URI
    #[arg(long)]
    pub photo: Option<String>,

    /// Where the sighting was logged from
    #[arg(short, long, value_enum)]
    pub source: Option<SourceArg>,

    /// Capture time (RFC 3339); defaults to now
    #[arg(long)]
    pub at: Option<DateTime<Utc>>,
}

/// Arguments for `sighting edit`.
#[derive(Debug, Args)]
pub struct EditCommand {
    /// Sighting id
    pub id: String,

    /// New species name
    #[arg(long)]
    pub species: Option<String>,

    /// Replace the notes
    #[arg(short, long, conflicts_with = "clear_notes")]
    pub notes: Option<String>,

    /// Remove the notes
    #[arg(long)]
    pub clear_notes: bool,

    /// Replace the photo
    #[arg(long, conflicts_with = "clear_photo")]
    pub photo: Option<String>,

    /// Remove the photo
    #[arg(long)]
    pub clear_photo: bool,
}

/// Sync command arguments.
#[derive(Debug, Args)]
pub struct SyncCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Status command arguments.
#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Offline library commands.
#[derive(Debug, Subcommand)]
pub enum LibraryCommand {
    /// Search entries by text
    Search {
        /// Text to look for in titles, descriptions, content, tags and
        /// scientific names
        query: String,

        /// Restrict to a category
        #[arg(long, value_enum, default_value = "all")]
        category: CategoryArg,

        /// Output format
        #[arg(short, long, value_enum, default_value = "table")]
        format: OutputFormat,
    },

    /// List entries
    List {
        /// Restrict to a category
        #[arg(long, value_enum, default_value = "all")]
        category: CategoryArg,

        /// Output format
        #[arg(short, long, value_enum, default_value = "table")]
        format: OutputFormat,
    },

    /// Show one entry in full
    Show {
        /// Entry id, e.g. `onca-pintada`
        id: String,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show entry counts per category
    Stats {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

/// Sighting source argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SourceArg {
    /// Logged from the map
    Map,
    /// Logged from the camera
    Camera,
}

impl From<SourceArg> for SightingSource {
    fn from(arg: SourceArg) -> Self {
        match arg {
            SourceArg::Map => Self::Map,
            SourceArg::Camera => Self::Camera,
        }
    }
}

/// Library category argument for filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CategoryArg {
    /// Every category
    All,
    /// General fauna
    Fauna,
    /// Plants and trees
    Flora,
    /// Ecosystems
    Biomes,
    /// Rivers
    Rivers,
    /// Birds
    Birds,
    /// Mammals
    Mammals,
    /// Reptiles
    Reptiles,
    /// Amphibians
    Amphibians,
    /// Fish
    Fish,
    /// Insects
    Insects,
    /// Conservation
    Conservation,
    /// Environmental law
    Legislation,
}

impl From<CategoryArg> for CategoryFilter {
    fn from(arg: CategoryArg) -> Self {
        let category = match arg {
            CategoryArg::All => return Self::All,
            CategoryArg::Fauna => Category::Fauna,
            CategoryArg::Flora => Category::Flora,
            CategoryArg::Biomes => Category::Biomes,
            CategoryArg::Rivers => Category::Rivers,
            CategoryArg::Birds => Category::Birds,
            CategoryArg::Mammals => Category::Mammals,
            CategoryArg::Reptiles => Category::Reptiles,
            CategoryArg::Amphibians => Category::Amphibians,
            CategoryArg::Fish => Category::Fish,
            CategoryArg::Insects => Category::Insects,
            CategoryArg::Conservation => Category::Conservation,
            CategoryArg::Legislation => Category::Legislation,
        };
        Self::Only(category)
    }
}

/// Output format for list-style commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Plain text output
    Plain,
    /// Formatted table
    #[default]
    Table,
    /// JSON output
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_arg_conversion() {
        assert_eq!(SightingSource::from(SourceArg::Map), SightingSource::Map);
        assert_eq!(
            SightingSource::from(SourceArg::Camera),
            SightingSource::Camera
        );
    }

    #[test]
    fn test_category_arg_conversion() {
        assert_eq!(CategoryFilter::from(CategoryArg::All), CategoryFilter::All);
        assert_eq!(
            CategoryFilter::from(CategoryArg::Birds),
            CategoryFilter::Only(Category::Birds)
        );
        assert_eq!(
            CategoryFilter::from(CategoryArg::Legislation),
            CategoryFilter::Only(Category::Legislation)
        );
    }

    #[test]
    fn test_category_arg_names_match_library() {
        for category in Category::ALL {
            let arg = CategoryArg::from_str(category.as_str(), false).unwrap();
            assert_eq!(CategoryFilter::from(arg), CategoryFilter::Only(category));
        }
    }

    #[test]
    fn test_output_format_default() {
        assert_eq!(OutputFormat::default(), OutputFormat::Table);
    }
}
