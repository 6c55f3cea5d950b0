//! Offline reference library of Brazilian fauna, flora and ecosystems.
//!
//! Entries ship inside the binary so they are available with no network.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

const BUILTIN_LIBRARY: &str = include_str!("../data/library.json");

/// Topic an entry is filed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// General fauna.
    Fauna,
    /// Plants and trees.
    Flora,
    /// Whole ecosystems.
    Biomes,
    /// Rivers and watersheds.
    Rivers,
    /// Birds.
    Birds,
    /// Mammals.
    Mammals,
    /// Reptiles.
    Reptiles,
    /// Amphibians.
    Amphibians,
    /// Fish.
    Fish,
    /// Insects.
    Insects,
    /// Conservation programs and protected areas.
    Conservation,
    /// Environmental law.
    Legislation,
}

impl Category {
    /// Every category, in display order.
    pub const ALL: [Self; 12] = [
        Self::Fauna,
        Self::Flora,
        Self::Biomes,
        Self::Rivers,
        Self::Birds,
        Self::Mammals,
        Self::Reptiles,
        Self::Amphibians,
        Self::Fish,
        Self::Insects,
        Self::Conservation,
        Self::Legislation,
    ];

    /// Portuguese identifier, also accepted when parsing.
    #[must_use]
    pub fn alias(self) -> &'static str {
        match self {
            Self::Fauna => "fauna",
            Self::Flora => "flora",
            Self::Biomes => "biomas",
            Self::Rivers => "rios",
            Self::Birds => "aves",
            Self::Mammals => "mamiferos",
            Self::Reptiles => "repteis",
            Self::Amphibians => "anfibios",
            Self::Fish => "peixes",
            Self::Insects => "insetos",
            Self::Conservation => "conservacao",
            Self::Legislation => "legislacao",
        }
    }

    /// The lowercase identifier used in data files and on the command line.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fauna => "fauna",
            Self::Flora => "flora",
            Self::Biomes => "biomes",
            Self::Rivers => "rivers",
            Self::Birds => "birds",
            Self::Mammals => "mammals",
            Self::Reptiles => "reptiles",
            Self::Amphibians => "amphibians",
            Self::Fish => "fish",
            Self::Insects => "insects",
            Self::Conservation => "conservation",
            Self::Legislation => "legislation",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Category {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == wanted || c.alias() == wanted)
            .ok_or_else(|| Error::Library(format!("unknown category '{s}'")))
    }
}

/// Either every entry or a single category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CategoryFilter {
    /// No filtering.
    #[default]
    All,
    /// Entries of one category.
    Only(Category),
}

impl FromStr for CategoryFilter {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.trim().eq_ignore_ascii_case("all") {
            Ok(Self::All)
        } else {
            s.parse().map(Self::Only)
        }
    }
}

impl From<Category> for CategoryFilter {
    fn from(category: Category) -> Self {
        Self::Only(category)
    }
}

/// IUCN Red List status.
#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ConservationStatus {
    /// Least Concern.
    LC,
    /// Near Threatened.
    NT,
    /// Vulnerable.
    VU,
    /// Endangered.
    EN,
    /// Critically Endangered.
    CR,
    /// Extinct in the Wild.
    EW,
    /// Extinct.
    EX,
}

impl ConservationStatus {
    /// Portuguese label, as shown next to an entry.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::LC => "Pouco Preocupante",
            Self::NT => "Quase Ameaçada",
            Self::VU => "Vulnerável",
            Self::EN => "Em Perigo",
            Self::CR => "Criticamente em Perigo",
            Self::EW => "Extinto na Natureza",
            Self::EX => "Extinto",
        }
    }

    /// IUCN Red List category name in English.
    #[must_use]
    pub fn english_label(self) -> &'static str {
        match self {
            Self::LC => "Least Concern",
            Self::NT => "Near Threatened",
            Self::VU => "Vulnerable",
            Self::EN => "Endangered",
            Self::CR => "Critically Endangered",
            Self::EW => "Extinct in the Wild",
            Self::EX => "Extinct",
        }
    }

    /// Whether the species counts as threatened (VU, EN or CR).
    #[must_use]
    pub fn is_threatened(self) -> bool {
        matches!(self, Self::VU | Self::EN | Self::CR)
    }
}

impl fmt::Display for ConservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?} ({})", self.label())
    }
}

/// The six Brazilian biomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Biome {
    /// Amazônia.
    Amazon,
    /// Cerrado.
    Cerrado,
    /// Mata Atlântica.
    AtlanticForest,
    /// Caatinga.
    Caatinga,
    /// Pampa.
    Pampa,
    /// Pantanal.
    Pantanal,
}

impl Biome {
    /// Every biome.
    pub const ALL: [Self; 6] = [
        Self::Amazon,
        Self::Cerrado,
        Self::AtlanticForest,
        Self::Caatinga,
        Self::Pampa,
        Self::Pantanal,
    ];

    /// Display name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Amazon => "Amazônia",
            Self::Cerrado => "Cerrado",
            Self::AtlanticForest => "Mata Atlântica",
            Self::Caatinga => "Caatinga",
            Self::Pampa => "Pampa",
            Self::Pantanal => "Pantanal",
        }
    }
}

impl fmt::Display for Biome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

/// One reference entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LibraryItem {
    /// Stable slug.
    pub id: String,
    /// Display title.
    pub title: String,
    /// Filing category.
    pub category: Category,
    /// Finer grouping, e.g. a taxonomic family.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subcategory: Option<String>,
    /// One-line summary.
    pub description: String,
    /// Full text, lightly marked up.
    pub content: String,
    /// Binomial name, for species entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scientific_name: Option<String>,
    /// IUCN status, for species entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ConservationStatus>,
    /// Where it occurs.
    #[serde(default)]
    pub biomes: Vec<Biome>,
    /// Free-form search keywords.
    #[serde(default)]
    pub tags: Vec<String>,
}

impl LibraryItem {
    /// Case-insensitive substring match. `needle` must already be lowercase.
    fn matches(&self, needle: &str) -> bool {
        let hit = |text: &str| text.to_lowercase().contains(needle);
        hit(&self.title)
            || hit(&self.description)
            || hit(&self.content)
            || self.tags.iter().any(|t| hit(t.as_str()))
            || self.scientific_name.as_deref().is_some_and(hit)
    }
}

/// Entry counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LibraryStats {
    /// Total entries.
    pub total: usize,
    /// Entries per category; categories without entries are omitted.
    pub categories: BTreeMap<Category, usize>,
}

/// Indexed, read-only collection of [`LibraryItem`]s.
#[derive(Debug, Clone)]
pub struct Library {
    items: Vec<LibraryItem>,
    by_id: HashMap<String, usize>,
    by_category: HashMap<Category, Vec<usize>>,
}

impl Library {
    /// The library bundled with this build.
    ///
    /// # Errors
    ///
    /// Returns an error if the bundled data is malformed.
    pub fn builtin() -> Result<Self> {
        Self::from_json(BUILTIN_LIBRARY)
    }

    /// Parse a library from a JSON array of entries.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is invalid or two entries share an id.
    pub fn from_json(json: &str) -> Result<Self> {
        let items: Vec<LibraryItem> = serde_json::from_str(json)?;
        Self::new(items)
    }

    /// Build the indexes over `items`.
    ///
    /// # Errors
    ///
    /// Returns an error if two entries share an id.
    pub fn new(items: Vec<LibraryItem>) -> Result<Self> {
        let mut by_id = HashMap::with_capacity(items.len());
        let mut by_category: HashMap<Category, Vec<usize>> = HashMap::new();

        for (idx, item) in items.iter().enumerate() {
            if by_id.insert(item.id.clone(), idx).is_some() {
                return Err(Error::Library(format!("duplicate entry id '{}'", item.id)));
            }
            by_category.entry(item.category).or_default().push(idx);
        }

        debug!(entries = items.len(), "Library indexed");
        Ok(Self {
            items,
            by_id,
            by_category,
        })
    }

    /// Every entry.
    #[must_use]
    pub fn items(&self) -> &[LibraryItem] {
        &self.items
    }

    /// Look up an entry by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&LibraryItem> {
        self.by_id.get(id).map(|&idx| &self.items[idx])
    }

    /// Entries whose text contains `query`, ignoring case.
    ///
    /// An empty query returns everything.
    #[must_use]
    pub fn search(&self, query: &str) -> Vec<&LibraryItem> {
        self.search_in(CategoryFilter::All, query)
    }

    /// Entries in a category, or all of them.
    #[must_use]
    pub fn filter_by_category(&self, filter: CategoryFilter) -> Vec<&LibraryItem> {
        self.search_in(filter, "")
    }

    /// Search restricted to a category.
    #[must_use]
    pub fn search_in(&self, filter: CategoryFilter, query: &str) -> Vec<&LibraryItem> {
        let needle = query.trim().to_lowercase();
        let keep = |item: &&LibraryItem| needle.is_empty() || item.matches(&needle);

        match filter {
            CategoryFilter::All => self.items.iter().filter(keep).collect(),
            CategoryFilter::Only(category) => self
                .by_category
                .get(&category)
                .map(|idxs| idxs.iter().map(|&i| &self.items[i]).filter(keep).collect())
                .unwrap_or_default(),
        }
    }

    /// Entry counts.
    #[must_use]
    pub fn stats(&self) -> LibraryStats {
        LibraryStats {
            total: self.items.len(),
            categories: self
                .by_category
                .iter()
                .map(|(&category, idxs)| (category, idxs.len()))
                .collect(),
        }
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the library has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
