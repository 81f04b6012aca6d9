//! Canonical country reference list.

use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{HumdataError, Result};
use crate::report::WORLD_KEY;

/// One canonical country.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalCountry {
    /// Canonical code used as the join key (e.g. ISO 3166-1 alpha-3).
    pub code: String,
    /// Canonical display name.
    pub name: String,
    /// Other known spellings.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
}

impl CanonicalCountry {
    pub fn new(code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            aliases: Vec::new(),
        }
    }

    pub fn with_aliases(mut self, aliases: &[&str]) -> Self {
        self.aliases = aliases.iter().map(|a| a.to_string()).collect();
        self
    }

    /// Code, name and aliases, in that order.
    pub fn spellings(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.code.as_str())
            .chain(std::iter::once(self.name.as_str()))
            .chain(self.aliases.iter().map(String::as_str))
    }
}

/// Row shape of a countries CSV file.
#[derive(Debug, Deserialize)]
struct CountryRow {
    code: String,
    name: String,
    #[serde(default)]
    aliases: String,
}

/// The stable, ordered list of canonical countries.
///
/// Enumeration order is declaration order; the reconciler breaks ties by it.
#[derive(Debug, Clone, Default)]
pub struct CountryRegistry {
    countries: Vec<CanonicalCountry>,
    by_code: IndexMap<String, usize>,
}

impl CountryRegistry {
    /// Build a registry, rejecting empty or duplicate codes and the code
    /// reserved for the WORLD entry.
    pub fn new(countries: Vec<CanonicalCountry>) -> Result<Self> {
        let mut by_code = IndexMap::with_capacity(countries.len());
        for (index, country) in countries.iter().enumerate() {
            let code = country.code.trim().to_uppercase();
            if code.is_empty() {
                return Err(HumdataError::Config(format!(
                    "country '{}' has an empty code",
                    country.name
                )));
            }
            if code == WORLD_KEY {
                return Err(HumdataError::Config(format!(
                    "country '{}' uses the reserved code '{}'",
                    country.name, WORLD_KEY
                )));
            }
            if by_code.insert(code, index).is_some() {
                return Err(HumdataError::Config(format!(
                    "duplicate country code '{}'",
                    country.code
                )));
            }
        }
        Ok(Self { countries, by_code })
    }

    /// Load from a CSV with `code,name,aliases` columns; aliases are
    /// separated by `;`.
    pub fn from_csv(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(path)
            .map_err(|e| match e.into_kind() {
                csv::ErrorKind::Io(source) => HumdataError::io(path, source),
                other => HumdataError::Config(format!("{}: {:?}", path.display(), other)),
            })?;

        let mut countries = Vec::new();
        for row in reader.deserialize::<CountryRow>() {
            let row = row?;
            let aliases = row
                .aliases
                .split(';')
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .map(String::from)
                .collect();
            countries.push(CanonicalCountry {
                code: row.code,
                name: row.name,
                aliases,
            });
        }
        Self::new(countries)
    }

    /// Exact, case-insensitive lookup by canonical code.
    pub fn by_code(&self, code: &str) -> Option<&CanonicalCountry> {
        self.by_code
            .get(&code.trim().to_uppercase())
            .map(|&index| &self.countries[index])
    }

    pub fn get(&self, index: usize) -> Option<&CanonicalCountry> {
        self.countries.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CanonicalCountry> {
        self.countries.iter()
    }

    pub fn len(&self) -> usize {
        self.countries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.countries.is_empty()
    }
}
