use std::{collections::HashMap, io, path::Path};
use tracing::{info, warn};

use crate::error::AppError;

/// Known phishing URL -> legitimate site to suggest instead.
///
/// Keys are matched verbatim; no normalisation of case or trailing slashes.
#[derive(Debug, Clone, Default)]
pub struct SuggestionMap {
    entries: HashMap<String, String>,
}

impl SuggestionMap {
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self { entries: pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect() }
    }

    /// Loads the mapping, degrading to an empty map when the file is missing
    /// or unreadable.
    pub fn load(path: &Path) -> Self {
        match Self::try_load(path) {
            Ok(map) => {
                info!("Mapping file loaded: {} entries", map.len());
                map
            }
            Err(AppError::MappingMissing(p)) => {
                warn!("The mapping file '{}' was not found, no suggestions available", p.display());
                Self::default()
            }
            Err(e) => {
                warn!("An error occurred while loading the mapping file: {}", e);
                Self::default()
            }
        }
    }

    pub fn try_load(path: &Path) -> Result<Self, AppError> {
        if !path.exists() {
            return Err(AppError::MappingMissing(path.to_path_buf()));
        }
        Self::from_reader(std::fs::File::open(path)?)
    }

    /// Headerless CSV: column 0 is the phishing URL, column 1 the suggestion.
    /// Rows with fewer than two non-empty cells are skipped; later rows win.
    pub fn from_reader<R: io::Read>(reader: R) -> Result<Self, AppError> {
        let mut csv = csv::ReaderBuilder::new().has_headers(false).flexible(true).from_reader(reader);
        let mut entries = HashMap::new();
        for record in csv.records() {
            let record = record?;
            match (record.get(0), record.get(1)) {
                (Some(phishing), Some(legit)) if !phishing.is_empty() && !legit.is_empty() => {
                    entries.insert(phishing.to_string(), legit.to_string());
                }
                _ => continue,
            }
        }
        Ok(Self { entries })
    }

    pub fn suggest(&self, url: &str) -> Option<&str> {
        self.entries.get(url).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
