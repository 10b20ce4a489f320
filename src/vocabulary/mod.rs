//! Controlled vocabulary of canonical card names
//!
//! Loaded once at startup from a newline-delimited text file and shared
//! read-only between all identification requests.

use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::error::VocabularyLoadError;

/// Names used when the vocabulary file cannot be loaded
const SEED_NAMES: &[&str] = &[
    "Bulbasaur",
    "Ivysaur",
    "Venusaur",
    "Charmander",
    "Charmeleon",
    "Charizard",
    "Squirtle",
    "Wartortle",
    "Blastoise",
    "Pikachu",
    "Raichu",
    "Jigglypuff",
    "Meowth",
    "Psyduck",
    "Gengar",
    "Eevee",
    "Snorlax",
    "Mewtwo",
    "Mew",
    "Lucario",
];

/// A canonical name stored alongside its normalized form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VocabularyEntry {
    /// Display form, case preserved as written in the source
    pub canonical: String,
    /// Matching form (see [`normalize`])
    pub normalized: String,
}

/// Immutable set of canonical names
///
/// Entries keep their insertion order, which decides ties during matching.
#[derive(Debug, Clone, Default)]
pub struct Vocabulary {
    entries: Vec<VocabularyEntry>,
    /// normalized form -> index into `entries`
    index: HashMap<String, usize>,
}

impl Vocabulary {
    /// Build a vocabulary from canonical names, skipping blanks and
    /// normalized duplicates (the first occurrence wins)
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut vocabulary = Self::default();
        for name in names {
            vocabulary.insert(name.as_ref());
        }
        vocabulary
    }

    /// Parse the newline-delimited source format
    ///
    /// Blank lines and lines starting with `#` are ignored.
    pub fn parse(content: &str) -> Self {
        Self::from_names(
            content
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && !line.starts_with('#')),
        )
    }

    /// Load a vocabulary file
    pub fn load(path: &Path) -> Result<Self, VocabularyLoadError> {
        let content =
            std::fs::read_to_string(path).map_err(|source| VocabularyLoadError::Unreadable {
                path: path.to_path_buf(),
                source,
            })?;

        let vocabulary = Self::parse(&content);
        if vocabulary.is_empty() {
            return Err(VocabularyLoadError::Empty {
                path: path.to_path_buf(),
            });
        }

        info!("Loaded {} vocabulary entries from {:?}", vocabulary.len(), path);
        Ok(vocabulary)
    }

    /// Load a vocabulary file, degrading to the built-in seed list on failure
    pub fn load_or_seed(path: Option<&Path>) -> Self {
        match path {
            Some(path) => match Self::load(path) {
                Ok(vocabulary) => vocabulary,
                Err(e) => {
                    warn!("{}; falling back to built-in seed vocabulary", e);
                    Self::seed()
                }
            },
            None => {
                info!("No vocabulary file configured, using built-in seed vocabulary");
                Self::seed()
            }
        }
    }

    /// The built-in seed vocabulary
    pub fn seed() -> Self {
        Self::from_names(SEED_NAMES)
    }

    fn insert(&mut self, name: &str) {
        let canonical = name.trim();
        let normalized = normalize(canonical);
        if normalized.is_empty() || self.index.contains_key(&normalized) {
            return;
        }

        self.index.insert(normalized.clone(), self.entries.len());
        self.entries.push(VocabularyEntry {
            canonical: canonical.to_string(),
            normalized,
        });
    }

    /// Entries in insertion order
    pub fn entries(&self) -> &[VocabularyEntry] {
        &self.entries
    }

    /// Canonical name for an already-normalized form, if present
    pub fn lookup(&self, normalized: &str) -> Option<&str> {
        self.index
            .get(normalized)
            .map(|&i| self.entries[i].canonical.as_str())
    }

    /// Whether `name` is one of the canonical display names
    pub fn contains_canonical(&self, name: &str) -> bool {
        self.lookup(&normalize(name)) == Some(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Remove diacritics by decomposing and dropping combining marks
pub fn strip_diacritics(text: &str) -> String {
    text.nfd().filter(|c| !is_combining_mark(*c)).collect()
}

/// Normalized matching form of `text`
///
/// Diacritics are stripped and the text lower-cased; every run of
/// characters outside `[a-z0-9-]` becomes a single space, and the result
/// is trimmed.
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;

    for c in strip_diacritics(&text.to_lowercase()).chars() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.push(c);
        } else {
            pending_space = true;
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("Pikachu"), "pikachu");
        assert_eq!(normalize("  PÏKÂCHU  "), "pikachu");
        assert_eq!(normalize("Mr. Mime"), "mr mime");
        assert_eq!(normalize("Ho-Oh"), "ho-oh");
        assert_eq!(normalize("Farfetch'd"), "farfetch d");
        assert_eq!(normalize("Flabébé\t\tex"), "flabebe ex");
        assert_eq!(normalize("!!!"), "");
    }

    #[test]
    fn test_strip_diacritics() {
        assert_eq!(strip_diacritics("Pokémon Básico"), "Pokemon Basico");
        assert_eq!(strip_diacritics("plain"), "plain");
    }

    #[test]
    fn test_parse_ignores_comments_and_blanks() {
        let vocabulary = Vocabulary::parse("# starters\nBulbasaur\n\n  Charmander  \n#Squirtle\nPikachu\n");
        let names: Vec<&str> = vocabulary
            .entries()
            .iter()
            .map(|e| e.canonical.as_str())
            .collect();
        assert_eq!(names, vec!["Bulbasaur", "Charmander", "Pikachu"]);
    }

    #[test]
    fn test_duplicates_keep_first() {
        let vocabulary = Vocabulary::from_names(["Eevee", "EEVEE", "Évee", "Éevée"]);
        assert_eq!(vocabulary.len(), 2);
        assert_eq!(vocabulary.lookup("eevee"), Some("Eevee"));
        assert_eq!(vocabulary.lookup("evee"), Some("Évee"));
    }

    #[test]
    fn test_contains_canonical() {
        let vocabulary = Vocabulary::from_names(["Squirtle"]);
        assert!(vocabulary.contains_canonical("Squirtle"));
        assert!(!vocabulary.contains_canonical("squirtle"));
        assert!(!vocabulary.contains_canonical("Unknown"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "# vocabulary").unwrap();
        writeln!(file, "Squirtle").unwrap();
        writeln!(file, "Charizard").unwrap();

        let vocabulary = Vocabulary::load(file.path()).unwrap();
        assert_eq!(vocabulary.len(), 2);
        assert_eq!(vocabulary.lookup("charizard"), Some("Charizard"));
    }

    #[test]
    fn test_load_missing_file() {
        let result = Vocabulary::load(Path::new("/nonexistent/vocabulary.txt"));
        assert!(matches!(result, Err(VocabularyLoadError::Unreadable { .. })));
    }

    #[test]
    fn test_load_empty_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "# nothing here").unwrap();

        let result = Vocabulary::load(file.path());
        assert!(matches!(result, Err(VocabularyLoadError::Empty { .. })));
    }

    #[test]
    fn test_load_or_seed_degrades() {
        let vocabulary = Vocabulary::load_or_seed(Some(Path::new("/nonexistent/vocabulary.txt")));
        assert_eq!(vocabulary.len(), SEED_NAMES.len());
        assert!(vocabulary.contains_canonical("Pikachu"));

        let vocabulary = Vocabulary::load_or_seed(None);
        assert!(!vocabulary.is_empty());
    }
}
