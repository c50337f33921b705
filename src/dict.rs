use std::path::Path;

use rust_mdict::Mdx;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DictError {
    #[error("failed to open dictionary {path}: {message}")]
    Open { path: String, message: String },
}

/// The dictionary-reading capability. A word that is simply absent is
/// `Ok(None)`; errors are reserved for unreadable dictionary files.
pub trait DictionaryReader: Send + Sync {
    fn lookup(&self, word: &str, dictionary: &Path) -> Result<Option<String>, DictError>;
}

/// MDX/MDD-backed reader. Opens the dictionary anew on every call, matching
/// the one-reader-per-lookup reference behavior; a caching implementation
/// can sit behind the same trait without observable change.
#[derive(Debug, Default)]
pub struct MdictReader;

impl DictionaryReader for MdictReader {
    fn lookup(&self, word: &str, dictionary: &Path) -> Result<Option<String>, DictError> {
        let mut dict = Mdx::new(dictionary).map_err(|err| DictError::Open {
            path: dictionary.display().to_string(),
            message: err.to_string(),
        })?;
        Ok(dict.lookup(word).map(|entry| entry.definition))
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// In-memory reader for tests: definitions keyed by (dictionary, word),
    /// with a call counter so tests can assert lookup counts.
    #[derive(Default)]
    pub struct FakeReader {
        entries: HashMap<(PathBuf, String), String>,
        pub calls: AtomicUsize,
    }

    impl FakeReader {
        pub fn with_entry(mut self, dictionary: impl Into<PathBuf>, word: &str, html: &str) -> Self {
            self.entries
                .insert((dictionary.into(), word.to_string()), html.to_string());
            self
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl DictionaryReader for FakeReader {
        fn lookup(&self, word: &str, dictionary: &Path) -> Result<Option<String>, DictError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .entries
                .get(&(dictionary.to_path_buf(), word.to_string()))
                .cloned())
        }
    }
}
