use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// The flattened view of a group's configured dictionary paths.
///
/// `dict_all_paths` and `folder_idx` are parallel; each `folder_idx` entry
/// points back at the configured path the dictionary was expanded from, and
/// doubles as an index into `folder_paths` for the static mount that serves
/// the dictionary's sibling assets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedDictionarySet {
    pub dict_all_paths: Vec<PathBuf>,
    pub folder_idx: Vec<usize>,
    pub folder_paths: Vec<PathBuf>,
}

impl ResolvedDictionarySet {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.dict_all_paths.is_empty()
    }

    /// Folder index for a concrete dictionary file, by positional lookup.
    pub fn folder_index_of(&self, dict_path: &Path) -> Option<usize> {
        self.dict_all_paths
            .iter()
            .position(|path| path == dict_path)
            .and_then(|position| self.folder_idx.get(position).copied())
    }
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("configured path #{index} does not exist: {path}")]
    InvalidPath { index: usize, path: String },
    #[error("configured path #{index} is not an mdx/mdd file: {path}")]
    NotADictionaryFile { index: usize, path: String },
    #[error("failed to list directory {path}")]
    ReadDir {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("No dictionary exists")]
    EmptyDictionarySet,
}

pub fn is_dictionary_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some(ext) if ext.eq_ignore_ascii_case("mdx") || ext.eq_ignore_ascii_case("mdd")
    )
}

/// Expands configured files/folders into a [`ResolvedDictionarySet`].
///
/// Any invalid entry fails the whole resolution; callers keep whatever set
/// they resolved previously rather than applying a partial one. Children of
/// a folder are taken in filesystem-enumeration order, which is not stable
/// across platforms.
pub fn resolve(configured_paths: &[String]) -> Result<ResolvedDictionarySet, ResolveError> {
    let mut set = ResolvedDictionarySet::default();
    for (index, configured) in configured_paths.iter().enumerate() {
        let path = Path::new(configured);
        let metadata = fs::metadata(path).map_err(|_| ResolveError::InvalidPath {
            index,
            path: configured.clone(),
        })?;
        if metadata.is_dir() {
            set.folder_paths.push(path.to_path_buf());
            let entries = fs::read_dir(path).map_err(|source| ResolveError::ReadDir {
                path: configured.clone(),
                source,
            })?;
            for entry in entries {
                let entry = entry.map_err(|source| ResolveError::ReadDir {
                    path: configured.clone(),
                    source,
                })?;
                let child = entry.path();
                if child.is_file() && is_dictionary_file(&child) {
                    set.dict_all_paths.push(child);
                    set.folder_idx.push(index);
                }
            }
        } else {
            if !is_dictionary_file(path) {
                return Err(ResolveError::NotADictionaryFile {
                    index,
                    path: configured.clone(),
                });
            }
            let parent = path
                .parent()
                .filter(|parent| !parent.as_os_str().is_empty())
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("."));
            set.folder_paths.push(parent);
            set.dict_all_paths.push(path.to_path_buf());
            set.folder_idx.push(index);
        }
    }
    if set.dict_all_paths.is_empty() {
        return Err(ResolveError::EmptyDictionarySet);
    }
    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        File::create(&path).expect("create fixture file");
        path
    }

    #[test]
    fn folder_entries_expand_to_dictionary_children() {
        let dir = tempfile::tempdir().expect("tempdir");
        touch(dir.path(), "a.mdx");
        touch(dir.path(), "b.MDD");
        touch(dir.path(), "notes.txt");

        let configured = vec![dir.path().display().to_string()];
        let set = resolve(&configured).expect("resolution succeeds");

        assert_eq!(set.dict_all_paths.len(), 2);
        assert_eq!(set.dict_all_paths.len(), set.folder_idx.len());
        assert!(set.folder_idx.iter().all(|&idx| idx < configured.len()));
        assert_eq!(set.folder_paths, vec![dir.path().to_path_buf()]);
    }

    #[test]
    fn file_entry_contributes_itself_and_its_parent_folder() {
        let dir = tempfile::tempdir().expect("tempdir");
        let dict = touch(dir.path(), "solo.mdx");

        let configured = vec![dict.display().to_string()];
        let set = resolve(&configured).expect("resolution succeeds");

        assert_eq!(set.dict_all_paths, vec![dict.clone()]);
        assert_eq!(set.folder_idx, vec![0]);
        assert_eq!(set.folder_paths, vec![dir.path().to_path_buf()]);
        assert_eq!(set.folder_index_of(&dict), Some(0));
    }

    #[test]
    fn mixed_entries_keep_folder_indices_aligned() {
        let folder = tempfile::tempdir().expect("tempdir");
        touch(folder.path(), "one.mdx");
        touch(folder.path(), "two.mdx");
        let other = tempfile::tempdir().expect("tempdir");
        let standalone = touch(other.path(), "three.mdd");

        let configured = vec![
            folder.path().display().to_string(),
            standalone.display().to_string(),
        ];
        let set = resolve(&configured).expect("resolution succeeds");

        assert_eq!(set.dict_all_paths.len(), 3);
        assert_eq!(set.folder_paths.len(), 2);
        assert_eq!(set.folder_index_of(&standalone), Some(1));
        for (path, &idx) in set.dict_all_paths.iter().zip(&set.folder_idx) {
            assert_eq!(path.parent(), Some(set.folder_paths[idx].as_path()));
        }
    }

    #[test]
    fn missing_path_fails_with_its_index() {
        let dir = tempfile::tempdir().expect("tempdir");
        touch(dir.path(), "a.mdx");
        let configured = vec![
            dir.path().display().to_string(),
            "/definitely/not/here".to_string(),
        ];
        match resolve(&configured) {
            Err(ResolveError::InvalidPath { index, .. }) => assert_eq!(index, 1),
            other => panic!("expected InvalidPath, got {other:?}"),
        }
    }

    #[test]
    fn non_dictionary_file_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        let stray = touch(dir.path(), "stray.txt");
        match resolve(&[stray.display().to_string()]) {
            Err(ResolveError::NotADictionaryFile { index: 0, .. }) => {}
            other => panic!("expected NotADictionaryFile, got {other:?}"),
        }
    }

    #[test]
    fn folder_without_dictionaries_fails_as_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        touch(dir.path(), "readme.md");
        match resolve(&[dir.path().display().to_string()]) {
            Err(ResolveError::EmptyDictionarySet) => {}
            other => panic!("expected EmptyDictionarySet, got {other:?}"),
        }
    }

    #[test]
    fn no_configured_paths_fails_as_empty() {
        assert!(matches!(
            resolve(&[]),
            Err(ResolveError::EmptyDictionarySet)
        ));
    }
}
