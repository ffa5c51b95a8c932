use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::Configuration;
use crate::error::{ErrorKind, SyncResult};
use crate::split::{Splitter, check_advice_number};
use crate::{bail, sync_error};

/// Splits a list of source files into contiguous groups of `ceil(files / slices)` files.
///
/// Files are selected through the `path` setting, a string or a list of strings. A path is either
/// a file, a directory walked recursively or a pattern where `*` matches any sequence of
/// characters and `?` at most one. The selected files of each slice are written to
/// `source_files`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileListSplitter;

impl Splitter for FileListSplitter {
    fn split(
        &self,
        config: &Configuration,
        advice_number: usize,
    ) -> SyncResult<Vec<Configuration>> {
        check_advice_number(advice_number)?;

        let Some(patterns) = config.get_string_list("path") else {
            bail!(ErrorKind::ConfigError, "Missing required path setting", "path");
        };

        let mut files = BTreeSet::new();
        for pattern in &patterns {
            files.extend(resolve_path(pattern)?);
        }
        if files.is_empty() {
            bail!(
                ErrorKind::NoSplitUnits,
                "No source file matches the configured paths",
                patterns.join(", ")
            );
        }

        let files: Vec<String> = files
            .into_iter()
            .map(|file| file.to_string_lossy().into_owned())
            .collect();

        debug!(files = files.len(), advice_number, "split source files");

        let mut slices = Vec::new();
        for chunk in contiguous_chunks(&files, advice_number) {
            let mut slice = config.clone();
            slice.set(
                "source_files",
                Value::Array(chunk.iter().cloned().map(Value::String).collect()),
            )?;
            slices.push(slice);
        }

        Ok(slices)
    }
}

/// Cuts `items` into contiguous chunks of `ceil(len / parts)` items, the last chunk taking the
/// remainder. Yields fewer than `parts` chunks when the items run out early.
pub fn contiguous_chunks<T>(items: &[T], parts: usize) -> Vec<&[T]> {
    if items.is_empty() || parts == 0 {
        return Vec::new();
    }

    items.chunks(items.len().div_ceil(parts)).collect()
}

fn resolve_path(pattern: &str) -> SyncResult<Vec<PathBuf>> {
    let Some(wildcard) = pattern.find(['*', '?']) else {
        let path = Path::new(pattern);
        if path.is_dir() {
            let mut files = Vec::new();
            walk(path, &mut files)?;
            return Ok(files);
        }
        if path.is_file() {
            return Ok(vec![path.to_path_buf()]);
        }

        warn!(path = pattern, "source path does not exist");
        return Ok(Vec::new());
    };

    let parent = match pattern[..wildcard].rfind('/') {
        Some(0) => "/",
        Some(slash) => &pattern[..slash],
        None => ".",
    };
    let matcher = glob_to_regex(pattern)?;

    let root = Path::new(parent);
    if !root.is_dir() {
        warn!(path = pattern, parent, "parent directory of source pattern does not exist");
        return Ok(Vec::new());
    }

    let mut candidates = Vec::new();
    walk(root, &mut candidates)?;

    // Relative patterns are matched without the leading "./" the walk adds.
    let relative = parent == ".";
    Ok(candidates
        .into_iter()
        .filter(|candidate| {
            let candidate = candidate.to_string_lossy();
            let candidate = match candidate.strip_prefix("./") {
                Some(stripped) if relative => stripped,
                _ => candidate.as_ref(),
            };
            matcher.is_match(candidate)
        })
        .collect())
}

fn glob_to_regex(pattern: &str) -> SyncResult<Regex> {
    let mut expression = String::with_capacity(pattern.len() + 8);
    expression.push('^');

    let mut literal = String::new();
    for c in pattern.chars() {
        match c {
            '*' | '?' => {
                expression.push_str(&regex::escape(&literal));
                literal.clear();
                expression.push_str(if c == '*' { ".*" } else { ".?" });
            }
            _ => literal.push(c),
        }
    }
    expression.push_str(&regex::escape(&literal));
    expression.push('$');

    Regex::new(&expression).map_err(|err| {
        sync_error!(
            ErrorKind::InvalidSplitConfig,
            "Invalid source path pattern",
            format!("{pattern}: {err}")
        )
    })
}

fn walk(dir: &Path, files: &mut Vec<PathBuf>) -> SyncResult<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        // Symlinked directories are not followed, a link cycle would never end.
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            walk(&entry.path(), files)?;
        } else if file_type.is_file() || (file_type.is_symlink() && entry.path().is_file()) {
            files.push(entry.path());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs::File;

    use serde_json::json;
    use tempfile::TempDir;

    use super::*;

    fn touch(dir: &Path, name: &str) {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        File::create(path).unwrap();
    }

    fn source_files(slice: &Configuration) -> Vec<String> {
        slice.get_string_list("source_files").unwrap()
    }

    #[test]
    fn chunks_are_contiguous_with_the_remainder_last() {
        let items: Vec<u32> = (0..10).collect();

        let sizes: Vec<_> = contiguous_chunks(&items, 3).iter().map(|c| c.len()).collect();
        assert_eq!(sizes, vec![4, 4, 2]);
        let sizes: Vec<_> = contiguous_chunks(&items, 4).iter().map(|c| c.len()).collect();
        assert_eq!(sizes, vec![3, 3, 3, 1]);
        assert_eq!(contiguous_chunks(&items[..9], 4).len(), 3);

        let flattened: Vec<u32> = contiguous_chunks(&items, 3).concat();
        assert_eq!(flattened, items);

        assert_eq!(contiguous_chunks(&items[..2], 5).len(), 2);
        assert!(contiguous_chunks::<u32>(&[], 3).is_empty());
    }

    #[test]
    fn splits_a_directory_into_contiguous_slices() {
        let dir = TempDir::new().unwrap();
        for i in 0..10 {
            touch(dir.path(), &format!("part-{i:02}.csv"));
        }
        let config = Configuration::from_value(json!({
            "path": dir.path().to_string_lossy(),
            "encoding": "utf-8"
        }));

        let slices = FileListSplitter.split(&config, 3).unwrap();

        let sizes: Vec<_> = slices.iter().map(|s| source_files(s).len()).collect();
        assert_eq!(sizes, vec![4, 4, 2]);

        let all: Vec<String> = slices.iter().flat_map(source_files).collect();
        let mut sorted = all.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(all, sorted);
        assert!(all[0].ends_with("part-00.csv"));
        assert!(slices.iter().all(|s| s.get_string("encoding").as_deref() == Some("utf-8")));
    }

    #[test]
    fn wildcards_select_matching_files() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "a.csv");
        touch(dir.path(), "b.csv");
        touch(dir.path(), "notes.txt");
        touch(dir.path(), "nested/c.csv");

        let pattern = format!("{}/*.csv", dir.path().to_string_lossy());
        let config = Configuration::from_value(json!({"path": [pattern]}));

        let slices = FileListSplitter.split(&config, 5).unwrap();
        let files: Vec<String> = slices.iter().flat_map(source_files).collect();

        assert_eq!(slices.len(), 3);
        assert_eq!(files.len(), 3);
        assert!(files.iter().all(|file| file.ends_with(".csv")));
        assert!(files.iter().any(|file| file.ends_with("nested/c.csv")));
    }

    #[test]
    fn overlapping_paths_are_deduplicated() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "data.json");
        let base = dir.path().to_string_lossy().into_owned();

        let config = Configuration::from_value(json!({
            "path": [format!("{base}/data.json"), format!("{base}/data.js?n"), base]
        }));

        let slices = FileListSplitter.split(&config, 2).unwrap();
        assert_eq!(slices.len(), 1);
        assert_eq!(source_files(&slices[0]).len(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_directories_are_not_followed() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "nested/data.csv");
        std::os::unix::fs::symlink(dir.path(), dir.path().join("nested/loop")).unwrap();
        std::os::unix::fs::symlink(
            dir.path().join("nested/data.csv"),
            dir.path().join("linked.csv"),
        )
        .unwrap();

        let config = Configuration::from_value(json!({"path": dir.path().to_string_lossy()}));
        let slices = FileListSplitter.split(&config, 2).unwrap();

        let files: Vec<String> = slices.iter().flat_map(source_files).collect();
        assert_eq!(files.len(), 2);
        assert!(files.iter().any(|file| file.ends_with("linked.csv")));
        assert!(files.iter().all(|file| !file.contains("loop")));
    }

    #[test]
    fn no_matching_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "a.txt");

        let pattern = format!("{}/*.csv", dir.path().to_string_lossy());
        let config = Configuration::from_value(json!({"path": pattern}));

        let err = FileListSplitter.split(&config, 2).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoSplitUnits);

        let err = FileListSplitter
            .split(&Configuration::new(), 2)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigError);
    }
}
