//! Repository tree walk.

use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use ignore::WalkBuilder;

use crate::config::SchedulerConfig;
use crate::models::FileMeta;

/// A regular file found under the project root
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WalkedFile {
    /// `/`-separated path relative to the root
    pub path: String,
    pub abs_path: PathBuf,
    pub meta: FileMeta,
}

/// Files under `root`, sorted by relative path, plus per-entry errors.
///
/// Ignore files are honoured, hidden entries skipped unless configured,
/// and anything below `exclude` (the index directory) left out.
pub fn walk(
    root: &Path,
    exclude: Option<&Path>,
    config: &SchedulerConfig,
) -> (Vec<WalkedFile>, Vec<(String, String)>) {
    let root = &root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
    let exclude = exclude.map(|p| p.canonicalize().unwrap_or_else(|_| p.to_path_buf()));
    let mut builder = WalkBuilder::new(root);
    builder
        .hidden(!config.include_hidden)
        .git_ignore(true)
        .require_git(false)
        .follow_links(false)
        .sort_by_file_name(|a, b| a.cmp(b));
    if let Some(exclude) = exclude.clone() {
        builder.filter_entry(move |entry| !entry.path().starts_with(&exclude));
    }

    let mut files = Vec::new();
    let mut errors = Vec::new();
    for entry in builder.build() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                errors.push((String::new(), e.to_string()));
                continue;
            }
        };
        if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
            continue;
        }
        let Some(path) = relative_path(root, entry.path()) else {
            continue;
        };
        match entry.metadata() {
            Ok(metadata) => {
                let mtime_ms = metadata
                    .modified()
                    .ok()
                    .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                    .map(|d| d.as_millis() as u64)
                    .unwrap_or(0);
                files.push(WalkedFile {
                    path,
                    abs_path: entry.path().to_path_buf(),
                    meta: FileMeta {
                        size: metadata.len(),
                        mtime_ms,
                    },
                });
            }
            Err(e) => errors.push((path, e.to_string())),
        }
    }
    files.sort_by(|a, b| a.path.cmp(&b.path));
    (files, errors)
}

fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_walk_skips_hidden_ignored_and_index_dir() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("src")).unwrap();
        fs::create_dir_all(root.join(".hidden")).unwrap();
        fs::create_dir_all(root.join(".sourcedex")).unwrap();
        fs::create_dir_all(root.join("target")).unwrap();
        fs::write(root.join("src/b.c"), "int b;").unwrap();
        fs::write(root.join("a.c"), "int a;").unwrap();
        fs::write(root.join(".hidden/x.c"), "int x;").unwrap();
        fs::write(root.join(".sourcedex/manifest.json"), "{}").unwrap();
        fs::write(root.join("target/out.c"), "int o;").unwrap();
        fs::write(root.join(".gitignore"), "target/\n").unwrap();

        let config = SchedulerConfig::default();
        let (files, errors) = walk(root, Some(&root.join(".sourcedex")), &config);
        let paths: Vec<_> = files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["a.c", "src/b.c"]);
        assert!(errors.is_empty());
        assert_eq!(files[0].meta.size, 6);
    }

    #[test]
    fn test_visible_index_dir_excluded() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("idx")).unwrap();
        fs::write(root.join("idx/manifest.json"), "{}").unwrap();
        fs::write(root.join("main.c"), "").unwrap();

        let (files, _) = walk(root, Some(&root.join("idx")), &SchedulerConfig::default());
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, "main.c");
    }
}
