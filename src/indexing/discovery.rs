use crate::core::error::{Error, Result};
use ignore::WalkBuilder;
use std::path::{Path, PathBuf};
use tracing::warn;

/// A discovered journal file
#[derive(Debug, Clone)]
pub struct DiscoveredFile {
    pub path: PathBuf,
    pub relative_path: PathBuf,
}

/// Discover all journal files in a directory, respecting .gitignore rules
pub fn discover_files(root: &Path) -> Result<Vec<DiscoveredFile>> {
    if !root.exists() {
        return Err(Error::Config(format!(
            "Directory does not exist: {}",
            root.display()
        )));
    }

    if !root.is_dir() {
        return Err(Error::Config(format!(
            "Path is not a directory: {}",
            root.display()
        )));
    }

    let mut files = Vec::new();

    let walker = WalkBuilder::new(root)
        .hidden(false)
        .git_ignore(true)
        .git_exclude(true)
        .build();

    for result in walker {
        match result {
            Ok(entry) => {
                let path = entry.path();
                if path.is_dir() || !is_journal_file(path) {
                    continue;
                }

                let relative_path = path
                    .strip_prefix(root)
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|_| path.to_path_buf());

                files.push(DiscoveredFile {
                    path: path.to_path_buf(),
                    relative_path,
                });
            }
            Err(err) => {
                // Some files might be inaccessible; keep walking
                warn!("failed to access file during walk: {}", err);
            }
        }
    }

    files.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(files)
}

/// Check if a file is a journal file based on extension
pub fn is_journal_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| matches!(ext.to_lowercase().as_str(), "md" | "markdown"))
        .unwrap_or(false)
}
