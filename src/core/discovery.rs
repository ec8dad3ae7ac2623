use std::path::{Path, PathBuf};
use ignore::WalkBuilder;

/// Collects the directories a monitor should scan.
pub struct DirectoryDiscovery {
    root_path: PathBuf,
    recursive: bool,
}

impl DirectoryDiscovery {
    pub fn new<P: AsRef<Path>>(root_path: P, recursive: bool) -> Self {
        Self {
            root_path: root_path.as_ref().to_path_buf(),
            recursive,
        }
    }

    /// The root, followed by every non-hidden directory below it when
    /// recursive. Hidden directories are pruned along with their subtrees.
    pub fn discover(&self) -> Vec<PathBuf> {
        if !self.recursive {
            return vec![self.root_path.clone()];
        }

        let mut directories = Vec::new();

        // Only hidden entries are skipped; ignore files play no part here.
        let walker = WalkBuilder::new(&self.root_path)
            .hidden(true)
            .git_ignore(false)
            .git_global(false)
            .git_exclude(false)
            .ignore(false)
            .parents(false)
            .follow_links(false)
            .sort_by_file_path(|a, b| a.cmp(b))
            .build();

        for result in walker {
            match result {
                Ok(entry) => {
                    if entry.file_type().map_or(false, |ft| ft.is_dir()) {
                        directories.push(entry.into_path());
                    }
                }
                Err(err) => {
                    tracing::warn!("Error walking directory: {}", err);
                }
            }
        }

        if directories.first() != Some(&self.root_path) {
            directories.insert(0, self.root_path.clone());
        }

        directories
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_non_recursive_returns_root_only() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        fs::create_dir(temp_dir.path().join("sub")).expect("Failed to create dir");

        let found = DirectoryDiscovery::new(temp_dir.path(), false).discover();
        assert_eq!(found, vec![temp_dir.path().to_path_buf()]);
    }

    #[test]
    fn test_recursive_skips_hidden_subtrees() {
        let temp_dir = tempfile::Builder::new()
            .prefix("discovery")
            .tempdir()
            .expect("Failed to create temp dir");
        let root = temp_dir.path();
        fs::create_dir_all(root.join("a").join("deep")).expect("Failed to create dirs");
        fs::create_dir_all(root.join("b")).expect("Failed to create dirs");
        fs::create_dir_all(root.join(".hidden").join("inner")).expect("Failed to create dirs");
        fs::write(root.join("a").join("file.txt"), "x").expect("Failed to write file");

        let found = DirectoryDiscovery::new(root, true).discover();

        assert_eq!(
            found,
            vec![
                root.to_path_buf(),
                root.join("a"),
                root.join("a").join("deep"),
                root.join("b"),
            ]
        );
    }
}
