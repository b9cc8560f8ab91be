use std::path::{Path, PathBuf};

/// One background pattern image available for storyboard tiling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternEntry {
    pub display_name: String,
    pub file_path: PathBuf,
}

/// Catalog of background patterns, loaded from a directory at startup and
/// extendable by explicit import. Selection is by index and stays in range
/// whenever the catalog changes size.
#[derive(Debug, Default)]
pub struct PatternCatalog {
    entries: Vec<PatternEntry>,
    selected: Option<usize>,
}

impl PatternCatalog {
    /// Scan `directory` for jpg/png files, sorted by name. A missing or
    /// unreadable directory yields an empty catalog rather than an error.
    pub fn load(directory: &Path) -> Self {
        let mut catalog = Self::default();
        catalog.reload(directory);
        catalog
    }

    pub fn reload(&mut self, directory: &Path) {
        let mut entries = Vec::new();
        match std::fs::read_dir(directory) {
            Ok(dir) => {
                for entry in dir.flatten() {
                    let path = entry.path();
                    if !path.is_file() {
                        continue;
                    }
                    if let Some(name) = path.file_name().and_then(|s| s.to_str()) {
                        let lower = name.to_lowercase();
                        if lower.ends_with(".jpg") || lower.ends_with(".png") {
                            entries.push(PatternEntry {
                                display_name: name.to_string(),
                                file_path: path.clone(),
                            });
                        }
                    }
                }
                entries.sort_by(|a, b| a.display_name.cmp(&b.display_name));
                log::info!(
                    "Loaded {} pattern(s) from {}",
                    entries.len(),
                    directory.display()
                );
            }
            Err(e) => {
                log::warn!("Pattern directory {} not readable: {}", directory.display(), e);
            }
        }
        self.entries = entries;
        self.clamp_selection();
        if self.selected.is_none() && !self.entries.is_empty() {
            self.selected = Some(0);
        }
    }

    /// Register an externally chosen pattern file and select it.
    pub fn import(&mut self, file_path: PathBuf) {
        let display_name = file_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| file_path.display().to_string());
        log::info!("Imported pattern {}", file_path.display());
        self.entries.push(PatternEntry {
            display_name,
            file_path,
        });
        self.selected = Some(self.entries.len() - 1);
    }

    pub fn select(&mut self, index: usize) {
        self.selected = Some(index);
        self.clamp_selection();
    }

    pub fn entries(&self) -> &[PatternEntry] {
        &self.entries
    }

    pub fn selected(&self) -> Option<usize> {
        self.selected
    }

    pub fn selected_path(&self) -> Option<&Path> {
        self.selected
            .and_then(|i| self.entries.get(i))
            .map(|e| e.file_path.as_path())
    }

    fn clamp_selection(&mut self) {
        self.selected = match self.selected {
            _ if self.entries.is_empty() => None,
            Some(i) if i >= self.entries.len() => Some(self.entries.len() - 1),
            other => other,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog_with(names: &[&str]) -> PatternCatalog {
        let mut catalog = PatternCatalog::default();
        for name in names {
            catalog.import(PathBuf::from(format!("/patterns/{}", name)));
        }
        catalog
    }

    #[test]
    fn test_import_selects_newest_entry() {
        let mut catalog = catalog_with(&["dots.png"]);
        catalog.import(PathBuf::from("/patterns/waves.jpg"));
        assert_eq!(catalog.entries().len(), 2);
        assert_eq!(catalog.selected(), Some(1));
        assert_eq!(
            catalog.selected_path(),
            Some(Path::new("/patterns/waves.jpg"))
        );
    }

    #[test]
    fn test_select_is_clamped_into_range() {
        let mut catalog = catalog_with(&["dots.png", "waves.jpg"]);
        catalog.select(10);
        assert_eq!(catalog.selected(), Some(1));
        catalog.select(0);
        assert_eq!(catalog.selected(), Some(0));
    }

    #[test]
    fn test_selection_survives_shrink_by_clamping() {
        let mut catalog = catalog_with(&["a.png", "b.png", "c.png"]);
        catalog.select(2);

        // Reloading from a missing directory empties the catalog.
        let missing = std::env::temp_dir().join(format!(
            "storyboard-helper-no-such-dir-{}",
            uuid::Uuid::new_v4()
        ));
        catalog.reload(&missing);
        assert!(catalog.entries().is_empty());
        assert_eq!(catalog.selected(), None);
        assert_eq!(catalog.selected_path(), None);
    }

    #[test]
    fn test_load_scans_and_sorts_directory() {
        let dir = std::env::temp_dir().join(format!(
            "storyboard-helper-patterns-{}",
            uuid::Uuid::new_v4()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("zigzag.png"), b"png").unwrap();
        std::fs::write(dir.join("argyle.jpg"), b"jpg").unwrap();
        std::fs::write(dir.join("notes.txt"), b"ignored").unwrap();

        let catalog = PatternCatalog::load(&dir);
        let names: Vec<_> = catalog
            .entries()
            .iter()
            .map(|e| e.display_name.clone())
            .collect();
        assert_eq!(names, vec!["argyle.jpg", "zigzag.png"]);
        assert_eq!(catalog.selected(), Some(0));

        let _ = std::fs::remove_dir_all(&dir);
    }
}
