//! Path resolution and directory listing under a fixed root

use crate::error::{Error, Result};
use std::cmp::Ordering;
use std::path::{Component, Path, PathBuf};

/// Default cap on entries returned per listing
pub const DEFAULT_MAX_ENTRIES: usize = 50;

/// One directory entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub name: String,
    pub is_dir: bool,
    pub resolved_path: PathBuf,
    /// Size in bytes, files only
    pub size: Option<u64>,
}

impl FileEntry {
    /// Human-readable size ("512 B", "1.5 KB", "2.0 MB")
    pub fn size_label(&self) -> Option<String> {
        self.size.map(format_size)
    }
}

/// Filesystem boundary.
///
/// Every path handed out or accepted is checked against the canonical root.
/// Resolution is redone on every call; nothing is cached between operations.
#[derive(Debug, Clone)]
pub struct Jail {
    root: PathBuf,
    /// Root as configured, before symlinks were resolved
    configured: PathBuf,
    show_hidden: bool,
    max_entries: usize,
}

impl Jail {
    /// Create a jail rooted at `root`, which must exist.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let raw = root.as_ref();
        let root = raw
            .canonicalize()
            .map_err(|e| Error::from_path_io(e, &raw.display().to_string()))?;
        if !root.is_dir() {
            return Err(Error::NotADirectory(root.display().to_string()));
        }
        let configured = std::env::current_dir()
            .ok()
            .and_then(|cwd| normalize_absolute(&cwd.join(raw)))
            .unwrap_or_else(|| root.clone());
        Ok(Self {
            root,
            configured,
            show_hidden: false,
            max_entries: DEFAULT_MAX_ENTRIES,
        })
    }

    pub fn with_show_hidden(mut self, show_hidden: bool) -> Self {
        self.show_hidden = show_hidden;
        self
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a client path to a canonical path inside the root.
    ///
    /// `""`, `"~"` and `"~/"` name the root; `"~/x"` and bare relative paths
    /// are root-relative. Absolute paths may be spelled under either the
    /// canonical root or the root as configured. `..` segments that climb
    /// above the root are refused before the filesystem is touched. The
    /// canonical result is checked again so symlinks cannot lead outside.
    pub fn resolve(&self, raw: &str) -> Result<PathBuf> {
        let trimmed = raw.trim();
        let rel = match trimmed {
            "" | "~" | "~/" => return Ok(self.root.clone()),
            _ => trimmed.strip_prefix("~/").unwrap_or(trimmed),
        };

        let candidate = Path::new(rel);
        let lexical = if candidate.is_absolute() {
            let normalized = normalize_absolute(candidate)
                .ok_or_else(|| Error::OutsideJail(raw.to_string()))?;
            if normalized.starts_with(&self.root) {
                normalized
            } else if let Ok(rest) = normalized.strip_prefix(&self.configured) {
                self.root.join(rest)
            } else {
                return Err(Error::OutsideJail(raw.to_string()));
            }
        } else {
            let normalized =
                normalize_relative(candidate).ok_or_else(|| Error::OutsideJail(raw.to_string()))?;
            self.root.join(normalized)
        };

        let canonical = lexical
            .canonicalize()
            .map_err(|e| Error::from_path_io(e, raw))?;
        if !self.contains(&canonical) {
            return Err(Error::OutsideJail(raw.to_string()));
        }
        Ok(canonical)
    }

    /// Whether `path` is the root or below it (no filesystem access)
    pub fn contains(&self, path: &Path) -> bool {
        path.starts_with(&self.root)
    }

    /// List a directory: directories first, then files, each group sorted
    /// case-insensitively. Hidden entries are skipped unless enabled and
    /// the result is capped at `max_entries`.
    ///
    /// `dir` is re-checked against the root; pass the output of
    /// [`Jail::resolve`].
    pub fn list(&self, dir: &Path) -> Result<Vec<FileEntry>> {
        let shown = dir.display().to_string();
        if !self.contains(dir) {
            return Err(Error::OutsideJail(shown));
        }
        let metadata = std::fs::metadata(dir).map_err(|e| Error::from_path_io(e, &shown))?;
        if !metadata.is_dir() {
            return Err(Error::NotADirectory(self.display_path(dir)));
        }

        let reader = std::fs::read_dir(dir).map_err(|e| Error::from_path_io(e, &shown))?;
        let mut entries = Vec::new();
        for entry in reader {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::debug!(dir = %shown, "Skipping unreadable entry: {}", e);
                    continue;
                }
            };
            let name = entry.file_name().to_string_lossy().to_string();
            if !self.show_hidden && name.starts_with('.') {
                continue;
            }
            // Follow symlinks for the kind, but fall back to the link itself
            // when its target is gone.
            let path = entry.path();
            let meta = std::fs::metadata(&path).or_else(|_| entry.metadata());
            let (is_dir, size) = match meta {
                Ok(meta) if meta.is_dir() => (true, None),
                Ok(meta) => (false, Some(meta.len())),
                Err(_) => (false, None),
            };
            entries.push(FileEntry {
                name,
                is_dir,
                resolved_path: path,
                size,
            });
        }

        entries.sort_by(compare_entries);
        entries.truncate(self.max_entries);
        Ok(entries)
    }

    /// `~` for the root, otherwise the root-relative path
    pub fn display_path(&self, path: &Path) -> String {
        match path.strip_prefix(&self.root) {
            Ok(rel) if rel.as_os_str().is_empty() => "~".to_string(),
            Ok(rel) => rel.display().to_string(),
            Err(_) => path.display().to_string(),
        }
    }

    /// Parent directory, clamped at the root
    pub fn parent(&self, path: &Path) -> PathBuf {
        if path == self.root || !self.contains(path) {
            return self.root.clone();
        }
        match path.parent() {
            Some(parent) if self.contains(parent) => parent.to_path_buf(),
            _ => self.root.clone(),
        }
    }

    /// `(label, client path)` pairs from the root down to `path`
    pub fn breadcrumbs(&self, path: &Path) -> Vec<(String, String)> {
        let mut crumbs = vec![("~".to_string(), "~".to_string())];
        let Ok(rel) = path.strip_prefix(&self.root) else {
            return crumbs;
        };
        let mut acc = PathBuf::new();
        for component in rel.components() {
            if let Component::Normal(name) = component {
                acc.push(name);
                crumbs.push((
                    name.to_string_lossy().to_string(),
                    acc.display().to_string(),
                ));
            }
        }
        crumbs
    }

    /// Plain-text listing, used by the `fetch` tool
    pub fn render_listing(&self, dir: &Path, entries: &[FileEntry]) -> String {
        let mut out = format!("📁 {}\n", self.display_path(dir));
        if entries.is_empty() {
            out.push_str("(empty)");
            return out;
        }
        for entry in entries {
            if entry.is_dir {
                out.push_str(&format!("📂 {}/\n", entry.name));
            } else {
                match entry.size_label() {
                    Some(size) => out.push_str(&format!("📄 {} ({})\n", entry.name, size)),
                    None => out.push_str(&format!("📄 {}\n", entry.name)),
                }
            }
        }
        out.truncate(out.trim_end().len());
        out
    }
}

fn compare_entries(a: &FileEntry, b: &FileEntry) -> Ordering {
    b.is_dir
        .cmp(&a.is_dir)
        .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
        .then_with(|| a.name.cmp(&b.name))
}

/// Lexically normalize a relative path. `None` if `..` climbs above it.
fn normalize_relative(path: &Path) -> Option<PathBuf> {
    let mut parts: Vec<&std::ffi::OsStr> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                parts.pop()?;
            }
            Component::Normal(name) => parts.push(name),
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(parts.iter().collect())
}

/// Lexically normalize an absolute path. `None` if `..` climbs above `/`.
fn normalize_absolute(path: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    let mut depth = 0usize;
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => out.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                if depth == 0 {
                    return None;
                }
                out.pop();
                depth -= 1;
            }
            Component::Normal(name) => {
                out.push(name);
                depth += 1;
            }
        }
    }
    Some(out)
}

/// "512 B", "1.5 KB", "2.0 MB"
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * 1024;
    if bytes < KB {
        format!("{} B", bytes)
    } else if bytes < MB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    }
}
