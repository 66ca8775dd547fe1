//! Filesystem module descriptors
//!
//! [`JsonModuleLoader`] backs the loader seam with `<name>.module.json`
//! descriptor files under the group path. Scanning only lists names; a
//! descriptor that fails to parse surfaces at load time, so discovery mode
//! degrades to "fewer modules found" instead of aborting.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::warn;
use walkdir::WalkDir;

use conflux_core::{LoadError, ModuleLoader, ModuleSource};

/// Descriptor file suffix.
pub const DESCRIPTOR_SUFFIX: &str = ".module.json";

#[derive(Debug, Default, Clone, Copy)]
pub struct JsonModuleLoader;

impl JsonModuleLoader {
    pub fn new() -> Self {
        Self
    }

    fn locate(&self, path: &Path, name: &str) -> Option<PathBuf> {
        let file_name = format!("{name}{DESCRIPTOR_SUFFIX}");
        let direct = path.join(&file_name);
        if direct.is_file() {
            return Some(direct);
        }
        WalkDir::new(path)
            .into_iter()
            .filter_map(Result::ok)
            .find(|entry| {
                entry.file_type().is_file()
                    && entry.file_name().to_str() == Some(file_name.as_str())
            })
            .map(|entry| entry.into_path())
    }
}

fn read_descriptor(file: &Path) -> anyhow::Result<ModuleSource> {
    let text = fs::read_to_string(file)
        .with_context(|| format!("failed to read descriptor {}", file.display()))?;
    let source: ModuleSource = serde_json::from_str(&text)
        .with_context(|| format!("failed to parse descriptor {}", file.display()))?;
    Ok(source)
}

impl ModuleLoader for JsonModuleLoader {
    fn load(&self, path: &Path, name: &str) -> Result<ModuleSource, LoadError> {
        let Some(file) = self.locate(path, name) else {
            return Err(LoadError::NotFound(name.to_string()));
        };
        read_descriptor(&file).map_err(|e| LoadError::Unreadable {
            name: name.to_string(),
            reason: format!("{e:#}"),
        })
    }

    fn scan(&self, path: &Path) -> Result<Vec<String>, LoadError> {
        if !path.is_dir() {
            return Err(LoadError::ScanFailed {
                path: path.display().to_string(),
                reason: "not a directory".to_string(),
            });
        }
        let mut names = Vec::new();
        for entry in WalkDir::new(path) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unreadable entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(file_name) = entry.file_name().to_str() else {
                continue;
            };
            if let Some(name) = file_name.strip_suffix(DESCRIPTOR_SUFFIX) {
                names.push(name.to_string());
            }
        }
        names.sort();
        names.dedup();
        Ok(names)
    }
}
