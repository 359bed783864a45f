use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::config::{ENTITY_GLOBS, MIGRATION_GLOBS};
use crate::error::DiscoveryError;

/// Files matched by the entity and migration globs under a project root.
#[derive(Debug, Default, PartialEq, Eq, Serialize)]
pub struct Artifacts {
    pub entities: Vec<PathBuf>,
    pub migrations: Vec<PathBuf>,
}

impl Artifacts {
    /// Needs no database settings, only the fixed globs.
    pub fn discover(root: &Path) -> Result<Self, DiscoveryError> {
        Ok(Artifacts {
            entities: expand(root, ENTITY_GLOBS)?,
            migrations: expand(root, MIGRATION_GLOBS)?,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.migrations.is_empty()
    }
}

fn expand(root: &Path, patterns: &[&str]) -> Result<Vec<PathBuf>, DiscoveryError> {
    let root = glob::Pattern::escape(&root.to_string_lossy());
    let mut found = BTreeSet::new();

    for pattern in patterns {
        let full = format!("{}/{}", root, pattern);
        let paths = glob::glob(&full).map_err(|source| DiscoveryError::Pattern {
            pattern: pattern.to_string(),
            source,
        })?;

        for entry in paths {
            match entry {
                Ok(path) if path.is_file() => {
                    found.insert(path);
                }
                Ok(_) => {}
                Err(e) => log::warn!("Skipping {}: {}", e.path().display(), e.error()),
            }
        }
    }

    Ok(found.into_iter().collect())
}
