//! The JSON snapshot format a [`crate::MemoryStore`] is seeded from.
//!
//! ```json
//! {
//!   "github_organizations": [{ "organization_id": "acme", "organization_name": "acme", ... }],
//!   "gitlab_organizations": [],
//!   "repositories": [{ "repository_id": "r-1", "external_id": "1001", ... }]
//! }
//! ```

use std::path::{Path, PathBuf};

use reconcile::{OrganizationRecord, RepositoryRecord};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("cannot read snapshot {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot write snapshot {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid snapshot {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Snapshot {
    pub github_organizations: Vec<OrganizationRecord>,
    pub gitlab_organizations: Vec<OrganizationRecord>,
    pub repositories: Vec<RepositoryRecord>,
}

impl Snapshot {
    pub async fn load(path: &Path) -> Result<Self, SnapshotError> {
        let raw = tokio::fs::read(path).await.map_err(|source| SnapshotError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_slice(&raw).map_err(|source| SnapshotError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Writes the snapshot as pretty JSON, replacing any existing file.
    pub async fn save(&self, path: &Path) -> Result<(), SnapshotError> {
        let raw = serde_json::to_vec_pretty(self).map_err(|source| SnapshotError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        tokio::fs::write(path, raw).await.map_err(|source| SnapshotError::Write {
            path: path.to_path_buf(),
            source,
        })
    }
}
