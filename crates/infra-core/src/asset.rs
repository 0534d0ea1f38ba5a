//! File assets: directories that are zipped and uploaded next to the
//! template. Each asset is identified by a SHA-256 over its relative paths
//! and contents, so unchanged directories keep the same object key.

use crate::error::{InfraError, Result};
use crate::template::intrinsic;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Qualifier of the bootstrap bucket assets are published to.
pub const BOOTSTRAP_QUALIFIER: &str = "hnb659fds";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub source: PathBuf,
    pub hash: String,
}

impl Asset {
    pub fn from_dir(path: &Path) -> Result<Self> {
        if !path.is_dir() {
            return Err(InfraError::AssetNotFound(path.to_path_buf()));
        }
        let mut files = Vec::new();
        collect_files(path, path, &mut files)?;
        files.sort();

        let mut hasher = Sha256::new();
        for rel in &files {
            hasher.update(rel.as_bytes());
            hasher.update([0u8]);
            hasher.update(std::fs::read(path.join(rel))?);
            hasher.update([0u8]);
        }
        let hash = hex(&hasher.finalize());
        tracing::debug!(source = %path.display(), files = files.len(), hash = %hash, "fingerprinted asset");
        Ok(Self {
            source: path.to_path_buf(),
            hash,
        })
    }

    pub fn object_key(&self) -> String {
        format!("{}.zip", self.hash)
    }

    /// Bucket name as a template expression resolved in the target account.
    pub fn bucket_expr() -> Value {
        intrinsic::sub(&format!(
            "cdk-{BOOTSTRAP_QUALIFIER}-assets-${{{}}}-${{{}}}",
            intrinsic::ACCOUNT_ID,
            intrinsic::REGION
        ))
    }

    /// Bucket name for a concrete account and region.
    pub fn bucket_name(account: &str, region: &str) -> String {
        format!("cdk-{BOOTSTRAP_QUALIFIER}-assets-{account}-{region}")
    }
}

/// Relative paths (with `/` separators) of every regular file under `dir`.
fn collect_files(root: &Path, dir: &Path, out: &mut Vec<String>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            collect_files(root, &path, out)?;
        } else if path.is_file() {
            let rel = path.strip_prefix(root).unwrap_or(&path);
            let rel: Vec<String> = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            out.push(rel.join("/"));
        }
    }
    Ok(())
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
