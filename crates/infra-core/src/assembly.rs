//! Cloud assembly: the directory `synth` produces. One template, one asset
//! manifest and one `manifest.json` describing the stack.

use crate::asset::Asset;
use crate::error::{InfraError, Result};
use crate::io;
use crate::stack::{Environment, Stack};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const MANIFEST_FILE: &str = "manifest.json";
pub const MANIFEST_VERSION: &str = "1";

// ---------------------------------------------------------------------------
// TemplateFormat
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateFormat {
    #[default]
    Json,
    Yaml,
}

impl TemplateFormat {
    pub fn extension(self) -> &'static str {
        match self {
            TemplateFormat::Json => "json",
            TemplateFormat::Yaml => "yaml",
        }
    }
}

impl fmt::Display for TemplateFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for TemplateFormat {
    type Err = InfraError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(TemplateFormat::Json),
            "yaml" | "yml" => Ok(TemplateFormat::Yaml),
            other => Err(InfraError::InvalidConfig {
                name: "format",
                reason: format!("expected json or yaml, got '{other}'"),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Manifest
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetEntry {
    pub source: PathBuf,
    pub bucket: String,
    pub object_key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub version: String,
    pub stack_name: String,
    pub environment: Environment,
    pub template_file: String,
    pub assets_file: String,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(default)]
    pub outputs: Vec<String>,
}

impl Manifest {
    pub fn for_stack(stack: &Stack, format: TemplateFormat) -> Self {
        Self {
            version: MANIFEST_VERSION.to_string(),
            stack_name: stack.name().to_string(),
            environment: stack.env().clone(),
            template_file: template_file(stack, format),
            assets_file: assets_file(stack),
            tags: stack.tags().clone(),
            outputs: stack.outputs().keys().cloned().collect(),
        }
    }

    pub fn load(out_dir: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(out_dir.join(MANIFEST_FILE))?;
        Ok(serde_json::from_str(&data)?)
    }
}

pub fn template_file(stack: &Stack, format: TemplateFormat) -> String {
    format!("{}.template.{}", stack.name(), format.extension())
}

pub fn assets_file(stack: &Stack) -> String {
    format!("{}.assets.json", stack.name())
}

/// Asset manifest keyed by content hash.
pub fn asset_entries(stack: &Stack) -> BTreeMap<String, AssetEntry> {
    let env = stack.env();
    let bucket = Asset::bucket_name(&env.account, &env.region);
    stack
        .assets()
        .iter()
        .map(|(hash, asset)| {
            (
                hash.clone(),
                AssetEntry {
                    source: asset.source.clone(),
                    bucket: bucket.clone(),
                    object_key: asset.object_key(),
                },
            )
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Write
// ---------------------------------------------------------------------------

/// Result of writing an assembly: the manifest and every file it touched.
#[derive(Debug, Clone)]
pub struct Written {
    pub manifest: Manifest,
    pub files: Vec<PathBuf>,
    /// Files whose contents actually changed.
    pub changed: usize,
}

/// Synthesize `stack` and write the assembly into `out_dir`.
pub fn write(out_dir: &Path, stack: &Stack, format: TemplateFormat) -> Result<Written> {
    let template = stack.synth();
    let body = match format {
        TemplateFormat::Json => template.to_json()?,
        TemplateFormat::Yaml => template.to_yaml()?,
    };
    let manifest = Manifest::for_stack(stack, format);

    let mut assets = serde_json::to_string_pretty(&asset_entries(stack))?;
    assets.push('\n');
    let mut manifest_json = serde_json::to_string_pretty(&manifest)?;
    manifest_json.push('\n');

    let files = [
        (out_dir.join(&manifest.template_file), body),
        (out_dir.join(&manifest.assets_file), assets),
        (out_dir.join(MANIFEST_FILE), manifest_json),
    ];
    let mut changed = 0;
    for (path, data) in &files {
        if io::write_if_changed(path, data.as_bytes())? {
            changed += 1;
            tracing::debug!(path = %path.display(), "wrote");
        }
    }

    tracing::info!(
        stack = stack.name(),
        resources = template.resources.len(),
        outputs = template.outputs.len(),
        changed,
        out = %out_dir.display(),
        "synthesized"
    );

    Ok(Written {
        manifest,
        files: files.into_iter().map(|(p, _)| p).collect(),
        changed,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
