pub mod env;
pub mod ls;
pub mod outputs;
pub mod synth;

use anyhow::Context;
use infra_core::config::{StackConfig, WarnLevel};
use infra_core::Deployment;
use std::path::Path;

/// Resolve configuration from the process environment and compose the stack.
pub(crate) fn load(root: &Path) -> anyhow::Result<Deployment> {
    let config = StackConfig::from_env().context("failed to resolve configuration")?;
    for w in config.validate() {
        if w.level == WarnLevel::Warning {
            tracing::warn!("{}", w.message);
        }
    }
    infra_core::compose(&config, root)
        .with_context(|| format!("failed to compose {}", config.stack_name()))
}
