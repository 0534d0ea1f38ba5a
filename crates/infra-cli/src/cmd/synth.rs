use crate::output::print_json;
use anyhow::Context;
use infra_core::assembly::{self, TemplateFormat};
use std::path::Path;

pub const DEFAULT_OUT_DIR: &str = "infra.out";

pub fn run(
    root: &Path,
    out: Option<&Path>,
    format: TemplateFormat,
    json: bool,
) -> anyhow::Result<()> {
    let deployment = super::load(root)?;
    let out_dir = match out {
        Some(p) => p.to_path_buf(),
        None => root.join(DEFAULT_OUT_DIR),
    };

    let written = assembly::write(&out_dir, &deployment.stack, format)
        .with_context(|| format!("failed to write assembly to {}", out_dir.display()))?;

    if json {
        let value = serde_json::json!({
            "manifest": written.manifest,
            "out_dir": out_dir,
            "files": written.files,
            "changed": written.changed,
        });
        print_json(&value)?;
    } else {
        println!(
            "Synthesized {} ({} resources, {} outputs) to {}",
            written.manifest.stack_name,
            deployment.stack.resources().len(),
            written.manifest.outputs.len(),
            out_dir.display()
        );
        if written.changed == 0 {
            println!("No changes.");
        }
    }
    Ok(())
}
