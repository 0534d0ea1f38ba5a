use crate::output::{print_json, print_table};
use std::path::Path;

pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    let deployment = super::load(root)?;
    let outputs = deployment.stack.outputs();

    if json {
        let items: Vec<serde_json::Value> = outputs
            .iter()
            .map(|(name, o)| serde_json::json!({ "name": name, "description": o.description }))
            .collect();
        print_json(&items)?;
        return Ok(());
    }

    let rows = outputs
        .iter()
        .map(|(name, o)| vec![name.clone(), o.description.clone()])
        .collect();
    print_table(&["OUTPUT", "DESCRIPTION"], rows);
    Ok(())
}
