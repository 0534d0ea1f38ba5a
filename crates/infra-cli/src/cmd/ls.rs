use crate::output::{print_json, print_table};
use std::path::Path;

pub fn run(root: &Path, ty: Option<&str>, json: bool) -> anyhow::Result<()> {
    let deployment = super::load(root)?;
    let template = deployment.stack.synth();

    let resources: Vec<(&String, &String)> = template
        .resources
        .iter()
        .filter(|(_, r)| ty.map_or(true, |t| r.ty == t))
        .map(|(id, r)| (id, &r.ty))
        .collect();

    if json {
        let items: Vec<serde_json::Value> = resources
            .iter()
            .map(|(id, ty)| serde_json::json!({ "logical_id": id, "type": ty }))
            .collect();
        print_json(&items)?;
        return Ok(());
    }

    if resources.is_empty() {
        println!("No resources.");
        return Ok(());
    }
    let rows = resources
        .iter()
        .map(|(id, ty)| vec![id.to_string(), ty.to_string()])
        .collect();
    print_table(&["LOGICAL ID", "TYPE"], rows);
    Ok(())
}
