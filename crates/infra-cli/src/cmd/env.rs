use crate::output::{print_json, print_table};
use anyhow::Context;
use infra_core::config::{StackConfig, WarnLevel};

pub fn run(json: bool) -> anyhow::Result<()> {
    let config = StackConfig::from_env().context("failed to resolve configuration")?;
    let warnings = config.validate();

    if json {
        let value = serde_json::json!({
            "stack_name": config.stack_name(),
            "config": config,
            "warnings": warnings,
        });
        print_json(&value)?;
    } else {
        let rows = vec![
            vec!["stack".to_string(), config.stack_name()],
            vec!["app".to_string(), config.app_name.clone()],
            vec!["stage".to_string(), config.stage.clone()],
            vec!["account".to_string(), config.account.clone()],
            vec!["region".to_string(), config.region.clone()],
            vec![
                "hosted zone".to_string(),
                format!("{} ({})", config.hosted_zone_name, config.hosted_zone_id),
            ],
            vec!["hasura hostname".to_string(), config.hasura_hostname.clone()],
            vec!["actions hostname".to_string(), config.actions_hostname.clone()],
            vec!["multi-az".to_string(), config.multi_az.to_string()],
            vec![
                "actions dir".to_string(),
                config.actions_dir.display().to_string(),
            ],
        ];
        print_table(&["KEY", "VALUE"], rows);
        for w in &warnings {
            let prefix = match w.level {
                WarnLevel::Warning => "warning",
                WarnLevel::Error => "error",
            };
            println!("[{prefix}] {}", w.message);
        }
    }

    if warnings.iter().any(|w| w.level == WarnLevel::Error) {
        anyhow::bail!("configuration has errors");
    }
    Ok(())
}
