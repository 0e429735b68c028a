use anyhow::Result;
use std::path::Path;

use crate::cli::ConfigAction;
use crate::config::Config;

pub fn handle_config_action(action: ConfigAction, config_path: &Path, json_output: bool) -> Result<()> {
    match action {
        ConfigAction::Init => {
            Config::default().save_to(config_path)?;
            if json_output {
                println!(
                    r#"{{"status": "success", "message": "Configuration initialized at {}"}}"#,
                    config_path.display()
                );
            } else {
                println!("Configuration initialized at: {}", config_path.display());
            }
        }
        ConfigAction::Show => {
            let config = Config::load_from(config_path)?;
            if json_output {
                println!("{}", serde_json::to_string_pretty(&config)?);
            } else {
                println!("Configuration ({})", config_path.display());
                println!("{}", toml::to_string_pretty(&config)?);
            }
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load_from(config_path)?;
            config.set_value(&key, &value)?;
            config.save_to(config_path)?;
            if json_output {
                println!(
                    r#"{{"status": "success", "message": "Configuration updated: {} = {}"}}"#,
                    key, value
                );
            } else {
                println!("Configuration updated: {} = {}", key, value);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_set_persists_value() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");

        handle_config_action(ConfigAction::Init, &path, true).unwrap();
        handle_config_action(
            ConfigAction::Set {
                key: "reconcile.per_day_limit".to_string(),
                value: "300".to_string(),
            },
            &path,
            true,
        )
        .unwrap();

        assert_eq!(Config::load_from(&path).unwrap().reconcile.per_day_limit, 300);
    }

    #[test]
    fn test_set_rejects_unknown_key() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");

        let result = handle_config_action(
            ConfigAction::Set {
                key: "general.claude_projects_path".to_string(),
                value: "/tmp".to_string(),
            },
            &path,
            false,
        );
        assert!(result.is_err());
    }
}
