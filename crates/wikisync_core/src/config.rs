use std::env;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::page::{AliasPair, TemplateCheck};

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct SyncConfig {
    #[serde(default)]
    pub compare: CompareSection,
    #[serde(default = "default_checks")]
    pub checks: Vec<TemplateCheck>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            compare: CompareSection::default(),
            checks: default_checks(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct CompareSection {
    #[serde(default = "default_dry_run")]
    pub dry_run: bool,
    #[serde(default)]
    pub include_diffs: bool,
    /// Limits a run to these titles when non-empty.
    #[serde(default)]
    pub pages: Vec<String>,
}

impl Default for CompareSection {
    fn default() -> Self {
        Self {
            dry_run: default_dry_run(),
            include_diffs: false,
            pages: Vec::new(),
        }
    }
}

fn default_dry_run() -> bool {
    true
}

impl SyncConfig {
    /// Resolve dry-run: env WIKISYNC_DRY_RUN > config.
    pub fn dry_run(&self) -> bool {
        env::var("WIKISYNC_DRY_RUN")
            .ok()
            .and_then(|value| parse_bool_flag(&value))
            .unwrap_or(self.compare.dry_run)
    }

    pub fn check_names(&self) -> Vec<String> {
        self.checks
            .iter()
            .map(|check| check.template.trim().to_string())
            .filter(|name| !name.is_empty())
            .collect()
    }
}

pub(crate) fn parse_bool_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(ToString::to_string).collect()
}

/// The template checks the wiki's compare runs use out of the box.
pub fn default_checks() -> Vec<TemplateCheck> {
    vec![
        TemplateCheck {
            skip: strings(&["technology", "ammo", "capture_power"]),
            multiline: strings(&["description", "qualities"]),
            ..TemplateCheck::new("Item")
        },
        TemplateCheck {
            prefix: "recipe.".to_string(),
            skip: strings(&["recipe.workbench"]),
            qty_suffixes: strings(&["ingredients"]),
            select_by: Some("product".to_string()),
            add_missing: true,
            ..TemplateCheck::new("Crafting Recipe")
        },
        TemplateCheck {
            skip: strings(&["pal_gear", "partner_skill_icon"]),
            ..TemplateCheck::new("Pal")
        },
        TemplateCheck {
            prefix: "drops.".to_string(),
            skip: strings(&["target_name"]),
            aliases: vec![AliasPair {
                primary: "palName".to_string(),
                alias: "target_name".to_string(),
            }],
            ..TemplateCheck::new("Item Drop")
        },
        TemplateCheck {
            prefix: "breeding.".to_string(),
            skip: strings(&["uniqueCombos"]),
            ..TemplateCheck::new("Breeding")
        },
    ]
}

/// Load and parse a SyncConfig from a TOML file. Returns default if file doesn't exist.
pub fn load_config(config_path: &Path) -> Result<SyncConfig> {
    if !config_path.exists() {
        return Ok(SyncConfig::default());
    }
    let content = fs::read_to_string(config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let parsed: SyncConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", config_path.display()))?;
    Ok(parsed)
}

pub fn render_default_config() -> Result<String> {
    let body = toml::to_string_pretty(&SyncConfig::default())
        .context("failed to serialize config TOML")?;
    Ok(format!(
        "# wikisync configuration (materialized by `wikisync init`)\n# dry_run = true only reports; `wikisync compare --write` or dry_run = false writes pages back.\n# WIKISYNC_DRY_RUN overrides dry_run.\n\n{body}"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn default_config_is_a_dry_run_over_builtin_checks() {
        let config = SyncConfig::default();
        assert!(config.compare.dry_run);
        assert!(!config.compare.include_diffs);
        assert_eq!(
            config.check_names(),
            vec!["Item", "Crafting Recipe", "Pal", "Item Drop", "Breeding"]
        );
        let recipe = &config.checks[1];
        assert_eq!(recipe.select_by.as_deref(), Some("product"));
        assert!(recipe.add_missing);
        assert!(recipe.skip_keys().contains_labelled("workbench", &recipe.prefix));
    }

    #[test]
    fn load_config_returns_default_for_missing_file() {
        let config = load_config(Path::new("/nonexistent/config.toml")).expect("load config");
        assert_eq!(config, SyncConfig::default());
    }

    #[test]
    fn load_config_replaces_checks_when_listed() {
        let temp = tempdir().expect("tempdir");
        let config_path = temp.path().join("config.toml");
        fs::write(
            &config_path,
            r#"
[compare]
dry_run = false
pages = ["Wood", "Stone"]

[[checks]]
template = "Item"
skip = ["technology"]
multiline = ["description"]

[[checks]]
template = "Item Drop"
prefix = "drops."

[[checks.aliases]]
primary = "palName"
alias = "target_name"
"#,
        )
        .expect("write config");

        let config = load_config(&config_path).expect("load config");
        assert!(!config.compare.dry_run);
        assert_eq!(config.compare.pages, vec!["Wood", "Stone"]);
        assert_eq!(config.checks.len(), 2);
        assert_eq!(config.checks[0].multiline, vec!["description"]);
        assert!(config.checks[0].select_by.is_none());
        assert_eq!(config.checks[1].aliases[0].alias, "target_name");
    }

    #[test]
    fn load_config_tolerates_partial_toml() {
        let temp = tempdir().expect("tempdir");
        let config_path = temp.path().join("config.toml");
        fs::write(&config_path, "[compare]\ninclude_diffs = true\n").expect("write config");

        let config = load_config(&config_path).expect("load config");
        assert!(config.compare.dry_run);
        assert!(config.compare.include_diffs);
        assert_eq!(config.checks, default_checks());
    }

    #[test]
    fn load_config_returns_error_for_invalid_toml() {
        let temp = tempdir().expect("tempdir");
        let config_path = temp.path().join("config.toml");
        fs::write(&config_path, "[compare\ndry_run = \"oops\"").expect("write config");
        let error = load_config(&config_path).expect_err("must fail");
        assert!(error.to_string().contains("failed to parse"));
    }

    #[test]
    fn rendered_default_config_loads_back() {
        let temp = tempdir().expect("tempdir");
        let config_path = temp.path().join("config.toml");
        fs::write(&config_path, render_default_config().expect("render")).expect("write config");
        let config = load_config(&config_path).expect("load config");
        assert_eq!(config, SyncConfig::default());
    }

    #[test]
    fn bool_flags_accept_common_spellings() {
        assert_eq!(parse_bool_flag(" TRUE "), Some(true));
        assert_eq!(parse_bool_flag("off"), Some(false));
        assert_eq!(parse_bool_flag("maybe"), None);
    }
}
