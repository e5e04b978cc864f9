use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

const CONFIG_FILE: &str = "block-tools";
const ENV_PREFIX: &str = "BLOCK_TOOLS";

/// Runtime settings, layered: `block-tools.toml` < `BLOCK_TOOLS_*` env < CLI.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    #[serde(default = "default_table_prefix")]
    pub table_prefix: String,
    /// `None` means "detect from the schema".
    #[serde(default)]
    pub multi_tenant: Option<bool>,
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,
    #[serde(default = "default_home_url")]
    pub home_url: String,
    /// Post types the host schema knows about; `remove` skips anything else.
    #[serde(default = "default_post_types")]
    pub post_types: Vec<String>,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("data/wordpress.sqlite")
}
fn default_table_prefix() -> String {
    "wp_".to_string()
}
fn default_upload_dir() -> PathBuf {
    PathBuf::from(".")
}
fn default_home_url() -> String {
    "http://localhost".to_string()
}
fn default_post_types() -> Vec<String> {
    [
        "post",
        "page",
        "attachment",
        "revision",
        "nav_menu_item",
        "wp_block",
        "wp_template",
        "wp_template_part",
        "wp_navigation",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
fn default_page_size() -> usize {
    100
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            db_path: default_db_path(),
            table_prefix: default_table_prefix(),
            multi_tenant: None,
            upload_dir: default_upload_dir(),
            home_url: default_home_url(),
            post_types: default_post_types(),
            page_size: default_page_size(),
        }
    }
}

impl Settings {
    pub fn load(db_override: Option<&Path>) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(CONFIG_FILE).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("post_types"),
            )
            .set_override_option(
                "db_path",
                db_override.map(|p| p.to_string_lossy().into_owned()),
            )?
            .build()
            .context("Failed to load configuration")?;

        let settings: Settings = settings
            .try_deserialize()
            .context("Invalid configuration")?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            anyhow::bail!("page_size must be greater than zero");
        }
        if self.post_types.is_empty() {
            anyhow::bail!("post_types must list at least one registered post type");
        }
        Ok(())
    }
}
