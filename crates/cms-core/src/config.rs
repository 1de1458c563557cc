//! Project configuration loading.
//!
//! Relative paths in the file (`database`, `attach`) are resolved against the
//! directory holding the config file.

use std::path::{Path, PathBuf};

use cms_model::ProjectConfig;
use cms_transform::check_template;
use regex::Regex;

use crate::error::ConfigError;

pub fn load_config(path: &Path) -> Result<ProjectConfig, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut config: ProjectConfig =
        toml::from_str(&contents).map_err(|source| ConfigError::Toml {
            path: path.to_path_buf(),
            source,
        })?;
    let base = path.parent().unwrap_or_else(|| Path::new(""));
    resolve_paths(&mut config, base);
    validate_config(&config)?;
    Ok(config)
}

fn resolve_paths(config: &mut ProjectConfig, base: &Path) {
    config.database = resolve(base, &config.database);
    for path in config.attach.values_mut() {
        *path = resolve(base, path);
    }
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() || path.as_os_str() == ":memory:" {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

pub fn validate_config(config: &ProjectConfig) -> Result<(), ConfigError> {
    if config.source.source_cd.trim().is_empty() {
        return Err(ConfigError::invalid("source.source_cd must not be empty"));
    }
    if config.etl.chunk_size == 0 {
        return Err(ConfigError::invalid("etl.chunk_size must be positive"));
    }
    for (key, pattern) in [
        ("etl.dx_pattern", &config.etl.dx_pattern),
        ("etl.px_pattern", &config.etl.px_pattern),
    ] {
        Regex::new(pattern)
            .map_err(|e| ConfigError::invalid(format!("{key} is not a valid regex: {e}")))?;
    }
    check_template(&config.fact_template)
        .map_err(|e| ConfigError::invalid(format!("fact_template: {e}")))?;

    let mut seen = std::collections::BTreeSet::new();
    for table in &config.tables {
        if !seen.insert(table.name.to_lowercase()) {
            return Err(ConfigError::invalid(format!(
                "table {} is configured twice",
                table.name
            )));
        }
        if table.transform_name.trim().is_empty() {
            return Err(ConfigError::invalid(format!(
                "table {} has no transform_name",
                table.name
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    const CONFIG: &str = r#"
database = "etl.db"
attach = { cms_deid = "/data/cms.db" }

[source]
schema = "cms_deid"
source_cd = "ccwdata.org"
download_date = "2017-01-01"

[etl]
chunk_size = 500
log_plan = true

[[tables]]
name = "bcarrier_claims"
transform_name = "CarrierClaimUpload"

[[tables]]
name = "outpatient_base_claims"
transform_name = "OutpatientClaimUpload"
provider = "at_physn_npi"
"#;

    fn write_config(text: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("etl.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(text.as_bytes()).unwrap();
        (dir, path)
    }

    #[test]
    fn test_load_resolves_relative_paths() {
        let (dir, path) = write_config(CONFIG);
        let config = load_config(&path).unwrap();
        assert_eq!(config.database, dir.path().join("etl.db"));
        assert_eq!(config.attach["cms_deid"], PathBuf::from("/data/cms.db"));
        assert_eq!(config.etl.chunk_size, 500);
        assert_eq!(config.tables.len(), 2);
        assert_eq!(
            config.table("outpatient_base_claims").unwrap().admin.provider.as_deref(),
            Some("at_physn_npi")
        );
    }

    #[test]
    fn test_missing_file() {
        let err = load_config(Path::new("/nonexistent/etl.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_bad_toml() {
        let (_dir, path) = write_config("database = ");
        assert!(matches!(load_config(&path).unwrap_err(), ConfigError::Toml { .. }));
    }

    #[test]
    fn test_invalid_settings() {
        let (_dir, path) = write_config(&CONFIG.replace("chunk_size = 500", "chunk_size = 0"));
        assert!(matches!(load_config(&path).unwrap_err(), ConfigError::Invalid { .. }));

        let twice = format!(
            "{CONFIG}\n[[tables]]\nname = \"BCARRIER_CLAIMS\"\ntransform_name = \"X\"\n"
        );
        let (_dir, path) = write_config(&twice);
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("configured twice"));
    }
}
