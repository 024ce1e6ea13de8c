use super::types::*;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("validation failed:\n{}", .0.join("\n"))]
    ValidationList(Vec<String>),
}

pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let yaml = fs::read_to_string(path).map_err(|e| {
        ConfigError::Io(std::io::Error::new(
            e.kind(),
            format!("failed to read config file '{}': {}", path.display(), e),
        ))
    })?;
    parse_config(&yaml)
}

/// Parse and validate a YAML document. An empty document yields the defaults.
pub fn parse_config(yaml: &str) -> Result<Config, ConfigError> {
    let config: Config = if yaml.trim().is_empty() {
        Config::default()
    } else {
        serde_yaml::from_str(yaml)?
    };
    validate_config(&config)?;
    Ok(config)
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let mut errors = Vec::new();

    if config.input.module.trim().is_empty() {
        errors.push("input.module cannot be empty".to_string());
    } else if config.input.module.contains([':', ']', ' ']) {
        errors.push(format!(
            "input.module '{}' cannot contain ':', ']' or spaces",
            config.input.module
        ));
    }

    if config.report.placeholder.is_empty() {
        errors.push("report.placeholder cannot be empty".to_string());
    }

    if let (Some(from), Some(to)) = (config.report.window.from, config.report.window.to) {
        if from > to {
            errors.push(format!(
                "report.window.from ({}) is after report.window.to ({})",
                humantime::format_duration(from),
                humantime::format_duration(to)
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationList(errors))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_empty_document_is_default() {
        let config = parse_config("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.input.module, "http2");
        assert_eq!(config.report.placeholder, "--");
        assert_eq!(config.report.format, ReportFormat::Table);
    }

    #[test]
    fn test_partial_sections_fill_defaults() {
        let config = parse_config(
            r#"
report:
  format: json
  window:
    from: 1s 500ms
"#,
        )
        .unwrap();
        assert_eq!(config.report.format, ReportFormat::Json);
        assert_eq!(config.report.window.from, Some(Duration::from_millis(1500)));
        assert_eq!(config.report.window.to, None);
        assert_eq!(config.input.module, "http2");
    }

    #[test]
    fn test_validation_collects_every_problem() {
        let err = parse_config(
            r#"
input:
  module: ""
report:
  placeholder: ""
  window:
    from: 2s
    to: 1s
"#,
        )
        .unwrap_err();
        match err {
            ConfigError::ValidationList(errors) => assert_eq!(errors.len(), 3),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_bad_yaml() {
        assert!(matches!(
            parse_config("report: [unclosed"),
            Err(ConfigError::YamlParse(_))
        ));
        assert!(matches!(
            parse_config("report:\n  format: xml\n"),
            Err(ConfigError::YamlParse(_))
        ));
    }
}
