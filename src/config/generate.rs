pub fn generate_starter_config() -> String {
    r#"# =============================================================================
# H2TRACE CONFIGURATION
# =============================================================================
# Every setting is optional; omitted settings take the defaults shown here.
# Command line flags override the values in this file.
#
# Config file locations (in order of precedence):
#   1. Path specified via --config argument
#   2. ~/.config/h2trace/config.yml
#   3. /etc/h2trace/config.yml

# =============================================================================
# INPUT
# =============================================================================

input:
  # Module tag of the lines to analyse, as in '[http2:debug]'.
  # Use 'proxy_http2' to follow the proxy side instead.
  module: http2

# =============================================================================
# REPORTS
# =============================================================================

report:
  # Output format: 'table' or 'json'
  format: table
  # Printed in place of a lifecycle event that was never logged
  placeholder: "--"
  # Print ingestion counters (skipped lines, orphans, anomalies) to stderr
  diagnostics: false
  # Restrict reports to a slice of the log, measured from its first line.
  # Durations use humantime syntax: 250ms, 1s 500ms, 2m
  # window:
  #   from: 0s
  #   to: 10s
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse::parse_config;
    use crate::config::Config;

    #[test]
    fn test_starter_config_parses_to_defaults() {
        let config = parse_config(&generate_starter_config()).unwrap();
        assert_eq!(config, Config::default());
    }
}
