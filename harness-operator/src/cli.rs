//! CLI argument definitions for harness-operator.
//!
//! Uses `clap` v4 derive macros to parse command-line arguments.

use std::path::PathBuf;

use clap::Parser;

/// Plural test harness operator.
///
/// Reconciles TestSuite resources: builds Argo workflows, mirrors their
/// status to the Plural backend, and streams step logs.
#[derive(Parser, Debug)]
#[command(name = "harness-operator")]
#[command(version, about, long_about = None)]
pub struct OperatorCli {
    /// Path to harness.toml configuration file.
    ///
    /// When the file does not exist, built-in defaults plus environment
    /// overrides are used.
    #[arg(short, long, default_value = "/etc/harness/harness.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override log format (json, pretty).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_format: Option<String>,

    /// Validate configuration and exit without starting the controller.
    #[arg(long)]
    pub validate: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        OperatorCli::command().debug_assert();
    }

    #[test]
    fn defaults_apply() {
        let cli = OperatorCli::parse_from(["harness-operator"]);
        assert_eq!(cli.config, PathBuf::from("/etc/harness/harness.toml"));
        assert!(cli.log_level.is_none());
        assert!(!cli.validate);
    }

    #[test]
    fn overrides_parse() {
        let cli = OperatorCli::parse_from([
            "harness-operator",
            "--config",
            "/tmp/harness.toml",
            "--log-level",
            "debug",
            "--log-format",
            "pretty",
            "--validate",
        ]);
        assert_eq!(cli.config, PathBuf::from("/tmp/harness.toml"));
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        assert_eq!(cli.log_format.as_deref(), Some("pretty"));
        assert!(cli.validate);
    }
}
