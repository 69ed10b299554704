use anyhow::Result;
use clap::Parser;

use harness_core::config::HarnessConfig;
use harness_core::error::{ConfigError, HarnessError};

mod cli;
mod logging;
mod operator;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = cli::OperatorCli::parse();

    // 설정 파일이 없으면 기본값 + 환경변수로 운용 (운영 배포는 보통
    // PLURAL_ACCESS_TOKEN / PLURAL_ENDPOINT만 주입)
    let mut config = match HarnessConfig::from_file(&cli.config).await {
        Ok(config) => config,
        Err(HarnessError::Config(ConfigError::FileNotFound { .. })) => HarnessConfig::default(),
        Err(e) => return Err(anyhow::anyhow!("failed to load config: {}", e)),
    };
    config.apply_env_overrides();

    if let Some(level) = cli.log_level {
        config.general.log_level = level;
    }
    if let Some(format) = cli.log_format {
        config.general.log_format = format;
    }
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;

    if cli.validate {
        println!("configuration OK");
        return Ok(());
    }

    logging::init_tracing(&config.general)?;
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        endpoint = config.plural.endpoint(),
        "harness-operator starting"
    );
    if config.plural.token.is_empty() {
        tracing::warn!("PLURAL_ACCESS_TOKEN is not set; remote backend calls will fail");
    }

    operator::run(config).await
}
