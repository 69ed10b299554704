//! 설정 관리 — harness.toml 파싱 및 런타임 설정
//!
//! [`HarnessConfig`]는 모든 크레이트의 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. 환경변수 (`HARNESS_LOGS_FLUSH_THRESHOLD=20` 형식)
//! 2. 설정 파일 (`harness.toml`)
//! 3. 기본값 (`Default` 구현)
//!
//! 원격 백엔드 자격증명은 원래 운영 환경과의 호환을 위해
//! `PLURAL_ACCESS_TOKEN` / `PLURAL_ENDPOINT` 환경변수를 그대로 읽습니다.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, HarnessError};

/// Harness 통합 설정
///
/// `harness.toml` 파일의 최상위 구조를 나타냅니다.
/// 각 크레이트는 자기 섹션만 읽어 사용합니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 원격 백엔드 설정
    #[serde(default)]
    pub plural: PluralConfig,
    /// 컨트롤러 설정
    #[serde(default)]
    pub controller: ControllerConfig,
    /// 로그 파이프라인 설정
    #[serde(default)]
    pub logs: LogsConfig,
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// 로그 출력 형식 (json, pretty)
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

/// 원격 백엔드(Plural) 접속 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PluralConfig {
    /// API 엔드포인트 호스트. 비어 있으면 `app.plural.sh`를 사용합니다.
    #[serde(default)]
    pub endpoint: String,
    /// Bearer 토큰. 일반적으로 `PLURAL_ACCESS_TOKEN`으로 주입됩니다.
    #[serde(default)]
    pub token: String,
    /// 로그 전송 경로 선택
    #[serde(default)]
    pub transport: LogTransport,
}

/// 로그 싱크 전송 방식
///
/// 동일한 `LogSink` 인터페이스의 두 구현 중 배포별로 하나를 선택합니다.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogTransport {
    /// 배치 GraphQL HTTP 전송 (기본값)
    #[default]
    Http,
    /// Phoenix 소켓 실시간 전송
    Socket,
}

/// 컨트롤러 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// 스위트 완료 후 삭제까지의 보존 기간 (초)
    #[serde(default = "default_suite_ttl_secs")]
    pub suite_ttl_secs: u64,
}

/// 로그 파이프라인 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogsConfig {
    /// 스텝별 버퍼 플러시 임계값 (라인 수)
    #[serde(default = "default_flush_threshold")]
    pub flush_threshold: usize,
    /// 로그 스트림 조회 시 되돌아보는 범위 (초)
    #[serde(default = "default_since_seconds")]
    pub since_seconds: i64,
    /// 스트림 열기 재시도 최대 횟수
    #[serde(default = "default_retry_max_attempts")]
    pub retry_max_attempts: u32,
    /// 재시도 기본 지연 (밀리초)
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    /// 재시도 지연 지터 (퍼센트)
    #[serde(default = "default_retry_jitter_pct")]
    pub retry_jitter_pct: u8,
}

fn default_log_level() -> String {
    "info".to_owned()
}

fn default_log_format() -> String {
    "json".to_owned()
}

fn default_suite_ttl_secs() -> u64 {
    60 * 60 * 24
}

fn default_flush_threshold() -> usize {
    10
}

fn default_since_seconds() -> i64 {
    60 * 60 * 24
}

fn default_retry_max_attempts() -> u32 {
    10
}

fn default_retry_base_delay_ms() -> u64 {
    1000
}

fn default_retry_jitter_pct() -> u8 {
    5
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            suite_ttl_secs: default_suite_ttl_secs(),
        }
    }
}

impl Default for LogsConfig {
    fn default() -> Self {
        Self {
            flush_threshold: default_flush_threshold(),
            since_seconds: default_since_seconds(),
            retry_max_attempts: default_retry_max_attempts(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_jitter_pct: default_retry_jitter_pct(),
        }
    }
}

impl PluralConfig {
    /// 적용할 엔드포인트 호스트를 반환합니다.
    pub fn endpoint(&self) -> &str {
        if self.endpoint.is_empty() {
            "app.plural.sh"
        } else {
            &self.endpoint
        }
    }

    /// GraphQL API의 베이스 URL을 반환합니다.
    pub fn base_url(&self) -> String {
        format!("https://{}", self.endpoint())
    }

    /// Phoenix 소켓 접속 URL을 반환합니다.
    pub fn socket_url(&self) -> String {
        format!(
            "wss://{}/socket/websocket?token={}",
            self.endpoint(),
            self.token
        )
    }
}

impl HarnessConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, HarnessError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, HarnessError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                HarnessError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                HarnessError::Io(e)
            }
        })?;
        Self::parse(&content)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, HarnessError> {
        toml::from_str(toml_str).map_err(|e| {
            HarnessError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 네이밍 규칙은 `HARNESS_{SECTION}_{FIELD}`이며, 원격 자격증명은
    /// `PLURAL_ACCESS_TOKEN` / `PLURAL_ENDPOINT`를 추가로 읽습니다.
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "HARNESS_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "HARNESS_GENERAL_LOG_FORMAT");

        // Plural (운영 호환 환경변수 우선)
        override_string(&mut self.plural.endpoint, "PLURAL_ENDPOINT");
        override_string(&mut self.plural.token, "PLURAL_ACCESS_TOKEN");
        if let Ok(value) = std::env::var("HARNESS_PLURAL_TRANSPORT") {
            match value.as_str() {
                "http" => self.plural.transport = LogTransport::Http,
                "socket" => self.plural.transport = LogTransport::Socket,
                other => {
                    tracing::warn!(value = other, "ignoring invalid HARNESS_PLURAL_TRANSPORT");
                }
            }
        }

        // Controller
        override_u64(
            &mut self.controller.suite_ttl_secs,
            "HARNESS_CONTROLLER_SUITE_TTL_SECS",
        );

        // Logs
        override_usize(&mut self.logs.flush_threshold, "HARNESS_LOGS_FLUSH_THRESHOLD");
        override_i64(&mut self.logs.since_seconds, "HARNESS_LOGS_SINCE_SECONDS");
        override_u32(
            &mut self.logs.retry_max_attempts,
            "HARNESS_LOGS_RETRY_MAX_ATTEMPTS",
        );
        override_u64(
            &mut self.logs.retry_base_delay_ms,
            "HARNESS_LOGS_RETRY_BASE_DELAY_MS",
        );
        override_u8(
            &mut self.logs.retry_jitter_pct,
            "HARNESS_LOGS_RETRY_JITTER_PCT",
        );
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), HarnessError> {
        if self.general.log_format != "json" && self.general.log_format != "pretty" {
            return Err(invalid(
                "general.log_format",
                "expected 'json' or 'pretty'",
            ));
        }
        if self.controller.suite_ttl_secs == 0 {
            return Err(invalid("controller.suite_ttl_secs", "must be at least 1"));
        }
        if self.logs.flush_threshold == 0 {
            return Err(invalid("logs.flush_threshold", "must be at least 1"));
        }
        if self.logs.since_seconds <= 0 {
            return Err(invalid("logs.since_seconds", "must be positive"));
        }
        if self.logs.retry_max_attempts == 0 {
            return Err(invalid("logs.retry_max_attempts", "must be at least 1"));
        }
        if self.logs.retry_jitter_pct > 100 {
            return Err(invalid("logs.retry_jitter_pct", "must be 0-100"));
        }
        Ok(())
    }
}

fn invalid(field: &str, reason: &str) -> HarnessError {
    HarnessError::Config(ConfigError::InvalidValue {
        field: field.to_owned(),
        reason: reason.to_owned(),
    })
}

fn override_string(target: &mut String, var: &str) {
    if let Ok(value) = std::env::var(var) {
        *target = value;
    }
}

fn override_u64(target: &mut u64, var: &str) {
    if let Ok(value) = std::env::var(var) {
        match value.parse() {
            Ok(parsed) => *target = parsed,
            Err(_) => tracing::warn!(var = var, value = %value, "ignoring unparsable override"),
        }
    }
}

fn override_i64(target: &mut i64, var: &str) {
    if let Ok(value) = std::env::var(var) {
        match value.parse() {
            Ok(parsed) => *target = parsed,
            Err(_) => tracing::warn!(var = var, value = %value, "ignoring unparsable override"),
        }
    }
}

fn override_u32(target: &mut u32, var: &str) {
    if let Ok(value) = std::env::var(var) {
        match value.parse() {
            Ok(parsed) => *target = parsed,
            Err(_) => tracing::warn!(var = var, value = %value, "ignoring unparsable override"),
        }
    }
}

fn override_usize(target: &mut usize, var: &str) {
    if let Ok(value) = std::env::var(var) {
        match value.parse() {
            Ok(parsed) => *target = parsed,
            Err(_) => tracing::warn!(var = var, value = %value, "ignoring unparsable override"),
        }
    }
}

fn override_u8(target: &mut u8, var: &str) {
    if let Ok(value) = std::env::var(var) {
        match value.parse() {
            Ok(parsed) => *target = parsed,
            Err(_) => tracing::warn!(var = var, value = %value, "ignoring unparsable override"),
        }
    }
}
