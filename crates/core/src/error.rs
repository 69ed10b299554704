//! 에러 타입 — 도메인별 에러 정의

/// Harness 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 원격 백엔드(Plural) 에러
    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),

    /// Kubernetes API 에러
    #[error("kube error: {0}")]
    Kube(#[from] KubeError),

    /// 로그 파이프라인 에러
    #[error("log error: {0}")]
    Log(#[from] LogError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 원격 백엔드 에러
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    /// HTTP 전송 실패
    #[error("http transport failed: {0}")]
    Http(String),

    /// GraphQL 응답 에러
    #[error("api error: {message}")]
    Api { message: String },

    /// 로그 파일 업로드 실패
    #[error("upload failed: {0}")]
    Upload(String),

    /// 소켓 채널 에러
    #[error("socket error: {0}")]
    Socket(String),
}

/// Kubernetes API 에러
#[derive(Debug, thiserror::Error)]
pub enum KubeError {
    /// API 호출 실패
    #[error("api call failed: {0}")]
    Api(String),

    /// 리소스를 찾을 수 없음
    #[error("{kind} not found: {name}")]
    NotFound { kind: String, name: String },
}

/// 로그 파이프라인 에러
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    /// 로그 스트림 열기 실패
    #[error("stream open failed for container '{container}': {reason}")]
    StreamOpen { container: String, reason: String },

    /// 라인 전달 실패
    #[error("publish failed: {0}")]
    Publish(String),

    /// 등록되지 않은 스위트
    #[error("no manager found for {0}")]
    UnknownSuite(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_display() {
        let err = ConfigError::InvalidValue {
            field: "logs.flush_threshold".to_owned(),
            reason: "must be at least 1".to_owned(),
        };
        let msg = err.to_string();
        assert!(msg.contains("logs.flush_threshold"));
        assert!(msg.contains("must be at least 1"));
    }

    #[test]
    fn remote_error_display() {
        let err = RemoteError::Api {
            message: "test not found".to_owned(),
        };
        assert!(err.to_string().contains("test not found"));
    }

    #[test]
    fn sub_errors_convert_to_harness_error() {
        let err: HarnessError = ConfigError::ParseFailed {
            reason: "bad toml".to_owned(),
        }
        .into();
        assert!(matches!(err, HarnessError::Config(_)));

        let err: HarnessError = LogError::UnknownSuite("default:smoke".to_owned()).into();
        assert!(matches!(err, HarnessError::Log(_)));

        let err: HarnessError = KubeError::NotFound {
            kind: "Workflow".to_owned(),
            name: "smoke-abcdefgh".to_owned(),
        }
        .into();
        assert!(err.to_string().contains("Workflow not found"));
    }
}
