//! 로그 파이프라인 에러 타입

use harness_core::error::{HarnessError, LogError};
use harness_plural::PluralError;

/// 로그 파이프라인 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum LogsError {
    /// 컨테이너 로그 스트림 열기 실패 (재시도 소진 포함)
    #[error("stream open failed for container '{container}': {reason}")]
    StreamOpen {
        /// 대상 컨테이너 이름
        container: String,
        /// 실패 사유
        reason: String,
    },

    /// 원격 전달 실패
    #[error("delivery failed: {0}")]
    Delivery(#[from] PluralError),

    /// 등록되지 않은 스위트에 대한 취소 요청 (호출자 버그)
    #[error("no manager found for {0}")]
    UnknownSuite(String),

    /// I/O 에러 (스크래치 파일 등)
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<LogsError> for HarnessError {
    fn from(err: LogsError) -> Self {
        match err {
            LogsError::StreamOpen { container, reason } => {
                HarnessError::Log(LogError::StreamOpen { container, reason })
            }
            LogsError::Delivery(e) => e.into(),
            LogsError::UnknownSuite(key) => HarnessError::Log(LogError::UnknownSuite(key)),
            LogsError::Io(e) => HarnessError::Io(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_open_display() {
        let err = LogsError::StreamOpen {
            container: "main".to_owned(),
            reason: "pod not ready".to_owned(),
        };
        let msg = err.to_string();
        assert!(msg.contains("main"));
        assert!(msg.contains("pod not ready"));
    }

    #[test]
    fn unknown_suite_display() {
        let err = LogsError::UnknownSuite("default:smoke".to_owned());
        assert!(err.to_string().contains("default:smoke"));
    }

    #[test]
    fn converts_to_harness_error() {
        let err: HarnessError = LogsError::UnknownSuite("default:smoke".to_owned()).into();
        assert!(matches!(err, HarnessError::Log(LogError::UnknownSuite(_))));

        let err: HarnessError = LogsError::Delivery(PluralError::Closed).into();
        assert!(matches!(err, HarnessError::Remote(_)));
    }
}
