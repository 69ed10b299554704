//! 컨트롤러 에러 타입

use harness_logs::LogsError;
use harness_plural::PluralError;

/// 리컨실 도메인 에러
///
/// [`is_recoverable`](ControllerError::is_recoverable)이 참인 에러는
/// 상태를 변경하지 않고 재큐만 필요한 일시적 상황을 나타냅니다.
#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    /// Kubernetes API 호출 실패
    #[error("kube api error: {0}")]
    Kube(#[from] kube::Error),

    /// 스텝이 하나도 없는 스위트
    #[error("test suite has no steps")]
    EmptySuite,

    /// 정상 상태 리컨실 중 워크플로우를 찾지 못함 (복구 가능, 재큐)
    #[error("workflow not found: {namespace}/{name}")]
    WorkflowNotFound {
        /// 워크플로우 네임스페이스
        namespace: String,
        /// 워크플로우 이름
        name: String,
    },

    /// 리소스 메타데이터 누락
    #[error("resource metadata missing field '{0}'")]
    MissingMetadata(&'static str),

    /// 원격 백엔드 호출 실패
    #[error("remote error: {0}")]
    Remote(#[from] PluralError),

    /// 로그 파이프라인 에러
    #[error("log error: {0}")]
    Logs(#[from] LogsError),
}

impl ControllerError {
    /// 일시적이어서 재큐로 해소되는 에러인지 판정합니다.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::WorkflowNotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workflow_not_found_is_recoverable() {
        let err = ControllerError::WorkflowNotFound {
            namespace: "default".to_owned(),
            name: "smoke-abcdefgh".to_owned(),
        };
        assert!(err.is_recoverable());
        assert!(err.to_string().contains("default/smoke-abcdefgh"));
    }

    #[test]
    fn bootstrap_errors_are_not_recoverable() {
        assert!(!ControllerError::EmptySuite.is_recoverable());
        assert!(
            !ControllerError::Remote(PluralError::Api {
                message: "denied".to_owned()
            })
            .is_recoverable()
        );
    }
}
