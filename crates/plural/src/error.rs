//! 원격 백엔드 에러 타입
//!
//! [`PluralError`]는 GraphQL API 호출과 소켓 채널에서 발생하는 모든 에러를
//! 표현합니다. `From<PluralError> for HarnessError` 변환이 구현되어 있어
//! 상위 레이어에서 `?` 연산자로 자연스럽게 전파할 수 있습니다.

use harness_core::error::{HarnessError, RemoteError};

/// Plural 백엔드 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum PluralError {
    /// HTTP 전송 실패
    #[error("http transport failed: {0}")]
    Http(#[from] reqwest::Error),

    /// GraphQL 응답에 에러가 포함됨
    #[error("api error: {message}")]
    Api {
        /// 서버가 반환한 에러 메시지
        message: String,
    },

    /// 응답 본문 해석 실패
    #[error("failed to decode response: {0}")]
    Decode(String),

    /// 로그 파일 업로드 실패
    #[error("upload of '{path}' failed: {reason}")]
    Upload {
        /// 업로드 대상 파일 경로
        path: String,
        /// 실패 사유
        reason: String,
    },

    /// 소켓 채널 에러
    #[error("socket error: {0}")]
    Socket(String),

    /// 닫힌 싱크에 대한 전송 시도
    #[error("log sink already closed")]
    Closed,

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<PluralError> for HarnessError {
    fn from(err: PluralError) -> Self {
        let remote = match err {
            PluralError::Http(e) => RemoteError::Http(e.to_string()),
            PluralError::Api { message } => RemoteError::Api { message },
            PluralError::Decode(reason) => RemoteError::Api { message: reason },
            PluralError::Upload { path, reason } => {
                RemoteError::Upload(format!("{path}: {reason}"))
            }
            PluralError::Socket(reason) => RemoteError::Socket(reason),
            PluralError::Closed => RemoteError::Socket("sink closed".to_owned()),
            PluralError::Io(e) => return HarnessError::Io(e),
        };
        HarnessError::Remote(remote)
    }
}
