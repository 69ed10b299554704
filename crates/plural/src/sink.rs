//! 로그 싱크 capability trait
//!
//! 워처가 읽어낸 로그 라인을 원격 백엔드로 전달하는 경로는 두 가지가
//! 있습니다: 배치 HTTP 전송(`harness-logs`의 `LogPublisher`)과 Phoenix
//! 소켓 실시간 전송([`SocketSink`](crate::socket::SocketSink)).
//! 두 구현 모두 이 trait을 통해 교체 가능하며, 배포별로 하나를 선택합니다.

use std::future::Future;

use crate::error::PluralError;

/// 스텝 단위 로그 라인 전달 인터페이스
///
/// 구현체는 스레드 안전해야 하며, 여러 컨테이너 태스크가 동시에
/// `publish`를 호출할 수 있습니다.
pub trait LogSink: Send + Sync + 'static {
    /// 한 라인을 지정한 원격 스텝으로 전달합니다.
    ///
    /// 단일 컨테이너에서 읽힌 라인은 읽힌 순서대로 전달됩니다.
    fn publish(
        &self,
        line: &str,
        step_id: &str,
    ) -> impl Future<Output = Result<(), PluralError>> + Send;

    /// 싱크를 닫습니다.
    ///
    /// 버퍼링 구현은 남은 라인을 모두 플러시한 뒤 닫으며,
    /// 처음 만난 전달 에러를 반환합니다.
    fn close(&self) -> impl Future<Output = Result<(), PluralError>> + Send;
}
