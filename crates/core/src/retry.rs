//! 재시도 정책 — 지수 백오프 + 지터
//!
//! 일시적 장애가 있는 외부 자원(로그 스트림 열기, 소켓 재접속 등)에 대한
//! 호출을 [`retry`]로 감싸 재시도합니다. 취소 토큰이 트리거되면
//! 대기 중이더라도 즉시 중단합니다.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;

use crate::config::LogsConfig;

/// 지수 백오프 정책
///
/// `attempt`번째 재시도 전 대기 시간은 `base * 2^attempt`에
/// ±`jitter_pct`% 지터를 더한 값이며, `max_delay`로 상한을 둡니다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// 첫 재시도 전 기본 지연
    pub base: Duration,
    /// 최대 시도 횟수 (최초 시도 포함)
    pub max_attempts: u32,
    /// 지연 지터 (퍼센트, 0-100)
    pub jitter_pct: u8,
    /// 지연 상한
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            max_attempts: 10,
            jitter_pct: 5,
            max_delay: Duration::from_secs(60),
        }
    }
}

impl BackoffPolicy {
    /// 새 백오프 정책을 생성합니다.
    pub fn new(base: Duration, max_attempts: u32, jitter_pct: u8) -> Self {
        Self {
            base,
            max_attempts,
            jitter_pct,
            ..Self::default()
        }
    }

    /// 로그 설정에서 정책을 구성합니다.
    pub fn from_logs_config(config: &LogsConfig) -> Self {
        Self::new(
            Duration::from_millis(config.retry_base_delay_ms),
            config.retry_max_attempts,
            config.retry_jitter_pct,
        )
    }

    /// `attempt`번째 실패 후 대기할 시간을 계산합니다 (0부터 시작).
    ///
    /// 지터가 설정된 경우 반환값은 호출마다 달라질 수 있습니다.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exp = attempt.min(31);
        let raw = self
            .base
            .saturating_mul(2u32.saturating_pow(exp))
            .min(self.max_delay);

        if self.jitter_pct == 0 {
            return raw;
        }

        let jitter = u64::from(self.jitter_pct);
        let millis = raw.as_millis() as u64;
        let spread = millis * jitter / 100;
        if spread == 0 {
            return raw;
        }
        let offset = rand::thread_rng().gen_range(0..=spread * 2);
        Duration::from_millis(millis - spread + offset)
    }
}

/// 재시도 실패 원인
#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    /// 모든 시도가 실패함
    #[error("retry exhausted after {attempts} attempts: {last}")]
    Exhausted {
        /// 수행한 시도 횟수
        attempts: u32,
        /// 마지막 에러
        #[source]
        last: E,
    },

    /// 취소 토큰이 트리거됨
    #[error("retry cancelled")]
    Cancelled,
}

/// 연산을 정책에 따라 재시도합니다.
///
/// 각 시도 사이의 대기 중에도 취소 토큰을 감시하며,
/// 취소되면 [`RetryError::Cancelled`]를 반환합니다.
pub async fn retry<T, E, F, Fut>(
    policy: &BackoffPolicy,
    cancel: &CancellationToken,
    mut op: F,
) -> Result<T, RetryError<E>>
where
    E: std::error::Error,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 0u32;
    loop {
        if cancel.is_cancelled() {
            return Err(RetryError::Cancelled);
        }

        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                attempt += 1;
                if attempt >= policy.max_attempts {
                    return Err(RetryError::Exhausted {
                        attempts: attempt,
                        last: err,
                    });
                }

                let delay = policy.delay(attempt - 1);
                tracing::debug!(
                    attempt = attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "retrying after transient failure"
                );

                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => return Err(RetryError::Cancelled),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug, thiserror::Error)]
    #[error("boom")]
    struct Boom;

    fn no_jitter(base_ms: u64, max_attempts: u32) -> BackoffPolicy {
        BackoffPolicy {
            base: Duration::from_millis(base_ms),
            max_attempts,
            jitter_pct: 0,
            max_delay: Duration::from_secs(60),
        }
    }

    #[test]
    fn delay_grows_exponentially() {
        let policy = no_jitter(100, 10);
        assert_eq!(policy.delay(0), Duration::from_millis(100));
        assert_eq!(policy.delay(1), Duration::from_millis(200));
        assert_eq!(policy.delay(2), Duration::from_millis(400));
        assert_eq!(policy.delay(3), Duration::from_millis(800));
    }

    #[test]
    fn delay_is_clamped() {
        let mut policy = no_jitter(1000, 10);
        policy.max_delay = Duration::from_secs(5);
        assert_eq!(policy.delay(10), Duration::from_secs(5));
        // 오버플로우 없이 처리되는지 확인
        assert_eq!(policy.delay(u32::MAX), Duration::from_secs(5));
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let policy = BackoffPolicy {
            base: Duration::from_millis(1000),
            max_attempts: 10,
            jitter_pct: 5,
            max_delay: Duration::from_secs(60),
        };
        for _ in 0..100 {
            let d = policy.delay(0).as_millis() as u64;
            assert!((950..=1050).contains(&d), "delay {d}ms outside jitter band");
        }
    }

    #[test]
    fn from_logs_config() {
        let config = LogsConfig::default();
        let policy = BackoffPolicy::from_logs_config(&config);
        assert_eq!(policy.base, Duration::from_secs(1));
        assert_eq!(policy.max_attempts, 10);
        assert_eq!(policy.jitter_pct, 5);
    }

    #[tokio::test]
    async fn retry_returns_first_success() {
        let policy = no_jitter(1, 10);
        let cancel = CancellationToken::new();
        let calls = Arc::new(AtomicU32::new(0));

        let counter = Arc::clone(&calls);
        let result: Result<u32, _> = retry(&policy, &cancel, move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, Boom>(7)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retry_recovers_after_failures() {
        let policy = no_jitter(1, 10);
        let cancel = CancellationToken::new();
        let calls = Arc::new(AtomicU32::new(0));

        let counter = Arc::clone(&calls);
        let result = retry(&policy, &cancel, move || {
            let counter = Arc::clone(&counter);
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(Boom)
                } else {
                    Ok("ready")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "ready");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retry_exhausts_after_max_attempts() {
        let policy = no_jitter(1, 3);
        let cancel = CancellationToken::new();
        let calls = Arc::new(AtomicU32::new(0));

        let counter = Arc::clone(&calls);
        let result: Result<(), _> = retry(&policy, &cancel, move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(Boom)
            }
        })
        .await;

        assert!(matches!(
            result,
            Err(RetryError::Exhausted { attempts: 3, .. })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retry_aborts_when_already_cancelled() {
        let policy = no_jitter(1, 10);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result: Result<(), _> =
            retry(&policy, &cancel, || async { Err::<(), _>(Boom) }).await;
        assert!(matches!(result, Err(RetryError::Cancelled)));
    }

    #[tokio::test]
    async fn retry_aborts_during_backoff_sleep() {
        let policy = no_jitter(60_000, 10);
        let cancel = CancellationToken::new();

        let token = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            token.cancel();
        });

        let started = std::time::Instant::now();
        let result: Result<(), _> =
            retry(&policy, &cancel, || async { Err::<(), _>(Boom) }).await;

        assert!(matches!(result, Err(RetryError::Cancelled)));
        // 60초 백오프를 다 기다리지 않고 취소에 반응해야 함
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
