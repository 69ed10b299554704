//! 로그 퍼블리셔 -- 스텝별 버퍼링 및 배치 플러시
//!
//! [`LogPublisher`]는 수집된 로그 라인을 원격 스텝 ID별로 버퍼링하고,
//! 임계값에 도달하면 개행으로 이어붙인 배치를 `publishLogs`로 전달합니다.
//!
//! # 불변식
//! `publish` 호출이 반환된 직후 어떤 스텝의 버퍼도 임계값 이상을 담지
//! 않습니다 -- 임계값 도달은 호출 내부에서 동기적으로 전달을 트리거합니다.
//!
//! # 전달 직렬화
//! 전달 호출은 버퍼 락을 쥔 채 수행됩니다. 같은 퍼블리셔의 전달이
//! 직렬화되어 동일 스텝 로그에 부분 쓰기가 섞이지 않습니다. 플러시
//! 배치가 작으므로 다른 스텝의 플러시가 잠시 지연되는 비용은 감수합니다.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::warn;

use harness_core::metrics as m;
use harness_plural::client::TestApi;
use harness_plural::error::PluralError;
use harness_plural::sink::LogSink;

/// 기본 플러시 임계값 (라인 수)
pub const DEFAULT_FLUSH_THRESHOLD: usize = 10;

/// 스텝별 버퍼링 배치 싱크
///
/// 스위트마다 하나씩 생성되며, 여러 워처 태스크가 동시에 공유합니다.
pub struct LogPublisher<C: TestApi> {
    /// 원격 백엔드 클라이언트
    api: Arc<C>,
    /// 스텝 ID -> 대기 중인 라인 (버퍼 맵 전체를 하나의 락으로 보호)
    buffers: Mutex<HashMap<String, Vec<String>>>,
    /// 플러시 임계값
    flush_threshold: usize,
}

impl<C: TestApi> LogPublisher<C> {
    /// 새 퍼블리셔를 생성합니다.
    pub fn new(api: Arc<C>, flush_threshold: usize) -> Self {
        Self {
            api,
            buffers: Mutex::new(HashMap::new()),
            flush_threshold: flush_threshold.max(1),
        }
    }

    /// 기본 임계값(10라인)으로 퍼블리셔를 생성합니다.
    pub fn with_defaults(api: Arc<C>) -> Self {
        Self::new(api, DEFAULT_FLUSH_THRESHOLD)
    }

    /// 플러시 임계값을 반환합니다.
    pub fn flush_threshold(&self) -> usize {
        self.flush_threshold
    }

    /// 특정 스텝의 대기 중인 라인 수를 반환합니다.
    pub async fn buffered(&self, step_id: &str) -> usize {
        self.buffers
            .lock()
            .await
            .get(step_id)
            .map_or(0, Vec::len)
    }

    /// 전체 대기 중인 라인 수를 반환합니다.
    pub async fn pending_total(&self) -> usize {
        self.buffers.lock().await.values().map(Vec::len).sum()
    }

    /// 배치를 개행으로 이어붙여 전달합니다.
    async fn deliver(&self, step_id: &str, lines: Vec<String>) -> Result<(), PluralError> {
        let dropped = lines.len();
        let text = lines.join("\n");
        match self.api.publish_logs(step_id, &text).await {
            Ok(()) => {
                metrics::counter!(m::LOGS_FLUSHES_TOTAL, m::LABEL_RESULT => "success").increment(1);
                Ok(())
            }
            Err(e) => {
                metrics::counter!(m::LOGS_FLUSHES_TOTAL, m::LABEL_RESULT => "failure").increment(1);
                metrics::counter!(m::LOGS_LINES_DROPPED_TOTAL).increment(dropped as u64);
                Err(e)
            }
        }
    }
}

impl<C: TestApi> LogSink for LogPublisher<C> {
    async fn publish(&self, line: &str, step_id: &str) -> Result<(), PluralError> {
        let mut buffers = self.buffers.lock().await;
        let buffer = buffers.entry(step_id.to_owned()).or_default();
        buffer.push(line.to_owned());

        metrics::counter!(m::LOGS_LINES_PUBLISHED_TOTAL, m::LABEL_TRANSPORT => "http")
            .increment(1);

        if buffer.len() >= self.flush_threshold {
            let batch = std::mem::take(buffer);
            // 느린 백엔드가 수집을 막지 않도록 전달 실패는 로깅으로 처리
            if let Err(e) = self.deliver(step_id, batch).await {
                warn!(step_id = %step_id, error = %e, "batch delivery failed, lines dropped");
            }
        }

        Ok(())
    }

    async fn close(&self) -> Result<(), PluralError> {
        let mut buffers = self.buffers.lock().await;
        let mut first_error = None;

        for (step_id, lines) in buffers.drain() {
            if lines.is_empty() {
                continue;
            }
            if let Err(e) = self.deliver(&step_id, lines).await {
                warn!(step_id = %step_id, error = %e, "final flush failed, lines dropped");
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }

        match first_error {
            None => Ok(()),
            Some(e) => Err(e),
        }
    }
}
