//! 테스트 전용 mock 구현 모음
//!
//! 퍼블리셔/워처/매니저 단위 테스트가 공유하는 기록형 mock들입니다.

use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use futures::StreamExt;

use harness_core::types::TestStatus;
use harness_plural::api::{Test, TestAttributes};
use harness_plural::client::TestApi;
use harness_plural::error::PluralError;
use harness_plural::sink::LogSink;

use crate::error::LogsError;
use crate::watcher::{LineStream, LogStreamer};

/// publish/upload 호출을 기록하는 TestApi mock
#[derive(Default)]
pub(crate) struct RecordingApi {
    batches: Mutex<Vec<(String, String)>>,
    uploads: Mutex<Vec<(String, String)>>,
    fail_publish: AtomicBool,
}

impl RecordingApi {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// publish_logs가 항상 실패하도록 설정합니다.
    pub(crate) fn with_failing_publish(self) -> Self {
        self.fail_publish.store(true, Ordering::SeqCst);
        self
    }

    /// 기록된 (step_id, batch) 목록을 반환합니다.
    pub(crate) fn published_batches(&self) -> Vec<(String, String)> {
        self.batches.lock().unwrap().clone()
    }

    /// 기록된 (step_id, 파일 내용) 업로드 목록을 반환합니다.
    pub(crate) fn uploads(&self) -> Vec<(String, String)> {
        self.uploads.lock().unwrap().clone()
    }
}

impl TestApi for RecordingApi {
    async fn create_test(
        &self,
        _repository: &str,
        attrs: &TestAttributes,
    ) -> Result<Test, PluralError> {
        Ok(Test {
            id: "tst-mock".to_owned(),
            name: attrs.name.clone(),
            status: TestStatus::Queued,
            promote_tag: attrs.promote_tag.clone(),
            steps: Vec::new(),
        })
    }

    async fn update_test(&self, id: &str, attrs: &TestAttributes) -> Result<Test, PluralError> {
        Ok(Test {
            id: id.to_owned(),
            name: attrs.name.clone(),
            status: attrs.status,
            promote_tag: attrs.promote_tag.clone(),
            steps: Vec::new(),
        })
    }

    async fn publish_logs(&self, step_id: &str, logs: &str) -> Result<(), PluralError> {
        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(PluralError::Api {
                message: "mock publish failure".to_owned(),
            });
        }
        self.batches
            .lock()
            .unwrap()
            .push((step_id.to_owned(), logs.to_owned()));
        Ok(())
    }

    async fn update_step(&self, step_id: &str, log_file: &Path) -> Result<(), PluralError> {
        let contents = std::fs::read_to_string(log_file).unwrap_or_default();
        self.uploads
            .lock()
            .unwrap()
            .push((step_id.to_owned(), contents));
        Ok(())
    }
}

/// 전달된 라인을 기록하는 LogSink mock
#[derive(Default)]
pub(crate) struct RecordingSink {
    lines: Mutex<Vec<(String, String)>>,
    closed: AtomicBool,
    fail_close: AtomicBool,
}

impl RecordingSink {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_failing_close(self) -> Self {
        self.fail_close.store(true, Ordering::SeqCst);
        self
    }

    /// 기록된 (step_id, line) 목록을 반환합니다.
    pub(crate) fn lines(&self) -> Vec<(String, String)> {
        self.lines.lock().unwrap().clone()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl LogSink for RecordingSink {
    async fn publish(&self, line: &str, step_id: &str) -> Result<(), PluralError> {
        self.lines
            .lock()
            .unwrap()
            .push((step_id.to_owned(), line.to_owned()));
        Ok(())
    }

    async fn close(&self) -> Result<(), PluralError> {
        self.closed.store(true, Ordering::SeqCst);
        if self.fail_close.load(Ordering::SeqCst) {
            return Err(PluralError::Api {
                message: "mock close failure".to_owned(),
            });
        }
        Ok(())
    }
}

/// 설정 가능한 LogStreamer mock
///
/// 모든 컨테이너에 같은 라인 목록을 내보냅니다. `failing_container`로
/// 지정된 컨테이너는 열기가 항상 실패하고, `fail_first_opens`만큼의
/// 초기 열기 시도는 전역적으로 실패합니다.
#[derive(Default)]
pub(crate) struct MockStreamer {
    lines: Vec<String>,
    hold_open: bool,
    fail_first_opens: AtomicU32,
    failing_container: Option<String>,
    opens: AtomicU32,
}

impl MockStreamer {
    pub(crate) fn with_lines(lines: &[&str]) -> Self {
        Self {
            lines: lines.iter().map(|s| (*s).to_owned()).collect(),
            ..Self::default()
        }
    }

    /// 라인 소진 후에도 스트림을 닫지 않습니다 (취소 테스트용).
    pub(crate) fn hold_open(mut self) -> Self {
        self.hold_open = true;
        self
    }

    /// 처음 `n`번의 열기 시도가 실패하도록 설정합니다.
    pub(crate) fn failing_first(self, n: u32) -> Self {
        self.fail_first_opens.store(n, Ordering::SeqCst);
        self
    }

    /// 지정한 컨테이너의 열기가 항상 실패하도록 설정합니다.
    pub(crate) fn failing_container(mut self, container: &str) -> Self {
        self.failing_container = Some(container.to_owned());
        self
    }

    /// 수행된 열기 시도 횟수를 반환합니다.
    pub(crate) fn open_count(&self) -> u32 {
        self.opens.load(Ordering::SeqCst)
    }
}

impl LogStreamer for MockStreamer {
    async fn open_lines(
        &self,
        _namespace: &str,
        _pod: &str,
        container: &str,
        _since_seconds: i64,
    ) -> Result<LineStream, LogsError> {
        self.opens.fetch_add(1, Ordering::SeqCst);

        if self.failing_container.as_deref() == Some(container) {
            return Err(LogsError::StreamOpen {
                container: container.to_owned(),
                reason: "mock failure".to_owned(),
            });
        }

        let remaining = self.fail_first_opens.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_first_opens.store(remaining - 1, Ordering::SeqCst);
            return Err(LogsError::StreamOpen {
                container: container.to_owned(),
                reason: "mock transient failure".to_owned(),
            });
        }

        let lines = futures::stream::iter(self.lines.clone().into_iter().map(Ok));
        if self.hold_open {
            Ok(Box::pin(lines.chain(futures::stream::pending())))
        } else {
            Ok(Box::pin(lines))
        }
    }
}

/// 조건이 참이 될 때까지 폴링합니다. 시한 초과 시 패닉합니다.
pub(crate) async fn wait_until<F>(mut condition: F, what: &str)
where
    F: FnMut() -> bool,
{
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(
            std::time::Instant::now() < deadline,
            "timed out waiting for {what}"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
