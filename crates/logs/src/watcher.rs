//! 파드 로그 워처 -- 컨테이너별 테일링 태스크
//!
//! [`LogWatcher`]는 파드 하나를 담당하며, 파드의 컨테이너마다 테일링
//! 태스크를 하나씩 띄웁니다. 각 태스크는 follow 모드 로그 스트림을
//! 백오프 재시도로 열고, 읽어낸 라인을 순서대로 스위트의 싱크에 전달하며
//! 스크래치 파일에도 기록합니다. 모든 컨테이너 태스크가 끝나면 스크래치
//! 파일 전체를 스텝의 영구 로그 아티팩트로 업로드합니다.
//!
//! 취소는 협력적입니다: 라인 하나를 처리하던 중이라면 그 라인은
//! 끝까지 처리되고, 다음 라인을 읽기 전에 중단됩니다.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures::{Stream, StreamExt};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use harness_core::metrics as m;
use harness_core::retry::{BackoffPolicy, retry};
use harness_plural::client::TestApi;
use harness_plural::sink::LogSink;

use crate::error::LogsError;

/// 컨테이너 로그의 라인 스트림
pub type LineStream = Pin<Box<dyn Stream<Item = std::io::Result<String>> + Send>>;

/// 컨테이너 로그 스트림 공급자
///
/// 프로덕션 구현은 Kubernetes API의 follow 로그 스트림을 열며
/// (`harness-controller`의 `KubeLogStreamer`), 테스트에서는 mock을
/// 사용합니다.
pub trait LogStreamer: Send + Sync + 'static {
    /// 지정한 컨테이너의 로그를 `since_seconds`만큼 되돌아본 시점부터
    /// follow 모드로 엽니다.
    fn open_lines(
        &self,
        namespace: &str,
        pod: &str,
        container: &str,
        since_seconds: i64,
    ) -> impl Future<Output = Result<LineStream, LogsError>> + Send;
}

/// 테일링 대상 파드 (전송 계층에 독립적인 표현)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodHandle {
    /// 파드 네임스페이스
    pub namespace: String,
    /// 파드 이름
    pub name: String,
    /// 컨테이너 이름 목록
    pub containers: Vec<String>,
}

/// 파드 단위 로그 워처
pub struct LogWatcher {
    /// 담당 파드
    pod: PodHandle,
    /// 라인을 귀속시킬 원격 스텝 ID
    step_id: String,
}

impl LogWatcher {
    /// 새 워처를 생성합니다.
    pub fn new(pod: PodHandle, step_id: impl Into<String>) -> Self {
        Self {
            pod,
            step_id: step_id.into(),
        }
    }

    /// 워처 태스크를 스위트 트래커에 등록하고 시작합니다.
    ///
    /// 파드의 컨테이너마다 테일링 태스크를 하나씩 띄우고, 전부 끝나면
    /// 스크래치 파일을 업로드하는 조정 태스크가 트래커에 들어갑니다.
    pub fn spawn<C, K, S>(
        self,
        api: Arc<C>,
        sink: Arc<K>,
        streamer: Arc<S>,
        policy: BackoffPolicy,
        since_seconds: i64,
        cancel: CancellationToken,
        tracker: &TaskTracker,
    ) where
        C: TestApi,
        K: LogSink,
        S: LogStreamer,
    {
        tracker.spawn(async move {
            if let Err(e) = self.tail(api, sink, streamer, policy, since_seconds, cancel).await {
                warn!(error = %e, "pod log watcher failed");
            }
        });
    }

    /// 컨테이너 태스크들을 띄우고 드레인한 뒤 아티팩트를 업로드합니다.
    async fn tail<C, K, S>(
        self,
        api: Arc<C>,
        sink: Arc<K>,
        streamer: Arc<S>,
        policy: BackoffPolicy,
        since_seconds: i64,
        cancel: CancellationToken,
    ) -> Result<(), LogsError>
    where
        C: TestApi,
        K: LogSink,
        S: LogStreamer,
    {
        metrics::gauge!(m::LOGS_WATCHERS_ACTIVE).increment(1.0);
        debug!(pod = %self.pod.name, containers = self.pod.containers.len(), "starting pod log watcher");

        // 파드의 모든 컨테이너 태스크가 공유하는 스크래치 파일.
        // 드롭 시 자동 삭제됩니다.
        let scratch = tempfile::NamedTempFile::new()?;
        let file = Arc::new(Mutex::new(tokio::fs::File::from_std(scratch.reopen()?)));

        let containers = TaskTracker::new();
        for container in &self.pod.containers {
            containers.spawn(tail_container(
                Arc::clone(&streamer),
                Arc::clone(&sink),
                Arc::clone(&file),
                self.pod.namespace.clone(),
                self.pod.name.clone(),
                container.clone(),
                self.step_id.clone(),
                policy.clone(),
                since_seconds,
                cancel.clone(),
            ));
        }
        containers.close();
        containers.wait().await;

        info!(pod = %self.pod.name, step_id = %self.step_id, "uploading step log artifact");
        match api.update_step(&self.step_id, scratch.path()).await {
            Ok(()) => {
                metrics::counter!(m::LOGS_ARTIFACTS_UPLOADED_TOTAL, m::LABEL_RESULT => "success")
                    .increment(1);
            }
            Err(e) => {
                metrics::counter!(m::LOGS_ARTIFACTS_UPLOADED_TOTAL, m::LABEL_RESULT => "failure")
                    .increment(1);
                warn!(step_id = %self.step_id, error = %e, "failed to upload step log artifact");
            }
        }

        metrics::gauge!(m::LOGS_WATCHERS_ACTIVE).decrement(1.0);
        Ok(())
    }
}

/// 단일 컨테이너를 테일링합니다.
///
/// 스트림 열기는 백오프 정책에 따라 재시도하며, 소진되면 이 컨테이너만
/// 포기합니다 (다른 컨테이너 태스크에는 영향 없음).
#[allow(clippy::too_many_arguments)]
async fn tail_container<K, S>(
    streamer: Arc<S>,
    sink: Arc<K>,
    file: Arc<Mutex<tokio::fs::File>>,
    namespace: String,
    pod: String,
    container: String,
    step_id: String,
    policy: BackoffPolicy,
    since_seconds: i64,
    cancel: CancellationToken,
) where
    K: LogSink,
    S: LogStreamer,
{
    let open = retry(&policy, &cancel, || {
        streamer.open_lines(&namespace, &pod, &container, since_seconds)
    })
    .await;

    let mut lines = match open {
        Ok(stream) => stream,
        Err(e) => {
            warn!(
                pod = %pod,
                container = %container,
                error = %e,
                "giving up on container log stream"
            );
            return;
        }
    };

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(pod = %pod, container = %container, "log tail cancelled");
                break;
            }
            next = lines.next() => match next {
                Some(Ok(line)) => {
                    {
                        let mut file = file.lock().await;
                        if let Err(e) = file.write_all(format!("{line}\n").as_bytes()).await {
                            warn!(container = %container, error = %e, "failed to append scratch file");
                        }
                    }
                    if let Err(e) = sink.publish(&line, &step_id).await {
                        warn!(container = %container, error = %e, "failed to publish line");
                    }
                }
                Some(Err(e)) => {
                    warn!(pod = %pod, container = %container, error = %e, "log stream read failed");
                    break;
                }
                None => {
                    debug!(pod = %pod, container = %container, "log stream ended");
                    break;
                }
            },
        }
    }
}
