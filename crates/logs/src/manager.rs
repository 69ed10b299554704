//! 스위트 로그 매니저 -- 워처 레지스트리와 취소 범위
//!
//! [`SuiteManager`]는 스위트 하나의 활성 워처 집합과 취소 범위, 로그
//! 싱크를 소유합니다. [`LogManager`]는 프로세스 전역 레지스트리로,
//! 스위트 식별자(`"{namespace}:{name}"`)를 매니저에 매핑합니다.
//!
//! 해체 순서는 항상 signal -> join -> flush입니다: 취소 토큰을 트리거하고,
//! 모든 워처 태스크가 드레인될 때까지 기다린 뒤, 싱크를 플러시하고 닫습니다.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info};

use harness_core::config::LogsConfig;
use harness_core::retry::BackoffPolicy;
use harness_core::types::SuiteRef;
use harness_plural::client::TestApi;
use harness_plural::sink::LogSink;

use crate::error::LogsError;
use crate::watcher::{LogStreamer, LogWatcher, PodHandle};

/// 로그 파이프라인이 필요로 하는 스위트 정보
///
/// 소켓 싱크는 원격 스위트 ID로 토픽을 결정하므로 식별자와 함께 들고
/// 다닙니다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuiteHandle {
    /// 스위트 식별자
    pub suite: SuiteRef,
    /// 원격 백엔드가 부여한 스위트 ID
    pub remote_id: String,
}

/// 스위트별 싱크를 만들어내는 팩토리
///
/// 배포 시점에 전송 방식(배치 HTTP / 소켓)을 선택하는 지점입니다.
pub type SinkFactory<K> = Box<dyn Fn(&SuiteHandle) -> Arc<K> + Send + Sync>;

/// 스위트 하나의 로그 파이프라인 상태
pub struct SuiteManager<C, K, S>
where
    C: TestApi,
    K: LogSink,
    S: LogStreamer,
{
    api: Arc<C>,
    sink: Arc<K>,
    streamer: Arc<S>,
    policy: BackoffPolicy,
    since_seconds: i64,
    cancel: CancellationToken,
    tracker: TaskTracker,
    /// 워처가 붙은 파드 이름 집합 (파드당 워처 1개 보장)
    pods: Mutex<HashSet<String>>,
}

impl<C, K, S> SuiteManager<C, K, S>
where
    C: TestApi,
    K: LogSink,
    S: LogStreamer,
{
    fn new(
        api: Arc<C>,
        sink: Arc<K>,
        streamer: Arc<S>,
        policy: BackoffPolicy,
        since_seconds: i64,
    ) -> Self {
        Self {
            api,
            sink,
            streamer,
            policy,
            since_seconds,
            cancel: CancellationToken::new(),
            tracker: TaskTracker::new(),
            pods: Mutex::new(HashSet::new()),
        }
    }

    /// 파드에 워처를 붙입니다.
    ///
    /// 같은 파드에 대해 이미 워처가 있으면 아무 것도 하지 않습니다
    /// (멱등 등록).
    pub async fn add_watcher(&self, pod: PodHandle, step_id: &str) {
        {
            let mut pods = self.pods.lock().await;
            if !pods.insert(pod.name.clone()) {
                return;
            }
        }

        debug!(pod = %pod.name, step_id = %step_id, "attaching log watcher");
        LogWatcher::new(pod, step_id).spawn(
            Arc::clone(&self.api),
            Arc::clone(&self.sink),
            Arc::clone(&self.streamer),
            self.policy.clone(),
            self.since_seconds,
            self.cancel.clone(),
            &self.tracker,
        );
    }

    /// 현재 워처가 붙은 파드 수를 반환합니다.
    pub async fn watcher_count(&self) -> usize {
        self.pods.lock().await.len()
    }

    /// 취소를 전파하고, 워처를 드레인하고, 싱크를 닫습니다.
    async fn shutdown(&self) -> Result<(), LogsError> {
        self.cancel.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        self.sink.close().await.map_err(LogsError::from)
    }
}

/// 프로세스 전역 스위트 레지스트리
pub struct LogManager<C, K, S>
where
    C: TestApi,
    K: LogSink,
    S: LogStreamer,
{
    api: Arc<C>,
    streamer: Arc<S>,
    policy: BackoffPolicy,
    since_seconds: i64,
    make_sink: SinkFactory<K>,
    suites: Mutex<HashMap<String, Arc<SuiteManager<C, K, S>>>>,
}

impl<C, K, S> LogManager<C, K, S>
where
    C: TestApi,
    K: LogSink,
    S: LogStreamer,
{
    /// 새 로그 매니저를 생성합니다.
    pub fn new(
        api: Arc<C>,
        streamer: Arc<S>,
        config: &LogsConfig,
        make_sink: SinkFactory<K>,
    ) -> Self {
        Self {
            api,
            streamer,
            policy: BackoffPolicy::from_logs_config(config),
            since_seconds: config.since_seconds,
            make_sink,
            suites: Mutex::new(HashMap::new()),
        }
    }

    /// 스위트의 매니저를 반환합니다. 없으면 게으르게 생성합니다.
    pub async fn suite_manager(&self, handle: &SuiteHandle) -> Arc<SuiteManager<C, K, S>> {
        let key = handle.suite.key();
        let mut suites = self.suites.lock().await;
        if let Some(existing) = suites.get(&key) {
            return Arc::clone(existing);
        }

        info!(suite = %handle.suite, "creating suite log manager");
        let sink = (self.make_sink)(handle);
        let manager = Arc::new(SuiteManager::new(
            Arc::clone(&self.api),
            sink,
            Arc::clone(&self.streamer),
            self.policy.clone(),
            self.since_seconds,
        ));
        suites.insert(key, Arc::clone(&manager));
        manager
    }

    /// 스위트의 로그 파이프라인을 해체합니다.
    ///
    /// 레지스트리에서 제거한 뒤 취소/드레인/플러시를 수행합니다.
    /// 등록되지 않은 스위트에 대한 호출은 에러입니다 (이중 취소는
    /// 호출자 버그).
    pub async fn cancel(&self, suite: &SuiteRef) -> Result<(), LogsError> {
        let key = suite.key();
        let manager = {
            let mut suites = self.suites.lock().await;
            suites
                .remove(&key)
                .ok_or_else(|| LogsError::UnknownSuite(key.clone()))?
        };

        info!(suite = %suite, "cancelling suite log pipeline");
        manager.shutdown().await
    }

    /// 스위트가 등록되어 있는지 확인합니다.
    pub async fn contains(&self, suite: &SuiteRef) -> bool {
        self.suites.lock().await.contains_key(&suite.key())
    }

    /// 등록된 스위트 수를 반환합니다.
    pub async fn suite_count(&self) -> usize {
        self.suites.lock().await.len()
    }
}
