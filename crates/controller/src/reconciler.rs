//! TestSuite 리컨실러 -- 제어 루프 상태 머신
//!
//! 스위트별 상태 전이: `Unbootstrapped -> Running -> Completed ->
//! Expired(삭제)`. 리컨실 한 번은 다음 중 정확히 하나를 수행합니다.
//!
//! 1. **부트스트랩** (`status.workflow_name`이 빈 경우): 워크플로우 생성,
//!    RBAC 선행 객체 보장, 원격 테스트 등록, 상태 최초 기록.
//! 2. **만료 GC**: 완료 후 TTL이 지난 스위트 삭제 (상태 동기화 없음).
//! 3. **정상 동기화**: 워크플로우 관측 -> 상태 투영 -> 실행 중 스텝에
//!    로그 워처 연결 -> 원격 동기화(best-effort) -> 로컬 상태 persist
//!    (치명적) -> 완료 관측 시 로그 해체 + 만료 시점 재큐.
//!
//! 로컬 상태가 진실의 원천입니다: 원격 동기화 실패는 진행을 막지 않지만
//! 로컬 상태 persist 실패는 리컨실을 실패시켜 재큐를 유도합니다.
//!
//! 부트스트랩 재시도는 원격 테스트 생성에 멱등성 키를 쓰지 않습니다.
//! 부분 성공 후 반복 실패하면 원격 레코드가 중복 생성될 수 있습니다
//! (원 구현과 동일한 동작).

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use kube::runtime::controller::Action;
use kube::{Resource, ResourceExt};
use tracing::{error, info, warn};

use harness_core::metrics as m;
use harness_core::types::TestStatus;
use harness_logs::manager::{LogManager, SuiteHandle};
use harness_logs::watcher::LogStreamer;
use harness_plural::client::TestApi;
use harness_plural::sink::LogSink;

use crate::crd::{TestSuite, TestSuiteStatus, suite_completed, suite_expired};
use crate::error::ControllerError;
use crate::kube::ClusterClient;
use crate::status::{project_status, to_test_status};
use crate::workflow::{SERVICE_ACCOUNT_NAME, Workflow, build_workflow, random_suffix};

/// 복구 가능 에러의 재큐 지연
const REQUEUE_DELAY: Duration = Duration::from_secs(5);

/// 리컨실러가 공유하는 컨텍스트
pub struct Context<K, P, Sk, St>
where
    K: ClusterClient,
    P: TestApi,
    Sk: LogSink,
    St: LogStreamer,
{
    /// 클러스터 클라이언트
    pub kube: Arc<K>,
    /// 원격 백엔드 클라이언트
    pub plural: Arc<P>,
    /// 스위트 로그 파이프라인 레지스트리
    pub logs: LogManager<P, Sk, St>,
    /// 완료 후 보존 기간
    pub suite_ttl: chrono::Duration,
}

/// 스위트 하나를 리컨실합니다.
pub async fn reconcile<K, P, Sk, St>(
    suite: Arc<TestSuite>,
    ctx: Arc<Context<K, P, Sk, St>>,
) -> Result<Action, ControllerError>
where
    K: ClusterClient,
    P: TestApi,
    Sk: LogSink,
    St: LogStreamer,
{
    metrics::counter!(m::CONTROLLER_RECONCILES_TOTAL).increment(1);

    let name = suite.name_any();
    let namespace = suite
        .metadata
        .namespace
        .clone()
        .ok_or(ControllerError::MissingMetadata("namespace"))?;
    let status = suite.status.clone().unwrap_or_default();

    if status.workflow_name.is_empty() {
        return bootstrap(&suite, &namespace, &ctx).await;
    }

    if suite_completed(&status) && suite_expired(&status, ctx.suite_ttl, Utc::now()) {
        info!(suite = %name, "cleaning up expired testsuite");
        ctx.kube.delete_suite(&namespace, &name).await?;
        metrics::counter!(m::CONTROLLER_SUITES_EXPIRED_TOTAL).increment(1);
        return Ok(Action::await_change());
    }

    let workflow = ctx
        .kube
        .get_workflow(&namespace, &status.workflow_name)
        .await?
        .ok_or_else(|| ControllerError::WorkflowNotFound {
            namespace: namespace.clone(),
            name: status.workflow_name.clone(),
        })?;

    let mut status = status;
    project_status(&workflow, &mut status, Utc::now());

    if let Err(e) = ensure_logs_tailed(&suite, &namespace, &workflow, &status, &ctx).await {
        warn!(suite = %name, error = %e, "failed to tail logs (this is a noncritical error)");
    }

    let mut updated = suite.as_ref().clone();
    updated.status = Some(status.clone());

    // 원격 동기화는 best-effort 미러링: 실패해도 로컬 상태 머신은 전진
    let attrs = updated.to_test_attributes();
    if let Err(e) = ctx.plural.update_test(&status.plural_id, &attrs).await {
        warn!(suite = %name, error = %e, "failed to update remote test");
        metrics::counter!(m::CONTROLLER_REMOTE_SYNC_FAILURES_TOTAL).increment(1);
    }

    ctx.kube.update_suite_status(&updated).await?;

    if suite_completed(&status)
        && let Some(completed_at) = status.completion_time
    {
        if let Err(e) = ctx.logs.cancel(&suite.suite_ref()).await {
            warn!(suite = %name, error = %e, "failed to cancel log watchers (this is not a critical error)");
        }

        // 외부 이벤트가 더 없어도 만료를 놓치지 않도록 명시적으로 재큐
        let expiry = completed_at + ctx.suite_ttl;
        let delay = (expiry - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        info!(suite = %name, "scheduling testsuite for expiration");
        return Ok(Action::requeue(delay));
    }

    Ok(Action::await_change())
}

/// 부트스트랩: 워크플로우와 원격 테스트를 생성하고 상태를 최초 기록합니다.
///
/// 어떤 실패든 상태를 기록하지 않고 리컨실을 중단하며, 다음 리컨실이
/// 처음부터 다시 시도합니다.
async fn bootstrap<K, P, Sk, St>(
    suite: &TestSuite,
    namespace: &str,
    ctx: &Context<K, P, Sk, St>,
) -> Result<Action, ControllerError>
where
    K: ClusterClient,
    P: TestApi,
    Sk: LogSink,
    St: LogStreamer,
{
    let name = suite.name_any();
    info!(suite = %name, "creating new argo workflow for testsuite");

    let (mut workflow, mut status) = build_workflow(suite, &random_suffix())?;
    if let Some(owner) = suite.controller_owner_ref(&()) {
        workflow.metadata.owner_references = Some(vec![owner]);
    }

    ctx.kube
        .ensure_service_account(namespace, SERVICE_ACCOUNT_NAME)
        .await?;
    ctx.kube
        .ensure_cluster_role_binding(namespace, SERVICE_ACCOUNT_NAME)
        .await?;

    let mut updated = suite.clone();
    updated.status = Some(status.clone());
    let attrs = updated.to_test_attributes();
    let test = ctx
        .plural
        .create_test(&suite.spec.repository, &attrs)
        .await?;

    status.plural_id = test.id;
    for remote_step in &test.steps {
        if let Some(step) = status.steps.iter_mut().find(|s| s.name == remote_step.name) {
            step.plural_id = remote_step.id.clone();
        }
    }

    ctx.kube.create_workflow(&workflow).await?;
    metrics::counter!(m::CONTROLLER_WORKFLOWS_CREATED_TOTAL).increment(1);

    updated.status = Some(status);
    ctx.kube.update_suite_status(&updated).await?;

    Ok(Action::await_change())
}

/// 실행 중인 스텝의 파드에 로그 워처를 연결합니다.
async fn ensure_logs_tailed<K, P, Sk, St>(
    suite: &TestSuite,
    namespace: &str,
    workflow: &Workflow,
    status: &TestSuiteStatus,
    ctx: &Context<K, P, Sk, St>,
) -> Result<(), ControllerError>
where
    K: ClusterClient,
    P: TestApi,
    Sk: LogSink,
    St: LogStreamer,
{
    let Some(wf_status) = workflow.status.as_ref() else {
        return Ok(());
    };

    for node in wf_status.nodes.values() {
        let Some(step) = status.steps.iter().find(|s| s.name == node.template_name) else {
            continue;
        };
        if to_test_status(&node.phase) != TestStatus::Running {
            continue;
        }

        // 노드 ID가 실행 파드 이름
        let Some(pod) = ctx.kube.get_pod(namespace, &node.id).await? else {
            warn!(pod = %node.id, step = %step.name, "backing pod for running step not found");
            continue;
        };

        let handle = SuiteHandle {
            suite: suite.suite_ref(),
            remote_id: status.plural_id.clone(),
        };
        let manager = ctx.logs.suite_manager(&handle).await;
        manager.add_watcher(pod, &step.plural_id).await;
    }

    Ok(())
}

/// 리컨실 실패 시 재큐 정책
pub fn error_policy<K, P, Sk, St>(
    suite: Arc<TestSuite>,
    error: &ControllerError,
    _ctx: Arc<Context<K, P, Sk, St>>,
) -> Action
where
    K: ClusterClient,
    P: TestApi,
    Sk: LogSink,
    St: LogStreamer,
{
    if error.is_recoverable() {
        warn!(suite = %suite.name_any(), error = %error, "reconciliation requeued");
    } else {
        error!(suite = %suite.name_any(), error = %error, "reconciliation failed");
    }
    Action::requeue(REQUEUE_DELAY)
}
