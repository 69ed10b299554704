//! 메트릭 상수 및 설명 등록
//!
//! 모든 Prometheus 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 각 크레이트는 이 상수를 사용하여 `metrics::counter!()`, `metrics::gauge!()`
//! 매크로를 호출합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `harness_`
//! - 모듈명: `logs_`, `controller_`
//! - 접미어: `_total` (counter), 없음 (gauge)

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 결과 레이블 키 (success, failure)
pub const LABEL_RESULT: &str = "result";

/// 전송 방식 레이블 키 (http, socket)
pub const LABEL_TRANSPORT: &str = "transport";

// ─── 로그 파이프라인 메트릭 ─────────────────────────────────────────

/// Logs: 싱크로 전달된 전체 로그 라인 수 (counter)
pub const LOGS_LINES_PUBLISHED_TOTAL: &str = "harness_logs_lines_published_total";

/// Logs: 수행된 배치 플러시 수 (counter, label: result)
pub const LOGS_FLUSHES_TOTAL: &str = "harness_logs_flushes_total";

/// Logs: 플러시 실패로 유실된 라인 수 (counter)
pub const LOGS_LINES_DROPPED_TOTAL: &str = "harness_logs_lines_dropped_total";

/// Logs: 현재 활성 워처 수 (gauge)
pub const LOGS_WATCHERS_ACTIVE: &str = "harness_logs_watchers_active";

/// Logs: 업로드된 스텝 로그 아티팩트 수 (counter, label: result)
pub const LOGS_ARTIFACTS_UPLOADED_TOTAL: &str = "harness_logs_artifacts_uploaded_total";

// ─── 컨트롤러 메트릭 ────────────────────────────────────────────────

/// Controller: 수행된 reconcile 수 (counter)
pub const CONTROLLER_RECONCILES_TOTAL: &str = "harness_controller_reconciles_total";

/// Controller: 생성된 워크플로우 수 (counter)
pub const CONTROLLER_WORKFLOWS_CREATED_TOTAL: &str = "harness_controller_workflows_created_total";

/// Controller: 만료로 삭제된 스위트 수 (counter)
pub const CONTROLLER_SUITES_EXPIRED_TOTAL: &str = "harness_controller_suites_expired_total";

/// Controller: 원격 상태 동기화 실패 수 (counter)
pub const CONTROLLER_REMOTE_SYNC_FAILURES_TOTAL: &str =
    "harness_controller_remote_sync_failures_total";

// ─── 설명 등록 함수 ─────────────────────────────────────────────────

/// 모든 메트릭의 설명(description)을 등록합니다.
///
/// 전역 레코더 설치 후 한 번만 호출해야 하며,
/// 일반적으로 `harness-operator`의 시작 시점에서 호출합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge};

    describe_counter!(
        LOGS_LINES_PUBLISHED_TOTAL,
        "Total number of log lines forwarded to the log sink"
    );
    describe_counter!(
        LOGS_FLUSHES_TOTAL,
        "Total number of batch flushes performed by the log publisher"
    );
    describe_counter!(
        LOGS_LINES_DROPPED_TOTAL,
        "Total number of buffered log lines dropped due to delivery failure"
    );
    describe_gauge!(
        LOGS_WATCHERS_ACTIVE,
        "Number of pod log watchers currently running"
    );
    describe_counter!(
        LOGS_ARTIFACTS_UPLOADED_TOTAL,
        "Total number of step log artifacts uploaded to the remote backend"
    );

    describe_counter!(
        CONTROLLER_RECONCILES_TOTAL,
        "Total number of TestSuite reconciliations"
    );
    describe_counter!(
        CONTROLLER_WORKFLOWS_CREATED_TOTAL,
        "Total number of Argo workflows created for test suites"
    );
    describe_counter!(
        CONTROLLER_SUITES_EXPIRED_TOTAL,
        "Total number of test suites garbage-collected after expiry"
    );
    describe_counter!(
        CONTROLLER_REMOTE_SYNC_FAILURES_TOTAL,
        "Total number of non-fatal remote status sync failures"
    );
}
