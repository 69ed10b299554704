//! 도메인 타입 — 시스템 전역에서 사용되는 공통 타입
//!
//! 테스트 스위트의 상태 모델을 정의합니다. 컨트롤러는 이 타입들을 CRD 상태에
//! 그대로 내장하고, 원격 백엔드 클라이언트는 동일한 표현으로 직렬화합니다.

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// 테스트 스위트/스텝 상태
///
/// 원격 백엔드의 표현(`"QUEUED"` 등)을 그대로 사용합니다.
/// `Ord` 구현으로 진행 순서 비교가 가능합니다
/// (`Queued < Running < Succeeded < Failed`).
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    JsonSchema,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TestStatus {
    /// 실행 대기 중
    #[default]
    Queued,
    /// 실행 중
    Running,
    /// 성공으로 종료됨 (터미널)
    Succeeded,
    /// 실패로 종료됨 (터미널)
    Failed,
}

impl TestStatus {
    /// 터미널 상태(성공/실패) 여부를 반환합니다.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Queued => write!(f, "QUEUED"),
            Self::Running => write!(f, "RUNNING"),
            Self::Succeeded => write!(f, "SUCCEEDED"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

/// 개별 스텝의 관측 상태
///
/// 스텝 이름은 스위트 내에서 유일하며, spec과 status를 잇는 조인 키입니다.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StepStatus {
    /// 원격 백엔드가 부여한 스텝 ID (등록 전에는 빈 문자열)
    #[serde(default)]
    pub plural_id: String,
    /// 스텝 이름
    pub name: String,
    /// 스텝 상태
    pub status: TestStatus,
}

impl StepStatus {
    /// 대기 상태의 새 스텝 상태를 생성합니다.
    pub fn queued(name: impl Into<String>) -> Self {
        Self {
            plural_id: String::new(),
            name: name.into(),
            status: TestStatus::Queued,
        }
    }
}

/// 스위트 식별자 (namespace + name)
///
/// 로그 매니저 레지스트리의 키로 사용됩니다.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SuiteRef {
    /// 네임스페이스
    pub namespace: String,
    /// 리소스 이름
    pub name: String,
}

impl SuiteRef {
    /// 새 스위트 식별자를 생성합니다.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// 레지스트리 키(`"{namespace}:{name}"`)를 반환합니다.
    pub fn key(&self) -> String {
        format!("{}:{}", self.namespace, self.name)
    }
}

impl fmt::Display for SuiteRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}
