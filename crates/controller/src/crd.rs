//! TestSuite 커스텀 리소스 스키마
//!
//! `test.plural.sh/v1alpha1` 그룹의 `TestSuite` 리소스를 정의합니다.
//! spec의 스텝 목록은 생성 후 불변이며, status는 컨트롤러만 갱신합니다.
//!
//! # 불변식
//! - 실행이 부트스트랩된 뒤에는 `status.steps.len() == spec.steps.len()`
//! - 스텝 이름은 spec과 status를 잇는 1:1 조인 키 (유일, 순서 보존)
//! - `status.workflow_name`은 최초 리컨실 전에는 비어 있고 이후 불변
//!   (부트스트랩 멱등성 키)

use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use harness_core::types::{StepStatus, SuiteRef, TestStatus};
use harness_plural::api::{TestAttributes, TestStepAttributes};

/// 테스트 스위트 spec
#[derive(CustomResource, Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "test.plural.sh",
    version = "v1alpha1",
    kind = "TestSuite",
    namespaced,
    status = "TestSuiteStatus",
    shortname = "suite"
)]
#[serde(rename_all = "camelCase")]
pub struct TestSuiteSpec {
    /// 테스트 성공 시 승격할 태그
    #[serde(default)]
    pub promote_tag: String,
    /// 테스트가 실행되는 저장소
    #[serde(default)]
    pub repository: String,
    /// 테스트 태그 목록
    #[serde(default)]
    pub tags: Vec<String>,
    /// 순서대로 실행할 테스트 스텝
    #[serde(default)]
    pub steps: Vec<TestStep>,
}

/// 테스트 스텝 하나
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TestStep {
    /// 스텝 이름 (스위트 내 유일)
    pub name: String,
    /// 스텝 설명 (시각화용)
    #[serde(default)]
    pub description: String,
    /// 이 스텝에 사용할 Argo 템플릿 (passthrough, name은 빌드 시 덮어씀)
    #[serde(default)]
    pub template: serde_json::Map<String, serde_json::Value>,
}

/// 테스트 스위트의 관측 상태
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TestSuiteStatus {
    /// 원격 백엔드가 부여한 테스트 ID
    #[serde(default)]
    pub plural_id: String,
    /// 전체 테스트 상태
    #[serde(default, rename = "testStatus")]
    pub status: TestStatus,
    /// 스텝별 상태 (spec 순서 그대로)
    #[serde(default, rename = "stepStatus")]
    pub steps: Vec<StepStatus>,
    /// 연결된 Argo 워크플로우 이름 (부트스트랩 멱등성 키)
    #[serde(default)]
    pub workflow_name: String,
    /// 스위트가 완료된 시각
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_time: Option<DateTime<Utc>>,
}

impl TestSuite {
    /// 스위트 식별자를 반환합니다.
    pub fn suite_ref(&self) -> SuiteRef {
        SuiteRef::new(
            self.metadata.namespace.clone().unwrap_or_default(),
            self.metadata.name.clone().unwrap_or_default(),
        )
    }

    /// 원격 백엔드 등록/갱신용 속성을 구성합니다.
    ///
    /// 스텝 상태는 status에서 이름으로 조인하며, 아직 상태가 없는 스텝은
    /// `Queued`로 채웁니다.
    pub fn to_test_attributes(&self) -> TestAttributes {
        let status = self.status.clone().unwrap_or_default();

        let steps = self
            .spec
            .steps
            .iter()
            .map(|step| {
                let observed = status.steps.iter().find(|s| s.name == step.name);
                TestStepAttributes {
                    id: observed
                        .filter(|s| !s.plural_id.is_empty())
                        .map(|s| s.plural_id.clone()),
                    name: step.name.clone(),
                    description: step.description.clone(),
                    status: observed.map_or(TestStatus::Queued, |s| s.status),
                }
            })
            .collect();

        TestAttributes {
            name: self.metadata.name.clone().unwrap_or_default(),
            status: status.status,
            promote_tag: if self.spec.promote_tag.is_empty() {
                None
            } else {
                Some(self.spec.promote_tag.clone())
            },
            tags: self.spec.tags.clone(),
            steps,
        }
    }
}

/// 스위트 완료 여부를 판정합니다.
///
/// 완료 시각이 찍혔거나 상태가 터미널이면 완료입니다.
pub fn suite_completed(status: &TestSuiteStatus) -> bool {
    status.completion_time.is_some() || status.status.is_terminal()
}

/// 스위트 만료 여부를 판정합니다.
///
/// 완료 시각 기준으로 TTL이 지나야 만료입니다. 완료 시각이 아직 찍히지
/// 않았다면 만료가 아닙니다 -- 투영기가 완료를 관측한 리컨실에서 시각을
/// 찍으므로 이 창은 닫혀 있습니다.
pub fn suite_expired(status: &TestSuiteStatus, ttl: chrono::Duration, now: DateTime<Utc>) -> bool {
    match status.completion_time {
        Some(completed_at) => completed_at + ttl <= now,
        None => false,
    }
}
