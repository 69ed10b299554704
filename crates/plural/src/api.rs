//! GraphQL 문서 및 요청/응답 모델
//!
//! 원격 백엔드의 테스트 API(`createTest`/`updateTest`/`publishLogs`/
//! `updateStep`)에 대한 GraphQL 문서와 변수/응답 타입을 정의합니다.

use harness_core::types::TestStatus;
use serde::{Deserialize, Serialize};

/// 테스트/스텝 공통 필드 fragment
pub const TEST_FRAGMENT: &str = r#"
fragment TestFragment on Test {
  id
  name
  status
  promoteTag
  steps { id name description status }
}
"#;

/// 테스트 생성 mutation
pub const CREATE_TEST_MUTATION: &str = r#"
mutation CreateTest($repository: String!, $attributes: TestAttributes!) {
  createTest(name: $repository, attributes: $attributes) { ...TestFragment }
}
"#;

/// 테스트 갱신 mutation
pub const UPDATE_TEST_MUTATION: &str = r#"
mutation UpdateTest($id: ID!, $attributes: TestAttributes!) {
  updateTest(id: $id, attributes: $attributes) { ...TestFragment }
}
"#;

/// 스텝 로그 배치 전송 mutation
pub const PUBLISH_LOGS_MUTATION: &str = r#"
mutation PublishLogs($id: ID!, $logs: String!) {
  publishLogs(id: $id, logs: $logs) { id }
}
"#;

/// 스텝 로그 파일 업로드 mutation (multipart)
pub const UPDATE_STEP_MUTATION: &str = r#"
mutation UpdateStep($id: ID!, $logs: UploadOrUrl!) {
  updateStep(id: $id, attributes: { logs: $logs }) { id }
}
"#;

/// 테스트 등록/갱신 변수
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestAttributes {
    /// 테스트 이름 (스위트 리소스 이름)
    pub name: String,
    /// 전체 테스트 상태
    pub status: TestStatus,
    /// 성공 시 승격할 태그
    #[serde(skip_serializing_if = "Option::is_none")]
    pub promote_tag: Option<String>,
    /// 테스트 태그 목록
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub tags: Vec<String>,
    /// 스텝별 속성 (스위트 spec 순서 그대로)
    pub steps: Vec<TestStepAttributes>,
}

/// 스텝 등록/갱신 변수
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestStepAttributes {
    /// 원격 스텝 ID (최초 등록 시에는 없음)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// 스텝 이름
    pub name: String,
    /// 스텝 설명
    pub description: String,
    /// 스텝 상태
    pub status: TestStatus,
}

/// GraphQL 응답 외피
#[derive(Debug, Deserialize)]
pub(crate) struct GraphqlResponse<T> {
    pub data: Option<T>,
    #[serde(default)]
    pub errors: Vec<GraphqlError>,
}

/// GraphQL 에러 항목
#[derive(Debug, Deserialize)]
pub(crate) struct GraphqlError {
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CreateTestData {
    #[serde(rename = "createTest")]
    pub create_test: Option<TestFragmentData>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UpdateTestData {
    #[serde(rename = "updateTest")]
    pub update_test: Option<TestFragmentData>,
}

/// 서버가 반환하는 테스트 fragment
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct TestFragmentData {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub status: Option<TestStatus>,
    #[serde(rename = "promoteTag", default)]
    pub promote_tag: Option<String>,
    #[serde(default)]
    pub steps: Vec<StepFragmentData>,
}

/// 서버가 반환하는 스텝 fragment
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct StepFragmentData {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<TestStatus>,
}

/// 원격 백엔드에 등록된 테스트
#[derive(Debug, Clone, PartialEq)]
pub struct Test {
    /// 원격 테스트 ID
    pub id: String,
    /// 테스트 이름
    pub name: String,
    /// 전체 상태
    pub status: TestStatus,
    /// 승격 태그
    pub promote_tag: Option<String>,
    /// 등록된 스텝 목록
    pub steps: Vec<TestStep>,
}

/// 원격 백엔드에 등록된 스텝
#[derive(Debug, Clone, PartialEq)]
pub struct TestStep {
    /// 원격 스텝 ID
    pub id: String,
    /// 스텝 이름
    pub name: String,
    /// 스텝 설명
    pub description: String,
    /// 스텝 상태
    pub status: TestStatus,
}

impl From<TestFragmentData> for Test {
    fn from(fragment: TestFragmentData) -> Self {
        Self {
            id: fragment.id,
            name: fragment.name.unwrap_or_default(),
            status: fragment.status.unwrap_or_default(),
            promote_tag: fragment.promote_tag,
            steps: fragment
                .steps
                .into_iter()
                .map(|step| TestStep {
                    id: step.id,
                    name: step.name,
                    description: step.description.unwrap_or_default(),
                    status: step.status.unwrap_or_default(),
                })
                .collect(),
        }
    }
}
