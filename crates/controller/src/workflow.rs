//! Argo Workflow 리소스 타입과 선형 DAG 빌더
//!
//! 스위트의 순서 있는 스텝 목록을 태스크 *i*가 태스크 *i-1*에만 의존하는
//! 엄격한 선형 체인 DAG로 변환합니다. 빌더는 순수 함수이며, 같은 입력은
//! (주입된 랜덤 접미사를 제외하면) 구조적으로 동일한 출력을 냅니다.

use std::collections::BTreeMap;

use kube::CustomResource;
use rand::Rng;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use harness_core::types::{StepStatus, TestStatus};

use crate::crd::{TestSuite, TestSuiteStatus};
use crate::error::ControllerError;

/// 워크플로우가 어느 스위트 소유인지 표시하는 어노테이션
pub const OWNED_ANNOTATION: &str = "test.plural.sh/owned-by";

/// DAG 엔트리포인트 템플릿 이름
pub const ENTRYPOINT_NAME: &str = "plrl-entrypoint";

/// 워크플로우 실행에 사용할 서비스 어카운트
pub const SERVICE_ACCOUNT_NAME: &str = "argo-executor";

/// 서비스 어카운트에 바인딩할 최소 권한 ClusterRole
pub const MINIMAL_CLUSTER_ROLE: &str = "argo-workflow-minimal-role";

/// 워크플로우 이름 접미사 길이
const SUFFIX_LEN: usize = 8;

/// Argo Workflow spec (이 컨트롤러가 사용하는 부분만)
#[derive(CustomResource, Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "argoproj.io",
    version = "v1alpha1",
    kind = "Workflow",
    namespaced,
    status = "WorkflowStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowSpec {
    /// 엔트리포인트 템플릿 이름
    #[serde(default)]
    pub entrypoint: String,
    /// 실행 서비스 어카운트
    #[serde(default)]
    pub service_account_name: String,
    /// 템플릿 목록 (스텝별 템플릿 + DAG 엔트리포인트)
    #[serde(default)]
    pub templates: Vec<WorkflowTemplate>,
}

/// 워크플로우 템플릿
///
/// 스텝에 내장된 템플릿 본문은 검사 없이 passthrough로 나릅니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowTemplate {
    /// 템플릿 이름
    pub name: String,
    /// DAG 정의 (엔트리포인트 템플릿에만 존재)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dag: Option<DagTemplate>,
    /// 템플릿 본문 passthrough (container, script 등)
    #[serde(flatten)]
    pub rest: serde_json::Map<String, serde_json::Value>,
}

/// DAG 템플릿
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DagTemplate {
    /// DAG 태스크 목록
    #[serde(default)]
    pub tasks: Vec<DagTask>,
}

/// DAG 태스크
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DagTask {
    /// 태스크 이름 (스텝 이름과 동일)
    pub name: String,
    /// 참조하는 템플릿 이름
    pub template: String,
    /// 의존 태스크 (선형 체인이므로 최대 1개)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
}

/// Argo Workflow 상태 (이 컨트롤러가 읽는 부분만)
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStatus {
    /// 전체 phase (Pending/Running/Succeeded/Failed/Error)
    #[serde(default)]
    pub phase: String,
    /// 노드 ID -> 노드 상태
    #[serde(default)]
    pub nodes: BTreeMap<String, NodeStatus>,
}

/// 워크플로우 노드 상태
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NodeStatus {
    /// 노드 ID (실행 파드 이름과 동일)
    #[serde(default)]
    pub id: String,
    /// 노드가 실행하는 템플릿 이름 (스텝 이름과의 조인 키)
    #[serde(default)]
    pub template_name: String,
    /// 노드 phase
    #[serde(default)]
    pub phase: String,
}

/// 워크플로우 인스턴스 식별용 랜덤 접미사를 생성합니다 (소문자 8자).
pub fn random_suffix() -> String {
    let mut rng = rand::thread_rng();
    (0..SUFFIX_LEN)
        .map(|_| char::from(b'a' + rng.gen_range(0..26)))
        .collect()
}

/// 스위트를 워크플로우와 초기 상태로 변환합니다.
///
/// 템플릿은 스텝 순서대로 스텝 이름으로 개명되고, DAG는 선형 체인
/// (태스크 *i*는 태스크 *i-1*에 의존)으로 구성됩니다. 초기 상태는 모든
/// 스텝 `Queued`에 `workflow_name`이 채워진 snapshot입니다.
pub fn build_workflow(
    suite: &TestSuite,
    suffix: &str,
) -> Result<(Workflow, TestSuiteStatus), ControllerError> {
    if suite.spec.steps.is_empty() {
        return Err(ControllerError::EmptySuite);
    }

    let suite_name = suite
        .metadata
        .name
        .clone()
        .ok_or(ControllerError::MissingMetadata("name"))?;
    let name = format!("{suite_name}-{suffix}");

    let mut templates = Vec::with_capacity(suite.spec.steps.len() + 1);
    let mut tasks = Vec::with_capacity(suite.spec.steps.len());
    let mut previous: Option<&str> = None;

    for step in &suite.spec.steps {
        // 내장 템플릿을 스텝 이름으로 개명 (중복 name 키 방지)
        let mut rest = step.template.clone();
        rest.remove("name");
        templates.push(WorkflowTemplate {
            name: step.name.clone(),
            dag: None,
            rest,
        });

        tasks.push(DagTask {
            name: step.name.clone(),
            template: step.name.clone(),
            dependencies: previous.map(|p| vec![p.to_owned()]).unwrap_or_default(),
        });
        previous = Some(&step.name);
    }

    templates.push(WorkflowTemplate {
        name: ENTRYPOINT_NAME.to_owned(),
        dag: Some(DagTemplate { tasks }),
        rest: serde_json::Map::new(),
    });

    let mut workflow = Workflow::new(
        &name,
        WorkflowSpec {
            entrypoint: ENTRYPOINT_NAME.to_owned(),
            service_account_name: SERVICE_ACCOUNT_NAME.to_owned(),
            templates,
        },
    );
    workflow.metadata.namespace = suite.metadata.namespace.clone();
    workflow.metadata.annotations = Some(
        [(OWNED_ANNOTATION.to_owned(), suite_name)]
            .into_iter()
            .collect(),
    );

    let status = TestSuiteStatus {
        plural_id: String::new(),
        status: TestStatus::Queued,
        steps: suite
            .spec
            .steps
            .iter()
            .map(|step| StepStatus::queued(&step.name))
            .collect(),
        workflow_name: name,
        completion_time: None,
    };

    Ok((workflow, status))
}

/// 네임스페이스별 ClusterRoleBinding 이름을 구성합니다.
pub fn role_binding_name(namespace: &str, service_account: &str) -> String {
    format!("{namespace}-{service_account}-argo-minimal-role")
}
