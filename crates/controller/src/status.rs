//! 상태 투영 -- 워크플로우 phase를 스위트 상태로 매핑
//!
//! 외부 엔진의 phase 문자열을 내부 상태로 변환하는 전체 함수(total
//! function)입니다. 알 수 없는 phase는 실패로 닫지 않고 `Queued`로
//! 엽니다(fail-open).

use chrono::{DateTime, Utc};

use harness_core::types::TestStatus;

use crate::crd::TestSuiteStatus;
use crate::workflow::Workflow;

/// 워크플로우 phase 문자열을 스위트 상태로 매핑합니다.
///
/// `Pending -> Queued`, `Running -> Running`, `Succeeded -> Succeeded`,
/// `Failed -> Failed`, `Error -> Failed`, 그 외 전부 `Queued`.
pub fn to_test_status(phase: &str) -> TestStatus {
    match phase {
        "Pending" => TestStatus::Queued,
        "Running" => TestStatus::Running,
        "Succeeded" => TestStatus::Succeeded,
        "Failed" | "Error" => TestStatus::Failed,
        _ => TestStatus::Queued,
    }
}

/// 워크플로우의 관측 상태를 스위트 상태에 투영합니다.
///
/// - 전체 상태는 워크플로우 phase를 같은 매핑으로 반영합니다.
/// - 스텝 상태는 `template_name`이 알려진 스텝 이름과 일치하는 노드만
///   갱신하며, 일치하지 않는 노드(DAG 엔트리 노드 등)는 무시합니다.
/// - 완료(터미널 상태)를 처음 관측한 시점에 완료 시각을 정확히 한 번
///   찍습니다. 이미 찍힌 시각은 다시 관측해도 변하지 않습니다.
pub fn project_status(workflow: &Workflow, status: &mut TestSuiteStatus, now: DateTime<Utc>) {
    let Some(wf_status) = workflow.status.as_ref() else {
        return;
    };

    status.status = to_test_status(&wf_status.phase);

    for node in wf_status.nodes.values() {
        if let Some(step) = status
            .steps
            .iter_mut()
            .find(|s| s.name == node.template_name)
        {
            step.status = to_test_status(&node.phase);
        }
    }

    if status.status.is_terminal() && status.completion_time.is_none() {
        status.completion_time = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::{NodeStatus, WorkflowSpec, WorkflowStatus};
    use harness_core::types::StepStatus;
    use std::collections::BTreeMap;

    fn workflow_with(phase: &str, nodes: &[(&str, &str, &str)]) -> Workflow {
        let mut workflow = Workflow::new("smoke-abcdefgh", WorkflowSpec::default());
        workflow.status = Some(WorkflowStatus {
            phase: phase.to_owned(),
            nodes: nodes
                .iter()
                .map(|(id, template, node_phase)| {
                    (
                        (*id).to_owned(),
                        NodeStatus {
                            id: (*id).to_owned(),
                            template_name: (*template).to_owned(),
                            phase: (*node_phase).to_owned(),
                        },
                    )
                })
                .collect::<BTreeMap<_, _>>(),
        });
        workflow
    }

    fn status_with_steps(names: &[&str]) -> TestSuiteStatus {
        TestSuiteStatus {
            steps: names.iter().map(|n| StepStatus::queued(*n)).collect(),
            ..TestSuiteStatus::default()
        }
    }

    #[test]
    fn phase_mapping_is_total() {
        assert_eq!(to_test_status("Pending"), TestStatus::Queued);
        assert_eq!(to_test_status("Running"), TestStatus::Running);
        assert_eq!(to_test_status("Succeeded"), TestStatus::Succeeded);
        assert_eq!(to_test_status("Failed"), TestStatus::Failed);
        assert_eq!(to_test_status("Error"), TestStatus::Failed);

        // 알 수 없는 phase는 fail-open으로 Queued
        assert_eq!(to_test_status(""), TestStatus::Queued);
        assert_eq!(to_test_status("Omitted"), TestStatus::Queued);
        assert_eq!(to_test_status("running"), TestStatus::Queued);
    }

    #[test]
    fn projects_overall_and_step_status() {
        let workflow = workflow_with(
            "Running",
            &[
                ("pod-1", "build", "Succeeded"),
                ("pod-2", "test", "Running"),
            ],
        );
        let mut status = status_with_steps(&["build", "test"]);

        project_status(&workflow, &mut status, Utc::now());

        assert_eq!(status.status, TestStatus::Running);
        assert_eq!(status.steps[0].status, TestStatus::Succeeded);
        assert_eq!(status.steps[1].status, TestStatus::Running);
        assert!(status.completion_time.is_none());
    }

    #[test]
    fn unmatched_nodes_are_ignored() {
        let workflow = workflow_with(
            "Running",
            &[
                ("entry", "plrl-entrypoint", "Running"),
                ("pod-1", "build", "Running"),
            ],
        );
        let mut status = status_with_steps(&["build"]);

        project_status(&workflow, &mut status, Utc::now());

        assert_eq!(status.steps.len(), 1);
        assert_eq!(status.steps[0].status, TestStatus::Running);
    }

    #[test]
    fn completion_time_is_stamped_once() {
        let workflow = workflow_with("Succeeded", &[("pod-1", "build", "Succeeded")]);
        let mut status = status_with_steps(&["build"]);

        let first_observation = Utc::now();
        project_status(&workflow, &mut status, first_observation);
        assert_eq!(status.status, TestStatus::Succeeded);
        assert_eq!(status.completion_time, Some(first_observation));

        // 완료를 다시 관측해도 시각은 바뀌지 않음
        let later = first_observation + chrono::Duration::hours(1);
        project_status(&workflow, &mut status, later);
        assert_eq!(status.completion_time, Some(first_observation));
    }

    #[test]
    fn failure_also_stamps_completion() {
        let workflow = workflow_with("Failed", &[("pod-1", "build", "Failed")]);
        let mut status = status_with_steps(&["build"]);

        let now = Utc::now();
        project_status(&workflow, &mut status, now);
        assert_eq!(status.status, TestStatus::Failed);
        assert_eq!(status.completion_time, Some(now));
    }

    #[test]
    fn error_phase_projects_to_failed() {
        let workflow = workflow_with("Error", &[("pod-1", "build", "Error")]);
        let mut status = status_with_steps(&["build"]);

        project_status(&workflow, &mut status, Utc::now());
        assert_eq!(status.status, TestStatus::Failed);
        assert_eq!(status.steps[0].status, TestStatus::Failed);
    }

    #[test]
    fn workflow_without_status_leaves_suite_untouched() {
        let workflow = Workflow::new("smoke-abcdefgh", WorkflowSpec::default());
        let mut status = status_with_steps(&["build"]);
        status.status = TestStatus::Running;

        project_status(&workflow, &mut status, Utc::now());
        assert_eq!(status.status, TestStatus::Running);
    }

    #[test]
    fn unknown_node_phase_falls_back_to_queued() {
        let workflow = workflow_with("Running", &[("pod-1", "build", "Mystery")]);
        let mut status = status_with_steps(&["build"]);
        status.steps[0].status = TestStatus::Running;

        project_status(&workflow, &mut status, Utc::now());
        assert_eq!(status.steps[0].status, TestStatus::Queued);
    }
}
