//! Kubernetes API abstraction for testability.
//!
//! The [`ClusterClient`] trait abstracts the API-server operations the
//! reconciler needs, allowing production code to use [`KubeClusterClient`]
//! while tests use `MockClusterClient`.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐
//! │  Reconciler  │
//! └──────┬───────┘
//!        │
//!        ▼
//! ┌───────────────┐
//! │ ClusterClient │ (trait)
//! └───────────────┘
//!      │      │
//!      ▼      ▼
//! ┌──────┐ ┌──────┐
//! │ kube │ │ Mock │
//! └──┬───┘ └──────┘
//!    │
//!    ▼
//!  API server
//! ```
//!
//! Cluster credentials resolve through `kube::Client::try_default()`:
//! the in-cluster service-account token when present, the local
//! kubeconfig otherwise.

use std::future::Future;

use futures::AsyncBufReadExt;
use k8s_openapi::api::core::v1::{Pod, ServiceAccount};
use k8s_openapi::api::rbac::v1::{ClusterRoleBinding, RoleRef, Subject};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, DeleteParams, LogParams, Patch, PatchParams, PostParams};
use kube::Client;
use serde_json::json;
use tracing::debug;

use harness_logs::watcher::{LineStream, LogStreamer, PodHandle};
use harness_logs::LogsError;

use crate::crd::TestSuite;
use crate::error::ControllerError;
use crate::workflow::{MINIMAL_CLUSTER_ROLE, Workflow, role_binding_name};

/// Trait abstracting the Kubernetes operations used by the reconciler.
///
/// All API-server calls go through this trait, enabling testability via
/// mocking. Get-or-create operations (`ensure_*`) are idempotent.
pub trait ClusterClient: Send + Sync + 'static {
    /// Fetches a workflow, returning `None` when it does not exist.
    fn get_workflow(
        &self,
        namespace: &str,
        name: &str,
    ) -> impl Future<Output = Result<Option<Workflow>, ControllerError>> + Send;

    /// Creates a workflow object.
    fn create_workflow(
        &self,
        workflow: &Workflow,
    ) -> impl Future<Output = Result<(), ControllerError>> + Send;

    /// Fetches a pod as a transport-free [`PodHandle`], `None` when absent.
    fn get_pod(
        &self,
        namespace: &str,
        name: &str,
    ) -> impl Future<Output = Result<Option<PodHandle>, ControllerError>> + Send;

    /// Creates the service account when it does not exist yet.
    fn ensure_service_account(
        &self,
        namespace: &str,
        name: &str,
    ) -> impl Future<Output = Result<(), ControllerError>> + Send;

    /// Creates the minimal cluster role binding when it does not exist yet.
    fn ensure_cluster_role_binding(
        &self,
        namespace: &str,
        service_account: &str,
    ) -> impl Future<Output = Result<(), ControllerError>> + Send;

    /// Persists the suite status subresource.
    fn update_suite_status(
        &self,
        suite: &TestSuite,
    ) -> impl Future<Output = Result<(), ControllerError>> + Send;

    /// Deletes the suite resource.
    fn delete_suite(
        &self,
        namespace: &str,
        name: &str,
    ) -> impl Future<Output = Result<(), ControllerError>> + Send;
}

/// Production implementation backed by `kube::Client`.
#[derive(Clone)]
pub struct KubeClusterClient {
    client: Client,
}

impl KubeClusterClient {
    /// Wraps an already-constructed client.
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn workflows(&self, namespace: &str) -> Api<Workflow> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn suites(&self, namespace: &str) -> Api<TestSuite> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

impl ClusterClient for KubeClusterClient {
    async fn get_workflow(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Workflow>, ControllerError> {
        Ok(self.workflows(namespace).get_opt(name).await?)
    }

    async fn create_workflow(&self, workflow: &Workflow) -> Result<(), ControllerError> {
        let namespace = workflow
            .metadata
            .namespace
            .as_deref()
            .ok_or(ControllerError::MissingMetadata("namespace"))?;
        self.workflows(namespace)
            .create(&PostParams::default(), workflow)
            .await?;
        Ok(())
    }

    async fn get_pod(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<PodHandle>, ControllerError> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let Some(pod) = pods.get_opt(name).await? else {
            return Ok(None);
        };

        let containers = pod
            .spec
            .map(|spec| spec.containers.into_iter().map(|c| c.name).collect())
            .unwrap_or_default();
        Ok(Some(PodHandle {
            namespace: namespace.to_owned(),
            name: name.to_owned(),
            containers,
        }))
    }

    async fn ensure_service_account(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<(), ControllerError> {
        let api: Api<ServiceAccount> = Api::namespaced(self.client.clone(), namespace);
        if api.get_opt(name).await?.is_some() {
            return Ok(());
        }

        debug!(namespace = namespace, name = name, "creating service account");
        let account = ServiceAccount {
            metadata: ObjectMeta {
                name: Some(name.to_owned()),
                namespace: Some(namespace.to_owned()),
                ..ObjectMeta::default()
            },
            ..ServiceAccount::default()
        };
        api.create(&PostParams::default(), &account).await?;
        Ok(())
    }

    async fn ensure_cluster_role_binding(
        &self,
        namespace: &str,
        service_account: &str,
    ) -> Result<(), ControllerError> {
        let api: Api<ClusterRoleBinding> = Api::all(self.client.clone());
        let name = role_binding_name(namespace, service_account);
        if api.get_opt(&name).await?.is_some() {
            return Ok(());
        }

        debug!(name = %name, "creating minimal cluster role binding");
        let binding = ClusterRoleBinding {
            metadata: ObjectMeta {
                name: Some(name),
                ..ObjectMeta::default()
            },
            subjects: Some(vec![Subject {
                kind: "ServiceAccount".to_owned(),
                api_group: Some(String::new()),
                name: service_account.to_owned(),
                namespace: Some(namespace.to_owned()),
            }]),
            role_ref: RoleRef {
                api_group: "rbac.authorization.k8s.io".to_owned(),
                kind: "ClusterRole".to_owned(),
                name: MINIMAL_CLUSTER_ROLE.to_owned(),
            },
        };
        api.create(&PostParams::default(), &binding).await?;
        Ok(())
    }

    async fn update_suite_status(&self, suite: &TestSuite) -> Result<(), ControllerError> {
        let namespace = suite
            .metadata
            .namespace
            .as_deref()
            .ok_or(ControllerError::MissingMetadata("namespace"))?;
        let name = suite
            .metadata
            .name
            .as_deref()
            .ok_or(ControllerError::MissingMetadata("name"))?;

        self.suites(namespace)
            .patch_status(
                name,
                &PatchParams::default(),
                &Patch::Merge(&json!({ "status": suite.status })),
            )
            .await?;
        Ok(())
    }

    async fn delete_suite(&self, namespace: &str, name: &str) -> Result<(), ControllerError> {
        self.suites(namespace)
            .delete(name, &DeleteParams::default())
            .await?;
        Ok(())
    }
}

/// [`LogStreamer`] implementation over the pod log API.
///
/// Opens a follow stream looking back `since_seconds` to catch output
/// written before the watcher attached.
#[derive(Clone)]
pub struct KubeLogStreamer {
    client: Client,
}

impl KubeLogStreamer {
    /// Wraps an already-constructed client.
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl LogStreamer for KubeLogStreamer {
    async fn open_lines(
        &self,
        namespace: &str,
        pod: &str,
        container: &str,
        since_seconds: i64,
    ) -> Result<LineStream, LogsError> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let params = LogParams {
            follow: true,
            container: Some(container.to_owned()),
            since_seconds: Some(since_seconds),
            ..LogParams::default()
        };

        let reader = pods.log_stream(pod, &params).await.map_err(|e| {
            LogsError::StreamOpen {
                container: container.to_owned(),
                reason: e.to_string(),
            }
        })?;

        Ok(Box::pin(Box::pin(reader).lines()))
    }
}

/// 테스트용 Mock 클러스터 클라이언트
///
/// 인메모리 상태에 대해 동작하며, 호출 기록과 실패 주입을 지원합니다.
#[cfg(test)]
pub(crate) struct MockClusterClient {
    pub workflows: std::sync::Mutex<std::collections::HashMap<String, Workflow>>,
    pub pods: std::sync::Mutex<std::collections::HashMap<String, PodHandle>>,
    pub service_accounts: std::sync::Mutex<Vec<(String, String)>>,
    pub role_bindings: std::sync::Mutex<Vec<String>>,
    pub status_updates: std::sync::Mutex<Vec<TestSuite>>,
    pub deleted: std::sync::Mutex<Vec<String>>,
    pub fail_create_workflow: bool,
    pub fail_status_update: bool,
}

#[cfg(test)]
impl MockClusterClient {
    pub(crate) fn new() -> Self {
        Self {
            workflows: std::sync::Mutex::new(std::collections::HashMap::new()),
            pods: std::sync::Mutex::new(std::collections::HashMap::new()),
            service_accounts: std::sync::Mutex::new(Vec::new()),
            role_bindings: std::sync::Mutex::new(Vec::new()),
            status_updates: std::sync::Mutex::new(Vec::new()),
            deleted: std::sync::Mutex::new(Vec::new()),
            fail_create_workflow: false,
            fail_status_update: false,
        }
    }

    pub(crate) fn with_workflow(self, workflow: Workflow) -> Self {
        let key = format!(
            "{}/{}",
            workflow.metadata.namespace.clone().unwrap_or_default(),
            workflow.metadata.name.clone().unwrap_or_default()
        );
        self.workflows.lock().unwrap().insert(key, workflow);
        self
    }

    pub(crate) fn with_pod(self, pod: PodHandle) -> Self {
        let key = format!("{}/{}", pod.namespace, pod.name);
        self.pods.lock().unwrap().insert(key, pod);
        self
    }

    pub(crate) fn with_failing_workflow_create(mut self) -> Self {
        self.fail_create_workflow = true;
        self
    }

    pub(crate) fn with_failing_status_update(mut self) -> Self {
        self.fail_status_update = true;
        self
    }

    fn mock_error(message: &str) -> ControllerError {
        ControllerError::Kube(kube::Error::Api(kube::error::ErrorResponse {
            status: "Failure".to_owned(),
            message: message.to_owned(),
            reason: "MockFailure".to_owned(),
            code: 500,
        }))
    }
}

#[cfg(test)]
impl ClusterClient for MockClusterClient {
    async fn get_workflow(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Workflow>, ControllerError> {
        Ok(self
            .workflows
            .lock()
            .unwrap()
            .get(&format!("{namespace}/{name}"))
            .cloned())
    }

    async fn create_workflow(&self, workflow: &Workflow) -> Result<(), ControllerError> {
        if self.fail_create_workflow {
            return Err(Self::mock_error("workflow create failed"));
        }
        let key = format!(
            "{}/{}",
            workflow.metadata.namespace.clone().unwrap_or_default(),
            workflow.metadata.name.clone().unwrap_or_default()
        );
        self.workflows.lock().unwrap().insert(key, workflow.clone());
        Ok(())
    }

    async fn get_pod(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<PodHandle>, ControllerError> {
        Ok(self
            .pods
            .lock()
            .unwrap()
            .get(&format!("{namespace}/{name}"))
            .cloned())
    }

    async fn ensure_service_account(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<(), ControllerError> {
        let mut accounts = self.service_accounts.lock().unwrap();
        let entry = (namespace.to_owned(), name.to_owned());
        if !accounts.contains(&entry) {
            accounts.push(entry);
        }
        Ok(())
    }

    async fn ensure_cluster_role_binding(
        &self,
        namespace: &str,
        service_account: &str,
    ) -> Result<(), ControllerError> {
        let mut bindings = self.role_bindings.lock().unwrap();
        let name = role_binding_name(namespace, service_account);
        if !bindings.contains(&name) {
            bindings.push(name);
        }
        Ok(())
    }

    async fn update_suite_status(&self, suite: &TestSuite) -> Result<(), ControllerError> {
        if self.fail_status_update {
            return Err(Self::mock_error("status update failed"));
        }
        self.status_updates.lock().unwrap().push(suite.clone());
        Ok(())
    }

    async fn delete_suite(&self, namespace: &str, name: &str) -> Result<(), ControllerError> {
        self.deleted
            .lock()
            .unwrap()
            .push(format!("{namespace}/{name}"));
        Ok(())
    }
}
