#![doc = include_str!("../README.md")]

pub mod crd;
pub mod error;
pub mod kube;
pub mod reconciler;
pub mod status;
pub mod workflow;

// --- 주요 타입 re-export ---

pub use self::crd::{TestStep, TestSuite, TestSuiteSpec, TestSuiteStatus};
pub use self::error::ControllerError;
pub use self::kube::{ClusterClient, KubeClusterClient, KubeLogStreamer};
pub use self::reconciler::{Context, error_policy, reconcile};
pub use self::workflow::{Workflow, build_workflow, random_suffix};
