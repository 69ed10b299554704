//! Plural API 클라이언트 추상화
//!
//! [`TestApi`] trait은 원격 백엔드의 테스트 API를 추상화하여,
//! 프로덕션에서는 [`PluralClient`]를, 테스트에서는 크레이트별 mock을
//! 사용할 수 있게 합니다.
//!
//! # 인증
//!
//! 모든 요청은 `Authorization: Bearer {token}` 헤더를 사용하며,
//! 토큰은 일반적으로 `PLURAL_ACCESS_TOKEN` 환경변수로 주입됩니다.

use std::future::Future;
use std::path::Path;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::json;

use harness_core::config::PluralConfig;

use crate::api::{
    CREATE_TEST_MUTATION, CreateTestData, GraphqlResponse, PUBLISH_LOGS_MUTATION, TEST_FRAGMENT,
    Test, TestAttributes, UPDATE_STEP_MUTATION, UPDATE_TEST_MUTATION, UpdateTestData,
};
use crate::error::PluralError;

/// HTTP 요청 타임아웃
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// 원격 테스트 API를 추상화하는 trait
///
/// 컨트롤러(테스트 등록/상태 동기화)와 로그 파이프라인(배치 전송,
/// 아티팩트 업로드)이 공유합니다.
pub trait TestApi: Send + Sync + 'static {
    /// 저장소에 새 테스트를 등록하고 원격 ID(테스트/스텝)를 받아옵니다.
    fn create_test(
        &self,
        repository: &str,
        attrs: &TestAttributes,
    ) -> impl Future<Output = Result<Test, PluralError>> + Send;

    /// 기존 테스트의 상태를 갱신합니다.
    fn update_test(
        &self,
        id: &str,
        attrs: &TestAttributes,
    ) -> impl Future<Output = Result<Test, PluralError>> + Send;

    /// 스텝 로그 배치를 전송합니다.
    fn publish_logs(
        &self,
        step_id: &str,
        logs: &str,
    ) -> impl Future<Output = Result<(), PluralError>> + Send;

    /// 스텝의 전체 로그 파일을 영구 아티팩트로 업로드합니다.
    fn update_step(
        &self,
        step_id: &str,
        log_file: &Path,
    ) -> impl Future<Output = Result<(), PluralError>> + Send;
}

/// GraphQL-over-HTTP 프로덕션 클라이언트
pub struct PluralClient {
    http: reqwest::Client,
    gql_url: String,
    token: String,
}

impl PluralClient {
    /// 설정에서 새 클라이언트를 생성합니다.
    pub fn new(config: &PluralConfig) -> Result<Self, PluralError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            gql_url: format!("{}/gql", config.base_url()),
            token: config.token.clone(),
        })
    }

    /// GraphQL 문서를 실행하고 `data` 필드를 역직렬화합니다.
    async fn run<T: DeserializeOwned>(
        &self,
        query: String,
        variables: serde_json::Value,
    ) -> Result<T, PluralError> {
        let response = self
            .http
            .post(&self.gql_url)
            .bearer_auth(&self.token)
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await?
            .error_for_status()?;

        let envelope: GraphqlResponse<T> = response.json().await?;
        if let Some(first) = envelope.errors.into_iter().next() {
            return Err(PluralError::Api {
                message: first.message,
            });
        }
        envelope
            .data
            .ok_or_else(|| PluralError::Decode("response carried no data".to_owned()))
    }
}

impl TestApi for PluralClient {
    async fn create_test(
        &self,
        repository: &str,
        attrs: &TestAttributes,
    ) -> Result<Test, PluralError> {
        let data: CreateTestData = self
            .run(
                format!("{CREATE_TEST_MUTATION}{TEST_FRAGMENT}"),
                json!({ "repository": repository, "attributes": attrs }),
            )
            .await?;

        data.create_test.map(Test::from).ok_or_else(|| {
            PluralError::Decode("createTest returned no test".to_owned())
        })
    }

    async fn update_test(&self, id: &str, attrs: &TestAttributes) -> Result<Test, PluralError> {
        let data: UpdateTestData = self
            .run(
                format!("{UPDATE_TEST_MUTATION}{TEST_FRAGMENT}"),
                json!({ "id": id, "attributes": attrs }),
            )
            .await?;

        data.update_test.map(Test::from).ok_or_else(|| {
            PluralError::Decode("updateTest returned no test".to_owned())
        })
    }

    async fn publish_logs(&self, step_id: &str, logs: &str) -> Result<(), PluralError> {
        let _: serde_json::Value = self
            .run(
                PUBLISH_LOGS_MUTATION.to_owned(),
                json!({ "id": step_id, "logs": logs }),
            )
            .await?;
        Ok(())
    }

    async fn update_step(&self, step_id: &str, log_file: &Path) -> Result<(), PluralError> {
        let contents = tokio::fs::read(log_file).await?;
        let file_name = log_file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "logs".to_owned());

        // GraphQL multipart request 규약: operations + map + 파일 파트
        let operations = json!({
            "query": UPDATE_STEP_MUTATION,
            "variables": { "id": step_id, "logs": null },
        });
        let form = reqwest::multipart::Form::new()
            .text("operations", operations.to_string())
            .text("map", r#"{"logs": ["variables.logs"]}"#)
            .part(
                "logs",
                reqwest::multipart::Part::bytes(contents).file_name(file_name),
            );

        let response = self
            .http
            .post(&self.gql_url)
            .bearer_auth(&self.token)
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(PluralError::Upload {
                path: log_file.display().to_string(),
                reason: format!("status {}", response.status()),
            });
        }

        let envelope: GraphqlResponse<serde_json::Value> = response.json().await?;
        if let Some(first) = envelope.errors.into_iter().next() {
            return Err(PluralError::Upload {
                path: log_file.display().to_string(),
                reason: first.message,
            });
        }
        Ok(())
    }
}
