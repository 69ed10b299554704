//! Controller wiring -- client construction, sink selection, and the
//! reconcile loop.
//!
//! The transport choice (`[plural] transport`) is resolved here once:
//! the batched HTTP publisher or the Phoenix socket sink, both behind
//! the same `LogSink` interface.

use std::sync::Arc;

use anyhow::Result;
use futures::StreamExt;
use kube::api::Api;
use kube::runtime::{Controller, watcher};
use kube::Client;

use harness_controller::crd::TestSuite;
use harness_controller::kube::{KubeClusterClient, KubeLogStreamer};
use harness_controller::reconciler::{Context, error_policy, reconcile};
use harness_controller::workflow::Workflow;
use harness_core::config::{HarnessConfig, LogTransport};
use harness_core::retry::BackoffPolicy;
use harness_logs::manager::{LogManager, SinkFactory};
use harness_logs::publisher::LogPublisher;
use harness_plural::client::PluralClient;
use harness_plural::sink::LogSink;
use harness_plural::socket::SocketSink;

/// Build the clients and run the controller until a shutdown signal.
pub async fn run(config: HarnessConfig) -> Result<()> {
    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("failed to build kube client: {}", e))?;
    let plural = Arc::new(
        PluralClient::new(&config.plural)
            .map_err(|e| anyhow::anyhow!("failed to build plural client: {}", e))?,
    );
    let streamer = Arc::new(KubeLogStreamer::new(client.clone()));

    harness_core::metrics::describe_all();

    match config.plural.transport {
        LogTransport::Http => {
            tracing::info!("using batched http log transport");
            let api = Arc::clone(&plural);
            let threshold = config.logs.flush_threshold;
            let factory: SinkFactory<LogPublisher<PluralClient>> =
                Box::new(move |_| Arc::new(LogPublisher::new(Arc::clone(&api), threshold)));
            run_with_sink(client, plural, streamer, factory, config).await
        }
        LogTransport::Socket => {
            tracing::info!("using phoenix socket log transport");
            let plural_config = config.plural.clone();
            let policy = BackoffPolicy::from_logs_config(&config.logs);
            let factory: SinkFactory<SocketSink> = Box::new(move |handle| {
                Arc::new(SocketSink::connect(
                    &plural_config,
                    &handle.remote_id,
                    policy.clone(),
                ))
            });
            run_with_sink(client, plural, streamer, factory, config).await
        }
    }
}

async fn run_with_sink<Sk: LogSink>(
    client: Client,
    plural: Arc<PluralClient>,
    streamer: Arc<KubeLogStreamer>,
    factory: SinkFactory<Sk>,
    config: HarnessConfig,
) -> Result<()> {
    let logs = LogManager::new(Arc::clone(&plural), streamer, &config.logs, factory);
    let suite_ttl =
        chrono::Duration::seconds(i64::try_from(config.controller.suite_ttl_secs).unwrap_or(i64::MAX));
    let ctx = Arc::new(Context {
        kube: Arc::new(KubeClusterClient::new(client.clone())),
        plural,
        logs,
        suite_ttl,
    });

    let suites: Api<TestSuite> = Api::all(client.clone());
    let workflows: Api<Workflow> = Api::all(client);

    tracing::info!("starting testsuite controller");
    Controller::new(suites, watcher::Config::default())
        .owns(workflows, watcher::Config::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok((object, _)) => {
                    tracing::debug!(suite = %object.name, "reconciled testsuite");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "reconciliation errored");
                }
            }
        })
        .await;

    tracing::info!("testsuite controller stopped");
    Ok(())
}
