//! Phoenix 소켓 로그 싱크
//!
//! 배치 HTTP 경로 대신 라인을 실시간으로 밀어 넣는 레거시/대안 전송입니다.
//! `wss://{endpoint}/socket/websocket?token={token}`에 접속해
//! `tests:{remoteSuiteId}` 토픽에 join하고, 라인마다 `"stdo"` 이벤트를
//! `{line, step}` 페이로드로 push합니다.
//!
//! # 재접속
//!
//! 접속과 재접속은 싱크(드라이버 태스크)의 책임입니다. 전송 실패나 서버측
//! 종료가 감지되면 연결을 버리고, 다음 전송 시 백오프 정책에 따라
//! 다시 접속합니다.

use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use harness_core::config::PluralConfig;
use harness_core::retry::{BackoffPolicy, retry};

use crate::error::PluralError;
use crate::sink::LogSink;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Phoenix 하트비트 주기
const HEARTBEAT_INTERVAL: std::time::Duration = std::time::Duration::from_secs(30);

/// 드라이버 명령 채널 용량
const COMMAND_CAPACITY: usize = 256;

/// 드라이버 태스크로 보내는 명령
enum SocketCmd {
    Publish {
        line: String,
        step_id: String,
    },
    Close {
        done: oneshot::Sender<Result<(), PluralError>>,
    },
}

/// Phoenix 채널 기반 실시간 로그 싱크
///
/// 내부 드라이버 태스크가 연결을 소유하며, [`LogSink`] 호출은 명령
/// 채널을 통해 직렬화됩니다. 접속은 첫 전송 시점에 수행됩니다.
pub struct SocketSink {
    tx: mpsc::Sender<SocketCmd>,
}

impl SocketSink {
    /// 설정과 원격 스위트 ID로 싱크를 생성합니다.
    pub fn connect(config: &PluralConfig, remote_suite_id: &str, policy: BackoffPolicy) -> Self {
        Self::connect_url(
            config.socket_url(),
            format!("tests:{remote_suite_id}"),
            policy,
        )
    }

    /// 소켓 URL과 토픽을 직접 지정해 싱크를 생성합니다.
    pub fn connect_url(url: String, topic: String, policy: BackoffPolicy) -> Self {
        let (tx, rx) = mpsc::channel(COMMAND_CAPACITY);
        let driver = Driver {
            url,
            topic,
            policy,
            ws: None,
            msg_ref: 0,
        };
        tokio::spawn(driver.run(rx));
        Self { tx }
    }
}

impl LogSink for SocketSink {
    async fn publish(&self, line: &str, step_id: &str) -> Result<(), PluralError> {
        self.tx
            .send(SocketCmd::Publish {
                line: line.to_owned(),
                step_id: step_id.to_owned(),
            })
            .await
            .map_err(|_| PluralError::Closed)
    }

    async fn close(&self) -> Result<(), PluralError> {
        let (done, ack) = oneshot::channel();
        self.tx
            .send(SocketCmd::Close { done })
            .await
            .map_err(|_| PluralError::Closed)?;
        ack.await.map_err(|_| PluralError::Closed)?
    }
}

/// 드라이버 루프가 한 턴에 처리하는 이벤트
enum Event {
    Command(Option<SocketCmd>),
    Heartbeat,
    Incoming(Option<Result<Message, tokio_tungstenite::tungstenite::Error>>),
}

/// 연결을 소유하는 드라이버
struct Driver {
    url: String,
    topic: String,
    policy: BackoffPolicy,
    ws: Option<WsStream>,
    msg_ref: u64,
}

impl Driver {
    async fn run(mut self, mut rx: mpsc::Receiver<SocketCmd>) {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            let event = tokio::select! {
                cmd = rx.recv() => Event::Command(cmd),
                _ = heartbeat.tick() => Event::Heartbeat,
                incoming = next_message(&mut self.ws) => Event::Incoming(incoming),
            };

            match event {
                Event::Command(Some(SocketCmd::Publish { line, step_id })) => {
                    if let Err(e) = self.publish(&line, &step_id).await {
                        warn!(step_id = %step_id, error = %e, "dropping log line after socket failure");
                    }
                }
                Event::Command(Some(SocketCmd::Close { done })) => {
                    // 이후의 publish가 즉시 Closed를 받도록 채널부터 닫음
                    rx.close();
                    let result = self.shutdown().await;
                    let _ = done.send(result);
                    return;
                }
                Event::Command(None) => {
                    // 싱크가 드롭됨, 조용히 연결 정리
                    let _ = self.shutdown().await;
                    return;
                }
                Event::Heartbeat => {
                    if self.ws.is_some() {
                        let frame = self.next_frame("phoenix", "heartbeat", json!({}));
                        if let Err(e) = self.send(frame).await {
                            debug!(error = %e, "heartbeat failed, dropping connection");
                            self.ws = None;
                        }
                    }
                }
                Event::Incoming(Some(Ok(_))) => {
                    // 서버 응답(phx_reply 등)은 소비만 함
                }
                Event::Incoming(Some(Err(e))) => {
                    debug!(error = %e, "socket read failed, dropping connection");
                    self.ws = None;
                }
                Event::Incoming(None) => {
                    debug!("socket closed by server");
                    self.ws = None;
                }
            }
        }
    }

    /// 라인 하나를 push합니다. 전송 실패 시 한 번 재접속 후 재시도합니다.
    async fn publish(&mut self, line: &str, step_id: &str) -> Result<(), PluralError> {
        self.ensure_connected().await?;

        let frame = self.next_frame(
            &self.topic.clone(),
            "stdo",
            json!({ "line": line, "step": step_id }),
        );
        if let Err(e) = self.send(frame).await {
            debug!(error = %e, "push failed, reconnecting once");
            self.ws = None;
            self.ensure_connected().await?;
            let frame = self.next_frame(
                &self.topic.clone(),
                "stdo",
                json!({ "line": line, "step": step_id }),
            );
            self.send(frame).await?;
        }

        metrics::counter!(
            harness_core::metrics::LOGS_LINES_PUBLISHED_TOTAL,
            harness_core::metrics::LABEL_TRANSPORT => "socket"
        )
        .increment(1);
        Ok(())
    }

    /// 연결이 없으면 백오프 정책에 따라 접속하고 토픽에 join합니다.
    async fn ensure_connected(&mut self) -> Result<(), PluralError> {
        if self.ws.is_some() {
            return Ok(());
        }

        let url = self.url.clone();
        let never = CancellationToken::new();
        let (mut ws, _) = retry(&self.policy, &never, || async {
            connect_async(url.as_str())
                .await
                .map_err(|e| PluralError::Socket(format!("connect failed: {e}")))
        })
        .await
        .map_err(|e| PluralError::Socket(e.to_string()))?;

        let join = self.next_frame(&self.topic.clone(), "phx_join", json!({}));
        ws.send(Message::Text(join))
            .await
            .map_err(|e| PluralError::Socket(format!("join failed: {e}")))?;

        debug!(topic = %self.topic, "joined phoenix channel");
        self.ws = Some(ws);
        Ok(())
    }

    async fn send(&mut self, frame: String) -> Result<(), PluralError> {
        match self.ws.as_mut() {
            Some(ws) => ws
                .send(Message::Text(frame))
                .await
                .map_err(|e| PluralError::Socket(format!("send failed: {e}"))),
            None => Err(PluralError::Socket("not connected".to_owned())),
        }
    }

    /// phx_leave를 보내고 연결을 닫습니다.
    async fn shutdown(&mut self) -> Result<(), PluralError> {
        if let Some(mut ws) = self.ws.take() {
            let leave = self.next_frame(&self.topic.clone(), "phx_leave", json!({}));
            if let Err(e) = ws.send(Message::Text(leave)).await {
                return Err(PluralError::Socket(format!("leave failed: {e}")));
            }
            let _ = ws.close(None).await;
        }
        Ok(())
    }

    fn next_frame(&mut self, topic: &str, event: &str, payload: serde_json::Value) -> String {
        self.msg_ref += 1;
        encode_frame(topic, event, payload, self.msg_ref)
    }
}

/// `ws`가 연결된 동안에만 완료되는 수신 future
async fn next_message(
    ws: &mut Option<WsStream>,
) -> Option<Result<Message, tokio_tungstenite::tungstenite::Error>> {
    match ws {
        Some(stream) => stream.next().await,
        None => std::future::pending().await,
    }
}

/// Phoenix V1 프레임을 직렬화합니다.
fn encode_frame(topic: &str, event: &str, payload: serde_json::Value, msg_ref: u64) -> String {
    json!({
        "topic": topic,
        "event": event,
        "payload": payload,
        "ref": msg_ref.to_string(),
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn fast_policy() -> BackoffPolicy {
        BackoffPolicy {
            base: Duration::from_millis(10),
            max_attempts: 3,
            jitter_pct: 0,
            max_delay: Duration::from_millis(100),
        }
    }

    #[test]
    fn frame_encoding() {
        let frame = encode_frame("tests:tst-1", "stdo", json!({"line": "hi", "step": "s1"}), 7);
        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["topic"], "tests:tst-1");
        assert_eq!(value["event"], "stdo");
        assert_eq!(value["payload"]["line"], "hi");
        assert_eq!(value["payload"]["step"], "s1");
        assert_eq!(value["ref"], "7");
    }

    #[test]
    fn join_and_leave_frames() {
        let join = encode_frame("tests:t", "phx_join", json!({}), 1);
        assert!(join.contains("phx_join"));
        let leave = encode_frame("tests:t", "phx_leave", json!({}), 2);
        assert!(leave.contains("phx_leave"));
    }

    #[tokio::test]
    async fn close_without_connection_succeeds() {
        // 접속은 게으르므로 한 번도 전송하지 않은 싱크는 연결 없이 닫힘
        let sink = SocketSink::connect_url(
            "ws://127.0.0.1:1".to_owned(),
            "tests:none".to_owned(),
            fast_policy(),
        );
        sink.close().await.unwrap();

        // 닫힌 뒤의 publish는 Closed
        let result = sink.publish("line", "step").await;
        assert!(matches!(result, Err(PluralError::Closed)));
    }

    #[tokio::test]
    async fn publish_joins_topic_and_pushes_lines() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (frame_tx, mut frame_rx) = mpsc::channel::<String>(16);

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            while let Some(Ok(msg)) = ws.next().await {
                if let Message::Text(txt) = msg {
                    if frame_tx.send(txt.to_string()).await.is_err() {
                        break;
                    }
                }
            }
        });

        let sink = SocketSink::connect_url(
            format!("ws://{addr}"),
            "tests:tst-9".to_owned(),
            fast_policy(),
        );

        sink.publish("first line", "stp-1").await.unwrap();
        sink.publish("second line", "stp-2").await.unwrap();

        let join: serde_json::Value = serde_json::from_str(
            &tokio::time::timeout(Duration::from_secs(5), frame_rx.recv())
                .await
                .unwrap()
                .unwrap(),
        )
        .unwrap();
        assert_eq!(join["event"], "phx_join");
        assert_eq!(join["topic"], "tests:tst-9");

        let first: serde_json::Value = serde_json::from_str(
            &tokio::time::timeout(Duration::from_secs(5), frame_rx.recv())
                .await
                .unwrap()
                .unwrap(),
        )
        .unwrap();
        assert_eq!(first["event"], "stdo");
        assert_eq!(first["payload"]["line"], "first line");
        assert_eq!(first["payload"]["step"], "stp-1");

        let second: serde_json::Value = serde_json::from_str(
            &tokio::time::timeout(Duration::from_secs(5), frame_rx.recv())
                .await
                .unwrap()
                .unwrap(),
        )
        .unwrap();
        assert_eq!(second["payload"]["line"], "second line");

        sink.close().await.unwrap();
        let leave: serde_json::Value = serde_json::from_str(
            &tokio::time::timeout(Duration::from_secs(5), frame_rx.recv())
                .await
                .unwrap()
                .unwrap(),
        )
        .unwrap();
        assert_eq!(leave["event"], "phx_leave");
    }

    #[tokio::test]
    async fn publish_fails_when_endpoint_unreachable() {
        // 접속 불가능한 주소: 재시도 소진 후 라인은 드롭되고 publish 자체는 성공
        // (전달 실패는 드라이버가 로깅으로 처리)
        let sink = SocketSink::connect_url(
            "ws://127.0.0.1:1".to_owned(),
            "tests:gone".to_owned(),
            fast_policy(),
        );
        sink.publish("line", "step").await.unwrap();
        sink.close().await.unwrap();
    }
}
