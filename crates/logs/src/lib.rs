#![doc = include_str!("../README.md")]
//!
//! # 아키텍처
//!
//! ```text
//! Reconciler -> LogManager -> SuiteManager -> LogWatcher (파드당 1개)
//!                                 |               |  컨테이너당 태스크 1개
//!                                 |               v
//!                                 +---------> LogSink (LogPublisher | SocketSink)
//!                                                 |
//!                                                 v
//!                                          Plural 백엔드
//! ```
//!
//! 취소는 스위트 범위의 협력적 토큰으로 전파됩니다:
//! signal -> join -> flush 순서이며, 강제 종료는 없습니다.

pub mod error;
pub mod manager;
pub mod publisher;
pub mod watcher;

#[cfg(test)]
pub(crate) mod testutil;

// --- 주요 타입 re-export ---

pub use error::LogsError;
pub use manager::{LogManager, SuiteHandle, SuiteManager};
pub use publisher::LogPublisher;
pub use watcher::{LineStream, LogStreamer, LogWatcher, PodHandle};
