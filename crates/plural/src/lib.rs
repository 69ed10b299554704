#![doc = include_str!("../README.md")]

pub mod api;
pub mod client;
pub mod error;
pub mod sink;
pub mod socket;

// --- 주요 타입 re-export ---

pub use api::{Test, TestAttributes, TestStep, TestStepAttributes};
pub use client::{PluralClient, TestApi};
pub use error::PluralError;
pub use sink::LogSink;
pub use socket::SocketSink;
