// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Sleep abstraction shared by the acquisition protocol and the network session

use std::time::Duration;
use async_trait::async_trait;

/// Something that can wait. Production code sleeps on the tokio timer;
/// tests substitute an implementation that only records the requested delays.
#[async_trait]
pub trait Delay: Send + Sync {
    async fn delay(&self, duration: Duration);

    async fn delay_ms(&self, ms: u64) {
        self.delay(Duration::from_millis(ms)).await;
    }
}

/// Delay backed by `tokio::time::sleep`
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioDelay;

#[async_trait]
impl Delay for TokioDelay {
    async fn delay(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
