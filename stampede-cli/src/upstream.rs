//! Simulated slow, occasionally failing upstream.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tracing::debug;

use stampede_core::{Result, StampedeError};

/// Stand-in for an expensive remote call.
///
/// Every invocation is counted so a run can report how many requests the
/// cache actually let through.
#[derive(Debug)]
pub struct Upstream {
    calls: AtomicU64,
    latency: Duration,
    fail_every: Option<u64>,
}

impl Upstream {
    /// Creates an upstream that takes `latency` per call and, if set, fails
    /// every `fail_every`-th call.
    pub fn new(latency: Duration, fail_every: Option<u64>) -> Self {
        Self {
            calls: AtomicU64::new(0),
            latency,
            fail_every: fail_every.filter(|n| *n > 0),
        }
    }

    /// Number of calls made so far.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Blocking fetch.
    pub fn fetch_blocking(&self) -> Result<String> {
        let call = self.begin();
        std::thread::sleep(self.latency);
        self.respond(call)
    }

    /// Async fetch.
    pub async fn fetch(&self) -> Result<String> {
        let call = self.begin();
        tokio::time::sleep(self.latency).await;
        self.respond(call)
    }

    fn begin(&self) -> u64 {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(call, "Upstream request");
        call
    }

    fn respond(&self, call: u64) -> Result<String> {
        match self.fail_every {
            Some(n) if call % n == 0 => Err(StampedeError::Upstream {
                call,
                reason: "simulated failure".into(),
            }),
            _ => Ok(format!("payload#{call}")),
        }
    }
}
