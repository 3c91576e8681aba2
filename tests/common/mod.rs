//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;
pub mod runners;

use std::time::{Duration, Instant};
use texbake::scheduler::{ProgressState, SchedulerBridge};

/// Upper bound for waiting on the scheduler thread
pub fn test_timeout() -> Duration {
    Duration::from_secs(20)
}

/// Pump the bridge until `done` holds or the timeout expires
pub fn wait_until(bridge: &mut SchedulerBridge, done: impl Fn(&ProgressState) -> bool) {
    let deadline = Instant::now() + test_timeout();
    while !done(bridge.state()) {
        assert!(
            Instant::now() < deadline,
            "Timed out waiting for scheduler, state: {:?}",
            bridge.state()
        );
        bridge.recv_timeout(Duration::from_millis(50));
    }
}
