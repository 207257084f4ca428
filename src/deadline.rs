//! Cooperative request timeout.

use std::time::Duration;
use std::time::Instant;

use crate::error::EngineError;
use crate::error::Result;

/// Wall-clock budget checked inside long-running loops.
#[derive(Clone, Copy, Debug)]
pub struct Deadline {
  started: Instant,
  budget: Option<Duration>,
}

impl Deadline {
  /// Deadline starting now with an optional budget.
  pub fn new(budget: Option<Duration>) -> Self {
    Self {
      started: Instant::now(),
      budget,
    }
  }

  /// Deadline that never expires.
  pub fn unbounded() -> Self {
    Self::new(None)
  }

  pub fn is_expired(&self) -> bool {
    self
      .budget
      .is_some_and(|budget| self.started.elapsed() >= budget)
  }

  /// Fails with [`EngineError::Timeout`] once the budget is spent.
  pub fn check(&self) -> Result<()> {
    if self.is_expired() {
      return Err(EngineError::Timeout {
        elapsed_ms: self.started.elapsed().as_millis(),
      });
    }
    Ok(())
  }
}

impl Default for Deadline {
  fn default() -> Self {
    Self::unbounded()
  }
}
