// Evaluation limits: recursion depth and wall-clock timeout

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::ast::Node;
use crate::error::{Error, Result};
use crate::value::JValue;

/// Limits applied to every top-level evaluation.
///
/// A zero value disables the corresponding check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    pub timeout_ms: u64,
    pub max_depth: usize,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        EvaluationConfig {
            timeout_ms: 5000,
            max_depth: 100,
        }
    }
}

impl EvaluationConfig {
    pub fn unlimited() -> Self {
        EvaluationConfig {
            timeout_ms: 0,
            max_depth: 0,
        }
    }
}

/// Called around every node visit. An error returned from either hook
/// aborts the evaluation.
pub trait EvaluationHooks {
    fn on_enter(&mut self, node: &Node, input: &JValue) -> Result<()>;
    fn on_exit(&mut self, node: &Node, input: &JValue, result: &JValue) -> Result<()>;
}

/// Depth and timeout enforcement for one evaluation.
#[derive(Debug)]
pub struct Guard {
    config: EvaluationConfig,
    depth: usize,
    started: Instant,
}

impl Guard {
    pub fn new(config: EvaluationConfig) -> Self {
        Guard {
            config,
            depth: 0,
            started: Instant::now(),
        }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    fn check_timeout(&self) -> Result<()> {
        if self.config.timeout_ms == 0 {
            return Ok(());
        }
        let elapsed = self.started.elapsed();
        if elapsed > Duration::from_millis(self.config.timeout_ms) {
            warn!(
                timeout_ms = self.config.timeout_ms,
                elapsed_ms = elapsed.as_millis() as u64,
                "Evaluation timed out"
            );
            return Err(Error::new("U1002"));
        }
        Ok(())
    }
}

impl EvaluationHooks for Guard {
    fn on_enter(&mut self, node: &Node, _input: &JValue) -> Result<()> {
        self.depth += 1;
        if self.config.max_depth > 0 && self.depth > self.config.max_depth {
            warn!(
                max_depth = self.config.max_depth,
                position = node.position,
                "Evaluation exceeded maximum depth"
            );
            return Err(Error::new("U1001").at(node.position));
        }
        self.check_timeout()
    }

    fn on_exit(&mut self, _node: &Node, _input: &JValue, _result: &JValue) -> Result<()> {
        self.depth = self.depth.saturating_sub(1);
        self.check_timeout()
    }
}
