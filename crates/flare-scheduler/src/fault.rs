//! Fault injection
//!
//! Execution never fails on its own. Failures come only from an explicit
//! [`FaultInjector`] consulted once per `execute`.

use crate::function::{FunctionHandle, FunctionType};
use std::collections::HashSet;
use std::fmt::Debug;

/// Decides whether an execution fails
pub trait FaultInjector: Send + Sync + Debug {
    /// Failure reason, or `None` to let the execution succeed
    ///
    /// `sequence` counts executions started on the scheduler, from 1.
    fn inject(&self, handle: &FunctionHandle, sequence: u64) -> Option<String>;
}

/// Never fails
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFaults;

impl FaultInjector for NoFaults {
    fn inject(&self, _: &FunctionHandle, _: u64) -> Option<String> {
        None
    }
}

/// Fails every execution of the listed types
#[derive(Debug, Clone, Default)]
pub struct FailFunctionTypes {
    types: HashSet<FunctionType>,
}

impl FailFunctionTypes {
    /// Fail these types
    #[must_use]
    pub fn new(types: impl IntoIterator<Item = FunctionType>) -> Self {
        Self {
            types: types.into_iter().collect(),
        }
    }
}

impl FaultInjector for FailFunctionTypes {
    fn inject(&self, handle: &FunctionHandle, _: u64) -> Option<String> {
        self.types
            .contains(&handle.function_type)
            .then(|| format!("injected failure for {}", handle.function_type))
    }
}

/// Fails every n-th execution
#[derive(Debug, Clone, Copy)]
pub struct FailEveryNth {
    n: u64,
}

impl FailEveryNth {
    /// Fail executions `n, 2n, 3n, ...`; `n == 0` never fails
    #[must_use]
    pub const fn new(n: u64) -> Self {
        Self { n }
    }
}

impl FaultInjector for FailEveryNth {
    fn inject(&self, _: &FunctionHandle, sequence: u64) -> Option<String> {
        (self.n > 0 && sequence % self.n == 0).then(|| format!("injected failure on execution {sequence}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::FunctionId;

    fn handle(function_type: FunctionType) -> FunctionHandle {
        FunctionHandle {
            id: FunctionId::new(),
            function_type,
            payload_bytes: 0,
        }
    }

    #[test]
    fn every_nth() {
        let f = FailEveryNth::new(3);
        let h = handle(FunctionType::ApiHandler);
        let failed: Vec<u64> = (1..=9).filter(|s| f.inject(&h, *s).is_some()).collect();
        assert_eq!(failed, vec![3, 6, 9]);
        assert!(FailEveryNth::new(0).inject(&h, 3).is_none());
    }

    #[test]
    fn by_type() {
        let f = FailFunctionTypes::new([FunctionType::MlInference]);
        assert!(f.inject(&handle(FunctionType::MlInference), 1).is_some());
        assert!(f.inject(&handle(FunctionType::ApiHandler), 1).is_none());
    }
}
