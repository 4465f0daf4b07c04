// Step engine: runs an operation's ordered steps, stopping at the first failure
//
// State machine per step:
//   default -> running -> success
//                      -> failed
//                      -> retrying -> running ...   (retry_limit > 0)
//                      -> stopped                   (stop signal)
//   default -> skipped                              (operator, before the run)

use crate::context::ActuatorContext;
use crate::errors::StepError;
use crate::retry::{NoDelay, RetryStrategy};
use serde::Serialize;
use std::fmt;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Step states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepState {
    Default,
    Running,
    Retrying,
    Success,
    /// Skipped by the operator before the run started
    Skipped,
    /// Stopped on request; a special form of failure
    Stopped,
    Failed,
}

impl StepState {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepState::Default => "default",
            StepState::Running => "running",
            StepState::Retrying => "retrying",
            StepState::Success => "success",
            StepState::Skipped => "skipped",
            StepState::Stopped => "stopped",
            StepState::Failed => "failed",
        }
    }
}

impl fmt::Display for StepState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unit of work over the operation component `C`
pub type StepAction<C> = Box<dyn FnMut(&mut C, &ActuatorContext) -> anyhow::Result<()> + Send>;

/// One named step with its optional hooks
pub struct Step<C> {
    name: String,
    action: StepAction<C>,
    retry_action: Option<StepAction<C>>,
    rollback_action: Option<StepAction<C>>,
    stop_action: Option<StepAction<C>>,
    retry_limit: u32,
    state: StepState,
    attempts: u32,
}

impl<C> Step<C> {
    pub fn new<F>(name: impl Into<String>, action: F) -> Self
    where
        F: FnMut(&mut C, &ActuatorContext) -> anyhow::Result<()> + Send + 'static,
    {
        Self {
            name: name.into(),
            action: Box::new(action),
            retry_action: None,
            rollback_action: None,
            stop_action: None,
            retry_limit: 0,
            state: StepState::Default,
            attempts: 0,
        }
    }

    /// Allow up to `limit` re-attempts after a failure
    ///
    /// The action must be safe to invoke again from the start.
    pub fn with_retry(mut self, limit: u32) -> Self {
        self.retry_limit = limit;
        self
    }

    /// Action used for re-attempts instead of the main action
    pub fn with_retry_action<F>(mut self, action: F) -> Self
    where
        F: FnMut(&mut C, &ActuatorContext) -> anyhow::Result<()> + Send + 'static,
    {
        self.retry_action = Some(Box::new(action));
        self
    }

    /// Undo hook run when a later step fails and rollback is enabled
    pub fn with_rollback<F>(mut self, action: F) -> Self
    where
        F: FnMut(&mut C, &ActuatorContext) -> anyhow::Result<()> + Send + 'static,
    {
        self.rollback_action = Some(Box::new(action));
        self
    }

    /// Hook run when a stop request lands on this step
    pub fn with_stop<F>(mut self, action: F) -> Self
    where
        F: FnMut(&mut C, &ActuatorContext) -> anyhow::Result<()> + Send + 'static,
    {
        self.stop_action = Some(Box::new(action));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> StepState {
        self.state
    }

    pub fn retry_limit(&self) -> u32 {
        self.retry_limit
    }

    /// Number of times the step was attempted in the last run
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

impl<C> fmt::Debug for Step<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("name", &self.name)
            .field("state", &self.state)
            .field("retry_limit", &self.retry_limit)
            .field("attempts", &self.attempts)
            .field("has_retry_action", &self.retry_action.is_some())
            .field("has_rollback_action", &self.rollback_action.is_some())
            .field("has_stop_action", &self.stop_action.is_some())
            .finish()
    }
}

/// What happens to already succeeded steps when a run ends early
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RollbackPolicy {
    /// Leave side effects in place
    #[default]
    None,
    /// Run rollback hooks of succeeded steps, last one first
    Reverse,
}

/// External request to stop before the next step or re-attempt
#[derive(Debug, Clone, Default)]
pub struct StopSignal(CancellationToken);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.0.is_cancelled()
    }
}

/// Ordered steps of one operation; insertion order is execution order
pub struct Steps<C> {
    steps: Vec<Step<C>>,
    retry_strategy: Box<dyn RetryStrategy>,
    rollback: RollbackPolicy,
    stop: StopSignal,
}

impl<C> Default for Steps<C> {
    fn default() -> Self {
        Self {
            steps: Vec::new(),
            retry_strategy: Box::new(NoDelay),
            rollback: RollbackPolicy::None,
            stop: StopSignal::new(),
        }
    }
}

impl<C> Steps<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, step: Step<C>) {
        self.steps.push(step);
    }

    /// Builder form of [`Steps::push`]
    pub fn step(mut self, step: Step<C>) -> Self {
        self.steps.push(step);
        self
    }

    pub fn with_retry_strategy(mut self, strategy: impl RetryStrategy + 'static) -> Self {
        self.retry_strategy = Box::new(strategy);
        self
    }

    pub fn with_rollback(mut self, policy: RollbackPolicy) -> Self {
        self.rollback = policy;
        self
    }

    pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    /// Mark a not yet started step as skipped; returns false if no such step
    pub fn skip(&mut self, name: &str) -> bool {
        match self
            .steps
            .iter_mut()
            .find(|s| s.name == name && s.state == StepState::Default)
        {
            Some(step) => {
                step.state = StepState::Skipped;
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Step<C>> {
        self.steps.iter()
    }

    pub fn states(&self) -> Vec<StepState> {
        self.steps.iter().map(|s| s.state).collect()
    }

    /// `(name, state)` of every step, in execution order
    pub fn summary(&self) -> Vec<(String, StepState)> {
        self.steps
            .iter()
            .map(|s| (s.name.clone(), s.state))
            .collect()
    }

    /// Run all steps in order against `component`
    ///
    /// Returns the first failure; no later step is started after it.
    pub fn run(&mut self, component: &mut C, ctx: &ActuatorContext) -> Result<(), StepError> {
        info!(step_count = self.steps.len(), "Executing steps sequentially");

        for index in 0..self.steps.len() {
            let name = self.steps[index].name.clone();

            if self.steps[index].state == StepState::Skipped {
                info!(step_index = index, step_name = %name, "step <{}>, skipped [{}]", index, name);
                continue;
            }

            if self.stop.is_stopped() {
                let err = self.stop_step(index, component, ctx);
                self.rollback(index, component, ctx);
                return Err(err);
            }

            info!(step_index = index, step_name = %name, "step <{}>, ready start run [{}]", index, name);
            let started = Instant::now();

            if let Err(err) = self.execute(index, component, ctx) {
                let remaining: Vec<&str> = self.steps[index + 1..]
                    .iter()
                    .map(|s| s.name.as_str())
                    .collect();
                if !remaining.is_empty() {
                    warn!(remaining = ?remaining, "Steps not executed");
                }
                self.rollback(index, component, ctx);
                return Err(err);
            }

            info!(
                step_index = index,
                step_name = %name,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "step <{}>, start run [{}] successfully",
                index,
                name
            );
        }

        info!(total_steps = self.steps.len(), "All steps completed successfully");
        Ok(())
    }

    fn execute(
        &mut self,
        index: usize,
        component: &mut C,
        ctx: &ActuatorContext,
    ) -> Result<(), StepError> {
        let Self {
            steps,
            retry_strategy,
            stop,
            ..
        } = self;
        let step = &mut steps[index];

        step.state = StepState::Running;
        step.attempts = 1;
        let mut outcome = (step.action)(component, ctx);

        loop {
            let error = match outcome {
                Ok(()) => {
                    step.state = StepState::Success;
                    return Ok(());
                }
                Err(error) => error,
            };

            let retries_used = step.attempts - 1;
            let delay = if retries_used < step.retry_limit {
                retry_strategy.next_delay(retries_used)
            } else {
                None
            };

            let Some(delay) = delay else {
                step.state = StepState::Failed;
                error!(
                    step_index = index,
                    step_name = %step.name,
                    attempts = step.attempts,
                    error = %format!("{:#}", error),
                    "step<{}>: {} failed",
                    index,
                    step.name
                );
                return Err(StepError::Failed {
                    index,
                    name: step.name.clone(),
                    error,
                });
            };

            step.state = StepState::Retrying;
            warn!(
                step_index = index,
                step_name = %step.name,
                attempt = step.attempts,
                retry_limit = step.retry_limit,
                delay_ms = delay.as_millis() as u64,
                error = %format!("{:#}", error),
                "Step attempt failed, retrying"
            );
            if !delay.is_zero() {
                std::thread::sleep(delay);
            }

            if stop.is_stopped() {
                return Err(Self::stop_in_place(step, index, component, ctx));
            }

            step.state = StepState::Running;
            step.attempts += 1;
            outcome = match step.retry_action.as_mut() {
                Some(retry) => retry(component, ctx),
                None => (step.action)(component, ctx),
            };
        }
    }

    fn stop_step(&mut self, index: usize, component: &mut C, ctx: &ActuatorContext) -> StepError {
        let step = &mut self.steps[index];
        step.state = StepState::Running;
        Self::stop_in_place(step, index, component, ctx)
    }

    fn stop_in_place(
        step: &mut Step<C>,
        index: usize,
        component: &mut C,
        ctx: &ActuatorContext,
    ) -> StepError {
        warn!(step_index = index, step_name = %step.name, "Stop requested, stopping step");

        if let Some(stop_action) = step.stop_action.as_mut() {
            if let Err(e) = stop_action(component, ctx) {
                error!(step_index = index, step_name = %step.name, error = %format!("{:#}", e), "Stop hook failed");
            }
        }

        step.state = StepState::Stopped;
        StepError::Stopped {
            index,
            name: step.name.clone(),
        }
    }

    fn rollback(&mut self, upto: usize, component: &mut C, ctx: &ActuatorContext) {
        if self.rollback != RollbackPolicy::Reverse {
            return;
        }

        for index in (0..upto).rev() {
            let step = &mut self.steps[index];
            if step.state != StepState::Success {
                continue;
            }
            let Some(rollback) = step.rollback_action.as_mut() else {
                continue;
            };

            info!(step_index = index, step_name = %step.name, "Rolling back step");
            match rollback(component, ctx) {
                Ok(()) => info!(step_index = index, step_name = %step.name, "Step rolled back"),
                Err(e) => error!(
                    step_index = index,
                    step_name = %step.name,
                    error = %format!("{:#}", e),
                    "Rollback failed, continuing with earlier steps"
                ),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::FixedDelay;
    use std::time::Duration;

    #[derive(Debug, thiserror::Error, PartialEq)]
    #[error("boom in {0}")]
    struct Boom(&'static str);

    #[derive(Default)]
    struct Recorder {
        calls: Vec<String>,
        fail_times: u32,
    }

    fn record(name: &'static str) -> impl FnMut(&mut Recorder, &ActuatorContext) -> anyhow::Result<()> + Send {
        move |r: &mut Recorder, _ctx: &ActuatorContext| {
            r.calls.push(name.to_string());
            Ok(())
        }
    }

    fn fail(name: &'static str) -> impl FnMut(&mut Recorder, &ActuatorContext) -> anyhow::Result<()> + Send {
        move |r: &mut Recorder, _ctx: &ActuatorContext| {
            r.calls.push(name.to_string());
            Err(Boom(name).into())
        }
    }

    fn flaky(name: &'static str) -> impl FnMut(&mut Recorder, &ActuatorContext) -> anyhow::Result<()> + Send {
        move |r: &mut Recorder, _ctx: &ActuatorContext| {
            r.calls.push(name.to_string());
            if r.fail_times > 0 {
                r.fail_times -= 1;
                return Err(Boom(name).into());
            }
            Ok(())
        }
    }

    fn ctx() -> ActuatorContext {
        ActuatorContext::default()
    }

    #[test]
    fn test_all_steps_succeed_in_order() {
        let mut steps = Steps::new()
            .step(Step::new("s1", record("s1")))
            .step(Step::new("s2", record("s2")))
            .step(Step::new("s3", record("s3")));
        let mut recorder = Recorder::default();

        steps.run(&mut recorder, &ctx()).unwrap();

        assert_eq!(recorder.calls, vec!["s1", "s2", "s3"]);
        assert_eq!(steps.states(), vec![StepState::Success; 3]);
    }

    #[test]
    fn test_failure_short_circuits() {
        let mut steps = Steps::new()
            .step(Step::new("s1", record("s1")))
            .step(Step::new("s2", fail("s2")))
            .step(Step::new("s3", record("s3")));
        let mut recorder = Recorder::default();

        let err = steps.run(&mut recorder, &ctx()).unwrap_err();

        assert_eq!(recorder.calls, vec!["s1", "s2"]);
        assert_eq!(
            steps.states(),
            vec![StepState::Success, StepState::Failed, StepState::Default]
        );
        assert_eq!(err.index(), 1);
        let source = err.action_error().unwrap().downcast_ref::<Boom>();
        assert_eq!(source, Some(&Boom("s2")));
    }

    #[test]
    fn test_declared_hooks_are_not_used_by_default() {
        let mut steps = Steps::new()
            .step(Step::new("s1", record("s1")).with_rollback(record("undo-s1")))
            .step(
                Step::new("s2", fail("s2"))
                    .with_retry_action(record("retry-s2"))
                    .with_stop(record("stop-s2")),
            );
        let mut recorder = Recorder::default();

        assert!(steps.run(&mut recorder, &ctx()).is_err());
        assert_eq!(recorder.calls, vec!["s1", "s2"]);
    }

    #[test]
    fn test_skipped_step_is_passed_over() {
        let mut steps = Steps::new()
            .step(Step::new("s1", record("s1")))
            .step(Step::new("s2", fail("s2")))
            .step(Step::new("s3", record("s3")));
        assert!(steps.skip("s2"));
        assert!(!steps.skip("missing"));
        let mut recorder = Recorder::default();

        steps.run(&mut recorder, &ctx()).unwrap();

        assert_eq!(recorder.calls, vec!["s1", "s3"]);
        assert_eq!(
            steps.states(),
            vec![StepState::Success, StepState::Skipped, StepState::Success]
        );
    }

    #[test]
    fn test_retry_until_success() {
        let mut steps = Steps::new()
            .with_retry_strategy(FixedDelay::new(Duration::from_millis(1)))
            .step(Step::new("flaky", flaky("flaky")).with_retry(3));
        let mut recorder = Recorder {
            fail_times: 2,
            ..Recorder::default()
        };

        steps.run(&mut recorder, &ctx()).unwrap();

        assert_eq!(recorder.calls.len(), 3);
        let step = steps.iter().next().unwrap();
        assert_eq!(step.state(), StepState::Success);
        assert_eq!(step.attempts(), 3);
    }

    #[test]
    fn test_retry_limit_exhausted() {
        let mut steps = Steps::new()
            .step(Step::new("s1", fail("s1")).with_retry(2))
            .step(Step::new("s2", record("s2")));
        let mut recorder = Recorder::default();

        let err = steps.run(&mut recorder, &ctx()).unwrap_err();

        assert!(matches!(err, StepError::Failed { index: 0, .. }));
        assert_eq!(recorder.calls, vec!["s1", "s1", "s1"]);
        assert_eq!(steps.iter().next().unwrap().attempts(), 3);
        assert_eq!(steps.states(), vec![StepState::Failed, StepState::Default]);
    }

    #[test]
    fn test_retry_action_replaces_main_action_on_reattempt() {
        let mut steps =
            Steps::new().step(Step::new("s1", fail("s1")).with_retry(1).with_retry_action(record("retry")));
        let mut recorder = Recorder::default();

        steps.run(&mut recorder, &ctx()).unwrap();

        assert_eq!(recorder.calls, vec!["s1", "retry"]);
    }

    #[test]
    fn test_stop_signal_stops_pending_step() {
        let stop = StopSignal::new();
        let mut steps = Steps::new()
            .with_stop_signal(stop.clone())
            .step(Step::new("s1", record("s1")).with_stop(record("stop-s1")))
            .step(Step::new("s2", record("s2")));
        stop.stop();
        let mut recorder = Recorder::default();

        let err = steps.run(&mut recorder, &ctx()).unwrap_err();

        assert!(matches!(err, StepError::Stopped { index: 0, .. }));
        assert_eq!(recorder.calls, vec!["stop-s1"]);
        assert_eq!(steps.states(), vec![StepState::Stopped, StepState::Default]);
    }

    #[test]
    fn test_stop_during_retry() {
        let stop = StopSignal::new();
        let trigger = stop.clone();
        let mut steps = Steps::new().with_stop_signal(stop).step(
            Step::new("s1", move |r: &mut Recorder, _ctx: &ActuatorContext| {
                r.calls.push("s1".to_string());
                trigger.stop();
                Err(anyhow::anyhow!("lost connection"))
            })
            .with_retry(5),
        );
        let mut recorder = Recorder::default();

        let err = steps.run(&mut recorder, &ctx()).unwrap_err();

        assert!(matches!(err, StepError::Stopped { index: 0, .. }));
        assert_eq!(recorder.calls, vec!["s1"]);
        assert_eq!(steps.states(), vec![StepState::Stopped]);
    }

    #[test]
    fn test_reverse_rollback_of_succeeded_steps() {
        let mut steps = Steps::new()
            .with_rollback(RollbackPolicy::Reverse)
            .step(Step::new("s1", record("s1")).with_rollback(record("undo-s1")))
            .step(Step::new("s2", record("s2")))
            .step(Step::new("s3", record("s3")).with_rollback(record("undo-s3")))
            .step(Step::new("s4", fail("s4")).with_rollback(record("undo-s4")));
        let mut recorder = Recorder::default();

        let err = steps.run(&mut recorder, &ctx()).unwrap_err();

        assert_eq!(err.index(), 3);
        assert_eq!(
            recorder.calls,
            vec!["s1", "s2", "s3", "s4", "undo-s3", "undo-s1"]
        );
        // Rollback does not rewrite recorded states
        assert_eq!(
            steps.states(),
            vec![
                StepState::Success,
                StepState::Success,
                StepState::Success,
                StepState::Failed
            ]
        );
    }

    #[test]
    fn test_rollback_failure_keeps_original_error() {
        let mut steps = Steps::new()
            .with_rollback(RollbackPolicy::Reverse)
            .step(Step::new("s1", record("s1")).with_rollback(fail("undo-s1")))
            .step(Step::new("s2", fail("s2")));
        let mut recorder = Recorder::default();

        let err = steps.run(&mut recorder, &ctx()).unwrap_err();

        assert_eq!(
            err.action_error().unwrap().downcast_ref::<Boom>(),
            Some(&Boom("s2"))
        );
        assert_eq!(recorder.calls, vec!["s1", "s2", "undo-s1"]);
    }

    #[test]
    fn test_summary_and_display() {
        let steps: Steps<Recorder> = Steps::new().step(Step::new("init", record("init")));
        assert_eq!(
            steps.summary(),
            vec![("init".to_string(), StepState::Default)]
        );
        assert_eq!(StepState::Retrying.to_string(), "retrying");
        assert_eq!(
            serde_json::to_string(&StepState::Success).unwrap(),
            "\"success\""
        );
    }
}
