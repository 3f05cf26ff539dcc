//! # Step Pipeline
//!
//! An ordered list of named steps sharing one context. Steps run strictly in
//! order; the first step that stops the pipeline decides the result of the
//! whole run. There is no retry within a run: a step that cannot finish
//! returns an error or a requeue and the scheduler invokes the pipeline again
//! later, starting from the first step.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, error, info_span, Instrument};

use super::result::ReconcileResult;
use crate::observability::metrics;
use crate::store::ObjectStore;

/// What every step context provides
pub trait ReconcileContext: Send + Sync {
    type Store: ObjectStore;

    fn store(&self) -> &Self::Store;

    /// Requeue delay after an optimistic-concurrency conflict
    fn conflict_requeue(&self) -> Duration;
}

/// One unit of reconciliation work
#[async_trait]
pub trait Step<C: ?Sized + Sync>: Send + Sync {
    fn name(&self) -> &str;

    async fn execute(&self, ctx: &C) -> ReconcileResult;
}

/// Ordered sequence of steps
pub struct Pipeline<C: ?Sized + Sync> {
    name: String,
    steps: Vec<Box<dyn Step<C>>>,
}

impl<C: ?Sized + Sync> std::fmt::Debug for Pipeline<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("steps", &self.step_names())
            .finish()
    }
}

impl<C: ?Sized + Sync> Pipeline<C> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    /// Append a step
    pub fn step(mut self, step: impl Step<C> + 'static) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    /// Run the steps in order, stopping at the first step that stops
    pub async fn run(&self, ctx: &C) -> ReconcileResult {
        let span = info_span!("reconcile.pipeline", pipeline = %self.name);
        let start = Instant::now();
        metrics::increment_reconciliations(&self.name);

        let result = self.run_steps(ctx).instrument(span).await;

        metrics::observe_reconciliation_duration(&self.name, start.elapsed().as_secs_f64());
        if result.is_error() {
            metrics::increment_reconciliation_errors(&self.name);
        }
        result
    }

    async fn run_steps(&self, ctx: &C) -> ReconcileResult {
        for step in &self.steps {
            let result = step.execute(ctx).await;
            metrics::increment_step_results(step.name(), result.outcome());

            if let Some(err) = result.error_ref() {
                error!(step = step.name(), error = %err, "step failed");
                return result;
            }
            if result.is_stop() {
                debug!(
                    step = step.name(),
                    outcome = result.outcome(),
                    requeue = ?result.requeue_after(),
                    "pipeline stopped"
                );
                return result;
            }
            debug!(step = step.name(), "step converged");
        }
        ReconcileResult::next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::reconciler::result::Requeue;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Trace {
        ran: Mutex<Vec<String>>,
    }

    struct Recording {
        name: &'static str,
        result: fn() -> ReconcileResult,
    }

    #[async_trait]
    impl Step<Trace> for Recording {
        fn name(&self) -> &str {
            self.name
        }

        async fn execute(&self, ctx: &Trace) -> ReconcileResult {
            ctx.ran.lock().unwrap().push(self.name.to_string());
            (self.result)()
        }
    }

    #[tokio::test]
    async fn test_runs_all_steps_when_each_continues() {
        let pipeline = Pipeline::new("test")
            .step(Recording { name: "a", result: ReconcileResult::next })
            .step(Recording { name: "b", result: ReconcileResult::next });
        let trace = Trace::default();
        let result = pipeline.run(&trace).await;
        assert!(!result.is_stop());
        assert_eq!(*trace.ran.lock().unwrap(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_stops_at_first_stopping_step() {
        let pipeline = Pipeline::new("test")
            .step(Recording { name: "a", result: ReconcileResult::next })
            .step(Recording {
                name: "b",
                result: || ReconcileResult::requeue(Duration::from_secs(10)),
            })
            .step(Recording { name: "c", result: ReconcileResult::next });
        let trace = Trace::default();
        let result = pipeline.run(&trace).await;
        assert_eq!(result.requeue_after(), Requeue::After(Duration::from_secs(10)));
        assert_eq!(*trace.ran.lock().unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn test_step_names_in_order() {
        let pipeline: Pipeline<Trace> = Pipeline::new("test")
            .step(Recording { name: "first", result: ReconcileResult::next })
            .step(Recording { name: "second", result: ReconcileResult::end });
        assert_eq!(pipeline.step_names(), vec!["first", "second"]);
        assert_eq!(pipeline.len(), 2);
    }
}
