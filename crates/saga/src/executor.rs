//! Generic forward-execute / reverse-compensate saga runner.

use async_trait::async_trait;

use crate::error::{SagaError, SagaStepError};

/// A step in a saga, paired with the action that undoes it.
#[async_trait]
pub trait SagaStep<C>: Send + Sync {
    /// Step name used in logs and failure reports.
    fn name(&self) -> &'static str;

    /// Executes the step against the shared context.
    async fn run(&self, ctx: &mut C) -> Result<(), SagaStepError>;

    /// Undoes the step's effects. Called only after `run` succeeded.
    async fn compensate(&self, ctx: &mut C) -> Result<(), SagaStepError>;
}

/// Executes an ordered list of steps, compensating completed steps in
/// reverse order when one fails.
pub struct SagaExecutor;

impl SagaExecutor {
    /// Runs `steps` in order against `ctx`.
    ///
    /// On the first step failure, every previously completed step is
    /// compensated in reverse order, then the failure is returned.
    /// Compensation errors are logged and do not stop the remaining
    /// compensations from running.
    #[tracing::instrument(skip_all)]
    pub async fn execute<C: Send>(
        steps: &[Box<dyn SagaStep<C>>],
        ctx: &mut C,
    ) -> Result<(), SagaError> {
        let mut completed: Vec<&dyn SagaStep<C>> = Vec::with_capacity(steps.len());

        for step in steps {
            tracing::info!(step = step.name(), "saga step started");
            match step.run(ctx).await {
                Ok(()) => {
                    tracing::info!(step = step.name(), "saga step completed");
                    completed.push(step.as_ref());
                }
                Err(source) => {
                    tracing::warn!(step = step.name(), error = %source, "saga step failed");
                    metrics::counter!("saga_compensations_total").increment(1);

                    for done in completed.iter().rev() {
                        if let Err(e) = done.compensate(ctx).await {
                            tracing::error!(
                                step = done.name(),
                                error = %e,
                                "saga compensation step failed"
                            );
                        } else {
                            tracing::info!(step = done.name(), "saga compensation step completed");
                        }
                    }

                    return Err(SagaError::StepFailed {
                        step: step.name(),
                        source,
                    });
                }
            }
        }

        Ok(())
    }
}
