// Operation runner: helper output, payload binding and step execution
//
// The step engine is synchronous; it runs on a blocking task while the async
// side only waits for Ctrl+C and forwards it as a stop request.

use crate::cli::BaseOptions;
use anyhow::{Context, Result};
use common::binder::{example_payload, BindMode, Params, PayloadBinder};
use common::config::Settings;
use common::context::ActuatorContext;
use common::env::ProcessEnv;
use common::retry::ExponentialBackoff;
use common::steps::{StepState, Steps, StopSignal};
use tokio::signal;
use tracing::{error, info, warn, Span};

/// One concrete operation: its parameters, how they bind, and its steps
pub trait Operation: Sized + Send + 'static {
    type Params: Params;

    /// Payload layout this operation expects
    const MODE: BindMode;

    fn new(params: Self::Params, settings: &Settings) -> Result<Self>;

    /// Ordered steps run against `self`
    fn steps(&self) -> Steps<Self>;
}

/// Pretty JSON example payload for `--helper`
pub fn helper_text<O: Operation>() -> Result<String> {
    let example = example_payload::<O::Params>(O::MODE)?;
    Ok(serde_json::to_string_pretty(&example)?)
}

/// Bind the payload, build the operation and run its steps to completion
pub async fn run_operation<O: Operation>(base: &BaseOptions, settings: &Settings) -> Result<()> {
    if base.helper {
        println!("{}", helper_text::<O>()?);
        return Ok(());
    }
    base.validate()?;

    let mut ctx = ActuatorContext::new(base.run_context(), base.is_external());
    let params: O::Params =
        PayloadBinder::new(&base.payload, ctx.run().payload_format(), &ProcessEnv)
            .bind(O::MODE, &mut ctx)
            .map_err(|e| {
                error!(error = %e, "Failed to bind payload");
                e
            })?;

    let component = O::new(params, settings)?;
    let stop = StopSignal::new();
    let steps = component
        .steps()
        .with_retry_strategy(ExponentialBackoff::with_config(
            settings.engine.retry_base_delay_ms,
            settings.engine.retry_max_delay_ms,
            settings.engine.retry_jitter,
        ))
        .with_rollback(base.rollback_policy())
        .with_stop_signal(stop.clone());

    let watcher = tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                warn!("Interrupt received, stopping before the next step");
                stop.stop();
            }
            Err(e) => error!(error = %e, "Failed to listen for interrupt signal"),
        }
    });

    let span = Span::current();
    let (summary, outcome) = tokio::task::spawn_blocking(move || {
        let _entered = span.enter();
        let mut steps = steps;
        let mut component = component;
        let outcome = steps.run(&mut component, &ctx);
        (steps.summary(), outcome)
    })
    .await
    .context("Step runner task panicked")?;
    watcher.abort();

    report(&summary);
    outcome?;
    Ok(())
}

fn report(summary: &[(String, StepState)]) {
    for (index, (name, state)) in summary.iter().enumerate() {
        info!(step_index = index, step_name = %name, state = %state, "Step summary");
    }
}
