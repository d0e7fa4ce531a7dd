//! The load → initialize → update loop → finalize → unload cycle.

use std::path::Path;

use anyhow::{bail, Context, Result};
use bmi_runtime::ModelSession;
use tracing::info;

/// Outcome of a completed run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunSummary {
    pub steps: u64,
    pub end_time: f64,
}

/// Drive an already loaded model from its start to its end time.
///
/// Fails if an update does not advance model time or if `max_steps` updates
/// do not reach the end time. The session is finalized whenever it was
/// initialized, and unloaded in every case.
pub fn run(
    session: &mut ModelSession,
    config: &Path,
    dt: f64,
    max_steps: Option<u64>,
) -> Result<RunSummary> {
    let result = drive(session, config, dt, max_steps);
    let unloaded = session.unload().context("unload failed");
    let summary = result?;
    unloaded?;
    Ok(summary)
}

fn drive(
    session: &mut ModelSession,
    config: &Path,
    dt: f64,
    max_steps: Option<u64>,
) -> Result<RunSummary> {
    session
        .initialize(config)
        .with_context(|| format!("initialize with {}", config.display()))?;

    let stepped = step_to_end(session, dt, max_steps);
    let finalized = session.finalize().context("finalize failed");
    let summary = stepped?;
    finalized?;
    Ok(summary)
}

fn step_to_end(session: &mut ModelSession, dt: f64, max_steps: Option<u64>) -> Result<RunSummary> {
    let end = session.end_time()?;
    let mut t = session.current_time()?;
    let mut steps = 0u64;

    while t < end {
        if max_steps.map_or(false, |max| steps >= max) {
            bail!(
                "end time {} not reached after {} updates (model time {})",
                end,
                steps,
                t
            );
        }
        session
            .update(dt)
            .with_context(|| format!("update {} at t = {}", steps + 1, t))?;
        steps += 1;

        let next = session.current_time()?;
        if next <= t {
            bail!("model time did not advance past {} on update {}", t, steps);
        }
        t = next;
    }

    info!(steps, end_time = t, "Run complete");
    Ok(RunSummary { steps, end_time: t })
}
