//! Timing jitter action.
//!
//! Shaping a protocol's cadence sometimes needs an idle gap that matches
//! the mimicked traffic. `timing.sleep(min_ms, max_ms)` pauses the session
//! for a uniformly sampled delay; the sleep is cancellable like any other
//! blocking action.

use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::value::{require, ArgKind, Value};

use super::{ActionSpec, BoxFuture, Host};

/// Descriptor for `timing.sleep`.
pub fn sleep_spec() -> ActionSpec {
    ActionSpec {
        name: "timing.sleep",
        min_args: 2,
        params: &[ArgKind::Int, ArgKind::Int],
        handler: sleep_handler,
    }
}

fn sleep_handler<'a>(
    ctx: &'a CancellationToken,
    host: &'a dyn Host,
    args: &'a [Value],
) -> BoxFuture<'a, Result<()>> {
    Box::pin(sleep(ctx, host, args))
}

/// Sleep a uniformly sampled delay in `[min_ms, max_ms]`.
pub async fn sleep(ctx: &CancellationToken, _host: &dyn Host, args: &[Value]) -> Result<()> {
    require(args, 2)?;
    let min_ms = args[0].as_int()?;
    let max_ms = args[1].as_int()?;

    if min_ms < 0 || max_ms < min_ms {
        return Err(Error::config(format!(
            "sleep bounds out of order: {min_ms}..{max_ms}"
        )));
    }

    let delay_ms = if min_ms == max_ms {
        min_ms
    } else {
        rand::thread_rng().gen_range(min_ms..=max_ms)
    } as u64;

    tokio::select! {
        biased;
        _ = ctx.cancelled() => Err(Error::Cancelled),
        _ = tokio::time::sleep(Duration::from_millis(delay_ms)) => Ok(()),
    }
}
