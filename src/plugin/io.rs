//! Canonical byte-exact I/O actions.
//!
//! `io.puts` and `io.gets` are the template for any "transmit N bytes"
//! action: the format's timing may legitimately stall mid-transfer, so
//! timeouts are retried with the unsent remainder, unbounded except by
//! cancellation, while any other transport error aborts verbatim.

use tokio_util::sync::CancellationToken;

use crate::conn::Connection;
use crate::error::{Error, Result};
use crate::value::{require, ArgKind, Value};

use super::{ActionSpec, BoxFuture, Host};

/// Descriptor for `io.puts`.
pub fn puts_spec() -> ActionSpec {
    ActionSpec {
        name: "io.puts",
        min_args: 1,
        params: &[ArgKind::Str],
        handler: puts_handler,
    }
}

/// Descriptor for `io.gets`.
pub fn gets_spec() -> ActionSpec {
    ActionSpec {
        name: "io.gets",
        min_args: 1,
        params: &[ArgKind::Str],
        handler: gets_handler,
    }
}

fn puts_handler<'a>(
    ctx: &'a CancellationToken,
    host: &'a dyn Host,
    args: &'a [Value],
) -> BoxFuture<'a, Result<()>> {
    Box::pin(puts(ctx, host, args))
}

fn gets_handler<'a>(
    ctx: &'a CancellationToken,
    host: &'a dyn Host,
    args: &'a [Value],
) -> BoxFuture<'a, Result<()>> {
    Box::pin(gets(ctx, host, args))
}

/// Send the first argument's bytes, exactly and completely.
///
/// Argument validation happens before any connection I/O; an empty payload
/// succeeds trivially.
pub async fn puts(ctx: &CancellationToken, host: &dyn Host, args: &[Value]) -> Result<()> {
    require(args, 1)?;
    let payload = args[0].as_str()?;
    send_all(ctx, host.conn(), payload.as_bytes()).await
}

/// Receive bytes equal to the first argument's literal, exactly.
///
/// An optional second stream-id argument appends the matched bytes to that
/// stream's receive buffer, so later transition guards can match on them.
pub async fn gets(ctx: &CancellationToken, host: &dyn Host, args: &[Value]) -> Result<()> {
    require(args, 1)?;
    let expected = args[0].as_str()?;
    let capture = match args.get(1) {
        Some(v) => Some(v.as_stream()?),
        None => None,
    };

    let want = expected.as_bytes();
    if want.is_empty() {
        return Ok(());
    }

    let mut buf = vec![0u8; want.len()];
    recv_all(ctx, host.conn(), &mut buf).await?;

    if buf != want {
        return Err(Error::UnexpectedPayload {
            expected: expected.to_string(),
        });
    }

    if let Some(id) = capture {
        host.streams().get(id).enqueue(&buf);
    }
    Ok(())
}

/// Write all of `payload`, retrying timeouts with the unsent remainder.
///
/// A short write advances the offset and loops; a zero-byte success is a
/// harmless no-op retry. Only cancellation bounds the loop, so the retry is
/// an explicit loop rather than recursion.
pub(crate) async fn send_all(
    ctx: &CancellationToken,
    conn: &dyn Connection,
    payload: &[u8],
) -> Result<()> {
    let mut sent = 0;
    while sent < payload.len() {
        if ctx.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let res = tokio::select! {
            biased;
            _ = ctx.cancelled() => return Err(Error::Cancelled),
            res = conn.write(&payload[sent..]) => res,
        };

        match res {
            Ok(0) => {
                // No forward progress; give other tasks (the canceller
                // included) a turn before retrying.
                tokio::task::yield_now().await;
            }
            Ok(n) => sent += n,
            Err(e) if conn.is_timeout(&e) => {
                tracing::trace!(sent, total = payload.len(), "write timed out, retrying");
                tokio::task::yield_now().await;
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

/// Fill `buf` completely, retrying timeouts with the unfilled remainder.
///
/// Zero-byte reads get the same no-progress treatment as writes; a peer
/// that went away for good surfaces through cancellation or a permanent
/// transport error, never a silent short read.
pub(crate) async fn recv_all(
    ctx: &CancellationToken,
    conn: &dyn Connection,
    buf: &mut [u8],
) -> Result<()> {
    let mut filled = 0;
    while filled < buf.len() {
        if ctx.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let res = tokio::select! {
            biased;
            _ = ctx.cancelled() => return Err(Error::Cancelled),
            res = conn.read(&mut buf[filled..]) => res,
        };

        match res {
            Ok(0) => {
                // Same no-progress treatment as writes; a transport that
                // completes instantly must not starve the canceller.
                tokio::task::yield_now().await;
            }
            Ok(n) => filled += n,
            Err(e) if conn.is_timeout(&e) => {
                tracing::trace!(filled, total = buf.len(), "read timed out, retrying");
                tokio::task::yield_now().await;
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}
