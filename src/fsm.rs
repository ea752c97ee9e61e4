//! The FSM driver: executes one session of a compiled format.
//!
//! A session gets a format table, a connection, a stream set and a party,
//! then repeatedly selects and fires the next eligible transition until a
//! terminal state is reached or a permanent error aborts the run. Exactly
//! one transition, one action, executes at a time: shaping correctness
//! depends on exact byte order and timing on the wire.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio_util::sync::CancellationToken;

use crate::conn::Connection;
use crate::error::{Error, Result};
use crate::format::{Format, Guard, Party, Transition};
use crate::plugin::{self, Host};
use crate::stream::StreamSet;
use crate::{DEFAULT_SEED, GUARD_WINDOW};

/// One protocol-shaping session.
///
/// Created once per session; the connection and stream set are
/// session-scoped and torn down with it. Multiple independent sessions may
/// run concurrently, each on its own task, with zero shared state.
pub struct Fsm {
    format: Arc<Format>,
    party: Party,
    conn: Arc<dyn Connection>,
    streams: Arc<StreamSet>,
    cancel: CancellationToken,
    state: String,
    rng: StdRng,
}

impl Fsm {
    /// Build a session at the format's declared start state.
    ///
    /// The transition RNG starts from [`DEFAULT_SEED`] so a fresh session
    /// is reproducible; call [`Fsm::reseed`] once both parties have agreed
    /// on a shared seed.
    pub fn new(
        format: Arc<Format>,
        party: Party,
        conn: Arc<dyn Connection>,
        streams: Arc<StreamSet>,
        cancel: CancellationToken,
    ) -> Self {
        let state = format.start.clone();
        Self {
            format,
            party,
            conn,
            streams,
            cancel,
            state,
            rng: StdRng::seed_from_u64(DEFAULT_SEED),
        }
    }

    /// Rekey the transition RNG.
    ///
    /// Both parties must sample weighted choices from the same seed to
    /// agree on which transition fired; deriving that seed is handshake
    /// policy and lives outside the engine.
    pub fn reseed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    /// Current state label.
    pub fn state(&self) -> &str {
        &self.state
    }

    /// Drive the session to completion.
    ///
    /// Returns `Ok(())` once a terminal state with no outgoing transitions
    /// is reached. A non-terminal dead end is a configuration error raised
    /// without performing any I/O for that step. The first action error not
    /// absorbed inside the action aborts the transition and the run; I/O
    /// already on the wire stays committed.
    pub async fn run(&mut self) -> Result<()> {
        let format = Arc::clone(&self.format);

        loop {
            if self.cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let outgoing = format.outgoing(&self.state, self.party);
            if outgoing.is_empty() {
                if format.is_terminal(&self.state) {
                    tracing::debug!(
                        format = %format.name,
                        state = %self.state,
                        "session reached terminal state"
                    );
                    self.drain_streams();
                    return Ok(());
                }
                return Err(Error::NoTransition {
                    state: self.state.clone(),
                    party: self.party,
                });
            }

            let transition = self.select(&outgoing)?;

            for call in &transition.actions {
                if let Err(e) = plugin::registry()
                    .invoke(&call.name, &self.cancel, &*self, &call.args)
                    .await
                {
                    tracing::error!(
                        format = %format.name,
                        state = %self.state,
                        target = %transition.target,
                        action = %call.name,
                        error = %e,
                        "action failed, aborting session"
                    );
                    return Err(e);
                }
            }

            tracing::debug!(
                format = %format.name,
                from = %self.state,
                to = %transition.target,
                party = %self.party,
                "transition fired"
            );
            self.state = transition.target.clone();
        }
    }

    /// Select exactly one transition from the party's outgoing edges.
    ///
    /// Guard-matching transitions form the candidate set; with none
    /// matching, the unguarded transitions do. A single candidate is taken
    /// directly, several fall to a weighted draw from the seeded RNG.
    fn select<'a>(&mut self, outgoing: &[&'a Transition]) -> Result<&'a Transition> {
        let matched: Vec<&'a Transition> = outgoing
            .iter()
            .copied()
            .filter(|t| t.guard.as_ref().is_some_and(|g| self.guard_matches(g)))
            .collect();

        let pool: Vec<&'a Transition> = if matched.is_empty() {
            outgoing
                .iter()
                .copied()
                .filter(|t| t.guard.is_none())
                .collect()
        } else {
            matched
        };

        match pool.len() {
            0 => Err(Error::NoTransition {
                state: self.state.clone(),
                party: self.party,
            }),
            1 => Ok(pool[0]),
            _ => self.weighted_pick(&pool),
        }
    }

    fn guard_matches(&self, guard: &Guard) -> bool {
        match guard {
            Guard::Match { stream, pattern } => {
                let recent = self.streams.get(*stream).peek(GUARD_WINDOW);
                contains(&recent, pattern.as_bytes())
            }
        }
    }

    /// Cumulative sampling over the candidates' weights.
    fn weighted_pick<'a>(&mut self, pool: &[&'a Transition]) -> Result<&'a Transition> {
        let total: f64 = pool.iter().map(|t| t.weight).sum();
        if !(total > 0.0) {
            return Err(Error::config(format!(
                "non-positive transition weights out of state {:?}",
                self.state
            )));
        }

        let target = self.rng.gen_range(0.0..total);
        let mut cumulative = 0.0;
        for t in pool {
            cumulative += t.weight;
            if cumulative > target {
                return Ok(t);
            }
        }

        // Floating-point rounding fallback.
        Ok(pool[pool.len() - 1])
    }

    /// Drop leftover buffered bytes at teardown, logging what never made
    /// it onto the wire.
    fn drain_streams(&self) {
        self.streams.for_each(|s| {
            let leftover = s.drain(usize::MAX);
            if !leftover.is_empty() {
                tracing::warn!(
                    stream = s.id(),
                    bytes = leftover.len(),
                    "unsent stream bytes at teardown"
                );
            }
        });
    }
}

impl Host for Fsm {
    fn party(&self) -> Party {
        self.party
    }

    fn conn(&self) -> &dyn Connection {
        self.conn.as_ref()
    }

    fn streams(&self) -> &StreamSet {
        self.streams.as_ref()
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    if needle.is_empty() {
        return true;
    }
    haystack.windows(needle.len()).any(|w| w == needle)
}
