//! Compiled format tables.
//!
//! A format is the transition table of a protocol-shaping state machine:
//! opaque state labels, party-scoped transitions, and per-transition action
//! call lists. Tables are produced by an external compiler and consumed
//! here as immutable data; the engine never parses format text.

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::stream::StreamId;
use crate::value::Value;

/// Role a session runs as, fixed for the session's lifetime.
///
/// The party gates which transitions and actions are eligible; the client
/// and server halves of a format describe the two sides of the same wire
/// conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Party {
    /// Initiating side.
    Client,
    /// Listening side.
    Server,
}

impl fmt::Display for Party {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Party::Client => write!(f, "client"),
            Party::Server => write!(f, "server"),
        }
    }
}

/// One action invocation bound to a transition: a registry name plus
/// literal arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionCall {
    /// Registered action name, e.g. `io.puts`.
    pub name: String,
    /// Literal arguments passed at invocation.
    #[serde(default)]
    pub args: Vec<Value>,
}

/// Deterministic selection condition on a transition.
///
/// Guards are evaluated against recent stream content so two
/// independently-clocked parties that saw the same bytes agree on which
/// transition fired.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Guard {
    /// Fires when the recent unconsumed bytes of `stream` contain `pattern`.
    Match {
        /// Stream whose receive window is inspected.
        stream: StreamId,
        /// Byte pattern searched for in the window.
        pattern: String,
    },
}

/// An edge of the state machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transition {
    /// Party allowed to take this transition.
    pub party: Party,
    /// Destination state label.
    pub target: String,
    /// Optional deterministic guard; guarded transitions win over weighted
    /// fallback when their guard matches.
    #[serde(default)]
    pub guard: Option<Guard>,
    /// Relative weight for probabilistic selection among candidates.
    #[serde(default = "default_weight")]
    pub weight: f64,
    /// Actions executed in declared order when the transition fires.
    #[serde(default)]
    pub actions: Vec<ActionCall>,
}

fn default_weight() -> f64 {
    1.0
}

impl Transition {
    /// New unguarded transition with weight 1 and no actions.
    pub fn new(party: Party, target: impl Into<String>) -> Self {
        Self {
            party,
            target: target.into(),
            guard: None,
            weight: default_weight(),
            actions: Vec::new(),
        }
    }

    /// Append an action call.
    pub fn with_action(mut self, name: impl Into<String>, args: Vec<Value>) -> Self {
        self.actions.push(ActionCall {
            name: name.into(),
            args,
        });
        self
    }

    /// Set the selection guard.
    pub fn with_guard(mut self, guard: Guard) -> Self {
        self.guard = Some(guard);
        self
    }

    /// Set the selection weight.
    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }
}

/// A complete compiled format: the transition table one session executes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Format {
    /// Human-readable format name (e.g. the protocol being mimicked).
    pub name: String,
    /// Declared start state.
    pub start: String,
    /// Explicitly declared terminal states.
    #[serde(default)]
    pub terminals: HashSet<String>,
    /// Outgoing transitions keyed by source state.
    #[serde(default)]
    pub transitions: HashMap<String, Vec<Transition>>,
}

impl Format {
    /// New empty format starting at `start`.
    pub fn new(name: impl Into<String>, start: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            start: start.into(),
            terminals: HashSet::new(),
            transitions: HashMap::new(),
        }
    }

    /// Declare `state` terminal.
    pub fn with_terminal(mut self, state: impl Into<String>) -> Self {
        self.terminals.insert(state.into());
        self
    }

    /// Add an outgoing transition from `source`.
    pub fn with_transition(mut self, source: impl Into<String>, transition: Transition) -> Self {
        self.transitions
            .entry(source.into())
            .or_default()
            .push(transition);
        self
    }

    /// Outgoing transitions of `state` eligible for `party`, in declared
    /// order.
    pub fn outgoing(&self, state: &str, party: Party) -> Vec<&Transition> {
        self.transitions
            .get(state)
            .map(|ts| ts.iter().filter(|t| t.party == party).collect())
            .unwrap_or_default()
    }

    /// True if `state` was declared terminal.
    pub fn is_terminal(&self, state: &str) -> bool {
        self.terminals.contains(state)
    }

    /// Eagerly check table shape: the start state must exist, every
    /// transition target must be a known state or terminal, and weights
    /// must be positive.
    ///
    /// Unreachable states are not an error here; a dead end only surfaces
    /// if a session actually reaches it.
    pub fn validate(&self) -> Result<()> {
        if !self.transitions.contains_key(&self.start) && !self.is_terminal(&self.start) {
            return Err(Error::config(format!(
                "format {:?}: start state {:?} has no transitions and is not terminal",
                self.name, self.start
            )));
        }

        for (source, transitions) in &self.transitions {
            for t in transitions {
                if !self.transitions.contains_key(&t.target) && !self.is_terminal(&t.target) {
                    return Err(Error::config(format!(
                        "format {:?}: transition {source:?} -> {:?} targets an unknown state",
                        self.name, t.target
                    )));
                }
                if !(t.weight > 0.0) {
                    return Err(Error::config(format!(
                        "format {:?}: transition {source:?} -> {:?} has non-positive weight {}",
                        self.name, t.target, t.weight
                    )));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_party_format() -> Format {
        Format::new("http-ish", "start")
            .with_terminal("done")
            .with_transition(
                "start",
                Transition::new(Party::Client, "sent")
                    .with_action("io.puts", vec![Value::from("GET /")]),
            )
            .with_transition("start", Transition::new(Party::Server, "sent"))
            .with_transition("sent", Transition::new(Party::Client, "done"))
            .with_transition("sent", Transition::new(Party::Server, "done"))
    }

    #[test]
    fn test_outgoing_is_party_scoped() {
        let format = two_party_format();

        let client = format.outgoing("start", Party::Client);
        assert_eq!(client.len(), 1);
        assert_eq!(client[0].actions[0].name, "io.puts");

        let server = format.outgoing("start", Party::Server);
        assert_eq!(server.len(), 1);
        assert!(server[0].actions.is_empty());

        assert!(format.outgoing("done", Party::Client).is_empty());
        assert!(format.outgoing("missing", Party::Client).is_empty());
    }

    #[test]
    fn test_terminals() {
        let format = two_party_format();
        assert!(format.is_terminal("done"));
        assert!(!format.is_terminal("start"));
    }

    #[test]
    fn test_validate_ok() {
        two_party_format().validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_dangling_target() {
        let format = Format::new("bad", "start")
            .with_transition("start", Transition::new(Party::Client, "nowhere"));

        let err = format.validate().unwrap_err();
        assert!(err.is_config());
        assert!(err.to_string().contains("unknown state"));
    }

    #[test]
    fn test_validate_rejects_bad_weight() {
        let format = Format::new("bad", "start")
            .with_terminal("done")
            .with_transition(
                "start",
                Transition::new(Party::Client, "done").with_weight(0.0),
            );

        let err = format.validate().unwrap_err();
        assert!(err.to_string().contains("non-positive weight"));
    }

    #[test]
    fn test_validate_rejects_missing_start() {
        let format = Format::new("bad", "ghost");
        let err = format.validate().unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_declared_order_preserved() {
        let format = Format::new("ordered", "s")
            .with_terminal("t")
            .with_transition("s", Transition::new(Party::Client, "t").with_weight(2.0))
            .with_transition(
                "s",
                Transition::new(Party::Client, "t").with_guard(Guard::Match {
                    stream: 1,
                    pattern: "ok".into(),
                }),
            );

        let out = format.outgoing("s", Party::Client);
        assert_eq!(out.len(), 2);
        assert!(out[0].guard.is_none());
        assert!(out[1].guard.is_some());
    }
}
