//! Plugin action contract and registry.
//!
//! A transition's behavior is a list of named actions looked up in a
//! process-wide immutable registry. Actions see the session only through
//! the [`Host`] capability handle, so test doubles substitute without
//! inheritance, and the driver never knows a plugin's internals.

pub mod io;
pub mod timing;

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::OnceLock;

use tokio_util::sync::CancellationToken;

use crate::conn::Connection;
use crate::error::{Error, Result};
use crate::format::Party;
use crate::stream::StreamSet;
use crate::value::{ArgKind, Value};

/// Boxed future returned by action handlers.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Action handler signature: `(cancellation context, FSM handle, args)`.
pub type Handler =
    for<'a> fn(&'a CancellationToken, &'a dyn Host, &'a [Value]) -> BoxFuture<'a, Result<()>>;

/// Capability view of the running FSM that actions operate on.
pub trait Host: Send + Sync {
    /// Party the session runs as; some actions are one-sided.
    fn party(&self) -> Party;

    /// The session's connection.
    fn conn(&self) -> &dyn Connection;

    /// The session's logical streams.
    fn streams(&self) -> &StreamSet;
}

/// Descriptor of one registered action: name, minimum arity, expected
/// parameter kinds for the leading positions, and the handler.
pub struct ActionSpec {
    /// Registry lookup name, e.g. `io.puts`.
    pub name: &'static str,
    /// Fewest arguments the action accepts.
    pub min_args: usize,
    /// Expected kinds for the leading argument positions; trailing variadic
    /// arguments are validated by the action itself.
    pub params: &'static [ArgKind],
    /// The handler invoked once validation passes.
    pub handler: Handler,
}

impl ActionSpec {
    /// Validate arity and leading argument types before any I/O.
    fn check_args(&self, args: &[Value]) -> Result<()> {
        if args.len() < self.min_args {
            return Err(Error::NotEnoughArguments);
        }
        for (kind, arg) in self.params.iter().zip(args) {
            if arg.kind() != *kind {
                return Err(Error::InvalidArgumentType);
            }
        }
        Ok(())
    }
}

/// Immutable name → action lookup table.
///
/// Built once at startup; no runtime mutation once sessions begin.
pub struct Registry {
    actions: HashMap<&'static str, ActionSpec>,
}

impl Registry {
    /// Registry containing the built-in action set.
    pub fn builtin() -> Self {
        let mut registry = Registry {
            actions: HashMap::new(),
        };
        registry.register(io::puts_spec());
        registry.register(io::gets_spec());
        registry.register(timing::sleep_spec());
        registry
    }

    /// Register an action descriptor.
    ///
    /// # Panics
    ///
    /// Panics if the name is already taken; duplicate registrations are a
    /// programming error caught at startup.
    pub fn register(&mut self, spec: ActionSpec) {
        let name = spec.name;
        if self.actions.insert(name, spec).is_some() {
            panic!("action already registered: {name}");
        }
    }

    /// Look up an action by name.
    pub fn get(&self, name: &str) -> Option<&ActionSpec> {
        self.actions.get(name)
    }

    /// True if `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.actions.contains_key(name)
    }

    /// Registered action names, sorted.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.actions.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Validate and invoke the named action.
    ///
    /// An unknown name is a configuration error; arity and type failures
    /// are raised here, before the handler can touch the connection.
    pub async fn invoke(
        &self,
        name: &str,
        ctx: &CancellationToken,
        host: &dyn Host,
        args: &[Value],
    ) -> Result<()> {
        let spec = self
            .get(name)
            .ok_or_else(|| Error::UnknownAction(name.to_string()))?;
        spec.check_args(args)?;
        (spec.handler)(ctx, host, args).await
    }
}

/// Process-wide registry of built-in actions.
pub fn registry() -> &'static Registry {
    static REGISTRY: OnceLock<Registry> = OnceLock::new();
    REGISTRY.get_or_init(Registry::builtin)
}


#[cfg(test)]
mod tests {
    use tokio_util::sync::CancellationToken;

    use super::testing::TestHost;
    use super::*;
    use crate::conn::testing::ScriptedConn;

    #[test]
    fn test_builtin_catalog() {
        let registry = registry();
        assert_eq!(registry.names(), vec!["io.gets", "io.puts", "timing.sleep"]);
        assert!(registry.contains("io.puts"));
        assert!(!registry.contains("io.nope"));
    }

    #[tokio::test]
    async fn test_invoke_unknown_action() {
        let host = TestHost::new(ScriptedConn::accepting());
        let ctx = CancellationToken::new();

        let err = registry()
            .invoke("io.nope", &ctx, &host, &[])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnknownAction(name) if name == "io.nope"));
        assert_eq!(host.conn.io_calls(), 0);
    }

    #[tokio::test]
    async fn test_invoke_checks_arity_before_io() {
        let host = TestHost::new(ScriptedConn::accepting());
        let ctx = CancellationToken::new();

        let err = registry()
            .invoke("io.puts", &ctx, &host, &[])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotEnoughArguments));
        assert_eq!(host.conn.io_calls(), 0);
    }

    #[tokio::test]
    async fn test_invoke_checks_types_before_io() {
        let host = TestHost::new(ScriptedConn::accepting());
        let ctx = CancellationToken::new();

        let err = registry()
            .invoke("io.puts", &ctx, &host, &[Value::from(123i64)])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgumentType));
        assert_eq!(host.conn.io_calls(), 0);
    }

    #[tokio::test]
    async fn test_invoke_dispatches() {
        let host = TestHost::new(ScriptedConn::accepting());
        let ctx = CancellationToken::new();

        registry()
            .invoke("io.puts", &ctx, &host, &[Value::from("ping")])
            .await
            .unwrap();
        assert_eq!(host.conn.written(), b"ping");
    }

    #[test]
    #[should_panic(expected = "action already registered")]
    fn test_duplicate_registration_panics() {
        let mut registry = Registry::builtin();
        registry.register(io::puts_spec());
    }
}
