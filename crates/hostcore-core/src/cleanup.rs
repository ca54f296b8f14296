//! Cleanup hook registry.
//!
//! Components that own a native resource register a finalizer here. At
//! teardown the hooks run most-recently-registered first, and the walk is
//! repeated until the registry is empty, because a finalizer may register
//! cleanup for a dependent resource.
//!
//! Registration hands back a [`CleanupHookToken`] (the insertion sequence).
//! The [`HookKey`] passed at registration is the uniqueness key: the same
//! key registered twice means the same resource was registered twice.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use tracing::{debug, trace};

use crate::error::{HostError, HostResult};

/// Identity of a resource tracked by the host.
pub type ResourceId = u64;

/// Uniqueness key of a cleanup hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HookKey {
    /// What the finalizer does, e.g. `"close-timer"`.
    pub name: &'static str,
    /// The resource it cleans up.
    pub resource: ResourceId,
}

impl HookKey {
    pub fn new(name: &'static str, resource: ResourceId) -> Self {
        Self { name, resource }
    }
}

impl fmt::Display for HookKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.name, self.resource)
    }
}

/// Stable handle to a registered hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CleanupHookToken(u64);

impl CleanupHookToken {
    /// Insertion sequence; larger means registered later.
    pub fn sequence(&self) -> u64 {
        self.0
    }
}

/// Finalizer run with the owning context.
pub type CleanupFn<C> = Box<dyn FnOnce(&mut C)>;

struct CleanupHookCallback<C> {
    key: HookKey,
    finalizer: CleanupFn<C>,
}

/// Ordered set of cleanup hooks for a context of type `C`.
pub struct CleanupHookRegistry<C> {
    hooks: BTreeMap<u64, CleanupHookCallback<C>>,
    index: HashMap<HookKey, u64>,
    next_sequence: u64,
}

impl<C> Default for CleanupHookRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> CleanupHookRegistry<C> {
    pub fn new() -> Self {
        Self {
            hooks: BTreeMap::new(),
            index: HashMap::new(),
            next_sequence: 0,
        }
    }

    /// Register `finalizer` for `key`.
    ///
    /// Registering a key that is already present is a contract violation.
    pub fn add(
        &mut self,
        key: HookKey,
        finalizer: impl FnOnce(&mut C) + 'static,
    ) -> HostResult<CleanupHookToken> {
        if self.index.contains_key(&key) {
            return Err(HostError::DuplicateCleanupHook {
                name: key.name,
                resource: key.resource,
            });
        }

        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.index.insert(key, sequence);
        self.hooks.insert(
            sequence,
            CleanupHookCallback {
                key,
                finalizer: Box::new(finalizer),
            },
        );

        trace!(hook = %key, sequence, "cleanup hook added");
        Ok(CleanupHookToken(sequence))
    }

    /// Remove a hook without running it. Unknown tokens are ignored.
    pub fn remove(&mut self, token: CleanupHookToken) -> bool {
        self.take(token).is_some()
    }

    /// Remove the hook registered under `key`. Unknown keys are ignored.
    pub fn remove_key(&mut self, key: &HookKey) -> bool {
        match self.index.get(key).copied() {
            Some(sequence) => self.remove(CleanupHookToken(sequence)),
            None => false,
        }
    }

    /// Remove a hook and hand back its finalizer.
    pub fn take(&mut self, token: CleanupHookToken) -> Option<(HookKey, CleanupFn<C>)> {
        let callback = self.hooks.remove(&token.0)?;
        self.index.remove(&callback.key);
        trace!(hook = %callback.key, sequence = token.0, "cleanup hook removed");
        Some((callback.key, callback.finalizer))
    }

    pub fn contains(&self, token: CleanupHookToken) -> bool {
        self.hooks.contains_key(&token.0)
    }

    pub fn contains_key(&self, key: &HookKey) -> bool {
        self.index.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Tokens of every hook, most recently registered first.
    pub fn tokens_descending(&self) -> Vec<CleanupHookToken> {
        self.hooks.keys().rev().map(|&s| CleanupHookToken(s)).collect()
    }

    /// Visit every tracked resource in registration order without changing
    /// the registry.
    pub fn for_each_owned_resource(&self, mut visitor: impl FnMut(CleanupHookToken, &HookKey)) {
        for (sequence, callback) in &self.hooks {
            visitor(CleanupHookToken(*sequence), &callback.key);
        }
    }
}

impl<C> fmt::Debug for CleanupHookRegistry<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CleanupHookRegistry")
            .field("len", &self.hooks.len())
            .field("next_sequence", &self.next_sequence)
            .finish()
    }
}

/// A context that owns a [`CleanupHookRegistry`] over itself.
pub trait HasCleanupHooks: Sized {
    fn cleanup_hooks(&mut self) -> &mut CleanupHookRegistry<Self>;
}

/// Run every hook of `ctx` until the registry stays empty.
///
/// Each pass snapshots the tokens in descending order and runs those still
/// registered; a hook removed by an earlier finalizer in the same pass is
/// skipped. `after_pass` runs after every pass (handle cleanup at teardown).
/// Returns the number of finalizers invoked.
pub fn run_cleanup_hooks<C, E>(
    ctx: &mut C,
    mut after_pass: impl FnMut(&mut C) -> Result<(), E>,
) -> Result<usize, E>
where
    C: HasCleanupHooks,
{
    let mut invoked = 0;
    let mut pass = 0;

    while !ctx.cleanup_hooks().is_empty() {
        pass += 1;
        let tokens = ctx.cleanup_hooks().tokens_descending();
        debug!(pass, hooks = tokens.len(), "running cleanup hooks");

        for token in tokens {
            let Some((key, finalizer)) = ctx.cleanup_hooks().take(token) else {
                continue;
            };
            trace!(hook = %key, "invoking cleanup hook");
            finalizer(&mut *ctx);
            invoked += 1;
        }

        after_pass(ctx)?;
    }

    Ok(invoked)
}

#[cfg(test)]
#[path = "cleanup_tests.rs"]
mod tests;
