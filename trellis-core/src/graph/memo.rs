//! Memo Implementation
//!
//! A memoized node keeps its result across resolution passes, independent of
//! any particular cache.
//!
//! # How Memos Work
//!
//! 1. While `NotMemoized`, the node declares its normal dependencies. When
//!    its compute is invoked it moves to `Pending` and stores the in-flight
//!    deferred as the memo.
//!
//! 2. While `Pending` or `Memoized`, the node reports no dependencies and
//!    its compute hands back the memo. Dependents therefore never re-trigger
//!    the memo's upstream, even from a fresh cache. A pass that skipped the
//!    dependencies only ever reads the memo; if the memo is gone by the time
//!    it gets there, the pass resolves the dependencies after all.
//!
//! 3. When the computation succeeds the memo settles for good. When it fails
//!    the state returns to `NotMemoized` before the failure propagates, so
//!    the next pass retries from scratch.
//!
//! 4. `invalidate` returns the node to `NotMemoized` and restores its
//!    dependencies.
//!
//! # Races
//!
//! Two passes that both normalize a `NotMemoized` node's dependencies before
//! either reaches its compute will both resolve its upstream. The transition
//! to `Pending` itself happens under one lock acquisition, so the wrapped
//! computation still runs once. A computation that finishes after an
//! invalidation does not overwrite the newer state.

use std::fmt;
use std::sync::Arc;

use futures_util::future::{self, BoxFuture, FutureExt};
use parking_lot::Mutex;
use tracing::{debug, warn};

use super::cache::Deferred;
use super::node::{Compute, NodeId, NodeValue};
use crate::error::{ResolveError, ResolveResult};

/// Persistent state of a memoized node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoState {
    /// No memo. The next pass runs the computation and its upstream.
    NotMemoized,

    /// A computation is in flight and is the memo.
    Pending,

    /// The memo holds a successful value.
    Memoized,
}

enum Slot<V> {
    Empty,
    Pending(Deferred<V>),
    Settled(V),
}

struct MemoSlot<V> {
    /// Bumped on every transition out of `Empty` and on invalidation, so a
    /// stale completion can tell it no longer owns the slot.
    generation: u64,
    slot: Slot<V>,
}

/// The state machine behind a memoized node.
pub(crate) struct MemoCell<V> {
    node: NodeId,
    compute: Compute<V>,
    state: Arc<Mutex<MemoSlot<V>>>,
}

impl<V: NodeValue> MemoCell<V> {
    pub(crate) fn new(node: NodeId, compute: Compute<V>) -> Self {
        Self {
            node,
            compute,
            state: Arc::new(Mutex::new(MemoSlot {
                generation: 0,
                slot: Slot::Empty,
            })),
        }
    }

    pub(crate) fn state(&self) -> MemoState {
        match self.state.lock().slot {
            Slot::Empty => MemoState::NotMemoized,
            Slot::Pending(_) => MemoState::Pending,
            Slot::Settled(_) => MemoState::Memoized,
        }
    }

    /// Whether a memo (pending or settled) exists.
    pub(crate) fn holds_memo(&self) -> bool {
        !matches!(self.state.lock().slot, Slot::Empty)
    }

    /// The memo, if one is held right now.
    pub(crate) fn held(&self) -> Option<BoxFuture<'static, ResolveResult<V>>> {
        Self::memo_of(&self.state.lock().slot)
    }

    fn memo_of(slot: &Slot<V>) -> Option<BoxFuture<'static, ResolveResult<V>>> {
        match slot {
            Slot::Empty => None,
            Slot::Settled(value) => Some(future::ready(Ok(value.clone())).boxed()),
            Slot::Pending(memo) => Some(memo.clone().boxed()),
        }
    }

    /// Hand back the memo, or start the computation with `args`.
    ///
    /// `args` must be the values of the node's declared dependencies. A pass
    /// that skipped them because a memo was held goes through [`held`]
    /// instead.
    ///
    /// [`held`]: Self::held
    pub(crate) fn invoke(&self, args: Vec<V>) -> BoxFuture<'static, ResolveResult<V>> {
        let node = self.node;
        let mut state = self.state.lock();
        if let Some(memo) = Self::memo_of(&state.slot) {
            return memo;
        }

        state.generation += 1;
        let generation = state.generation;
        let compute = self.compute.clone();
        let cell = Arc::clone(&self.state);
        let memo = async move {
            let outcome = compute.invoke(args).await.map_err(ResolveError::from_compute);
            settle(&cell, node, generation, &outcome);
            outcome
        }
        .boxed()
        .shared();

        debug!(%node, generation, "memo pending");
        state.slot = Slot::Pending(memo.clone());
        memo.boxed()
    }

    pub(crate) fn invalidate(&self) {
        let mut state = self.state.lock();
        state.generation += 1;
        state.slot = Slot::Empty;
        debug!(node = %self.node, generation = state.generation, "memo invalidated");
    }
}

fn settle<V: NodeValue>(
    cell: &Mutex<MemoSlot<V>>,
    node: NodeId,
    generation: u64,
    outcome: &ResolveResult<V>,
) {
    let mut state = cell.lock();
    if state.generation != generation {
        debug!(%node, generation, current = state.generation, "discarding stale memo result");
        return;
    }
    match outcome {
        Ok(value) => {
            state.slot = Slot::Settled(value.clone());
            debug!(%node, generation, "memo settled");
        }
        Err(err) => {
            state.slot = Slot::Empty;
            warn!(%node, generation, error = %err, "memoized computation failed, resetting");
        }
    }
}

impl<V> Clone for MemoCell<V> {
    fn clone(&self) -> Self {
        Self {
            node: self.node,
            compute: self.compute.clone(),
            state: Arc::clone(&self.state),
        }
    }
}

impl<V: NodeValue> fmt::Debug for MemoCell<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoCell")
            .field("node", &self.node)
            .field("state", &self.state())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
