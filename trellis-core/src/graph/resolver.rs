//! Resolver
//!
//! The resolver walks the graph from a target node, resolving dependencies
//! before invoking each node's compute function, and deduplicates through
//! the pass's cache.
//!
//! # Algorithm
//!
//! For each requested node `n`:
//!
//! 1. If the cache holds a deferred under `n`'s identity, return it.
//! 2. Plan `n`: normalize its dependency spec against the cache, or note
//!    that it holds a memo and needs nothing.
//! 3. Request every dependency, all before awaiting any.
//! 4. Build a deferred that awaits the dependency values in declared order
//!    and then invokes `n`'s compute with them.
//! 5. Store that deferred under `n`'s identity before anything is awaited,
//!    and return the canonical entry.
//!
//! The walk runs on an explicit stack: a node is entered, its dependencies
//! are entered, and it is finished (steps 4 and 5) once all of them are in
//! the cache. Graph depth costs heap, not call stack.
//!
//! Step 5 runs synchronously after the check in step 1, so any later request
//! for the same identity within the pass sees the in-flight deferred instead
//! of triggering a second invocation. Inside a tokio runtime each stored
//! deferred is driven by its own task and the cache shares that task's
//! result, so awaiting a node never polls through its whole upstream.
//! Compute functions run on later scheduler turns, in an order that respects
//! the dependency partial order only.
//!
//! A node reached again while its own dependencies are still being entered
//! closes a cycle. The pass fails with `InvalidDependencySpec`.

use std::collections::{HashMap, HashSet};

use futures_util::future::{try_join_all, BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use super::cache::{self, Cache, Deferred};
use super::dep::{self, Dep, DepList};
use super::node::{Identity, Node, NodeValue, Plan};
use crate::error::{ResolveError, ResolveResult};

/// Resolver configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolveConfig {
    /// Pass through one scheduler turn before every compute, including
    /// computes whose value is immediately available.
    pub yield_before_compute: bool,
}

impl Default for ResolveConfig {
    fn default() -> Self {
        Self {
            yield_before_compute: true,
        }
    }
}

/// Resolves nodes over a cache.
#[derive(Debug, Clone, Default)]
pub struct Resolver {
    config: ResolveConfig,
}

enum Visit<V> {
    /// Plan the node and enter its dependencies.
    Enter(Node<V>),
    /// Every dependency is resolved; store the node's deferred.
    Finish(Node<V>, Plan<V>),
}

impl Resolver {
    /// Create a resolver with the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a resolver with the given configuration.
    pub fn with_config(config: ResolveConfig) -> Self {
        Self { config }
    }

    /// Enable/disable the scheduler turn before each compute.
    pub fn with_yield_before_compute(mut self, enabled: bool) -> Self {
        self.config.yield_before_compute = enabled;
        self
    }

    /// Get the configuration.
    pub fn config(&self) -> &ResolveConfig {
        &self.config
    }

    /// Resolve a single node (or handle) over `cache`.
    ///
    /// # Errors
    ///
    /// Fails with the first error raised anywhere in the target's upstream.
    pub async fn run<V, T>(&self, target: &T, cache: &Cache<V>) -> ResolveResult<V>
    where
        V: NodeValue,
        T: AsRef<Node<V>> + ?Sized,
    {
        self.request(target.as_ref(), cache).await
    }

    /// Resolve a list of targets over one shared cache.
    ///
    /// The list is treated as the dependency list of an aggregate root:
    /// it is normalized like any other list, shared upstream is resolved
    /// once, and values come back in list order.
    ///
    /// # Errors
    ///
    /// Fails if the list does not normalize or any target fails.
    pub async fn run_many<V, I>(&self, targets: I, cache: &Cache<V>) -> ResolveResult<Vec<V>>
    where
        V: NodeValue,
        I: IntoIterator,
        I::Item: Into<Dep<V>>,
    {
        let list = DepList::Sequence(targets.into_iter().map(Into::into).collect());
        let roots = dep::normalize_list(&list)?;
        let pending: Vec<Deferred<V>> = roots.iter().map(|root| self.request(root, cache)).collect();
        try_join_all(pending).await
    }

    /// Get (or create) the deferred result of `root` in this pass, along
    /// with the deferreds of everything upstream of it.
    pub(crate) fn request<V: NodeValue>(&self, root: &Node<V>, cache: &Cache<V>) -> Deferred<V> {
        if let Some(existing) = cache.get(root.identity()) {
            trace!(identity = %root.identity(), "cache hit");
            return existing;
        }

        // Failures kept out of the cache: bad specs and cycles.
        let mut failed: HashMap<Identity, Deferred<V>> = HashMap::new();
        let mut entered: HashSet<Identity> = HashSet::new();
        let mut stack = vec![Visit::Enter(root.clone())];

        while let Some(visit) = stack.pop() {
            match visit {
                Visit::Enter(node) => {
                    let identity = node.identity().clone();
                    if cache.contains(&identity) || failed.contains_key(&identity) {
                        continue;
                    }
                    if entered.contains(&identity) {
                        warn!(%identity, "dependency cycle");
                        let err = ResolveError::InvalidDependencySpec {
                            reason: format!("dependency cycle through {identity}"),
                        };
                        failed.insert(identity, cache::settled(Err(err)));
                        continue;
                    }
                    match node.plan(cache) {
                        Ok(plan) => {
                            let upstream: Vec<Node<V>> = match &plan {
                                Plan::Resolve(deps) => deps.iter().rev().cloned().collect(),
                                Plan::ReuseMemo => Vec::new(),
                            };
                            entered.insert(identity);
                            stack.push(Visit::Finish(node, plan));
                            stack.extend(upstream.into_iter().map(Visit::Enter));
                        }
                        Err(err) => {
                            failed.insert(identity, cache::settled(Err(err)));
                        }
                    }
                }
                Visit::Finish(node, plan) => {
                    let identity = node.identity().clone();
                    let body = match plan {
                        Plan::Resolve(deps) => {
                            let pending = deps
                                .iter()
                                .map(|dep| lookup(cache, &failed, dep.identity()))
                                .collect();
                            self.compute_after(node, pending)
                        }
                        Plan::ReuseMemo => self.reuse_memo(node, cache.clone()),
                    };
                    cache.get_or_insert_with(identity, || drive(body));
                }
            }
        }

        lookup(cache, &failed, root.identity())
    }

    /// Await `pending` in declared order, then invoke `node` with the values.
    fn compute_after<V: NodeValue>(
        &self,
        node: Node<V>,
        pending: Vec<Deferred<V>>,
    ) -> BoxFuture<'static, ResolveResult<V>> {
        let yield_turn = self.config.yield_before_compute;
        async move {
            let args = try_join_all(pending).await?;
            if yield_turn {
                tokio::task::yield_now().await;
            }
            debug!(node = %node.identity(), args = args.len(), "invoking compute");
            node.invoke(args).await
        }
        .boxed()
    }

    /// Read the memo `node` held when it was planned.
    ///
    /// If the memo was dropped in the meantime (invalidated, or reset by a
    /// failing pass), the node's dependencies are resolved after all, so its
    /// compute still receives its declared arguments.
    fn reuse_memo<V: NodeValue>(
        &self,
        node: Node<V>,
        cache: Cache<V>,
    ) -> BoxFuture<'static, ResolveResult<V>> {
        let resolver = self.clone();
        async move {
            if resolver.config.yield_before_compute {
                tokio::task::yield_now().await;
            }
            if let Some(memo) = node.held_memo() {
                trace!(node = %node.identity(), "reusing memo");
                return memo.await;
            }

            debug!(node = %node.identity(), "memo dropped during the pass, resolving dependencies");
            let deps = node.declared_deps(&cache)?;
            let pending: Vec<Deferred<V>> =
                deps.iter().map(|dep| resolver.request(dep, &cache)).collect();
            let args = try_join_all(pending).await?;
            node.invoke(args).await
        }
        .boxed()
    }
}

/// The deferred stored for `identity` in this walk.
fn lookup<V: NodeValue>(
    cache: &Cache<V>,
    failed: &HashMap<Identity, Deferred<V>>,
    identity: &Identity,
) -> Deferred<V> {
    cache
        .get(identity)
        .or_else(|| failed.get(identity).cloned())
        .unwrap_or_else(|| {
            cache::settled(Err(ResolveError::InvalidDependencySpec {
                reason: format!("dependency {identity} was never resolved"),
            }))
        })
}

/// Run `body` as its own task when a tokio runtime is available, and share
/// the task's result.
fn drive<V: NodeValue>(body: BoxFuture<'static, ResolveResult<V>>) -> Deferred<V> {
    match tokio::runtime::Handle::try_current() {
        Ok(runtime) => {
            let task = runtime.spawn(body);
            async move {
                task.await
                    .unwrap_or_else(|err| Err(ResolveError::computation(err)))
            }
            .boxed()
            .shared()
        }
        Err(_) => body.shared(),
    }
}
