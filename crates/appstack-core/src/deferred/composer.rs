//! Composer - 値ノードのグラフと ready キュー
//!
//! # 学習ポイント
//! - 型消去（`Arc<dyn Any>`）と型付きハンドル（`Deferred<T>`）の二層構造
//! - 明示的な ready キューによる継続の実行（再帰しない）
//! - 失敗の推移的な伝播（継続は呼ばれない）
//!
//! # 実行モデル
//! - シングルスレッド、協調的。`&mut self` のみでロックは持たない
//! - 継続は全入力が resolved になった時点で ready キューに積まれ、FIFO で実行
//! - 登録時点で入力が揃っていれば、`combine` が返る前に実行される
//! - 各ノードは高々一度だけ決着する

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::Arc;

use tracing::{debug, trace};
use ulid::Generator;

use super::combine::{DeferredTuple, downcast};
use super::graph::DependencyGraph;
use crate::domain::{ComposeError, Failure, FormatError, Settlement, ValueId, ValueState};

/// Anything a deferred slot can hold.
pub trait Value: std::any::Any + Clone + Send + Sync {}

impl<T: std::any::Any + Clone + Send + Sync> Value for T {}

pub(crate) type Erased = Arc<dyn std::any::Any + Send + Sync>;

type Continuation = Box<dyn FnOnce(&[Erased]) -> Result<Erased, FormatError> + Send>;

/// Typed handle to a node owned by a [`Composer`].
///
/// Handles are cheap copies; the value itself lives in the composer.
pub struct Deferred<T> {
    id: ValueId,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Deferred<T> {
    pub(crate) fn new(id: ValueId) -> Self {
        Self {
            id,
            _marker: PhantomData,
        }
    }

    pub fn id(&self) -> ValueId {
        self.id
    }
}

impl<T> Clone for Deferred<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Deferred<T> {}

impl<T> PartialEq for Deferred<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for Deferred<T> {}

impl<T> Hash for Deferred<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl<T> fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Deferred({})", self.id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    /// Settled from outside (`resolve` / `fail`).
    External,
    /// Produced by a continuation.
    Derived,
}

struct Node {
    label: String,
    origin: Origin,
    inputs: Vec<ValueId>,
    settlement: Settlement<Erased>,
    continuation: Option<Continuation>,
}

enum Job {
    Run(ValueId),
    Fail(ValueId, Failure),
}

/// Owner of every deferred value in one deployment.
pub struct Composer {
    nodes: HashMap<ValueId, Node>,
    graph: DependencyGraph,
    ready: VecDeque<Job>,
    ids: Generator,
    invocations: usize,
}

impl Composer {
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            graph: DependencyGraph::new(),
            ready: VecDeque::new(),
            ids: Generator::new(),
            invocations: 0,
        }
    }

    /// A slot that something outside the composer will settle.
    pub fn pending<T: Value>(&mut self, label: impl Into<String>) -> Deferred<T> {
        let id = self.insert(label.into(), Origin::External, Vec::new(), Settlement::Pending, None);
        Deferred::new(id)
    }

    /// A slot that is already resolved.
    pub fn known<T: Value>(&mut self, label: impl Into<String>, value: T) -> Deferred<T> {
        let id = self.insert(
            label.into(),
            Origin::External,
            Vec::new(),
            Settlement::Resolved(Arc::new(value)),
            None,
        );
        Deferred::new(id)
    }

    /// Resolve an external slot and run every continuation it unblocks.
    pub fn resolve<T: Value>(&mut self, deferred: &Deferred<T>, value: T) -> Result<(), ComposeError> {
        self.check_external(deferred.id)?;
        self.settle(deferred.id, Ok(Arc::new(value)));
        self.drain();
        Ok(())
    }

    /// Fail an external slot; every dependent fails with the same failure.
    pub fn fail<T>(&mut self, deferred: &Deferred<T>, failure: Failure) -> Result<(), ComposeError> {
        self.check_external(deferred.id)?;
        self.settle(deferred.id, Err(failure));
        self.drain();
        Ok(())
    }

    pub fn apply<A, R, F>(&mut self, label: impl Into<String>, input: &Deferred<A>, f: F) -> Deferred<R>
    where
        A: Value,
        R: Value,
        F: FnOnce(A) -> R + Send + 'static,
    {
        self.combine(label, (*input,), move |(a,)| f(a))
    }

    pub fn try_apply<A, R, F>(&mut self, label: impl Into<String>, input: &Deferred<A>, f: F) -> Deferred<R>
    where
        A: Value,
        R: Value,
        F: FnOnce(A) -> Result<R, FormatError> + Send + 'static,
    {
        self.try_combine(label, (*input,), move |(a,)| f(a))
    }

    /// Run `f` once every input resolved.
    ///
    /// Never blocks: if some input is still pending the continuation is
    /// parked in the graph. If an input failed (now or later) the result
    /// fails with that same failure and `f` is dropped without being called.
    pub fn combine<I, R, F>(&mut self, label: impl Into<String>, inputs: I, f: F) -> Deferred<R>
    where
        I: DeferredTuple + 'static,
        R: Value,
        F: FnOnce(I::Values) -> R + Send + 'static,
    {
        self.try_combine(label, inputs, move |values| Ok(f(values)))
    }

    pub fn try_combine<I, R, F>(&mut self, label: impl Into<String>, inputs: I, f: F) -> Deferred<R>
    where
        I: DeferredTuple + 'static,
        R: Value,
        F: FnOnce(I::Values) -> Result<R, FormatError> + Send + 'static,
    {
        let continuation: Continuation = Box::new(move |values: &[Erased]| {
            let args = I::extract(values)
                .ok_or_else(|| FormatError::new("input holds an unexpected type"))?;
            let out = f(args)?;
            Ok(Arc::new(out) as Erased)
        });
        Deferred::new(self.register(label.into(), inputs.ids(), continuation))
    }

    /// Collect a homogeneous list of values, in input order.
    pub fn all<T: Value>(&mut self, label: impl Into<String>, inputs: &[Deferred<T>]) -> Deferred<Vec<T>> {
        let ids = inputs.iter().map(Deferred::id).collect();
        let continuation: Continuation = Box::new(|values: &[Erased]| {
            let collected = values
                .iter()
                .map(|v| {
                    downcast::<T>(v)
                        .cloned()
                        .ok_or_else(|| FormatError::new("input holds an unexpected type"))
                })
                .collect::<Result<Vec<T>, _>>()?;
            Ok(Arc::new(collected) as Erased)
        });
        Deferred::new(self.register(label.into(), ids, continuation))
    }

    pub fn settlement<T: Value>(&self, deferred: &Deferred<T>) -> Result<Settlement<&T>, ComposeError> {
        let node = self
            .nodes
            .get(&deferred.id)
            .ok_or(ComposeError::UnknownValue(deferred.id))?;
        Ok(match &node.settlement {
            Settlement::Pending => Settlement::Pending,
            Settlement::Failed(f) => Settlement::Failed(f.clone()),
            Settlement::Resolved(v) => Settlement::Resolved(
                downcast::<T>(v).ok_or_else(|| ComposeError::TypeMismatch(node.label.clone()))?,
            ),
        })
    }

    /// The resolved value, or the reason there is none.
    pub fn get<T: Value>(&self, deferred: &Deferred<T>) -> Result<&T, ComposeError> {
        match self.settlement(deferred)? {
            Settlement::Resolved(v) => Ok(v),
            Settlement::Failed(f) => Err(ComposeError::Upstream(f)),
            Settlement::Pending => Err(ComposeError::Unresolved(self.label(deferred.id).unwrap_or_default().to_string())),
        }
    }

    pub fn value<T: Value>(&self, deferred: &Deferred<T>) -> Option<&T> {
        self.settlement(deferred).ok()?.resolved()
    }

    pub fn state(&self, id: ValueId) -> Option<ValueState> {
        self.nodes.get(&id).map(|n| n.settlement.state())
    }

    pub fn is_settled(&self, id: ValueId) -> bool {
        self.state(id).is_some_and(|s| s != ValueState::Pending)
    }

    pub fn failure(&self, id: ValueId) -> Option<&Failure> {
        self.nodes.get(&id).and_then(|n| n.settlement.failure())
    }

    pub fn label(&self, id: ValueId) -> Option<&str> {
        self.nodes.get(&id).map(|n| n.label.as_str())
    }

    /// Nodes that are neither resolved nor failed.
    pub fn pending_count(&self) -> usize {
        self.nodes
            .values()
            .filter(|n| !n.settlement.is_settled())
            .count()
    }

    /// How many continuations have been invoked so far.
    pub fn invocations(&self) -> usize {
        self.invocations
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn next_id(&mut self) -> ValueId {
        match self.ids.generate() {
            Ok(ulid) => ValueId::from_ulid(ulid),
            // random part overflowed within one millisecond
            Err(_) => ValueId::generate(),
        }
    }

    fn insert(
        &mut self,
        label: String,
        origin: Origin,
        inputs: Vec<ValueId>,
        settlement: Settlement<Erased>,
        continuation: Option<Continuation>,
    ) -> ValueId {
        let id = self.next_id();
        trace!(value = %label, %id, "registered");
        self.nodes.insert(
            id,
            Node {
                label,
                origin,
                inputs,
                settlement,
                continuation,
            },
        );
        id
    }

    fn register(&mut self, label: String, inputs: Vec<ValueId>, continuation: Continuation) -> ValueId {
        let mut early_failure = None;
        let mut waiting = Vec::new();
        for input in &inputs {
            match self.nodes.get(input).map(|n| &n.settlement) {
                None => {
                    early_failure = Some(Failure::format(&label, format!("input {input} is not known to this composer")));
                    break;
                }
                Some(Settlement::Failed(f)) => {
                    early_failure = Some(f.clone());
                    break;
                }
                Some(Settlement::Pending) => waiting.push(*input),
                Some(Settlement::Resolved(_)) => {}
            }
        }

        if let Some(failure) = early_failure {
            debug!(value = %label, error = %failure, "input already failed");
            return self.insert(label, Origin::Derived, inputs, Settlement::Failed(failure), None);
        }

        let id = self.insert(label, Origin::Derived, inputs, Settlement::Pending, Some(continuation));
        for input in waiting {
            self.graph.add_dependency(id, input);
        }
        if !self.graph.has_dependencies(id) {
            self.ready.push_back(Job::Run(id));
            self.drain();
        }
        id
    }

    fn check_external(&self, id: ValueId) -> Result<(), ComposeError> {
        let node = self.nodes.get(&id).ok_or(ComposeError::UnknownValue(id))?;
        if node.origin != Origin::External {
            return Err(ComposeError::NotExternal(node.label.clone()));
        }
        if node.settlement.is_settled() {
            return Err(ComposeError::AlreadySettled(node.label.clone()));
        }
        Ok(())
    }

    fn drain(&mut self) {
        while let Some(job) = self.ready.pop_front() {
            match job {
                Job::Run(id) => self.run(id),
                Job::Fail(id, failure) => self.settle(id, Err(failure)),
            }
        }
    }

    fn run(&mut self, id: ValueId) {
        let Some(node) = self.nodes.get_mut(&id) else {
            return;
        };
        if node.settlement.is_settled() {
            return;
        }
        let Some(continuation) = node.continuation.take() else {
            return;
        };
        let label = node.label.clone();
        let inputs = node.inputs.clone();

        let mut values = Vec::with_capacity(inputs.len());
        for input in &inputs {
            let resolved = match self.nodes.get(input).map(|n| &n.settlement) {
                Some(Settlement::Resolved(v)) => Some(Arc::clone(v)),
                _ => None,
            };
            let Some(v) = resolved else {
                self.settle(id, Err(Failure::format(&label, "scheduled before its inputs resolved")));
                return;
            };
            values.push(v);
        }

        self.invocations += 1;
        let outcome = continuation(&values).map_err(|e| Failure::format(&label, e.message()));
        self.settle(id, outcome);
    }

    fn settle(&mut self, id: ValueId, outcome: Result<Erased, Failure>) {
        let Some(node) = self.nodes.get_mut(&id) else {
            return;
        };
        if node.settlement.is_settled() {
            return;
        }
        node.continuation = None;

        let failure = outcome.as_ref().err().cloned();
        match &failure {
            None => debug!(value = %node.label, "resolved"),
            Some(f) => debug!(value = %node.label, error = %f, "failed"),
        }
        node.settlement = match outcome {
            Ok(v) => Settlement::Resolved(v),
            Err(f) => Settlement::Failed(f),
        };

        for dependent in self.graph.dependents(id) {
            self.graph.remove_dependency(dependent, id);
            match &failure {
                None => {
                    if !self.graph.has_dependencies(dependent) {
                        self.ready.push_back(Job::Run(dependent));
                    }
                }
                Some(f) => {
                    self.graph.clear_dependencies(dependent);
                    self.ready.push_back(Job::Fail(dependent, f.clone()));
                }
            }
        }
    }
}

impl Default for Composer {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Composer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Composer")
            .field("nodes", &self.nodes.len())
            .field("pending", &self.pending_count())
            .field("invocations", &self.invocations)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> (Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let c = Arc::new(AtomicUsize::new(0));
        (c.clone(), c)
    }

    #[test]
    fn combine_runs_once_all_inputs_resolve() {
        let mut c = Composer::new();
        let host = c.pending::<String>("host");
        let port = c.pending::<u16>("port");
        let (calls, seen) = counter();

        let url = c.combine("url", (host, port), move |(h, p)| {
            seen.fetch_add(1, Ordering::SeqCst);
            format!("{h}:{p}")
        });

        assert_eq!(c.state(url.id()), Some(ValueState::Pending));
        c.resolve(&host, "example.net".to_string()).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(c.value(&url).is_none());

        c.resolve(&port, 443).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(c.value(&url).map(String::as_str), Some("example.net:443"));
    }

    #[test]
    fn combine_over_known_values_runs_before_returning() {
        let mut c = Composer::new();
        let a = c.known("a", 2u32);
        let b = c.known("b", 3u32);

        let sum = c.combine("sum", (a, b), |(a, b)| a + b);

        assert_eq!(c.get(&sum).unwrap(), &5);
        assert_eq!(c.invocations(), 1);
    }

    #[test]
    fn failed_input_fails_result_without_calling_function() {
        let mut c = Composer::new();
        let server = c.pending::<String>("server");
        let database = c.pending::<String>("database");
        let (calls, seen) = counter();

        let cs = c.combine("connection", (server, database), move |(s, d)| {
            seen.fetch_add(1, Ordering::SeqCst);
            format!("{s}/{d}")
        });

        c.fail(&server, Failure::upstream("appservice-sql", "quota exceeded")).unwrap();
        c.resolve(&database, "db".to_string()).unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        let settlement = c.settlement(&cs).unwrap();
        assert_eq!(
            settlement.failure(),
            Some(&Failure::upstream("appservice-sql", "quota exceeded"))
        );
    }

    #[test]
    fn failure_propagates_through_chains() {
        let mut c = Composer::new();
        let host = c.pending::<String>("host");
        let url = c.apply("url", &host, |h| format!("https://{h}"));
        let (calls, seen) = counter();
        let len = c.apply("len", &url, move |u| {
            seen.fetch_add(1, Ordering::SeqCst);
            u.len()
        });

        c.fail(&host, Failure::upstream("web", "conflict")).unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(c.failure(len.id()).map(Failure::origin), Some("web"));
        assert_eq!(c.failure(url.id()).map(Failure::origin), Some("web"));
        assert_eq!(c.pending_count(), 0);
    }

    #[test]
    fn registering_on_failed_input_fails_immediately() {
        let mut c = Composer::new();
        let host = c.pending::<String>("host");
        c.fail(&host, Failure::upstream("web", "gone")).unwrap();

        let url = c.apply("url", &host, |h| h);

        assert!(matches!(c.get(&url), Err(ComposeError::Upstream(_))));
        assert_eq!(c.invocations(), 0);
    }

    #[test]
    fn chained_composition_resolves_in_one_call() {
        let mut c = Composer::new();
        let key = c.pending::<String>("key");
        let cs = c.apply("cs", &key, |k| format!("InstrumentationKey={k}"));
        let wrapped = c.apply("wrapped", &cs, |s| vec![s]);

        c.resolve(&key, "abc".to_string()).unwrap();

        assert_eq!(c.get(&wrapped).unwrap(), &vec!["InstrumentationKey=abc".to_string()]);
    }

    #[test]
    fn settling_twice_is_rejected() {
        let mut c = Composer::new();
        let v = c.pending::<String>("name");
        c.resolve(&v, "a".to_string()).unwrap();

        let err = c.resolve(&v, "b".to_string()).unwrap_err();
        assert_eq!(err, ComposeError::AlreadySettled("name".to_string()));
        let err = c.fail(&v, Failure::upstream("x", "y")).unwrap_err();
        assert_eq!(err, ComposeError::AlreadySettled("name".to_string()));
        assert_eq!(c.get(&v).unwrap(), "a");
    }

    #[test]
    fn derived_values_cannot_be_settled_from_outside() {
        let mut c = Composer::new();
        let a = c.pending::<u8>("a");
        let b = c.apply("b", &a, |x| x + 1);

        let err = c.resolve(&b, 9).unwrap_err();
        assert_eq!(err, ComposeError::NotExternal("b".to_string()));
    }

    #[test]
    fn try_combine_turns_format_error_into_failure() {
        let mut c = Composer::new();
        let host = c.pending::<String>("host");
        let url = c.try_apply("endpoint", &host, |h| {
            if h.is_empty() {
                Err(FormatError::new("empty host name"))
            } else {
                Ok(format!("https://{h}"))
            }
        });

        c.resolve(&host, String::new()).unwrap();

        assert_eq!(
            c.failure(url.id()),
            Some(&Failure::format("endpoint", "empty host name"))
        );
    }

    #[test]
    fn all_collects_in_input_order() {
        let mut c = Composer::new();
        let a = c.pending::<String>("a");
        let b = c.pending::<String>("b");
        let both = c.all("both", &[a, b]);

        c.resolve(&b, "second".to_string()).unwrap();
        c.resolve(&a, "first".to_string()).unwrap();

        assert_eq!(c.get(&both).unwrap(), &vec!["first".to_string(), "second".to_string()]);
    }

    #[test]
    fn same_input_twice_is_fine() {
        let mut c = Composer::new();
        let a = c.pending::<u32>("a");
        let doubled = c.combine("doubled", (a, a), |(x, y)| x + y);

        c.resolve(&a, 21).unwrap();

        assert_eq!(c.get(&doubled).unwrap(), &42);
    }

    #[test]
    fn independent_continuations_run_in_registration_order() {
        let mut c = Composer::new();
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let root = c.pending::<u8>("root");
        for i in 0..4u8 {
            let order = order.clone();
            c.apply(format!("n{i}"), &root, move |_| order.lock().unwrap().push(i));
        }

        c.resolve(&root, 0).unwrap();

        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn handle_from_another_composer_is_unknown() {
        let mut a = Composer::new();
        let b = Composer::new();
        let v = a.pending::<u8>("v");

        assert!(matches!(b.settlement(&v), Err(ComposeError::UnknownValue(_))));
    }

    #[test]
    fn get_on_pending_reports_label() {
        let mut c = Composer::new();
        let v = c.pending::<u8>("later");
        assert_eq!(c.get(&v).unwrap_err(), ComposeError::Unresolved("later".to_string()));
    }
}
