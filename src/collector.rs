//! Collectors fold the elements produced by a repeat into a container.
//!
//! A [`Collector`] is three functions: a *supplier* creating an empty container (it gets
//! the element count when the repeat knows it up front), an *accumulator* adding one
//! element together with its index, and a *finisher* turning the container into the
//! result. Collectors are cheap to clone and shareable across threads, so one collector
//! can serve every decoder instance built from the same composition.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

/// Upper bound on capacity pre-allocated from an untrusted count.
const MAX_PREALLOCATION: usize = 4096;

type Supplier<C> = dyn Fn(Option<usize>) -> C + Send + Sync;
type Accumulator<C, E> = dyn Fn(&mut C, E, usize) + Send + Sync;
type Finisher<C, R> = dyn Fn(C) -> R + Send + Sync;

pub struct Collector<C, E, R> {
    supplier: Arc<Supplier<C>>,
    accumulator: Arc<Accumulator<C, E>>,
    finisher: Arc<Finisher<C, R>>,
}

impl<C, E, R> Collector<C, E, R> {
    pub fn new(
        supplier: impl Fn(Option<usize>) -> C + Send + Sync + 'static,
        accumulator: impl Fn(&mut C, E, usize) + Send + Sync + 'static,
        finisher: impl Fn(C) -> R + Send + Sync + 'static,
    ) -> Self {
        Collector {
            supplier: Arc::new(supplier),
            accumulator: Arc::new(accumulator),
            finisher: Arc::new(finisher),
        }
    }

    /// Fresh container; `size_hint` is the element count if known.
    pub fn supply(&self, size_hint: Option<usize>) -> C {
        (self.supplier)(size_hint)
    }

    pub fn accumulate(&self, container: &mut C, element: E, index: usize) {
        (self.accumulator)(container, element, index)
    }

    pub fn finish(&self, container: C) -> R {
        (self.finisher)(container)
    }
}

impl<C, E, R> Clone for Collector<C, E, R> {
    fn clone(&self) -> Self {
        Collector {
            supplier: Arc::clone(&self.supplier),
            accumulator: Arc::clone(&self.accumulator),
            finisher: Arc::clone(&self.finisher),
        }
    }
}

impl<C, E, R> fmt::Debug for Collector<C, E, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collector").finish_non_exhaustive()
    }
}

fn capacity(size_hint: Option<usize>) -> usize {
    size_hint.unwrap_or(0).min(MAX_PREALLOCATION)
}

/// Elements in decode order.
pub fn to_vec<E: 'static>() -> Collector<Vec<E>, E, Vec<E>> {
    Collector::new(
        |hint| Vec::with_capacity(capacity(hint)),
        |vec: &mut Vec<E>, element, _| vec.push(element),
        |vec| vec,
    )
}

/// Distinct elements; duplicates are dropped.
pub fn to_hash_set<E: Eq + Hash + 'static>() -> Collector<HashSet<E>, E, HashSet<E>> {
    Collector::new(
        |hint| HashSet::with_capacity(capacity(hint)),
        |set: &mut HashSet<E>, element, _| {
            set.insert(element);
        },
        |set| set,
    )
}

/// Key/value pairs; a repeated key keeps the last value.
pub fn to_hash_map<K, V>() -> Collector<HashMap<K, V>, (K, V), HashMap<K, V>>
where
    K: Eq + Hash + 'static,
    V: 'static,
{
    Collector::new(
        |hint| HashMap::with_capacity(capacity(hint)),
        |map: &mut HashMap<K, V>, (key, value), _| {
            map.insert(key, value);
        },
        |map| map,
    )
}

/// Number of elements, discarding the elements themselves.
pub fn counting<E: 'static>() -> Collector<usize, E, usize> {
    Collector::new(|_| 0, |count: &mut usize, _element: E, _| *count += 1, |count| count)
}
