//! Scope calculators: the control flow of repeats, optionals and recursion.
//!
//! A calculator is created each time execution arrives at its scope's head step and is
//! removed when the scope finishes, so its state belongs to one pass through the scope.
//!
//! | Calculator | Head step | Behaviour |
//! |------------|-----------|-----------|
//! | [`RepeatCalculator`] | count (prefixed) or none | rewinds the body until the bound is met, folding each element into the collector |
//! | [`OptionalCalculator`] | presence flag | skips the body when absent, wraps the value in `Some` otherwise |
//! | [`RecursionCalculator`] | presence flag | restarts the whole list in a fresh layer, wraps the nested result in `Some` |

use crate::accumulator::ElementsAccumulator;
use crate::collector::Collector;
use crate::step::{NextStepCalculator, ScopeBounds, StepTransition};
use std::any::Any;
use std::marker::PhantomData;
use std::sync::Arc;

pub(crate) type Predicate<E> = Arc<dyn Fn(&E) -> bool + Send + Sync>;

pub(crate) enum RepeatBound<E> {
    Times(usize),
    /// Count stored by the head step.
    Prefixed,
    While { predicate: Predicate<E>, add_last: bool },
}

impl<E> Clone for RepeatBound<E> {
    fn clone(&self) -> Self {
        match self {
            RepeatBound::Times(n) => RepeatBound::Times(*n),
            RepeatBound::Prefixed => RepeatBound::Prefixed,
            RepeatBound::While {
                predicate,
                add_last,
            } => RepeatBound::While {
                predicate: Arc::clone(predicate),
                add_last: *add_last,
            },
        }
    }
}

pub(crate) struct RepeatCalculator<C, E, R> {
    bounds: ScopeBounds,
    bound: RepeatBound<E>,
    collector: Collector<C, E, R>,
    container: Option<C>,
    times: Option<usize>,
    produced: usize,
}

impl<C, E, R> RepeatCalculator<C, E, R> {
    pub fn new(bounds: ScopeBounds, bound: RepeatBound<E>, collector: Collector<C, E, R>) -> Self {
        RepeatCalculator {
            bounds,
            bound,
            collector,
            container: None,
            times: None,
            produced: 0,
        }
    }
}

impl<C, E, R> RepeatCalculator<C, E, R>
where
    C: Send,
    E: Any + Send,
    R: Any + Send,
{
    fn begin(&mut self, accumulator: &mut ElementsAccumulator) -> StepTransition {
        self.times = match self.bound {
            RepeatBound::Times(n) => Some(n),
            RepeatBound::Prefixed => Some(accumulator.pop::<usize>()),
            RepeatBound::While { .. } => None,
        };
        let container = self.collector.supply(self.times);
        if self.times == Some(0) {
            accumulator.push(self.collector.finish(container));
            return StepTransition::leave(self.bounds);
        }
        self.container = Some(container);
        StepTransition::increment()
    }

    fn collect(&mut self, accumulator: &mut ElementsAccumulator) -> StepTransition {
        let element = accumulator.pop::<E>();
        let collector = &self.collector;
        let times = self.times;
        let container = self
            .container
            .get_or_insert_with(|| collector.supply(times));
        match &self.bound {
            RepeatBound::While {
                predicate,
                add_last,
            } => {
                if predicate(&element) {
                    collector.accumulate(container, element, self.produced);
                    self.produced += 1;
                    return StepTransition::rewind();
                }
                if *add_last {
                    collector.accumulate(container, element, self.produced);
                }
            }
            _ => {
                collector.accumulate(container, element, self.produced);
                self.produced += 1;
                if Some(self.produced) != self.times {
                    return StepTransition::rewind();
                }
            }
        }
        if let Some(container) = self.container.take() {
            accumulator.push(self.collector.finish(container));
        }
        self.produced = 0;
        StepTransition::leave(self.bounds)
    }
}

impl<C, E, R> NextStepCalculator for RepeatCalculator<C, E, R>
where
    C: Send,
    E: Any + Send,
    R: Any + Send,
{
    fn bounds(&self) -> ScopeBounds {
        self.bounds
    }

    fn compute_transition(
        &mut self,
        current: usize,
        accumulator: &mut ElementsAccumulator,
    ) -> StepTransition {
        if current == self.bounds.start {
            self.begin(accumulator)
        } else if current == self.bounds.end {
            self.collect(accumulator)
        } else {
            StepTransition::increment()
        }
    }
}

pub(crate) struct OptionalCalculator<T> {
    bounds: ScopeBounds,
    _marker: PhantomData<fn() -> T>,
}

impl<T> OptionalCalculator<T> {
    pub fn new(bounds: ScopeBounds) -> Self {
        OptionalCalculator {
            bounds,
            _marker: PhantomData,
        }
    }
}

impl<T: Any + Send> NextStepCalculator for OptionalCalculator<T> {
    fn bounds(&self) -> ScopeBounds {
        self.bounds
    }

    fn compute_transition(
        &mut self,
        current: usize,
        accumulator: &mut ElementsAccumulator,
    ) -> StepTransition {
        if current == self.bounds.start {
            if accumulator.pop::<bool>() {
                return StepTransition::increment();
            }
            accumulator.push(None::<T>);
            return StepTransition::leave(self.bounds);
        }
        if current == self.bounds.end {
            let value = accumulator.pop::<T>();
            accumulator.push(Some(value));
            return StepTransition::leave(self.bounds);
        }
        StepTransition::increment()
    }
}

/// Drives `then_itself_or_null`: on a present flag the whole step list runs again in a
/// fresh accumulator layer, and the nested result comes back as `Some(value)`.
pub(crate) struct RecursionCalculator<B> {
    bounds: ScopeBounds,
    /// Accumulator depth right after the nested instance's layer was opened.
    layer_depth: Option<usize>,
    _marker: PhantomData<fn() -> B>,
}

impl<B> RecursionCalculator<B> {
    pub fn new(bounds: ScopeBounds) -> Self {
        RecursionCalculator {
            bounds,
            layer_depth: None,
            _marker: PhantomData,
        }
    }
}

impl<B: Any + Send> NextStepCalculator for RecursionCalculator<B> {
    fn bounds(&self) -> ScopeBounds {
        self.bounds
    }

    fn compute_transition(
        &mut self,
        _current: usize,
        accumulator: &mut ElementsAccumulator,
    ) -> StepTransition {
        if self.layer_depth.is_some() {
            // Inside the nested instance: plain sequential execution.
            return StepTransition::increment();
        }
        if !accumulator.pop::<bool>() {
            accumulator.push(None::<B>);
            return StepTransition::leave(self.bounds);
        }
        accumulator.open_layer();
        self.layer_depth = Some(accumulator.depth());
        StepTransition::go_to(0)
    }

    fn on_finish(&mut self, accumulator: &mut ElementsAccumulator) -> bool {
        let Some(depth) = self.layer_depth else {
            return true;
        };
        // A reduction over the whole layer closes it early; the result then sits in the
        // enclosing layer.
        let value = if accumulator.depth() >= depth {
            accumulator.next::<B>()
        } else {
            accumulator.pop::<B>()
        };
        accumulator.push(Some(value));
        false
    }
}
