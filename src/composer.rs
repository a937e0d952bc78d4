//! Builder that records a decoding recipe and assembles it into a [`ComposedDecoder`].
//!
//! A composition is a sequence of *steps*. Each step produces at most one value, which is
//! kept as a *pending value* until a later step consumes it. The builder tracks the type of
//! every pending value so misuse is reported at assembly time, not while decoding.
//!
//! | Operation | Consumes | Produces |
//! |-----------|----------|----------|
//! | `then(d)` | - | value of `d` |
//! | `then_map(d, f)` | - | `f(value of d)` |
//! | `map(f)` | last value | value of the decoder returned by `f` |
//! | `map_and_store(f)` | - (borrows last value) | value of the decoder returned by `f` |
//! | `reduce(n, f)`, `reduce2` .. `reduce5` | last `n` values | combined value |
//! | `skip(n)` | - | - (discards `n` bytes) |
//! | `then_itself_or_null(flag)` | - | `Option<B>`: a nested instance of the whole decoder |
//! | `optional(flag)` | the single value | `Option<T>` |
//! | `repeat*` | the single value | collector result |
//! | `finally(f)` | the single value | `B`, then assembles |
//!
//! `optional` and the `repeat*` family wrap *everything composed so far*, so they can only
//! be used while exactly one value is pending. Compose the element first, reduce it to one
//! value, then repeat it.
//!
//! Building a malformed composition (wrong types, wrong arity, more than one pending value
//! at assembly) is a programming error and panics.

use crate::accumulator::ElementsAccumulator;
use crate::calculator::{
    OptionalCalculator, Predicate, RecursionCalculator, RepeatBound, RepeatCalculator,
};
use crate::collector::{self, Collector};
use crate::decoder::Decoder;
use crate::engine::{ComposedDecoder, EngineOptions};
use crate::primitives::{to_length, LengthPrefix};
use crate::step::{
    calculator_factory, decoder_factory, erase, CalculatorFactory, CompositionStep,
    CompositionStepList, DecoderFactory, Ready, ScopeBounds, SkipBytes,
};
use std::any::{self, Any, TypeId};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// Type of one pending value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Slot {
    id: TypeId,
    name: &'static str,
}

impl Slot {
    fn of<T: Any>() -> Self {
        Slot {
            id: TypeId::of::<T>(),
            name: any::type_name::<T>(),
        }
    }
}

/// One recorded step; scope heads own the steps they wrap.
struct Op {
    label: &'static str,
    store_result: bool,
    decoder: DecoderFactory,
    scope: Option<(CalculatorFactory, Vec<Op>)>,
}

impl Op {
    fn len(&self) -> usize {
        1 + self
            .scope
            .as_ref()
            .map_or(0, |(_, body)| body.iter().map(Op::len).sum())
    }

    fn flatten(self, out: &mut Vec<CompositionStep>) {
        let start = out.len();
        let end = start + self.len() - 1;
        let step = CompositionStep::new(self.label, self.store_result, self.decoder);
        match self.scope {
            None => out.push(step),
            Some((calculator, body)) => {
                out.push(step.with_calculator(calculator, ScopeBounds { start, end }));
                for op in body {
                    op.flatten(out);
                }
            }
        }
    }
}

/// Ordered access to the values consumed by a [`Composer::reduce`] step, oldest first.
pub struct Reduction<'a> {
    accumulator: &'a mut ElementsAccumulator,
    remaining: usize,
}

impl Reduction<'_> {
    /// Take the next value.
    ///
    /// # Panics
    ///
    /// Panics when all values have been taken or the value is not a `T`.
    #[allow(clippy::should_implement_trait)]
    pub fn next<T: Any>(&mut self) -> T {
        assert!(self.remaining > 0, "reduce read more values than its arity");
        self.remaining -= 1;
        self.accumulator.next()
    }

    /// Values not taken yet.
    pub fn remaining(&self) -> usize {
        self.remaining
    }

    fn discard_rest(&mut self) {
        while self.remaining > 0 {
            self.remaining -= 1;
            self.accumulator.next_element();
        }
    }
}

macro_rules! typed_reduce {
    ($(#[$attr:meta])* $name:ident($($ty:ident $arg:ident),+)) => {
        $(#[$attr])*
        pub fn $name<$($ty,)+ R, F>(self, f: F) -> Self
        where
            $($ty: Any + Send,)+
            R: Any + Send,
            F: Fn($($ty),+) -> R + Send + Sync + 'static,
        {
            let expected = [$(Slot::of::<$ty>()),+];
            self.check_tail(&expected, stringify!($name));
            self.reduce(expected.len(), move |values| {
                $(let $arg = values.next::<$ty>();)+
                f($($arg),+)
            })
        }
    };
}

/// Records a decoding recipe producing a `B`.
pub struct Composer<B> {
    ops: Vec<Op>,
    slots: Vec<Slot>,
    _marker: PhantomData<fn() -> B>,
}

impl<B: Any + Send> Composer<B> {
    /// Start a composition with its first decoder.
    pub fn begin_with<D>(decoder: D) -> Self
    where
        D: Decoder + Clone + Send + Sync + 'static,
        D::Output: Any + Send,
    {
        Self::empty().then(decoder)
    }

    /// Start a composition with a decoder built fresh for every decode.
    pub fn begin_with_factory<D, F>(factory: F) -> Self
    where
        F: Fn() -> D + Send + Sync + 'static,
        D: Decoder + Send + 'static,
        D::Output: Any + Send,
    {
        Self::empty().then_with(factory)
    }

    fn empty() -> Self {
        Composer {
            ops: Vec::new(),
            slots: Vec::new(),
            _marker: PhantomData,
        }
    }

    fn push_step(&mut self, label: &'static str, store_result: bool, decoder: DecoderFactory) {
        self.ops.push(Op {
            label,
            store_result,
            decoder,
            scope: None,
        });
    }

    /// Move every step recorded so far under a new scope head.
    fn wrap(
        &mut self,
        label: &'static str,
        store_result: bool,
        head: DecoderFactory,
        calculator: CalculatorFactory,
    ) {
        let body = std::mem::take(&mut self.ops);
        self.ops.push(Op {
            label,
            store_result,
            decoder: head,
            scope: Some((calculator, body)),
        });
    }

    fn check_tail(&self, expected: &[Slot], op: &str) {
        assert!(
            self.slots.len() >= expected.len(),
            "`{}` needs {} pending values but only {} are available",
            op,
            expected.len(),
            self.slots.len()
        );
        let tail = &self.slots[self.slots.len() - expected.len()..];
        for (found, wanted) in tail.iter().zip(expected) {
            assert!(
                found.id == wanted.id,
                "`{}` expects a `{}` but the pending value is a `{}`",
                op,
                wanted.name,
                found.name
            );
        }
    }

    fn check_single(&self, expected: Slot, op: &str) {
        assert!(
            self.slots.len() == 1,
            "`{}` wraps everything composed so far and needs exactly one pending value, found {}",
            op,
            self.slots.len()
        );
        self.check_tail(&[expected], op);
    }

    /// Decode one more value with `decoder`.
    pub fn then<D>(self, decoder: D) -> Self
    where
        D: Decoder + Clone + Send + Sync + 'static,
        D::Output: Any + Send,
    {
        self.then_with(move || decoder.clone())
    }

    /// Decode one more value with a decoder built by `factory` on each arrival.
    ///
    /// Useful for decoders that are not `Clone` or `Sync`, such as a nested
    /// [`ComposedDecoder`] (see [`ComposedDecoder::factory`]).
    pub fn then_with<D, F>(mut self, factory: F) -> Self
    where
        F: Fn() -> D + Send + Sync + 'static,
        D: Decoder + Send + 'static,
        D::Output: Any + Send,
    {
        self.push_step("then", true, decoder_factory(move |_| erase(factory())));
        self.slots.push(Slot::of::<D::Output>());
        self
    }

    /// Decode one more value and transform it right away.
    pub fn then_map<D, F, R>(self, decoder: D, f: F) -> Self
    where
        D: Decoder + Clone + Send + Sync + 'static,
        F: Fn(D::Output) -> R + Clone + Send + Sync + 'static,
        R: Any + Send,
    {
        self.then(decoder.map_result(f))
    }

    /// Replace the last value with the result of the decoder `f` chooses for it.
    pub fn map<T, D, F>(mut self, f: F) -> Self
    where
        T: Any + Send,
        F: Fn(T) -> D + Send + Sync + 'static,
        D: Decoder + Send + 'static,
        D::Output: Any + Send,
    {
        self.check_tail(&[Slot::of::<T>()], "map");
        self.push_step(
            "map",
            true,
            decoder_factory(move |acc| erase(f(acc.pop::<T>()))),
        );
        self.slots.pop();
        self.slots.push(Slot::of::<D::Output>());
        self
    }

    /// Keep the last value and decode one more with the decoder `f` chooses for it.
    pub fn map_and_store<T, D, F>(mut self, f: F) -> Self
    where
        T: Any + Send,
        F: Fn(&T) -> D + Send + Sync + 'static,
        D: Decoder + Send + 'static,
        D::Output: Any + Send,
    {
        self.check_tail(&[Slot::of::<T>()], "map_and_store");
        self.push_step(
            "map_and_store",
            true,
            decoder_factory(move |acc| erase(f(acc.peek::<T>()))),
        );
        self.slots.push(Slot::of::<D::Output>());
        self
    }

    /// Combine the last `arity` values into one.
    ///
    /// `f` reads the values oldest first through [`Reduction::next`]. Values it leaves
    /// unread are discarded.
    pub fn reduce<R, F>(mut self, arity: usize, f: F) -> Self
    where
        R: Any + Send,
        F: Fn(&mut Reduction<'_>) -> R + Send + Sync + 'static,
    {
        assert!(arity > 0, "`reduce` needs at least one value");
        assert!(
            arity <= self.slots.len(),
            "`reduce` of {} values but only {} are pending",
            arity,
            self.slots.len()
        );
        self.push_step(
            "reduce",
            true,
            decoder_factory(move |acc| {
                acc.read_back(arity);
                let mut values = Reduction {
                    accumulator: acc,
                    remaining: arity,
                };
                let result = f(&mut values);
                values.discard_rest();
                Box::new(Ready::new(Box::new(result)))
            }),
        );
        let keep = self.slots.len() - arity;
        self.slots.truncate(keep);
        self.slots.push(Slot::of::<R>());
        self
    }

    typed_reduce!(
        /// Transform the last value.
        reduce1(T1 a)
    );
    typed_reduce!(
        /// Combine the last two values.
        reduce2(T1 a, T2 b)
    );
    typed_reduce!(
        /// Combine the last three values.
        reduce3(T1 a, T2 b, T3 c)
    );
    typed_reduce!(
        /// Combine the last four values.
        reduce4(T1 a, T2 b, T3 c, T4 d)
    );
    typed_reduce!(
        /// Combine the last five values.
        reduce5(T1 a, T2 b, T3 c, T4 d, T5 e)
    );

    /// Map the single pending value into `B` and assemble.
    pub fn finally<T, F>(self, f: F) -> ComposedDecoder<B>
    where
        T: Any + Send,
        F: Fn(T) -> B + Send + Sync + 'static,
    {
        self.reduce1(f).assemble()
    }

    /// Discard the next `count` bytes.
    pub fn skip(mut self, count: usize) -> Self {
        self.push_step(
            "skip",
            false,
            decoder_factory(move |_| Box::new(SkipBytes::new(count))),
        );
        self
    }

    /// Decode a presence flag; when set, decode a nested `B` with this same composition.
    ///
    /// Produces an `Option<B>`.
    pub fn then_itself_or_null<D>(mut self, presence: D) -> Self
    where
        D: Decoder<Output = bool> + Clone + Send + Sync + 'static,
    {
        self.ops.push(Op {
            label: "then_itself_or_null",
            store_result: true,
            decoder: decoder_factory(move |_| erase(presence.clone())),
            scope: Some((
                calculator_factory(|bounds| Box::new(RecursionCalculator::<B>::new(bounds))),
                Vec::new(),
            )),
        });
        self.slots.push(Slot::of::<Option<B>>());
        self
    }

    /// Decode a presence flag, then the composition so far only when it is set.
    ///
    /// Turns the single pending `T` into an `Option<T>`.
    pub fn optional<T, D>(mut self, presence: D) -> Self
    where
        T: Any + Send,
        D: Decoder<Output = bool> + Clone + Send + Sync + 'static,
    {
        self.check_single(Slot::of::<T>(), "optional");
        self.wrap(
            "optional",
            true,
            decoder_factory(move |_| erase(presence.clone())),
            calculator_factory(|bounds| Box::new(OptionalCalculator::<T>::new(bounds))),
        );
        self.slots = vec![Slot::of::<Option<T>>()];
        self
    }

    fn wrap_repeat<T, C, R>(
        mut self,
        label: &'static str,
        head: Option<DecoderFactory>,
        bound: RepeatBound<T>,
        collector: Collector<C, T, R>,
    ) -> Self
    where
        T: Any + Send,
        C: Send + 'static,
        R: Any + Send,
    {
        self.check_single(Slot::of::<T>(), label);
        let store_result = head.is_some();
        let head = head.unwrap_or_else(|| decoder_factory(|_| Box::new(Ready::unit())));
        self.wrap(
            label,
            store_result,
            head,
            calculator_factory(move |bounds| {
                Box::new(RepeatCalculator::new(
                    bounds,
                    bound.clone(),
                    collector.clone(),
                ))
            }),
        );
        self.slots = vec![Slot::of::<R>()];
        self
    }

    /// Decode the composition so far exactly `times` times.
    pub fn repeat<T, C, R>(self, times: usize, collector: Collector<C, T, R>) -> Self
    where
        T: Any + Send,
        C: Send + 'static,
        R: Any + Send,
    {
        self.wrap_repeat("repeat", None, RepeatBound::Times(times), collector)
    }

    /// Decode a count with `size`, then the composition so far that many times.
    pub fn repeat_prefixed<S, T, C, R>(self, size: S, collector: Collector<C, T, R>) -> Self
    where
        S: Decoder + Clone + Send + Sync + 'static,
        S::Output: LengthPrefix,
        T: Any + Send,
        C: Send + 'static,
        R: Any + Send,
    {
        let head = decoder_factory(move |_| erase(size.clone().try_map_result(to_length)));
        self.wrap_repeat("repeat_prefixed", Some(head), RepeatBound::Prefixed, collector)
    }

    /// Decode the composition so far until an element fails `predicate`.
    ///
    /// The failing element ends the repeat; it is collected too when `add_last` is set.
    pub fn repeat_while<T, C, R, P>(
        self,
        predicate: P,
        add_last: bool,
        collector: Collector<C, T, R>,
    ) -> Self
    where
        T: Any + Send,
        C: Send + 'static,
        R: Any + Send,
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        let predicate: Predicate<T> = Arc::new(predicate);
        let bound = RepeatBound::While {
            predicate,
            add_last,
        };
        self.wrap_repeat("repeat_while", None, bound, collector)
    }

    /// Decode the composition so far until an element matches `terminator`.
    pub fn repeat_until<T, C, R, P>(
        self,
        terminator: P,
        add_last: bool,
        collector: Collector<C, T, R>,
    ) -> Self
    where
        T: Any + Send,
        C: Send + 'static,
        R: Any + Send,
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.repeat_while(move |element: &T| !terminator(element), add_last, collector)
    }

    /// [`repeat`](Self::repeat) into a `Vec<T>`.
    pub fn repeat_vec<T: Any + Send>(self, times: usize) -> Self {
        self.repeat(times, collector::to_vec::<T>())
    }

    /// [`repeat_prefixed`](Self::repeat_prefixed) into a `Vec<T>`.
    pub fn repeat_prefixed_vec<T, S>(self, size: S) -> Self
    where
        T: Any + Send,
        S: Decoder + Clone + Send + Sync + 'static,
        S::Output: LengthPrefix,
    {
        self.repeat_prefixed(size, collector::to_vec::<T>())
    }

    /// [`repeat_while`](Self::repeat_while) into a `Vec<T>`.
    pub fn repeat_while_vec<T, P>(self, predicate: P, add_last: bool) -> Self
    where
        T: Any + Send,
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.repeat_while(predicate, add_last, collector::to_vec::<T>())
    }

    /// Assemble with [`EngineOptions::default`].
    pub fn assemble(self) -> ComposedDecoder<B> {
        self.assemble_with(EngineOptions::default())
    }

    /// Assemble the recorded steps into a decoder.
    ///
    /// # Panics
    ///
    /// Panics unless exactly one value, of type `B`, is pending.
    pub fn assemble_with(self, options: EngineOptions) -> ComposedDecoder<B> {
        let pending: Vec<&str> = self.slots.iter().map(|slot| slot.name).collect();
        assert!(
            self.slots.len() == 1 && self.slots[0].id == TypeId::of::<B>(),
            "assembling a `{}` requires exactly one pending value of that type, found {:?}",
            any::type_name::<B>(),
            pending
        );
        let mut steps = Vec::with_capacity(self.ops.iter().map(Op::len).sum());
        for op in self.ops {
            op.flatten(&mut steps);
        }
        log::debug!(
            "assembled {} steps for `{}`",
            steps.len(),
            any::type_name::<B>()
        );
        ComposedDecoder::new(Arc::new(CompositionStepList::new(steps)), options)
    }
}

impl<B> fmt::Debug for Composer<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pending: Vec<&str> = self.slots.iter().map(|slot| slot.name).collect();
        f.debug_struct("Composer")
            .field("steps", &self.ops.iter().map(Op::len).sum::<usize>())
            .field("pending", &pending)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::{BoolDecoder, U8Decoder};

    #[test]
    fn flatten_assigns_scope_bounds() {
        let composer = Composer::<Vec<u8>>::begin_with(U8Decoder::default())
            .then(U8Decoder::default())
            .reduce2(|a: u8, b: u8| a ^ b)
            .optional::<u8, _>(BoolDecoder)
            .then_itself_or_null(BoolDecoder)
            .reduce2(|a: Option<u8>, _: Option<Vec<u8>>| a.into_iter().collect::<Vec<u8>>())
            .repeat_vec::<Vec<u8>>(2)
            .reduce1(|rows: Vec<Vec<u8>>| rows.concat());
        let mut steps = Vec::new();
        for op in composer.ops {
            op.flatten(&mut steps);
        }
        let scopes: Vec<(&str, Option<ScopeBounds>)> = steps
            .iter()
            .map(|step| (step.label(), step.calculator().map(|c| c.bounds())))
            .collect();
        let bounds = |start, end| Some(ScopeBounds { start, end });
        assert_eq!(
            scopes,
            vec![
                ("repeat", bounds(0, 6)),
                ("optional", bounds(1, 4)),
                ("then", None),
                ("then", None),
                ("reduce", None),
                ("then_itself_or_null", bounds(5, 5)),
                ("reduce", None),
                ("reduce", None),
            ]
        );
    }

    #[test]
    #[should_panic(expected = "expects a `u16`")]
    fn type_mismatch_is_rejected() {
        let _ = Composer::<u16>::begin_with(U8Decoder::default()).reduce1(|v: u16| v);
    }

    #[test]
    #[should_panic(expected = "exactly one pending value")]
    fn repeat_needs_single_value() {
        let _ = Composer::<Vec<u8>>::begin_with(U8Decoder::default())
            .then(U8Decoder::default())
            .repeat_vec::<u8>(2);
    }

    #[test]
    #[should_panic(expected = "requires exactly one pending value")]
    fn assemble_checks_result_type() {
        let _ = Composer::<u16>::begin_with(U8Decoder::default()).assemble();
    }
}
