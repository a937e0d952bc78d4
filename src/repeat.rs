//! Standalone repeat decoder: one element decoder run several times into a [`Collector`].
//!
//! This is the leaf-level counterpart of the composer's `repeat*` operations, for when a
//! single decoder (not a whole composition) repeats.
//!
//! ```
//! use stepdec::primitives::{U16Decoder, U8Decoder};
//! use stepdec::{collector, DecodeState, Decoder, RepeatDecoder};
//!
//! let mut ports =
//!     RepeatDecoder::prefixed(U16Decoder::default(), U8Decoder::default(), collector::to_vec());
//! assert_eq!(ports.decode_all(&[2, 0, 80, 1, 187]), Ok(vec![80, 443]));
//! ```

use crate::calculator::Predicate;
use crate::collector::Collector;
use crate::decoder::{BoxDecoder, DecodeState, Decoder};
use crate::input::DecoderInput;
use crate::primitives::{to_length, LengthPrefix};
use std::sync::Arc;

enum Bound<E> {
    Times(usize),
    Prefixed {
        size: BoxDecoder<usize>,
        times: Option<usize>,
    },
    While {
        predicate: Predicate<E>,
        add_last: bool,
    },
}

impl<E> Bound<E> {
    fn times(&self) -> Option<usize> {
        match self {
            Bound::Times(n) => Some(*n),
            Bound::Prefixed { times, .. } => *times,
            Bound::While { .. } => None,
        }
    }
}

pub struct RepeatDecoder<D: Decoder, C, R> {
    element: D,
    collector: Collector<C, D::Output, R>,
    bound: Bound<D::Output>,
    container: Option<C>,
    produced: usize,
}

impl<D: Decoder, C, R> RepeatDecoder<D, C, R> {
    fn with_bound(
        element: D,
        bound: Bound<D::Output>,
        collector: Collector<C, D::Output, R>,
    ) -> Self {
        RepeatDecoder {
            element,
            collector,
            bound,
            container: None,
            produced: 0,
        }
    }

    /// Exactly `times` elements.
    pub fn counted(element: D, times: usize, collector: Collector<C, D::Output, R>) -> Self {
        Self::with_bound(element, Bound::Times(times), collector)
    }

    /// An element count decoded by `size`, then that many elements.
    pub fn prefixed<S>(element: D, size: S, collector: Collector<C, D::Output, R>) -> Self
    where
        S: Decoder + Send + 'static,
        S::Output: LengthPrefix,
    {
        let size = Box::new(size.try_map_result(to_length));
        Self::with_bound(element, Bound::Prefixed { size, times: None }, collector)
    }

    /// Elements until one fails `predicate`; that last one is collected when `add_last`.
    pub fn while_matching(
        element: D,
        predicate: impl Fn(&D::Output) -> bool + Send + Sync + 'static,
        add_last: bool,
        collector: Collector<C, D::Output, R>,
    ) -> Self {
        let predicate: Predicate<D::Output> = Arc::new(predicate);
        Self::with_bound(
            element,
            Bound::While {
                predicate,
                add_last,
            },
            collector,
        )
    }
}

impl<D: Decoder, C, R> Decoder for RepeatDecoder<D, C, R> {
    type Output = R;

    fn decode(&mut self, input: &mut dyn DecoderInput) -> DecodeState<R> {
        if let Bound::Prefixed { size, times } = &mut self.bound {
            if times.is_none() {
                match size.decode(input) {
                    DecodeState::Done(n) => *times = Some(n),
                    other => return other.cast_pending(),
                }
            }
        }
        let target = self.bound.times();
        let collector = &self.collector;
        let container = self
            .container
            .get_or_insert_with(|| collector.supply(target));
        while target != Some(self.produced) {
            let element = match self.element.decode(input) {
                DecodeState::Done(element) => element,
                other => return other.cast_pending(),
            };
            if let Bound::While {
                predicate,
                add_last,
            } = &self.bound
            {
                if !predicate(&element) {
                    if *add_last {
                        collector.accumulate(container, element, self.produced);
                    }
                    break;
                }
            }
            collector.accumulate(container, element, self.produced);
            self.produced += 1;
        }
        let container = self
            .container
            .take()
            .unwrap_or_else(|| self.collector.supply(target));
        self.restart();
        DecodeState::Done(self.collector.finish(container))
    }

    fn reset(&mut self) {
        self.element.reset();
        if let Bound::Prefixed { size, .. } = &mut self.bound {
            size.reset();
        }
        self.restart();
    }
}

impl<D: Decoder, C, R> RepeatDecoder<D, C, R> {
    fn restart(&mut self) {
        if let Bound::Prefixed { times, .. } = &mut self.bound {
            *times = None;
        }
        self.container = None;
        self.produced = 0;
    }
}
