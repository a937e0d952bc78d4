//! Flattened step list executed by [`ComposedDecoder`](crate::ComposedDecoder).
//!
//! Each step pairs a decoder factory with a flag saying whether the decoded value is
//! stored in the accumulator. Steps that open a scope (repeat heads, optional heads,
//! recursion points) also carry a factory for the [`NextStepCalculator`] that steers
//! execution while the scope is active, together with the scope's bounds.
//!
//! The list is immutable once assembled and shared through an `Arc` by every decoder
//! session built from it.

use crate::accumulator::{Element, ElementsAccumulator};
use crate::decoder::{BoxDecoder, DecodeState, Decoder};
use crate::input::DecoderInput;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

pub(crate) type StepDecoder = BoxDecoder<Element>;

/// Builds the decoder for one arrival at a step. It may consume accumulated values.
pub(crate) type DecoderFactory =
    Arc<dyn Fn(&mut ElementsAccumulator) -> StepDecoder + Send + Sync>;

pub(crate) type CalculatorFactory =
    Arc<dyn Fn(ScopeBounds) -> Box<dyn NextStepCalculator> + Send + Sync>;

pub(crate) fn decoder_factory(
    f: impl Fn(&mut ElementsAccumulator) -> StepDecoder + Send + Sync + 'static,
) -> DecoderFactory {
    Arc::new(f)
}

pub(crate) fn calculator_factory(
    f: impl Fn(ScopeBounds) -> Box<dyn NextStepCalculator> + Send + Sync + 'static,
) -> CalculatorFactory {
    Arc::new(f)
}

/// Index of a scope's head step and of its last body step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ScopeBounds {
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Transition {
    Increment,
    GoTo(usize),
    /// Back to the first body step of the active scope.
    Rewind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct StepTransition {
    pub kind: Transition,
    /// The active scope is finished and its calculator must be removed.
    pub pop: bool,
}

impl StepTransition {
    pub fn increment() -> Self {
        StepTransition {
            kind: Transition::Increment,
            pop: false,
        }
    }

    pub fn go_to(index: usize) -> Self {
        StepTransition {
            kind: Transition::GoTo(index),
            pop: false,
        }
    }

    pub fn rewind() -> Self {
        StepTransition {
            kind: Transition::Rewind,
            pop: false,
        }
    }

    /// Leave the scope, continuing after its last step.
    pub fn leave(bounds: ScopeBounds) -> Self {
        StepTransition {
            kind: Transition::GoTo(bounds.end + 1),
            pop: true,
        }
    }
}

/// Steers execution while a scope is active.
pub(crate) trait NextStepCalculator: Send {
    fn bounds(&self) -> ScopeBounds;

    /// Called after step `current` completed (or after a nested scope ending at `current`
    /// finished).
    fn compute_transition(
        &mut self,
        current: usize,
        accumulator: &mut ElementsAccumulator,
    ) -> StepTransition;

    /// Called when execution runs past the last step. Returning `false` declines the end:
    /// the calculator is removed and execution resumes in the enclosing scope.
    fn on_finish(&mut self, _accumulator: &mut ElementsAccumulator) -> bool {
        true
    }
}

pub(crate) struct CompositionStep {
    label: &'static str,
    store_result: bool,
    decoder: DecoderFactory,
    calculator: Option<(CalculatorFactory, ScopeBounds)>,
}

impl CompositionStep {
    pub fn new(label: &'static str, store_result: bool, decoder: DecoderFactory) -> Self {
        CompositionStep {
            label,
            store_result,
            decoder,
            calculator: None,
        }
    }

    pub fn with_calculator(mut self, factory: CalculatorFactory, bounds: ScopeBounds) -> Self {
        self.calculator = Some((factory, bounds));
        self
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn store_result(&self) -> bool {
        self.store_result
    }

    pub fn decoder(&self, accumulator: &mut ElementsAccumulator) -> StepDecoder {
        (self.decoder)(accumulator)
    }

    pub fn calculator(&self) -> Option<Box<dyn NextStepCalculator>> {
        self.calculator
            .as_ref()
            .map(|(factory, bounds)| factory(*bounds))
    }
}

impl fmt::Debug for CompositionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositionStep")
            .field("label", &self.label)
            .field("store_result", &self.store_result)
            .field("scope", &self.calculator.as_ref().map(|(_, bounds)| bounds))
            .finish()
    }
}

#[derive(Debug)]
pub(crate) struct CompositionStepList {
    steps: Vec<CompositionStep>,
}

impl CompositionStepList {
    pub fn new(steps: Vec<CompositionStep>) -> Self {
        assert!(!steps.is_empty(), "a composition needs at least one step");
        CompositionStepList { steps }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn get(&self, index: usize) -> &CompositionStep {
        &self.steps[index]
    }
}

/// Wraps a typed decoder so its output can be stored in the accumulator.
pub(crate) struct Erased<D>(pub D);

impl<D> Decoder for Erased<D>
where
    D: Decoder,
    D::Output: Any + Send,
{
    type Output = Element;

    fn decode(&mut self, input: &mut dyn DecoderInput) -> DecodeState<Element> {
        self.0.decode(input).map(|value| Box::new(value) as Element)
    }

    fn reset(&mut self) {
        self.0.reset()
    }
}

pub(crate) fn erase<D>(decoder: D) -> StepDecoder
where
    D: Decoder + Send + 'static,
    D::Output: Any + Send,
{
    Box::new(Erased(decoder))
}

/// Yields one precomputed value without reading input.
pub(crate) struct Ready(Option<Element>);

impl Ready {
    pub fn new(value: Element) -> Self {
        Ready(Some(value))
    }

    /// A placeholder for steps that produce nothing worth storing.
    pub fn unit() -> Self {
        Ready(Some(Box::new(())))
    }
}

impl Decoder for Ready {
    type Output = Element;

    fn decode(&mut self, _input: &mut dyn DecoderInput) -> DecodeState<Element> {
        DecodeState::Done(self.0.take().unwrap_or_else(|| Box::new(())))
    }

    fn reset(&mut self) {}
}

/// Discards a fixed number of bytes.
pub(crate) struct SkipBytes {
    remaining: usize,
}

impl SkipBytes {
    pub fn new(count: usize) -> Self {
        SkipBytes { remaining: count }
    }
}

impl Decoder for SkipBytes {
    type Output = Element;

    fn decode(&mut self, input: &mut dyn DecoderInput) -> DecodeState<Element> {
        self.remaining -= input.skip(self.remaining);
        if self.remaining > 0 {
            return DecodeState::Processing;
        }
        DecodeState::Done(Box::new(()))
    }

    fn reset(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::U16Decoder;

    #[test]
    fn erased_decoder_boxes_output() {
        let mut decoder = erase(U16Decoder::default());
        let value = decoder.decode(&mut &[0u8, 9][..]).done().expect("done");
        assert_eq!(value.downcast_ref::<u16>(), Some(&9));
    }

    #[test]
    fn skip_bytes_resumes() {
        let mut skip = SkipBytes::new(3);
        assert!(skip.decode(&mut &[1u8, 2][..]).is_processing());
        let mut input: &[u8] = &[3, 4];
        assert!(skip.decode(&mut input).is_done());
        assert_eq!(input, &[4]);
    }

    #[test]
    fn step_builds_calculator_with_its_bounds() {
        struct Fixed(ScopeBounds);
        impl NextStepCalculator for Fixed {
            fn bounds(&self) -> ScopeBounds {
                self.0
            }
            fn compute_transition(
                &mut self,
                _current: usize,
                _accumulator: &mut ElementsAccumulator,
            ) -> StepTransition {
                StepTransition::leave(self.0)
            }
        }

        let bounds = ScopeBounds { start: 2, end: 5 };
        let step = CompositionStep::new("head", false, decoder_factory(|_| Box::new(Ready::unit())))
            .with_calculator(calculator_factory(|bounds| Box::new(Fixed(bounds))), bounds);
        let mut calculator = step.calculator().expect("calculator");
        assert_eq!(calculator.bounds(), bounds);
        let transition = calculator.compute_transition(5, &mut ElementsAccumulator::new());
        assert_eq!(transition.kind, Transition::GoTo(6));
        assert!(transition.pop);
    }
}
