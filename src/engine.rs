//! Resumable interpreter for an assembled step list.
//!
//! [`ComposedDecoder`] walks the flattened step list produced by
//! [`Composer::assemble`](crate::Composer::assemble). For each step it builds a decoder
//! (the factory may consume accumulated values), runs it until `Done`, stores the value
//! if the step asks for it, then picks the next index:
//!
//! - With no scope active the next index is simply `current + 1`.
//! - Otherwise the innermost scope's calculator decides (increment, go to, rewind). When
//!   it reports its scope finished, the calculator is removed and the enclosing one is
//!   asked again as if the scope's last step had just completed.
//! - Running past the last step either completes the value or, for a recursion point,
//!   resumes the enclosing instance right after that point.
//!
//! Whenever the input runs dry the current decoder answers `Processing` and the whole
//! interpreter state (index, in-flight decoder, calculator stack, accumulator) stays as
//! is until the next call.

use crate::accumulator::ElementsAccumulator;
use crate::decoder::{DecodeError, DecodeState, Decoder};
use crate::input::DecoderInput;
use crate::step::{CompositionStepList, NextStepCalculator, StepDecoder, Transition};
use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// Default bound on simultaneously active scopes (repeats, optionals, recursion levels).
pub const DEFAULT_MAX_DEPTH: usize = 256;

/// Runtime limits for composed decoders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
    /// Maximum number of active scopes. Exceeding it fails with
    /// [`DecodeError::DepthLimit`].
    pub max_depth: usize,
}

impl EngineOptions {
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth.max(1);
        self
    }
}

impl Default for EngineOptions {
    fn default() -> Self {
        EngineOptions {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

enum Flow {
    Continue,
    Finished,
}

/// Decoder assembled from a composition.
///
/// Each instance is an independent decoding session over a shared, immutable step list.
/// After producing a value the session restarts on its own, ready for the next one.
pub struct ComposedDecoder<T> {
    steps: Arc<CompositionStepList>,
    options: EngineOptions,
    index: usize,
    current: StepDecoder,
    calculators: Vec<Box<dyn NextStepCalculator>>,
    accumulator: ElementsAccumulator,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Any + Send> ComposedDecoder<T> {
    pub(crate) fn new(steps: Arc<CompositionStepList>, options: EngineOptions) -> Self {
        let mut accumulator = ElementsAccumulator::new();
        let first = steps.get(0);
        let current = first.decoder(&mut accumulator);
        let calculators = first.calculator().into_iter().collect();
        ComposedDecoder {
            steps,
            options,
            index: 0,
            current,
            calculators,
            accumulator,
            _marker: PhantomData,
        }
    }

    /// A fresh session over the same step list.
    pub fn session(&self) -> Self {
        Self::new(Arc::clone(&self.steps), self.options)
    }

    /// Factory of fresh sessions, usable to nest this decoder in another composition.
    pub fn factory(&self) -> impl Fn() -> Self + Send + Sync + 'static {
        let steps = Arc::clone(&self.steps);
        let options = self.options;
        move || Self::new(Arc::clone(&steps), options)
    }

    pub fn options(&self) -> EngineOptions {
        self.options
    }

    fn restart(&mut self) {
        *self = self.session();
    }

    /// Arrive at step `index`: build its decoder and activate its scope, if any.
    fn enter(&mut self, index: usize) -> Result<(), DecodeError> {
        let step = self.steps.get(index);
        log::trace!("enter step {} `{}`", index, step.label());
        self.index = index;
        self.current = step.decoder(&mut self.accumulator);
        if let Some(calculator) = step.calculator() {
            if self.calculators.len() >= self.options.max_depth {
                log::debug!(
                    "scope depth limit {} reached at step {}",
                    self.options.max_depth,
                    index
                );
                return Err(DecodeError::DepthLimit(self.options.max_depth));
            }
            self.calculators.push(calculator);
        }
        Ok(())
    }

    /// Next index after step `current` completed, closing finished scopes on the way.
    fn transition(&mut self, mut current: usize) -> usize {
        loop {
            let Some(calculator) = self.calculators.last_mut() else {
                return current + 1;
            };
            let transition = calculator.compute_transition(current, &mut self.accumulator);
            let bounds = calculator.bounds();
            let next = match transition.kind {
                Transition::Increment => current + 1,
                Transition::GoTo(index) => index,
                Transition::Rewind => bounds.start + 1,
            };
            log::trace!("step {} -> {:?} (scope {:?})", current, transition, bounds);
            if !transition.pop {
                return next;
            }
            self.calculators.pop();
            log::debug!(
                "scope {}..={} finished, {} still active",
                bounds.start,
                bounds.end,
                self.calculators.len()
            );
            if self.calculators.is_empty() {
                return next;
            }
            current = bounds.end;
        }
    }

    fn advance(&mut self) -> Result<Flow, DecodeError> {
        let mut next = self.transition(self.index);
        loop {
            if next < self.steps.len() {
                self.enter(next)?;
                return Ok(Flow::Continue);
            }
            let Some(calculator) = self.calculators.last_mut() else {
                return Ok(Flow::Finished);
            };
            if calculator.on_finish(&mut self.accumulator) {
                return Ok(Flow::Finished);
            }
            let bounds = calculator.bounds();
            self.calculators.pop();
            log::trace!("nested instance at step {} complete", bounds.start);
            next = self.transition(bounds.end);
        }
    }
}

impl<T: Any + Send> Decoder for ComposedDecoder<T> {
    type Output = T;

    fn decode(&mut self, input: &mut dyn DecoderInput) -> DecodeState<T> {
        loop {
            let value = match self.current.decode(input) {
                DecodeState::Done(value) => value,
                DecodeState::Processing => return DecodeState::Processing,
                DecodeState::Error(e) => {
                    log::debug!("step {} failed: {}", self.index, e);
                    return DecodeState::Error(e);
                }
            };
            if self.steps.get(self.index).store_result() {
                self.accumulator.push_element(value);
            }
            match self.advance() {
                Ok(Flow::Continue) => {}
                Ok(Flow::Finished) => {
                    let result = self.accumulator.pop::<T>();
                    self.restart();
                    return DecodeState::Done(result);
                }
                Err(e) => return DecodeState::Error(e),
            }
        }
    }

    fn reset(&mut self) {
        log::debug!(
            "reset at step {} with {} active scopes",
            self.index,
            self.calculators.len()
        );
        self.current.reset();
        self.restart();
    }
}

/// Cloning yields a fresh session, not a copy of the in-flight state.
impl<T: Any + Send> Clone for ComposedDecoder<T> {
    fn clone(&self) -> Self {
        self.session()
    }
}

impl<T> fmt::Debug for ComposedDecoder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComposedDecoder")
            .field("steps", &self.steps.len())
            .field("index", &self.index)
            .field("scopes", &self.calculators.len())
            .field("accumulator", &self.accumulator)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::{BoolDecoder, U8Decoder};
    use crate::Composer;

    #[test]
    fn restarts_after_each_value() {
        let mut decoder = Composer::<u16>::begin_with(U8Decoder::default())
            .then(U8Decoder::default())
            .reduce2(|a: u8, b: u8| a as u16 + b as u16)
            .assemble();
        let mut input: &[u8] = &[1, 2, 3, 4];
        assert_eq!(decoder.decode(&mut input), DecodeState::Done(3));
        assert_eq!(decoder.decode(&mut input), DecodeState::Done(7));
        assert!(decoder.decode(&mut input).is_processing());
    }

    #[test]
    fn session_is_independent() {
        let mut first = Composer::<u8>::begin_with(U8Decoder::default())
            .then(U8Decoder::default())
            .reduce2(|a: u8, b: u8| a.wrapping_mul(b))
            .assemble();
        assert!(first.decode(&mut &[3u8][..]).is_processing());
        let mut second = first.session();
        assert_eq!(second.decode(&mut &[5u8, 6][..]), DecodeState::Done(30));
        assert_eq!(first.decode(&mut &[4u8][..]), DecodeState::Done(12));

        let mut third = first.clone();
        assert!(first.decode(&mut &[2u8][..]).is_processing());
        assert_eq!(third.decode(&mut &[7u8, 7][..]), DecodeState::Done(49));
    }

    #[test]
    fn recursion_depth_is_bounded() {
        #[derive(Debug)]
        struct Chain(Option<Box<Chain>>);

        let mut decoder = Composer::<Chain>::begin_with(U8Decoder::default())
            .then_itself_or_null(BoolDecoder)
            .reduce2(|_: u8, next: Option<Chain>| Chain(next.map(Box::new)))
            .assemble_with(EngineOptions::default().with_max_depth(3));

        // Three recursion points active at once fit.
        let ok = [0u8, 1, 0, 1, 0, 0];
        let chain = decoder.decode_all(&ok).expect("within limit");
        assert!(chain.0.is_some());

        let too_deep = [0u8, 1, 0, 1, 0, 1, 0, 0];
        assert_eq!(decoder.decode_all(&too_deep).err(), Some(DecodeError::DepthLimit(3)));
    }
}
