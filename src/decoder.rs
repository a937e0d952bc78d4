//! The [`Decoder`] trait, its tri-state result and the generic adapters built on it.
//!
//! A decoder is a resumable state machine: each call to [`Decoder::decode`] consumes as
//! much input as it needs (and no more), then answers
//!
//! - [`DecodeState::Done`] with the value, after which the decoder is ready for the next
//!   value;
//! - [`DecodeState::Processing`] when the input ran dry, keeping every byte read so far;
//! - [`DecodeState::Error`] on malformed data. The decoder must be [`reset`](Decoder::reset)
//!   before it is used again.

use crate::input::DecoderInput;
use std::fmt;
use std::marker::PhantomData;

/// Reasons a decode attempt can fail on the data it was given.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DecodeError {
    #[error("Validation: {0}")]
    Validation(String),
    #[error("Invalid length: {0}")]
    InvalidLength(String),
    #[error("Invalid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),
    #[error("Unexpected end of input: {0}")]
    UnexpectedEnd(String),
    #[error("Nesting depth exceeds limit of {0}")]
    DepthLimit(usize),
    #[error("{0}")]
    Custom(String),
}

/// Outcome of one [`Decoder::decode`] call.
#[derive(Debug, Clone, PartialEq)]
#[must_use]
pub enum DecodeState<T> {
    Done(T),
    Processing,
    Error(DecodeError),
}

impl<T> DecodeState<T> {
    pub fn is_done(&self) -> bool {
        matches!(self, DecodeState::Done(_))
    }

    pub fn is_processing(&self) -> bool {
        matches!(self, DecodeState::Processing)
    }

    pub fn map<R>(self, f: impl FnOnce(T) -> R) -> DecodeState<R> {
        match self {
            DecodeState::Done(value) => DecodeState::Done(f(value)),
            DecodeState::Processing => DecodeState::Processing,
            DecodeState::Error(e) => DecodeState::Error(e),
        }
    }

    pub fn and_then<R>(self, f: impl FnOnce(T) -> DecodeState<R>) -> DecodeState<R> {
        match self {
            DecodeState::Done(value) => f(value),
            DecodeState::Processing => DecodeState::Processing,
            DecodeState::Error(e) => DecodeState::Error(e),
        }
    }

    /// Re-type a `Processing` or `Error` state.
    ///
    /// # Panics
    ///
    /// Panics on `Done`, whose value would be lost.
    pub fn cast_pending<R>(self) -> DecodeState<R> {
        match self {
            DecodeState::Processing => DecodeState::Processing,
            DecodeState::Error(e) => DecodeState::Error(e),
            DecodeState::Done(_) => panic!("cast_pending called on a Done state"),
        }
    }

    pub fn done(self) -> Option<T> {
        match self {
            DecodeState::Done(value) => Some(value),
            _ => None,
        }
    }

    /// Convert into a `Result`, treating `Processing` as a truncated input.
    pub fn into_result(self) -> Result<T, DecodeError> {
        match self {
            DecodeState::Done(value) => Ok(value),
            DecodeState::Processing => Err(DecodeError::UnexpectedEnd(
                "decoder needs more bytes".to_string(),
            )),
            DecodeState::Error(e) => Err(e),
        }
    }
}

impl<T> From<Result<T, DecodeError>> for DecodeState<T> {
    fn from(result: Result<T, DecodeError>) -> Self {
        match result {
            Ok(value) => DecodeState::Done(value),
            Err(e) => DecodeState::Error(e),
        }
    }
}

/// Boxed, type-erased decoder.
pub type BoxDecoder<T> = Box<dyn Decoder<Output = T> + Send>;

/// Resumable decoder of one value from a byte stream.
pub trait Decoder {
    type Output;

    fn decode(&mut self, input: &mut dyn DecoderInput) -> DecodeState<Self::Output>;

    /// Drop any partial progress so the next call starts a fresh value.
    fn reset(&mut self);

    /// Decode one value from a complete buffer.
    ///
    /// A buffer that ends before the value is complete yields
    /// [`DecodeError::UnexpectedEnd`]. The decoder is reset whenever no value is produced.
    fn decode_all(&mut self, mut bytes: &[u8]) -> Result<Self::Output, DecodeError> {
        let result = self.decode(&mut bytes).into_result();
        if result.is_err() {
            self.reset();
        }
        result
    }

    /// Transform the decoded value.
    fn map_result<R, F>(self, f: F) -> MapResult<Self, F>
    where
        Self: Sized,
        F: FnMut(Self::Output) -> R,
    {
        MapResult { inner: self, f }
    }

    /// Transform the decoded value with a conversion that may reject it.
    fn try_map_result<R, F>(self, f: F) -> TryMapResult<Self, F>
    where
        Self: Sized,
        F: FnMut(Self::Output) -> Result<R, DecodeError>,
    {
        TryMapResult { inner: self, f }
    }

    /// Decode a value, then decode with the decoder built from it.
    fn and_then<N, F>(self, f: F) -> AndThen<Self, N, F>
    where
        Self: Sized,
        N: Decoder,
        F: FnMut(Self::Output) -> N,
    {
        AndThen {
            first: self,
            f,
            next: None,
        }
    }

    /// Decode a value, then one with `other`, yielding both as a pair.
    fn and<N>(self, other: N) -> Pair<Self, N>
    where
        Self: Sized,
        N: Decoder,
    {
        Pair {
            first: self,
            second: other,
            left: None,
        }
    }

    /// Decode a value, then discard the `n` bytes that follow it.
    fn skip_after(self, n: usize) -> SkipAfter<Self>
    where
        Self: Sized,
    {
        SkipAfter {
            inner: self,
            amount: n,
            remaining: n,
            value: None,
        }
    }

    fn boxed(self) -> BoxDecoder<Self::Output>
    where
        Self: Sized + Send + 'static,
    {
        Box::new(self)
    }
}

impl<D: Decoder + ?Sized> Decoder for Box<D> {
    type Output = D::Output;

    fn decode(&mut self, input: &mut dyn DecoderInput) -> DecodeState<Self::Output> {
        (**self).decode(input)
    }

    fn reset(&mut self) {
        (**self).reset()
    }
}

/// See [`Decoder::map_result`].
#[derive(Debug, Clone)]
pub struct MapResult<D, F> {
    inner: D,
    f: F,
}

impl<D, F, R> Decoder for MapResult<D, F>
where
    D: Decoder,
    F: FnMut(D::Output) -> R,
{
    type Output = R;

    fn decode(&mut self, input: &mut dyn DecoderInput) -> DecodeState<R> {
        self.inner.decode(input).map(&mut self.f)
    }

    fn reset(&mut self) {
        self.inner.reset()
    }
}

/// See [`Decoder::try_map_result`].
#[derive(Debug, Clone)]
pub struct TryMapResult<D, F> {
    inner: D,
    f: F,
}

impl<D, F, R> Decoder for TryMapResult<D, F>
where
    D: Decoder,
    F: FnMut(D::Output) -> Result<R, DecodeError>,
{
    type Output = R;

    fn decode(&mut self, input: &mut dyn DecoderInput) -> DecodeState<R> {
        let f = &mut self.f;
        self.inner.decode(input).and_then(|value| f(value).into())
    }

    fn reset(&mut self) {
        self.inner.reset()
    }
}

/// See [`Decoder::and_then`].
pub struct AndThen<D, N, F> {
    first: D,
    f: F,
    next: Option<N>,
}

impl<D: Clone, N: Clone, F: Clone> Clone for AndThen<D, N, F> {
    fn clone(&self) -> Self {
        AndThen {
            first: self.first.clone(),
            f: self.f.clone(),
            next: self.next.clone(),
        }
    }
}

impl<D, N, F> Decoder for AndThen<D, N, F>
where
    D: Decoder,
    N: Decoder,
    F: FnMut(D::Output) -> N,
{
    type Output = N::Output;

    fn decode(&mut self, input: &mut dyn DecoderInput) -> DecodeState<N::Output> {
        loop {
            match &mut self.next {
                Some(next) => {
                    let state = next.decode(input);
                    if state.is_done() {
                        self.next = None;
                    }
                    return state;
                }
                None => match self.first.decode(input) {
                    DecodeState::Done(value) => self.next = Some((self.f)(value)),
                    other => return other.cast_pending(),
                },
            }
        }
    }

    fn reset(&mut self) {
        self.first.reset();
        self.next = None;
    }
}

/// See [`Decoder::and`].
pub struct Pair<A: Decoder, B> {
    first: A,
    second: B,
    left: Option<A::Output>,
}

impl<A, B> Clone for Pair<A, B>
where
    A: Decoder + Clone,
    A::Output: Clone,
    B: Clone,
{
    fn clone(&self) -> Self {
        Pair {
            first: self.first.clone(),
            second: self.second.clone(),
            left: self.left.clone(),
        }
    }
}

impl<A: Decoder, B: Decoder> Decoder for Pair<A, B> {
    type Output = (A::Output, B::Output);

    fn decode(&mut self, input: &mut dyn DecoderInput) -> DecodeState<Self::Output> {
        let left = match self.left.take() {
            Some(left) => left,
            None => match self.first.decode(input) {
                DecodeState::Done(left) => left,
                other => return other.cast_pending(),
            },
        };
        match self.second.decode(input) {
            DecodeState::Done(right) => DecodeState::Done((left, right)),
            DecodeState::Processing => {
                self.left = Some(left);
                DecodeState::Processing
            }
            DecodeState::Error(e) => DecodeState::Error(e),
        }
    }

    fn reset(&mut self) {
        self.first.reset();
        self.second.reset();
        self.left = None;
    }
}

/// See [`Decoder::skip_after`].
pub struct SkipAfter<D: Decoder> {
    inner: D,
    amount: usize,
    remaining: usize,
    value: Option<D::Output>,
}

impl<D> Clone for SkipAfter<D>
where
    D: Decoder + Clone,
    D::Output: Clone,
{
    fn clone(&self) -> Self {
        SkipAfter {
            inner: self.inner.clone(),
            amount: self.amount,
            remaining: self.remaining,
            value: self.value.clone(),
        }
    }
}

impl<D: Decoder> Decoder for SkipAfter<D> {
    type Output = D::Output;

    fn decode(&mut self, input: &mut dyn DecoderInput) -> DecodeState<D::Output> {
        let value = match self.value.take() {
            Some(value) => value,
            None => match self.inner.decode(input) {
                DecodeState::Done(value) => value,
                other => return other.cast_pending(),
            },
        };
        self.remaining -= input.skip(self.remaining);
        if self.remaining > 0 {
            self.value = Some(value);
            return DecodeState::Processing;
        }
        self.remaining = self.amount;
        DecodeState::Done(value)
    }

    fn reset(&mut self) {
        self.inner.reset();
        self.remaining = self.amount;
        self.value = None;
    }
}

/// Produces a fixed value without consuming input.
#[derive(Debug, Clone)]
pub struct ConstantDecoder<T> {
    value: T,
}

impl<T: Clone> ConstantDecoder<T> {
    pub fn new(value: T) -> Self {
        ConstantDecoder { value }
    }
}

impl<T: Clone> Decoder for ConstantDecoder<T> {
    type Output = T;

    fn decode(&mut self, _input: &mut dyn DecoderInput) -> DecodeState<T> {
        DecodeState::Done(self.value.clone())
    }

    fn reset(&mut self) {}
}

/// Always fails; placeholder for branches of a format that must never be taken.
pub struct NothingDecoder<T> {
    message: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T> NothingDecoder<T> {
    pub fn new(message: impl Into<String>) -> Self {
        NothingDecoder {
            message: message.into(),
            _marker: PhantomData,
        }
    }
}

impl<T> Clone for NothingDecoder<T> {
    fn clone(&self) -> Self {
        NothingDecoder::new(self.message.clone())
    }
}

impl<T> fmt::Debug for NothingDecoder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NothingDecoder")
            .field("message", &self.message)
            .finish()
    }
}

impl<T> Decoder for NothingDecoder<T> {
    type Output = T;

    fn decode(&mut self, _input: &mut dyn DecoderInput) -> DecodeState<T> {
        DecodeState::Error(DecodeError::Custom(self.message.clone()))
    }

    fn reset(&mut self) {}
}
