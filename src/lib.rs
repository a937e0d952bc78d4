//! # stepdec: incremental, composable binary decoders
//!
//! Decoders for binary wire formats are assembled from small primitive decoders and
//! combined through a step-composition model. The assembled decoder is run by a
//! stack-based interpreter that suspends as soon as the input runs dry and resumes on
//! the next call without losing progress, so the same code works for a complete
//! in-memory buffer and for bytes trickling in from a socket.
//!
//! ## Building blocks
//!
//! - **Input**: [`DecoderInput`] is a non-blocking byte source (`&[u8]`, `BytesMut`,
//!   [`ReaderInput`]).
//! - **Decoders**: [`Decoder`] returns a [`DecodeState`]: `Done(value)`, `Processing`
//!   (needs more bytes) or `Error`. Primitive decoders live in [`primitives`].
//! - **Composition**: [`Composer`] records steps (`then`, `map`, `reduce`, `skip`,
//!   `repeat*`, `optional`, `then_itself_or_null`) and assembles a [`ComposedDecoder`].
//! - **Collectors**: [`Collector`] folds repeated elements into any container.
//!
//! ## Example
//!
//! ```
//! use stepdec::collector;
//! use stepdec::primitives::{utf8_string_with, U32Decoder, U8Decoder};
//! use stepdec::{Composer, DecodeState, Decoder};
//!
//! #[derive(Debug, PartialEq)]
//! struct Pet {
//!     name: String,
//!     age: u8,
//! }
//!
//! let mut decoder = Composer::<Vec<Pet>>::begin_with(utf8_string_with(U8Decoder::default()))
//!     .then(U8Decoder::default())
//!     .reduce2(|name, age| Pet { name, age })
//!     .repeat_prefixed(U32Decoder::default(), collector::to_vec::<Pet>())
//!     .assemble();
//!
//! let bytes = [0, 0, 0, 1, 3, b'R', b'e', b'x', 7];
//! // Feed the bytes in two chunks: the first call suspends, the second completes.
//! assert_eq!(decoder.decode(&mut &bytes[..5]), DecodeState::Processing);
//! let pets = decoder.decode(&mut &bytes[5..]);
//! assert_eq!(pets, DecodeState::Done(vec![Pet { name: "Rex".into(), age: 7 }]));
//! ```

pub mod accumulator;
mod calculator;
pub mod collector;
pub mod composer;
pub mod decoder;
pub mod engine;
pub mod input;
pub mod primitives;
pub mod repeat;
mod step;

pub use accumulator::ElementsAccumulator;
pub use collector::Collector;
pub use composer::{Composer, Reduction};
pub use decoder::{BoxDecoder, DecodeError, DecodeState, Decoder};
pub use engine::{ComposedDecoder, EngineOptions};
pub use input::{DecoderInput, ReaderInput};
pub use primitives::Endianness;
pub use repeat::RepeatDecoder;
