//! Primitive leaf decoders: fixed-width numbers, booleans, byte strings and UTF-8 text.
//!
//! Every decoder here buffers a partially received value internally, so it can be fed
//! one byte at a time. Numbers default to big-endian (network order); use
//! [`NumberDecoder::new`] with [`Endianness::Little`] for little-endian formats.
//!
//! | Decoder | Wire form |
//! |---------|-----------|
//! | [`NumberDecoder<T>`] | `size_of::<T>()` bytes |
//! | [`BoolDecoder`] | one byte, `0` or `1` |
//! | [`BytesDecoder`] | exactly `n` bytes |
//! | [`PrefixedBytesDecoder`] | length (any integer decoder), then that many bytes |
//! | [`TerminatedBytesDecoder`] | bytes up to an end marker, marker consumed and dropped |
//! | [`utf8_string`] | `i32` big-endian length, then UTF-8 bytes |

use crate::decoder::{DecodeError, DecodeState, Decoder, TryMapResult};
use crate::input::DecoderInput;
use byteorder::{BigEndian, ByteOrder, LittleEndian};
use std::fmt;
use std::marker::PhantomData;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Endianness {
    #[default]
    Big,
    Little,
}

/// Value read from a fixed number of bytes.
pub trait FixedWidth: Sized {
    const SIZE: usize;

    fn from_bytes(bytes: &[u8], endianness: Endianness) -> Self;
}

impl FixedWidth for u8 {
    const SIZE: usize = 1;

    fn from_bytes(bytes: &[u8], _endianness: Endianness) -> Self {
        bytes[0]
    }
}

impl FixedWidth for i8 {
    const SIZE: usize = 1;

    fn from_bytes(bytes: &[u8], _endianness: Endianness) -> Self {
        bytes[0] as i8
    }
}

macro_rules! fixed_width {
    ($ty:ty, $size:expr, $read:ident) => {
        impl FixedWidth for $ty {
            const SIZE: usize = $size;

            fn from_bytes(bytes: &[u8], endianness: Endianness) -> Self {
                match endianness {
                    Endianness::Big => BigEndian::$read(bytes),
                    Endianness::Little => LittleEndian::$read(bytes),
                }
            }
        }
    };
}

fixed_width!(u16, 2, read_u16);
fixed_width!(u32, 4, read_u32);
fixed_width!(u64, 8, read_u64);
fixed_width!(i16, 2, read_i16);
fixed_width!(i32, 4, read_i32);
fixed_width!(i64, 8, read_i64);
fixed_width!(f32, 4, read_f32);
fixed_width!(f64, 8, read_f64);

/// Integer usable as a length or count prefix.
pub trait LengthPrefix: TryInto<usize> + Copy + fmt::Display {}

impl<T: TryInto<usize> + Copy + fmt::Display> LengthPrefix for T {}

/// Convert a decoded length prefix, rejecting negative or oversized values.
pub fn to_length<V: LengthPrefix>(value: V) -> Result<usize, DecodeError> {
    value
        .try_into()
        .map_err(|_| DecodeError::InvalidLength(format!("length prefix {} is out of range", value)))
}

/// Decoder of one fixed-width number.
#[derive(Debug, Clone)]
pub struct NumberDecoder<T> {
    endianness: Endianness,
    buf: [u8; 8],
    filled: usize,
    _marker: PhantomData<fn() -> T>,
}

impl<T: FixedWidth> NumberDecoder<T> {
    pub fn new(endianness: Endianness) -> Self {
        NumberDecoder {
            endianness,
            buf: [0; 8],
            filled: 0,
            _marker: PhantomData,
        }
    }

    pub fn endianness(&self) -> Endianness {
        self.endianness
    }
}

impl<T: FixedWidth> Default for NumberDecoder<T> {
    fn default() -> Self {
        NumberDecoder::new(Endianness::Big)
    }
}

impl<T: FixedWidth> Decoder for NumberDecoder<T> {
    type Output = T;

    fn decode(&mut self, input: &mut dyn DecoderInput) -> DecodeState<T> {
        self.filled += input.read(&mut self.buf[self.filled..T::SIZE]);
        if self.filled < T::SIZE {
            return DecodeState::Processing;
        }
        self.filled = 0;
        DecodeState::Done(T::from_bytes(&self.buf[..T::SIZE], self.endianness))
    }

    fn reset(&mut self) {
        self.filled = 0;
    }
}

pub type U8Decoder = NumberDecoder<u8>;
pub type U16Decoder = NumberDecoder<u16>;
pub type U32Decoder = NumberDecoder<u32>;
pub type U64Decoder = NumberDecoder<u64>;
pub type I8Decoder = NumberDecoder<i8>;
pub type I16Decoder = NumberDecoder<i16>;
pub type I32Decoder = NumberDecoder<i32>;
pub type I64Decoder = NumberDecoder<i64>;
pub type F32Decoder = NumberDecoder<f32>;
pub type F64Decoder = NumberDecoder<f64>;

/// One byte, `0` for false and `1` for true.
#[derive(Debug, Clone, Copy, Default)]
pub struct BoolDecoder;

impl Decoder for BoolDecoder {
    type Output = bool;

    fn decode(&mut self, input: &mut dyn DecoderInput) -> DecodeState<bool> {
        match input.read_byte() {
            None => DecodeState::Processing,
            Some(0) => DecodeState::Done(false),
            Some(1) => DecodeState::Done(true),
            Some(other) => DecodeState::Error(DecodeError::Validation(format!(
                "invalid boolean byte 0x{:02x}",
                other
            ))),
        }
    }

    fn reset(&mut self) {}
}

/// Most bytes a byte-string decoder grows its buffer by before they have arrived.
const FILL_CHUNK: usize = 4096;

/// Read into `buf` until it holds `target` bytes. Returns whether it is full.
///
/// The buffer only grows by `FILL_CHUNK` ahead of the bytes actually read, so an
/// announced length costs nothing until its payload shows up.
fn fill(buf: &mut Vec<u8>, target: usize, input: &mut dyn DecoderInput) -> bool {
    while buf.len() < target {
        let start = buf.len();
        let want = (target - start).min(FILL_CHUNK);
        buf.resize(start + want, 0);
        let got = input.read(&mut buf[start..]);
        buf.truncate(start + got);
        if got < want {
            break;
        }
    }
    buf.len() == target
}

/// Exactly `len` raw bytes.
#[derive(Debug, Clone)]
pub struct BytesDecoder {
    len: usize,
    buf: Vec<u8>,
}

impl BytesDecoder {
    pub fn new(len: usize) -> Self {
        BytesDecoder {
            len,
            buf: Vec::new(),
        }
    }
}

impl Decoder for BytesDecoder {
    type Output = Vec<u8>;

    fn decode(&mut self, input: &mut dyn DecoderInput) -> DecodeState<Vec<u8>> {
        if !fill(&mut self.buf, self.len, input) {
            return DecodeState::Processing;
        }
        DecodeState::Done(std::mem::take(&mut self.buf))
    }

    fn reset(&mut self) {
        self.buf.clear();
    }
}

/// Length prefix decoded by `L`, then that many raw bytes.
#[derive(Debug, Clone)]
pub struct PrefixedBytesDecoder<L> {
    length: L,
    max_length: Option<usize>,
    expected: Option<usize>,
    buf: Vec<u8>,
}

impl<L> PrefixedBytesDecoder<L>
where
    L: Decoder,
    L::Output: LengthPrefix,
{
    pub fn new(length: L) -> Self {
        PrefixedBytesDecoder {
            length,
            max_length: None,
            expected: None,
            buf: Vec::new(),
        }
    }

    /// Reject prefixes announcing more than `max` bytes.
    pub fn with_max_length(mut self, max: usize) -> Self {
        self.max_length = Some(max);
        self
    }
}

impl<L> Decoder for PrefixedBytesDecoder<L>
where
    L: Decoder,
    L::Output: LengthPrefix,
{
    type Output = Vec<u8>;

    fn decode(&mut self, input: &mut dyn DecoderInput) -> DecodeState<Vec<u8>> {
        let expected = match self.expected {
            Some(expected) => expected,
            None => {
                let raw = match self.length.decode(input) {
                    DecodeState::Done(raw) => raw,
                    other => return other.cast_pending(),
                };
                let expected = match to_length(raw) {
                    Ok(expected) => expected,
                    Err(e) => return DecodeState::Error(e),
                };
                if let Some(max) = self.max_length {
                    if expected > max {
                        return DecodeState::Error(DecodeError::InvalidLength(format!(
                            "length {} exceeds maximum {}",
                            expected, max
                        )));
                    }
                }
                self.expected = Some(expected);
                expected
            }
        };
        if !fill(&mut self.buf, expected, input) {
            return DecodeState::Processing;
        }
        self.expected = None;
        DecodeState::Done(std::mem::take(&mut self.buf))
    }

    fn reset(&mut self) {
        self.length.reset();
        self.expected = None;
        self.buf.clear();
    }
}

/// Bytes up to (not including) an end marker. The marker is consumed.
#[derive(Debug, Clone)]
pub struct TerminatedBytesDecoder {
    marker: Vec<u8>,
    buf: Vec<u8>,
}

impl TerminatedBytesDecoder {
    /// # Panics
    ///
    /// Panics if `marker` is empty.
    pub fn new(marker: &[u8]) -> Self {
        assert!(!marker.is_empty(), "end marker must not be empty");
        TerminatedBytesDecoder {
            marker: marker.to_vec(),
            buf: Vec::new(),
        }
    }
}

impl Decoder for TerminatedBytesDecoder {
    type Output = Vec<u8>;

    fn decode(&mut self, input: &mut dyn DecoderInput) -> DecodeState<Vec<u8>> {
        // Byte at a time so nothing past the marker is consumed.
        while let Some(byte) = input.read_byte() {
            self.buf.push(byte);
            if self.buf.ends_with(&self.marker) {
                self.buf.truncate(self.buf.len() - self.marker.len());
                return DecodeState::Done(std::mem::take(&mut self.buf));
            }
        }
        DecodeState::Processing
    }

    fn reset(&mut self) {
        self.buf.clear();
    }
}

type Utf8Conversion = fn(Vec<u8>) -> Result<String, DecodeError>;

/// UTF-8 text over any byte-string decoder.
pub type Utf8Decoder<D> = TryMapResult<D, Utf8Conversion>;

fn bytes_to_string(bytes: Vec<u8>) -> Result<String, DecodeError> {
    String::from_utf8(bytes).map_err(|e| DecodeError::InvalidUtf8(e.utf8_error()))
}

/// Interpret the bytes produced by `decoder` as UTF-8.
pub fn utf8<D: Decoder<Output = Vec<u8>>>(decoder: D) -> Utf8Decoder<D> {
    decoder.try_map_result(bytes_to_string as Utf8Conversion)
}

/// UTF-8 string with a big-endian `i32` length prefix.
pub fn utf8_string() -> Utf8Decoder<PrefixedBytesDecoder<I32Decoder>> {
    utf8_string_with(I32Decoder::default())
}

/// UTF-8 string whose length prefix is read by `length`.
pub fn utf8_string_with<L>(length: L) -> Utf8Decoder<PrefixedBytesDecoder<L>>
where
    L: Decoder,
    L::Output: LengthPrefix,
{
    utf8(PrefixedBytesDecoder::new(length))
}

/// UTF-8 string terminated by `marker`, e.g. `b"\0"` for C strings.
pub fn utf8_terminated(marker: &[u8]) -> Utf8Decoder<TerminatedBytesDecoder> {
    utf8(TerminatedBytesDecoder::new(marker))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Feed `bytes` one at a time; every call but the last must be Processing.
    fn trickle<D: Decoder>(decoder: &mut D, bytes: &[u8]) -> DecodeState<D::Output> {
        for byte in &bytes[..bytes.len() - 1] {
            let mut input: &[u8] = std::slice::from_ref(byte);
            assert!(decoder.decode(&mut input).is_processing());
            assert!(input.is_empty());
        }
        decoder.decode(&mut &bytes[bytes.len() - 1..])
    }

    #[test]
    fn numbers_default_to_big_endian() {
        assert_eq!(U32Decoder::default().decode_all(&[0, 0, 1, 2]), Ok(0x0102));
        assert_eq!(I16Decoder::default().decode_all(&[0xff, 0xfe]), Ok(-2));
        assert_eq!(
            NumberDecoder::<u16>::new(Endianness::Little).decode_all(&[0x01, 0x02]),
            Ok(0x0201)
        );
        assert_eq!(F64Decoder::default().decode_all(&1.5f64.to_be_bytes()), Ok(1.5));
    }

    #[test]
    fn number_resumes_across_single_bytes() {
        let mut decoder = U64Decoder::default();
        assert_eq!(
            trickle(&mut decoder, &[0, 0, 0, 0, 0, 0, 1, 0]),
            DecodeState::Done(256)
        );
        // Ready for the next value without reset.
        assert_eq!(decoder.decode_all(&[0, 0, 0, 0, 0, 0, 0, 3]), Ok(3));
    }

    #[test]
    fn bool_rejects_other_bytes() {
        assert_eq!(BoolDecoder.decode_all(&[1]), Ok(true));
        assert!(matches!(
            BoolDecoder.decode_all(&[2]),
            Err(DecodeError::Validation(_))
        ));
    }

    #[test]
    fn prefixed_bytes_and_limits() {
        let mut decoder = PrefixedBytesDecoder::new(U8Decoder::default());
        assert_eq!(trickle(&mut decoder, &[2, 7, 8]), DecodeState::Done(vec![7, 8]));
        assert_eq!(decoder.decode_all(&[0]), Ok(vec![]));

        let mut limited = PrefixedBytesDecoder::new(U8Decoder::default()).with_max_length(1);
        assert!(matches!(
            limited.decode_all(&[2, 0, 0]),
            Err(DecodeError::InvalidLength(_))
        ));
    }

    #[test]
    fn announced_length_is_not_preallocated() {
        let mut decoder = PrefixedBytesDecoder::new(I32Decoder::default());
        let mut input: &[u8] = &[0x7f, 0xff, 0xff, 0xff, b'a'];
        assert!(decoder.decode(&mut input).is_processing());
        assert!(input.is_empty());
        assert_eq!(decoder.buf, vec![b'a']);
        assert!(decoder.buf.capacity() <= FILL_CHUNK);

        let mut decoder = PrefixedBytesDecoder::new(U64Decoder::default());
        assert!(decoder.decode(&mut &[0xff; 9][..]).is_processing());
        assert!(decoder.buf.capacity() <= FILL_CHUNK);
        decoder.reset();
        assert_eq!(decoder.decode_all(&[0, 0, 0, 0, 0, 0, 0, 1, 5]), Ok(vec![5]));
    }

    #[test]
    fn long_payload_arrives_in_one_call() {
        let len = FILL_CHUNK * 2 + 3;
        let mut bytes = (len as u32).to_be_bytes().to_vec();
        bytes.extend((0..len).map(|i| i as u8));
        let mut decoder = PrefixedBytesDecoder::new(U32Decoder::default());
        let decoded = decoder.decode_all(&bytes).expect("complete payload");
        assert_eq!(decoded.len(), len);
        assert_eq!(&decoded[..], &bytes[4..]);

        let mut fixed = BytesDecoder::new(len);
        assert!(fixed.decode(&mut &bytes[4..FILL_CHUNK]).is_processing());
        assert_eq!(
            fixed.decode(&mut &bytes[FILL_CHUNK..]),
            DecodeState::Done(bytes[4..].to_vec())
        );
    }

    #[test]
    fn negative_length_is_invalid() {
        let mut decoder = utf8_string();
        assert!(matches!(
            decoder.decode_all(&[0xff, 0xff, 0xff, 0xff]),
            Err(DecodeError::InvalidLength(_))
        ));
    }

    #[test]
    fn strings() {
        assert_eq!(
            utf8_string().decode_all(&[0, 0, 0, 2, b'h', b'i']),
            Ok("hi".to_string())
        );
        assert!(matches!(
            utf8_string_with(U8Decoder::default()).decode_all(&[1, 0xff]),
            Err(DecodeError::InvalidUtf8(_))
        ));
    }

    #[test]
    fn terminated_string_stops_at_marker() {
        let mut decoder = utf8_terminated(b"\r\n");
        let mut input: &[u8] = b"ab\rc\r\nrest";
        assert_eq!(decoder.decode(&mut input), DecodeState::Done("ab\rc".to_string()));
        assert_eq!(input, b"rest");
        assert_eq!(trickle(&mut decoder, b"x\r\n"), DecodeState::Done("x".to_string()));
    }

    #[test]
    fn fixed_bytes() {
        let mut decoder = BytesDecoder::new(3);
        assert_eq!(trickle(&mut decoder, &[1, 2, 3]), DecodeState::Done(vec![1, 2, 3]));
    }
}
