//! Decoder fuzz target: feed arbitrary bytes to a composed decoder with repeats,
//! optionals and recursion, whole and split in two at a position taken from the input.
//! Decoding must not panic, and both feeds must agree.
//! Build with: cargo fuzz run decoder_fuzz (requires nightly and cargo fuzz).

#![cfg_attr(fuzzing, no_main)]

#[cfg(fuzzing)]
use libfuzzer_sys::fuzz_target;

#[cfg(fuzzing)]
#[derive(Debug, PartialEq)]
struct Node {
    tag: u8,
    labels: Vec<String>,
    weight: Option<u16>,
    next: Option<Box<Node>>,
}

#[cfg(fuzzing)]
fn node_decoder() -> stepdec::ComposedDecoder<Node> {
    use stepdec::primitives::{utf8_string_with, BoolDecoder, U16Decoder, U8Decoder};
    use stepdec::{Composer, EngineOptions};

    let labels = Composer::<Vec<String>>::begin_with(utf8_string_with(U8Decoder::default()))
        .repeat_prefixed_vec::<String, _>(U8Decoder::default())
        .assemble();
    let weight = Composer::<Option<u16>>::begin_with(U16Decoder::default())
        .optional::<u16, _>(BoolDecoder)
        .assemble();

    Composer::<Node>::begin_with(U8Decoder::default())
        .then_with(labels.factory())
        .then_with(weight.factory())
        .then_itself_or_null(BoolDecoder)
        .reduce4(
            |tag: u8, labels: Vec<String>, weight: Option<u16>, next: Option<Node>| Node {
                tag,
                labels,
                weight,
                next: next.map(Box::new),
            },
        )
        .assemble_with(EngineOptions::default().with_max_depth(64))
}

#[cfg(fuzzing)]
fuzz_target!(|data: &[u8]| {
    use stepdec::{DecodeState, Decoder};

    let Some((&split, body)) = data.split_first() else {
        return;
    };
    let mut decoder = node_decoder();
    let whole = decoder.decode(&mut &body[..]);
    decoder.reset();
    let split = (split as usize).min(body.len());
    let split_result = match decoder.decode(&mut &body[..split]) {
        DecodeState::Processing => decoder.decode(&mut &body[split..]),
        other => other,
    };
    if let (DecodeState::Done(a), DecodeState::Done(b)) = (&whole, &split_result) {
        assert_eq!(a, b);
    }
});

#[cfg(not(fuzzing))]
fn main() {
    eprintln!("Build with: cargo fuzz run decoder_fuzz");
}
