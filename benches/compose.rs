//! Benchmark: decode a list of 1000 records with a composed decoder, from one buffer,
//! from 64-byte chunks and one byte at a time; plus a standalone repeat of u32 values.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use stepdec::primitives::{utf8_string_with, U32Decoder, U8Decoder};
use stepdec::{collector, ComposedDecoder, Composer, DecodeState, Decoder, RepeatDecoder};

struct Record {
    first_name: String,
    last_name: String,
    age: u8,
    height: u8,
}

fn record_list_decoder() -> ComposedDecoder<Vec<Record>> {
    Composer::<Vec<Record>>::begin_with(utf8_string_with(U8Decoder::default()))
        .then(utf8_string_with(U8Decoder::default()))
        .then(U8Decoder::default())
        .then(U8Decoder::default())
        .reduce4(|first_name: String, last_name: String, age: u8, height: u8| Record {
            first_name,
            last_name,
            age,
            height,
        })
        .repeat_prefixed_vec::<Record, _>(U32Decoder::default())
        .assemble()
}

fn record_list_bytes(count: u32) -> Vec<u8> {
    let mut bytes = count.to_be_bytes().to_vec();
    for i in 0..count {
        let first = format!("first{}", i);
        let last = format!("last{}", i);
        for name in [&first, &last] {
            bytes.push(name.len() as u8);
            bytes.extend_from_slice(name.as_bytes());
        }
        bytes.push((i % 100) as u8);
        bytes.push((150 + i % 50) as u8);
    }
    bytes
}

fn decode_chunked(decoder: &mut ComposedDecoder<Vec<Record>>, bytes: &[u8], size: usize) -> usize {
    for chunk in bytes.chunks(size) {
        let mut input = chunk;
        match decoder.decode(&mut input) {
            DecodeState::Done(records) => {
                let sum: usize = records
                    .iter()
                    .map(|r| r.first_name.len() + r.last_name.len() + r.age as usize + r.height as usize)
                    .sum();
                return sum;
            }
            DecodeState::Processing => {}
            DecodeState::Error(e) => panic!("decode error: {}", e),
        }
    }
    panic!("record list incomplete");
}

fn bench_compose(c: &mut Criterion) {
    let bytes = record_list_bytes(1000);
    let mut decoder = record_list_decoder();

    c.bench_function("records_whole_buffer", |b| {
        b.iter(|| decode_chunked(&mut decoder, black_box(&bytes), bytes.len()))
    });
    c.bench_function("records_chunks_64", |b| {
        b.iter(|| decode_chunked(&mut decoder, black_box(&bytes), 64))
    });
    c.bench_function("records_byte_at_a_time", |b| {
        b.iter(|| decode_chunked(&mut decoder, black_box(&bytes), 1))
    });

    let mut numbers = 4096u32.to_be_bytes().to_vec();
    for i in 0..4096u32 {
        numbers.extend_from_slice(&i.to_be_bytes());
    }
    let mut repeat = RepeatDecoder::prefixed(
        U32Decoder::default(),
        U32Decoder::default(),
        collector::to_vec(),
    );
    c.bench_function("repeat_u32_4096", |b| {
        b.iter(|| repeat.decode_all(black_box(&numbers)).map(|v| v.len()))
    });
}

criterion_group!(benches, bench_compose);
criterion_main!(benches);
