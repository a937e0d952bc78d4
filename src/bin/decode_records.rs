//! Decode a stream of record lists and print every record.
//!
//! Each message is a big-endian u32 record count followed by that many records:
//! first name and last name (u8 length + UTF-8 bytes), then age and height (one byte each).
//!
//! Usage:
//!   decode_records [OPTIONS] [FILE]
//!   decode_records < records.bin
//!
//! Options:
//!   --chunk N, -c N  Feed the decoder N bytes at a time instead of streaming from the reader
//!   --hex, -x        Input is hex text (whitespace ignored) instead of raw bytes
//!
//! If no file is given, reads from stdin.

use anyhow::{bail, Context};
use stepdec::primitives::{utf8_string_with, U32Decoder, U8Decoder};
use stepdec::{ComposedDecoder, Composer, DecodeState, Decoder, ReaderInput};
use std::fs::File;
use std::io::{self, Read};

#[derive(Debug)]
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

fn print_message(index: usize, records: &[Record]) {
    println!("message {} ({} records)", index, records.len());
    for r in records {
        println!(
            "  {} {}, age {}, height {}",
            r.first_name, r.last_name, r.age, r.height
        );
    }
}

fn parse_hex(text: &str) -> anyhow::Result<Vec<u8>> {
    let digits: Vec<u8> = text.bytes().filter(|b| !b.is_ascii_whitespace()).collect();
    if digits.len() % 2 != 0 {
        bail!("hex input has an odd number of digits");
    }
    digits
        .chunks(2)
        .map(|pair| -> anyhow::Result<u8> {
            let s = std::str::from_utf8(pair)?;
            u8::from_str_radix(s, 16).with_context(|| format!("invalid hex byte {:?}", s))
        })
        .collect()
}

fn take_value(args: &mut Vec<String>, names: &[&str]) -> anyhow::Result<Option<String>> {
    let Some(pos) = args.iter().position(|a| names.contains(&a.as_str())) else {
        return Ok(None);
    };
    args.remove(pos);
    if pos >= args.len() {
        bail!("{} expects a value", names[0]);
    }
    Ok(Some(args.remove(pos)))
}

fn main() -> anyhow::Result<()> {
    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let chunk = match take_value(&mut args, &["--chunk", "-c"])? {
        Some(n) => {
            let n: usize = n.parse().with_context(|| format!("invalid chunk size {:?}", n))?;
            if n == 0 {
                bail!("chunk size must be at least 1");
            }
            Some(n)
        }
        None => None,
    };
    let hex = if let Some(pos) = args.iter().position(|a| a == "--hex" || a == "-x") {
        args.remove(pos);
        true
    } else {
        false
    };
    if args.len() > 1 {
        bail!("expected at most one input file, got {}", args.len());
    }

    let reader: Box<dyn Read> = match args.first() {
        Some(path) => Box::new(File::open(path).with_context(|| format!("open {}", path))?),
        None => Box::new(io::stdin()),
    };

    let mut decoder = record_list_decoder();
    let mut messages = 0usize;

    if chunk.is_some() || hex {
        let mut raw = Vec::new();
        let mut reader = reader;
        reader.read_to_end(&mut raw)?;
        let bytes = if hex {
            parse_hex(&String::from_utf8(raw).context("hex input is not text")?)?
        } else {
            raw
        };
        let size = chunk.unwrap_or(bytes.len().max(1));
        let mut pending = false;
        for piece in bytes.chunks(size) {
            let mut input = piece;
            loop {
                match decoder.decode(&mut input) {
                    DecodeState::Done(records) => {
                        print_message(messages, &records);
                        messages += 1;
                        pending = false;
                    }
                    DecodeState::Processing => {
                        pending = true;
                        break;
                    }
                    DecodeState::Error(e) => bail!("message {}: {}", messages, e),
                }
                if input.is_empty() {
                    break;
                }
            }
        }
        if pending {
            bail!("input ends inside message {}", messages);
        }
    } else {
        let mut input = ReaderInput::new(reader);
        loop {
            match decoder.decode(&mut input) {
                DecodeState::Done(records) => {
                    print_message(messages, &records);
                    messages += 1;
                }
                DecodeState::Processing => break,
                DecodeState::Error(e) => bail!("message {}: {}", messages, e),
            }
        }
        if let Some(e) = input.take_error() {
            return Err(e).context("read failed");
        }
    }

    eprintln!("decoded {} message(s)", messages);
    Ok(())
}
