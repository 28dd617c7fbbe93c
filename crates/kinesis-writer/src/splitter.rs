// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Record splitting for raw byte writes.
//!
//! A single `write` may carry several log records back to back. A [`Splitter`]
//! turns that buffer into a lazy sequence of record slices, each of which is
//! forwarded to the buffer as its own Kinesis record.

/// Lazy sequence of records borrowed from one write.
pub type RecordSlices<'a> = Box<dyn Iterator<Item = &'a [u8]> + Send + 'a>;

/// Splits a raw write into record boundaries.
pub trait Splitter: Send + Sync {
    fn split<'a>(&self, data: &'a [u8]) -> RecordSlices<'a>;
}

/// Splits on `\n`, dropping one trailing `\r` per line.
///
/// Empty lines in the middle of the input are kept as empty records. A final
/// newline does not produce an extra empty record.
#[derive(Debug, Default, Clone, Copy)]
pub struct LineSplitter;

impl Splitter for LineSplitter {
    fn split<'a>(&self, data: &'a [u8]) -> RecordSlices<'a> {
        if data.is_empty() {
            return Box::new(std::iter::empty());
        }
        let data = data.strip_suffix(b"\n").unwrap_or(data);
        Box::new(
            data.split(|b| *b == b'\n')
                .map(|line| line.strip_suffix(b"\r").unwrap_or(line)),
        )
    }
}

/// Splits on runs of ASCII whitespace, never yielding empty records.
#[derive(Debug, Default, Clone, Copy)]
pub struct WordSplitter;

impl Splitter for WordSplitter {
    fn split<'a>(&self, data: &'a [u8]) -> RecordSlices<'a> {
        Box::new(
            data.split(u8::is_ascii_whitespace)
                .filter(|word| !word.is_empty()),
        )
    }
}

/// Splits on an arbitrary delimiter byte with the same trailing-delimiter rule
/// as [`LineSplitter`].
#[derive(Debug, Clone, Copy)]
pub struct DelimiterSplitter(pub u8);

impl Splitter for DelimiterSplitter {
    fn split<'a>(&self, data: &'a [u8]) -> RecordSlices<'a> {
        if data.is_empty() {
            return Box::new(std::iter::empty());
        }
        let delimiter = self.0;
        let data = data.strip_suffix(&[delimiter]).unwrap_or(data);
        Box::new(data.split(move |b| *b == delimiter))
    }
}
