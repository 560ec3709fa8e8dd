//! Emulation prevention: removing and re-inserting `0x03` escape bytes.
//!
//! An encoder inserts `0x03` after any two zero bytes that would otherwise be
//! followed by a byte in `[0, 3]`, so the payload never contains something a
//! decoder could mistake for a start code. Bit-level parsing must happen on
//! the unescaped form, and the escapes must be restored before the unit is
//! written out again.

use crate::bits::BitArray;
use crate::nal::START_CODE;
use crate::{BitstreamError, Result};

const ESCAPE: u8 = 0x03;

/// Strip escape bytes and expand the payload into bits.
///
/// Bytes before `start` are copied unchanged and bytes from `end` on are
/// dropped; only `[start, end)` is scanned. An escape pending when the scan
/// reaches `end` is the cabac_zero_word terminator and is removed too.
pub fn remove_escapes(data: &[u8], start: usize, end: usize) -> BitArray {
    let end = end.min(data.len());
    let start = start.min(end);
    let escapes = escape_positions(&data[..end], start);

    let mut bits = BitArray::with_capacity((end - escapes.len()) * 8);
    let mut pending = escapes.iter().peekable();
    for (index, &byte) in data[..end].iter().enumerate() {
        if pending.peek() == Some(&&index) {
            pending.next();
            continue;
        }
        bits.push_byte(byte);
    }
    bits
}

/// Indices of the escape bytes in `data[start..]`.
fn escape_positions(data: &[u8], start: usize) -> Vec<usize> {
    let mut escapes = Vec::new();
    let mut zero_count = 0usize;
    let mut found = false;

    for (index, &byte) in data.iter().enumerate().skip(start) {
        if found && byte <= 3 {
            // the previous byte was inserted to break up a start-code emulation
            escapes.push(index - 1);
            found = false;
            zero_count = usize::from(byte == 0);
        } else if zero_count >= 2 && byte == ESCAPE {
            found = true;
            zero_count = 0;
        } else if byte == 0 {
            zero_count += 1;
        } else {
            if found {
                tracing::trace!(offset = index - 1, "escape byte not followed by 0..=3");
            }
            found = false;
            zero_count = 0;
        }
    }

    if found {
        escapes.push(data.len() - 1);
    }
    escapes
}

/// Check that every escape byte in `data` is followed by a byte in `[0, 3]`.
pub fn validate_escapes(data: &[u8]) -> Result<()> {
    let mut zero_count = 0usize;
    let mut index = 0;

    while index < data.len() {
        let byte = data[index];
        if zero_count >= 2 && byte == ESCAPE {
            match data.get(index + 1) {
                Some(&next) if next > 3 => {
                    return Err(BitstreamError::EscapeSequence { offset: index })
                }
                _ => {}
            }
            zero_count = 0;
        } else if zero_count >= 2 && byte < ESCAPE {
            // 00 00 00, 00 00 01 and 00 00 02 must never appear escaped
            return Err(BitstreamError::EscapeSequence { offset: index });
        } else if byte == 0 {
            zero_count += 1;
        } else {
            zero_count = 0;
        }
        index += 1;
    }
    Ok(())
}

/// Re-escape `bits` and prepend the four-byte start code.
///
/// `start` and `end` are byte indices into the packed bits. Bytes before
/// `start` are emitted without escaping. With `stop_after_end` the output
/// stops at byte `end`; otherwise bytes past `end` are copied through
/// unescaped. Returns the framed bytes and the number of escapes inserted.
pub fn insert_escapes_and_marker(
    bits: &BitArray,
    start: usize,
    end: usize,
    stop_after_end: bool,
) -> (Vec<u8>, usize) {
    let total = bits.byte_len();
    let data_size = if stop_after_end { end.min(total) } else { total };
    let range = data_size.min(end);

    let mut out = Vec::with_capacity(START_CODE.len() + data_size + data_size / 64 + 1);
    out.extend_from_slice(&START_CODE);

    let mut inserted = 0usize;
    let mut zero_count = 0usize;
    for index in 0..data_size {
        let byte = bits.byte(index);
        if index >= start && index < range {
            if zero_count >= 2 && byte <= 3 {
                out.push(ESCAPE);
                inserted += 1;
                zero_count = 0;
            }
            if byte == 0 {
                zero_count += 1;
            } else {
                zero_count = 0;
            }
        }
        out.push(byte);
    }

    // a trailing cabac_zero_word (00 00) is closed with an escape
    if range == data_size && range > start && zero_count >= 2 {
        out.push(ESCAPE);
        inserted += 1;
    }

    (out, inserted)
}
