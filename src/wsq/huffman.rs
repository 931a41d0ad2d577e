//! Huffman tables and the WSQ coefficient symbol alphabet.
//!
//! Tables are built from symbol frequencies with the code-size procedure
//! of ISO/IEC 10918-1 Annex K.2, limited to 16 bits. One reserved symbol
//! takes part in the construction and is dropped afterwards so that no
//! real symbol is assigned an all-ones code.

use crate::constants::{
    LITERAL_OFFSET, MAX_HUFFMAN_BITS, MAX_HUFFMAN_COEFFICIENT, MAX_HUFFMAN_COUNTS,
    MAX_HUFFMAN_ZERO_RUN, MAX_QUANTIZED_MAGNITUDE, MAX_ZERO_RUN_16, MIN_HUFFMAN_COEFFICIENT,
    SYMBOL_LITERAL_FIRST, SYMBOL_LITERAL_LAST, SYMBOL_NEGATIVE_8, SYMBOL_NEGATIVE_16,
    SYMBOL_POSITIVE_8, SYMBOL_POSITIVE_16, SYMBOL_ZERO_RUN_8, SYMBOL_ZERO_RUN_16,
};
use crate::error::WsqError;
use crate::wsq::bit_io::{WsqBitReader, WsqBitWriter};

/// Frequencies of the 256 symbols plus the reserved code point.
pub type SymbolCounts = [u32; MAX_HUFFMAN_COUNTS + 1];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HuffmanCode {
    pub value: u16,
    pub length: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HuffmanTable {
    /// Number of codes of each length 1..=16.
    pub bits: [u8; MAX_HUFFMAN_BITS],
    /// Symbols in code order.
    pub values: Vec<u8>,
    pub codes: [HuffmanCode; MAX_HUFFMAN_COUNTS],

    min_code: [i32; MAX_HUFFMAN_BITS],
    max_code: [i32; MAX_HUFFMAN_BITS],
    val_ptr: [i32; MAX_HUFFMAN_BITS],
}

impl HuffmanTable {
    /// Builds a table from the per-length counts and symbol list carried by
    /// a DHT segment.
    pub fn build_from_dht(bits: &[u8; MAX_HUFFMAN_BITS], values: &[u8]) -> Result<Self, WsqError> {
        let total: usize = bits.iter().map(|&n| usize::from(n)).sum();
        if total > MAX_HUFFMAN_COUNTS {
            return Err(WsqError::TooManyHuffmanValues { count: total });
        }
        if total != values.len() {
            return Err(WsqError::InvalidHuffmanCodeLengths {
                length: MAX_HUFFMAN_BITS,
            });
        }

        let mut table = Self {
            bits: *bits,
            values: values.to_vec(),
            codes: [HuffmanCode::default(); MAX_HUFFMAN_COUNTS],
            min_code: [0; MAX_HUFFMAN_BITS],
            max_code: [-1; MAX_HUFFMAN_BITS],
            val_ptr: [0; MAX_HUFFMAN_BITS],
        };

        let mut code = 0u32;
        let mut val_idx = 0usize;
        for i in 0..MAX_HUFFMAN_BITS {
            let n_codes = usize::from(bits[i]);
            if n_codes > 0 {
                if code + n_codes as u32 > 1u32 << (i + 1) {
                    return Err(WsqError::InvalidHuffmanCodeLengths { length: i + 1 });
                }
                table.val_ptr[i] = val_idx as i32;
                table.min_code[i] = code as i32;
                for _ in 0..n_codes {
                    table.codes[usize::from(values[val_idx])] = HuffmanCode {
                        value: code as u16,
                        length: (i + 1) as u8,
                    };
                    code += 1;
                    val_idx += 1;
                }
                table.max_code[i] = code as i32 - 1;
            }
            code <<= 1;
        }
        Ok(table)
    }

    /// Builds an optimal length-limited table for the given frequencies.
    ///
    /// The reserved entry `counts[256]` should be 1.
    pub fn from_frequencies(counts: &SymbolCounts) -> Result<Self, WsqError> {
        let code_sizes = code_sizes(counts);

        let mut size_counts = [0u32; MAX_HUFFMAN_COUNTS + 2];
        for &size in code_sizes.iter().filter(|&&size| size > 0) {
            size_counts[size] += 1;
        }
        limit_code_lengths(&mut size_counts);

        // Release the reserved code point, always the last of the longest codes.
        if let Some(longest) = (1..=MAX_HUFFMAN_BITS).rev().find(|&i| size_counts[i] > 0) {
            size_counts[longest] -= 1;
        }

        let mut bits = [0u8; MAX_HUFFMAN_BITS];
        for (i, count) in bits.iter_mut().enumerate() {
            *count = size_counts[i + 1] as u8;
        }

        let longest_size = code_sizes.iter().copied().max().unwrap_or(0);
        let mut values = Vec::new();
        for size in 1..=longest_size {
            for symbol in 0..MAX_HUFFMAN_COUNTS {
                if code_sizes[symbol] == size {
                    values.push(symbol as u8);
                }
            }
        }
        let total: usize = bits.iter().map(|&n| usize::from(n)).sum();
        values.truncate(total);

        Self::build_from_dht(&bits, &values)
    }

    /// Length of a code made only of 1-bits, if the table has one. Such a
    /// code can be confused with the 1-bit padding at the end of a block.
    pub fn all_ones_code(&self) -> Option<usize> {
        (0..MAX_HUFFMAN_BITS)
            .filter(|&i| self.bits[i] > 0)
            .find(|&i| self.max_code[i] == (1i32 << (i + 1)) - 1)
            .map(|i| i + 1)
    }

    /// Decodes the next symbol, or `None` once the block data ends at a marker.
    pub fn decode(&self, reader: &mut WsqBitReader) -> Result<Option<u8>, WsqError> {
        let mut code = 0i32;
        for i in 0..MAX_HUFFMAN_BITS {
            let Some(bit) = reader.read_bit()? else {
                return Ok(None);
            };
            code = (code << 1) | i32::from(bit);
            if code <= self.max_code[i] {
                let idx = self.val_ptr[i] + (code - self.min_code[i]);
                return Ok(Some(self.values[idx as usize]));
            }
        }
        Err(WsqError::InvalidHuffmanCode {
            position: reader.position(),
        })
    }
}

/// Code length for each symbol, zero for unused symbols (Annex K.2, Figure K.1).
fn code_sizes(counts: &SymbolCounts) -> Vec<usize> {
    let mut freq: Vec<u64> = counts.iter().map(|&c| u64::from(c)).collect();
    let mut code_size = vec![0usize; freq.len()];
    let mut others: Vec<Option<usize>> = vec![None; freq.len()];

    loop {
        // Least frequency, ties going to the highest symbol.
        let Some(mut v1) = least_frequent(&freq, None) else {
            break;
        };
        let Some(mut v2) = least_frequent(&freq, Some(v1)) else {
            break;
        };

        freq[v1] += freq[v2];
        freq[v2] = 0;

        code_size[v1] += 1;
        while let Some(next) = others[v1] {
            v1 = next;
            code_size[v1] += 1;
        }
        others[v1] = Some(v2);

        code_size[v2] += 1;
        while let Some(next) = others[v2] {
            v2 = next;
            code_size[v2] += 1;
        }
    }
    code_size
}

fn least_frequent(freq: &[u64], exclude: Option<usize>) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (symbol, &f) in freq.iter().enumerate() {
        if f == 0 || Some(symbol) == exclude {
            continue;
        }
        if best.is_none_or(|b| f <= freq[b]) {
            best = Some(symbol);
        }
    }
    best
}

/// Moves codes longer than 16 bits up the tree (Annex K.2, Figure K.3).
fn limit_code_lengths(size_counts: &mut [u32]) {
    for i in (MAX_HUFFMAN_BITS + 1..size_counts.len()).rev() {
        while size_counts[i] > 0 {
            let mut j = i - 2;
            while size_counts[j] == 0 {
                j -= 1;
            }
            size_counts[i] -= 2;
            size_counts[i - 1] += 1;
            size_counts[j + 1] += 2;
            size_counts[j] -= 1;
        }
    }
}

/// Walks the symbol stream for a run of coefficients, calling `emit` with
/// each symbol and its raw extra bits `(value, length)`.
fn for_each_symbol<F>(coefficients: &[i32], mut emit: F) -> Result<(), WsqError>
where
    F: FnMut(u8, u16, u8) -> Result<(), WsqError>,
{
    let mut run = 0u32;
    for &coefficient in coefficients {
        if coefficient == 0 {
            run += 1;
            if run == MAX_ZERO_RUN_16 {
                emit_zero_run(run, &mut emit)?;
                run = 0;
            }
            continue;
        }
        if run > 0 {
            emit_zero_run(run, &mut emit)?;
            run = 0;
        }

        // The quantizer caps magnitudes at what a 16-bit escape holds.
        let value = coefficient.clamp(-MAX_QUANTIZED_MAGNITUDE, MAX_QUANTIZED_MAGNITUDE);
        if value > MAX_HUFFMAN_COEFFICIENT {
            if value > 255 {
                emit(SYMBOL_POSITIVE_16, value as u16, 16)?;
            } else {
                emit(SYMBOL_POSITIVE_8, value as u16, 8)?;
            }
        } else if value < MIN_HUFFMAN_COEFFICIENT {
            let magnitude = value.unsigned_abs();
            if magnitude > 255 {
                emit(SYMBOL_NEGATIVE_16, magnitude as u16, 16)?;
            } else {
                emit(SYMBOL_NEGATIVE_8, magnitude as u16, 8)?;
            }
        } else {
            emit((value + LITERAL_OFFSET) as u8, 0, 0)?;
        }
    }
    if run > 0 {
        emit_zero_run(run, &mut emit)?;
    }
    Ok(())
}

fn emit_zero_run<F>(run: u32, emit: &mut F) -> Result<(), WsqError>
where
    F: FnMut(u8, u16, u8) -> Result<(), WsqError>,
{
    if run <= MAX_HUFFMAN_ZERO_RUN {
        emit(run as u8, 0, 0)
    } else if run <= 0xFF {
        emit(SYMBOL_ZERO_RUN_8, run as u16, 8)
    } else {
        emit(SYMBOL_ZERO_RUN_16, run as u16, 16)
    }
}

/// Adds the symbol frequencies of `coefficients` to `counts`.
pub fn count_symbols(coefficients: &[i32], counts: &mut SymbolCounts) {
    // Counting never fails.
    let _ = for_each_symbol(coefficients, |symbol, _, _| {
        counts[usize::from(symbol)] += 1;
        Ok(())
    });
}

/// Frequencies for a set of blocks coded with one table, with the reserved
/// code point set.
pub fn block_counts(blocks: &[&[i32]]) -> SymbolCounts {
    let mut counts = [0u32; MAX_HUFFMAN_COUNTS + 1];
    for block in blocks {
        count_symbols(block, &mut counts);
    }
    counts[MAX_HUFFMAN_COUNTS] = 1;
    counts
}

/// Entropy-codes one block of coefficients. The caller flushes the writer.
pub fn encode_block(
    coefficients: &[i32],
    table: &HuffmanTable,
    writer: &mut WsqBitWriter,
    block: usize,
) -> Result<(), WsqError> {
    for_each_symbol(coefficients, |symbol, extra, extra_length| {
        let code = table.codes[usize::from(symbol)];
        if code.length == 0 {
            return Err(WsqError::InvalidHuffmanSymbol { symbol, block });
        }
        writer.write_bits(code.value, code.length)?;
        writer.write_bits(extra, extra_length)
    })
}

/// Number of bits `encode_block` produces for `coefficients`, before
/// padding and zero stuffing.
pub fn encoded_bit_count(coefficients: &[i32], table: &HuffmanTable) -> u64 {
    let mut bits = 0u64;
    let _ = for_each_symbol(coefficients, |symbol, _, extra_length| {
        bits += u64::from(table.codes[usize::from(symbol)].length) + u64::from(extra_length);
        Ok(())
    });
    bits
}

/// Decodes coefficients until the block data ends at a marker, appending
/// them to `output`, which may hold at most `limit` coefficients in total.
pub fn decode_block(
    reader: &mut WsqBitReader,
    table: &HuffmanTable,
    output: &mut Vec<i32>,
    limit: usize,
    block: usize,
) -> Result<(), WsqError> {
    while let Some(symbol) = table.decode(reader)? {
        match symbol {
            1..=100 => push_zeros(output, usize::from(symbol), limit, block)?,
            SYMBOL_POSITIVE_8 => push_value(output, i32::from(reader.read_bits(8)?), limit, block)?,
            SYMBOL_NEGATIVE_8 => {
                push_value(output, -i32::from(reader.read_bits(8)?), limit, block)?
            }
            SYMBOL_POSITIVE_16 => {
                push_value(output, i32::from(reader.read_bits(16)?), limit, block)?
            }
            SYMBOL_NEGATIVE_16 => {
                push_value(output, -i32::from(reader.read_bits(16)?), limit, block)?
            }
            SYMBOL_ZERO_RUN_8 => {
                let run = usize::from(reader.read_bits(8)?);
                push_zeros(output, run, limit, block)?
            }
            SYMBOL_ZERO_RUN_16 => {
                let run = usize::from(reader.read_bits(16)?);
                push_zeros(output, run, limit, block)?
            }
            SYMBOL_LITERAL_FIRST..=SYMBOL_LITERAL_LAST => {
                push_value(output, i32::from(symbol) - LITERAL_OFFSET, limit, block)?
            }
            _ => return Err(WsqError::InvalidHuffmanSymbol { symbol, block }),
        }
    }
    Ok(())
}

fn push_zeros(
    output: &mut Vec<i32>,
    run: usize,
    limit: usize,
    block: usize,
) -> Result<(), WsqError> {
    if output.len() + run > limit {
        return Err(WsqError::CoefficientOverflow { block });
    }
    output.resize(output.len() + run, 0);
    Ok(())
}

fn push_value(
    output: &mut Vec<i32>,
    value: i32,
    limit: usize,
    block: usize,
) -> Result<(), WsqError> {
    if output.len() >= limit {
        return Err(WsqError::CoefficientOverflow { block });
    }
    output.push(value);
    Ok(())
}
