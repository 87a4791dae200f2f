//! Raw word decoding.

use thiserror::Error;

use crate::register::Encoding;

/// A register map or response that cannot be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("{encoding} needs {expected} word(s), got {actual}")]
    WordCount {
        encoding: Encoding,
        expected: usize,
        actual: usize,
    },
    #[error("unknown data type '{0}' (use uint16, int16, uint32, int32, or float32)")]
    UnknownEncoding(String),
}

/// Decode big-endian register words into a numeric value.
///
/// Extra trailing words are ignored.
pub fn decode(words: &[u16], encoding: Encoding) -> Result<f64, DecodeError> {
    let expected = encoding.word_count() as usize;
    if words.len() < expected {
        return Err(DecodeError::WordCount {
            encoding,
            expected,
            actual: words.len(),
        });
    }

    let value = match encoding {
        Encoding::Uint16 => words[0] as f64,
        Encoding::Int16 => words[0] as i16 as f64,
        Encoding::Uint32 => join(words[0], words[1]) as f64,
        Encoding::Int32 => join(words[0], words[1]) as i32 as f64,
        Encoding::Float32 => f32::from_bits(join(words[0], words[1])) as f64,
    };

    Ok(value)
}

/// Encode a value into the words a device would report for it.
///
/// Out-of-range values saturate at the encoding's bounds.
pub fn encode(value: f64, encoding: Encoding) -> Vec<u16> {
    match encoding {
        Encoding::Uint16 => vec![value as u16],
        Encoding::Int16 => vec![value as i16 as u16],
        Encoding::Uint32 => split(value as u32).to_vec(),
        Encoding::Int32 => split(value as i32 as u32).to_vec(),
        Encoding::Float32 => split((value as f32).to_bits()).to_vec(),
    }
}

fn join(high: u16, low: u16) -> u32 {
    ((high as u32) << 16) | (low as u32)
}

fn split(bits: u32) -> [u16; 2] {
    [(bits >> 16) as u16, bits as u16]
}
