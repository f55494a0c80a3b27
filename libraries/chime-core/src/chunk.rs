//! Stream chunk inputs and PCM normalization
//!
//! A chunk is one discrete delivery of audio samples handed to the
//! streaming player, of arbitrary size and arrival timing. Three layouts
//! are accepted and normalized to canonical f32 samples in [-1.0, 1.0]:
//!
//! - `F32`: already-normalized float samples, passed through
//! - `I16`: signed 16-bit PCM, divided by 32768
//! - `Bytes`: raw little-endian 16-bit PCM, same normalization
//!
//! Any other binary framing fails with `UnsupportedFormat`.

use crate::error::{PlayerError, Result};

/// Divisor mapping i16 PCM onto [-1.0, 1.0]
pub const I16_SCALE: f32 = 32_768.0;

/// One delivery of audio samples in any accepted input layout
#[derive(Debug, Clone, PartialEq)]
pub enum StreamChunk {
    /// 32-bit float samples in [-1.0, 1.0]
    F32(Vec<f32>),
    /// Signed 16-bit PCM samples
    I16(Vec<i16>),
    /// Raw bytes interpreted as little-endian 16-bit PCM
    Bytes(Vec<u8>),
}

impl StreamChunk {
    /// Normalize the chunk into canonical f32 samples.
    ///
    /// # Errors
    /// `UnsupportedFormat` if a byte payload is not a whole number of
    /// 16-bit frames.
    pub fn into_samples(self) -> Result<Vec<f32>> {
        match self {
            Self::F32(samples) => Ok(samples),
            Self::I16(samples) => Ok(samples
                .into_iter()
                .map(|s| f32::from(s) / I16_SCALE)
                .collect()),
            Self::Bytes(bytes) => {
                if bytes.len() % 2 != 0 {
                    return Err(PlayerError::unsupported_format(format!(
                        "raw PCM payload of {} bytes is not a whole number of 16-bit samples",
                        bytes.len()
                    )));
                }
                Ok(bytes
                    .chunks_exact(2)
                    .map(|pair| f32::from(i16::from_le_bytes([pair[0], pair[1]])) / I16_SCALE)
                    .collect())
            }
        }
    }

    /// Whether the chunk carries no samples
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::F32(samples) => samples.is_empty(),
            Self::I16(samples) => samples.is_empty(),
            Self::Bytes(bytes) => bytes.is_empty(),
        }
    }
}

impl From<Vec<f32>> for StreamChunk {
    fn from(samples: Vec<f32>) -> Self {
        Self::F32(samples)
    }
}

impl From<Vec<i16>> for StreamChunk {
    fn from(samples: Vec<i16>) -> Self {
        Self::I16(samples)
    }
}

impl From<Vec<u8>> for StreamChunk {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn f32_passes_through() {
        let chunk = StreamChunk::F32(vec![0.1, -0.2, 0.3]);
        assert_eq!(chunk.into_samples().unwrap(), vec![0.1, -0.2, 0.3]);
    }

    #[test]
    fn i16_normalization() {
        let chunk = StreamChunk::I16(vec![0, 16_384, -16_384, i16::MAX, i16::MIN]);
        let samples = chunk.into_samples().unwrap();
        assert_eq!(samples[0], 0.0);
        assert_eq!(samples[1], 0.5);
        assert_eq!(samples[2], -0.5);
        assert_eq!(samples[3], 32_767.0 / 32_768.0);
        assert_eq!(samples[4], -1.0);
    }

    #[test]
    fn bytes_decode_little_endian() {
        // 16384 = 0x4000 little-endian, -16384 = 0xC000
        let chunk = StreamChunk::Bytes(vec![0x00, 0x40, 0x00, 0xC0]);
        let samples = chunk.into_samples().unwrap();
        assert_eq!(samples, vec![0.5, -0.5]);
    }

    #[test]
    fn odd_byte_length_rejected() {
        let chunk = StreamChunk::Bytes(vec![0x00, 0x40, 0x00]);
        let err = chunk.into_samples().unwrap_err();
        assert!(matches!(err, PlayerError::UnsupportedFormat(_)));
    }

    #[test]
    fn normalized_values_stay_in_range() {
        let all: Vec<i16> = vec![i16::MIN, -1, 0, 1, i16::MAX];
        let samples = StreamChunk::I16(all).into_samples().unwrap();
        for sample in samples {
            assert!((-1.0..=1.0).contains(&sample));
        }
    }

    #[test]
    fn from_impls() {
        assert!(matches!(StreamChunk::from(vec![0.0f32]), StreamChunk::F32(_)));
        assert!(matches!(StreamChunk::from(vec![0i16]), StreamChunk::I16(_)));
        assert!(matches!(StreamChunk::from(vec![0u8, 0]), StreamChunk::Bytes(_)));
    }
}
