//! Minimal WAV container writer
//!
//! Raw PCM handed to a media element needs a self-describing container.
//! This module produces the canonical 44-byte RIFF/WAVE header (PCM format
//! tag, channel count, sample rate, byte rate, block align, bits per
//! sample, data length) followed by the little-endian payload. It also
//! generates the short silent asset the autoplay probe plays.

use crate::types::StreamFormat;

/// Length of the canonical PCM WAV header in bytes
pub const HEADER_LEN: usize = 44;

/// Bits per sample for the PCM payloads this module wraps
const BITS_PER_SAMPLE: u16 = 16;

/// PCM format tag in the `fmt ` chunk
const FORMAT_TAG_PCM: u16 = 1;

/// Wrap raw little-endian 16-bit PCM bytes in a WAV container
#[must_use]
pub fn wrap_pcm(pcm: &[u8], format: StreamFormat) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN + pcm.len());
    write_header(&mut out, format, pcm.len() as u32);
    out.extend_from_slice(pcm);
    out
}

/// Generate a silent WAV clip of the given duration.
///
/// The autoplay probe plays this through a throwaway element to test the
/// platform policy without making noise.
#[must_use]
pub fn silent_wav(duration_ms: u32, format: StreamFormat) -> Vec<u8> {
    let frames = format.sample_rate.as_hz() as u64 * u64::from(duration_ms) / 1000;
    let data_len = frames * u64::from(format.channels) * 2;
    let pcm = vec![0u8; data_len as usize];
    wrap_pcm(&pcm, format)
}

/// Whether `data` already carries a RIFF/WAVE header
#[must_use]
pub fn is_wav(data: &[u8]) -> bool {
    data.len() >= 12 && &data[0..4] == b"RIFF" && &data[8..12] == b"WAVE"
}

fn write_header(out: &mut Vec<u8>, format: StreamFormat, data_len: u32) {
    let channels = format.channels;
    let sample_rate = format.sample_rate.as_hz();
    let block_align = channels * BITS_PER_SAMPLE / 8;
    let byte_rate = sample_rate * u32::from(block_align);

    // RIFF chunk
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVE");

    // fmt chunk
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&FORMAT_TAG_PCM.to_le_bytes());
    out.extend_from_slice(&channels.to_le_bytes());
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&byte_rate.to_le_bytes());
    out.extend_from_slice(&block_align.to_le_bytes());
    out.extend_from_slice(&BITS_PER_SAMPLE.to_le_bytes());

    // data chunk
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SampleRate;

    fn u16_at(data: &[u8], offset: usize) -> u16 {
        u16::from_le_bytes([data[offset], data[offset + 1]])
    }

    fn u32_at(data: &[u8], offset: usize) -> u32 {
        u32::from_le_bytes([
            data[offset],
            data[offset + 1],
            data[offset + 2],
            data[offset + 3],
        ])
    }

    #[test]
    fn header_layout() {
        let format = StreamFormat::speech_mono();
        let pcm = vec![0u8; 320];
        let wav = wrap_pcm(&pcm, format);

        assert_eq!(wav.len(), HEADER_LEN + 320);
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(u32_at(&wav, 4), 36 + 320);
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(&wav[12..16], b"fmt ");
        assert_eq!(u32_at(&wav, 16), 16); // fmt chunk size
        assert_eq!(u16_at(&wav, 20), 1); // PCM format tag
        assert_eq!(u16_at(&wav, 22), 1); // channels
        assert_eq!(u32_at(&wav, 24), 16_000); // sample rate
        assert_eq!(u32_at(&wav, 28), 32_000); // byte rate
        assert_eq!(u16_at(&wav, 32), 2); // block align
        assert_eq!(u16_at(&wav, 34), 16); // bits per sample
        assert_eq!(&wav[36..40], b"data");
        assert_eq!(u32_at(&wav, 40), 320);
    }

    #[test]
    fn stereo_header_fields() {
        let format = StreamFormat::new(SampleRate::CD_QUALITY, 2);
        let wav = wrap_pcm(&[], format);
        assert_eq!(u16_at(&wav, 22), 2); // channels
        assert_eq!(u32_at(&wav, 24), 44_100);
        assert_eq!(u32_at(&wav, 28), 176_400); // 44100 * 2ch * 2 bytes
        assert_eq!(u16_at(&wav, 32), 4); // block align
    }

    #[test]
    fn silent_clip_is_zeroed() {
        let wav = silent_wav(100, StreamFormat::speech_mono());
        // 100ms at 16kHz mono 16-bit = 1600 frames * 2 bytes
        assert_eq!(wav.len(), HEADER_LEN + 3200);
        assert!(wav[HEADER_LEN..].iter().all(|&b| b == 0));
    }

    #[test]
    fn wav_detection() {
        let wav = silent_wav(10, StreamFormat::speech_mono());
        assert!(is_wav(&wav));
        assert!(!is_wav(b"RIFF"));
        assert!(!is_wav(&[0u8; 64]));
        assert!(!is_wav(b"OggS\x00\x00\x00\x00\x00\x00\x00\x00"));
    }

    #[test]
    fn payload_preserved() {
        let pcm: Vec<u8> = (0..=255).collect();
        let wav = wrap_pcm(&pcm, StreamFormat::default());
        assert_eq!(&wav[HEADER_LEN..], &pcm[..]);
    }
}
