//! Audio codec helpers
//!
//! All audio in this system is 16-bit signed little-endian mono PCM. The
//! carrier leg runs at 8 or 16 kHz; TTS providers return 16, 22.05 or 24 kHz
//! and are resampled down to the session rate before framing.

use std::io::Cursor;

use crate::error::{Error, Result};

/// Bytes per sample (16-bit PCM)
pub const BYTES_PER_SAMPLE: usize = 2;

/// Outbound media frames must be a multiple of this many bytes
pub const FRAME_ALIGN_BYTES: usize = 320;

/// Sample rates supported on the carrier leg
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize, Default)]
pub enum SampleRate {
    /// 8kHz - telephony narrowband
    #[default]
    Hz8000,
    /// 16kHz - telephony wideband
    Hz16000,
}

impl SampleRate {
    /// Get sample rate as u32
    pub fn as_u32(&self) -> u32 {
        match self {
            SampleRate::Hz8000 => 8000,
            SampleRate::Hz16000 => 16000,
        }
    }

    /// Parse a carrier-supplied rate; anything other than 8000/16000 is rejected
    pub fn from_u32(rate: u32) -> Option<Self> {
        match rate {
            8000 => Some(SampleRate::Hz8000),
            16000 => Some(SampleRate::Hz16000),
            _ => None,
        }
    }

    /// Outbound chunk size in bytes: 3200 at 8 kHz, 6400 at 16 kHz
    pub fn chunk_size_bytes(&self) -> usize {
        match self {
            SampleRate::Hz8000 => 3200,
            SampleRate::Hz16000 => 6400,
        }
    }

    /// Bytes of buffered inbound audio that trigger a turn (2 seconds)
    pub fn turn_trigger_bytes(&self) -> usize {
        self.as_u32() as usize * BYTES_PER_SAMPLE * 2
    }
}

/// Wrap raw 16-bit LE mono PCM in a 44-byte RIFF/WAVE header
pub fn pcm_to_wav(pcm: &[u8], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut buf = Vec::with_capacity(44 + pcm.len());
    {
        let mut writer = hound::WavWriter::new(Cursor::new(&mut buf), spec)
            .map_err(|e| Error::Audio(format!("WAV header: {}", e)))?;
        for sample in pcm.chunks_exact(2) {
            writer
                .write_sample(i16::from_le_bytes([sample[0], sample[1]]))
                .map_err(|e| Error::Audio(format!("WAV write: {}", e)))?;
        }
        writer
            .finalize()
            .map_err(|e| Error::Audio(format!("WAV finalize: {}", e)))?;
    }
    Ok(buf)
}

/// Linear-interpolation sample rate conversion.
///
/// Quality is adequate for the telephony band; the output length is
/// `in_samples * to_rate / from_rate` rounded down.
pub fn resample(pcm: &[u8], from_rate: u32, to_rate: u32) -> Vec<u8> {
    if from_rate == to_rate || pcm.len() < BYTES_PER_SAMPLE {
        return pcm.to_vec();
    }

    let samples: Vec<i16> = pcm
        .chunks_exact(2)
        .map(|c| i16::from_le_bytes([c[0], c[1]]))
        .collect();

    let ratio = to_rate as f64 / from_rate as f64;
    let out_len = (samples.len() as f64 * ratio) as usize;
    let mut out = Vec::with_capacity(out_len * BYTES_PER_SAMPLE);

    for i in 0..out_len {
        let src = i as f64 / ratio;
        let idx = src.floor() as usize;
        let next = (idx + 1).min(samples.len() - 1);
        let frac = src - idx as f64;

        let sample =
            (samples[idx] as f64 * (1.0 - frac) + samples[next] as f64 * frac).round() as i16;
        out.extend_from_slice(&sample.to_le_bytes());
    }

    out
}

/// Split PCM into fixed-size frames. The final frame may be shorter.
///
/// `chunk_size` must be a non-zero multiple of [`FRAME_ALIGN_BYTES`].
/// Concatenating the returned frames reproduces the input exactly.
pub fn chunk(pcm: &[u8], chunk_size: usize) -> Result<Vec<&[u8]>> {
    if chunk_size == 0 || chunk_size % FRAME_ALIGN_BYTES != 0 {
        return Err(Error::Audio(format!(
            "chunk size {} is not a multiple of {}",
            chunk_size, FRAME_ALIGN_BYTES
        )));
    }
    Ok(pcm.chunks(chunk_size).collect())
}

/// Fraction of samples whose absolute amplitude exceeds `threshold`
pub fn voiced_ratio(pcm: &[u8], threshold: i16) -> f32 {
    let total = pcm.len() / BYTES_PER_SAMPLE;
    if total == 0 {
        return 0.0;
    }
    let voiced = pcm
        .chunks_exact(2)
        .filter(|c| i16::from_le_bytes([c[0], c[1]]).unsigned_abs() > threshold.unsigned_abs())
        .count();
    voiced as f32 / total as f32
}

/// A buffer of PCM zeros covering `duration_ms` at the given rate
pub fn silence(sample_rate: u32, duration_ms: u64) -> Vec<u8> {
    let samples = (sample_rate as u64 * duration_ms / 1000) as usize;
    vec![0u8; samples * BYTES_PER_SAMPLE]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(samples: usize) -> Vec<u8> {
        (0..samples)
            .flat_map(|i| (((i % 100) as i16 - 50) * 200).to_le_bytes())
            .collect()
    }

    #[test]
    fn test_sample_rate_sizes() {
        assert_eq!(SampleRate::Hz8000.chunk_size_bytes(), 3200);
        assert_eq!(SampleRate::Hz16000.chunk_size_bytes(), 6400);
        assert_eq!(SampleRate::Hz8000.turn_trigger_bytes(), 32000);
        assert_eq!(SampleRate::Hz16000.turn_trigger_bytes(), 64000);
        assert!(SampleRate::from_u32(44100).is_none());
    }

    #[test]
    fn test_wav_header() {
        let pcm = tone(160);
        let wav = pcm_to_wav(&pcm, 8000).unwrap();

        assert_eq!(wav.len(), 44 + pcm.len());
        assert_eq!(&wav[..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        // Data payload is the original PCM
        assert_eq!(&wav[44..], &pcm[..]);
    }

    #[test]
    fn test_chunk_lossless() {
        let pcm = tone(4100); // not a multiple of the chunk size
        let chunks = chunk(&pcm, 3200).unwrap();

        let rejoined: Vec<u8> = chunks.iter().flat_map(|c| c.iter().copied()).collect();
        assert_eq!(rejoined, pcm);

        for (i, c) in chunks.iter().enumerate() {
            assert!(c.len() <= 3200);
            if i + 1 < chunks.len() {
                assert_eq!(c.len() % FRAME_ALIGN_BYTES, 0);
            }
        }
    }

    #[test]
    fn test_chunk_rejects_misaligned_size() {
        assert!(chunk(&[0u8; 640], 321).is_err());
        assert!(chunk(&[0u8; 640], 0).is_err());
    }

    #[test]
    fn test_resample_length() {
        let pcm = tone(2400); // 100ms at 24kHz
        let down = resample(&pcm, 24000, 8000);
        let in_samples = pcm.len() / 2;
        let out_samples = down.len() / 2;

        // |out/to - in/from| < 1 sample
        let drift = (out_samples as f64 / 8000.0 - in_samples as f64 / 24000.0).abs();
        assert!(drift < 1.0 / 8000.0);
    }

    #[test]
    fn test_resample_identity() {
        let pcm = tone(160);
        assert_eq!(resample(&pcm, 8000, 8000), pcm);
    }

    #[test]
    fn test_voiced_ratio() {
        assert_eq!(voiced_ratio(&silence(8000, 100), 100), 0.0);
        assert!(voiced_ratio(&tone(800), 100) > 0.5);
        assert_eq!(voiced_ratio(&[], 100), 0.0);
    }

    #[test]
    fn test_silence_duration() {
        assert_eq!(silence(8000, 1000).len(), 16000);
        assert_eq!(silence(16000, 100).len(), 3200);
    }
}
