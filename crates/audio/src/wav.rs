use std::io::Cursor;
use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};

use crate::AudioError;

const I16_SCALE: f32 = 32768.0;

/// Decode a WAV payload into mono f32 samples plus its sample rate.
/// Multi-channel audio is downmixed by averaging.
pub fn decode_wav(bytes: &[u8]) -> Result<(Vec<f32>, u32), AudioError> {
    let mut reader =
        WavReader::new(Cursor::new(bytes)).map_err(|e| AudioError::Decode(e.to_string()))?;
    let spec = reader.spec();

    let interleaved: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Float, 32) => reader
            .samples::<f32>()
            .collect::<Result<_, _>>()
            .map_err(|e| AudioError::Decode(e.to_string()))?,
        (SampleFormat::Int, 16) => reader
            .samples::<i16>()
            .map(|s| s.map(|v| v as f32 / I16_SCALE))
            .collect::<Result<_, _>>()
            .map_err(|e| AudioError::Decode(e.to_string()))?,
        (SampleFormat::Int, bits @ (24 | 32)) => {
            let scale = (1i64 << (bits - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()
                .map_err(|e| AudioError::Decode(e.to_string()))?
        }
        (format, bits) => {
            return Err(AudioError::Decode(format!(
                "unsupported sample format {format:?}/{bits}bit"
            )));
        }
    };

    if interleaved.is_empty() {
        return Err(AudioError::Empty);
    }

    let channels = spec.channels.max(1) as usize;
    let mono = if channels == 1 {
        interleaved
    } else {
        interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect()
    };

    Ok((mono, spec.sample_rate))
}

/// Plain linear-interpolation resampler. Speech headed for a lossy mux
/// does not warrant a polyphase kernel.
pub fn resample_linear(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }
    let ratio = from_rate as f64 / to_rate as f64;
    let out_len = ((samples.len() as f64) / ratio).round() as usize;
    (0..out_len)
        .map(|i| {
            let pos = i as f64 * ratio;
            let idx = pos as usize;
            let frac = (pos - idx as f64) as f32;
            let a = samples[idx.min(samples.len() - 1)];
            let b = samples[(idx + 1).min(samples.len() - 1)];
            a + (b - a) * frac
        })
        .collect()
}

/// Encode mono f32 samples as 16-bit PCM WAV bytes.
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> Vec<u8> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut cursor, spec).expect("in-memory wav writer");
        for &sample in samples {
            let scaled = (sample * I16_SCALE).clamp(-I16_SCALE, I16_SCALE - 1.0);
            writer.write_sample(scaled as i16).expect("in-memory wav write");
        }
        writer.finalize().expect("in-memory wav finalize");
    }
    cursor.into_inner()
}

pub fn write_wav_file(path: &Path, samples: &[f32], sample_rate: u32) -> Result<(), AudioError> {
    std::fs::write(path, encode_wav(samples, sample_rate))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_mono_i16() {
        let samples: Vec<f32> = (0..480).map(|i| (i as f32 / 480.0).sin() * 0.5).collect();
        let bytes = encode_wav(&samples, 24_000);
        let (decoded, rate) = decode_wav(&bytes).unwrap();
        assert_eq!(rate, 24_000);
        assert_eq!(decoded.len(), samples.len());
        for (a, b) in samples.iter().zip(&decoded) {
            assert!((a - b).abs() < 1.0 / I16_SCALE * 2.0);
        }
    }

    #[test]
    fn downmixes_stereo() {
        let spec = WavSpec {
            channels: 2,
            sample_rate: 16_000,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = WavWriter::new(&mut cursor, spec).unwrap();
            for _ in 0..100 {
                writer.write_sample(8000i16).unwrap();
                writer.write_sample(-8000i16).unwrap();
            }
            writer.finalize().unwrap();
        }
        let (mono, rate) = decode_wav(&cursor.into_inner()).unwrap();
        assert_eq!(rate, 16_000);
        assert_eq!(mono.len(), 100);
        assert!(mono.iter().all(|s| s.abs() < 1e-4));
    }

    #[test]
    fn resample_halves_and_doubles() {
        let samples = vec![0.0f32; 48_000];
        assert_eq!(resample_linear(&samples, 48_000, 24_000).len(), 24_000);
        assert_eq!(resample_linear(&samples, 24_000, 48_000).len(), 96_000);
    }

    #[test]
    fn rejects_garbage() {
        assert!(decode_wav(b"not a wav").is_err());
    }
}
