//! PCM WAV decoding into normalized floating-point signals.
//!
//! ## Normalization
//!
//! | Width | Stored as | Mapping |
//! |-------|-----------|---------|
//! | 1 byte | unsigned | `(x - 128) / 128` |
//! | 2 bytes | signed | `x / 32768` |
//! | 4 bytes | signed | `x / 2147483648` |
//!
//! The detection path accepts only these three widths. The planar loader used
//! for piece extraction additionally accepts 24-bit integer and 32-bit float
//! files, since it never feeds the threshold or detector stages.

pub mod metadata;
pub mod resample;

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use hound::{SampleFormat, WavReader};
use tracing::debug;

use crate::error::{QuietcutError, Result};

/// A mono-reduced, normalized signal ready for loudness analysis.
#[derive(Debug, Clone)]
pub struct Signal {
    /// Mono f32 samples in [-1.0, 1.0] (arithmetic mean across channels).
    pub samples: Vec<f32>,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Channel count of the source before mono reduction.
    pub channels: u16,
    /// Sample width of the source in bytes.
    pub sample_width: u16,
}

impl Signal {
    /// Number of sample frames (one per source frame, after mono reduction).
    pub fn frames(&self) -> usize {
        self.samples.len()
    }

    /// Duration rounded to the nearest millisecond.
    pub fn duration_ms(&self) -> u64 {
        duration_ms_for(self.samples.len(), self.sample_rate)
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Multi-channel audio kept channel-by-channel, used for piece extraction.
#[derive(Debug, Clone)]
pub struct PlanarAudio {
    /// One sample vector per channel, all the same length.
    pub channels: Vec<Vec<f32>>,
    pub sample_rate: u32,
}

impl PlanarAudio {
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Frames per channel.
    pub fn frames(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }
}

/// `round(frames / sample_rate * 1000)`, ties to even. Zero when the rate is zero.
pub fn duration_ms_for(frames: usize, sample_rate: u32) -> u64 {
    if sample_rate == 0 {
        return 0;
    }
    (frames as f64 / f64::from(sample_rate) * 1000.0).round_ties_even() as u64
}

/// Full-scale divisor for an integer sample width on the detection path.
fn detection_scale(sample_width: u16) -> Result<f32> {
    match sample_width {
        1 => Ok(128.0),
        2 => Ok(32_768.0),
        4 => Ok(2_147_483_648.0),
        other => Err(QuietcutError::UnsupportedFormat(format!(
            "sample width {other} bytes (supported: 1, 2, 4)"
        ))),
    }
}

/// Reads PCM WAV data into [`Signal`] / [`PlanarAudio`].
pub struct WaveformDecoder;

impl WaveformDecoder {
    /// Decode raw interleaved little-endian PCM frames.
    ///
    /// A trailing partial frame is dropped. Empty input yields an empty signal.
    ///
    /// # Errors
    /// - `UnsupportedFormat` for widths outside {1, 2, 4}.
    /// - `InvalidInput` for a zero channel count.
    pub fn decode_frames(
        raw: &[u8],
        sample_width: u16,
        channels: u16,
        sample_rate: u32,
    ) -> Result<Signal> {
        let scale = detection_scale(sample_width)?;
        if channels == 0 {
            return Err(QuietcutError::InvalidInput("channel count is zero".into()));
        }

        let width = usize::from(sample_width);
        let interleaved: Vec<f32> = raw
            .chunks_exact(width)
            .map(|b| {
                let v = match b.len() {
                    1 => i32::from(b[0]) - 128,
                    2 => i32::from(i16::from_le_bytes([b[0], b[1]])),
                    _ => i32::from_le_bytes([b[0], b[1], b[2], b[3]]),
                };
                v as f32 / scale
            })
            .collect();

        Ok(Signal {
            samples: mix_to_mono(&interleaved, usize::from(channels)),
            sample_rate,
            channels,
            sample_width,
        })
    }

    /// Decode a WAV stream for analysis (1/2/4-byte integer PCM only).
    pub fn read<R: Read>(reader: R) -> Result<Signal> {
        let mut wav = WavReader::new(reader)?;
        let spec = wav.spec();

        if spec.sample_format != SampleFormat::Int {
            return Err(QuietcutError::UnsupportedFormat(
                "floating-point WAV is not supported for analysis".into(),
            ));
        }
        let sample_width = spec.bits_per_sample.div_ceil(8);
        let scale = detection_scale(sample_width)?;
        if spec.channels == 0 {
            return Err(QuietcutError::InvalidInput("channel count is zero".into()));
        }

        // hound hands 8-bit data back already centred on zero.
        let interleaved = wav
            .samples::<i32>()
            .map(|s| s.map(|v| v as f32 / scale))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let samples = mix_to_mono(&interleaved, usize::from(spec.channels));
        debug!(
            frames = samples.len(),
            sample_rate = spec.sample_rate,
            channels = spec.channels,
            sample_width,
            "decoded signal"
        );

        Ok(Signal {
            samples,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            sample_width,
        })
    }

    /// Open a WAV file for analysis.
    pub fn open(path: &Path) -> Result<Signal> {
        Self::read(BufReader::new(open_existing(path)?))
    }

    /// Open a WAV file keeping every channel. Accepts 8/16/24/32-bit integer
    /// and 32-bit float PCM.
    pub fn open_planar(path: &Path) -> Result<PlanarAudio> {
        let mut wav = WavReader::new(BufReader::new(open_existing(path)?))?;
        let spec = wav.spec();
        let channels = usize::from(spec.channels);
        if channels == 0 {
            return Err(QuietcutError::InvalidInput("channel count is zero".into()));
        }

        let interleaved: Vec<f32> = match spec.sample_format {
            SampleFormat::Float => wav
                .samples::<f32>()
                .collect::<std::result::Result<Vec<_>, _>>()?,
            SampleFormat::Int => {
                let scale = match spec.bits_per_sample {
                    8 => 128.0,
                    16 => 32_768.0,
                    24 => 8_388_608.0,
                    32 => 2_147_483_648.0,
                    bits => {
                        return Err(QuietcutError::UnsupportedFormat(format!(
                            "{bits}-bit integer PCM"
                        )))
                    }
                };
                wav.samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / scale))
                    .collect::<std::result::Result<Vec<_>, _>>()?
            }
        };

        let frames = interleaved.len() / channels;
        let mut planar = vec![Vec::with_capacity(frames); channels];
        for frame in interleaved.chunks_exact(channels) {
            for (ch, &s) in frame.iter().enumerate() {
                planar[ch].push(s);
            }
        }

        Ok(PlanarAudio {
            channels: planar,
            sample_rate: spec.sample_rate,
        })
    }
}

fn open_existing(path: &Path) -> Result<File> {
    File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => QuietcutError::NotFound {
            path: path.to_path_buf(),
        },
        _ => QuietcutError::Io(e),
    })
}

/// Average interleaved frames into one channel. A trailing partial frame is dropped.
fn mix_to_mono(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels == 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().copied().sum::<f32>() / channels as f32)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::io::Cursor;

    fn wav_bytes(spec: hound::WavSpec, samples: &[i32]) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for &s in samples {
                match spec.bits_per_sample {
                    8 => writer.write_sample(s as i8).unwrap(),
                    16 => writer.write_sample(s as i16).unwrap(),
                    _ => writer.write_sample(s).unwrap(),
                }
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    fn int_spec(channels: u16, bits: u16) -> hound::WavSpec {
        hound::WavSpec {
            channels,
            sample_rate: 8_000,
            bits_per_sample: bits,
            sample_format: hound::SampleFormat::Int,
        }
    }

    #[test]
    fn unsigned_8bit_centres_on_128() {
        let sig = WaveformDecoder::decode_frames(&[128, 192, 0], 1, 1, 8_000).unwrap();
        assert_eq!(sig.samples, vec![0.0, 0.5, -1.0]);
    }

    #[test]
    fn signed_16bit_divides_by_32768() {
        let raw: Vec<u8> = [16_384i16, -32_768]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect();
        let sig = WaveformDecoder::decode_frames(&raw, 2, 1, 8_000).unwrap();
        assert_eq!(sig.samples, vec![0.5, -1.0]);
    }

    #[test]
    fn signed_32bit_divides_by_2_pow_31() {
        let raw = (1i32 << 30).to_le_bytes();
        let sig = WaveformDecoder::decode_frames(&raw, 4, 1, 8_000).unwrap();
        assert_relative_eq!(sig.samples[0], 0.5);
    }

    #[test]
    fn stereo_frames_average_to_mono() {
        let raw: Vec<u8> = [16_384i16, 0, -16_384, -16_384]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect();
        let sig = WaveformDecoder::decode_frames(&raw, 2, 2, 8_000).unwrap();
        assert_eq!(sig.samples, vec![0.25, -0.5]);
        assert_eq!(sig.channels, 2);
    }

    #[test]
    fn three_byte_width_is_unsupported() {
        let err = WaveformDecoder::decode_frames(&[0; 6], 3, 1, 8_000).unwrap_err();
        assert!(matches!(err, QuietcutError::UnsupportedFormat(_)));
    }

    #[test]
    fn empty_input_is_empty_signal() {
        let sig = WaveformDecoder::decode_frames(&[], 2, 1, 8_000).unwrap();
        assert!(sig.is_empty());
        assert_eq!(sig.duration_ms(), 0);
    }

    #[test]
    fn duration_rounds_frames_over_rate() {
        assert_eq!(duration_ms_for(8_000, 8_000), 1_000);
        assert_eq!(duration_ms_for(44_101, 44_100), 1_000);
        assert_eq!(duration_ms_for(12, 8_000), 2); // 1.5 ms, ties to even
        assert_eq!(duration_ms_for(100, 0), 0);
    }

    #[test]
    fn hound_reader_matches_raw_decoder() {
        let samples = [0, 8_192, -8_192, 32_767];
        let bytes = wav_bytes(int_spec(1, 16), &samples);
        let sig = WaveformDecoder::read(Cursor::new(bytes)).unwrap();

        let raw: Vec<u8> = samples
            .iter()
            .flat_map(|&v| (v as i16).to_le_bytes())
            .collect();
        let direct = WaveformDecoder::decode_frames(&raw, 2, 1, 8_000).unwrap();

        assert_eq!(sig.samples, direct.samples);
        assert_eq!(sig.sample_width, 2);
    }

    #[test]
    fn hound_reader_rejects_24bit_for_analysis() {
        let bytes = wav_bytes(int_spec(1, 24), &[0, 1, 2]);
        let err = WaveformDecoder::read(Cursor::new(bytes)).unwrap_err();
        assert!(matches!(err, QuietcutError::UnsupportedFormat(_)));
    }

    #[test]
    fn open_missing_file_is_not_found() {
        let err = WaveformDecoder::open(Path::new("/definitely/not/here.wav")).unwrap_err();
        assert!(matches!(err, QuietcutError::NotFound { .. }));
    }
}
