//! Whole-buffer sample-rate conversion using a rubato `FastFixedIn` resampler.
//!
//! ## Design
//!
//! Pieces are written at one fixed output rate (48 kHz by default) whatever the
//! source rate was. `RateConverter` converts an entire planar buffer in one
//! call: input is fed in `chunk_size` blocks (the last block zero-padded), the
//! resampler's output delay is dropped from the front, and the result is cut
//! to `round(frames * ratio)` so sample indices line up with the source timeline.
//!
//! When source rate == target rate, `RateConverter` is a passthrough: no
//! rubato session is created and `convert` hands the buffer back untouched.
//!
//! ## Usage
//!
//! ```ignore
//! let mut rc = RateConverter::new(44_100, 48_000, 1024, 2)?;
//! let out = rc.convert(planar.channels)?; // Vec<Vec<f32>> at 48 kHz
//! ```

use rubato::{FastFixedIn, PolynomialDegree, Resampler};

use crate::error::{QuietcutError, Result};

/// Converts planar f32 audio from one fixed sample rate to another.
pub struct RateConverter {
    /// `None` when source rate == target rate (passthrough mode).
    resampler: Option<FastFixedIn<f32>>,
    /// How many input frames rubato expects per process call.
    chunk_size: usize,
    channels: usize,
    ratio: f64,
    /// Pre-allocated output buffer: `[channels][output_frames_max]`.
    output_buf: Vec<Vec<f32>>,
}

impl RateConverter {
    /// Create a new converter.
    ///
    /// # Parameters
    /// - `source_rate`: Sample rate of the decoded audio (Hz).
    /// - `target_rate`: Sample rate of the written pieces (Hz).
    /// - `chunk_size`: Input frame count per rubato call (e.g. `1024`).
    /// - `channels`: Channel count, preserved through conversion.
    ///
    /// # Errors
    /// Returns `QuietcutError::Resample` if rubato fails to initialise.
    pub fn new(
        source_rate: u32,
        target_rate: u32,
        chunk_size: usize,
        channels: usize,
    ) -> Result<Self> {
        if source_rate == 0 || target_rate == 0 {
            return Err(QuietcutError::InvalidInput(format!(
                "sample rates must be positive (from={source_rate} to={target_rate})"
            )));
        }

        let ratio = f64::from(target_rate) / f64::from(source_rate);
        let channels = channels.max(1);
        let chunk_size = chunk_size.max(1);

        if source_rate == target_rate {
            return Ok(Self {
                resampler: None,
                chunk_size,
                channels,
                ratio,
                output_buf: Vec::new(),
            });
        }

        let resampler = FastFixedIn::<f32>::new(
            ratio,
            1.0, // fixed ratio
            PolynomialDegree::Cubic,
            chunk_size,
            channels,
        )
        .map_err(|e| QuietcutError::Resample(format!("resampler init: {e}")))?;

        let max_out = resampler.output_frames_max();
        let output_buf = vec![vec![0f32; max_out]; channels];

        tracing::info!(
            source_rate,
            target_rate,
            chunk_size,
            channels,
            "resampling enabled from={} to={}",
            source_rate,
            target_rate
        );

        Ok(Self {
            resampler: Some(resampler),
            chunk_size,
            channels,
            ratio,
            output_buf,
        })
    }

    /// Convert a complete planar buffer. Every input channel must have the
    /// same length; the converter must have been built for that channel count.
    pub fn convert(&mut self, input: Vec<Vec<f32>>) -> Result<Vec<Vec<f32>>> {
        if input.len() != self.channels {
            return Err(QuietcutError::InvalidInput(format!(
                "expected {} channels, got {}",
                self.channels,
                input.len()
            )));
        }

        let Some(ref mut resampler) = self.resampler else {
            return Ok(input);
        };

        let frames = input.first().map_or(0, Vec::len);
        if frames == 0 {
            return Ok(vec![Vec::new(); self.channels]);
        }

        let expected = (frames as f64 * self.ratio).round() as usize;
        let delay = resampler.output_delay();
        let wanted = expected + delay;

        let mut out: Vec<Vec<f32>> = vec![Vec::with_capacity(wanted); self.channels];
        let mut block = vec![vec![0f32; self.chunk_size]; self.channels];
        let mut pos = 0usize;

        while out[0].len() < wanted {
            for (dst, src) in block.iter_mut().zip(&input) {
                let end = (pos + self.chunk_size).min(frames);
                let take = end.saturating_sub(pos);
                if take > 0 {
                    dst[..take].copy_from_slice(&src[pos..end]);
                }
                dst[take..].fill(0.0);
            }

            let (_consumed, produced) = resampler
                .process_into_buffer(&block, &mut self.output_buf, None)
                .map_err(|e| QuietcutError::Resample(format!("resampler process: {e}")))?;

            for (dst, buf) in out.iter_mut().zip(&self.output_buf) {
                dst.extend_from_slice(&buf[..produced]);
            }
            pos += self.chunk_size;
        }

        for ch in &mut out {
            ch.drain(..delay.min(ch.len()));
            ch.truncate(expected);
        }
        resampler.reset();

        Ok(out)
    }

    /// Returns `true` when source rate == target rate (no resampling occurs).
    pub fn is_passthrough(&self) -> bool {
        self.resampler.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passthrough_identity() {
        let mut rc = RateConverter::new(48_000, 48_000, 1024, 1).unwrap();
        assert!(rc.is_passthrough());
        let samples: Vec<f32> = (0..480).map(|i| i as f32 * 0.001).collect();
        let out = rc.convert(vec![samples.clone()]).unwrap();
        assert_eq!(out, vec![samples]);
    }

    #[test]
    fn upsample_8k_to_48k_has_exact_length() {
        let mut rc = RateConverter::new(8_000, 48_000, 1024, 2).unwrap();
        assert!(!rc.is_passthrough());
        let input = vec![vec![0.1f32; 8_000], vec![-0.1f32; 8_000]];
        let out = rc.convert(input).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].len(), 48_000);
        assert_eq!(out[1].len(), 48_000);
    }

    #[test]
    fn downsample_keeps_dc_level() {
        let mut rc = RateConverter::new(48_000, 16_000, 960, 1).unwrap();
        let out = rc.convert(vec![vec![0.25f32; 9_600]]).unwrap();
        assert_eq!(out[0].len(), 3_200);
        // Away from the zero-padded tail a constant input stays constant.
        let mid = out[0][1_600];
        assert!((mid - 0.25).abs() < 1e-3, "mid={mid}");
    }

    #[test]
    fn empty_input_yields_empty_channels() {
        let mut rc = RateConverter::new(44_100, 48_000, 1024, 2).unwrap();
        let out = rc.convert(vec![Vec::new(), Vec::new()]).unwrap();
        assert_eq!(out, vec![Vec::<f32>::new(), Vec::new()]);
    }

    #[test]
    fn channel_mismatch_is_rejected() {
        let mut rc = RateConverter::new(44_100, 48_000, 1024, 2).unwrap();
        assert!(rc.convert(vec![vec![0.0; 10]]).is_err());
    }

    #[test]
    fn zero_rate_is_rejected() {
        assert!(RateConverter::new(0, 48_000, 1024, 1).is_err());
    }
}
