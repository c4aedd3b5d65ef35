//! Fixed-window loudness classification and silent-run coalescing.
//!
//! ## Algorithm
//!
//! 1. Split the signal into back-to-back windows of `hop` samples
//!    (window length == hop). The final window is zero-padded.
//! 2. A window is silent when its RMS level in dBFS is strictly below the
//!    threshold (`-inf` for an all-zero window).
//! 3. Consecutive silent windows form a run; runs shorter than the minimum
//!    silence length are dropped, not merged.
//! 4. Run boundaries are clamped to the audio duration to undo the padding.
//!
//! Classification has no cross-window state, so any contiguous window range can
//! be classified independently. Coalescing must see the whole sequence.

use std::ops::Range;

use super::threshold::{rms_padded, rms_to_dbfs};

/// Window geometry for one signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowLayout {
    /// Samples per window (and per hop).
    pub hop: usize,
    /// Number of windows, including a padded tail window.
    pub count: usize,
}

impl WindowLayout {
    /// `hop = max(1, round(sample_rate * seek_step_ms / 1000))`.
    pub fn new(signal_len: usize, sample_rate: u32, seek_step_ms: u32) -> Self {
        let hop = (f64::from(sample_rate) * (f64::from(seek_step_ms) / 1000.0))
            .round_ties_even()
            .max(1.0) as usize;
        Self {
            hop,
            count: signal_len.div_ceil(hop),
        }
    }
}

/// Classify windows `range` of `samples`; `true` means silent.
pub fn classify_range(
    samples: &[f32],
    layout: WindowLayout,
    range: Range<usize>,
    thresh_db: f64,
) -> Vec<bool> {
    range
        .map(|i| {
            let start = (i * layout.hop).min(samples.len());
            let end = (start + layout.hop).min(samples.len());
            let db = rms_to_dbfs(rms_padded(&samples[start..end], layout.hop));
            db < thresh_db
        })
        .collect()
}

/// Coalesce silent runs into `(start_ms, end_ms)` spans, clamped to
/// `[0, audio_ms]`. Spans that collapse under clamping are dropped.
pub fn coalesce_runs(
    silent: &[bool],
    seek_step_ms: u32,
    min_silence_len_ms: u32,
    audio_ms: u64,
) -> Vec<(u64, u64)> {
    let step = u64::from(seek_step_ms);
    let mut spans = Vec::new();
    let mut i = 0;

    while i < silent.len() {
        if !silent[i] {
            i += 1;
            continue;
        }
        let s = i;
        while i < silent.len() && silent[i] {
            i += 1;
        }
        let run = (i - s) as u64;
        if run * step >= u64::from(min_silence_len_ms) {
            let start = (s as u64 * step).min(audio_ms);
            let end = (i as u64 * step).min(audio_ms);
            if start < end {
                spans.push((start, end));
            }
        }
    }

    spans
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_rounds_hop_and_counts_padded_tail() {
        let l = WindowLayout::new(8_000, 8_000, 20);
        assert_eq!(l, WindowLayout { hop: 160, count: 50 });

        let l = WindowLayout::new(8_001, 8_000, 20);
        assert_eq!(l.count, 51);

        let l = WindowLayout::new(0, 8_000, 20);
        assert_eq!(l.count, 0);
    }

    #[test]
    fn hop_never_drops_below_one_sample() {
        assert_eq!(WindowLayout::new(10, 10, 20).hop, 1);
    }

    #[test]
    fn hop_rounds_half_to_even() {
        // 11025 Hz * 20 ms = 220.5 samples
        assert_eq!(WindowLayout::new(0, 11_025, 20).hop, 220);
    }

    #[test]
    fn zero_window_is_silent_at_any_threshold() {
        let samples = vec![0.0f32; 320];
        let layout = WindowLayout::new(samples.len(), 8_000, 20);
        assert_eq!(
            classify_range(&samples, layout, 0..layout.count, -200.0),
            vec![true, true]
        );
    }

    #[test]
    fn threshold_comparison_is_strict() {
        let samples = vec![0.1f32; 160]; // exactly -20 dBFS
        let layout = WindowLayout::new(samples.len(), 8_000, 20);
        assert_eq!(classify_range(&samples, layout, 0..1, -20.0), vec![false]);
        assert_eq!(classify_range(&samples, layout, 0..1, -19.9), vec![true]);
    }

    #[test]
    fn padded_tail_window_is_quieter() {
        // 80 loud samples then padding: RMS halves in power (-3 dB).
        let samples = vec![0.1f32; 160 + 80];
        let layout = WindowLayout::new(samples.len(), 8_000, 20);
        assert_eq!(
            classify_range(&samples, layout, 0..layout.count, -21.0),
            vec![false, true]
        );
    }

    #[test]
    fn short_runs_are_discarded_not_merged() {
        let silent = [true, true, false, true, true, true, false, true];
        let spans = coalesce_runs(&silent, 20, 60, 1_000);
        assert_eq!(spans, vec![(60, 120)]);
    }

    #[test]
    fn trailing_run_is_clamped_to_duration() {
        let silent = [false, true, true, true];
        let spans = coalesce_runs(&silent, 20, 40, 70);
        assert_eq!(spans, vec![(20, 70)]);
    }

    #[test]
    fn all_silent_is_one_span() {
        let silent = vec![true; 50];
        assert_eq!(coalesce_runs(&silent, 20, 500, 1_000), vec![(0, 1_000)]);
    }
}
