//! Silence-guided segmentation planning.
//!
//! ## Policy
//!
//! - Recordings of 20 minutes or less stay whole.
//! - Longer recordings aim for `n = max(2, round(minutes / 5))` pieces. Each of
//!   the `n - 1` evenly spaced targets `k * total / n` picks the silence whose
//!   midpoint is nearest (first one wins a tie).
//! - Pieces overlap: piece `i` starts at the *start* of the previous chosen
//!   silence and records that silence's length as `trim_leading_ms`, so both
//!   edges of every cut sit inside silence and a consumer can drop the
//!   duplicated lead.
//!
//! Selections are not deduplicated or re-sorted. Two targets that land on the
//! same silence, or on silences out of time order, yield a degenerate piece;
//! the planner logs it and leaves it to the extractor to skip.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::silence::SilenceInterval;
use crate::timestamp::{format_ms, round_to};

/// Recordings at or under this length are never split.
pub const SHORT_FILE_LIMIT_MINUTES: f64 = 20.0;

/// Target length of one piece.
pub const TARGET_SEGMENT_MINUTES: f64 = 5.0;

pub const STRATEGY_SINGLE_PIECE: &str = "single_piece";
pub const STRATEGY_OVERLAP_TRIM: &str = "overlapping_with_trim";

const MS_PER_MINUTE: f64 = 60_000.0;

/// One planned output segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "PieceRecord")]
pub struct Piece {
    /// 1-based, consecutive.
    pub piece_index: usize,
    pub start_ms: u64,
    pub end_ms: u64,
    /// Leading span duplicated from the previous piece.
    #[serde(default)]
    pub trim_leading_ms: u64,
}

impl Piece {
    /// Signed, since a degenerate selection can put `end_ms` before `start_ms`.
    pub fn duration_ms(&self) -> i64 {
        self.end_ms as i64 - self.start_ms as i64
    }
}

#[derive(Debug, Clone, Serialize)]
struct PieceRecord {
    piece_index: usize,
    start_ms: u64,
    end_ms: u64,
    start_formatted: String,
    end_formatted: String,
    duration_ms: i64,
    duration_minutes: f64,
    trim_leading_ms: u64,
}

impl From<Piece> for PieceRecord {
    fn from(p: Piece) -> Self {
        let duration_ms = p.duration_ms();
        Self {
            piece_index: p.piece_index,
            start_ms: p.start_ms,
            end_ms: p.end_ms,
            start_formatted: format_ms(p.start_ms),
            end_formatted: format_ms(p.end_ms),
            duration_ms,
            duration_minutes: round_to(duration_ms as f64 / MS_PER_MINUTE, 2),
            trim_leading_ms: p.trim_leading_ms,
        }
    }
}

/// The piece list for one recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitPlan {
    pub split_needed: bool,
    pub total_duration_ms: u64,
    pub total_duration_minutes: f64,
    pub target_segment_minutes: f64,
    pub recommended_pieces: usize,
    pub pieces: Vec<Piece>,
    /// `[start_ms, end_ms]` of each chosen silence, in selection order.
    pub selected_silences: Vec<[u64; 2]>,
    pub strategy: String,
    pub message: String,
}

impl SplitPlan {
    /// `true` when every piece starts no later than it ends and pieces start
    /// in ascending order.
    pub fn is_monotonic(&self) -> bool {
        self.pieces.iter().all(|p| p.start_ms <= p.end_ms)
            && self.pieces.windows(2).all(|w| w[0].start_ms <= w[1].start_ms)
    }
}

/// Chooses split points and builds the overlap-trim piece list.
#[derive(Debug, Clone, Copy, Default)]
pub struct SegmentationPlanner;

impl SegmentationPlanner {
    /// Piece count aimed for at `total_ms`; 1 for short recordings.
    pub fn recommended_pieces(total_ms: u64) -> usize {
        let minutes = total_ms as f64 / MS_PER_MINUTE;
        if minutes <= SHORT_FILE_LIMIT_MINUTES {
            return 1;
        }
        ((minutes / TARGET_SEGMENT_MINUTES).round_ties_even() as usize).max(2)
    }

    /// For each of the `pieces - 1` evenly spaced targets, the silence with the
    /// nearest midpoint. Empty when there are no silences.
    pub fn select_silences(
        total_ms: u64,
        pieces: usize,
        silences: &[SilenceInterval],
    ) -> Vec<SilenceInterval> {
        if silences.is_empty() || pieces < 2 {
            return Vec::new();
        }

        (1..pieces)
            .filter_map(|k| {
                let target = k as f64 * total_ms as f64 / pieces as f64;
                let mut best: Option<(f64, SilenceInterval)> = None;
                for s in silences {
                    let dist = (s.midpoint_ms() - target).abs();
                    if best.map_or(true, |(d, _)| dist < d) {
                        best = Some((dist, *s));
                    }
                }
                best.map(|(_, s)| s)
            })
            .collect()
    }

    /// Build the overlap-trim pieces for already selected silences.
    pub fn build_pieces(total_ms: u64, selected: &[SilenceInterval]) -> Vec<Piece> {
        if selected.is_empty() {
            return vec![Piece {
                piece_index: 1,
                start_ms: 0,
                end_ms: total_ms,
                trim_leading_ms: 0,
            }];
        }

        let mut pieces = Vec::with_capacity(selected.len() + 1);
        pieces.push(Piece {
            piece_index: 1,
            start_ms: 0,
            end_ms: selected[0].end_ms,
            trim_leading_ms: 0,
        });

        for (i, pair) in selected.windows(2).enumerate() {
            let (prev, cur) = (pair[0], pair[1]);
            pieces.push(Piece {
                piece_index: i + 2,
                start_ms: prev.start_ms,
                end_ms: cur.end_ms,
                trim_leading_ms: prev.duration_ms(),
            });
        }

        let last = selected[selected.len() - 1];
        pieces.push(Piece {
            piece_index: selected.len() + 1,
            start_ms: last.start_ms,
            end_ms: total_ms,
            trim_leading_ms: last.duration_ms(),
        });

        pieces
    }

    /// Plan a recording of `total_ms` given its detected silences.
    pub fn plan(total_ms: u64, silences: &[SilenceInterval]) -> SplitPlan {
        let minutes = total_ms as f64 / MS_PER_MINUTE;
        let recommended = Self::recommended_pieces(total_ms);

        let selected = Self::select_silences(total_ms, recommended, silences);
        let pieces = Self::build_pieces(total_ms, &selected);
        let split_needed = pieces.len() > 1;

        let message = if recommended == 1 {
            format!(
                "{minutes:.2} min is within {SHORT_FILE_LIMIT_MINUTES} min; keeping one piece"
            )
        } else if !split_needed {
            format!("{minutes:.2} min but no silence to split on; keeping one piece")
        } else {
            format!(
                "{minutes:.2} min split into {} pieces at silence boundaries",
                pieces.len()
            )
        };

        let plan = SplitPlan {
            split_needed,
            total_duration_ms: total_ms,
            total_duration_minutes: round_to(minutes, 2),
            target_segment_minutes: TARGET_SEGMENT_MINUTES,
            recommended_pieces: recommended,
            pieces,
            selected_silences: selected.iter().map(|s| [s.start_ms, s.end_ms]).collect(),
            strategy: if split_needed {
                STRATEGY_OVERLAP_TRIM.into()
            } else {
                STRATEGY_SINGLE_PIECE.into()
            },
            message,
        };

        if !plan.is_monotonic() {
            warn!(
                selected = ?plan.selected_silences,
                "silence selection is out of order; plan contains degenerate pieces"
            );
        }
        info!(
            pieces = plan.pieces.len(),
            recommended,
            minutes = plan.total_duration_minutes,
            "split plan ready"
        );

        plan
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIN: u64 = 60_000;

    fn silence(index: usize, start_ms: u64, end_ms: u64) -> SilenceInterval {
        SilenceInterval {
            index,
            start_ms,
            end_ms,
        }
    }

    fn assert_partition(plan: &SplitPlan) {
        assert_eq!(plan.pieces[0].start_ms, 0);
        assert_eq!(plan.pieces.last().unwrap().end_ms, plan.total_duration_ms);
        for (i, p) in plan.pieces.iter().enumerate() {
            assert_eq!(p.piece_index, i + 1);
        }
        for w in plan.pieces.windows(2) {
            assert!(w[0].end_ms >= w[1].start_ms, "gap between {:?} and {:?}", w[0], w[1]);
        }
    }

    #[test]
    fn three_minutes_without_silence_is_one_piece() {
        let plan = SegmentationPlanner::plan(180_000, &[]);
        assert!(!plan.split_needed);
        assert_eq!(plan.pieces.len(), 1);
        assert_eq!((plan.pieces[0].start_ms, plan.pieces[0].end_ms), (0, 180_000));
        assert_eq!(plan.pieces[0].trim_leading_ms, 0);
        assert_eq!(plan.strategy, STRATEGY_SINGLE_PIECE);
    }

    #[test]
    fn exactly_twenty_minutes_is_not_split() {
        let silences = [silence(1, 10 * MIN, 10 * MIN + 800)];
        let plan = SegmentationPlanner::plan(20 * MIN, &silences);
        assert_eq!(plan.pieces.len(), 1);
        assert_eq!(plan.pieces[0].trim_leading_ms, 0);
        assert!(plan.selected_silences.is_empty());
    }

    #[test]
    fn recommended_count_rounds_and_floors_at_two() {
        assert_eq!(SegmentationPlanner::recommended_pieces(20 * MIN + 1), 4);
        assert_eq!(SegmentationPlanner::recommended_pieces(30 * MIN), 6);
        assert_eq!(SegmentationPlanner::recommended_pieces(62 * MIN), 12);
        // 22.5 min / 5 = 4.5, ties to even
        assert_eq!(SegmentationPlanner::recommended_pieces(22 * MIN + 30_000), 4);
    }

    #[test]
    fn thirty_minutes_splits_at_nearest_silences() {
        let silences: Vec<_> = (1..=5u64)
            .map(|k| silence(k as usize, k * 5 * MIN - 1_000 + k * 100, k * 5 * MIN + 600))
            .collect();
        let plan = SegmentationPlanner::plan(30 * MIN, &silences);

        assert!(plan.split_needed);
        assert_eq!(plan.recommended_pieces, 6);
        assert_eq!(plan.pieces.len(), 6);
        assert_eq!(plan.strategy, STRATEGY_OVERLAP_TRIM);
        assert_partition(&plan);

        let first = silences[0];
        let second = silences[1];
        assert_eq!(plan.pieces[0].end_ms, first.end_ms);
        assert_eq!(plan.pieces[0].trim_leading_ms, 0);
        assert_eq!(plan.pieces[1].start_ms, first.start_ms);
        assert_eq!(plan.pieces[1].end_ms, second.end_ms);
        assert_eq!(plan.pieces[1].trim_leading_ms, first.duration_ms());

        let last_selected = silences[4];
        let last = plan.pieces.last().unwrap();
        assert_eq!(last.start_ms, last_selected.start_ms);
        assert_eq!(last.trim_leading_ms, last_selected.duration_ms());
        assert!(plan.is_monotonic());
    }

    #[test]
    fn long_file_without_silence_stays_whole() {
        let plan = SegmentationPlanner::plan(45 * MIN, &[]);
        assert!(!plan.split_needed);
        assert_eq!(plan.recommended_pieces, 9);
        assert_eq!(plan.pieces.len(), 1);
        assert_partition(&plan);
    }

    #[test]
    fn midpoint_tie_keeps_first_candidate() {
        // Target at 15 min; both midpoints are 1 s away.
        let a = silence(1, 15 * MIN - 1_500, 15 * MIN - 500);
        let b = silence(2, 15 * MIN + 500, 15 * MIN + 1_500);
        let picked = SegmentationPlanner::select_silences(30 * MIN, 2, &[a, b]);
        assert_eq!(picked, vec![a]);
    }

    #[test]
    fn shared_selection_is_kept_as_is() {
        // One silence near the start; every target maps to it.
        let only = silence(1, 60_000, 61_000);
        let plan = SegmentationPlanner::plan(25 * MIN, &[only]);

        assert_eq!(plan.recommended_pieces, 5);
        assert_eq!(plan.selected_silences, vec![[60_000, 61_000]; 4]);
        assert_eq!(plan.pieces.len(), 5);
        // Middle pieces repeat the same span and trim down to nothing.
        assert_eq!((plan.pieces[2].start_ms, plan.pieces[2].end_ms), (60_000, 61_000));
        assert_eq!(plan.pieces[2].trim_leading_ms, 1_000);
        assert_partition(&plan);
    }

    #[test]
    fn out_of_order_selection_produces_inverted_piece() {
        let early = silence(1, 100_000, 101_000);
        let late = silence(2, 200_000, 201_000);
        let pieces = SegmentationPlanner::build_pieces(300_000, &[late, early]);
        assert_eq!(pieces[1].start_ms, 200_000);
        assert_eq!(pieces[1].end_ms, 101_000);
        assert!(pieces[1].duration_ms() < 0);
    }

    #[test]
    fn piece_serializes_derived_fields() {
        let p = Piece {
            piece_index: 2,
            start_ms: 300_000,
            end_ms: 600_000,
            trim_leading_ms: 750,
        };
        let json = serde_json::to_value(p).expect("serialize piece");
        assert_eq!(json["start_formatted"], "00:05:00.000");
        assert_eq!(json["end_formatted"], "00:10:00.000");
        assert_eq!(json["duration_ms"], 300_000);
        assert_eq!(json["duration_minutes"], 5.0);
        assert_eq!(json["trim_leading_ms"], 750);

        let back: Piece = serde_json::from_value(json).expect("deserialize piece");
        assert_eq!(back, p);
    }

    #[test]
    fn plan_round_trips_through_json() {
        let plan = SegmentationPlanner::plan(180_000, &[]);
        let text = serde_json::to_string(&plan).unwrap();
        let back: SplitPlan = serde_json::from_str(&text).unwrap();
        assert_eq!(back, plan);
    }
}
