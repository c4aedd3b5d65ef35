//! Chunk-parallel window classification.
//!
//! The window range is cut into one contiguous chunk per worker. Each worker
//! classifies its chunk and sends `(chunk_index, flags)` back over a channel;
//! the coordinator reassembles the flags in chunk order. Run coalescing is
//! left to the caller so it always sees the full sequence.
//!
//! Any worker failure (panic or missing result) fails the whole attempt with
//! `ComputeFailure`; partial results are never returned.

use std::ops::Range;
use std::thread;

use crossbeam_channel::unbounded;
use tracing::debug;

use super::window::{classify_range, WindowLayout};
use crate::error::{QuietcutError, Result};

/// Split `0..count` into at most `workers` contiguous, non-empty ranges.
pub fn partition(count: usize, workers: usize) -> Vec<Range<usize>> {
    let workers = workers.clamp(1, count.max(1));
    let base = count / workers;
    let extra = count % workers;

    let mut ranges = Vec::with_capacity(workers);
    let mut start = 0;
    for w in 0..workers {
        let len = base + usize::from(w < extra);
        if len == 0 {
            continue;
        }
        ranges.push(start..start + len);
        start += len;
    }
    ranges
}

/// Classify every window of `samples` across `workers` threads.
pub fn classify_parallel(
    samples: &[f32],
    layout: WindowLayout,
    thresh_db: f64,
    workers: usize,
) -> Result<Vec<bool>> {
    classify_parallel_with(layout.count, workers, |range| {
        classify_range(samples, layout, range, thresh_db)
    })
}

pub(crate) fn classify_parallel_with<F>(
    count: usize,
    workers: usize,
    classify: F,
) -> Result<Vec<bool>>
where
    F: Fn(Range<usize>) -> Vec<bool> + Sync,
{
    let ranges = partition(count, workers);
    let (tx, rx) = unbounded::<(usize, Vec<bool>)>();

    let failed = thread::scope(|scope| {
        let handles: Vec<_> = ranges
            .iter()
            .cloned()
            .enumerate()
            .map(|(idx, range)| {
                let tx = tx.clone();
                let classify = &classify;
                scope.spawn(move || {
                    let flags = classify(range);
                    // Receiver outlives the scope; a send error cannot happen.
                    let _ = tx.send((idx, flags));
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|h| h.join())
            .filter(std::result::Result::is_err)
            .count()
    });
    drop(tx);

    if failed > 0 {
        return Err(QuietcutError::ComputeFailure(format!(
            "{failed} of {} detection workers panicked",
            ranges.len()
        )));
    }

    let mut slots: Vec<Option<Vec<bool>>> = vec![None; ranges.len()];
    for (idx, flags) in rx.iter() {
        slots[idx] = Some(flags);
    }

    let mut out = Vec::with_capacity(count);
    for (idx, (slot, range)) in slots.into_iter().zip(&ranges).enumerate() {
        match slot {
            Some(flags) if flags.len() == range.len() => out.extend(flags),
            Some(flags) => {
                return Err(QuietcutError::ComputeFailure(format!(
                    "worker {idx} returned {} flags for {} windows",
                    flags.len(),
                    range.len()
                )))
            }
            None => {
                return Err(QuietcutError::ComputeFailure(format!(
                    "worker {idx} returned no result"
                )))
            }
        }
    }

    debug!(windows = count, workers = ranges.len(), "parallel classification done");
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partition_covers_range_in_order() {
        let ranges = partition(10, 3);
        assert_eq!(ranges, vec![0..4, 4..7, 7..10]);
    }

    #[test]
    fn partition_never_exceeds_window_count() {
        assert_eq!(partition(2, 8), vec![0..1, 1..2]);
        assert_eq!(partition(0, 4), Vec::<Range<usize>>::new());
        assert_eq!(partition(5, 0), vec![0..5]);
    }

    #[test]
    fn reassembly_preserves_window_order() {
        let flags = classify_parallel_with(100, 7, |r| r.map(|i| i % 3 == 0).collect()).unwrap();
        let expected: Vec<bool> = (0..100).map(|i| i % 3 == 0).collect();
        assert_eq!(flags, expected);
    }

    #[test]
    fn panicking_worker_fails_whole_attempt() {
        let err = classify_parallel_with(100, 4, |r| {
            if r.start == 0 {
                panic!("injected worker failure");
            }
            vec![false; r.len()]
        })
        .unwrap_err();
        assert!(matches!(err, QuietcutError::ComputeFailure(_)));
    }

    #[test]
    fn short_worker_output_is_rejected() {
        let err = classify_parallel_with(10, 2, |r| vec![true; r.len() - 1]).unwrap_err();
        assert!(matches!(err, QuietcutError::ComputeFailure(_)));
    }
}
