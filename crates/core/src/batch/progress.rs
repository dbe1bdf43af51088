//! Progress figures recomputed from a job's counters.

use super::types::JobProgress;

/// Recomputes the derived progress fields from the counters and elapsed time.
///
/// `percentage` is `round(100 * processed / total)` (0 for an empty job).
/// Throughput and the remaining-time estimate are only known once some time
/// has passed and at least one task was processed.
pub fn compute_progress(progress: &JobProgress, elapsed_ms: u64) -> JobProgress {
    let processed = progress.processed();

    let percentage = if progress.total == 0 {
        0
    } else {
        ((processed as f64 / progress.total as f64) * 100.0).round() as u32
    };

    let tasks_per_second = if elapsed_ms > 0 {
        processed as f64 / (elapsed_ms as f64 / 1000.0)
    } else {
        0.0
    };

    let estimated_remaining_ms = if tasks_per_second > 0.0 {
        let left = progress.total.saturating_sub(processed) as f64;
        Some((left / tasks_per_second * 1000.0).round() as u64)
    } else {
        None
    };

    JobProgress {
        percentage,
        tasks_per_second,
        estimated_remaining_ms,
        ..progress.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counters(total: usize, completed: usize, failed: usize) -> JobProgress {
        JobProgress {
            total,
            completed,
            failed,
            ..Default::default()
        }
    }

    #[test]
    fn test_percentage_rounds() {
        assert_eq!(compute_progress(&counters(3, 1, 0), 1000).percentage, 33);
        assert_eq!(compute_progress(&counters(3, 2, 0), 1000).percentage, 67);
        assert_eq!(compute_progress(&counters(8, 3, 2), 1000).percentage, 63);
        assert_eq!(compute_progress(&counters(10, 10, 0), 1000).percentage, 100);
    }

    #[test]
    fn test_empty_job() {
        let progress = compute_progress(&counters(0, 0, 0), 1000);
        assert_eq!(progress.percentage, 0);
        assert_eq!(progress.tasks_per_second, 0.0);
        assert_eq!(progress.estimated_remaining_ms, None);
    }

    #[test]
    fn test_throughput_and_eta() {
        let progress = compute_progress(&counters(100, 20, 5), 5000);
        assert_eq!(progress.tasks_per_second, 5.0);
        assert_eq!(progress.estimated_remaining_ms, Some(15_000));
    }

    #[test]
    fn test_eta_unknown_without_throughput() {
        assert_eq!(
            compute_progress(&counters(10, 0, 0), 5000).estimated_remaining_ms,
            None
        );
        assert_eq!(
            compute_progress(&counters(10, 4, 0), 0).estimated_remaining_ms,
            None
        );
    }

    #[test]
    fn test_counters_untouched() {
        let mut input = counters(10, 4, 1);
        input.skipped = 2;
        let progress = compute_progress(&input, 1000);
        assert_eq!(progress.total, 10);
        assert_eq!(progress.completed, 4);
        assert_eq!(progress.failed, 1);
        assert_eq!(progress.skipped, 2);
    }
}
