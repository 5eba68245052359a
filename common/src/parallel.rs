//! Concurrency-limited parallel iteration utilities.
//!
//! Wraps rayon's `par_iter` to process items in parallel while limiting
//! the number of items in flight at once (e.g. to cap memory held by
//! whole-tile image buffers).

use std::sync::atomic::{AtomicBool, Ordering};

use rayon::prelude::*;

/// Maps `f` over `items` in parallel, with at most `max_concurrent` items in
/// flight, checking `stop` before each chunk is started.
///
/// Semantically equivalent to `items.par_iter().map(f).collect()` while `stop`
/// stays clear. Once `stop` is set no further item is started; items already running
/// finish and their results are kept. The returned vector holds the results
/// of a prefix of `items`, in order.
///
/// # Panics
///
/// Panics if `max_concurrent` is 0.
pub fn par_map_limited_until<T, R, F>(
    items: &[T],
    max_concurrent: usize,
    stop: &AtomicBool,
    f: F,
) -> Vec<R>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> R + Sync,
{
    assert!(max_concurrent > 0, "max_concurrent must be > 0");

    let mut results = Vec::with_capacity(items.len());
    for chunk in items.chunks(max_concurrent) {
        if stop.load(Ordering::SeqCst) {
            break;
        }
        let chunk_results: Vec<R> = chunk.par_iter().map(&f).collect();
        results.extend(chunk_results);
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn par_map_limited<T: Sync, R: Send>(
        items: &[T],
        max_concurrent: usize,
        f: impl Fn(&T) -> R + Sync,
    ) -> Vec<R> {
        par_map_limited_until(items, max_concurrent, &AtomicBool::new(false), f)
    }

    #[test]
    fn test_par_map_limited_preserves_order() {
        let items: Vec<i32> = (0..100).collect();
        let result = par_map_limited(&items, 4, |&x| x * 2);
        let expected: Vec<i32> = (0..100).map(|x| x * 2).collect();
        assert_eq!(result, expected);
    }

    #[test]
    fn test_par_map_limited_empty() {
        let items: Vec<i32> = vec![];
        let result = par_map_limited(&items, 3, |&x| x);
        assert!(result.is_empty());
    }

    #[test]
    #[should_panic(expected = "max_concurrent must be > 0")]
    fn test_par_map_limited_zero_panics() {
        par_map_limited(&[1, 2, 3], 0, |&x| x);
    }

    #[test]
    fn test_par_map_limited_concurrency_cap() {
        let items: Vec<i32> = (0..20).collect();
        let in_flight = AtomicUsize::new(0);
        let max_observed = AtomicUsize::new(0);

        par_map_limited(&items, 3, |&x| {
            let current = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            max_observed.fetch_max(current, Ordering::SeqCst);
            std::thread::sleep(std::time::Duration::from_millis(5));
            in_flight.fetch_sub(1, Ordering::SeqCst);
            x
        });

        let max = max_observed.load(Ordering::SeqCst);
        assert!(max <= 3, "max in-flight was {max}, expected <= 3");
    }

    #[test]
    fn test_stop_before_start_runs_nothing() {
        let stop = AtomicBool::new(true);
        let result = par_map_limited_until(&[1, 2, 3], 2, &stop, |&x| x);
        assert!(result.is_empty());
    }

    #[test]
    fn test_stop_mid_run_keeps_finished_prefix() {
        let items: Vec<usize> = (0..10).collect();
        let stop = AtomicBool::new(false);

        // Single-item chunks: item 3 raises the flag, so 0..=3 complete.
        let result = par_map_limited_until(&items, 1, &stop, |&x| {
            if x == 3 {
                stop.store(true, Ordering::SeqCst);
            }
            x
        });

        assert_eq!(result, vec![0, 1, 2, 3]);
    }
}
