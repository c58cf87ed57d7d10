//! Stack growth for the recursive parser and evaluator.
//!
//! Nesting in source text and in Tang call chains maps directly onto host
//! recursion. Both walk through [`ensure_sufficient_stack`], which grows the
//! stack on demand instead of relying on the size of the calling thread.

/// Grow when less than this remains.
const RED_ZONE: usize = 100 * 1024;

/// Size of each new stack segment.
const STACK_PER_RECURSION: usize = 1024 * 1024;

#[inline]
#[cfg(not(target_arch = "wasm32"))]
pub fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    stacker::maybe_grow(RED_ZONE, STACK_PER_RECURSION, f)
}

#[inline]
#[cfg(target_arch = "wasm32")]
pub fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    f()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passes_results_through() {
        let result: Result<i64, String> = ensure_sufficient_stack(|| Ok(7));
        assert_eq!(result, Ok(7));
    }

    #[test]
    fn deep_recursion_does_not_overflow() {
        fn count_down(n: u64) -> u64 {
            ensure_sufficient_stack(|| if n == 0 { 0 } else { count_down(n - 1) + 1 })
        }

        assert_eq!(count_down(100_000), 100_000);
    }
}
