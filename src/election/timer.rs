use rand::Rng;
use std::time::Duration;

/// Adds up to `jitter_ms` of random delay to `base`, so that processes which
/// missed the same event do not retry in lockstep.
pub fn jittered(base: Duration, jitter_ms: u64) -> Duration {
    if jitter_ms == 0 {
        return base;
    }
    let mut rng = rand::thread_rng();
    base + Duration::from_millis(rng.gen_range(0..=jitter_ms))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_jitter_is_exact() {
        assert_eq!(
            jittered(Duration::from_millis(300), 0),
            Duration::from_millis(300)
        );
    }

    #[test]
    fn jitter_stays_in_range() {
        let base = Duration::from_millis(100);
        for _ in 0..100 {
            let d = jittered(base, 50);
            assert!(d >= base && d <= base + Duration::from_millis(50));
        }
    }
}
