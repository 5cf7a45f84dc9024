use rand::Rng;
use std::time::Duration;

// Exponent cap keeps the worst case around 8.5 hours with a 30s base.
const MAX_EXPONENT: u32 = 10;

/// Exponential backoff with ±30% jitter: base * 2^attempt, capped.
pub fn retry_delay(attempt: i32, base_secs: u32) -> Duration {
    let exponent = (attempt.max(0) as u32).min(MAX_EXPONENT);
    let base = base_secs.saturating_mul(2_u32.saturating_pow(exponent));

    let jitter = rand::thread_rng().gen_range(0.7..1.3);
    Duration::from_secs((base as f64 * jitter).round() as u64)
}
