//! Exponential retry delay with
//! centered jitter.
use std::time::Duration;

#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub struct RetryDelay {
  pub total:     Duration,
  pub jitter_ms: i64
}

/// `base * 2^attempt`, clamped to
/// `max`, then shifted by up to
/// `jitter_fraction` of the clamped
/// value in either direction. `rand01`
/// is expected in `[0, 1)`; `0.5` means
/// no jitter.
pub fn compute_retry_delay(
  base: Duration,
  attempt: u32,
  max: Duration,
  jitter_fraction: f64,
  rand01: f64
) -> RetryDelay {
  let base_ms = base.as_millis() as u64;

  let scaled = base_ms.saturating_mul(
    2u64.saturating_pow(attempt)
  );

  let clamped =
    scaled.min(max.as_millis() as u64);

  let jitter_raw = (clamped as f64)
    * jitter_fraction.clamp(0.0, 1.0);

  let centered = (rand01.clamp(0.0, 1.0)
    * 2.0
    - 1.0)
    * jitter_raw;

  let jitter_ms = centered.round() as i64;

  let total_ms = (clamped as i64
    + jitter_ms)
    .max(0) as u64;

  RetryDelay {
    total: Duration::from_millis(
      total_ms
    ),
    jitter_ms
  }
}
