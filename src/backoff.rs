use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    RateLimited,
    ColdStart,
    Transient,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenericCurve {
    Fixed,
    Linear,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub rate_base: Duration,
    pub cold_base: Duration,
    pub generic_base: Duration,
    pub generic_curve: GenericCurve,
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            rate_base: Duration::from_millis(1_000),
            cold_base: Duration::from_millis(2_000),
            generic_base: Duration::from_millis(1_000),
            generic_curve: GenericCurve::Fixed,
            max_delay: Duration::from_secs(30),
        }
    }
}

impl BackoffPolicy {
    /// Wait before the attempt following `attempt` (0-indexed), capped at `max_delay`.
    pub fn next_delay(&self, attempt: u32, kind: FailureKind) -> Duration {
        let delay = match kind {
            FailureKind::RateLimited => scale(self.rate_base, pow2(attempt)),
            FailureKind::ColdStart => scale(self.cold_base, pow2(attempt.saturating_add(1))),
            FailureKind::Transient => match self.generic_curve {
                GenericCurve::Fixed => self.generic_base,
                GenericCurve::Linear => {
                    scale(self.generic_base, u64::from(attempt).saturating_add(1))
                }
            },
        };
        delay.min(self.max_delay)
    }
}

fn pow2(exponent: u32) -> u64 {
    1u64.checked_shl(exponent).unwrap_or(u64::MAX)
}

fn scale(base: Duration, factor: u64) -> Duration {
    let millis = u64::try_from(base.as_millis()).unwrap_or(u64::MAX);
    Duration::from_millis(millis.saturating_mul(factor))
}
