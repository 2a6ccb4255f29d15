//! Cooldown handling for placement responses.
//!
//! The painting service answers a placement either with the time the next
//! pixel is allowed (success) or with a rate-limit error carrying the same
//! instant. Both get a fixed safety margin; anything else falls back to a
//! fixed retry delay.

use serde_json::Value;
use std::time::Duration;

/// Added to the service's next-allowed instant
pub const SAFETY_MARGIN_MS: i64 = 3000;

/// Delay used when a response cannot be interpreted
pub const FALLBACK_DELAY: Duration = Duration::from_millis(10_000);

/// What a placement response says about the next allowed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlacementOutcome {
    /// The pixel was placed; next placement allowed at the given unix ms
    Placed { next_available_ms: i64 },
    /// Refused as too early; next placement allowed at the given unix ms
    RateLimited { next_available_ms: i64 },
}

impl PlacementOutcome {
    pub fn next_available_ms(&self) -> i64 {
        match self {
            PlacementOutcome::Placed { next_available_ms }
            | PlacementOutcome::RateLimited { next_available_ms } => *next_available_ms,
        }
    }

    /// Delay from `now_ms` until the next attempt, never negative.
    /// `None` when the service's instant is too far out to compute with.
    pub fn delay_from(&self, now_ms: i64) -> Option<Duration> {
        let wait = self
            .next_available_ms()
            .checked_add(SAFETY_MARGIN_MS)?
            .checked_sub(now_ms)?;
        Some(Duration::from_millis(wait.max(0) as u64))
    }
}

fn as_millis(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_f64().filter(|f| f.is_finite()).map(|f| f as i64))
}

/// Interpret a placement response. `None` when neither shape matches.
pub fn parse_placement_response(response: &Value) -> Option<PlacementOutcome> {
    if let Some(errors) = response.get("errors").filter(|e| !e.is_null()) {
        let next = errors.pointer("/0/extensions/nextAvailablePixelTs")?;
        return as_millis(next).map(|next_available_ms| PlacementOutcome::RateLimited {
            next_available_ms,
        });
    }

    let next = response.pointer("/data/act/data/0/data/nextAvailablePixelTimestamp")?;
    as_millis(next).map(|next_available_ms| PlacementOutcome::Placed { next_available_ms })
}

/// How long to wait after `response`, evaluated at `now_ms`.
pub fn cooldown_delay(response: &Value, now_ms: i64) -> Duration {
    parse_placement_response(response)
        .and_then(|outcome| outcome.delay_from(now_ms))
        .unwrap_or(FALLBACK_DELAY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const NOW: i64 = 1_648_900_000_000;

    #[test]
    fn test_rate_limited_response() {
        let response = json!({
            "errors": [{"message": "Ratelimited", "extensions": {"nextAvailablePixelTs": NOW + 60_000}}],
            "data": null
        });
        assert_eq!(
            parse_placement_response(&response),
            Some(PlacementOutcome::RateLimited {
                next_available_ms: NOW + 60_000
            })
        );
        assert_eq!(cooldown_delay(&response, NOW), Duration::from_millis(63_000));
    }

    #[test]
    fn test_success_response() {
        let response = json!({"data": {"act": {"data": [
            {"data": {"nextAvailablePixelTimestamp": NOW + 300_000, "__typename": "GetUserCooldownResponseMessageData"}},
            {"data": {"timestamp": NOW, "__typename": "SetPixelResponseMessageData"}}
        ]}}});
        assert_eq!(cooldown_delay(&response, NOW), Duration::from_millis(303_000));
    }

    #[test]
    fn test_null_errors_is_a_success() {
        let response = json!({
            "errors": null,
            "data": {"act": {"data": [{"data": {"nextAvailablePixelTimestamp": NOW + 300_000}}]}}
        });
        assert_eq!(
            parse_placement_response(&response),
            Some(PlacementOutcome::Placed {
                next_available_ms: NOW + 300_000
            })
        );
        assert_eq!(cooldown_delay(&response, NOW), Duration::from_millis(303_000));
    }

    #[test]
    fn test_out_of_range_timestamps_fall_back() {
        let far = json!({"errors": [{"extensions": {"nextAvailablePixelTs": i64::MAX}}]});
        assert_eq!(cooldown_delay(&far, NOW), FALLBACK_DELAY);

        let outcome = PlacementOutcome::Placed {
            next_available_ms: i64::MIN,
        };
        assert_eq!(outcome.delay_from(NOW), None);
    }

    #[test]
    fn test_float_timestamps_are_accepted() {
        let response = json!({"errors": [{"extensions": {"nextAvailablePixelTs": 1_648_900_001_000.0}}]});
        assert_eq!(cooldown_delay(&response, NOW), Duration::from_millis(4_000));
    }

    #[test]
    fn test_delay_is_clamped_at_zero() {
        let response = json!({"errors": [{"extensions": {"nextAvailablePixelTs": NOW - 10_000}}]});
        assert_eq!(cooldown_delay(&response, NOW), Duration::ZERO);

        // Exactly at the margin
        let response = json!({"errors": [{"extensions": {"nextAvailablePixelTs": NOW - 3000}}]});
        assert_eq!(cooldown_delay(&response, NOW), Duration::ZERO);
    }

    #[test]
    fn test_unparseable_responses_fall_back() {
        for response in [
            json!({}),
            json!({"errors": []}),
            json!({"errors": [{"message": "Unauthorized"}]}),
            json!({"data": {"act": {"data": []}}}),
            json!({"data": {"act": {"data": [{"data": {"nextAvailablePixelTimestamp": "soon"}}]}}}),
            json!("not an object"),
        ] {
            assert_eq!(cooldown_delay(&response, NOW), FALLBACK_DELAY, "{}", response);
        }
    }
}
