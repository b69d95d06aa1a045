//! The timeout controller: parses the client's `Grpc-Timeout` header, clamps
//! it against handler policy, and hands back a [`TimeoutGrant`] whose
//! cancellation trigger fires on every exit path.

use std::time::Duration;

use http::{HeaderMap, HeaderValue};
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::status::{Code, Status};

pub(crate) const GRPC_TIMEOUT_HEADER: &str = "grpc-timeout";

const SECONDS_IN_HOUR: u64 = 60 * 60;
const SECONDS_IN_MINUTE: u64 = 60;

/// Parses the `Grpc-Timeout` header if present: ASCII digits (at most 8,
/// per the gRPC spec) followed by a unit in `{H, M, S, m, u, n}`.
///
/// Returns `Ok(None)` if the header is absent, `Ok(Some(d))` if parsed, or
/// an `InvalidArgument` status for a malformed header.
pub(crate) fn try_parse_grpc_timeout(headers: &HeaderMap<HeaderValue>) -> Result<Option<Duration>, Status> {
    let Some(val) = headers.get(GRPC_TIMEOUT_HEADER) else {
        return Ok(None);
    };

    let malformed = || {
        tracing::trace!("error parsing grpc-timeout header");
        Status::new(Code::InvalidArgument, "malformed grpc-timeout header")
    };

    let s = val.to_str().map_err(|_| malformed())?;
    if s.is_empty() {
        return Err(malformed());
    }

    // `HeaderValue::to_str` only succeeds for ASCII, so splitting at a byte
    // boundary one character from the end is always valid.
    let (timeout_value, timeout_unit) = s.split_at(s.len() - 1);

    // gRPC spec: TimeoutValue is at most 8 digits; this also prevents
    // integer overflow from ever occurring.
    if timeout_value.len() > 8 {
        return Err(malformed());
    }

    let timeout_value: u64 = timeout_value.parse().map_err(|_| malformed())?;

    let duration = match timeout_unit {
        "H" => Duration::from_secs(timeout_value * SECONDS_IN_HOUR),
        "M" => Duration::from_secs(timeout_value * SECONDS_IN_MINUTE),
        "S" => Duration::from_secs(timeout_value),
        "m" => Duration::from_millis(timeout_value),
        "u" => Duration::from_micros(timeout_value),
        "n" => Duration::from_nanos(timeout_value),
        _ => return Err(malformed()),
    };

    Ok(Some(duration))
}

/// The handler-side clamp policy: `min`/`max` durations, `0` meaning
/// unbounded in each direction.
#[derive(Clone, Copy, Debug, Default)]
pub struct TimeoutPolicy {
    pub min: Duration,
    pub max: Duration,
}

/// Derive the effective deadline duration from the client's requested
/// duration (if any) and the handler's clamp policy.
///
/// - below `min` (when `min` is positive) → fails immediately with
///   `DeadlineExceeded`
/// - above `max` (when `max` is positive), including an absent client
///   deadline → capped to `max`
/// - absent deadline and `max == 0` → no deadline at all (`Ok(None)`)
pub(crate) fn clamp(client: Option<Duration>, policy: TimeoutPolicy) -> Result<Option<Duration>, Status> {
    if let Some(d) = client {
        if !policy.min.is_zero() && d < policy.min {
            return Err(Status::new(
                Code::DeadlineExceeded,
                format!("requested timeout {d:?} is below the minimum of {:?}", policy.min),
            ));
        }
    }

    let effective = match (client, policy.max.is_zero()) {
        (None, true) => None,
        (None, false) => Some(policy.max),
        (Some(d), true) => Some(d),
        (Some(d), false) => Some(std::cmp::min(d, policy.max)),
    };

    Ok(effective)
}

/// A guard that fires its cancellation trigger unconditionally when
/// dropped, so release happens on every exit path without requiring each
/// call site to remember to signal manually.
struct CancelGuard(Option<oneshot::Sender<()>>);

impl Drop for CancelGuard {
    fn drop(&mut self) {
        if let Some(tx) = self.0.take() {
            let _ = tx.send(());
        }
    }
}

/// The request-scoped deadline plus its cancellation channel. The receiver
/// half is handed to the invocation callable so it can observe
/// cancellation.
pub struct TimeoutGrant {
    deadline: Option<Instant>,
    _cancel: CancelGuard,
}

impl TimeoutGrant {
    pub(crate) fn new(effective: Option<Duration>) -> (TimeoutGrant, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        let grant = TimeoutGrant {
            deadline: effective.map(|d| Instant::now() + d),
            _cancel: CancelGuard(Some(tx)),
        };
        (grant, rx)
    }

    /// The effective deadline, or `None` if no timeout was installed.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck::{Arbitrary, Gen};
    use quickcheck_macros::quickcheck;

    fn setup(val: Option<&str>) -> Result<Option<Duration>, Status> {
        let mut hm = HeaderMap::new();
        if let Some(v) = val {
            hm.insert(GRPC_TIMEOUT_HEADER, HeaderValue::from_str(v).unwrap());
        }
        try_parse_grpc_timeout(&hm)
    }

    #[test]
    fn hours() {
        assert_eq!(setup(Some("3H")).unwrap().unwrap(), Duration::from_secs(3 * 60 * 60));
    }

    #[test]
    fn minutes() {
        assert_eq!(setup(Some("1M")).unwrap().unwrap(), Duration::from_secs(60));
    }

    #[test]
    fn seconds() {
        assert_eq!(setup(Some("42S")).unwrap().unwrap(), Duration::from_secs(42));
    }

    #[test]
    fn milliseconds() {
        assert_eq!(setup(Some("500m")).unwrap().unwrap(), Duration::from_millis(500));
    }

    #[test]
    fn microseconds() {
        assert_eq!(setup(Some("2u")).unwrap().unwrap(), Duration::from_micros(2));
    }

    #[test]
    fn nanoseconds() {
        assert_eq!(setup(Some("82n")).unwrap().unwrap(), Duration::from_nanos(82));
    }

    #[test]
    fn header_not_present() {
        assert!(setup(None).unwrap().is_none());
    }

    #[test]
    fn invalid_unit_is_invalid_argument() {
        let err = setup(Some("82f")).unwrap_err();
        assert_eq!(err.code(), Code::InvalidArgument);
    }

    #[test]
    fn too_many_digits_is_invalid_argument() {
        let err = setup(Some("123456789H")).unwrap_err();
        assert_eq!(err.code(), Code::InvalidArgument);
    }

    #[test]
    fn non_digit_value_is_invalid_argument() {
        let err = setup(Some("oneH")).unwrap_err();
        assert_eq!(err.code(), Code::InvalidArgument);
    }

    #[quickcheck]
    fn fuzz_never_panics(header_value: HeaderValueGen) -> bool {
        let _ = setup(Some(&header_value.0));
        true
    }

    #[derive(Clone, Debug)]
    struct HeaderValueGen(String);

    impl Arbitrary for HeaderValueGen {
        fn arbitrary(g: &mut Gen) -> Self {
            let max = *g.choose(&(1..70).collect::<Vec<_>>()).unwrap();
            let bytes: Vec<u8> = (0..max)
                .map(|_| *g.choose(b"0123456789HMSmun----").unwrap())
                .collect();
            Self(String::from_utf8(bytes).unwrap())
        }
    }

    #[test]
    fn clamp_below_minimum_fails_deadline_exceeded() {
        let policy = TimeoutPolicy {
            min: Duration::from_secs(1),
            max: Duration::ZERO,
        };
        let err = clamp(Some(Duration::from_millis(500)), policy).unwrap_err();
        assert_eq!(err.code(), Code::DeadlineExceeded);
    }

    #[test]
    fn clamp_above_maximum_caps() {
        let policy = TimeoutPolicy {
            min: Duration::ZERO,
            max: Duration::from_secs(5),
        };
        let effective = clamp(Some(Duration::from_secs(30)), policy).unwrap();
        assert_eq!(effective, Some(Duration::from_secs(5)));
    }

    #[test]
    fn clamp_absent_deadline_with_max_uses_max() {
        let policy = TimeoutPolicy {
            min: Duration::ZERO,
            max: Duration::from_secs(5),
        };
        assert_eq!(clamp(None, policy).unwrap(), Some(Duration::from_secs(5)));
    }

    #[test]
    fn clamp_absent_deadline_no_max_installs_none() {
        let policy = TimeoutPolicy::default();
        assert_eq!(clamp(None, policy).unwrap(), None);
    }

    #[test]
    fn clamp_within_bounds_passes_through() {
        let policy = TimeoutPolicy {
            min: Duration::from_secs(1),
            max: Duration::from_secs(10),
        };
        assert_eq!(clamp(Some(Duration::from_secs(5)), policy).unwrap(), Some(Duration::from_secs(5)));
    }

    #[tokio::test]
    async fn cancel_guard_fires_on_drop() {
        let (grant, rx) = TimeoutGrant::new(Some(Duration::from_secs(60)));
        assert!(grant.deadline().is_some());
        drop(grant);
        rx.await.expect("cancellation trigger should fire on drop");
    }
}
