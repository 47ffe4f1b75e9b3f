//! Server error code classification.

use std::ops::RangeInclusive;

/// What the connection engine does about a server-reported error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorPolicy {
    /// Stop permanently; the server refused this client.
    Fatal,
    /// Reconnect after the base reconnect delay.
    ReconnectWithDelay,
    /// Reconnect straight away.
    ReconnectImmediately,
    /// Log and stay on the current connection.
    Ignore,
}

const POLICY_TABLE: [(RangeInclusive<i64>, ErrorPolicy); 3] = [
    (4000..=4099, ErrorPolicy::Fatal),
    (4100..=4199, ErrorPolicy::ReconnectWithDelay),
    (4200..=4299, ErrorPolicy::ReconnectImmediately),
];

/// Map a server error code to a policy.
#[must_use]
pub fn classify(code: i64) -> ErrorPolicy {
    POLICY_TABLE
        .iter()
        .find(|(range, _)| range.contains(&code))
        .map_or(ErrorPolicy::Ignore, |(_, policy)| *policy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(4000, ErrorPolicy::Fatal)]
    #[test_case(4099, ErrorPolicy::Fatal)]
    #[test_case(4100, ErrorPolicy::ReconnectWithDelay)]
    #[test_case(4199, ErrorPolicy::ReconnectWithDelay)]
    #[test_case(4200, ErrorPolicy::ReconnectImmediately)]
    #[test_case(4299, ErrorPolicy::ReconnectImmediately)]
    #[test_case(3999, ErrorPolicy::Ignore)]
    #[test_case(4300, ErrorPolicy::Ignore)]
    #[test_case(0, ErrorPolicy::Ignore)]
    #[test_case(-4000, ErrorPolicy::Ignore)]
    fn test_classify_boundaries(code: i64, expected: ErrorPolicy) {
        assert_eq!(classify(code), expected);
    }
}
