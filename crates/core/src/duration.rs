//! Duration parsing for request parameters.

use crate::error::{Error, Result};
use std::time::Duration;

/// Parse a human duration: a bare number of seconds, or a number with an
/// `s`, `m` or `h` suffix (`120`, `120s`, `2m`, `1h`).
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return Err(Error::InvalidDuration(s.to_string()));
    }

    let (digits, unit) = match s.find(|c: char| !c.is_ascii_digit()) {
        Some(i) => s.split_at(i),
        None => (s, "s"),
    };

    let n: u64 = digits
        .parse()
        .map_err(|_| Error::InvalidDuration(s.to_string()))?;

    let secs = match unit {
        "s" => n,
        "m" => n * 60,
        "h" => n * 3600,
        _ => return Err(Error::InvalidDuration(s.to_string())),
    };

    Ok(Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_suffixed_forms() {
        assert_eq!(parse_duration("120").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_duration("120s").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
    }

    #[test]
    fn rejects_garbage() {
        for given in ["", "abc", "12x", "m", "-5s", "1.5m"] {
            assert!(parse_duration(given).is_err(), "{given}");
        }
    }
}
