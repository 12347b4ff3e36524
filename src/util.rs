use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use crate::agent::error::AgentError;

/// Truncate to `max` characters, appending `…` when anything was cut.
/// Character-based, not byte-based, so multi-byte text stays valid.
pub fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let kept: String = text.chars().take(max).collect();
    format!("{}…", kept)
}

/// Short base36 identifier derived from the clock, unique enough to
/// namespace one agent's marker attributes against another's.
pub fn short_id() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let mut n = (nanos ^ (std::process::id() as u128) << 32) % 36u128.pow(6);
    let digits = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut out = [b'0'; 6];
    for slot in out.iter_mut().rev() {
        *slot = digits[(n % 36) as usize];
        n /= 36;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Poll `predicate` at ~100ms until it holds or `deadline` elapses.
pub fn wait_until(
    mut predicate: impl FnMut() -> bool,
    deadline: Duration,
    what: &str,
) -> Result<(), AgentError> {
    let start = Instant::now();
    loop {
        if predicate() {
            return Ok(());
        }
        if start.elapsed() >= deadline {
            return Err(AgentError::Timeout {
                what: what.to_string(),
                waited_ms: start.elapsed().as_millis() as u64,
            });
        }
        std::thread::sleep(Duration::from_millis(100));
    }
}

/// Turn a failed runtime expectation into an `Extraction` error.
pub fn ensure(condition: bool, message: &str) -> Result<(), AgentError> {
    if condition {
        Ok(())
    } else {
        Err(AgentError::Extraction(message.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_keeps_short_text() {
        assert_eq!(truncate_chars("short", 20), "short");
    }

    #[test]
    fn truncate_cuts_and_marks() {
        assert_eq!(truncate_chars("abcdefghij", 4), "abcd…");
    }

    #[test]
    fn truncate_is_char_safe() {
        assert_eq!(truncate_chars("héllo wörld", 5), "héllo…");
    }

    #[test]
    fn short_id_shape() {
        let id = short_id();
        assert_eq!(id.len(), 6);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn wait_until_times_out() {
        let err = wait_until(|| false, Duration::from_millis(50), "never").unwrap_err();
        assert!(matches!(err, AgentError::Timeout { .. }));
    }

    #[test]
    fn wait_until_succeeds_immediately() {
        assert!(wait_until(|| true, Duration::from_millis(50), "now").is_ok());
    }
}
