//! Cron scheduling shares the interval scheduler rather than introducing a separate
//! "cron" component: an expression is parsed at register/replace time and translated to
//! the delay until its next fire instant, and the task's delay moves after each run.

use std::str::FromStr;

use chrono::Utc;
use cron::Schedule;
use runtime_core::RuntimeError;

/// Normalizes a standard 5-field POSIX cron expression (`min hour dom month dow`, as used
/// by the `index-frequency` setting's `0 0 * * *` default) to the 6-field
/// seconds-first syntax the `cron` crate expects. 6- and 7-field expressions pass through
/// unchanged.
fn normalize(expr: &str) -> String {
    let fields = expr.split_whitespace().count();
    if fields == 5 {
        format!("0 {expr}")
    } else {
        expr.to_string()
    }
}

/// Parses `expr` and returns the number of milliseconds until its next occurrence after
/// `now`.
pub fn next_delay_ms(expr: &str, now: chrono::DateTime<Utc>) -> Result<u64, RuntimeError> {
    let expr = normalize(expr);
    let schedule = Schedule::from_str(&expr).map_err(|e| RuntimeError::Store(format!("invalid cron expression '{expr}': {e}")))?;
    let next = schedule
        .after(&now)
        .next()
        .ok_or_else(|| RuntimeError::Store(format!("cron expression '{expr}' has no future occurrence")))?;
    let millis = (next - now).num_milliseconds();
    Ok(millis.max(0) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_daily_midnight_expression() {
        let now = Utc::now();
        let delay = next_delay_ms("0 0 0 * * *", now).unwrap();
        assert!(delay > 0);
        assert!(delay <= 24 * 60 * 60 * 1000);
    }

    #[test]
    fn rejects_an_invalid_expression() {
        assert!(next_delay_ms("not a cron expression", Utc::now()).is_err());
    }
}
