//! Display helpers for counters and durations.

/// Abbreviates a counter: `1234` → `1.2K`, `5_600_000` → `5.6M`.
pub fn process_num(num: i64) -> String {
    let n = num as f64;
    if num >= 1_000_000_000 {
        format!("{:.1}B", n / 1_000_000_000.0)
    } else if num >= 1_000_000 {
        format!("{:.1}M", n / 1_000_000.0)
    } else if num >= 1_000 {
        format!("{:.1}K", n / 1_000.0)
    } else {
        num.to_string()
    }
}

/// Abbreviates a counter that arrived as JSON (number or numeric string).
/// Anything else renders as `0`.
pub fn process_value(value: &serde_json::Value) -> String {
    let num = match value {
        serde_json::Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    process_num(num.unwrap_or(0))
}

/// Formats milliseconds as `HH:MM:SS`, or `MM:SS` under an hour.
pub fn process_duration_ms(duration: u64) -> String {
    let hours = duration / 3_600_000;
    let minutes = duration / 60_000 % 60;
    let seconds = duration / 1_000 % 60;
    if hours > 0 {
        format!("{hours:02}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes:02}:{seconds:02}")
    }
}
