use std::time::Instant;
use tracing::info;

/// A simple wall-clock timer for logging elapsed time.
pub struct Timer {
    label: String,
    start: Instant,
}

impl Timer {
    pub fn start(label: impl Into<String>) -> Self {
        let label = label.into();
        info!("⏱  Starting: {}", label);
        Self {
            label,
            start: Instant::now(),
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        info!(
            "⏱  Finished: {} (took {:.2?})",
            self.label,
            self.start.elapsed()
        );
    }
}

/// Thousands separator used in vi-VN price display.
pub const VI_THOUSANDS: char = '.';

/// Render `n` with `sep` between each group of three digits, counted from
/// the right: `group_digits(85500000, '.')` → "85.500.000".
pub fn group_digits(n: i64, sep: char) -> String {
    let digits = n.unsigned_abs().to_string();
    let lead = digits.len() % 3;

    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if n < 0 {
        out.push('-');
    }
    for (i, d) in digits.char_indices() {
        if i > 0 && (i + 3 - lead) % 3 == 0 {
            out.push(sep);
        }
        out.push(d);
    }
    out
}
