//! Small utility helpers used across modules.

/// Render a 0..1 rate as a whole percentage, e.g. `0.3` -> `"30%"`.
pub fn pct(rate: f64) -> String {
  format!("{:.0}%", rate * 100.0)
}

/// True if `s` is a single ASCII uppercase letter (an answer option like "A").
pub fn is_option_letter(s: &str) -> bool {
  let mut chars = s.chars();
  matches!((chars.next(), chars.next()), (Some(c), None) if c.is_ascii_uppercase())
}
