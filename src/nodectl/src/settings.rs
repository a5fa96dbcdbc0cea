use std::path::PathBuf;
use std::time::Duration;

/// A loop's poll interval: an environment variable that may override a compiled-in default. The
/// variable is read every time, so an operator can change it without a restart.
#[derive(Debug, Clone, Copy)]
pub struct PollInterval {
  /// The overriding environment variable.
  pub var: &'static str,
  /// Used when the variable is unset or unparseable.
  pub default: Duration,
}

impl PollInterval {
  /// The interval currently in effect.
  pub fn current(&self) -> Duration {
    match std::env::var(self.var) {
      Ok(value) => parse_duration(&value).unwrap_or_else(|| {
        log::warn!("invalid {} '{value}', using default {:?}", self.var, self.default);
        self.default
      }),
      Err(_) => self.default,
    }
  }
}

/// Parses durations written the way the darknode tooling has always accepted them: one or more
/// `<number><unit>` pairs with units `h`, `m`, `s`, `ms`, `us`/`µs` or `ns` (e.g. `1h30m`,
/// `2.5s`). Zero and negative durations are rejected; a zero poll interval would spin.
pub fn parse_duration(input: &str) -> Option<Duration> {
  let mut remaining = input.trim();

  if remaining.is_empty() {
    return None;
  }

  // Accumulated in nanoseconds.
  let mut total = 0f64;

  while !remaining.is_empty() {
    let number_end = remaining
      .find(|c: char| !(c.is_ascii_digit() || c == '.'))
      .unwrap_or(remaining.len());
    let (number, rest) = remaining.split_at(number_end);

    if number.is_empty() || number == "." {
      return None;
    }

    let value = number.parse::<f64>().ok()?;
    let unit_end = rest
      .find(|c: char| c.is_ascii_digit() || c == '.')
      .unwrap_or(rest.len());
    let (unit, rest) = rest.split_at(unit_end);

    let scale = match unit {
      "h" => 3.6e12,
      "m" => 6e10,
      "s" => 1e9,
      "ms" => 1e6,
      "us" | "µs" => 1e3,
      "ns" => 1f64,
      _ => return None,
    };

    total += value * scale;
    remaining = rest;
  }

  if total.is_finite() && total >= 1f64 && total < u64::MAX as f64 {
    Some(Duration::from_nanos(total.round() as u64))
  } else {
    None
  }
}

/// The darknode home directory for the current user (`$HOME/.darknode`).
pub fn default_home() -> PathBuf {
  let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
  PathBuf::from(home).join(crate::constants::HOME_DIRECTORY)
}
