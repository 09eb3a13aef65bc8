//! Human-readable size strings.
//!
//! Accepts both SI (decimal, `10M` / `512MB`) and IEC (binary, `1GiB` /
//! `64KiB`) suffixes, case-insensitively, with an optional fractional
//! part. Formatting is decimal, matching what operators see from `ls`.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SizeError {
    #[error("empty size string")]
    Empty,
    #[error("size {0:?} has no parseable number")]
    NotANumber(String),
    #[error("size {0:?} has an unknown unit suffix")]
    UnknownUnit(String),
    #[error("size {0:?} overflows a 64-bit byte count")]
    Overflow(String),
}

const KB: f64 = 1000.0;
const KIB: f64 = 1024.0;

fn multiplier(unit: &str) -> Option<f64> {
    // Bare letters are SI, the way container tooling has always read
    // them ("512M" means 512 * 10^6).
    let exp = |base: f64, n: i32| base.powi(n);
    match unit {
        "" | "b" => Some(1.0),
        "k" | "kb" => Some(KB),
        "m" | "mb" => Some(exp(KB, 2)),
        "g" | "gb" => Some(exp(KB, 3)),
        "t" | "tb" => Some(exp(KB, 4)),
        "p" | "pb" => Some(exp(KB, 5)),
        "ki" | "kib" => Some(KIB),
        "mi" | "mib" => Some(exp(KIB, 2)),
        "gi" | "gib" => Some(exp(KIB, 3)),
        "ti" | "tib" => Some(exp(KIB, 4)),
        "pi" | "pib" => Some(exp(KIB, 5)),
        _ => None,
    }
}

/// Parse a human size string into bytes.
pub fn parse_size(input: &str) -> Result<u64, SizeError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(SizeError::Empty);
    }

    let split = trimmed
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(trimmed.len());
    let (number, unit) = trimmed.split_at(split);
    let value: f64 = number
        .parse()
        .map_err(|_| SizeError::NotANumber(input.to_owned()))?;
    let factor = multiplier(unit.trim().to_ascii_lowercase().as_str())
        .ok_or_else(|| SizeError::UnknownUnit(input.to_owned()))?;

    let bytes = value * factor;
    if !bytes.is_finite() || bytes < 0.0 || bytes >= u64::MAX as f64 {
        return Err(SizeError::Overflow(input.to_owned()));
    }
    Ok(bytes as u64)
}

/// Format a byte count with a decimal suffix, one fractional digit.
#[must_use]
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 6] = ["B", "kB", "MB", "GB", "TB", "PB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= KB && unit < UNITS.len() - 1 {
        value /= KB;
        unit += 1;
    }
    if unit == 0 {
        return format!("{bytes}B");
    }
    let rendered = format!("{value:.1}");
    let rendered = rendered.strip_suffix(".0").unwrap_or(&rendered);
    format!("{rendered}{}", UNITS[unit])
}
