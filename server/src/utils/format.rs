//! Display helpers shared by the API responses, the CSV export and the
//! object-storage path builder.

use chrono::{DateTime, Datelike, Timelike, Utc};
use rust_decimal::Decimal;

const MONTHS_ES: [&str; 12] = [
    "enero",
    "febrero",
    "marzo",
    "abril",
    "mayo",
    "junio",
    "julio",
    "agosto",
    "septiembre",
    "octubre",
    "noviembre",
    "diciembre",
];

/// Long Spanish date with 24h time, e.g. `23 de noviembre de 2025 20:30 hs.`
pub fn format_timestamp(at: &DateTime<Utc>) -> String {
    let month = MONTHS_ES[at.month0() as usize];
    format!(
        "{} de {} de {} {:02}:{:02} hs.",
        at.day(),
        month,
        at.year(),
        at.hour(),
        at.minute()
    )
}

/// Chilean pesos have no minor unit.
pub fn format_clp(amount: Decimal) -> String {
    format!("CLP${}", amount.round_dp(0).normalize())
}

/// Lower-cases and collapses every run of characters outside `[a-z0-9]` into a
/// single `-`.
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut in_gap = false;
    for ch in input.to_lowercase().chars() {
        if ch.is_ascii_lowercase() || ch.is_ascii_digit() {
            slug.push(ch);
            in_gap = false;
        } else if !in_gap {
            slug.push('-');
            in_gap = true;
        }
    }
    slug
}

/// Percent-encodes everything except RFC 3986 unreserved characters.
pub fn encode_component(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}
