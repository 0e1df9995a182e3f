//! Reference-code matching against remote pricing candidates.
//!
//! The remote API returns every SKU on a product page, identified by codes
//! that almost but not quite line up with ours: casing differs, separators
//! differ, and dimensions may be quoted in centimetres where ours are in
//! inches. A quote bound to the wrong SKU is worse than no quote, so a
//! candidate is only accepted when one of the comparisons below holds.

use rust_decimal::Decimal;

use crate::domain::quote::ReferenceCode;
use crate::pricing::sources::TierPricing;

/// Strip separators and lowercase, so `Blanket_Sherpa-fleece` and
/// `blanketsherpafleece` compare equal.
fn normalize(code: &str) -> String {
    code.chars()
        .filter(|ch| *ch != '_' && *ch != '-')
        .flat_map(char::to_lowercase)
        .collect()
}

/// First `<digits>x<digits>` token in a code, e.g. `30x40` out of
/// `BlanketSherpafleece_30x40`.
fn extract_dimensions(code: &str) -> Option<(u32, u32)> {
    let lowered = code.to_ascii_lowercase();
    let bytes = lowered.as_bytes();
    let mut index = 0;

    while index < bytes.len() {
        if !bytes[index].is_ascii_digit() {
            index += 1;
            continue;
        }

        let width_start = index;
        while index < bytes.len() && bytes[index].is_ascii_digit() {
            index += 1;
        }
        if index >= bytes.len() || bytes[index] != b'x' {
            continue;
        }
        let width = lowered[width_start..index].parse().ok()?;

        index += 1;
        let height_start = index;
        while index < bytes.len() && bytes[index].is_ascii_digit() {
            index += 1;
        }
        if height_start == index {
            continue;
        }
        let height = lowered[height_start..index].parse().ok()?;
        return Some((width, height));
    }

    None
}

fn to_centimetres(inches: u32) -> u32 {
    // 1 inch = 2.54 cm, rounded to the nearest whole centimetre.
    ((f64::from(inches) * 2.54) + 0.5) as u32
}

/// Exact (case-insensitive), normalized, or unit-converted comparison.
pub fn candidate_matches(ours: &ReferenceCode, candidate: &str) -> bool {
    if candidate.eq_ignore_ascii_case(ours.as_str()) {
        return true;
    }
    if normalize(candidate) == normalize(ours.as_str()) {
        return true;
    }

    if let Some((width, height)) = extract_dimensions(ours.as_str()) {
        let candidate_lower = candidate.to_ascii_lowercase();
        let inches = format!("{width}x{height}");
        let centimetres = format!("{}x{}", to_centimetres(width), to_centimetres(height));
        if candidate_lower.contains(&inches) || candidate_lower.contains(&centimetres) {
            return true;
        }
    }

    false
}

/// Single-unit price of the first candidate that matches the requested
/// reference code. Non-matching candidates are never used.
pub fn unit_price_for(ours: &ReferenceCode, candidates: &[TierPricing]) -> Option<Decimal> {
    candidates
        .iter()
        .find(|tier| candidate_matches(ours, &tier.candidate_id))
        .and_then(|tier| {
            tier.prices.iter().find(|entry| entry.quantity == 1).map(|entry| entry.price)
        })
        .filter(|price| *price > Decimal::ZERO)
}
