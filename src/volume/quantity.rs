//! Capacity quantity parsing and comparison
//!
//! Kubernetes resource quantities arrive as strings (`10Gi`, `500M`,
//! `1048576`). The resize gates only ever need ordering, so quantities are
//! normalized to milli-units in an `i128`, which covers the full exbi range
//! without overflow.

use crate::error::{Error, Result};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use std::cmp::Ordering;

/// Parse a quantity string into milli-units.
///
/// Supported forms: optional sign, integer with optional decimal fraction,
/// followed by an optional binary suffix (`Ki Mi Gi Ti Pi Ei`), decimal
/// suffix (`k M G T P E`), the milli suffix (`m`), or a decimal exponent
/// (`e3`, `E6`).
pub fn parse_quantity(q: &Quantity) -> Result<i128> {
    let s = q.0.trim();
    if s.is_empty() {
        return Err(Error::CapacityParse("empty quantity".into()));
    }

    let (sign, rest) = match s.strip_prefix('-') {
        Some(rest) => (-1i128, rest),
        None => (1i128, s.strip_prefix('+').unwrap_or(s)),
    };

    let digits_end = rest
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(rest.len());
    let (number, suffix) = rest.split_at(digits_end);
    if number.is_empty() {
        return Err(Error::CapacityParse(format!("no digits in {:?}", s)));
    }

    let (int_part, frac_part) = match number.split_once('.') {
        Some((i, f)) => (i, f),
        None => (number, ""),
    };
    if frac_part.contains('.') {
        return Err(Error::CapacityParse(format!("malformed number in {:?}", s)));
    }

    let multiplier: i128 = match suffix {
        "" => 1,
        "m" => return scaled(sign, int_part, frac_part, 1, 1),
        "Ki" => 1 << 10,
        "Mi" => 1 << 20,
        "Gi" => 1 << 30,
        "Ti" => 1 << 40,
        "Pi" => 1 << 50,
        "Ei" => 1 << 60,
        "k" => 1_000,
        "M" => 1_000_000,
        "G" => 1_000_000_000,
        "T" => 1_000_000_000_000,
        "P" => 1_000_000_000_000_000,
        "E" => 1_000_000_000_000_000_000,
        _ => {
            // decimal exponent: e/E followed by digits
            let exp = suffix
                .strip_prefix('e')
                .or_else(|| suffix.strip_prefix('E'))
                .and_then(|e| e.parse::<u32>().ok())
                .ok_or_else(|| Error::CapacityParse(format!("unknown suffix in {:?}", s)))?;
            10i128
                .checked_pow(exp)
                .ok_or_else(|| Error::CapacityParse(format!("exponent overflow in {:?}", s)))?
        }
    };

    scaled(sign, int_part, frac_part, multiplier, 1_000)
}

/// Combine integer and fraction parts into `sign * value * multiplier * scale`
/// milli-units, where `scale` is 1000 except for the already-milli suffix.
fn scaled(sign: i128, int_part: &str, frac_part: &str, multiplier: i128, scale: i128) -> Result<i128> {
    let int_value: i128 = if int_part.is_empty() {
        0
    } else {
        int_part
            .parse()
            .map_err(|_| Error::CapacityParse(format!("bad integer part {:?}", int_part)))?
    };

    let mut value = int_value
        .checked_mul(multiplier)
        .and_then(|v| v.checked_mul(scale))
        .ok_or_else(|| Error::CapacityParse("quantity overflow".into()))?;

    if !frac_part.is_empty() {
        // evaluate up to milli precision of the multiplied value
        let frac: i128 = frac_part
            .parse()
            .map_err(|_| Error::CapacityParse(format!("bad fraction part {:?}", frac_part)))?;
        let denom = 10i128
            .checked_pow(frac_part.len() as u32)
            .ok_or_else(|| Error::CapacityParse("fraction too long".into()))?;
        value += frac * multiplier * scale / denom;
    }

    Ok(sign * value)
}

/// Compare two quantities numerically
pub fn compare_quantities(a: &Quantity, b: &Quantity) -> Result<Ordering> {
    Ok(parse_quantity(a)?.cmp(&parse_quantity(b)?))
}
