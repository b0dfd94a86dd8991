//! Field formatting shared by the CSV serializers.

use canopy_pipeline::{Cover, ERROR_SENTINEL, NO_DATA_SENTINEL, Provenance};

/// Significant digits used for canopy cover values.
pub const SIGNIFICANT_DIGITS: usize = 3;

/// Format `value` with `digits` significant digits, `%g` style.
///
/// Fixed notation is used when the decimal exponent lies in
/// `[-4, digits)`, scientific notation otherwise. Trailing zeros and a
/// trailing decimal point are removed.
///
/// ```
/// use canopy_export::significant_digits;
///
/// assert_eq!(significant_digits(99.757, 3), "99.8");
/// assert_eq!(significant_digits(100.0, 3), "100");
/// assert_eq!(significant_digits(0.000_012_34, 3), "1.23e-05");
/// ```
#[must_use]
pub fn significant_digits(value: f64, digits: usize) -> String {
    if !value.is_finite() {
        return value.to_string();
    }
    let digits = digits.max(1);

    // Round once in scientific notation to learn the exponent after
    // rounding (99.96 becomes 1.00e2, not 9.996e1).
    let scientific = format!("{value:.prec$e}", prec = digits - 1);
    let Some((mantissa, exponent)) = scientific.split_once('e') else {
        return scientific;
    };
    let Ok(exponent) = exponent.parse::<i32>() else {
        return scientific;
    };
    let max_exponent = i32::try_from(digits).unwrap_or(i32::MAX);

    if (-4..max_exponent).contains(&exponent) {
        let decimals = usize::try_from(max_exponent - 1 - exponent).unwrap_or(0);
        trim_fraction(&format!("{value:.decimals$}"))
    } else {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!(
            "{}e{sign}{:02}",
            trim_fraction(mantissa),
            exponent.unsigned_abs()
        )
    }
}

fn trim_fraction(text: &str) -> String {
    if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        text.to_string()
    }
}

/// Text for a cover value: the percentage with
/// [`SIGNIFICANT_DIGITS`], or the integer sentinel.
#[must_use]
pub fn cover_text(cover: Cover) -> String {
    match cover {
        Cover::Percent(p) => significant_digits(p, SIGNIFICANT_DIGITS),
        Cover::NoData => format!("{NO_DATA_SENTINEL:.0}"),
        Cover::Failed => format!("{ERROR_SENTINEL:.0}"),
    }
}

/// `YYYY-MM-DDTHH:MM:SS` prefix of an ISO 8601 timestamp.
///
/// Fractional seconds and the UTC offset are dropped. Shorter inputs
/// are returned unchanged.
#[must_use]
pub fn local_datetime(timestamp: &str) -> &str {
    timestamp.get(..19).unwrap_or(timestamp)
}

/// `YYYY-MM-DD` prefix of an ISO 8601 timestamp.
#[must_use]
pub fn date_part(timestamp: &str) -> &str {
    timestamp.get(..10).unwrap_or(timestamp)
}

/// Citation year, falling back to the year of the capture timestamp.
#[must_use]
pub fn citation_year(provenance: &Provenance) -> String {
    if let Some(year) = &provenance.citation_year {
        return year.clone();
    }
    provenance
        .timestamp
        .as_deref()
        .and_then(|timestamp| timestamp.get(..4))
        .filter(|year| year.bytes().all(|b| b.is_ascii_digit()))
        .map_or_else(|| Provenance::UNKNOWN.to_string(), str::to_string)
}
