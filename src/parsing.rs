//! Value-level helpers shared by every DSSAT reader: two-digit-year dates,
//! "missing value" sentinels, and the byte decoding used for all inputs.
use chrono::{Datelike, Duration, NaiveDate};

/// Returned by [`translate_date`] for any date it cannot interpret.
pub const INVALID_DATE: &str = "-99";

/// Two-digit years up to and including this value are read as 20xx, later ones as 19xx.
// TODO: confirm against DSSAT which year the two-digit window should start from.
pub const CENTURY_PIVOT: i32 = 30;

/// Trim the way the DSSAT readers do: every character at or below a space counts
/// as blank, so control characters such as a trailing DOS end-of-file byte vanish too.
pub fn trim_blank(s: &str) -> &str {
    s.trim_matches(|c: char| c <= ' ')
}

/// Decode bytes as ISO-8859-1. Each byte becomes exactly one character, so column
/// widths count bytes and decoding never fails.
pub fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

/// Translate a `yyddd` date into `yyyymmdd`.
///
/// Equivalent to `translate_date_offset(date, "0")`.
pub fn translate_date(date: &str) -> String {
    translate_date_offset(date, "0")
}

/// Translate a `yyddd` date into `yyyymmdd`, shifted by `days` days.
///
/// `date` must be 4 or 5 characters long and is left-padded with zeros. The
/// two-digit year goes through the [`CENTURY_PIVOT`]. The day of year counts from
/// 1 and may run past the end of the year, in which case the date rolls forward.
/// `days` is read as a decimal number and truncated toward zero.
///
/// Any failure gives [`INVALID_DATE`] rather than an error:
///
/// ```
/// # use dssatformat::parsing::translate_date_offset;
/// assert_eq!(translate_date_offset("01365", "1"), "20020101");
/// assert_eq!(translate_date_offset("-99", "0"), "-99");
/// ```
pub fn translate_date_offset(date: &str, days: &str) -> String {
    let len = date.chars().count();
    if !(4..=5).contains(&len) {
        return INVALID_DATE.to_string();
    }

    ymd_from_doy(date, days).unwrap_or_else(|| INVALID_DATE.to_string())
}

fn ymd_from_doy(date: &str, days: &str) -> Option<String> {
    let padded = format!("{:05}", date.parse::<i32>().ok()?);
    let offset = days.trim().parse::<f64>().ok()? as i64;

    let mut year: i32 = padded.get(..2)?.parse().ok()?;
    year += if year <= CENTURY_PIVOT { 2000 } else { 1900 };
    let doy: i64 = padded.get(2..)?.parse().ok()?;

    let jan1 = NaiveDate::from_ymd_opt(year, 1, 1)?;
    let shift = Duration::try_days(doy.checked_sub(1)?.checked_add(offset)?)?;
    let d = jan1.checked_add_signed(shift)?;

    Some(format!("{:04}{:02}{:02}", d.year(), d.month(), d.day()))
}


/// The values DSSAT files use to mean "missing".
///
/// These are configuration of a reader rather than data; the defaults match the
/// DSSAT conventions and a reader may swap in its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sentinels {
    pub real: String,
    pub integer: String,
    pub character: String,
    pub date: String,
}

impl Default for Sentinels {
    fn default() -> Self {
        Self {
            real: "-99.0".to_string(),
            integer: "-99".to_string(),
            character: String::new(),
            date: "20110101".to_string(),
        }
    }
}

impl Sentinels {
    /// `false` if `value` holds a missing-value sentinel, `true` otherwise.
    ///
    /// Only the character sentinel is compared after trimming; the numeric ones must
    /// match the raw value exactly, so `" -99 "` still counts as meaningful.
    pub fn is_meaningful(&self, value: &str) -> bool {
        !(trim_blank(value) == self.character || value == self.integer || value == self.real)
    }
}
