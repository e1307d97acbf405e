//! # Calendar
//!
//! Month arithmetic for the flash logger's data files.
//!
//! Every data file holds exactly one calendar month of hourly readings, so the
//! size of a file is a pure function of `(month, year)`. Years are stored on
//! flash as two digits; the leap-year rule is applied to `2000 + year`.
//!
//! ## Example
//! ```rust
//! use calendar::{days_in_month, expected_record_count};
//!
//! assert_eq!(days_in_month(2, 24), 29);
//! assert_eq!(days_in_month(2, 23), 28);
//! assert_eq!(expected_record_count(2, 24), 29 * 24);
//! ```

/// Number of readings taken each day. One record per hour.
pub const SAMPLES_PER_DAY: u16 = 24;

/// First year of the century the two-digit year field is relative to.
pub const CENTURY_BASE: u16 = 2000;

// Ones-indexed; slot 0 is unused.
const DAYS_PER_MONTH: [u8; 13] = [0, 31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];

/// Gregorian leap-year rule on a full four-digit year.
pub fn is_leap(full_year: u16) -> bool {
    (full_year % 4 == 0 && full_year % 100 != 0) || full_year % 400 == 0
}

/// Returns the number of days in `month` (1..=12) of the two-digit `year`.
///
/// Month values outside `1..=12` are a caller error. They trip a debug
/// assertion and otherwise index past the table.
pub fn days_in_month(month: u8, year: u16) -> u8 {
    debug_assert!((1..=12).contains(&month), "month out of range: {month}");
    if month == 2 && is_leap(year.saturating_add(CENTURY_BASE)) {
        29
    } else {
        DAYS_PER_MONTH[month as usize]
    }
}

/// Number of records a data file for `(month, year)` must hold.
///
/// Used both to size new files and to check headers read back from flash.
pub fn expected_record_count(month: u8, year: u16) -> u16 {
    u16::from(days_in_month(month, year)) * SAMPLES_PER_DAY
}
