//! Month file names: `data-MM-YY.bin`.

use flash::MAX_NAME_LEN;

use crate::error::EncodingError;

pub const FILE_BASE_NAME: &str = "data";
pub const EXTENSION: &str = "bin";

const MONTH_OFFSET: usize = 5;
const YEAR_OFFSET: usize = 8;

/// Builds the name of the data file for `month` of the two-digit `year`.
///
/// Both fields are zero-padded to two digits. Out-of-range values are
/// rejected here rather than producing a name that breaks the fixed pattern.
pub fn encode(month: u8, year: u16) -> Result<String, EncodingError> {
    if !(1..=12).contains(&month) {
        return Err(EncodingError::MonthOutOfRange(month));
    }
    if year > 99 {
        return Err(EncodingError::YearOutOfRange(year));
    }
    let name = format!("{FILE_BASE_NAME}-{month:02}-{year:02}.{EXTENSION}");
    if name.len() > MAX_NAME_LEN {
        return Err(EncodingError::NameTooLong {
            name,
            max: MAX_NAME_LEN,
        });
    }
    Ok(name)
}

/// Recovers `(month, year)` from a name produced by [`encode`].
///
/// Best effort: anything not shaped like `data-MM-YY.bin`, with non-digit
/// fields or a zero month, yields `None`.
pub fn decode(name: &str) -> Option<(u8, u16)> {
    let bytes = name.as_bytes();
    let expected_len = YEAR_OFFSET + 2 + 1 + EXTENSION.len();
    if bytes.len() != expected_len
        || !name.starts_with(FILE_BASE_NAME)
        || bytes[MONTH_OFFSET - 1] != b'-'
        || bytes[YEAR_OFFSET - 1] != b'-'
        || !name.ends_with(EXTENSION)
        || bytes[YEAR_OFFSET + 2] != b'.'
    {
        return None;
    }

    let month = two_digits(&bytes[MONTH_OFFSET..MONTH_OFFSET + 2])?;
    let year = two_digits(&bytes[YEAR_OFFSET..YEAR_OFFSET + 2])?;
    if month == 0 || month > 12 {
        return None;
    }
    Some((month, u16::from(year)))
}

fn two_digits(field: &[u8]) -> Option<u8> {
    match field {
        [hi, lo] if hi.is_ascii_digit() && lo.is_ascii_digit() => Some((hi - b'0') * 10 + (lo - b'0')),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_zero_padded() {
        assert_eq!(encode(2, 24).unwrap(), "data-02-24.bin");
        assert_eq!(encode(12, 5).unwrap(), "data-12-05.bin");
        assert_eq!(encode(1, 0).unwrap(), "data-01-00.bin");
    }

    #[test]
    fn rejects_out_of_range() {
        assert_eq!(encode(0, 24), Err(EncodingError::MonthOutOfRange(0)));
        assert_eq!(encode(13, 24), Err(EncodingError::MonthOutOfRange(13)));
        assert_eq!(encode(1, 100), Err(EncodingError::YearOutOfRange(100)));
    }

    #[test]
    fn round_trip_all_months_and_years() {
        for year in 0..100u16 {
            for month in 1..=12u8 {
                let name = encode(month, year).unwrap();
                assert_eq!(decode(&name), Some((month, year)), "{name}");
            }
        }
    }

    #[test]
    fn decode_rejects_garbage() {
        assert_eq!(decode("data-00-24.bin"), None);
        assert_eq!(decode("data-1x-24.bin"), None);
        assert_eq!(decode("data-01-2.bin"), None);
        assert_eq!(decode("log-01-24.bin"), None);
        assert_eq!(decode("data-01-24.txt"), None);
        assert_eq!(decode("FLASHDIR"), None);
        assert_eq!(decode(""), None);
    }
}
