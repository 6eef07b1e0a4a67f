use chrono::{DateTime, NaiveDate, NaiveDateTime};

pub const ISO_DATE: &str = "%Y-%m-%d";

const TIMESTAMP_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
];

/// Parses a date-like value down to its calendar date.
///
/// Grid round trips and older rows hand back timestamps such as
/// `2024-05-01T00:00:00` or `2024-05-01 00:00:00+00:00`; only the date part
/// is kept so that two representations of the same day compare equal.
pub fn parse_calendar_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, ISO_DATE) {
        return Some(date);
    }
    if let Ok(stamp) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(stamp.date_naive());
    }
    if let Ok(stamp) = DateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S%:z") {
        return Some(stamp.date_naive());
    }
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(trimmed, format).ok())
        .map(|stamp| stamp.date())
}

pub fn format_date(date: NaiveDate) -> String {
    date.format(ISO_DATE).to_string()
}

pub mod calendar_date {
    use super::{format_date, parse_calendar_date};
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(date: &NaiveDate, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_date(*date))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDate, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse_calendar_date(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid date '{}'", raw)))
    }
}

pub mod optional_calendar_date {
    use super::{format_date, parse_calendar_date};
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(date: &Option<NaiveDate>, serializer: S) -> Result<S::Ok, S::Error> {
        match date {
            Some(date) => serializer.serialize_some(&format_date(*date)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<NaiveDate>, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        match raw {
            None => Ok(None),
            Some(raw) if raw.trim().is_empty() => Ok(None),
            Some(raw) => parse_calendar_date(&raw)
                .map(Some)
                .ok_or_else(|| serde::de::Error::custom(format!("invalid date '{}'", raw))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{format_date, parse_calendar_date};
    use chrono::NaiveDate;

    #[test]
    fn timestamps_collapse_to_their_calendar_date() {
        let expected = NaiveDate::from_ymd_opt(2024, 5, 1).expect("date");
        for raw in [
            "2024-05-01",
            " 2024-05-01 ",
            "2024-05-01T00:00:00",
            "2024-05-01T13:45:10.250",
            "2024-05-01 00:00:00",
            "2024-05-01T23:30:00-02:00",
            "2024-05-01 08:00:00+02:00",
        ] {
            assert_eq!(parse_calendar_date(raw), Some(expected), "input {raw:?}");
        }
    }

    #[test]
    fn rejects_garbage_and_blank_input() {
        assert_eq!(parse_calendar_date(""), None);
        assert_eq!(parse_calendar_date("NaT"), None);
        assert_eq!(parse_calendar_date("01/05/2024"), None);
    }

    #[test]
    fn formats_as_iso_date() {
        let date = NaiveDate::from_ymd_opt(2023, 1, 9).expect("date");
        assert_eq!(format_date(date), "2023-01-09");
    }
}
