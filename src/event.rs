use chrono::{NaiveDate, Utc};

/// Day bucket used for every visit: the current calendar date in UTC.
///
/// Visits are never bucketed by the host's local timezone so that two
/// processes on differently configured machines agree on the same key.
pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/// Parse an ISO-8601 `YYYY-MM-DD` date as stored in the `pagevisits` table
pub fn parse_date(s: &str) -> crate::Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| crate::Error::InvalidDate(s.to_string()))
}

/// A single "page viewed" event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisitEvent {
    pub page_path: String,
    pub observed_date: NaiveDate,
}

impl VisitEvent {
    pub fn new(page_path: impl Into<String>, observed_date: NaiveDate) -> Self {
        Self {
            page_path: page_path.into(),
            observed_date,
        }
    }

    /// Event observed now, bucketed by [`today`]
    pub fn now(page_path: impl Into<String>) -> Self {
        Self::new(page_path, today())
    }

    pub fn into_key(self) -> VisitKey {
        VisitKey {
            date: self.observed_date,
            page: self.page_path,
        }
    }
}

/// Composite key shared by the aggregation buffer and the durable table
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VisitKey {
    pub date: NaiveDate,
    pub page: String,
}

impl VisitKey {
    pub fn new(date: NaiveDate, page: impl Into<String>) -> Self {
        Self {
            date,
            page: page.into(),
        }
    }

    /// Date column value (`YYYY-MM-DD`)
    pub fn date_string(&self) -> String {
        self.date.format("%Y-%m-%d").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_from_event() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        let event = VisitEvent::new("/blog", date);
        let key = event.into_key();
        assert_eq!(key, VisitKey::new(date, "/blog"));
        assert_eq!(key.date_string(), "2024-03-09");
    }

    #[test]
    fn test_parse_date() {
        let date = parse_date("2024-12-31").unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2024, 12, 31).unwrap());
        assert!(matches!(
            parse_date("31/12/2024"),
            Err(crate::Error::InvalidDate(_))
        ));
    }
}
