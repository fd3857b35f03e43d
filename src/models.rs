use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::ScrapeError;

/// One fully specified upstream search: location, stay dates and occupancy.
/// Immutable once constructed; a criteria unit maps to exactly one GraphQL
/// query (pagination offsets within the query are internal).
#[derive(Debug, Clone, PartialEq)]
pub struct SearchCriteria {
    pub country: String,
    pub city: String,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub group_adults: u32,
    pub group_children: u32,
    pub num_rooms: u32,
    pub currency: String,
}

impl SearchCriteria {
    pub fn validate(&self) -> Result<(), ScrapeError> {
        if self.city.trim().is_empty() {
            return Err(ScrapeError::InvalidCriteria("city must not be empty".into()));
        }
        if self.check_out <= self.check_in {
            return Err(ScrapeError::InvalidCriteria(format!(
                "check-out {} must be after check-in {}",
                self.check_out, self.check_in
            )));
        }
        if self.group_adults == 0 {
            return Err(ScrapeError::InvalidCriteria("group_adults must be at least 1".into()));
        }
        if self.num_rooms == 0 {
            return Err(ScrapeError::InvalidCriteria("num_rooms must be at least 1".into()));
        }
        // More rooms than adults is unusual but the upstream service accepts
        // it, so it is not rejected here.
        Ok(())
    }

    pub fn nights(&self) -> i64 {
        (self.check_out - self.check_in).num_days()
    }

    /// Short label for progress output and the run summary.
    pub fn label(&self) -> String {
        format!("{} {} -> {}", self.city, self.check_in, self.check_out)
    }
}

/// One normalized output row. Created only by the response parser, written
/// once to the sink and then discarded. Optional fields that were absent
/// upstream stay `None` and serialize as an empty CSV field / SQL NULL --
/// the absence marker, distinct from a parse failure.
///
/// Field order here is the CSV column order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HotelRecord {
    pub hotel_id: String,
    pub hotel: String,
    pub location: String,
    pub city: String,
    pub country: String,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub group_adults: u32,
    pub group_children: u32,
    pub num_rooms: u32,
    pub nightly_price: Option<f64>,
    pub total_price: Option<f64>,
    pub currency: String,
    pub rating: Option<f64>,
    pub available: bool,
    pub as_of: DateTime<Utc>,
}

impl HotelRecord {
    pub const CSV_HEADER: [&'static str; 16] = [
        "hotel_id",
        "hotel",
        "location",
        "city",
        "country",
        "check_in",
        "check_out",
        "group_adults",
        "group_children",
        "num_rooms",
        "nightly_price",
        "total_price",
        "currency",
        "rating",
        "available",
        "as_of",
    ];
}

#[cfg(test)]
pub(crate) fn test_criteria() -> SearchCriteria {
    SearchCriteria {
        country: "Japan".to_string(),
        city: "Osaka".to_string(),
        check_in: NaiveDate::from_ymd_opt(2024, 8, 5).unwrap(),
        check_out: NaiveDate::from_ymd_opt(2024, 8, 6).unwrap(),
        group_adults: 1,
        group_children: 0,
        num_rooms: 1,
        currency: "USD".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_criteria_pass() {
        assert!(test_criteria().validate().is_ok());
    }

    #[test]
    fn inverted_dates_are_rejected() {
        let mut criteria = test_criteria();
        criteria.check_out = criteria.check_in;
        assert!(matches!(criteria.validate(), Err(ScrapeError::InvalidCriteria(_))));

        criteria.check_out = criteria.check_in - chrono::Duration::days(1);
        assert!(matches!(criteria.validate(), Err(ScrapeError::InvalidCriteria(_))));
    }

    #[test]
    fn non_positive_occupancy_is_rejected() {
        let mut criteria = test_criteria();
        criteria.group_adults = 0;
        assert!(criteria.validate().is_err());

        let mut criteria = test_criteria();
        criteria.num_rooms = 0;
        assert!(criteria.validate().is_err());
    }

    #[test]
    fn more_rooms_than_adults_is_tolerated() {
        let mut criteria = test_criteria();
        criteria.num_rooms = 2;
        assert!(criteria.validate().is_ok());
    }

    #[test]
    fn nights_span() {
        let mut criteria = test_criteria();
        criteria.check_out = NaiveDate::from_ymd_opt(2024, 8, 8).unwrap();
        assert_eq!(criteria.nights(), 3);
    }
}
