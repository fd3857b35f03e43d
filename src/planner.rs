use chrono::{Duration, NaiveDate};

use crate::errors::ScrapeError;
use crate::models::SearchCriteria;
use crate::utils::days_in_month;

/// The 47 prefectures in the canonical JIS order, north to south. Sweep
/// ordering follows this list so re-runs produce identical, diffable output.
pub const PREFECTURES: [&str; 47] = [
    "Hokkaido", "Aomori", "Iwate", "Miyagi", "Akita", "Yamagata", "Fukushima",
    "Ibaraki", "Tochigi", "Gunma", "Saitama", "Chiba", "Tokyo", "Kanagawa",
    "Niigata", "Toyama", "Ishikawa", "Fukui", "Yamanashi", "Nagano", "Gifu",
    "Shizuoka", "Aichi", "Mie", "Shiga", "Kyoto", "Osaka", "Hyogo", "Nara",
    "Wakayama", "Tottori", "Shimane", "Okayama", "Hiroshima", "Yamaguchi",
    "Tokushima", "Kagawa", "Ehime", "Kochi", "Fukuoka", "Saga", "Nagasaki",
    "Kumamoto", "Oita", "Miyazaki", "Kagoshima", "Okinawa",
];

/// Occupancy and currency shared by every criteria a sweep emits.
#[derive(Debug, Clone)]
pub struct StayDefaults {
    pub group_adults: u32,
    pub group_children: u32,
    pub num_rooms: u32,
    pub currency: String,
}

/// The three run modes, dispatched once at startup. Everything downstream
/// of the planner only ever sees a flat sequence of criteria.
#[derive(Debug, Clone)]
pub enum ScrapeMode {
    /// A single user-supplied query.
    Basic { criteria: SearchCriteria },
    /// One query per start day of a calendar month, days ascending. The
    /// last days of the month are included even when the stay's checkout
    /// crosses into the following month; that is the chosen edge policy.
    WholeMonth {
        city: String,
        country: String,
        year: i32,
        month: u32,
        start_day: u32,
        nights: u32,
        stay: StayDefaults,
    },
    /// One query per (prefecture, month) pair, prefectures in canonical
    /// order, months ascending within each prefecture. Country is fixed to
    /// Japan; check-in falls on the first of each month.
    JapanHotel {
        prefectures: Vec<String>,
        year: i32,
        start_month: u32,
        end_month: u32,
        nights: u32,
        stay: StayDefaults,
    },
}

/// Expand a mode into its finite, deterministic criteria sequence.
/// Restartable from the beginning; there is no mid-sequence resume state.
pub fn plan(mode: &ScrapeMode) -> Result<Vec<SearchCriteria>, ScrapeError> {
    match mode {
        ScrapeMode::Basic { criteria } => {
            criteria.validate()?;
            Ok(vec![criteria.clone()])
        }
        ScrapeMode::WholeMonth { city, country, year, month, start_day, nights, stay } => {
            plan_whole_month(city, country, *year, *month, *start_day, *nights, stay)
        }
        ScrapeMode::JapanHotel { prefectures, year, start_month, end_month, nights, stay } => {
            plan_japan_hotel(prefectures, *year, *start_month, *end_month, *nights, stay)
        }
    }
}

fn criteria_for(
    city: &str,
    country: &str,
    check_in: NaiveDate,
    nights: u32,
    stay: &StayDefaults,
) -> SearchCriteria {
    SearchCriteria {
        country: country.to_string(),
        city: city.to_string(),
        check_in,
        check_out: check_in + Duration::days(i64::from(nights)),
        group_adults: stay.group_adults,
        group_children: stay.group_children,
        num_rooms: stay.num_rooms,
        currency: stay.currency.clone(),
    }
}

fn plan_whole_month(
    city: &str,
    country: &str,
    year: i32,
    month: u32,
    start_day: u32,
    nights: u32,
    stay: &StayDefaults,
) -> Result<Vec<SearchCriteria>, ScrapeError> {
    if nights == 0 {
        return Err(ScrapeError::InvalidCriteria("nights must be at least 1".into()));
    }
    let last_day = days_in_month(year, month).ok_or_else(|| {
        ScrapeError::InvalidCriteria(format!("invalid month: {}-{:02}", year, month))
    })?;
    if start_day == 0 || start_day > last_day {
        return Err(ScrapeError::InvalidCriteria(format!(
            "start_day {} out of range for {}-{:02} ({} days)",
            start_day, year, month, last_day
        )));
    }

    let mut units = Vec::with_capacity((last_day - start_day + 1) as usize);
    for day in start_day..=last_day {
        let check_in = NaiveDate::from_ymd_opt(year, month, day).ok_or_else(|| {
            ScrapeError::InvalidCriteria(format!("invalid date: {}-{:02}-{:02}", year, month, day))
        })?;
        let criteria = criteria_for(city, country, check_in, nights, stay);
        criteria.validate()?;
        units.push(criteria);
    }
    Ok(units)
}

fn plan_japan_hotel(
    prefectures: &[String],
    year: i32,
    start_month: u32,
    end_month: u32,
    nights: u32,
    stay: &StayDefaults,
) -> Result<Vec<SearchCriteria>, ScrapeError> {
    if nights == 0 {
        return Err(ScrapeError::InvalidCriteria("nights must be at least 1".into()));
    }
    if !(1..=12).contains(&start_month) || !(1..=12).contains(&end_month) {
        return Err(ScrapeError::InvalidCriteria(format!(
            "months must be within 1-12, got {}-{}",
            start_month, end_month
        )));
    }
    if start_month > end_month {
        return Err(ScrapeError::InvalidCriteria(format!(
            "start_month {} is after end_month {}",
            start_month, end_month
        )));
    }

    // Resolve the selection against the canonical list: unknown names are a
    // configuration error, and the sweep always walks prefectures in
    // canonical order regardless of how the selection was given.
    let selected: Vec<&str> = if prefectures.is_empty() {
        PREFECTURES.to_vec()
    } else {
        let mut resolved = Vec::with_capacity(prefectures.len());
        for name in prefectures {
            let canonical = PREFECTURES
                .iter()
                .find(|p| p.eq_ignore_ascii_case(name))
                .ok_or_else(|| {
                    ScrapeError::InvalidCriteria(format!("unknown prefecture: {}", name))
                })?;
            if !resolved.contains(canonical) {
                resolved.push(*canonical);
            }
        }
        resolved.sort_by_key(|p| PREFECTURES.iter().position(|c| c == p));
        resolved
    };

    let mut units = Vec::with_capacity(selected.len() * (end_month - start_month + 1) as usize);
    for prefecture in selected {
        for month in start_month..=end_month {
            let check_in = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(|| {
                ScrapeError::InvalidCriteria(format!("invalid month: {}-{:02}", year, month))
            })?;
            let criteria = criteria_for(prefecture, "Japan", check_in, nights, stay);
            criteria.validate()?;
            units.push(criteria);
        }
    }
    Ok(units)
}
