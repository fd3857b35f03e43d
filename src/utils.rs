use std::collections::HashSet;
use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDate;

use crate::debug_println;

/// Number of days in a calendar month, or `None` for an invalid month.
pub fn days_in_month(year: i32, month: u32) -> Option<u32> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    Some((next - first).num_days() as u32)
}

/// Collect the (city, check-in) pairs already present in an output CSV so a
/// re-run can skip them. A missing file just means nothing was scraped yet.
pub fn load_scraped_units(csv_path: &Path) -> Result<HashSet<(String, NaiveDate)>> {
    let mut scraped = HashSet::new();

    if !csv_path.exists() {
        debug_println!("No existing output at {}, nothing to skip", csv_path.display());
        return Ok(scraped);
    }

    let file = File::open(csv_path)
        .context(format!("Failed to open existing output file: {}", csv_path.display()))?;
    let mut reader = csv::Reader::from_reader(file);

    let headers = reader.headers()?.clone();
    let city_idx = headers.iter().position(|h| h == "city");
    let check_in_idx = headers.iter().position(|h| h == "check_in");
    let (city_idx, check_in_idx) = match (city_idx, check_in_idx) {
        (Some(c), Some(d)) => (c, d),
        _ => {
            println!(
                "Warning: {} has no city/check_in columns, skipping nothing",
                csv_path.display()
            );
            return Ok(scraped);
        }
    };

    for result in reader.records() {
        let record = result?;
        let city = match record.get(city_idx) {
            Some(city) if !city.is_empty() => city.to_string(),
            _ => continue,
        };
        let check_in = match record.get(check_in_idx) {
            Some(s) => match NaiveDate::parse_from_str(s, "%Y-%m-%d") {
                Ok(date) => date,
                Err(_) => continue,
            },
            None => continue,
        };
        scraped.insert((city, check_in));
    }

    println!(
        "Loaded {} already-scraped (city, check-in) pairs from {}",
        scraped.len(),
        csv_path.display()
    );
    Ok(scraped)
}
