use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::errors::ParseError;
use crate::{debug_println, trace_println};
use crate::models::{HotelRecord, SearchCriteria};

/// One parsed response page: the records it yielded plus the total result
/// count the endpoint reports, which drives pagination.
#[derive(Debug)]
pub struct ParsedPage {
    pub records: Vec<HotelRecord>,
    pub total_results: u32,
}

// The response schema is undocumented and shifts under us, so every
// sub-field is optional. Only the envelope down to `data.searchQueries.
// search` is mandatory; its absence is a schema change worth failing loudly
// on, distinct from JSON that does not parse at all.

#[derive(Debug, Deserialize)]
struct GraphqlResponse {
    data: Option<ResponseData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponseData {
    search_queries: Option<SearchQueries>,
}

#[derive(Debug, Deserialize)]
struct SearchQueries {
    search: Option<SearchOutput>,
}

#[derive(Debug, Deserialize)]
struct SearchOutput {
    pagination: Option<Pagination>,
    results: Option<Vec<PropertyEntry>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Pagination {
    nb_results_total: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PropertyEntry {
    display_name: Option<TextField>,
    basic_property_data: Option<BasicPropertyData>,
    location: Option<DisplayLocation>,
    blocks: Option<Vec<Block>>,
    sold_out_info: Option<SoldOutInfo>,
}

#[derive(Debug, Deserialize)]
struct TextField {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BasicPropertyData {
    id: Option<i64>,
    review_score: Option<ReviewScore>,
}

#[derive(Debug, Deserialize)]
struct ReviewScore {
    score: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DisplayLocation {
    display_location: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Block {
    final_price: Option<Price>,
}

#[derive(Debug, Deserialize)]
struct Price {
    amount: Option<f64>,
    currency: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SoldOutInfo {
    is_sold_out: Option<bool>,
}

/// Convert one raw response page into normalized records. A single entry
/// with missing sub-fields never drops its siblings; zero results for valid
/// criteria is a valid empty page, not an error.
pub fn parse_response(
    raw: &[u8],
    criteria: &SearchCriteria,
    as_of: DateTime<Utc>,
) -> Result<ParsedPage, ParseError> {
    let response: GraphqlResponse =
        serde_json::from_slice(raw).map_err(|e| ParseError::MalformedJson(e.to_string()))?;

    let search = response
        .data
        .and_then(|d| d.search_queries)
        .and_then(|q| q.search)
        .ok_or_else(|| {
            ParseError::UnexpectedSchema("data.searchQueries.search missing from response".into())
        })?;

    let total_results = search
        .pagination
        .and_then(|p| p.nb_results_total)
        .unwrap_or(0);

    let entries = search.results.unwrap_or_default();
    let mut records = Vec::with_capacity(entries.len());

    for entry in entries {
        match build_record(entry, criteria, as_of) {
            Some(record) => records.push(record),
            None => trace_println!("Skipping property entry with neither id nor name"),
        }
    }

    debug_println!(
        "Parsed page: {} records, {} total results reported",
        records.len(),
        total_results
    );

    Ok(ParsedPage { records, total_results })
}

fn build_record(
    entry: PropertyEntry,
    criteria: &SearchCriteria,
    as_of: DateTime<Utc>,
) -> Option<HotelRecord> {
    let name = entry.display_name.and_then(|d| d.text);
    let (id, rating) = match entry.basic_property_data {
        Some(data) => (data.id, data.review_score.and_then(|r| r.score)),
        None => (None, None),
    };

    // Without an id or a name there is nothing to key the record on.
    let hotel_id = match (&id, &name) {
        (Some(id), _) => id.to_string(),
        (None, Some(name)) => name.clone(),
        (None, None) => return None,
    };

    let final_price = entry
        .blocks
        .and_then(|blocks| blocks.into_iter().next())
        .and_then(|block| block.final_price);
    let (total_price, currency) = match final_price {
        Some(price) => (price.amount, price.currency),
        None => (None, None),
    };

    let nights = criteria.nights().max(1) as f64;
    let available = !entry
        .sold_out_info
        .and_then(|s| s.is_sold_out)
        .unwrap_or(false);

    Some(HotelRecord {
        hotel_id,
        hotel: name.unwrap_or_default(),
        location: entry
            .location
            .and_then(|l| l.display_location)
            .unwrap_or_default(),
        city: criteria.city.clone(),
        country: criteria.country.clone(),
        check_in: criteria.check_in,
        check_out: criteria.check_out,
        group_adults: criteria.group_adults,
        group_children: criteria.group_children,
        num_rooms: criteria.num_rooms,
        nightly_price: total_price.map(|p| p / nights),
        total_price,
        currency: currency.unwrap_or_else(|| criteria.currency.clone()),
        rating,
        available,
        as_of,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::test_criteria;
    use serde_json::json;

    fn entry(id: i64, name: &str, rating: Option<f64>, price: f64) -> serde_json::Value {
        let review_score = match rating {
            Some(score) => json!({ "score": score }),
            None => serde_json::Value::Null,
        };
        json!({
            "displayName": { "text": name },
            "basicPropertyData": { "id": id, "reviewScore": review_score },
            "location": { "displayLocation": "Osaka" },
            "blocks": [ { "finalPrice": { "amount": price, "currency": "USD" } } ],
            "soldOutInfo": { "isSoldOut": false }
        })
    }

    fn page(results: Vec<serde_json::Value>, total: u32) -> Vec<u8> {
        json!({
            "data": { "searchQueries": { "search": {
                "pagination": { "nbResultsTotal": total },
                "results": results
            } } }
        })
        .to_string()
        .into_bytes()
    }

    #[test]
    fn parses_well_formed_entries() {
        let raw = page(
            vec![entry(1, "Hotel A", Some(8.6), 150.0), entry(2, "Hotel B", Some(7.9), 200.0)],
            2,
        );
        let parsed = parse_response(&raw, &test_criteria(), Utc::now()).unwrap();

        assert_eq!(parsed.total_results, 2);
        assert_eq!(parsed.records.len(), 2);
        assert_eq!(parsed.records[0].hotel, "Hotel A");
        assert_eq!(parsed.records[0].hotel_id, "1");
        assert_eq!(parsed.records[0].rating, Some(8.6));
        assert_eq!(parsed.records[0].total_price, Some(150.0));
        assert_eq!(parsed.records[0].location, "Osaka");
        assert!(parsed.records[0].available);
    }

    #[test]
    fn missing_rating_gets_the_sentinel_not_a_dropped_batch() {
        let raw = page(
            vec![
                entry(1, "Hotel A", Some(8.6), 150.0),
                entry(2, "Hotel B", Some(7.9), 200.0),
                entry(3, "Hotel C", Some(9.1), 320.0),
                entry(4, "Hotel D", None, 95.0),
            ],
            4,
        );
        let parsed = parse_response(&raw, &test_criteria(), Utc::now()).unwrap();

        assert_eq!(parsed.records.len(), 4);
        assert_eq!(parsed.records[3].hotel, "Hotel D");
        assert_eq!(parsed.records[3].rating, None);
        assert_eq!(parsed.records[3].total_price, Some(95.0));
    }

    #[test]
    fn entry_with_only_nulls_is_skipped_without_failing_siblings() {
        let raw = page(
            vec![
                json!({
                    "displayName": null,
                    "basicPropertyData": null,
                    "location": null,
                    "blocks": null
                }),
                entry(2, "Hotel B", Some(7.9), 200.0),
            ],
            2,
        );
        let parsed = parse_response(&raw, &test_criteria(), Utc::now()).unwrap();

        assert_eq!(parsed.records.len(), 1);
        assert_eq!(parsed.records[0].hotel, "Hotel B");
    }

    #[test]
    fn entry_keyed_by_name_when_id_is_missing() {
        let raw = page(
            vec![json!({
                "displayName": { "text": "Ryokan X" },
                "basicPropertyData": null,
                "location": null,
                "blocks": null
            })],
            1,
        );
        let parsed = parse_response(&raw, &test_criteria(), Utc::now()).unwrap();

        assert_eq!(parsed.records.len(), 1);
        assert_eq!(parsed.records[0].hotel_id, "Ryokan X");
        assert_eq!(parsed.records[0].total_price, None);
        assert_eq!(parsed.records[0].nightly_price, None);
        // No price block still reports the requested currency.
        assert_eq!(parsed.records[0].currency, "USD");
    }

    #[test]
    fn nightly_price_is_total_divided_by_nights() {
        let mut criteria = test_criteria();
        criteria.check_out = criteria.check_in + chrono::Duration::days(2);
        let raw = page(vec![entry(1, "Hotel A", Some(8.0), 300.0)], 1);
        let parsed = parse_response(&raw, &criteria, Utc::now()).unwrap();

        assert_eq!(parsed.records[0].total_price, Some(300.0));
        assert_eq!(parsed.records[0].nightly_price, Some(150.0));
    }

    #[test]
    fn zero_results_is_a_valid_empty_page() {
        let raw = page(vec![], 0);
        let parsed = parse_response(&raw, &test_criteria(), Utc::now()).unwrap();
        assert!(parsed.records.is_empty());
        assert_eq!(parsed.total_results, 0);
    }

    #[test]
    fn invalid_json_is_malformed() {
        let err = parse_response(b"not json {", &test_criteria(), Utc::now()).unwrap_err();
        assert!(matches!(err, ParseError::MalformedJson(_)));
    }

    #[test]
    fn missing_envelope_is_unexpected_schema() {
        let raw = json!({ "data": { "somethingElse": {} } }).to_string().into_bytes();
        let err = parse_response(&raw, &test_criteria(), Utc::now()).unwrap_err();
        assert!(matches!(err, ParseError::UnexpectedSchema(_)));
    }

    #[test]
    fn sold_out_flag_clears_availability() {
        let raw = page(
            vec![json!({
                "displayName": { "text": "Hotel A" },
                "basicPropertyData": { "id": 1 },
                "soldOutInfo": { "isSoldOut": true }
            })],
            1,
        );
        let parsed = parse_response(&raw, &test_criteria(), Utc::now()).unwrap();
        assert!(!parsed.records[0].available);
    }
}
