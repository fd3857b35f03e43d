use serde_json::{json, Value};

use crate::config::SessionConfig;
use crate::errors::ScrapeError;
use crate::models::SearchCriteria;

pub const GRAPHQL_ENDPOINT: &str = "https://www.booking.com/dml/graphql";

/// Results per page the endpoint serves for the FullSearch operation.
pub const ROWS_PER_PAGE: u32 = 100;

/// The FullSearch query document, trimmed to the fields this scraper
/// actually reads back out of the response.
const FULL_SEARCH_QUERY: &str = "\
query FullSearch($input: SearchQueryInput!) {
  searchQueries {
    search(input: $input) {
      pagination {
        nbResultsPerPage
        nbResultsTotal
      }
      breadcrumbs {
        ... on SearchResultsBreadcrumb {
          name
        }
      }
      results {
        displayName {
          text
        }
        basicPropertyData {
          id
          reviewScore: reviews {
            score: totalScore
          }
          location {
            address
            city
            countryCode
          }
        }
        location {
          displayLocation
        }
        blocks {
          finalPrice {
            amount
            currency
          }
        }
        soldOutInfo {
          isSoldOut
        }
      }
    }
  }
}";

/// A ready-to-send request: endpoint URL, header set and JSON body.
#[derive(Debug, Clone)]
pub struct RequestPayload {
    pub url: String,
    pub headers: Vec<(&'static str, String)>,
    pub body: Value,
}

/// Builds GraphQL request payloads from search criteria. Pure
/// transformation, no I/O; the session tokens are threaded in at
/// construction so the builder is testable with fixed fixtures.
pub struct RequestBuilder {
    session: SessionConfig,
    scrape_only_hotel: bool,
}

impl RequestBuilder {
    pub fn new(session: SessionConfig, scrape_only_hotel: bool) -> Self {
        Self { session, scrape_only_hotel }
    }

    pub fn build(
        &self,
        criteria: &SearchCriteria,
        page_offset: u32,
    ) -> Result<RequestPayload, ScrapeError> {
        criteria.validate()?;

        Ok(RequestPayload {
            url: format!("{}?selected_currency={}", GRAPHQL_ENDPOINT, criteria.currency),
            headers: self.headers(),
            body: self.body(criteria, page_offset),
        })
    }

    fn headers(&self) -> Vec<(&'static str, String)> {
        vec![
            ("Content-Type", "application/json".to_string()),
            ("Accept", "*/*".to_string()),
            ("User-Agent", self.session.user_agent.clone()),
            ("X-Booking-Csrf-Token", self.session.csrf_token.clone()),
            ("X-Booking-Context-Action-Name", self.session.context_action_name.clone()),
            ("X-Booking-Context-Aid", self.session.context_aid.clone()),
            ("X-Booking-Et-Serialized-State", self.session.et_serialized_state.clone()),
            ("X-Booking-Pageview-Id", self.session.pageview_id.clone()),
            ("X-Booking-Site-Type-Id", self.session.site_type_id.clone()),
            ("X-Booking-Topic", self.session.topic.clone()),
        ]
    }

    fn body(&self, criteria: &SearchCriteria, page_offset: u32) -> Value {
        // Only the ht_id=204 filter (hotel properties) is ever applied;
        // everything else arrives unfiltered.
        let filters = if self.scrape_only_hotel {
            json!({ "selectedFilters": "ht_id=204" })
        } else {
            json!({})
        };

        let check_in = criteria.check_in.format("%Y-%m-%d").to_string();
        let check_out = criteria.check_out.format("%Y-%m-%d").to_string();

        json!({
            "operationName": "FullSearch",
            "variables": {
                "input": {
                    "acidCarouselContext": null,
                    "childrenAges": [0],
                    "dates": {
                        "checkin": check_in,
                        "checkout": check_out
                    },
                    "doAvailabilityCheck": false,
                    "enableCampaigns": true,
                    "filters": filters,
                    "flexibleDatesConfig": {
                        "broadDatesCalendar": {
                            "checkinMonths": [],
                            "los": [],
                            "startWeekdays": []
                        },
                        "dateFlexUseCase": "DATE_RANGE",
                        "dateRangeCalendar": {
                            "checkin": [check_in],
                            "checkout": [check_out]
                        }
                    },
                    "location": {
                        "searchString": format!("{}, {}", criteria.city, criteria.country),
                        "destType": "CITY"
                    },
                    "nbRooms": criteria.num_rooms,
                    "nbAdults": criteria.group_adults,
                    "nbChildren": criteria.group_children,
                    "needsRoomsMatch": false,
                    "pagination": {
                        "rowsPerPage": ROWS_PER_PAGE,
                        "offset": page_offset
                    },
                    "referrerBlock": {
                        "blockName": "searchbox"
                    },
                    "sbCalendarOpen": false,
                    "sorters": {
                        "selectedSorter": null,
                        "referenceGeoId": null,
                        "tripTypeIntentId": null
                    },
                    "travelPurpose": 2,
                    "seoThemeIds": [],
                    "useSearchParamsFromSession": true
                }
            },
            "extensions": {},
            "query": FULL_SEARCH_QUERY
        })
    }
}
