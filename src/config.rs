use std::env;

use anyhow::{Context, Result};

use crate::debug_println;

/// Session and context tokens the upstream GraphQL endpoint expects on every
/// request. They are captured from a real browser session and supplied as
/// environment variables (optionally via a `.env` file); this code treats
/// them as opaque strings and never generates them.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub user_agent: String,
    pub csrf_token: String,
    pub context_action_name: String,
    pub context_aid: String,
    pub et_serialized_state: String,
    pub pageview_id: String,
    pub site_type_id: String,
    pub topic: String,
}

const ENV_VARS: [&str; 8] = [
    "USER_AGENT",
    "X_BOOKING_CSRF_TOKEN",
    "X_BOOKING_CONTEXT_ACTION_NAME",
    "X_BOOKING_CONTEXT_AID",
    "X_BOOKING_ET_SERIALIZED_STATE",
    "X_BOOKING_PAGEVIEW_ID",
    "X_BOOKING_SITE_TYPE_ID",
    "X_BOOKING_TOPIC",
];

impl SessionConfig {
    /// Read all required tokens from the process environment. A missing
    /// variable is a configuration error reported before any network
    /// activity starts.
    pub fn from_env() -> Result<Self> {
        let require = |name: &str| -> Result<String> {
            env::var(name).context(format!("Missing required environment variable: {}", name))
        };

        Ok(SessionConfig {
            user_agent: require(ENV_VARS[0])?,
            csrf_token: require(ENV_VARS[1])?,
            context_action_name: require(ENV_VARS[2])?,
            context_aid: require(ENV_VARS[3])?,
            et_serialized_state: require(ENV_VARS[4])?,
            pageview_id: require(ENV_VARS[5])?,
            site_type_id: require(ENV_VARS[6])?,
            topic: require(ENV_VARS[7])?,
        })
    }
}

/// Load a `.env` file if one exists. By default values from the file win
/// over the process environment; with `no_override` the process environment
/// wins. A missing file is fine, the variables may already be exported.
pub fn load_env_file(no_override: bool) {
    let result = if no_override {
        dotenvy::dotenv()
    } else {
        dotenvy::dotenv_override()
    };

    match result {
        Ok(path) => debug_println!("Loaded environment from {}", path.display()),
        Err(_) => debug_println!("No .env file found, using process environment"),
    }
}

#[cfg(test)]
pub(crate) fn test_session() -> SessionConfig {
    SessionConfig {
        user_agent: "Mozilla/5.0 (test)".to_string(),
        csrf_token: "csrf-token".to_string(),
        context_action_name: "searchresults".to_string(),
        context_aid: "304142".to_string(),
        et_serialized_state: "et-state".to_string(),
        pageview_id: "pageview".to_string(),
        site_type_id: "9".to_string(),
        topic: "capla_browser_b-search-web-searchresults".to_string(),
    }
}
