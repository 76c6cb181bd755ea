/// Environment variable names read at startup (after `.env` is loaded)
pub const API_URL_ENV: &str = "API_URL";
pub const API_KEY_ENV: &str = "API_KEY";
pub const SCRAPE_URL_ENV: &str = "SCRAPE_URL";
pub const CONFIG_PATH_ENV: &str = "RACE_SCRAPER_CONFIG";

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

// Local export artifacts
pub const DEFAULT_JSON_OUTPUT: &str = "events.json";
pub const DEFAULT_CSV_OUTPUT: &str = "events.csv";
pub const DEFAULT_REPORT_OUTPUT: &str = "quality_report.json";

/// Header carrying the API key on sync requests
pub const DEFAULT_API_KEY_HEADER: &str = "X-Internal-Token";

pub const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/114.0.0.0 Safari/537.36";

/// Column order shared by the JSON object and the CSV export
pub const EVENT_FIELDS: [&str; 7] = [
    "name",
    "location",
    "state",
    "distance",
    "date",
    "description",
    "registration_url",
];
