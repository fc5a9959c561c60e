// src/config/consts.rs

// Net config
pub const BASE_URL: &str = "https://register.cpso.on.ca";
pub const WARMUP_PATH: &str = "/Advanced-Search/";
pub const SEARCH_PATH: &str = "/Get-Search-Results/";
pub const USER_AGENT: &str = concat!("cpso_scrape/", env!("CARGO_PKG_VERSION"));
pub const TIMEOUT_SECS: u64 = 30;
pub const SPECIALIST_TYPE: &str = "Psychiatry";

// FSA lists (one page per leading letter)
pub const FSA_LIST_URL: &str = "https://en.wikipedia.org/wiki/List_of_postal_codes_of_Canada:_";
pub const FSA_PREFIXES: &[char] = &['K', 'L', 'M', 'N', 'P']; // Ontario

// Retry
pub const MAX_ATTEMPTS: usize = 5;
pub const INITIAL_BACKOFF_MS: u64 = 2_000;

// Registry result-count convention
pub const SENTINEL: i64 = -1;
pub const CAP: i64 = 100;

// LDU alphabets (position 1 and 3 are digits, 2 is a letter)
pub const DIGITS: &str = "0123456789";
pub const LETTERS: &str = "ABCEGHJKLMNPRSTVWXYZ"; // no D F I O Q U

// Refinement
pub const MAX_DEPTH: usize = 3;
pub const ROUND_ATTEMPTS: usize = 3;

// Output
pub const DEFAULT_DATA_DIR: &str = "data";
pub const CRITERIA_SUBDIR: &str = "search-criteria";
pub const RAW_SUBDIR: &str = "raw";
pub const DETAILS_FILE: &str = "details.csv";
pub const SUMMARY_FILE: &str = "summary.csv";
pub const LOG_FILE: &str = "debug.log";

// Concurrency
pub const WORKERS: usize = 4;
pub const REQUEST_PAUSE_MS: u64 = 2_000; // be polite
pub const JITTER_MS: u64 = 3_000; // extra 0..3000 ms
