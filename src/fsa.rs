// src/fsa.rs
//! Level-0 seeds: the FSAs listed in bold on the public postal-code pages.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::thread;

use reqwest::blocking::Client;

use crate::config::consts::{CRITERIA_SUBDIR, FSA_LIST_URL, USER_AGENT};
use crate::config::{RegistryOptions, ScrapeOptions};
use crate::core::html::tag_texts_ci;
use crate::core::net::Pause;
use crate::error::{Error, Result};
use crate::permute::{file_name, write_codes};
use crate::postal::PostalCode;

pub fn page_url(prefix: char) -> String {
    format!("{FSA_LIST_URL}{prefix}")
}

/// Bold texts that start with letter-digit-letter, in page order.
pub fn parse_fsas(html: &str) -> Vec<PostalCode> {
    tag_texts_ci(html, "b")
        .into_iter()
        .filter_map(|text| {
            let head: String = text.chars().take(3).collect();
            let b = head.as_bytes();
            let shaped = b.len() == 3
                && b[0].is_ascii_uppercase()
                && b[1].is_ascii_digit()
                && b[2].is_ascii_uppercase();
            if shaped { PostalCode::make_root(&head).ok() } else { None }
        })
        .collect()
}

/// Fetches one page per prefix. A page that fails is logged and skipped.
pub fn fetch_fsas(prefixes: &[char], registry: &RegistryOptions, scrape: &ScrapeOptions) -> Result<Vec<PostalCode>> {
    let client = Client::builder()
        .user_agent(USER_AGENT)
        .timeout(registry.timeout())
        .build()
        .map_err(|e| Error::Config(format!("http client: {e}")))?;
    let pause = Pause { pause_ms: scrape.pause_ms, jitter_ms: scrape.jitter_ms };

    let mut seen = HashSet::new();
    let mut all = Vec::new();
    for (i, &prefix) in prefixes.iter().enumerate() {
        let url = page_url(prefix);
        if i > 0 {
            thread::sleep(pause.for_key(&url));
        }
        logf!("Fetching FSAs from {url}");
        let body = match client.get(&url).send().and_then(|r| r.error_for_status()).and_then(|r| r.text()) {
            Ok(b) => b,
            Err(e) => {
                loge!("{url}: {e}");
                continue;
            }
        };
        let found = parse_fsas(&body);
        logf!("Retrieved {} FSAs for {prefix}", found.len());
        all.extend(found.into_iter().filter(|c| seen.insert(c.clone())));
    }
    Ok(all)
}

/// Writes `<data_dir>/search-criteria/FSA_LDU0.json`.
pub fn save_fsas(data_dir: &Path, codes: &[PostalCode]) -> Result<PathBuf> {
    let path = data_dir.join(CRITERIA_SUBDIR).join(file_name(0));
    write_codes(&path, codes)?;
    logf!("Saved {} FSAs to {}", codes.len(), path.display());
    Ok(path)
}
