use std::path::Path;

use anyhow::{Context, Result};
use calfeed_core::fetch::FeedFetcher;
use calfeed_core::ics::parse_feed;
use calfeed_core::{CollectingSink, ExternalSource, FeedConfig, HttpFetcher};
use chrono::Utc;

use super::print_diagnostics;

pub async fn run(config: &FeedConfig, input: &str, source: Option<String>) -> Result<()> {
    let is_url = ["http://", "https://", "webcal://"]
        .iter()
        .any(|scheme| input.starts_with(scheme));

    let source_name = source.unwrap_or_else(|| default_source_name(input, is_url));

    let raw = if is_url {
        let fetcher = HttpFetcher::new(&config.fetch.user_agent, config.fetch_timeout())?;
        fetcher
            .fetch(&ExternalSource::new(source_name.clone(), input))
            .await?
    } else {
        std::fs::read_to_string(input).with_context(|| format!("Could not read {input}"))?
    };

    let sink = CollectingSink::new();
    let events = parse_feed(&raw, &source_name, &config.parse_options(Utc::now()), &sink);

    println!("{}", serde_json::to_string_pretty(&events)?);
    print_diagnostics(&sink);

    Ok(())
}

fn default_source_name(input: &str, is_url: bool) -> String {
    if is_url {
        input
            .split("://")
            .nth(1)
            .and_then(|rest| rest.split('/').next())
            .filter(|host| !host.is_empty())
            .unwrap_or(input)
            .to_string()
    } else {
        Path::new(input)
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| input.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_source_name() {
        assert_eq!(
            default_source_name("webcal://events.example.edu/music.ics", true),
            "events.example.edu"
        );
        assert_eq!(default_source_name("feeds/music.ics", false), "music");
    }
}
