use anyhow::Result;
use calfeed_core::FeedConfig;
use calfeed_core::constants::EXTERNAL_SOURCE_PREFIX;
use owo_colors::OwoColorize;

pub fn run(config: &FeedConfig) -> Result<()> {
    if config.sources.is_empty() {
        println!("No external sources configured.");
        println!();
        println!("Add one to config.toml:");
        println!();
        println!("[[sources]]");
        println!("name = \"Music\"");
        println!("url = \"https://example.edu/music.ics\"");
        return Ok(());
    }

    for source in &config.sources {
        println!(
            "{}  {}",
            format!("{EXTERNAL_SOURCE_PREFIX}{}", source.name).bold(),
            source.fetch_url().dimmed()
        );
    }

    Ok(())
}
