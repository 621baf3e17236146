use std::path::PathBuf;

use anyhow::{Context, Result};
use calfeed_core::preferences::preference_list_from_text;
use calfeed_core::{
    CollectingSink, FeedConfig, HttpFetcher, MemoryEventStore, MemoryPreferenceStore,
    StaticSourceRegistry, SynthesisSettings, Synthesizer,
};
use owo_colors::OwoColorize;

use super::print_diagnostics;

pub struct RenderArgs {
    pub token: Option<String>,
    pub preferences: Option<PathBuf>,
    pub topics: Option<String>,
    pub events: Option<PathBuf>,
    pub output: Option<PathBuf>,
}

pub async fn run(config: &FeedConfig, args: RenderArgs) -> Result<()> {
    let store = match &args.events {
        Some(path) => MemoryEventStore::from_json_file(path)?,
        None => MemoryEventStore::default(),
    };
    let registry = StaticSourceRegistry::new(config.sources.clone());
    let fetcher = HttpFetcher::new(&config.fetch.user_agent, config.fetch_timeout())?;
    let synthesizer = Synthesizer::new(
        store,
        registry,
        fetcher,
        SynthesisSettings::from_config(config)?,
    );

    let sink = CollectingSink::new();
    let document = match (&args.token, &args.topics) {
        (Some(token), _) => {
            let Some(path) = &args.preferences else {
                anyhow::bail!("--token needs a --preferences file to look it up in");
            };
            let preferences = MemoryPreferenceStore::from_json_file(path)?;
            synthesizer
                .synthesize_for_token(&preferences, token, &sink)
                .await?
        }
        (None, Some(topics)) => {
            synthesizer
                .synthesize(&preference_list_from_text(topics), &sink)
                .await
        }
        (None, None) => anyhow::bail!(
            "Nothing to render.\n\n\
            Pass a preference list:\n  \
            calfeed render --topics 'chess,major:Music'\n\n\
            Or look one up by token:\n  \
            calfeed render --token abc123 --preferences prefs.json"
        ),
    };

    match &args.output {
        Some(path) => {
            std::fs::write(path, &document.body)
                .with_context(|| format!("Could not write {}", path.display()))?;
            eprintln!(
                "{} {} event(s) to {}",
                "Wrote".green(),
                document.event_count,
                path.display()
            );
        }
        None => print!("{}", document.body),
    }

    print_diagnostics(&sink);

    Ok(())
}
