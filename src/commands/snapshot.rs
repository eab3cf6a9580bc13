use anyhow::{bail, Result};
use clap::ArgMatches;
use std::sync::Arc;
use std::time::Duration;

use crate::core::cache::{Cache, CacheEvent, CacheState};
use crate::core::system_monitor::{SystemCollector, SystemSnapshot};
use crate::core::Config;

/// Longest the command waits for the snapshot without a configured timeout.
const DEFAULT_WAIT: Duration = Duration::from_secs(30);

pub fn execute(matches: &ArgMatches) -> Result<()> {
    let config = Config::load()?;
    let pretty = matches.get_flag("pretty");

    let (pool, event_loop) = super::start_pool(&config)?;
    let collector = Arc::new(SystemCollector::new());

    let mut builder = Cache::builder(pool, move || {
        // CPU usage needs two refreshes some time apart.
        std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
        Ok(collector.snapshot()?)
    })
    .name("system-snapshot");
    if let Some(timeout) = config.load_timeout() {
        builder = builder.load_timeout(timeout);
    }
    let cache: Cache<SystemSnapshot> = builder.build();

    cache.subscribe(|event| {
        if let CacheEvent::StateChanged(state) = event {
            log::debug!("Snapshot cache is now {}", state);
        }
    });

    cache.load();
    let wait = config.load_timeout().map_or(DEFAULT_WAIT, |t| t + Duration::from_secs(1));
    event_loop.run_until(wait, || !cache.is_loading());

    match cache.state() {
        CacheState::Loaded => {
            let Some(snapshot) = cache.get(false) else {
                bail!("Snapshot cache reported loaded without a value");
            };
            let json = if pretty {
                serde_json::to_string_pretty(&snapshot)?
            } else {
                serde_json::to_string(&snapshot)?
            };
            println!("{json}");
            Ok(())
        }
        CacheState::Error => {
            let message = cache.get_error().unwrap_or_default();
            bail!("Snapshot failed: {}", message)
        }
        state => bail!("Snapshot did not complete within {:?} (state: {})", wait, state),
    }
}
