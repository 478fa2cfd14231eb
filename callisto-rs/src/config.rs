//! The system configuration, loaded from **config/settings.yml** and kept fresh.
//!
//! Restarting a cache node costs its entire warmed-up working set, so the config file is
//! watched and re-read in place: whoever cares about a setting subscribes via
//! [Config::notifier](Config::notifier) and re-applies it once a change message arrives.
//!
//! The **Config** struct itself is long-lived and can be fetched from the **Platform**
//! once. A [Handle](Handle) from [Config::current](Config::current) is the opposite: it
//! pins one loaded revision of the file and must be re-fetched to see later changes.
//!
//! # Examples
//!
//! ```
//! # use callisto::config::Config;
//! let config = Config::new("somefile.yml");
//! config.load_from_string("
//! server:
//!     url: 'http://localhost:8001'
//! ", None).unwrap();
//!
//! let handle = config.current();
//! assert_eq!(handle.yaml()["server"]["url"].as_str().unwrap(), "http://localhost:8001");
//! ```
use std::sync::Arc;
use std::time::SystemTime;

use anyhow::Context;
use arc_swap::ArcSwap;
use yaml_rust::{Yaml, YamlLoader};

use crate::platform::Platform;

/// Owns the loaded configuration and fans out change events.
///
/// Normally the [Builder](crate::builder::Builder) installs one instance, which is then
/// fetched via `platform.require::<Config>()` wherever settings are read.
pub struct Config {
    filename: String,
    tx: tokio::sync::broadcast::Sender<()>,
    config: ArcSwap<(Yaml, Option<SystemTime>)>,
}

/// Wakes a config user up whenever the file was re-loaded.
///
/// The payload is deliberately `()` - a received message only means "something changed,
/// read your settings again via [Config::current](Config::current)".
pub type ChangeNotifier = tokio::sync::broadcast::Receiver<()>;

/// Pins one loaded revision of the configuration.
///
/// Cheap to create, but frozen in time: later reloads are only visible through a fresh
/// handle, so don't stash one away.
pub struct Handle {
    config: Arc<(Yaml, Option<SystemTime>)>,
}

impl Config {
    /// Creates a config bound to the given file, without loading it yet.
    ///
    /// Reading the file and watching it for changes is the job of [install](install);
    /// tests usually skip both and feed data via
    /// [load_from_string](Config::load_from_string).
    pub fn new(file: &str) -> Self {
        let (tx, _) = tokio::sync::broadcast::channel(1);
        Config {
            filename: file.to_owned(),
            config: ArcSwap::new(Arc::new((Yaml::Null, None))),
            tx,
        }
    }

    /// Subscribes to reload events - see [ChangeNotifier](ChangeNotifier).
    pub fn notifier(&self) -> ChangeNotifier {
        self.tx.subscribe()
    }

    /// Returns a [Handle](Handle) pinning the currently loaded configuration.
    pub fn current(&self) -> Handle {
        Handle {
            config: self.config.load_full(),
        }
    }

    /// Reads the last-modified timestamp of the config file.
    ///
    /// The is_file check matters in container setups: a volume mount that was never
    /// provided shows up as an empty directory, not as a missing file.
    #[cfg(not(test))]
    async fn last_modified(&self) -> Option<SystemTime> {
        tokio::fs::metadata(&self.filename)
            .await
            .ok()
            .filter(|meta| meta.is_file())
            .and_then(|meta| meta.modified().ok())
    }

    /// Reads the underlying file and publishes its contents.
    ///
    /// The framework calls this on startup and whenever the change monitor notices a
    /// newer file; there is rarely a reason to call it by hand.
    pub async fn load(&self) -> anyhow::Result<()> {
        log::info!("Reading config file {}...", &self.filename);

        if let Ok(metadata) = tokio::fs::metadata(&self.filename).await {
            if !metadata.is_file() {
                log::info!("No config file present - continuing with built-in defaults.");
                return Ok(());
            }
        }

        let config_data = tokio::fs::read_to_string(&self.filename)
            .await
            .with_context(|| format!("Cannot load config file {}", &self.filename))?;

        let last_modified = tokio::fs::metadata(&self.filename)
            .await
            .ok()
            .and_then(|metadata| metadata.modified().ok());

        self.load_from_string(config_data.as_str(), last_modified)
    }

    /// Publishes the given string as the new configuration, bypassing the file system.
    ///
    /// Tests use this to set up exactly the config they need without touching disk.
    pub fn load_from_string(
        &self,
        data: &str,
        last_modified: Option<SystemTime>,
    ) -> anyhow::Result<()> {
        let mut docs = YamlLoader::load_from_str(data)
            .with_context(|| format!("Cannot parse config file {}", &self.filename))?;

        let doc = if docs.is_empty() {
            Yaml::Null
        } else {
            docs.remove(0)
        };

        // Store the updated config...
        self.config.store(Arc::new((doc, last_modified)));

        // ...and notify all listeners. We ignore if there are none.
        let _ = self.tx.clone().send(());

        Ok(())
    }
}

impl Handle {
    /// Provides access to the currently loaded configuration document.
    ///
    /// Missing keys yield **Yaml::BadValue**, so chained index lookups like
    /// `handle.yaml()["server"]["url"]` are safe on any config.
    pub fn yaml(&self) -> &Yaml {
        &self.config.0
    }
}

/// Installs a **Config** for **config/settings.yml** into the given platform.
///
/// Beyond the initial load, this starts the change monitor which compares the file's
/// last-modified date every couple of seconds and re-loads on any bump. No structural
/// diffing happens - after a reload, every subscriber re-reads its own settings and has
/// to cope with whatever changed (or only half-changed).
///
/// Called by the [Builder](crate::builder::Builder) unless the config facility is
/// disabled.
pub async fn install(platform: Arc<Platform>) {
    let config = Arc::new(Config::new("config/settings.yml"));
    platform.register::<Config>(config.clone());

    if let Err(error) = config.load().await {
        log::error!("{}", error);
    }

    run_config_change_monitor(platform, config);
}

#[cfg(test)]
fn run_config_change_monitor(_platform: Arc<Platform>, _config: Arc<Config>) {
    // Tests feed the config explicitly and never want background reloads.
}

#[cfg(not(test))]
fn run_config_change_monitor(platform: Arc<Platform>, config: Arc<Config>) {
    let _ = tokio::spawn(async move {
        while platform.is_running() {
            tokio::time::sleep(std::time::Duration::from_secs(2)).await;

            // The file on disk vs. the revision we loaded last. Either side is None if
            // the file is absent resp. nothing has been loaded yet.
            let on_disk = config.last_modified().await;
            let loaded = config.config.load().1;

            if on_disk.is_some() && (loaded.is_none() || on_disk > loaded) {
                match config.load().await {
                    Ok(_) => log::info!("Config file changed on disk - settings re-loaded."),
                    Err(error) => log::error!("Re-loading the changed config failed: {}", error),
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::Config;
    use std::time::SystemTime;

    #[test]
    fn config_updates_are_published_to_listeners() {
        crate::testing::test_async(async {
            let config = Config::new("callisto_test_config.yml");

            config
                .load_from_string("replicas: 50", Some(SystemTime::now()))
                .unwrap();

            // Set up a task which notifies our oneshot channel once the config changes...
            let mut change_notifier = config.notifier();
            let (tx, rx) = tokio::sync::oneshot::channel();
            let _ = tokio::spawn(async move {
                if change_notifier.recv().await.is_ok() {
                    tx.send(()).unwrap();
                }
            });

            assert_eq!(config.current().yaml()["replicas"].as_i64().unwrap(), 50);

            // A malformed config is rejected...
            assert_eq!(
                config
                    .load_from_string("replicas: 'invalid", Some(SystemTime::now()))
                    .is_err(),
                true
            );

            // ...leaving the previous contents in place.
            assert_eq!(config.current().yaml()["replicas"].as_i64().unwrap(), 50);

            // An actual change is picked up and broadcast...
            config
                .load_from_string("replicas: 100", Some(SystemTime::now()))
                .unwrap();

            rx.await.unwrap();
            assert_eq!(config.current().yaml()["replicas"].as_i64().unwrap(), 100);
        });
    }

    #[test]
    fn missing_keys_read_as_bad_value() {
        let config = Config::new("unused.yml");
        config.load_from_string("server:\n    url: x", None).unwrap();

        let handle = config.current();
        assert_eq!(handle.yaml()["server"]["url"].as_str().unwrap(), "x");
        assert_eq!(handle.yaml()["no"]["such"]["path"].as_str(), None);
    }
}
