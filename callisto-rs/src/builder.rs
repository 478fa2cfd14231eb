//! Bootstraps a node by assembling its [Platform](crate::platform::Platform).
//!
//! Logging, signal handling and the config facility are useful in production but in the
//! way in many tests, so each of them is a builder toggle rather than a given.
//!
//! # Example
//! ```no_run
//! # use callisto::builder::Builder;
//! # use callisto::group::GroupRegistry;
//! #[tokio::main]
//! async fn main() {
//!     // Logging, signals and config for a production node...
//!     let platform = Builder::new().enable_all().build().await;
//!
//!     // ...then install the components serving our caches.
//!     let registry = GroupRegistry::install(&platform);
//! }
//! ```
use std::sync::Arc;

use crate::platform::Platform;
use crate::{init_logging, CALLISTO_VERSION};

/// Initializes the framework by creating and initializing all enabled core components.
#[derive(Default)]
pub struct Builder {
    setup_logging: bool,
    enable_signals: bool,
    setup_config: bool,
}

impl Builder {
    /// Creates a new builder with all features disabled.
    pub fn new() -> Self {
        Builder::default()
    }

    /// Turns every optional facility on - the right choice for production binaries.
    pub fn enable_all(mut self) -> Self {
        self.setup_logging = true;
        self.enable_signals = true;
        self.setup_config = true;

        self
    }

    /// Lets the builder initialize the logging system.
    ///
    /// See [init_logging](crate::init_logging) - stdout only, RFC 3339 timestamps.
    pub fn enable_logging(mut self) -> Self {
        self.setup_logging = true;
        self
    }

    /// Takes the logging setup back out after [enable_all()](Builder::enable_all).
    pub fn disable_logging(mut self) -> Self {
        self.setup_logging = false;
        self
    }

    /// Makes **CTRL-C**, **SIGTERM** and **SIGHUP** shut the node down cleanly.
    ///
    /// See [signals](crate::signals) for the details.
    pub fn enable_signals(mut self) -> Self {
        self.enable_signals = true;
        self
    }

    /// Takes the signal listener back out after [enable_all()](Builder::enable_all).
    pub fn disable_signals(mut self) -> Self {
        self.enable_signals = false;
        self
    }

    /// Installs a [Config](crate::config::Config) and loads the **settings.yml**.
    ///
    /// See [config](crate::config) for the details.
    pub fn enable_config(mut self) -> Self {
        self.setup_config = true;
        self
    }

    /// Takes the config facility back out after [enable_all()](Builder::enable_all).
    pub fn disable_config(mut self) -> Self {
        self.setup_config = false;
        self
    }

    /// Builds the [Platform](crate::platform::Platform) with all the enabled components
    /// being registered.
    pub async fn build(self) -> Arc<Platform> {
        let platform = Platform::new();

        if self.setup_logging {
            init_logging();
        }

        log::info!(
            "Callisto {} starting up - {} logical core(s) on {} physical CPU(s).",
            CALLISTO_VERSION,
            num_cpus::get(),
            num_cpus::get_physical()
        );

        if self.enable_signals {
            crate::signals::install(platform.clone());
        }

        if self.setup_config {
            crate::config::install(platform.clone()).await;
        }

        platform
    }
}
