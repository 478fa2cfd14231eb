use std::collections::HashMap;
use std::panic::{set_hook, take_hook};
use std::sync::Arc;

use callisto::builder::Builder;
use callisto::config::Config;
use callisto::fmt::parse_size;
use callisto::group::{loader_fn, GroupRegistry, Loader};
use callisto::http::{HttpPool, DEFAULT_BASE_PATH};
use callisto::platform::Platform;
use callisto::ring::DEFAULT_REPLICAS;

#[tokio::main]
async fn main() {
    // A panic in one tokio task would otherwise leave a zombie node: the process looks
    // alive from the outside while the task that died takes its part of the service with
    // it. Exiting on any panic is the honest alternative - whatever supervises the
    // container (docker, systemd, k8s) restarts us into a known-good state.
    let default_hook = take_hook();
    set_hook(Box::new(move |panic_info| {
        default_hook(panic_info);
        eprintln!("A task panicked - exiting so the supervisor can restart this node cleanly.");
        std::process::exit(-1);
    }));

    // Bring up logging, config and signal handling...
    let platform = Builder::new().enable_all().build().await;

    // ...install the registry keeping all cache namespaces...
    let registry = GroupRegistry::install(&platform);

    // ...wire this node into its cluster as described by the config...
    let pool = install_pool(&platform);

    // ...and create the configured groups, all backed by the built-in demo dataset.
    install_groups(&platform, &registry, &pool);

    // Serve peer and client traffic until CTRL-C or SIGHUP arrives.
    pool.serve().await;

    for group in registry.groups() {
        let stats = group.stats();
        log::info!(
            "Group '{}' held {} entries ({} bytes) at shutdown, hit rate {:.1} %.",
            group.name(),
            stats.entries,
            stats.used_bytes,
            stats.hit_rate
        );
    }
}

/// Creates the HttpPool based on the `server` and `cache` sections of the config.
fn install_pool(platform: &Arc<Platform>) -> Arc<HttpPool> {
    let config = platform.require::<Config>();
    let handle = config.current();

    let self_address = handle.yaml()["server"]["url"]
        .as_str()
        .unwrap_or("http://localhost:8001")
        .to_owned();
    let base_path = handle.yaml()["cache"]["base_path"]
        .as_str()
        .unwrap_or(DEFAULT_BASE_PATH)
        .to_owned();
    let replicas = handle.yaml()["cache"]["replicas"]
        .as_i64()
        .filter(|replicas| *replicas > 0)
        .unwrap_or(DEFAULT_REPLICAS as i64) as usize;

    // Without a peer list this node simply forms a cluster of one.
    let peers = match handle.yaml()["peers"].as_vec() {
        Some(peers) => peers
            .iter()
            .filter_map(|peer| peer.as_str().map(str::to_owned))
            .collect(),
        None => vec![self_address.clone()],
    };

    let pool = HttpPool::install_with(platform, &self_address, &base_path, replicas);
    pool.set_peers(&peers);

    pool
}

/// Creates all groups listed below `cache.groups`, or a default group if none are given.
fn install_groups(platform: &Arc<Platform>, registry: &Arc<GroupRegistry>, pool: &Arc<HttpPool>) {
    let config = platform.require::<Config>();
    let handle = config.current();

    let mut created = 0;
    if let Some(groups) = handle.yaml()["cache"]["groups"].as_hash() {
        for (name, settings) in groups {
            let name = match name.as_str() {
                Some(name) => name,
                None => continue,
            };

            // The budget can be given as a plain byte count or with a size suffix ("64m").
            let max_bytes = match &settings["max_bytes"] {
                size if size.as_i64().is_some() => Ok(size.as_i64().unwrap() as usize),
                size if size.as_str().is_some() => parse_size(size.as_str().unwrap()),
                _ => Ok(2048),
            };
            let max_bytes = match max_bytes {
                Ok(max_bytes) => max_bytes,
                Err(error) => {
                    log::error!("Not going to create group {}: {}", name, error);
                    continue;
                }
            };

            match registry.create_group(name, max_bytes, demo_loader()) {
                Ok(group) => {
                    if let Err(error) = group.register_peers(pool.clone()) {
                        log::error!("{}", error);
                    }
                    created += 1;
                }
                Err(error) => log::error!("{}", error),
            }
        }
    }

    if created == 0 {
        log::info!("No groups configured. Creating the default group 'scores'...");
        let group = registry
            .create_group("scores", 2048, demo_loader())
            .expect("the registry is empty at this point");
        if let Err(error) = group.register_peers(pool.clone()) {
            log::error!("{}", error);
        }
    }
}

/// Provides the loader simulating a slow, authoritative backing store.
fn demo_loader() -> Box<dyn Loader> {
    let dataset: HashMap<&'static str, &'static str> =
        [("Tom", "630"), ("Jack", "589"), ("Sam", "567")]
            .into_iter()
            .collect();

    loader_fn(move |key| {
        log::info!("[slow-db] looking up '{}'...", key);
        dataset
            .get(key)
            .map(|value| value.as_bytes().to_vec())
            .ok_or_else(|| anyhow::anyhow!("{} does not exist", key))
    })
}
