//! Contains the HTTP transport which connects the peers of a cache cluster.
//!
//! The [HttpPool](HttpPool) plays both sides of the wire protocol: it serves the values of
//! local groups to other nodes and implements [PeerPicker](crate::peers::PeerPicker) so that
//! a [Group](crate::group::Group) can fetch keys owned by remote nodes.
//!
//! The protocol itself is deliberately boring: a value is requested via
//! `GET <base_path><group>/<key>` (both segments URL-encoded) and answered with the raw value
//! bytes as `application/octet-stream`. An unknown group yields a 404, a failing loader a 500
//! and a malformed path a 400. Keeping the protocol this simple means any HTTP client can be
//! used to inspect a node, which is worth a lot when debugging a misbehaving cluster at 3am.
//!
//! # Example
//!
//! ```no_run
//! # use callisto::builder::Builder;
//! # use callisto::group::{loader_fn, GroupRegistry};
//! # use callisto::http::HttpPool;
//! #[tokio::main]
//! async fn main() {
//!     let platform = Builder::new().enable_all().build().await;
//!
//!     let registry = GroupRegistry::install(&platform);
//!     let group = registry
//!         .create_group("scores", 2048, loader_fn(|key| Ok(key.as_bytes().to_vec())))
//!         .unwrap();
//!
//!     let pool = HttpPool::install(&platform, "http://localhost:8001");
//!     pool.set_peers(&["http://localhost:8001", "http://localhost:8002"]);
//!     group.register_peers(pool.clone()).unwrap();
//!
//!     pool.serve().await;
//! }
//! ```
use std::collections::HashMap;
use std::convert::Infallible;
use std::net::ToSocketAddrs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Client, Request, Response, StatusCode, Uri};

use crate::group::{CacheError, GroupRegistry};
use crate::peers::{PeerClient, PeerPicker};
use crate::platform::Platform;
use crate::ring::{HashRing, DEFAULT_REPLICAS};
use crate::spawn;

/// The URL prefix under which cache values are served unless configured otherwise.
pub const DEFAULT_BASE_PATH: &str = "/_callisto/";

/// Specifies how often the server loop checks whether the platform is shutting down.
const SHUTDOWN_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Binds the consistent hash ring to a set of HTTP peers.
///
/// A pool knows its own public address, which it uses to detect keys it owns itself: for
/// those, [pick_peer](PeerPicker::pick_peer) reports **None** so that the group serves them
/// via its loader instead of calling the node on its own socket.
pub struct HttpPool {
    platform: Arc<Platform>,
    self_address: String,
    base_path: String,
    replicas: usize,
    running: AtomicBool,
    routes: Mutex<Routes>,
}

/// The ring and the matching clients, always replaced together.
struct Routes {
    ring: HashRing,
    clients: HashMap<String, Arc<HttpFetcher>>,
}

impl HttpPool {
    /// Creates an **HttpPool** for the given public address (e.g. `http://10.0.0.5:8001`)
    /// and installs it into the given platform.
    pub fn install(platform: &Arc<Platform>, self_address: &str) -> Arc<Self> {
        HttpPool::install_with(platform, self_address, DEFAULT_BASE_PATH, DEFAULT_REPLICAS)
    }

    /// Creates and installs an **HttpPool** with a custom URL prefix and virtual node count.
    ///
    /// All nodes of a cluster must agree on both values, as they determine the wire format
    /// and the ring layout respectively.
    pub fn install_with(
        platform: &Arc<Platform>,
        self_address: &str,
        base_path: &str,
        replicas: usize,
    ) -> Arc<Self> {
        let pool = Arc::new(HttpPool {
            platform: platform.clone(),
            self_address: self_address.trim_end_matches('/').to_owned(),
            base_path: base_path.to_owned(),
            replicas,
            running: AtomicBool::new(false),
            routes: Mutex::new(Routes {
                ring: HashRing::new(replicas),
                clients: HashMap::new(),
            }),
        });

        platform.register::<HttpPool>(pool.clone());

        pool
    }

    /// Replaces the set of peers participating in the cluster.
    ///
    /// The ring and the client map are swapped wholesale under the routing mutex, so a
    /// concurrent [pick_peer](PeerPicker::pick_peer) sees either the old or the new
    /// topology, never a mix.
    pub fn set_peers<S: AsRef<str>>(&self, peers: &[S]) {
        // Normalize the addresses first - the ring, the client map and the self check all
        // have to agree on the exact peer id.
        let peers: Vec<String> = peers
            .iter()
            .map(|peer| peer.as_ref().trim_end_matches('/').to_owned())
            .collect();

        let mut ring = HashRing::new(self.replicas);
        ring.add(&peers);

        let mut clients = HashMap::new();
        for peer in &peers {
            let _ = clients.insert(
                peer.clone(),
                Arc::new(HttpFetcher {
                    base_url: format!("{}{}", peer, self.base_path),
                }),
            );
        }

        log::info!(
            "[{}] now routing across {} peer(s).",
            self.self_address,
            clients.len()
        );

        *self.routes.lock().unwrap() = Routes { ring, clients };
    }

    /// Determines if the server socket is up and accepting requests.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Runs [serve](HttpPool::serve) on a background task.
    ///
    /// Mainly for tests, which want to keep their own task free for issuing requests.
    pub fn fork(pool: &Arc<HttpPool>) {
        let cloned_pool = pool.clone();
        spawn!(async move {
            cloned_pool.serve().await;
        });
    }

    /// Like [fork](HttpPool::fork), but additionally waits until requests are accepted.
    pub async fn fork_and_await(pool: &Arc<HttpPool>) {
        HttpPool::fork(pool);

        while !pool.is_running() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Opens the server socket and serves peer requests until the platform terminates.
    pub async fn serve(&self) {
        let address = match self.bind_address() {
            Ok(address) => address,
            Err(error) => {
                log::error!("Cannot determine the address to bind: {}", error);
                return;
            }
        };

        let platform = self.platform.clone();
        let base_path = self.base_path.clone();
        let make_service = make_service_fn(move |_connection| {
            let platform = platform.clone();
            let base_path = base_path.clone();
            async move {
                Ok::<_, Infallible>(service_fn(move |request| {
                    handle_request(platform.clone(), base_path.clone(), request)
                }))
            }
        });

        let platform = self.platform.clone();
        let server = hyper::server::Server::bind(&address)
            .serve(make_service)
            .with_graceful_shutdown(async move {
                while platform.is_running() {
                    tokio::time::sleep(SHUTDOWN_POLL_INTERVAL).await;
                }
            });

        log::info!("Peer endpoint listening on {}...", &address);
        self.running.store(true, Ordering::Release);

        if let Err(error) = server.await {
            log::error!("The server loop on {} failed: {}", &address, error);
        }

        log::info!("Peer endpoint on {} closed.", &address);
        self.running.store(false, Ordering::Release);
    }

    /// Derives the socket address to bind from the public address of this node.
    fn bind_address(&self) -> anyhow::Result<std::net::SocketAddr> {
        let host_and_port = self
            .self_address
            .strip_prefix("http://")
            .unwrap_or(&self.self_address);

        host_and_port
            .to_socket_addrs()
            .with_context(|| format!("Cannot resolve '{}' into an address.", host_and_port))?
            .next()
            .ok_or_else(|| anyhow::anyhow!("'{}' resolved to no address at all.", host_and_port))
    }
}

impl PeerPicker for HttpPool {
    fn pick_peer(&self, key: &str) -> Option<Arc<dyn PeerClient>> {
        let routes = self.routes.lock().unwrap();

        match routes.ring.get(key) {
            Some(owner) if owner != self.self_address => {
                log::debug!("[{}] '{}' is owned by {}.", self.self_address, key, owner);
                routes.clients.get(owner).map(|client| {
                    let client: Arc<dyn PeerClient> = client.clone();
                    client
                })
            }
            _ => None,
        }
    }
}

/// Fetches values from a single remote peer.
struct HttpFetcher {
    base_url: String,
}

#[async_trait]
impl PeerClient for HttpFetcher {
    async fn fetch(&self, group: &str, key: &str) -> anyhow::Result<Vec<u8>> {
        let url = format!(
            "{}{}/{}",
            self.base_url,
            urlencoding::encode(group),
            urlencoding::encode(key)
        );

        let uri = Uri::try_from(url.as_str()).with_context(|| format!("Invalid peer url: {}", url))?;
        let response = Client::new()
            .get(uri)
            .await
            .with_context(|| format!("Failed to fetch {}", url))?;

        if response.status() != StatusCode::OK {
            return Err(anyhow::anyhow!(
                "Peer returned status {} for {}",
                response.status(),
                url
            ));
        }

        let bytes = hyper::body::to_bytes(response.into_body())
            .await
            .with_context(|| format!("Failed to read the response of {}", url))?;

        Ok(bytes.to_vec())
    }
}

/// Answers a single peer request of the form `GET <base_path><group>/<key>`.
async fn handle_request(
    platform: Arc<Platform>,
    base_path: String,
    request: Request<Body>,
) -> Result<Response<Body>, Infallible> {
    let path = request.uri().path().to_owned();
    log::debug!("Received {} {}", request.method(), path);

    let Some(group_and_key) = path.strip_prefix(&base_path) else {
        return Ok(bad_request(&path));
    };

    // The key may contain (encoded) slashes, so we only split off the first segment...
    let mut segments = group_and_key.splitn(2, '/');
    let (group_name, key) = match (segments.next(), segments.next()) {
        (Some(group_name), Some(key)) if !group_name.is_empty() => (group_name, key),
        _ => return Ok(bad_request(&path)),
    };

    let (Ok(group_name), Ok(key)) = (urlencoding::decode(group_name), urlencoding::decode(key))
    else {
        return Ok(bad_request(&path));
    };

    // During shutdown the platform no longer hands out the registry - report this as an
    // unknown group rather than crashing the connection.
    let group = platform
        .find::<GroupRegistry>()
        .and_then(|registry| registry.find(&group_name));

    let Some(group) = group else {
        return Ok(status_response(
            StatusCode::NOT_FOUND,
            format!("No such group: {}", group_name),
        ));
    };

    match group.get(&key).await {
        Ok(view) => Ok(Response::builder()
            .status(StatusCode::OK)
            .header(hyper::header::CONTENT_TYPE, "application/octet-stream")
            .body(Body::from(view.to_vec()))
            .expect("a static response always builds")),
        Err(CacheError::EmptyKey) => Ok(bad_request(&path)),
        Err(error) => Ok(status_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            error.to_string(),
        )),
    }
}

fn bad_request(path: &str) -> Response<Body> {
    status_response(StatusCode::BAD_REQUEST, format!("Bad request: {}", path))
}

fn status_response(status: StatusCode, message: String) -> Response<Body> {
    Response::builder()
        .status(status)
        .body(Body::from(message))
        .expect("a static response always builds")
}
