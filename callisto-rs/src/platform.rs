//! The one place where a node's central components live.
//!
//! Instead of threading half a dozen **Arc**s through every constructor, components are
//! registered in the platform under their type and looked up where needed. The platform
//! also owns the **is_running** flag - the single bit every long-running loop in the
//! system polls to know when to wind down.
//!
//! Use [Platform::require](Platform::require) for components which are guaranteed to be
//! installed after startup. Code which may still run while the node shuts down should
//! prefer [Platform::find](Platform::find): [terminate](Platform::terminate) empties the
//! component map (so Drop handlers get their turn), and a **require** at that point
//! panics.
//!
//! # Examples
//!
//! ```
//! # use std::sync::Arc;
//! # use callisto::platform::Platform;
//! struct PortAllocator {
//!     next_port: u16,
//! }
//!
//! let platform = Platform::new();
//! platform.register(Arc::new(PortAllocator { next_port: 8001 }));
//!
//! assert_eq!(platform.require::<PortAllocator>().next_port, 8001);
//! assert_eq!(platform.is_running(), true);
//!
//! // Shutting down releases every component...
//! platform.terminate();
//! assert_eq!(platform.find::<PortAllocator>().is_none(), true);
//! assert_eq!(platform.is_running(), false);
//! ```
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Keeps all central services of the system in a single place.
pub struct Platform {
    services: Mutex<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
    is_running: AtomicBool,
}

impl Platform {
    /// Creates a new and empty platform which is considered running.
    pub fn new() -> Arc<Self> {
        Arc::new(Platform {
            services: Mutex::new(HashMap::new()),
            is_running: AtomicBool::new(true),
        })
    }

    /// Registers a component under its type.
    ///
    /// Re-registering a type simply replaces the previous instance.
    pub fn register<T>(&self, service: Arc<T>)
    where
        T: Any + Send + Sync,
    {
        let _ = self
            .services
            .lock()
            .unwrap()
            .insert(TypeId::of::<T>(), service);
    }

    /// Looks up a previously registered component, if there is one.
    pub fn find<T>(&self) -> Option<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        let services = self.services.lock().unwrap();
        let service = services.get(&TypeId::of::<T>())?.clone();

        service.downcast::<T>().ok()
    }

    /// Resolves a previously registered component.
    ///
    /// # Panics
    /// Panics if the requested component isn't available or if the platform is already
    /// shutting down (which also clears all components).
    pub fn require<T>(&self) -> Arc<T>
    where
        T: Any + Send + Sync,
    {
        if !self.is_running() {
            panic!(
                "The component {} was requested but the system is already shutting down!",
                std::any::type_name::<T>()
            );
        }

        match self.find::<T>() {
            Some(service) => service,
            None => panic!(
                "The required component {} is not installed in the platform registry!",
                std::any::type_name::<T>()
            ),
        }
    }

    /// Determines if the platform is still running or if
    /// [terminate](Platform::terminate) has already been invoked.
    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Acquire)
    }

    /// Initiates the shutdown of the whole node.
    ///
    /// All registered components are released immediately (so that their Drop handlers
    /// run eventually) and [is_running](Platform::is_running) flips to **false**, which
    /// makes every main loop of the system wind down.
    pub fn terminate(&self) {
        self.services.lock().unwrap().clear();
        self.is_running.store(false, Ordering::Release);
    }
}
