//! Service registry: name resolution for dispatch.
//!
//! The registry maps service names to method tables. Lookups accept either
//! a dotted `"Service.Method"` name or a bare method name; bare names are
//! scanned across services in sorted service-name order, so the tie-break
//! when several services expose the same bare name is deterministic: the
//! lexicographically smallest service name wins.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use super::{MethodEntry, Service, Trampoline};
use crate::error::{Result, WirecallError};

/// A registered method: the trampoline plus its capability flags and an
/// atomic call counter incremented on every dispatch.
pub(crate) struct MethodDescriptor {
    /// Fully qualified display name, `Service.Method` in registered casing.
    pub(crate) name: String,
    pub(crate) trampoline: Trampoline,
    pub(crate) needs_request: bool,
    pub(crate) needs_response: bool,
    pub(crate) calls: AtomicU64,
}

/// A registered service: immutable after registration apart from the
/// per-method call counters.
pub(crate) struct ServiceDescriptor {
    pub(crate) name: String,
    pub(crate) methods: BTreeMap<String, Arc<MethodDescriptor>>,
}

/// Call-count snapshot for one method, for diagnostics.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MethodStats {
    /// Fully qualified `Service.Method` name.
    pub name: String,
    /// Number of dispatched calls so far.
    pub calls: u64,
}

/// Registry mapping service names to method tables.
///
/// Registration and resolution are both safe under concurrency; the map is
/// guarded by a mutex and descriptors are shared via `Arc` so no lock is
/// held while a handler runs.
pub struct ServiceRegistry {
    services: Mutex<BTreeMap<String, Arc<ServiceDescriptor>>>,
    ignore_case: bool,
}

impl ServiceRegistry {
    /// Create an empty, case-sensitive registry.
    pub fn new() -> Self {
        Self {
            services: Mutex::new(BTreeMap::new()),
            ignore_case: false,
        }
    }

    /// Normalize service and method keys to lower case. Applies only to
    /// services registered after the flag is set, so configure it before
    /// registering.
    pub fn set_ignore_case(&mut self, ignore_case: bool) {
        self.ignore_case = ignore_case;
    }

    fn normalize(&self, name: &str) -> String {
        if self.ignore_case {
            name.to_lowercase()
        } else {
            name.to_string()
        }
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, Arc<ServiceDescriptor>>> {
        self.services.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a service.
    ///
    /// Fails with `EmptyServiceName` if the service has no name, with
    /// `NoMethods` if its method table is empty, and with
    /// `DuplicateService` if the name is already taken (the first
    /// registration stays intact).
    pub fn register(&self, service: Service) -> Result<()> {
        if service.name.is_empty() {
            return Err(WirecallError::EmptyServiceName);
        }
        if service.methods.is_empty() {
            return Err(WirecallError::NoMethods(service.name));
        }

        let key = self.normalize(&service.name);
        let mut methods = BTreeMap::new();
        for (method_name, entry) in service.methods {
            let MethodEntry {
                trampoline,
                needs_request,
                needs_response,
            } = entry;
            let descriptor = MethodDescriptor {
                name: format!("{}.{}", service.name, method_name),
                trampoline,
                needs_request,
                needs_response,
                calls: AtomicU64::new(0),
            };
            debug!(
                method = %descriptor.name,
                needs_request = descriptor.needs_request,
                needs_response = descriptor.needs_response,
                "registered"
            );
            methods.insert(self.normalize(&method_name), Arc::new(descriptor));
        }
        let descriptor = Arc::new(ServiceDescriptor {
            name: service.name,
            methods,
        });

        let mut services = self.lock();
        if services.contains_key(&key) {
            return Err(WirecallError::DuplicateService(descriptor.name.clone()));
        }
        services.insert(key, descriptor);
        Ok(())
    }

    /// Resolve a method name to its descriptor.
    ///
    /// Dotted names look up the service, then the method. Bare names scan
    /// all services in sorted name order and return the first match.
    pub(crate) fn resolve(&self, method: &str) -> Result<Arc<MethodDescriptor>> {
        let lookup = self.normalize(method);
        let parts: Vec<&str> = lookup.split('.').collect();
        let services = self.lock();
        match parts.as_slice() {
            [bare] => {
                for service in services.values() {
                    if let Some(found) = service.methods.get(*bare) {
                        return Ok(found.clone());
                    }
                }
                Err(WirecallError::IllFormedMethod(method.to_string()))
            }
            [service_name, method_name] => {
                let service = services
                    .get(*service_name)
                    .ok_or_else(|| WirecallError::ServiceNotFound(method.to_string()))?;
                service
                    .methods
                    .get(*method_name)
                    .cloned()
                    .ok_or_else(|| WirecallError::MethodNotFound(method.to_string()))
            }
            _ => Err(WirecallError::IllFormedMethod(method.to_string())),
        }
    }

    /// True if `method` resolves.
    pub fn has_method(&self, method: &str) -> bool {
        self.resolve(method).is_ok()
    }

    /// Fully qualified names of every registered method.
    pub fn method_names(&self) -> Vec<String> {
        self.lock()
            .values()
            .flat_map(|s| s.methods.values().map(|m| m.name.clone()))
            .collect()
    }

    /// Names plus call counters for every registered method.
    pub fn method_stats(&self) -> Vec<MethodStats> {
        self.lock()
            .values()
            .flat_map(|s| {
                s.methods.values().map(|m| MethodStats {
                    name: m.name.clone(),
                    calls: m.calls.load(Ordering::Relaxed),
                })
            })
            .collect()
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
