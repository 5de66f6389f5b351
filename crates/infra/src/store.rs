//! Tenant-isolated key/value storage abstractions.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, RwLock};

use saleflow_core::TenantId;

/// Tenant-isolated record store.
///
/// Every operation is scoped to one tenant; records of different tenants
/// are invisible to each other.
pub trait TenantStore<K, V>: Send + Sync {
    fn get(&self, tenant_id: TenantId, key: &K) -> Option<V>;
    fn upsert(&self, tenant_id: TenantId, key: K, value: V);
    fn remove(&self, tenant_id: TenantId, key: &K) -> Option<V>;
    fn list(&self, tenant_id: TenantId) -> Vec<V>;
    /// Drop all records of a tenant (test/rebuild support).
    fn clear_tenant(&self, tenant_id: TenantId);
}

impl<K, V, S> TenantStore<K, V> for Arc<S>
where
    S: TenantStore<K, V> + ?Sized,
{
    fn get(&self, tenant_id: TenantId, key: &K) -> Option<V> {
        (**self).get(tenant_id, key)
    }

    fn upsert(&self, tenant_id: TenantId, key: K, value: V) {
        (**self).upsert(tenant_id, key, value)
    }

    fn remove(&self, tenant_id: TenantId, key: &K) -> Option<V> {
        (**self).remove(tenant_id, key)
    }

    fn list(&self, tenant_id: TenantId) -> Vec<V> {
        (**self).list(tenant_id)
    }

    fn clear_tenant(&self, tenant_id: TenantId) {
        (**self).clear_tenant(tenant_id)
    }
}

/// In-memory store for tests and development, one map per tenant.
#[derive(Debug)]
pub struct InMemoryTenantStore<K, V> {
    tenants: RwLock<HashMap<TenantId, HashMap<K, V>>>,
}

impl<K, V> InMemoryTenantStore<K, V> {
    pub fn new() -> Self {
        Self {
            tenants: RwLock::new(HashMap::new()),
        }
    }
}

impl<K, V> Default for InMemoryTenantStore<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> TenantStore<K, V> for InMemoryTenantStore<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn get(&self, tenant_id: TenantId, key: &K) -> Option<V> {
        let tenants = self.tenants.read().ok()?;
        tenants.get(&tenant_id)?.get(key).cloned()
    }

    fn upsert(&self, tenant_id: TenantId, key: K, value: V) {
        if let Ok(mut tenants) = self.tenants.write() {
            tenants.entry(tenant_id).or_default().insert(key, value);
        }
    }

    fn remove(&self, tenant_id: TenantId, key: &K) -> Option<V> {
        let mut tenants = self.tenants.write().ok()?;
        tenants.get_mut(&tenant_id)?.remove(key)
    }

    fn list(&self, tenant_id: TenantId) -> Vec<V> {
        match self.tenants.read() {
            Ok(tenants) => tenants
                .get(&tenant_id)
                .map(|records| records.values().cloned().collect())
                .unwrap_or_default(),
            Err(_) => Vec::new(),
        }
    }

    fn clear_tenant(&self, tenant_id: TenantId) {
        if let Ok(mut tenants) = self.tenants.write() {
            tenants.remove(&tenant_id);
        }
    }
}
