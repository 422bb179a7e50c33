// Copyright (c) 2026 Asinka
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! In-memory object registry: the authoritative map of syncable objects,
//! the version gate, and the change fan-out.
//!
//! All operations are infallible and non-suspending. Local mutations always
//! win locally; remote values pass the version gate (strictly greater or
//! silently dropped). Changes are published before the internal lock is
//! released, so for any single object id every observer sees changes in
//! application order. Lagging observers lose oldest entries; the loss is
//! counted, never propagated into registry state.

use crate::core::types::{SyncObject, Value};
use crate::monitoring::Metrics;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tracing::debug;

/// Capacity of the global change stream per subscriber.
const GLOBAL_CHANGE_CAPACITY: usize = 1024;
/// Capacity of each per-object change stream per subscriber.
const PER_ID_CHANGE_CAPACITY: usize = 64;

/// A change on the global stream.
#[derive(Clone, Debug)]
pub enum RegistryChange {
    /// An object was inserted or replaced.
    Updated(SyncObject),
    /// An object was removed.
    Deleted {
        /// Removed object id.
        object_id: String,
        /// Its schema type name.
        type_name: String,
    },
}

struct Inner {
    objects: HashMap<String, SyncObject>,
    // Lazily created per-id senders. Entries with no live receivers are
    // pruned on the next emission for that id, so subscribers never extend
    // registry memory beyond their own lifetime.
    per_id: HashMap<String, broadcast::Sender<SyncObject>>,
}

/// The object registry.
pub struct ObjectRegistry {
    inner: Mutex<Inner>,
    global_tx: broadcast::Sender<RegistryChange>,
    metrics: Arc<Metrics>,
}

impl ObjectRegistry {
    /// Create an empty registry.
    pub fn new(metrics: Arc<Metrics>) -> Self {
        let (global_tx, _) = broadcast::channel(GLOBAL_CHANGE_CAPACITY);
        Self {
            inner: Mutex::new(Inner {
                objects: HashMap::new(),
                per_id: HashMap::new(),
            }),
            global_tx,
            metrics,
        }
    }

    /// Insert or replace the entry for `obj.object_id`. Unconditional: the
    /// caller's mutation always wins locally.
    pub fn register(&self, obj: SyncObject) {
        let mut inner = self.lock();
        inner.objects.insert(obj.object_id.clone(), obj.clone());
        self.emit_updated(&mut inner, obj);
    }

    /// Apply a partial mutation to a known object: merge `fields`, bump the
    /// version by one, clear the origin (the value is locally authored
    /// again). No-op when `id` is unknown. Unknown field names are inserted.
    pub fn update(&self, id: &str, fields: BTreeMap<String, Value>) {
        let mut inner = self.lock();
        let updated = match inner.objects.get_mut(id) {
            Some(obj) => {
                for (name, value) in fields {
                    obj.fields.insert(name, value);
                }
                obj.version = obj.version.saturating_add(1);
                obj.origin_session = None;
                obj.clone()
            }
            None => {
                debug!(object_id = %id, "update for unknown object id; ignoring");
                return;
            }
        };
        self.emit_updated(&mut inner, updated);
    }

    /// Remove the entry for `id` if present. Idempotent; no error when
    /// unknown.
    pub fn delete(&self, id: &str) {
        let mut inner = self.lock();
        let Some(obj) = inner.objects.remove(id) else {
            return;
        };
        // A removed id has no further values; drop its stream so late
        // subscribers observe end-of-stream rather than silence.
        inner.per_id.remove(id);
        let _ = self.global_tx.send(RegistryChange::Deleted {
            object_id: obj.object_id,
            type_name: obj.type_name,
        });
    }

    /// Snapshot of the entry for `id`. Never blocks on observers.
    pub fn get(&self, id: &str) -> Option<SyncObject> {
        self.lock().objects.get(id).cloned()
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        self.lock().objects.len()
    }

    /// True when no objects are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Hot stream of every subsequent value for `id`. The current value is
    /// not re-emitted on subscription.
    pub fn observe(&self, id: &str) -> ObjectStream {
        let mut inner = self.lock();
        let rx = inner
            .per_id
            .entry(id.to_string())
            .or_insert_with(|| broadcast::channel(PER_ID_CHANGE_CAPACITY).0)
            .subscribe();
        ObjectStream {
            rx,
            metrics: self.metrics.clone(),
        }
    }

    /// Hot stream of `Updated`/`Deleted` changes across all ids.
    pub fn observe_all(&self) -> ChangeStream {
        ChangeStream {
            rx: self.global_tx.subscribe(),
            metrics: self.metrics.clone(),
        }
    }

    /// The version gate. Insert when absent; replace when the incoming
    /// version is strictly greater than the stored one; otherwise drop
    /// silently. `obj.origin_session` must already name the session the
    /// value arrived on.
    pub fn apply_remote_update(&self, obj: SyncObject) {
        let mut inner = self.lock();
        if let Some(existing) = inner.objects.get(&obj.object_id) {
            if existing.version >= obj.version {
                self.metrics.version_stale_total.inc();
                debug!(
                    object_id = %obj.object_id,
                    local = existing.version,
                    remote = obj.version,
                    "stale remote version; dropping"
                );
                return;
            }
        }
        inner.objects.insert(obj.object_id.clone(), obj.clone());
        self.emit_updated(&mut inner, obj);
    }

    /// Remote delete: remove and emit `Deleted` when present, otherwise
    /// silently drop.
    pub fn apply_remote_delete(&self, object_id: &str, type_name: &str) {
        let mut inner = self.lock();
        if inner.objects.remove(object_id).is_none() {
            return;
        }
        inner.per_id.remove(object_id);
        let _ = self.global_tx.send(RegistryChange::Deleted {
            object_id: object_id.to_string(),
            type_name: type_name.to_string(),
        });
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // The mutex is held only across map mutation and channel enqueue;
        // nothing inside can panic, so poisoning cannot arise from here.
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn emit_updated(&self, inner: &mut Inner, obj: SyncObject) {
        if let Some(tx) = inner.per_id.get(&obj.object_id) {
            if tx.receiver_count() == 0 {
                inner.per_id.remove(&obj.object_id);
            } else {
                let _ = tx.send(obj.clone());
            }
        }
        let _ = self.global_tx.send(RegistryChange::Updated(obj));
    }
}

/// Per-object change stream. Lag gaps are counted and skipped.
pub struct ObjectStream {
    rx: broadcast::Receiver<SyncObject>,
    metrics: Arc<Metrics>,
}

impl ObjectStream {
    /// Next value, or `None` once the stream ends (registry dropped or the
    /// object deleted).
    pub async fn recv(&mut self) -> Option<SyncObject> {
        loop {
            match self.rx.recv().await {
                Ok(obj) => return Some(obj),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    self.metrics.registry_lagged_total.inc_by(n);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Global change stream. Lag gaps are counted and skipped.
pub struct ChangeStream {
    rx: broadcast::Receiver<RegistryChange>,
    metrics: Arc<Metrics>,
}

impl ChangeStream {
    /// Next change, or `None` once the registry is gone.
    pub async fn recv(&mut self) -> Option<RegistryChange> {
        loop {
            match self.rx.recv().await {
                Ok(change) => return Some(change),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    self.metrics.registry_lagged_total.inc_by(n);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
