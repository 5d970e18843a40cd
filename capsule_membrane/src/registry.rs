//! Capsule membrane — Reference Registries
//!
//! Per-side bookkeeping, mutated only by the owning membrane:
//!   - local:  id ↔ object this side owns (and has handed out)
//!   - remote: id → proxy for an object the other side owns
//!   - wire forms: object → cached wire value, for identity stability
//!
//! Every cached object is also held strongly by the local or remote map,
//! so the address-based `ObjectKey` cannot be recycled while cached.

use std::collections::HashMap;

use crate::value::{ObjectKey, ObjectRef};
use crate::wire::{CapabilityValue, RefId, FIRST_DYNAMIC_ID};

/// Registries owned by a single membrane.
pub struct Registry {
    local: HashMap<RefId, ObjectRef>,
    remote: HashMap<RefId, ObjectRef>,
    wire_forms: HashMap<ObjectKey, CapabilityValue>,
    next_local_id: RefId,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self {
            local: HashMap::new(),
            remote: HashMap::new(),
            wire_forms: HashMap::new(),
            next_local_id: FIRST_DYNAMIC_ID,
        }
    }

    /// Cached wire form of an object already known to this side, whether
    /// it originated here or arrived from the other side.
    pub fn wire_form(&self, obj: &ObjectRef) -> Option<CapabilityValue> {
        self.wire_forms.get(&obj.key()).cloned()
    }

    /// Allocate a fresh id for a local object and cache both directions.
    pub fn register_local(&mut self, obj: &ObjectRef) -> CapabilityValue {
        let id = self.next_local_id;
        self.next_local_id += 1;
        self.bind_local(id, obj.clone())
    }

    /// Bind a local object to a fixed id.
    pub fn bind_local(&mut self, id: RefId, obj: ObjectRef) -> CapabilityValue {
        let wire = CapabilityValue::OwnRef {
            id,
            shape: obj.shape(),
        };
        self.wire_forms.insert(obj.key(), wire.clone());
        self.local.insert(id, obj);
        wire
    }

    /// Bind a proxy for a remote id. It serializes as a bounce reference.
    pub fn bind_remote(&mut self, id: RefId, proxy: ObjectRef) {
        let wire = CapabilityValue::BounceRef {
            id,
            shape: proxy.shape(),
        };
        self.wire_forms.insert(proxy.key(), wire);
        self.remote.insert(id, proxy);
    }

    pub fn local(&self, id: RefId) -> Option<ObjectRef> {
        self.local.get(&id).cloned()
    }

    pub fn remote(&self, id: RefId) -> Option<ObjectRef> {
        self.remote.get(&id).cloned()
    }

    pub fn next_local_id(&self) -> RefId {
        self.next_local_id
    }

    pub fn local_count(&self) -> usize {
        self.local.len()
    }

    pub fn remote_count(&self) -> usize {
        self.remote.len()
    }
}
