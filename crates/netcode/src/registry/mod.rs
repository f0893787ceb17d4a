pub mod nid;
pub mod object;

use std::collections::BTreeMap;

pub use nid::NidAllocator;
pub use object::{
    Bandwidth, InstanceId, NetInstance, ObjectSchema, ObjectSource, RegisteredObject,
    should_transmit,
};

use crate::net::protocol::{ObjectUpdate, SchemaLookup};
use crate::net::value::NetValue;
use crate::snapshot::ValuePool;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("object type '{0}' is already registered")]
    Duplicate(String),
    #[error("object type '{0}' is not registered")]
    Unknown(String),
}

#[derive(Debug)]
pub struct Registry {
    objects: Vec<RegisteredObject>,
    next_nid: u16,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self {
            objects: Vec::new(),
            next_nid: 1,
        }
    }

    pub fn register(
        &mut self,
        sid: &str,
        schema: Vec<NetValue>,
        bandwidth: Bandwidth,
    ) -> Result<u16, RegistryError> {
        if self.get(sid).is_some() {
            return Err(RegistryError::Duplicate(sid.to_string()));
        }
        let nid = self.next_nid;
        self.next_nid = self.next_nid.wrapping_add(1);
        self.objects
            .push(RegisteredObject::new(sid, nid, schema, bandwidth));
        Ok(nid)
    }

    pub fn get(&self, sid: &str) -> Option<&RegisteredObject> {
        self.objects.iter().find(|o| o.sid() == sid)
    }

    pub fn get_mut(&mut self, sid: &str) -> Result<&mut RegisteredObject, RegistryError> {
        self.objects
            .iter_mut()
            .find(|o| o.sid() == sid)
            .ok_or_else(|| RegistryError::Unknown(sid.to_string()))
    }

    pub fn by_nid(&self, nid: u16) -> Option<&RegisteredObject> {
        self.objects.iter().find(|o| o.nid() == Some(nid))
    }

    pub fn by_nid_mut(&mut self, nid: u16) -> Option<&mut RegisteredObject> {
        self.objects.iter_mut().find(|o| o.nid() == Some(nid))
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegisteredObject> {
        self.objects.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut RegisteredObject> {
        self.objects.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn collect<S: ObjectSource + ?Sized>(&mut self, now: f64, source: &S) {
        for object in &mut self.objects {
            object.collect(now, source);
        }
    }

    pub fn object_updates(&self) -> Vec<ObjectUpdate<'_>> {
        self.objects
            .iter()
            .filter_map(|o| o.object_update())
            .collect()
    }

    pub fn take_dead_nids(&mut self) -> Vec<(u16, Vec<u16>)> {
        self.objects
            .iter_mut()
            .filter(|o| o.has_dead_nids())
            .filter_map(|o| {
                let dead = o.take_dead_nids();
                o.nid().map(|nid| (nid, dead))
            })
            .collect()
    }

    pub fn schemas(&self) -> BTreeMap<String, ObjectSchema> {
        self.objects
            .iter()
            .filter_map(|o| {
                o.nid().map(|nid| {
                    (
                        o.sid().to_string(),
                        ObjectSchema {
                            nid,
                            values: o.schema().to_vec(),
                        },
                    )
                })
            })
            .collect()
    }

    /// Adopts the host's type NIDs and schemas. Local types the host did
    /// not mention are left unmapped.
    pub fn map_from_host(&mut self, schemas: &BTreeMap<String, ObjectSchema>, pool: &mut ValuePool) {
        for object in &mut self.objects {
            match schemas.get(object.sid()) {
                Some(s) => object.remap(Some(s.nid), Some(s.values.clone()), pool),
                None => object.remap(None, None, pool),
            }
        }
    }

    pub fn remove_id(&mut self, id: InstanceId) {
        for object in &mut self.objects {
            object.remove_id(id);
        }
    }

    pub fn tick(&mut self, sim_time: f64, pool: &mut ValuePool) -> Vec<(String, u16)> {
        let mut stale = Vec::new();
        for object in &mut self.objects {
            for nid in object.tick(sim_time, pool) {
                stale.push((object.sid().to_string(), nid));
            }
        }
        stale
    }

    pub fn restore_local(&mut self, pool: &mut ValuePool) {
        self.next_nid = 1;
        for object in &mut self.objects {
            object.restore_local(self.next_nid, pool);
            self.next_nid = self.next_nid.wrapping_add(1);
        }
    }

    pub fn clear_instances(&mut self, pool: &mut ValuePool) {
        for object in &mut self.objects {
            object.clear(pool);
        }
    }
}

impl SchemaLookup for Registry {
    fn schema(&self, type_nid: u16) -> Option<&[NetValue]> {
        self.by_nid(type_nid).map(|o| o.schema())
    }
}
