use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use super::nid::NidAllocator;
use crate::net::protocol::{ObjectFlags, ObjectUpdate};
use crate::net::value::NetValue;
use crate::snapshot::{UpdateBuffer, ValuePool};

pub type InstanceId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum Bandwidth {
    #[default]
    Normal,
    Low,
    VeryLow,
}

impl Bandwidth {
    pub fn extrapolation_horizon_ms(self) -> f64 {
        match self {
            Bandwidth::Normal => 250.0,
            Bandwidth::Low => 500.0,
            Bandwidth::VeryLow => 2500.0,
        }
    }
}

/// Decides whether a stream is due for transmission.
///
/// Fresh changes go out every update for 100ms (Normal only), then roughly
/// every 100ms until a second has passed, then roughly every 500ms.
pub fn should_transmit(bandwidth: Bandwidth, since_change: f64, since_transmit: f64) -> bool {
    if since_change < 100.0 && bandwidth == Bandwidth::Normal {
        true
    } else if since_change < 1000.0 && bandwidth <= Bandwidth::Low {
        since_transmit >= 95.0
    } else {
        since_transmit >= 495.0
    }
}

pub trait ObjectSource {
    fn count(&self, sid: &str) -> usize;
    fn instance_id(&self, sid: &str, index: usize) -> InstanceId;
    fn value(&self, sid: &str, index: usize, field: usize, schema: &NetValue) -> f64;
}

#[derive(Debug)]
pub struct NetInstance {
    pub id: Option<InstanceId>,
    pub nid: u16,
    alive: bool,
    values: Vec<f64>,
    last_changed: f64,
    last_transmit: f64,
    buffer: UpdateBuffer,
}

impl NetInstance {
    fn new(id: Option<InstanceId>, nid: u16) -> Self {
        Self {
            id,
            nid,
            alive: true,
            values: Vec::new(),
            last_changed: f64::NEG_INFINITY,
            last_transmit: f64::NEG_INFINITY,
            buffer: UpdateBuffer::new(),
        }
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn buffer(&self) -> &UpdateBuffer {
        &self.buffer
    }

    fn poll<S: ObjectSource + ?Sized>(
        &mut self,
        now: f64,
        source: &S,
        sid: &str,
        index: usize,
        schema: &[NetValue],
        bandwidth: Bandwidth,
    ) -> bool {
        self.values.resize(schema.len(), 0.0);
        for (field, nv) in schema.iter().enumerate() {
            let v = source.value(sid, index, field, nv);
            if self.values[field] != v || self.last_changed == f64::NEG_INFINITY {
                self.values[field] = v;
                self.last_changed = now;
            }
        }

        if should_transmit(bandwidth, now - self.last_changed, now - self.last_transmit) {
            self.last_transmit = now;
            true
        } else {
            false
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectSchema {
    pub nid: u16,
    #[serde(rename = "nvs")]
    pub values: Vec<NetValue>,
}

#[derive(Debug)]
pub struct RegisteredObject {
    sid: String,
    nid: Option<u16>,
    schema: Vec<NetValue>,
    /// Schema as registered locally, before any host remapped it.
    local_schema: Vec<NetValue>,
    bandwidth: Bandwidth,
    instances: BTreeMap<u16, NetInstance>,
    by_id: HashMap<InstanceId, u16>,
    nids: NidAllocator,
    dead_nids: Vec<u16>,
    overridden_nids: bool,
    transmit: Vec<u16>,
}

impl RegisteredObject {
    pub fn new(sid: impl Into<String>, nid: u16, schema: Vec<NetValue>, bandwidth: Bandwidth) -> Self {
        Self {
            sid: sid.into(),
            nid: Some(nid),
            local_schema: schema.clone(),
            schema,
            bandwidth,
            instances: BTreeMap::new(),
            by_id: HashMap::new(),
            nids: NidAllocator::new(),
            dead_nids: Vec::new(),
            overridden_nids: false,
            transmit: Vec::new(),
        }
    }

    pub fn sid(&self) -> &str {
        &self.sid
    }

    pub fn nid(&self) -> Option<u16> {
        self.nid
    }

    pub fn schema(&self) -> &[NetValue] {
        &self.schema
    }

    pub fn bandwidth(&self) -> Bandwidth {
        self.bandwidth
    }

    pub fn set_bandwidth(&mut self, bandwidth: Bandwidth) {
        self.bandwidth = bandwidth;
    }

    pub fn has_overridden_nids(&self) -> bool {
        self.overridden_nids
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    pub fn instance(&self, nid: u16) -> Option<&NetInstance> {
        self.instances.get(&nid)
    }

    pub fn instances(&self) -> impl Iterator<Item = &NetInstance> {
        self.instances.values()
    }

    pub fn nid_for_id(&self, id: InstanceId) -> Option<u16> {
        self.by_id.get(&id).copied()
    }

    /// Mark-and-sweep pass against the application's live instances.
    ///
    /// Instances the application no longer reports are removed and their
    /// NIDs queued for a destroy event. Returns how many instances are due
    /// for transmission.
    pub fn collect<S: ObjectSource + ?Sized>(&mut self, now: f64, source: &S) -> usize {
        for inst in self.instances.values_mut() {
            inst.alive = false;
        }
        self.transmit.clear();

        for index in 0..source.count(&self.sid) {
            let id = source.instance_id(&self.sid, index);
            let nid = match self.by_id.get(&id) {
                Some(&nid) => nid,
                None => match self.nids.allocate() {
                    Some(nid) => {
                        self.by_id.insert(id, nid);
                        self.instances.insert(nid, NetInstance::new(Some(id), nid));
                        nid
                    }
                    None => {
                        log::warn!("No free instance NIDs for '{}'", self.sid);
                        continue;
                    }
                },
            };

            let Some(inst) = self.instances.get_mut(&nid) else {
                continue;
            };
            inst.alive = true;
            if inst.poll(now, source, &self.sid, index, &self.schema, self.bandwidth) {
                self.transmit.push(nid);
            }
        }

        let dead: Vec<u16> = self
            .instances
            .values()
            .filter(|i| !i.alive)
            .map(|i| i.nid)
            .collect();
        for nid in dead {
            self.remove_nid(nid);
        }

        self.transmit.len()
    }

    pub fn object_update(&self) -> Option<ObjectUpdate<'_>> {
        let type_nid = self.nid?;
        if self.transmit.is_empty() {
            return None;
        }
        let instances = self
            .transmit
            .iter()
            .filter_map(|nid| self.instances.get(nid))
            .map(|i| (i.nid, i.values.as_slice()))
            .collect();
        let flags = if self.overridden_nids {
            ObjectFlags::OVERRIDDEN_NIDS
        } else {
            ObjectFlags::empty()
        };
        Some(ObjectUpdate {
            type_nid,
            flags,
            schema: &self.schema,
            instances,
        })
    }

    pub fn take_dead_nids(&mut self) -> Vec<u16> {
        std::mem::take(&mut self.dead_nids)
    }

    pub fn has_dead_nids(&self) -> bool {
        !self.dead_nids.is_empty()
    }

    /// Binds an application id to a NID chosen elsewhere.
    ///
    /// Once any instance uses an overridden NID, removals of this type no
    /// longer produce destroy events.
    pub fn override_nid(&mut self, id: InstanceId, nid: u16) -> bool {
        if self.by_id.contains_key(&id) {
            log::warn!("Instance id {} of '{}' already has a NID", id, self.sid);
            return false;
        }
        if !self.nids.mark_used(nid) {
            log::warn!("NID {} of '{}' is already in use", nid, self.sid);
            return false;
        }
        self.by_id.insert(id, nid);
        self.instances.insert(nid, NetInstance::new(Some(id), nid));
        self.overridden_nids = true;
        true
    }

    pub fn remove_id(&mut self, id: InstanceId) -> bool {
        match self.by_id.get(&id) {
            Some(&nid) => {
                self.remove_nid(nid);
                true
            }
            None => false,
        }
    }

    fn remove_nid(&mut self, nid: u16) {
        let Some(inst) = self.instances.remove(&nid) else {
            return;
        };
        if let Some(id) = inst.id {
            self.by_id.remove(&id);
        }
        self.nids.free(nid);
        if !self.overridden_nids {
            self.dead_nids.push(nid);
        }
    }

    /// Replaces the wire NID and schema with the host's. `None` unmaps the
    /// type. Existing instances are discarded.
    pub fn remap(&mut self, nid: Option<u16>, schema: Option<Vec<NetValue>>, pool: &mut ValuePool) {
        self.nid = nid;
        if let Some(schema) = schema {
            self.schema = schema;
        }
        self.clear(pool);
    }

    pub fn restore_local(&mut self, nid: u16, pool: &mut ValuePool) {
        self.nid = Some(nid);
        self.schema = self.local_schema.clone();
        self.clear(pool);
    }

    pub fn mark_overridden(&mut self) {
        self.overridden_nids = true;
    }

    pub fn apply_update(&mut self, nid: u16, timestamp: f64, values: Vec<f64>, pool: &mut ValuePool) {
        let inst = self
            .instances
            .entry(nid)
            .or_insert_with(|| NetInstance::new(None, nid));
        inst.buffer.add(timestamp, values, pool);
    }

    pub fn destroy(&mut self, nid: u16, pool: &mut ValuePool) -> bool {
        match self.instances.remove(&nid) {
            Some(mut inst) => {
                inst.buffer.clear(pool);
                if let Some(id) = inst.id {
                    self.by_id.remove(&id);
                }
                true
            }
            None => false,
        }
    }

    pub fn tick(&mut self, sim_time: f64, pool: &mut ValuePool) -> Vec<u16> {
        let mut stale = Vec::new();
        for inst in self.instances.values_mut() {
            inst.buffer.tick(sim_time, pool);
            if inst.buffer.is_timed_out(sim_time) {
                stale.push(inst.nid);
            }
        }
        for &nid in &stale {
            self.destroy(nid, pool);
        }
        stale
    }

    pub fn value_at(&self, nid: u16, field: usize, sim_time: f64) -> Option<f64> {
        let inst = self.instances.get(&nid)?;
        let mode = self.schema.get(field)?.interp;
        let horizon = self.bandwidth.extrapolation_horizon_ms();
        Some(inst.buffer.value_at(sim_time, field, mode, Some(horizon)))
    }

    pub fn clear(&mut self, pool: &mut ValuePool) {
        for (_, mut inst) in std::mem::take(&mut self.instances) {
            inst.buffer.clear(pool);
        }
        self.by_id.clear();
        self.nids.reset();
        self.dead_nids.clear();
        self.transmit.clear();
        self.overridden_nids = false;
    }
}
