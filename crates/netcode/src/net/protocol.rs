use bytes::{Buf, BufMut};

use super::value::{NetValue, schema_byte_size};
use crate::snapshot::pool::ValuePool;

pub const PROTOCOL_MAGIC: u32 = 0x6332_6D70;
pub const PROTOCOL_REVISION: u32 = 1;

const KIND_HOST_UPDATE: u32 = 0;
const KIND_HOST_EVENTS: u32 = 1;

const HEADER_LEN: usize = 4 + 4 + 8 + 2;
const OBJECT_HEADER_LEN: usize = 2 + 1 + 2 + 2;
const CLIENT_HEADER_LEN: usize = 4 + 8 + 1 + 1;

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
    pub struct ObjectFlags: u8 {
        /// Instance NIDs of this type are assigned externally.
        const OVERRIDDEN_NIDS = 0b0000_0001;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transport,
    Protocol,
    Decode,
    Timeout,
    Schema,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum WireError {
    #[error("bad magic number {0:#010x}")]
    BadMagic(u32),
    #[error("unknown message kind {0}")]
    UnknownKind(u32),
    #[error("unexpected end of input")]
    UnexpectedEof,
    #[error("type {type_nid}: declared {declared} bytes per instance, schema needs {expected}")]
    SizeMismatch {
        type_nid: u16,
        declared: u16,
        expected: usize,
    },
}

impl WireError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WireError::BadMagic(_) | WireError::UnknownKind(_) => ErrorKind::Protocol,
            WireError::UnexpectedEof | WireError::SizeMismatch { .. } => ErrorKind::Decode,
        }
    }
}

pub trait SchemaLookup {
    fn schema(&self, type_nid: u16) -> Option<&[NetValue]>;
}

#[derive(Debug, Clone)]
pub struct ObjectUpdate<'a> {
    pub type_nid: u16,
    pub flags: ObjectFlags,
    pub schema: &'a [NetValue],
    pub instances: Vec<(u16, &'a [f64])>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecodedInstance {
    pub nid: u16,
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecodedObject {
    pub type_nid: u16,
    pub flags: ObjectFlags,
    pub instances: Vec<DecodedInstance>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HostUpdate {
    pub timestamp: f64,
    pub objects: Vec<DecodedObject>,
    /// Type NIDs with no known schema. Their instances were skipped.
    pub unknown_types: Vec<u16>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HostEvents {
    pub timestamp: f64,
    pub destroyed: Vec<(u16, Vec<u16>)>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum HostMessage {
    Update(HostUpdate),
    Events(HostEvents),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClientInput {
    pub timestamp: f64,
    pub values: Vec<f64>,
}

fn need(buf: &[u8], len: usize) -> Result<(), WireError> {
    if buf.len() < len {
        Err(WireError::UnexpectedEof)
    } else {
        Ok(())
    }
}

fn read_magic(buf: &mut &[u8]) -> Result<(), WireError> {
    need(buf, 4)?;
    let magic = buf.get_u32();
    if magic != PROTOCOL_MAGIC {
        return Err(WireError::BadMagic(magic));
    }
    Ok(())
}

const MAX_SECTION: usize = u16::MAX as usize;

type Section<'o, 'a> = (&'o ObjectUpdate<'a>, &'o [(u16, &'a [f64])]);

/// Splits each type into sections of at most `MAX_SECTION` instances. A type
/// may appear in several sections; receivers apply them in order.
fn sections<'o, 'a>(objects: &'o [ObjectUpdate<'a>]) -> Vec<Section<'o, 'a>> {
    let mut out: Vec<Section<'o, 'a>> = Vec::with_capacity(objects.len());
    for object in objects {
        if object.instances.is_empty() {
            out.push((object, &object.instances[..]));
        } else {
            out.extend(object.instances.chunks(MAX_SECTION).map(|c| (object, c)));
        }
    }
    if out.len() > MAX_SECTION {
        log::warn!(
            "Host update has {} sections, dropping {}",
            out.len(),
            out.len() - MAX_SECTION
        );
        out.truncate(MAX_SECTION);
    }
    out
}

fn sections_len(sections: &[Section<'_, '_>]) -> usize {
    HEADER_LEN
        + sections
            .iter()
            .map(|(o, chunk)| OBJECT_HEADER_LEN + chunk.len() * (2 + schema_byte_size(o.schema)))
            .sum::<usize>()
}

pub fn host_update_len(objects: &[ObjectUpdate<'_>]) -> usize {
    sections_len(&sections(objects))
}

pub fn encode_host_update(timestamp: f64, objects: &[ObjectUpdate<'_>]) -> Vec<u8> {
    let sections = sections(objects);
    let len = sections_len(&sections);
    let mut buf = Vec::with_capacity(len);
    buf.put_u32(PROTOCOL_MAGIC);
    buf.put_u32(KIND_HOST_UPDATE);
    buf.put_f64(timestamp);
    buf.put_u16(sections.len() as u16);

    for &(object, chunk) in &sections {
        buf.put_u16(object.type_nid);
        buf.put_u8(object.flags.bits());
        buf.put_u16(chunk.len() as u16);
        buf.put_u16(schema_byte_size(object.schema) as u16);

        for &(nid, values) in chunk {
            buf.put_u16(nid);
            for (i, field) in object.schema.iter().enumerate() {
                field.write(&mut buf, values.get(i).copied().unwrap_or(0.0));
            }
        }
    }

    debug_assert_eq!(buf.len(), len);
    buf
}

fn event_sections<'a>(destroyed: &[(u16, &'a [u16])]) -> Vec<(u16, &'a [u16])> {
    let mut out = Vec::with_capacity(destroyed.len());
    for &(type_nid, nids) in destroyed {
        if nids.is_empty() {
            out.push((type_nid, nids));
        } else {
            out.extend(nids.chunks(MAX_SECTION).map(|c| (type_nid, c)));
        }
    }
    if out.len() > MAX_SECTION {
        log::warn!(
            "Host events have {} sections, dropping {}",
            out.len(),
            out.len() - MAX_SECTION
        );
        out.truncate(MAX_SECTION);
    }
    out
}

fn event_sections_len(sections: &[(u16, &[u16])]) -> usize {
    HEADER_LEN + sections.iter().map(|(_, nids)| 4 + nids.len() * 2).sum::<usize>()
}

pub fn host_events_len(destroyed: &[(u16, &[u16])]) -> usize {
    event_sections_len(&event_sections(destroyed))
}

pub fn encode_host_events(timestamp: f64, destroyed: &[(u16, &[u16])]) -> Vec<u8> {
    let sections = event_sections(destroyed);
    let len = event_sections_len(&sections);
    let mut buf = Vec::with_capacity(len);
    buf.put_u32(PROTOCOL_MAGIC);
    buf.put_u32(KIND_HOST_EVENTS);
    buf.put_f64(timestamp);
    buf.put_u16(sections.len() as u16);

    for &(type_nid, nids) in &sections {
        buf.put_u16(type_nid);
        buf.put_u16(nids.len() as u16);
        for &nid in nids {
            buf.put_u16(nid);
        }
    }

    debug_assert_eq!(buf.len(), len);
    buf
}

pub fn decode_host_message<S: SchemaLookup>(
    data: &[u8],
    schemas: &S,
    pool: &mut ValuePool,
) -> Result<HostMessage, WireError> {
    let mut buf = data;
    read_magic(&mut buf)?;
    need(buf, 4 + 8 + 2)?;
    let kind = buf.get_u32();
    let timestamp = buf.get_f64();
    let count = buf.get_u16();

    match kind {
        KIND_HOST_UPDATE => {
            decode_objects(&mut buf, timestamp, count, schemas, pool).map(HostMessage::Update)
        }
        KIND_HOST_EVENTS => decode_events(&mut buf, timestamp, count).map(HostMessage::Events),
        other => Err(WireError::UnknownKind(other)),
    }
}

fn decode_objects<S: SchemaLookup>(
    buf: &mut &[u8],
    timestamp: f64,
    count: u16,
    schemas: &S,
    pool: &mut ValuePool,
) -> Result<HostUpdate, WireError> {
    let mut update = HostUpdate {
        timestamp,
        objects: Vec::with_capacity(count as usize),
        unknown_types: Vec::new(),
    };

    for _ in 0..count {
        need(buf, OBJECT_HEADER_LEN)?;
        let type_nid = buf.get_u16();
        let flags = ObjectFlags::from_bits_truncate(buf.get_u8());
        let instance_count = buf.get_u16() as usize;
        let instance_size = buf.get_u16();

        let Some(schema) = schemas.schema(type_nid) else {
            let skip = instance_count * (2 + instance_size as usize);
            need(buf, skip)?;
            buf.advance(skip);
            update.unknown_types.push(type_nid);
            continue;
        };

        let expected = schema_byte_size(schema);
        if expected != instance_size as usize {
            return Err(WireError::SizeMismatch {
                type_nid,
                declared: instance_size,
                expected,
            });
        }
        need(buf, instance_count * (2 + expected))?;

        let mut instances = Vec::with_capacity(instance_count);
        for _ in 0..instance_count {
            let nid = buf.get_u16();
            let mut values = pool.acquire(schema.len());
            for field in schema {
                values.push(field.read(buf)?);
            }
            instances.push(DecodedInstance { nid, values });
        }

        update.objects.push(DecodedObject {
            type_nid,
            flags,
            instances,
        });
    }

    Ok(update)
}

fn decode_events(buf: &mut &[u8], timestamp: f64, count: u16) -> Result<HostEvents, WireError> {
    let mut destroyed = Vec::with_capacity(count as usize);
    for _ in 0..count {
        need(buf, 4)?;
        let type_nid = buf.get_u16();
        let n = buf.get_u16() as usize;
        need(buf, n * 2)?;
        let nids = (0..n).map(|_| buf.get_u16()).collect();
        destroyed.push((type_nid, nids));
    }
    Ok(HostEvents {
        timestamp,
        destroyed,
    })
}

pub fn client_input_len(schema: &[NetValue], count: usize) -> usize {
    CLIENT_HEADER_LEN
        + schema
            .iter()
            .take(count)
            .map(|v| v.precision.byte_size())
            .sum::<usize>()
}

pub fn encode_client_input(timestamp: f64, schema: &[NetValue], values: &[f64]) -> Vec<u8> {
    let count = schema.len().min(values.len()).min(u8::MAX as usize);
    let len = client_input_len(schema, count);
    let mut buf = Vec::with_capacity(len);
    buf.put_u32(PROTOCOL_MAGIC);
    buf.put_f64(timestamp);
    buf.put_u8(0);
    buf.put_u8(count as u8);
    for (field, &value) in schema.iter().zip(values).take(count) {
        field.write(&mut buf, value);
    }
    debug_assert_eq!(buf.len(), len);
    buf
}

/// Decodes a client input update. Values announced beyond the known
/// schema read as zero and consume no bytes.
pub fn decode_client_input(
    data: &[u8],
    schema: &[NetValue],
    pool: &mut ValuePool,
) -> Result<ClientInput, WireError> {
    let mut buf = data;
    read_magic(&mut buf)?;
    need(buf, 8 + 1 + 1)?;
    let timestamp = buf.get_f64();
    let _reserved = buf.get_u8();
    let count = buf.get_u8() as usize;

    let mut values = pool.acquire(count);
    for i in 0..count {
        match schema.get(i) {
            Some(field) => values.push(field.read(&mut buf)?),
            None => values.push(0.0),
        }
    }

    Ok(ClientInput { timestamp, values })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::value::Precision;
    use crate::snapshot::interp::Interp;
    use std::collections::HashMap;

    struct Schemas(HashMap<u16, Vec<NetValue>>);

    impl SchemaLookup for Schemas {
        fn schema(&self, type_nid: u16) -> Option<&[NetValue]> {
            self.0.get(&type_nid).map(|v| v.as_slice())
        }
    }

    fn sprite_schema() -> Vec<NetValue> {
        vec![
            NetValue::new("x", Precision::Float32, Interp::Linear),
            NetValue::new("y", Precision::Float32, Interp::Linear),
            NetValue::new("angle", Precision::Int16, Interp::Angular),
            NetValue::new("frame", Precision::UInt8, Interp::None),
        ]
    }

    #[test]
    fn host_update_layout() {
        let schema = sprite_schema();
        let a = [10.0, 20.0, 0.0, 3.0];
        let b = [-5.5, 1.25, 0.0, 7.0];
        let objects = [ObjectUpdate {
            type_nid: 1,
            flags: ObjectFlags::empty(),
            schema: &schema,
            instances: vec![(4, &a[..]), (9, &b[..])],
        }];

        let bytes = encode_host_update(1500.0, &objects);
        assert_eq!(bytes.len(), host_update_len(&objects));
        assert_eq!(bytes.len(), 18 + 7 + 2 * (2 + 11));
        assert_eq!(&bytes[0..4], &[0x63, 0x32, 0x6D, 0x70]);
        assert_eq!(&bytes[4..8], &[0, 0, 0, 0]);

        let schemas = Schemas(HashMap::from([(1, schema.clone())]));
        let mut pool = ValuePool::new();
        let HostMessage::Update(update) = decode_host_message(&bytes, &schemas, &mut pool).unwrap()
        else {
            panic!("expected a state update");
        };
        assert_eq!(update.timestamp, 1500.0);
        assert_eq!(update.objects.len(), 1);
        let inst = &update.objects[0].instances;
        assert_eq!(inst[0].nid, 4);
        assert_eq!(inst[1].nid, 9);
        assert_eq!(inst[1].values[0], -5.5);
        assert_eq!(inst[1].values[3], 7.0);
    }

    #[test]
    fn unknown_type_is_skipped() {
        let schema = sprite_schema();
        let v = [1.0, 2.0, 0.0, 0.0];
        let objects = [
            ObjectUpdate {
                type_nid: 7,
                flags: ObjectFlags::OVERRIDDEN_NIDS,
                schema: &schema,
                instances: vec![(1, &v[..]), (2, &v[..])],
            },
            ObjectUpdate {
                type_nid: 1,
                flags: ObjectFlags::OVERRIDDEN_NIDS,
                schema: &schema,
                instances: vec![(3, &v[..])],
            },
        ];
        let bytes = encode_host_update(0.0, &objects);

        let schemas = Schemas(HashMap::from([(1, schema.clone())]));
        let mut pool = ValuePool::new();
        let HostMessage::Update(update) = decode_host_message(&bytes, &schemas, &mut pool).unwrap()
        else {
            panic!("expected a state update");
        };
        assert_eq!(update.unknown_types, vec![7]);
        assert_eq!(update.objects.len(), 1);
        assert!(update.objects[0].flags.contains(ObjectFlags::OVERRIDDEN_NIDS));
        assert_eq!(update.objects[0].instances[0].nid, 3);
    }

    #[test]
    fn schema_size_disagreement() {
        let schema = sprite_schema();
        let v = [0.0; 4];
        let objects = [ObjectUpdate {
            type_nid: 1,
            flags: ObjectFlags::empty(),
            schema: &schema,
            instances: vec![(1, &v[..])],
        }];
        let bytes = encode_host_update(0.0, &objects);

        let narrower = vec![NetValue::new("x", Precision::Float64, Interp::Linear)];
        let schemas = Schemas(HashMap::from([(1, narrower)]));
        let err = decode_host_message(&bytes, &schemas, &mut ValuePool::new()).unwrap_err();
        assert!(matches!(err, WireError::SizeMismatch { type_nid: 1, declared: 11, expected: 8 }));
        assert_eq!(err.kind(), ErrorKind::Decode);
    }

    #[test]
    fn events_layout() {
        let dead_a = [3u16, 4];
        let dead_b = [65535u16];
        let destroyed = [(1u16, &dead_a[..]), (2u16, &dead_b[..])];
        let bytes = encode_host_events(99.0, &destroyed);
        assert_eq!(bytes.len(), 18 + 4 + 4 + 4 + 2);
        assert_eq!(&bytes[4..8], &[0, 0, 0, 1]);

        let schemas = Schemas(HashMap::new());
        let HostMessage::Events(events) =
            decode_host_message(&bytes, &schemas, &mut ValuePool::new()).unwrap()
        else {
            panic!("expected events");
        };
        assert_eq!(events.timestamp, 99.0);
        assert_eq!(events.destroyed, vec![(1, vec![3, 4]), (2, vec![65535])]);
    }

    #[test]
    fn rejects_foreign_and_truncated() {
        let schemas = Schemas(HashMap::new());
        let mut pool = ValuePool::new();

        let err = decode_host_message(&[0, 0, 0, 0, 0, 0, 0, 0], &schemas, &mut pool).unwrap_err();
        assert_eq!(err, WireError::BadMagic(0));
        assert_eq!(err.kind(), ErrorKind::Protocol);

        let dead = [1u16, 2, 3];
        let bytes = encode_host_events(0.0, &[(1, &dead[..])]);
        for cut in 0..bytes.len() {
            assert!(decode_host_message(&bytes[..cut], &schemas, &mut pool).is_err());
        }

        let mut bogus = bytes.clone();
        bogus[7] = 5;
        assert_eq!(
            decode_host_message(&bogus, &schemas, &mut pool).unwrap_err(),
            WireError::UnknownKind(5)
        );
    }

    #[test]
    fn client_input_layout() {
        let schema = vec![
            NetValue::new("mx", Precision::Float32, Interp::Linear),
            NetValue::new("fire", Precision::UInt8, Interp::None),
        ];
        let bytes = encode_client_input(1234.5, &schema, &[0.5, 1.0]);
        assert_eq!(bytes.len(), 4 + 8 + 1 + 1 + 4 + 1);
        assert_eq!(bytes[12], 0);
        assert_eq!(bytes[13], 2);

        let mut pool = ValuePool::new();
        let input = decode_client_input(&bytes, &schema, &mut pool).unwrap();
        assert_eq!(input.timestamp, 1234.5);
        assert_eq!(input.values, vec![0.5, 1.0]);

        let narrow = &schema[..1];
        let input = decode_client_input(&bytes, narrow, &mut pool).unwrap();
        assert_eq!(input.values, vec![0.5, 0.0]);

        assert!(decode_client_input(&bytes[..15], &schema, &mut pool).is_err());
    }

    #[test]
    fn full_nid_space_is_split_into_sections() {
        let schema = vec![NetValue::new("frame", Precision::UInt8, Interp::None)];
        let value = [1.0];
        let instances: Vec<(u16, &[f64])> = (0..=u16::MAX).map(|nid| (nid, &value[..])).collect();
        let objects = [ObjectUpdate {
            type_nid: 7,
            flags: ObjectFlags::empty(),
            schema: &schema,
            instances,
        }];

        let bytes = encode_host_update(10.0, &objects);
        assert_eq!(bytes.len(), host_update_len(&objects));
        assert_eq!(bytes.len(), 18 + 2 * 7 + 65536 * 3);

        let schemas = Schemas(HashMap::from([(7, schema.clone())]));
        let HostMessage::Update(update) =
            decode_host_message(&bytes, &schemas, &mut ValuePool::new()).unwrap()
        else {
            panic!("expected update");
        };
        let counts: Vec<usize> = update.objects.iter().map(|o| o.instances.len()).collect();
        assert_eq!(counts, vec![65535, 1]);
        assert!(update.objects.iter().all(|o| o.type_nid == 7));
        assert_eq!(update.objects[1].instances[0].nid, u16::MAX);
    }

    #[test]
    fn long_destroy_lists_are_split() {
        let dead: Vec<u16> = (0..=u16::MAX).collect();
        let bytes = encode_host_events(1.0, &[(3, &dead[..])]);
        assert_eq!(bytes.len(), 18 + 2 * 4 + 65536 * 2);

        let schemas = Schemas(HashMap::new());
        let HostMessage::Events(events) =
            decode_host_message(&bytes, &schemas, &mut ValuePool::new()).unwrap()
        else {
            panic!("expected events");
        };
        let total: usize = events.destroyed.iter().map(|(_, nids)| nids.len()).sum();
        assert_eq!(events.destroyed.len(), 2);
        assert_eq!(total, 65536);
    }
}
