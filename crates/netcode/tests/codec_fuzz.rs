//! Property tests for the binary wire format and the text classifier.
//!
//! Decoders face untrusted peers: arbitrary input must produce an error,
//! never a panic.

use proptest::prelude::*;
use tether::net::control::parse_text;
use tether::net::protocol::ObjectUpdate;
use tether::net::value::quantize;
use tether::net::{
    HostMessage, ObjectFlags, PROTOCOL_MAGIC, decode_client_input, decode_host_message,
    encode_client_input, encode_host_events, encode_host_update,
};
use tether::{Bandwidth, Interp, NetValue, Precision, Registry, ValuePool};

fn schema() -> Vec<NetValue> {
    vec![
        NetValue::new("x", Precision::Float64, Interp::Linear),
        NetValue::new("y", Precision::Float32, Interp::Linear),
        NetValue::new("a", Precision::Int16, Interp::Angular),
        NetValue::new("hp", Precision::UInt8, Interp::None),
    ]
}

fn registry() -> Registry {
    let mut registry = Registry::new();
    registry
        .register("ship", schema(), Bandwidth::Normal)
        .unwrap();
    registry
}

fn precision() -> impl Strategy<Value = Precision> {
    prop_oneof![
        Just(Precision::Float64),
        Just(Precision::Float32),
        Just(Precision::Int16),
        Just(Precision::UInt8),
    ]
}

fn interp() -> impl Strategy<Value = Interp> {
    prop_oneof![Just(Interp::None), Just(Interp::Linear), Just(Interp::Angular)]
}

proptest! {
    #[test]
    fn arbitrary_bytes_dont_crash_host_decoder(
        bytes in prop::collection::vec(any::<u8>(), 0..512),
    ) {
        let mut pool = ValuePool::new();
        let _ = decode_host_message(&bytes, &registry(), &mut pool);
    }

    #[test]
    fn magic_prefixed_bytes_dont_crash_host_decoder(
        kind in 0u32..3,
        tail in prop::collection::vec(any::<u8>(), 0..512),
    ) {
        let mut bytes = PROTOCOL_MAGIC.to_be_bytes().to_vec();
        bytes.extend_from_slice(&kind.to_be_bytes());
        bytes.extend(tail);
        let mut pool = ValuePool::new();
        let _ = decode_host_message(&bytes, &registry(), &mut pool);
    }

    #[test]
    fn arbitrary_bytes_dont_crash_input_decoder(
        bytes in prop::collection::vec(any::<u8>(), 0..256),
    ) {
        let mut pool = ValuePool::new();
        let _ = decode_client_input(&bytes, &schema(), &mut pool);
    }

    #[test]
    fn arbitrary_text_doesnt_crash_classifier(text in ".{0,200}") {
        let _ = parse_text(&text);
    }

    #[test]
    fn quantized_integers_stay_in_range(
        value in any::<f64>(),
        interp in interp(),
    ) {
        let q16 = quantize(value, Precision::Int16, interp);
        prop_assert!((-32768.0..=32767.0).contains(&q16));
        prop_assert_eq!(q16, q16.trunc());
        let q8 = quantize(value, Precision::UInt8, interp);
        prop_assert!((0.0..=255.0).contains(&q8));
    }

    #[test]
    fn quantization_is_idempotent(
        value in -1.0e6f64..1.0e6,
        precision in precision(),
        interp in interp().prop_filter("angular is packed", |i| *i != Interp::Angular),
    ) {
        let once = quantize(value, precision, interp);
        prop_assert_eq!(quantize(once, precision, interp), once);
    }

    #[test]
    fn host_update_decodes_to_quantized_values(
        timestamp in 0.0f64..1.0e9,
        rows in prop::collection::vec(
            (1u16..1000, -1000.0f64..1000.0, -1000.0f64..1000.0, 0.0f64..6.28, 0.0f64..255.0),
            1..20,
        ),
    ) {
        let schema = schema();
        let values: Vec<(u16, Vec<f64>)> = rows
            .iter()
            .map(|&(nid, x, y, a, hp)| (nid, vec![x, y, a, hp]))
            .collect();
        let update = ObjectUpdate {
            type_nid: 1,
            flags: ObjectFlags::empty(),
            schema: &schema,
            instances: values.iter().map(|(nid, v)| (*nid, v.as_slice())).collect(),
        };
        let bytes = encode_host_update(timestamp, &[update]);

        let mut pool = ValuePool::new();
        let decoded = decode_host_message(&bytes, &registry(), &mut pool).unwrap();
        let HostMessage::Update(decoded) = decoded else {
            return Err(TestCaseError::fail("expected an update"));
        };
        prop_assert_eq!(decoded.timestamp, timestamp);
        prop_assert_eq!(decoded.objects.len(), 1);
        for (instance, (nid, sent)) in decoded.objects[0].instances.iter().zip(&values) {
            prop_assert_eq!(instance.nid, *nid);
            for ((field, got), want) in schema.iter().zip(&instance.values).zip(sent) {
                prop_assert_eq!(*got, field.dequantize(field.quantize(*want)));
            }
        }
    }

    #[test]
    fn truncated_updates_are_rejected(
        cut in 0usize..64,
        x in -1000.0f64..1000.0,
    ) {
        let schema = schema();
        let row = [x, 1.0, 2.0, 3.0];
        let update = ObjectUpdate {
            type_nid: 1,
            flags: ObjectFlags::empty(),
            schema: &schema,
            instances: vec![(1, &row[..]), (2, &row[..])],
        };
        let bytes = encode_host_update(5.0, &[update]);
        let cut = cut % bytes.len();

        let mut pool = ValuePool::new();
        prop_assert!(decode_host_message(&bytes[..cut], &registry(), &mut pool).is_err());
    }

    #[test]
    fn destroy_events_survive_the_wire(
        groups in prop::collection::vec(
            (1u16..100, prop::collection::vec(any::<u16>(), 0..30)),
            0..8,
        ),
    ) {
        let borrowed: Vec<(u16, &[u16])> = groups.iter().map(|(t, n)| (*t, n.as_slice())).collect();
        let bytes = encode_host_events(42.0, &borrowed);

        let mut pool = ValuePool::new();
        let decoded = decode_host_message(&bytes, &registry(), &mut pool).unwrap();
        prop_assert_eq!(decoded, HostMessage::Events(tether::net::HostEvents {
            timestamp: 42.0,
            destroyed: groups,
        }));
    }

    #[test]
    fn client_input_keeps_timestamp(
        timestamp in -1.0e9f64..1.0e9,
        hp in 0.0f64..255.0,
    ) {
        let schema = schema();
        let bytes = encode_client_input(timestamp, &schema, &[1.5, 2.5, 0.0, hp]);
        let mut pool = ValuePool::new();
        let input = decode_client_input(&bytes, &schema, &mut pool).unwrap();
        prop_assert_eq!(input.timestamp, timestamp);
        prop_assert_eq!(input.values.len(), 4);
        prop_assert_eq!(input.values[3], hp.trunc());
    }
}
