use tether::net::encode_client_input;
use tether::{
    Bandwidth, ChannelKind, CloseReason, ErrorKind, InstanceId, Interp, MemoryHandle,
    MemoryTransport, NetValue, ObjectSource, Payload, PeerInfo, Precision, Session,
    SessionConfig, SessionEvent,
};

const HOST: &str = "h";

#[derive(Default)]
struct Sprites {
    items: Vec<(InstanceId, f64, f64)>,
    bullets: usize,
}

impl ObjectSource for Sprites {
    fn count(&self, sid: &str) -> usize {
        match sid {
            "sprite" => self.items.len(),
            "bullet" => self.bullets,
            _ => 0,
        }
    }

    fn instance_id(&self, sid: &str, index: usize) -> InstanceId {
        match sid {
            "sprite" => self.items[index].0,
            _ => 1000 + index as InstanceId,
        }
    }

    fn value(&self, sid: &str, index: usize, field: usize, _schema: &NetValue) -> f64 {
        match (sid, field) {
            ("sprite", 0) => self.items[index].1,
            ("sprite", _) => self.items[index].2,
            _ => 1.0,
        }
    }
}

fn sprite_schema() -> Vec<NetValue> {
    vec![
        NetValue::new("x", Precision::Float32, Interp::Linear),
        NetValue::new("angle", Precision::Float32, Interp::Angular),
    ]
}

fn host_session() -> Session {
    let mut host = Session::with_seed(SessionConfig::default(), 1);
    host.register_object("sprite", sprite_schema(), Bandwidth::Normal)
        .unwrap();
    host.add_client_value(NetValue::new("fire", Precision::UInt8, Interp::None))
        .unwrap();
    host.join_room(0.0, PeerInfo::new(HOST, "host"), None);
    host
}

struct Remote {
    id: String,
    session: Session,
    /// Frames the host sent to this peer.
    host_side: MemoryHandle,
    /// Frames this peer sent to the host.
    peer_side: MemoryHandle,
}

impl Remote {
    fn events(&mut self) -> Vec<SessionEvent> {
        self.session.drain_events().collect()
    }
}

fn connect(host: &mut Session, id: &str, alias: &str, now: f64) -> Remote {
    let mut session = Session::with_seed(SessionConfig::default(), 2);
    session
        .register_object("sprite", sprite_schema(), Bandwidth::Normal)
        .unwrap();
    link(host, session, id, alias, now)
}

/// Joins an already configured peer session to `host` over memory links.
fn link(host: &mut Session, mut session: Session, id: &str, alias: &str, now: f64) -> Remote {
    session.join_room(now, PeerInfo::new(id, alias), Some(PeerInfo::new(HOST, "host")));
    host.peer_joined(now, PeerInfo::new(id, alias)).unwrap();

    let (to_peer, host_side) = MemoryTransport::new();
    let (to_host, peer_side) = MemoryTransport::new();
    host.attach_transport(id, Box::new(to_peer)).unwrap();
    session.attach_transport(HOST, Box::new(to_host)).unwrap();

    for channel in ChannelKind::ALL {
        host.channel_open(now, id, channel);
    }
    for channel in ChannelKind::ALL {
        session.channel_open(now, HOST, channel);
    }

    let mut remote = Remote {
        id: id.to_string(),
        session,
        host_side,
        peer_side,
    };
    pump(host, std::slice::from_mut(&mut remote), now);
    remote
}

/// Delivers queued frames both ways until every link is quiet.
fn pump(host: &mut Session, remotes: &mut [Remote], now: f64) {
    loop {
        let mut moved = false;
        for remote in remotes.iter_mut() {
            for (channel, payload) in remote.host_side.drain() {
                moved = true;
                remote.session.receive(now, HOST, channel, payload);
            }
            for (channel, payload) in remote.peer_side.drain() {
                moved = true;
                host.receive(now, &remote.id, channel, payload);
            }
        }
        if !moved {
            break;
        }
    }
}

fn host_events(host: &mut Session) -> Vec<SessionEvent> {
    host.drain_events().collect()
}

#[test]
fn test_handshake_assigns_nids_and_syncs_clock() {
    let mut host = host_session();
    let mut p1 = connect(&mut host, "p1", "pat", 0.0);

    let events = host_events(&mut host);
    assert!(events.contains(&SessionEvent::PeerOpen {
        id: "p1".into(),
        nid: 2,
        alias: "pat".into()
    }));

    assert!(p1.session.is_in_room());
    assert!(!p1.session.is_host());
    assert_eq!(p1.session.peer(HOST).map(|p| p.nid), Some(1));
    assert_eq!(p1.session.peer("p1").map(|p| p.nid), Some(2));
    assert_eq!(p1.session.client_values().len(), 1);
    assert!(p1.session.is_ready_for_input());
    assert_eq!(p1.session.clock().sim_delay(), 80.0);

    let events = p1.events();
    assert!(
        events
            .iter()
            .any(|e| matches!(e, SessionEvent::PeerOpen { id, .. } if id == HOST))
    );
    assert_eq!(host.peer_count(), 2);
    assert_eq!(p1.session.peer_count(), 2);
}

#[test]
fn test_objects_replicate_and_interpolate() {
    let mut host = host_session();
    let mut remotes = vec![connect(&mut host, "p1", "pat", 0.0)];
    let idle = Sprites::default();
    let mut world = Sprites {
        items: vec![(7, 0.0, 0.5)],
        bullets: 0,
    };

    let mut now = 0.0;
    while now <= 500.0 {
        world.items[0].1 = now / 10.0;
        host.tick(now, 0.05, &world);
        pump(&mut host, &mut remotes, now);
        remotes[0].session.tick(now, 0.05, &idle);
        pump(&mut host, &mut remotes, now);
        now += 50.0;
    }

    let p1 = &mut remotes[0];
    assert_eq!(p1.session.instance_nids("sprite"), vec![1]);
    assert_eq!(p1.session.instance_nid_at("sprite", 0), Some(1));

    // Simulation time trails by the client delay: 500 - 80.
    let x = p1.session.instance_value(500.0, "sprite", 1, 0).unwrap();
    assert!((x - 42.0).abs() < 1e-3, "x = {x}");
    let angle = p1.session.instance_value(500.0, "sprite", 1, 1).unwrap();
    assert!((angle - 0.5).abs() < 1e-6);

    world.items.clear();
    host.tick(now, 0.05, &world);
    pump(&mut host, &mut remotes, now);

    let events = remotes[0].events();
    assert!(events.contains(&SessionEvent::InstanceDestroyed {
        object: "sprite".into(),
        nid: 1,
        timestamp: now,
    }));
    assert_eq!(remotes[0].session.instance_count("sprite"), 0);
}

/// Two slow types whose single field tracks the host clock.
struct Beacons {
    now: f64,
}

impl ObjectSource for Beacons {
    fn count(&self, _sid: &str) -> usize {
        1
    }

    fn instance_id(&self, _sid: &str, _index: usize) -> InstanceId {
        1
    }

    fn value(&self, _sid: &str, _index: usize, _field: usize, _schema: &NetValue) -> f64 {
        self.now / 10.0
    }
}

#[test]
fn test_low_bandwidth_types_throttle_and_extrapolate_further() {
    let linear = || vec![NetValue::new("x", Precision::Float32, Interp::Linear)];
    let mut host = Session::with_seed(SessionConfig::default(), 1);
    host.register_object("beacon", linear(), Bandwidth::Low).unwrap();
    host.register_object("marker", linear(), Bandwidth::VeryLow)
        .unwrap();
    host.join_room(0.0, PeerInfo::new(HOST, "host"), None);

    let mut session = Session::with_seed(SessionConfig::default(), 2);
    session
        .register_object("beacon", linear(), Bandwidth::Low)
        .unwrap();
    session
        .register_object("marker", linear(), Bandwidth::VeryLow)
        .unwrap();
    let mut remotes = vec![link(&mut host, session, "p1", "pat", 0.0)];
    let idle = Sprites::default();

    let latest = |remote: &Remote, sid: &str| {
        remote
            .session
            .object(sid)
            .and_then(|o| o.instance(1))
            .and_then(|i| i.buffer().latest())
            .map(|u| u.timestamp)
    };
    let mut beacon_stamps = Vec::new();
    let mut marker_stamps = Vec::new();

    // The value changes every tick, yet Low goes out about every 100ms and
    // VeryLow about every 500ms.
    let mut now = 0.0;
    while now <= 500.0 {
        host.tick(now, 0.05, &Beacons { now });
        pump(&mut host, &mut remotes, now);
        remotes[0].session.tick(now, 0.05, &idle);
        pump(&mut host, &mut remotes, now);
        for (sid, stamps) in [("beacon", &mut beacon_stamps), ("marker", &mut marker_stamps)] {
            if let Some(ts) = latest(&remotes[0], sid)
                && stamps.last() != Some(&ts)
            {
                stamps.push(ts);
            }
        }
        now += 50.0;
    }
    assert_eq!(beacon_stamps, vec![0.0, 100.0, 200.0, 300.0, 400.0, 500.0]);
    assert_eq!(marker_stamps, vec![0.0, 500.0]);

    // Simulation time is now - 80. Low projects at most 500ms past its last
    // sample (t=500, x=50), VeryLow up to 2500ms.
    let p1 = &mut remotes[0];
    p1.session.tick(880.0, 0.0, &idle);
    let beacon = p1.session.instance_value(880.0, "beacon", 1, 0).unwrap();
    let marker = p1.session.instance_value(880.0, "marker", 1, 0).unwrap();
    assert!((beacon - 80.0).abs() < 1e-3, "beacon = {beacon}");
    assert!((marker - 80.0).abs() < 1e-3, "marker = {marker}");

    p1.session.tick(1380.0, 0.0, &idle);
    let beacon = p1.session.instance_value(1380.0, "beacon", 1, 0).unwrap();
    let marker = p1.session.instance_value(1380.0, "marker", 1, 0).unwrap();
    assert!((beacon - 100.0).abs() < 1e-3, "beacon = {beacon}");
    assert!((marker - 130.0).abs() < 1e-3, "marker = {marker}");
}

#[test]
fn test_unknown_object_type_reported_once() {
    let mut host = Session::with_seed(SessionConfig::default(), 1);
    host.register_object("sprite", sprite_schema(), Bandwidth::Normal)
        .unwrap();
    host.register_object("bullet", vec![NetValue::new("x", Precision::Int16, Interp::None)], Bandwidth::Normal)
        .unwrap();
    host.join_room(0.0, PeerInfo::new(HOST, "host"), None);
    let mut remotes = vec![connect(&mut host, "p1", "pat", 0.0)];
    remotes[0].events();

    // The peer never registered bullets, so their section of each update
    // carries a type NID it cannot map.
    let world = Sprites {
        items: vec![(1, 3.0, 0.0)],
        bullets: 2,
    };
    for step in 0..4 {
        let now = step as f64 * 50.0;
        host.tick(now, 0.05, &world);
        pump(&mut host, &mut remotes, now);
    }

    let schema_errors = remotes[0]
        .events()
        .into_iter()
        .filter(|e| matches!(e, SessionEvent::PeerError { kind: ErrorKind::Schema, .. }))
        .count();
    assert_eq!(schema_errors, 1);
    assert_eq!(remotes[0].session.instance_count("sprite"), 1);
    assert!(remotes[0].session.is_in_room());
}

#[test]
fn test_client_input_reaches_host() {
    let mut host = host_session();
    let mut remotes = vec![connect(&mut host, "p1", "pat", 0.0)];
    host_events(&mut host);
    let idle = Sprites::default();

    assert!(!host.set_client_state(0.0, "fire", 1.0));
    assert!(remotes[0].session.set_client_state(0.0, "fire", 1.0));
    assert!(!remotes[0].session.set_client_state(0.0, "jump", 1.0));
    assert_eq!(remotes[0].session.local_client_state("fire"), Some(1.0));

    remotes[0].session.tick(0.0, 0.0, &idle);
    pump(&mut host, &mut remotes, 0.0);
    assert_eq!(host.client_state("p1", "fire"), 1.0);
    assert_eq!(host.client_state("p1", "jump"), 0.0);
    assert_eq!(host.client_state("nobody", "fire"), 0.0);

    remotes[0].session.tick(600.0, 0.6, &idle);
    pump(&mut host, &mut remotes, 600.0);

    let confirms = host_events(&mut host)
        .into_iter()
        .filter(|e| matches!(e, SessionEvent::ConfirmPeer { id } if id == "p1"))
        .count();
    assert_eq!(confirms, 1);
}

#[test]
fn test_input_outside_window_is_dropped() {
    let mut host = host_session();
    let _p1 = connect(&mut host, "p1", "pat", 0.0);

    let schema = host.client_values().to_vec();
    let late = encode_client_input(10.0 + 5000.0, &schema, &[1.0]);
    host.receive(10.0, "p1", ChannelKind::Unreliable, Payload::Binary(late));
    assert_eq!(host.client_state("p1", "fire"), 0.0);
    assert!(host.peer("p1").is_some());

    let fresh = encode_client_input(10.0, &schema, &[1.0]);
    host.receive(10.0, "p1", ChannelKind::Unreliable, Payload::Binary(fresh));
    assert_eq!(host.client_state("p1", "fire"), 1.0);
}

#[test]
fn test_silent_peer_times_out() {
    let mut host = host_session();
    let p1 = connect(&mut host, "p1", "pat", 0.0);
    host_events(&mut host);
    let idle = Sprites::default();

    let mut now = 0.0;
    while now < 20_000.0 {
        now += 2000.0;
        host.tick(now, 2.0, &idle);
    }
    assert!(host.peer("p1").is_some());

    host.tick(now + 2000.0, 2.0, &idle);
    assert!(host.peer("p1").is_none());
    assert!(p1.host_side.is_closed());

    let events = host_events(&mut host);
    assert!(
        events
            .iter()
            .any(|e| matches!(e, SessionEvent::PeerError { kind: ErrorKind::Timeout, .. }))
    );
    assert!(events.contains(&SessionEvent::PeerClose {
        id: "p1".into(),
        alias: "pat".into(),
        reason: CloseReason::Timeout,
    }));
    assert!(
        p1.host_side
            .texts()
            .iter()
            .any(|t| t.contains("disconnect") && t.contains("timeout"))
    );
}

#[test]
fn test_unopened_connection_times_out() {
    let mut host = host_session();
    host.peer_joined(0.0, PeerInfo::new("p1", "pat")).unwrap();
    let idle = Sprites::default();

    host.tick(24_000.0, 1.0, &idle);
    assert!(host.peer("p1").is_some());
    host.tick(26_000.0, 2.0, &idle);
    assert!(host.peer("p1").is_none());

    // Never opened, so no close event.
    let events = host_events(&mut host);
    assert!(!events.iter().any(|e| matches!(e, SessionEvent::PeerClose { .. })));
    assert!(
        events
            .iter()
            .any(|e| matches!(e, SessionEvent::PeerError { kind: ErrorKind::Timeout, .. }))
    );
}

#[test]
fn test_bad_data_kicks_peer_on_host() {
    let mut host = host_session();
    let mut p1 = connect(&mut host, "p1", "pat", 0.0);
    host_events(&mut host);

    host.receive(0.0, "p1", ChannelKind::Unreliable, Payload::Binary(vec![1, 2, 3]));
    assert!(host.peer("p1").is_none());
    let events = host_events(&mut host);
    assert!(
        events
            .iter()
            .any(|e| matches!(e, SessionEvent::PeerError { id, .. } if id == "p1"))
    );
    assert!(events.contains(&SessionEvent::PeerClose {
        id: "p1".into(),
        alias: "pat".into(),
        reason: CloseReason::DataError,
    }));

    // A peer only logs bad data from the host and stays put.
    p1.session
        .receive(0.0, HOST, ChannelKind::Ordered, Payload::Text(r#"{"c":"nope"}"#.into()));
    assert!(p1.session.is_in_room());
    assert!(p1.session.peer(HOST).is_some());
    assert!(
        p1.events()
            .iter()
            .any(|e| matches!(e, SessionEvent::PeerError { kind: ErrorKind::Protocol, .. }))
    );
}

#[test]
fn test_user_messages_pass_through() {
    let mut host = host_session();
    let mut remotes = vec![connect(&mut host, "p1", "pat", 0.0)];
    host_events(&mut host);

    let message = serde_json::json!({ "c": "m", "text": "hello" });
    host.send_message(0.0, "p1", &message);
    pump(&mut host, &mut remotes, 0.0);

    assert!(remotes[0].events().contains(&SessionEvent::PeerMessage {
        id: HOST.into(),
        message,
    }));
}

#[test]
fn test_traffic_counts_only_frames_that_reach_a_transport() {
    let mut host = host_session();
    host.peer_joined(0.0, PeerInfo::new("p1", "pat")).unwrap();

    // No transport yet.
    host.send_message(0.0, "p1", &serde_json::json!({ "c": "m" }));
    assert_eq!(host.stats().messages_sent, 0);

    // Transport attached but the ordered channel is still closed.
    let (link, handle) = MemoryTransport::new();
    host.attach_transport("p1", Box::new(link)).unwrap();
    host.channel_open(0.0, "p1", ChannelKind::Reliable);
    host.send_message(0.0, "p1", &serde_json::json!({ "c": "m" }));
    assert_eq!(host.stats().messages_sent, 0);
    assert_eq!(handle.pending(), 0);

    host.channel_open(0.0, "p1", ChannelKind::Ordered);
    host.channel_open(0.0, "p1", ChannelKind::Unreliable);
    let sent = handle.drain();
    assert!(!sent.is_empty());
    let bytes: usize = sent.iter().map(|(_, payload)| payload.len()).sum();
    assert_eq!(host.stats().messages_sent, sent.len() as u64);
    assert_eq!(host.stats().bytes_sent, bytes as u64);
}

#[test]
fn test_peers_learn_about_each_other() {
    let mut host = host_session();
    let mut remotes = vec![
        connect(&mut host, "p1", "pat", 0.0),
        connect(&mut host, "p2", "sam", 0.0),
    ];
    pump(&mut host, &mut remotes, 0.0);

    assert!(remotes[0].session.peer("p2").is_some());
    assert_eq!(remotes[0].session.alias_from_id("p2"), "sam");
    assert_eq!(remotes[1].session.peer_by_nid(2).map(|p| p.alias.as_str()), Some("pat"));
    remotes[0].events();

    host.channel_closed(10.0, "p2", ChannelKind::Ordered);
    pump(&mut host, &mut remotes, 10.0);

    assert!(remotes[0].events().contains(&SessionEvent::PeerClose {
        id: "p2".into(),
        alias: "sam".into(),
        reason: CloseReason::Disconnect,
    }));
    assert!(remotes[0].session.peer("p2").is_none());
    assert_eq!(host.peer_count(), 2);
}

#[test]
fn test_host_leaving_closes_the_room() {
    let mut host = host_session();
    let mut remotes = vec![
        connect(&mut host, "p1", "pat", 0.0),
        connect(&mut host, "p2", "sam", 0.0),
    ];
    pump(&mut host, &mut remotes, 0.0);
    remotes[0].events();

    host.leave_room(100.0);
    assert!(!host.is_in_room());
    assert_eq!(host.peer_count(), 0);
    pump(&mut host, &mut remotes, 100.0);

    let p1 = &mut remotes[0];
    assert!(!p1.session.is_in_room());
    let events = p1.events();
    assert!(events.contains(&SessionEvent::PeerClose {
        id: HOST.into(),
        alias: "host".into(),
        reason: CloseReason::Disconnect,
    }));
    assert!(events.contains(&SessionEvent::PeerClose {
        id: "p2".into(),
        alias: "sam".into(),
        reason: CloseReason::HostQuit,
    }));
    assert!(events.contains(&SessionEvent::RoomLeft {
        reason: CloseReason::HostQuit,
    }));
}

#[test]
fn test_reliable_send_failure_only_drops_that_peer() {
    let mut host = host_session();
    let mut remotes = vec![
        connect(&mut host, "p1", "pat", 0.0),
        connect(&mut host, "p2", "sam", 0.0),
    ];
    pump(&mut host, &mut remotes, 0.0);
    host_events(&mut host);

    let mut world = Sprites {
        items: vec![(1, 0.0, 0.0)],
        bullets: 0,
    };
    host.tick(0.0, 0.0, &world);
    pump(&mut host, &mut remotes, 0.0);

    remotes[0].host_side.fail(ChannelKind::Reliable);
    world.items.clear();
    host.tick(50.0, 0.05, &world);

    assert!(host.peer("p1").is_none());
    assert!(host.peer("p2").is_some());
    let frames = remotes[1].host_side.drain();
    assert!(frames.iter().any(|(ch, p)| *ch == ChannelKind::Reliable && matches!(p, Payload::Binary(_))));

    let events = host_events(&mut host);
    assert!(events.iter().any(|e| matches!(
        e,
        SessionEvent::PeerError { id, kind: ErrorKind::Transport, .. } if id == "p1"
    )));
    assert!(events.contains(&SessionEvent::PeerClose {
        id: "p1".into(),
        alias: "pat".into(),
        reason: CloseReason::NetworkError,
    }));
}

#[test]
fn test_unreliable_failures_are_tolerated_up_to_limit() {
    let mut host = host_session();
    let p1 = connect(&mut host, "p1", "pat", 0.0);
    p1.host_side.fail(ChannelKind::Unreliable);

    let mut world = Sprites {
        items: vec![(1, 0.0, 0.0)],
        bullets: 0,
    };
    for step in 1..10 {
        world.items[0].1 = step as f64;
        host.tick(step as f64 * 50.0, 0.05, &world);
    }
    assert!(host.peer("p1").is_some());

    world.items[0].1 = 10.0;
    host.tick(500.0, 0.05, &world);
    assert!(host.peer("p1").is_none());
}

#[test]
fn test_latency_simulation_holds_frames() {
    let mut host = host_session();
    let mut remotes = vec![connect(&mut host, "p1", "pat", 0.0)];
    host.set_latency_simulation(100.0, 0.0, 0.0);

    host.send_message(0.0, "p1", &serde_json::json!({ "n": 1 }));
    assert_eq!(remotes[0].host_side.pending(), 0);
    assert_eq!(host.delayed_frames(), 1);

    host.flush_delayed(99.0);
    assert_eq!(remotes[0].host_side.pending(), 0);
    host.flush_delayed(100.0);
    assert_eq!(host.delayed_frames(), 0);
    pump(&mut host, &mut remotes, 100.0);
    assert!(
        remotes[0]
            .events()
            .iter()
            .any(|e| matches!(e, SessionEvent::PeerMessage { .. }))
    );
}

#[test]
fn test_rejoin_replaces_peer() {
    let mut host = host_session();
    let _p1 = connect(&mut host, "p1", "pat", 0.0);
    host_events(&mut host);

    let nid = host.peer_joined(50.0, PeerInfo::new("p1", "pat")).unwrap();
    // The counter moves on rather than reusing the freed NID.
    assert_eq!(nid, 3);
    assert!(host_events(&mut host).contains(&SessionEvent::PeerClose {
        id: "p1".into(),
        alias: "pat".into(),
        reason: CloseReason::Rejoin,
    }));
    assert!(!host.peer("p1").is_some_and(|p| p.is_open()));
}

#[test]
fn test_config_locked_while_in_room() {
    let mut host = host_session();
    assert!(host.set_bandwidth_settings(60.0, 50.0).is_err());
    assert!(
        host.register_object("late", sprite_schema(), Bandwidth::Low)
            .is_err()
    );

    host.leave_room(0.0);
    assert!(host.set_bandwidth_settings(60.0, 50.0).is_ok());
    assert_eq!(host.config().host_update_rate, 60.0);
}

#[test]
fn test_hosting_after_being_a_peer_restores_local_types() {
    let mut host = host_session();
    let mut session = Session::with_seed(SessionConfig::default(), 2);
    session
        .register_object("sprite", sprite_schema(), Bandwidth::Normal)
        .unwrap();
    session
        .register_object("bullet", vec![NetValue::new("x", Precision::Int16, Interp::None)], Bandwidth::Normal)
        .unwrap();
    let mut remotes = vec![link(&mut host, session, "p1", "pat", 0.0)];

    let world = Sprites {
        items: vec![(7, 1.0, 0.0)],
        bullets: 0,
    };
    host.tick(0.0, 0.05, &world);
    pump(&mut host, &mut remotes, 0.0);

    let p1 = &mut remotes[0].session;
    assert_eq!(p1.object("bullet").and_then(|o| o.nid()), None);
    assert_eq!(p1.instance_count("sprite"), 1);
    assert_eq!(p1.client_values().len(), 1);

    p1.leave_room(100.0);
    p1.join_room(100.0, PeerInfo::new("p1", "pat"), None);

    assert!(p1.is_host());
    assert_eq!(p1.object("sprite").and_then(|o| o.nid()), Some(1));
    assert_eq!(p1.object("bullet").and_then(|o| o.nid()), Some(2));
    assert_eq!(p1.object("bullet").map(|o| o.schema().len()), Some(1));
    assert_eq!(p1.instance_count("sprite"), 0);
    assert!(p1.client_values().is_empty());
    assert_eq!(p1.config().client_delay, SessionConfig::default().client_delay);

    let own = Sprites {
        items: Vec::new(),
        bullets: 2,
    };
    p1.tick(150.0, 0.05, &own);
    assert_eq!(p1.instance_count("bullet"), 2);
}
