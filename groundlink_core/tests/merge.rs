use chrono::Utc;
use groundlink_core::merge::{MergeCfg, ingest};
use groundlink_core::packet::GeoFix;
use groundlink_core::{ApplicationPacket, Ingested, SessionState, SourceKind};

const CFG: MergeCfg = MergeCfg {
    telemetry_port: 1,
    baseline_pressure_hpa: 1013.25,
};

fn packet(fcnt: u32) -> ApplicationPacket {
    ApplicationPacket {
        device_present: true,
        frame_counter: fcnt,
        port: 1,
        payload: "0103F5FC01".into(),
        snr: 2.0,
        rssi: -112.0,
        frequency_error: 0.0,
        time: Utc::now(),
        position: None,
        station_count: 1,
        envelope: None,
        source: SourceKind::Relay,
    }
}

#[test]
fn same_frame_twice_yields_one_entry() {
    let mut s = SessionState::new(5);
    ingest(&mut s, packet(10), &CFG);
    let out = ingest(&mut s, packet(10), &CFG);
    assert!(matches!(out, Ingested::Duplicate { station_count: 2, .. }));
    assert_eq!(s.packets().len(), 1);
    assert_eq!(s.packets().last().unwrap().station_count, 2);
    assert_eq!(s.downlinks_received(), 1);
    assert_eq!(s.telemetry().len(), 1);
    assert_eq!(s.telemetry().last().unwrap().station_count, 2);
}

#[test]
fn relay_then_push_reception_enriches_record() {
    let mut s = SessionState::new(5);
    let mut relay = packet(3);
    relay.frequency_error = 420.0;
    ingest(&mut s, relay, &CFG);

    let mut push = packet(3);
    push.source = SourceKind::Push;
    push.station_count = 4;
    push.envelope = Some("{...}".into());
    push.position = Some(GeoFix {
        lat: 48.1,
        lon: 17.1,
        confidence: 4,
    });
    ingest(&mut s, push, &CFG);

    let stored = s.packets().last().unwrap();
    assert_eq!(stored.station_count, 5);
    assert_eq!(stored.frequency_error, 420.0);
    assert_eq!(stored.source, SourceKind::Relay);
    assert_eq!(stored.envelope.as_deref(), Some("{...}"));
    assert_eq!(stored.position.unwrap().confidence, 4);
    assert_eq!(s.telemetry().last().unwrap().position.unwrap().lat, 48.1);
}

#[test]
fn only_last_packet_is_compared() {
    let mut s = SessionState::new(5);
    ingest(&mut s, packet(1), &CFG);
    ingest(&mut s, packet(2), &CFG);
    // a late duplicate of frame 1 is treated as new
    assert!(matches!(ingest(&mut s, packet(1), &CFG), Ingested::Fresh { .. }));
    assert_eq!(s.packets().len(), 3);
    assert_eq!(s.downlinks_received(), 3);
}

#[test]
fn histories_are_capped() {
    let mut s = SessionState::new(5);
    for fcnt in 0..8 {
        ingest(&mut s, packet(fcnt), &CFG);
    }
    assert_eq!(s.packets().len(), 5);
    assert_eq!(s.telemetry().len(), 5);
    assert_eq!(s.packets().iter().next().unwrap().frame_counter, 3);
    assert_eq!(s.downlinks_received(), 8);
}
