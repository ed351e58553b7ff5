use std::time::Duration;

use groundlink_core::mocks::{ColonDecoder, RecordingPushReply, ScriptedRelay};
use groundlink_core::session::STATUS_CONFIRMED;
use groundlink_core::{
    Control, Ingested, LinkCfg, LinkEngine, OperatorCommand, TickOutcome, UplinkPath,
};
use groundlink_traits::clock::test_clock::TestClock;
use groundlink_core::packet::{FrameBody, StationReport};
use groundlink_core::{RawFrame, SourceKind};
use groundlink_traits::{
    Clock, MacFields, RelayPacket, StationObservation, Triangulation, UplinkStart,
};

const KEY: &str = "2B7E151628AED2A6ABF7158809CF4F3C";

fn relay_packet(clock: &TestClock, data: &str) -> RelayPacket {
    RelayPacket {
        time: clock.utc_now(),
        snr: 3.5,
        rssi: -117.0,
        frequency_error: 812.0,
        data: data.into(),
        station: Some((49.19, 16.61)),
    }
}

fn engine(relay: &ScriptedRelay, clock: &TestClock) -> LinkEngine {
    LinkEngine::builder()
        .with_device("E6BD0B26", KEY)
        .with_relay(relay.clone())
        .with_decoder(ColonDecoder)
        .with_clock(clock.clone())
        .build()
        .unwrap()
}

#[test]
fn write_verify_round_trip_over_relay() {
    let clock = TestClock::new();
    let relay = ScriptedRelay::new();
    let mut eng = engine(&relay, &clock);
    assert!(eng.open_observation());
    assert_eq!(relay.observations().lock().unwrap().len(), 1);

    assert_eq!(eng.copy_bytes(&[0x03], 48, "DELAY").unwrap(), 1);
    assert_eq!(
        eng.tick(),
        TickOutcome::Dispatched {
            path: UplinkPath::Relay,
            fire_and_forget: false
        }
    );
    assert_eq!(eng.tick(), TickOutcome::Waiting);
    let (frame, start) = relay.uplinks().lock().unwrap()[0].clone();
    assert_eq!(frame, "60E6BD0B260A00009100300390003001000F00");
    assert_eq!(start, UplinkStart::Delay(Duration::from_secs(66)));

    clock.advance(Duration::from_secs(90));
    relay.push_packet(relay_packet(&clock, "260BBDE6:5:2:03"));
    assert_eq!(eng.poll_relay(), 1);

    let s = eng.state();
    assert!(s.queue().is_empty());
    assert_eq!(s.uplinks_sent(), 1);
    assert_eq!(s.downlinks_received(), 1);
    assert_eq!(s.rtt(), Duration::from_secs(90));
    assert_eq!(s.status(), STATUS_CONFIRMED);
    let seen = s.last_seen().unwrap();
    assert_eq!(seen.frequency_error, 812.0);
}

#[test]
fn poll_ingests_only_newer_packets() {
    let clock = TestClock::new();
    let relay = ScriptedRelay::new();
    let mut eng = engine(&relay, &clock);
    eng.open_observation();

    relay.push_packet(relay_packet(&clock, "260BBDE6:1:1:0103F5FC01"));
    assert_eq!(eng.poll_relay(), 1);
    assert_eq!(eng.poll_relay(), 0);

    clock.advance(Duration::from_secs(30));
    relay.push_packet(relay_packet(&clock, "11223344:9:1:00"));
    assert_eq!(eng.poll_relay(), 1);
    // foreign frame lands in the raw history only
    assert_eq!(eng.state().raw_frames().len(), 2);
    assert_eq!(eng.state().packets().len(), 1);
    assert_eq!(eng.state().telemetry().len(), 1);
}

#[test]
fn relay_outage_is_no_data() {
    let clock = TestClock::new();
    let relay = ScriptedRelay::new();
    let mut eng = engine(&relay, &clock);
    eng.open_observation();
    relay.fail_fetch(true);
    relay.push_packet(relay_packet(&clock, "260BBDE6:1:1:0103F5FC01"));
    assert_eq!(eng.poll_relay(), 0);
    assert_eq!(eng.state().downlinks_received(), 0);
}

#[test]
fn operator_commands_queue_uplinks() {
    let clock = TestClock::new();
    let relay = ScriptedRelay::new();
    let mut eng = engine(&relay, &clock);

    eng.apply(OperatorCommand::Write {
        address: 48,
        value: 3,
    })
    .unwrap();
    eng.apply("r 128 10 raw 2 1".parse().unwrap()).unwrap();
    assert_eq!(eng.state().queue().len(), 2);
    assert_eq!(eng.state().queue()[0].label, "Custom write 48 = 3");
    assert_eq!(eng.state().queue()[1].payload, "9000808A0306");

    // fire-and-forget commands leave the FIFO on dispatch
    eng.tick();
    eng.tick();
    assert!(eng.state().queue().is_empty());
    assert_eq!(eng.state().uplinks_sent(), 2);

    assert_eq!(eng.apply(OperatorCommand::TogglePath).unwrap(), Control::Continue);
    assert_eq!(eng.preferred_path(), UplinkPath::PushReply);
    // no push reply configured, so the relay stays active
    assert_eq!(eng.active_path(), Some(UplinkPath::Relay));
    assert_eq!(eng.apply(OperatorCommand::Quit).unwrap(), Control::Quit);
}

#[test]
fn setup_preset_uses_active_path_limits() {
    let clock = TestClock::new();
    let mut relay_only = engine(&ScriptedRelay::new(), &clock);
    let mut push_only = LinkEngine::builder()
        .with_device("E6BD0B26", KEY)
        .with_push_reply(RecordingPushReply::new())
        .with_decoder(ColonDecoder)
        .with_clock(clock.clone())
        .build()
        .unwrap();
    let narrow = relay_only.setup_memory().unwrap();
    let wide = push_only.setup_memory().unwrap();
    assert!(wide < narrow);
    assert!(
        relay_only
            .state()
            .queue()
            .iter()
            .all(|c| c.payload.len() <= 30)
    );
}

#[test]
fn oversize_operator_copy_is_refused() {
    let clock = TestClock::new();
    let relay = ScriptedRelay::new();
    let mut eng = engine(&relay, &clock);
    let err = eng
        .enqueue(groundlink_core::PlannedCommand::new(
            "00".repeat(16),
            None,
            "raw".into(),
        ))
        .unwrap_err();
    assert_eq!(
        err,
        groundlink_core::EncodeError::CommandTooLong { bytes: 16, max: 15 }
    );
    assert!(eng.state().queue().is_empty());
}

#[test]
fn duplicate_push_reception_merges_into_relay_packet() {
    let clock = TestClock::new();
    let relay = ScriptedRelay::new();
    let mut eng = engine(&relay, &clock);
    eng.open_observation();
    relay.push_packet(relay_packet(&clock, "260BBDE6:7:1:0103F5FC01"));
    eng.poll_relay();

    let msg = r#"{"end_device_ids": {"device_id": "sat", "dev_addr": "260BBDE6"},
        "uplink_message": {"f_port": 1, "f_cnt": 7, "frm_payload": "AQP1/AE=",
        "rx_metadata": [{"snr": 1, "rssi": -120}, {"snr": -2, "rssi": -121}]}}"#;
    let frame = groundlink_core::parse_push_message(msg, "sat", clock.utc_now())
        .unwrap()
        .unwrap();
    let out = eng.ingest_frame(frame);
    assert!(matches!(out, Some(Ingested::Duplicate { station_count: 3, .. })));
    assert_eq!(eng.state().downlinks_received(), 1);
}

fn push_frame_heard_by(clock: &TestClock, stations: &[((f64, f64), f32)]) -> RawFrame {
    RawFrame {
        source: SourceKind::Push,
        received_at: clock.utc_now(),
        snr: 0.0,
        rssi: 0.0,
        frequency_error: 0.0,
        body: FrameBody::Decoded(MacFields {
            device_address: String::new(),
            frame_counter: 11,
            port: 3,
            payload: "AB".into(),
        }),
        station_position: None,
        station_count: 1,
        stations: stations
            .iter()
            .map(|&(position, rssi)| StationReport {
                snr: 1.0,
                rssi,
                position: Some(position),
                time: clock.utc_now(),
            })
            .collect(),
        envelope: None,
    }
}

const THREE_STATIONS: [((f64, f64), f32); 3] = [
    ((10.0, 20.0), -50.0),
    ((30.0, 40.0), -100.0),
    ((20.0, 30.0), -100.0),
];

#[test]
fn three_station_fix_defaults_to_weighted_centroid() {
    let clock = TestClock::new();
    let relay = ScriptedRelay::new();
    let mut eng = engine(&relay, &clock);

    let out = eng.ingest_frame(push_frame_heard_by(&clock, &THREE_STATIONS));
    assert!(matches!(out, Some(Ingested::Fresh { port: 3, .. })));
    let fix = eng.state().packets().last().unwrap().position.unwrap();
    assert_eq!(fix.confidence, 3);
    assert!((fix.lat - 17.5).abs() < 1e-9, "lat {}", fix.lat);
    assert!((fix.lon - 27.5).abs() < 1e-9, "lon {}", fix.lon);
}

struct FixedFix;

impl Triangulation for FixedFix {
    fn locate(&self, stations: &[StationObservation]) -> Option<(f64, f64)> {
        assert_eq!(stations.len(), 3);
        Some((1.0, 2.0))
    }
}

#[test]
fn configured_triangulation_replaces_default() {
    let clock = TestClock::new();
    let mut eng = LinkEngine::builder()
        .with_device("E6BD0B26", KEY)
        .with_relay(ScriptedRelay::new())
        .with_decoder(ColonDecoder)
        .with_triangulation(FixedFix)
        .with_clock(clock.clone())
        .build()
        .unwrap();

    eng.ingest_frame(push_frame_heard_by(&clock, &THREE_STATIONS));
    let fix = eng.state().packets().last().unwrap().position.unwrap();
    assert_eq!((fix.lat, fix.lon, fix.confidence), (1.0, 2.0, 3));
}
