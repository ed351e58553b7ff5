use groundlink_relay::http::parse_packets;
use rstest::rstest;

#[test]
fn unix_and_text_times_are_accepted() {
    let text = r#"[
        {"time": 1723716000.5, "snr": 4.25, "rssi": -118, "ferror": 812.0, "data": "40E6"},
        {"time": "2024-08-15T10:00:02Z", "snr": 1.0, "rssi": -120, "data": "40E7", "lat": 49.2, "lon": 16.6}
    ]"#;
    let packets = parse_packets(text);
    assert_eq!(packets.len(), 2);
    assert_eq!(packets[0].time.timestamp_millis(), 1_723_716_000_500);
    assert_eq!(packets[0].frequency_error, 812.0);
    assert_eq!(packets[0].station, None);
    assert_eq!(packets[1].frequency_error, 0.0);
    assert_eq!(packets[1].station, Some((49.2, 16.6)));
}

#[rstest]
#[case("")]
#[case("<html>404</html>")]
#[case(r#"{"status": false}"#)]
#[case(r#"[{"snr": 1}]"#)]
fn malformed_artefacts_yield_nothing(#[case] text: &str) {
    assert!(parse_packets(text).is_empty());
}
