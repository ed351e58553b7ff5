use std::io::Write;
use std::time::Duration;

use groundlink_relay::{JsonLinesPushReply, JsonLinesPushSource};
use groundlink_traits::{PushReply, PushSource};

#[test]
fn inbox_file_is_replayed() {
    let mut f = tempfile::NamedTempFile::new().unwrap();
    writeln!(f, r#"{{"end_device_ids":{{"device_id":"sat"}}}}"#).unwrap();
    f.flush().unwrap();
    let mut src = JsonLinesPushSource::open(f.path()).unwrap();
    let msg = src.next_message(Duration::from_secs(1)).unwrap().unwrap();
    assert!(msg.contains("\"sat\""));
    assert!(src.next_message(Duration::from_millis(10)).unwrap().is_none());
}

#[test]
fn outbox_file_collects_replacements() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("outbox.jsonl");
    let mut reply = JsonLinesPushReply::open(&path).unwrap();
    reply.replace_downlinks(&[0x91, 0x00, 0x30, 0x03], 1).unwrap();
    reply.replace_downlinks(&[0x90], 1).unwrap();
    let text = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<_> = text.lines().collect();
    assert_eq!(lines.len(), 2);
    let v: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(v["downlinks"][0]["frm_payload"], "kQAwAw==");
    assert_eq!(v["downlinks"][0]["f_port"], 1);
}

#[test]
fn missing_inbox_is_an_io_error() {
    let err = JsonLinesPushSource::open("/nonexistent/inbox.jsonl").unwrap_err();
    assert!(matches!(err, groundlink_relay::RelayError::Io(_)));
}
