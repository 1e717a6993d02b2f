// tests/pipeline.rs
//
// End-to-end runs of the tap against scripted links: readers, queue, writer
// and sink wired together by the supervisor. The scripted links live behind
// the `testing` feature: `cargo test --features testing`.

use std::sync::Arc;
use std::time::Duration;

use serialtap_lib::checksums::append_modbus_crc;
use serialtap_lib::event::format_hex;
use serialtap_lib::io::serial::testing::{OpenOutcome, PerPortOpener, ScriptedLink, ScriptedOpener};
use serialtap_lib::settings::LinkKind;
use serialtap_lib::{
    DetectionMode, LinkError, MemorySink, PortConfig, Supervisor, TapError, TapSettings,
};

fn frame_lines(lines: &[String]) -> Vec<&str> {
    lines
        .iter()
        .map(String::as_str)
        .filter(|l| l.starts_with("TX : ") || l.starts_with("RX : "))
        .collect()
}

fn payload(line: &str) -> &str {
    // "TX : 2025-02-25 10:30:45.123 <payload>"
    line.splitn(5, ' ').nth(4).unwrap_or("")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_two_ports_are_framed_and_classified() {
    let request = append_modbus_crc(&[0x11, 0x03, 0x00, 0x6B, 0x00, 0x02]);
    let reply = append_modbus_crc(&[0x11, 0x03, 0x04, 0x02, 0x2B, 0x00, 0x64]);

    let opener = PerPortOpener::new()
        .port(
            "Meter",
            ScriptedOpener::new([OpenOutcome::Link(
                ScriptedLink::new()
                    // Reply arrives split across two reads, well inside the frame timeout
                    .data(10, &request)
                    .data(120, &reply[..4])
                    .data(125, &reply[4..]),
            )]),
        )
        .port(
            "Console",
            ScriptedOpener::new([OpenOutcome::Link(
                ScriptedLink::new().data(10, b"AT\r").data(150, b"OK\r\n"),
            )]),
        );

    let mut meter = PortConfig::new("Meter", "/dev/ttyRS485", 9600);
    meter.link = LinkKind::Multidrop;
    let mut settings = TapSettings {
        ports: vec![meter, PortConfig::new("Console", "/dev/ttyUSB0", 115200)],
        ..Default::default()
    };
    settings.detection.mode = DetectionMode::Auto;

    let sink = MemorySink::new();
    let supervisor = Supervisor::start(settings, Arc::new(opener), Some(Box::new(sink.clone())), None)
        .await
        .unwrap();
    assert_eq!(supervisor.connected(), 2);

    tokio::time::sleep(Duration::from_millis(400)).await;
    let stats = supervisor.stop().await;

    let lines = sink.lines();
    let frames = frame_lines(&lines);
    assert_eq!(frames.len(), 4, "{:#?}", lines);

    // Modbus traffic is classified from bus addressing, split reads are rejoined
    assert!(frames
        .iter()
        .any(|l| l.starts_with("TX") && payload(l) == format_hex(&request)));
    assert!(frames
        .iter()
        .any(|l| l.starts_with("RX") && payload(l) == format_hex(&reply)));

    // Per-port order is preserved
    let console: Vec<&str> = frames
        .iter()
        .copied()
        .filter(|l| payload(l) == "41 54 0D" || payload(l) == "4F 4B 0D 0A")
        .collect();
    assert_eq!(console.len(), 2);
    assert_eq!(payload(console[0]), "41 54 0D");
    assert_eq!(payload(console[1]), "4F 4B 0D 0A");

    // Every port reports its connection and its shutdown
    assert_eq!(lines.iter().filter(|l| l.starts_with("[Meter] ") && l.contains("CONNECTED")).count(), 1);
    assert_eq!(lines.iter().filter(|l| l.contains("DISCONNECTED stopped")).count(), 2);

    let meter = stats.port("Meter").unwrap();
    assert_eq!((meter.tx_frames, meter.rx_frames), (1, 1));
    assert_eq!(meter.bytes, (request.len() + reply.len()) as u64);
    assert_eq!(stats.port("Console").unwrap().frames, 2);
    assert_eq!(stats.totals().dropped_events, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_failed_port_keeps_retrying_while_others_run() {
    let opener = Arc::new(
        PerPortOpener::new()
            .port(
                "Good",
                ScriptedOpener::new([OpenOutcome::Link(ScriptedLink::new().data(10, b"ping"))]),
            )
            .port(
                "Flaky",
                ScriptedOpener::new([
                    OpenOutcome::Fail(LinkError::Unavailable("busy".to_string())),
                    OpenOutcome::Link(ScriptedLink::new().data(10, b"late")),
                ]),
            ),
    );

    let settings = TapSettings {
        ports: vec![
            PortConfig::new("Good", "/dev/ttyUSB0", 9600),
            PortConfig::new("Flaky", "/dev/ttyUSB1", 9600),
        ],
        reconnect_delay_ms: 100,
        ..Default::default()
    };

    let sink = MemorySink::new();
    let supervisor = Supervisor::start(settings, opener.clone(), Some(Box::new(sink.clone())), None)
        .await
        .unwrap();
    assert_eq!(supervisor.connected(), 1);

    tokio::time::sleep(Duration::from_millis(500)).await;
    let stats = supervisor.stop().await;

    assert_eq!(opener.opener("Flaky").map(|o| o.attempts().len()), Some(2));
    let flaky = stats.port("Flaky").unwrap();
    assert_eq!((flaky.errors, flaky.connects, flaky.frames), (1, 1, 1));

    let lines = sink.lines();
    assert!(lines
        .iter()
        .any(|l| l.starts_with("[Flaky] ") && l.contains("ERROR Failed to open /dev/ttyUSB1")));
    assert!(frame_lines(&lines).iter().any(|l| payload(l) == "6C 61 74 65"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_startup_fails_when_no_port_opens() {
    let settings = TapSettings {
        ports: vec![PortConfig::new("Only", "/dev/ttyUSB9", 9600)],
        ..Default::default()
    };
    let opener = ScriptedOpener::new([OpenOutcome::Fail(LinkError::Misconfigured(
        "unsupported baud".to_string(),
    ))]);

    let result = Supervisor::start(settings, Arc::new(opener), None, None).await;
    assert!(matches!(result, Err(TapError::AllPortsFailed { count: 1 })));
}
