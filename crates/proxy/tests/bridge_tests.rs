//! Bridge loop tests against the scripted bulk pipe

use common::test_utils::{
    DEFAULT_TEST_TIMEOUT, MockBulkPipe, RecordingWriter, Trace, TraceEvent, new_trace, writes,
};
use common::{Error, TransferDirection};
use proxy::bridge::{Bridge, BridgeExit, ExternalChannel};
use proxy::config::BridgeSettings;
use std::future;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::time::{self, Instant};

fn settings(wait_for_first_byte: bool) -> BridgeSettings {
    BridgeSettings {
        wait_for_first_byte,
        idle_timeout_ms: 50,
        drain_timeout_ms: 500,
        ..BridgeSettings::default()
    }
}

fn quiet_pipe(packet_size: usize) -> (MockBulkPipe, Trace) {
    let trace = new_trace();
    let pipe = MockBulkPipe::new(packet_size, trace.clone()).with_idle_delay(Duration::from_millis(10));
    (pipe, trace)
}

#[tokio::test]
async fn test_input_becomes_one_out_transfer() {
    let (pipe, trace) = quiet_pipe(512);
    let bridge = Bridge::new(pipe, settings(false));

    let report = bridge
        .run(&b"ABC"[..], RecordingWriter::new(trace.clone()), future::pending())
        .await
        .unwrap();

    assert_eq!(report.exit, BridgeExit::InputClosed);
    assert_eq!(bridge.pipe().out_payloads(), vec![b"ABC".to_vec()]);
    assert_eq!(report.stats.out_transfers, 1);
    assert_eq!(report.stats.bytes_to_device, 3);
    assert!(writes(&trace).is_empty());
}

#[tokio::test]
async fn test_payload_written_once_before_rearm() {
    let (pipe, trace) = quiet_pipe(512);
    pipe.push_in(Ok(b"XYZ".to_vec()));
    let bridge = Bridge::new(pipe, settings(true));

    let report = bridge
        .run(tokio::io::empty(), RecordingWriter::new(trace.clone()), future::pending())
        .await
        .unwrap();

    assert_eq!(report.exit, BridgeExit::InputClosed);
    assert_eq!(writes(&trace), vec![b"XYZ".to_vec()]);

    let events = bridge.pipe().trace();
    assert_eq!(
        events[..3],
        [
            TraceEvent::InArmed,
            TraceEvent::InCompleted(b"XYZ".to_vec()),
            TraceEvent::Write(b"XYZ".to_vec()),
        ]
    );
    // The IN transfer is re-armed only after the write
    assert_eq!(events.get(3), Some(&TraceEvent::InArmed));
}

#[tokio::test]
async fn test_wait_for_first_byte_holds_input() {
    let (pipe, trace) = quiet_pipe(512);
    let bridge = Bridge::new(pipe, settings(true));

    let report = bridge
        .run(
            &b"hello"[..],
            RecordingWriter::new(trace.clone()),
            time::sleep(Duration::from_millis(150)),
        )
        .await
        .unwrap();

    assert_eq!(report.exit, BridgeExit::Interrupted);
    assert!(bridge.pipe().out_payloads().is_empty());
}

#[tokio::test]
async fn test_at_most_one_transfer_per_direction() {
    let (pipe, trace) = quiet_pipe(64);
    let pipe = pipe.with_out_delay(Duration::from_millis(2));
    for i in 0..8u8 {
        pipe.push_in(Ok(vec![i; 32]));
    }
    let bridge = Bridge::new(pipe, settings(false));

    let input: Vec<u8> = (0..4096u32).map(|i| (i % 251) as u8).collect();
    let report = bridge
        .run(&input[..], RecordingWriter::new(trace.clone()), future::pending())
        .await
        .unwrap();

    assert_eq!(report.exit, BridgeExit::InputClosed);
    assert_eq!(bridge.pipe().max_in_flight_out(), 1);
    assert_eq!(bridge.pipe().max_in_flight_in(), 1);

    let sent: Vec<u8> = bridge.pipe().out_payloads().concat();
    assert_eq!(sent, input);
    assert!(bridge.pipe().out_payloads().iter().all(|p| p.len() <= 64));
}

#[tokio::test]
async fn test_short_write_is_fatal() {
    let (pipe, trace) = quiet_pipe(512);
    pipe.push_in(Ok(b"XYZ".to_vec()));
    let bridge = Bridge::new(pipe, settings(false));

    let (_client, server) = tokio::io::duplex(64);
    let result = bridge
        .run(server, RecordingWriter::short(trace.clone(), 1), future::pending())
        .await;

    assert!(matches!(
        result,
        Err(Error::ShortWrite {
            expected: 3,
            written: 2
        })
    ));
}

#[tokio::test]
async fn test_termination_interrupts_wait() {
    let (pipe, trace) = quiet_pipe(512);
    let bridge = Bridge::new(pipe, settings(false));
    let (tx, rx) = oneshot::channel::<()>();

    tokio::spawn(async move {
        time::sleep(Duration::from_millis(50)).await;
        let _ = tx.send(());
    });

    let (_client, server) = tokio::io::duplex(64);
    let started = Instant::now();
    let report = bridge
        .run(server, RecordingWriter::new(trace.clone()), async {
            let _ = rx.await;
        })
        .await
        .unwrap();

    assert_eq!(report.exit, BridgeExit::Interrupted);
    assert!(started.elapsed() < DEFAULT_TEST_TIMEOUT);
}

#[tokio::test]
async fn test_out_failure_stops_bridge() {
    let (pipe, trace) = quiet_pipe(512);
    pipe.fail_out(rusb::Error::NoDevice);
    let bridge = Bridge::new(pipe, settings(false));

    let report = bridge
        .run(&b"data"[..], RecordingWriter::new(trace.clone()), future::pending())
        .await
        .unwrap();

    assert_eq!(
        report.exit,
        BridgeExit::TransferFailed {
            direction: TransferDirection::Out,
            error: rusb::Error::NoDevice,
        }
    );
}

#[tokio::test]
async fn test_in_failure_stops_bridge() {
    let (pipe, trace) = quiet_pipe(512);
    pipe.push_in(Err(rusb::Error::NoDevice));
    let bridge = Bridge::new(pipe, settings(false));

    let (_client, server) = tokio::io::duplex(64);
    let report = bridge
        .run(server, RecordingWriter::new(trace.clone()), future::pending())
        .await
        .unwrap();

    assert_eq!(
        report.exit,
        BridgeExit::TransferFailed {
            direction: TransferDirection::In,
            error: rusb::Error::NoDevice,
        }
    );
}

#[tokio::test]
async fn test_empty_completion_rearms() {
    let (pipe, trace) = quiet_pipe(512);
    pipe.push_in(Ok(Vec::new()));
    pipe.push_in(Ok(b"after".to_vec()));
    let bridge = Bridge::new(pipe, settings(false));

    let (_client, server) = tokio::io::duplex(64);
    let report = bridge
        .run(
            server,
            RecordingWriter::new(trace.clone()),
            time::sleep(Duration::from_millis(200)),
        )
        .await
        .unwrap();

    assert_eq!(report.exit, BridgeExit::Interrupted);
    assert_eq!(writes(&trace), vec![b"after".to_vec()]);
    assert_eq!(report.stats.in_transfers, 1);
}

#[tokio::test]
async fn test_tcp_channel_round_trip() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let (pipe, _trace) = quiet_pipe(512);
    pipe.push_in(Ok(b"XYZ".to_vec()));
    let bridge = Bridge::new(pipe, settings(true));

    let peer = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut greeting = [0u8; 3];
        socket.read_exact(&mut greeting).await.unwrap();
        socket.write_all(b"ABC").await.unwrap();
        socket.shutdown().await.unwrap();

        let mut rest = Vec::new();
        socket.read_to_end(&mut rest).await.unwrap();
        (greeting, rest)
    });

    let channel = ExternalChannel::Tcp(TcpStream::connect(("127.0.0.1", port)).await.unwrap());
    let (reader, writer) = channel.split();
    let report = bridge.run(reader, writer, future::pending()).await.unwrap();

    assert_eq!(report.exit, BridgeExit::InputClosed);
    assert_eq!(bridge.pipe().out_payloads().concat(), b"ABC".to_vec());

    let (greeting, rest) = peer.await.unwrap();
    assert_eq!(&greeting, b"XYZ");
    assert!(rest.is_empty());
}
