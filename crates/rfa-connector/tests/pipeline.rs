//! End-to-end pipeline tests
//!
//! Drive both acquisition modes against a capturing sink: a local TCP
//! listener stands in for the analyzer's stream endpoint, a temp directory
//! stands in for the report share. No database involved.

use async_trait::async_trait;
use rfa_common::{Result, RfaError};
use rfa_connector::persist::MeasurementSink;
use rfa_connector::pipeline::Pipeline;
use rfa_connector::record::{Classification, MeasurementRecord};
use rfa_connector::stream::StreamAcquisition;
use rfa_connector::watcher::FileAcquisition;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// Sink that forwards every persisted record to the test.
struct CapturingSink {
    tx: mpsc::UnboundedSender<(String, MeasurementRecord)>,
}

#[async_trait]
impl MeasurementSink for CapturingSink {
    async fn persist(&self, target: &str, record: &MeasurementRecord) -> Result<u64> {
        self.tx
            .send((target.to_string(), record.clone()))
            .map_err(|e| RfaError::Unknown(e.to_string()))?;
        Ok(1)
    }
}

/// Sink that always fails, to prove the pipeline keeps going.
struct FailingSink {
    tx: mpsc::UnboundedSender<String>,
}

#[async_trait]
impl MeasurementSink for FailingSink {
    async fn persist(&self, _target: &str, record: &MeasurementRecord) -> Result<u64> {
        let _ = self.tx.send(record.order_no.clone());
        Err(RfaError::Database("store unreachable".to_string()))
    }
}

fn capturing_pipeline() -> (Pipeline, mpsc::UnboundedReceiver<(String, MeasurementRecord)>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Pipeline::new(Arc::new(CapturingSink { tx })), rx)
}

const COMPLETE_PAYLOAD: &str = "%Probe: B-123\r\n%Datum: 01.02.2024\r\nAu;x;1,5\r\n";

#[tokio::test]
async fn tcp_payload_is_parsed_and_persisted_to_target_one() {
    let (pipeline, mut rx) = capturing_pipeline();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let cancel = CancellationToken::new();
    let acquisition = StreamAcquisition::new("127.0.0.1".to_string(), port, pipeline);
    let handle = tokio::spawn(acquisition.run(cancel.clone()));

    let (mut socket, _) = listener.accept().await.unwrap();
    socket.write_all(COMPLETE_PAYLOAD.as_bytes()).await.unwrap();
    socket.flush().await.unwrap();

    let (target, record) = timeout(RECV_TIMEOUT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(target, "TESTDB1");
    assert_eq!(record.order_no, "123");
    assert_eq!(record.classification, Some(Classification::Scheidgut));
    assert_eq!(record.metals.au, dec!(1.5));

    cancel.cancel();
    timeout(RECV_TIMEOUT, handle).await.unwrap().unwrap();
}

#[tokio::test]
async fn tcp_acquisition_reconnects_after_peer_disconnect() {
    let (pipeline, mut rx) = capturing_pipeline();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let cancel = CancellationToken::new();
    let acquisition = StreamAcquisition::new("127.0.0.1".to_string(), port, pipeline);
    let handle = tokio::spawn(acquisition.run(cancel.clone()));

    // First session ends without delivering anything useful.
    let (socket, _) = listener.accept().await.unwrap();
    drop(socket);

    // A disconnect re-enters the connect state immediately.
    let (mut socket, _) = timeout(RECV_TIMEOUT, listener.accept()).await.unwrap().unwrap();
    socket.write_all(COMPLETE_PAYLOAD.as_bytes()).await.unwrap();
    socket.flush().await.unwrap();

    let (target, record) = timeout(RECV_TIMEOUT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(target, "TESTDB1");
    assert_eq!(record.order_no, "123");

    cancel.cancel();
    timeout(RECV_TIMEOUT, handle).await.unwrap().unwrap();
}

#[tokio::test]
async fn incomplete_tcp_payload_is_dropped_without_persistence() {
    let (pipeline, mut rx) = capturing_pipeline();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let cancel = CancellationToken::new();
    let acquisition = StreamAcquisition::new("127.0.0.1".to_string(), port, pipeline);
    let handle = tokio::spawn(acquisition.run(cancel.clone()));

    let (mut socket, _) = listener.accept().await.unwrap();

    // Missing the date header; must not reach the sink.
    socket
        .write_all(b"%Probe: B-9\r\nAu;x;2,0\r\n")
        .await
        .unwrap();
    socket.flush().await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    // The next complete payload still goes through.
    socket.write_all(COMPLETE_PAYLOAD.as_bytes()).await.unwrap();
    socket.flush().await.unwrap();

    let (_, record) = timeout(RECV_TIMEOUT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(record.order_no, "123");
    assert!(rx.try_recv().is_err(), "incomplete record must not be persisted");

    cancel.cancel();
    timeout(RECV_TIMEOUT, handle).await.unwrap().unwrap();
}

#[tokio::test]
async fn persistence_failure_loses_the_record_but_not_the_stream() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let pipeline = Pipeline::new(Arc::new(FailingSink { tx }));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let cancel = CancellationToken::new();
    let acquisition = StreamAcquisition::new("127.0.0.1".to_string(), port, pipeline);
    let handle = tokio::spawn(acquisition.run(cancel.clone()));

    let (mut socket, _) = listener.accept().await.unwrap();
    socket.write_all(COMPLETE_PAYLOAD.as_bytes()).await.unwrap();
    socket.flush().await.unwrap();

    let first = timeout(RECV_TIMEOUT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(first, "123");

    // The pipeline recovered; a second payload reaches the sink too.
    socket
        .write_all("%Probe: G-77\r\n%Datum: 02.03.2025\r\nAg;x;0,5\r\n".as_bytes())
        .await
        .unwrap();
    socket.flush().await.unwrap();

    let second = timeout(RECV_TIMEOUT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(second, "77");

    cancel.cancel();
    timeout(RECV_TIMEOUT, handle).await.unwrap().unwrap();
}

#[tokio::test]
async fn created_file_is_processed_and_routed() {
    let (pipeline, mut rx) = capturing_pipeline();
    let dir = tempfile::tempdir().unwrap();

    let cancel = CancellationToken::new();
    let acquisition = FileAcquisition::new(dir.path().to_path_buf(), 4, pipeline);
    let handle = tokio::spawn(acquisition.run(cancel.clone()));

    // Give the watcher a moment to register before creating the file.
    tokio::time::sleep(Duration::from_millis(300)).await;

    let path = dir.path().join("report-1.txt");
    std::fs::write(&path, "%Probe: G-456\n%Datum: 05.06.2025\nPd;x;0,75\n").unwrap();

    let (target, record) = timeout(RECV_TIMEOUT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(target, "TESTDB2");
    assert_eq!(record.order_no, "456");
    assert_eq!(record.classification, Some(Classification::Gekraetz));
    assert_eq!(record.metals.pd, dec!(0.75));

    cancel.cancel();
    timeout(RECV_TIMEOUT, handle).await.unwrap().unwrap();
}

#[tokio::test]
async fn multiple_files_are_processed_concurrently() {
    let (pipeline, mut rx) = capturing_pipeline();
    let dir = tempfile::tempdir().unwrap();

    let cancel = CancellationToken::new();
    let acquisition = FileAcquisition::new(dir.path().to_path_buf(), 4, pipeline);
    let handle = tokio::spawn(acquisition.run(cancel.clone()));

    tokio::time::sleep(Duration::from_millis(300)).await;

    for i in 1..=3 {
        let path = dir.path().join(format!("report-{i}.txt"));
        std::fs::write(
            &path,
            format!("%Probe: B-{i}\n%Datum: 01.02.2024\nAu;x;{i},0\n"),
        )
        .unwrap();
    }

    let mut orders = Vec::new();
    for _ in 0..3 {
        let (target, record) = timeout(RECV_TIMEOUT, rx.recv()).await.unwrap().unwrap();
        assert_eq!(target, "TESTDB1");
        orders.push(record.order_no);
    }
    orders.sort();
    assert_eq!(orders, vec!["1", "2", "3"]);

    cancel.cancel();
    timeout(RECV_TIMEOUT, handle).await.unwrap().unwrap();
}

#[tokio::test]
async fn file_with_all_zero_metals_is_not_persisted() {
    let (pipeline, mut rx) = capturing_pipeline();
    let dir = tempfile::tempdir().unwrap();

    let cancel = CancellationToken::new();
    let acquisition = FileAcquisition::new(dir.path().to_path_buf(), 4, pipeline);
    let handle = tokio::spawn(acquisition.run(cancel.clone()));

    tokio::time::sleep(Duration::from_millis(300)).await;

    std::fs::write(
        dir.path().join("zeros.txt"),
        "%Probe: B-1\n%Datum: 01.02.2024\nAu;x;-\nAg;x;\n",
    )
    .unwrap();

    // The complete file written afterwards is the only one that arrives.
    std::fs::write(
        dir.path().join("complete.txt"),
        "%Probe: B-2\n%Datum: 01.02.2024\nRh;x;0,1\n",
    )
    .unwrap();

    let (_, record) = timeout(RECV_TIMEOUT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(record.order_no, "2");
    assert!(rx.try_recv().is_err(), "all-zero record must not be persisted");

    cancel.cancel();
    timeout(RECV_TIMEOUT, handle).await.unwrap().unwrap();
}
