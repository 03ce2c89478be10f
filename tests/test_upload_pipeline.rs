mod support;

use chrono::NaiveDate;
use qradmin::api::QrBackend;
use qradmin::qr_image::{QrImageEncoder, QrImageOptions};
use qradmin::test_support::{MockCall, MockQrBackend};
use qradmin::upload::{Confirm, SubmitMode, UploadConfig, UploadError, UploadPipeline, UploadProgress};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use support::{generated, tracing_init};

fn encoder() -> QrImageEncoder {
    QrImageEncoder::new(QrImageOptions { size: 64, margin: 1 })
}

fn batch_sizes(calls: &[MockCall]) -> Vec<usize> {
    calls
        .iter()
        .filter_map(|c| match c {
            MockCall::CreateBatch(batch) => Some(batch.len()),
            _ => None,
        })
        .collect()
}

fn drain(rx: &mut tokio::sync::mpsc::UnboundedReceiver<UploadProgress>) -> Vec<UploadProgress> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn test_450_items_go_out_as_three_chunks() {
    tracing_init();
    let backend = Arc::new(MockQrBackend::new());
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let pipeline = UploadPipeline::new(backend.clone(), encoder(), UploadConfig::default())
        .with_progress(tx)
        .with_created_date(NaiveDate::from_ymd_opt(2025, 9, 29).unwrap());

    let report = pipeline
        .upload(&generated(1, 450), Confirm::Bypass)
        .await
        .unwrap();
    assert_eq!(report.total, 450);
    assert_eq!(report.chunks, 3);
    assert_eq!(batch_sizes(&backend.calls()), vec![200, 200, 50]);

    let stored = backend.stored();
    assert_eq!(stored.len(), 450);
    assert_eq!(stored[449].serial, "0450");
    assert!(stored.iter().all(|r| r.created_date == "2025-09-29"));
    assert!(stored.iter().all(|r| r.item_name == "maru_on"));

    let events = drain(&mut rx);
    assert_eq!(events.first(), Some(&UploadProgress::Started { total: 450 }));
    assert_eq!(events.last(), Some(&UploadProgress::Complete { total: 450 }));

    let progress: Vec<(usize, u8)> = events
        .iter()
        .filter_map(|e| match e {
            UploadProgress::SaveSucceeded {
                processed, percent, ..
            } => Some((*processed, *percent)),
            _ => None,
        })
        .collect();
    assert_eq!(progress, vec![(200, 44), (400, 88), (450, 100)]);

    let requested: Vec<usize> = events
        .iter()
        .filter_map(|e| match e {
            UploadProgress::SaveRequested { size, .. } => Some(*size),
            _ => None,
        })
        .collect();
    assert_eq!(requested, vec![200, 200, 50]);
}

#[tokio::test]
async fn test_failed_chunk_halts_and_keeps_earlier_chunks() {
    tracing_init();
    let backend = Arc::new(MockQrBackend::new());
    backend.fail_on_call(1, 503, "backend unavailable");
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let config = UploadConfig {
        chunk_size: 5,
        ..Default::default()
    };
    let pipeline = UploadPipeline::new(backend.clone(), encoder(), config).with_progress(tx);

    let err = pipeline
        .upload(&generated(1, 12), Confirm::Bypass)
        .await
        .unwrap_err();

    match &err {
        UploadError::Chunk {
            chunk_index,
            committed,
            source,
        } => {
            assert_eq!(*chunk_index, 1);
            assert_eq!(*committed, 5);
            assert_eq!(source.user_message(), "backend unavailable");
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert_eq!(err.committed(), 5);

    // Third chunk never sent, first stays committed
    assert_eq!(backend.calls().len(), 2);
    assert_eq!(backend.stored().len(), 5);

    let events = drain(&mut rx);
    assert!(events.contains(&UploadProgress::SaveFailed {
        chunk_index: 1,
        error: "backend unavailable".to_string()
    }));
    assert!(!events
        .iter()
        .any(|e| matches!(e, UploadProgress::Complete { .. })));
}

#[tokio::test]
async fn test_large_batch_needs_confirmation() {
    tracing_init();
    let backend = Arc::new(MockQrBackend::new());
    let config = UploadConfig {
        confirm_threshold: 5,
        ..Default::default()
    };
    let pipeline = UploadPipeline::new(backend.clone(), encoder(), config);
    let asked = Arc::new(AtomicUsize::new(0));

    let seen = asked.clone();
    let err = pipeline
        .upload(
            &generated(1, 6),
            Confirm::ask(move |count| {
                seen.store(count, Ordering::SeqCst);
                false
            }),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, UploadError::NotConfirmed { count: 6 }));
    assert_eq!(asked.load(Ordering::SeqCst), 6);
    assert!(backend.calls().is_empty());

    pipeline
        .upload(&generated(1, 6), Confirm::ask(|_| true))
        .await
        .unwrap();
    assert_eq!(backend.stored().len(), 6);
}

#[tokio::test(flavor = "current_thread")]
async fn test_confirmation_runs_off_the_runtime_thread() {
    tracing_init();
    let backend = Arc::new(MockQrBackend::new());
    let config = UploadConfig {
        confirm_threshold: 2,
        ..Default::default()
    };
    let pipeline = UploadPipeline::new(backend.clone(), encoder(), config);
    let runtime_thread = std::thread::current().id();

    // A blocking prompt on the only runtime thread would stall every task
    pipeline
        .upload(
            &generated(1, 3),
            Confirm::ask(move |_| {
                std::thread::sleep(Duration::from_millis(20));
                std::thread::current().id() != runtime_thread
            }),
        )
        .await
        .unwrap();
    assert_eq!(backend.stored().len(), 3);

    let err = pipeline
        .upload(
            &generated(4, 6),
            Confirm::ask(|_| panic!("terminal went away")),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, UploadError::NotConfirmed { count: 3 }));
    assert_eq!(backend.stored().len(), 3);
}

#[tokio::test]
async fn test_small_batch_is_not_prompted() {
    let backend = Arc::new(MockQrBackend::new());
    let pipeline = UploadPipeline::new(backend.clone(), encoder(), UploadConfig::default());

    pipeline
        .upload(
            &generated(1, 3),
            Confirm::ask(|_| panic!("small batches are never prompted")),
        )
        .await
        .unwrap();
    assert_eq!(backend.stored().len(), 3);
}

#[tokio::test]
async fn test_per_record_mode_with_delay() {
    tracing_init();
    let backend = Arc::new(MockQrBackend::new());
    let config = UploadConfig {
        chunk_size: 1,
        chunk_delay: Some(Duration::from_millis(20)),
        submit_mode: SubmitMode::PerRecord,
        item_name: "sticker".to_string(),
        ..Default::default()
    };
    let pipeline = UploadPipeline::new(backend.clone(), encoder(), config);

    let started = Instant::now();
    pipeline
        .upload(&generated(7, 9), Confirm::Bypass)
        .await
        .unwrap();
    assert!(started.elapsed() >= Duration::from_millis(40));

    let serials: Vec<String> = backend
        .calls()
        .into_iter()
        .map(|c| match c {
            MockCall::Create(r) => r.serial,
            other => panic!("unexpected call {:?}", other),
        })
        .collect();
    assert_eq!(serials, vec!["0007", "0008", "0009"]);
    assert!(backend.stored().iter().all(|r| r.item_name == "sticker"));
}

#[tokio::test]
async fn test_uploaded_records_are_listed() {
    let backend = Arc::new(MockQrBackend::new());
    let pipeline = UploadPipeline::new(backend.clone(), encoder(), UploadConfig::default());
    pipeline
        .upload(&generated(1, 2), Confirm::Bypass)
        .await
        .unwrap();

    let body = backend
        .list(&qradmin::api::QueryParams::new())
        .await
        .unwrap();
    assert_eq!(body["total"], 2);
    assert_eq!(body["items"][0]["serial"], "0001");
    assert!(body["items"][0]["qrUrl"]
        .as_str()
        .unwrap()
        .starts_with("https://example.com/r/maruon/serial=0001?token="));
}
