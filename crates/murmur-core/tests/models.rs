mod common;

use flate2::Compression;
use flate2::write::GzEncoder;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use common::{
    FlakyFetcher, StallingFetcher, StaticFetcher, build, drain, harness_with_payload, settings,
    view, wait_for,
};
use murmur_core::{EngineKind, Error, Event, ModelStatus};

const ARCHIVE_URL: &str = "https://example.com/parakeet-custom.tar.gz";

fn model_archive() -> Vec<u8> {
    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    for (name, data) in [
        ("parakeet-custom/encoder.onnx", "enc".as_bytes()),
        ("parakeet-custom/vocab.txt", "a\nb\n".as_bytes()),
    ] {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, name, data).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

#[tokio::test]
async fn test_archive_model_is_extracted() {
    let h = harness_with_payload(settings(false), 1, Duration::ZERO, model_archive());
    let mut rx = h.murmur.subscribe();

    let id = h.murmur.register_model(ARCHIVE_URL, None).unwrap();
    let model = view(&h.murmur, &id);
    assert!(model.descriptor.is_archive);
    assert_eq!(model.descriptor.engine, EngineKind::Parakeet);

    h.murmur.download_model(&id).await.unwrap();

    let installed = h.murmur.models_dir().join(&id);
    assert!(installed.join("encoder.onnx").is_file());
    assert!(installed.join("vocab.txt").is_file());
    assert_eq!(view(&h.murmur, &id).status, ModelStatus::Downloaded);

    let names: Vec<&str> = drain(&mut rx).iter().map(Event::name).collect();
    let started = names.iter().position(|n| *n == "model-extraction-started");
    let completed = names.iter().position(|n| *n == "model-extraction-completed");
    let done = names.iter().position(|n| *n == "model-download-complete");
    assert!(started < completed);
    assert!(completed < done);
    assert!(started.is_some());

    h.murmur.set_active_model(&id).await.unwrap();
    assert_eq!(h.murmur.get_engine_loaded_model(), Some(id));
}

#[tokio::test]
async fn test_failed_extraction_returns_to_none() {
    let h = harness_with_payload(
        settings(false),
        1,
        Duration::ZERO,
        b"definitely not gzip".to_vec(),
    );
    let mut rx = h.murmur.subscribe();
    let id = h.murmur.register_model(ARCHIVE_URL, None).unwrap();

    let result = h.murmur.download_model(&id).await;
    assert!(matches!(result, Err(Error::Extraction(_))));

    let model = view(&h.murmur, &id);
    assert_eq!(model.status, ModelStatus::None);
    assert!(!model.is_downloaded);
    assert!(!h.murmur.models_dir().join(&id).exists());
    assert_eq!(
        std::fs::read_dir(h.murmur.models_dir()).unwrap().count(),
        0
    );

    let events = drain(&mut rx);
    assert!(
        events
            .iter()
            .any(|e| matches!(e, Event::ExtractionFailed { model_id, .. } if *model_id == id))
    );
    assert!(
        !events
            .iter()
            .any(|e| matches!(e, Event::DownloadComplete { .. }))
    );

    // A failed extraction is retryable from scratch.
    let _ = h.murmur.download_model(&id).await;
    assert_eq!(h.fetcher.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_cancel_download_reaches_joined_callers() {
    let dir = tempfile::tempdir().unwrap();
    let fetcher = Arc::new(StallingFetcher::default());
    let murmur = Arc::new(build(
        dir.path(),
        settings(false),
        fetcher.clone(),
        1,
        Duration::ZERO,
    ));
    let mut rx = murmur.subscribe();
    let id = murmur.register_model("https://example.com/m.bin", None).unwrap();

    let first = {
        let (murmur, id) = (murmur.clone(), id.clone());
        tokio::spawn(async move { murmur.download_model(&id).await })
    };
    wait_for(&mut rx, |e| matches!(e, Event::DownloadProgress { .. })).await;
    assert_eq!(view(&murmur, &id).status, ModelStatus::Downloading);
    let joined = {
        let (murmur, id) = (murmur.clone(), id.clone());
        tokio::spawn(async move { murmur.download_model(&id).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(murmur.cancel_download(&id));
    assert_eq!(first.await.unwrap(), Err(Error::Cancelled));
    assert_eq!(joined.await.unwrap(), Err(Error::Cancelled));
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);

    let model = view(&murmur, &id);
    assert_eq!(model.status, ModelStatus::None);
    assert!(!model.is_downloaded);
    assert_eq!(std::fs::read_dir(murmur.models_dir()).unwrap().count(), 0);
    assert!(!murmur.cancel_download(&id));

    let events = drain(&mut rx);
    assert!(
        events
            .iter()
            .any(|e| matches!(e, Event::DownloadCancelled { model_id } if *model_id == id))
    );
    assert!(
        !events
            .iter()
            .any(|e| matches!(e, Event::DownloadFailed { .. }))
    );
}

#[tokio::test]
async fn test_transport_failure_is_retryable() {
    let dir = tempfile::tempdir().unwrap();
    let fetcher = Arc::new(FlakyFetcher {
        failures: 1,
        calls: AtomicUsize::new(0),
    });
    let murmur = build(dir.path(), settings(false), fetcher.clone(), 1, Duration::ZERO);
    let mut rx = murmur.subscribe();
    let id = murmur.register_model("https://example.com/m.bin", None).unwrap();

    let result = murmur.download_model(&id).await;
    assert!(matches!(result, Err(Error::Network(_))));
    assert_eq!(view(&murmur, &id).status, ModelStatus::None);
    assert_eq!(std::fs::read_dir(murmur.models_dir()).unwrap().count(), 0);
    let failed = drain(&mut rx).into_iter().find_map(|e| match e {
        Event::DownloadFailed { model_id, error } => Some((model_id, error)),
        _ => None,
    });
    let (model_id, error) = failed.unwrap();
    assert_eq!(model_id, id);
    assert!(error.contains("connection reset"));

    murmur.download_model(&id).await.unwrap();
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
    assert_eq!(view(&murmur, &id).status, ModelStatus::Downloaded);
}

#[tokio::test]
async fn test_catalog_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let fetcher = Arc::new(StaticFetcher {
        payload: b"ggml".to_vec(),
        calls: AtomicUsize::new(0),
    });

    let id = {
        let murmur = build(dir.path(), settings(false), fetcher.clone(), 1, Duration::ZERO);
        let id = murmur
            .register_model("https://example.com/m.bin", Some("My model"))
            .unwrap();
        murmur.download_model(&id).await.unwrap();
        murmur.set_active_model(&id).await.unwrap();
        id
    };

    let murmur = build(dir.path(), settings(false), fetcher, 1, Duration::ZERO);
    let model = view(&murmur, &id);
    assert_eq!(model.descriptor.display_name, "My model");
    assert!(model.descriptor.is_custom);
    assert_eq!(model.status, ModelStatus::Downloaded);
    assert_eq!(murmur.get_current_model(), Some(id.clone()));
    assert_eq!(murmur.get_engine_loaded_model(), None);

    murmur.delete_model(&id).unwrap();
    let murmur = build(
        dir.path(),
        settings(false),
        Arc::new(StaticFetcher {
            payload: Vec::new(),
            calls: AtomicUsize::new(0),
        }),
        1,
        Duration::ZERO,
    );
    assert!(murmur.list_models().iter().all(|m| m.descriptor.id != id));
    assert_eq!(murmur.get_current_model(), None);
}

#[tokio::test]
async fn test_unknown_and_invalid_models() {
    let h = harness_with_payload(settings(false), 1, Duration::ZERO, Vec::new());
    assert_eq!(
        h.murmur.download_model("no-such-model").await,
        Err(Error::NotFound("no-such-model".to_string()))
    );
    assert!(matches!(
        h.murmur.register_model("ftp://example.com/m.bin", None),
        Err(Error::InvalidInput(_))
    ));
    assert!(matches!(
        h.murmur.register_model("   ", None),
        Err(Error::InvalidInput(_))
    ));
    assert!(!h.murmur.cancel_download("small"));
}
