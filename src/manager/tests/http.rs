use super::*;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const HELLO_MD5: &str = "5d41402abc4b2a76b9719d911017c592";

async fn serve(body: &[u8], at: &str) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(at))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.to_vec()))
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn test_http_job_completes() {
    let (manager, _engine, temp_dir) = create_test_manager().await;
    let content: Vec<u8> = (0..8192u32).map(|i| (i % 251) as u8).collect();
    let server = serve(&content, "/roms/homebrew.nes").await;
    let mut events = manager.subscribe();

    let job = manager
        .add_job(
            NewJob::new("homebrew.nes")
                .from_url(format!("{}/roms/homebrew.nes", server.uri()))
                .metadata(JobMetadata::new("Nintendo", "NES")),
        )
        .await
        .unwrap();
    assert_eq!(job.protocol, Protocol::Http);
    assert_eq!(job.status, JobStatus::Downloading);

    let done = wait_for_job(&manager, job.id, |j| j.status == JobStatus::Completed).await;
    let expected = temp_dir.path().join("downloads/nintendo/nes/homebrew.nes");
    assert_eq!(done.progress, 100.0);
    assert_eq!(done.local_path, Some(expected.clone()));
    assert_eq!(std::fs::read(&expected).unwrap(), content);
    assert!(manager.state.lock().await.http_tasks.is_empty());

    let mut saw_progress = false;
    while let Ok(event) = events.try_recv() {
        if let Event::Progress { id, percent, .. } = event {
            assert_eq!(id, job.id);
            assert!(percent <= 100.0);
            saw_progress = true;
        }
    }
    assert!(saw_progress, "expected progress events while streaming");
}

#[tokio::test]
async fn test_http_job_with_matching_checksum() {
    let (manager, _engine, _temp_dir) = create_test_manager().await;
    let server = serve(b"hello", "/hello.bin").await;

    let job = manager
        .add_job(
            NewJob::new("hello.bin")
                .from_url(format!("{}/hello.bin", server.uri()))
                .checksum(HELLO_MD5),
        )
        .await
        .unwrap();

    let done = wait_for_job(&manager, job.id, |j| j.status.is_terminal()).await;
    assert_eq!(done.status, JobStatus::Completed, "error: {:?}", done.error);
}

#[tokio::test]
async fn test_http_checksum_mismatch_fails_job() {
    let (manager, _engine, _temp_dir) = create_test_manager().await;
    let server = serve(b"not hello", "/hello.bin").await;
    let mut events = manager.subscribe();

    let job = manager
        .add_job(
            NewJob::new("hello.bin")
                .from_url(format!("{}/hello.bin", server.uri()))
                .checksum(HELLO_MD5),
        )
        .await
        .unwrap();

    let failed = wait_for_job(&manager, job.id, |j| j.status.is_terminal()).await;
    assert_eq!(failed.status, JobStatus::Error);
    assert!(failed.error.unwrap().contains("checksum mismatch"));
    assert!(failed.local_path.is_none());

    let mut saw_failed = false;
    while let Ok(event) = events.try_recv() {
        if matches!(event, Event::Failed { id, .. } if id == job.id) {
            saw_failed = true;
        }
    }
    assert!(saw_failed);
}

#[tokio::test]
async fn test_http_not_found_fails_job() {
    let (manager, _engine, _temp_dir) = create_test_manager().await;
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let job = manager
        .add_job(NewJob::new("gone.bin").from_url(format!("{}/gone.bin", server.uri())))
        .await
        .unwrap();

    let failed = wait_for_job(&manager, job.id, |j| j.status.is_terminal()).await;
    assert_eq!(failed.status, JobStatus::Error);
    assert!(failed.error.is_some());
    assert_eq!(failed.speed_kbps, 0.0);
}

#[tokio::test]
async fn test_container_preferred_over_url() {
    let (manager, engine, _temp_dir) = create_test_manager().await;
    write_genesis_container(&manager.config());
    let server = MockServer::start().await;

    let job = manager
        .add_job(
            NewJob::new("Sonic.bin")
                .from_container("sonic.torrent")
                .from_url(format!("{}/Sonic.bin", server.uri()))
                .metadata(JobMetadata::new("Sega", "Genesis")),
        )
        .await
        .unwrap();

    assert_eq!(job.protocol, Protocol::Archive);
    assert!(job.http_url.is_some(), "URL is kept for later use");
    assert_eq!(engine.open_count("sonic.torrent"), 1);
    assert!(manager.state.lock().await.http_tasks.is_empty());

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_http_transfers_respect_concurrency_limit() {
    let temp_dir = tempfile::tempdir().unwrap();
    let mut config = test_config(temp_dir.path());
    config.http.max_concurrent = 1;
    let manager = DownloadManager::with_engine(config, Arc::new(MemoryEngine::new()))
        .await
        .unwrap();

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(b"rom".to_vec())
                .set_delay(Duration::from_millis(200)),
        )
        .mount(&server)
        .await;

    let first = manager
        .add_job(NewJob::new("a.bin").from_url(format!("{}/a.bin", server.uri())))
        .await
        .unwrap();
    let second = manager
        .add_job(NewJob::new("b.bin").from_url(format!("{}/b.bin", server.uri())))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
    assert_eq!(
        manager.get_job(second.id).await.unwrap().status,
        JobStatus::Downloading,
        "waiting jobs stay downloading"
    );

    wait_for_job(&manager, first.id, |j| j.status == JobStatus::Completed).await;
    wait_for_job(&manager, second.id, |j| j.status == JobStatus::Completed).await;
}
