//! First-run provisioning followed by a real download
//!
//! A mock tool host serves a shell-script extractor and an ffmpeg-shaped zip, so
//! `DownloadOrchestrator::new` goes through the whole provisioning path.

#![cfg(unix)]

mod common;

use common::{RECORDING_EXTRACTOR, script_bytes, test_config, transcoder_archive};
use playlist_dl::{Config, DownloadOrchestrator, DownloadRequest, Error, FormatProfile};
use std::path::Path;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn tool_host(extractor_hits: u64, archive_hits: u64) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/yt-dlp"))
        .respond_with(
            ResponseTemplate::new(200).set_body_bytes(script_bytes(RECORDING_EXTRACTOR)),
        )
        .expect(extractor_hits)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/ffmpeg.zip"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(transcoder_archive()))
        .expect(archive_hits)
        .mount(&server)
        .await;
    server
}

fn provisioning_config(root: &Path, server: &MockServer) -> Config {
    let mut config = test_config(root);
    config.tools.extractor_url = format!("{}/yt-dlp", server.uri());
    config.tools.transcoder_archive_url = format!("{}/ffmpeg.zip", server.uri());
    config.tools.min_extractor_bytes = 16;
    config.tools.min_archive_bytes = 16;
    config.tools.min_free_space = 0;
    config.retry.max_attempts = 0;
    config
}

#[tokio::test]
async fn first_run_provisions_tools_then_downloads() {
    let server = tool_host(1, 1).await;
    let temp_dir = tempfile::tempdir().unwrap();
    let destination = temp_dir.path().join("library");
    std::fs::create_dir_all(&destination).unwrap();

    let orchestrator =
        DownloadOrchestrator::new(provisioning_config(temp_dir.path(), &server)).unwrap();
    let request = DownloadRequest::new(
        "https://www.youtube.com/playlist?list=PLintegration",
        FormatProfile::Audio,
        &destination,
    );

    orchestrator.download(request.clone()).await.unwrap();
    // tools are resolved once, the mock expectations verify no second fetch
    orchestrator.download(request).await.unwrap();

    let bin = temp_dir.path().join("tools/bin");
    assert!(bin.join("yt-dlp").is_file());
    assert!(bin.join("ffmpeg/ffmpeg-master-latest/bin/ffmpeg").is_file());

    let path = std::fs::read_to_string(destination.join("path.txt")).unwrap();
    assert!(
        path.trim_end()
            .ends_with("ffmpeg/ffmpeg-master-latest/bin"),
        "PATH was {path}"
    );
    assert_eq!(orchestrator.history(&destination).await.unwrap().len(), 2);
}

#[tokio::test]
async fn installed_tools_are_reused_by_a_new_orchestrator() {
    let temp_dir = tempfile::tempdir().unwrap();
    let destination = temp_dir.path().join("library");
    std::fs::create_dir_all(&destination).unwrap();
    let request = DownloadRequest::new(
        "https://www.youtube.com/playlist?list=PLintegration",
        FormatProfile::Video,
        &destination,
    );

    {
        let server = tool_host(1, 1).await;
        let orchestrator =
            DownloadOrchestrator::new(provisioning_config(temp_dir.path(), &server)).unwrap();
        orchestrator.download(request.clone()).await.unwrap();
    }

    let server = tool_host(0, 0).await;
    let orchestrator =
        DownloadOrchestrator::new(provisioning_config(temp_dir.path(), &server)).unwrap();
    orchestrator.download(request).await.unwrap();
}

#[tokio::test]
async fn unreachable_tool_host_fails_before_launch() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    let temp_dir = tempfile::tempdir().unwrap();
    let destination = temp_dir.path().join("library");
    std::fs::create_dir_all(&destination).unwrap();

    let orchestrator =
        DownloadOrchestrator::new(provisioning_config(temp_dir.path(), &server)).unwrap();
    let err = orchestrator
        .download(DownloadRequest::new(
            "https://www.youtube.com/playlist?list=PLintegration",
            FormatProfile::Audio,
            &destination,
        ))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Provisioning(_)), "got {err:?}");
    assert_eq!(err.error_code(), "http_status");
    assert!(!destination.join("args.txt").exists(), "extractor never ran");
    assert!(orchestrator.history(&destination).await.unwrap().is_empty());
    assert!(
        !temp_dir.path().join("tools/bin/yt-dlp.part").exists(),
        "partial download cleaned up"
    );
}

#[test]
fn invalid_config_is_rejected_up_front() {
    let mut config = Config::default();
    config.tools.extractor_url = "ftp://example.com/yt-dlp".into();
    assert!(matches!(
        DownloadOrchestrator::new(config),
        Err(Error::Config { .. })
    ));
}
