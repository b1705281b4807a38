//! Fake extraction tools and orchestrator harnesses

use async_trait::async_trait;
use playlist_dl::{
    Config, DownloadOrchestrator, DownloadRequest, FormatProfile, ProcessRunner, Result,
    ToolProvider, ToolSet,
};
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

pub const PLAYLIST_URL: &str = "https://www.youtube.com/playlist?list=PLintegration";

/// Script that records its arguments and PATH, then reports progress like yt-dlp
pub const RECORDING_EXTRACTOR: &str = r#"
printf '%s\n' "$@" > args.txt
printf '%s\n' "$PATH" > path.txt
echo "[youtube:tab] Downloading playlist PLintegration"
echo "[download] Destination: Integration/1 - First.mp4"
echo "[download]  12.5% of 2.00MiB at 1.00MiB/s ETA 00:01"
echo "[download] 100% of 2.00MiB in 00:02"
"#;

/// Script that fails the way yt-dlp does on a bad URL
pub const FAILING_EXTRACTOR: &str = r#"
echo "[download]  40.0% of 1.00MiB"
echo "ERROR: [generic] Unable to download webpage: HTTP Error 404" >&2
exit 1
"#;

/// Script that keeps running until it is stopped
pub const HANGING_EXTRACTOR: &str = r#"
echo "[download]   5.0% of 9.00MiB"
while true; do sleep 0.05; done
"#;

/// Script body prefixed with a shebang, as served by a tool host
pub fn script_bytes(body: &str) -> String {
    format!("#!/bin/sh\n{body}")
}

/// Write an executable shell script to `dir/yt-dlp`
pub fn write_fake_extractor(dir: &Path, body: &str) -> PathBuf {
    std::fs::create_dir_all(dir).unwrap();
    let path = dir.join("yt-dlp");
    {
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(script_bytes(body).as_bytes()).unwrap();
        file.sync_all().unwrap();
    }
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Zip archive laid out like an ffmpeg build
pub fn transcoder_archive() -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options = zip::write::FileOptions::default().unix_permissions(0o755);
    writer
        .start_file("ffmpeg-master-latest/bin/ffmpeg", options)
        .unwrap();
    writer.write_all(b"#!/bin/sh\nexit 0\n").unwrap();
    writer
        .start_file("ffmpeg-master-latest/LICENSE.txt", options)
        .unwrap();
    writer.write_all(b"license text").unwrap();
    writer.finish().unwrap().into_inner()
}

/// Provider handing out a prepared tool set
pub struct StaticTools(pub ToolSet);

#[async_trait]
impl ToolProvider for StaticTools {
    async fn ensure(&self, _root: &Path) -> Result<ToolSet> {
        Ok(self.0.clone())
    }
}

/// Orchestrator running a fake extractor through the real process runner
pub struct Harness {
    pub orchestrator: DownloadOrchestrator,
    pub destination: PathBuf,
    pub transcoder_bin_dir: PathBuf,
    _temp_dir: TempDir,
}

impl Harness {
    pub fn new(script_body: &str) -> Self {
        let temp_dir = tempfile::tempdir().unwrap();
        let destination = temp_dir.path().join("library");
        std::fs::create_dir_all(&destination).unwrap();
        let transcoder_bin_dir = temp_dir.path().join("tools/bin/ffmpeg/bin");
        std::fs::create_dir_all(&transcoder_bin_dir).unwrap();
        let extractor_path = write_fake_extractor(&temp_dir.path().join("tools/bin"), script_body);

        let config = test_config(temp_dir.path());
        let launcher = Arc::new(ProcessRunner::new(config.process.clone()));
        let provider = Arc::new(StaticTools(ToolSet {
            extractor_path,
            transcoder_bin_dir: transcoder_bin_dir.clone(),
        }));

        Self {
            orchestrator: DownloadOrchestrator::with_components(config, provider, launcher),
            destination,
            transcoder_bin_dir,
            _temp_dir: temp_dir,
        }
    }

    pub fn request(&self, profile: FormatProfile) -> DownloadRequest {
        DownloadRequest::new(PLAYLIST_URL, profile, &self.destination)
    }

    /// Lines the recording extractor wrote to `name` in the destination
    pub fn recorded(&self, name: &str) -> Vec<String> {
        std::fs::read_to_string(self.destination.join(name))
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }
}

/// Config rooted in `root` with a short kill grace period
pub fn test_config(root: &Path) -> Config {
    let mut config = Config::default();
    config.tools.install_root = root.join("tools");
    config.process.kill_grace_period = Duration::from_millis(500);
    config
}
