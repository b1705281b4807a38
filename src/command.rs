//! Extraction tool command construction
//!
//! [`CommandBuilder::build`] is pure: the same request, tools and inherited `PATH`
//! always produce the same [`CommandSpec`]. Nothing here touches the filesystem or
//! the environment of the calling process.

use crate::config::OutputConfig;
use crate::types::{DownloadRequest, FormatProfile, ToolSet};
use std::collections::BTreeMap;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

#[cfg(windows)]
const PATH_SEPARATOR: &str = ";";
#[cfg(not(windows))]
const PATH_SEPARATOR: &str = ":";

/// Output layout handed to the extraction tool, relative to the destination folder
const OUTPUT_TEMPLATE: &str = "%(playlist_title)s/%(playlist_index)s - %(title)s.%(ext)s";

/// Everything needed to launch the extraction tool once
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandSpec {
    /// Executable to run
    pub executable: PathBuf,
    /// Arguments, URL last
    pub args: Vec<String>,
    /// Environment overrides applied to the child only
    pub env: BTreeMap<OsString, OsString>,
    /// Working directory of the child
    pub working_dir: PathBuf,
}

impl CommandSpec {
    /// Human-readable command line for the run log
    pub fn display_line(&self) -> String {
        std::iter::once(self.executable.to_string_lossy().into_owned())
            .chain(self.args.iter().cloned())
            .map(|part| {
                if part.is_empty() || part.contains(char::is_whitespace) {
                    format!("\"{part}\"")
                } else {
                    part
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Builds extraction tool invocations from download requests
#[derive(Clone, Debug)]
pub struct CommandBuilder {
    ledger_file_name: String,
    inherited_path: Option<OsString>,
}

impl CommandBuilder {
    /// Builder with an explicit ledger file name and inherited search path
    pub fn new(ledger_file_name: impl Into<String>, inherited_path: Option<OsString>) -> Self {
        Self {
            ledger_file_name: ledger_file_name.into(),
            inherited_path,
        }
    }

    /// Builder capturing the current process `PATH` once
    pub fn from_env(config: &OutputConfig) -> Self {
        Self::new(config.ledger_file_name.clone(), std::env::var_os("PATH"))
    }

    /// Command line, environment and working directory for `request`
    pub fn build(&self, request: &DownloadRequest, tools: &ToolSet) -> CommandSpec {
        let destination = &request.destination_folder;
        let mut args: Vec<String> = format_args_for(request.format_profile)
            .iter()
            .map(|arg| arg.to_string())
            .collect();

        args.push("--newline".into());
        args.push("-o".into());
        args.push(lossy(&destination.join(OUTPUT_TEMPLATE)));
        args.push("--download-archive".into());
        args.push(lossy(&destination.join(&self.ledger_file_name)));
        if !request.overwrite_existing {
            args.push("--no-overwrites".into());
        }
        args.push(request.url.clone());

        let mut env = BTreeMap::new();
        env.insert(
            OsString::from("PATH"),
            self.path_with(tools.transcoder_bin_dir.as_os_str()),
        );

        CommandSpec {
            executable: tools.extractor_path.clone(),
            args,
            env,
            working_dir: destination.clone(),
        }
    }

    fn path_with(&self, dir: &OsStr) -> OsString {
        match &self.inherited_path {
            Some(inherited) if !inherited.is_empty() => {
                let mut path = inherited.clone();
                path.push(PATH_SEPARATOR);
                path.push(dir);
                path
            }
            _ => dir.to_os_string(),
        }
    }
}

fn format_args_for(profile: FormatProfile) -> &'static [&'static str] {
    match profile {
        FormatProfile::Video => &[
            "-f",
            "bestvideo+bestaudio",
            "--merge-output-format",
            "mp4",
            "--embed-thumbnail",
            "--embed-metadata",
        ],
        FormatProfile::Audio => &["-x", "--audio-format", "mp3", "--embed-thumbnail"],
    }
}

fn lossy(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
