//! Shared test utilities and fixtures
//!
//! A fake cm compiler written in `sh`: it prints a prompt, then answers each
//! stdin line according to a few canned rules.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::time::Duration;

use tempfile::TempDir;
use tokio::sync::mpsc::UnboundedReceiver;

use cmbridge_adapter::{AdapterEvent, CompilerAdapter, CompilerConfig};

pub const READY_LINE: &str = "cm> ready";

const FAKE_COMPILER: &str = r#"
echo "cm> ready"
while IFS= read -r l; do
  case "$l" in
    'slow('*) sleep 0.5; echo "slow done" ;;
    'fail('*) echo "FAILED: $l" ;;
    'cm.runtime.refers('*) echo "[DEFINITION:custom/acme/w.cm:3:5]" ;;
    'compileFile('*)
      echo "[ERROR:custom/acme/w.cm:2:3] unknown name"
      echo "[WARNING:custom/acme/w.cm:4:1] unused import"
      echo "[ERROR:custom/acme/w.cm:9] truncated"
      echo "compiled" ;;
    'quitDebug();') echo "debug quit" ;;
    *) echo "got:$l" ;;
  esac
done
"#;

pub struct Fixture {
    pub dir: TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("create temp dir"),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.dir.path().join(relative)
    }

    pub fn write(&self, relative: &str, content: &str) -> PathBuf {
        let path = self.path(relative);
        std::fs::create_dir_all(path.parent().expect("fixture path has parent"))
            .expect("create fixture dir");
        std::fs::write(&path, content).expect("write fixture");
        path
    }

    pub fn config(&self) -> CompilerConfig {
        CompilerConfig {
            program: "sh".into(),
            args: vec!["-c".into(), FAKE_COMPILER.into()],
            cm_root: self.root().to_path_buf(),
            ready_pattern: Some(format!("^{READY_LINE}$")),
            startup_timeout_ms: 5_000,
            output_file: Some(self.path("output.log")),
            clean_program: "sh".into(),
            clean_args: vec!["-c".into(), "echo removed build".into()],
            ..CompilerConfig::default()
        }
    }

    pub fn adapter(&self) -> (CompilerAdapter, UnboundedReceiver<AdapterEvent>) {
        CompilerAdapter::new(self.config())
    }
}

/// Everything currently queued, without waiting.
pub fn drain(rx: &mut UnboundedReceiver<AdapterEvent>) -> Vec<AdapterEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Collect events until `line` is output. Panics after five seconds.
pub async fn until_output(rx: &mut UnboundedReceiver<AdapterEvent>, line: &str) -> Vec<AdapterEvent> {
    let mut events = Vec::new();
    let collect = async {
        while let Some(event) = rx.recv().await {
            let done = matches!(&event, AdapterEvent::Output(l) if l == line);
            events.push(event);
            if done {
                return;
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(5), collect)
        .await
        .unwrap_or_else(|_| panic!("no output line {line:?}"));
    events
}

pub fn output_lines(events: &[AdapterEvent]) -> Vec<&str> {
    events
        .iter()
        .filter_map(|e| match e {
            AdapterEvent::Output(line) => Some(line.as_str()),
            _ => None,
        })
        .collect()
}
