#![allow(dead_code)]

use lopdf::Document as LopdfDocument;
use pgfkit::online::{ScriptedChannel, Session, SessionConfig};
use pgfkit::types::EngineProfile;
use std::path::Path;
use std::time::Duration;

pub type TestResult = Result<(), Box<dyn std::error::Error>>;

/// Runtime for driving async APIs from plain `#[test]` functions.
pub fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("test runtime")
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Bounds small enough that scripted sessions fail fast.
pub fn quick_config() -> SessionConfig {
    SessionConfig::default()
        .with_read_timeout(Duration::from_secs(2))
        .with_shutdown_grace(Duration::from_secs(2))
}

/// A session over `channel` using the plain TeX profile.
pub async fn scripted_session(channel: ScriptedChannel) -> Session<ScriptedChannel> {
    Session::with_channel(channel, EngineProfile::plain_tex(), quick_config())
        .await
        .expect("scripted session opens")
}

/// True when `command` is on `PATH` and the engine can find PGF.
///
/// Tests that need a real engine return early when this is false.
pub fn engine_with_pgf(command: &str) -> bool {
    let on_path = std::env::var_os("PATH")
        .map(|paths| std::env::split_paths(&paths).any(|dir| dir.join(command).is_file()))
        .unwrap_or(false);
    if !on_path {
        eprintln!("skipping: '{}' not found on PATH", command);
        return false;
    }
    let pgf = std::process::Command::new("kpsewhich")
        .arg("pgfcore.tex")
        .output()
        .map(|o| o.status.success() && !o.stdout.is_empty())
        .unwrap_or(false);
    if !pgf {
        eprintln!("skipping: pgfcore.tex not installed");
    }
    pgf
}

/// Wrapper around a generated PDF with helper methods
pub struct GeneratedPdf {
    pub bytes: Vec<u8>,
    pub doc: LopdfDocument,
}

impl GeneratedPdf {
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, Box<dyn std::error::Error>> {
        let doc = LopdfDocument::load_mem(&bytes)?;
        Ok(Self { bytes, doc })
    }

    pub fn from_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        Self::from_bytes(std::fs::read(path)?)
    }

    pub fn page_count(&self) -> usize {
        self.doc.get_pages().len()
    }

    /// `[llx, lly, urx, ury]` of the first page.
    pub fn media_box(&self) -> Result<[f32; 4], Box<dyn std::error::Error>> {
        let (_, page_id) = self.doc.get_pages().into_iter().next().ok_or("no pages")?;
        let page = self.doc.get_dictionary(page_id)?;
        let values = page.get(b"MediaBox")?.as_array()?;
        let mut out = [0.0f32; 4];
        for (slot, value) in out.iter_mut().zip(values) {
            *slot = value.as_float()?;
        }
        Ok(out)
    }
}
