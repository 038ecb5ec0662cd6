#![allow(dead_code)]

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::Mutex,
    time::{Duration, SystemTime},
};

use image::{
    DynamicImage, ImageBuffer, Rgb,
    codecs::png::{CompressionType, FilterType, PngEncoder},
};
use imguard_core::{
    EncodeError, Encoder, OutcomeReporter, OutputFormat, PipelineSettings,
    RetrySettings, TransformOutcome, transformer::is_pipeline_artifact,
};

/// Strips trailing zero bytes, so padding is the only thing that
/// "compresses" and a second pass finds nothing left to remove. Files
/// starting with `BAD` are rejected as malformed, `ERR` as an encoder
/// failure.
#[derive(Debug, Default)]
pub struct TrimPadding;

impl Encoder for TrimPadding {
    fn encode(
        &self,
        source: &Path,
        _: OutputFormat,
    ) -> Result<Vec<u8>, EncodeError> {
        let mut bytes = std::fs::read(source)
            .map_err(|err| EncodeError::Other(err.to_string()))?;
        if bytes.starts_with(b"BAD") {
            return Err(EncodeError::Decode("corrupt header".into()));
        }
        if bytes.starts_with(b"ERR") {
            return Err(EncodeError::Other("encoder exploded".into()));
        }
        while bytes.last() == Some(&0) {
            bytes.pop();
        }
        Ok(bytes)
    }
}

/// Blocks for a while before answering.
#[derive(Debug)]
pub struct Slow(pub Duration);

impl Encoder for Slow {
    fn encode(
        &self,
        _: &Path,
        _: OutputFormat,
    ) -> Result<Vec<u8>, EncodeError> {
        std::thread::sleep(self.0);
        Ok(vec![1])
    }
}

#[derive(Debug, Default)]
pub struct Collecting {
    pub seen: Mutex<Vec<(PathBuf, TransformOutcome, bool)>>,
}

impl OutcomeReporter for Collecting {
    fn file_finished(
        &self,
        path: &Path,
        outcome: &TransformOutcome,
        dry_run: bool,
    ) {
        self.seen
            .lock()
            .unwrap()
            .push((path.to_path_buf(), outcome.clone(), dry_run));
    }
}

pub fn fast_settings() -> PipelineSettings {
    PipelineSettings {
        retry: RetrySettings {
            max_attempts: 2,
            backoff_base_ms: 1,
        },
        tune_encoder_threads: false,
        ..Default::default()
    }
}

pub fn write(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, bytes).unwrap();
    path
}

pub fn padded(body: &[u8], padding: usize) -> Vec<u8> {
    let mut bytes = body.to_vec();
    bytes.extend(std::iter::repeat_n(0u8, padding));
    bytes
}

pub type Snapshot = BTreeMap<PathBuf, (Vec<u8>, SystemTime)>;

/// Content and mtime of every file under `dir`, keyed by relative path.
pub fn snapshot(dir: &Path) -> Snapshot {
    let mut files = BTreeMap::new();
    collect(dir, dir, &mut files);
    files
}

fn collect(root: &Path, dir: &Path, out: &mut Snapshot) {
    for entry in std::fs::read_dir(dir).unwrap() {
        let path = entry.unwrap().path();
        if path.is_dir() {
            collect(root, &path, out);
        } else {
            let meta = std::fs::metadata(&path).unwrap();
            out.insert(
                path.strip_prefix(root).unwrap().to_path_buf(),
                (std::fs::read(&path).unwrap(), meta.modified().unwrap()),
            );
        }
    }
}

pub fn leaked_artifacts(dir: &Path) -> Vec<PathBuf> {
    snapshot(dir)
        .into_keys()
        .filter(|path| is_pipeline_artifact(path))
        .collect()
}

/// A PNG written with the cheapest settings, which a best-effort re-encode
/// reliably beats.
pub fn loose_png(width: u32, height: u32) -> Vec<u8> {
    let pixels = ImageBuffer::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x * y) % 256) as u8])
    });
    let image = DynamicImage::ImageRgb8(pixels);
    let mut bytes = Vec::new();
    image
        .write_with_encoder(PngEncoder::new_with_quality(
            &mut bytes,
            CompressionType::Fast,
            FilterType::NoFilter,
        ))
        .unwrap();
    bytes
}
