use anyhow::{Context, Result};
use hound::{SampleFormat, WavReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// A fully loaded mono 16-bit PCM source, shared read-only between sessions
#[derive(Debug)]
pub struct PcmSource {
    pub path: String,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    /// Little-endian 16-bit samples
    pub pcm: Arc<[u8]>,
}

impl PcmSource {
    /// Load a PCM source from disk
    ///
    /// `.wav` files are decoded with hound and must be 16-bit integer mono at
    /// `sample_rate`. Anything else is read as headerless little-endian
    /// 16-bit mono samples.
    pub async fn open(path: impl AsRef<Path>, sample_rate: u32) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening PCM source: {}", path.display());

        let is_wav = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("wav"))
            .unwrap_or(false);

        let pcm: Vec<u8> = if is_wav {
            let owned = path.to_path_buf();
            tokio::task::spawn_blocking(move || read_wav(&owned, sample_rate))
                .await
                .context("WAV reader task failed")??
        } else {
            tokio::fs::read(path)
                .await
                .with_context(|| format!("Failed to read PCM file: {}", path.display()))?
        };

        let source = Self::from_bytes(path.display().to_string(), pcm, sample_rate);

        info!(
            "PCM source loaded: {:.2}s, {}Hz, {} bytes",
            source.duration_seconds,
            source.sample_rate,
            source.pcm.len()
        );

        Ok(source)
    }

    /// Wrap an in-memory buffer of little-endian 16-bit samples
    pub fn from_bytes(path: impl Into<String>, mut pcm: Vec<u8>, sample_rate: u32) -> Self {
        if pcm.len() % 2 != 0 {
            warn!("PCM buffer has an odd length; dropping the trailing byte");
            pcm.pop();
        }

        let duration_seconds = (pcm.len() / 2) as f64 / sample_rate.max(1) as f64;

        Self {
            path: path.into(),
            duration_seconds,
            sample_rate,
            pcm: pcm.into(),
        }
    }

    /// Build a source from samples (handy for tests and generated signals)
    pub fn from_samples(path: impl Into<String>, samples: &[i16], sample_rate: u32) -> Self {
        let pcm = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        Self::from_bytes(path, pcm, sample_rate)
    }

    pub fn sample_count(&self) -> usize {
        self.pcm.len() / 2
    }
}

fn read_wav(path: &Path, sample_rate: u32) -> Result<Vec<u8>> {
    let reader = WavReader::open(path)
        .with_context(|| format!("Failed to open WAV file: {}", path.display()))?;

    let spec = reader.spec();
    if spec.channels != 1
        || spec.bits_per_sample != 16
        || spec.sample_format != SampleFormat::Int
        || spec.sample_rate != sample_rate
    {
        anyhow::bail!(
            "Unsupported WAV format in {}: expected {}Hz 16-bit mono, got {}Hz {}-bit {} channels",
            path.display(),
            sample_rate,
            spec.sample_rate,
            spec.bits_per_sample,
            spec.channels
        );
    }

    let samples: Vec<i16> = reader
        .into_samples::<i16>()
        .collect::<Result<Vec<_>, _>>()
        .context("Failed to read WAV samples")?;

    Ok(samples.iter().flat_map(|s| s.to_le_bytes()).collect())
}

/// Where a session gets its outbound audio from
#[derive(Debug, Clone)]
pub enum PcmLocator {
    /// Read from disk on every resolve
    File { path: PathBuf, sample_rate: u32 },
    /// Already loaded and shared
    Loaded(Arc<PcmSource>),
}

impl PcmLocator {
    pub fn file(path: impl Into<PathBuf>, sample_rate: u32) -> Self {
        Self::File {
            path: path.into(),
            sample_rate,
        }
    }

    /// Produce the PCM source, loading it if needed
    pub async fn resolve(&self) -> Result<Arc<PcmSource>> {
        match self {
            Self::File { path, sample_rate } => {
                Ok(Arc::new(PcmSource::open(path, *sample_rate).await?))
            }
            Self::Loaded(source) => Ok(Arc::clone(source)),
        }
    }

    /// Try to load a file locator up front; keep the path if that fails
    pub async fn preload(self) -> Self {
        let Self::File { path, .. } = &self else {
            return self;
        };
        let path = path.clone();

        match self.resolve().await {
            Ok(source) => Self::Loaded(source),
            Err(e) => {
                warn!(
                    "Could not preload PCM source {}: {:#}. Will retry on each start",
                    path.display(),
                    e
                );
                self
            }
        }
    }
}
