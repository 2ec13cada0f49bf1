use crate::audio::PcmLocator;
use crate::session::SessionConfig;
use anyhow::Result;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub audio: AudioConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AudioConfig {
    /// Outbound audio: headerless 16-bit LE mono, or a .wav file
    pub pcm_path: String,
    pub sample_rate: u32,
    pub frame_samples: usize,
    pub frame_interval_ms: u64,
    pub gain: f32,
}

impl Config {
    /// Load defaults, then an optional file at `path`, then `MEDIA_RELAY__*`
    /// environment variables (e.g. `MEDIA_RELAY__AUDIO__GAIN=0.5`)
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .set_default("service.name", "media-relay")?
            .set_default("service.http.bind", "0.0.0.0")?
            .set_default("service.http.port", 3000)?
            .set_default("audio.pcm_path", "audio/outbound.raw")?
            .set_default("audio.sample_rate", 8000)?
            .set_default("audio.frame_samples", 160)?
            .set_default("audio.frame_interval_ms", 20)?
            .set_default("audio.gain", 1.0)?
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("MEDIA_RELAY")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;

        let cfg: Self = settings.try_deserialize()?;
        cfg.validate()?;

        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        let audio = &self.audio;

        if audio.sample_rate == 0 {
            anyhow::bail!("audio.sample_rate must be positive");
        }
        if audio.frame_samples == 0 {
            anyhow::bail!("audio.frame_samples must be positive");
        }
        if audio.frame_interval_ms == 0 {
            anyhow::bail!("audio.frame_interval_ms must be positive");
        }
        if !audio.gain.is_finite() || audio.gain < 0.0 {
            anyhow::bail!("audio.gain must be a finite, non-negative number (got {})", audio.gain);
        }

        Ok(())
    }
}

impl AudioConfig {
    /// Streaming parameters for sessions, reading the PCM file lazily
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            frame_samples: self.frame_samples,
            frame_interval: Duration::from_millis(self.frame_interval_ms),
            gain: self.gain,
            pcm: PcmLocator::file(&self.pcm_path, self.sample_rate),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_without_file() {
        let cfg = Config::load("/nonexistent/media-relay").unwrap();

        assert_eq!(cfg.service.http.port, 3000);
        assert_eq!(cfg.audio.sample_rate, 8000);
        assert_eq!(cfg.audio.frame_samples, 160);
        assert_eq!(cfg.audio.frame_interval_ms, 20);
        assert_eq!(cfg.audio.gain, 1.0);
    }

    #[test]
    fn test_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().prefix("relay").suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[service.http]\nport = 8080\n\n[audio]\npcm_path = \"hold.raw\"\ngain = 0.25"
        )
        .unwrap();

        let path = file.path().with_extension("");
        let cfg = Config::load(path.to_str().unwrap()).unwrap();

        assert_eq!(cfg.service.http.port, 8080);
        assert_eq!(cfg.service.http.bind, "0.0.0.0");
        assert_eq!(cfg.audio.pcm_path, "hold.raw");
        assert_eq!(cfg.audio.gain, 0.25);
        assert_eq!(cfg.audio.frame_samples, 160);
    }

    #[test]
    fn test_validate_rejects_bad_audio_settings() {
        let mut cfg = Config::load("/nonexistent/media-relay").unwrap();
        cfg.audio.frame_samples = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = Config::load("/nonexistent/media-relay").unwrap();
        cfg.audio.gain = f32::NAN;
        assert!(cfg.validate().is_err());

        let mut cfg = Config::load("/nonexistent/media-relay").unwrap();
        cfg.audio.frame_interval_ms = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_session_config_from_audio_settings() {
        let cfg = Config::load("/nonexistent/media-relay").unwrap();
        let session = cfg.audio.session_config();

        assert_eq!(session.frame_samples, 160);
        assert_eq!(session.frame_interval, Duration::from_millis(20));
        assert!(matches!(session.pcm, PcmLocator::File { sample_rate: 8000, .. }));
    }
}
