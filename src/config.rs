//! Configuration loading and management

use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{anyhow, Context, Result};

use crate::classifier::ListenOptions;
use crate::presentation::DisplayMode;

/// Model used when no location is configured
pub const DEFAULT_MODEL_URL: &str = "https://teachablemachine.withgoogle.com/models/zrw3Yrg6Z/";

/// Application-level score a top label must exceed to become the current command
pub const DEFAULT_CONFIRM_THRESHOLD: f32 = 0.75;

const ENV_PREFIX: &str = "COMMAND_LISTENER_";

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Base location holding `model.json` and `metadata.json`
    pub model_url: String,

    /// Path to the Unix domain socket for IPC
    pub socket_path: PathBuf,

    /// Directory for runtime data
    pub data_dir: PathBuf,

    /// Score the arg-max label must exceed before it is announced
    pub confirm_threshold: f32,

    /// Streaming options handed to the classifier on start
    pub listen: ListenOptions,

    /// How per-label probabilities are rendered
    pub display_mode: DisplayMode,

    /// Capture device probed for permission before each session
    pub capture_device: Option<PathBuf>,

    /// Start listening as soon as the daemon is up
    pub autostart: bool,
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

        let data_dir = match var("DATA_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => {
                let home = lookup("HOME").context("HOME is not set")?;
                PathBuf::from(home)
                    .join(".local")
                    .join("share")
                    .join("command-listener")
            }
        };

        let socket_path = var("SOCKET")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("daemon.sock"));

        let defaults = ListenOptions::default();
        let listen = ListenOptions {
            include_spectrogram: defaults.include_spectrogram,
            probability_threshold: parse_var(&var, "PROBABILITY_THRESHOLD")?
                .unwrap_or(defaults.probability_threshold),
            invoke_callback_on_noise_and_unknown: parse_bool_var(&var, "INCLUDE_NOISE")?
                .unwrap_or(defaults.invoke_callback_on_noise_and_unknown),
            overlap_factor: parse_var(&var, "OVERLAP_FACTOR")?.unwrap_or(defaults.overlap_factor),
        };

        let confirm_threshold =
            parse_var(&var, "CONFIRM_THRESHOLD")?.unwrap_or(DEFAULT_CONFIRM_THRESHOLD);
        if !(0.0..=1.0).contains(&confirm_threshold) {
            return Err(anyhow!(
                "{ENV_PREFIX}CONFIRM_THRESHOLD must be within [0, 1], got {confirm_threshold}"
            ));
        }

        Ok(Self {
            model_url: var("MODEL_URL").unwrap_or_else(|| DEFAULT_MODEL_URL.to_string()),
            socket_path,
            data_dir,
            confirm_threshold,
            listen,
            display_mode: parse_var(&var, "DISPLAY")?.unwrap_or_default(),
            capture_device: var("CAPTURE_DEVICE").map(PathBuf::from),
            autostart: parse_bool_var(&var, "AUTOSTART")?.unwrap_or(true),
        })
    }

    /// Ensure data directory exists
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)
            .with_context(|| format!("failed to create {}", self.data_dir.display()))?;
        Ok(())
    }
}

fn parse_var<T, F>(var: &F, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    var(name)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| anyhow!("invalid {ENV_PREFIX}{name}={raw:?}: {e}"))
        })
        .transpose()
}

fn parse_bool_var<F>(var: &F, name: &str) -> Result<Option<bool>>
where
    F: Fn(&str) -> Option<String>,
{
    var(name)
        .map(|raw| match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(anyhow!("invalid {ENV_PREFIX}{name}={raw:?}: expected a boolean")),
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_config_defaults() {
        let config = Config::from_lookup(lookup(&[("HOME", "/home/tester")])).unwrap();
        assert_eq!(config.model_url, DEFAULT_MODEL_URL);
        assert!(config.socket_path.to_string_lossy().contains("command-listener"));
        assert_eq!(config.confirm_threshold, 0.75);
        assert_eq!(config.listen.probability_threshold, 0.7);
        assert_eq!(config.listen.overlap_factor, 0.5);
        assert!(config.listen.invoke_callback_on_noise_and_unknown);
        assert!(!config.listen.include_spectrogram);
        assert_eq!(config.display_mode, DisplayMode::Bars);
        assert!(config.capture_device.is_none());
        assert!(config.autostart);
    }

    #[test]
    fn test_config_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("HOME", "/home/tester"),
            ("COMMAND_LISTENER_MODEL_URL", "/srv/models/yes-no"),
            ("COMMAND_LISTENER_SOCKET", "/tmp/listener.sock"),
            ("COMMAND_LISTENER_CONFIRM_THRESHOLD", "0.9"),
            ("COMMAND_LISTENER_INCLUDE_NOISE", "off"),
            ("COMMAND_LISTENER_DISPLAY", "text"),
            ("COMMAND_LISTENER_CAPTURE_DEVICE", "/dev/snd/pcmC0D0c"),
            ("COMMAND_LISTENER_AUTOSTART", "0"),
        ]))
        .unwrap();

        assert_eq!(config.model_url, "/srv/models/yes-no");
        assert_eq!(config.socket_path, PathBuf::from("/tmp/listener.sock"));
        assert_eq!(config.confirm_threshold, 0.9);
        assert!(!config.listen.invoke_callback_on_noise_and_unknown);
        assert_eq!(config.display_mode, DisplayMode::Text);
        assert_eq!(
            config.capture_device,
            Some(PathBuf::from("/dev/snd/pcmC0D0c"))
        );
        assert!(!config.autostart);
    }

    #[test]
    fn test_config_rejects_bad_values() {
        let err = Config::from_lookup(lookup(&[
            ("HOME", "/home/tester"),
            ("COMMAND_LISTENER_OVERLAP_FACTOR", "lots"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("OVERLAP_FACTOR"));

        let err = Config::from_lookup(lookup(&[
            ("HOME", "/home/tester"),
            ("COMMAND_LISTENER_CONFIRM_THRESHOLD", "1.5"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("CONFIRM_THRESHOLD"));
    }

    #[test]
    fn test_config_data_dir_without_home() {
        let config = Config::from_lookup(lookup(&[(
            "COMMAND_LISTENER_DATA_DIR",
            "/var/lib/command-listener",
        )]))
        .unwrap();
        assert_eq!(
            config.socket_path,
            PathBuf::from("/var/lib/command-listener/daemon.sock")
        );
    }
}
