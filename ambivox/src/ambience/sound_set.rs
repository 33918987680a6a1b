//! JSON sound-set files.
//!
//! ```json
//! {
//!   "loop": { "file": "wind.ogg", "gain": 0.6 },
//!   "channels": 4, "radius": 20.0, "min_delay": 2.0, "max_delay": 8.0,
//!   "random_velocity": true,
//!   "sounds": [
//!     { "file": "bird.wav", "gain": 1.0, "min_pitch": 0.9, "max_pitch": 1.2,
//!       "relative": false, "velocity": 3.0 }
//!   ]
//! }
//! ```

use crate::config::AmbienceDesc;
use crate::error::{AmbivoxError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

fn unit() -> f32 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopEntry {
    pub file: PathBuf,
    #[serde(default = "unit")]
    pub gain: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoundEntry {
    pub file: PathBuf,
    #[serde(default = "unit")]
    pub gain: f32,
    #[serde(default = "unit")]
    pub min_pitch: f32,
    #[serde(default = "unit")]
    pub max_pitch: f32,
    #[serde(default)]
    pub relative: bool,
    #[serde(default)]
    pub velocity: f32,
}

/// Parsed sound-set file. Unset scalars fall back to [`AmbienceDesc`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SoundSet {
    #[serde(rename = "loop", default)]
    pub loop_sound: Option<LoopEntry>,
    #[serde(default)]
    pub channels: Option<usize>,
    #[serde(default)]
    pub radius: Option<f32>,
    #[serde(default)]
    pub min_delay: Option<f32>,
    #[serde(default)]
    pub max_delay: Option<f32>,
    #[serde(default)]
    pub random_velocity: Option<bool>,
    #[serde(default)]
    pub sounds: Vec<SoundEntry>,
    /// Directory relative file names resolve against
    #[serde(skip)]
    pub base_dir: PathBuf,
}

impl SoundSet {
    pub fn from_json_str(text: &str) -> Result<Self> {
        let set: Self = serde_json::from_str(text)?;
        set.validate()?;
        Ok(set)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let mut set = Self::from_json_str(&text)?;
        set.base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Ok(set)
    }

    /// Rejects values the scheduler can't draw from: non-finite numbers,
    /// a non-positive radius or pitch, and negative delays.
    pub fn validate(&self) -> Result<()> {
        if let Some(radius) = self.radius {
            if !radius.is_finite() || radius <= 0.0 {
                return Err(AmbivoxError::Configuration(format!(
                    "Sound set radius must be positive and finite, got {}",
                    radius
                )));
            }
        }
        for (field, delay) in [("min_delay", self.min_delay), ("max_delay", self.max_delay)] {
            if let Some(delay) = delay.filter(|d| !d.is_finite() || *d < 0.0) {
                return Err(AmbivoxError::Configuration(format!(
                    "Sound set {} must be finite and non-negative, got {}",
                    field, delay
                )));
            }
        }
        if let Some(entry) = self.loop_sound.as_ref().filter(|l| !l.gain.is_finite()) {
            return Err(AmbivoxError::Configuration(format!(
                "Gain of loop '{}' must be finite",
                entry.file.display()
            )));
        }
        for sound in &self.sounds {
            let pitch_ok = [sound.min_pitch, sound.max_pitch]
                .iter()
                .all(|p| p.is_finite() && *p > 0.0);
            if !pitch_ok {
                return Err(AmbivoxError::Configuration(format!(
                    "Pitch range of '{}' must be positive and finite",
                    sound.file.display()
                )));
            }
            if !sound.gain.is_finite() || !sound.velocity.is_finite() {
                return Err(AmbivoxError::Configuration(format!(
                    "Gain and velocity of '{}' must be finite",
                    sound.file.display()
                )));
            }
        }
        Ok(())
    }

    /// Resolves `file` against the sound set's directory.
    pub fn resolve(&self, file: &Path) -> PathBuf {
        if file.is_absolute() {
            file.to_path_buf()
        } else {
            self.base_dir.join(file)
        }
    }

    /// Ambience parameters with unset fields taken from `defaults`.
    pub fn settings(&self, defaults: &AmbienceDesc) -> AmbienceDesc {
        AmbienceDesc {
            channels: self.channels.unwrap_or(defaults.channels),
            radius: self.radius.unwrap_or(defaults.radius),
            min_delay: self.min_delay.unwrap_or(defaults.min_delay),
            max_delay: self.max_delay.unwrap_or(defaults.max_delay),
            random_velocity: self.random_velocity.unwrap_or(defaults.random_velocity),
        }
    }
}
