//! Mixing configuration that can be authored alongside skeleton data.

use crate::Error;

/// Crossfade table and default thresholds for new track entries.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct AnimationStateConfig {
    pub default_mix: f32,
    pub event_threshold: f32,
    pub alpha_attachment_threshold: f32,
    pub mix_attachment_threshold: f32,
    pub mix_draw_order_threshold: f32,
    pub mixes: Vec<MixConfig>,
}

impl Default for AnimationStateConfig {
    fn default() -> Self {
        Self {
            default_mix: 0.0,
            event_threshold: 0.0,
            alpha_attachment_threshold: 0.0,
            mix_attachment_threshold: 0.0,
            mix_draw_order_threshold: 0.0,
            mixes: Vec::new(),
        }
    }
}

/// A directed crossfade duration between two named animations.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct MixConfig {
    pub from: String,
    pub to: String,
    pub duration: f32,
}

impl AnimationStateConfig {
    #[cfg(feature = "json")]
    pub fn from_json_str(input: &str) -> Result<Self, Error> {
        serde_json::from_str(input).map_err(|e| Error::Config {
            message: e.to_string(),
        })
    }

    pub(crate) fn validate(&self) -> Result<(), Error> {
        let thresholds = [
            ("default_mix", self.default_mix),
            ("event_threshold", self.event_threshold),
            ("alpha_attachment_threshold", self.alpha_attachment_threshold),
            ("mix_attachment_threshold", self.mix_attachment_threshold),
            ("mix_draw_order_threshold", self.mix_draw_order_threshold),
        ];
        for (field, value) in thresholds {
            if !value.is_finite() || value < 0.0 {
                return Err(Error::invalid(format!(
                    "{field} must be finite and non-negative, got {value}"
                )));
            }
        }
        Ok(())
    }
}
