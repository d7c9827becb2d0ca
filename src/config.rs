//! Tracker configuration.
//!
//! Every tunable lives here. None of the thresholds are universally right;
//! the defaults match the last tuning used on broadcast cricket footage and
//! are meant to be overridden from a TOML file.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TrackerError};

/// How the color mask is merged with the motion-edge mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorFusion {
    /// Color pixels only count when they are also moving.
    #[default]
    Gated,
    /// The raw color mask is OR-ed straight into the motion edges.
    Loose,
}

/// Configuration for the [`TrackingStateMachine`](crate::TrackingStateMachine).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    // candidate filtering
    pub min_area: f64,
    pub aspect_threshold: f64,

    // lifecycle
    pub max_lost: u32,
    pub gate_fraction: f64,
    pub trace_capacity: usize,

    // background model
    pub bg_history: u32,
    pub bg_var_threshold: f32,
    /// Fixed adaptation rate. Unset lets the background model ramp from fast
    /// to `1 / bg_history` over the first frames.
    pub bg_learning_rate: Option<f32>,
    pub motion_open_radius: u8,
    pub motion_dilate_radius: u8,

    // edges and color
    pub blur_sigma: f32,
    pub canny_low: f32,
    pub canny_high: f32,
    /// Hue bounds on the 0..=180 scale.
    pub hue_low: u8,
    pub hue_high: u8,
    pub sat_low: u8,
    pub sat_high: u8,
    pub val_low: u8,
    pub val_high: u8,
    pub color_fusion: ColorFusion,
    pub close_radius: u8,
    /// Radius of an erode/dilate pair run after closing. Shrinks wide
    /// bodies, keeps thin ones.
    pub thin_shape_refine: Option<u8>,

    // optical flow
    pub flow_max_corners: usize,
    pub flow_quality: f32,
    pub flow_min_distance: f32,
    pub flow_min_points: usize,
    pub flow_refresh_interval: u32,
    pub flow_expand: f32,
    pub flow_window: usize,
    pub flow_pyramid_levels: usize,
    pub flow_max_iterations: usize,
    pub flow_epsilon: f32,
    pub flow_affine_min_points: usize,
    pub flow_ransac_threshold: f32,
    pub flow_ransac_iterations: usize,
    /// Mean absolute intensity difference above which a tracked point is dropped.
    pub flow_max_residual: f32,
    pub flow_box_size: u32,

    // estimator
    pub kalman_process_noise: f64,
    pub kalman_measurement_noise: f64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            min_area: 4000.0,
            aspect_threshold: 2.2,
            max_lost: 20,
            gate_fraction: 0.25,
            trace_capacity: 128,
            bg_history: 50,
            bg_var_threshold: 12.0,
            bg_learning_rate: None,
            motion_open_radius: 1,
            motion_dilate_radius: 1,
            blur_sigma: 1.1,
            canny_low: 120.0,
            canny_high: 250.0,
            hue_low: 5,
            hue_high: 25,
            sat_low: 30,
            sat_high: 255,
            val_low: 40,
            val_high: 255,
            color_fusion: ColorFusion::Gated,
            close_radius: 3,
            thin_shape_refine: None,
            flow_max_corners: 150,
            flow_quality: 0.01,
            flow_min_distance: 7.0,
            flow_min_points: 3,
            flow_refresh_interval: 10,
            flow_expand: 1.2,
            flow_window: 15,
            flow_pyramid_levels: 2,
            flow_max_iterations: 10,
            flow_epsilon: 0.03,
            flow_affine_min_points: 10,
            flow_ransac_threshold: 3.0,
            flow_ransac_iterations: 64,
            flow_max_residual: 20.0,
            flow_box_size: 40,
            kalman_process_noise: 0.5,
            kalman_measurement_noise: 5.0,
        }
    }
}

impl TrackerConfig {
    /// Parse a (possibly partial) TOML document; missing keys keep their defaults.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: TrackerConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        fn check(ok: bool, msg: &str) -> Result<()> {
            if ok {
                Ok(())
            } else {
                Err(TrackerError::InvalidConfig(msg.to_owned()))
            }
        }

        check(self.min_area >= 0.0, "min_area must be non-negative")?;
        check(self.aspect_threshold >= 1.0, "aspect_threshold must be >= 1")?;
        check(
            self.gate_fraction > 0.0 && self.gate_fraction <= 1.0,
            "gate_fraction must be in (0, 1]",
        )?;
        check(self.trace_capacity > 0, "trace_capacity must be positive")?;
        check(self.bg_history > 0, "bg_history must be positive")?;
        check(self.bg_var_threshold > 0.0, "bg_var_threshold must be positive")?;
        if let Some(rate) = self.bg_learning_rate {
            check(rate > 0.0 && rate <= 1.0, "bg_learning_rate must be in (0, 1]")?;
        }
        check(self.blur_sigma > 0.0, "blur_sigma must be positive")?;
        check(self.canny_low <= self.canny_high, "canny_low must not exceed canny_high")?;
        check(self.hue_low <= self.hue_high, "hue_low must not exceed hue_high")?;
        check(self.hue_high <= 180, "hue bounds are on the 0..=180 scale")?;
        check(self.sat_low <= self.sat_high, "sat_low must not exceed sat_high")?;
        check(self.val_low <= self.val_high, "val_low must not exceed val_high")?;
        check(self.flow_max_corners > 0, "flow_max_corners must be positive")?;
        check(
            self.flow_quality > 0.0 && self.flow_quality < 1.0,
            "flow_quality must be in (0, 1)",
        )?;
        check(self.flow_min_points > 0, "flow_min_points must be positive")?;
        check(self.flow_refresh_interval > 0, "flow_refresh_interval must be positive")?;
        check(self.flow_expand > 0.0, "flow_expand must be positive")?;
        check(
            self.flow_window >= 3 && self.flow_window % 2 == 1,
            "flow_window must be an odd size >= 3",
        )?;
        check(self.flow_max_iterations > 0, "flow_max_iterations must be positive")?;
        check(
            self.flow_affine_min_points >= 3,
            "flow_affine_min_points must be at least 3",
        )?;
        check(self.flow_ransac_iterations > 0, "flow_ransac_iterations must be positive")?;
        check(self.flow_max_residual > 0.0, "flow_max_residual must be positive")?;
        check(self.flow_box_size > 0, "flow_box_size must be positive")?;
        check(
            self.kalman_process_noise > 0.0 && self.kalman_measurement_noise > 0.0,
            "kalman noise must be positive",
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(TrackerConfig::default().validate().is_ok());
        assert_eq!(TrackerConfig::default().trace_capacity, 128);
    }

    #[test]
    fn test_partial_toml_overrides() {
        let config = TrackerConfig::from_toml_str(
            r#"
            min_area = 150.0
            aspect_threshold = 3.0
            color_fusion = "loose"
            thin_shape_refine = 2
            "#,
        )
        .unwrap();

        assert_eq!(config.min_area, 150.0);
        assert_eq!(config.aspect_threshold, 3.0);
        assert_eq!(config.color_fusion, ColorFusion::Loose);
        assert_eq!(config.thin_shape_refine, Some(2));
        assert_eq!(config.max_lost, 20);
    }

    #[test]
    fn test_rejects_inverted_hue_range() {
        let err = TrackerConfig::from_toml_str("hue_low = 40\nhue_high = 10").unwrap_err();
        assert!(matches!(err, TrackerError::InvalidConfig(_)));
    }

    #[test]
    fn test_rejects_even_flow_window() {
        let config = TrackerConfig {
            flow_window: 14,
            ..TrackerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_color_fusion_defaults_to_gated() {
        assert_eq!(TrackerConfig::default().color_fusion, ColorFusion::Gated);
        let config = TrackerConfig::from_toml_str("color_fusion = \"gated\"").unwrap();
        assert_eq!(config.color_fusion, ColorFusion::Gated);
    }
}
