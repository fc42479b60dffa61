use std::path::Path;
use std::str::FromStr;

use image::Rgba;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::components::history::DEFAULT_UNDO_LIMIT;
use crate::components::tools::Tool;
use crate::error::ConfigError;

/// Options that steer the tools of an [`crate::EditorSession`].
///
/// Serializable for embedding in host settings, and also readable from the
/// plain `key=value` settings text used by [`ToolConfig::load`] /
/// [`ToolConfig::save`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    pub tool: Tool,
    /// Selection brush/eraser diameter in image pixels.
    pub brush_size: u32,
    pub draw_color: [u8; 3],
    /// Pen/shape/clone stroke width in image pixels.
    pub draw_size: u32,
    pub opacity: f32,
    pub filled: bool,
    pub eraser_restores: bool,
    pub magnetic_lasso: bool,
    pub snap_radius: u32,
    pub edge_low_threshold: u32,
    pub edge_high_threshold: u32,
    pub smoothing_factor: f32,
    /// Degrees per wheel notch when rotating the view.
    pub rotation_step: u32,
    pub undo_limit: usize,
    /// Brush edge softness, 0 (soft) to 1 (hard).
    pub hardness: f32,
    /// Steady-hand stamp interval as a fraction of the brush size.
    pub stamp_spacing: f32,
    /// Flood fill tolerance on the 0..255 channel scale.
    pub fill_tolerance: f32,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            tool: Tool::Brush,
            brush_size: 20,
            draw_color: [255, 0, 0],
            draw_size: 4,
            opacity: 1.0,
            filled: false,
            eraser_restores: false,
            magnetic_lasso: false,
            snap_radius: 12,
            edge_low_threshold: 50,
            edge_high_threshold: 150,
            smoothing_factor: 0.005,
            rotation_step: 15,
            undo_limit: DEFAULT_UNDO_LIMIT,
            hardness: 0.75,
            stamp_spacing: 0.25,
            fill_tolerance: 32.0,
        }
    }
}

impl ToolConfig {
    /// Opaque drawing colour.
    pub fn draw_rgba(&self) -> Rgba<u8> {
        let [r, g, b] = self.draw_color;
        Rgba([r, g, b, 255])
    }

    /// Copy with every value forced into its legal range.
    pub fn sanitized(&self) -> Self {
        let finite_or = |v: f32, fallback: f32| if v.is_finite() { v } else { fallback };
        let defaults = Self::default();
        let low = self.edge_low_threshold.min(self.edge_high_threshold);
        let high = self.edge_low_threshold.max(self.edge_high_threshold);
        Self {
            tool: self.tool,
            brush_size: self.brush_size.max(1),
            draw_color: self.draw_color,
            draw_size: self.draw_size.max(1),
            opacity: finite_or(self.opacity, defaults.opacity).clamp(0.0, 1.0),
            filled: self.filled,
            eraser_restores: self.eraser_restores,
            magnetic_lasso: self.magnetic_lasso,
            snap_radius: self.snap_radius,
            edge_low_threshold: low,
            edge_high_threshold: high,
            smoothing_factor: finite_or(self.smoothing_factor, defaults.smoothing_factor).max(0.0),
            rotation_step: self.rotation_step,
            undo_limit: self.undo_limit.max(1),
            hardness: finite_or(self.hardness, defaults.hardness).clamp(0.0, 1.0),
            stamp_spacing: finite_or(self.stamp_spacing, defaults.stamp_spacing).max(0.01),
            fill_tolerance: finite_or(self.fill_tolerance, defaults.fill_tolerance).clamp(0.0, 255.0),
        }
    }

    /// Settings text, one `key=value` per line.
    pub fn to_cfg_string(&self) -> String {
        let [r, g, b] = self.draw_color;
        format!(
            "tool={}\n\
             brush_size={}\n\
             draw_color={r},{g},{b}\n\
             draw_size={}\n\
             opacity={}\n\
             filled={}\n\
             eraser_restores={}\n\
             magnetic_lasso={}\n\
             snap_radius={}\n\
             edge_low_threshold={}\n\
             edge_high_threshold={}\n\
             smoothing_factor={}\n\
             rotation_step={}\n\
             undo_limit={}\n\
             hardness={}\n\
             stamp_spacing={}\n\
             fill_tolerance={}\n",
            self.tool.name(),
            self.brush_size,
            self.draw_size,
            self.opacity,
            self.filled,
            self.eraser_restores,
            self.magnetic_lasso,
            self.snap_radius,
            self.edge_low_threshold,
            self.edge_high_threshold,
            self.smoothing_factor,
            self.rotation_step,
            self.undo_limit,
            self.hardness,
            self.stamp_spacing,
            self.fill_tolerance,
        )
    }

    /// Parse settings text. Missing keys keep their defaults, unknown keys
    /// and `#` comments are skipped.
    pub fn from_cfg_str(content: &str) -> Result<Self, ConfigError> {
        let mut s = Self::default();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, val)) = line.split_once('=') else { continue };
            let key = key.trim();
            let val = val.trim();
            match key {
                "tool" => s.tool = Tool::from_name(val).ok_or_else(|| ConfigError::UnknownTool(val.to_string()))?,
                "brush_size" => s.brush_size = parse(key, val)?,
                "draw_color" => s.draw_color = parse_rgb(key, val)?,
                "draw_size" => s.draw_size = parse(key, val)?,
                "opacity" => s.opacity = parse(key, val)?,
                "filled" => s.filled = parse(key, val)?,
                "eraser_restores" => s.eraser_restores = parse(key, val)?,
                "magnetic_lasso" => s.magnetic_lasso = parse(key, val)?,
                "snap_radius" => s.snap_radius = parse(key, val)?,
                "edge_low_threshold" => s.edge_low_threshold = parse(key, val)?,
                "edge_high_threshold" => s.edge_high_threshold = parse(key, val)?,
                "smoothing_factor" => s.smoothing_factor = parse(key, val)?,
                "rotation_step" => s.rotation_step = parse(key, val)?,
                "undo_limit" => s.undo_limit = parse(key, val)?,
                "hardness" => s.hardness = parse(key, val)?,
                "stamp_spacing" => s.stamp_spacing = parse(key, val)?,
                "fill_tolerance" => s.fill_tolerance = parse(key, val)?,
                _ => debug!(key, "ignoring unknown config key"),
            }
        }
        Ok(s)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_cfg_str(&content)?;
        info!(path = %path.display(), "loaded tool config");
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_cfg_string())?;
        info!(path = %path.display(), "saved tool config");
        Ok(())
    }
}

fn parse<T: FromStr>(key: &str, val: &str) -> Result<T, ConfigError> {
    val.parse().map_err(|_| ConfigError::invalid(key, val))
}

fn parse_rgb(key: &str, val: &str) -> Result<[u8; 3], ConfigError> {
    let parts: Vec<&str> = val.split(',').map(str::trim).collect();
    let [r, g, b] = parts.as_slice() else {
        return Err(ConfigError::invalid(key, val));
    };
    Ok([parse(key, r)?, parse(key, g)?, parse(key, b)?])
}
