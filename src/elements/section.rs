//! Section properties for frame elements

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::error::{FrameError, FrameResult};

/// Cross-section properties for frame elements
///
/// Bending about local y uses `iy` with the extreme fiber at `depth / 2`;
/// bending about local z uses `iz` with the extreme fiber at `width / 2`
/// (or `depth / 2` when no width is given). Round sections have no corner
/// fiber, so their bending stress comes from the resultant moment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    /// Cross-sectional area
    pub a: f64,
    /// Moment of inertia about local y-axis (strong axis)
    pub iy: f64,
    /// Moment of inertia about local z-axis (weak axis)
    pub iz: f64,
    /// Torsional constant
    pub j: f64,
    /// Depth of section, used for stress recovery
    pub depth: f64,
    /// Width of section (optional)
    #[serde(default)]
    pub width: Option<f64>,
    /// Solid or hollow circular shape
    #[serde(default)]
    pub round: bool,
}

impl Section {
    /// Create a new section with basic properties
    pub fn new(a: f64, iy: f64, iz: f64, j: f64, depth: f64) -> Self {
        Self {
            a,
            iy,
            iz,
            j,
            depth,
            width: None,
            round: false,
        }
    }

    pub fn with_width(mut self, width: f64) -> Self {
        self.width = Some(width);
        self
    }

    /// Mark the section as circular for stress recovery
    pub fn with_round(mut self) -> Self {
        self.round = true;
        self
    }

    /// Create a rectangular section
    pub fn rectangular(width: f64, depth: f64) -> Self {
        let a = width * depth;
        let iy = width * depth.powi(3) / 12.0;
        let iz = depth * width.powi(3) / 12.0;

        // Torsional constant for rectangle (approximate)
        let (long, short) = if width > depth { (width, depth) } else { (depth, width) };
        let j = long * short.powi(3) / 3.0 * (1.0 - 0.63 * short / long);

        Self::new(a, iy, iz, j, depth).with_width(width)
    }

    /// Create a circular section
    pub fn circular(diameter: f64) -> Self {
        let r = diameter / 2.0;
        let a = PI * r.powi(2);
        let i = PI * r.powi(4) / 4.0;
        let j = PI * r.powi(4) / 2.0;
        Self::new(a, i, i, j, diameter).with_width(diameter).with_round()
    }

    /// Create a hollow circular (pipe) section
    pub fn pipe(outer_diameter: f64, wall_thickness: f64) -> Self {
        let r_o = outer_diameter / 2.0;
        let r_i = r_o - wall_thickness;

        let a = PI * (r_o.powi(2) - r_i.powi(2));
        let i = PI * (r_o.powi(4) - r_i.powi(4)) / 4.0;
        let j = PI * (r_o.powi(4) - r_i.powi(4)) / 2.0;
        Self::new(a, i, i, j, outer_diameter)
            .with_width(outer_diameter)
            .with_round()
    }

    /// Create a wide flange (I-beam) section
    ///
    /// # Arguments
    /// * `depth` - Total depth of section
    /// * `flange_width` - Width of flange
    /// * `flange_thickness` - Thickness of flange
    /// * `web_thickness` - Thickness of web
    pub fn wide_flange(
        depth: f64,
        flange_width: f64,
        flange_thickness: f64,
        web_thickness: f64,
    ) -> Self {
        let bf = flange_width;
        let tf = flange_thickness;
        let tw = web_thickness;
        let d = depth;
        let hw = d - 2.0 * tf;

        let a = 2.0 * bf * tf + hw * tw;
        let iy = (bf * d.powi(3) - (bf - tw) * hw.powi(3)) / 12.0;
        let iz = (2.0 * tf * bf.powi(3) + hw * tw.powi(3)) / 12.0;
        // Open thin-walled approximation
        let j = (2.0 * bf * tf.powi(3) + hw * tw.powi(3)) / 3.0;

        Self::new(a, iy, iz, j, d).with_width(bf)
    }

    /// Create a box/tube section
    pub fn box_section(width: f64, depth: f64, wall_thickness: f64) -> Self {
        let t = wall_thickness;
        let b = width;
        let d = depth;
        let bi = b - 2.0 * t;
        let di = d - 2.0 * t;

        let a = b * d - bi * di;
        let iy = (b * d.powi(3) - bi * di.powi(3)) / 12.0;
        let iz = (d * b.powi(3) - di * bi.powi(3)) / 12.0;

        // Bredt's formula for closed thin-walled sections
        let am = (b - t) * (d - t);
        let s = 2.0 * (b + d) - 4.0 * t;
        let j = 4.0 * am.powi(2) * t / s;

        Self::new(a, iy, iz, j, d).with_width(b)
    }

    /// Distance from the neutral axis to the extreme fiber for bending about local y
    pub fn c_strong(&self) -> f64 {
        self.depth / 2.0
    }

    /// Distance from the neutral axis to the extreme fiber for bending about local z
    pub fn c_weak(&self) -> f64 {
        self.width.unwrap_or(self.depth) / 2.0
    }

    pub(crate) fn validate(&self, id: &str) -> FrameResult<()> {
        let checks = [
            (self.a, "area must be positive"),
            (self.iy, "moment of inertia Iy must be positive"),
            (self.iz, "moment of inertia Iz must be positive"),
            (self.j, "torsional constant must be positive"),
            (self.depth, "section depth must be positive"),
        ];
        for (value, constraint) in checks {
            if !(value.is_finite() && value > 0.0) {
                return Err(FrameError::validation(id, constraint));
            }
        }
        if let Some(width) = self.width {
            if !(width.is_finite() && width > 0.0) {
                return Err(FrameError::validation(id, "section width must be positive"));
            }
        }
        Ok(())
    }
}
