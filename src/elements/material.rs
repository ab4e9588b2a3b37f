//! Material properties

use serde::{Deserialize, Serialize};

use crate::error::{FrameError, FrameResult};

/// Material properties for structural analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Material {
    /// Modulus of elasticity (Young's modulus)
    pub e: f64,
    /// Shear modulus
    pub g: f64,
    /// Poisson's ratio
    pub nu: f64,
    /// Mass density
    pub rho: f64,
    /// Yield strength (optional)
    #[serde(default)]
    pub fy: Option<f64>,
    /// Characteristic compressive strength (optional, concrete)
    #[serde(default)]
    pub fc: Option<f64>,
}

impl Material {
    /// Create a new material with given properties
    pub fn new(e: f64, g: f64, nu: f64, rho: f64) -> Self {
        Self {
            e,
            g,
            nu,
            rho,
            fy: None,
            fc: None,
        }
    }

    /// Create an isotropic material from E and nu.
    /// G is calculated as E / (2 * (1 + nu))
    pub fn isotropic(e: f64, nu: f64, rho: f64) -> Self {
        let g = e / (2.0 * (1.0 + nu));
        Self::new(e, g, nu, rho)
    }

    /// Attach a yield strength
    pub fn with_yield_strength(mut self, fy: f64) -> Self {
        self.fy = Some(fy);
        self
    }

    /// Attach a compressive strength
    pub fn with_compressive_strength(mut self, fc: f64) -> Self {
        self.fc = Some(fc);
        self
    }

    /// Structural steel in SI units (Pa, kg/m³)
    pub fn steel() -> Self {
        Self::new(200e9, 77e9, 0.3, 7850.0).with_yield_strength(250e6)
    }

    /// Normal-weight concrete in SI units from f'c in Pa.
    /// E = 4700 * sqrt(f'c in MPa) MPa
    pub fn concrete(fc: f64) -> Self {
        let fc_mpa = fc / 1e6;
        let e = 4700.0 * fc_mpa.sqrt() * 1e6;
        Self::isotropic(e, 0.2, 2400.0).with_compressive_strength(fc)
    }

    pub(crate) fn validate(&self, id: &str) -> FrameResult<()> {
        if !(self.e.is_finite() && self.e > 0.0) {
            return Err(FrameError::validation(id, "elastic modulus must be positive"));
        }
        if !(self.g.is_finite() && self.g > 0.0) {
            return Err(FrameError::validation(id, "shear modulus must be positive"));
        }
        if !(self.rho.is_finite() && self.rho >= 0.0) {
            return Err(FrameError::validation(id, "density must be non-negative"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_isotropic_material() {
        let mat = Material::isotropic(200e9, 0.3, 7850.0);
        let expected_g = 200e9 / (2.0 * 1.3);
        assert!((mat.g - expected_g).abs() < 1.0);
    }

    #[test]
    fn test_validation() {
        assert!(Material::steel().validate("S").is_ok());
        let bad = Material::new(0.0, 77e9, 0.3, 7850.0);
        assert!(matches!(
            bad.validate("S"),
            Err(FrameError::Validation { .. })
        ));
    }
}
