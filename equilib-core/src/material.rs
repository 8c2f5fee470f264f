//! Material and cross-section property records.
//!
//! Line elements need an isotropic linear elastic material and the section
//! constants of the member.

use crate::error::{Error, Result};

/// Material properties for structural analysis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Material {
    /// Young's modulus.
    pub youngs_modulus: f64,
    /// Poisson's ratio (dimensionless).
    pub poissons_ratio: f64,
    /// Mass density, optional for static analysis.
    pub density: Option<f64>,
}

impl Material {
    /// Create a new isotropic linear elastic material.
    ///
    /// # Errors
    ///
    /// Returns error if material properties are physically invalid.
    pub fn new(youngs_modulus: f64, poissons_ratio: f64) -> Result<Self> {
        if !(youngs_modulus > 0.0) {
            return Err(Error::InvalidMaterial(
                "Young's modulus must be positive".into(),
            ));
        }
        if poissons_ratio <= -1.0 || poissons_ratio >= 0.5 {
            return Err(Error::InvalidMaterial(
                "Poisson's ratio must be in range (-1, 0.5)".into(),
            ));
        }
        Ok(Self {
            youngs_modulus,
            poissons_ratio,
            density: None,
        })
    }

    /// Create a material with density specified.
    pub fn with_density(mut self, density: f64) -> Result<Self> {
        if density <= 0.0 {
            return Err(Error::InvalidMaterial("Density must be positive".into()));
        }
        self.density = Some(density);
        Ok(self)
    }

    /// Shear modulus G = E / (2(1 + ν)).
    pub fn shear_modulus(&self) -> f64 {
        self.youngs_modulus / (2.0 * (1.0 + self.poissons_ratio))
    }

    /// Structural steel (E = 200 GPa, ν = 0.3, ρ = 7850 kg/m³).
    pub fn steel() -> Self {
        Self {
            youngs_modulus: 200e9,
            poissons_ratio: 0.3,
            density: Some(7850.0),
        }
    }
}

/// Cross-section constants of a line member.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Section {
    /// Cross-sectional area.
    pub area: f64,
    /// Second moment of area about the local y axis.
    pub iy: f64,
    /// Second moment of area about the local z axis.
    pub iz: f64,
    /// Torsional constant.
    pub j: f64,
}

impl Section {
    pub fn new(area: f64, iy: f64, iz: f64, j: f64) -> Result<Self> {
        if !(area > 0.0) {
            return Err(Error::InvalidMaterial("section area must be positive".into()));
        }
        if iy < 0.0 || iz < 0.0 || j < 0.0 {
            return Err(Error::InvalidMaterial(
                "section inertia constants must be non-negative".into(),
            ));
        }
        Ok(Self { area, iy, iz, j })
    }

    /// Section carrying axial force only.
    pub fn axial(area: f64) -> Result<Self> {
        Self::new(area, 0.0, 0.0, 0.0)
    }

    /// Solid rectangle `b x h` (h along local z).
    pub fn rectangle(b: f64, h: f64) -> Result<Self> {
        let (short, long) = if b < h { (b, h) } else { (h, b) };
        // Saint-Venant approximation for the torsional constant.
        let j = long * short.powi(3) * (1.0 / 3.0 - 0.21 * short / long * (1.0 - short.powi(4) / (12.0 * long.powi(4))));
        Self::new(b * h, b * h.powi(3) / 12.0, h * b.powi(3) / 12.0, j)
    }
}
