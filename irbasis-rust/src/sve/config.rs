//! Generator configuration

use crate::error::{Error, Result};

/// Parameters of the adaptive basis generation.
#[derive(Debug, Clone)]
pub struct SveConfig {
    /// Upper bound on the basis size, at least 1
    pub max_dim: usize,
    /// Relative singular-value cutoff in (0, 1]; generation stops once
    /// sigma_l / sigma_0 falls below it
    pub sv_cutoff: f64,
    /// Relative tolerance driving the partition refinement
    pub r_tol: f64,
    /// Number of local Legendre polynomials per section, at least 2
    pub num_local_poly: usize,
    /// Gauss-Legendre nodes per section, at least `num_local_poly`
    pub num_gl_nodes: usize,
    /// Working precision of the decomposition in bits
    pub work_precision: usize,
    /// Safety bound on the number of refinement passes
    pub max_refinements: usize,
}

impl SveConfig {
    /// Configuration with the default discretization parameters.
    pub fn new(max_dim: usize, sv_cutoff: f64, r_tol: f64) -> Self {
        Self {
            max_dim,
            sv_cutoff,
            r_tol,
            num_local_poly: 10,
            num_gl_nodes: 24,
            work_precision: 128,
            max_refinements: 30,
        }
    }

    /// Check parameter ranges.
    pub fn validate(&self) -> Result<()> {
        if self.max_dim < 1 {
            return Err(Error::Config("max_dim must be at least 1".into()));
        }
        if !(self.sv_cutoff > 0.0) {
            return Err(Error::Config(format!(
                "sv_cutoff must be positive, got {}",
                self.sv_cutoff
            )));
        }
        if !(self.r_tol > 0.0) {
            return Err(Error::Config(format!(
                "r_tol must be positive, got {}",
                self.r_tol
            )));
        }
        if self.num_local_poly < 2 {
            return Err(Error::Config(format!(
                "num_local_poly must be at least 2, got {}",
                self.num_local_poly
            )));
        }
        if self.num_gl_nodes < self.num_local_poly {
            return Err(Error::Config(format!(
                "num_gl_nodes ({}) must not be smaller than num_local_poly ({})",
                self.num_gl_nodes, self.num_local_poly
            )));
        }
        if self.work_precision < 64 {
            return Err(Error::Config(format!(
                "work_precision of {} bits is below the 64-bit minimum",
                self.work_precision
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(SveConfig::new(30, 1e-10, 1e-6).validate().is_ok());
    }

    #[test]
    fn out_of_range_parameters_are_rejected() {
        assert!(SveConfig::new(0, 1e-10, 1e-6).validate().is_err());
        assert!(SveConfig::new(10, 0.0, 1e-6).validate().is_err());
        assert!(SveConfig::new(10, -1.0, 1e-6).validate().is_err());
        assert!(SveConfig::new(10, 1e-10, 0.0).validate().is_err());
        // a cutoff above one is allowed; it truncates to the leading pair
        assert!(SveConfig::new(10, 1.5, 1e-6).validate().is_ok());

        let mut config = SveConfig::new(10, 1e-10, 1e-6);
        config.num_local_poly = 1;
        assert!(config.validate().is_err());

        let mut config = SveConfig::new(10, 1e-10, 1e-6);
        config.num_gl_nodes = config.num_local_poly - 1;
        assert!(config.validate().is_err());
    }
}
