//! Portfolio covariance analytics
//!
//! Provides the covariance-based pieces shared by the VaR methods:
//! - Conditioning of the sample covariance matrix (uniform ridge policy)
//! - Portfolio volatility σ_p = √(wᵀ Σ w)
//! - Per-asset risk contribution, normalized to total VaR

use crate::error::{Result, RiskError};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Risk contribution for a single asset
///
/// `contribution` values sum to the total VaR of the method that produced
/// them; `pct` values sum to 1.0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskContribution {
    /// Asset identifier
    pub asset_id: String,

    /// Asset weight in the portfolio
    pub weight: f64,

    /// Marginal contribution to volatility: (Σ w)_i / σ_p
    pub marginal_volatility: f64,

    /// Share of total VaR attributed to the asset
    pub contribution: f64,

    /// Fraction of total risk (w_i (Σ w)_i / σ_p²)
    pub pct: f64,
}

/// Covariance matrix after conditioning
#[derive(Debug, Clone)]
pub struct ConditionedCovariance {
    /// Matrix to use in downstream calculations
    pub matrix: DMatrix<f64>,

    /// Ridge term added to the diagonal (0.0 when none was needed)
    pub ridge: f64,

    /// Condition number of the input matrix (may be infinite)
    pub condition_number: f64,
}

/// Portfolio covariance analyzer
#[derive(Debug, Clone)]
pub struct PortfolioAnalyzer {
    max_condition_number: f64,
}

impl PortfolioAnalyzer {
    /// Create an analyzer that regularizes matrices whose condition number
    /// exceeds `max_condition_number`
    pub fn new(max_condition_number: f64) -> Self {
        Self {
            max_condition_number,
        }
    }

    /// Apply the ridge policy to a covariance matrix
    ///
    /// When λ_max / λ_min exceeds the threshold K, adds
    /// ρ = (λ_max − K·λ_min) / (K − 1) to the diagonal so the result has
    /// condition number exactly K. A matrix with no positive eigenvalue
    /// (every asset constant) cannot be repaired.
    pub fn condition_covariance(&self, covariance: DMatrix<f64>) -> Result<ConditionedCovariance> {
        if !covariance.is_square() {
            return Err(RiskError::mismatch(
                "covariance columns",
                covariance.nrows(),
                covariance.ncols(),
            ));
        }

        if covariance.iter().any(|v| !v.is_finite()) {
            return Err(RiskError::IllConditionedInput(
                "Covariance matrix contains non-finite entries".to_string(),
            ));
        }

        let eigenvalues = covariance.clone().symmetric_eigen().eigenvalues;
        let lambda_max = eigenvalues.max();
        let lambda_min = eigenvalues.min();

        if lambda_max <= 0.0 {
            return Err(RiskError::IllConditionedInput(format!(
                "Covariance matrix has no positive eigenvalue (largest = {:e})",
                lambda_max
            )));
        }

        let condition_number = if lambda_min > 0.0 {
            lambda_max / lambda_min
        } else {
            f64::INFINITY
        };

        if condition_number <= self.max_condition_number {
            return Ok(ConditionedCovariance {
                matrix: covariance,
                ridge: 0.0,
                condition_number,
            });
        }

        let k = self.max_condition_number;
        let ridge = (lambda_max - k * lambda_min) / (k - 1.0);

        warn!(
            condition_number,
            ridge,
            max_condition_number = k,
            "Regularizing ill-conditioned covariance matrix"
        );

        let mut matrix = covariance;
        for i in 0..matrix.nrows() {
            matrix[(i, i)] += ridge;
        }

        Ok(ConditionedCovariance {
            matrix,
            ridge,
            condition_number,
        })
    }

    /// Calculate portfolio volatility using σ_p = √(wᵀ Σ w)
    pub fn portfolio_volatility(&self, weights: &DVector<f64>, covariance: &DMatrix<f64>) -> Result<f64> {
        if covariance.nrows() != weights.len() || covariance.ncols() != weights.len() {
            return Err(RiskError::mismatch(
                "covariance dimension",
                weights.len(),
                covariance.nrows(),
            ));
        }

        let variance = weights.dot(&(covariance * weights));

        if variance < 0.0 {
            return Err(RiskError::IllConditionedInput(format!(
                "Negative portfolio variance: {}",
                variance
            )));
        }

        Ok(variance.sqrt())
    }

    /// Calculate risk contribution for each asset
    ///
    /// Contribution_i = w_i (Σ w)_i / σ_p, rescaled so the contributions sum
    /// to `total_var`.
    pub fn risk_contributions(
        &self,
        assets: &[String],
        weights: &DVector<f64>,
        covariance: &DMatrix<f64>,
        total_var: f64,
    ) -> Result<Vec<RiskContribution>> {
        if assets.len() != weights.len() {
            return Err(RiskError::mismatch("weights", assets.len(), weights.len()));
        }

        let portfolio_volatility = self.portfolio_volatility(weights, covariance)?;

        if portfolio_volatility == 0.0 {
            return Err(RiskError::IllConditionedInput(
                "Portfolio volatility is zero".to_string(),
            ));
        }

        // Marginal contribution to risk: Σ * w
        let marginal_risk = covariance * weights;
        let variance = portfolio_volatility * portfolio_volatility;

        Ok(assets
            .iter()
            .enumerate()
            .map(|(i, asset_id)| {
                let pct = weights[i] * marginal_risk[i] / variance;
                RiskContribution {
                    asset_id: asset_id.clone(),
                    weight: weights[i],
                    marginal_volatility: marginal_risk[i] / portfolio_volatility,
                    contribution: pct * total_var,
                    pct,
                }
            })
            .collect())
    }
}

impl Default for PortfolioAnalyzer {
    fn default() -> Self {
        Self::new(1e10)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn assets(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("A{}", i)).collect()
    }

    #[test]
    fn test_portfolio_volatility() {
        let analyzer = PortfolioAnalyzer::default();
        let w = DVector::from_vec(vec![0.5, 0.5]);

        // Perfect correlation, unit variances
        let cov = DMatrix::from_vec(2, 2, vec![1.0, 1.0, 1.0, 1.0]);
        let volatility = analyzer.portfolio_volatility(&w, &cov).unwrap();

        assert_relative_eq!(volatility, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_risk_contributions_sum_to_total() {
        let analyzer = PortfolioAnalyzer::default();
        let w = DVector::from_vec(vec![0.6, 0.4]);
        // Asset A: 20% vol, Asset B: 30% vol
        let cov = DMatrix::from_vec(2, 2, vec![0.04, 0.02, 0.02, 0.09]);

        let contributions = analyzer
            .risk_contributions(&assets(2), &w, &cov, 0.25)
            .unwrap();

        assert_eq!(contributions.len(), 2);
        let total: f64 = contributions.iter().map(|c| c.contribution).sum();
        assert_relative_eq!(total, 0.25, epsilon = 1e-12);
        let pct: f64 = contributions.iter().map(|c| c.pct).sum();
        assert_relative_eq!(pct, 1.0, epsilon = 1e-12);

        // (Σw) = [0.032, 0.048]; σ_p² = 0.0384
        assert_relative_eq!(contributions[0].pct, 0.6 * 0.032 / 0.0384, epsilon = 1e-12);
    }

    #[test]
    fn test_well_conditioned_matrix_untouched() {
        let analyzer = PortfolioAnalyzer::default();
        let cov = DMatrix::from_vec(2, 2, vec![0.04, 0.01, 0.01, 0.09]);

        let conditioned = analyzer.condition_covariance(cov.clone()).unwrap();

        assert_eq!(conditioned.ridge, 0.0);
        assert_eq!(conditioned.matrix, cov);
        assert!(conditioned.condition_number > 1.0);
    }

    #[test]
    fn test_singular_matrix_regularized() {
        let analyzer = PortfolioAnalyzer::new(1e6);
        // Two perfectly collinear assets
        let cov = DMatrix::from_vec(2, 2, vec![1.0, 1.0, 1.0, 1.0]);

        let conditioned = analyzer.condition_covariance(cov).unwrap();

        assert!(conditioned.ridge > 0.0);
        assert!(conditioned.matrix.clone().cholesky().is_some());

        let eig = conditioned.matrix.symmetric_eigen().eigenvalues;
        assert_relative_eq!(eig.max() / eig.min(), 1e6, max_relative = 1e-6);
    }

    #[test]
    fn test_zero_matrix_fails() {
        let analyzer = PortfolioAnalyzer::default();
        let result = analyzer.condition_covariance(DMatrix::zeros(3, 3));

        assert!(matches!(result, Err(RiskError::IllConditionedInput(_))));
    }

    #[test]
    fn test_zero_volatility_contributions() {
        let analyzer = PortfolioAnalyzer::default();
        let w = DVector::from_vec(vec![1.0, -1.0]);
        let cov = DMatrix::from_vec(2, 2, vec![1.0, 1.0, 1.0, 1.0]);

        let result = analyzer.risk_contributions(&assets(2), &w, &cov, 0.1);
        assert!(matches!(result, Err(RiskError::IllConditionedInput(_))));
    }
}
