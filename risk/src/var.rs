//! Value at Risk (VaR) calculation engine
//!
//! Implements multiple VaR methodologies over a [`ReturnSeries`] and a
//! weight vector:
//! - Historical VaR: empirical quantile of the weighted portfolio returns
//! - Parametric VaR: normal approximation, VaR = −(μ·h + z·σ·√h)
//! - Monte Carlo VaR: empirical quantile of simulated joint returns
//! - Conditional VaR (CVaR/Expected Shortfall) alongside every method
//!
//! All figures are positive loss fractions of portfolio value. Multi-day
//! horizons for the historical and Monte Carlo methods use the
//! square-root-of-time rule, which assumes i.i.d. returns and is an
//! approximation.

use crate::error::{Result, RiskError};
use crate::portfolio::{PortfolioAnalyzer, RiskContribution};
use crate::returns::{ReturnSeries, DEFAULT_MIN_OBSERVATIONS};
use nalgebra::{DMatrix, DVector};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{ChiSquared, Distribution, StandardNormal};
use serde::{Deserialize, Serialize};
use statrs::distribution::{Continuous, ContinuousCDF, Normal as StatrsNormal};
use tracing::{debug, warn};

/// Absorbs floating-point noise in (1 − c)·N before taking the ceiling,
/// e.g. (1 − 0.99)·100 = 1.0000000000000009.
const RANK_EPSILON: f64 = 1e-9;

/// VaR calculation method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VarMethod {
    Historical,
    Parametric,
    MonteCarlo,
}

/// Distribution the Monte Carlo method draws joint returns from
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SimulationModel {
    /// Multivariate normal with the sample mean and covariance
    MultivariateNormal,

    /// Multivariate Student-t with the sample covariance as shape matrix
    StudentT {
        /// Degrees of freedom (must exceed 2)
        #[serde(default = "default_degrees_of_freedom")]
        degrees_of_freedom: f64,
    },

    /// Resample historical rows with replacement
    Bootstrap,
}

fn default_degrees_of_freedom() -> f64 {
    5.0
}

impl Default for SimulationModel {
    fn default() -> Self {
        SimulationModel::MultivariateNormal
    }
}

/// Monte Carlo settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonteCarloConfig {
    /// Number of simulated joint return vectors
    #[serde(default = "default_num_simulations")]
    pub num_simulations: usize,

    /// Random seed for reproducible runs. `None` seeds from OS entropy, so
    /// repeated runs give different results.
    #[serde(default)]
    pub seed: Option<u64>,

    /// Sampling distribution
    #[serde(default)]
    pub model: SimulationModel,
}

fn default_num_simulations() -> usize {
    10_000
}

impl Default for MonteCarloConfig {
    fn default() -> Self {
        Self {
            num_simulations: default_num_simulations(),
            seed: None,
            model: SimulationModel::default(),
        }
    }
}

impl MonteCarloConfig {
    /// Same settings with an explicit seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_simulations == 0 {
            return Err(RiskError::invalid(
                "monte_carlo.num_simulations",
                "must be positive",
            ));
        }
        if let SimulationModel::StudentT { degrees_of_freedom } = self.model {
            if !(degrees_of_freedom > 2.0) || !degrees_of_freedom.is_finite() {
                return Err(RiskError::invalid(
                    "monte_carlo.model.degrees_of_freedom",
                    format!("must be a finite value above 2, got {}", degrees_of_freedom),
                ));
            }
        }
        Ok(())
    }
}

/// VaR engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VarConfig {
    /// Minimum number of return observations required
    #[serde(default = "default_min_observations")]
    pub min_observations: usize,

    /// Monte Carlo settings
    #[serde(default)]
    pub monte_carlo: MonteCarloConfig,

    /// Covariance matrices above this condition number get a ridge term
    #[serde(default = "default_max_condition_number")]
    pub max_condition_number: f64,

    /// Allowed deviation of Σw from 1.0
    #[serde(default = "default_weight_tolerance")]
    pub weight_tolerance: f64,

    /// Attach per-asset risk contributions to results
    #[serde(default = "default_compute_contributions")]
    pub compute_contributions: bool,
}

fn default_min_observations() -> usize {
    DEFAULT_MIN_OBSERVATIONS
}

fn default_max_condition_number() -> f64 {
    1e10
}

fn default_weight_tolerance() -> f64 {
    1e-6
}

fn default_compute_contributions() -> bool {
    true
}

impl Default for VarConfig {
    fn default() -> Self {
        Self {
            min_observations: default_min_observations(),
            monte_carlo: MonteCarloConfig::default(),
            max_condition_number: default_max_condition_number(),
            weight_tolerance: default_weight_tolerance(),
            compute_contributions: default_compute_contributions(),
        }
    }
}

impl VarConfig {
    pub fn validate(&self) -> Result<()> {
        if self.min_observations < 2 {
            return Err(RiskError::invalid(
                "var.min_observations",
                format!("must be at least 2, got {}", self.min_observations),
            ));
        }
        if !(self.max_condition_number > 1.0) {
            return Err(RiskError::invalid(
                "var.max_condition_number",
                format!("must exceed 1, got {}", self.max_condition_number),
            ));
        }
        if !(self.weight_tolerance >= 0.0) {
            return Err(RiskError::invalid(
                "var.weight_tolerance",
                format!("must be non-negative, got {}", self.weight_tolerance),
            ));
        }
        self.monte_carlo.validate()
    }
}

/// VaR calculation result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskMetricsResult {
    /// VaR as a positive loss fraction of portfolio value
    pub var: f64,

    /// CVaR (expected shortfall) as a positive loss fraction
    pub cvar: f64,

    /// Calculation method used
    pub method: VarMethod,

    /// Confidence level (e.g., 0.95, 0.99)
    pub confidence_level: f64,

    /// Time horizon in days
    pub time_horizon_days: u32,

    /// Per-asset contributions summing to `var`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_contributions: Option<Vec<RiskContribution>>,
}

impl RiskMetricsResult {
    /// VaR in currency units for a portfolio of the given value
    pub fn var_amount(&self, portfolio_value: f64) -> f64 {
        self.var * portfolio_value
    }

    /// CVaR in currency units for a portfolio of the given value
    pub fn cvar_amount(&self, portfolio_value: f64) -> f64 {
        self.cvar * portfolio_value
    }
}

/// Parametric component VaR for one asset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentVar {
    pub asset_id: String,
    pub weight: f64,

    /// ∂VaR/∂w_i
    pub marginal_var: f64,

    /// w_i · marginal VaR; components sum to the parametric VaR
    pub component_var: f64,

    /// component_var / total VaR
    pub pct_contribution: f64,
}

/// Incremental VaR for one asset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncrementalVar {
    pub asset_id: String,
    pub weight: f64,

    /// (VaR after bumping w_i by the increment and re-normalizing − VaR) / increment
    pub incremental_var: f64,
}

/// VaR backtesting result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VarBacktestResult {
    /// Number of VaR predictions
    pub num_predictions: usize,

    /// Number of violations (actual loss exceeded VaR)
    pub num_violations: usize,

    /// Violation rate (num_violations / num_predictions)
    pub violation_rate: f64,

    /// Expected violation rate based on confidence level
    pub expected_violation_rate: f64,

    /// Whether the violation rate falls inside the binomial 2σ band
    pub validated: bool,
}

/// VaR calculation engine
#[derive(Debug, Clone)]
pub struct VarEngine {
    config: VarConfig,
    analyzer: PortfolioAnalyzer,
}

impl Default for VarEngine {
    fn default() -> Self {
        Self::new(VarConfig::default())
    }
}

impl VarEngine {
    /// Create a new VaR engine with configuration
    pub fn new(config: VarConfig) -> Self {
        let analyzer = PortfolioAnalyzer::new(config.max_condition_number);
        Self { config, analyzer }
    }

    pub fn config(&self) -> &VarConfig {
        &self.config
    }

    /// Calculate VaR and CVaR with the selected method
    pub fn compute_var(
        &self,
        returns: &ReturnSeries,
        weights: &[f64],
        confidence_level: f64,
        time_horizon_days: u32,
        method: VarMethod,
    ) -> Result<RiskMetricsResult> {
        match method {
            VarMethod::Historical => {
                self.calculate_historical_var(returns, weights, confidence_level, time_horizon_days)
            }
            VarMethod::Parametric => {
                self.calculate_parametric_var(returns, weights, confidence_level, time_horizon_days)
            }
            VarMethod::MonteCarlo => {
                self.calculate_monte_carlo_var(returns, weights, confidence_level, time_horizon_days)
            }
        }
    }

    /// Calculate Historical VaR using the empirical quantile
    ///
    /// VaR = −q·√h where q is the portfolio return at rank ⌈(1 − c)·N⌉;
    /// CVaR = −mean(r ≤ q)·√h.
    pub fn calculate_historical_var(
        &self,
        returns: &ReturnSeries,
        weights: &[f64],
        confidence_level: f64,
        time_horizon_days: u32,
    ) -> Result<RiskMetricsResult> {
        let w = self.validate_inputs(returns, weights, confidence_level, time_horizon_days)?;

        let portfolio_returns: Vec<f64> = returns.portfolio_returns(&w).iter().copied().collect();
        let (quantile, tail_mean) = tail_statistics(portfolio_returns, confidence_level)?;

        let scaling = (time_horizon_days as f64).sqrt();
        let var = (-quantile * scaling).max(0.0);
        let cvar = (-tail_mean * scaling).max(0.0);

        debug!(
            var,
            cvar,
            confidence_level,
            time_horizon_days,
            observations = returns.len(),
            "Historical VaR"
        );

        let risk_contributions = self.optional_contributions(returns, &w, None, var);

        Ok(RiskMetricsResult {
            var,
            cvar,
            method: VarMethod::Historical,
            confidence_level,
            time_horizon_days,
            risk_contributions,
        })
    }

    /// Calculate Parametric VaR assuming normally distributed returns
    ///
    /// μ_p = wᵀμ and σ_p = √(wᵀΣw). With z = Φ⁻¹(1 − c):
    /// VaR = −(μ_p·h + z·σ_p·√h), CVaR = −(μ_p·h − σ_p·√h·φ(z)/(1 − c)).
    pub fn calculate_parametric_var(
        &self,
        returns: &ReturnSeries,
        weights: &[f64],
        confidence_level: f64,
        time_horizon_days: u32,
    ) -> Result<RiskMetricsResult> {
        let w = self.validate_inputs(returns, weights, confidence_level, time_horizon_days)?;

        let moments = self.moments(returns)?;
        let (var, cvar) = self.parametric_loss(&moments, &w, confidence_level, time_horizon_days)?;
        let var = var.max(0.0);
        let cvar = cvar.max(0.0);

        debug!(var, cvar, confidence_level, time_horizon_days, "Parametric VaR");

        let risk_contributions = self.optional_contributions(returns, &w, Some(&moments.covariance), var);

        Ok(RiskMetricsResult {
            var,
            cvar,
            method: VarMethod::Parametric,
            confidence_level,
            time_horizon_days,
            risk_contributions,
        })
    }

    /// Calculate Monte Carlo VaR with the engine's simulation settings
    pub fn calculate_monte_carlo_var(
        &self,
        returns: &ReturnSeries,
        weights: &[f64],
        confidence_level: f64,
        time_horizon_days: u32,
    ) -> Result<RiskMetricsResult> {
        self.calculate_monte_carlo_var_with(
            returns,
            weights,
            confidence_level,
            time_horizon_days,
            &self.config.monte_carlo,
        )
    }

    /// Calculate Monte Carlo VaR with explicit simulation settings
    ///
    /// Draws `num_simulations` joint return vectors, weights each draw and
    /// applies the historical quantile rule to the simulated distribution.
    pub fn calculate_monte_carlo_var_with(
        &self,
        returns: &ReturnSeries,
        weights: &[f64],
        confidence_level: f64,
        time_horizon_days: u32,
        simulation: &MonteCarloConfig,
    ) -> Result<RiskMetricsResult> {
        let w = self.validate_inputs(returns, weights, confidence_level, time_horizon_days)?;
        simulation.validate()?;

        let mut rng = simulation_rng(simulation.seed);

        let (simulated, covariance) = match simulation.model {
            SimulationModel::Bootstrap => {
                let values = returns.values();
                let simulated = (0..simulation.num_simulations)
                    .map(|_| {
                        let row = rng.gen_range(0..returns.len());
                        values.row(row).transpose().dot(&w)
                    })
                    .collect::<Vec<f64>>();
                (simulated, None)
            }
            model => {
                let moments = self.moments(returns)?;
                let sampler =
                    MultivariateNormalSampler::new(moments.mean.clone(), &moments.covariance)?;
                let (drift, loadings) = sampler.project(&w);
                let chi_squared = match model {
                    SimulationModel::StudentT { degrees_of_freedom } => Some((
                        degrees_of_freedom,
                        ChiSquared::new(degrees_of_freedom)
                            .map_err(|e| RiskError::invalid("degrees_of_freedom", e.to_string()))?,
                    )),
                    _ => None,
                };

                let mut simulated = Vec::with_capacity(simulation.num_simulations);
                for _ in 0..simulation.num_simulations {
                    let shock: f64 = loadings
                        .iter()
                        .map(|b| {
                            let z: f64 = StandardNormal.sample(&mut rng);
                            b * z
                        })
                        .sum();
                    let scale = match &chi_squared {
                        Some((dof, chi)) => (dof / chi.sample(&mut rng)).sqrt(),
                        None => 1.0,
                    };
                    simulated.push(drift + shock * scale);
                }
                (simulated, Some(moments.covariance))
            }
        };

        let (quantile, tail_mean) = tail_statistics(simulated, confidence_level)?;

        let scaling = (time_horizon_days as f64).sqrt();
        let var = (-quantile * scaling).max(0.0);
        let cvar = (-tail_mean * scaling).max(0.0);

        debug!(
            var,
            cvar,
            confidence_level,
            time_horizon_days,
            simulations = simulation.num_simulations,
            seeded = simulation.seed.is_some(),
            model = ?simulation.model,
            "Monte Carlo VaR"
        );

        let risk_contributions = self.optional_contributions(returns, &w, covariance.as_ref(), var);

        Ok(RiskMetricsResult {
            var,
            cvar,
            method: VarMethod::MonteCarlo,
            confidence_level,
            time_horizon_days,
            risk_contributions,
        })
    }

    /// Parametric component VaR (Euler allocation)
    ///
    /// Components sum exactly to the unfloored parametric VaR.
    pub fn calculate_component_var(
        &self,
        returns: &ReturnSeries,
        weights: &[f64],
        confidence_level: f64,
        time_horizon_days: u32,
    ) -> Result<Vec<ComponentVar>> {
        let w = self.validate_inputs(returns, weights, confidence_level, time_horizon_days)?;
        let moments = self.moments(returns)?;

        let sigma = self.analyzer.portfolio_volatility(&w, &moments.covariance)?;
        if sigma == 0.0 {
            return Err(RiskError::IllConditionedInput(
                "Portfolio volatility is zero".to_string(),
            ));
        }

        let (total_var, _) = self.parametric_loss(&moments, &w, confidence_level, time_horizon_days)?;
        let z = standard_normal()?.inverse_cdf(1.0 - confidence_level);
        let h = time_horizon_days as f64;
        let marginal_risk = &moments.covariance * &w;

        Ok(returns
            .assets()
            .iter()
            .enumerate()
            .map(|(i, asset_id)| {
                let marginal_var = -(moments.mean[i] * h + z * h.sqrt() * marginal_risk[i] / sigma);
                let component_var = w[i] * marginal_var;
                ComponentVar {
                    asset_id: asset_id.clone(),
                    weight: w[i],
                    marginal_var,
                    component_var,
                    pct_contribution: if total_var != 0.0 {
                        component_var / total_var
                    } else {
                        0.0
                    },
                }
            })
            .collect())
    }

    /// Incremental VaR by finite weight bump
    ///
    /// For each asset, adds `increment` to its weight, re-normalizes the
    /// bumped vector to sum to 1 and measures the change in parametric VaR
    /// per unit of increment.
    pub fn calculate_incremental_var(
        &self,
        returns: &ReturnSeries,
        weights: &[f64],
        confidence_level: f64,
        time_horizon_days: u32,
        increment: f64,
    ) -> Result<Vec<IncrementalVar>> {
        let w = self.validate_inputs(returns, weights, confidence_level, time_horizon_days)?;

        if !(increment > 0.0) || !increment.is_finite() {
            return Err(RiskError::invalid(
                "increment",
                format!("must be positive and finite, got {}", increment),
            ));
        }

        let moments = self.moments(returns)?;
        let (base_var, _) = self.parametric_loss(&moments, &w, confidence_level, time_horizon_days)?;

        let mut results = Vec::with_capacity(w.len());
        for (i, asset_id) in returns.assets().iter().enumerate() {
            let mut bumped = w.clone();
            bumped[i] += increment;
            let total = bumped.sum();
            bumped /= total;

            let (bumped_var, _) =
                self.parametric_loss(&moments, &bumped, confidence_level, time_horizon_days)?;

            results.push(IncrementalVar {
                asset_id: asset_id.clone(),
                weight: w[i],
                incremental_var: (bumped_var - base_var) / increment,
            });
        }

        Ok(results)
    }

    /// Backtest VaR predictions against realized losses
    ///
    /// `realized_losses` are loss fractions (positive = loss), aligned with
    /// `predictions`.
    pub fn backtest_var(
        &self,
        predictions: &[RiskMetricsResult],
        realized_losses: &[f64],
    ) -> Result<VarBacktestResult> {
        if predictions.len() != realized_losses.len() {
            return Err(RiskError::mismatch(
                "realized losses",
                predictions.len(),
                realized_losses.len(),
            ));
        }

        if predictions.is_empty() {
            return Err(RiskError::InsufficientData(
                "No predictions to backtest".to_string(),
            ));
        }

        let num_predictions = predictions.len();

        // Count violations (realized loss > predicted VaR)
        let num_violations = predictions
            .iter()
            .zip(realized_losses)
            .filter(|(pred, loss)| **loss > pred.var)
            .count();

        let violation_rate = num_violations as f64 / num_predictions as f64;

        // Expected violation rate is (1 - confidence_level)
        let expected_violation_rate = 1.0 - predictions[0].confidence_level;

        // 2-sigma band of the binomial violation count
        let std_error = (expected_violation_rate * (1.0 - expected_violation_rate)
            / num_predictions as f64)
            .sqrt();
        let lower_bound = (expected_violation_rate - 2.0 * std_error).max(0.0);
        let upper_bound = (expected_violation_rate + 2.0 * std_error).min(1.0);

        let validated = violation_rate >= lower_bound && violation_rate <= upper_bound;

        if !validated {
            warn!(
                violation_rate,
                expected_violation_rate, num_predictions, "VaR backtest outside tolerance band"
            );
        }

        Ok(VarBacktestResult {
            num_predictions,
            num_violations,
            violation_rate,
            expected_violation_rate,
            validated,
        })
    }

    /// Validate common input parameters and return the weight vector
    fn validate_inputs(
        &self,
        returns: &ReturnSeries,
        weights: &[f64],
        confidence_level: f64,
        time_horizon_days: u32,
    ) -> Result<DVector<f64>> {
        self.config.validate()?;

        if !(confidence_level > 0.0 && confidence_level < 1.0) {
            return Err(RiskError::invalid(
                "confidence_level",
                format!("must be in (0, 1), got {}", confidence_level),
            ));
        }

        if time_horizon_days == 0 {
            return Err(RiskError::invalid("time_horizon_days", "must be at least 1"));
        }

        if weights.len() != returns.num_assets() {
            return Err(RiskError::mismatch("weights", returns.num_assets(), weights.len()));
        }

        if let Some(i) = weights.iter().position(|w| !w.is_finite()) {
            return Err(RiskError::invalid(
                "weights",
                format!("weight of {} is not finite", returns.assets()[i]),
            ));
        }

        let total: f64 = weights.iter().sum();
        if (total - 1.0).abs() > self.config.weight_tolerance {
            return Err(RiskError::invalid(
                "weights",
                format!(
                    "must sum to 1 within {:e}, got {}",
                    self.config.weight_tolerance, total
                ),
            ));
        }

        if returns.len() < self.config.min_observations {
            return Err(RiskError::InsufficientData(format!(
                "Need at least {} observations, got {}",
                self.config.min_observations,
                returns.len()
            )));
        }

        Ok(DVector::from_column_slice(weights))
    }

    fn moments(&self, returns: &ReturnSeries) -> Result<Moments> {
        let conditioned = self
            .analyzer
            .condition_covariance(returns.covariance_matrix()?)?;
        Ok(Moments {
            mean: returns.mean_vector(),
            covariance: conditioned.matrix,
        })
    }

    /// Unfloored parametric (VaR, CVaR)
    fn parametric_loss(
        &self,
        moments: &Moments,
        w: &DVector<f64>,
        confidence_level: f64,
        time_horizon_days: u32,
    ) -> Result<(f64, f64)> {
        let h = time_horizon_days as f64;
        let mu = w.dot(&moments.mean) * h;
        let sigma = self.analyzer.portfolio_volatility(w, &moments.covariance)? * h.sqrt();

        let normal = standard_normal()?;
        let z = normal.inverse_cdf(1.0 - confidence_level);

        let var = -(mu + z * sigma);
        let cvar = -(mu - sigma * normal.pdf(z) / (1.0 - confidence_level));
        Ok((var, cvar))
    }

    fn optional_contributions(
        &self,
        returns: &ReturnSeries,
        w: &DVector<f64>,
        covariance: Option<&DMatrix<f64>>,
        total_var: f64,
    ) -> Option<Vec<RiskContribution>> {
        if !self.config.compute_contributions {
            return None;
        }

        let contributions = match covariance {
            Some(cov) => self
                .analyzer
                .risk_contributions(returns.assets(), w, cov, total_var),
            None => self.moments(returns).and_then(|m| {
                self.analyzer
                    .risk_contributions(returns.assets(), w, &m.covariance, total_var)
            }),
        };

        match contributions {
            Ok(contributions) => Some(contributions),
            Err(e) => {
                warn!(error = %e, "Risk contributions unavailable");
                None
            }
        }
    }
}

struct Moments {
    mean: DVector<f64>,
    covariance: DMatrix<f64>,
}

/// Seeded RNG when a seed is given, entropy-seeded otherwise
pub(crate) fn simulation_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

/// Draws μ + L·z with L the Cholesky factor of the covariance
pub(crate) struct MultivariateNormalSampler {
    mean: DVector<f64>,
    lower: DMatrix<f64>,
}

impl MultivariateNormalSampler {
    pub(crate) fn new(mean: DVector<f64>, covariance: &DMatrix<f64>) -> Result<Self> {
        if mean.len() != covariance.nrows() {
            return Err(RiskError::mismatch("mean vector", covariance.nrows(), mean.len()));
        }
        let cholesky = covariance.clone().cholesky().ok_or_else(|| {
            RiskError::IllConditionedInput("Covariance matrix is not positive definite".to_string())
        })?;
        Ok(Self {
            mean,
            lower: cholesky.l(),
        })
    }

    /// One joint draw
    pub(crate) fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> DVector<f64> {
        let z = DVector::from_fn(self.mean.len(), |_, _| {
            let draw: f64 = StandardNormal.sample(&mut *rng);
            draw
        });
        &self.mean + &self.lower * z
    }

    /// Drift w·μ and loadings Lᵀw, so that w·(μ + L z) = w·μ + (Lᵀw)·z
    pub(crate) fn project(&self, w: &DVector<f64>) -> (f64, DVector<f64>) {
        (w.dot(&self.mean), self.lower.transpose() * w)
    }
}

fn standard_normal() -> Result<StatrsNormal> {
    StatrsNormal::new(0.0, 1.0).map_err(|e| RiskError::invalid("normal distribution", e.to_string()))
}

/// Empirical (1 − c) quantile at rank ⌈(1 − c)·N⌉ and the mean of all
/// returns at or below it
fn tail_statistics(mut returns: Vec<f64>, confidence_level: f64) -> Result<(f64, f64)> {
    if returns.is_empty() {
        return Err(RiskError::InsufficientData(
            "No returns to take a quantile of".to_string(),
        ));
    }
    returns.sort_by(f64::total_cmp);

    let n = returns.len();
    let rank = (((1.0 - confidence_level) * n as f64 - RANK_EPSILON).ceil() as usize).clamp(1, n);
    let quantile = returns[rank - 1];

    let tail: Vec<f64> = returns.iter().copied().take_while(|r| *r <= quantile).collect();
    let tail_mean = tail.iter().sum::<f64>() / tail.len() as f64;

    Ok((quantile, tail_mean))
}

/// Calculate VaR with a default-configured engine
pub fn compute_var(
    returns: &ReturnSeries,
    weights: &[f64],
    confidence_level: f64,
    time_horizon_days: u32,
    method: VarMethod,
) -> Result<RiskMetricsResult> {
    VarEngine::default().compute_var(returns, weights, confidence_level, time_horizon_days, method)
}
