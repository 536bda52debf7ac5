//! Stress testing and scenario analysis
//!
//! Applies a [`Scenario`] to a portfolio's position table:
//! - Equities, real estate and commodities take proportional shocks
//! - Bonds reprice with a duration/convexity approximation of the yield move
//!   (rates for government bonds, rates plus spread for corporate bonds)
//! - Any position denominated in a shocked currency takes the FX shock
//! - Cash and unmapped asset classes pass through unchanged
//!
//! Application is pure: the input portfolio is never modified and the same
//! inputs always give a bit-identical [`StressImpact`].

use crate::error::{Result, RiskError};
use crate::scenario::{Scenario, ShockFactor, ShockSet};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};

/// Tolerance on Σw when weights are supplied by the caller
pub const WEIGHT_TOLERANCE: f64 = 1e-6;

/// Asset class of a position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetClass {
    Equity,
    GovernmentBond,
    CorporateBond,
    RealEstate,
    Commodity,
    Cash,
    Other,
}

impl AssetClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetClass::Equity => "equity",
            AssetClass::GovernmentBond => "government_bond",
            AssetClass::CorporateBond => "corporate_bond",
            AssetClass::RealEstate => "real_estate",
            AssetClass::Commodity => "commodity",
            AssetClass::Cash => "cash",
            AssetClass::Other => "other",
        }
    }
}

impl fmt::Display for AssetClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssetClass {
    type Err = RiskError;

    /// Accepts the snake_case names plus common loader labels such as
    /// `Stock`, `Fixed Income`, `Sovereign`, `REIT` or `Money Market`
    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase().replace(['_', '-'], " ");
        let class = match normalized.as_str() {
            "equity" | "stock" => AssetClass::Equity,
            "government bond" | "sovereign" | "bond" | "fixed income" => AssetClass::GovernmentBond,
            "corporate bond" | "credit" => AssetClass::CorporateBond,
            "real estate" | "reit" => AssetClass::RealEstate,
            "commodity" | "commodities" => AssetClass::Commodity,
            "cash" | "money market" => AssetClass::Cash,
            "other" => AssetClass::Other,
            _ => {
                return Err(RiskError::invalid(
                    "asset_class",
                    format!("unrecognized asset class '{}'", s),
                ))
            }
        };
        Ok(class)
    }
}

/// Single position of a portfolio
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioPosition {
    /// Asset identifier
    pub asset_id: String,

    pub asset_class: AssetClass,

    /// ISO currency code the position is denominated in
    pub currency: String,

    /// Quantity held
    pub quantity: f64,

    /// Unit price
    pub price: f64,

    /// Position value (quantity × price unless overridden)
    pub market_value: f64,

    /// Share of total portfolio market value
    pub weight: f64,

    /// Modified duration in years (bonds)
    #[serde(default)]
    pub duration: Option<f64>,

    /// Convexity (bonds)
    #[serde(default)]
    pub convexity: Option<f64>,
}

impl PortfolioPosition {
    /// Position valued at quantity × price; the weight is set when the
    /// position joins a [`Portfolio`]
    pub fn new(
        asset_id: impl Into<String>,
        asset_class: AssetClass,
        currency: impl Into<String>,
        quantity: f64,
        price: f64,
    ) -> Self {
        Self {
            asset_id: asset_id.into(),
            asset_class,
            currency: currency.into(),
            quantity,
            price,
            market_value: quantity * price,
            weight: 0.0,
            duration: None,
            convexity: None,
        }
    }

    pub fn with_market_value(mut self, market_value: f64) -> Self {
        self.market_value = market_value;
        self
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_duration(mut self, duration: f64) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn with_convexity(mut self, convexity: f64) -> Self {
        self.convexity = Some(convexity);
        self
    }
}

/// Validated position table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "PortfolioRecord")]
pub struct Portfolio {
    positions: Vec<PortfolioPosition>,
    total_value: f64,
}

/// Stored form of a [`Portfolio`]; the total is recomputed on load
#[derive(Deserialize)]
struct PortfolioRecord {
    positions: Vec<PortfolioPosition>,
    #[serde(default)]
    total_value: Option<f64>,
}

impl TryFrom<PortfolioRecord> for Portfolio {
    type Error = RiskError;

    fn try_from(record: PortfolioRecord) -> Result<Self> {
        let portfolio = Portfolio::with_weights(record.positions)?;
        if let Some(stated) = record.total_value {
            let actual = portfolio.total_value;
            if !((stated - actual).abs() <= 1e-9 * actual.abs().max(1.0)) {
                return Err(RiskError::invalid(
                    "total_value",
                    format!("stated {} but positions sum to {}", stated, actual),
                ));
            }
        }
        Ok(portfolio)
    }
}

impl Portfolio {
    /// Build a portfolio and compute weights from market values
    pub fn from_positions(positions: Vec<PortfolioPosition>) -> Result<Self> {
        let total_value = Self::validate_positions(&positions)?;

        let positions = positions
            .into_iter()
            .map(|p| {
                let weight = p.market_value / total_value;
                p.with_weight(weight)
            })
            .collect();

        Ok(Self {
            positions,
            total_value,
        })
    }

    /// Build a portfolio keeping caller-supplied weights
    ///
    /// Weights must sum to 1 within [`WEIGHT_TOLERANCE`]; they are never
    /// re-normalized.
    pub fn with_weights(positions: Vec<PortfolioPosition>) -> Result<Self> {
        let total_value = Self::validate_positions(&positions)?;

        if let Some(p) = positions.iter().find(|p| !p.weight.is_finite()) {
            return Err(RiskError::invalid(
                "weight",
                format!("weight of {} is not finite", p.asset_id),
            ));
        }

        let sum: f64 = positions.iter().map(|p| p.weight).sum();
        if (sum - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(RiskError::invalid(
                "weights",
                format!("must sum to 1 within {:e}, got {}", WEIGHT_TOLERANCE, sum),
            ));
        }

        Ok(Self {
            positions,
            total_value,
        })
    }

    pub fn positions(&self) -> &[PortfolioPosition] {
        &self.positions
    }

    pub fn position(&self, asset_id: &str) -> Option<&PortfolioPosition> {
        self.positions.iter().find(|p| p.asset_id == asset_id)
    }

    /// Sum of market values
    pub fn total_value(&self) -> f64 {
        self.total_value
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn weights(&self) -> Vec<f64> {
        self.positions.iter().map(|p| p.weight).collect()
    }

    fn validate_positions(positions: &[PortfolioPosition]) -> Result<f64> {
        if positions.is_empty() {
            return Err(RiskError::InsufficientData(
                "Portfolio has no positions".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for p in positions {
            if !seen.insert(p.asset_id.as_str()) {
                return Err(RiskError::invalid(
                    "positions",
                    format!("duplicate asset {}", p.asset_id),
                ));
            }
            if !(p.price > 0.0) || !p.price.is_finite() {
                return Err(RiskError::invalid(
                    "price",
                    format!("price of {} must be positive, got {}", p.asset_id, p.price),
                ));
            }
            if !p.quantity.is_finite() || !p.market_value.is_finite() {
                return Err(RiskError::invalid(
                    "market_value",
                    format!("position {} has a non-finite value", p.asset_id),
                ));
            }
            if let Some(d) = p.duration {
                if !d.is_finite() || d < 0.0 {
                    return Err(RiskError::invalid(
                        "duration",
                        format!("duration of {} must be non-negative, got {}", p.asset_id, d),
                    ));
                }
            }
            if p.convexity.map_or(false, |c| !c.is_finite()) {
                return Err(RiskError::invalid(
                    "convexity",
                    format!("convexity of {} is not finite", p.asset_id),
                ));
            }
        }

        let total_value: f64 = positions.iter().map(|p| p.market_value).sum();
        if !(total_value > 0.0) {
            return Err(RiskError::invalid(
                "market_value",
                format!("total portfolio value must be positive, got {}", total_value),
            ));
        }

        Ok(total_value)
    }
}

/// How bonds without a duration are treated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DurationPolicy {
    /// Use a fixed modified duration
    Default {
        #[serde(default = "default_duration_years")]
        years: f64,
    },

    /// Fail when a shocked bond has no duration
    Require,
}

fn default_duration_years() -> f64 {
    5.0
}

impl Default for DurationPolicy {
    fn default() -> Self {
        DurationPolicy::Default {
            years: default_duration_years(),
        }
    }
}

/// Stress applicator configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StressConfig {
    #[serde(default)]
    pub duration_policy: DurationPolicy,
}

impl StressConfig {
    pub fn validate(&self) -> Result<()> {
        if let DurationPolicy::Default { years } = self.duration_policy {
            if !(years > 0.0) || !years.is_finite() {
                return Err(RiskError::invalid(
                    "stress.duration_policy.years",
                    format!("must be positive, got {}", years),
                ));
            }
        }
        Ok(())
    }
}

/// Impact of a scenario on one position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionImpact {
    pub asset_id: String,
    pub pre_shock_value: f64,
    pub post_shock_value: f64,
    pub absolute_impact: f64,

    /// Impact in percent of the position's pre-shock value
    pub percentage_impact: f64,

    /// Factor applied to the price
    pub price_multiplier: f64,
}

/// Result of applying one scenario
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StressImpact {
    /// Scenario name
    pub scenario_name: String,

    /// Portfolio value before the shock
    pub pre_shock_value: f64,

    /// Portfolio value after the shock
    pub post_shock_value: f64,

    /// post − pre
    pub absolute_impact: f64,

    /// Impact in percent of the pre-shock value (-12.5 = -12.5%)
    pub percentage_impact: f64,

    /// Position-level impacts, in portfolio order
    pub position_impacts: Vec<PositionImpact>,

    /// Position with the largest loss, if any position lost value
    pub worst_position: Option<String>,
}

/// Comprehensive stress test report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StressTestReport {
    /// All scenario results
    pub results: Vec<StressImpact>,

    /// Worst-case scenario
    pub worst_scenario: String,

    /// Maximum portfolio loss (most negative absolute impact)
    pub max_loss: f64,

    /// Best-case scenario
    pub best_scenario: String,

    /// Maximum portfolio gain (most positive absolute impact)
    pub max_gain: f64,

    /// Mean portfolio impact across scenarios
    pub average_impact: f64,

    /// Report generation timestamp
    pub generated_at: DateTime<Utc>,
}

/// Stress testing engine
#[derive(Debug, Clone, Default)]
pub struct StressTestEngine {
    config: StressConfig,
}

impl StressTestEngine {
    pub fn new(config: StressConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &StressConfig {
        &self.config
    }

    /// Apply a scenario, returning the shocked portfolio and its impact
    pub fn apply_scenario(
        &self,
        portfolio: &Portfolio,
        scenario: &Scenario,
    ) -> Result<(Portfolio, StressImpact)> {
        let shocks = scenario.shocks();

        let multipliers = portfolio
            .positions()
            .iter()
            .map(|p| self.price_multiplier(p, shocks))
            .collect::<Result<Vec<f64>>>()?;

        let shocked = if multipliers.iter().all(|m| *m == 1.0) {
            portfolio.clone()
        } else {
            let positions: Vec<PortfolioPosition> = portfolio
                .positions()
                .iter()
                .zip(&multipliers)
                .map(|(p, m)| PortfolioPosition {
                    price: p.price * m,
                    market_value: p.market_value * m,
                    ..p.clone()
                })
                .collect();
            reweighted(positions)
        };

        let mut position_impacts = Vec::with_capacity(portfolio.len());
        let mut worst: Option<(&str, f64)> = None;

        for ((before, after), multiplier) in portfolio
            .positions()
            .iter()
            .zip(shocked.positions())
            .zip(&multipliers)
        {
            let absolute_impact = after.market_value - before.market_value;
            let percentage_impact = if before.market_value != 0.0 {
                absolute_impact / before.market_value * 100.0
            } else {
                0.0
            };

            if absolute_impact < worst.map_or(0.0, |(_, impact)| impact) {
                worst = Some((before.asset_id.as_str(), absolute_impact));
            }

            position_impacts.push(PositionImpact {
                asset_id: before.asset_id.clone(),
                pre_shock_value: before.market_value,
                post_shock_value: after.market_value,
                absolute_impact,
                percentage_impact,
                price_multiplier: *multiplier,
            });
        }

        let pre_shock_value = portfolio.total_value();
        let post_shock_value = shocked.total_value();
        let absolute_impact = post_shock_value - pre_shock_value;

        let impact = StressImpact {
            scenario_name: scenario.name().to_string(),
            pre_shock_value,
            post_shock_value,
            absolute_impact,
            percentage_impact: absolute_impact / pre_shock_value * 100.0,
            position_impacts,
            worst_position: worst.map(|(asset_id, _)| asset_id.to_string()),
        };

        debug!(
            scenario = scenario.name(),
            pre_shock_value,
            post_shock_value,
            percentage_impact = impact.percentage_impact,
            "Scenario applied"
        );

        Ok((shocked, impact))
    }

    /// Run multiple stress test scenarios
    pub fn run_scenarios(&self, portfolio: &Portfolio, scenarios: &[Scenario]) -> Result<Vec<StressImpact>> {
        scenarios
            .iter()
            .map(|scenario| self.apply_scenario(portfolio, scenario).map(|(_, impact)| impact))
            .collect()
    }

    /// Generate comprehensive stress test report
    pub fn generate_report(&self, results: &[StressImpact]) -> Result<StressTestReport> {
        let first_result = results.first().ok_or_else(|| {
            RiskError::InsufficientData("No stress test results provided".to_string())
        })?;

        // Initialize with first result to handle all-negative or all-positive scenarios
        let mut worst_scenario = first_result.scenario_name.clone();
        let mut max_loss = first_result.absolute_impact;
        let mut best_scenario = first_result.scenario_name.clone();
        let mut max_gain = first_result.absolute_impact;
        let mut total_impact = 0.0;

        for result in results {
            total_impact += result.absolute_impact;

            if result.absolute_impact < max_loss {
                max_loss = result.absolute_impact;
                worst_scenario = result.scenario_name.clone();
            }

            if result.absolute_impact > max_gain {
                max_gain = result.absolute_impact;
                best_scenario = result.scenario_name.clone();
            }
        }

        let average_impact = total_impact / results.len() as f64;

        info!(
            scenarios = results.len(),
            worst_scenario = %worst_scenario,
            max_loss,
            "Stress test report generated"
        );

        Ok(StressTestReport {
            results: results.to_vec(),
            worst_scenario,
            max_loss,
            best_scenario,
            max_gain,
            average_impact,
            generated_at: Utc::now(),
        })
    }

    /// Price multiplier for one position, floored at zero
    fn price_multiplier(&self, position: &PortfolioPosition, shocks: &ShockSet) -> Result<f64> {
        let class_multiplier = match position.asset_class {
            AssetClass::Equity => 1.0 + shocks.value(ShockFactor::Equity),
            AssetClass::RealEstate => 1.0 + shocks.value(ShockFactor::RealEstate),
            AssetClass::Commodity => 1.0 + shocks.value(ShockFactor::Commodity),
            AssetClass::GovernmentBond => {
                self.bond_multiplier(position, shocks.value(ShockFactor::InterestRate))?
            }
            AssetClass::CorporateBond => self.bond_multiplier(
                position,
                shocks.value(ShockFactor::InterestRate) + shocks.value(ShockFactor::CreditSpread),
            )?,
            AssetClass::Cash | AssetClass::Other => 1.0,
        };

        let fx_multiplier = shocks
            .fx(&position.currency)
            .map_or(1.0, |shock| 1.0 + shock);

        Ok((class_multiplier * fx_multiplier).max(0.0))
    }

    /// 1 − D·Δy + ½·C·Δy²
    fn bond_multiplier(&self, position: &PortfolioPosition, yield_change: f64) -> Result<f64> {
        if yield_change == 0.0 {
            return Ok(1.0);
        }

        let duration = match (position.duration, &self.config.duration_policy) {
            (Some(duration), _) => duration,
            (None, DurationPolicy::Default { years }) => *years,
            (None, DurationPolicy::Require) => {
                return Err(RiskError::invalid(
                    "duration",
                    format!(
                        "{} bond {} has no duration",
                        position.asset_class, position.asset_id
                    ),
                ))
            }
        };
        let convexity = position.convexity.unwrap_or(0.0);

        Ok(1.0 - duration * yield_change + 0.5 * convexity * yield_change * yield_change)
    }
}

/// Recompute weights from market values; positions already validated
fn reweighted(positions: Vec<PortfolioPosition>) -> Portfolio {
    let total_value: f64 = positions.iter().map(|p| p.market_value).sum();
    let positions = positions
        .into_iter()
        .map(|p| {
            let weight = if total_value > 0.0 {
                p.market_value / total_value
            } else {
                0.0
            };
            p.with_weight(weight)
        })
        .collect();

    Portfolio {
        positions,
        total_value,
    }
}

/// Apply a scenario with the default stress configuration
pub fn apply_scenario(portfolio: &Portfolio, scenario: &Scenario) -> Result<(Portfolio, StressImpact)> {
    StressTestEngine::default().apply_scenario(portfolio, scenario)
}
