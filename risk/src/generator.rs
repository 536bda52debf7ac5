//! Scenario generator
//!
//! Serves the built-in scenario catalog and builds custom, sensitivity,
//! combined, historical and simulated scenarios. The catalog is a read-only table loaded when the
//! generator is constructed; user scenarios are persisted through an
//! optional [`ScenarioStore`].

use crate::error::{Result, RiskError};
use crate::portfolio::PortfolioAnalyzer;
use crate::returns::{PricePoint, ReturnSeries};
use crate::scenario::{CatalogEntry, Scenario, ScenarioOrigin, ShockFactor, ShockSet, ShockValue, CATALOG};
use crate::store::ScenarioStore;
use crate::var::{simulation_rng, MultivariateNormalSampler};
use chrono::NaiveDate;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Builds and looks up stress scenarios
#[derive(Clone)]
pub struct ScenarioGenerator {
    catalog: BTreeMap<&'static str, &'static CatalogEntry>,
    store: Option<Arc<dyn ScenarioStore>>,
}

impl std::fmt::Debug for ScenarioGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScenarioGenerator")
            .field("catalog", &self.catalog.keys().collect::<Vec<_>>())
            .field("has_store", &self.store.is_some())
            .finish()
    }
}

impl Default for ScenarioGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl ScenarioGenerator {
    /// Generator without persistence
    pub fn new() -> Self {
        Self {
            catalog: CATALOG.iter().map(|entry| (entry.name, entry)).collect(),
            store: None,
        }
    }

    /// Generator persisting custom scenarios to `store`
    pub fn with_store(store: Arc<dyn ScenarioStore>) -> Self {
        Self {
            store: Some(store),
            ..Self::new()
        }
    }

    /// Names of the built-in scenarios
    pub fn predefined_names(&self) -> Vec<&'static str> {
        self.catalog.keys().copied().collect()
    }

    /// Built-in scenario at its catalog severity
    pub fn get_predefined_scenario(&self, name: &str) -> Result<Scenario> {
        self.get_predefined_scenario_with_severity(name, 1.0)
    }

    /// Built-in scenario with every shock (FX included) scaled by `severity`
    pub fn get_predefined_scenario_with_severity(&self, name: &str, severity: f64) -> Result<Scenario> {
        let entry = self
            .catalog
            .get(name)
            .ok_or_else(|| RiskError::UnknownScenario(name.to_string()))?;

        if !(severity >= 0.0) || !severity.is_finite() {
            return Err(RiskError::invalid(
                "severity",
                format!("must be finite and non-negative, got {}", severity),
            ));
        }

        let mut shocks = entry.shock_set();
        let mut description = entry.description.to_string();
        if severity != 1.0 {
            shocks = shocks.scaled(severity);
            description.push_str(&format!(" (severity: {:.2}x)", severity));
        }

        debug!(scenario = name, severity, "Predefined scenario loaded");

        Scenario::with_origin(name, description, shocks, ScenarioOrigin::Predefined { severity })
    }

    /// Build a user-defined scenario from a raw shock map
    ///
    /// Keys are validated against [`ShockFactor`] before anything else
    /// happens; an unrecognized key fails with `InvalidShockFactor`.
    pub fn create_custom_scenario(
        &self,
        name: &str,
        description: &str,
        shocks: BTreeMap<String, ShockValue>,
        persist: bool,
    ) -> Result<Scenario> {
        let shocks = ShockSet::from_map(shocks)?;
        let scenario = Scenario::new(name, description, shocks)?;
        self.finish(scenario, persist)
    }

    /// One scenario per value in `shock_values`, each moving only `factor`
    ///
    /// The shock is relative to `base_value`: (v − base) / base, or v itself
    /// when the base is zero. Scenarios are named `{name}_{factor}_{v}`.
    pub fn create_sensitivity_scenarios(
        &self,
        name: &str,
        description: &str,
        factor: ShockFactor,
        base_value: f64,
        shock_values: &[f64],
        persist: bool,
    ) -> Result<Vec<Scenario>> {
        if !base_value.is_finite() {
            return Err(RiskError::invalid(
                "base_value",
                format!("must be finite, got {}", base_value),
            ));
        }

        shock_values
            .iter()
            .map(|&shock_value| {
                let relative_shock = if base_value != 0.0 {
                    (shock_value - base_value) / base_value
                } else {
                    shock_value
                };

                let shocks = ShockSet::new().with_shock(factor, relative_shock)?;
                let scenario = Scenario::with_origin(
                    format!("{}_{}_{}", name, factor, shock_value),
                    format!("{} ({} = {})", description, factor, shock_value),
                    shocks,
                    ScenarioOrigin::Sensitivity {
                        factor,
                        base_value,
                        shock_value,
                        relative_shock,
                    },
                )?;
                self.finish(scenario, persist)
            })
            .collect()
    }

    /// Weighted blend of several scenarios
    ///
    /// Weights default to equal and are normalized to sum to 1. A shock
    /// missing from a component counts as zero for that component.
    pub fn combine_scenarios(
        &self,
        name: &str,
        description: &str,
        scenarios: &[Scenario],
        weights: Option<&[f64]>,
        persist: bool,
    ) -> Result<Scenario> {
        if scenarios.is_empty() {
            return Err(RiskError::InsufficientData(
                "No scenarios to combine".to_string(),
            ));
        }

        let weights = match weights {
            Some(weights) if weights.len() != scenarios.len() => {
                return Err(RiskError::mismatch(
                    "scenario weights",
                    scenarios.len(),
                    weights.len(),
                ));
            }
            Some(weights) => weights.to_vec(),
            None => vec![1.0; scenarios.len()],
        };

        let total: f64 = weights.iter().sum();
        if !total.is_finite() || total == 0.0 || weights.iter().any(|w| !w.is_finite()) {
            return Err(RiskError::invalid(
                "scenario weights",
                format!("must be finite with a non-zero sum, got {:?}", weights),
            ));
        }
        let weights: Vec<f64> = weights.iter().map(|w| w / total).collect();

        let shocks = ShockSet::weighted_sum(
            scenarios
                .iter()
                .map(Scenario::shocks)
                .zip(weights.iter().copied()),
        );

        let scenario = Scenario::with_origin(
            name,
            description,
            shocks,
            ScenarioOrigin::Combined {
                components: scenarios.iter().map(|s| s.name().to_string()).collect(),
                weights,
            },
        )?;
        self.finish(scenario, persist)
    }

    /// Scenario replaying the factor moves observed between two dates
    ///
    /// `levels` holds market levels keyed by factor name, or `fx.<CCY>` for
    /// a currency. Each series moves from its first to its last observation
    /// inside `[start_date, end_date]`: additive factors take the level
    /// difference, the others the relative change.
    pub fn create_historical_scenario(
        &self,
        name: &str,
        description: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
        levels: &[PricePoint],
        persist: bool,
    ) -> Result<Scenario> {
        if start_date >= end_date {
            return Err(RiskError::invalid(
                "historical period",
                format!("start {} must precede end {}", start_date, end_date),
            ));
        }

        let mut series: BTreeMap<&str, Vec<(NaiveDate, f64)>> = BTreeMap::new();
        for point in levels {
            let observations = match series.entry(point.asset_id.as_str()) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(entry) => {
                    FactorKey::parse(&point.asset_id)?;
                    entry.insert(Vec::new())
                }
            };
            if let Some(level) = point.price {
                if point.date >= start_date && point.date <= end_date {
                    observations.push((point.date, level));
                }
            }
        }

        if series.is_empty() {
            return Err(RiskError::InsufficientData(
                "No market levels provided".to_string(),
            ));
        }

        let mut shocks = ShockSet::new();
        for (key, mut observations) in series {
            observations.sort_by_key(|(date, _)| *date);
            let (first, last) = match (observations.first(), observations.last()) {
                (Some(first), Some(last)) if first.0 < last.0 => (first.1, last.1),
                _ => {
                    return Err(RiskError::InsufficientData(format!(
                        "{} needs two observations between {} and {}",
                        key, start_date, end_date
                    )))
                }
            };

            let factor_key = FactorKey::parse(key)?;
            let shock = if factor_key.is_additive() {
                last - first
            } else {
                if first == 0.0 {
                    return Err(RiskError::invalid(
                        key,
                        format!("level on {} is zero", start_date),
                    ));
                }
                (last - first) / first
            };
            shocks = factor_key.apply(shocks, shock)?;
        }

        debug!(scenario = name, %start_date, %end_date, "Historical scenario built");

        let scenario = Scenario::with_origin(
            name,
            description,
            shocks,
            ScenarioOrigin::Historical {
                start_date,
                end_date,
            },
        )?;
        self.finish(scenario, persist)
    }

    /// Simulated scenarios drawn from a multivariate normal fitted to
    /// `returns`
    ///
    /// Columns are keyed like [`create_historical_scenario`]; each draw
    /// becomes one scenario named `{base_name}_{i}` (1-based). A seed makes
    /// the batch reproducible.
    ///
    /// [`create_historical_scenario`]: ScenarioGenerator::create_historical_scenario
    pub fn generate_monte_carlo_scenarios(
        &self,
        base_name: &str,
        description: &str,
        returns: &ReturnSeries,
        num_scenarios: usize,
        seed: Option<u64>,
        persist: bool,
    ) -> Result<Vec<Scenario>> {
        let keys = returns
            .assets()
            .iter()
            .map(|asset| FactorKey::parse(asset))
            .collect::<Result<Vec<_>>>()?;

        if num_scenarios == 0 {
            return Err(RiskError::invalid("num_scenarios", "must be positive"));
        }

        let conditioned = PortfolioAnalyzer::default().condition_covariance(returns.covariance_matrix()?)?;
        let sampler = MultivariateNormalSampler::new(returns.mean_vector(), &conditioned.matrix)?;
        let mut rng = simulation_rng(seed);

        let mut scenarios = Vec::with_capacity(num_scenarios);
        for i in 1..=num_scenarios {
            let draw = sampler.sample(&mut rng);
            let shocks = keys
                .iter()
                .zip(draw.iter())
                .try_fold(ShockSet::new(), |set, (key, shock)| key.apply(set, *shock))?;

            let scenario = Scenario::with_origin(
                format!("{}_{}", base_name, i),
                format!("{} (scenario {}/{})", description, i, num_scenarios),
                shocks,
                ScenarioOrigin::MonteCarlo {
                    scenario_number: i,
                    total_scenarios: num_scenarios,
                    seed,
                },
            )?;
            scenarios.push(self.finish(scenario, persist)?);
        }

        debug!(base_name, num_scenarios, seeded = seed.is_some(), "Monte Carlo scenarios generated");

        Ok(scenarios)
    }

    /// Load a stored scenario, falling back to the built-in catalog
    pub fn load_scenario(&self, name: &str) -> Result<Scenario> {
        if let Some(store) = &self.store {
            if let Some(scenario) = store.load(name)? {
                return Ok(scenario);
            }
        }

        if self.catalog.contains_key(name) {
            return self.get_predefined_scenario(name);
        }

        Err(RiskError::UnknownScenario(name.to_string()))
    }

    /// Names of the stored scenarios (empty without a store)
    pub fn list_scenarios(&self) -> Result<Vec<String>> {
        match &self.store {
            Some(store) => store.list(),
            None => Ok(Vec::new()),
        }
    }

    fn finish(&self, scenario: Scenario, persist: bool) -> Result<Scenario> {
        if persist {
            let store = self.store.as_ref().ok_or_else(|| {
                RiskError::invalid("persist", "no scenario store configured")
            })?;
            store.save(&scenario)?;
            info!(scenario = scenario.name(), "Scenario persisted");
        }
        Ok(scenario)
    }
}

/// Market series name resolved to a shock target
enum FactorKey<'a> {
    Scalar(ShockFactor),
    Currency(&'a str),
}

impl<'a> FactorKey<'a> {
    /// `equity`, `interest_rate`, ... or `fx.<CCY>`
    fn parse(key: &'a str) -> Result<Self> {
        if let Some(currency) = key.strip_prefix("fx.") {
            return Ok(FactorKey::Currency(currency));
        }
        match key.parse::<ShockFactor>()? {
            ShockFactor::Fx => Err(RiskError::shock_factor(key, "name the currency as fx.<CCY>")),
            factor => Ok(FactorKey::Scalar(factor)),
        }
    }

    fn is_additive(&self) -> bool {
        match self {
            FactorKey::Scalar(factor) => factor.is_additive(),
            FactorKey::Currency(_) => false,
        }
    }

    fn apply(&self, shocks: ShockSet, value: f64) -> Result<ShockSet> {
        match self {
            FactorKey::Scalar(factor) => shocks.with_shock(*factor, value),
            FactorKey::Currency(currency) => shocks.with_fx(*currency, value),
        }
    }
}

/// Built-in scenario by name
pub fn get_predefined_scenario(name: &str) -> Result<Scenario> {
    ScenarioGenerator::new().get_predefined_scenario(name)
}

/// Custom scenario from a raw shock map, without persistence
pub fn create_custom_scenario(
    name: &str,
    description: &str,
    shocks: BTreeMap<String, ShockValue>,
) -> Result<Scenario> {
    ScenarioGenerator::new().create_custom_scenario(name, description, shocks, false)
}
