//! Stress scenario model
//!
//! A [`Scenario`] is an immutable, named set of market shocks. Shock keys
//! come from the closed [`ShockFactor`] enumeration; anything else is
//! rejected when the scenario is built, before any portfolio is touched.
//!
//! Units per factor:
//! - `equity`, `real_estate`, `commodity`, `energy`, `bond_liquidity`:
//!   proportional price change (-0.40 = -40%)
//! - `interest_rate`, `credit_spread`, `inflation`, `liquidity_premium`:
//!   additive, in rate units (0.02 = +200bp)
//! - `volatility`: additive, in volatility points
//! - `fx`: currency code → proportional change of that currency's value

use crate::error::{Result, RiskError};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Recognized shock factors
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShockFactor {
    Equity,
    InterestRate,
    CreditSpread,
    Volatility,
    Fx,
    RealEstate,
    Commodity,
    Inflation,
    Energy,
    LiquidityPremium,
    BondLiquidity,
}

impl ShockFactor {
    pub const ALL: [ShockFactor; 11] = [
        ShockFactor::Equity,
        ShockFactor::InterestRate,
        ShockFactor::CreditSpread,
        ShockFactor::Volatility,
        ShockFactor::Fx,
        ShockFactor::RealEstate,
        ShockFactor::Commodity,
        ShockFactor::Inflation,
        ShockFactor::Energy,
        ShockFactor::LiquidityPremium,
        ShockFactor::BondLiquidity,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ShockFactor::Equity => "equity",
            ShockFactor::InterestRate => "interest_rate",
            ShockFactor::CreditSpread => "credit_spread",
            ShockFactor::Volatility => "volatility",
            ShockFactor::Fx => "fx",
            ShockFactor::RealEstate => "real_estate",
            ShockFactor::Commodity => "commodity",
            ShockFactor::Inflation => "inflation",
            ShockFactor::Energy => "energy",
            ShockFactor::LiquidityPremium => "liquidity_premium",
            ShockFactor::BondLiquidity => "bond_liquidity",
        }
    }

    /// Whether the factor carries a per-currency map rather than one number
    pub fn is_per_currency(&self) -> bool {
        matches!(self, ShockFactor::Fx)
    }

    /// Whether the shock is an additive move in rate or volatility units
    /// rather than a proportional price change
    pub fn is_additive(&self) -> bool {
        matches!(
            self,
            ShockFactor::InterestRate
                | ShockFactor::CreditSpread
                | ShockFactor::Inflation
                | ShockFactor::LiquidityPremium
                | ShockFactor::Volatility
        )
    }
}

impl fmt::Display for ShockFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ShockFactor {
    type Err = RiskError;

    fn from_str(s: &str) -> Result<Self> {
        ShockFactor::ALL
            .iter()
            .copied()
            .find(|factor| factor.as_str() == s)
            .ok_or_else(|| RiskError::shock_factor(s, "not a recognized shock factor"))
    }
}

/// Raw shock value as it appears in a shock map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ShockValue {
    Scalar(f64),
    PerCurrency(BTreeMap<String, f64>),
}

impl From<f64> for ShockValue {
    fn from(value: f64) -> Self {
        ShockValue::Scalar(value)
    }
}

/// Validated set of shocks
///
/// Factors that are absent mean "no shock". Serializes as the flat map
/// `{"equity": -0.4, "fx": {"EUR": -0.15}}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(
    try_from = "BTreeMap<String, ShockValue>",
    into = "BTreeMap<String, ShockValue>"
)]
pub struct ShockSet {
    scalars: BTreeMap<ShockFactor, f64>,
    fx: BTreeMap<String, f64>,
}

impl ShockSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate a raw shock map
    ///
    /// Fails with `InvalidShockFactor` on an unknown key, a value of the
    /// wrong shape (number vs. currency map) or a non-finite value.
    pub fn from_map(map: BTreeMap<String, ShockValue>) -> Result<Self> {
        let mut shocks = ShockSet::new();

        for (key, value) in map {
            let factor: ShockFactor = key.parse()?;
            shocks = match (factor, value) {
                (ShockFactor::Fx, ShockValue::PerCurrency(rates)) => {
                    rates.into_iter().try_fold(shocks, |set, (currency, shock)| {
                        set.with_fx(currency, shock)
                    })?
                }
                (ShockFactor::Fx, ShockValue::Scalar(_)) => {
                    return Err(RiskError::shock_factor(
                        key,
                        "expects a map of currency to shock",
                    ));
                }
                (factor, ShockValue::Scalar(shock)) => shocks.with_shock(factor, shock)?,
                (_, ShockValue::PerCurrency(_)) => {
                    return Err(RiskError::shock_factor(key, "expects a single number"));
                }
            };
        }

        Ok(shocks)
    }

    /// Add or replace a scalar shock
    pub fn with_shock(mut self, factor: ShockFactor, value: f64) -> Result<Self> {
        if factor.is_per_currency() {
            return Err(RiskError::shock_factor(
                factor.as_str(),
                "use with_fx for per-currency shocks",
            ));
        }
        if !value.is_finite() {
            return Err(RiskError::shock_factor(
                factor.as_str(),
                format!("shock must be finite, got {}", value),
            ));
        }
        self.scalars.insert(factor, value);
        Ok(self)
    }

    /// Add or replace the shock for one currency
    pub fn with_fx(mut self, currency: impl Into<String>, value: f64) -> Result<Self> {
        let currency = currency.into();
        if currency.trim().is_empty() {
            return Err(RiskError::shock_factor("fx", "currency code is empty"));
        }
        if !value.is_finite() {
            return Err(RiskError::shock_factor(
                format!("fx.{}", currency),
                format!("shock must be finite, got {}", value),
            ));
        }
        self.fx.insert(currency, value);
        Ok(self)
    }

    /// Scalar shock for a factor, if present
    pub fn get(&self, factor: ShockFactor) -> Option<f64> {
        self.scalars.get(&factor).copied()
    }

    /// Scalar shock for a factor, 0.0 when absent
    pub fn value(&self, factor: ShockFactor) -> f64 {
        self.get(factor).unwrap_or(0.0)
    }

    /// FX shock for a currency, if present
    pub fn fx(&self, currency: &str) -> Option<f64> {
        self.fx.get(currency).copied()
    }

    pub fn fx_shocks(&self) -> &BTreeMap<String, f64> {
        &self.fx
    }

    /// Scalar shocks in factor order
    pub fn scalars(&self) -> impl Iterator<Item = (ShockFactor, f64)> + '_ {
        self.scalars.iter().map(|(factor, value)| (*factor, *value))
    }

    pub fn is_empty(&self) -> bool {
        self.scalars.is_empty() && self.fx.is_empty()
    }

    /// True when every shock present is exactly zero
    pub fn is_zero(&self) -> bool {
        self.scalars.values().chain(self.fx.values()).all(|v| *v == 0.0)
    }

    /// Every shock, FX included, multiplied by `factor`
    pub fn scaled(&self, factor: f64) -> ShockSet {
        ShockSet {
            scalars: self.scalars.iter().map(|(k, v)| (*k, v * factor)).collect(),
            fx: self.fx.iter().map(|(k, v)| (k.clone(), v * factor)).collect(),
        }
    }

    /// Weighted sum of several shock sets; absent shocks count as zero
    pub fn weighted_sum<'a>(parts: impl IntoIterator<Item = (&'a ShockSet, f64)>) -> ShockSet {
        let mut combined = ShockSet::new();
        for (shocks, weight) in parts {
            for (factor, value) in &shocks.scalars {
                *combined.scalars.entry(*factor).or_insert(0.0) += value * weight;
            }
            for (currency, value) in &shocks.fx {
                *combined.fx.entry(currency.clone()).or_insert(0.0) += value * weight;
            }
        }
        combined
    }
}

impl TryFrom<BTreeMap<String, ShockValue>> for ShockSet {
    type Error = RiskError;

    fn try_from(map: BTreeMap<String, ShockValue>) -> Result<Self> {
        ShockSet::from_map(map)
    }
}

impl From<ShockSet> for BTreeMap<String, ShockValue> {
    fn from(shocks: ShockSet) -> Self {
        let mut map: BTreeMap<String, ShockValue> = shocks
            .scalars
            .into_iter()
            .map(|(factor, value)| (factor.as_str().to_string(), ShockValue::Scalar(value)))
            .collect();
        if !shocks.fx.is_empty() {
            map.insert(
                ShockFactor::Fx.as_str().to_string(),
                ShockValue::PerCurrency(shocks.fx),
            );
        }
        map
    }
}

/// How a scenario came to be
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScenarioOrigin {
    /// Built-in catalog entry scaled by `severity`
    Predefined { severity: f64 },

    /// User-defined shocks
    Custom,

    /// One point of a single-factor sensitivity sweep
    Sensitivity {
        factor: ShockFactor,
        base_value: f64,
        shock_value: f64,
        relative_shock: f64,
    },

    /// Weighted blend of other scenarios
    Combined {
        components: Vec<String>,
        weights: Vec<f64>,
    },

    /// Observed factor moves between two dates
    Historical {
        start_date: NaiveDate,
        end_date: NaiveDate,
    },

    /// One draw of a simulated batch
    MonteCarlo {
        scenario_number: usize,
        total_scenarios: usize,
        seed: Option<u64>,
    },
}

/// Immutable stress scenario
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ScenarioRecord")]
pub struct Scenario {
    name: String,
    description: String,
    shocks: ShockSet,
    origin: ScenarioOrigin,
    created_at: DateTime<Utc>,
}

/// Stored form of a [`Scenario`], validated on the way in
#[derive(Deserialize)]
struct ScenarioRecord {
    name: String,
    description: String,
    shocks: ShockSet,
    origin: ScenarioOrigin,
    created_at: DateTime<Utc>,
}

impl TryFrom<ScenarioRecord> for Scenario {
    type Error = RiskError;

    fn try_from(record: ScenarioRecord) -> Result<Self> {
        let scenario =
            Scenario::with_origin(record.name, record.description, record.shocks, record.origin)?;
        Ok(Scenario {
            created_at: record.created_at,
            ..scenario
        })
    }
}

impl Scenario {
    /// Build a custom scenario from validated shocks
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        shocks: ShockSet,
    ) -> Result<Self> {
        Self::with_origin(name, description, shocks, ScenarioOrigin::Custom)
    }

    pub(crate) fn with_origin(
        name: impl Into<String>,
        description: impl Into<String>,
        shocks: ShockSet,
        origin: ScenarioOrigin,
    ) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(RiskError::invalid("scenario name", "must not be empty"));
        }

        Ok(Self {
            name,
            description: description.into(),
            shocks,
            origin,
            created_at: Utc::now(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn shocks(&self) -> &ShockSet {
        &self.shocks
    }

    pub fn origin(&self) -> &ScenarioOrigin {
        &self.origin
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Severity multiplier for catalog scenarios, 1.0 otherwise
    pub fn severity(&self) -> f64 {
        match self.origin {
            ScenarioOrigin::Predefined { severity } => severity,
            _ => 1.0,
        }
    }

    pub fn is_predefined(&self) -> bool {
        matches!(self.origin, ScenarioOrigin::Predefined { .. })
    }
}

/// One built-in scenario definition
pub(crate) struct CatalogEntry {
    pub name: &'static str,
    pub description: &'static str,
    pub shocks: &'static [(ShockFactor, f64)],
    pub fx: &'static [(&'static str, f64)],
}

impl CatalogEntry {
    pub(crate) fn shock_set(&self) -> ShockSet {
        ShockSet {
            scalars: self.shocks.iter().copied().collect(),
            fx: self
                .fx
                .iter()
                .map(|(currency, value)| (currency.to_string(), *value))
                .collect(),
        }
    }
}

pub(crate) const CATALOG: &[CatalogEntry] = &[
    CatalogEntry {
        name: "financial_crisis_2008",
        description: "2008 global financial crisis",
        shocks: &[
            (ShockFactor::Equity, -0.40),
            (ShockFactor::CreditSpread, 0.02),
            (ShockFactor::InterestRate, -0.01),
            (ShockFactor::Volatility, 0.20),
            (ShockFactor::RealEstate, -0.30),
        ],
        fx: &[("USD", 0.0), ("EUR", -0.15), ("GBP", -0.20), ("JPY", 0.10)],
    },
    CatalogEntry {
        name: "rate_shock",
        description: "Sharp rise in interest rates",
        shocks: &[
            (ShockFactor::InterestRate, 0.02),
            (ShockFactor::Equity, -0.15),
            (ShockFactor::CreditSpread, 0.01),
            (ShockFactor::Volatility, 0.10),
        ],
        fx: &[("USD", 0.0), ("EUR", -0.05), ("GBP", -0.08), ("JPY", 0.03)],
    },
    CatalogEntry {
        name: "inflation_shock",
        description: "Inflation surge with tightening rates",
        shocks: &[
            (ShockFactor::InterestRate, 0.03),
            (ShockFactor::Equity, -0.10),
            (ShockFactor::Inflation, 0.05),
            (ShockFactor::CreditSpread, 0.005),
            (ShockFactor::Commodity, 0.25),
        ],
        fx: &[("USD", 0.0), ("EUR", -0.07), ("GBP", -0.05), ("JPY", -0.03)],
    },
    CatalogEntry {
        name: "liquidity_crisis",
        description: "Market-wide liquidity crisis",
        shocks: &[
            (ShockFactor::LiquidityPremium, 0.03),
            (ShockFactor::CreditSpread, 0.015),
            (ShockFactor::Equity, -0.20),
            (ShockFactor::BondLiquidity, -0.30),
            (ShockFactor::Volatility, 0.15),
        ],
        fx: &[("USD", 0.0), ("EUR", -0.10), ("GBP", -0.12), ("JPY", 0.05)],
    },
    CatalogEntry {
        name: "geopolitical_crisis",
        description: "Geopolitical crisis with an energy price spike",
        shocks: &[
            (ShockFactor::Equity, -0.25),
            (ShockFactor::Energy, 0.40),
            (ShockFactor::Volatility, 0.25),
            (ShockFactor::CreditSpread, 0.01),
            (ShockFactor::InterestRate, 0.005),
        ],
        fx: &[("USD", 0.0), ("EUR", -0.08), ("GBP", -0.05), ("JPY", 0.08)],
    },
];

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(entries: &[(&str, ShockValue)]) -> BTreeMap<String, ShockValue> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_factor_round_trip_names() {
        for factor in ShockFactor::ALL {
            assert_eq!(factor.as_str().parse::<ShockFactor>().unwrap(), factor);
        }
        assert!(matches!(
            "equities".parse::<ShockFactor>(),
            Err(RiskError::InvalidShockFactor { .. })
        ));
    }

    #[test]
    fn test_from_map() {
        let fx: BTreeMap<String, f64> = [("EUR".to_string(), -0.1)].into_iter().collect();
        let shocks = ShockSet::from_map(raw(&[
            ("equity", (-0.2).into()),
            ("interest_rate", 0.01.into()),
            ("fx", ShockValue::PerCurrency(fx)),
        ]))
        .unwrap();

        assert_eq!(shocks.get(ShockFactor::Equity), Some(-0.2));
        assert_eq!(shocks.value(ShockFactor::CreditSpread), 0.0);
        assert_eq!(shocks.fx("EUR"), Some(-0.1));
        assert_eq!(shocks.fx("JPY"), None);
    }

    #[test]
    fn test_unknown_key_rejected() {
        let result = ShockSet::from_map(raw(&[("equity", (-0.2).into()), ("gold", 0.1.into())]));

        match result {
            Err(RiskError::InvalidShockFactor { factor, .. }) => assert_eq!(factor, "gold"),
            other => panic!("expected InvalidShockFactor, got {:?}", other),
        }
    }

    #[test]
    fn test_wrong_shape_rejected() {
        let result = ShockSet::from_map(raw(&[("fx", 0.1.into())]));
        assert!(matches!(result, Err(RiskError::InvalidShockFactor { .. })));

        let map: BTreeMap<String, f64> = [("USD".to_string(), 0.0)].into_iter().collect();
        let result = ShockSet::from_map(raw(&[("equity", ShockValue::PerCurrency(map))]));
        assert!(matches!(result, Err(RiskError::InvalidShockFactor { .. })));

        let result = ShockSet::new().with_shock(ShockFactor::Equity, f64::NAN);
        assert!(matches!(result, Err(RiskError::InvalidShockFactor { .. })));
    }

    #[test]
    fn test_json_shape() {
        let json = r#"{"equity": -0.4, "fx": {"EUR": -0.15, "USD": 0.0}}"#;
        let shocks: ShockSet = serde_json::from_str(json).unwrap();

        assert_eq!(shocks.get(ShockFactor::Equity), Some(-0.4));
        assert_eq!(shocks.fx("EUR"), Some(-0.15));

        let back = serde_json::to_value(&shocks).unwrap();
        assert_eq!(back["equity"], serde_json::json!(-0.4));
        assert_eq!(back["fx"]["EUR"], serde_json::json!(-0.15));

        let bad = serde_json::from_str::<ShockSet>(r#"{"equities": -0.4}"#);
        assert!(bad.is_err());
    }

    #[test]
    fn test_json_preserves_shock_bits() {
        let shocks = ShockSet::new()
            .with_shock(ShockFactor::RealEstate, -0.19999999999999998)
            .unwrap()
            .with_fx("EUR", 0.1 + 0.2)
            .unwrap();

        let json = serde_json::to_string(&shocks).unwrap();
        let back: ShockSet = serde_json::from_str(&json).unwrap();

        assert_eq!(back.get(ShockFactor::RealEstate), Some(-0.19999999999999998));
        assert_eq!(back.fx("EUR"), Some(0.1 + 0.2));
        assert_eq!(back, shocks);
    }

    #[test]
    fn test_scenario_deserialization_is_validated() {
        let scenario = Scenario::new(
            "custom",
            "d",
            ShockSet::new().with_shock(ShockFactor::Equity, -0.1).unwrap(),
        )
        .unwrap();
        let json = serde_json::to_string(&scenario).unwrap();
        let back: Scenario = serde_json::from_str(&json).unwrap();
        assert_eq!(back, scenario);

        let mut value = serde_json::to_value(&scenario).unwrap();
        value["name"] = serde_json::json!("  ");
        let bad = serde_json::from_value::<Scenario>(value);
        assert!(bad.is_err());
    }

    #[test]
    fn test_scaled_and_weighted_sum() {
        let a = ShockSet::new()
            .with_shock(ShockFactor::Equity, -0.2)
            .unwrap()
            .with_fx("EUR", -0.1)
            .unwrap();
        let b = ShockSet::new()
            .with_shock(ShockFactor::InterestRate, 0.02)
            .unwrap();

        let doubled = a.scaled(2.0);
        assert_eq!(doubled.get(ShockFactor::Equity), Some(-0.4));
        assert_eq!(doubled.fx("EUR"), Some(-0.2));

        let blend = ShockSet::weighted_sum([(&a, 0.5), (&b, 0.5)]);
        assert_eq!(blend.get(ShockFactor::Equity), Some(-0.1));
        assert_eq!(blend.get(ShockFactor::InterestRate), Some(0.01));
        assert_eq!(blend.fx("EUR"), Some(-0.05));
    }

    #[test]
    fn test_scenario_is_validated() {
        assert!(Scenario::new("", "no name", ShockSet::new()).is_err());

        let scenario = Scenario::new("custom", "d", ShockSet::new()).unwrap();
        assert_eq!(scenario.origin(), &ScenarioOrigin::Custom);
        assert_eq!(scenario.severity(), 1.0);
        assert!(scenario.shocks().is_zero());
    }

    #[test]
    fn test_catalog_entries_valid() {
        for entry in CATALOG {
            let shocks = entry.shock_set();
            assert!(!shocks.is_empty(), "{} has no shocks", entry.name);
            assert_eq!(shocks.fx_shocks().len(), 4);
            assert_eq!(shocks.get(ShockFactor::Fx), None);
        }
    }
}
