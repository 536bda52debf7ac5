//! Returns preparation
//!
//! Turns a long-format price history (asset, date, price) into a
//! [`ReturnSeries`]: a dates × assets matrix where every asset shares the
//! same date index. How missing prices are treated is an explicit
//! [`MissingDataPolicy`], never an implicit fill.

use crate::error::{Result, RiskError};
use chrono::{Datelike, NaiveDate};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::{debug, warn};

/// Default minimum number of return observations
pub const DEFAULT_MIN_OBSERVATIONS: usize = 20;

/// One price observation handed over by market-data collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    /// Asset identifier (e.g., ticker)
    pub asset_id: String,

    /// Observation date
    pub date: NaiveDate,

    /// Closing price; `None` marks a known gap in the source data
    pub price: Option<f64>,
}

impl PricePoint {
    pub fn new(asset_id: impl Into<String>, date: NaiveDate, price: f64) -> Self {
        Self {
            asset_id: asset_id.into(),
            date,
            price: Some(price),
        }
    }

    pub fn missing(asset_id: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            asset_id: asset_id.into(),
            date,
            price: None,
        }
    }
}

/// How returns are computed from consecutive prices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnMethod {
    /// p_t / p_{t-1} - 1
    #[default]
    Simple,
    /// ln(p_t / p_{t-1})
    Log,
}

/// Treatment of dates where some asset has no price
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingDataPolicy {
    /// Carry the last known price forward. Dates before an asset's first
    /// observation are still dropped.
    ForwardFill,
    /// Inner join on date: drop every date where any asset is missing
    #[default]
    DropRow,
    /// Refuse the input with [`RiskError::MissingPrice`]
    Fail,
}

/// Sampling frequency of the produced returns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    #[default]
    Daily,
    /// Aggregated per ISO week
    Weekly,
    /// Aggregated per calendar month
    Monthly,
}

/// Returns preparation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnsConfig {
    /// Simple or log returns
    #[serde(default)]
    pub method: ReturnMethod,

    /// Missing price policy
    #[serde(default)]
    pub missing_data: MissingDataPolicy,

    /// Output frequency
    #[serde(default)]
    pub frequency: Frequency,

    /// Minimum number of returns remaining after alignment
    #[serde(default = "default_min_observations")]
    pub min_observations: usize,
}

fn default_min_observations() -> usize {
    DEFAULT_MIN_OBSERVATIONS
}

impl Default for ReturnsConfig {
    fn default() -> Self {
        Self {
            method: ReturnMethod::default(),
            missing_data: MissingDataPolicy::default(),
            frequency: Frequency::default(),
            min_observations: DEFAULT_MIN_OBSERVATIONS,
        }
    }
}

impl ReturnsConfig {
    pub fn validate(&self) -> Result<()> {
        if self.min_observations < 2 {
            return Err(RiskError::invalid(
                "returns.min_observations",
                format!("must be at least 2, got {}", self.min_observations),
            ));
        }
        Ok(())
    }
}

/// Time-aligned asset returns
///
/// Rows are dates (strictly increasing), columns are assets. Every column
/// shares the same date index.
#[derive(Debug, Clone, PartialEq)]
pub struct ReturnSeries {
    dates: Vec<NaiveDate>,
    assets: Vec<String>,
    values: DMatrix<f64>,
}

impl ReturnSeries {
    /// Build a series from one return column per asset
    pub fn new(dates: Vec<NaiveDate>, assets: Vec<String>, columns: Vec<Vec<f64>>) -> Result<Self> {
        if assets.is_empty() {
            return Err(RiskError::InsufficientData("No assets provided".to_string()));
        }

        if columns.len() != assets.len() {
            return Err(RiskError::mismatch("return columns", assets.len(), columns.len()));
        }

        let mut seen = HashSet::new();
        for asset in &assets {
            if !seen.insert(asset.as_str()) {
                return Err(RiskError::invalid("assets", format!("duplicate asset {}", asset)));
            }
        }

        if dates.windows(2).any(|w| w[0] >= w[1]) {
            return Err(RiskError::invalid("dates", "must be strictly increasing"));
        }

        for (asset, column) in assets.iter().zip(&columns) {
            if column.len() != dates.len() {
                return Err(RiskError::mismatch(
                    format!("returns of asset {}", asset),
                    dates.len(),
                    column.len(),
                ));
            }
            if let Some(pos) = column.iter().position(|r| !r.is_finite()) {
                return Err(RiskError::invalid(
                    format!("returns of asset {}", asset),
                    format!("non-finite value on {}", dates[pos]),
                ));
            }
        }

        let values = DMatrix::from_fn(dates.len(), assets.len(), |i, j| columns[j][i]);

        Ok(Self { dates, assets, values })
    }

    /// Number of observations (dates)
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn num_assets(&self) -> usize {
        self.assets.len()
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn assets(&self) -> &[String] {
        &self.assets
    }

    /// Raw dates × assets matrix
    pub fn values(&self) -> &DMatrix<f64> {
        &self.values
    }

    /// Return column for one asset
    pub fn asset_returns(&self, asset_id: &str) -> Option<Vec<f64>> {
        let j = self.assets.iter().position(|a| a == asset_id)?;
        Some(self.values.column(j).iter().copied().collect())
    }

    /// Weighted portfolio return on each date (Σ wᵢ rᵢ)
    pub fn portfolio_returns(&self, weights: &DVector<f64>) -> DVector<f64> {
        &self.values * weights
    }

    /// Per-asset sample mean
    pub fn mean_vector(&self) -> DVector<f64> {
        let n = self.len().max(1) as f64;
        DVector::from_fn(self.num_assets(), |j, _| self.values.column(j).sum() / n)
    }

    /// Sample covariance matrix (n - 1 denominator)
    pub fn covariance_matrix(&self) -> Result<DMatrix<f64>> {
        let n = self.len();
        if n < 2 {
            return Err(RiskError::InsufficientData(format!(
                "Need at least 2 observations for a covariance, got {}",
                n
            )));
        }

        let means = self.mean_vector();
        let k = self.num_assets();
        let mut centered = self.values.clone();
        for j in 0..k {
            let mean = means[j];
            for v in centered.column_mut(j).iter_mut() {
                *v -= mean;
            }
        }

        Ok(centered.transpose() * &centered / (n - 1) as f64)
    }
}

/// Converts price histories into aligned return series
#[derive(Debug, Clone, Default)]
pub struct ReturnsPreparer {
    config: ReturnsConfig,
}

impl ReturnsPreparer {
    pub fn new(config: ReturnsConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ReturnsConfig {
        &self.config
    }

    /// Prepare returns for every asset present in `prices`, ordered by
    /// asset id
    pub fn prepare(&self, prices: &[PricePoint]) -> Result<ReturnSeries> {
        let assets: BTreeSet<&str> = prices.iter().map(|p| p.asset_id.as_str()).collect();
        let assets: Vec<String> = assets.into_iter().map(str::to_string).collect();
        self.prepare_aligned(prices, &assets)
    }

    /// Prepare returns for the requested assets, in the requested order
    ///
    /// Use this when the result must line up with a weight vector.
    pub fn prepare_for_assets(&self, prices: &[PricePoint], assets: &[&str]) -> Result<ReturnSeries> {
        let assets: Vec<String> = assets.iter().map(|a| a.to_string()).collect();
        self.prepare_aligned(prices, &assets)
    }

    fn prepare_aligned(&self, prices: &[PricePoint], assets: &[String]) -> Result<ReturnSeries> {
        if assets.is_empty() {
            return Err(RiskError::InsufficientData("No price data provided".to_string()));
        }

        let index: BTreeMap<&str, usize> = assets
            .iter()
            .enumerate()
            .map(|(j, a)| (a.as_str(), j))
            .collect();

        // date -> one slot per asset
        let mut grid: BTreeMap<NaiveDate, Vec<Option<f64>>> = BTreeMap::new();
        let mut seen = HashSet::new();
        let mut observed = vec![0usize; assets.len()];

        for point in prices {
            let Some(&j) = index.get(point.asset_id.as_str()) else {
                continue;
            };

            if !seen.insert((j, point.date)) {
                return Err(RiskError::invalid(
                    "prices",
                    format!("duplicate price for {} on {}", point.asset_id, point.date),
                ));
            }

            if let Some(price) = point.price {
                if !price.is_finite() || price <= 0.0 {
                    return Err(RiskError::invalid(
                        "prices",
                        format!(
                            "price for {} on {} must be positive and finite, got {}",
                            point.asset_id, point.date, price
                        ),
                    ));
                }
                observed[j] += 1;
            }

            grid.entry(point.date).or_insert_with(|| vec![None; assets.len()])[j] = point.price;
        }

        for (asset, count) in assets.iter().zip(&observed) {
            if *count < 2 {
                return Err(RiskError::InsufficientData(format!(
                    "Asset {} has {} price observations, need at least 2",
                    asset, count
                )));
            }
        }

        let rows = self.apply_missing_policy(grid, assets)?;
        let (dates, columns) = self.compute_returns(&rows, assets.len());
        let (dates, columns) = self.resample(dates, columns);

        if dates.len() < self.config.min_observations {
            return Err(RiskError::InsufficientData(format!(
                "Need at least {} aligned returns, got {}",
                self.config.min_observations,
                dates.len()
            )));
        }

        debug!(
            assets = assets.len(),
            observations = dates.len(),
            method = ?self.config.method,
            "Prepared return series"
        );

        ReturnSeries::new(dates, assets.to_vec(), columns)
    }

    fn apply_missing_policy(
        &self,
        grid: BTreeMap<NaiveDate, Vec<Option<f64>>>,
        assets: &[String],
    ) -> Result<Vec<(NaiveDate, Vec<f64>)>> {
        let mut rows = Vec::with_capacity(grid.len());

        match self.config.missing_data {
            MissingDataPolicy::Fail => {
                for (date, slots) in grid {
                    let mut row = Vec::with_capacity(slots.len());
                    for (j, slot) in slots.into_iter().enumerate() {
                        match slot {
                            Some(price) => row.push(price),
                            None => {
                                return Err(RiskError::MissingPrice {
                                    asset_id: assets[j].clone(),
                                    date,
                                })
                            }
                        }
                    }
                    rows.push((date, row));
                }
            }
            MissingDataPolicy::DropRow => {
                let total = grid.len();
                for (date, slots) in grid {
                    if let Some(row) = slots.into_iter().collect::<Option<Vec<f64>>>() {
                        rows.push((date, row));
                    }
                }
                if rows.len() < total {
                    debug!(dropped = total - rows.len(), "Dropped dates with missing prices");
                }
            }
            MissingDataPolicy::ForwardFill => {
                let mut last: Vec<Option<f64>> = vec![None; assets.len()];
                let mut filled = 0usize;
                for (date, slots) in grid {
                    for (j, slot) in slots.into_iter().enumerate() {
                        match slot {
                            Some(price) => last[j] = Some(price),
                            None if last[j].is_some() => filled += 1,
                            None => {}
                        }
                    }
                    if let Some(row) = last.iter().copied().collect::<Option<Vec<f64>>>() {
                        rows.push((date, row));
                    }
                }
                if filled > 0 {
                    warn!(filled, "Forward-filled missing prices");
                }
            }
        }

        Ok(rows)
    }

    fn compute_returns(
        &self,
        rows: &[(NaiveDate, Vec<f64>)],
        num_assets: usize,
    ) -> (Vec<NaiveDate>, Vec<Vec<f64>>) {
        let mut dates = Vec::with_capacity(rows.len().saturating_sub(1));
        let mut columns = vec![Vec::with_capacity(rows.len().saturating_sub(1)); num_assets];

        for pair in rows.windows(2) {
            let (_, prev) = &pair[0];
            let (date, curr) = &pair[1];
            dates.push(*date);
            for j in 0..num_assets {
                let ratio = curr[j] / prev[j];
                columns[j].push(match self.config.method {
                    ReturnMethod::Simple => ratio - 1.0,
                    ReturnMethod::Log => ratio.ln(),
                });
            }
        }

        (dates, columns)
    }

    /// Aggregate daily returns to the configured frequency. Simple returns
    /// compound, log returns add. Each bucket is stamped with its last date.
    fn resample(
        &self,
        dates: Vec<NaiveDate>,
        columns: Vec<Vec<f64>>,
    ) -> (Vec<NaiveDate>, Vec<Vec<f64>>) {
        if self.config.frequency == Frequency::Daily {
            return (dates, columns);
        }

        let bucket = |date: &NaiveDate| -> (i32, u32) {
            match self.config.frequency {
                Frequency::Weekly => (date.iso_week().year(), date.iso_week().week()),
                _ => (date.year(), date.month()),
            }
        };

        let mut out_dates: Vec<NaiveDate> = Vec::new();
        let mut out_columns: Vec<Vec<f64>> = vec![Vec::new(); columns.len()];
        let mut current: Option<(i32, u32)> = None;

        for (i, date) in dates.iter().enumerate() {
            let key = bucket(date);
            let new_bucket = current != Some(key);
            current = Some(key);

            if new_bucket {
                out_dates.push(*date);
                for (j, column) in columns.iter().enumerate() {
                    out_columns[j].push(column[i]);
                }
                continue;
            }

            if let Some(last) = out_dates.last_mut() {
                *last = *date;
            }
            for (j, column) in columns.iter().enumerate() {
                if let Some(acc) = out_columns[j].last_mut() {
                    *acc = match self.config.method {
                        ReturnMethod::Simple => (1.0 + *acc) * (1.0 + column[i]) - 1.0,
                        ReturnMethod::Log => *acc + column[i],
                    };
                }
            }
        }

        (out_dates, out_columns)
    }
}

/// Prepare returns for every asset in `prices` with the given configuration
pub fn prepare_returns(prices: &[PricePoint], config: &ReturnsConfig) -> Result<ReturnSeries> {
    ReturnsPreparer::new(config.clone()).prepare(prices)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn day(n: i64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + chrono::Duration::days(n)
    }

    fn config(min_observations: usize) -> ReturnsConfig {
        ReturnsConfig {
            min_observations,
            ..Default::default()
        }
    }

    fn prices(asset: &str, values: &[f64]) -> Vec<PricePoint> {
        values
            .iter()
            .enumerate()
            .map(|(i, p)| PricePoint::new(asset, day(i as i64), *p))
            .collect()
    }

    #[test]
    fn test_simple_returns() {
        let mut points = prices("A", &[100.0, 110.0, 99.0]);
        points.extend(prices("B", &[50.0, 50.0, 55.0]));

        let series = ReturnsPreparer::new(config(2)).prepare(&points).unwrap();

        assert_eq!(series.assets(), &["A".to_string(), "B".to_string()]);
        assert_eq!(series.dates(), &[day(1), day(2)]);
        let a = series.asset_returns("A").unwrap();
        assert_relative_eq!(a[0], 0.10, epsilon = 1e-12);
        assert_relative_eq!(a[1], -0.10, epsilon = 1e-12);
        let b = series.asset_returns("B").unwrap();
        assert_relative_eq!(b[0], 0.0);
        assert_relative_eq!(b[1], 0.10, epsilon = 1e-12);
    }

    #[test]
    fn test_log_returns() {
        let points = prices("A", &[100.0, 110.0, 121.0]);
        let preparer = ReturnsPreparer::new(ReturnsConfig {
            method: ReturnMethod::Log,
            ..config(2)
        });

        let series = preparer.prepare(&points).unwrap();
        let a = series.asset_returns("A").unwrap();
        assert_relative_eq!(a[0], 1.1f64.ln(), epsilon = 1e-12);
        assert_relative_eq!(a[1], 1.1f64.ln(), epsilon = 1e-12);
    }

    #[test]
    fn test_drop_row_inner_joins_dates() {
        let mut points = prices("A", &[100.0, 101.0, 102.0, 103.0]);
        points.extend(prices("B", &[10.0, 10.0, 10.0, 10.0]));
        // B has no price on day 2
        points.retain(|p| !(p.asset_id == "B" && p.date == day(2)));

        let series = ReturnsPreparer::new(config(2)).prepare(&points).unwrap();

        assert_eq!(series.dates(), &[day(1), day(3)]);
        let a = series.asset_returns("A").unwrap();
        assert_relative_eq!(a[1], 103.0 / 101.0 - 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_forward_fill() {
        let mut points = prices("A", &[100.0, 101.0, 102.0, 103.0]);
        points.extend(prices("B", &[10.0, 11.0, 12.0, 13.0]));
        points.retain(|p| !(p.asset_id == "B" && p.date == day(2)));
        points.push(PricePoint::missing("B", day(2)));

        let preparer = ReturnsPreparer::new(ReturnsConfig {
            missing_data: MissingDataPolicy::ForwardFill,
            ..config(2)
        });
        let series = preparer.prepare(&points).unwrap();

        assert_eq!(series.len(), 3);
        let b = series.asset_returns("B").unwrap();
        assert_relative_eq!(b[1], 0.0);
        assert_relative_eq!(b[2], 13.0 / 11.0 - 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_forward_fill_drops_leading_gap() {
        let mut points = prices("A", &[100.0, 101.0, 102.0, 103.0]);
        points.push(PricePoint::new("B", day(1), 10.0));
        points.push(PricePoint::new("B", day(2), 11.0));
        points.push(PricePoint::new("B", day(3), 12.0));

        let preparer = ReturnsPreparer::new(ReturnsConfig {
            missing_data: MissingDataPolicy::ForwardFill,
            ..config(2)
        });
        let series = preparer.prepare(&points).unwrap();

        assert_eq!(series.dates(), &[day(2), day(3)]);
    }

    #[test]
    fn test_fail_policy_reports_missing_price() {
        let mut points = prices("A", &[100.0, 101.0, 102.0]);
        points.push(PricePoint::new("B", day(0), 10.0));
        points.push(PricePoint::new("B", day(2), 12.0));

        let preparer = ReturnsPreparer::new(ReturnsConfig {
            missing_data: MissingDataPolicy::Fail,
            ..config(2)
        });

        match preparer.prepare(&points) {
            Err(RiskError::MissingPrice { asset_id, date }) => {
                assert_eq!(asset_id, "B");
                assert_eq!(date, day(1));
            }
            other => panic!("expected MissingPrice, got {:?}", other),
        }
    }

    #[test]
    fn test_asset_with_single_price() {
        let mut points = prices("A", &[100.0, 101.0, 102.0]);
        points.push(PricePoint::new("B", day(0), 10.0));

        let result = ReturnsPreparer::new(config(2)).prepare(&points);
        match result {
            Err(RiskError::InsufficientData(msg)) => assert!(msg.contains("B")),
            other => panic!("expected InsufficientData, got {:?}", other),
        }
    }

    #[test]
    fn test_min_observations_after_alignment() {
        let points = prices("A", &[100.0, 101.0, 102.0]);

        let result = ReturnsPreparer::new(ReturnsConfig::default()).prepare(&points);
        assert!(matches!(result, Err(RiskError::InsufficientData(_))));
    }

    #[test]
    fn test_rejects_bad_prices() {
        let points = prices("A", &[100.0, 0.0, 102.0]);
        let result = ReturnsPreparer::new(config(2)).prepare(&points);
        assert!(matches!(result, Err(RiskError::InvalidParameter { .. })));

        let mut points = prices("A", &[100.0, 101.0, 102.0]);
        points.push(PricePoint::new("A", day(1), 101.5));
        let result = ReturnsPreparer::new(config(2)).prepare(&points);
        assert!(matches!(result, Err(RiskError::InvalidParameter { .. })));
    }

    #[test]
    fn test_prepare_for_assets_keeps_requested_order() {
        let mut points = prices("A", &[100.0, 101.0, 102.0]);
        points.extend(prices("B", &[10.0, 11.0, 12.0]));
        points.extend(prices("C", &[1.0, 2.0, 3.0]));

        let series = ReturnsPreparer::new(config(2))
            .prepare_for_assets(&points, &["C", "A"])
            .unwrap();

        assert_eq!(series.assets(), &["C".to_string(), "A".to_string()]);

        let missing = ReturnsPreparer::new(config(2)).prepare_for_assets(&points, &["A", "Z"]);
        assert!(matches!(missing, Err(RiskError::InsufficientData(_))));
    }

    #[test]
    fn test_weekly_resampling_compounds() {
        // 2024-01-01 is a Monday: days 0..=4 fall in ISO week 1, 7..=8 in week 2
        let dates = [0, 1, 2, 3, 4, 7, 8];
        let values = [100.0, 101.0, 102.0, 103.0, 104.0, 105.0, 106.0];
        let points: Vec<PricePoint> = dates
            .iter()
            .zip(values)
            .map(|(d, p)| PricePoint::new("A", day(*d), p))
            .collect();

        let preparer = ReturnsPreparer::new(ReturnsConfig {
            frequency: Frequency::Weekly,
            ..config(2)
        });
        let series = preparer.prepare(&points).unwrap();

        assert_eq!(series.dates(), &[day(4), day(8)]);
        let a = series.asset_returns("A").unwrap();
        assert_relative_eq!(a[0], 104.0 / 100.0 - 1.0, epsilon = 1e-12);
        assert_relative_eq!(a[1], 106.0 / 104.0 - 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_series_statistics() {
        let dates: Vec<NaiveDate> = (0..4).map(day).collect();
        let series = ReturnSeries::new(
            dates,
            vec!["A".to_string(), "B".to_string()],
            vec![vec![0.01, 0.03, -0.01, 0.01], vec![0.02, 0.06, -0.02, 0.02]],
        )
        .unwrap();

        let means = series.mean_vector();
        assert_relative_eq!(means[0], 0.01, epsilon = 1e-12);
        assert_relative_eq!(means[1], 0.02, epsilon = 1e-12);

        let cov = series.covariance_matrix().unwrap();
        // var(A) = (0 + 4 + 4 + 0) e-4 / 3
        assert_relative_eq!(cov[(0, 0)], 8e-4 / 3.0, epsilon = 1e-12);
        assert_relative_eq!(cov[(0, 1)], 2.0 * cov[(0, 0)], epsilon = 1e-12);
        assert_relative_eq!(cov[(0, 1)], cov[(1, 0)]);

        let w = DVector::from_vec(vec![0.5, 0.5]);
        let port = series.portfolio_returns(&w);
        assert_relative_eq!(port[1], 0.045, epsilon = 1e-12);
    }

    #[test]
    fn test_series_validation() {
        let dates: Vec<NaiveDate> = (0..3).map(day).collect();

        let short = ReturnSeries::new(dates.clone(), vec!["A".to_string()], vec![vec![0.0, 0.0]]);
        assert!(matches!(short, Err(RiskError::DimensionMismatch { .. })));

        let nan = ReturnSeries::new(dates.clone(), vec!["A".to_string()], vec![vec![0.0, f64::NAN, 0.0]]);
        assert!(matches!(nan, Err(RiskError::InvalidParameter { .. })));

        let unordered = ReturnSeries::new(
            vec![day(2), day(1), day(3)],
            vec!["A".to_string()],
            vec![vec![0.0; 3]],
        );
        assert!(matches!(unordered, Err(RiskError::InvalidParameter { .. })));
    }
}
