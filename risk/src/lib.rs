//! # ag-portfolio-risk: Portfolio VaR and Stress Testing
//!
//! This library computes Value-at-Risk style metrics for a weighted
//! portfolio and evaluates the portfolio under adverse market scenarios.
//!
//! ## Core Components
//!
//! - **Returns Preparation**: aligned, cleaned return series from price histories
//! - **VarEngine**: VaR/CVaR with historical, parametric and Monte Carlo methods
//! - **ScenarioGenerator**: built-in scenario catalog plus custom, historical
//!   and simulated scenarios
//! - **StressTestEngine**: applies scenarios to a position table
//!
//! ## Example Usage
//!
//! ```rust
//! use ag_portfolio_risk::{
//!     apply_scenario, compute_var, get_predefined_scenario, AssetClass, Portfolio,
//!     PortfolioPosition, ReturnSeries, VarMethod,
//! };
//! use chrono::NaiveDate;
//!
//! let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
//! let dates: Vec<NaiveDate> = (0..60).map(|i| start + chrono::Duration::days(i)).collect();
//! let equity: Vec<f64> = (0..60).map(|i| (i as f64 * 0.5).sin() * 0.02).collect();
//! let bonds: Vec<f64> = (0..60).map(|i| (i as f64 * 0.3).cos() * 0.005).collect();
//!
//! let returns = ReturnSeries::new(
//!     dates,
//!     vec!["EQ".to_string(), "BD".to_string()],
//!     vec![equity, bonds],
//! )
//! .unwrap();
//!
//! let result = compute_var(&returns, &[0.6, 0.4], 0.95, 1, VarMethod::Historical).unwrap();
//! assert!(result.var > 0.0);
//! assert!(result.cvar >= result.var);
//!
//! let portfolio = Portfolio::from_positions(vec![
//!     PortfolioPosition::new("EQ", AssetClass::Equity, "USD", 100.0, 60.0),
//!     PortfolioPosition::new("BD", AssetClass::GovernmentBond, "USD", 40.0, 100.0)
//!         .with_duration(6.0),
//! ])
//! .unwrap();
//!
//! let scenario = get_predefined_scenario("rate_shock").unwrap();
//! let (shocked, impact) = apply_scenario(&portfolio, &scenario).unwrap();
//! assert!(impact.absolute_impact < 0.0);
//! assert!(shocked.total_value() < portfolio.total_value());
//! ```

pub mod config;
pub mod error;
pub mod generator;
pub mod portfolio;
pub mod returns;
pub mod scenario;
pub mod store;
pub mod stress;
pub mod var;

pub use config::RiskConfig;
pub use error::{Result, RiskError};
pub use generator::{create_custom_scenario, get_predefined_scenario, ScenarioGenerator};
pub use portfolio::{PortfolioAnalyzer, RiskContribution};
pub use returns::{
    prepare_returns, Frequency, MissingDataPolicy, PricePoint, ReturnMethod, ReturnSeries,
    ReturnsConfig, ReturnsPreparer,
};
pub use scenario::{Scenario, ScenarioOrigin, ShockFactor, ShockSet, ShockValue};
pub use store::{InMemoryScenarioStore, JsonDirScenarioStore, ScenarioStore};
pub use stress::{
    apply_scenario, AssetClass, DurationPolicy, Portfolio, PortfolioPosition, PositionImpact,
    StressConfig, StressImpact, StressTestEngine, StressTestReport,
};
pub use var::{
    compute_var, ComponentVar, IncrementalVar, MonteCarloConfig, RiskMetricsResult,
    SimulationModel, VarBacktestResult, VarConfig, VarEngine, VarMethod,
};

// Initialize tracing
pub fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();
}
