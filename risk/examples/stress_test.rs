//! Stress testing example
//!
//! Runs the built-in scenarios and a custom one against a mixed portfolio.
//!
//! Run with: cargo run --example stress_test

use ag_portfolio_risk::*;
use std::collections::BTreeMap;

fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    println!("=== Stress Testing Example ===\n");

    let portfolio = Portfolio::from_positions(vec![
        PortfolioPosition::new("SPY", AssetClass::Equity, "USD", 200.0, 450.0),
        PortfolioPosition::new("EZU", AssetClass::Equity, "EUR", 500.0, 48.0),
        PortfolioPosition::new("IEF", AssetClass::GovernmentBond, "USD", 300.0, 95.0)
            .with_duration(7.5)
            .with_convexity(70.0),
        PortfolioPosition::new("LQD", AssetClass::CorporateBond, "USD", 150.0, 108.0)
            .with_duration(8.3),
        PortfolioPosition::new("VNQ", AssetClass::RealEstate, "USD", 100.0, 85.0),
        PortfolioPosition::new("GLD", AssetClass::Commodity, "USD", 40.0, 190.0),
        PortfolioPosition::new("CASH", AssetClass::Cash, "USD", 1.0, 20_000.0),
    ])?;

    println!("Portfolio value: ${:.2}\n", portfolio.total_value());

    let generator = ScenarioGenerator::new();
    let mut scenarios = generator
        .predefined_names()
        .into_iter()
        .map(|name| generator.get_predefined_scenario(name))
        .collect::<Result<Vec<_>>>()?;

    let mut shocks = BTreeMap::new();
    shocks.insert("equity".to_string(), ShockValue::Scalar(-0.30));
    shocks.insert("volatility".to_string(), ShockValue::Scalar(0.15));
    scenarios.push(generator.create_custom_scenario("tech_selloff", "Technology sell-off", shocks, false)?);

    let engine = StressTestEngine::default();
    let results = engine.run_scenarios(&portfolio, &scenarios)?;

    for impact in &results {
        println!(
            "{:<24} {:>12.2} ({:>7.2}%)  worst: {}",
            impact.scenario_name,
            impact.absolute_impact,
            impact.percentage_impact,
            impact.worst_position.as_deref().unwrap_or("-")
        );
    }

    let report = engine.generate_report(&results)?;
    println!();
    println!("Worst scenario: {} ({:.2})", report.worst_scenario, report.max_loss);
    println!("Best scenario:  {} ({:.2})", report.best_scenario, report.max_gain);
    println!("Average impact: {:.2}", report.average_impact);

    Ok(())
}
