//! VaR calculation example
//!
//! Prepares returns from a price history and compares the three VaR methods.
//!
//! Run with: cargo run --example calculate_var

use ag_portfolio_risk::*;
use chrono::NaiveDate;

fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    println!("=== Value at Risk (VaR) Calculation Example ===\n");

    // 1. Build 250 days of prices for three assets
    let start = NaiveDate::from_ymd_opt(2024, 1, 2).ok_or("invalid start date")?;
    let mut prices = Vec::new();
    for (j, asset) in ["EQUITY", "BONDS", "GOLD"].iter().enumerate() {
        let mut price = 100.0;
        for i in 0..250 {
            let date = start + chrono::Duration::days(i);
            prices.push(PricePoint::new(*asset, date, price));
            let drift = (i as f64 * (0.11 + 0.07 * j as f64)).sin() * 0.01;
            let noise = ((i as usize * (17 + j)) % 100) as f64 / 100.0 * 0.004 - 0.002;
            price *= 1.0 + drift + noise;
        }
    }

    let returns = prepare_returns(&prices, &ReturnsConfig::default())?;
    println!("Observations: {}", returns.len());
    println!("Assets: {:?}", returns.assets());
    println!();

    // 2. Create VaR engine with a fixed seed for reproducible Monte Carlo
    let engine = VarEngine::new(VarConfig {
        monte_carlo: MonteCarloConfig::default().with_seed(42),
        ..Default::default()
    });

    let weights = [0.3, 0.5, 0.2];
    let portfolio_value = 1_000_000.0;
    let confidence_level = 0.95;
    let time_horizon = 1;

    println!("Portfolio: ${:.0}", portfolio_value);
    println!("Confidence Level: {}%", confidence_level * 100.0);
    println!("Time Horizon: {} day(s)", time_horizon);
    println!();

    // 3. Compare methods
    for method in [VarMethod::Historical, VarMethod::Parametric, VarMethod::MonteCarlo] {
        let result = engine.compute_var(&returns, &weights, confidence_level, time_horizon, method)?;
        println!("--- {:?} ---", method);
        println!("VaR:  {:.4}% (${:.2})", result.var * 100.0, result.var_amount(portfolio_value));
        println!("CVaR: {:.4}% (${:.2})", result.cvar * 100.0, result.cvar_amount(portfolio_value));

        if let Some(contributions) = &result.risk_contributions {
            for c in contributions {
                println!("  {:<8} weight {:.2}  contribution {:.4}%", c.asset_id, c.weight, c.contribution * 100.0);
            }
        }
        println!();
    }

    // 4. Component VaR
    println!("--- Component VaR (parametric) ---");
    for c in engine.calculate_component_var(&returns, &weights, confidence_level, time_horizon)? {
        println!("  {:<8} {:.4}% ({:.1}% of total)", c.asset_id, c.component_var * 100.0, c.pct_contribution * 100.0);
    }

    Ok(())
}
