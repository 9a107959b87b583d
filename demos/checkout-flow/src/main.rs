//! # Checkout Flow Demo
//!
//! A cart composable loads the catalog with an `AsyncStateCell` while a
//! checkout runs as an `AsyncTaskChain`: price the cart, apply a discount,
//! then reserve stock. Each step receives the previous step's total.
//!
//! ```bash
//! RUST_LOG=debug cargo run --bin checkout-flow
//! TENDRIL_CONFIG=tendril.toml cargo run --bin checkout-flow
//! ```

use async_trait::async_trait;
use std::time::Duration;
use tendril_core::prelude::*;
use tendril_runtime::prelude::*;

#[derive(Debug, Clone, PartialEq)]
struct Catalog {
    items: Vec<(String, u64)>,
}

/// Takes 10% off the running total.
struct Discount;

#[async_trait]
impl Task<u64> for Discount {
    type Error = String;

    async fn run(&self, previous: Option<u64>) -> Result<u64, Self::Error> {
        let total = previous.ok_or("nothing to discount")?;
        Ok(total - total / 10)
    }
}

async fn load_catalog() -> Result<Catalog, String> {
    tokio::time::sleep(Duration::from_millis(30)).await;
    Ok(Catalog {
        items: vec![("kettle".to_string(), 4_500), ("teapot".to_string(), 2_000)],
    })
}

fn load_config() -> anyhow::Result<TendrilConfig> {
    match std::env::var("TENDRIL_CONFIG") {
        Ok(path) => Ok(TendrilConfig::from_file(path)?),
        Err(_) => Ok(TendrilConfig::default()),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tendril_observe::init_stdout_tracing()?;

    let scope = Scope::current()?.with_config(load_config()?)?;

    let catalog = AsyncStateCell::new(&scope, load_catalog, Catalog { items: Vec::new() })?;
    catalog.is_ready().observe(|ready| tracing::info!(ready, "catalog readiness changed"))?;
    tracing::info!(loading = catalog.is_loading().get(), "catalog requested");

    let snapshot = catalog.settled().await;
    let prices: Vec<u64> = snapshot.value.items.iter().map(|(_, price)| *price).collect();

    let checkout = AsyncTaskChain::<u64, String>::builder("checkout")
        .then(move |_| {
            let prices = prices.clone();
            async move { Ok(prices.iter().sum::<u64>()) }
        })
        .then_task(Discount)
        .then(|total| async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            total.ok_or_else(|| "no total to reserve".to_string())
        })
        .on_error(|error| tracing::error!(%error, "checkout halted"))
        .build(&scope)?;

    let status = checkout.finished().await;
    tracing::info!(
        ?status,
        total = ?checkout.result().get(),
        steps = checkout.active_index().get(),
        "checkout finished"
    );

    scope.scheduler().flush();
    scope.dispose();
    Ok(())
}
