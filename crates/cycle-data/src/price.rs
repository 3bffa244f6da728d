//! # Native Currency Price Quote
//!
//! Fetches the USD price of the chain's native currency from the CoinGecko
//! public `simple/price` endpoint. The monitor queries it exactly once at
//! startup and converts every fee with that single quote for the whole run.

use eyre::{eyre, Context, Result};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use tracing::{debug, info};

/// CoinGecko public API base URL (no API key required).
const COINGECKO_BASE_URL: &str = "https://api.coingecko.com/api/v3";

/// Fetches the USD price of `coin_id` (e.g. `"binancecoin"`).
///
/// # Errors
///
/// Returns error if the HTTP request fails, the response is not JSON, or the
/// coin is missing from the response.
#[tracing::instrument]
pub async fn fetch_native_price_usd(coin_id: &str) -> Result<Decimal> {
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(10))
        .build()
        .wrap_err("failed to build HTTP client")?;

    let url = format!(
        "{}/simple/price?ids={}&vs_currencies=usd",
        COINGECKO_BASE_URL, coin_id
    );
    debug!(url = %url, "fetching native price");

    let response = client
        .get(&url)
        .send()
        .await
        .wrap_err("CoinGecko price request failed")?;

    let status = response.status();
    if !status.is_success() {
        return Err(eyre!("CoinGecko returned HTTP {}", status.as_u16()));
    }

    let body = response
        .text()
        .await
        .wrap_err("failed to read CoinGecko response body")?;

    let price = parse_simple_price(&body, coin_id)?;
    info!(coin_id, price = %price, "native price captured");
    Ok(price)
}

/// Extracts `{coin_id: {usd: <number>}}` from a `simple/price` body.
fn parse_simple_price(body: &str, coin_id: &str) -> Result<Decimal> {
    let value: serde_json::Value =
        serde_json::from_str(body).wrap_err("failed to parse CoinGecko JSON")?;

    let usd = value
        .get(coin_id)
        .and_then(|coin| coin.get("usd"))
        .and_then(|usd| usd.as_f64())
        .ok_or_else(|| eyre!("no usd price for {coin_id} in response"))?;

    Decimal::from_f64(usd).ok_or_else(|| eyre!("price {usd} is not representable"))
}
