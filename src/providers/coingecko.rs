use super::util::get_success;
use crate::core::coin::{CoinRef, CoinUniverseProvider};
use crate::core::config::MAX_PAGE_SIZE;
use crate::core::throttle::Throttle;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

#[derive(Deserialize, Debug)]
struct MarketCoin {
    id: String,
    symbol: String,
    name: String,
    market_cap: Option<f64>,
    current_price: Option<f64>,
    market_cap_rank: Option<u32>,
}

impl From<MarketCoin> for CoinRef {
    fn from(coin: MarketCoin) -> Self {
        CoinRef {
            provider_id: coin.id,
            symbol: coin.symbol,
            name: coin.name,
            market_cap_rank: coin.market_cap_rank,
            current_price: coin.current_price,
            market_cap: coin.market_cap,
        }
    }
}

#[derive(Debug)]
enum PageOutcome {
    Coins(Vec<CoinRef>),
    Exhausted,
    Failed(anyhow::Error),
}

/// Ranked market listing from the CoinGecko `/coins/markets` endpoint.
pub struct CoinGeckoProvider {
    base_url: String,
    vs_currency: String,
    page_size: usize,
    page_delay: Duration,
    client: Client,
    throttle: Arc<dyn Throttle>,
}

impl CoinGeckoProvider {
    pub fn new(
        base_url: &str,
        vs_currency: &str,
        client: Client,
        throttle: Arc<dyn Throttle>,
    ) -> Self {
        CoinGeckoProvider {
            base_url: base_url.trim_end_matches('/').to_string(),
            vs_currency: vs_currency.to_string(),
            page_size: MAX_PAGE_SIZE,
            page_delay: Duration::from_secs(1),
            client,
            throttle,
        }
    }

    /// Page size is clamped to `1..=250`.
    pub fn with_paging(mut self, page_size: usize, page_delay: Duration) -> Self {
        self.page_size = page_size.clamp(1, MAX_PAGE_SIZE);
        self.page_delay = page_delay;
        self
    }

    async fn request_page(&self, page: usize, per_page: usize) -> Result<Vec<MarketCoin>> {
        let url = format!(
            "{}/coins/markets?vs_currency={}&order=market_cap_desc&per_page={}&page={}&sparkline=false",
            self.base_url, self.vs_currency, per_page, page
        );
        let response = get_success(&self.client, &url).await?;
        let text = response
            .text()
            .await
            .context("Failed to read markets response")?;
        serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse markets response for page {page}"))
    }

    async fn fetch_page(&self, page: usize, per_page: usize) -> PageOutcome {
        match self.request_page(page, per_page).await {
            Ok(coins) if coins.is_empty() => PageOutcome::Exhausted,
            Ok(coins) => PageOutcome::Coins(coins.into_iter().map(CoinRef::from).collect()),
            Err(e) => PageOutcome::Failed(e),
        }
    }
}

#[async_trait]
impl CoinUniverseProvider for CoinGeckoProvider {
    #[instrument(name = "CoinGeckoFetchTop", skip(self))]
    async fn fetch_top(&self, limit: usize) -> Vec<CoinRef> {
        let per_page = limit.min(self.page_size);
        let mut coins: Vec<CoinRef> = Vec::new();
        let mut page = 1;

        while coins.len() < limit {
            if page > 1 {
                self.throttle.pause(self.page_delay).await;
            }
            match self.fetch_page(page, per_page).await {
                PageOutcome::Coins(batch) => {
                    debug!(page, count = batch.len(), "Received markets page");
                    coins.extend(batch);
                    page += 1;
                }
                PageOutcome::Exhausted => {
                    debug!(page, "Markets listing exhausted");
                    break;
                }
                PageOutcome::Failed(e) => {
                    warn!(
                        page,
                        collected = coins.len(),
                        error = %format!("{e:#}"),
                        "Markets request failed, keeping coins collected so far"
                    );
                    break;
                }
            }
        }

        coins.truncate(limit);
        coins
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::throttle::NoThrottle;
    use crate::providers::util::build_client;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn coins_json(start_rank: usize, count: usize) -> String {
        let items: Vec<String> = (start_rank..start_rank + count)
            .map(|rank| {
                format!(
                    r#"{{"id":"coin-{rank}","symbol":"c{rank}","name":"Coin {rank}","market_cap":{},"current_price":{},"market_cap_rank":{rank}}}"#,
                    1_000_000 - rank,
                    rank as f64 * 1.5
                )
            })
            .collect();
        format!("[{}]", items.join(","))
    }

    async fn mount_page(server: &MockServer, page: usize, status: u16, body: String) {
        Mock::given(method("GET"))
            .and(path("/coins/markets"))
            .and(query_param("page", page.to_string()))
            .respond_with(ResponseTemplate::new(status).set_body_string(body))
            .mount(server)
            .await;
    }

    fn provider(server: &MockServer, page_size: usize) -> CoinGeckoProvider {
        CoinGeckoProvider::new(
            &server.uri(),
            "usd",
            build_client(Duration::from_secs(5)).unwrap(),
            Arc::new(NoThrottle),
        )
        .with_paging(page_size, Duration::ZERO)
    }

    #[tokio::test]
    async fn test_fetch_top_parses_listing() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/coins/markets"))
            .and(query_param("vs_currency", "usd"))
            .and(query_param("order", "market_cap_desc"))
            .and(query_param("per_page", "2"))
            .and(query_param("page", "1"))
            .and(query_param("sparkline", "false"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"[
                    {"id":"bitcoin","symbol":"btc","name":"Bitcoin","market_cap":1300000000000,"current_price":65000.5,"market_cap_rank":1},
                    {"id":"ethereum","symbol":"eth","name":"Ethereum","market_cap":null,"current_price":null,"market_cap_rank":null,"total_volume":1}
                ]"#,
            ))
            .mount(&mock_server)
            .await;

        let coins = provider(&mock_server, 250).fetch_top(2).await;

        assert_eq!(coins.len(), 2);
        assert_eq!(coins[0].provider_id, "bitcoin");
        assert_eq!(coins[0].symbol, "btc");
        assert_eq!(coins[0].name, "Bitcoin");
        assert_eq!(coins[0].market_cap_rank, Some(1));
        assert_eq!(coins[0].current_price, Some(65000.5));
        assert_eq!(coins[0].market_cap, Some(1.3e12));
        assert_eq!(coins[1].market_cap_rank, None);
        assert_eq!(coins[1].current_price, None);
    }

    #[tokio::test]
    async fn test_truncates_oversized_pages_to_limit() {
        let mock_server = MockServer::start().await;
        // Provider ignores per_page and returns a full page.
        mount_page(&mock_server, 1, 200, coins_json(1, 250)).await;

        let coins = provider(&mock_server, 250).fetch_top(100).await;

        assert_eq!(coins.len(), 100);
        assert!(
            coins
                .iter()
                .enumerate()
                .all(|(i, c)| c.market_cap_rank == Some(i as u32 + 1))
        );
    }

    #[tokio::test]
    async fn test_pages_until_limit_and_truncates() {
        let mock_server = MockServer::start().await;
        mount_page(&mock_server, 1, 200, coins_json(1, 250)).await;
        mount_page(&mock_server, 2, 200, coins_json(251, 250)).await;
        mount_page(&mock_server, 3, 200, coins_json(501, 30)).await;

        let coins = provider(&mock_server, 250).fetch_top(510).await;

        assert_eq!(coins.len(), 510);
        assert_eq!(coins[0].provider_id, "coin-1");
        assert_eq!(coins[509].provider_id, "coin-510");
    }

    #[tokio::test]
    async fn test_stops_on_empty_page() {
        let mock_server = MockServer::start().await;
        mount_page(&mock_server, 1, 200, coins_json(1, 3)).await;
        mount_page(&mock_server, 2, 200, "[]".to_string()).await;

        let coins = provider(&mock_server, 3).fetch_top(10).await;

        assert_eq!(coins.len(), 3);
        let requests = mock_server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 2);
    }

    #[tokio::test]
    async fn test_keeps_partial_result_on_failure() {
        let mock_server = MockServer::start().await;
        mount_page(&mock_server, 1, 200, coins_json(1, 5)).await;
        mount_page(&mock_server, 2, 429, "rate limited".to_string()).await;
        mount_page(&mock_server, 3, 200, coins_json(11, 5)).await;

        let coins = provider(&mock_server, 5).fetch_top(15).await;

        assert_eq!(coins.len(), 5);
        assert_eq!(coins[4].provider_id, "coin-5");
        // Pagination stops at the failed page.
        let requests = mock_server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 2);
    }

    #[tokio::test]
    async fn test_malformed_first_page_yields_nothing() {
        let mock_server = MockServer::start().await;
        mount_page(&mock_server, 1, 200, r#"{"status":"oops"}"#.to_string()).await;

        let coins = provider(&mock_server, 250).fetch_top(100).await;
        assert!(coins.is_empty());
    }

    #[tokio::test]
    async fn test_zero_limit_makes_no_request() {
        let mock_server = MockServer::start().await;
        let coins = provider(&mock_server, 250).fetch_top(0).await;
        assert!(coins.is_empty());
        assert!(mock_server.received_requests().await.unwrap().is_empty());
    }
}
