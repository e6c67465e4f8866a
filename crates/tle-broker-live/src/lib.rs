//! Live REST broker adapter, implemented against an Alpaca-style trading
//! API. This is the only crate allowed to hold an HTTP client to a real
//! broker; every other component reaches the broker exclusively through
//! [`tle_broker::BrokerAdapter`].
//!
//! Blocking by design (`reqwest::blocking`): call sites in `tle-worker`
//! already isolate every `BrokerAdapter` call inside `tokio::task::spawn_blocking`,
//! so there is no async context for this client to block.

mod parsing;

use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::HeaderMap;
use tle_broker::{BrokerAdapter, BrokerError, CloseResult, ModifyResult, PlaceResult};
use tle_money::Micros;
use tle_schemas::{Direction, Position, Quote, SymbolInfo, Ticket};

use parsing::{parse_asset_list, parse_order_response, parse_position_list, parse_quote};

/// Live broker connection. Holds the base URL and auth headers only; no
/// mutable state, so a single instance can be shared behind an `Arc` across
/// every caller.
pub struct LiveBroker {
    base_url: String,
    data_base_url: String,
    http: Client,
}

impl LiveBroker {
    /// Builds a client from the three Alpaca-standard environment variables:
    /// `APCA_API_KEY_ID`, `APCA_API_SECRET_KEY`, `APCA_API_BASE_URL` (trading
    /// endpoint; the market-data endpoint is always `data.alpaca.markets`).
    pub fn from_env() -> anyhow::Result<Self> {
        let key_id = std::env::var("APCA_API_KEY_ID")?;
        let secret = std::env::var("APCA_API_SECRET_KEY")?;
        let base_url = std::env::var("APCA_API_BASE_URL")
            .unwrap_or_else(|_| "https://paper-api.alpaca.markets".to_string());
        Self::new(key_id, secret, base_url)
    }

    pub fn new(key_id: String, secret: String, base_url: String) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert("APCA-API-KEY-ID", key_id.parse()?);
        headers.insert("APCA-API-SECRET-KEY", secret.parse()?);

        let http = Client::builder()
            .use_rustls_tls()
            .default_headers(headers)
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            base_url,
            data_base_url: "https://data.alpaca.markets".to_string(),
            http,
        })
    }

    fn unavailable(e: impl std::fmt::Display) -> BrokerError {
        BrokerError::Unavailable(e.to_string())
    }
}

impl BrokerAdapter for LiveBroker {
    fn get_symbols(&self) -> Result<Vec<SymbolInfo>, BrokerError> {
        let url = format!("{}/v2/assets?status=active&asset_class=us_equity", self.base_url);
        let resp = self.http.get(&url).send().map_err(Self::unavailable)?;
        if !resp.status().is_success() {
            return Err(BrokerError::Unavailable(format!("GET /v2/assets: HTTP {}", resp.status())));
        }
        let body = resp.text().map_err(Self::unavailable)?;
        parse_asset_list(&body).map_err(Self::unavailable)
    }

    fn get_quote(&self, symbol: &str) -> Result<Quote, BrokerError> {
        let url = format!("{}/v2/stocks/{symbol}/quotes/latest", self.data_base_url);
        let resp = self.http.get(&url).send().map_err(Self::unavailable)?;
        if !resp.status().is_success() {
            return Err(BrokerError::Unavailable(format!("GET quotes/latest: HTTP {}", resp.status())));
        }
        let body = resp.text().map_err(Self::unavailable)?;
        let quote = parse_quote(&body).map_err(Self::unavailable)?;

        if (chrono::Utc::now() - quote.ts).num_seconds().abs() > 5 {
            return Err(BrokerError::Stale);
        }
        Ok(quote)
    }

    fn get_positions(&self) -> Result<Vec<Position>, BrokerError> {
        let url = format!("{}/v2/positions", self.base_url);
        let resp = self.http.get(&url).send().map_err(Self::unavailable)?;
        if !resp.status().is_success() {
            return Err(BrokerError::Unavailable(format!("GET /v2/positions: HTTP {}", resp.status())));
        }
        let body = resp.text().map_err(Self::unavailable)?;
        parse_position_list(&body).map_err(Self::unavailable)
    }

    fn place_order(
        &self,
        symbol: &str,
        direction: Direction,
        volume: f64,
        sl_price: Micros,
        tp_price: Option<Micros>,
    ) -> Result<PlaceResult, BrokerError> {
        let side = match direction {
            Direction::Long => "buy",
            Direction::Short => "sell",
        };
        let mut body = serde_json::json!({
            "symbol": symbol,
            "qty": format!("{volume}"),
            "side": side,
            "type": "market",
            "time_in_force": "day",
            "order_class": "bracket",
            "stop_loss": { "stop_price": format!("{:.5}", tle_money::micros_to_price(sl_price)) },
        });
        if let Some(tp) = tp_price {
            body["take_profit"] = serde_json::json!({ "limit_price": format!("{:.5}", tle_money::micros_to_price(tp)) });
        }

        let url = format!("{}/v2/orders", self.base_url);
        let resp = self.http.post(&url).json(&body).send().map_err(Self::unavailable)?;
        let status = resp.status();
        let text = resp.text().map_err(Self::unavailable)?;

        if status.as_u16() == 422 || status.as_u16() == 403 {
            return Ok(PlaceResult::Rejected { reason: text });
        }
        if !status.is_success() {
            return Err(BrokerError::Unavailable(format!("POST /v2/orders: HTTP {status}: {text}")));
        }
        parse_order_response(&text).map_err(Self::unavailable)
    }

    fn modify_order(&self, ticket: Ticket, sl_price: Micros) -> Result<ModifyResult, BrokerError> {
        // Alpaca has no direct "modify position stop" endpoint; the engine
        // modifies the bracket order's stop leg instead, addressed by the
        // order id carried in `ticket`.
        let url = format!("{}/v2/orders/{}", self.base_url, ticket.raw());
        let body = serde_json::json!({ "stop_price": format!("{:.5}", tle_money::micros_to_price(sl_price)) });
        let resp = self.http.patch(&url).json(&body).send().map_err(Self::unavailable)?;
        let status = resp.status();
        if status.as_u16() == 422 || status.as_u16() == 403 {
            let text = resp.text().unwrap_or_default();
            return Ok(ModifyResult::Rejected { reason: text });
        }
        if !status.is_success() {
            let text = resp.text().unwrap_or_default();
            return Err(BrokerError::Unavailable(format!("PATCH /v2/orders/{{id}}: HTTP {status}: {text}")));
        }
        Ok(ModifyResult::Ok)
    }

    fn close_position(&self, ticket: Ticket, _comment: &str) -> Result<CloseResult, BrokerError> {
        let url = format!("{}/v2/positions/{}", self.base_url, ticket.raw());
        let resp = self.http.delete(&url).send().map_err(Self::unavailable)?;
        let status = resp.status();
        if status.as_u16() == 422 || status.as_u16() == 403 {
            let text = resp.text().unwrap_or_default();
            return Ok(CloseResult::Rejected { reason: text });
        }
        if !status.is_success() {
            let text = resp.text().unwrap_or_default();
            return Err(BrokerError::Unavailable(format!("DELETE /v2/positions/{{symbol}}: HTTP {status}: {text}")));
        }
        Ok(CloseResult::Ok)
    }
}
