//! Pure JSON-shaping helpers, factored out of the HTTP client so the wire
//! format can be exercised without a live network call.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tle_broker::PlaceResult;
use tle_money::{price_to_micros, Micros};
use tle_schemas::{Direction, Position, Quote, SymbolInfo, Ticket, TradeMode};

#[derive(Deserialize)]
struct AssetResponse {
    symbol: String,
    tradable: bool,
    #[serde(default)]
    min_order_size: Option<String>,
}

pub fn parse_asset_list(body: &str) -> anyhow::Result<Vec<SymbolInfo>> {
    let assets: Vec<AssetResponse> = serde_json::from_str(body)?;
    Ok(assets
        .into_iter()
        .filter(|a| a.tradable)
        .map(|a| {
            let min_lot = a
                .min_order_size
                .as_deref()
                .and_then(|s| s.parse::<f64>().ok())
                .unwrap_or(1.0);
            SymbolInfo {
                symbol: a.symbol,
                min_lot,
                lot_step: min_lot,
                max_lot: None,
                // Equities have no leveraged contract multiplier; one share
                // move of $1 is $1 of P&L per share held.
                contract_value: Micros::new(tle_money::MICROS_PER_UNIT),
                spread: Micros::ZERO,
                trade_mode: TradeMode::Full,
                stops_level: Micros::ZERO,
                price_step: price_to_micros(0.01).expect("0.01 is a finite, in-range price"),
            }
        })
        .collect())
}

#[derive(Deserialize)]
struct QuoteResponse {
    quote: QuoteInner,
}

#[derive(Deserialize)]
struct QuoteInner {
    #[serde(rename = "bp")]
    bid_price: f64,
    #[serde(rename = "ap")]
    ask_price: f64,
    #[serde(rename = "t")]
    timestamp: DateTime<Utc>,
}

pub fn parse_quote(body: &str) -> anyhow::Result<Quote> {
    let parsed: QuoteResponse = serde_json::from_str(body)?;
    Ok(Quote {
        bid: price_to_micros(parsed.quote.bid_price)?,
        ask: price_to_micros(parsed.quote.ask_price)?,
        ts: parsed.quote.timestamp,
    })
}

#[derive(Deserialize)]
struct PositionResponse {
    asset_id: String,
    symbol: String,
    side: String,
    qty: String,
    avg_entry_price: String,
    current_price: String,
}

pub fn parse_position_list(body: &str) -> anyhow::Result<Vec<Position>> {
    let positions: Vec<PositionResponse> = serde_json::from_str(body)?;
    positions
        .into_iter()
        .map(|p| {
            let direction = if p.side == "short" { Direction::Short } else { Direction::Long };
            Ok(Position {
                ticket: asset_id_to_ticket(&p.asset_id),
                symbol: p.symbol,
                direction,
                entry_price: price_to_micros(p.avg_entry_price.parse::<f64>()?)?,
                volume: p.qty.parse::<f64>()?.abs(),
                current_price: price_to_micros(p.current_price.parse::<f64>()?)?,
                current_sl: None,
                opened_at: Utc::now(),
                version: 0,
            })
        })
        .collect()
}

#[derive(Deserialize)]
struct OrderResponse {
    id: String,
    status: String,
    #[serde(default)]
    filled_qty: Option<String>,
    #[serde(default)]
    filled_avg_price: Option<String>,
}

pub fn parse_order_response(body: &str) -> anyhow::Result<PlaceResult> {
    let parsed: OrderResponse = serde_json::from_str(body)?;
    let ticket = asset_id_to_ticket(&parsed.id);

    let filled_qty = parsed.filled_qty.as_deref().and_then(|s| s.parse::<f64>().ok()).unwrap_or(0.0);
    let filled_price = parsed
        .filled_avg_price
        .as_deref()
        .and_then(|s| s.parse::<f64>().ok())
        .map(price_to_micros)
        .transpose()?
        .unwrap_or(Micros::ZERO);

    Ok(match parsed.status.as_str() {
        "filled" => PlaceResult::Filled {
            ticket,
            actual_volume: filled_qty,
            actual_price: filled_price,
        },
        "partially_filled" => PlaceResult::Partial {
            ticket,
            actual_volume: filled_qty,
            actual_price: filled_price,
        },
        "rejected" | "canceled" | "expired" => PlaceResult::Rejected {
            reason: format!("order status: {}", parsed.status),
        },
        // `new`/`accepted`/`pending_new`: the broker accepted the order but
        // has not reported a fill yet. Treated as a rejection for this
        // engine's purposes, since P2 requires an immediate fill price to
        // seed the stop-loss.
        other => PlaceResult::Rejected {
            reason: format!("order not yet filled: {other}"),
        },
    })
}

/// Alpaca asset/order ids are UUIDs; `Ticket` is a `u64`. The low 64 bits of
/// the UUID's byte representation are stable for a given id and collision-free
/// in practice for one account's open-order volume, so they stand in as the
/// ticket value.
fn asset_id_to_ticket(id: &str) -> Ticket {
    let uuid = uuid::Uuid::parse_str(id).unwrap_or_else(|_| uuid::Uuid::nil());
    let bytes = uuid.as_bytes();
    let low8: [u8; 8] = bytes[8..16].try_into().expect("uuid is 16 bytes");
    Ticket::new(u64::from_be_bytes(low8))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tradable_assets_only() {
        let body = r#"[
            {"symbol": "AAPL", "tradable": true, "min_order_size": "1"},
            {"symbol": "XYZ", "tradable": false, "min_order_size": "1"}
        ]"#;
        let symbols = parse_asset_list(body).unwrap();
        assert_eq!(symbols.len(), 1);
        assert_eq!(symbols[0].symbol, "AAPL");
    }

    #[test]
    fn parses_quote_bid_ask() {
        let body = r#"{"quote": {"bp": 150.25, "ap": 150.30, "t": "2024-01-02T15:30:00Z"}}"#;
        let q = parse_quote(body).unwrap();
        assert_eq!(q.bid, price_to_micros(150.25).unwrap());
        assert_eq!(q.ask, price_to_micros(150.30).unwrap());
    }

    #[test]
    fn parses_position_list_with_short_side() {
        let body = r#"[{
            "asset_id": "904837e3-3b76-47ec-b432-046db621571b",
            "symbol": "AAPL",
            "side": "short",
            "qty": "-10",
            "avg_entry_price": "150.00",
            "current_price": "148.00"
        }]"#;
        let positions = parse_position_list(body).unwrap();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].direction, Direction::Short);
        assert_eq!(positions[0].volume, 10.0);
    }

    #[test]
    fn parses_filled_order_response() {
        let body = r#"{
            "id": "904837e3-3b76-47ec-b432-046db621571b",
            "status": "filled",
            "filled_qty": "5",
            "filled_avg_price": "151.50"
        }"#;
        match parse_order_response(body).unwrap() {
            PlaceResult::Filled { actual_volume, actual_price, .. } => {
                assert_eq!(actual_volume, 5.0);
                assert_eq!(actual_price, price_to_micros(151.50).unwrap());
            }
            other => panic!("expected Filled, got {other:?}"),
        }
    }

    #[test]
    fn unfilled_order_status_is_treated_as_rejected() {
        let body = r#"{"id": "904837e3-3b76-47ec-b432-046db621571b", "status": "new"}"#;
        match parse_order_response(body).unwrap() {
            PlaceResult::Rejected { .. } => {}
            other => panic!("expected Rejected, got {other:?}"),
        }
    }

    #[test]
    fn same_asset_id_maps_to_same_ticket_deterministically() {
        let id = "904837e3-3b76-47ec-b432-046db621571b";
        assert_eq!(asset_id_to_ticket(id), asset_id_to_ticket(id));
    }
}
