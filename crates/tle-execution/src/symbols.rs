use std::collections::BTreeMap;
use std::sync::RwLock;

use tle_schemas::SymbolInfo;

/// Periodically-refreshed cache of broker symbol metadata. The engine reads
/// this on every `update_sl_atomic` call rather than round-tripping
/// `get_symbols` per ticket; a dedicated task (the scan loop, per §5) is
/// expected to call `refresh` on some slower cadence.
#[derive(Default)]
pub struct SymbolCache {
    inner: RwLock<BTreeMap<String, SymbolInfo>>,
}

impl SymbolCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn refresh(&self, symbols: Vec<SymbolInfo>) {
        let mut map = self.inner.write().expect("symbol cache lock poisoned");
        map.clear();
        for s in symbols {
            map.insert(s.symbol.clone(), s);
        }
    }

    pub fn get(&self, symbol: &str) -> Option<SymbolInfo> {
        self.inner.read().expect("symbol cache lock poisoned").get(symbol).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.read().expect("symbol cache lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tle_money::Micros;
    use tle_schemas::TradeMode;

    fn info(symbol: &str) -> SymbolInfo {
        SymbolInfo {
            symbol: symbol.to_string(),
            min_lot: 0.01,
            lot_step: 0.01,
            max_lot: Some(5.0),
            contract_value: Micros::new(100_000 * tle_money::MICROS_PER_UNIT),
            spread: Micros::new(2_000),
            trade_mode: TradeMode::Full,
            stops_level: Micros::new(5_000),
            price_step: Micros::new(10),
        }
    }

    #[test]
    fn refresh_replaces_contents() {
        let cache = SymbolCache::new();
        cache.refresh(vec![info("EURUSD")]);
        assert!(cache.get("EURUSD").is_some());
        cache.refresh(vec![info("GBPUSD")]);
        assert!(cache.get("EURUSD").is_none());
        assert!(cache.get("GBPUSD").is_some());
    }
}
