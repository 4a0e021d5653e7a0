use serde::{Deserialize, Serialize};

use crate::chunking::Chunk;

pub const UNKNOWN_STOCK: &str = "unknown";

pub const DEFAULT_STOCKS: [&str; 5] = ["鴻海", "東哥", "緯穎", "智崴", "群聯"];

/// Maps any source containing `pattern` to `stock`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockRule {
    pub pattern: String,
    pub stock: String,
}

impl StockRule {
    pub fn new(pattern: impl Into<String>, stock: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            stock: stock.into(),
        }
    }

    /// A rule whose pattern is the stock name itself.
    pub fn same(name: &str) -> Self {
        Self::new(name, name)
    }
}

/// Tags chunks with a stock inferred from their source path.
///
/// Rules are scanned in list order and the first pattern that occurs anywhere in the
/// source wins, regardless of where in the string it occurs or how long it is.
#[derive(Debug, Clone)]
pub struct StockLabeler {
    rules: Vec<StockRule>,
    unknown: String,
}

impl Default for StockLabeler {
    fn default() -> Self {
        Self::new(DEFAULT_STOCKS.iter().map(|s| StockRule::same(s)).collect())
    }
}

impl StockLabeler {
    pub fn new(rules: Vec<StockRule>) -> Self {
        Self {
            rules,
            unknown: UNKNOWN_STOCK.to_string(),
        }
    }

    pub fn from_config(config: &crate::config::StockConfig) -> Self {
        Self::new(config.rules.clone()).with_unknown(config.unknown.clone())
    }

    pub fn with_unknown(mut self, unknown: impl Into<String>) -> Self {
        self.unknown = unknown.into();
        self
    }

    pub fn unknown(&self) -> &str {
        &self.unknown
    }

    pub fn label_for(&self, source: &str) -> &str {
        self.rules
            .iter()
            .find(|rule| source.contains(rule.pattern.as_str()))
            .map(|rule| rule.stock.as_str())
            .unwrap_or(self.unknown.as_str())
    }

    pub fn assign(&self, chunks: &mut [Chunk]) {
        for chunk in chunks.iter_mut() {
            let stock = self.label_for(&chunk.metadata.source).to_string();
            chunk.metadata.stock = Some(stock);
        }
    }
}
