//! Static registry of tracked instruments

use serde::{Deserialize, Serialize};

/// A tracked market index or fund.
///
/// `remote_search_term` is the symbol understood by the quote source;
/// `display_keyword` is the term a brokerage search UI expects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instrument {
    pub key: String,
    pub remote_search_term: String,
    pub display_keyword: String,
}

impl Instrument {
    pub fn new(key: &str, remote_search_term: &str, display_keyword: &str) -> Self {
        Instrument {
            key: key.to_string(),
            remote_search_term: remote_search_term.to_string(),
            display_keyword: display_keyword.to_string(),
        }
    }
}

/// Seeded once at startup, read-only afterwards.
#[derive(Debug, Clone)]
pub struct InstrumentCatalog {
    instruments: Vec<Instrument>,
}

impl InstrumentCatalog {
    pub fn new(instruments: Vec<Instrument>) -> Self {
        InstrumentCatalog { instruments }
    }

    pub fn get(&self, key: &str) -> Option<&Instrument> {
        self.instruments.iter().find(|i| i.key == key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Instrument> {
        self.instruments.iter()
    }

    pub fn len(&self) -> usize {
        self.instruments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instruments.is_empty()
    }
}

impl Default for InstrumentCatalog {
    fn default() -> Self {
        InstrumentCatalog::new(vec![
            Instrument::new("acwi", "ACWI", "All World"),
            Instrument::new("sp500", "SPY", "S&P 500"),
            Instrument::new("nikkei225", "NI225", "Nikkei 225"),
            Instrument::new("topix", "TOPIX", "TOPIX"),
            Instrument::new("emerging", "VWO", "Emerging Markets"),
            Instrument::new("developed", "VEA", "Developed Markets"),
        ])
    }
}
