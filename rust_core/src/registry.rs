//! Instrument registry.
//!
//! An explicitly constructed, read-only lookup table of tradable instruments.
//! Built once at startup and shared by reference (`Arc<InstrumentRegistry>`);
//! nothing mutates it afterwards, so it is safe to read from any task.

use crate::error::RegistryError;
use crate::models::QuotePair;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Largest decimal precision whose one-unit amount still fits in a u64
const MAX_DECIMALS: u8 = 19;

/// Trading volume bucket an instrument belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VolumeCategory {
    High,
    Mid,
    Low,
}

impl VolumeCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            VolumeCategory::High => "high",
            VolumeCategory::Mid => "mid",
            VolumeCategory::Low => "low",
        }
    }
}

impl fmt::Display for VolumeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VolumeCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "high" => Ok(VolumeCategory::High),
            "mid" => Ok(VolumeCategory::Mid),
            "low" => Ok(VolumeCategory::Low),
            other => Err(format!("unknown volume category: {}", other)),
        }
    }
}

/// A tradable instrument (SPL token)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instrument {
    /// Uppercase canonical ticker (e.g. "SOL")
    pub symbol: String,
    /// Opaque upstream key (mint address)
    pub identifier: String,
    pub decimals: u8,
    pub display_name: String,
    pub volume_category: VolumeCategory,
}

impl Instrument {
    pub fn new(
        symbol: &str,
        identifier: &str,
        decimals: u8,
        display_name: &str,
        volume_category: VolumeCategory,
    ) -> Self {
        Self {
            symbol: symbol.trim().to_uppercase(),
            identifier: identifier.trim().to_string(),
            decimals,
            display_name: display_name.to_string(),
            volume_category,
        }
    }

    /// Raw amount for exactly one whole unit (10^decimals)
    pub fn one_unit(&self) -> u64 {
        10u64.pow(u32::from(self.decimals))
    }
}

/// Mints tracked by default: (symbol, mint, decimals, name, category)
const SOLANA_TOKENS: &[(&str, &str, u8, &str, VolumeCategory)] = &[
    ("SOL", "So11111111111111111111111111111111111111112", 9, "Solana", VolumeCategory::High),
    ("USDC", "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v", 6, "USD Coin", VolumeCategory::High),
    ("USDT", "Es9vMFrzaCERmJfrF4H2FYD4KCoNkY11McCe8BenwNYB", 6, "Tether USD", VolumeCategory::High),
    ("JUP", "JUPyiwrYJFskUPiHa7hkeR8VUtAeFoSYbKedZNsDvCN", 6, "Jupiter", VolumeCategory::High),
    ("RAY", "4k3Dyjzvzp8eMZWUXbBCjEvwSkkk59S5iCNLY3QrkX6R", 6, "Raydium", VolumeCategory::Mid),
    ("BONK", "DezXAZ8z7PnrnRJjz3wXBoRgixCa6xjnB7YaB1pPB263", 5, "Bonk", VolumeCategory::Mid),
    ("JTO", "jtojtomepa8beP8AuQc6eXt5FriJwfFMwQx2v2f9mCL", 9, "Jito", VolumeCategory::Mid),
    ("PYTH", "HZ1JovNiVvGrGNiiYvEozEVgZ58xaU3RKwX8eACQBCt3", 6, "Pyth Network", VolumeCategory::Mid),
    ("WIF", "EKpQGSJtjMFqKZ9KQanSqYXRcF8fBopzLHYxdM65zcjm", 6, "dogwifhat", VolumeCategory::Mid),
    ("POPCAT", "7GCihgDB8fe6KNjn2MYtkzZcRjQy3t9GHdC8uHYmW2hr", 9, "Popcat", VolumeCategory::Mid),
    ("MOUTAI", "45EgCwcPXYagBC7KqBin4nCFg8WNdhG6ewM7ktrWmWqT", 9, "Moutai", VolumeCategory::Mid),
    ("MYRO", "MyroWeY4e6kHnTbw8a14Cjc5PZFWJzBQqnd8NCZKHpq", 9, "Myro", VolumeCategory::Mid),
    ("WEN", "WENWENvqqNya429ubCdR81ZmD69brwQaaBYY6g3bsZg", 5, "WEN", VolumeCategory::Mid),
];

/// Shorten an identifier for log lines and unknown-symbol fallbacks
pub fn short_identifier(identifier: &str) -> &str {
    identifier.get(..8).unwrap_or(identifier)
}

/// Read-only lookup table of instruments
#[derive(Debug, Clone)]
pub struct InstrumentRegistry {
    instruments: Vec<Instrument>,
    by_symbol: HashMap<String, usize>,
    by_identifier: HashMap<String, usize>,
}

impl InstrumentRegistry {
    /// Build a registry, rejecting duplicate symbols/identifiers
    pub fn new(instruments: Vec<Instrument>) -> Result<Self, RegistryError> {
        let mut by_symbol = HashMap::with_capacity(instruments.len());
        let mut by_identifier = HashMap::with_capacity(instruments.len());

        for (index, instrument) in instruments.iter().enumerate() {
            if instrument.decimals > MAX_DECIMALS {
                return Err(RegistryError::InvalidDecimals {
                    symbol: instrument.symbol.clone(),
                    decimals: instrument.decimals,
                });
            }
            if by_symbol.insert(instrument.symbol.clone(), index).is_some() {
                return Err(RegistryError::DuplicateSymbol(instrument.symbol.clone()));
            }
            if by_identifier
                .insert(instrument.identifier.clone(), index)
                .is_some()
            {
                return Err(RegistryError::DuplicateIdentifier(
                    instrument.identifier.clone(),
                ));
            }
        }

        Ok(Self {
            instruments,
            by_symbol,
            by_identifier,
        })
    }

    /// The default Solana token set (high and mid volume)
    pub fn default_solana() -> Result<Self, RegistryError> {
        let instruments = SOLANA_TOKENS
            .iter()
            .map(|(symbol, mint, decimals, name, category)| {
                Instrument::new(symbol, mint, *decimals, name, *category)
            })
            .collect();
        Self::new(instruments)
    }

    /// Case-insensitive symbol lookup
    pub fn lookup(&self, symbol: &str) -> Option<&Instrument> {
        self.by_symbol
            .get(&symbol.trim().to_uppercase())
            .map(|&index| &self.instruments[index])
    }

    pub fn lookup_by_identifier(&self, identifier: &str) -> Option<&Instrument> {
        self.by_identifier
            .get(identifier)
            .map(|&index| &self.instruments[index])
    }

    pub fn list_by_category(&self, category: VolumeCategory) -> Vec<&Instrument> {
        self.instruments
            .iter()
            .filter(|i| i.volume_category == category)
            .collect()
    }

    pub fn all_identifiers(&self) -> Vec<String> {
        self.instruments
            .iter()
            .map(|i| i.identifier.clone())
            .collect()
    }

    /// High- and mid-volume identifiers, in registry order
    pub fn monitored_identifiers(&self) -> Vec<String> {
        self.instruments
            .iter()
            .filter(|i| matches!(i.volume_category, VolumeCategory::High | VolumeCategory::Mid))
            .map(|i| i.identifier.clone())
            .collect()
    }

    /// Symbol for an identifier, or its first 8 characters when unknown
    pub fn symbol_for(&self, identifier: &str) -> String {
        match self.lookup_by_identifier(identifier) {
            Some(instrument) => instrument.symbol.clone(),
            None => short_identifier(identifier).to_string(),
        }
    }

    /// Resolve both legs of a quote pair
    pub fn resolve_pair(
        &self,
        pair: &QuotePair,
    ) -> Result<(&Instrument, &Instrument), RegistryError> {
        let input = self
            .lookup(&pair.input)
            .ok_or_else(|| RegistryError::UnknownSymbol(pair.input.clone()))?;
        let output = self
            .lookup(&pair.output)
            .ok_or_else(|| RegistryError::UnknownSymbol(pair.output.clone()))?;
        Ok((input, output))
    }

    pub fn len(&self) -> usize {
        self.instruments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instruments.is_empty()
    }
}
