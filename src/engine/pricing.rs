use crate::limits::{CAPACITY_COUNT, CAPACITY_MAX, CAPACITY_MIN};
use crate::model::Money;

use super::EngineError;

/// Validate a caller-supplied housing size and narrow it to `u8`.
pub(crate) fn validate_size(size: i64) -> Result<u8, EngineError> {
    if size < CAPACITY_MIN as i64 || size > CAPACITY_MAX as i64 {
        return Err(EngineError::InvalidSize(size));
    }
    Ok(size as u8)
}

/// Current unit price per housing size. One slot per size in `[1, 8]`;
/// a price set overwrites every slot, so there is always exactly one
/// current price per size. Owned by the engine, never process-global.
#[derive(Debug)]
pub struct PriceTable {
    per_size: [Option<Money>; CAPACITY_COUNT],
}

impl Default for PriceTable {
    fn default() -> Self {
        Self::new()
    }
}

impl PriceTable {
    pub fn new() -> Self {
        Self {
            per_size: [None; CAPACITY_COUNT],
        }
    }

    /// Replace the current price of every size. A failed request never
    /// reaches this point, so the previous table survives any rejection.
    pub fn set_all(&mut self, price: Money) {
        self.per_size = [Some(price); CAPACITY_COUNT];
    }

    /// Price for one size, `None` while unpriced or out of range.
    pub fn get(&self, size: u8) -> Option<Money> {
        if size < CAPACITY_MIN || size > CAPACITY_MAX {
            return None;
        }
        self.per_size[(size - CAPACITY_MIN) as usize]
    }

    /// The uniform price currently in effect, if any. Compaction re-emits
    /// this single value to recreate the whole table.
    pub fn current(&self) -> Option<Money> {
        self.per_size[0]
    }

    /// All priced `(size, price)` pairs in size order.
    pub fn entries(&self) -> Vec<(u8, Money)> {
        self.per_size
            .iter()
            .enumerate()
            .filter_map(|(i, p)| p.map(|price| (i as u8 + CAPACITY_MIN, price)))
            .collect()
    }
}
