use crate::model::{PartyId, PropertyId};

#[derive(Debug, PartialEq, Eq)]
pub enum EngineError {
    /// Referenced property does not exist.
    NotFound(PropertyId),
    /// Property spawn with an id already on the books.
    AlreadyExists(PropertyId),
    /// Housing size outside `[1, 8]`.
    InvalidSize(i64),
    /// Page number below 1 or non-positive page size.
    InvalidPage { number: i64, size: i64 },
    /// No price has been set for this size yet.
    Unpriced(i64),
    /// Transfer seller does not match the property's current owner.
    SellerMismatch {
        property_id: PropertyId,
        seller_id: PartyId,
    },
    /// Transfer or lease against a property not listed in that mode.
    NotListed {
        property_id: PropertyId,
        to_rent: bool,
    },
    LimitExceeded(&'static str),
    WalError(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::NotFound(id) => write!(f, "Property {id} does not exist"),
            EngineError::AlreadyExists(id) => write!(f, "Property {id} already exists"),
            EngineError::InvalidSize(_) => write!(f, "Invalid Size"),
            EngineError::InvalidPage { number, size } => {
                write!(f, "invalid page: number {number}, size {size}")
            }
            EngineError::Unpriced(size) => write!(f, "no price set for size {size}"),
            EngineError::SellerMismatch {
                property_id,
                seller_id,
            } => write!(f, "seller {seller_id} does not own Property {property_id}"),
            EngineError::NotListed {
                property_id,
                to_rent,
            } => {
                let mode = if *to_rent { "rent" } else { "sale" };
                write!(f, "Property {property_id} is not listed for {mode}")
            }
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl EngineError {
    /// SQLSTATE class the wire layer reports for this failure.
    pub fn sqlstate(&self) -> &'static str {
        match self {
            EngineError::InvalidSize(_) | EngineError::InvalidPage { .. } => "22023",
            EngineError::NotFound(_) | EngineError::Unpriced(_) => "P0002",
            EngineError::AlreadyExists(_)
            | EngineError::SellerMismatch { .. }
            | EngineError::NotListed { .. }
            | EngineError::LimitExceeded(_) => "P0001",
            EngineError::WalError(_) => "XX000",
        }
    }
}
