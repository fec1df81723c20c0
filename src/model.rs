use std::fmt;

use serde::{Deserialize, Serialize};

/// Unix milliseconds — the only time type.
pub type Ms = i64;

/// Property identifier. Assigned by the caller at spawn time.
pub type PropertyId = i64;

/// Owner / buyer / seller / tenant identifier from the external identity
/// system. `CENTRAL_REVENUE` is the only value with meaning here.
pub type PartyId = i64;

/// Contract identifier, assigned per book starting at 1.
pub type ContractId = i64;

/// Default owner of every freshly spawned property.
pub const CENTRAL_REVENUE: PartyId = -1;

/// A currency amount in cents. Parsed from decimal literals with at most
/// two fractional digits; never negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub fn cents(&self) -> i64 {
        self.0
    }

    /// Parse a decimal literal like `1500`, `1500.5` or `1500.00`.
    pub fn parse(input: &str) -> Result<Self, MoneyParseError> {
        let s = input.trim();
        if s.starts_with('-') {
            return Err(MoneyParseError::Negative);
        }
        let (whole, frac) = match s.split_once('.') {
            Some((w, f)) => (w, f),
            None => (s, ""),
        };
        if whole.is_empty() && frac.is_empty() {
            return Err(MoneyParseError::Malformed);
        }
        if !whole.bytes().all(|b| b.is_ascii_digit()) || !frac.bytes().all(|b| b.is_ascii_digit()) {
            return Err(MoneyParseError::Malformed);
        }
        if frac.len() > 2 {
            return Err(MoneyParseError::TooPrecise);
        }
        let whole: i64 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| MoneyParseError::TooLarge)?
        };
        let frac_cents: i64 = match frac.len() {
            0 => 0,
            1 => frac.parse::<i64>().expect("digits checked") * 10,
            _ => frac.parse().expect("digits checked"),
        };
        let cents = whole
            .checked_mul(100)
            .and_then(|c| c.checked_add(frac_cents))
            .ok_or(MoneyParseError::TooLarge)?;
        if cents > crate::limits::MAX_PRICE_CENTS {
            return Err(MoneyParseError::TooLarge);
        }
        Ok(Self(cents))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoneyParseError {
    Malformed,
    Negative,
    TooPrecise,
    TooLarge,
}

impl fmt::Display for MoneyParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MoneyParseError::Malformed => write!(f, "not a decimal amount"),
            MoneyParseError::Negative => write!(f, "amount must not be negative"),
            MoneyParseError::TooPrecise => write!(f, "at most two fractional digits"),
            MoneyParseError::TooLarge => write!(f, "amount out of range"),
        }
    }
}

impl std::error::Error for MoneyParseError {}

/// An in-flight allocation claim. The property is excluded from allocation
/// until the claim is consumed by a transfer/lease, released, or expires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    pub expires_at: Ms,
}

/// One housing unit on the registry's books.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyState {
    pub id: PropertyId,
    pub owner_id: PartyId,
    /// Housing units, always in `[1, 8]`.
    pub capacity: u8,
    pub for_sale: bool,
    pub for_rent: bool,
    pub claim: Option<Claim>,
}

impl PropertyState {
    pub fn new(id: PropertyId, capacity: u8) -> Self {
        Self {
            id,
            owner_id: CENTRAL_REVENUE,
            capacity,
            for_sale: false,
            for_rent: false,
            claim: None,
        }
    }

    pub fn claim_active(&self, now: Ms) -> bool {
        self.claim.is_some_and(|c| c.expires_at > now)
    }

    /// True if the property can satisfy an allocation request in the given
    /// mode right now: listed, and not held by a live claim.
    pub fn available(&self, to_rent: bool, now: Ms) -> bool {
        let listed = if to_rent { self.for_rent } else { self.for_sale };
        listed && !self.claim_active(now)
    }
}

/// Record of a completed ownership transfer. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleContract {
    pub id: ContractId,
    pub property_id: PropertyId,
    pub seller_id: PartyId,
    pub buyer_id: PartyId,
    pub capacity: u8,
    pub price: Money,
}

/// Record of a signed lease. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RentalContract {
    pub id: ContractId,
    pub property_id: PropertyId,
    pub landlord_id: PartyId,
    pub tenant_id: PartyId,
    pub capacity: u8,
    pub price: Money,
}

/// The event types — flat, no nesting beyond contract records. This is the
/// WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    UnitPriceSet {
        price: Money,
    },
    PropertyCreated {
        id: PropertyId,
        capacity: u8,
    },
    ListedForSale {
        id: PropertyId,
    },
    ListedForRent {
        id: PropertyId,
    },
    Claimed {
        id: PropertyId,
        expires_at: Ms,
    },
    ClaimReleased {
        id: PropertyId,
    },
    SaleClosed {
        contract: SaleContract,
    },
    LeaseSigned {
        contract: RentalContract,
    },
}

impl Event {
    /// The property a non-price event targets, for change-feed routing.
    pub fn property_id(&self) -> Option<PropertyId> {
        match self {
            Event::UnitPriceSet { .. } => None,
            Event::PropertyCreated { id, .. }
            | Event::ListedForSale { id }
            | Event::ListedForRent { id }
            | Event::Claimed { id, .. }
            | Event::ClaimReleased { id } => Some(*id),
            Event::SaleClosed { contract } => Some(contract.property_id),
            Event::LeaseSigned { contract } => Some(contract.property_id),
        }
    }
}

// ── Query shapes ─────────────────────────────────────────────────

/// 1-indexed page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub number: i64,
    pub size: i64,
}

/// Optional filters for the paginated property query. All supplied filters
/// must match (AND semantics).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PropertyFilter {
    pub id: Option<PropertyId>,
    pub owner_id: Option<PartyId>,
    pub capacity: Option<i64>,
}

/// Optional filters for the paginated contract queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContractFilter {
    pub id: Option<ContractId>,
    pub property_id: Option<PropertyId>,
    pub capacity: Option<i64>,
}

/// Property row as returned by queries — state minus the claim, which is
/// allocation-internal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyInfo {
    pub id: PropertyId,
    pub owner_id: PartyId,
    pub capacity: u8,
    pub for_sale: bool,
    pub for_rent: bool,
}

impl From<&PropertyState> for PropertyInfo {
    fn from(rs: &PropertyState) -> Self {
        Self {
            id: rs.id,
            owner_id: rs.owner_id,
            capacity: rs.capacity,
            for_sale: rs.for_sale,
            for_rent: rs.for_rent,
        }
    }
}
