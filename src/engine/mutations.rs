use std::sync::Arc;

use tokio::sync::{RwLock, oneshot};

use crate::limits::*;
use crate::model::*;

use super::allocation::{matches_request, now_ms};
use super::pricing::validate_size;
use super::{Engine, EngineError, WalCommand, apply_to_property};

impl Engine {
    /// Replace the unit price for every housing size. Rejected input never
    /// reaches this method, so the previous table always survives a failed
    /// request.
    pub async fn set_price(&self, price: Money) -> Result<(), EngineError> {
        let mut prices = self.prices.write().await;
        let event = Event::UnitPriceSet { price };
        self.wal_append(&event).await?;
        prices.set_all(price);
        Ok(())
    }

    /// Spawn a property onto the books: owned by the central revenue
    /// service, unlisted, unclaimed.
    pub async fn create_property(&self, id: PropertyId, capacity: i64) -> Result<(), EngineError> {
        let capacity = validate_size(capacity)?;
        if self.state.len() >= MAX_PROPERTIES_PER_REGISTRY {
            return Err(EngineError::LimitExceeded("too many properties"));
        }
        if self.state.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }

        let event = Event::PropertyCreated { id, capacity };
        self.wal_append(&event).await?;
        self.state
            .insert(id, Arc::new(RwLock::new(PropertyState::new(id, capacity))));
        self.notify.send(id, &event);
        Ok(())
    }

    /// Put a property on the market for sale. Listing an already-listed
    /// property is a no-op success.
    pub async fn list_for_sale(&self, id: PropertyId) -> Result<(), EngineError> {
        let rs = self.get_property(&id).ok_or(EngineError::NotFound(id))?;
        let mut guard = rs.write().await;
        if guard.for_sale {
            return Ok(());
        }
        let event = Event::ListedForSale { id };
        self.persist_and_apply(id, &mut guard, &event).await
    }

    /// Put a property on the market for rent. Idempotent like `list_for_sale`.
    pub async fn list_for_rent(&self, id: PropertyId) -> Result<(), EngineError> {
        let rs = self.get_property(&id).ok_or(EngineError::NotFound(id))?;
        let mut guard = rs.write().await;
        if guard.for_rent {
            return Ok(());
        }
        let event = Event::ListedForRent { id };
        self.persist_and_apply(id, &mut guard, &event).await
    }

    /// Find the first free property of the requested size and mode and claim
    /// it. Scan order is ascending id, so the lowest id wins. The whole
    /// find-and-claim runs under the allocation mutex: concurrent requests
    /// for the same size serialize here and can never share a property.
    pub async fn find_available(
        &self,
        size: i64,
        to_rent: bool,
    ) -> Result<Option<PropertyId>, EngineError> {
        let capacity = validate_size(size)?;
        let _serial = self.alloc_lock.lock().await;
        let now = now_ms();

        let mut ids: Vec<PropertyId> = self.state.iter().map(|e| *e.key()).collect();
        ids.sort_unstable();

        for id in ids {
            let Some(rs) = self.get_property(&id) else {
                continue;
            };
            let mut guard = rs.write().await;
            if matches_request(&guard, capacity, to_rent, now) {
                let event = Event::Claimed {
                    id,
                    expires_at: now + self.claim_ttl_ms,
                };
                self.persist_and_apply(id, &mut guard, &event).await?;
                return Ok(Some(id));
            }
        }
        Ok(None)
    }

    /// The full property request: quote the price for the size, then
    /// allocate. `None` means no matching property is free — a normal
    /// negative result, not a failure.
    pub async fn request_property(
        &self,
        size: i64,
        to_rent: bool,
    ) -> Result<Option<(PropertyId, Money)>, EngineError> {
        let capacity = validate_size(size)?;
        let price = self.quoted_price(capacity).await?;
        Ok(self
            .find_available(size, to_rent)
            .await?
            .map(|id| (id, price)))
    }

    /// Drop a property's allocation claim, if it has one. Returns whether a
    /// claim was actually released.
    pub async fn release_claim(&self, id: PropertyId) -> Result<bool, EngineError> {
        let rs = self.get_property(&id).ok_or(EngineError::NotFound(id))?;
        let mut guard = rs.write().await;
        if guard.claim.is_none() {
            return Ok(false);
        }
        let event = Event::ClaimReleased { id };
        self.persist_and_apply(id, &mut guard, &event).await?;
        Ok(true)
    }

    /// Complete or cancel an ownership transfer.
    ///
    /// Cancellation (`approval == false`) releases any claim and records
    /// nothing. Approval requires the seller to be the current owner and the
    /// property to be listed for sale; it then reassigns ownership, delists,
    /// and appends a sale contract, all under the property's write lock.
    pub async fn approve_transfer(
        &self,
        property_id: PropertyId,
        seller_id: PartyId,
        buyer_id: PartyId,
        price: Money,
        approval: bool,
    ) -> Result<Option<ContractId>, EngineError> {
        let rs = self
            .get_property(&property_id)
            .ok_or(EngineError::NotFound(property_id))?;
        let mut guard = rs.write().await;

        if !approval {
            if guard.claim.is_some() {
                let event = Event::ClaimReleased { id: property_id };
                self.persist_and_apply(property_id, &mut guard, &event)
                    .await?;
            }
            return Ok(None);
        }

        if guard.owner_id != seller_id {
            return Err(EngineError::SellerMismatch {
                property_id,
                seller_id,
            });
        }
        if !guard.for_sale {
            return Err(EngineError::NotListed {
                property_id,
                to_rent: false,
            });
        }

        let mut book = self.sales.write().await;
        let contract = SaleContract {
            id: book.next_id(),
            property_id,
            seller_id,
            buyer_id,
            capacity: guard.capacity,
            price,
        };
        let event = Event::SaleClosed {
            contract: contract.clone(),
        };
        self.wal_append(&event).await?;
        apply_to_property(&mut guard, &event);
        book.record(contract.id, contract.clone());
        self.notify.send(property_id, &event);
        Ok(Some(contract.id))
    }

    /// Sign a lease on a property listed for rent. The current owner is the
    /// landlord; the property leaves the rental market.
    pub async fn sign_lease(
        &self,
        property_id: PropertyId,
        tenant_id: PartyId,
        price: Money,
    ) -> Result<ContractId, EngineError> {
        let rs = self
            .get_property(&property_id)
            .ok_or(EngineError::NotFound(property_id))?;
        let mut guard = rs.write().await;

        if !guard.for_rent {
            return Err(EngineError::NotListed {
                property_id,
                to_rent: true,
            });
        }

        let mut book = self.rentals.write().await;
        let contract = RentalContract {
            id: book.next_id(),
            property_id,
            landlord_id: guard.owner_id,
            tenant_id,
            capacity: guard.capacity,
            price,
        };
        let event = Event::LeaseSigned {
            contract: contract.clone(),
        };
        self.wal_append(&event).await?;
        apply_to_property(&mut guard, &event);
        book.record(contract.id, contract.clone());
        self.notify.send(property_id, &event);
        Ok(contract.id)
    }

    /// Ids of properties whose claim has expired, for the reaper.
    pub fn collect_expired_claims(&self, now: Ms) -> Vec<PropertyId> {
        let mut expired = Vec::new();
        for entry in self.state.iter() {
            let rs = entry.value().clone();
            if let Ok(guard) = rs.try_read()
                && let Some(claim) = guard.claim
                && claim.expires_at <= now
            {
                expired.push(guard.id);
            }
        }
        expired
    }

    /// Rewrite the WAL with the minimal event sequence that recreates the
    /// current state: the price, every spawn, the full contract history,
    /// then current listings and live claims.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let mut events = Vec::new();

        if let Some(price) = self.prices.read().await.current() {
            events.push(Event::UnitPriceSet { price });
        }

        let mut ids: Vec<PropertyId> = self.state.iter().map(|e| *e.key()).collect();
        ids.sort_unstable();

        let mut snapshots = Vec::with_capacity(ids.len());
        for id in &ids {
            if let Some(rs) = self.get_property(id) {
                snapshots.push(rs.read().await.clone());
            }
        }

        for snap in &snapshots {
            events.push(Event::PropertyCreated {
                id: snap.id,
                capacity: snap.capacity,
            });
        }

        // Contract replay walks each property through its historical owner
        // chain, landing on the current owner.
        for contract in self.sales.read().await.entries() {
            events.push(Event::SaleClosed {
                contract: contract.clone(),
            });
        }
        for contract in self.rentals.read().await.entries() {
            events.push(Event::LeaseSigned {
                contract: contract.clone(),
            });
        }

        let now = now_ms();
        for snap in &snapshots {
            if snap.for_sale {
                events.push(Event::ListedForSale { id: snap.id });
            }
            if snap.for_rent {
                events.push(Event::ListedForRent { id: snap.id });
            }
            if let Some(claim) = snap.claim
                && claim.expires_at > now
            {
                events.push(Event::Claimed {
                    id: snap.id,
                    expires_at: claim.expires_at,
                });
            }
        }

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact {
                events,
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
