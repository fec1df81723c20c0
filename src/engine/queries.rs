use crate::limits::MAX_PAGE_SIZE;
use crate::model::*;

use super::pricing::validate_size;
use super::{Engine, EngineError};

fn check_page(page: &PageRequest) -> Result<(), EngineError> {
    if page.number < 1 || page.size < 1 {
        return Err(EngineError::InvalidPage {
            number: page.number,
            size: page.size,
        });
    }
    if page.size > MAX_PAGE_SIZE {
        return Err(EngineError::LimitExceeded("page size too large"));
    }
    Ok(())
}

/// Slice one 1-indexed page out of the full ordered result set. Pages past
/// the end are empty, never an error.
fn page_slice<'a, T>(items: &'a [T], page: &PageRequest) -> &'a [T] {
    let start = match (page.number - 1).checked_mul(page.size) {
        Some(s) if s < items.len() as i64 => s as usize,
        _ => return &[],
    };
    let end = (start + page.size as usize).min(items.len());
    &items[start..end]
}

impl Engine {
    /// Current price for a validated size. Not-found while the table has
    /// never been priced.
    pub(super) async fn quoted_price(&self, capacity: u8) -> Result<Money, EngineError> {
        self.prices
            .read()
            .await
            .get(capacity)
            .ok_or(EngineError::Unpriced(capacity as i64))
    }

    /// Price lookup for the SQL surface: all priced sizes, or one size.
    pub async fn list_prices(&self, size: Option<i64>) -> Result<Vec<(u8, Money)>, EngineError> {
        match size {
            None => Ok(self.prices.read().await.entries()),
            Some(size) => {
                let capacity = validate_size(size).map_err(|_| EngineError::Unpriced(size))?;
                let price = self.quoted_price(capacity).await?;
                Ok(vec![(capacity, price)])
            }
        }
    }

    /// Owner of a property. `CENTRAL_REVENUE` (-1) means the property has
    /// never been sold.
    pub async fn owner_of(&self, property_id: PropertyId) -> Result<PartyId, EngineError> {
        let rs = self
            .get_property(&property_id)
            .ok_or(EngineError::NotFound(property_id))?;
        let guard = rs.read().await;
        Ok(guard.owner_id)
    }

    /// One page of properties matching every supplied filter, ordered by
    /// ascending id.
    pub async fn query_properties(
        &self,
        page: PageRequest,
        filter: PropertyFilter,
    ) -> Result<Vec<PropertyInfo>, EngineError> {
        check_page(&page)?;

        let mut rows = Vec::new();
        let shared: Vec<_> = self.state.iter().map(|e| e.value().clone()).collect();
        for rs in shared {
            let guard = rs.read().await;
            let matches = filter.id.is_none_or(|id| guard.id == id)
                && filter.owner_id.is_none_or(|o| guard.owner_id == o)
                && filter.capacity.is_none_or(|c| guard.capacity as i64 == c);
            if matches {
                rows.push(PropertyInfo::from(&*guard));
            }
        }
        rows.sort_unstable_by_key(|r| r.id);

        Ok(page_slice(&rows, &page).to_vec())
    }

    /// One page of the sale contract book, ordered by ascending id.
    pub async fn sale_contracts(
        &self,
        page: PageRequest,
        filter: ContractFilter,
    ) -> Result<Vec<SaleContract>, EngineError> {
        check_page(&page)?;
        let book = self.sales.read().await;
        let rows: Vec<SaleContract> = book
            .entries()
            .iter()
            .filter(|c| contract_matches(&filter, c.id, c.property_id, c.capacity))
            .cloned()
            .collect();
        Ok(page_slice(&rows, &page).to_vec())
    }

    /// One page of the rental contract book, ordered by ascending id.
    pub async fn rental_contracts(
        &self,
        page: PageRequest,
        filter: ContractFilter,
    ) -> Result<Vec<RentalContract>, EngineError> {
        check_page(&page)?;
        let book = self.rentals.read().await;
        let rows: Vec<RentalContract> = book
            .entries()
            .iter()
            .filter(|c| contract_matches(&filter, c.id, c.property_id, c.capacity))
            .cloned()
            .collect();
        Ok(page_slice(&rows, &page).to_vec())
    }
}

fn contract_matches(
    filter: &ContractFilter,
    id: ContractId,
    property_id: PropertyId,
    capacity: u8,
) -> bool {
    filter.id.is_none_or(|f| id == f)
        && filter.property_id.is_none_or(|f| property_id == f)
        && filter.capacity.is_none_or(|f| capacity as i64 == f)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(number: i64, size: i64) -> PageRequest {
        PageRequest { number, size }
    }

    #[test]
    fn page_slice_walks_the_whole_set() {
        let items: Vec<i64> = (1..=10).collect();
        let mut seen = Vec::new();
        for n in 1..=4 {
            seen.extend_from_slice(page_slice(&items, &page(n, 3)));
        }
        assert_eq!(seen, items);
    }

    #[test]
    fn page_slice_past_end_is_empty() {
        let items: Vec<i64> = (1..=4).collect();
        assert!(page_slice(&items, &page(3, 2)).is_empty());
        assert!(page_slice(&items, &page(1_000_000, 1_000)).is_empty());
    }

    #[test]
    fn page_slice_partial_last_page() {
        let items: Vec<i64> = (1..=5).collect();
        assert_eq!(page_slice(&items, &page(2, 3)), &[4, 5]);
    }

    #[test]
    fn page_slice_huge_page_number_does_not_overflow() {
        let items: Vec<i64> = (1..=4).collect();
        assert!(page_slice(&items, &page(i64::MAX, i64::MAX)).is_empty());
    }

    #[test]
    fn check_page_rejects_bad_params() {
        assert!(matches!(
            check_page(&page(0, 10)),
            Err(EngineError::InvalidPage { .. })
        ));
        assert!(matches!(
            check_page(&page(1, 0)),
            Err(EngineError::InvalidPage { .. })
        ));
        assert!(matches!(
            check_page(&page(-1, -5)),
            Err(EngineError::InvalidPage { .. })
        ));
        assert!(matches!(
            check_page(&page(1, MAX_PAGE_SIZE + 1)),
            Err(EngineError::LimitExceeded(_))
        ));
        assert!(check_page(&page(1, 1)).is_ok());
    }

    #[test]
    fn contract_filter_and_semantics() {
        let filter = ContractFilter {
            id: Some(3),
            property_id: Some(42),
            capacity: None,
        };
        assert!(contract_matches(&filter, 3, 42, 5));
        assert!(!contract_matches(&filter, 3, 41, 5));
        assert!(!contract_matches(&filter, 4, 42, 5));
        assert!(contract_matches(&ContractFilter::default(), 9, 9, 9));
    }
}
