use std::path::PathBuf;
use std::sync::Arc;

use super::*;
use crate::limits::DEFAULT_CLAIM_TTL_MS;

fn test_wal_path(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join("cadastre_test_engine");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    let _ = std::fs::remove_file(&path);
    path
}

fn new_engine(path: &PathBuf) -> Engine {
    Engine::new(path.clone(), Arc::new(NotifyHub::new()), DEFAULT_CLAIM_TTL_MS).unwrap()
}

fn money(s: &str) -> Money {
    Money::parse(s).unwrap()
}

fn all(page_size: i64) -> PageRequest {
    PageRequest {
        number: 1,
        size: page_size,
    }
}

/// Engine with a priced table and `n` properties of the given capacities,
/// all listed for sale.
async fn sale_market(engine: &Engine, capacities: &[i64]) {
    engine.set_price(money("1500.00")).await.unwrap();
    for (i, &cap) in capacities.iter().enumerate() {
        let id = i as PropertyId + 1;
        engine.create_property(id, cap).await.unwrap();
        engine.list_for_sale(id).await.unwrap();
    }
}

// ── Pricing ──────────────────────────────────────────────

#[tokio::test]
async fn set_price_quotes_on_allocation() {
    let path = test_wal_path("price_quote.wal");
    let engine = new_engine(&path);

    engine.set_price(money("1500.00")).await.unwrap();
    engine.create_property(42, 3).await.unwrap();
    engine.list_for_sale(42).await.unwrap();

    let allocated = engine.request_property(3, false).await.unwrap();
    assert_eq!(allocated, Some((42, money("1500.00"))));
}

#[tokio::test]
async fn set_price_overwrite_takes_effect() {
    let path = test_wal_path("price_overwrite.wal");
    let engine = new_engine(&path);

    engine.set_price(money("1000")).await.unwrap();
    engine.set_price(money("1250.50")).await.unwrap();

    let prices = engine.list_prices(Some(4)).await.unwrap();
    assert_eq!(prices, vec![(4, money("1250.50"))]);
}

#[tokio::test]
async fn unpriced_allocation_fails() {
    let path = test_wal_path("unpriced.wal");
    let engine = new_engine(&path);

    engine.create_property(1, 3).await.unwrap();
    engine.list_for_sale(1).await.unwrap();

    let result = engine.request_property(3, false).await;
    assert!(matches!(result, Err(EngineError::Unpriced(3))));
}

#[tokio::test]
async fn invalid_size_rejected_before_price_lookup() {
    let path = test_wal_path("invalid_size.wal");
    let engine = new_engine(&path);

    // Size is checked first even on a completely empty engine
    let err = engine.request_property(9, false).await.unwrap_err();
    assert_eq!(err, EngineError::InvalidSize(9));
    assert_eq!(err.to_string(), "Invalid Size");

    let err = engine.request_property(0, true).await.unwrap_err();
    assert_eq!(err, EngineError::InvalidSize(0));
}

#[tokio::test]
async fn list_prices_unpriced_size_fails() {
    let path = test_wal_path("prices_unpriced.wal");
    let engine = new_engine(&path);

    assert!(matches!(
        engine.list_prices(Some(3)).await,
        Err(EngineError::Unpriced(3))
    ));
    // Out-of-range sizes are also unpriced, never a panic
    assert!(matches!(
        engine.list_prices(Some(99)).await,
        Err(EngineError::Unpriced(99))
    ));
}

// ── Property spawn and listing ───────────────────────────

#[tokio::test]
async fn spawn_duplicate_rejected() {
    let path = test_wal_path("dup_property.wal");
    let engine = new_engine(&path);

    engine.create_property(1, 3).await.unwrap();
    let result = engine.create_property(1, 5).await;
    assert!(matches!(result, Err(EngineError::AlreadyExists(1))));
}

#[tokio::test]
async fn spawn_capacity_out_of_range_rejected() {
    let path = test_wal_path("bad_capacity.wal");
    let engine = new_engine(&path);

    assert!(matches!(
        engine.create_property(1, 0).await,
        Err(EngineError::InvalidSize(0))
    ));
    assert!(matches!(
        engine.create_property(1, 9).await,
        Err(EngineError::InvalidSize(9))
    ));
}

#[tokio::test]
async fn new_property_is_owned_by_central_revenue() {
    let path = test_wal_path("central_owner.wal");
    let engine = new_engine(&path);

    engine.create_property(5, 2).await.unwrap();
    assert_eq!(engine.owner_of(5).await.unwrap(), CENTRAL_REVENUE);
}

#[tokio::test]
async fn owner_of_missing_property_fails() {
    let path = test_wal_path("owner_missing.wal");
    let engine = new_engine(&path);

    let err = engine.owner_of(999).await.unwrap_err();
    assert_eq!(err, EngineError::NotFound(999));
    assert_eq!(err.to_string(), "Property 999 does not exist");
}

#[tokio::test]
async fn listing_missing_property_fails() {
    let path = test_wal_path("list_missing.wal");
    let engine = new_engine(&path);

    assert!(matches!(
        engine.list_for_sale(1).await,
        Err(EngineError::NotFound(1))
    ));
    assert!(matches!(
        engine.list_for_rent(1).await,
        Err(EngineError::NotFound(1))
    ));
}

#[tokio::test]
async fn listing_is_idempotent() {
    let path = test_wal_path("list_idempotent.wal");
    let engine = new_engine(&path);

    engine.create_property(1, 3).await.unwrap();
    engine.list_for_sale(1).await.unwrap();
    engine.list_for_sale(1).await.unwrap();
    engine.list_for_rent(1).await.unwrap();
    engine.list_for_rent(1).await.unwrap();

    let rows = engine
        .query_properties(all(10), PropertyFilter::default())
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert!(rows[0].for_sale);
    assert!(rows[0].for_rent);
}

// ── Allocation ───────────────────────────────────────────

#[tokio::test]
async fn allocation_on_empty_market_is_none() {
    let path = test_wal_path("alloc_empty.wal");
    let engine = new_engine(&path);
    engine.set_price(money("100")).await.unwrap();

    assert_eq!(engine.request_property(3, false).await.unwrap(), None);
}

#[tokio::test]
async fn allocation_picks_lowest_id() {
    let path = test_wal_path("alloc_lowest.wal");
    let engine = new_engine(&path);
    sale_market(&engine, &[3, 3, 3]).await;

    let allocated = engine.find_available(3, false).await.unwrap();
    assert_eq!(allocated, Some(1));
}

#[tokio::test]
async fn allocation_matches_size_exactly() {
    let path = test_wal_path("alloc_size.wal");
    let engine = new_engine(&path);
    sale_market(&engine, &[2, 4]).await;

    assert_eq!(engine.find_available(3, false).await.unwrap(), None);
    assert_eq!(engine.find_available(4, false).await.unwrap(), Some(2));
}

#[tokio::test]
async fn allocation_respects_mode() {
    let path = test_wal_path("alloc_mode.wal");
    let engine = new_engine(&path);
    engine.set_price(money("100")).await.unwrap();

    engine.create_property(1, 3).await.unwrap();
    engine.list_for_rent(1).await.unwrap();

    assert_eq!(engine.find_available(3, false).await.unwrap(), None);
    assert_eq!(engine.find_available(3, true).await.unwrap(), Some(1));
}

#[tokio::test]
async fn claimed_property_not_reallocated() {
    let path = test_wal_path("alloc_claimed.wal");
    let engine = new_engine(&path);
    sale_market(&engine, &[3, 3]).await;

    let first = engine.find_available(3, false).await.unwrap();
    let second = engine.find_available(3, false).await.unwrap();
    let third = engine.find_available(3, false).await.unwrap();

    assert_eq!(first, Some(1));
    assert_eq!(second, Some(2));
    assert_eq!(third, None);
}

#[tokio::test]
async fn concurrent_allocations_are_pairwise_distinct() {
    let path = test_wal_path("alloc_concurrent.wal");
    let engine = Arc::new(new_engine(&path));
    sale_market(&engine, &[3, 3, 3, 3]).await;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            engine.request_property(3, false).await.unwrap()
        }));
    }

    let mut ids = Vec::new();
    let mut misses = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Some((id, _)) => ids.push(id),
            None => misses += 1,
        }
    }

    ids.sort_unstable();
    assert_eq!(ids, vec![1, 2, 3, 4]);
    assert_eq!(misses, 4);
}

#[tokio::test]
async fn released_claim_is_reallocatable() {
    let path = test_wal_path("alloc_release.wal");
    let engine = new_engine(&path);
    sale_market(&engine, &[3]).await;

    assert_eq!(engine.find_available(3, false).await.unwrap(), Some(1));
    assert_eq!(engine.find_available(3, false).await.unwrap(), None);

    assert!(engine.release_claim(1).await.unwrap());
    assert_eq!(engine.find_available(3, false).await.unwrap(), Some(1));
}

#[tokio::test]
async fn expired_claim_is_reallocatable() {
    let path = test_wal_path("alloc_expired.wal");
    // TTL of zero: claims are born expired
    let engine = Engine::new(path, Arc::new(NotifyHub::new()), 0).unwrap();
    sale_market(&engine, &[3]).await;

    assert_eq!(engine.find_available(3, false).await.unwrap(), Some(1));
    assert_eq!(engine.find_available(3, false).await.unwrap(), Some(1));
}

#[tokio::test]
async fn release_claim_on_missing_property_fails() {
    let path = test_wal_path("release_missing.wal");
    let engine = new_engine(&path);

    assert!(matches!(
        engine.release_claim(1).await,
        Err(EngineError::NotFound(1))
    ));
}

#[tokio::test]
async fn release_without_claim_is_noop() {
    let path = test_wal_path("release_noop.wal");
    let engine = new_engine(&path);
    engine.create_property(1, 3).await.unwrap();

    assert!(!engine.release_claim(1).await.unwrap());
}

// ── Transfers ────────────────────────────────────────────

#[tokio::test]
async fn approved_transfer_moves_ownership_and_records_contract() {
    let path = test_wal_path("transfer_ok.wal");
    let engine = new_engine(&path);
    sale_market(&engine, &[3]).await;

    let claimed = engine.request_property(3, false).await.unwrap();
    assert_eq!(claimed.map(|(id, _)| id), Some(1));

    let contract_id = engine
        .approve_transfer(1, CENTRAL_REVENUE, 7, money("1500.00"), true)
        .await
        .unwrap();
    assert_eq!(contract_id, Some(1));

    assert_eq!(engine.owner_of(1).await.unwrap(), 7);

    let rows = engine
        .query_properties(all(10), PropertyFilter::default())
        .await
        .unwrap();
    assert!(!rows[0].for_sale);

    let contracts = engine
        .sale_contracts(all(10), ContractFilter::default())
        .await
        .unwrap();
    assert_eq!(
        contracts,
        vec![SaleContract {
            id: 1,
            property_id: 1,
            seller_id: CENTRAL_REVENUE,
            buyer_id: 7,
            capacity: 3,
            price: money("1500.00"),
        }]
    );

    // The claim was consumed: re-listing makes the property allocatable again
    engine.list_for_sale(1).await.unwrap();
    assert_eq!(engine.find_available(3, false).await.unwrap(), Some(1));
}

#[tokio::test]
async fn transfer_seller_mismatch_rejected() {
    let path = test_wal_path("transfer_mismatch.wal");
    let engine = new_engine(&path);
    sale_market(&engine, &[3]).await;

    let result = engine.approve_transfer(1, 99, 7, money("1"), true).await;
    assert!(matches!(
        result,
        Err(EngineError::SellerMismatch {
            property_id: 1,
            seller_id: 99
        })
    ));
    // Nothing changed
    assert_eq!(engine.owner_of(1).await.unwrap(), CENTRAL_REVENUE);
    assert!(
        engine
            .sale_contracts(all(10), ContractFilter::default())
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn transfer_on_missing_property_fails() {
    let path = test_wal_path("transfer_missing.wal");
    let engine = new_engine(&path);

    let result = engine
        .approve_transfer(404, CENTRAL_REVENUE, 7, money("1"), true)
        .await;
    assert!(matches!(result, Err(EngineError::NotFound(404))));
}

#[tokio::test]
async fn transfer_on_unlisted_property_rejected() {
    let path = test_wal_path("transfer_unlisted.wal");
    let engine = new_engine(&path);
    engine.create_property(1, 3).await.unwrap();

    let result = engine
        .approve_transfer(1, CENTRAL_REVENUE, 7, money("1"), true)
        .await;
    assert!(matches!(
        result,
        Err(EngineError::NotListed {
            property_id: 1,
            to_rent: false
        })
    ));
}

#[tokio::test]
async fn cancelled_transfer_releases_claim_only() {
    let path = test_wal_path("transfer_cancel.wal");
    let engine = new_engine(&path);
    sale_market(&engine, &[3]).await;

    engine.request_property(3, false).await.unwrap();
    assert_eq!(engine.find_available(3, false).await.unwrap(), None);

    let recorded = engine
        .approve_transfer(1, CENTRAL_REVENUE, 7, money("1500.00"), false)
        .await
        .unwrap();
    assert_eq!(recorded, None);

    // Still listed, still centrally owned, no contract, claim gone
    assert_eq!(engine.owner_of(1).await.unwrap(), CENTRAL_REVENUE);
    assert!(
        engine
            .sale_contracts(all(10), ContractFilter::default())
            .await
            .unwrap()
            .is_empty()
    );
    assert_eq!(engine.find_available(3, false).await.unwrap(), Some(1));
}

#[tokio::test]
async fn resale_chains_ownership() {
    let path = test_wal_path("resale.wal");
    let engine = new_engine(&path);
    sale_market(&engine, &[3]).await;

    engine
        .approve_transfer(1, CENTRAL_REVENUE, 7, money("1500.00"), true)
        .await
        .unwrap();
    engine.list_for_sale(1).await.unwrap();
    let second = engine
        .approve_transfer(1, 7, 8, money("1800.00"), true)
        .await
        .unwrap();

    assert_eq!(second, Some(2));
    assert_eq!(engine.owner_of(1).await.unwrap(), 8);

    let contracts = engine
        .sale_contracts(all(10), ContractFilter::default())
        .await
        .unwrap();
    assert_eq!(contracts.len(), 2);
    assert_eq!(contracts[0].id, 1);
    assert_eq!(contracts[1].id, 2);
    assert_eq!(contracts[1].seller_id, 7);
}

// ── Leases ───────────────────────────────────────────────

#[tokio::test]
async fn signed_lease_records_contract_and_delists() {
    let path = test_wal_path("lease_ok.wal");
    let engine = new_engine(&path);
    engine.set_price(money("800")).await.unwrap();
    engine.create_property(9, 2).await.unwrap();
    engine.list_for_rent(9).await.unwrap();

    let contract_id = engine.sign_lease(9, 31, money("800.50")).await.unwrap();
    assert_eq!(contract_id, 1);

    let contracts = engine
        .rental_contracts(all(10), ContractFilter::default())
        .await
        .unwrap();
    assert_eq!(
        contracts,
        vec![RentalContract {
            id: 1,
            property_id: 9,
            landlord_id: CENTRAL_REVENUE,
            tenant_id: 31,
            capacity: 2,
            price: money("800.50"),
        }]
    );

    // Off the rental market until relisted
    assert_eq!(engine.find_available(2, true).await.unwrap(), None);
}

#[tokio::test]
async fn lease_requires_rental_listing() {
    let path = test_wal_path("lease_unlisted.wal");
    let engine = new_engine(&path);
    engine.create_property(9, 2).await.unwrap();

    let result = engine.sign_lease(9, 31, money("800")).await;
    assert!(matches!(
        result,
        Err(EngineError::NotListed {
            property_id: 9,
            to_rent: true
        })
    ));
}

#[tokio::test]
async fn lease_on_missing_property_fails() {
    let path = test_wal_path("lease_missing.wal");
    let engine = new_engine(&path);

    assert!(matches!(
        engine.sign_lease(404, 31, money("1")).await,
        Err(EngineError::NotFound(404))
    ));
}

#[tokio::test]
async fn lease_landlord_follows_ownership() {
    let path = test_wal_path("lease_landlord.wal");
    let engine = new_engine(&path);
    sale_market(&engine, &[3]).await;

    engine
        .approve_transfer(1, CENTRAL_REVENUE, 7, money("1500.00"), true)
        .await
        .unwrap();
    engine.list_for_rent(1).await.unwrap();
    engine.sign_lease(1, 31, money("650")).await.unwrap();

    let contracts = engine
        .rental_contracts(all(10), ContractFilter::default())
        .await
        .unwrap();
    assert_eq!(contracts[0].landlord_id, 7);
}

// ── Paginated queries ────────────────────────────────────

#[tokio::test]
async fn property_pages_concatenate_to_full_set() {
    let path = test_wal_path("query_pages.wal");
    let engine = new_engine(&path);
    engine.set_price(money("1")).await.unwrap();
    for id in 1..=10 {
        engine.create_property(id, 3).await.unwrap();
    }

    let mut seen = Vec::new();
    for number in 1..=4 {
        let page = engine
            .query_properties(
                PageRequest { number, size: 3 },
                PropertyFilter::default(),
            )
            .await
            .unwrap();
        seen.extend(page.into_iter().map(|p| p.id));
    }
    assert_eq!(seen, (1..=10).collect::<Vec<_>>());
}

#[tokio::test]
async fn property_page_past_end_is_empty() {
    let path = test_wal_path("query_past_end.wal");
    let engine = new_engine(&path);
    engine.create_property(1, 3).await.unwrap();

    let page = engine
        .query_properties(
            PageRequest { number: 99, size: 10 },
            PropertyFilter::default(),
        )
        .await
        .unwrap();
    assert!(page.is_empty());
}

#[tokio::test]
async fn property_query_rejects_bad_page_params() {
    let path = test_wal_path("query_bad_page.wal");
    let engine = new_engine(&path);

    assert!(matches!(
        engine
            .query_properties(PageRequest { number: 0, size: 10 }, PropertyFilter::default())
            .await,
        Err(EngineError::InvalidPage { number: 0, size: 10 })
    ));
    assert!(matches!(
        engine
            .query_properties(PageRequest { number: 1, size: 0 }, PropertyFilter::default())
            .await,
        Err(EngineError::InvalidPage { number: 1, size: 0 })
    ));
}

#[tokio::test]
async fn property_filters_are_anded() {
    let path = test_wal_path("query_filters.wal");
    let engine = new_engine(&path);
    sale_market(&engine, &[2, 3, 3]).await;
    engine
        .approve_transfer(2, CENTRAL_REVENUE, 7, money("1500.00"), true)
        .await
        .unwrap();

    let by_owner = engine
        .query_properties(
            all(10),
            PropertyFilter {
                owner_id: Some(7),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(by_owner.iter().map(|p| p.id).collect::<Vec<_>>(), vec![2]);

    let by_capacity = engine
        .query_properties(
            all(10),
            PropertyFilter {
                capacity: Some(3),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(
        by_capacity.iter().map(|p| p.id).collect::<Vec<_>>(),
        vec![2, 3]
    );

    let both = engine
        .query_properties(
            all(10),
            PropertyFilter {
                owner_id: Some(CENTRAL_REVENUE),
                capacity: Some(3),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(both.iter().map(|p| p.id).collect::<Vec<_>>(), vec![3]);

    let by_id = engine
        .query_properties(
            all(10),
            PropertyFilter {
                id: Some(1),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(by_id.len(), 1);
    assert_eq!(by_id[0].capacity, 2);
}

#[tokio::test]
async fn contract_queries_filter_and_paginate() {
    let path = test_wal_path("query_contracts.wal");
    let engine = new_engine(&path);
    sale_market(&engine, &[3, 3, 5]).await;

    for (property_id, buyer) in [(1, 10), (2, 11), (3, 12)] {
        engine
            .approve_transfer(property_id, CENTRAL_REVENUE, buyer, money("1500.00"), true)
            .await
            .unwrap();
    }

    let by_property = engine
        .sale_contracts(
            all(10),
            ContractFilter {
                property_id: Some(2),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(by_property.len(), 1);
    assert_eq!(by_property[0].buyer_id, 11);

    let by_capacity = engine
        .sale_contracts(
            all(10),
            ContractFilter {
                capacity: Some(3),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(by_capacity.len(), 2);

    let second_page = engine
        .sale_contracts(PageRequest { number: 2, size: 2 }, ContractFilter::default())
        .await
        .unwrap();
    assert_eq!(second_page.len(), 1);
    assert_eq!(second_page[0].id, 3);

    assert!(matches!(
        engine
            .rental_contracts(PageRequest { number: 1, size: -1 }, ContractFilter::default())
            .await,
        Err(EngineError::InvalidPage { .. })
    ));
}

// ── Durability ───────────────────────────────────────────

#[tokio::test]
async fn restart_replays_full_state() {
    let path = test_wal_path("restart.wal");

    {
        let engine = new_engine(&path);
        sale_market(&engine, &[3, 5]).await;
        engine
            .approve_transfer(1, CENTRAL_REVENUE, 7, money("1500.00"), true)
            .await
            .unwrap();
        engine.list_for_rent(2).await.unwrap();
        engine.sign_lease(2, 31, money("700")).await.unwrap();
    }

    let engine = new_engine(&path);

    assert_eq!(engine.owner_of(1).await.unwrap(), 7);
    assert_eq!(engine.owner_of(2).await.unwrap(), CENTRAL_REVENUE);

    let props = engine
        .query_properties(all(10), PropertyFilter::default())
        .await
        .unwrap();
    assert_eq!(props.len(), 2);
    assert!(!props[0].for_sale); // sold
    assert!(props[1].for_sale); // still on the sale market
    assert!(!props[1].for_rent); // lease consumed the rental listing

    let sales = engine
        .sale_contracts(all(10), ContractFilter::default())
        .await
        .unwrap();
    assert_eq!(sales.len(), 1);
    let rentals = engine
        .rental_contracts(all(10), ContractFilter::default())
        .await
        .unwrap();
    assert_eq!(rentals.len(), 1);

    // Replayed price still quotes
    engine.list_for_sale(2).await.unwrap();
    let allocated = engine.request_property(5, false).await.unwrap();
    assert_eq!(allocated, Some((2, money("1500.00"))));
}

#[tokio::test]
async fn restart_continues_contract_ids() {
    let path = test_wal_path("restart_ids.wal");

    {
        let engine = new_engine(&path);
        sale_market(&engine, &[3, 3]).await;
        engine
            .approve_transfer(1, CENTRAL_REVENUE, 7, money("1500.00"), true)
            .await
            .unwrap();
    }

    let engine = new_engine(&path);
    let second = engine
        .approve_transfer(2, CENTRAL_REVENUE, 8, money("1500.00"), true)
        .await
        .unwrap();
    assert_eq!(second, Some(2));
}

#[tokio::test]
async fn restart_restores_live_claims() {
    let path = test_wal_path("restart_claims.wal");

    {
        let engine = new_engine(&path);
        sale_market(&engine, &[3]).await;
        assert_eq!(engine.find_available(3, false).await.unwrap(), Some(1));
    }

    let engine = new_engine(&path);
    // The claim from the previous run still holds the property
    assert_eq!(engine.find_available(3, false).await.unwrap(), None);
}

#[tokio::test]
async fn compaction_preserves_state() {
    let path = test_wal_path("compact_state.wal");

    {
        let engine = new_engine(&path);
        sale_market(&engine, &[3, 5]).await;
        engine
            .approve_transfer(1, CENTRAL_REVENUE, 7, money("1500.00"), true)
            .await
            .unwrap();
        engine.list_for_sale(1).await.unwrap();
        // Claim churn that compaction drops
        for _ in 0..5 {
            engine.find_available(3, false).await.unwrap();
            engine.release_claim(1).await.unwrap();
        }
        engine.compact_wal().await.unwrap();
        assert_eq!(engine.wal_appends_since_compact().await, 0);
    }

    let engine = new_engine(&path);

    assert_eq!(engine.owner_of(1).await.unwrap(), 7);
    let props = engine
        .query_properties(all(10), PropertyFilter::default())
        .await
        .unwrap();
    assert_eq!(props.len(), 2);
    assert!(props[0].for_sale); // relisted after the sale
    assert!(props[1].for_sale);

    let sales = engine
        .sale_contracts(all(10), ContractFilter::default())
        .await
        .unwrap();
    assert_eq!(sales.len(), 1);

    // Contract ids keep counting past the compacted history
    let next = engine
        .approve_transfer(1, 7, 8, money("1600.00"), true)
        .await
        .unwrap();
    assert_eq!(next, Some(2));
}
