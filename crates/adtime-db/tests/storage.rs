//! Behavioural tests for [`Storage`] on the in-process substitutes.
//!
//! No services are needed: [`MemoryRepository`] stands in for
//! `PostgreSQL` and counts the queries it serves, [`MemoryCache`] stands in
//! for `Dragonfly` and expires keys on the tokio clock.

#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::missing_panics_doc,
    clippy::arithmetic_side_effects,
    clippy::indexing_slicing,
    clippy::too_many_lines
)]

use std::time::Duration;

use adtime_db::cache::{self, ORDER_STATS_KEY};
use adtime_db::{
    DbError, Entity, MemoryCache, MemoryRepository, Storage, StorageConfig, Visibility,
};
use adtime_types::{
    CostBreakdown, NewOrder, Order, OrderId, OrderStatistics, OrderStatus, RateLimitAction,
    Texture, TextureId, UserAgreement, UserId,
};
use chrono::{Days, Utc};
use rust_decimal::Decimal;

// =============================================================================
// Helpers
// =============================================================================

fn setup() -> (Storage, MemoryRepository, MemoryCache) {
    let repo = MemoryRepository::new();
    let cache = MemoryCache::new();
    let storage = Storage::new(repo.clone(), cache.clone());
    (storage, repo, cache)
}

fn new_order(user: i64, price: i64) -> NewOrder {
    NewOrder {
        user_id: UserId(user),
        width_cm: 40,
        height_cm: 30,
        texture_id: TextureId::from("croc-black"),
        texture_name: String::from("Croc black"),
        price: Decimal::new(price, 0),
        costs: CostBreakdown {
            leather_cost: Decimal::new(1800, 0),
            process_cost: Decimal::new(1200, 0),
            total_cost: Decimal::new(3000, 0),
            commission: Decimal::new(500, 0),
            tax: Decimal::new(300, 0),
            net_revenue: Decimal::new(4200, 0),
            profit: Decimal::new(1200, 0),
        },
        contact: String::from("@customer"),
        status: OrderStatus::New,
    }
}

fn texture(id: &str, name: &str, price: Decimal, in_stock: bool) -> Texture {
    Texture {
        id: TextureId::from(id),
        name: name.to_owned(),
        price_per_dm2: price,
        image_url: format!("https://cdn.example/{id}.jpg"),
        in_stock,
    }
}

// =============================================================================
// Orders
// =============================================================================

#[tokio::test]
async fn saved_order_reads_back_equal() {
    let (storage, _, _) = setup();
    let order = new_order(1, 5000);

    let id = storage.save_order(&order).await.unwrap();
    let stored = storage.get_order_by_id(id).await.unwrap();

    assert_eq!(stored.id, id);
    assert_eq!(stored.created_at, stored.updated_at);
    assert!(stored.deleted_at.is_none());
    assert_eq!(stored, Order::from_new(id, order, stored.created_at));
}

#[tokio::test]
async fn missing_order_is_not_found() {
    let (storage, _, _) = setup();

    let err = storage.get_order_by_id(OrderId(404)).await.unwrap_err();

    assert!(err.is_not_found());
    assert!(matches!(
        err,
        DbError::NotFound {
            entity: Entity::Order,
            ..
        }
    ));
}

#[tokio::test]
async fn store_failure_names_the_operation() {
    let (storage, repo, _) = setup();
    repo.fail_next(1);

    let err = storage.save_order(&new_order(1, 100)).await.unwrap_err();

    assert!(!err.is_not_found());
    match err {
        DbError::Operation {
            operation, target, ..
        } => {
            assert_eq!(operation, "save order");
            assert_eq!(target, "user 1");
        }
        other => panic!("expected operation error, got {other:?}"),
    }
}

#[tokio::test]
async fn user_orders_are_newest_first() {
    let (storage, repo, _) = setup();
    let now = Utc::now();

    let oldest = storage.save_order(&new_order(1, 100)).await.unwrap();
    let newest = storage.save_order(&new_order(1, 200)).await.unwrap();
    let middle = storage.save_order(&new_order(1, 300)).await.unwrap();
    storage.save_order(&new_order(2, 400)).await.unwrap();

    repo.backdate_order(oldest, now - Days::new(3)).await;
    repo.backdate_order(middle, now - Days::new(1)).await;

    let ids: Vec<OrderId> = storage
        .get_user_orders(UserId(1))
        .await
        .unwrap()
        .iter()
        .map(|o| o.id)
        .collect();

    assert_eq!(ids, vec![newest, middle, oldest]);
}

#[tokio::test]
async fn user_without_orders_gets_empty_list() {
    let (storage, _, _) = setup();
    assert!(storage.get_user_orders(UserId(99)).await.unwrap().is_empty());
}

#[tokio::test]
async fn delete_user_data_is_idempotent() {
    let (storage, _, _) = setup();
    let first = storage.save_order(&new_order(1, 100)).await.unwrap();
    storage.save_order(&new_order(1, 200)).await.unwrap();
    storage.save_order(&new_order(2, 300)).await.unwrap();

    assert_eq!(storage.delete_user_data(UserId(1)).await.unwrap(), 2);
    let after_first = storage.list_orders(Visibility::IncludeDeleted).await.unwrap();

    assert_eq!(storage.delete_user_data(UserId(1)).await.unwrap(), 0);
    let after_second = storage.list_orders(Visibility::IncludeDeleted).await.unwrap();

    assert_eq!(after_first, after_second);
    assert!(storage.get_user_orders(UserId(1)).await.unwrap().is_empty());
    assert_eq!(storage.get_user_orders(UserId(2)).await.unwrap().len(), 1);
    assert!(storage.get_order_by_id(first).await.unwrap_err().is_not_found());
    assert_eq!(storage.list_orders(Visibility::Active).await.unwrap().len(), 1);
    assert_eq!(after_second.len(), 3);
}

#[tokio::test]
async fn status_update_applies_to_active_orders_only() {
    let (storage, _, _) = setup();
    let id = storage.save_order(&new_order(1, 100)).await.unwrap();

    storage
        .update_order_status(id, OrderStatus::InProduction)
        .await
        .unwrap();
    let order = storage.get_order_by_id(id).await.unwrap();
    assert_eq!(order.status, OrderStatus::InProduction);
    assert!(order.updated_at >= order.created_at);

    storage.delete_user_data(UserId(1)).await.unwrap();
    let err = storage
        .update_order_status(id, OrderStatus::Shipped)
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    let err = storage
        .update_order_status(OrderId(12_345), OrderStatus::Shipped)
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

// =============================================================================
// Consent
// =============================================================================

#[tokio::test]
async fn unknown_user_has_default_agreement() {
    let (storage, _, _) = setup();
    let agreement = storage.get_user_agreement(UserId(5)).await.unwrap();
    assert_eq!(agreement, UserAgreement::default());
}

#[tokio::test]
async fn agreement_upsert_overwrites_phone() {
    let (storage, _, _) = setup();

    storage
        .save_user_agreement(UserId(5), "+70000000001")
        .await
        .unwrap();
    storage
        .save_user_agreement(UserId(5), "+70000000002")
        .await
        .unwrap();

    let agreement = storage.get_user_agreement(UserId(5)).await.unwrap();
    assert!(agreement.agreed);
    assert_eq!(agreement.phone, "+70000000002");
}

// =============================================================================
// Catalog
// =============================================================================

#[tokio::test]
async fn cached_texture_skips_the_store() {
    let (storage, repo, cache) = setup();
    let croc = texture("croc-black", "Croc black", Decimal::new(450, 0), true);
    repo.put_texture(croc.clone()).await;

    let first = storage.get_texture_by_id(&croc.id).await.unwrap();
    assert_eq!(repo.query_count(), 1);
    assert!(cache.contains(&cache::texture_key(&croc.id)).await);

    let second = storage.get_texture_by_id(&croc.id).await.unwrap();
    assert_eq!(repo.query_count(), 1);
    assert_eq!(first, second);
    assert_eq!(second, croc);
}

#[tokio::test]
async fn cached_texture_with_bad_price_is_refetched() {
    let (storage, repo, cache) = setup();
    let croc = texture("croc-black", "Croc black", Decimal::new(450, 0), true);
    repo.put_texture(croc.clone()).await;

    let key = cache::texture_key(&croc.id);
    let poisoned = texture("croc-black", "Croc black", Decimal::ZERO, true);
    cache
        .set_json(&key, &poisoned, cache::TEXTURE_TTL)
        .await
        .unwrap();

    let fetched = storage.get_texture_by_id(&croc.id).await.unwrap();

    assert_eq!(repo.query_count(), 1);
    assert_eq!(fetched, croc);
    assert_eq!(cache.get_json::<Texture>(&key).await.unwrap(), croc);
}

#[tokio::test]
async fn stored_texture_with_bad_price_is_rejected_and_not_cached() {
    let (storage, repo, cache) = setup();
    let broken = texture("suede-grey", "Suede grey", Decimal::new(-5, 0), true);
    repo.put_texture(broken.clone()).await;

    let err = storage.get_texture_by_id(&broken.id).await.unwrap_err();

    assert!(matches!(err, DbError::InvalidPrice { ref texture_id, .. } if texture_id == "suede-grey"));
    assert!(!cache.contains(&cache::texture_key(&broken.id)).await);
}

#[tokio::test]
async fn missing_texture_is_not_found_and_not_cached() {
    let (storage, _, cache) = setup();
    let id = TextureId::from("python-white");

    let err = storage.get_texture_by_id(&id).await.unwrap_err();

    assert!(matches!(
        err,
        DbError::NotFound {
            entity: Entity::Texture,
            ..
        }
    ));
    assert!(!cache.contains(&cache::texture_key(&id)).await);
}

#[tokio::test(start_paused = true)]
async fn cached_texture_expires_after_a_day() {
    let (storage, repo, _) = setup();
    let croc = texture("croc-black", "Croc black", Decimal::new(450, 0), true);
    repo.put_texture(croc.clone()).await;

    storage.get_texture_by_id(&croc.id).await.unwrap();
    tokio::time::advance(cache::TEXTURE_TTL + Duration::from_secs(1)).await;
    storage.get_texture_by_id(&croc.id).await.unwrap();

    assert_eq!(repo.query_count(), 2);
}

#[tokio::test]
async fn available_textures_are_in_stock_and_sorted() {
    let (storage, repo, _) = setup();
    repo.put_texture(texture("t1", "Suede", Decimal::new(300, 0), true))
        .await;
    repo.put_texture(texture("t2", "Croc", Decimal::new(450, 0), true))
        .await;
    repo.put_texture(texture("t3", "Python", Decimal::new(600, 0), false))
        .await;

    let names: Vec<String> = storage
        .get_available_textures()
        .await
        .unwrap()
        .into_iter()
        .map(|t| t.name)
        .collect();

    assert_eq!(names, vec!["Croc", "Suede"]);
}

#[tokio::test]
async fn texture_lookup_by_name() {
    let (storage, repo, _) = setup();
    let croc = texture("croc-black", "Croc black", Decimal::new(450, 0), true);
    repo.put_texture(croc.clone()).await;

    assert_eq!(storage.get_texture_by_name("Croc black").await.unwrap(), croc);
    assert!(
        storage
            .get_texture_by_name("Ostrich")
            .await
            .unwrap_err()
            .is_not_found()
    );
}

#[tokio::test]
async fn duplicate_texture_names_resolve_to_lowest_id() {
    let (storage, repo, _) = setup();
    repo.put_texture(texture("suede-b", "Suede", Decimal::new(300, 0), true))
        .await;
    repo.put_texture(texture("suede-a", "Suede", Decimal::new(250, 0), true))
        .await;

    for _ in 0..3 {
        let found = storage.get_texture_by_name("Suede").await.unwrap();
        assert_eq!(found.id, TextureId::from("suede-a"));
    }
}

// =============================================================================
// Statistics
// =============================================================================

#[tokio::test]
async fn statistics_cover_each_period() {
    let (storage, repo, _) = setup();
    let now = Utc::now();

    storage.save_order(&new_order(1, 1000)).await.unwrap();
    let ten_days = storage.save_order(&new_order(1, 2000)).await.unwrap();
    let forty_days = storage.save_order(&new_order(2, 4000)).await.unwrap();
    storage
        .update_order_status(forty_days, OrderStatus::Completed)
        .await
        .unwrap();

    repo.backdate_order(ten_days, now - Days::new(10)).await;
    repo.backdate_order(forty_days, now - Days::new(40)).await;

    let stats = storage.get_order_statistics().await.unwrap();

    assert_eq!(stats.total.orders, 3);
    assert_eq!(stats.total.revenue, Decimal::new(7000, 0));
    assert_eq!(stats.today.orders, 1);
    assert_eq!(stats.today.revenue, Decimal::new(1000, 0));
    assert_eq!(stats.week.orders, 1);
    assert_eq!(stats.month.orders, 2);
    assert_eq!(stats.month.revenue, Decimal::new(3000, 0));
    assert_eq!(stats.status_counts.get(&OrderStatus::New), Some(&2));
    assert_eq!(stats.status_counts.get(&OrderStatus::Completed), Some(&1));
    assert_eq!(stats.status_counts.get(&OrderStatus::Shipped), None);
}

#[tokio::test]
async fn empty_store_has_zero_statistics() {
    let (storage, _, _) = setup();
    let stats = storage.get_order_statistics().await.unwrap();
    assert_eq!(stats, OrderStatistics::default());
}

#[tokio::test]
async fn statistics_are_served_from_cache() {
    let (storage, repo, cache) = setup();
    storage.save_order(&new_order(1, 1000)).await.unwrap();

    let computed = storage.get_order_statistics().await.unwrap();
    let queries = repo.query_count();
    let cached = storage.get_order_statistics().await.unwrap();

    assert_eq!(repo.query_count(), queries);
    assert_eq!(computed, cached);
    assert!(cache.contains(ORDER_STATS_KEY).await);
}

#[tokio::test]
async fn save_order_invalidates_statistics() {
    let (storage, repo, cache) = setup();
    storage.save_order(&new_order(1, 1000)).await.unwrap();
    let before = storage.get_order_statistics().await.unwrap();
    assert!(cache.contains(ORDER_STATS_KEY).await);

    storage.save_order(&new_order(1, 500)).await.unwrap();
    assert!(!cache.contains(ORDER_STATS_KEY).await);

    let queries = repo.query_count();
    let after = storage.get_order_statistics().await.unwrap();

    assert!(repo.query_count() > queries);
    assert_eq!(before.total.orders, 1);
    assert_eq!(after.total.orders, 2);
    assert_eq!(after.total.revenue, Decimal::new(1500, 0));
}

#[tokio::test]
async fn deleting_user_data_invalidates_statistics() {
    let (storage, _, cache) = setup();
    storage.save_order(&new_order(1, 1000)).await.unwrap();
    storage.save_order(&new_order(2, 2000)).await.unwrap();
    storage.get_order_statistics().await.unwrap();

    storage.delete_user_data(UserId(1)).await.unwrap();
    assert!(!cache.contains(ORDER_STATS_KEY).await);

    let stats = storage.get_order_statistics().await.unwrap();
    assert_eq!(stats.total.orders, 1);
    assert_eq!(stats.total.revenue, Decimal::new(2000, 0));
}

#[tokio::test]
async fn deleting_nothing_keeps_cached_statistics() {
    let (storage, _, cache) = setup();
    storage.save_order(&new_order(1, 1000)).await.unwrap();
    storage.get_order_statistics().await.unwrap();

    assert_eq!(storage.delete_user_data(UserId(99)).await.unwrap(), 0);
    assert!(cache.contains(ORDER_STATS_KEY).await);
}

#[tokio::test(start_paused = true)]
async fn timed_out_save_still_invalidates_statistics() {
    let repo = MemoryRepository::new();
    let cache = MemoryCache::new();
    let storage = Storage::with_config(
        repo.clone(),
        cache.clone(),
        StorageConfig::default().with_operation_timeout(Duration::from_millis(50)),
    );
    storage.get_order_statistics().await.unwrap();
    assert!(cache.contains(ORDER_STATS_KEY).await);

    repo.delay_next_write(Duration::from_secs(1));
    let err = storage.save_order(&new_order(1, 1000)).await.unwrap_err();

    assert!(err.is_timeout());
    assert_eq!(storage.get_user_orders(UserId(1)).await.unwrap().len(), 1);
    assert!(!cache.contains(ORDER_STATS_KEY).await);
    assert_eq!(storage.get_order_statistics().await.unwrap().total.orders, 1);
}

#[tokio::test(start_paused = true)]
async fn timed_out_status_update_still_invalidates_statistics() {
    let repo = MemoryRepository::new();
    let cache = MemoryCache::new();
    let storage = Storage::with_config(
        repo.clone(),
        cache.clone(),
        StorageConfig::default().with_operation_timeout(Duration::from_millis(50)),
    );
    let id = storage.save_order(&new_order(1, 1000)).await.unwrap();
    storage.get_order_statistics().await.unwrap();

    repo.delay_next_write(Duration::from_secs(1));
    let err = storage
        .update_order_status(id, OrderStatus::Completed)
        .await
        .unwrap_err();

    assert!(err.is_timeout());
    assert!(!cache.contains(ORDER_STATS_KEY).await);
    let stored = storage.get_order_by_id(id).await.unwrap();
    assert_eq!(stored.status, OrderStatus::Completed);
}

#[tokio::test]
async fn failed_statistics_query_fails_whole_snapshot() {
    let (storage, repo, cache) = setup();
    storage.save_order(&new_order(1, 1000)).await.unwrap();
    repo.fail_next(1);

    let err = storage.get_order_statistics().await.unwrap_err();

    assert!(matches!(err, DbError::Operation { .. }));
    assert!(!cache.contains(ORDER_STATS_KEY).await);

    let stats = storage.get_order_statistics().await.unwrap();
    assert_eq!(stats.total.orders, 1);
}

// =============================================================================
// Rate limiting
// =============================================================================

#[tokio::test(start_paused = true)]
async fn rate_limit_blocks_after_limit_and_resets() {
    let (storage, _, _) = setup();
    let window = Duration::from_secs(60);

    let mut results = Vec::new();
    for _ in 0..4 {
        results.push(
            storage
                .check_rate_limit(UserId(3), RateLimitAction::NewOrder, 3, window)
                .await
                .unwrap(),
        );
    }
    assert_eq!(results, vec![false, false, false, true]);

    tokio::time::advance(window + Duration::from_secs(1)).await;

    assert!(
        !storage
            .check_rate_limit(UserId(3), RateLimitAction::NewOrder, 3, window)
            .await
            .unwrap()
    );
}

#[tokio::test(start_paused = true)]
async fn rate_limit_counter_without_expiry_still_resets() {
    let (storage, _, cache) = setup();
    let window = Duration::from_secs(60);
    let key = cache::rate_limit_key(UserId(4), RateLimitAction::PriceQuote);

    // Counter created by a call that never reached its EXPIRE.
    cache.incr(&key).await.unwrap();

    for _ in 0..4 {
        storage
            .check_rate_limit(UserId(4), RateLimitAction::PriceQuote, 3, window)
            .await
            .unwrap();
    }
    assert!(
        storage
            .check_rate_limit(UserId(4), RateLimitAction::PriceQuote, 3, window)
            .await
            .unwrap()
    );
    assert_eq!(cache.ttl(&key).await, Some(window));

    tokio::time::advance(window + Duration::from_secs(1)).await;

    assert!(
        !storage
            .check_rate_limit(UserId(4), RateLimitAction::PriceQuote, 3, window)
            .await
            .unwrap()
    );
}
