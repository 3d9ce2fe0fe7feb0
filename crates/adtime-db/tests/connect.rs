//! Connection establishment against an endpoint that refuses connections.
//!
//! Nothing listens on port 1 of the loopback interface, so every attempt
//! fails immediately and the retry budget alone decides when to stop.

#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::missing_panics_doc,
    clippy::arithmetic_side_effects
)]

use std::time::{Duration, Instant};

use adtime_db::{DbError, PostgresConfig, PostgresPool, RetryPolicy};

#[tokio::test]
async fn unreachable_database_gives_up_within_budget() {
    let budget = Duration::from_secs(2);
    let config = PostgresConfig::new("127.0.0.1", 1, "adtime", "adtime", "adtime")
        .with_connect_timeout(Duration::from_millis(500))
        .with_retry(
            RetryPolicy::default()
                .with_initial_interval(Duration::from_millis(100))
                .with_multiplier(2.0)
                .with_max_interval(Duration::from_millis(400))
                .with_max_elapsed_time(budget),
        );

    let start = Instant::now();
    let result = PostgresPool::connect_with_retry(&config).await;
    let waited = start.elapsed();

    match result {
        Err(DbError::ConnectExhausted {
            attempts,
            elapsed,
            source,
        }) => {
            assert!(attempts >= 2, "expected retries, got {attempts} attempt(s)");
            assert!(elapsed <= budget);
            assert!(matches!(*source, DbError::Postgres(_)));
        }
        Err(other) => panic!("expected exhausted retries, got {other}"),
        Ok(_) => panic!("connected to a port nothing listens on"),
    }
    assert!(waited < budget + Duration::from_secs(2));
}
