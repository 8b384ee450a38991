#[path = "support/mod.rs"]
mod support;

use hub::repo::{conversations, messages};
use hub_test_utils::TestIdentity;
use support::TestServer;

/// Invariant I1: concurrent appends to the same conversation get dense,
/// strictly increasing `seq` values with no gaps or duplicates -- the
/// advisory lock in `repo::messages::append` must serialize the
/// read-increment-write instead of letting it race.
#[tokio::test]
async fn concurrent_appends_produce_dense_sequence() {
    let server = TestServer::start().await;
    let a = TestIdentity::generate();
    let b = TestIdentity::generate();
    let now = chrono::Utc::now();

    seed_identity(&server, &a.address).await;
    seed_identity(&server, &b.address).await;
    let convo = conversations::get_or_create_direct(&server.state.pool, &a.address, &b.address, now)
        .await
        .expect("create conversation");

    const N: usize = 20;
    let mut handles = Vec::with_capacity(N);
    for i in 0..N {
        let pool = server.state.pool.clone();
        let convo_id = convo.id;
        let (from, to) = if i % 2 == 0 { (a.address.clone(), b.address.clone()) } else { (b.address.clone(), a.address.clone()) };
        handles.push(tokio::spawn(async move {
            messages::append(&pool, convo_id, &from, &to, "hi", None, chrono::Utc::now())
                .await
                .expect("append")
        }));
    }

    let mut seqs: Vec<u64> = Vec::with_capacity(N);
    for handle in handles {
        seqs.push(handle.await.expect("task panicked").seq);
    }
    seqs.sort_unstable();

    let expected: Vec<u64> = (1..=N as u64).collect();
    assert_eq!(seqs, expected, "seq values must be dense and strictly increasing with no gaps or duplicates");
}

async fn seed_identity(server: &TestServer, address: &str) {
    sqlx::query("INSERT INTO identities (address, public_key) VALUES ($1, $2)")
        .bind(address)
        .bind("unused")
        .execute(&server.state.pool)
        .await
        .expect("seed identity");
}
