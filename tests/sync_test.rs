use std::time::Duration;

use chained_bft::counters::CounterType;
use log::LevelFilter;

mod common;

use common::{
    logging::setup_logger,
    node::{assert_consistent, generate_keypairs, poll_until, start_cluster, validator_set_of},
};

/// Tests BFT sync.
///
/// Starts four validators, cuts one of them (the "lagging" replica) off while the other three make
/// progress, then reconnects it and checks that it catches up with the others and agrees with them.
#[test]
fn lagging_replica_catches_up() {
    setup_logger(LevelFilter::Info);

    // 1. Start four validators and cut the lagging replica off.
    let keypairs = generate_keypairs(4);
    let (nodes, partition) = start_cluster(&keypairs, vec![validator_set_of(&keypairs)], None);
    let lagging = &nodes[3];
    partition.isolate(lagging.verifying_key());

    // 2. Make progress with the three live replicas.
    poll_until(
        "the live replicas commit 10 vertices",
        Duration::from_secs(120),
        || nodes[..3].iter().all(|node| node.state_version() >= 10),
    );
    let target = nodes[..3]
        .iter()
        .map(|node| node.state_version())
        .min()
        .unwrap_or(0);
    assert!(lagging.state_version() < target);

    // 3. Reconnect the lagging replica. Certificates from the live replicas make it fetch what it
    // missed.
    log::info!("Reconnecting the lagging replica.");
    partition.reconnect(&lagging.verifying_key());
    poll_until(
        "the lagging replica catches up",
        Duration::from_secs(120),
        || lagging.state_version() >= target,
    );

    // 4. Check that it caught up through sync, and agrees with the others.
    assert!(
        lagging.counter(CounterType::BftSyncRequestsSent) > 0
            || lagging.counter(CounterType::BftSyncLedgerSyncs) > 0
    );
    assert!(nodes[..3]
        .iter()
        .any(|node| node.counter(CounterType::BftSyncRequestsReceived) > 0)
        || lagging.counter(CounterType::BftSyncLedgerSyncs) > 0);
    assert_consistent(&nodes);

    // 5. Once caught up, it keeps committing with the others.
    let caught_up = lagging.state_version();
    poll_until(
        "the lagging replica commits new vertices",
        Duration::from_secs(60),
        || lagging.state_version() > caught_up,
    );
    assert_consistent(&nodes);
}
