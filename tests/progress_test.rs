use std::time::Duration;

use chained_bft::counters::CounterType;
use log::LevelFilter;

mod common;

use common::{
    logging::setup_logger,
    node::{assert_consistent, generate_keypairs, poll_until, start_cluster, validator_set_of},
};

/// Starts four validators and checks that they keep committing vertices, and agree on what they commit.
#[test]
fn all_validators_make_progress() {
    setup_logger(LevelFilter::Info);

    let keypairs = generate_keypairs(4);
    let (nodes, _partition) = start_cluster(&keypairs, vec![validator_set_of(&keypairs)], None);

    poll_until(
        "every replica commits 10 vertices",
        Duration::from_secs(60),
        || {
            nodes
                .iter()
                .all(|node| node.state_version() >= 10 && node.committed_vertices() >= 10)
        },
    );

    assert_consistent(&nodes);
    for node in &nodes {
        assert!(node.counter(CounterType::BftProcessedProposals) > 0);
    }
}

/// Crashes one of four validators, and checks that the other three keep committing, timing out in the
/// views that the crashed validator leads.
#[test]
fn progress_continues_with_crashed_leader() {
    setup_logger(LevelFilter::Info);

    let keypairs = generate_keypairs(4);
    let (nodes, partition) = start_cluster(&keypairs, vec![validator_set_of(&keypairs)], None);

    // 1. Cut the last replica off before it can take part.
    partition.isolate(nodes[3].verifying_key());
    let live = &nodes[..3];

    // 2. The remaining three replicas hold a quorum and keep committing.
    poll_until(
        "the live replicas commit 8 vertices",
        Duration::from_secs(120),
        || live.iter().all(|node| node.state_version() >= 8),
    );
    assert_consistent(live);

    // 3. Views led by the crashed replica ended through timeouts.
    assert!(live
        .iter()
        .any(|node| node.counter(CounterType::BftTimedOutViews) > 0));
    assert!(live
        .iter()
        .any(|node| node.counter(CounterType::BftTimeoutsSent) > 0));
}
