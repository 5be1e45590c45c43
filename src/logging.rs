/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Functions that log out events.
//!
//! The logs defined in this module are printed if the user enabled them via replica's
//! [config](crate::replica::Configuration).
//!
//! This crate logs using the [log](https://docs.rs/log/latest/log/) crate. To get these messages
//! printed onto a terminal or to a file, set up a
//! [logging implementation](https://docs.rs/log/latest/log/#available-logging-implementations).
//!
//! ## Log message format
//!
//! Log messages are CSVs (Comma Separated Values) with at least two values. The first two values are
//! always:
//! 1. The name of the [event](crate::events) in PascalCase (defined in this module as constants).
//! 2. The time the event was emitted (as number of seconds since the Unix Epoch).
//!
//! The rest of the values differ depending on the kind of event. For example, the following snippet
//! is how a [ReceiveProposal](crate::events::ReceiveProposalEvent) is printed:
//!
//! ```text
//! ReceiveProposal, 1701329264, Id5u7f6, fNGCJyk, 3, 12
//! ```
//!
//! In the snippet:
//! - The third value is the first seven characters of the Base64 encoding of the verifying key of the
//!   origin of the proposal.
//! - The fourth value is the first seven characters of the Base64 encoding of the id of the proposed
//!   vertex.
//! - The fifth and sixth values are the epoch and the view of the proposed vertex.

use crate::events::*;
use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine as _};
use std::time::SystemTime;

// Names of each event in PascalCase for printing:
pub const INSERT_VERTEX: &str = "InsertVertex";
pub const COMMIT_VERTEX: &str = "CommitVertex";
pub const PRUNE_VERTEX: &str = "PruneVertex";
pub const UPDATE_HIGH_QC: &str = "UpdateHighQC";
pub const UPDATE_LOCKED_VIEW: &str = "UpdateLockedView";
pub const ENTER_EPOCH: &str = "EnterEpoch";

pub const PROPOSE: &str = "Propose";
pub const VOTE: &str = "Vote";
pub const TIMEOUT_VOTE: &str = "TimeoutVote";

pub const RECEIVE_PROPOSAL: &str = "ReceiveProposal";
pub const RECEIVE_VOTE: &str = "ReceiveVote";

pub const START_VIEW: &str = "StartView";
pub const VIEW_TIMEOUT: &str = "ViewTimeout";
pub const COLLECT_QC: &str = "CollectQC";
pub const COLLECT_TC: &str = "CollectTC";

pub const START_SYNC: &str = "StartSync";
pub const END_SYNC: &str = "EndSync";
pub const RECEIVE_SYNC_REQUEST: &str = "ReceiveSyncRequest";
pub const SEND_SYNC_RESPONSE: &str = "SendSyncResponse";

/// Implemented by event types. Used to get a closure that logs the event.
pub(crate) trait Logger {
    /// Returns a pointer to the default logging handler for a given event type.
    fn get_logger() -> Box<dyn Fn(&Self) + Send>;
}

impl Logger for InsertVertexEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |insert_vertex_event: &InsertVertexEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                INSERT_VERTEX,
                secs_since_unix_epoch(insert_vertex_event.timestamp),
                first_seven_base64_chars(&insert_vertex_event.vertex.id.bytes()),
                insert_vertex_event.vertex.view,
                insert_vertex_event.ledger_header.state_version
            )
        };
        Box::new(logger)
    }
}

impl Logger for CommitVertexEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |commit_vertex_event: &CommitVertexEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                COMMIT_VERTEX,
                secs_since_unix_epoch(commit_vertex_event.timestamp),
                first_seven_base64_chars(&commit_vertex_event.vertex.bytes()),
                commit_vertex_event.view,
                commit_vertex_event.ledger_header.state_version
            )
        };
        Box::new(logger)
    }
}

impl Logger for PruneVertexEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |prune_vertex_event: &PruneVertexEvent| {
            log::info!(
                "{}, {}, {}",
                PRUNE_VERTEX,
                secs_since_unix_epoch(prune_vertex_event.timestamp),
                first_seven_base64_chars(&prune_vertex_event.vertex.bytes())
            )
        };
        Box::new(logger)
    }
}

impl Logger for UpdateHighQCEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |update_high_qc_event: &UpdateHighQCEvent| {
            let high_qc = &update_high_qc_event.high_qc;
            log::info!(
                "{}, {}, {}, {}, {}, {}",
                UPDATE_HIGH_QC,
                secs_since_unix_epoch(update_high_qc_event.timestamp),
                first_seven_base64_chars(&high_qc.highest_qc().vertex_id().bytes()),
                high_qc.highest_qc().view(),
                high_qc.highest_committed_qc().view(),
                high_qc
                    .highest_tc()
                    .map_or(String::from("-"), |tc| tc.view.to_string())
            )
        };
        Box::new(logger)
    }
}

impl Logger for UpdateLockedViewEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |update_locked_view_event: &UpdateLockedViewEvent| {
            log::info!(
                "{}, {}, {}",
                UPDATE_LOCKED_VIEW,
                secs_since_unix_epoch(update_locked_view_event.timestamp),
                update_locked_view_event.locked_view
            )
        };
        Box::new(logger)
    }
}

impl Logger for EnterEpochEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |enter_epoch_event: &EnterEpochEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                ENTER_EPOCH,
                secs_since_unix_epoch(enter_epoch_event.timestamp),
                enter_epoch_event.epoch,
                enter_epoch_event.validator_set.len(),
                enter_epoch_event.validator_set.total_power().int()
            )
        };
        Box::new(logger)
    }
}

impl Logger for ProposeEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |propose_event: &ProposeEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                PROPOSE,
                secs_since_unix_epoch(propose_event.timestamp),
                first_seven_base64_chars(&propose_event.proposal.vertex.id.bytes()),
                propose_event.proposal.view(),
                propose_event.proposal.vertex.payload.len()
            )
        };
        Box::new(logger)
    }
}

impl Logger for VoteEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |vote_event: &VoteEvent| {
            log::info!(
                "{}, {}, {}, {}",
                VOTE,
                secs_since_unix_epoch(vote_event.timestamp),
                first_seven_base64_chars(&vote_event.vote.vertex_id().bytes()),
                vote_event.vote.view()
            )
        };
        Box::new(logger)
    }
}

impl Logger for TimeoutVoteEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |timeout_vote_event: &TimeoutVoteEvent| {
            log::info!(
                "{}, {}, {}, {}",
                TIMEOUT_VOTE,
                secs_since_unix_epoch(timeout_vote_event.timestamp),
                first_seven_base64_chars(&timeout_vote_event.vote.vertex_id().bytes()),
                timeout_vote_event.vote.view()
            )
        };
        Box::new(logger)
    }
}

impl Logger for ReceiveProposalEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |receive_proposal_event: &ReceiveProposalEvent| {
            log::info!(
                "{}, {}, {}, {}, {}, {}",
                RECEIVE_PROPOSAL,
                secs_since_unix_epoch(receive_proposal_event.timestamp),
                first_seven_base64_chars(&receive_proposal_event.origin.to_bytes()),
                first_seven_base64_chars(&receive_proposal_event.proposal.vertex.id.bytes()),
                receive_proposal_event.proposal.epoch(),
                receive_proposal_event.proposal.view()
            )
        };
        Box::new(logger)
    }
}

impl Logger for ReceiveVoteEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |receive_vote_event: &ReceiveVoteEvent| {
            log::info!(
                "{}, {}, {}, {}, {}, {}",
                RECEIVE_VOTE,
                secs_since_unix_epoch(receive_vote_event.timestamp),
                first_seven_base64_chars(&receive_vote_event.origin.to_bytes()),
                first_seven_base64_chars(&receive_vote_event.vote.vertex_id().bytes()),
                receive_vote_event.vote.view(),
                receive_vote_event.vote.is_timeout()
            )
        };
        Box::new(logger)
    }
}

impl Logger for StartViewEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |start_view_event: &StartViewEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                START_VIEW,
                secs_since_unix_epoch(start_view_event.timestamp),
                first_seven_base64_chars(&start_view_event.leader.to_bytes()),
                start_view_event.view,
                start_view_event.timeout.as_millis()
            )
        };
        Box::new(logger)
    }
}

impl Logger for ViewTimeoutEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |view_timeout_event: &ViewTimeoutEvent| {
            log::info!(
                "{}, {}, {}, {}",
                VIEW_TIMEOUT,
                secs_since_unix_epoch(view_timeout_event.timestamp),
                view_timeout_event.view,
                view_timeout_event.count
            )
        };
        Box::new(logger)
    }
}

impl Logger for CollectQCEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |collect_qc_event: &CollectQCEvent| {
            let qc = &collect_qc_event.quorum_certificate;
            log::info!(
                "{}, {}, {}, {}, {}",
                COLLECT_QC,
                secs_since_unix_epoch(collect_qc_event.timestamp),
                first_seven_base64_chars(&qc.vertex_id().bytes()),
                qc.view(),
                qc.signatures.count()
            )
        };
        Box::new(logger)
    }
}

impl Logger for CollectTCEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |collect_tc_event: &CollectTCEvent| {
            let tc = &collect_tc_event.timeout_certificate;
            log::info!(
                "{}, {}, {}, {}",
                COLLECT_TC,
                secs_since_unix_epoch(collect_tc_event.timestamp),
                tc.view,
                tc.signatures.iter().filter(|signature| signature.is_some()).count()
            )
        };
        Box::new(logger)
    }
}

impl Logger for StartSyncEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |start_sync_event: &StartSyncEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                START_SYNC,
                secs_since_unix_epoch(start_sync_event.timestamp),
                first_seven_base64_chars(&start_sync_event.peer.to_bytes()),
                first_seven_base64_chars(&start_sync_event.vertex.bytes()),
                start_sync_event.count
            )
        };
        Box::new(logger)
    }
}

impl Logger for EndSyncEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |end_sync_event: &EndSyncEvent| {
            log::info!(
                "{}, {}, {}, {}",
                END_SYNC,
                secs_since_unix_epoch(end_sync_event.timestamp),
                first_seven_base64_chars(&end_sync_event.vertex.bytes()),
                end_sync_event.view
            )
        };
        Box::new(logger)
    }
}

impl Logger for ReceiveSyncRequestEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |receive_sync_request_event: &ReceiveSyncRequestEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                RECEIVE_SYNC_REQUEST,
                secs_since_unix_epoch(receive_sync_request_event.timestamp),
                first_seven_base64_chars(&receive_sync_request_event.peer.to_bytes()),
                first_seven_base64_chars(&receive_sync_request_event.vertex.bytes()),
                receive_sync_request_event.count
            )
        };
        Box::new(logger)
    }
}

impl Logger for SendSyncResponseEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |send_sync_response_event: &SendSyncResponseEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                SEND_SYNC_RESPONSE,
                secs_since_unix_epoch(send_sync_response_event.timestamp),
                first_seven_base64_chars(&send_sync_response_event.peer.to_bytes()),
                send_sync_response_event.vertices,
                send_sync_response_event.high_qc.highest_qc().view()
            )
        };
        Box::new(logger)
    }
}

// Get a more readable representation of a bytesequence by base64-encoding it and taking the first 7 characters.
fn first_seven_base64_chars(bytes: &[u8]) -> String {
    let encoded = STANDARD_NO_PAD.encode(bytes);
    if encoded.len() > 7 {
        encoded[0..7].to_string()
    } else {
        encoded
    }
}

fn secs_since_unix_epoch(timestamp: SystemTime) -> u64 {
    timestamp
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|duration| duration.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_identifiers_are_seven_characters() {
        assert_eq!(first_seven_base64_chars(&[0u8; 32]), "AAAAAAA");
        assert_eq!(first_seven_base64_chars(&[255u8]), "/w");
    }
}
