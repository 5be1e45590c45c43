/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The event bus thread, which receives [events](crate::events) published by the algorithm thread and
//! calls the handlers registered for them.
//!
//! Handlers are registered when the replica is [started](crate::replica::ReplicaSpec::start). If the
//! user registered no handlers and disabled logging, no event bus thread is started and events are not
//! published at all.

use std::sync::mpsc::{Receiver, RecvTimeoutError, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::events::*;
use crate::logging::Logger;

pub(crate) type HandlerPtr<T> = Box<dyn Fn(&T) + Send>;

// How long the event bus waits for an event before checking for the shutdown signal again.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// The handlers registered for each event type.
#[derive(Default)]
pub(crate) struct EventHandlers {
    pub(crate) insert_vertex_handlers: Vec<HandlerPtr<InsertVertexEvent>>,
    pub(crate) commit_vertex_handlers: Vec<HandlerPtr<CommitVertexEvent>>,
    pub(crate) prune_vertex_handlers: Vec<HandlerPtr<PruneVertexEvent>>,
    pub(crate) update_high_qc_handlers: Vec<HandlerPtr<UpdateHighQCEvent>>,
    pub(crate) update_locked_view_handlers: Vec<HandlerPtr<UpdateLockedViewEvent>>,
    pub(crate) enter_epoch_handlers: Vec<HandlerPtr<EnterEpochEvent>>,

    pub(crate) propose_handlers: Vec<HandlerPtr<ProposeEvent>>,
    pub(crate) vote_handlers: Vec<HandlerPtr<VoteEvent>>,
    pub(crate) timeout_vote_handlers: Vec<HandlerPtr<TimeoutVoteEvent>>,

    pub(crate) receive_proposal_handlers: Vec<HandlerPtr<ReceiveProposalEvent>>,
    pub(crate) receive_vote_handlers: Vec<HandlerPtr<ReceiveVoteEvent>>,

    pub(crate) start_view_handlers: Vec<HandlerPtr<StartViewEvent>>,
    pub(crate) view_timeout_handlers: Vec<HandlerPtr<ViewTimeoutEvent>>,
    pub(crate) collect_qc_handlers: Vec<HandlerPtr<CollectQCEvent>>,
    pub(crate) collect_tc_handlers: Vec<HandlerPtr<CollectTCEvent>>,

    pub(crate) start_sync_handlers: Vec<HandlerPtr<StartSyncEvent>>,
    pub(crate) end_sync_handlers: Vec<HandlerPtr<EndSyncEvent>>,
    pub(crate) receive_sync_request_handlers: Vec<HandlerPtr<ReceiveSyncRequestEvent>>,
    pub(crate) send_sync_response_handlers: Vec<HandlerPtr<SendSyncResponseEvent>>,
}

impl EventHandlers {
    /// Register the default logger of every event type, in addition to the handlers already present.
    pub(crate) fn add_loggers(&mut self) {
        self.insert_vertex_handlers.push(InsertVertexEvent::get_logger());
        self.commit_vertex_handlers.push(CommitVertexEvent::get_logger());
        self.prune_vertex_handlers.push(PruneVertexEvent::get_logger());
        self.update_high_qc_handlers.push(UpdateHighQCEvent::get_logger());
        self.update_locked_view_handlers
            .push(UpdateLockedViewEvent::get_logger());
        self.enter_epoch_handlers.push(EnterEpochEvent::get_logger());

        self.propose_handlers.push(ProposeEvent::get_logger());
        self.vote_handlers.push(VoteEvent::get_logger());
        self.timeout_vote_handlers.push(TimeoutVoteEvent::get_logger());

        self.receive_proposal_handlers
            .push(ReceiveProposalEvent::get_logger());
        self.receive_vote_handlers.push(ReceiveVoteEvent::get_logger());

        self.start_view_handlers.push(StartViewEvent::get_logger());
        self.view_timeout_handlers.push(ViewTimeoutEvent::get_logger());
        self.collect_qc_handlers.push(CollectQCEvent::get_logger());
        self.collect_tc_handlers.push(CollectTCEvent::get_logger());

        self.start_sync_handlers.push(StartSyncEvent::get_logger());
        self.end_sync_handlers.push(EndSyncEvent::get_logger());
        self.receive_sync_request_handlers
            .push(ReceiveSyncRequestEvent::get_logger());
        self.send_sync_response_handlers
            .push(SendSyncResponseEvent::get_logger());
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.insert_vertex_handlers.is_empty()
            && self.commit_vertex_handlers.is_empty()
            && self.prune_vertex_handlers.is_empty()
            && self.update_high_qc_handlers.is_empty()
            && self.update_locked_view_handlers.is_empty()
            && self.enter_epoch_handlers.is_empty()
            && self.propose_handlers.is_empty()
            && self.vote_handlers.is_empty()
            && self.timeout_vote_handlers.is_empty()
            && self.receive_proposal_handlers.is_empty()
            && self.receive_vote_handlers.is_empty()
            && self.start_view_handlers.is_empty()
            && self.view_timeout_handlers.is_empty()
            && self.collect_qc_handlers.is_empty()
            && self.collect_tc_handlers.is_empty()
            && self.start_sync_handlers.is_empty()
            && self.end_sync_handlers.is_empty()
            && self.receive_sync_request_handlers.is_empty()
            && self.send_sync_response_handlers.is_empty()
    }

    pub(crate) fn fire_handlers(&self, event: Event) {
        match event {
            Event::InsertVertex(insert_vertex_event) => self
                .insert_vertex_handlers
                .iter()
                .for_each(|handler| handler(&insert_vertex_event)),

            Event::CommitVertex(commit_vertex_event) => self
                .commit_vertex_handlers
                .iter()
                .for_each(|handler| handler(&commit_vertex_event)),

            Event::PruneVertex(prune_vertex_event) => self
                .prune_vertex_handlers
                .iter()
                .for_each(|handler| handler(&prune_vertex_event)),

            Event::UpdateHighQC(update_high_qc_event) => self
                .update_high_qc_handlers
                .iter()
                .for_each(|handler| handler(&update_high_qc_event)),

            Event::UpdateLockedView(update_locked_view_event) => self
                .update_locked_view_handlers
                .iter()
                .for_each(|handler| handler(&update_locked_view_event)),

            Event::EnterEpoch(enter_epoch_event) => self
                .enter_epoch_handlers
                .iter()
                .for_each(|handler| handler(&enter_epoch_event)),

            Event::Propose(propose_event) => self
                .propose_handlers
                .iter()
                .for_each(|handler| handler(&propose_event)),

            Event::Vote(vote_event) => self
                .vote_handlers
                .iter()
                .for_each(|handler| handler(&vote_event)),

            Event::TimeoutVote(timeout_vote_event) => self
                .timeout_vote_handlers
                .iter()
                .for_each(|handler| handler(&timeout_vote_event)),

            Event::ReceiveProposal(receive_proposal_event) => self
                .receive_proposal_handlers
                .iter()
                .for_each(|handler| handler(&receive_proposal_event)),

            Event::ReceiveVote(receive_vote_event) => self
                .receive_vote_handlers
                .iter()
                .for_each(|handler| handler(&receive_vote_event)),

            Event::StartView(start_view_event) => self
                .start_view_handlers
                .iter()
                .for_each(|handler| handler(&start_view_event)),

            Event::ViewTimeout(view_timeout_event) => self
                .view_timeout_handlers
                .iter()
                .for_each(|handler| handler(&view_timeout_event)),

            Event::CollectQC(collect_qc_event) => self
                .collect_qc_handlers
                .iter()
                .for_each(|handler| handler(&collect_qc_event)),

            Event::CollectTC(collect_tc_event) => self
                .collect_tc_handlers
                .iter()
                .for_each(|handler| handler(&collect_tc_event)),

            Event::StartSync(start_sync_event) => self
                .start_sync_handlers
                .iter()
                .for_each(|handler| handler(&start_sync_event)),

            Event::EndSync(end_sync_event) => self
                .end_sync_handlers
                .iter()
                .for_each(|handler| handler(&end_sync_event)),

            Event::ReceiveSyncRequest(receive_sync_request_event) => self
                .receive_sync_request_handlers
                .iter()
                .for_each(|handler| handler(&receive_sync_request_event)),

            Event::SendSyncResponse(send_sync_response_event) => self
                .send_sync_response_handlers
                .iter()
                .for_each(|handler| handler(&send_sync_response_event)),
        }
    }
}

/// Spawn the event bus thread. The thread exits when it receives the shutdown signal, or when either of
/// its channels disconnects.
pub(crate) fn start_event_bus(
    event_handlers: EventHandlers,
    event_subscriber: Receiver<Event>,
    shutdown_signal: Receiver<()>,
) -> JoinHandle<()> {
    thread::spawn(move || loop {
        match shutdown_signal.try_recv() {
            Ok(()) => return,
            Err(TryRecvError::Empty) => (),
            Err(TryRecvError::Disconnected) => {
                log::error!("Event bus thread disconnected from main thread");
                return;
            }
        }

        match event_subscriber.recv_timeout(POLL_INTERVAL) {
            Ok(event) => event_handlers.fire_handlers(event),
            Err(RecvTimeoutError::Timeout) => (),
            Err(RecvTimeoutError::Disconnected) => {
                log::debug!("Event publisher disconnected, stopping the event bus");
                return;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use std::sync::{mpsc, Arc, Mutex};
    use std::time::SystemTime;

    use super::*;
    use crate::types::data_types::ViewNumber;

    #[test]
    fn handlers_fire_for_their_event_only() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut handlers = EventHandlers::default();
        assert!(handlers.is_empty());

        let seen_by_handler = seen.clone();
        handlers
            .view_timeout_handlers
            .push(Box::new(move |event: &ViewTimeoutEvent| {
                seen_by_handler.lock().unwrap().push((event.view, event.count))
            }));
        assert!(!handlers.is_empty());

        handlers.fire_handlers(Event::UpdateLockedView(UpdateLockedViewEvent {
            timestamp: SystemTime::now(),
            locked_view: ViewNumber::new(3),
        }));
        handlers.fire_handlers(Event::ViewTimeout(ViewTimeoutEvent {
            timestamp: SystemTime::now(),
            view: ViewNumber::new(4),
            count: 2,
        }));

        assert_eq!(*seen.lock().unwrap(), vec![(ViewNumber::new(4), 2)]);
    }

    #[test]
    fn event_bus_stops_on_shutdown_signal() {
        let (publisher, subscriber) = mpsc::channel();
        let (shutdown, shutdown_receiver) = mpsc::channel();
        let event_bus = start_event_bus(EventHandlers::default(), subscriber, shutdown_receiver);

        Event::UpdateLockedView(UpdateLockedViewEvent {
            timestamp: SystemTime::now(),
            locked_view: ViewNumber::new(1),
        })
        .publish(&Some(publisher));
        shutdown.send(()).unwrap();
        event_bus.join().unwrap();
    }
}
