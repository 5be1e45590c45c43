/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Functions and types for receiving messages from the P2P network.

use std::{
    sync::mpsc::{self, Receiver, RecvTimeoutError, TryRecvError},
    thread::{self, JoinHandle},
    time::Instant,
};

use ed25519_dalek::VerifyingKey;

use super::{messages::Message, network::Network};

/// Spawn the poller thread, which polls the [`Network`] for messages and forwards them to the returned
/// receiver, to be processed by the algorithm thread.
pub(crate) fn start_polling<N: Network + 'static>(
    mut network: N,
    shutdown_signal: Receiver<()>,
) -> (JoinHandle<()>, Receiver<(VerifyingKey, Message)>) {
    let (to_msg_receiver, msg_receiver) = mpsc::channel();

    let poller_thread = thread::spawn(move || loop {
        match shutdown_signal.try_recv() {
            Ok(()) => return,
            Err(TryRecvError::Empty) => (),
            Err(TryRecvError::Disconnected) => {
                log::error!("Poller thread disconnected from main thread");
                return;
            }
        }

        if let Some((origin, msg)) = network.recv() {
            let _ = to_msg_receiver.send((origin, msg));
        } else {
            thread::yield_now()
        }
    });

    (poller_thread, msg_receiver)
}

/// The receiving end for messages forwarded by the poller thread.
pub(crate) struct MessageStub {
    receiver: Receiver<(VerifyingKey, Message)>,
}

impl MessageStub {
    pub(crate) fn new(receiver: Receiver<(VerifyingKey, Message)>) -> MessageStub {
        Self { receiver }
    }

    /// Receive the next message, waiting until `deadline` at the latest.
    pub(crate) fn recv(
        &self,
        deadline: Instant,
    ) -> Result<(VerifyingKey, Message), MessageReceiveError> {
        let now = Instant::now();
        if now >= deadline {
            return match self.receiver.try_recv() {
                Ok(received) => Ok(received),
                Err(TryRecvError::Empty) => Err(MessageReceiveError::Timeout),
                Err(TryRecvError::Disconnected) => Err(MessageReceiveError::Disconnected),
            };
        }

        match self.receiver.recv_timeout(deadline - now) {
            Ok(received) => Ok(received),
            Err(RecvTimeoutError::Timeout) => Err(MessageReceiveError::Timeout),
            Err(RecvTimeoutError::Disconnected) => Err(MessageReceiveError::Disconnected),
        }
    }
}

#[derive(Debug)]
pub(crate) enum MessageReceiveError {
    Timeout,
    Disconnected,
}
