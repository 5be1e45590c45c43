use std::{
    collections::{HashMap, HashSet},
    sync::{
        mpsc::{self, Receiver, Sender, TryRecvError},
        Arc, Mutex,
    },
};

use chained_bft::{
    networking::{messages::Message, network::Network},
    types::validator_set::ValidatorSet,
};
use ed25519_dalek::VerifyingKey;

/// A mock network stub which passes messages from and to threads using channels.
///
/// Peers can be cut off with [`Partition::isolate`]: messages from and to an isolated peer are dropped
/// until it is [reconnected](Partition::reconnect).
#[derive(Clone)]
pub(crate) struct NetworkStub {
    my_verifying_key: VerifyingKey,
    all_peers: HashMap<VerifyingKey, Sender<(VerifyingKey, Message)>>,
    inbox: Arc<Mutex<Receiver<(VerifyingKey, Message)>>>,
    partition: Partition,
}

impl NetworkStub {
    fn is_connected(&self, peer: &VerifyingKey) -> bool {
        let isolated = self.partition.0.lock().unwrap();
        !isolated.contains(&self.my_verifying_key) && !isolated.contains(peer)
    }
}

impl Network for NetworkStub {
    fn init_validator_set(&mut self, _: ValidatorSet) {}

    fn update_validator_set(&mut self, _: ValidatorSet) {}

    fn send(&mut self, peer: VerifyingKey, message: Message) {
        if !self.is_connected(&peer) {
            return;
        }
        if let Some(peer) = self.all_peers.get(&peer) {
            let _ = peer.send((self.my_verifying_key, message));
        }
    }

    fn broadcast(&mut self, message: Message) {
        for (verifying_key, peer) in &self.all_peers {
            if self.is_connected(verifying_key) {
                let _ = peer.send((self.my_verifying_key, message.clone()));
            }
        }
    }

    fn recv(&mut self) -> Option<(VerifyingKey, Message)> {
        match self.inbox.lock().unwrap().try_recv() {
            Ok(o_m) => Some(o_m),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => None,
        }
    }
}

/// The set of peers currently cut off from the mock network.
#[derive(Clone, Default)]
pub(crate) struct Partition(Arc<Mutex<HashSet<VerifyingKey>>>);

impl Partition {
    pub(crate) fn isolate(&self, peer: VerifyingKey) {
        self.0.lock().unwrap().insert(peer);
    }

    pub(crate) fn reconnect(&self, peer: &VerifyingKey) {
        self.0.lock().unwrap().remove(peer);
    }
}

pub(crate) fn mock_network(
    peers: impl Iterator<Item = VerifyingKey>,
) -> (Vec<NetworkStub>, Partition) {
    let partition = Partition::default();
    let mut all_peers = HashMap::new();
    let peer_and_inboxes: Vec<(VerifyingKey, Receiver<(VerifyingKey, Message)>)> = peers
        .map(|peer| {
            let (sender, receiver) = mpsc::channel();
            all_peers.insert(peer, sender);

            (peer, receiver)
        })
        .collect();

    let stubs = peer_and_inboxes
        .into_iter()
        .map(|(my_verifying_key, inbox)| NetworkStub {
            my_verifying_key,
            all_peers: all_peers.clone(),
            inbox: Arc::new(Mutex::new(inbox)),
            partition: partition.clone(),
        })
        .collect();

    (stubs, partition)
}
