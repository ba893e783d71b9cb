// SPDX-License-Identifier: MIT

//! Fan-out of engine changes to local consumers.
//!
//! Dispatch snapshots the subscriber list first, so callbacks may ask for
//! subscription changes freely. Callbacks never get the engine itself:
//! anything they want changed goes through [`LocalEdits`] and is applied
//! once the current event is fully delivered.

use std::cell::RefCell;
use std::rc::Rc;

use crate::proto::NodeId;
use crate::time::Time;
use crate::tlv::{tlv_to_bytes, Tlv};

pub type SubscriberRef = Rc<RefCell<dyn Subscriber>>;

/// A change in the replicated database or the local engine state.
#[derive(Debug, Clone)]
pub enum Event {
    NodeAdded {
        id: NodeId,
    },
    NodeRemoved {
        id: NodeId,
    },
    /// One record appeared in a node's container. `origination` is the
    /// node's origination instant on the local scale, for converting
    /// remote-relative lifetimes.
    TlvAdded {
        node: NodeId,
        origination: Time,
        tlv: Vec<u8>,
    },
    TlvRemoved {
        node: NodeId,
        origination: Time,
        tlv: Vec<u8>,
    },
    LocalTlvAdded {
        tlv: Vec<u8>,
    },
    LocalTlvRemoved {
        tlv: Vec<u8>,
    },
    /// Own node data is about to be rebuilt; last chance to refresh
    /// records whose content depends on the origination instant.
    AboutToRepublish,
    EndpointChanged {
        ifname: String,
        ep_id: u32,
        enabled: bool,
    },
    NeighbourAdded {
        ifname: String,
        node_id: NodeId,
        ep_id: u32,
    },
    NeighbourRemoved {
        ifname: String,
        node_id: NodeId,
        ep_id: u32,
    },
    OwnIdChanged {
        old: NodeId,
        new: NodeId,
    },
}

pub trait Subscriber {
    fn notify(&mut self, event: &Event, edits: &mut LocalEdits);
}

/// Mutations requested from inside a callback, applied after dispatch.
#[derive(Default)]
pub struct LocalEdits {
    pub(crate) publish: Vec<Vec<u8>>,
    pub(crate) remove: Vec<Vec<u8>>,
    pub(crate) remove_by_type: Vec<u16>,
    pub(crate) republish: bool,
    pub(crate) subscribe: Vec<SubscriberRef>,
    pub(crate) unsubscribe: Vec<SubscriberRef>,
}

impl LocalEdits {
    pub fn publish_tlv<T: Tlv>(&mut self, tlv: &T) {
        self.publish.push(tlv_to_bytes(tlv));
    }

    pub fn publish_tlv_bytes(&mut self, tlv: Vec<u8>) {
        self.publish.push(tlv);
    }

    pub fn remove_tlv<T: Tlv>(&mut self, tlv: &T) {
        self.remove.push(tlv_to_bytes(tlv));
    }

    pub fn remove_tlv_bytes(&mut self, tlv: Vec<u8>) {
        self.remove.push(tlv);
    }

    pub fn remove_tlvs_by_type(&mut self, kind: u16) {
        self.remove_by_type.push(kind);
    }

    /// Force a republish even if the record set ends up identical.
    pub fn force_republish(&mut self) {
        self.republish = true;
    }

    pub fn subscribe(&mut self, sub: SubscriberRef) {
        self.subscribe.push(sub);
    }

    pub fn unsubscribe(&mut self, sub: SubscriberRef) {
        self.unsubscribe.push(sub);
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.publish.is_empty()
            && self.remove.is_empty()
            && self.remove_by_type.is_empty()
            && !self.republish
            && self.subscribe.is_empty()
            && self.unsubscribe.is_empty()
    }
}
