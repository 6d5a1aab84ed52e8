//! Asynchronous attention signaling to the service element.
//!
//! Background workers report completion over an explicit channel; the
//! thread servicing the guest-visible event queue drains the receiver
//! and posts the attention interrupt from there.

use std::sync::mpsc::{channel, Receiver, Sender};

use log::debug;

/// Asynchronous event sources that can raise an attention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventClass {
    /// A hardware-loader request finished; a result is pending.
    HardwareLoader,
    /// Store-status data was placed in the save area.
    StoreData,
}

/// Sending half of the attention channel, cloned into each worker.
#[derive(Debug, Clone)]
pub struct AttnSender(Sender<EventClass>);

impl AttnSender {
    /// Raise an attention. A disconnected receiver means the machine is
    /// going away; the event is dropped.
    pub fn raise(&self, class: EventClass) {
        if self.0.send(class).is_err() {
            debug!(target: "ATTN", "{class:?} attention dropped, receiver is gone");
        }
    }
}

/// Build an attention channel pair.
pub fn attn_channel() -> (AttnSender, Receiver<EventClass>) {
    let (tx, rx) = channel();
    (AttnSender(tx), rx)
}
