//! In-memory transport for tests. Links never produce events on their own; tests drive the
//! connection lifecycle by handing [`LinkEvent`]s to the code under test.

use super::channel_manager::{ChannelError, ChannelName, Connector, Link, LinkEvent, LinkTarget};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use tokio::sync::mpsc;

type Outbox = Rc<RefCell<HashMap<ChannelName, Vec<Vec<u8>>>>>;

#[derive(Clone, Default)]
pub struct LoopbackConnector {
    sent: Outbox,
    targets: Rc<RefCell<Vec<LinkTarget>>>,
}

impl LoopbackConnector {
    /// Frames transmitted on `channel` so far, in order.
    pub fn sent(&self, channel: &str) -> Vec<Vec<u8>> {
        self.sent.borrow().get(&ChannelName::from(channel)).cloned().unwrap_or_default()
    }

    pub fn clear(&self) { self.sent.borrow_mut().clear(); }

    /// Every link requested so far, in order.
    pub fn targets(&self) -> Vec<LinkTarget> { self.targets.borrow().clone() }
}

impl Connector for LoopbackConnector {
    fn connect(&self, target: LinkTarget, _events: mpsc::UnboundedSender<LinkEvent>) -> Box<dyn Link> {
        let channel = target.channel.clone();
        self.targets.borrow_mut().push(target);
        Box::new(LoopbackLink { channel, sent: Rc::clone(&self.sent), open: true })
    }
}

struct LoopbackLink {
    channel: ChannelName,
    sent: Outbox,
    open: bool,
}

impl Link for LoopbackLink {
    fn transmit(&mut self, frame: Vec<u8>) -> Result<(), ChannelError> {
        if !self.open {
            return Err(ChannelError::LinkClosed);
        }
        self.sent.borrow_mut().entry(self.channel.clone()).or_default().push(frame);
        Ok(())
    }

    fn shutdown(&mut self) { self.open = false; }
}
