use crate::channel::{Channel, ChannelError, ChannelManager, ChannelState};
use crate::messages::{Message, MessageId, ProtocolError, Schema};
use crate::{event, log, warn};
use std::marker::PhantomData;
use strum_macros::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum PairState {
    Detached,
    Attached,
}

/// How a successful [`ServicePair::send`] was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    /// Held back until the channel connects.
    Queued,
}

#[derive(Debug, Display)]
pub enum PairError {
    Detached,
    AlreadyAttached,
    NotConnected,
    ChannelClosed,
    Link(ChannelError),
}

impl std::error::Error for PairError {}

/// Command sender and event receiver for one schema, bound to one channel.
///
/// With `autostart` set, commands sent before the channel connects are held back, one per
/// command variant: a newer command of the same variant replaces the pending one and moves to
/// the back of the queue. [`flush`](Self::flush) delivers the queue in order once connected.
/// Without `autostart`, such sends fail with [`PairError::NotConnected`].
pub struct ServicePair<S: Schema> {
    channel: Option<Channel>,
    autostart: bool,
    pending: Vec<(MessageId, S::Outbound)>,
    sent: u64,
    schema: PhantomData<S>,
}

impl<S: Schema> ServicePair<S> {
    pub fn new() -> Self {
        Self { channel: None, autostart: false, pending: Vec::new(), sent: 0, schema: PhantomData }
    }

    /// Binds the pair to `channel`.
    ///
    /// # Arguments
    /// - `channel`: Channel handle, shared with the [`ChannelManager`] that owns it.
    /// - `autostart`: Queue commands until the channel connects instead of rejecting them.
    pub fn attach(&mut self, channel: Channel, autostart: bool) -> Result<(), PairError> {
        if let Some(current) = &self.channel {
            warn!("{} pair already attached to {}", S::NAME, current.name());
            return Err(PairError::AlreadyAttached);
        }
        log!("{} pair attached to {}", S::NAME, channel.name());
        self.channel = Some(channel);
        self.autostart = autostart;
        Ok(())
    }

    /// Unbinds the pair. Pending commands are discarded.
    ///
    /// # Returns
    /// The number of discarded commands; detaching a detached pair is a no-op returning 0.
    pub fn detach(&mut self) -> usize {
        let Some(channel) = self.channel.take() else {
            return 0;
        };
        let discarded = self.pending.len();
        if discarded > 0 {
            let ids: Vec<String> = self.pending.iter().map(|(id, _)| id.to_string()).collect();
            warn!("Discarding {discarded} pending commands on {}: {}", channel.name(), ids.join(", "));
        }
        self.pending.clear();
        log!("{} pair detached from {}", S::NAME, channel.name());
        discarded
    }

    /// Sends `command`, or queues it if the channel is still connecting and `autostart` is set.
    pub fn send(&mut self, channels: &mut ChannelManager, command: S::Outbound) -> Result<Delivery, PairError> {
        let channel = self.channel.as_ref().ok_or(PairError::Detached)?;
        let id = S::outbound_id(&command);
        match channels.state(channel) {
            None => Err(PairError::ChannelClosed),
            Some(ChannelState::Connected) => {
                event!("{id} -> {}", channel.name());
                channels.transmit(channel, S::encode(&command)).map_err(PairError::Link)?;
                self.sent += 1;
                Ok(Delivery::Sent)
            }
            Some(_) if self.autostart => {
                self.pending.retain(|(pending_id, _)| *pending_id != id);
                self.pending.push((id, command));
                event!("{id} queued for {}", channel.name());
                Ok(Delivery::Queued)
            }
            Some(_) => Err(PairError::NotConnected),
        }
    }

    /// Delivers queued commands in order. Stops at the first transmit failure and keeps the
    /// remainder queued.
    ///
    /// # Returns
    /// The number of delivered commands.
    pub fn flush(&mut self, channels: &mut ChannelManager) -> usize {
        let Some(channel) = &self.channel else {
            return 0;
        };
        if channels.state(channel) != Some(ChannelState::Connected) {
            return 0;
        }
        let mut delivered = 0;
        while !self.pending.is_empty() {
            let (id, command) = &self.pending[0];
            if let Err(e) = channels.transmit(channel, S::encode(command)) {
                warn!("Flushing {id} to {} failed: {e}", channel.name());
                break;
            }
            event!("{id} -> {} (flushed)", channel.name());
            self.pending.remove(0);
            delivered += 1;
        }
        self.sent += delivered as u64;
        delivered
    }

    /// Decodes an inbound frame with this pair's schema.
    pub fn decode(&self, frame: &[u8]) -> Result<Message, ProtocolError> { S::decode(frame) }

    pub fn state(&self) -> PairState {
        if self.channel.is_some() { PairState::Attached } else { PairState::Detached }
    }

    pub fn channel(&self) -> Option<&Channel> { self.channel.as_ref() }

    /// Whether frames arriving on `channel` belong to this pair.
    pub fn is_bound_to(&self, channel: &Channel) -> bool { self.channel.as_ref() == Some(channel) }

    pub fn pending(&self) -> impl Iterator<Item = MessageId> + '_ { self.pending.iter().map(|(id, _)| *id) }

    pub fn sent(&self) -> u64 { self.sent }
}

impl<S: Schema> Default for ServicePair<S> {
    fn default() -> Self { Self::new() }
}
