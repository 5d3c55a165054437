use crate::channel::ChannelName;
use crate::event;
use crate::messages::{Message, MessageId};

/// Restricts a binding to messages from one channel, or accepts any source.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SourceFilter {
    Any,
    Channel(ChannelName),
}

impl SourceFilter {
    fn admits(&self, source: &ChannelName) -> bool {
        match self {
            SourceFilter::Any => true,
            SourceFilter::Channel(name) => name == source,
        }
    }
}

/// Routing key of a single observer entry: which source, which message.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Binding {
    pub source: SourceFilter,
    pub id: MessageId,
}

impl Binding {
    pub fn any(id: impl Into<MessageId>) -> Self { Self { source: SourceFilter::Any, id: id.into() } }

    pub fn on(channel: &ChannelName, id: impl Into<MessageId>) -> Self {
        Self { source: SourceFilter::Channel(channel.clone()), id: id.into() }
    }
}

/// Identifies one registered observer. Removing it twice is harmless.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverHandle(u64);

struct Observer<H> {
    handle: ObserverHandle,
    bindings: Vec<(Binding, H)>,
}

impl<H: Copy> Observer<H> {
    /// At most one handler per observer and message. A binding on the exact source wins over
    /// a wildcard one.
    fn resolve(&self, source: &ChannelName, id: MessageId) -> Option<H> {
        let mut wildcard = None;
        for (binding, handler) in &self.bindings {
            if binding.id != id || !binding.source.admits(source) {
                continue;
            }
            match binding.source {
                SourceFilter::Channel(_) => return Some(*handler),
                SourceFilter::Any => {
                    wildcard.get_or_insert(*handler);
                }
            }
        }
        wildcard
    }
}

/// Table of observers, each a list of `(source, message id) -> handler` bindings.
///
/// Handlers are plain values (`H`, typically a small enum naming the owning component and
/// its entry point), so the hub never holds references into the components it serves. The
/// caller receives the matched handler in [`dispatch`](Self::dispatch) and runs it.
pub struct MessageHub<H> {
    observers: Vec<Observer<H>>,
    next_handle: u64,
}

impl<H: Copy> MessageHub<H> {
    pub fn new() -> Self { Self { observers: Vec::new(), next_handle: 1 } }

    /// Registers an observer. Observers are consulted in registration order. A repeated
    /// binding keeps its first handler.
    pub fn observe(&mut self, bindings: impl IntoIterator<Item = (Binding, H)>) -> ObserverHandle {
        let handle = ObserverHandle(self.next_handle);
        self.next_handle += 1;
        let mut unique: Vec<(Binding, H)> = Vec::new();
        for (binding, handler) in bindings {
            if !unique.iter().any(|(known, _)| *known == binding) {
                unique.push((binding, handler));
            }
        }
        self.observers.push(Observer { handle, bindings: unique });
        handle
    }

    /// Removes an observer.
    ///
    /// # Returns
    /// `false` if it had already been removed.
    pub fn unobserve(&mut self, handle: ObserverHandle) -> bool {
        let before = self.observers.len();
        self.observers.retain(|observer| observer.handle != handle);
        before != self.observers.len()
    }

    /// Delivers `message` to every observer with a matching binding, in registration order,
    /// by calling `deliver` synchronously. Messages nobody observes are dropped.
    ///
    /// # Returns
    /// The number of deliveries.
    pub fn dispatch<F>(&self, source: &ChannelName, message: &Message, mut deliver: F) -> usize
    where
        F: FnMut(H, &ChannelName, &Message),
    {
        let id = message.id();
        let mut deliveries = 0;
        for observer in &self.observers {
            if let Some(handler) = observer.resolve(source, id) {
                deliver(handler, source, message);
                deliveries += 1;
            }
        }
        if deliveries == 0 {
            event!("{id} from {source} unobserved");
        }
        deliveries
    }

    pub fn active_observers(&self) -> usize { self.observers.len() }

    pub fn is_active(&self, handle: ObserverHandle) -> bool {
        self.observers.iter().any(|observer| observer.handle == handle)
    }
}

impl<H: Copy> Default for MessageHub<H> {
    fn default() -> Self { Self::new() }
}
