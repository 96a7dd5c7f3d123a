//! Synchronization point for two-party rendezvous.
//!
//! A channel stores the requests currently waiting on it. A match happens
//! only when exactly two requests are pending: both are detached from every
//! channel they were registered on, and only then are their continuations run.

use std::{
    fmt,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use parking_lot::Mutex;
use tracing::{debug, error, warn};

/// Action run exactly once when the request carrying it is matched.
pub type Continuation = Box<dyn FnOnce() + Send>;

static NEXT_CHANNEL_ID: AtomicUsize = AtomicUsize::new(0);

/// What a party means by a handshake.
///
/// Acquire and release share the same channel; tagging them lets the channel
/// refuse a pairing that would confuse a pickup with a putdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intent {
    Any,
    Acquire,
    Release,
}

impl Intent {
    pub fn compatible(self, other: Intent) -> bool {
        self == Intent::Any || other == Intent::Any || self == other
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Intent::Any => write!(f, "any"),
            Intent::Acquire => write!(f, "acquire"),
            Intent::Release => write!(f, "release"),
        }
    }
}

struct Offer {
    channel: Channel,
    intent: Intent,
    continuation: Mutex<Option<Continuation>>,
}

/// One party's atomic wait on one or more channels.
///
/// Identity is the allocation: the same `Arc<Request>` is registered on every
/// channel it names.
pub struct Request {
    offers: Vec<Offer>,
}

impl Request {
    /// A channel named twice keeps only its first offer; registering the
    /// same request twice on one channel would let it pair with itself.
    pub fn new(offers: Vec<(Channel, Intent, Continuation)>) -> Arc<Self> {
        let mut kept: Vec<Offer> = Vec::with_capacity(offers.len());
        for (channel, intent, continuation) in offers {
            if kept.iter().any(|o| o.channel == channel) {
                warn!(channel = %channel.label(), %intent, "channel offered twice in one request, dropping the repeat");
                continue;
            }
            kept.push(Offer {
                channel,
                intent,
                continuation: Mutex::new(Some(continuation)),
            });
        }
        Arc::new(Request { offers: kept })
    }

    pub fn channels(&self) -> impl Iterator<Item = &Channel> {
        self.offers.iter().map(|o| &o.channel)
    }

    fn offer_on(&self, channel: &Channel) -> Option<&Offer> {
        self.offers.iter().find(|o| o.channel == *channel)
    }

    /// True once any of its continuations has been handed out.
    pub fn is_fired(&self) -> bool {
        self.offers.iter().any(|o| o.continuation.lock().is_none())
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(
                self.offers
                    .iter()
                    .map(|o| format!("{}:{}", o.channel.label(), o.intent)),
            )
            .finish()
    }
}

struct ChannelInner {
    id: usize,
    label: String,
    pending: Mutex<Vec<Arc<Request>>>,
}

/// Cheap cloneable handle; clones refer to the same channel.
#[derive(Clone)]
pub struct Channel {
    inner: Arc<ChannelInner>,
}

impl PartialEq for Channel {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Channel {}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("id", &self.inner.id)
            .field("label", &self.inner.label)
            .field("pending", &self.pending_len())
            .finish()
    }
}

impl Channel {
    pub fn new(label: impl Into<String>) -> Self {
        Channel {
            inner: Arc::new(ChannelInner {
                id: NEXT_CHANNEL_ID.fetch_add(1, Ordering::Relaxed),
                label: label.into(),
                pending: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    pub fn pending_len(&self) -> usize {
        self.inner.pending.lock().len()
    }

    pub fn is_pending(&self, request: &Arc<Request>) -> bool {
        self.inner
            .pending
            .lock()
            .iter()
            .any(|r| Arc::ptr_eq(r, request))
    }

    pub fn add(&self, request: Arc<Request>) {
        self.inner.pending.lock().push(request);
    }

    /// Removes `request` if it is pending here. Returns false when it was not.
    pub fn remove(&self, request: &Arc<Request>) -> bool {
        let mut pending = self.inner.pending.lock();
        match pending.iter().position(|r| Arc::ptr_eq(r, request)) {
            Some(pos) => {
                pending.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Drops every pending request and returns how many there were.
    ///
    /// Pending requests point back at this channel, so a channel abandoned
    /// with waiters on it is never freed unless cleared.
    pub fn clear(&self) -> usize {
        let drained = std::mem::take(&mut *self.inner.pending.lock());
        drained.len()
    }

    /// Fires a match if exactly two requests are pending.
    ///
    /// Returns false without side effects otherwise, including when the two
    /// pending intents are incompatible.
    pub fn try_match(&self) -> bool {
        // snapshot first: removal below mutates this very list
        let pair = {
            let pending = self.inner.pending.lock();
            match pending.len() {
                2 => [pending[0].clone(), pending[1].clone()],
                n if n > 2 => {
                    warn!(channel = %self.label(), pending = n, "more than two pending requests, not matching");
                    return false;
                }
                _ => return false,
            }
        };

        if Arc::ptr_eq(&pair[0], &pair[1]) {
            error!(channel = %self.label(), request = ?pair[0], "request pending twice on one channel, not matching");
            return false;
        }

        let mut selected = Vec::with_capacity(2);
        for request in &pair {
            match request.offer_on(self) {
                Some(offer) => selected.push(offer),
                None => {
                    error!(channel = %self.label(), ?request, "pending request does not name this channel");
                    return false;
                }
            }
        }
        if !selected[0].intent.compatible(selected[1].intent) {
            error!(
                channel = %self.label(),
                first = %selected[0].intent,
                second = %selected[1].intent,
                "incompatible intents, not matching"
            );
            return false;
        }

        if let Some(request) = pair.iter().find(|r| r.is_fired()) {
            error!(channel = %self.label(), ?request, "pending request already fired, not matching");
            return false;
        }

        let continuations: Vec<Continuation> = selected
            .iter()
            .filter_map(|offer| offer.continuation.lock().take())
            .collect();

        for request in &pair {
            for channel in request.channels() {
                channel.remove(request);
            }
        }
        debug!(channel = %self.label(), "matched");

        for continuation in continuations {
            continuation();
        }
        true
    }
}
