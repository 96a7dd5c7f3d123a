use std::{
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll, Waker},
};

use parking_lot::Mutex;

use crate::channel::{Channel, Continuation, Intent, Request};

/// Registers one request on every offered channel, then tries the channels in
/// order and stops at the first that matches.
///
/// If no channel matches now, the request stays pending and its continuation
/// runs later, from inside the call that supplies the second party.
pub fn rendezvous(offers: Vec<(Channel, Intent, Continuation)>) -> Arc<Request> {
    let request = Request::new(offers);
    for channel in request.channels() {
        channel.add(request.clone());
    }
    for channel in request.channels() {
        if channel.try_match() {
            break;
        }
    }
    request
}

#[derive(Default)]
struct Slot {
    matched: Option<usize>,
    waker: Option<Waker>,
}

/// Awaitable rendezvous. Resolves to the index of the offer that matched.
pub fn handshake(offers: Vec<(Channel, Intent)>) -> Handshake {
    debug_assert!(!offers.is_empty(), "handshake needs at least one channel");
    Handshake {
        offers: Some(offers),
        slot: Arc::new(Mutex::new(Slot::default())),
    }
}

pub struct Handshake {
    // taken on first poll, when the request is registered
    offers: Option<Vec<(Channel, Intent)>>,
    slot: Arc<Mutex<Slot>>,
}

impl Future for Handshake {
    type Output = usize;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<usize> {
        let this = self.get_mut();

        if let Some(offers) = this.offers.take() {
            let offers = offers
                .into_iter()
                .enumerate()
                .map(|(index, (channel, intent))| {
                    let slot = this.slot.clone();
                    let resume: Continuation = Box::new(move || {
                        let waker = {
                            let mut slot = slot.lock();
                            slot.matched = Some(index);
                            slot.waker.take()
                        };
                        if let Some(waker) = waker {
                            waker.wake();
                        }
                    });
                    (channel, intent, resume)
                })
                .collect();
            rendezvous(offers);
        }

        let mut slot = this.slot.lock();
        match slot.matched {
            Some(index) => Poll::Ready(index),
            None => {
                slot.waker = Some(cx.waker().clone());
                Poll::Pending
            }
        }
    }
}
