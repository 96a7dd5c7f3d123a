// Property tests for rendezvous matching.
//
// 1. A request fires at most once, and only the offer on the matching channel.
// 2. With compatible intents no channel is ever left holding two waiters.
// 3. A request is pending somewhere exactly when it has not fired.

use std::{
    collections::BTreeSet,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use dining_rendezvous::{
    channel::{Continuation, Request},
    rendezvous, Channel, Intent,
};
use proptest::prelude::*;

const CHANNELS: usize = 4;

fn offers_strategy() -> impl Strategy<Value = Vec<BTreeSet<usize>>> {
    prop::collection::vec(prop::collection::btree_set(0..CHANNELS, 1..=3), 1..40)
}

fn counting(counter: &Arc<AtomicUsize>) -> Continuation {
    let counter = counter.clone();
    Box::new(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    })
}

proptest! {
    #[test]
    fn requests_fire_at_most_once(requests in offers_strategy()) {
        let channels: Vec<Channel> = (0..CHANNELS).map(|i| Channel::new(format!("c{i}"))).collect();
        let mut issued: Vec<(Arc<Request>, Arc<AtomicUsize>)> = Vec::new();

        for picks in &requests {
            let fired = Arc::new(AtomicUsize::new(0));
            let offers = picks
                .iter()
                .map(|&i| (channels[i].clone(), Intent::Any, counting(&fired)))
                .collect();
            issued.push((rendezvous(offers), fired));

            for channel in &channels {
                prop_assert!(channel.pending_len() <= 1, "{:?}", channel);
            }
        }

        let mut total_fired = 0;
        for (request, fired) in &issued {
            let count = fired.load(Ordering::SeqCst);
            prop_assert!(count <= 1);
            let pending = channels.iter().any(|c| c.is_pending(request));
            prop_assert_eq!(pending, count == 0);
            prop_assert_eq!(request.is_fired(), count == 1);
            total_fired += count;
        }
        // matches always pair two requests
        prop_assert_eq!(total_fired % 2, 0);

        for channel in &channels {
            channel.clear();
        }
    }

    #[test]
    fn incompatible_pairs_never_fire(intents in prop::collection::vec(
        prop_oneof![Just(Intent::Acquire), Just(Intent::Release)],
        2..6,
    )) {
        let channel = Channel::new("c");
        let fired = Arc::new(AtomicUsize::new(0));
        let mut pairs = 0;
        for intent in &intents {
            let before = channel.pending_len();
            rendezvous(vec![(channel.clone(), *intent, counting(&fired))]);
            if before == 1 && channel.pending_len() == 0 {
                pairs += 1;
            }
        }
        prop_assert_eq!(fired.load(Ordering::SeqCst), 2 * pairs);
        if intents[0] != intents[1] {
            prop_assert_eq!(pairs, 0);
        }
        channel.clear();
    }
}
