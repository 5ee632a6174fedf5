use pour_core::Broadcast;
use rstest::rstest;

#[rstest]
fn late_subscribers_see_only_later_values() {
    let hub = Broadcast::new(8);
    let early = hub.subscribe();
    hub.publish(1u32);
    let late = hub.subscribe();
    hub.publish(2);

    assert_eq!(early.try_iter().collect::<Vec<_>>(), vec![1, 2]);
    assert_eq!(late.try_iter().collect::<Vec<_>>(), vec![2]);
}

#[rstest]
fn full_subscriber_drops_without_blocking_others() {
    let hub = Broadcast::new(2);
    let slow = hub.subscribe();
    let fast = hub.subscribe();

    let mut fast_seen = Vec::new();
    for v in 0..5u32 {
        hub.publish(v);
        fast_seen.extend(fast.try_iter());
    }

    assert_eq!(fast_seen, vec![0, 1, 2, 3, 4]);
    assert_eq!(slow.try_iter().collect::<Vec<_>>(), vec![0, 1]);
    assert_eq!(hub.dropped(), 3);
}

#[rstest]
fn dropped_receivers_are_pruned() {
    let hub = Broadcast::new(4);
    let keep = hub.subscribe();
    drop(hub.subscribe());
    assert_eq!(hub.subscriber_count(), 2);

    assert_eq!(hub.publish(7u8), 1);
    assert_eq!(hub.subscriber_count(), 1);
    assert_eq!(keep.recv().unwrap(), 7);
}
