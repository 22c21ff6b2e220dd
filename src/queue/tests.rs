use super::*;

#[test]
fn starts_empty() {
    let q: SpscQueue<u8> = SpscQueue::new(16);
    assert!(q.is_empty());
    assert!(!q.is_full());
    assert_eq!(q.len(), 0);
    assert_eq!(q.capacity(), 16);
    assert_eq!(q.pop(), None);
}

#[test]
fn fifo_order() {
    let q: SpscQueue<u8> = SpscQueue::new(8);
    for i in 0..5 {
        assert!(q.push(i));
    }
    for i in 0..5 {
        assert_eq!(q.pop(), Some(i));
    }
    assert_eq!(q.pop(), None);
}

#[test]
fn one_slot_sacrificed() {
    let q: SpscQueue<u8> = SpscQueue::new(4);
    assert!(q.push(1));
    assert!(q.push(2));
    assert!(q.push(3));
    assert!(q.is_full());
    assert!(!q.push(4));
    assert_eq!(q.pop(), Some(1));
    assert!(q.push(4));
    assert!(q.is_full());
}

#[test]
fn len_tracks_wrap_around() {
    let q: SpscQueue<u8> = SpscQueue::new(4);
    for round in 0..10u8 {
        assert!(q.push(round));
        assert!(q.push(round.wrapping_add(1)));
        assert_eq!(q.len(), 2);
        assert_eq!(q.pop(), Some(round));
        assert_eq!(q.pop(), Some(round.wrapping_add(1)));
        assert!(q.is_empty());
    }
}

#[test]
#[should_panic]
fn rejects_non_power_of_two_capacity() {
    let _: SpscQueue<u8> = SpscQueue::new(6);
}

#[test]
#[should_panic]
fn rejects_capacity_one() {
    let _: SpscQueue<u8> = SpscQueue::new(1);
}

#[test]
#[should_panic]
fn rejects_capacity_over_128() {
    let _: SpscQueue<u8> = SpscQueue::new(256);
}

/// One producer pushes k ascending integers, one consumer pops them all;
/// ordering must survive and nothing may be lost or duplicated.
#[test]
fn hammer_single_producer_single_consumer() {
    const K: u32 = 100_000;
    let q: SpscQueue<u32> = SpscQueue::new(128);

    std::thread::scope(|s| {
        s.spawn(|| {
            for i in 0..K {
                while !q.push(i) {
                    std::hint::spin_loop();
                }
            }
        });
        s.spawn(|| {
            let mut expected = 0u32;
            while expected < K {
                if let Some(got) = q.pop() {
                    assert_eq!(got, expected);
                    expected += 1;
                } else {
                    std::hint::spin_loop();
                }
            }
            assert_eq!(q.pop(), None);
        });
    });
}
