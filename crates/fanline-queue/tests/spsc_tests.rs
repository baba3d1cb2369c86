use std::thread;
use std::time::Duration;

use fanline_queue::{PopError, PushError, Signal, spsc};

#[test]
fn two_thread_soak_preserves_order() {
    const COUNT: usize = 100_000;
    let (mut tx, mut rx) = spsc::<usize>(64);
    let signal = Signal::new();
    let doorbell = signal.clone();

    let producer = thread::spawn(move || {
        let mut next = 0;
        while next < COUNT {
            match tx.push(next) {
                Ok(()) => {
                    doorbell.notify();
                    next += 1;
                }
                Err(PushError::Full(_)) => thread::yield_now(),
                Err(PushError::Closed(_)) => panic!("consumer died early"),
            }
        }
    });

    let mut expected = 0;
    while expected < COUNT {
        match rx.pop() {
            Ok(value) => {
                assert_eq!(value, expected);
                expected += 1;
            }
            Err(PopError::Empty) => {
                signal.wait(Duration::from_millis(1));
            }
            Err(PopError::Closed) => break,
        }
    }
    assert_eq!(expected, COUNT);
    producer.join().unwrap();
}

#[test]
fn backpressure_hands_element_back() {
    let (mut tx, mut rx) = spsc::<String>(2);
    tx.push("a".to_string()).unwrap();
    tx.push("b".to_string()).unwrap();
    let rejected = match tx.push("c".to_string()) {
        Err(PushError::Full(value)) => value,
        other => panic!("expected Full, got {other:?}"),
    };
    assert_eq!(rejected, "c");
    assert_eq!(rx.pop().unwrap(), "a");
    tx.push(rejected).unwrap();
    assert_eq!(rx.pop().unwrap(), "b");
    assert_eq!(rx.pop().unwrap(), "c");
}

#[test]
fn consumer_observes_close_after_drain() {
    let (mut tx, mut rx) = spsc::<u64>(8);
    for i in 0..5 {
        tx.push(i).unwrap();
    }
    drop(tx);
    let mut seen = Vec::new();
    loop {
        match rx.pop() {
            Ok(v) => seen.push(v),
            Err(PopError::Closed) => break,
            Err(PopError::Empty) => unreachable!("producer already dropped"),
        }
    }
    assert_eq!(seen, vec![0, 1, 2, 3, 4]);
}
