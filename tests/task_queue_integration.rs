//! Integration tests for task queues
//!
//! These tests validate the closed token loop between two threads:
//! - FIFO hand-off and token conservation
//! - Close wakes waiters that are already blocked
//! - Recycling after close

mod common;

use serial_test::serial;
use std::thread;
use std::time::{Duration, Instant};
use vpu_runtime::attachment::{AttachmentKey, AttachmentRegistry};
use vpu_runtime::task::{PollTimeout, PortDirection, TaskError, TaskQueue};

#[test]
fn test_producer_consumer_fifo() {
    const ITEMS: i64 = 500;

    let registry = AttachmentRegistry::new();
    let queue = TaskQueue::new(2, &registry).unwrap();
    let input = queue.input_port();
    let output = queue.output_port();

    let producer = thread::spawn(move || {
        for pts in 0..ITEMS {
            let token = input.dequeue_timeout(PollTimeout::Block).unwrap();
            token.bag().set(AttachmentKey::Pts, pts).unwrap();
            input.enqueue(token).unwrap();
        }
    });

    let consumer = thread::spawn(move || {
        let mut seen = Vec::with_capacity(ITEMS as usize);
        for _ in 0..ITEMS {
            let token = output.dequeue_timeout(PollTimeout::Block).unwrap();
            seen.push(token.bag().get::<i64>(AttachmentKey::Pts).unwrap());
            output.enqueue(token).unwrap();
        }
        seen
    });

    producer.join().unwrap();
    let seen = consumer.join().unwrap();
    assert_eq!(seen, (0..ITEMS).collect::<Vec<_>>());

    // All tokens are idle again.
    assert_eq!(queue.pending(PortDirection::Input), 2);
    assert_eq!(queue.pending(PortDirection::Output), 0);
}

#[test]
fn test_exhausted_input_reports_empty() {
    let registry = AttachmentRegistry::new();
    let queue = TaskQueue::new(1, &registry).unwrap();
    let input = queue.input_port();

    let _held = input.dequeue().unwrap();
    assert_eq!(input.dequeue().unwrap_err(), TaskError::Empty);
    assert_eq!(
        input.dequeue_timeout(PollTimeout::millis(10)).unwrap_err(),
        TaskError::Timeout
    );
}

#[test]
#[serial]
fn test_close_wakes_every_blocked_waiter() {
    let registry = AttachmentRegistry::new();
    let queue = TaskQueue::new(1, &registry).unwrap();

    // Drain the only idle token so both directions have nothing to hand out.
    let held = queue.input_port().dequeue().unwrap();

    let waiters: Vec<_> = [PortDirection::Input, PortDirection::Output, PortDirection::Output]
        .into_iter()
        .map(|direction| {
            let port = queue.port(direction);
            thread::spawn(move || {
                let start = Instant::now();
                let result = port.dequeue_timeout(PollTimeout::Block).map(|_| ());
                (result, start.elapsed())
            })
        })
        .collect();

    // Let every waiter reach its blocking select before closing.
    thread::sleep(Duration::from_millis(50));
    queue.close();

    for waiter in waiters {
        let (result, waited) = waiter.join().unwrap();
        assert_eq!(result, Err(TaskError::Closed));
        assert!(waited < common::thread_timeout());
    }

    // Returning the held token still works after close.
    queue.recycle(held).unwrap();
    assert_eq!(queue.pending(PortDirection::Input), 1);
}

#[test]
#[serial]
fn test_close_wakes_poll() {
    let registry = AttachmentRegistry::new();
    let queue = TaskQueue::new(1, &registry).unwrap();
    let output = queue.output_port();

    let waiter = thread::spawn(move || output.poll(PollTimeout::Block));
    thread::sleep(Duration::from_millis(20));
    queue.close();

    assert_eq!(waiter.join().unwrap(), Err(TaskError::Closed));
}

#[test]
fn test_closed_queue_rejects_dequeue() {
    let registry = AttachmentRegistry::new();
    let queue = TaskQueue::new(2, &registry).unwrap();
    queue.close();
    assert!(queue.is_closed());
    assert_eq!(queue.input_port().dequeue().unwrap_err(), TaskError::Closed);
    assert_eq!(
        queue
            .output_port()
            .dequeue_timeout(PollTimeout::Block)
            .unwrap_err(),
        TaskError::Closed
    );
}

#[test]
fn test_queue_bags_are_registered() {
    let registry = AttachmentRegistry::new();
    {
        let queue = TaskQueue::new(2, &registry).unwrap();
        assert_eq!(registry.live_count(), 2);
        let token = queue.input_port().dequeue().unwrap();
        assert_eq!(token.bag().tag(), Some("task"));
        queue.recycle(token).unwrap();
    }
    assert_eq!(registry.live_count(), 0);
    assert!(registry.teardown().is_clean());
}
