//! # Thread-mode router and the invocation wrapper.
//!
//! For each matched subscription the router either invokes inline on the
//! calling thread or hands the delivery to one of the execution contexts,
//! per the subscription's [`DeliveryMode`]. The invocation wrapper is
//! shared by every path: it re-checks `active` (the unregister race
//! contract), contains panics, and applies the configured panic policy.

use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::core::BusCore;
use crate::diag::Diag;
use crate::events::{DeliveryFailed, Envelope};
use crate::registry::{DeliveryMode, Subscription};
use crate::types::TypeKey;

use super::engine;
use super::executors::Job;
use super::state::{self, StateKey};

/// Routes one matched subscription. Returns `false` when the handler
/// canceled delivery of this event and iteration over the remaining
/// subscriptions must stop.
pub(crate) fn route(
    core: &Arc<BusCore>,
    sub: &Arc<Subscription>,
    env: &Envelope,
    on_primary: bool,
    lane: StateKey,
) -> bool {
    match sub.mode {
        DeliveryMode::Inline => deliver_inline(core, sub, env, lane, DeliveryMode::Inline),
        DeliveryMode::Main => {
            if on_primary {
                deliver_inline(core, sub, env, lane, DeliveryMode::Main)
            } else {
                enqueue_main(core, sub, env);
                true
            }
        }
        DeliveryMode::MainQueued => {
            enqueue_main(core, sub, env);
            true
        }
        DeliveryMode::Background => {
            if on_primary {
                enqueue_background(core, sub, env);
                true
            } else {
                // Already off the primary thread, no need to hop.
                deliver_inline(core, sub, env, lane, DeliveryMode::Background)
            }
        }
        DeliveryMode::Pooled => {
            core.executors.spawn_pooled(job(core, sub, env));
            true
        }
    }
}

fn deliver_inline(
    core: &Arc<BusCore>,
    sub: &Arc<Subscription>,
    env: &Envelope,
    lane: StateKey,
    mode: DeliveryMode,
) -> bool {
    state::begin_inline(lane, env, mode);
    invoke(core, sub, env);
    !state::end_inline(lane)
}

fn job(core: &Arc<BusCore>, sub: &Arc<Subscription>, env: &Envelope) -> Job {
    Job {
        core: Arc::clone(core),
        sub: Arc::clone(sub),
        env: env.clone(),
    }
}

fn enqueue_main(core: &Arc<BusCore>, sub: &Arc<Subscription>, env: &Envelope) {
    if let Some(job) = core.executors.enqueue_main(job(core, sub, env)) {
        report_closed(core, &job);
    }
}

fn enqueue_background(core: &Arc<BusCore>, sub: &Arc<Subscription>, env: &Envelope) {
    if let Some(job) = core.executors.enqueue_background(job(core, sub, env)) {
        report_closed(core, &job);
    }
}

fn report_closed(core: &Arc<BusCore>, job: &Job) {
    core.diag.report(Diag::QueueClosed {
        track: job.sub.track,
        event: job.env.key(),
    });
}

/// Invokes one subscription for one envelope, wherever the delivery ended
/// up executing.
pub(crate) fn invoke(core: &Arc<BusCore>, sub: &Subscription, env: &Envelope) {
    // A subscriber unregistered after this delivery was queued: skip
    // silently rather than deliver posthumously.
    if !sub.active.load(Ordering::Acquire) {
        return;
    }
    if let Err(payload) = catch_unwind(AssertUnwindSafe(|| (sub.handler)(env))) {
        contain_panic(core, sub, env, payload);
    }
}

fn contain_panic(
    core: &Arc<BusCore>,
    sub: &Subscription,
    env: &Envelope,
    payload: Box<dyn std::any::Any + Send>,
) {
    let message = panic_message(payload.as_ref());
    let policy = core.panic_policy;
    let about_failure = env.key() == TypeKey::of::<DeliveryFailed>();

    if policy.log || (policy.emit_fault_event && about_failure) {
        core.diag.report(Diag::HandlerPanic {
            track: sub.track,
            subscriber: sub.subscriber_class,
            handler: sub.name,
            event: env.key(),
            message: message.clone(),
        });
    }
    if policy.emit_fault_event && !about_failure {
        engine::post(
            core,
            sub.track,
            Envelope::new(DeliveryFailed {
                track: sub.track,
                envelope: env.clone(),
                subscriber: sub.subscriber_class,
                handler: sub.name,
                message,
            }),
        );
    }
    if policy.rethrow {
        resume_unwind(payload);
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{mpsc as std_mpsc, Arc, Mutex};
    use std::thread::ThreadId;
    use std::time::Duration;

    use tokio::sync::mpsc;
    use tokio::time::timeout;

    use crate::core::Bus;
    use crate::registry::{DeliveryMode, HandlerDescriptor, Subscriber};

    struct Ping;
    struct Pong;
    struct Gate;
    struct Hit;
    struct Done;

    const WAIT: Duration = Duration::from_secs(5);

    fn thread_name() -> String {
        std::thread::current().name().unwrap_or("<unnamed>").to_string()
    }

    #[tokio::test]
    async fn main_queue_preserves_posting_order_on_its_own_thread() {
        let bus = Bus::builder().build().unwrap();
        let subscriber = Subscriber::new(Arc::new(()));
        let (tx, mut rx) = mpsc::unbounded_channel();

        bus.register(
            &subscriber,
            vec![HandlerDescriptor::of(
                "on_seq",
                DeliveryMode::MainQueued,
                move |n: &u32| {
                    let _ = tx.send((thread_name(), *n));
                },
            )],
        )
        .unwrap();

        for n in 0..3_u32 {
            bus.post(n);
        }
        for expected in 0..3_u32 {
            let (name, n) = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
            assert_eq!(n, expected);
            assert_eq!(name, "polybus-main");
        }
        bus.shutdown();
    }

    #[tokio::test]
    async fn main_mode_runs_inline_when_probe_claims_the_caller() {
        let bus = Bus::builder().with_main_thread_probe(|| true).build().unwrap();
        let subscriber = Subscriber::new(Arc::new(()));
        let seen: Arc<Mutex<Option<ThreadId>>> = Arc::new(Mutex::new(None));

        let slot = Arc::clone(&seen);
        bus.register(
            &subscriber,
            vec![HandlerDescriptor::of("on_ping", DeliveryMode::Main, move |_: &Ping| {
                *slot.lock().unwrap() = Some(std::thread::current().id());
            })],
        )
        .unwrap();

        bus.post(Ping);
        // Inline: the delivery completed synchronously, on this thread.
        assert_eq!(*seen.lock().unwrap(), Some(std::thread::current().id()));
        bus.shutdown();
    }

    #[tokio::test]
    async fn background_runs_inline_off_the_primary_thread() {
        let bus = Bus::builder().build().unwrap();
        let subscriber = Subscriber::new(Arc::new(()));
        let seen: Arc<Mutex<Option<ThreadId>>> = Arc::new(Mutex::new(None));

        let slot = Arc::clone(&seen);
        bus.register(
            &subscriber,
            vec![HandlerDescriptor::of(
                "on_pong",
                DeliveryMode::Background,
                move |_: &Pong| {
                    *slot.lock().unwrap() = Some(std::thread::current().id());
                },
            )],
        )
        .unwrap();

        bus.post(Pong);
        assert_eq!(*seen.lock().unwrap(), Some(std::thread::current().id()));
        bus.shutdown();
    }

    #[tokio::test]
    async fn background_hops_off_the_primary_thread() {
        let bus = Bus::builder().build().unwrap();
        let subscriber = Subscriber::new(Arc::new(()));
        let (tx, mut rx) = mpsc::unbounded_channel();

        // Ping runs on the main consumer (the primary thread); the Pong it
        // posts from there must hop to the background consumer.
        let bus2 = bus.clone();
        bus.register(
            &subscriber,
            vec![
                HandlerDescriptor::of("on_ping", DeliveryMode::Main, move |_: &Ping| {
                    bus2.post(Pong);
                }),
                HandlerDescriptor::of("on_pong", DeliveryMode::Background, move |_: &Pong| {
                    let _ = tx.send(thread_name());
                }),
            ],
        )
        .unwrap();

        bus.post(Ping);
        let name = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
        assert_eq!(name, "polybus-background");
        bus.shutdown();
    }

    #[tokio::test]
    async fn pooled_deliveries_reach_the_pool() {
        let bus = Bus::builder().build().unwrap();
        let subscriber = Subscriber::new(Arc::new(()));
        let (tx, mut rx) = mpsc::unbounded_channel();

        let me = std::thread::current().id();
        bus.register(
            &subscriber,
            vec![HandlerDescriptor::of("on_ping", DeliveryMode::Pooled, move |_: &Ping| {
                let _ = tx.send(std::thread::current().id() != me);
            })],
        )
        .unwrap();

        bus.post(Ping);
        let off_thread = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
        assert!(off_thread);
        bus.shutdown();
    }

    #[tokio::test]
    async fn unregister_before_drain_skips_the_queued_delivery() {
        let bus = Bus::builder().build().unwrap();
        let helper = Subscriber::new(Arc::new(()));
        let victim = Subscriber::new(Arc::new(()));

        let (gate_tx, gate_rx) = std_mpsc::channel::<()>();
        let gate = Arc::new(Mutex::new(gate_rx));
        let (done_tx, mut done_rx) = mpsc::unbounded_channel();
        let hit = Arc::new(AtomicBool::new(false));

        bus.register(
            &helper,
            vec![
                HandlerDescriptor::of("on_gate", DeliveryMode::MainQueued, move |_: &Gate| {
                    let _ = gate.lock().unwrap().recv_timeout(WAIT);
                }),
                HandlerDescriptor::of("on_done", DeliveryMode::MainQueued, move |_: &Done| {
                    let _ = done_tx.send(());
                }),
            ],
        )
        .unwrap();

        let flag = Arc::clone(&hit);
        bus.register(
            &victim,
            vec![HandlerDescriptor::of("on_hit", DeliveryMode::MainQueued, move |_: &Hit| {
                flag.store(true, Ordering::SeqCst);
            })],
        )
        .unwrap();

        // Block the main consumer, queue the victim's delivery behind the
        // blockage, then unregister before the queue drains.
        bus.post(Gate);
        bus.post(Hit);
        bus.unregister(&victim);
        gate_tx.send(()).unwrap();
        bus.post(Done);

        timeout(WAIT, done_rx.recv()).await.unwrap().unwrap();
        assert!(!hit.load(Ordering::SeqCst));
        bus.shutdown();
    }
}
