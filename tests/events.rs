//! Manual events, payload delivery and composite waits.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use simproc::{
    wait_all_of, wait_any_of, Event, EventPriority, Failure, Simulation, SimulationError,
};

#[test]
fn manual_events_deliver_their_payload() {
    let mut sim = Simulation::new(1);
    let ctx = sim.create_context("root");
    let event = ctx.create_event();
    let received = Rc::new(Cell::new(None));
    {
        let wctx = ctx.create_context("waiter");
        let c = wctx.clone();
        let e = event.clone();
        let received = received.clone();
        wctx.spawn(async move {
            let payload = e.wait().await?.unwrap();
            received.set(Some((c.time(), *payload.downcast_ref::<u32>().unwrap())));
            Ok::<(), Failure>(())
        });
    }
    {
        let pctx = ctx.create_context("producer");
        let c = pctx.clone();
        let e = event.clone();
        pctx.spawn(async move {
            c.timeout(2.0).await?;
            e.succeed(7u32)?;
            Ok::<(), Failure>(())
        });
    }
    sim.step_until_no_events();
    assert_eq!(received.get(), Some((2.0, 7)));
    assert!(matches!(
        event.trigger(),
        Err(SimulationError::EventAlreadyTriggered(_))
    ));
}

#[test]
fn failed_events_resume_waiters_with_the_failure() {
    let mut sim = Simulation::new(1);
    let ctx = sim.create_context("root");
    let event = ctx.create_event();
    let reported = Rc::new(RefCell::new(None));
    {
        let wctx = ctx.create_context("waiter");
        let e = event.clone();
        let reported = reported.clone();
        wctx.spawn(async move {
            let failure = e.wait().await.err().unwrap();
            *reported.borrow_mut() = Some(failure.to_string());
            Ok::<(), Failure>(())
        });
    }
    {
        let pctx = ctx.create_context("producer");
        let c = pctx.clone();
        let e = event.clone();
        pctx.spawn(async move {
            c.timeout(1.0).await?;
            e.fail(Failure::error("no fuel"))?;
            Ok::<(), Failure>(())
        });
    }
    sim.step_until_no_events();
    assert_eq!(reported.borrow().as_deref(), Some("no fuel"));
}

#[test]
fn cancelled_events_never_fire() {
    let mut sim = Simulation::new(1);
    let ctx = sim.create_context("root");
    let event = ctx.create_event();
    ctx.schedule(&event, 2.0, EventPriority::Normal).unwrap();
    let fired = Rc::new(Cell::new(false));
    {
        let wctx = ctx.create_context("waiter");
        let e = event.clone();
        let fired = fired.clone();
        wctx.spawn(async move {
            e.wait().await?;
            fired.set(true);
            Ok::<(), Failure>(())
        });
    }
    {
        let tctx = ctx.create_context("timer");
        let c = tctx.clone();
        tctx.spawn(async move {
            c.timeout(5.0).await?;
            Ok::<(), Failure>(())
        });
    }
    assert!(event.cancel());
    assert!(!event.cancel());
    sim.step_until_no_events();
    assert!(!fired.get());
    assert_eq!(sim.time(), 5.0);
}

#[test]
fn wait_all_of_resolves_when_the_last_event_fires() {
    let mut sim = Simulation::new(1);
    let ctx = sim.create_context("root");
    let events: Vec<Event> = (1..=3)
        .map(|i| {
            let e = ctx.create_event();
            ctx.schedule(&e, i as f64, EventPriority::Normal).unwrap();
            e
        })
        .collect();
    let finished = Rc::new(Cell::new(None));
    {
        let wctx = ctx.create_context("waiter");
        let c = wctx.clone();
        let finished = finished.clone();
        wctx.spawn(async move {
            let values = wait_all_of(&events).await?;
            finished.set(Some((c.time(), values.len())));
            Ok::<(), Failure>(())
        });
    }
    sim.step_until_no_events();
    assert_eq!(finished.get(), Some((3.0, 3)));
}

#[test]
fn wait_any_of_yields_the_first_event() {
    let mut sim = Simulation::new(1);
    let ctx = sim.create_context("root");
    let slow = ctx.create_event();
    let fast = ctx.create_event();
    ctx.schedule(&slow, 5.0, EventPriority::Normal).unwrap();
    ctx.schedule(&fast, 2.0, EventPriority::Normal).unwrap();
    let winner = Rc::new(Cell::new(None));
    {
        let wctx = ctx.create_context("waiter");
        let c = wctx.clone();
        let winner = winner.clone();
        wctx.spawn(async move {
            let (index, outcome) = wait_any_of(&[slow, fast]).await;
            assert!(outcome.is_ok());
            winner.set(Some((index, c.time())));
            Ok::<(), Failure>(())
        });
    }
    sim.step_until_no_events();
    assert_eq!(winner.get(), Some((1, 2.0)));
}
