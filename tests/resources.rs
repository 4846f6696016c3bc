//! Resource acquisition, queueing and release semantics.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use simproc::{Failure, Simulation, SimulationError};

#[test]
fn requests_are_served_in_fifo_order() {
    let mut sim = Simulation::new(1);
    let res = sim.create_resource("line", 2);
    let order = Rc::new(RefCell::new(Vec::new()));
    for i in 0..5u32 {
        let ctx = sim.create_context(format!("worker{}", i));
        let c = ctx.clone();
        let r = res.clone();
        let order = order.clone();
        ctx.spawn(async move {
            let grant = r.acquire().await?;
            order.borrow_mut().push((i, c.time()));
            c.timeout(10.0).await?;
            r.release(&grant)?;
            Ok::<(), Failure>(())
        });
    }
    sim.step_until_no_events();
    let order = order.borrow();
    let ids: Vec<u32> = order.iter().map(|(i, _)| *i).collect();
    let times: Vec<f64> = order.iter().map(|(_, t)| *t).collect();
    assert_eq!(ids, vec![0, 1, 2, 3, 4]);
    assert_eq!(times, vec![0.0, 0.0, 10.0, 10.0, 20.0]);
}

#[test]
fn lower_priority_value_is_served_first() {
    let mut sim = Simulation::new(1);
    let res = sim.create_resource("gate", 1);
    let order = Rc::new(RefCell::new(Vec::new()));
    {
        let ctx = sim.create_context("holder");
        let c = ctx.clone();
        let r = res.clone();
        ctx.spawn(async move {
            let grant = r.acquire().await?;
            c.timeout(5.0).await?;
            r.release(&grant)?;
            Ok::<(), Failure>(())
        });
    }
    // "low" queues up first but "high" carries the lower priority value.
    for (name, delay, priority) in [("low", 1.0, 10), ("high", 2.0, 0)] {
        let ctx = sim.create_context(name);
        let c = ctx.clone();
        let r = res.clone();
        let order = order.clone();
        ctx.spawn(async move {
            c.timeout(delay).await?;
            let grant = r.acquire_with_priority(priority).await?;
            order.borrow_mut().push(name);
            c.timeout(1.0).await?;
            r.release(&grant)?;
            Ok::<(), Failure>(())
        });
    }
    sim.step_until_no_events();
    assert_eq!(*order.borrow(), vec!["high", "low"]);
}

#[test]
fn granted_requests_leave_the_queue_as_they_enter_the_holders() {
    let mut sim = Simulation::new(1);
    let res = sim.create_resource("gate", 1);
    let observed = Rc::new(RefCell::new(Vec::new()));
    {
        let ctx = sim.create_context("holder");
        let c = ctx.clone();
        let r = res.clone();
        ctx.spawn(async move {
            let grant = r.acquire().await?;
            c.timeout(2.0).await?;
            r.release(&grant)?;
            Ok::<(), Failure>(())
        });
    }
    // "low" queues first; "high" overtakes it on priority, so the grant at
    // t=2 reorders the queue while removing the grantee from it.
    for (name, delay, priority) in [("low", 0.5, 5), ("high", 1.0, 0)] {
        let ctx = sim.create_context(name);
        let c = ctx.clone();
        let r = res.clone();
        let observed = observed.clone();
        ctx.spawn(async move {
            c.timeout(delay).await?;
            let grant = r.acquire_with_priority(priority).await?;
            observed
                .borrow_mut()
                .push((name, c.time(), r.holder_count(), r.queue_len()));
            c.timeout(1.0).await?;
            r.release(&grant)?;
            Ok::<(), Failure>(())
        });
    }
    {
        let ctx = sim.create_context("probe");
        let c = ctx.clone();
        let r = res.clone();
        let observed = observed.clone();
        ctx.spawn(async move {
            c.timeout(2.0).await?;
            observed
                .borrow_mut()
                .push(("probe", c.time(), r.holder_count(), r.queue_len()));
            Ok::<(), Failure>(())
        });
    }
    sim.step_until_no_events();
    // At every observation point the grantee sits in the holder set and is
    // gone from the queue; the other request is still queued.
    assert_eq!(
        *observed.borrow(),
        vec![
            ("probe", 2.0, 1, 1),
            ("high", 2.0, 1, 1),
            ("low", 3.0, 1, 0),
        ]
    );
}

#[test]
fn freed_unit_is_reassigned_at_the_release_timestamp() {
    let mut sim = Simulation::new(1);
    let res = sim.create_resource("pump", 1);
    let granted_at = Rc::new(Cell::new(None));
    let observed = Rc::new(Cell::new(None));
    {
        let ctx = sim.create_context("holder");
        let c = ctx.clone();
        let r = res.clone();
        ctx.spawn(async move {
            let grant = r.acquire().await?;
            c.timeout(3.0).await?;
            r.release(&grant)?;
            Ok::<(), Failure>(())
        });
    }
    {
        let ctx = sim.create_context("waiter");
        let c = ctx.clone();
        let r = res.clone();
        let granted_at = granted_at.clone();
        ctx.spawn(async move {
            let grant = r.acquire().await?;
            granted_at.set(Some(c.time()));
            r.release(&grant)?;
            Ok::<(), Failure>(())
        });
    }
    // Fires at the release time, after the release but before the grantee
    // resumes: the unit must already be reassigned.
    {
        let ctx = sim.create_context("probe");
        let c = ctx.clone();
        let r = res.clone();
        let observed = observed.clone();
        ctx.spawn(async move {
            c.timeout(3.0).await?;
            observed.set(Some((r.holder_count(), r.queue_len())));
            Ok::<(), Failure>(())
        });
    }
    sim.step_until_no_events();
    assert_eq!(granted_at.get(), Some(3.0));
    assert_eq!(observed.get(), Some((1, 0)));
}

#[test]
fn releasing_the_same_grant_twice_is_an_error() {
    let mut sim = Simulation::new(1);
    let res = sim.create_resource("gate", 1);
    let checked = Rc::new(Cell::new(false));
    let ctx = sim.create_context("worker");
    let r = res.clone();
    let checked2 = checked.clone();
    ctx.spawn(async move {
        let grant = r.acquire().await?;
        r.release(&grant)?;
        assert!(matches!(
            r.release(&grant),
            Err(SimulationError::ResourceOverrelease)
        ));
        checked2.set(true);
        Ok::<(), Failure>(())
    });
    sim.step_until_no_events();
    assert!(checked.get());
}

#[test]
fn auto_release_frees_units_of_failed_processes() {
    let mut sim = Simulation::new(1);
    let res = sim.create_resource("pump", 1);
    res.set_auto_release(true);
    let granted_at = Rc::new(Cell::new(None));
    let reported = Rc::new(RefCell::new(None));

    let crasher = {
        let ctx = sim.create_context("crasher");
        let c = ctx.clone();
        let r = res.clone();
        ctx.spawn(async move {
            let _grant = r.acquire().await?;
            c.timeout(1.0).await?;
            Err::<(), Failure>(Failure::error("pump jammed"))
        })
    };
    {
        let ctx = sim.create_context("waiter");
        let c = ctx.clone();
        let r = res.clone();
        let granted_at = granted_at.clone();
        ctx.spawn(async move {
            c.timeout(0.5).await?;
            let grant = r.acquire().await?;
            granted_at.set(Some(c.time()));
            r.release(&grant)?;
            Ok::<(), Failure>(())
        });
    }
    {
        let ctx = sim.create_context("watcher");
        let crasher = crasher.clone();
        let reported = reported.clone();
        ctx.spawn(async move {
            let result = crasher.wait().await;
            *reported.borrow_mut() = Some(result.err().unwrap().to_string());
            Ok::<(), Failure>(())
        });
    }
    sim.step_until_no_events();
    assert_eq!(granted_at.get(), Some(1.0));
    assert_eq!(reported.borrow().as_deref(), Some("pump jammed"));
}

#[test]
fn leaked_units_stay_held_without_auto_release() {
    let mut sim = Simulation::new(1);
    let res = sim.create_resource("pump", 1);
    let ctx = sim.create_context("leaker");
    let c = ctx.clone();
    let r = res.clone();
    ctx.spawn(async move {
        let _grant = r.acquire().await?;
        c.timeout(1.0).await?;
        // Terminates without releasing.
        Ok::<(), Failure>(())
    });
    sim.step_until_no_events();
    assert_eq!(res.holder_count(), 1);
}

#[test]
fn batch_release_grants_every_freed_unit_at_the_release_time() {
    let mut sim = Simulation::new(1);
    let res = sim.create_resource("dock", 2);
    let grants = Rc::new(RefCell::new(Vec::new()));
    let observed = Rc::new(Cell::new(None));
    {
        let ctx = sim.create_context("holder");
        let c = ctx.clone();
        let r = res.clone();
        ctx.spawn(async move {
            let g1 = r.acquire().await?;
            let g2 = r.acquire().await?;
            c.timeout(2.0).await?;
            r.release(&g1)?;
            r.release(&g2)?;
            Ok::<(), Failure>(())
        });
    }
    for name in ["first", "second"] {
        let ctx = sim.create_context(name);
        let c = ctx.clone();
        let r = res.clone();
        let grants = grants.clone();
        ctx.spawn(async move {
            let grant = r.acquire().await?;
            grants.borrow_mut().push((name, c.time()));
            r.release(&grant)?;
            Ok::<(), Failure>(())
        });
    }
    {
        let ctx = sim.create_context("probe");
        let c = ctx.clone();
        let r = res.clone();
        let observed = observed.clone();
        ctx.spawn(async move {
            c.timeout(2.0).await?;
            observed.set(Some(r.holder_count()));
            Ok::<(), Failure>(())
        });
    }
    sim.step_until_no_events();
    assert_eq!(
        *grants.borrow(),
        vec![("first", 2.0), ("second", 2.0)]
    );
    // Between the release and the grantees resuming, both units are already
    // reassigned.
    assert_eq!(observed.get(), Some(2));
}
