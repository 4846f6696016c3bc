//! Process registry bookkeeping and handle behavior after completion.

use simproc::{Failure, ProcessStatus, Simulation};

#[test]
fn finished_processes_are_pruned_from_the_registry() {
    let mut sim = Simulation::new(1);
    let mut last = None;
    for i in 0..100 {
        let ctx = sim.create_context(format!("job{}", i));
        let c = ctx.clone();
        last = Some(ctx.spawn(async move {
            c.timeout(1.0).await?;
            Ok::<(), Failure>(())
        }));
    }
    assert_eq!(sim.process_count(), 100);
    sim.step_until_no_events();
    // Long-running models spawn unboundedly; the registry must not grow with
    // every process that ever lived.
    assert_eq!(sim.process_count(), 0);
    assert_eq!(last.unwrap().status(), ProcessStatus::Terminated);
}

#[test]
fn handles_report_failure_after_pruning() {
    let mut sim = Simulation::new(1);
    let ctx = sim.create_context("crasher");
    let c = ctx.clone();
    let process = ctx.spawn(async move {
        c.timeout(1.0).await?;
        Err::<(), Failure>(Failure::error("boom"))
    });
    assert_eq!(process.status(), ProcessStatus::Suspended);
    sim.step_until_no_events();
    assert_eq!(sim.process_count(), 0);
    assert_eq!(process.status(), ProcessStatus::Failed);
}
