//! M/M/1 queue: Poisson arrivals, exponential service times, one server.
//! Measured wait time, number of customers in system and utilization are
//! printed next to their analytic values.

use std::cell::RefCell;
use std::rc::Rc;

use simproc::{log_info, Failure, Resource, Simulation, SimulationContext};

const RANDOM_SEED: u64 = 42;
const ARRIVAL_INTERVAL: f64 = 10.0; // mean time between arrivals (1/lambda)
const SERVICE_TIME: f64 = 8.0; // mean service time (1/mu)
const SIM_TIME: f64 = 10_000.0;

#[derive(Default)]
struct Monitor {
    wait_times: Vec<f64>,
    system_times: Vec<f64>,
    total_service_time: f64,
    queue_samples: Vec<(f64, usize)>,
}

/// Draws from an exponential distribution with the given mean.
fn exponential(ctx: &SimulationContext, mean: f64) -> f64 {
    -mean * (1.0 - ctx.rand()).ln()
}

async fn customer(
    ctx: SimulationContext,
    server: Resource,
    monitor: Rc<RefCell<Monitor>>,
) -> Result<(), Failure> {
    let arrived = ctx.time();
    log_info!(ctx, "arrives");
    monitor
        .borrow_mut()
        .queue_samples
        .push((arrived, server.queue_len()));

    let grant = server.acquire().await?;
    let waited = ctx.time() - arrived;
    monitor.borrow_mut().wait_times.push(waited);
    log_info!(ctx, "enters service after waiting {:.2}", waited);

    let service = exponential(&ctx, SERVICE_TIME);
    monitor.borrow_mut().total_service_time += service;
    ctx.timeout(service).await?;
    server.release(&grant)?;

    {
        let mut m = monitor.borrow_mut();
        m.system_times.push(ctx.time() - arrived);
        m.queue_samples.push((ctx.time(), server.queue_len()));
    }
    log_info!(ctx, "departs");
    Ok(())
}

async fn arrivals(
    ctx: SimulationContext,
    server: Resource,
    monitor: Rc<RefCell<Monitor>>,
) -> Result<(), Failure> {
    let mut i = 0u64;
    loop {
        let cctx = ctx.create_context(format!("customer{:02}", i));
        cctx.spawn(customer(cctx.clone(), server.clone(), monitor.clone()));
        ctx.timeout(exponential(&ctx, ARRIVAL_INTERVAL)).await?;
        i += 1;
    }
}

fn main() {
    env_logger::Builder::from_default_env()
        .format_timestamp(None)
        .init();

    let mut sim = Simulation::new(RANDOM_SEED);
    let server = sim.create_resource("server", 1);
    let monitor = Rc::new(RefCell::new(Monitor::default()));

    let ctx = sim.create_context("arrivals");
    ctx.spawn(arrivals(ctx.clone(), server.clone(), monitor.clone()));

    sim.step_until_time(SIM_TIME);

    let m = monitor.borrow();
    println!();
    println!(
        "Average wait time: {:.2}",
        m.wait_times.iter().sum::<f64>() / m.wait_times.len() as f64
    );
    println!(
        "Average number of customers in system: {:.2}",
        m.system_times.iter().sum::<f64>() / SIM_TIME
    );
    println!(
        "Average utilization: {:.2}",
        m.total_service_time / SIM_TIME
    );
    let max_queue = m.queue_samples.iter().map(|(_, q)| *q).max().unwrap_or(0);
    println!("Longest queue observed: {}", max_queue);
    println!();
    let mu = 1.0 / SERVICE_TIME;
    let lambda = 1.0 / ARRIVAL_INTERVAL;
    println!("Theoretical wait time: {:.2}", 1.0 / (mu - lambda));
    println!(
        "Theoretical number of customers in system: {:.2}",
        lambda * lambda / (mu * mu - mu * lambda)
    );
    println!("Theoretical utilization: {:.2}", lambda / mu);
}
