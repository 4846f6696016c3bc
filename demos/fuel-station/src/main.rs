//! Fuel station: cars draw fuel from a shared underground tank through a
//! limited number of dispensers. A control process watches the tank level
//! and calls a tanker truck when it drops below a threshold. The scenario
//! runs for several station configurations and prints per-run statistics.

use std::cell::RefCell;
use std::rc::Rc;

use simproc::{log_info, Container, Failure, Resource, Simulation, SimulationContext};

const RANDOM_SEED: u64 = 42;
const THRESHOLD: f64 = 30.0; // percent of tank capacity triggering a tanker call
const FUEL_TANK_SIZES: [f64; 3] = [45.0, 60.0, 150.0]; // liters: small/medium/large cars
const REFUELING_SPEED: f64 = 50.0; // liters per minute
const TANK_TRUCK_TIME: f64 = 30.0; // minutes for the truck to arrive
const TANK_REFILL_TIME: f64 = 20.0; // minutes to refill the underground tank
const T_INTER: f64 = 1.0; // mean minutes between car arrivals
const SIM_TIME: f64 = 1440.0; // 24 hours

struct FuelStation {
    dispensers: Resource,
    tank: Container,
}

#[derive(Default)]
struct Stats {
    queue_samples: Vec<(f64, usize)>,
    cars_served: u64,
    liters_sold: f64,
    tanker_calls: u64,
}

/// Draws from an exponential distribution with the given mean.
fn exponential(ctx: &SimulationContext, mean: f64) -> f64 {
    -mean * (1.0 - ctx.rand()).ln()
}

/// Draws from a triangular distribution via its inverse CDF.
fn triangular(ctx: &SimulationContext, low: f64, mode: f64, high: f64) -> f64 {
    let u = ctx.rand();
    let cut = (mode - low) / (high - low);
    if u < cut {
        low + (u * (high - low) * (mode - low)).sqrt()
    } else {
        high - ((1.0 - u) * (high - low) * (high - mode)).sqrt()
    }
}

async fn monitor_tank(
    ctx: SimulationContext,
    station: Rc<FuelStation>,
    stats: Rc<RefCell<Stats>>,
) -> Result<(), Failure> {
    loop {
        if station.tank.level() < station.tank.capacity() * THRESHOLD / 100.0 {
            log_info!(
                ctx,
                "tank level {:.1}, calling tanker truck",
                station.tank.level()
            );
            stats.borrow_mut().tanker_calls += 1;
            let tctx = ctx.create_context("tanker");
            let truck = tctx.spawn(tanker(tctx.clone(), station.clone()));
            truck.wait().await?;
        }
        ctx.timeout(10.0).await?; // check every 10 minutes
    }
}

async fn tanker(ctx: SimulationContext, station: Rc<FuelStation>) -> Result<(), Failure> {
    ctx.timeout(TANK_TRUCK_TIME).await?;
    let amount = station.tank.capacity() - station.tank.level();
    log_info!(ctx, "arriving, refilling {:.1} liters", amount);
    ctx.timeout(TANK_REFILL_TIME).await?;
    if amount > 0.0 {
        station.tank.put(amount).await?;
    }
    log_info!(ctx, "tank refilled");
    Ok(())
}

async fn car(
    ctx: SimulationContext,
    station: Rc<FuelStation>,
    stats: Rc<RefCell<Stats>>,
) -> Result<(), Failure> {
    let fill_ratio = triangular(&ctx, 0.75, 0.90, 1.0);
    log_info!(ctx, "arriving at the fuel station");
    stats
        .borrow_mut()
        .queue_samples
        .push((ctx.time(), station.dispensers.queue_len()));
    let start = ctx.time();

    let grant = station.dispensers.acquire().await?;
    let tank_size = FUEL_TANK_SIZES[ctx.gen_range(0..FUEL_TANK_SIZES.len())];
    let liters = tank_size * fill_ratio;
    station.tank.get(liters).await?;
    ctx.timeout(liters / REFUELING_SPEED).await?;
    station.dispensers.release(&grant)?;

    {
        let mut s = stats.borrow_mut();
        s.cars_served += 1;
        s.liters_sold += liters;
        s.queue_samples
            .push((ctx.time(), station.dispensers.queue_len()));
    }
    log_info!(
        ctx,
        "finished refueling {:.1} liters in {:.1} minutes",
        liters,
        ctx.time() - start
    );
    Ok(())
}

async fn car_generator(
    ctx: SimulationContext,
    station: Rc<FuelStation>,
    stats: Rc<RefCell<Stats>>,
) -> Result<(), Failure> {
    let mut i = 0u64;
    loop {
        ctx.timeout(exponential(&ctx, T_INTER)).await?;
        let cctx = ctx.create_context(format!("car{}", i));
        cctx.spawn(car(cctx.clone(), station.clone(), stats.clone()));
        i += 1;
    }
}

fn main() {
    env_logger::Builder::from_default_env()
        .format_timestamp(None)
        .init();

    for &n_pumps in &[2usize, 4] {
        for &tank_size in &[5000.0f64, 10_000.0] {
            let mut sim = Simulation::new(RANDOM_SEED);
            let station = Rc::new(FuelStation {
                dispensers: sim.create_resource("dispensers", n_pumps),
                tank: sim.create_container("fuel-tank", tank_size, tank_size),
            });
            let stats = Rc::new(RefCell::new(Stats::default()));

            let mctx = sim.create_context("station-control");
            mctx.spawn(monitor_tank(mctx.clone(), station.clone(), stats.clone()));
            let gctx = sim.create_context("car-generator");
            gctx.spawn(car_generator(gctx.clone(), station.clone(), stats.clone()));

            sim.step_until_time(SIM_TIME);

            let s = stats.borrow();
            let max_queue = s.queue_samples.iter().map(|(_, q)| *q).max().unwrap_or(0);
            println!(
                "pumps={} tank={:>6.0}: served {} cars, sold {:.0} liters, \
                 {} tanker calls, max queue {}",
                n_pumps, tank_size, s.cars_served, s.liters_sold, s.tanker_calls, max_queue
            );
        }
    }
}
