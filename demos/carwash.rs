//! Cars arrive at random intervals and queue for one of a fixed number of
//! washing machines.

use std::rc::Rc;

use rand::{
    distributions::{Distribution, Uniform},
    rngs::SmallRng as Rng,
    SeedableRng,
};
use rand_distr::Exp;

use chronosim::prelude::*;

const NUM_MACHINES: usize = 4;
const NUM_CARS: usize = 2_000;
const SIM_TIME: f64 = 10_000.0;
const LAMBDA_DRIVE: f64 = 5.0;
const LAMBDA_WASH: f64 = 2.0;

async fn car(ctx: ProcessContext, carwash: Resource, t_drive: f64, t_wash: f64) -> Result<Value, SimError> {
    ctx.sleep(t_drive, ()).await?;
    ctx.wait(carwash.request()?.event()).await?;
    ctx.sleep(t_wash, ()).await?;
    ctx.wait(carwash.release()?.event()).await?;
    Ok(Rc::new(()) as Value)
}

fn main() {
    env_logger::init();

    let env = Environment::new();
    let carwash = Resource::new(&env, NUM_MACHINES).unwrap();

    let mut rng = Rng::from_entropy();
    let arrivals = Uniform::new(0.0, SIM_TIME);
    let distr_drive = Exp::new(1.0 / LAMBDA_DRIVE).unwrap();
    let distr_wash = Exp::new(1.0 / LAMBDA_WASH).unwrap();

    for arrival in arrivals.sample_iter(&mut rng.clone()).take(NUM_CARS) {
        let t_drive = distr_drive.sample(&mut rng);
        let t_wash = distr_wash.sample(&mut rng);
        let carwash = carwash.clone();
        let timer = Timeout::unit(&env, arrival).unwrap();
        let process_env = env.clone();
        timer.on_trigger(move |_| {
            process_env.process(move |ctx| car(ctx, carwash, t_drive, t_wash));
        });
    }

    env.run().unwrap();
    println!("carwash closed at t = {}", env.now());
}
