//! Two processes competing for one CPU.
//!
//! Features shown in this example:
//! * `Resource` with capacity 1
//! * `ProcessContext::sleep`
//! * `Environment::run_until(Until::Time(..))`

use rand::{rngs::SmallRng as Rng, RngCore as RngT, SeedableRng};

use chronosim::prelude::*;

fn main() {
    env_logger::init();

    let env = Environment::new();
    let cpu = Resource::new(&env, 1).unwrap();

    {
        let cpu = cpu.clone();
        env.named_process("p1", move |ctx| async move {
            for _ in 0..10 {
                ctx.wait(cpu.request()?.event()).await?;
                ctx.sleep(5.0, ()).await?;
                ctx.wait(cpu.release()?.event()).await?;
            }
            Ok(std::rc::Rc::new(()) as Value)
        });
    }

    {
        let cpu = cpu.clone();
        env.named_process("p2", move |ctx| async move {
            ctx.sleep(17.0, ()).await?;
            let mut rng = Rng::from_entropy();
            loop {
                ctx.wait(cpu.request()?.event()).await?;
                let busy = (rng.next_u32() % 10) as f64;
                ctx.sleep(busy, ()).await?;
                ctx.wait(cpu.release()?.event()).await?;
            }
        });
    }

    env.run_until(Until::Time(100.0)).unwrap();
    println!("stopped at t = {}", env.now());
}
