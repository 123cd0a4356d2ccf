//! End-to-end scenarios against the public API.

use std::rc::Rc;

use chronosim::prelude::*;

#[test]
fn two_timeouts_process_in_time_order() {
    let env = Environment::new();
    let a = Timeout::unit(&env, 5.0).unwrap();
    let b = Timeout::unit(&env, 10.0).unwrap();
    env.run().unwrap();
    assert_eq!(env.now(), 10.0);
    assert!(a.processed());
    assert!(b.processed());
}

#[test]
fn urgent_priority_breaks_a_tie_with_normal() {
    let env = Environment::new();
    let order = Rc::new(std::cell::RefCell::new(Vec::new()));

    // `schedule` first (while Pending), then `succeed`: `succeed`'s own
    // auto-schedule is a no-op once an event is already in the queue, so
    // this is the public-API way to put a pre-decided event in at a chosen
    // priority instead of the `Normal`/delay-0 default `succeed` picks.
    let normal = Event::new(&env);
    env.schedule(normal.clone(), Priority::Normal, 5.0).unwrap();
    normal.succeed_unit().unwrap();
    {
        let order = order.clone();
        normal.on_trigger(move |_| order.borrow_mut().push("normal"));
    }

    let urgent = Event::new(&env);
    env.schedule(urgent.clone(), Priority::Urgent, 5.0).unwrap();
    urgent.succeed_unit().unwrap();
    {
        let order = order.clone();
        urgent.on_trigger(move |_| order.borrow_mut().push("urgent"));
    }

    env.run().unwrap();
    assert_eq!(*order.borrow(), vec!["urgent", "normal"]);
}

#[test]
fn process_with_two_timeouts_returns_done_at_seven() {
    let env = Environment::new();
    let p = env.process(|ctx| async move {
        ctx.sleep(3.0, ()).await?;
        ctx.sleep(4.0, ()).await?;
        Ok(Rc::new("done".to_string()) as Value)
    });
    env.run().unwrap();
    assert_eq!(env.now(), 7.0);
    assert!(p.ok().unwrap());
    assert_eq!(&*p.value_as::<String>().unwrap().unwrap(), "done");
}

#[test]
fn interrupt_delivered_before_the_process_ever_runs() {
    let env = Environment::new();
    let p = env.process(|ctx| async move {
        match ctx.sleep(100.0, ()).await {
            Ok(v) => Ok(v),
            Err(e) => Ok(e.cause().cloned().unwrap_or_else(|| Rc::new(()) as Value)),
        }
    });
    p.interrupt("boom");
    env.run().unwrap();
    // The 100.0 timeout is withdrawn the moment the interrupt gate wins the
    // race, so nothing is left to run and `run` returns at t == 0.
    assert_eq!(env.now(), 0.0);
    assert!(p.ok().unwrap());
    assert_eq!(*p.value_as::<&str>().unwrap().unwrap(), "boom");
}

#[test]
fn two_processes_contend_for_one_unit_resource() {
    let env = Environment::new();
    let resource = Resource::new(&env, 1).unwrap();

    let r1 = resource.clone();
    let p1 = env.process(move |ctx| async move {
        ctx.wait(r1.request()?.event()).await?;
        ctx.sleep(5.0, ()).await?;
        r1.release()?;
        Ok(Rc::new(()) as Value)
    });

    let r2 = resource.clone();
    let p2 = env.process(move |ctx| async move {
        ctx.wait(r2.request()?.event()).await?;
        let start = ctx.env().now();
        ctx.sleep(5.0, ()).await?;
        r2.release()?;
        Ok(Rc::new(start) as Value)
    });

    env.run().unwrap();
    assert_eq!(env.now(), 10.0);
    assert!(p1.ok().unwrap());
    assert!(p2.ok().unwrap());
    assert_eq!(*p2.value_as::<f64>().unwrap().unwrap(), 5.0);
}

#[test]
fn and_condition_fails_with_the_first_failed_child() {
    let env = Environment::new();
    let a = Event::new(&env);
    let b = Event::new(&env);
    let cond = a.and(&b).unwrap();

    let seen = Rc::new(std::cell::RefCell::new(None));
    {
        let seen = seen.clone();
        cond.on_trigger(move |c| {
            *seen.borrow_mut() = Some(c.ok().unwrap());
        });
    }

    a.fail(42i32).unwrap();
    b.succeed_unit().unwrap();

    // Nobody defuses `cond` itself (only `a`, its failed child, gets
    // defused automatically), so its failure is unhandled and `run`
    // re-raises it once `cond` is fanned — by which point every side effect
    // below has already happened.
    let result = env.run();
    assert!(matches!(result, Err(SimError::Unhandled(_))));

    assert!(cond.triggered());
    assert!(!cond.ok().unwrap());
    assert!(a.defused());
    assert_eq!(*seen.borrow(), Some(false));
}
