use std::time::Duration;

use macro_rules_attribute::apply;
use smol::Timer;
use smol_macros::main;
use taskflow::{Dispatcher, FnSpawner, MainContext, TaskError, TryTaskExt};

async fn fetch(attempt: u32) -> Result<u32, TaskError<String>> {
    Timer::after(Duration::from_millis(200)).await;
    if attempt % 2 == 0 {
        Ok(attempt * 10)
    } else {
        Err(TaskError::Faulted(format!("attempt {attempt} timed out")))
    }
}

#[apply(main!)]
async fn main() {
    env_logger::init();

    let (main, mut main_loop) = MainContext::new();
    let dispatcher = Dispatcher::new(FnSpawner::new(|f| smol::spawn(f).detach()), main);

    for attempt in 0..4 {
        fetch(attempt).forget_with(
            &dispatcher,
            |v| println!("Fetched {v}"),
            |e| println!("Handled on main: {e}"),
            true,
        );
    }

    // The last attempt faults with nobody listening; it lands in the log.
    fetch(5).forget(&dispatcher);

    println!("After task spawn");
    for _ in 0..10 {
        Timer::after(Duration::from_millis(50)).await;
        main_loop.run_pending();
    }
}
