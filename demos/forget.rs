use std::{thread, time::Duration};

use taskflow::{
    CancellationToken, Dispatcher, MainContext, TaskError, TaskExt, TimeBase, TryTaskExt,
    delay_secs,
};

#[derive(Debug)]
enum SaveError {
    DiskFull,
}

impl std::fmt::Display for SaveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

fn main() -> std::io::Result<()> {
    env_logger::init();

    let (main, mut main_loop) = MainContext::new();
    let dispatcher = Dispatcher::thread_pool(2, main)?;
    let token = CancellationToken::new();

    let save = {
        let token = token.clone();
        async move {
            delay_secs(0.2, TimeBase::Realtime, &token).await?;
            Err::<(), _>(TaskError::Faulted(SaveError::DiskFull))
        }
    };
    save.finally(|| println!("Save attempt finished")).forget_with(
        &dispatcher,
        |_| println!("Saved"),
        |e| println!("Save failed on {:?}: {e}", thread::current().name()),
        true,
    );

    let autosave = {
        let token = token.clone();
        async move {
            delay_secs(5.0, TimeBase::Realtime, &token).await?;
            Ok::<_, TaskError<SaveError>>("autosave")
        }
    };
    autosave.forget_then(&dispatcher, |name| println!("{name} done"));

    for frame in 0..30 {
        thread::sleep(Duration::from_millis(16));
        if frame == 20 {
            token.cancel();
        }
        main_loop.run_pending();
    }
    Ok(())
}
