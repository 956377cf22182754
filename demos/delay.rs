use std::time::Duration;

use taskflow::{CancellationToken, Delay, TaskExt, TimeBase, delay_secs};
use tokio::time::sleep;

#[tokio::main]
async fn main() {
    env_logger::init();

    let future = async {
        println!("Start");
        sleep(Duration::from_millis(25)).await;
        println!("End");
    };

    let delayed = future
        .after(Delay::secs(2.0, TimeBase::Realtime))
        .log("delayed future finished");

    tokio::spawn(async move {
        if delayed.await.is_err() {
            println!("Delay was canceled");
        }
    })
    .await
    .unwrap();

    let token = CancellationToken::new();
    let token_cl = token.clone();
    tokio::spawn(async move {
        sleep(Duration::from_millis(500)).await;
        token_cl.cancel();
    });

    let r = delay_secs(10.0, TimeBase::Realtime, &token).await;
    println!("Long delay settled with {r:?}");
}
