// src/main.rs

use watchflow::{cli, run};

#[tokio::main]
async fn main() {
    if let Err(err) = run(cli::parse()).await {
        eprintln!("watchflow error: {err:?}");
        std::process::exit(1);
    }
}
