use std::env;

use drawdown::api::{self, RunError};

#[tokio::main]
async fn main() {
    api::init_tracing();

    let raw_args: Vec<String> = env::args().collect();
    if raw_args.get(1).map(|s| s.as_str()) == Some("serve") {
        let port = raw_args
            .get(2)
            .and_then(|s| s.parse::<u16>().ok())
            .unwrap_or(8080);
        if let Err(e) = api::run_http_server(port).await {
            eprintln!("Server error: {e}");
            std::process::exit(1);
        }
        return;
    }

    match api::run_cli(raw_args) {
        Ok(json) => println!("{json}"),
        Err(RunError::Usage(e)) => e.exit(),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(2);
        }
    }
}
