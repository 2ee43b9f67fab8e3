use amqp_arrow::config::{ArrowConfig, Operation};
use amqp_arrow::driver::Arrow;
use amqp_arrow::harness::HarnessEngine;
use amqp_arrow::transfer::{Counters, StdoutSink};
use tracing::{info, Level};

fn init_logging() {
    // stdout carries the timing records, logs go to stderr
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(Level::INFO)
        // .with_max_level(Level::DEBUG)
        // .with_max_level(Level::TRACE)
        .try_init()
        .ok();
}

async fn run(args: &[String]) -> anyhow::Result<Counters> {
    let config = ArrowConfig::parse(args)?;
    config.validate()?;

    let engine = match config.operation {
        Operation::Send => HarnessEngine::accepting_peer(config.credit_window),
        Operation::Receive => {
            let limit = match config.desired_count {
                0 => None,
                n => Some(n),
            };
            HarnessEngine::generating_peer(limit, config.body_size, config.durable)
        }
    };

    let mut arrow = Arrow::new(config, engine, StdoutSink::new());
    arrow.run().await
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();

    // the harness probes each implementation by running it without arguments
    if args.is_empty() {
        println!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
        return;
    }

    init_logging();

    match run(&args).await {
        Ok(counters) => {
            info!(
                "done: sent={} received={} acknowledged={}",
                counters.sent, counters.received, counters.acknowledged
            );
        }
        Err(e) => {
            eprintln!("arrow: {:#}", e);
            std::process::exit(1);
        }
    }
}
