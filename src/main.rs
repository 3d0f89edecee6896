use anyhow::Result;
use clap::Parser;

use spanserve::config::{Args, Config};
use spanserve::server;

fn main() -> Result<()> {
    let config = Config::from_args(Args::parse());
    server::run(config)
}
