use crate::cli::run;

pub mod cli;
mod config;
pub mod domain;
pub mod http;
mod public_endpoint;
pub mod session;
pub mod storage;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run() {
        log::error!("{e:#}");
        std::process::exit(1);
    }
}
