#![allow(dead_code)]

mod d2d_server;
mod simulated_tv;

pub use d2d_server::{d2d_frame, D2dServer};
pub use simulated_tv::{d2d_message, Reply, SimulatedTv, Startup};

use samsung_frame::ConnectionConfig;

use std::time::Duration;

/// Start the logger once per test binary
pub fn init_logger() {
    if let Err(e) = pretty_env_logger::try_init() {
        log::warn!(target: "test::support::init_logger", "Logger init() returned '{}'", e);
    }
}

/// Client settings for a simulated TV on `port`, without key press delays
pub fn test_config(port: u16) -> ConnectionConfig {
    ConnectionConfig::new("127.0.0.1")
        .with_port(port)
        .with_timeout(Some(Duration::from_secs(2)))
        .with_key_press_delay(Duration::ZERO)
}

/// Random data helpers
pub mod rand_data {
    use rand::{distributions::Alphanumeric, Rng};

    pub fn string(len: usize) -> String {
        rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .map(char::from)
            .take(len)
            .collect()
    }

    pub fn bytes(len: usize) -> Vec<u8> {
        let mut rng = rand::thread_rng();
        (0..len).map(|_| rng.gen()).collect()
    }

    pub fn token() -> String {
        rand::thread_rng().gen_range(10_000_000..100_000_000u32).to_string()
    }
}
