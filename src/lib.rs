pub mod client;
pub mod config;
pub mod controller;
pub mod error;
pub mod executor;
pub mod fleet;
pub mod location;
pub mod mock;
pub mod operations;
pub mod session;
pub mod transport;
pub mod types;

pub use client::Client;
pub use controller::Controller;
pub use error::{Error, Result};
pub use fleet::{Fleet, FleetObserver, FleetSettings, PollOutcome};
pub use location::{FleetScope, Location, LocationRegistry};
pub use transport::{HttpTransport, Transport};
pub use types::{Credentials, FanMode, Mode, TemperatureUnit};
