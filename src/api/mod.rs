//! Broker access: the `Broker` capability, the OANDA REST adapter, and a
//! paper-trading wrapper.

mod broker;
mod oanda_client;
mod paper;
mod types;

pub use broker::{Broker, OrderRequest};
pub use oanda_client::{Environment, OandaClient};
pub use paper::PaperBroker;
