//! Chronik Kafka cluster model
//!
//! Turns a `ChronikKafka` resource into the pieces the operator deploys:
//! reconciled storage, resolved listeners, certificate identities and
//! rendered broker configuration. Everything here is pure and synchronous;
//! the control loop that applies the results lives elsewhere.

pub mod certificates;
pub mod config_generator;
pub mod constants;
pub mod crds;
pub mod environment;
pub mod error;
pub mod listeners;
pub mod model;
pub mod resources;
pub mod storage;
pub mod topology;

pub use crds::ChronikKafka;
pub use error::{ModelError, Result};
pub use model::{KafkaCluster, PreviousState, ZookeeperCluster};
