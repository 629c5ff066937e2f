use serde::{Deserialize, Serialize};

/// Width of a log-emitting address key.
pub const ADDRESS_LEN: usize = 20;

/// Width of a log topic key.
pub const TOPIC_LEN: usize = 32;

/// A log-emitting contract address.
pub type Address = [u8; ADDRESS_LEN];

/// A log topic.
pub type Topic = [u8; TOPIC_LEN];

/// A single emitted log. The engine only consumes the address and topic
/// bytes; payload data never enters the index.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Log {
    pub address: Address,
    pub topics: Vec<Topic>,
}

impl Log {
    pub fn new(address: Address, topics: Vec<Topic>) -> Self {
        Self { address, topics }
    }
}

/// The receipt of one executed transaction: the logs it emitted.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub logs: Vec<Log>,
}

impl Receipt {
    pub fn new(logs: Vec<Log>) -> Self {
        Self { logs }
    }
}
