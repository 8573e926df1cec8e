use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A named group of hosts; each host belongs to at most one aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aggregate {
    pub name: String,
    pub hosts: Vec<String>,
}

/// The cached representation: `host_name -> aggregate_name`.
pub type AggregateIndex = HashMap<String, String>;

/// Build the `host_name -> aggregate_name` index from the list form the
/// cloud adapter returns.
pub fn index_by_host(aggregates: &[Aggregate]) -> AggregateIndex {
    let mut index = HashMap::new();
    for agg in aggregates {
        for host in &agg.hosts {
            index.insert(host.clone(), agg.name.clone());
        }
    }
    index
}
