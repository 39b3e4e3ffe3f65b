//! Dispatch topic selection

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::config::TopicsConfig;
use crate::error::{Result, SubmitError};

/// Picks the queue topic a task's records are dispatched to
pub trait TopicSelector: Send + Sync {
    fn select(&self, topology_name: &str) -> Result<String>;
}

/// Rotates through each topology's topics in configuration order
pub struct RoundRobinTopicSelector {
    topics: HashMap<String, (Vec<String>, AtomicUsize)>,
}

impl RoundRobinTopicSelector {
    pub fn new(config: &TopicsConfig) -> Self {
        let topics = config
            .by_topology
            .iter()
            .filter(|(_, topics)| !topics.is_empty())
            .map(|(topology, topics)| (topology.clone(), (topics.clone(), AtomicUsize::new(0))))
            .collect();
        Self { topics }
    }
}

impl TopicSelector for RoundRobinTopicSelector {
    fn select(&self, topology_name: &str) -> Result<String> {
        let (topics, cursor) = self
            .topics
            .get(topology_name)
            .ok_or_else(|| SubmitError::NoTopic(topology_name.to_string()))?;
        let next = cursor.fetch_add(1, Ordering::Relaxed) % topics.len();
        Ok(topics[next].clone())
    }
}
