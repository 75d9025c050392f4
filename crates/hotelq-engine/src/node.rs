use std::fmt;
use std::sync::Arc;

use hotelq_core::{Aggregator, Extractor, SearchOperation};
use serde::Serialize;

use crate::error::{EngineError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Extractor,
    SearchOperation,
    Aggregator,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Extractor => "extractor",
            Self::SearchOperation => "search_operation",
            Self::Aggregator => "aggregator",
        })
    }
}

#[derive(Clone)]
pub enum Node {
    Extractor(Arc<dyn Extractor>),
    SearchOperation(Arc<dyn SearchOperation>),
    Aggregator(Arc<dyn Aggregator>),
}

impl Node {
    pub fn kind(&self) -> NodeKind {
        match self {
            Self::Extractor(_) => NodeKind::Extractor,
            Self::SearchOperation(_) => NodeKind::SearchOperation,
            Self::Aggregator(_) => NodeKind::Aggregator,
        }
    }
}

/// Named nodes in registration order. Names are unique within a kind.
#[derive(Clone, Default)]
pub struct Registry {
    entries: Vec<(String, Node)>,
}

impl Registry {
    pub fn insert(&mut self, name: impl Into<String>, node: Node) -> Result<()> {
        let name = name.into();
        let kind = node.kind();
        if self.entries.iter().any(|(n, existing)| *n == name && existing.kind() == kind) {
            return Err(EngineError::DuplicateComponent(format!("{kind} '{name}'")));
        }
        if kind == NodeKind::Aggregator && self.aggregator().is_some() {
            return Err(EngineError::DuplicateComponent("aggregator".into()));
        }
        self.entries.push((name, node));
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, NodeKind)> {
        self.entries.iter().map(|(n, node)| (n.as_str(), node.kind()))
    }

    pub fn extractors(&self) -> impl Iterator<Item = &Arc<dyn Extractor>> {
        self.entries.iter().filter_map(|(_, n)| match n {
            Node::Extractor(e) => Some(e),
            _ => None,
        })
    }

    pub fn operations(&self) -> impl Iterator<Item = &Arc<dyn SearchOperation>> {
        self.entries.iter().filter_map(|(_, n)| match n {
            Node::SearchOperation(op) => Some(op),
            _ => None,
        })
    }

    pub fn operation(&self, name: &str) -> Option<&Arc<dyn SearchOperation>> {
        self.operations().find(|op| op.name() == name)
    }

    pub fn aggregator(&self) -> Option<&Arc<dyn Aggregator>> {
        self.entries.iter().find_map(|(_, n)| match n {
            Node::Aggregator(a) => Some(a),
            _ => None,
        })
    }
}
