//! Measure definitions as seen by the job subsystem
//!
//! Only the data sources and their connectors matter here; the measure rules
//! themselves are owned by the measure subsystem.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use super::job::MeasureId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataConnector {
    pub name: String,
    pub connector_type: String,
    pub version: Option<String>,
    pub config: HashMap<String, String>,
}

impl DataConnector {
    pub fn new(name: impl Into<String>, connector_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            connector_type: connector_type.into(),
            version: None,
            config: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSource {
    pub name: String,
    pub connectors: Vec<DataConnector>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measure {
    pub id: MeasureId,
    pub name: String,
    pub owner: Option<String>,
    pub organization: Option<String>,
    pub data_sources: Vec<DataSource>,
    pub deleted: bool,
}

impl Measure {
    pub fn new(name: impl Into<String>, data_sources: Vec<DataSource>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            owner: None,
            organization: None,
            data_sources,
            deleted: false,
        }
    }

    /// Convenience constructor: one data source per connector name
    pub fn with_connectors(name: impl Into<String>, connector_names: &[&str]) -> Self {
        let data_sources = connector_names
            .iter()
            .map(|connector| DataSource {
                name: format!("{}_source", connector),
                connectors: vec![DataConnector::new(*connector, "hive")],
            })
            .collect();
        Self::new(name, data_sources)
    }

    /// All connector names in declaration order, duplicates included
    pub fn connector_names(&self) -> impl Iterator<Item = &str> {
        self.data_sources
            .iter()
            .flat_map(|source| source.connectors.iter().map(|c| c.name.as_str()))
    }
}
