//! Read-only directory of MPE rig computers
//!
//! The topology service returns three id tables (`comp_ids`, `rig_ids`,
//! `cluster_ids`). Only the first two are indexed.

use crate::settings::TopologySettings;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;
use tracing::debug;

/// Topology lookup error
#[derive(Debug, Error)]
pub enum TopologyError {
    /// Request failed or the payload could not be decoded
    #[error("Topology service request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// No rig index given and this computer is not attached to a rig
    #[error("Rig index not specified and not running on a rig")]
    NotOnRig,

    /// Computer id has no entry in the directory
    #[error("Unknown computer id: {0}")]
    UnknownComputer(String),
}

/// Raw payload of the topology service
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TopologyPayload {
    #[serde(default)]
    pub comp_ids: BTreeMap<String, ComputerEntry>,
    #[serde(default)]
    pub rig_ids: BTreeMap<String, RigEntry>,
    #[serde(default)]
    pub cluster_ids: serde_json::Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ComputerEntry {
    pub hostname: String,
    pub rig_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RigEntry {
    pub comp_ids: Vec<String>,
}

/// Indexed lookups over a [`TopologyPayload`]
#[derive(Debug, Clone, Default)]
pub struct ComputerDirectory {
    rig_to_comps: HashMap<String, Vec<String>>,
    comp_to_hostname: HashMap<String, String>,
    hostname_to_comp: HashMap<String, String>,
    comp_to_rig: HashMap<String, String>,
}

impl ComputerDirectory {
    pub fn from_payload(payload: TopologyPayload) -> Self {
        let rig_to_comps = payload
            .rig_ids
            .into_iter()
            .map(|(rig, entry)| (rig, entry.comp_ids))
            .collect();

        let mut comp_to_hostname = HashMap::new();
        let mut hostname_to_comp = HashMap::new();
        let mut comp_to_rig = HashMap::new();
        for (comp, entry) in payload.comp_ids {
            let hostname = entry.hostname.to_uppercase();
            hostname_to_comp.insert(hostname.clone(), comp.clone());
            if let Some(rig) = entry.rig_id.filter(|r| !r.is_empty()) {
                comp_to_rig.insert(comp.clone(), rig);
            }
            comp_to_hostname.insert(comp, hostname);
        }

        Self {
            rig_to_comps,
            comp_to_hostname,
            hostname_to_comp,
            comp_to_rig,
        }
    }

    /// Computer ids attached to `rig_id` (e.g. `NP.1` → `NP.1-Acq`, ...).
    pub fn comp_ids(&self, rig_id: &str) -> &[String] {
        self.rig_to_comps
            .get(rig_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Upper-cased hostname of `comp_id`.
    pub fn hostname(&self, comp_id: &str) -> Option<&str> {
        self.comp_to_hostname.get(comp_id).map(String::as_str)
    }

    /// Computer id whose hostname matches, case-insensitively.
    pub fn comp_id_for_hostname(&self, hostname: &str) -> Option<&str> {
        self.hostname_to_comp
            .get(&hostname.to_uppercase())
            .map(String::as_str)
    }

    pub fn rig_id(&self, comp_id: &str) -> Option<&str> {
        self.comp_to_rig.get(comp_id).map(String::as_str)
    }
}

/// Fetch and index the directory from the topology service.
pub fn fetch_directory(settings: &TopologySettings) -> Result<ComputerDirectory, TopologyError> {
    let client = reqwest::blocking::Client::builder()
        .timeout(settings.timeout())
        .build()?;
    let payload: TopologyPayload = client
        .get(&settings.server_url)
        .send()?
        .error_for_status()?
        .json()?;
    debug!(
        "Loaded {} computers and {} rigs from {}",
        payload.comp_ids.len(),
        payload.rig_ids.len(),
        settings.server_url
    );
    Ok(ComputerDirectory::from_payload(payload))
}
