//! Rig computer hostnames and rig-wide configs
//!
//! ```no_run
//! use np_config::rigs::{Rig, RigComputer, fetch_directory};
//! # fn demo(ctx: &np_config::ConfigContext) -> Result<(), Box<dyn std::error::Error>> {
//! let directory = fetch_directory(&ctx.settings().topology)?;
//! let rig = Rig::new(1);
//! assert_eq!(rig.id(), "NP.1");
//! let acq = rig.hostname(&directory, RigComputer::Acq)?;
//! let config = rig.config(ctx)?; // from /rigs/NP.1
//! # Ok(())
//! # }
//! ```

mod identity;
mod topology;

pub use identity::LocalIdentity;
pub use topology::{
    ComputerDirectory, ComputerEntry, RigEntry, TopologyError, TopologyPayload, fetch_directory,
};

use crate::codec::ConfigMap;
use crate::context::ConfigContext;
use crate::resolver;
use crate::store::StoreError;
use std::fmt;

/// Computers attached to every NP rig
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RigComputer {
    Sync,
    Mon,
    Acq,
    Stim,
}

impl RigComputer {
    pub const ALL: [Self; 4] = [Self::Sync, Self::Mon, Self::Acq, Self::Stim];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sync => "Sync",
            Self::Mon => "Mon",
            Self::Acq => "Acq",
            Self::Stim => "Stim",
        }
    }
}

impl fmt::Display for RigComputer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One NP rig, identified by its index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rig {
    idx: u32,
    id: String,
}

impl Rig {
    pub fn new(idx: u32) -> Self {
        Self {
            idx,
            id: format!("NP.{idx}"),
        }
    }

    /// The rig this computer is attached to.
    ///
    /// # Errors
    ///
    /// Returns `TopologyError::NotOnRig` if the identity has no NP index.
    pub fn current(identity: &LocalIdentity) -> Result<Self, TopologyError> {
        identity.rig_idx.map(Self::new).ok_or(TopologyError::NotOnRig)
    }

    pub fn idx(&self) -> u32 {
        self.idx
    }

    /// MPE rig id, e.g. `NP.1`
    pub fn id(&self) -> &str {
        &self.id
    }

    /// MPE computer id of `computer` on this rig, e.g. `NP.1-Acq`
    pub fn comp_id(&self, computer: RigComputer) -> String {
        format!("{}-{computer}", self.id)
    }

    /// Hostname of `computer` on this rig.
    pub fn hostname<'d>(
        &self,
        directory: &'d ComputerDirectory,
        computer: RigComputer,
    ) -> Result<&'d str, TopologyError> {
        let comp_id = self.comp_id(computer);
        directory
            .hostname(&comp_id)
            .ok_or(TopologyError::UnknownComputer(comp_id))
    }

    /// Coordination-service key of the rig-wide config
    pub fn config_key(&self) -> String {
        format!("/rigs/{}", self.id)
    }

    /// Rig-wide config, read through the resolver.
    pub fn config(&self, ctx: &ConfigContext) -> Result<ConfigMap, StoreError> {
        resolver::from_zk(ctx, &self.config_key())
    }
}
