//! Identity of the computer this process runs on

use super::topology::ComputerDirectory;
use tracing::{debug, info};

const TEST_RIG_ID: &str = "BTVTest.1";

/// Computer and rig ids for the local machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalIdentity {
    /// Upper-cased local hostname
    pub hostname: String,
    /// MPE computer id (`NP.1-Acq`), or the hostname off-rig
    pub comp_id: String,
    /// MPE rig id (`NP.1`), if attached to a rig
    pub rig_id: Option<String>,
    /// `<n>` of an `NP.<n>` rig id
    pub rig_idx: Option<u32>,
}

impl LocalIdentity {
    /// Work out the local identity.
    ///
    /// `env` looks up environment variables; `AIBS_COMP_ID`, `AIBS_RIG_ID`
    /// and `USE_TEST_RIG` are consulted. Empty values count as unset.
    pub fn resolve<F>(directory: Option<&ComputerDirectory>, hostname: &str, env: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = |name: &str| env(name).filter(|v| !v.is_empty());
        let hostname = hostname.to_uppercase();

        let comp_id = directory
            .and_then(|d| d.comp_id_for_hostname(&hostname))
            .map(str::to_string)
            .or_else(|| env("AIBS_COMP_ID"))
            .unwrap_or_else(|| hostname.clone());

        let rig_id = env("AIBS_RIG_ID")
            .map(|id| id.to_uppercase())
            .or_else(|| {
                directory
                    .and_then(|d| d.rig_id(&comp_id))
                    .map(str::to_string)
            })
            .or_else(|| find_np_rig(&comp_id).map(|(id, _)| id))
            .or_else(|| env("USE_TEST_RIG").map(|_| TEST_RIG_ID.to_string()));

        let rig_idx = rig_id
            .as_deref()
            .filter(|id| id.contains("NP."))
            .and_then(find_np_rig)
            .map(|(_, idx)| idx);

        match &rig_id {
            Some(rig) => info!("Running from {comp_id}, connected to {rig}"),
            None => {
                debug!("Not running from an NP rig. To use {TEST_RIG_ID}, set USE_TEST_RIG=1");
                info!("Running from {comp_id}, not connected to a rig");
            }
        }

        Self {
            hostname,
            comp_id,
            rig_id,
            rig_idx,
        }
    }

    /// Resolve from the real hostname and process environment.
    pub fn from_environment(directory: Option<&ComputerDirectory>) -> Self {
        let hostname = hostname::get()
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self::resolve(directory, &hostname, |name| std::env::var(name).ok())
    }
}

/// First `NP<any char><digits>` in `text`, returned with its digits.
fn find_np_rig(text: &str) -> Option<(String, u32)> {
    for (start, _) in text.match_indices("NP") {
        let rest = &text[start + 2..];
        let Some(sep) = rest.chars().next() else {
            continue;
        };
        let digits_start = start + 2 + sep.len_utf8();
        let digits: &str = &text[digits_start..];
        let len = digits.bytes().take_while(u8::is_ascii_digit).count();
        if len == 0 {
            continue;
        }
        let Ok(idx) = digits[..len].parse() else {
            continue;
        };
        return Some((text[start..digits_start + len].to_string(), idx));
    }
    None
}
