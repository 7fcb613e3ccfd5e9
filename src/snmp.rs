// Forwarding tables over SNMP, walked with the net-snmp command line tools.
//
// Three tables are combined:
//   dot1dTpFdbPort        MAC (last six OID arcs) -> bridge port
//   dot1dBasePortIfIndex  bridge port -> ifIndex
//   ifName                ifIndex -> interface name

use std::collections::HashMap;
use std::process::Stdio;

use async_trait::async_trait;
use log::{debug, trace};
use regex::Regex;
use tokio::process::Command;

use crate::address::MacAddress;
use crate::error::{Result, TrackerError};
use crate::inventory::Switch;
use crate::reconcile::Observations;

pub(crate) const FDB_PORT_OID: &str = "1.3.6.1.2.1.17.4.3.1.2";
pub(crate) const PORT_IFINDEX_OID: &str = "1.3.6.1.2.1.17.1.4.1.2";
pub(crate) const IFNAME_OID: &str = "1.3.6.1.2.1.31.1.1.1.1";

/// Produces the MACs a switch currently has learned, with their interface.
#[async_trait]
pub trait ObservationSource: Send + Sync {
    async fn observe(&self, switch: &Switch) -> Result<Observations>;
}

/// One walked row: OID arcs below the table root, and the value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct WalkRow {
    pub(crate) index: String,
    pub(crate) value: String,
}

/// Walks tables by running `snmpbulkwalk` (or a compatible command).
pub struct SnmpWalker {
    command: String,
    community: String,
    line: Regex,
}

impl SnmpWalker {
    pub fn new(command: &str, community: &str) -> Result<Self> {
        // `-On -Oq` output: numeric OID, whitespace, bare value.
        let line = Regex::new(r"^\.?(\d+(?:\.\d+)*)\s+(.*)$")
            .map_err(|e| TrackerError::Config(e.to_string()))?;
        Ok(SnmpWalker {
            command: command.to_string(),
            community: community.to_string(),
            line,
        })
    }

    async fn walk(&self, switch: &Switch, oid: &str) -> Result<Vec<WalkRow>> {
        trace!("[{}] walking {}", switch.name, oid);
        let output = Command::new(&self.command)
            .args(["-v2c", "-c", &self.community, "-On", "-Oq"])
            .arg(&switch.address)
            .arg(oid)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| TrackerError::Scan {
                switch: switch.name.clone(),
                message: format!("failed to run {}: {}", self.command, e),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_failure(&switch.name, &stderr));
        }
        Ok(parse_walk(
            &self.line,
            oid,
            &String::from_utf8_lossy(&output.stdout),
        ))
    }
}

#[async_trait]
impl ObservationSource for SnmpWalker {
    async fn observe(&self, switch: &Switch) -> Result<Observations> {
        let ports = self.walk(switch, PORT_IFINDEX_OID).await?;
        let names = self.walk(switch, IFNAME_OID).await?;
        let fdb = self.walk(switch, FDB_PORT_OID).await?;
        let table = forwarding_table(&ports, &names, &fdb);
        debug!("[{}] {} MACs in forwarding table", switch.name, table.len());
        Ok(table)
    }
}

fn classify_failure(switch: &str, stderr: &str) -> TrackerError {
    let lowered = stderr.to_ascii_lowercase();
    if lowered.contains("timeout") {
        TrackerError::ScanTimeout {
            switch: switch.to_string(),
        }
    } else if lowered.contains("authentication")
        || lowered.contains("authorization")
        || lowered.contains("unknown user name")
    {
        TrackerError::ScanAuthFailure {
            switch: switch.to_string(),
        }
    } else {
        TrackerError::Scan {
            switch: switch.to_string(),
            message: stderr.trim().to_string(),
        }
    }
}

// Keep rows under `root`; anything else (end-of-MIB notices, neighbouring
// tables) is dropped.
pub(crate) fn parse_walk(line: &Regex, root: &str, stdout: &str) -> Vec<WalkRow> {
    let prefix = format!("{}.", root);
    stdout
        .lines()
        .filter_map(|l| line.captures(l.trim()))
        .filter_map(|captures| {
            let index = captures[1].strip_prefix(&prefix)?.to_string();
            let value = captures[2].trim().trim_matches('"').to_string();
            Some(WalkRow { index, value })
        })
        .collect()
}

fn mac_from_index(index: &str) -> Option<MacAddress> {
    let arcs: Vec<u8> = index
        .split('.')
        .map(|arc| arc.parse::<u8>().ok())
        .collect::<Option<_>>()?;
    let octets: [u8; 6] = arcs.try_into().ok()?;
    Some(MacAddress::from_octets(octets))
}

/// Join the three walked tables into MAC -> interface name.
pub(crate) fn forwarding_table(
    ports: &[WalkRow],
    names: &[WalkRow],
    fdb: &[WalkRow],
) -> Observations {
    let port_ifindex: HashMap<u32, u32> = ports
        .iter()
        .filter_map(|row| Some((row.index.parse().ok()?, row.value.parse().ok()?)))
        .collect();
    let ifnames: HashMap<u32, &str> = names
        .iter()
        .filter_map(|row| Some((row.index.parse().ok()?, row.value.as_str())))
        .collect();

    let mut table = Observations::new();
    for row in fdb {
        let (Some(mac), Ok(port)) = (mac_from_index(&row.index), row.value.parse::<u32>()) else {
            trace!("skipping unparseable fdb row {:?}", row);
            continue;
        };
        // Ports without an ifIndex (CPU, internal) are not attachment points.
        let Some(ifindex) = port_ifindex.get(&port) else {
            continue;
        };
        let interface = match ifnames.get(ifindex) {
            Some(name) => name.to_string(),
            None => format!("ifIndex-{}", ifindex),
        };
        table.insert(mac, interface);
    }
    table
}
