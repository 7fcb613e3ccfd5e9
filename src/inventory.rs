// Where the list of switches to scan comes from.

use async_trait::async_trait;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TrackerError};

/// One switch as known to the inventory.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Switch {
    /// Identifier recorded as the `device` of every MAC it reports.
    pub name: String,
    /// Management address used for polling.
    pub address: String,
}

#[async_trait]
pub trait Inventory: Send + Sync {
    async fn switches(&self) -> Result<Vec<Switch>>;
}

/// Switches listed directly in the configuration file.
pub struct StaticInventory {
    switches: Vec<Switch>,
}

impl StaticInventory {
    pub fn new(switches: Vec<Switch>) -> Self {
        StaticInventory { switches }
    }
}

#[async_trait]
impl Inventory for StaticInventory {
    async fn switches(&self) -> Result<Vec<Switch>> {
        Ok(self.switches.clone())
    }
}

/// Devices with a primary IPv4 address, read from the NetBox REST API.
pub struct NetboxInventory {
    client: reqwest::Client,
    url: String,
    token: String,
}

#[derive(Debug, Deserialize)]
struct DevicePage {
    next: Option<String>,
    results: Vec<Device>,
}

#[derive(Debug, Deserialize)]
struct Device {
    name: Option<String>,
    primary_ip4: Option<PrimaryIp>,
}

#[derive(Debug, Deserialize)]
struct PrimaryIp {
    address: String,
}

impl NetboxInventory {
    pub fn new(url: &str, token: &str) -> Self {
        NetboxInventory {
            client: reqwest::Client::new(),
            url: url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        }
    }

    async fn page(&self, url: &str) -> Result<DevicePage> {
        debug!("GET {}", url);
        let inventory_error = |e: reqwest::Error| TrackerError::Inventory(e.to_string());
        self.client
            .get(url)
            .header("Authorization", format!("Token {}", self.token))
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(inventory_error)?
            .error_for_status()
            .map_err(inventory_error)?
            .json::<DevicePage>()
            .await
            .map_err(inventory_error)
    }
}

#[async_trait]
impl Inventory for NetboxInventory {
    async fn switches(&self) -> Result<Vec<Switch>> {
        let mut switches = Vec::new();
        let mut next = Some(format!("{}/api/dcim/devices/?limit=1000", self.url));
        while let Some(url) = next {
            let page = self.page(&url).await?;
            switches.extend(switches_from_devices(page.results));
            next = page.next;
        }
        Ok(switches)
    }
}

// Devices without a primary IPv4 address cannot be polled and are skipped.
fn switches_from_devices(devices: Vec<Device>) -> Vec<Switch> {
    devices
        .into_iter()
        .filter_map(|device| {
            let name = device.name?;
            match device.primary_ip4 {
                Some(ip) => Some(Switch {
                    address: strip_prefix_length(&ip.address).to_string(),
                    name,
                }),
                None => {
                    warn!("{} has no primary IPv4 address, skipping", name);
                    None
                }
            }
        })
        .collect()
}

// NetBox reports interface addresses as `10.0.0.1/24`.
fn strip_prefix_length(address: &str) -> &str {
    address.split('/').next().unwrap_or(address)
}
