// Persistent state: one current location per MAC plus an append-only log of
// moves. Two backends implement the same contract.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::info;

use crate::address::{normalize, HexFragment, MacAddress};
use crate::config::{Backend, Config};
use crate::error::{Result, TrackerError};

#[cfg(test)]
#[macro_use]
pub(crate) mod contract;
pub mod document;
pub mod relational;

pub use document::DocumentStore;
pub use relational::RelationalStore;

/// Where a MAC was most recently observed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CurrentLocation {
    pub mac: MacAddress,
    pub device: String,
    pub interface: String,
    /// Set on first observation, never changed afterwards.
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// A detected change of (device, interface) for a known MAC.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MoveEvent {
    pub mac: MacAddress,
    pub from_device: String,
    pub from_interface: String,
    pub to_device: String,
    pub to_interface: String,
    pub moved_at: DateTime<Utc>,
}

/// Backend-agnostic storage contract used by reconciliation and lookup.
///
/// Every operation is atomic for a single record. `apply_move` is the only
/// multi-record write; backends that can't wrap it in a transaction keep the
/// default, which writes history before the current location so a partial
/// failure can only understate a move, never invent one.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn get_current(&self, mac: &MacAddress) -> Result<Option<CurrentLocation>>;

    /// Insert, or overwrite the record with the same `mac`.
    async fn upsert_current(&self, location: &CurrentLocation) -> Result<()>;

    /// Insert only; existing history is never touched.
    async fn append_move(&self, event: &MoveEvent) -> Result<()>;

    /// Current locations whose address digits contain `fragment`, most
    /// recently seen first.
    async fn find_current_by_prefix(&self, fragment: &HexFragment) -> Result<Vec<CurrentLocation>>;

    /// Move history for one MAC, oldest first.
    async fn history_for(&self, mac: &MacAddress) -> Result<Vec<MoveEvent>>;

    async fn apply_move(&self, event: &MoveEvent, location: &CurrentLocation) -> Result<()> {
        self.append_move(event).await?;
        self.upsert_current(location).await
    }
}

/// Open the backend selected in the configuration.
pub async fn connect(config: &Config) -> Result<Box<dyn StateStore>> {
    match config.backend {
        Backend::Relational => {
            info!("connecting to relational store");
            Ok(Box::new(RelationalStore::connect(&config.database_url).await?))
        }
        Backend::Document => {
            let uri = config.mongo_uri.as_deref().ok_or_else(|| {
                TrackerError::Config("backend \"document\" requires mongo_uri".to_string())
            })?;
            info!("connecting to document store {}", config.mongo_database);
            Ok(Box::new(
                DocumentStore::connect(uri, &config.mongo_database).await?,
            ))
        }
    }
}

// Stored addresses are written canonical. A row that is not, even if it
// parses, would never be found by an exact lookup: it is reported as a
// corrupt record.
pub(crate) fn stored_mac(mac: &str) -> Result<MacAddress> {
    let rejected = |message: &str| TrackerError::StoreRejected {
        mac: mac.to_string(),
        message: message.to_string(),
    };
    let canonical = normalize(mac).map_err(|_| rejected("stored address is not a valid MAC"))?;
    if canonical != mac {
        return Err(rejected("stored address is not in canonical form"));
    }
    canonical
        .parse()
        .map_err(|_| rejected("stored address is not a valid MAC"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::contract::{at, location};
    use crate::reconcile::tests::FaultyStore;

    #[test]
    fn stored_addresses_must_be_canonical() {
        assert_eq!(
            stored_mac("aa:bb:cc:dd:ee:ff").unwrap().to_string(),
            "aa:bb:cc:dd:ee:ff"
        );
        for corrupt in ["AA:BB:CC:DD:EE:FF", "aabb.ccdd.eeff", "not a mac"] {
            assert!(matches!(
                stored_mac(corrupt),
                Err(TrackerError::StoreRejected { .. })
            ));
        }
    }

    #[tokio::test]
    async fn default_apply_move_writes_history_before_location() {
        let before = location("aa:bb:cc:dd:ee:ff", "Gi1/0/1", at(1));
        let store = FaultyStore::rejecting(before.mac);
        store.locations.lock().unwrap().push(before.clone());

        let after = CurrentLocation {
            interface: "Gi1/0/3".to_string(),
            last_seen: at(3),
            ..before.clone()
        };
        let event = MoveEvent {
            mac: before.mac,
            from_device: before.device.clone(),
            from_interface: before.interface.clone(),
            to_device: after.device.clone(),
            to_interface: after.interface.clone(),
            moved_at: at(3),
        };
        let err = store.apply_move(&event, &after).await.unwrap_err();
        assert!(matches!(err, TrackerError::StoreRejected { .. }));

        // The move is recorded; the location still shows where it was.
        assert_eq!(store.history_for(&before.mac).await.unwrap(), vec![event]);
        assert_eq!(store.get_current(&before.mac).await.unwrap(), Some(before));
    }
}
