// sea-orm backed store, SQLite or PostgreSQL depending on the URL.

use async_trait::async_trait;
use log::{debug, trace};
use sea_orm::sea_query::OnConflict;
use sea_orm::*;

use mactrack_entity::{mac_address, mac_movement};
use mactrack_migration::{Migrator, MigratorTrait};

use crate::address::{HexFragment, MacAddress};
use crate::db::{stored_mac, CurrentLocation, MoveEvent, StateStore};
use crate::error::{Result, TrackerError};

pub struct RelationalStore {
    db: DatabaseConnection,
}

impl RelationalStore {
    /// Connect and bring the schema up to date.
    pub async fn connect<C: Into<ConnectOptions>>(options: C) -> Result<Self> {
        let db = Database::connect(options)
            .await
            .map_err(|e| TrackerError::StoreUnavailable(e.to_string()))?;
        Migrator::up(&db, None)
            .await
            .map_err(|e| TrackerError::StoreUnavailable(format!("migration failed: {}", e)))?;
        debug!("relational store ready ({:?})", db.get_database_backend());
        Ok(RelationalStore { db })
    }
}

// Connection-level failures end the run, anything else only fails the record.
fn store_error(mac: &str, err: DbErr) -> TrackerError {
    match err {
        DbErr::Conn(_) | DbErr::ConnectionAcquire { .. } => {
            TrackerError::StoreUnavailable(err.to_string())
        }
        _ => TrackerError::StoreRejected {
            mac: mac.to_string(),
            message: err.to_string(),
        },
    }
}

impl TryFrom<mac_address::Model> for CurrentLocation {
    type Error = TrackerError;

    fn try_from(row: mac_address::Model) -> Result<Self> {
        Ok(CurrentLocation {
            mac: stored_mac(&row.mac)?,
            device: row.device,
            interface: row.interface,
            first_seen: row.first_seen,
            last_seen: row.last_seen,
        })
    }
}

impl TryFrom<mac_movement::Model> for MoveEvent {
    type Error = TrackerError;

    fn try_from(row: mac_movement::Model) -> Result<Self> {
        Ok(MoveEvent {
            mac: stored_mac(&row.mac)?,
            from_device: row.from_device,
            from_interface: row.from_if,
            to_device: row.to_device,
            to_interface: row.to_if,
            moved_at: row.moved_at,
        })
    }
}

async fn upsert<C: ConnectionTrait>(conn: &C, location: &CurrentLocation) -> Result<()> {
    let mac = location.mac.to_string();
    trace!("upsert mac_addresses {}", mac);
    let row = mac_address::ActiveModel {
        mac: Set(mac.clone()),
        device: Set(location.device.clone()),
        interface: Set(location.interface.clone()),
        first_seen: Set(location.first_seen),
        last_seen: Set(location.last_seen),
        ..Default::default()
    };
    mac_address::Entity::insert(row)
        .on_conflict(
            OnConflict::column(mac_address::Column::Mac)
                .update_columns([
                    mac_address::Column::Device,
                    mac_address::Column::Interface,
                    mac_address::Column::FirstSeen,
                    mac_address::Column::LastSeen,
                ])
                .to_owned(),
        )
        .exec_without_returning(conn)
        .await
        .map_err(|e| store_error(&mac, e))?;
    Ok(())
}

async fn insert_move<C: ConnectionTrait>(conn: &C, event: &MoveEvent) -> Result<()> {
    let mac = event.mac.to_string();
    trace!("insert mac_movements {}", mac);
    let row = mac_movement::ActiveModel {
        mac: Set(mac.clone()),
        from_device: Set(event.from_device.clone()),
        from_if: Set(event.from_interface.clone()),
        to_device: Set(event.to_device.clone()),
        to_if: Set(event.to_interface.clone()),
        moved_at: Set(event.moved_at),
        ..Default::default()
    };
    mac_movement::Entity::insert(row)
        .exec_without_returning(conn)
        .await
        .map_err(|e| store_error(&mac, e))?;
    Ok(())
}

#[async_trait]
impl StateStore for RelationalStore {
    async fn get_current(&self, mac: &MacAddress) -> Result<Option<CurrentLocation>> {
        let mac = mac.to_string();
        mac_address::Entity::find()
            .filter(mac_address::Column::Mac.eq(mac.as_str()))
            .one(&self.db)
            .await
            .map_err(|e| store_error(&mac, e))?
            .map(CurrentLocation::try_from)
            .transpose()
    }

    async fn upsert_current(&self, location: &CurrentLocation) -> Result<()> {
        upsert(&self.db, location).await
    }

    async fn append_move(&self, event: &MoveEvent) -> Result<()> {
        insert_move(&self.db, event).await
    }

    async fn find_current_by_prefix(&self, fragment: &HexFragment) -> Result<Vec<CurrentLocation>> {
        let condition = fragment
            .patterns()
            .iter()
            .fold(Condition::any(), |condition, pattern| {
                condition.add(mac_address::Column::Mac.contains(pattern.as_str()))
            });
        mac_address::Entity::find()
            .filter(condition)
            .order_by_desc(mac_address::Column::LastSeen)
            .order_by_asc(mac_address::Column::Mac)
            .all(&self.db)
            .await
            .map_err(|e| store_error(fragment.as_str(), e))?
            .into_iter()
            .map(CurrentLocation::try_from)
            .collect()
    }

    async fn history_for(&self, mac: &MacAddress) -> Result<Vec<MoveEvent>> {
        let mac = mac.to_string();
        mac_movement::Entity::find()
            .filter(mac_movement::Column::Mac.eq(mac.as_str()))
            .order_by_asc(mac_movement::Column::MovedAt)
            .order_by_asc(mac_movement::Column::Id)
            .all(&self.db)
            .await
            .map_err(|e| store_error(&mac, e))?
            .into_iter()
            .map(MoveEvent::try_from)
            .collect()
    }

    // Both writes commit together or not at all.
    async fn apply_move(&self, event: &MoveEvent, location: &CurrentLocation) -> Result<()> {
        let mac = event.mac.to_string();
        let txn = self.db.begin().await.map_err(|e| store_error(&mac, e))?;
        insert_move(&txn, event).await?;
        upsert(&txn, location).await?;
        txn.commit().await.map_err(|e| store_error(&mac, e))
    }
}
