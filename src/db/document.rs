// MongoDB backed store.
//
// MongoDB only guarantees atomicity per document, so `apply_move` keeps the
// trait default: the movement is inserted before the location is updated.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use log::debug;
use mongodb::bson::{doc, Bson, Document};
use mongodb::error::ErrorKind;
use mongodb::options::{FindOptions, IndexOptions, UpdateOptions};
use mongodb::{Client, Collection, IndexModel};

use crate::address::{HexFragment, MacAddress};
use crate::db::{stored_mac, CurrentLocation, MoveEvent, StateStore};
use crate::error::{Result, TrackerError};

pub(crate) const LOCATIONS_COLLECTION: &str = "mac_addresses";
pub(crate) const MOVEMENTS_COLLECTION: &str = "mac_movements";

pub struct DocumentStore {
    locations: Collection<Document>,
    movements: Collection<Document>,
}

impl DocumentStore {
    /// Connect, verify the server answers, and create indexes.
    pub async fn connect(uri: &str, database_name: &str) -> Result<Self> {
        let client = Client::with_uri_str(uri).await.map_err(|e| store_error("", e))?;
        let database = client.database(database_name);
        // The driver connects lazily; ping so an unreachable server fails here.
        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| store_error("", e))?;

        let store = DocumentStore {
            locations: database.collection(LOCATIONS_COLLECTION),
            movements: database.collection(MOVEMENTS_COLLECTION),
        };
        store.init().await?;
        debug!("document store ready ({})", database_name);
        Ok(store)
    }

    async fn init(&self) -> Result<()> {
        // Exactly one current location per MAC.
        let unique_mac = IndexModel::builder()
            .keys(doc! { "mac": 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();
        self.locations
            .create_index(unique_mac)
            .await
            .map_err(|e| store_error("", e))?;

        let history = IndexModel::builder()
            .keys(doc! { "mac": 1, "moved_at": 1 })
            .build();
        self.movements
            .create_index(history)
            .await
            .map_err(|e| store_error("", e))?;
        Ok(())
    }
}

fn store_error(mac: &str, err: mongodb::error::Error) -> TrackerError {
    match *err.kind {
        ErrorKind::ServerSelection { .. }
        | ErrorKind::Io(_)
        | ErrorKind::ConnectionPoolCleared { .. }
        | ErrorKind::DnsResolve { .. } => TrackerError::StoreUnavailable(err.to_string()),
        _ => TrackerError::StoreRejected {
            mac: mac.to_string(),
            message: err.to_string(),
        },
    }
}

// BSON dates carry milliseconds.
fn to_bson(timestamp: DateTime<Utc>) -> Bson {
    Bson::DateTime(mongodb::bson::DateTime::from_millis(
        timestamp.timestamp_millis(),
    ))
}

fn field_error(mac: &str, field: &str) -> TrackerError {
    TrackerError::StoreRejected {
        mac: mac.to_string(),
        message: format!("document field {} missing or mistyped", field),
    }
}

fn get_str(document: &Document, mac: &str, field: &str) -> Result<String> {
    document
        .get_str(field)
        .map(str::to_string)
        .map_err(|_| field_error(mac, field))
}

fn get_timestamp(document: &Document, mac: &str, field: &str) -> Result<DateTime<Utc>> {
    let millis = document
        .get_datetime(field)
        .map_err(|_| field_error(mac, field))?
        .timestamp_millis();
    Utc.timestamp_millis_opt(millis)
        .single()
        .ok_or_else(|| field_error(mac, field))
}

pub(crate) fn location_document(location: &CurrentLocation) -> Document {
    doc! {
        "mac": location.mac.to_string(),
        "device": &location.device,
        "interface": &location.interface,
        "first_seen": to_bson(location.first_seen),
        "last_seen": to_bson(location.last_seen),
    }
}

pub(crate) fn location_from_document(document: &Document) -> Result<CurrentLocation> {
    let mac = get_str(document, "", "mac")?;
    Ok(CurrentLocation {
        mac: stored_mac(&mac)?,
        device: get_str(document, &mac, "device")?,
        interface: get_str(document, &mac, "interface")?,
        first_seen: get_timestamp(document, &mac, "first_seen")?,
        last_seen: get_timestamp(document, &mac, "last_seen")?,
    })
}

pub(crate) fn movement_document(event: &MoveEvent) -> Document {
    doc! {
        "mac": event.mac.to_string(),
        "from_device": &event.from_device,
        "from_if": &event.from_interface,
        "to_device": &event.to_device,
        "to_if": &event.to_interface,
        "moved_at": to_bson(event.moved_at),
    }
}

pub(crate) fn movement_from_document(document: &Document) -> Result<MoveEvent> {
    let mac = get_str(document, "", "mac")?;
    Ok(MoveEvent {
        mac: stored_mac(&mac)?,
        from_device: get_str(document, &mac, "from_device")?,
        from_interface: get_str(document, &mac, "from_if")?,
        to_device: get_str(document, &mac, "to_device")?,
        to_interface: get_str(document, &mac, "to_if")?,
        moved_at: get_timestamp(document, &mac, "moved_at")?,
    })
}

// Patterns contain only hex digits and colons, none of which are regex
// metacharacters.
pub(crate) fn fragment_filter(fragment: &HexFragment) -> Document {
    let alternatives: Vec<Document> = fragment
        .patterns()
        .into_iter()
        .map(|pattern| doc! { "mac": { "$regex": pattern } })
        .collect();
    doc! { "$or": alternatives }
}

#[async_trait]
impl StateStore for DocumentStore {
    async fn get_current(&self, mac: &MacAddress) -> Result<Option<CurrentLocation>> {
        let mac = mac.to_string();
        self.locations
            .find_one(doc! { "mac": &mac })
            .await
            .map_err(|e| store_error(&mac, e))?
            .map(|document| location_from_document(&document))
            .transpose()
    }

    async fn upsert_current(&self, location: &CurrentLocation) -> Result<()> {
        let mac = location.mac.to_string();
        let options = UpdateOptions::builder().upsert(true).build();
        self.locations
            .update_one(
                doc! { "mac": &mac },
                doc! { "$set": location_document(location) },
            )
            .with_options(options)
            .await
            .map_err(|e| store_error(&mac, e))?;
        Ok(())
    }

    async fn append_move(&self, event: &MoveEvent) -> Result<()> {
        let mac = event.mac.to_string();
        self.movements
            .insert_one(movement_document(event))
            .await
            .map_err(|e| store_error(&mac, e))?;
        Ok(())
    }

    async fn find_current_by_prefix(&self, fragment: &HexFragment) -> Result<Vec<CurrentLocation>> {
        let options = FindOptions::builder()
            .sort(doc! { "last_seen": -1, "mac": 1 })
            .build();
        let mut cursor = self
            .locations
            .find(fragment_filter(fragment))
            .with_options(options)
            .await
            .map_err(|e| store_error(fragment.as_str(), e))?;

        let mut locations = Vec::new();
        while cursor
            .advance()
            .await
            .map_err(|e| store_error(fragment.as_str(), e))?
        {
            let document = cursor
                .deserialize_current()
                .map_err(|e| store_error(fragment.as_str(), e))?;
            locations.push(location_from_document(&document)?);
        }
        Ok(locations)
    }

    async fn history_for(&self, mac: &MacAddress) -> Result<Vec<MoveEvent>> {
        let mac = mac.to_string();
        // `_id` is an ObjectId, increasing with insertion: ties on moved_at
        // keep insertion order.
        let options = FindOptions::builder()
            .sort(doc! { "moved_at": 1, "_id": 1 })
            .build();
        let mut cursor = self
            .movements
            .find(doc! { "mac": &mac })
            .with_options(options)
            .await
            .map_err(|e| store_error(&mac, e))?;

        let mut history = Vec::new();
        while cursor.advance().await.map_err(|e| store_error(&mac, e))? {
            let document = cursor
                .deserialize_current()
                .map_err(|e| store_error(&mac, e))?;
            history.push(movement_from_document(&document)?);
        }
        Ok(history)
    }
}
