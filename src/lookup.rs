// Resolve full or partial addresses against stored state.

use crate::address::Query;
use crate::db::{CurrentLocation, MoveEvent, StateStore};
use crate::error::Result;
use crate::utils::{format_timestamp, truncate_string};

/// Current locations matching `query`: the single record for a full address,
/// or every record containing a partial hex fragment. No match is an empty
/// result, not an error.
pub async fn lookup(store: &dyn StateStore, query: &str) -> Result<Vec<CurrentLocation>> {
    match query.parse::<Query>()? {
        Query::Exact(mac) => Ok(store.get_current(&mac).await?.into_iter().collect()),
        Query::Fragment(fragment) => store.find_current_by_prefix(&fragment).await,
    }
}

/// Move history of the MACs a `lookup` resolved, oldest first.
pub async fn history(
    store: &dyn StateStore,
    matches: &[CurrentLocation],
) -> Result<Vec<MoveEvent>> {
    let mut events = Vec::new();
    for location in matches {
        events.extend(store.history_for(&location.mac).await?);
    }
    // Stable: per-MAC insertion order survives equal timestamps.
    events.sort_by_key(|event| event.moved_at);
    Ok(events)
}

/// Fixed-width table of current locations.
pub fn render_locations(locations: &[CurrentLocation]) -> String {
    // {:<##} gives the column a fixed width of ## characters, aligned left
    let mut table = vec![format!(
        "{:<17}  {:<20}  {:<20}  {:<19}  {:<19}",
        "MAC", "Device", "Interface", "First Seen", "Last Seen"
    )];
    for location in locations {
        table.push(format!(
            "{:<17}  {:<20}  {:<20}  {:<19}  {:<19}",
            location.mac.to_string(),
            truncate_string(location.device.clone(), 20),
            truncate_string(location.interface.clone(), 20),
            format_timestamp(&location.first_seen),
            format_timestamp(&location.last_seen),
        ));
    }
    table.join("\n")
}

/// Fixed-width table of moves.
pub fn render_history(history: &[MoveEvent]) -> String {
    let mut table = vec![format!(
        "{:<20}  {:<20}  {:<20}  {:<20}  {:<19}",
        "From Device", "From IF", "To Device", "To IF", "Moved At"
    )];
    for event in history {
        table.push(format!(
            "{:<20}  {:<20}  {:<20}  {:<20}  {:<19}",
            truncate_string(event.from_device.clone(), 20),
            truncate_string(event.from_interface.clone(), 20),
            truncate_string(event.to_device.clone(), 20),
            truncate_string(event.to_interface.clone(), 20),
            format_timestamp(&event.moved_at),
        ));
    }
    table.join("\n")
}
