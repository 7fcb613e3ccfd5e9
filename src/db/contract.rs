// Behaviour every `StateStore` backend must share.
//
// Each check takes a freshly created, empty store. `store_contract_tests!`
// expands to one test per check for a given store constructor.

use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::address::MacAddress;
use crate::db::{CurrentLocation, MoveEvent, StateStore};

pub(crate) fn at(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, hour, 0, 0).unwrap()
}

pub(crate) fn location(mac: &str, interface: &str, seen: DateTime<Utc>) -> CurrentLocation {
    CurrentLocation {
        mac: mac.parse().unwrap(),
        device: "switch1".to_string(),
        interface: interface.to_string(),
        first_seen: seen,
        last_seen: seen,
    }
}

pub(crate) async fn upsert_inserts_then_overwrites(store: &dyn StateStore) {
    let mac: MacAddress = "aa:bb:cc:dd:ee:ff".parse().unwrap();
    assert_eq!(store.get_current(&mac).await.unwrap(), None);

    let first = location("aa:bb:cc:dd:ee:ff", "Gi1/0/1", at(1));
    store.upsert_current(&first).await.unwrap();
    assert_eq!(store.get_current(&mac).await.unwrap(), Some(first.clone()));

    let updated = CurrentLocation {
        interface: "Gi1/0/2".to_string(),
        last_seen: at(2),
        ..first
    };
    store.upsert_current(&updated).await.unwrap();
    assert_eq!(store.get_current(&mac).await.unwrap(), Some(updated));

    let all = store
        .find_current_by_prefix(&"aabbccddeeff".parse().unwrap())
        .await
        .unwrap();
    assert_eq!(all.len(), 1);
}

pub(crate) async fn fragment_search_matches_contiguous_digits(store: &dyn StateStore) {
    store
        .upsert_current(&location("aa:bb:cc:dd:ee:ff", "Gi1/0/1", at(1)))
        .await
        .unwrap();
    store
        .upsert_current(&location("11:aa:bb:cc:dd:ee", "Gi1/0/2", at(2)))
        .await
        .unwrap();
    store
        .upsert_current(&location("aa:11:bb:cc:dd:ee", "Gi1/0/3", at(3)))
        .await
        .unwrap();
    store
        .upsert_current(&location("00:1b:aa:bb:00:01", "Gi1/0/4", at(2)))
        .await
        .unwrap();

    let found = store
        .find_current_by_prefix(&"aabb".parse().unwrap())
        .await
        .unwrap();
    let macs: Vec<String> = found.iter().map(|l| l.mac.to_string()).collect();
    // Most recently seen first, ties by address.
    assert_eq!(
        macs,
        vec!["00:1b:aa:bb:00:01", "11:aa:bb:cc:dd:ee", "aa:bb:cc:dd:ee:ff"]
    );

    // Fragment straddling an octet boundary.
    let found = store
        .find_current_by_prefix(&"1aab".parse().unwrap())
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].mac.to_string(), "11:aa:bb:cc:dd:ee");

    let found = store
        .find_current_by_prefix(&"0000".parse().unwrap())
        .await
        .unwrap();
    assert!(found.is_empty());
}

pub(crate) async fn history_is_oldest_first(store: &dyn StateStore) {
    let mac: MacAddress = "00:1b:21:0a:ff:03".parse().unwrap();
    let hops = [
        ("Gi1/0/1", "Gi1/0/2"),
        ("Gi1/0/2", "Gi1/0/7"),
        ("Gi1/0/7", "Gi1/0/1"),
    ];
    // Inserted newest first so the ordering has to come from moved_at.
    for (i, (from, to)) in hops.iter().enumerate().rev() {
        store
            .append_move(&MoveEvent {
                mac,
                from_device: "switch1".to_string(),
                from_interface: from.to_string(),
                to_device: "switch1".to_string(),
                to_interface: to.to_string(),
                moved_at: at(1) + Duration::minutes(i as i64),
            })
            .await
            .unwrap();
    }

    let history = store.history_for(&mac).await.unwrap();
    assert_eq!(history.len(), 3);
    assert_eq!(history[0].from_interface, "Gi1/0/1");
    for pair in history.windows(2) {
        assert!(pair[0].moved_at <= pair[1].moved_at);
        assert_eq!(pair[0].to_interface, pair[1].from_interface);
    }
    assert!(store
        .history_for(&"aa:bb:cc:dd:ee:ff".parse().unwrap())
        .await
        .unwrap()
        .is_empty());
}

pub(crate) async fn apply_move_writes_both_records(store: &dyn StateStore) {
    let before = location("aa:bb:cc:dd:ee:ff", "Gi1/0/1", at(1));
    store.upsert_current(&before).await.unwrap();

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
    store.apply_move(&event, &after).await.unwrap();

    assert_eq!(store.get_current(&before.mac).await.unwrap(), Some(after));
    assert_eq!(store.history_for(&before.mac).await.unwrap(), vec![event]);
}

/// One `#[tokio::test]` per contract check, each against `$store` (an
/// expression producing a new, empty store).
macro_rules! store_contract_tests {
    ($(#[$attr:meta])* store = $store:expr) => {
        #[tokio::test]
        $(#[$attr])*
        async fn upsert_inserts_then_overwrites() {
            crate::db::contract::upsert_inserts_then_overwrites(&$store).await;
        }

        #[tokio::test]
        $(#[$attr])*
        async fn fragment_search_matches_contiguous_digits() {
            crate::db::contract::fragment_search_matches_contiguous_digits(&$store).await;
        }

        #[tokio::test]
        $(#[$attr])*
        async fn history_is_oldest_first() {
            crate::db::contract::history_is_oldest_first(&$store).await;
        }

        #[tokio::test]
        $(#[$attr])*
        async fn apply_move_writes_both_records() {
            crate::db::contract::apply_move_writes_both_records(&$store).await;
        }
    };
}
