// Reconcile one switch's forwarding table against stored state.
//
// The engine keeps nothing between calls and never logs: it reads and writes
// through the store and reports what it decided.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};

use crate::address::MacAddress;
use crate::db::{CurrentLocation, MoveEvent, StateStore};
use crate::error::{Result, TrackerError};

/// Interface name per MAC, as learned by one switch.
pub type Observations = BTreeMap<MacAddress, String>;

/// Classification of one observed MAC.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MacEvent {
    New {
        mac: MacAddress,
        device: String,
        interface: String,
    },
    Reaffirmed {
        mac: MacAddress,
        device: String,
        interface: String,
    },
    Moved {
        mac: MacAddress,
        from_device: String,
        from_interface: String,
        to_device: String,
        to_interface: String,
    },
}

impl fmt::Display for MacEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MacEvent::New {
                mac,
                device,
                interface,
            } => write!(f, "[{}] New MAC {} on {}", device, mac, interface),
            MacEvent::Reaffirmed {
                mac,
                device,
                interface,
            } => write!(f, "[{}] MAC {} seen again on {}", device, mac, interface),
            MacEvent::Moved {
                mac,
                from_device,
                from_interface,
                to_device,
                to_interface,
            } => write!(
                f,
                "[{}] MAC {} moved from {}/{} to {}/{}",
                to_device, mac, from_device, from_interface, to_device, to_interface
            ),
        }
    }
}

/// Outcome of one `reconcile` call.
#[derive(Debug, Default)]
pub struct Reconciliation {
    /// One event per MAC whose state was written.
    pub events: Vec<MacEvent>,
    /// MACs left untouched because their write was rejected or their
    /// observation was stale.
    pub skipped: Vec<TrackerError>,
}

/// Classify every observed MAC as new, reaffirmed or moved and apply the
/// matching state change.
///
/// A failure scoped to one MAC skips that MAC and the batch continues. A
/// connectivity failure (`StoreUnavailable`) aborts the call.
pub async fn reconcile(
    store: &dyn StateStore,
    switch_id: &str,
    observed: &Observations,
    observed_at: DateTime<Utc>,
) -> Result<Reconciliation> {
    let mut reconciliation = Reconciliation::default();
    for (mac, interface) in observed {
        match reconcile_one(store, switch_id, *mac, interface, observed_at).await {
            Ok(event) => reconciliation.events.push(event),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => reconciliation.skipped.push(e),
        }
    }
    Ok(reconciliation)
}

async fn reconcile_one(
    store: &dyn StateStore,
    switch_id: &str,
    mac: MacAddress,
    interface: &str,
    observed_at: DateTime<Utc>,
) -> Result<MacEvent> {
    let existing = match store.get_current(&mac).await? {
        Some(existing) => existing,
        None => {
            store
                .upsert_current(&CurrentLocation {
                    mac,
                    device: switch_id.to_string(),
                    interface: interface.to_string(),
                    first_seen: observed_at,
                    last_seen: observed_at,
                })
                .await?;
            return Ok(MacEvent::New {
                mac,
                device: switch_id.to_string(),
                interface: interface.to_string(),
            });
        }
    };

    // Writing an older observation would put a move out of timestamp order.
    if observed_at < existing.last_seen {
        return Err(TrackerError::StaleObservation {
            mac: mac.to_string(),
            observed_at,
            last_seen: existing.last_seen,
        });
    }

    if existing.device == switch_id && existing.interface == interface {
        store
            .upsert_current(&CurrentLocation {
                last_seen: observed_at,
                ..existing
            })
            .await?;
        return Ok(MacEvent::Reaffirmed {
            mac,
            device: switch_id.to_string(),
            interface: interface.to_string(),
        });
    }

    let event = MoveEvent {
        mac,
        from_device: existing.device.clone(),
        from_interface: existing.interface.clone(),
        to_device: switch_id.to_string(),
        to_interface: interface.to_string(),
        moved_at: observed_at,
    };
    let moved = CurrentLocation {
        device: switch_id.to_string(),
        interface: interface.to_string(),
        last_seen: observed_at,
        ..existing
    };
    store.apply_move(&event, &moved).await?;
    Ok(MacEvent::Moved {
        mac,
        from_device: event.from_device,
        from_interface: event.from_interface,
        to_device: event.to_device,
        to_interface: event.to_interface,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::address::HexFragment;
    use crate::db::contract::at;
    use crate::db::relational::tests::memory_store;

    fn mac(text: &str) -> MacAddress {
        text.parse().unwrap()
    }

    pub(crate) fn batch(entries: &[(&str, &str)]) -> Observations {
        entries
            .iter()
            .map(|(m, i)| (mac(m), i.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn never_seen_mac_is_new() {
        let store = memory_store().await;
        let result = reconcile(
            &store,
            "switch1",
            &batch(&[("aa:bb:cc:dd:ee:ff", "Gi1/0/1")]),
            at(1),
        )
        .await
        .unwrap();

        assert_eq!(
            result.events,
            vec![MacEvent::New {
                mac: mac("aa:bb:cc:dd:ee:ff"),
                device: "switch1".to_string(),
                interface: "Gi1/0/1".to_string(),
            }]
        );
        let current = store
            .get_current(&mac("aa:bb:cc:dd:ee:ff"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(current.first_seen, at(1));
        assert_eq!(current.last_seen, at(1));
    }

    #[tokio::test]
    async fn same_port_only_advances_last_seen() {
        let store = memory_store().await;
        let observed = batch(&[("aa:bb:cc:dd:ee:ff", "Gi1/0/1")]);
        reconcile(&store, "switch1", &observed, at(1)).await.unwrap();
        let result = reconcile(&store, "switch1", &observed, at(2)).await.unwrap();

        assert!(matches!(result.events[0], MacEvent::Reaffirmed { .. }));
        let current = store
            .get_current(&mac("aa:bb:cc:dd:ee:ff"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(current.first_seen, at(1));
        assert_eq!(current.last_seen, at(2));
        assert!(store
            .history_for(&mac("aa:bb:cc:dd:ee:ff"))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn new_reaffirmed_then_moved() {
        let store = memory_store().await;
        let target = mac("aa:bb:cc:dd:ee:ff");

        let t1 = reconcile(
            &store,
            "switch1",
            &batch(&[("aa:bb:cc:dd:ee:ff", "Gi1/0/1")]),
            at(1),
        )
        .await
        .unwrap();
        assert!(matches!(t1.events[0], MacEvent::New { .. }));

        let t2 = reconcile(
            &store,
            "switch1",
            &batch(&[("aa:bb:cc:dd:ee:ff", "Gi1/0/1")]),
            at(2),
        )
        .await
        .unwrap();
        assert!(matches!(t2.events[0], MacEvent::Reaffirmed { .. }));

        let t3 = reconcile(
            &store,
            "switch1",
            &batch(&[("aa:bb:cc:dd:ee:ff", "Gi1/0/3")]),
            at(3),
        )
        .await
        .unwrap();
        assert_eq!(
            t3.events,
            vec![MacEvent::Moved {
                mac: target,
                from_device: "switch1".to_string(),
                from_interface: "Gi1/0/1".to_string(),
                to_device: "switch1".to_string(),
                to_interface: "Gi1/0/3".to_string(),
            }]
        );

        let current = store.get_current(&target).await.unwrap().unwrap();
        assert_eq!(current.interface, "Gi1/0/3");
        assert_eq!(current.first_seen, at(1));
        assert_eq!(current.last_seen, at(3));

        let history = store.history_for(&target).await.unwrap();
        assert_eq!(
            history,
            vec![MoveEvent {
                mac: target,
                from_device: "switch1".to_string(),
                from_interface: "Gi1/0/1".to_string(),
                to_device: "switch1".to_string(),
                to_interface: "Gi1/0/3".to_string(),
                moved_at: at(3),
            }]
        );
    }

    #[tokio::test]
    async fn moves_across_switches_chain() {
        let store = memory_store().await;
        let target = mac("00:1b:21:0a:ff:03");
        let hops = [
            ("switch1", "Gi1/0/1"),
            ("switch2", "Gi1/0/24"),
            ("switch2", "Gi1/0/5"),
            ("switch1", "Gi1/0/1"),
        ];
        for (hour, (switch, interface)) in hops.iter().enumerate() {
            reconcile(
                &store,
                switch,
                &batch(&[("00:1b:21:0a:ff:03", *interface)]),
                at(hour as u32 + 1),
            )
            .await
            .unwrap();
        }

        let history = store.history_for(&target).await.unwrap();
        assert_eq!(history.len(), 3);
        for pair in history.windows(2) {
            assert!(pair[0].moved_at <= pair[1].moved_at);
            assert_eq!(pair[0].to_device, pair[1].from_device);
            assert_eq!(pair[0].to_interface, pair[1].from_interface);
        }
        let current = store.get_current(&target).await.unwrap().unwrap();
        assert_eq!(current.device, "switch1");
        assert_eq!(current.first_seen, at(1));
    }

    #[tokio::test]
    async fn later_switch_wins_within_a_run() {
        let store = memory_store().await;
        let observed = batch(&[("aa:bb:cc:dd:ee:ff", "Gi1/0/1")]);
        reconcile(&store, "switch1", &observed, at(1)).await.unwrap();
        let result = reconcile(&store, "switch2", &observed, at(1)).await.unwrap();

        assert!(matches!(result.events[0], MacEvent::Moved { .. }));
        let current = store
            .get_current(&mac("aa:bb:cc:dd:ee:ff"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(current.device, "switch2");
    }

    #[tokio::test]
    async fn stale_observation_is_skipped() {
        let store = memory_store().await;
        reconcile(
            &store,
            "switch1",
            &batch(&[("aa:bb:cc:dd:ee:ff", "Gi1/0/1")]),
            at(5),
        )
        .await
        .unwrap();

        let result = reconcile(
            &store,
            "switch1",
            &batch(&[("aa:bb:cc:dd:ee:ff", "Gi1/0/2"), ("11:22:33:44:55:66", "Gi1/0/9")]),
            at(4),
        )
        .await
        .unwrap();

        assert_eq!(result.events.len(), 1);
        assert!(matches!(
            result.skipped.as_slice(),
            [TrackerError::StaleObservation { .. }]
        ));
        let current = store
            .get_current(&mac("aa:bb:cc:dd:ee:ff"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(current.interface, "Gi1/0/1");
        assert!(store
            .history_for(&mac("aa:bb:cc:dd:ee:ff"))
            .await
            .unwrap()
            .is_empty());
    }

    /// Store that refuses writes for one MAC, or loses its connection.
    pub(crate) struct FaultyStore {
        pub(crate) reject: Option<MacAddress>,
        pub(crate) unavailable: bool,
        pub(crate) locations: Mutex<Vec<CurrentLocation>>,
        pub(crate) movements: Mutex<Vec<MoveEvent>>,
    }

    impl FaultyStore {
        pub(crate) fn rejecting(mac: MacAddress) -> Self {
            FaultyStore {
                reject: Some(mac),
                unavailable: false,
                locations: Mutex::new(Vec::new()),
                movements: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn unavailable() -> Self {
            FaultyStore {
                reject: None,
                unavailable: true,
                locations: Mutex::new(Vec::new()),
                movements: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl StateStore for FaultyStore {
        async fn get_current(&self, mac: &MacAddress) -> Result<Option<CurrentLocation>> {
            if self.unavailable {
                return Err(TrackerError::StoreUnavailable("connection refused".into()));
            }
            let locations = self.locations.lock().unwrap();
            Ok(locations.iter().find(|l| l.mac == *mac).cloned())
        }

        async fn upsert_current(&self, location: &CurrentLocation) -> Result<()> {
            if self.reject == Some(location.mac) {
                return Err(TrackerError::StoreRejected {
                    mac: location.mac.to_string(),
                    message: "constraint violated".into(),
                });
            }
            let mut locations = self.locations.lock().unwrap();
            locations.retain(|l| l.mac != location.mac);
            locations.push(location.clone());
            Ok(())
        }

        async fn append_move(&self, event: &MoveEvent) -> Result<()> {
            self.movements.lock().unwrap().push(event.clone());
            Ok(())
        }

        async fn find_current_by_prefix(
            &self,
            _fragment: &HexFragment,
        ) -> Result<Vec<CurrentLocation>> {
            Ok(Vec::new())
        }

        async fn history_for(&self, mac: &MacAddress) -> Result<Vec<MoveEvent>> {
            let movements = self.movements.lock().unwrap();
            Ok(movements.iter().filter(|m| m.mac == *mac).cloned().collect())
        }
    }

    #[tokio::test]
    async fn rejected_write_skips_only_that_mac() {
        let store = FaultyStore::rejecting(mac("aa:bb:cc:dd:ee:ff"));
        let result = reconcile(
            &store,
            "switch1",
            &batch(&[
                ("00:00:00:00:00:01", "Gi1/0/1"),
                ("aa:bb:cc:dd:ee:ff", "Gi1/0/2"),
                ("ff:ff:ff:ff:ff:fe", "Gi1/0/3"),
            ]),
            at(1),
        )
        .await
        .unwrap();

        assert_eq!(result.events.len(), 2);
        assert!(matches!(
            result.skipped.as_slice(),
            [TrackerError::StoreRejected { .. }]
        ));
    }

    #[tokio::test]
    async fn unavailable_store_aborts_the_batch() {
        let store = FaultyStore::unavailable();
        let err = reconcile(
            &store,
            "switch1",
            &batch(&[("aa:bb:cc:dd:ee:ff", "Gi1/0/1")]),
            at(1),
        )
        .await
        .unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn events_render_as_log_lines() {
        let moved = MacEvent::Moved {
            mac: mac("aa:bb:cc:dd:ee:ff"),
            from_device: "switch1".to_string(),
            from_interface: "Gi1/0/1".to_string(),
            to_device: "switch2".to_string(),
            to_interface: "Gi1/0/3".to_string(),
        };
        assert_eq!(
            moved.to_string(),
            "[switch2] MAC aa:bb:cc:dd:ee:ff moved from switch1/Gi1/0/1 to switch2/Gi1/0/3"
        );
    }
}
