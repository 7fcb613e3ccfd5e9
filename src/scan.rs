// One tracker run: scan every switch from the inventory and reconcile what
// each one reports.
//
// Scans run in parallel, bounded by `workers`. Every finished scan is sent to
// a single writer that reconciles batches one at a time, so no two switches
// ever write the same MAC concurrently.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use log::{error, info, warn};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;

use crate::db::StateStore;
use crate::error::{Result, TrackerError};
use crate::inventory::{Inventory, Switch};
use crate::reconcile::{reconcile, MacEvent, Observations};
use crate::snmp::ObservationSource;

/// Something worth a line in the run log.
#[derive(Debug)]
pub enum RunEvent {
    Started { switches: usize },
    Scanning(Switch),
    SwitchSkipped { switch: String, reason: String },
    Mac(MacEvent),
    MacSkipped { switch: String, reason: String },
    Aborted { reason: String },
    Finished(RunSummary),
}

/// Write-only destination for run events.
pub trait RunLog: Send + Sync {
    fn record(&self, event: &RunEvent);
}

/// Renders every event through the `log` facade.
pub struct LogSink;

impl RunLog for LogSink {
    fn record(&self, event: &RunEvent) {
        match event {
            RunEvent::Started { switches } => {
                info!("=== MAC Tracker Run Started ({} switches) ===", switches)
            }
            RunEvent::Scanning(switch) => info!("Scanning {} ({})", switch.name, switch.address),
            RunEvent::SwitchSkipped { switch, reason } => {
                warn!("[{}] skipped: {}", switch, reason)
            }
            RunEvent::Mac(event) => info!("{}", event),
            RunEvent::MacSkipped { switch, reason } => warn!("[{}] {}", switch, reason),
            RunEvent::Aborted { reason } => error!("run aborted: {}", reason),
            RunEvent::Finished(summary) => {
                info!("=== MAC Tracker Run Complete: {} ===", summary)
            }
        }
    }
}

/// Totals for one run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub switches_scanned: usize,
    pub switches_skipped: usize,
    pub new: usize,
    pub reaffirmed: usize,
    pub moved: usize,
    pub rejected: usize,
}

impl RunSummary {
    fn count(&mut self, event: &MacEvent) {
        match event {
            MacEvent::New { .. } => self.new += 1,
            MacEvent::Reaffirmed { .. } => self.reaffirmed += 1,
            MacEvent::Moved { .. } => self.moved += 1,
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} switches scanned, {} skipped; {} new, {} reaffirmed, {} moved, {} rejected",
            self.switches_scanned,
            self.switches_skipped,
            self.new,
            self.reaffirmed,
            self.moved,
            self.rejected
        )
    }
}

struct ScanResult {
    switch: Switch,
    result: Result<Observations>,
}

pub struct Orchestrator {
    inventory: Arc<dyn Inventory>,
    source: Arc<dyn ObservationSource>,
    store: Arc<dyn StateStore>,
    log: Arc<dyn RunLog>,
    workers: usize,
    scan_timeout: Duration,
}

impl Orchestrator {
    pub fn new(
        inventory: Arc<dyn Inventory>,
        source: Arc<dyn ObservationSource>,
        store: Arc<dyn StateStore>,
        log: Arc<dyn RunLog>,
    ) -> Self {
        Orchestrator {
            inventory,
            source,
            store,
            log,
            workers: 1,
            scan_timeout: Duration::from_secs(30),
        }
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn scan_timeout(mut self, scan_timeout: Duration) -> Self {
        self.scan_timeout = scan_timeout;
        self
    }

    /// Scan and reconcile every switch once.
    ///
    /// A switch whose scan fails is skipped; a MAC whose write is rejected is
    /// skipped. `StoreUnavailable`, or a source error that is not a scan
    /// failure, stops the run and is returned.
    pub async fn run(&self) -> Result<RunSummary> {
        let switches = self.inventory.switches().await?;
        self.log.record(&RunEvent::Started {
            switches: switches.len(),
        });

        let (scan_tx, mut scan_rx) = mpsc::channel(self.workers);
        let scans = self.spawn_scans(switches, scan_tx);

        let mut summary = RunSummary::default();
        while let Some(scan) = scan_rx.recv().await {
            // Stamped on receipt: the writer sees batches in timestamp order.
            let observed_at = Utc::now();
            let observed = match scan.result {
                Ok(observed) => observed,
                Err(e) if e.is_scan_failure() => {
                    summary.switches_skipped += 1;
                    self.log.record(&RunEvent::SwitchSkipped {
                        switch: scan.switch.name,
                        reason: e.to_string(),
                    });
                    continue;
                }
                // Anything else is not scoped to one switch.
                Err(e) => return Err(self.abort(&scans, e)),
            };

            let reconciliation =
                match reconcile(self.store.as_ref(), &scan.switch.name, &observed, observed_at)
                    .await
                {
                    Ok(reconciliation) => reconciliation,
                    Err(e) => return Err(self.abort(&scans, e)),
                };

            summary.switches_scanned += 1;
            for event in reconciliation.events {
                summary.count(&event);
                self.log.record(&RunEvent::Mac(event));
            }
            for skipped in reconciliation.skipped {
                summary.rejected += 1;
                self.log.record(&RunEvent::MacSkipped {
                    switch: scan.switch.name.clone(),
                    reason: skipped.to_string(),
                });
            }
        }

        self.log.record(&RunEvent::Finished(summary.clone()));
        Ok(summary)
    }

    fn abort(&self, scans: &[JoinHandle<()>], e: TrackerError) -> TrackerError {
        for handle in scans {
            handle.abort();
        }
        self.log.record(&RunEvent::Aborted {
            reason: e.to_string(),
        });
        e
    }

    fn spawn_scans(
        &self,
        switches: Vec<Switch>,
        scan_tx: mpsc::Sender<ScanResult>,
    ) -> Vec<JoinHandle<()>> {
        let permits = Arc::new(Semaphore::new(self.workers));
        switches
            .into_iter()
            .map(|switch| {
                let scan_tx = scan_tx.clone();
                let permits = Arc::clone(&permits);
                let source = Arc::clone(&self.source);
                let log = Arc::clone(&self.log);
                let scan_timeout = self.scan_timeout;
                tokio::spawn(async move {
                    let Ok(_permit) = permits.acquire_owned().await else {
                        return;
                    };
                    log.record(&RunEvent::Scanning(switch.clone()));
                    let result = match tokio::time::timeout(scan_timeout, source.observe(&switch))
                        .await
                    {
                        Ok(result) => result,
                        Err(_) => Err(TrackerError::ScanTimeout {
                            switch: switch.name.clone(),
                        }),
                    };
                    // The writer is gone only when the run was aborted.
                    let _ = scan_tx.send(ScanResult { switch, result }).await;
                })
            })
            .collect()
    }
}
