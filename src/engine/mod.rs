mod allocation;
mod error;
mod mutations;
mod pricing;
mod queries;
#[cfg(test)]
mod tests;

pub use error::EngineError;
pub use pricing::PriceTable;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, RwLock, mpsc, oneshot};

use crate::model::*;
use crate::notify::NotifyHub;
use crate::wal::Wal;

pub type SharedPropertyState = Arc<RwLock<PropertyState>>;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond to every sender.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];

                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            // Flush the batch first, then the non-append command.
                            flush_and_respond(&mut wal, &mut batch);
                            handle_non_append(&mut wal, other);
                            break;
                        }
                        Err(_) => break, // channel empty — flush batch
                    }
                }

                if !batch.is_empty() {
                    flush_and_respond(&mut wal, &mut batch);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn flush_and_respond(wal: &mut Wal, batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn flush_batch(wal: &mut Wal, batch: &[(Event, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Always flush — even on append error — so partially buffered bytes
    // don't leak into the next batch (callers were told this batch failed).
    let flush_err = wal.flush_sync().err();
    if let Some(e) = append_err {
        return Err(e);
    }
    if let Some(e) = flush_err {
        return Err(e);
    }
    Ok(())
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!(),
    }
}

// ── Contract books ───────────────────────────────────────

/// Append-only contract record book. Entries stay in id order because ids
/// only ever grow.
pub(super) struct ContractBook<T> {
    entries: Vec<T>,
    next_id: ContractId,
}

impl<T> ContractBook<T> {
    fn new() -> Self {
        Self {
            entries: Vec::new(),
            next_id: 1,
        }
    }

    pub(super) fn next_id(&self) -> ContractId {
        self.next_id
    }

    pub(super) fn record(&mut self, id: ContractId, entry: T) {
        self.next_id = self.next_id.max(id + 1);
        self.entries.push(entry);
    }

    pub(super) fn entries(&self) -> &[T] {
        &self.entries
    }
}

// ── Engine ───────────────────────────────────────────────

pub struct Engine {
    pub state: DashMap<PropertyId, SharedPropertyState>,
    pub(super) prices: RwLock<PriceTable>,
    pub(super) sales: RwLock<ContractBook<SaleContract>>,
    pub(super) rentals: RwLock<ContractBook<RentalContract>>,
    /// Serialization point for find-and-claim. Two concurrent allocation
    /// requests must never receive the same property id.
    pub(super) alloc_lock: Mutex<()>,
    pub(super) claim_ttl_ms: Ms,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub notify: Arc<NotifyHub>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("claim_ttl_ms", &self.claim_ttl_ms)
            .finish_non_exhaustive()
    }
}

/// Apply an event's property-level effect (no locking — caller holds the
/// write guard). Engine-level effects (spawn, price, contract books) are
/// handled by the mutation paths and replay.
fn apply_to_property(rs: &mut PropertyState, event: &Event) {
    match event {
        Event::ListedForSale { .. } => rs.for_sale = true,
        Event::ListedForRent { .. } => rs.for_rent = true,
        Event::Claimed { expires_at, .. } => {
            rs.claim = Some(Claim {
                expires_at: *expires_at,
            });
        }
        Event::ClaimReleased { .. } => rs.claim = None,
        Event::SaleClosed { contract } => {
            rs.owner_id = contract.buyer_id;
            rs.for_sale = false;
            rs.claim = None;
        }
        Event::LeaseSigned { .. } => {
            rs.for_rent = false;
            rs.claim = None;
        }
        Event::UnitPriceSet { .. } | Event::PropertyCreated { .. } => {}
    }
}

impl Engine {
    pub fn new(wal_path: PathBuf, notify: Arc<NotifyHub>, claim_ttl_ms: Ms) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            state: DashMap::new(),
            prices: RwLock::new(PriceTable::new()),
            sales: RwLock::new(ContractBook::new()),
            rentals: RwLock::new(ContractBook::new()),
            alloc_lock: Mutex::new(()),
            claim_ttl_ms,
            wal_tx,
            notify,
        };

        // Replay — we're the sole owner of every lock here, so try_read/
        // try_write always succeed instantly. Never block: this may run
        // inside an async context (lazy registry creation).
        for event in &events {
            match event {
                Event::UnitPriceSet { price } => {
                    engine
                        .prices
                        .try_write()
                        .expect("replay: uncontended write")
                        .set_all(*price);
                }
                Event::PropertyCreated { id, capacity } => {
                    engine
                        .state
                        .insert(*id, Arc::new(RwLock::new(PropertyState::new(*id, *capacity))));
                }
                Event::SaleClosed { contract } => {
                    engine.apply_replayed(event);
                    engine
                        .sales
                        .try_write()
                        .expect("replay: uncontended write")
                        .record(contract.id, contract.clone());
                }
                Event::LeaseSigned { contract } => {
                    engine.apply_replayed(event);
                    engine
                        .rentals
                        .try_write()
                        .expect("replay: uncontended write")
                        .record(contract.id, contract.clone());
                }
                other => engine.apply_replayed(other),
            }
        }

        Ok(engine)
    }

    fn apply_replayed(&self, event: &Event) {
        if let Some(id) = event.property_id()
            && let Some(entry) = self.state.get(&id)
        {
            let rs_arc = entry.value().clone();
            let mut guard = rs_arc.try_write().expect("replay: uncontended write");
            apply_to_property(&mut guard, event);
        }
    }

    /// Write event to WAL via the background group-commit writer.
    pub(super) async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub fn get_property(&self, id: &PropertyId) -> Option<SharedPropertyState> {
        self.state.get(id).map(|e| e.value().clone())
    }

    /// WAL-append + apply + notify in one call, for events whose whole
    /// effect is on a single property record.
    pub(super) async fn persist_and_apply(
        &self,
        property_id: PropertyId,
        rs: &mut PropertyState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        apply_to_property(rs, event);
        self.notify.send(property_id, event);
        Ok(())
    }
}
