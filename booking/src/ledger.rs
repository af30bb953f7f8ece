//! Slot ledger: the single owner of slot availability.
//!
//! Slots are addressed by `(venue_id, slot_id)` and flipped only through the
//! ledger's operations. Each slot carries an atomic holder word; `0` means
//! available and any other value is the [`HoldToken`] of the reservation that
//! owns it. Reserving is a compare-and-swap from `0`, so concurrent callers
//! racing for one slot get exactly one winner and the rest fail without retry.

use crate::error::{LedgerError, SlotValidationError};
use crate::metrics;
use crate::types::{HoldToken, Money, Slot, SlotHandle, SlotId, SlotSpec, Venue, VenueId, VenueInfo};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};

const FREE: u64 = 0;

/// Venue slot storage with atomic per-slot reservation.
#[async_trait]
pub trait SlotLedger: Send + Sync {
    /// Register a venue and its slots.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Validation`] if any slot is empty or overlaps
    /// another; nothing is stored in that case.
    async fn register_venue(
        &self,
        name: &str,
        base_price: Money,
        slots: Vec<SlotSpec>,
    ) -> Result<Venue, LedgerError>;

    /// Replace a venue's slot list.
    ///
    /// Slots whose window is unchanged keep their id and holder. Free slots
    /// missing from `slots` are dropped; new windows start free.
    ///
    /// # Errors
    ///
    /// - `NoSuchVenue`: unknown venue
    /// - `Validation`: a slot is empty or overlaps another
    /// - `SlotInUse`: a held slot would be dropped or moved
    ///
    /// Nothing changes on error.
    async fn update_slots(
        &self,
        venue_id: VenueId,
        slots: Vec<SlotSpec>,
    ) -> Result<Venue, LedgerError>;

    /// Venue name and pricing.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NoSuchVenue`] for an unknown venue.
    async fn venue(&self, venue_id: VenueId) -> Result<VenueInfo, LedgerError>;

    /// Atomically take the slot matching `[start, end)`.
    ///
    /// # Errors
    ///
    /// - `NoSuchVenue`: unknown venue
    /// - `SlotNotFound`: no slot with exactly this window
    /// - `SlotAlreadyTaken`: another caller holds the slot
    async fn reserve(
        &self,
        venue_id: VenueId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<SlotHandle, LedgerError>;

    /// Make a slot available again. Releasing a free slot is a no-op.
    ///
    /// Operator override: it frees the slot whoever holds it. Reservation
    /// paths release through [`release_hold`](Self::release_hold).
    ///
    /// # Errors
    ///
    /// Returns `NoSuchVenue` or `SlotNotFound` for unknown ids.
    async fn release(&self, venue_id: VenueId, slot_id: SlotId) -> Result<(), LedgerError>;

    /// Release a slot only if `hold` still owns it.
    ///
    /// Returns `false` when the slot was free or held by someone else.
    ///
    /// # Errors
    ///
    /// Returns `NoSuchVenue` or `SlotNotFound` for unknown ids.
    async fn release_hold(
        &self,
        venue_id: VenueId,
        slot_id: SlotId,
        hold: HoldToken,
    ) -> Result<bool, LedgerError>;

    /// Whether `handle`'s hold still owns its slot.
    ///
    /// # Errors
    ///
    /// Returns `NoSuchVenue` or `SlotNotFound` for unknown ids.
    async fn holds(&self, handle: &SlotHandle) -> Result<bool, LedgerError>;

    /// Every slot of a venue with its current availability.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NoSuchVenue`] for an unknown venue.
    async fn availability(&self, venue_id: VenueId) -> Result<Vec<Slot>, LedgerError>;
}

/// Check a venue's slot list and return it sorted by start.
///
/// Every slot must start before it ends, and after sorting each slot must
/// start no earlier than the previous one ends. Back-to-back slots are fine.
///
/// # Errors
///
/// Returns the first violation found.
pub fn validate_slots(slots: &[SlotSpec]) -> Result<Vec<SlotSpec>, SlotValidationError> {
    if let Some(index) = slots.iter().position(|slot| slot.start >= slot.end) {
        return Err(SlotValidationError::EmptyWindow { index });
    }

    let mut sorted = slots.to_vec();
    sorted.sort_by_key(|slot| slot.start);

    for (index, pair) in sorted.windows(2).enumerate() {
        if pair[1].start < pair[0].end {
            return Err(SlotValidationError::Overlap { index: index + 1 });
        }
    }

    Ok(sorted)
}

#[derive(Debug)]
struct SlotCell {
    id: SlotId,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    holder: AtomicU64,
}

impl SlotCell {
    fn free(spec: SlotSpec) -> Arc<Self> {
        Arc::new(Self {
            id: SlotId::new(),
            start: spec.start,
            end: spec.end,
            holder: AtomicU64::new(FREE),
        })
    }

    fn matches(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start == start && self.end == end
    }

    fn snapshot(&self, venue_id: VenueId) -> Slot {
        Slot {
            id: self.id,
            venue_id,
            start: self.start,
            end: self.end,
            available: self.holder.load(Ordering::Acquire) == FREE,
        }
    }
}

#[derive(Debug)]
struct VenueEntry {
    info: VenueInfo,
    slots: Vec<Arc<SlotCell>>,
}

impl VenueEntry {
    fn slot(&self, slot_id: SlotId) -> Result<&Arc<SlotCell>, LedgerError> {
        self.slots
            .iter()
            .find(|cell| cell.id == slot_id)
            .ok_or(LedgerError::SlotNotFound {
                venue_id: self.info.id,
            })
    }

    fn venue(&self) -> Venue {
        Venue {
            id: self.info.id,
            name: self.info.name.clone(),
            base_price: self.info.base_price,
            slots: self.slots.iter().map(|cell| cell.snapshot(self.info.id)).collect(),
        }
    }
}

/// In-memory [`SlotLedger`].
///
/// The venue map is only written on registration and slot updates. Slot
/// availability lives in each slot's atomic holder word, so reservations never
/// take the write lock. `reserve` swaps the holder while still holding the read
/// lock, which keeps a concurrent slot update from dropping the slot under it.
#[derive(Debug)]
pub struct InMemorySlotLedger {
    venues: RwLock<HashMap<VenueId, VenueEntry>>,
    next_hold: AtomicU64,
}

impl Default for InMemorySlotLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemorySlotLedger {
    /// Create an empty ledger
    #[must_use]
    pub fn new() -> Self {
        Self {
            venues: RwLock::new(HashMap::new()),
            next_hold: AtomicU64::new(1),
        }
    }

    async fn cell(&self, venue_id: VenueId, slot_id: SlotId) -> Result<Arc<SlotCell>, LedgerError> {
        let venues = self.venues.read().await;
        let entry = venues
            .get(&venue_id)
            .ok_or(LedgerError::NoSuchVenue(venue_id))?;
        entry.slot(slot_id).cloned()
    }

    fn issue_hold(&self) -> HoldToken {
        loop {
            if let Some(token) = HoldToken::new(self.next_hold.fetch_add(1, Ordering::Relaxed)) {
                return token;
            }
        }
    }
}

#[async_trait]
impl SlotLedger for InMemorySlotLedger {
    #[instrument(skip(self, slots), fields(slot_count = slots.len()))]
    async fn register_venue(
        &self,
        name: &str,
        base_price: Money,
        slots: Vec<SlotSpec>,
    ) -> Result<Venue, LedgerError> {
        let sorted = validate_slots(&slots)?;

        let entry = VenueEntry {
            info: VenueInfo {
                id: VenueId::new(),
                name: name.to_string(),
                base_price,
            },
            slots: sorted.into_iter().map(SlotCell::free).collect(),
        };
        let venue = entry.venue();

        info!(venue_id = %venue.id, name, "Venue registered");
        self.venues.write().await.insert(venue.id, entry);

        Ok(venue)
    }

    #[instrument(skip(self, slots), fields(slot_count = slots.len()))]
    async fn update_slots(
        &self,
        venue_id: VenueId,
        slots: Vec<SlotSpec>,
    ) -> Result<Venue, LedgerError> {
        let sorted = validate_slots(&slots)?;

        let mut venues = self.venues.write().await;
        let entry = venues
            .get_mut(&venue_id)
            .ok_or(LedgerError::NoSuchVenue(venue_id))?;

        let kept = |cell: &SlotCell| sorted.iter().any(|spec| cell.matches(spec.start, spec.end));
        if let Some(held) = entry
            .slots
            .iter()
            .find(|cell| cell.holder.load(Ordering::Acquire) != FREE && !kept(cell))
        {
            debug!(slot_id = %held.id, "Held slot would be removed");
            return Err(LedgerError::SlotInUse(held.id));
        }

        let cells: Vec<Arc<SlotCell>> = sorted
            .iter()
            .map(|spec| {
                entry
                    .slots
                    .iter()
                    .find(|cell| cell.matches(spec.start, spec.end))
                    .cloned()
                    .unwrap_or_else(|| SlotCell::free(*spec))
            })
            .collect();
        let dropped = entry.slots.iter().filter(|cell| !kept(cell)).count();
        entry.slots = cells;

        info!(%venue_id, slots = entry.slots.len(), dropped, "Venue slots updated");
        Ok(entry.venue())
    }

    async fn venue(&self, venue_id: VenueId) -> Result<VenueInfo, LedgerError> {
        self.venues
            .read()
            .await
            .get(&venue_id)
            .map(|entry| entry.info.clone())
            .ok_or(LedgerError::NoSuchVenue(venue_id))
    }

    #[instrument(skip(self))]
    async fn reserve(
        &self,
        venue_id: VenueId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<SlotHandle, LedgerError> {
        let venues = self.venues.read().await;
        let entry = venues
            .get(&venue_id)
            .ok_or(LedgerError::NoSuchVenue(venue_id))?;
        let cell = entry
            .slots
            .iter()
            .find(|cell| cell.matches(start, end))
            .ok_or(LedgerError::SlotNotFound { venue_id })?;

        let hold = self.issue_hold();
        match cell
            .holder
            .compare_exchange(FREE, hold.value(), Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => {
                debug!(slot_id = %cell.id, %hold, "Slot reserved");
                Ok(SlotHandle {
                    venue_id,
                    slot_id: cell.id,
                    start: cell.start,
                    end: cell.end,
                    hold,
                })
            }
            Err(_) => {
                debug!(slot_id = %cell.id, "Slot already taken");
                metrics::record_slot_conflict();
                Err(LedgerError::SlotAlreadyTaken(cell.id))
            }
        }
    }

    async fn release(&self, venue_id: VenueId, slot_id: SlotId) -> Result<(), LedgerError> {
        let cell = self.cell(venue_id, slot_id).await?;
        let previous = cell.holder.swap(FREE, Ordering::AcqRel);
        if previous != FREE {
            debug!(%slot_id, "Slot released");
        }
        Ok(())
    }

    async fn release_hold(
        &self,
        venue_id: VenueId,
        slot_id: SlotId,
        hold: HoldToken,
    ) -> Result<bool, LedgerError> {
        let cell = self.cell(venue_id, slot_id).await?;
        let released = cell
            .holder
            .compare_exchange(hold.value(), FREE, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if released {
            debug!(%slot_id, %hold, "Slot released");
        } else {
            debug!(%slot_id, %hold, "Hold no longer owns slot, nothing to release");
        }
        Ok(released)
    }

    async fn holds(&self, handle: &SlotHandle) -> Result<bool, LedgerError> {
        let cell = self.cell(handle.venue_id, handle.slot_id).await?;
        Ok(cell.holder.load(Ordering::Acquire) == handle.hold.value())
    }

    async fn availability(&self, venue_id: VenueId) -> Result<Vec<Slot>, LedgerError> {
        let venues = self.venues.read().await;
        let entry = venues
            .get(&venue_id)
            .ok_or(LedgerError::NoSuchVenue(venue_id))?;
        Ok(entry.slots.iter().map(|cell| cell.snapshot(venue_id)).collect())
    }
}
