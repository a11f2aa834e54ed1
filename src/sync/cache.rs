//! Local mirror of the observed fields.
//!
//! This module provides the `ChainStateCache`, the only mutable state shared between the sync
//! engine and the transaction coordinator. Values only change through the commit step of a
//! refresh: every field is read independently, each completed read is stamped from a monotonic
//! completion clock, and a field only accepts a value that completed after the one it holds.
//! All values from one refresh are committed under a single write lock, so readers never see a
//! half-applied refresh.

use crate::chain::{ChainSnapshot, ObservedField, ReadError, RemoteReader, ServiceTarget};

use futures::future::join_all;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError, RwLock};
use tracing::{debug, warn};

/// Callback invoked with the new snapshot after each refresh that changed the cache.
pub type SnapshotObserver = Box<dyn Fn(&ChainSnapshot) + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
	#[error("Unknown field: {0}")]
	UnknownField(String),
}

/// Result of one field read, stamped when the read completed.
#[derive(Debug)]
pub(crate) struct StampedRead {
	field: ObservedField,
	completed_at: u64,
	result: Result<String, ReadError>,
}

/// What a refresh did to the cache.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RefreshOutcome {
	/// Fields whose value was written.
	pub committed: Vec<ObservedField>,
	/// Fields whose read succeeded but lost against a read that completed later.
	pub superseded: Vec<ObservedField>,
	/// Fields whose read failed; their previous value was kept.
	pub failed: Vec<ObservedField>,
	/// The whole refresh was dropped because its context was torn down meanwhile.
	pub discarded: bool,
}

impl RefreshOutcome {
	pub fn discarded() -> Self {
		Self {
			discarded: true,
			..Self::default()
		}
	}

	pub fn is_complete(&self) -> bool {
		!self.discarded && self.failed.is_empty()
	}
}

#[derive(Debug, Clone)]
struct FieldSlot {
	value: String,
	/// Completion stamp of the read that produced `value`; 0 for the default.
	stamp: u64,
}

pub struct ChainStateCache {
	slots: RwLock<[FieldSlot; 4]>,
	completion_clock: AtomicU64,
	observers: Mutex<Vec<SnapshotObserver>>,
}

impl ChainStateCache {
	pub fn new() -> Self {
		let slot = |field: ObservedField| FieldSlot {
			value: field.default_value().to_string(),
			stamp: 0,
		};
		Self {
			slots: RwLock::new(ObservedField::ALL.map(slot)),
			completion_clock: AtomicU64::new(0),
			observers: Mutex::new(Vec::new()),
		}
	}

	/// Last committed value of a field, looked up by its external name.
	pub fn get(&self, name: &str) -> Result<String, CacheError> {
		let field =
			ObservedField::from_name(name).ok_or_else(|| CacheError::UnknownField(name.to_string()))?;
		Ok(self.value(field))
	}

	pub fn value(&self, field: ObservedField) -> String {
		let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
		slots[field.index()].value.clone()
	}

	pub fn snapshot(&self) -> ChainSnapshot {
		let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
		Self::snapshot_of(&slots)
	}

	fn snapshot_of(slots: &[FieldSlot; 4]) -> ChainSnapshot {
		ChainSnapshot {
			entrance_fee: slots[ObservedField::EntranceFee.index()].value.clone(),
			participant_count: slots[ObservedField::ParticipantCount.index()].value.clone(),
			last_winner: slots[ObservedField::LastWinner.index()].value.clone(),
			phase: slots[ObservedField::Phase.index()].value.clone(),
		}
	}

	/// Register a callback run after every refresh that committed at least one field.
	pub fn subscribe(&self, observer: SnapshotObserver) {
		self.observers
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.push(observer);
	}

	/// Read every field concurrently, stamping each read when it completes.
	pub(crate) async fn read_all(&self, reader: &dyn RemoteReader, target: &ServiceTarget) -> Vec<StampedRead> {
		let reads = ObservedField::ALL.into_iter().map(|field| async move {
			let result = reader.read(target, field).await;
			let completed_at = self.completion_clock.fetch_add(1, Ordering::SeqCst) + 1;
			StampedRead {
				field,
				completed_at,
				result,
			}
		});
		join_all(reads).await
	}

	/// Apply a batch of reads atomically. Failed reads and reads older than the held value are skipped.
	pub(crate) fn commit(&self, reads: Vec<StampedRead>) -> RefreshOutcome {
		let mut outcome = RefreshOutcome::default();

		let snapshot = {
			let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
			for read in reads {
				match read.result {
					Ok(value) => {
						let slot = &mut slots[read.field.index()];
						if read.completed_at > slot.stamp {
							slot.value = value;
							slot.stamp = read.completed_at;
							outcome.committed.push(read.field);
						} else {
							debug!(
								"Skipping {} read #{}, cache holds read #{}",
								read.field, read.completed_at, slot.stamp
							);
							outcome.superseded.push(read.field);
						}
					}
					Err(e) => {
						warn!("Failed to read {}, keeping last known value: {}", read.field, e);
						outcome.failed.push(read.field);
					}
				}
			}
			Self::snapshot_of(&slots)
		};

		if !outcome.committed.is_empty() {
			let observers = self.observers.lock().unwrap_or_else(PoisonError::into_inner);
			for observer in observers.iter() {
				observer(&snapshot);
			}
		}

		outcome
	}
}

impl Default for ChainStateCache {
	fn default() -> Self {
		Self::new()
	}
}
