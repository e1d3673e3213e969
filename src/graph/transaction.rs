//! Explicit unit of work over a [`GraphStore`]
//!
//! A transaction borrows the store mutably for its whole lifetime and keeps
//! a rollback image taken at `begin`. Work happens through `Deref`/`DerefMut`,
//! so a `&mut Transaction` can be passed wherever a `&mut GraphStore` is
//! expected. Dropping an uncommitted transaction restores the image, which
//! is what makes a failed cascade leave no partial writes behind.

use super::store::GraphStore;
use std::ops::{Deref, DerefMut};
use tracing::debug;

pub struct Transaction<'g> {
    store: &'g mut GraphStore,
    snapshot: Option<GraphStore>,
}

impl<'g> Transaction<'g> {
    pub(crate) fn new(store: &'g mut GraphStore) -> Self {
        let snapshot = Some(store.clone());
        Transaction { store, snapshot }
    }

    /// Keep everything written since `begin`
    pub fn commit(mut self) {
        self.snapshot = None;
        debug!("transaction committed");
    }

    /// Discard everything written since `begin`
    pub fn rollback(mut self) {
        self.restore();
    }

    pub fn is_active(&self) -> bool {
        self.snapshot.is_some()
    }

    fn restore(&mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            *self.store = snapshot;
            debug!("transaction rolled back");
        }
    }
}

impl Deref for Transaction<'_> {
    type Target = GraphStore;

    fn deref(&self) -> &GraphStore {
        self.store
    }
}

impl DerefMut for Transaction<'_> {
    fn deref_mut(&mut self) -> &mut GraphStore {
        self.store
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        self.restore();
    }
}
