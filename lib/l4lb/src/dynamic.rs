// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! A versioned, swappable cell for resources the control plane
//! updates while the packet path reads them (e.g., the service table).
//!
//! Readers take a [`Snapshot`]: a reference-counted handle to the
//! value as it was at that moment, tagged with the epoch it was
//! stored in. A writer never modifies a value in place; it installs a
//! replacement, so a reader sees either all of the old value or all of
//! the new one.
//!
//! Writers are serialized among themselves, but the read lock is only
//! ever contended for the length of a pointer swap. Building the
//! replacement happens with no lock on the value held.

use alloc::sync::Arc;
use core::fmt::Debug;
use core::ops::Deref;
use core::sync::atomic::AtomicU64;
use core::sync::atomic::Ordering;
use core::write;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::RwLock;

#[derive(Clone)]
pub struct Dynamic<T>(Arc<InnerDynamic<T>>);

struct InnerDynamic<T> {
    inner: RwLock<Arc<T>>,
    epoch: AtomicU64,
    writer: Mutex<()>,
}

#[derive(Debug)]
pub struct Snapshot<T> {
    pub value: Arc<T>,
    pub epoch: u64,
}

impl<T> From<T> for Dynamic<T> {
    fn from(value: T) -> Self {
        let inner = RwLock::new(value.into());
        Self(
            InnerDynamic {
                inner,
                epoch: AtomicU64::default(),
                writer: Mutex::new(()),
            }
            .into(),
        )
    }
}

impl<T> Dynamic<T> {
    /// Replace the value, returning the new epoch.
    pub fn store(&self, value: T) -> u64 {
        let _writer =
            self.0.writer.lock().unwrap_or_else(PoisonError::into_inner);
        self.swap(value.into())
    }

    // Install `value`. The caller must hold the writer lock.
    fn swap(&self, value: Arc<T>) -> u64 {
        // The slot only ever holds a complete value, so a poisoned lock
        // is still safe to use.
        let (old, epoch) = {
            let mut inner =
                self.0.inner.write().unwrap_or_else(PoisonError::into_inner);
            let old = core::mem::replace(&mut *inner, value);
            (old, self.0.epoch.fetch_add(1, Ordering::Relaxed) + 1)
        };

        // This may be the last reference to the old value.
        drop(old);
        epoch
    }

    pub fn load(&self) -> Snapshot<T> {
        let value_locked =
            self.0.inner.read().unwrap_or_else(PoisonError::into_inner);
        let value = Arc::clone(&*value_locked);
        let epoch = self.0.epoch.load(Ordering::Relaxed);

        Snapshot { epoch, value }
    }

    pub fn epoch(&self) -> u64 {
        self.0.epoch.load(Ordering::Relaxed)
    }
}

impl<T: Clone> Dynamic<T> {
    /// Copy the current value, apply `f` to the copy, and install it
    /// if `f` succeeds. Writers are serialized, so no update is lost.
    ///
    /// Readers are not held up while `f` runs: they keep loading the
    /// current value until the copy is installed. On error the current
    /// value is left as it was.
    pub fn modify<R, E>(
        &self,
        f: impl FnOnce(&mut T) -> Result<R, E>,
    ) -> Result<(R, u64), E> {
        let _writer =
            self.0.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let mut next = T::clone(&self.load().value);
        let res = f(&mut next)?;
        Ok((res, self.swap(next.into())))
    }
}

impl<T: Debug> Debug for Dynamic<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let current_val = self.load();
        write!(f, "{current_val:?}")
    }
}

impl<T> Deref for Snapshot<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.value
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn snapshot_is_stable() {
        let d = Dynamic::from(vec![1, 2, 3]);
        let before = d.load();
        assert_eq!(before.epoch, 0);

        assert_eq!(d.store(vec![4]), 1);
        assert_eq!(*before, vec![1, 2, 3]);
        assert_eq!(*d.load(), vec![4]);
        assert_eq!(d.load().epoch, 1);
    }

    #[test]
    fn modify_is_all_or_nothing() {
        let d = Dynamic::from(vec![1]);

        let res = d
            .modify(|v| {
                v.push(2);
                Err::<(), _>("nope")
            })
            .map(|_| ());
        assert_eq!(res, Err("nope"));
        assert_eq!(*d.load(), vec![1]);
        assert_eq!(d.epoch(), 0);

        let (len, epoch) = d
            .modify(|v| {
                v.push(2);
                Ok::<_, ()>(v.len())
            })
            .unwrap();
        assert_eq!((len, epoch), (2, 1));
        assert_eq!(*d.load(), vec![1, 2]);
    }

    #[test]
    fn concurrent_writers_lose_nothing() {
        let d = Dynamic::from(0u64);
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let d = d.clone();
                thread::spawn(move || {
                    for _ in 0..100 {
                        d.modify(|v| {
                            *v += 1;
                            Ok::<_, ()>(())
                        })
                        .unwrap();
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(*d.load(), 400);
        assert_eq!(d.epoch(), 400);
    }

    #[test]
    fn readers_run_during_modify() {
        let d = Dynamic::from(vec![1]);
        let (started_tx, started_rx) = mpsc::channel();
        let (read_tx, read_rx) = mpsc::channel();

        let reader = {
            let d = d.clone();
            thread::spawn(move || {
                started_rx.recv().unwrap();
                let snap = d.load();
                read_tx.send(snap.value.clone()).unwrap();
                assert_eq!(snap.epoch, 0);
            })
        };

        // The update can only complete once the reader has loaded the
        // value, which it must be able to do while the update is
        // still in progress.
        let (seen, epoch) = d
            .modify(|v| {
                started_tx.send(()).unwrap();
                let seen = read_rx.recv_timeout(Duration::from_secs(10));
                v.push(2);
                Ok::<_, ()>(seen)
            })
            .unwrap();

        reader.join().unwrap();
        assert_eq!(*seen.expect("reader was blocked by modify"), vec![1]);
        assert_eq!(epoch, 1);
        assert_eq!(*d.load(), vec![1, 2]);
    }

    #[test]
    fn store_waits_for_modify() {
        let d = Dynamic::from(0u64);
        let (started_tx, started_rx) = mpsc::channel();

        let writer = {
            let d = d.clone();
            thread::spawn(move || {
                started_rx.recv().unwrap();
                d.store(100)
            })
        };

        d.modify(|v| {
            started_tx.send(()).unwrap();
            thread::sleep(Duration::from_millis(50));
            *v += 1;
            Ok::<_, ()>(())
        })
        .unwrap();

        // The store was queued behind the update rather than being
        // overwritten by it.
        assert_eq!(writer.join().unwrap(), 2);
        assert_eq!(*d.load(), 100);
    }
}
