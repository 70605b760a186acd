// Copyright (c) The water-vm Authors
// SPDX-License-Identifier: Apache-2.0

//! FD table: `int -> Channel`, fds `0/1/2` reserved for stdio, fresh fds
//! start at 3 (distilled spec §3). Shared across all threads of the
//! running program, so lookups and mutations go through a `dashmap`
//! (per the concurrency model's "all operations must be atomic").

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;

use super::channel::{Channel, StdioChannel, StdioKind};

pub const STDIN: i32 = 0;
pub const STDOUT: i32 = 1;
pub const STDERR: i32 = 2;
const FIRST_DYNAMIC_FD: i32 = 3;

pub struct FdTable {
    entries: DashMap<i32, Arc<Mutex<Box<dyn Channel>>>>,
    next_fd: AtomicI32,
}

impl FdTable {
    pub fn new() -> Self {
        let entries = DashMap::new();
        entries.insert(
            STDIN,
            Arc::new(Mutex::new(Box::new(StdioChannel::new(StdioKind::Stdin)) as Box<dyn Channel>)),
        );
        entries.insert(
            STDOUT,
            Arc::new(Mutex::new(Box::new(StdioChannel::new(StdioKind::Stdout)) as Box<dyn Channel>)),
        );
        entries.insert(
            STDERR,
            Arc::new(Mutex::new(Box::new(StdioChannel::new(StdioKind::Stderr)) as Box<dyn Channel>)),
        );
        Self {
            entries,
            next_fd: AtomicI32::new(FIRST_DYNAMIC_FD),
        }
    }

    /// Registers a new channel, returning a fresh fd.
    pub fn register(&self, channel: Box<dyn Channel>) -> i32 {
        let fd = self.next_fd.fetch_add(1, Ordering::SeqCst);
        self.entries.insert(fd, Arc::new(Mutex::new(channel)));
        fd
    }

    pub fn get(&self, fd: i32) -> Option<Arc<Mutex<Box<dyn Channel>>>> {
        self.entries.get(&fd).map(|entry| entry.value().clone())
    }

    /// `dup(fd)`: a new fd sharing the underlying channel.
    pub fn dup(&self, fd: i32) -> Option<i32> {
        let channel = self.get(fd)?;
        let new_fd = self.next_fd.fetch_add(1, Ordering::SeqCst);
        self.entries.insert(new_fd, channel);
        Some(new_fd)
    }

    /// `dup2(old, new)`: closes `new` if occupied, then aliases `old`.
    pub fn dup2(&self, old: i32, new: i32) -> Option<i32> {
        let channel = self.get(old)?;
        self.entries.insert(new, channel);
        Some(new)
    }

    /// Replaces the channel at `fd` in place, used by `CONNECT` to upgrade
    /// a raw placeholder fd into a real connected socket (distilled spec
    /// §4.5).
    pub fn replace(&self, fd: i32, channel: Box<dyn Channel>) {
        self.entries.insert(fd, Arc::new(Mutex::new(channel)));
    }

    pub fn close(&self, fd: i32) -> bool {
        self.entries.remove(&fd).is_some()
    }

    pub fn contains(&self, fd: i32) -> bool {
        self.entries.contains_key(&fd)
    }

    /// Closes every fd; called on engine teardown.
    pub fn close_all(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

impl Default for FdTable {
    fn default() -> Self {
        Self::new()
    }
}
