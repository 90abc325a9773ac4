//! Shared link frontier
//!
//! Tracks which links have been handed out for fetching (visited) and which are still
//! waiting (unvisited). All mutation happens under one mutex so that dequeuing a link
//! and marking it visited is a single step from every worker's point of view. Size
//! queries read atomics mirrored under that mutex and never block.

use crate::CrawlError;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

/// Serializable form of the frontier
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrontierSnapshot {
    /// Links already handed out, sorted
    pub visited: Vec<String>,
    /// Links waiting to be fetched, in queue order
    pub unvisited: Vec<String>,
}

#[derive(Debug, Default)]
struct FrontierState {
    visited: HashSet<String>,
    unvisited: VecDeque<String>,
    // mirror of `unvisited` for O(1) duplicate checks
    queued: HashSet<String>,
}

/// Visited set plus bounded FIFO of unvisited links
#[derive(Debug)]
pub struct Frontier {
    state: Mutex<FrontierState>,
    capacity: usize,
    visited_len: AtomicUsize,
    unvisited_len: AtomicUsize,
}

impl Frontier {
    /// Creates an empty frontier whose queue holds at most `capacity` links
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(FrontierState::default()),
            capacity,
            visited_len: AtomicUsize::new(0),
            unvisited_len: AtomicUsize::new(0),
        }
    }

    /// Rebuilds a frontier from a snapshot
    ///
    /// Links present in both halves stay visited, and the queue is cut back to
    /// `capacity` if the snapshot was taken under a larger limit.
    pub fn from_snapshot(snapshot: FrontierSnapshot, capacity: usize) -> Self {
        let frontier = Self::new(capacity);
        {
            let mut state = frontier.lock();
            state.visited = snapshot.visited.into_iter().collect();
            for link in snapshot.unvisited {
                if state.unvisited.len() >= capacity {
                    break;
                }
                if state.visited.contains(&link) || !state.queued.insert(link.clone()) {
                    continue;
                }
                state.unvisited.push_back(link);
            }
            frontier.publish_sizes(&state);
        }
        frontier
    }

    fn lock(&self) -> MutexGuard<'_, FrontierState> {
        // every critical section leaves the state consistent, so a poisoned lock is still usable
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn publish_sizes(&self, state: &FrontierState) {
        self.visited_len.store(state.visited.len(), Ordering::Relaxed);
        self.unvisited_len
            .store(state.unvisited.len(), Ordering::Relaxed);
    }

    /// Initializes the frontier from the links found on the start page
    ///
    /// The start link itself is marked visited. Fails with `NoLinksFound` when the
    /// start page yielded nothing, in which case the frontier is left untouched.
    ///
    /// # Returns
    ///
    /// The number of links enqueued
    pub fn seed<I>(&self, start: &str, links: I) -> Result<usize, CrawlError>
    where
        I: IntoIterator<Item = String>,
    {
        let mut links = links.into_iter().peekable();
        if links.peek().is_none() {
            return Err(CrawlError::NoLinksFound {
                url: start.to_string(),
            });
        }

        self.mark_visited(start);
        Ok(self.offer_discovered(links))
    }

    /// Dequeues the next link and marks it visited in the same critical section
    ///
    /// Returns None when the queue is empty, which ends the calling worker's run.
    pub fn next_unvisited(&self) -> Option<String> {
        let mut state = self.lock();
        let link = state.unvisited.pop_front()?;
        state.queued.remove(&link);
        state.visited.insert(link.clone());
        self.publish_sizes(&state);
        Some(link)
    }

    /// Enqueues every link that is neither visited nor already queued
    ///
    /// Once the queue reaches its capacity the remaining links are dropped.
    ///
    /// # Returns
    ///
    /// The number of links actually enqueued
    pub fn offer_discovered<I>(&self, links: I) -> usize
    where
        I: IntoIterator<Item = String>,
    {
        let mut state = self.lock();
        let mut added = 0;

        for link in links {
            if state.unvisited.len() >= self.capacity {
                break;
            }
            if state.visited.contains(&link) || state.queued.contains(&link) {
                continue;
            }
            state.queued.insert(link.clone());
            state.unvisited.push_back(link);
            added += 1;
        }

        self.publish_sizes(&state);
        added
    }

    /// Marks a link visited without fetching it, removing it from the queue if present
    ///
    /// Returns true if the link was not visited before.
    pub fn mark_visited(&self, link: &str) -> bool {
        let mut state = self.lock();
        if state.queued.remove(link) {
            state.unvisited.retain(|queued| queued != link);
        }
        let inserted = state.visited.insert(link.to_string());
        self.publish_sizes(&state);
        inserted
    }

    /// Returns true if the link has been handed out or marked
    pub fn is_visited(&self, link: &str) -> bool {
        self.lock().visited.contains(link)
    }

    /// Returns true while the queue is below its capacity (best effort)
    pub fn has_capacity(&self) -> bool {
        self.unvisited_len() < self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of visited links (best effort)
    pub fn visited_len(&self) -> usize {
        self.visited_len.load(Ordering::Relaxed)
    }

    /// Number of queued links (best effort)
    pub fn unvisited_len(&self) -> usize {
        self.unvisited_len.load(Ordering::Relaxed)
    }

    /// Consistent copy of both halves
    pub fn snapshot(&self) -> FrontierSnapshot {
        let state = self.lock();
        let mut visited: Vec<String> = state.visited.iter().cloned().collect();
        visited.sort();
        FrontierSnapshot {
            visited,
            unvisited: state.unvisited.iter().cloned().collect(),
        }
    }
}
