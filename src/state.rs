//! In-memory hostname mappings backed by Traefik router polling.
//!
//! The store is written only by the reconciler and read by every query.
//! One reconciliation pass is applied inside a single write-lock critical
//! section, so readers see either the state before or after a pass and
//! never something in between.

use hickory_proto::rr::Name;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Arc;
use tracing::debug;

use crate::metrics;

/// Synthesized answer template for one host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MappingEntry {
    /// Answer with a single CNAME pointing at `target`.
    Cname {
        /// Fully-qualified CNAME target.
        target: Name,
        /// Record TTL in seconds.
        ttl: u32,
    },
    /// Answer with one A record per address, in order.
    Address {
        /// IPv4 addresses to return.
        addresses: Vec<Ipv4Addr>,
        /// Record TTL in seconds.
        ttl: u32,
    },
}

impl MappingEntry {
    /// TTL of the records built from this entry.
    pub fn ttl(&self) -> u32 {
        match self {
            MappingEntry::Cname { ttl, .. } | MappingEntry::Address { ttl, .. } => *ttl,
        }
    }
}

impl std::fmt::Display for MappingEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MappingEntry::Cname { target, .. } => write!(f, "CNAME {target}"),
            MappingEntry::Address { addresses, .. } => {
                let ips: Vec<String> = addresses.iter().map(ToString::to_string).collect();
                write!(f, "A {}", ips.join(","))
            }
        }
    }
}

/// Result of applying one diff to the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Applied {
    /// Number of hosts inserted.
    pub added: usize,
    /// Number of hosts removed.
    pub removed: usize,
}

impl Applied {
    /// True when the diff changed nothing.
    pub fn is_empty(&self) -> bool {
        self.added == 0 && self.removed == 0
    }
}

/// Thread-safe hostname → [`MappingEntry`] store plus readiness flag.
#[derive(Debug, Clone, Default)]
pub struct MappingStore {
    inner: Arc<RwLock<MappingStoreInner>>,
}

#[derive(Debug, Default)]
struct MappingStoreInner {
    /// lower-cased host -> entry
    mappings: HashMap<String, Arc<MappingEntry>>,

    /// Incremented on every apply that changed something
    generation: u64,

    /// Set once the first reconciliation pass has finished
    ready: bool,
}

impl MappingStore {
    /// Create a new empty, not-ready store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the entry for an already-normalized host.
    pub fn get(&self, host: &str) -> Option<Arc<MappingEntry>> {
        self.inner.read().mappings.get(host).cloned()
    }

    /// Check if the given host is mapped.
    pub fn contains(&self, host: &str) -> bool {
        self.inner.read().mappings.contains_key(host)
    }

    /// Snapshot of every mapped host, sorted.
    pub fn hosts(&self) -> Vec<String> {
        let inner = self.inner.read();
        let mut hosts: Vec<String> = inner.mappings.keys().cloned().collect();
        hosts.sort_unstable();
        hosts
    }

    /// Insert `adds` and delete `removes` in one critical section.
    ///
    /// Hosts already present are left untouched, and removals of absent
    /// hosts are ignored, so the returned counts reflect what actually
    /// changed.
    pub fn apply_diff<I, R>(&self, adds: I, removes: R) -> Applied
    where
        I: IntoIterator<Item = (String, Arc<MappingEntry>)>,
        R: IntoIterator<Item = String>,
    {
        let mut inner = self.inner.write();
        let mut applied = Applied::default();

        for (host, entry) in adds {
            if inner.mappings.contains_key(&host) {
                continue;
            }
            debug!(host = %host, "inserting mapping");
            inner.mappings.insert(host, entry);
            applied.added += 1;
        }

        for host in removes {
            if inner.mappings.remove(&host).is_some() {
                debug!(host = %host, "removed mapping");
                applied.removed += 1;
            }
        }

        if !applied.is_empty() {
            inner.generation = inner.generation.wrapping_add(1);
        }

        applied
    }

    /// Mark the store as ready. Idempotent; never reverts.
    pub fn set_ready(&self) {
        let mut inner = self.inner.write();
        if !inner.ready {
            inner.ready = true;
            debug!(mappings = inner.mappings.len(), "mapping store ready");
        }
    }

    /// Check whether the first reconciliation pass has completed.
    pub fn is_ready(&self) -> bool {
        self.inner.read().ready
    }

    /// Get count of mapped hosts.
    pub fn len(&self) -> usize {
        self.inner.read().mappings.len()
    }

    /// True when no host is mapped.
    pub fn is_empty(&self) -> bool {
        self.inner.read().mappings.is_empty()
    }

    /// Number of applies that changed the store.
    pub fn generation(&self) -> u64 {
        self.inner.read().generation
    }

    /// Emit current state metrics.
    pub fn emit_metrics(&self) {
        let inner = self.inner.read();
        metrics::record_state(inner.mappings.len(), inner.ready, inner.generation);
    }
}
