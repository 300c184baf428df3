//! Periodic reconciliation of Traefik routers into the mapping store.

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::error::FetchError;
use crate::hosts::HostExtractor;
use crate::metrics::{self, ReconcileOutcome};
use crate::router::HttpRouter;
use crate::source::RuleSource;
use crate::state::{Applied, MappingStore};

/// Hosts to insert and delete for one pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diff {
    /// Hosts resolved this pass but not yet in the store.
    pub additions: Vec<String>,
    /// Hosts in the store that this pass no longer resolves.
    pub removals: Vec<String>,
}

/// Drives fetch → extract → diff → apply against a [`MappingStore`].
///
/// The reconciler is the only writer of its store.
pub struct Reconciler {
    source: Arc<dyn RuleSource>,
    extractor: Arc<dyn HostExtractor>,
    store: MappingStore,
    settings: Arc<Settings>,
}

impl Reconciler {
    /// Create a reconciler writing into `store`.
    pub fn new(
        source: Arc<dyn RuleSource>,
        extractor: Arc<dyn HostExtractor>,
        store: MappingStore,
        settings: Arc<Settings>,
    ) -> Self {
        Self {
            source,
            extractor,
            store,
            settings,
        }
    }

    /// Get a reference to the store this reconciler writes.
    pub fn store(&self) -> &MappingStore {
        &self.store
    }

    /// Collect the distinct hosts governed by `routers`.
    ///
    /// In CNAME mode the CNAME target itself is skipped so it never
    /// answers with a CNAME to itself.
    pub fn resolve_hosts(&self, routers: &[HttpRouter]) -> BTreeSet<String> {
        let mut hosts = BTreeSet::new();
        for router in routers {
            for host in self.extractor.extract_hosts(&router.rule) {
                if self.settings.cname_host.as_deref() == Some(host.as_str()) {
                    debug!(host = %host, router = %router.name, "skipping CNAME self-reference");
                    continue;
                }
                hosts.insert(host);
            }
        }
        hosts
    }

    /// Compare a resolved host set against the current store contents.
    pub fn diff(&self, resolved: &BTreeSet<String>) -> Diff {
        let current: BTreeSet<String> = self.store.hosts().into_iter().collect();
        Diff {
            additions: resolved.difference(&current).cloned().collect(),
            removals: current.difference(resolved).cloned().collect(),
        }
    }

    /// Run one reconciliation pass.
    ///
    /// The store is marked ready once the pass finishes, whether or not the
    /// fetch succeeded. A failed fetch leaves the store untouched.
    pub async fn reconcile(&self) -> Result<Applied, FetchError> {
        let first = !self.store.is_ready();
        if first {
            info!("Checking for Traefik HTTP routers...");
        }

        let routers = match self.source.fetch().await {
            Ok(routers) => routers,
            Err(e) => {
                metrics::record_reconcile(ReconcileOutcome::FetchError, 0, 0);
                self.store.set_ready();
                return Err(e);
            }
        };

        let resolved = self.resolve_hosts(&routers);
        let mut diff = self.diff(&resolved);

        if resolved.is_empty() && !diff.removals.is_empty() && !self.settings.prune_on_empty {
            warn!(
                routers = routers.len(),
                kept = diff.removals.len(),
                "Traefik returned no hosts, keeping existing mappings"
            );
            diff.removals.clear();
        }

        let entry = &self.settings.entry;
        for host in &diff.additions {
            info!(host = %host, "+ {}", entry);
        }
        for host in &diff.removals {
            info!(host = %host, "- {}", entry);
        }

        let adds = diff
            .additions
            .into_iter()
            .map(|host| (host, Arc::clone(entry)));
        let applied = self.store.apply_diff(adds, diff.removals);

        if applied.is_empty() {
            if first && resolved.is_empty() {
                warn!("No hosts loaded from Traefik HTTP routers, will try again");
            } else {
                debug!("No changes detected");
            }
        } else {
            info!(
                added = applied.added,
                removed = applied.removed,
                total = self.store.len(),
                "Applied Traefik router changes"
            );
        }

        metrics::record_reconcile(ReconcileOutcome::Success, applied.added, applied.removed);
        self.store.set_ready();
        Ok(applied)
    }

    /// Reconcile immediately, then every refresh interval until `shutdown`
    /// resolves. A pass in progress always runs to completion.
    pub async fn run<F>(self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        info!(
            interval_secs = self.settings.refresh_interval.as_secs(),
            url = %self.settings.routers_url,
            "Starting reconciler"
        );

        let mut interval = tokio::time::interval(self.settings.refresh_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => {
                    info!("Reconciler received shutdown signal");
                    return;
                }

                _ = interval.tick() => {
                    debug!("Refreshing Traefik routers");
                    if let Err(e) = self.reconcile().await {
                        warn!(error = %e, "Failed to load Traefik HTTP routers, will retry");
                    }
                }
            }
        }
    }
}
