//! Periodic loader that hydrates the search index from the registrar.
//!
//! The first cycle runs as soon as [`Loader::run`] starts; later cycles run
//! every `load_interval_seconds`. Each cycle fetches the registrar's full
//! record list and adds every record to the [`SearchIndex`]. Failures are
//! logged and the next cycle proceeds on schedule. The loop stops when its
//! [`CancellationToken`] is cancelled, either between cycles or during the
//! sleep.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::index::SearchIndex;
use crate::registrar::Registrar;

/// Outcome of one loader cycle.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LoadReport {
    pub fetched: usize,
    pub added: usize,
    pub skipped: usize,
    pub failed: usize,
}

pub struct Loader {
    registrar: Arc<dyn Registrar>,
    index: SearchIndex,
    interval: Duration,
    skip_existing: bool,
}

impl Loader {
    pub fn new(
        registrar: Arc<dyn Registrar>,
        index: SearchIndex,
        interval: Duration,
        skip_existing: bool,
    ) -> Self {
        Self {
            registrar,
            index,
            interval,
            skip_existing,
        }
    }

    /// Fetches every registrar record and indexes it.
    ///
    /// A registrar failure fails the cycle. A record that cannot be checked
    /// or indexed is logged and counted in [`LoadReport::failed`].
    pub async fn run_cycle(&self) -> Result<LoadReport> {
        let records = self.registrar.list_records().await?;
        let mut report = LoadReport {
            fetched: records.len(),
            ..Default::default()
        };

        for record in records {
            if self.skip_existing {
                match self.index.contains(&record.uuid).await {
                    Ok(true) => {
                        report.skipped += 1;
                        continue;
                    }
                    Ok(false) => {}
                    Err(e) => {
                        tracing::error!(uuid = %record.uuid, error = %e, "failed to check record");
                        report.failed += 1;
                        continue;
                    }
                }
            }

            tracing::info!(uuid = %record.uuid, name = %record.name, "adding element");
            match self
                .index
                .add(&record.uuid, &record.name, &record.description)
                .await
            {
                Ok(_) => report.added += 1,
                Err(e) => {
                    tracing::error!(uuid = %record.uuid, error = %e, "failed to index record");
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    /// Runs cycles until `token` is cancelled.
    pub async fn run(self, token: CancellationToken) {
        tracing::info!(interval_secs = self.interval.as_secs(), "loader started");

        while !token.is_cancelled() {
            match self.run_cycle().await {
                Ok(report) => tracing::info!(
                    fetched = report.fetched,
                    added = report.added,
                    skipped = report.skipped,
                    failed = report.failed,
                    "loader cycle complete"
                ),
                Err(e) => tracing::error!(error = %e, "Error loading data"),
            }

            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        tracing::info!("loader stopped");
    }

    pub fn spawn(self, token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashedEmbedder;
    use crate::index::tests::{test_index, StaticArtifacts};
    use crate::models::RegistrarRecord;
    use crate::store::memory::InMemoryStore;
    use crate::store::{VectorMatch, VectorRecord, VectorStore};
    use anyhow::bail;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedRegistrar {
        records: Vec<RegistrarRecord>,
        calls: AtomicUsize,
        fail: bool,
    }

    impl FixedRegistrar {
        fn new(records: Vec<RegistrarRecord>) -> Self {
            Self {
                records,
                calls: AtomicUsize::new(0),
                fail: false,
            }
        }
    }

    #[async_trait]
    impl Registrar for FixedRegistrar {
        async fn list_records(&self) -> Result<Vec<RegistrarRecord>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                bail!("registrar unreachable");
            }
            Ok(self.records.clone())
        }
    }

    /// In-memory store whose existence check fails for one registrar id.
    struct UncheckableStore {
        inner: InMemoryStore,
        broken_id: String,
    }

    #[async_trait]
    impl VectorStore for UncheckableStore {
        fn collection(&self) -> &str {
            self.inner.collection()
        }
        async fn add(&self, record: &VectorRecord) -> Result<()> {
            self.inner.add(record).await
        }
        async fn query(&self, vector: &[f32], limit: usize) -> Result<Vec<VectorMatch>> {
            self.inner.query(vector, limit).await
        }
        async fn contains_external_id(&self, external_id: &str) -> Result<bool> {
            if external_id == self.broken_id {
                bail!("lookup failed");
            }
            self.inner.contains_external_id(external_id).await
        }
        async fn count(&self) -> Result<usize> {
            self.inner.count().await
        }
    }

    fn record(uuid: &str, name: &str, description: &str) -> RegistrarRecord {
        RegistrarRecord {
            uuid: uuid.to_string(),
            name: name.to_string(),
            description: description.to_string(),
        }
    }

    #[tokio::test]
    async fn test_cycle_makes_records_searchable() {
        let index = test_index(&[]);
        let registrar = Arc::new(FixedRegistrar::new(vec![record("1", "n", "d")]));
        let loader = Loader::new(registrar, index.clone(), Duration::from_secs(60), true);

        let report = loader.run_cycle().await.unwrap();
        assert_eq!(report.fetched, 1);
        assert_eq!(report.added, 1);

        let res = index.search("d", 1).await.unwrap();
        assert_eq!(res.len(), 1);
        assert_eq!(res[0].metadata.id, "1");
        assert_eq!(res[0].metadata.name, "n");
    }

    #[tokio::test]
    async fn test_repeat_cycles_skip_existing() {
        let index = test_index(&[]);
        let registrar = Arc::new(FixedRegistrar::new(vec![
            record("1", "a", "alpha"),
            record("2", "b", "beta"),
        ]));
        let loader = Loader::new(registrar, index.clone(), Duration::from_secs(60), true);

        loader.run_cycle().await.unwrap();
        let second = loader.run_cycle().await.unwrap();
        assert_eq!(second.skipped, 2);
        assert_eq!(second.added, 0);
        assert_eq!(index.len().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_repeat_cycles_without_skip_duplicate() {
        let index = test_index(&[]);
        let registrar = Arc::new(FixedRegistrar::new(vec![record("1", "a", "alpha")]));
        let loader = Loader::new(registrar, index.clone(), Duration::from_secs(60), false);

        loader.run_cycle().await.unwrap();
        loader.run_cycle().await.unwrap();
        assert_eq!(index.len().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_failed_existence_check_counts_record_and_continues() {
        let index = SearchIndex::new(
            Arc::new(UncheckableStore {
                inner: InMemoryStore::new("test"),
                broken_id: "2".to_string(),
            }),
            Arc::new(HashedEmbedder::new(1024)),
            Arc::new(StaticArtifacts { failing: vec![] }),
        );
        let registrar = Arc::new(FixedRegistrar::new(vec![
            record("1", "a", "alpha"),
            record("2", "b", "beta"),
            record("3", "c", "gamma"),
        ]));
        let loader = Loader::new(registrar, index.clone(), Duration::from_secs(60), true);

        let report = loader.run_cycle().await.unwrap();
        assert_eq!(report.fetched, 3);
        assert_eq!(report.added, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(index.len().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_registrar_failure_fails_cycle() {
        let index = test_index(&[]);
        let mut registrar = FixedRegistrar::new(vec![]);
        registrar.fail = true;
        let loader = Loader::new(Arc::new(registrar), index, Duration::from_secs(60), true);
        assert!(loader.run_cycle().await.is_err());
    }

    #[tokio::test]
    async fn test_run_loads_immediately_and_stops_on_cancel() {
        let index = test_index(&[]);
        let registrar = Arc::new(FixedRegistrar::new(vec![record("1", "n", "d")]));
        let loader = Loader::new(
            registrar.clone(),
            index.clone(),
            Duration::from_secs(3600),
            true,
        );

        let token = CancellationToken::new();
        let handle = loader.spawn(token.clone());

        // The first cycle does not wait for the interval.
        for _ in 0..100 {
            if index.len().await.unwrap() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(index.len().await.unwrap(), 1);

        token.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("loader did not stop")
            .unwrap();
        assert_eq!(registrar.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_run_survives_failing_cycles() {
        let index = test_index(&[]);
        let mut registrar = FixedRegistrar::new(vec![]);
        registrar.fail = true;
        let registrar = Arc::new(registrar);
        let loader = Loader::new(registrar.clone(), index, Duration::from_millis(10), true);

        let token = CancellationToken::new();
        let handle = loader.spawn(token.clone());
        tokio::time::sleep(Duration::from_millis(100)).await;
        token.cancel();
        handle.await.unwrap();

        assert!(registrar.calls.load(Ordering::SeqCst) >= 2);
    }
}
