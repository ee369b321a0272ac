use std::path::Path;

use crate::cluster::ClusterResult;
use crate::store::{Store, StoreError};
use crate::table::Table;

/// Explicit per-invocation state: the working table plus the most recent
/// clustering output. Built from the master table or a snapshot at command
/// start and discarded at command end — nothing here is durable until it
/// goes back through the store.
pub struct Session {
    pub table: Table,
    pub last_labels: Option<Vec<usize>>,
    pub last_centroids: Option<ClusterResult>,
}

impl Session {
    pub fn new(table: Table) -> Self {
        Self {
            table,
            last_labels: None,
            last_centroids: None,
        }
    }

    /// Open a session from a snapshot file, or from the master table when
    /// no file is given.
    pub fn open(store: &Store, file: Option<&Path>) -> Result<Self, StoreError> {
        let table = match file {
            Some(path) => Store::load(path)?,
            None => store.load_master()?,
        };
        Ok(Self::new(table))
    }

    /// Record a clustering run. Labels stay session-local until
    /// `commit_clusters` copies them into the working table.
    pub fn record_clustering(&mut self, result: ClusterResult) {
        self.last_labels = Some(result.labels.clone());
        self.last_centroids = Some(result);
    }

    /// Copy the most recent labels into the working table's cluster column.
    /// Returns false when no clustering has run this session.
    pub fn commit_clusters(&mut self) -> Result<bool, crate::table::SchemaError> {
        match &self.last_labels {
            Some(labels) => {
                self.table.apply_clusters(labels)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{DEFAULT_SEED, cluster_tracks};
    use crate::schema::tests::test_row;

    #[test]
    fn test_commit_without_clustering_is_a_noop() {
        let mut session = Session::new(Table::new(vec![test_row()]));
        assert!(!session.commit_clusters().unwrap());
        assert_eq!(session.table.rows[0].cluster, None);
    }

    #[test]
    fn test_cluster_then_commit() {
        let mut a = test_row();
        a.energy = 0.1;
        a.danceability = 0.1;
        let mut b = test_row();
        b.energy = 0.9;
        b.danceability = 0.9;
        let mut session = Session::new(Table::new(vec![a, b]));

        let features = vec!["energy".to_string(), "danceability".to_string()];
        let result = cluster_tracks(&session.table, &features, 2, DEFAULT_SEED).unwrap();
        session.record_clustering(result);

        // Labels are session-local until committed
        assert_eq!(session.table.rows[0].cluster, None);
        assert!(session.commit_clusters().unwrap());
        assert!(session.table.rows.iter().all(|r| r.cluster.is_some()));
        assert_ne!(session.table.rows[0].cluster, session.table.rows[1].cluster);
    }
}
