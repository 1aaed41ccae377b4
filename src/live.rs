/*!
    Live queries: result sets that refresh themselves whenever a
    committed write touches one of the tables they read from.
!*/
use std::future::Future;

use sqlx::SqlitePool;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};

use crate::tidy::{Error, Result};

const DEFAULT_CAPACITY: usize = 64;

/// The table a committed write touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableChange {
    Task,
    Category,
}

/// Registry of live query observers. Cloning shares the same registry.
#[derive(Debug, Clone)]
pub struct ChangeNotifier {
    tx: broadcast::Sender<TableChange>,
}

impl ChangeNotifier {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        ChangeNotifier { tx }
    }

    /// Announces a committed write. Returns the number of observers reached.
    pub fn notify(&self, change: TableChange) -> usize {
        self.tx.send(change).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TableChange> {
        self.tx.subscribe()
    }
}

impl Default for ChangeNotifier {
    fn default() -> Self {
        Self::new()
    }
}

/// A query shape that can be observed.
pub trait Query {
    type Item;

    fn fetch(&self, pool: &SqlitePool) -> impl Future<Output = Result<Vec<Self::Item>>> + Send;

    /// Whether a write to `table` can change this query's result.
    fn watches(&self, table: TableChange) -> bool;
}

/// A live result sequence. The first call to [`LiveQuery::next`] yields the
/// current rows; every later call waits for a relevant write and yields a
/// fresh full snapshot. Dropping the value stops observing.
pub struct LiveQuery<Q: Query> {
    pool: SqlitePool,
    query: Q,
    changes: broadcast::Receiver<TableChange>,
    primed: bool,
}

impl<Q: Query> LiveQuery<Q> {
    /// `changes` must be subscribed before the first fetch so that no
    /// write in between goes unnoticed.
    pub fn new(pool: SqlitePool, query: Q, changes: broadcast::Receiver<TableChange>) -> Self {
        LiveQuery {
            pool,
            query,
            changes,
            primed: false,
        }
    }

    pub async fn next(&mut self) -> Result<Vec<Q::Item>> {
        if self.primed {
            self.wait_for_change().await?;
        }
        self.primed = true;
        self.query.fetch(&self.pool).await
    }

    async fn wait_for_change(&mut self) -> Result<()> {
        loop {
            match self.changes.recv().await {
                Ok(table) if self.query.watches(table) => break,
                Ok(_) => continue,
                // Missed notifications might have been relevant.
                Err(RecvError::Lagged(_)) => break,
                Err(RecvError::Closed) => return Err(Error::Closed),
            }
        }
        // A burst of writes yields a single refresh.
        loop {
            match self.changes.try_recv() {
                Ok(_) | Err(TryRecvError::Lagged(_)) => continue,
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
        Ok(())
    }
}
