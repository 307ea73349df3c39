//! Single writer thread. Each job runs inside an immediate transaction.

use diesel::sqlite::SqliteConnection;
use diesel::Connection;
use log::{debug, error};
use tokio::sync::{mpsc, oneshot};

use mizanflow_core::errors::{Error, Result};

use super::DbPool;
use crate::errors::StorageError;

type Job = Box<dyn FnOnce(&mut SqliteConnection) + Send>;

/// Cloneable handle to the writer thread.
#[derive(Clone)]
pub struct WriteHandle {
    jobs: mpsc::UnboundedSender<Job>,
}

/// Error carried out of a writer transaction.
enum TxError {
    Db(diesel::result::Error),
    Job(Error),
}

impl From<diesel::result::Error> for TxError {
    fn from(err: diesel::result::Error) -> Self {
        TxError::Db(err)
    }
}

impl WriteHandle {
    /// Runs `job` on the writer connection and waits for its result.
    ///
    /// An `Err` from `job` rolls the whole transaction back.
    pub async fn exec<F, R>(&self, job: F) -> Result<R>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let wrapped: Job = Box::new(move |conn| {
            let result = conn
                .immediate_transaction::<R, TxError, _>(|tx| job(tx).map_err(TxError::Job))
                .map_err(|err| match err {
                    TxError::Db(err) => Error::from(StorageError::from(err)),
                    TxError::Job(err) => err,
                });
            let _ = reply_tx.send(result);
        });

        self.jobs
            .send(wrapped)
            .map_err(|_| StorageError::Writer("writer thread has stopped".to_string()))?;
        reply_rx
            .await
            .map_err(|_| StorageError::Writer("writer dropped the request".to_string()))?
    }
}

/// Starts the writer thread. It holds one pooled connection until every
/// handle is dropped.
pub fn spawn_writer(pool: DbPool) -> WriteHandle {
    let (jobs, mut queue) = mpsc::unbounded_channel::<Job>();
    std::thread::spawn(move || {
        let mut conn = match pool.get() {
            Ok(conn) => conn,
            Err(err) => {
                error!("[DB] Writer could not acquire a connection: {}", err);
                return;
            }
        };
        while let Some(job) = queue.blocking_recv() {
            job(&mut *conn);
        }
        debug!("[DB] Writer stopped");
    });
    WriteHandle { jobs }
}
