//! Single-writer actor for SQLite.
//!
//! SQLite allows one writer at a time; funneling every mutation through a
//! dedicated connection avoids busy errors under concurrent sync and
//! refund activity. Each job runs inside an immediate transaction.

use std::any::Any;

use diesel::prelude::*;
use diesel::SqliteConnection;
use tokio::sync::{mpsc, oneshot};

use examsync_core::errors::Result;

use super::DbPool;
use crate::errors::StorageError;

/// A write job: borrows the actor's connection, returns through the core
/// error type callers expect.
type Job<T> = Box<dyn FnOnce(&mut SqliteConnection) -> Result<T> + Send + 'static>;

/// Cloneable handle for submitting jobs to the writer actor.
#[derive(Clone)]
pub struct WriteHandle {
    // Boxed Any erases each job's return type so one channel serves all
    // repositories.
    #[allow(clippy::type_complexity)]
    tx: mpsc::Sender<(
        Job<Box<dyn Any + Send + 'static>>,
        oneshot::Sender<Result<Box<dyn Any + Send + 'static>>>,
    )>,
}

impl WriteHandle {
    /// Run `job` on the writer's connection and await its result.
    pub async fn exec<F, T>(&self, job: F) -> Result<T>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<T> + Send + 'static,
        T: Send + 'static + Any,
    {
        let (ret_tx, ret_rx) = oneshot::channel();

        self.tx
            .send((
                Box::new(move |c| job(c).map(|v| Box::new(v) as Box<dyn Any + Send>)),
                ret_tx,
            ))
            .await
            .expect("Writer actor's receiving channel was closed, indicating the actor stopped.");

        ret_rx
            .await
            .expect("Writer actor dropped the reply sender without sending a result.")
            .map(|boxed: Box<dyn Any + Send + 'static>| {
                *boxed
                    .downcast::<T>()
                    .unwrap_or_else(|_| panic!("Failed to downcast writer actor result."))
            })
    }
}

/// Spawn the writer actor. It takes one connection from the pool and holds
/// it for its whole lifetime, processing jobs serially.
pub fn spawn_writer(pool: DbPool) -> WriteHandle {
    let (tx, mut rx) = mpsc::channel::<(
        Job<Box<dyn Any + Send + 'static>>,
        oneshot::Sender<Result<Box<dyn Any + Send + 'static>>>,
    )>(1024);

    tokio::spawn(async move {
        let mut conn = pool
            .get()
            .expect("Failed to get a connection from the DB pool for the writer actor.");

        while let Some((job, reply_tx)) = rx.recv().await {
            let result: Result<Box<dyn Any + Send + 'static>> = conn
                .immediate_transaction::<_, StorageError, _>(|c| {
                    job(c).map_err(StorageError::from)
                })
                .map_err(|e: StorageError| e.into());

            // The receiver may have been dropped by a cancelled caller.
            let _ = reply_tx.send(result);
        }
        // rx yielding None means every WriteHandle was dropped; terminate.
    });

    WriteHandle { tx }
}
