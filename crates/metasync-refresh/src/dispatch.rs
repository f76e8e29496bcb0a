//! Bounded fan-out of per-entity reconcile work.
//!
//! Every entity gets its own tokio task. A semaphore sized from
//! [`ConcurrencyLimits`] caps how many run at once, and each task body is
//! wrapped in `catch_unwind` so one entity's panic is logged and counted
//! like any other failure instead of tearing down the pass.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use metasync_core::ConcurrencyLimits;
use metasync_state::{
    AccessVmRecord, ClusterRegistration, DataSource, EsStorage, InfluxdbClusterInfo,
    InfluxdbHostInfo, InfluxdbStorage, InfluxdbTagInfo, KafkaTopicInfo, Record, RestoreJob,
};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// Something a refresh pass reconciles, identified in logs by [`Entity::id`].
pub trait Entity: Send + 'static {
    fn id(&self) -> String;
}

macro_rules! record_entity {
    ($($ty:ty),* $(,)?) => {
        $(impl Entity for $ty {
            fn id(&self) -> String {
                format!("{}/{}", <$ty as Record>::KIND, self.key())
            }
        })*
    };
}

record_entity!(
    EsStorage,
    DataSource,
    RestoreJob,
    KafkaTopicInfo,
    ClusterRegistration,
    InfluxdbHostInfo,
    InfluxdbClusterInfo,
    InfluxdbStorage,
    AccessVmRecord,
    InfluxdbTagInfo,
);

/// Tally of one dispatch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    pub dispatched: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub panicked: usize,
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Dispatcher {
    limits: ConcurrencyLimits,
}

impl Dispatcher {
    pub fn new(limits: ConcurrencyLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &ConcurrencyLimits {
        &self.limits
    }

    /// Run `reconcile` over every entity and wait for all of them.
    ///
    /// At most `limits.limit_for(task)` bodies are in flight at a time.
    /// Errors and panics are logged with the entity id and counted; they
    /// never stop siblings and are not returned.
    pub async fn run<T, F, Fut>(&self, task: &str, entities: Vec<T>, reconcile: F) -> DispatchSummary
    where
        T: Entity,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let limit = self.limits.limit_for(task);
        let semaphore = Arc::new(Semaphore::new(limit));
        let reconcile = Arc::new(reconcile);
        let mut workers = JoinSet::new();
        let mut summary = DispatchSummary::default();

        for entity in entities {
            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                warn!(task, "dispatch semaphore closed, stopping early");
                break;
            };
            let reconcile = reconcile.clone();
            summary.dispatched += 1;
            workers.spawn(async move {
                let _permit = permit;
                let id = entity.id();
                let outcome = AssertUnwindSafe(async move { reconcile(entity).await })
                    .catch_unwind()
                    .await;
                (id, outcome)
            });
        }

        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok((_, Ok(Ok(())))) => summary.succeeded += 1,
                Ok((id, Ok(Err(e)))) => {
                    warn!(task, entity = %id, error = %e, "reconcile failed");
                    summary.failed += 1;
                }
                Ok((id, Err(panic))) => {
                    error!(task, entity = %id, panic = %panic_message(panic.as_ref()), "reconcile panicked");
                    summary.panicked += 1;
                }
                Err(e) => {
                    error!(task, error = %e, "reconcile worker aborted");
                    summary.panicked += 1;
                }
            }
        }

        info!(
            task,
            limit,
            dispatched = summary.dispatched,
            failed = summary.failed,
            panicked = summary.panicked,
            "refresh dispatch finished"
        );
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct Item(usize);

    impl Entity for Item {
        fn id(&self) -> String {
            format!("item-{}", self.0)
        }
    }

    fn items(n: usize) -> Vec<Item> {
        (0..n).map(Item).collect()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn caps_in_flight_work() {
        let dispatcher = Dispatcher::new(ConcurrencyLimits::new(10).with_limit("t", 5));
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let done = Arc::new(AtomicUsize::new(0));

        let (f, p, d) = (in_flight.clone(), peak.clone(), done.clone());
        let summary = dispatcher
            .run("t", items(50), move |_item| {
                let (f, p, d) = (f.clone(), p.clone(), d.clone());
                async move {
                    let now = f.fetch_add(1, Ordering::SeqCst) + 1;
                    p.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    f.fetch_sub(1, Ordering::SeqCst);
                    d.fetch_add(1, Ordering::SeqCst);
                    Ok::<(), anyhow::Error>(())
                }
            })
            .await;

        assert_eq!(summary.dispatched, 50);
        assert_eq!(summary.succeeded, 50);
        assert_eq!(done.load(Ordering::SeqCst), 50);
        assert!(peak.load(Ordering::SeqCst) <= 5);
        assert!(peak.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn panics_and_errors_are_isolated() {
        let dispatcher = Dispatcher::default();
        let done = Arc::new(AtomicUsize::new(0));

        let d = done.clone();
        let summary = dispatcher
            .run("t", items(10), move |item| {
                let d = d.clone();
                async move {
                    match item.0 {
                        7 => panic!("boom"),
                        3 => anyhow::bail!("upstream unavailable"),
                        _ => {
                            d.fetch_add(1, Ordering::SeqCst);
                            Ok::<(), anyhow::Error>(())
                        }
                    }
                }
            })
            .await;

        assert_eq!(done.load(Ordering::SeqCst), 8);
        assert_eq!(
            summary,
            DispatchSummary {
                dispatched: 10,
                succeeded: 8,
                failed: 1,
                panicked: 1,
            }
        );
    }

    #[tokio::test]
    async fn empty_input_dispatches_nothing() {
        let summary = Dispatcher::default()
            .run("t", Vec::<Item>::new(), |_item| async { Ok::<(), anyhow::Error>(()) })
            .await;
        assert_eq!(summary, DispatchSummary::default());
    }

    #[test]
    fn record_entity_ids_carry_kind() {
        let job = RestoreJob {
            restore_id: 9,
            table_id: "2_bklog.app".to_string(),
            total_doc_count: 1,
            complete_doc_count: 0,
            is_deleted: false,
        };
        assert_eq!(job.id(), "restore_jobs/9");
    }

    #[test]
    fn panic_payloads_are_readable() {
        let payload: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(payload.as_ref()), "static");
        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(payload.as_ref()), "owned");
        let payload: Box<dyn Any + Send> = Box::new(1u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }
}
