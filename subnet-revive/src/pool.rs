use std::future::Future;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Run `job` over `tasks` on a fixed number of workers.
///
/// Every task is queued up front; `workers` tokio tasks pull from the queue
/// and send results back as they finish, in completion order. Workers stop
/// when the queue is empty, when `cancel` fires (a running job is abandoned
/// mid-flight) or when the returned receiver is dropped. Nobody waits for
/// stragglers: dropping the receiver is enough to walk away.
pub fn spawn_pool<T, R, F, Fut>(
    tasks: Vec<T>,
    workers: usize,
    cancel: CancellationToken,
    job: F,
) -> mpsc::Receiver<R>
where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(T) -> Fut + Clone + Send + 'static,
    Fut: Future<Output = R> + Send + 'static,
{
    let workers = workers.clamp(1, tasks.len().max(1));
    let (queue_tx, queue_rx) = flume::bounded(tasks.len().max(1));
    for task in tasks {
        // Capacity covers every task and the receiver is alive.
        let _ = queue_tx.try_send(task);
    }
    drop(queue_tx);

    let (result_tx, result_rx) = mpsc::channel(workers);

    for _ in 0..workers {
        let queue_rx = queue_rx.clone();
        let result_tx = result_tx.clone();
        let cancel = cancel.clone();
        let job = job.clone();

        tokio::spawn(async move {
            loop {
                let task = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    task = queue_rx.recv_async() => match task {
                        Ok(task) => task,
                        Err(_) => break,
                    },
                };

                let result = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    result = job(task) => result,
                };

                if result_tx.send(result).await.is_err() {
                    break;
                }
            }
        });
    }

    result_rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_every_task_runs_once() {
        let mut rx = spawn_pool((0..254u32).collect(), 16, CancellationToken::new(), |n| async move {
            n * 2
        });

        let mut results = HashSet::new();
        while let Some(r) = rx.recv().await {
            assert!(results.insert(r));
        }
        assert_eq!(results.len(), 254);
        assert!(results.contains(&506));
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let job = {
            let in_flight = in_flight.clone();
            let peak = peak.clone();
            move |_: u32| {
                let in_flight = in_flight.clone();
                let peak = peak.clone();
                async move {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                }
            }
        };

        let mut rx = spawn_pool((0..40).collect(), 4, CancellationToken::new(), job);
        let mut done = 0;
        while rx.recv().await.is_some() {
            done += 1;
        }
        assert_eq!(done, 40);
        assert!(peak.load(Ordering::SeqCst) <= 4);
    }

    #[tokio::test]
    async fn test_cancel_stops_outstanding_work() {
        let started = Arc::new(AtomicUsize::new(0));
        let cancel = CancellationToken::new();

        let job = {
            let started = started.clone();
            move |n: u32| {
                let started = started.clone();
                async move {
                    started.fetch_add(1, Ordering::SeqCst);
                    if n != 0 {
                        tokio::time::sleep(Duration::from_secs(30)).await;
                    }
                    n
                }
            }
        };

        let mut rx = spawn_pool((0..100).collect(), 4, cancel.clone(), job);
        assert_eq!(rx.recv().await, Some(0));
        cancel.cancel();

        let rest = tokio::time::timeout(Duration::from_secs(5), async {
            let mut rest = 0;
            while rx.recv().await.is_some() {
                rest += 1;
            }
            rest
        })
        .await
        .expect("workers should exit promptly after cancel");

        assert_eq!(rest, 0);
        assert!(started.load(Ordering::SeqCst) < 100);
    }

    #[tokio::test]
    async fn test_empty_task_list_closes_immediately() {
        let mut rx = spawn_pool(Vec::<u32>::new(), 8, CancellationToken::new(), |n| async move { n });
        assert_eq!(rx.recv().await, None);
    }
}
