//! Stress runs with many concurrent clients.
//!
//! Each client owns its own session, as separate processes would. The runs
//! check the two properties that matter under contention: fenced commits
//! never apply while another owner holds the fence, and identities never
//! leak between concurrently started sessions.

use crate::fixtures::TestCluster;
use fencekeeper_core::{CoordError, Identity};
use fencekeeper_store::Acl;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

/// Path of the counter node updated by the fenced writers.
pub const COUNTER_PATH: &str = "/stress-counter";
/// Path of the fencing node contended for by the fenced writers.
pub const FENCING_PATH: &str = "/stress-fencing";

/// Result of a stress test run.
#[derive(Debug, Clone, Serialize)]
pub struct StressTestResult {
    /// Total operations performed.
    pub total_ops: usize,
    /// Successful operations.
    pub successful_ops: usize,
    /// Failed operations.
    pub failed_ops: usize,
    /// Operations rejected because another owner held the fence.
    pub fenced_ops: usize,
    /// Total duration.
    pub duration: Duration,
    /// Operations per second.
    pub ops_per_second: f64,
}

impl StressTestResult {
    /// Creates a new result.
    pub fn new(successful: usize, failed: usize, fenced: usize, duration: Duration) -> Self {
        let total = successful + failed + fenced;
        let ops_per_second = if duration.as_secs_f64() > 0.0 {
            total as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        Self {
            total_ops: total,
            successful_ops: successful,
            failed_ops: failed,
            fenced_ops: fenced,
            duration,
            ops_per_second,
        }
    }

    /// Renders the result as JSON.
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).expect("Failed to serialize stress result")
    }

    /// Prints a summary of the test.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {} ===", name);
        println!("Total operations: {}", self.total_ops);
        println!("Successful: {}", self.successful_ops);
        println!("Failed: {}", self.failed_ops);
        println!("Fenced: {}", self.fenced_ops);
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} ops/sec", self.ops_per_second);
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Operations per client.
    pub operations: usize,
    /// Number of concurrent clients.
    pub threads: usize,
    /// How long the competing owner holds the fence each time it takes it.
    pub fence_hold: Duration,
    /// How long the competing owner leaves the fence free between holds.
    pub fence_release: Duration,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            operations: 200,
            threads: 4,
            fence_hold: Duration::from_millis(2),
            fence_release: Duration::from_millis(8),
        }
    }
}

/// Concurrent clients increment a counter through fenced transactions
/// while a competing owner repeatedly takes and releases the fence.
///
/// The competing owner holds the fence when the writers start and keeps it
/// until at least one commit has been fenced. A writer whose commit is
/// fenced waits for the fence to disappear and tries the same increment
/// again; each fenced attempt counts in `fenced_ops`. Every commit stages
/// `set_data(counter, n + 1, version)`, so one that lost a race fails with
/// `BadVersion` and counts in `failed_ops`.
///
/// On return `successful_ops + failed_ops == threads * operations`, the
/// counter equals `successful_ops`, and the fencing node is gone.
pub fn stress_fenced_writers(cluster: &TestCluster, config: &StressConfig) -> StressTestResult {
    let setup = cluster.node_store();
    setup.create(COUNTER_PATH).expect("Failed to create counter");
    setup
        .set_string_data(COUNTER_PATH, "0", -1)
        .expect("Failed to initialise counter");

    let acl = Acl::open_unsafe();
    let successful = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));
    let fenced = Arc::new(AtomicUsize::new(0));
    let done = Arc::new(AtomicBool::new(false));
    let ready = Arc::new(Barrier::new(config.threads + 1));

    let start = Instant::now();

    let fencer = {
        let nodes = cluster.node_store();
        let done = Arc::clone(&done);
        let fenced = Arc::clone(&fenced);
        let ready = Arc::clone(&ready);
        let hold = config.fence_hold;
        let release = config.fence_release;
        thread::spawn(move || {
            nodes.create(FENCING_PATH).expect("Failed to take fence");
            ready.wait();
            while fenced.load(Ordering::SeqCst) == 0 && !done.load(Ordering::SeqCst) {
                thread::sleep(Duration::from_micros(100));
            }
            let _ = nodes.delete(FENCING_PATH);

            while !done.load(Ordering::SeqCst) {
                thread::sleep(release);
                if done.load(Ordering::SeqCst) {
                    break;
                }
                if nodes.create(FENCING_PATH).is_ok() {
                    thread::sleep(hold);
                    let _ = nodes.delete(FENCING_PATH);
                }
            }
            nodes.session().close();
        })
    };

    let handles: Vec<_> = (0..config.threads)
        .map(|_| {
            let nodes = cluster.node_store();
            let acl = acl.clone();
            let successful = Arc::clone(&successful);
            let failed = Arc::clone(&failed);
            let fenced = Arc::clone(&fenced);
            let ready = Arc::clone(&ready);
            let operations = config.operations;

            thread::spawn(move || {
                ready.wait();
                for _ in 0..operations {
                    loop {
                        let outcome = nodes
                            .get_string_data_with_stat(COUNTER_PATH)
                            .and_then(|(value, stat)| {
                                let next = value
                                    .and_then(|v| v.parse::<u64>().ok())
                                    .unwrap_or(0)
                                    + 1;
                                let mut txn = nodes.create_transaction(&acl, FENCING_PATH)?;
                                txn.stage_set_data(COUNTER_PATH, next.to_string().as_bytes(), stat.version)?;
                                txn.commit()
                            });
                        match outcome {
                            Ok(_) => {
                                successful.fetch_add(1, Ordering::Relaxed);
                                break;
                            }
                            Err(CoordError::Fenced { .. }) => {
                                fenced.fetch_add(1, Ordering::SeqCst);
                                // Re-acquire: wait for the other owner to let go.
                                while nodes.exists(FENCING_PATH).unwrap_or(false) {
                                    thread::sleep(Duration::from_micros(100));
                                }
                            }
                            Err(_) => {
                                failed.fetch_add(1, Ordering::Relaxed);
                                break;
                            }
                        }
                    }
                }
                nodes.session().close();
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Writer thread panicked");
    }
    done.store(true, Ordering::SeqCst);
    fencer.join().expect("Fencer thread panicked");
    setup.session().close();

    StressTestResult::new(
        successful.load(Ordering::Relaxed),
        failed.load(Ordering::Relaxed),
        fenced.load(Ordering::Relaxed),
        start.elapsed(),
    )
}

/// Starts sessions with distinct identities from many threads at once.
///
/// A start counts as successful only if the store authenticated the
/// session as the principal it was started with.
pub fn stress_concurrent_identities(cluster: &TestCluster, config: &StressConfig) -> StressTestResult {
    let successful = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));
    let start = Instant::now();

    thread::scope(|scope| {
        for t in 0..config.threads {
            let successful = Arc::clone(&successful);
            let failed = Arc::clone(&failed);
            scope.spawn(move || {
                for i in 0..config.operations {
                    let principal = format!("svc{t}-{i}");
                    let identity = Identity::new(
                        format!("client{t}"),
                        principal.as_str(),
                        format!("{principal}.keytab"),
                    );
                    let session = match cluster.manager().start(cluster.config(), Some(&identity)) {
                        Ok(session) => session,
                        Err(_) => {
                            failed.fetch_add(1, Ordering::Relaxed);
                            continue;
                        }
                    };
                    let authenticated = cluster.store().session_principal(session.store_session_id());
                    let entry = session.login_entry();
                    if authenticated.as_deref() == Some(principal.as_str())
                        && entry.as_ref().and_then(|e| e.principal()) == Some(principal.as_str())
                    {
                        successful.fetch_add(1, Ordering::Relaxed);
                    } else {
                        failed.fetch_add(1, Ordering::Relaxed);
                    }
                    session.close();
                }
            });
        }
    });

    StressTestResult::new(
        successful.load(Ordering::Relaxed),
        failed.load(Ordering::Relaxed),
        0,
        start.elapsed(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> StressConfig {
        StressConfig {
            operations: 50,
            threads: 3,
            fence_hold: Duration::from_millis(1),
            fence_release: Duration::from_millis(3),
        }
    }

    #[test]
    fn fenced_writers_keep_counter_consistent() {
        let cluster = TestCluster::new();
        let result = stress_fenced_writers(&cluster, &small());

        let nodes = cluster.node_store();
        let counter: usize = nodes
            .get_string_data(COUNTER_PATH)
            .unwrap()
            .unwrap()
            .parse()
            .unwrap();
        assert_eq!(counter, result.successful_ops);
        assert_eq!(result.successful_ops + result.failed_ops, 150);
        assert!(result.successful_ops > 0);
        assert!(result.fenced_ops > 0);
        assert!(!nodes.exists(FENCING_PATH).unwrap());
    }

    #[test]
    fn concurrent_identities_never_cross() {
        let cluster = TestCluster::new();
        let result = stress_concurrent_identities(&cluster, &small());
        assert_eq!(result.failed_ops, 0);
        assert_eq!(result.successful_ops, 150);
        assert!(cluster.registry().is_empty());
    }

    #[test]
    fn result_serializes() {
        let result = StressTestResult::new(3, 1, 1, Duration::from_secs(1));
        let json = result.to_json();
        assert!(json.contains("\"fenced_ops\": 1"));
        assert_eq!(result.total_ops, 5);
    }
}
