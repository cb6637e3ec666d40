//! Engine worker pool
//!
//! A small fixed-size rayon pool runs the blocking engine call; the async
//! caller waits on a oneshot channel, optionally bounded by a timeout.
//! The timeout starts when a worker picks the call up, not while it waits
//! in the pool queue. On timeout the caller gets an error immediately while
//! the engine thread runs to completion in the background. A queued call
//! whose caller has already gone never reaches the engine.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use rayon::{ThreadPool, ThreadPoolBuilder};
use tokio::sync::oneshot;

use crate::config::Device;
use crate::engine::VoiceConversionEngine;
use crate::error::{ConversionError, ConversionResult};

/// One engine invocation
#[derive(Debug, Clone)]
pub struct EngineRequest {
    pub input: PathBuf,
    pub reference: PathBuf,
    pub output: PathBuf,
    pub device: Device,
}

/// Fixed-size pool dedicated to engine calls
pub struct EnginePool {
    pool: ThreadPool,
    timeout: Option<Duration>,
}

impl EnginePool {
    pub fn new(workers: usize, timeout: Option<Duration>) -> ConversionResult<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers.max(1))
            .thread_name(|i| format!("vp-engine-{}", i))
            .build()
            .map_err(|e| ConversionError::WorkerLost(format!("cannot start engine pool: {}", e)))?;
        Ok(Self { pool, timeout })
    }

    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Run the engine off the async executor and wait for it
    pub async fn run(
        &self,
        engine: Arc<dyn VoiceConversionEngine>,
        request: EngineRequest,
    ) -> ConversionResult<()> {
        let (tx, rx) = oneshot::channel();
        let (started_tx, started_rx) = oneshot::channel::<()>();

        self.pool.spawn(move || {
            if tx.is_closed() || started_tx.send(()).is_err() {
                debug!("[Engine] caller gone before start, skipping {}", request.output.display());
                return;
            }
            debug!("[Engine] {} -> {}", request.input.display(), request.output.display());
            let result = catch_unwind(AssertUnwindSafe(|| {
                engine.convert(&request.input, &request.reference, &request.output, request.device)
            }));
            let result = match result {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(ConversionError::Engine(format!("{:#}", e))),
                Err(panic) => Err(ConversionError::Engine(format!(
                    "engine panicked: {}",
                    panic_message(panic.as_ref())
                ))),
            };
            // Receiver gone means the caller timed out
            if tx.send(result).is_err() {
                warn!("[Engine] finished after caller gave up: {}", request.output.display());
            }
        });

        started_rx
            .await
            .map_err(|_| ConversionError::WorkerLost("engine worker dropped the call".to_string()))?;

        let received = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, rx)
                .await
                .map_err(|_| ConversionError::Timeout(limit.as_secs_f64()))?,
            None => rx.await,
        };

        received.map_err(|_| ConversionError::WorkerLost("engine worker dropped its result".to_string()))?
    }
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Scripted {
        delay: Duration,
        fail: Option<&'static str>,
        panic: bool,
        calls: AtomicUsize,
    }

    impl VoiceConversionEngine for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        fn probe(&self) -> bool {
            true
        }

        fn convert(&self, _: &Path, _: &Path, _: &Path, _: Device) -> anyhow::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(self.delay);
            if self.panic {
                panic!("model exploded");
            }
            match self.fail {
                Some(msg) => Err(anyhow::anyhow!(msg)),
                None => Ok(()),
            }
        }
    }

    fn request() -> EngineRequest {
        EngineRequest {
            input: PathBuf::from("in.wav"),
            reference: PathBuf::from("ref.wav"),
            output: PathBuf::from("out.wav"),
            device: Device::Cpu,
        }
    }

    fn scripted(delay_ms: u64, fail: Option<&'static str>, panic: bool) -> Arc<Scripted> {
        Arc::new(Scripted {
            delay: Duration::from_millis(delay_ms),
            fail,
            panic,
            calls: AtomicUsize::new(0),
        })
    }

    fn engine(delay_ms: u64, fail: Option<&'static str>, panic: bool) -> Arc<dyn VoiceConversionEngine> {
        scripted(delay_ms, fail, panic)
    }

    #[tokio::test]
    async fn test_success() {
        let pool = EnginePool::new(2, Some(Duration::from_secs(5))).unwrap();
        assert_eq!(pool.workers(), 2);
        pool.run(engine(0, None, false), request()).await.unwrap();
    }

    #[tokio::test]
    async fn test_engine_error_mapped() {
        let pool = EnginePool::new(1, None).unwrap();
        let err = pool.run(engine(0, Some("CUDA out of memory"), false), request()).await.unwrap_err();
        assert!(matches!(err, ConversionError::Engine(ref m) if m.contains("CUDA out of memory")));
    }

    #[tokio::test]
    async fn test_panic_contained() {
        let pool = EnginePool::new(1, None).unwrap();
        let err = pool.run(engine(0, None, true), request()).await.unwrap_err();
        assert!(matches!(err, ConversionError::Engine(ref m) if m.contains("model exploded")));

        // pool still usable afterwards
        pool.run(engine(0, None, false), request()).await.unwrap();
    }

    #[tokio::test]
    async fn test_timeout() {
        let pool = EnginePool::new(1, Some(Duration::from_millis(50))).unwrap();
        let err = pool.run(engine(500, None, false), request()).await.unwrap_err();
        assert!(matches!(err, ConversionError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_timeout_excludes_queue_wait() {
        // second call waits ~200ms for the only worker, then runs ~200ms
        let pool = EnginePool::new(1, Some(Duration::from_millis(300))).unwrap();
        let slow = scripted(200, None, false);

        let (first, second) = tokio::join!(
            pool.run(slow.clone(), request()),
            pool.run(slow.clone(), request())
        );
        first.unwrap();
        second.unwrap();
        assert_eq!(slow.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_abandoned_queued_call_skips_engine() {
        let pool = EnginePool::new(1, None).unwrap();
        let slow = scripted(200, None, false);

        let (first, second) = tokio::join!(
            pool.run(slow.clone(), request()),
            tokio::time::timeout(Duration::from_millis(50), pool.run(slow.clone(), request()))
        );
        first.unwrap();
        assert!(second.is_err());

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(slow.calls.load(Ordering::SeqCst), 1);
    }
}
