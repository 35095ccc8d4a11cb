use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex, MutexGuard, TryLockError,
};

use tokio::time::{timeout, Duration};

use super::{CaptureError, Detector, FrameSource};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_warn};

type Shared<T> = Arc<Mutex<Box<T>>>;

fn lock<T: ?Sized>(shared: &Mutex<Box<T>>) -> MutexGuard<'_, Box<T>> {
    match shared.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Runs one frame pull plus detection on the blocking pool, bounded by a
/// timeout, and owns the one-shot release of the frame source.
pub struct CaptureWorker {
    source: Shared<dyn FrameSource>,
    detector: Shared<dyn Detector>,
    timeout: Duration,
    released: bool,
}

impl CaptureWorker {
    pub fn new(
        source: Box<dyn FrameSource>,
        detector: Box<dyn Detector>,
        frame_timeout: Duration,
    ) -> Self {
        Self {
            source: Arc::new(Mutex::new(source)),
            detector: Arc::new(Mutex::new(detector)),
            timeout: frame_timeout,
            released: false,
        }
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Pulls one frame and returns the detector's raw labels for it.
    ///
    /// A timeout is attributed to the detector once the frame has been read.
    pub async fn capture(&self) -> Result<Vec<String>, CaptureError> {
        if self.released {
            return Err(CaptureError::Frame("frame source already released".into()));
        }

        let source = Arc::clone(&self.source);
        let detector = Arc::clone(&self.detector);
        let frame_read = Arc::new(AtomicBool::new(false));
        let read_flag = Arc::clone(&frame_read);

        let job = tokio::task::spawn_blocking(move || {
            let frame = lock(&source)
                .read_frame()
                .map_err(|err| CaptureError::Frame(format!("{err:#}")))?;
            read_flag.store(true, Ordering::SeqCst);
            let labels = lock(&detector)
                .detect(&frame)
                .map_err(|err| CaptureError::Detection(format!("{err:#}")))?;
            log_debug!("frame {} -> {:?}", frame.sequence, labels);
            Ok::<_, CaptureError>(labels)
        });

        let limit_ms = self.timeout.as_millis() as u64;
        match timeout(self.timeout, job).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(CaptureError::Worker(join_err.to_string())),
            Err(_) if frame_read.load(Ordering::SeqCst) => {
                Err(CaptureError::DetectionTimeout(limit_ms))
            }
            Err(_) => Err(CaptureError::Timeout(limit_ms)),
        }
    }

    /// Releases the frame source once; later calls are no-ops.
    ///
    /// A read still in flight (timed out or abandoned on stop) holds the
    /// source; the release then finishes in the background once it returns.
    pub async fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        let busy = matches!(self.source.try_lock(), Err(TryLockError::WouldBlock));
        let source = Arc::clone(&self.source);
        let job = tokio::task::spawn_blocking(move || lock(&source).release());
        if busy {
            log_debug!("frame source busy; release deferred until the pending read returns");
            return;
        }
        match timeout(self.timeout, job).await {
            Ok(Ok(())) => {}
            Ok(Err(join_err)) => log_warn!("frame source release panicked: {join_err}"),
            Err(_) => log_warn!("frame source release still pending after {:?}", self.timeout),
        }
    }
}
