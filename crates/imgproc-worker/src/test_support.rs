//! Test doubles shared by the worker unit tests.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use metrics::{
    Counter, Gauge, GaugeFn, Histogram, Key, KeyName, Metadata, Recorder, SharedString, Unit,
};
use imgproc_media::{EncodeTarget, MediaError, MediaResult, MediaToolkit};
use imgproc_models::{
    AspectRatio, ContainerType, Image, ImageSize, Job, JobId, RawProvider, ResultConsumer,
    Settings,
};
use tokio_util::sync::CancellationToken;

use crate::config::WorkerConfig;
use crate::env::ExecutionEnv;

/// Smallest buffer the detector accepts as a GIF.
pub(crate) const GIF_BYTES: &[u8] = b"GIF89a\x01\x00\x01\x00\x00;";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) enum Behavior {
    #[default]
    Succeed,
    FailResize(String),
    FailEncode(String),
    HangResize,
    HangEncode,
    PanicAnalyze,
}

/// Counts live fan-out units; decremented when the unit's future is dropped.
struct UnitGuard(Arc<AtomicUsize>);

impl UnitGuard {
    fn new(live: &Arc<AtomicUsize>) -> Self {
        live.fetch_add(1, Ordering::SeqCst);
        Self(live.clone())
    }
}

impl Drop for UnitGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Toolkit that fakes every stage on the filesystem.
#[derive(Clone, Default)]
pub(crate) struct MockToolkit {
    pub delays: Vec<u32>,
    pub behavior: Behavior,
    pub analyze_delay: Duration,
    pub live_units: Arc<AtomicUsize>,
    pub active: Arc<AtomicUsize>,
    pub max_active: Arc<AtomicUsize>,
}

impl MockToolkit {
    pub fn animated(frames: usize) -> Self {
        Self {
            delays: vec![10; frames],
            ..Self::default()
        }
    }

    pub fn still() -> Self {
        Self::animated(1)
    }

    pub fn with_behavior(mut self, behavior: Behavior) -> Self {
        self.behavior = behavior;
        self
    }

    pub fn live_units(&self) -> usize {
        self.live_units.load(Ordering::SeqCst)
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    /// Poll until `count` hanging units are alive.
    pub async fn wait_for_live_units(&self, count: usize) {
        while self.live_units() < count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

#[async_trait]
impl MediaToolkit for MockToolkit {
    async fn analyze(
        &self,
        raw: &Path,
        _container: ContainerType,
        _aspect_ratio: AspectRatio,
        _cancel: &CancellationToken,
    ) -> MediaResult<Image> {
        if self.behavior == Behavior::PanicAnalyze {
            panic!("analyzer blew up");
        }

        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.analyze_delay).await;
        self.active.fetch_sub(1, Ordering::SeqCst);

        let working_dir = raw
            .parent()
            .ok_or_else(|| MediaError::internal("raw file has no parent"))?
            .to_path_buf();
        let image = Image {
            working_dir,
            width: 96,
            height: 32,
            delays: self.delays.clone(),
        };
        tokio::fs::create_dir_all(image.frames_dir()).await?;
        Ok(image)
    }

    async fn resize(
        &self,
        image: &Image,
        size_name: &str,
        _size: ImageSize,
        _cancel: &CancellationToken,
    ) -> MediaResult<()> {
        let _guard = UnitGuard::new(&self.live_units);
        match &self.behavior {
            Behavior::HangResize => std::future::pending::<()>().await,
            Behavior::FailResize(name) if name == size_name => {
                return Err(MediaError::tool_failed("vipsthumbnail", "corrupt frame", Some(1)));
            }
            _ => {}
        }
        tokio::fs::create_dir_all(image.size_dir(size_name)).await?;
        Ok(())
    }

    async fn encode(
        &self,
        image: &Image,
        target: &EncodeTarget,
        _cancel: &CancellationToken,
    ) -> MediaResult<PathBuf> {
        let _guard = UnitGuard::new(&self.live_units);
        match &self.behavior {
            Behavior::HangEncode => std::future::pending::<()>().await,
            Behavior::FailEncode(name) if *name == target.file_name() => {
                return Err(MediaError::tool_failed("avifenc", "encoder crashed", Some(1)));
            }
            _ => {}
        }
        let path = target.output_path(image);
        tokio::fs::write(&path, target.file_name().as_bytes()).await?;
        Ok(path)
    }
}

pub(crate) fn sizes(entries: &[(&str, u32, u32)]) -> BTreeMap<String, ImageSize> {
    entries
        .iter()
        .map(|(name, w, h)| (name.to_string(), ImageSize::new(*w, *h)))
        .collect()
}

/// A job reading `input` and copying results into `output`.
pub(crate) fn local_job(
    id: &str,
    input: &Path,
    output: &Path,
    settings: Settings,
    sizes: BTreeMap<String, ImageSize>,
) -> Job {
    let raw = RawProvider::Local {
        path: input.to_path_buf(),
    };
    let consumer = ResultConsumer::Local {
        path_folder: output.to_path_buf(),
    };
    Job {
        id: JobId::from_string(id),
        aspect_ratio_xy: vec![3, 1],
        sizes,
        settings,
        raw_provider: raw.kind(),
        raw_provider_details: raw.details(),
        result_consumer: consumer.kind(),
        result_consumer_details: consumer.details(),
    }
}

pub(crate) fn env_with(toolkit: MockToolkit, work_dir: &Path) -> ExecutionEnv {
    let config = WorkerConfig {
        work_dir: work_dir.to_path_buf(),
        ..WorkerConfig::default()
    };
    ExecutionEnv::new(config, Arc::new(toolkit))
}

/// Gauge value that also remembers the highest value it was set to.
#[derive(Default)]
struct RecordedGauge {
    last: AtomicU64,
    peak: AtomicU64,
}

impl RecordedGauge {
    fn store(&self, value: f64) {
        self.last.store(value.to_bits(), Ordering::SeqCst);
        let _ = self
            .peak
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |peak| {
                (value > f64::from_bits(peak)).then_some(value.to_bits())
            });
    }

    fn last(&self) -> f64 {
        f64::from_bits(self.last.load(Ordering::SeqCst))
    }
}

impl GaugeFn for RecordedGauge {
    fn increment(&self, value: f64) {
        self.store(self.last() + value);
    }

    fn decrement(&self, value: f64) {
        self.store(self.last() - value);
    }

    fn set(&self, value: f64) {
        self.store(value);
    }
}

/// Recorder that keeps gauges in memory; counters and histograms are dropped.
#[derive(Default)]
pub(crate) struct GaugeRecorder {
    gauges: Mutex<HashMap<String, Arc<RecordedGauge>>>,
}

impl GaugeRecorder {
    fn lookup(&self, name: &str) -> Option<Arc<RecordedGauge>> {
        self.gauges.lock().unwrap().get(name).cloned()
    }

    /// Last value set, or `None` if the gauge was never registered.
    pub fn gauge(&self, name: &str) -> Option<f64> {
        self.lookup(name).map(|g| g.last())
    }

    pub fn gauge_peak(&self, name: &str) -> f64 {
        self.lookup(name)
            .map(|g| f64::from_bits(g.peak.load(Ordering::SeqCst)))
            .unwrap_or_default()
    }
}

impl Recorder for GaugeRecorder {
    fn describe_counter(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
    fn describe_gauge(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
    fn describe_histogram(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}

    fn register_counter(&self, _: &Key, _: &Metadata<'_>) -> Counter {
        Counter::noop()
    }

    fn register_gauge(&self, key: &Key, _: &Metadata<'_>) -> Gauge {
        let gauge = Arc::clone(
            self.gauges
                .lock()
                .unwrap()
                .entry(key.name().to_string())
                .or_default(),
        );
        Gauge::from_arc(gauge)
    }

    fn register_histogram(&self, _: &Key, _: &Metadata<'_>) -> Histogram {
        Histogram::noop()
    }
}
