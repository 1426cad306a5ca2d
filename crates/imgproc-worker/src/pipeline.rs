//! Stage control: which operations run, how they fan out and how their
//! failures are folded into one outcome.
//!
//! Stages two and three spawn one unit per size (or per output file) into a
//! `JoinSet` and wait for all of them. If the task scope is cancelled the set
//! is shut down and awaited, so no unit outlives its stage.

use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use imgproc_media::{EncodeTarget, MediaError, MediaToolkit};
use imgproc_models::{
    size_name_problem, AspectRatio, ContainerType, File, Image, ImageSize, OutputFormat, Settings,
};
use tokio::task::{self, AbortHandle, JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{Stage, StageError, WorkerError, WorkerResult};

/// Stage one: frames, timing and canonical dimensions.
pub async fn stage_one(
    toolkit: &dyn MediaToolkit,
    raw: &Path,
    container: ContainerType,
    aspect_ratio: AspectRatio,
    cancel: &CancellationToken,
) -> WorkerResult<Image> {
    let image = toolkit.analyze(raw, container, aspect_ratio, cancel).await?;
    info!(
        container = %container,
        width = image.width,
        height = image.height,
        frames = image.frame_count(),
        "Stage one complete"
    );
    Ok(image)
}

/// Stage two: resize every frame to every size.
pub async fn stage_two(
    toolkit: Arc<dyn MediaToolkit>,
    image: &Image,
    sizes: &BTreeMap<String, ImageSize>,
    cancel: &CancellationToken,
) -> WorkerResult<()> {
    if sizes.is_empty() {
        return Err(WorkerError::invalid_job("no output sizes"));
    }
    for name in sizes.keys() {
        if let Some(problem) = size_name_problem(name) {
            return Err(WorkerError::invalid_job(format!("size name '{name}' {problem}")));
        }
    }

    let image = Arc::new(image.clone());
    let mut units = FanOut::new();
    for (name, size) in sizes {
        let toolkit = toolkit.clone();
        let image = image.clone();
        let cancel = cancel.clone();
        let size_name = name.clone();
        let size = *size;
        units.spawn(name.clone(), async move {
            toolkit.resize(&image, &size_name, size, &cancel).await?;
            Ok(())
        });
    }

    let mut errors = StageError::new(Stage::Resize);
    for (name, result) in units.drain(cancel).await? {
        match result {
            Ok(()) => debug!(size = %name, "Resized"),
            Err(e) => errors.push(name, e),
        }
    }
    errors.into_result()
}

/// The encodes stage three runs, in a fixed order: every size per enabled
/// format, then first-frame thumbnails of animated content.
pub fn plan_encodes(
    settings: Settings,
    animated: bool,
    sizes: &BTreeMap<String, ImageSize>,
) -> Vec<(EncodeTarget, ImageSize)> {
    let enabled = |animated_flag: Settings, static_flag: Settings| {
        if animated {
            settings.contains(animated_flag)
        } else {
            settings.contains(static_flag)
        }
    };

    let mut formats = Vec::new();
    if enabled(Settings::ANIMATED_AVIF, Settings::STATIC_AVIF) {
        formats.push(OutputFormat::Avif);
    }
    if enabled(Settings::ANIMATED_WEBP, Settings::STATIC_WEBP) {
        formats.push(OutputFormat::Webp);
    }
    if animated && settings.contains(Settings::ANIMATED_GIF) {
        formats.push(OutputFormat::Gif);
    }
    if !animated && settings.contains(Settings::STATIC_PNG) {
        formats.push(OutputFormat::Png);
    }

    let mut plan = Vec::new();
    for format in formats {
        for (name, size) in sizes {
            plan.push((EncodeTarget::new(name.as_str(), format), *size));
        }
    }

    if animated && settings.contains(Settings::ANIMATED_THUMBNAILS) {
        let thumbnails = [
            (Settings::STATIC_AVIF, OutputFormat::Avif),
            (Settings::STATIC_WEBP, OutputFormat::Webp),
            (Settings::STATIC_PNG, OutputFormat::Png),
        ];
        for (name, size) in sizes {
            for (flag, format) in thumbnails {
                if settings.contains(flag) {
                    plan.push((EncodeTarget::thumbnail(name.as_str(), format), *size));
                }
            }
        }
    }

    plan
}

/// Stage three: encode every planned output and describe what was written.
///
/// The `frames` directory is removed afterwards whatever the outcome; a
/// removal failure is reported with the encode errors.
pub async fn stage_three(
    toolkit: Arc<dyn MediaToolkit>,
    image: &Image,
    sizes: &BTreeMap<String, ImageSize>,
    settings: Settings,
    cancel: &CancellationToken,
) -> WorkerResult<Vec<File>> {
    let result = encode_all(toolkit, image, sizes, settings, cancel).await;
    let removed = remove_frames(image).await;

    match (result, removed) {
        (Ok(files), Ok(())) => Ok(files),
        (Ok(_), Err(e)) => {
            let mut errors = StageError::new(Stage::Encode);
            errors.push("frames", e);
            Err(errors.into())
        }
        (Err(WorkerError::Stage(mut errors)), Err(e)) => {
            errors.push("frames", e);
            Err(errors.into())
        }
        (Err(e), Err(cleanup)) => {
            let mut errors = StageError::new(Stage::Encode);
            errors.push("encode", e);
            errors.push("frames", cleanup);
            Err(errors.into())
        }
        (Err(e), Ok(())) => Err(e),
    }
}

async fn encode_all(
    toolkit: Arc<dyn MediaToolkit>,
    image: &Image,
    sizes: &BTreeMap<String, ImageSize>,
    settings: Settings,
    cancel: &CancellationToken,
) -> WorkerResult<Vec<File>> {
    let plan = plan_encodes(settings, image.is_animated(), sizes);
    debug!(outputs = plan.len(), "Planned encodes");

    let start = Instant::now();
    let image = Arc::new(image.clone());
    let mut units = FanOut::new();
    for (target, size) in plan {
        let toolkit = toolkit.clone();
        let image = image.clone();
        let cancel = cancel.clone();
        units.spawn(target.file_name(), async move {
            encode_one(&*toolkit, &image, &target, size, start, &cancel).await
        });
    }

    let mut files = Vec::new();
    let mut errors = StageError::new(Stage::Encode);
    for (file_name, result) in units.drain(cancel).await? {
        match result {
            Ok(file) => files.push(file),
            Err(e) => errors.push(file_name, e),
        }
    }
    errors.into_result()?;

    files.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(files)
}

async fn encode_one(
    toolkit: &dyn MediaToolkit,
    image: &Image,
    target: &EncodeTarget,
    size: ImageSize,
    start: Instant,
    cancel: &CancellationToken,
) -> WorkerResult<File> {
    let path = toolkit.encode(image, target, cancel).await?;
    let metadata = tokio::fs::metadata(&path).await?;
    debug!(file = %target.file_name(), bytes = metadata.len(), "Encoded");
    Ok(File {
        name: target.file_name(),
        content_type: target.format.content_type().to_string(),
        size: metadata.len(),
        animated: target.is_animated(image),
        width: image.scaled_width(size),
        height: size.height,
        time_taken: start.elapsed(),
    })
}

async fn remove_frames(image: &Image) -> WorkerResult<()> {
    match tokio::fs::remove_dir_all(image.frames_dir()).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

type UnitOutput<T> = (String, WorkerResult<T>);

/// Label a fan-out unit and turn a panic inside it into an error.
fn unit<T, F>(name: String, fut: F) -> impl Future<Output = UnitOutput<T>>
where
    F: Future<Output = WorkerResult<T>>,
{
    async move {
        let result = AssertUnwindSafe(fut)
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| Err(WorkerError::Panic(panic_message(payload))));
        (name, result)
    }
}

/// A `JoinSet` of labelled units. Every outcome, including an aborted unit,
/// is reported under the label it was spawned with.
pub(crate) struct FanOut<T> {
    set: JoinSet<UnitOutput<T>>,
    names: HashMap<task::Id, String>,
}

impl<T: Send + 'static> FanOut<T> {
    pub(crate) fn new() -> Self {
        Self {
            set: JoinSet::new(),
            names: HashMap::new(),
        }
    }

    pub(crate) fn spawn<F>(&mut self, name: impl Into<String>, fut: F) -> AbortHandle
    where
        F: Future<Output = WorkerResult<T>> + Send + 'static,
    {
        let name = name.into();
        let handle = self.set.spawn(unit(name.clone(), fut));
        self.names.insert(handle.id(), name);
        handle
    }

    /// Collect every unit, or shut the set down on cancellation.
    pub(crate) async fn drain(
        mut self,
        cancel: &CancellationToken,
    ) -> WorkerResult<Vec<UnitOutput<T>>> {
        let mut results = Vec::with_capacity(self.set.len());
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    self.set.shutdown().await;
                    return Err(MediaError::Cancelled.into());
                }
                next = self.set.join_next() => match next {
                    Some(Ok(output)) => results.push(output),
                    Some(Err(e)) => {
                        let name = self
                            .names
                            .remove(&e.id())
                            .unwrap_or_else(|| "unknown".to_string());
                        results.push((name, Err(join_error(e))));
                    }
                    None => return Ok(results),
                },
            }
        }
    }
}

fn join_error(e: JoinError) -> WorkerError {
    if e.is_panic() {
        WorkerError::Panic(panic_message(e.into_panic()))
    } else {
        WorkerError::cancelled("unit aborted")
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
