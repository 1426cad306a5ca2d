//! Local one-shot conversion: build a job from command line arguments.

use std::collections::BTreeMap;
use std::path::Path;

use imgproc_models::{
    size_name_problem, AspectRatio, ImageSize, Job, JobId, RawProvider, ResultConsumer, Settings,
};

use crate::error::{WorkerError, WorkerResult};

/// Job id used for command line conversions.
pub const ONESHOT_JOB_ID: &str = "custom-task";

/// Parse one `name:width:height` size.
pub fn parse_size(s: &str) -> WorkerResult<(String, ImageSize)> {
    let invalid = || WorkerError::invalid_argument(format!("invalid size '{s}', expected name:width:height"));

    let mut parts = s.split(':');
    let (Some(name), Some(width), Some(height), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(invalid());
    };

    let name = name.trim();
    let width: u32 = width.trim().parse().map_err(|_| invalid())?;
    let height: u32 = height.trim().parse().map_err(|_| invalid())?;
    if width == 0 || height == 0 {
        return Err(invalid());
    }
    if let Some(problem) = size_name_problem(name) {
        return Err(WorkerError::invalid_argument(format!("size name '{name}' {problem}")));
    }
    Ok((name.to_string(), ImageSize::new(width, height)))
}

/// Build the job for converting `input` into `output`.
pub fn build_job(
    input: &Path,
    output: &Path,
    aspect_ratio: &str,
    sizes: &[String],
) -> WorkerResult<Job> {
    let ratio = AspectRatio::parse(aspect_ratio).ok_or_else(|| {
        WorkerError::invalid_argument(format!("invalid aspect ratio '{aspect_ratio}', expected X:Y"))
    })?;

    let sizes = sizes
        .iter()
        .map(|s| parse_size(s))
        .collect::<WorkerResult<BTreeMap<_, _>>>()?;
    if sizes.is_empty() {
        return Err(WorkerError::invalid_argument("at least one --size is required"));
    }

    let raw = RawProvider::Local {
        path: input.to_path_buf(),
    };
    let consumer = ResultConsumer::Local {
        path_folder: output.to_path_buf(),
    };

    Ok(Job {
        id: JobId::from_string(ONESHOT_JOB_ID),
        aspect_ratio_xy: vec![ratio.x, ratio.y],
        sizes,
        settings: Settings::ALL,
        raw_provider: raw.kind(),
        raw_provider_details: raw.details(),
        result_consumer: consumer.kind(),
        result_consumer_details: consumer.details(),
    })
}
