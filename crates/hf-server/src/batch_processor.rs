//! Background batch processor.
//!
//! Drives one batch job from its stored inputs to a terminal state: convert
//! every file on the blocking pool, count each outcome in the [`JobStore`],
//! then bundle the successes into a zip archive.
//!
//! [`JobStore`]: crate::store::JobStore

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use hf_convert::Converter;
use hf_core::format::file_stem;
use hf_core::{Error, JobId, Result, SourceFormat, TargetFormat};

use crate::context::AppContext;

/// One uploaded file already persisted to the job directory.
#[derive(Debug, Clone)]
pub struct BatchInput {
    pub index: usize,
    /// Name as supplied by the client.
    pub file_name: String,
    pub path: PathBuf,
}

/// Everything the processor needs to run one job.
#[derive(Debug, Clone)]
pub struct BatchRequest {
    pub job_id: JobId,
    pub format: TargetFormat,
    pub quality: u8,
    pub inputs: Vec<BatchInput>,
}

/// A converted file waiting to go into the archive.
#[derive(Debug, Clone)]
struct ArchiveEntry {
    name: String,
    path: PathBuf,
}

/// Process a batch to completion. Never returns an error: every outcome is
/// recorded on the job itself.
pub async fn run_batch(ctx: AppContext, request: BatchRequest) {
    let job_id = request.job_id;
    let timeout = ctx.file_timeout();
    let mut names = EntryNames::default();
    let mut entries = Vec::new();

    tracing::info!(
        job_id = %job_id,
        files = request.inputs.len(),
        format = %request.format,
        "Batch started"
    );

    for input in &request.inputs {
        match process_file(&ctx, job_id, input, request.format, request.quality, timeout).await {
            Ok(path) => {
                let name = names.assign(&file_stem(&input.file_name), request.format);
                tracing::debug!(job_id = %job_id, file = %input.file_name, entry = %name, "File converted");
                entries.push(ArchiveEntry { name, path });
                record(&ctx, job_id, true);
            }
            Err(e) => {
                tracing::warn!(job_id = %job_id, file = %input.file_name, error = %e, "File conversion failed");
                record(&ctx, job_id, false);
            }
        }
    }

    finish(&ctx, job_id, entries).await;
}

/// Mark the job failed and drop its directory. Used when the batch cannot
/// finish normally, including when the processing task itself crashed.
/// A job that already reached a terminal state is left untouched.
pub fn abort_job(ctx: &AppContext, job_id: JobId, detail: &str) {
    if let Err(e) = ctx.jobs.mark_failed(job_id, detail) {
        tracing::debug!(job_id = %job_id, error = %e, "Job already terminal");
        return;
    }
    tracing::error!(job_id = %job_id, error = %detail, "Batch failed");
    if let Err(e) = ctx.storage.remove_job_dir(job_id) {
        tracing::warn!(job_id = %job_id, error = %e, "Failed to remove job directory");
    }
}

/// Run a conversion on the blocking pool, bounded by `timeout`.
///
/// Waiting for a free conversion slot counts against the timeout. The slot
/// travels with the blocking task, so a conversion that outlives its timeout
/// keeps occupying it until the decoder returns.
pub async fn convert_in_pool(
    ctx: &AppContext,
    data: Vec<u8>,
    hint: Option<SourceFormat>,
    format: TargetFormat,
    quality: u8,
    timeout: Duration,
) -> Result<Vec<u8>> {
    let converter: Arc<dyn Converter> = Arc::clone(&ctx.converter);
    let slots = Arc::clone(&ctx.conversion_slots);

    let run = async move {
        let permit = slots
            .acquire_owned()
            .await
            .map_err(|_| Error::Internal("conversion slots closed".into()))?;
        let task = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            converter.convert(&data, hint, format, quality)
        });
        match task.await {
            Err(join) => Err(Error::Internal(format!("conversion task failed: {join}"))),
            Ok(result) => result.map_err(Error::from),
        }
    };

    match tokio::time::timeout(timeout, run).await {
        Err(_) => Err(Error::Internal(format!(
            "conversion timed out after {}s",
            timeout.as_secs()
        ))),
        Ok(result) => result,
    }
}

async fn process_file(
    ctx: &AppContext,
    job_id: JobId,
    input: &BatchInput,
    format: TargetFormat,
    quality: u8,
    timeout: Duration,
) -> Result<PathBuf> {
    let data = tokio::fs::read(&input.path).await?;
    let hint = SourceFormat::from_filename(&input.file_name);
    let converted =
        convert_in_pool(ctx, data, hint, format, quality, timeout).await?;

    let out = ctx
        .storage
        .output_path(job_id, input.index, &file_stem(&input.file_name), format);
    tokio::fs::write(&out, converted).await?;
    Ok(out)
}

fn record(ctx: &AppContext, job_id: JobId, success: bool) {
    let result = if success {
        ctx.jobs.increment_completed(job_id)
    } else {
        ctx.jobs.increment_failed(job_id)
    };
    if let Err(e) = result {
        tracing::warn!(job_id = %job_id, error = %e, "Failed to record file outcome");
    }
}

async fn finish(ctx: &AppContext, job_id: JobId, entries: Vec<ArchiveEntry>) {
    if entries.is_empty() {
        abort_job(ctx, job_id, "No files were successfully converted");
        return;
    }

    let archive = ctx.storage.archive_path(job_id);
    let target = archive.clone();
    let written = tokio::task::spawn_blocking(move || write_archive(&target, &entries)).await;

    let outcome = match written {
        Ok(Ok(count)) => Ok(count),
        Ok(Err(e)) => Err(e.to_string()),
        Err(join) => Err(format!("archive task failed: {join}")),
    };

    match outcome {
        Ok(count) => {
            tracing::info!(job_id = %job_id, entries = count, archive = %archive.display(), "Archive written");
            if let Err(e) = ctx.storage.remove_working_files(job_id) {
                tracing::warn!(job_id = %job_id, error = %e, "Failed to remove working files");
            }
            match ctx.jobs.mark_completed(job_id, archive) {
                Ok(()) => tracing::info!(job_id = %job_id, "Batch completed"),
                Err(e) => tracing::error!(job_id = %job_id, error = %e, "Failed to complete job"),
            }
        }
        Err(detail) => abort_job(ctx, job_id, &format!("Failed to build archive: {detail}")),
    }
}

/// Write `entries` into a deflate-compressed zip at `path`, in order.
fn write_archive(path: &Path, entries: &[ArchiveEntry]) -> Result<usize> {
    let zip_err = |e: zip::result::ZipError| Error::Internal(format!("zip: {e}"));

    let file = File::create(path)?;
    let mut zip = zip::ZipWriter::new(BufWriter::new(file));
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);

    for entry in entries {
        zip.start_file(entry.name.as_str(), options).map_err(zip_err)?;
        let mut source = File::open(&entry.path)?;
        std::io::copy(&mut source, &mut zip)?;
    }

    let mut writer = zip.finish().map_err(zip_err)?;
    writer.flush()?;
    Ok(entries.len())
}

/// Hands out unique `<stem>.<ext>` archive entry names in submission order.
#[derive(Debug, Default)]
struct EntryNames {
    taken: HashSet<String>,
}

impl EntryNames {
    fn assign(&mut self, stem: &str, format: TargetFormat) -> String {
        let ext = format.extension();
        let mut name = format!("{stem}.{ext}");
        let mut n = 2;
        while self.taken.contains(&name) {
            name = format!("{stem}-{n}.{ext}");
            n += 1;
        }
        self.taken.insert(name.clone());
        name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{test_context, MockConverter};
    use hf_core::JobStatus;
    use std::io::Read;

    async fn submit_raw(ctx: &AppContext, files: &[(&str, &[u8])]) -> BatchRequest {
        let job = ctx.jobs.create(files.len() as u32, TargetFormat::Png);
        ctx.storage.create_job_dir(job.id).unwrap();
        let mut inputs = Vec::new();
        for (index, (name, data)) in files.iter().enumerate() {
            let path = ctx
                .storage
                .write_input(job.id, index, name, data)
                .await
                .unwrap();
            inputs.push(BatchInput {
                index,
                file_name: name.to_string(),
                path,
            });
        }
        BatchRequest {
            job_id: job.id,
            format: TargetFormat::Png,
            quality: 90,
            inputs,
        }
    }

    fn archive_names(path: &Path) -> Vec<String> {
        let mut archive = zip::ZipArchive::new(File::open(path).unwrap()).unwrap();
        (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect()
    }

    #[test]
    fn entry_names_dedupe_in_order() {
        let mut names = EntryNames::default();
        assert_eq!(names.assign("IMG_1", TargetFormat::Jpeg), "IMG_1.jpeg");
        assert_eq!(names.assign("IMG_1", TargetFormat::Jpeg), "IMG_1-2.jpeg");
        assert_eq!(names.assign("IMG_1", TargetFormat::Jpeg), "IMG_1-3.jpeg");
        assert_eq!(names.assign("IMG_2", TargetFormat::Jpeg), "IMG_2.jpeg");
    }

    #[tokio::test]
    async fn partial_failure_completes_with_archive() {
        let (ctx, _tmp) = test_context(MockConverter);
        let request = submit_raw(
            &ctx,
            &[("a.heic", b"one"), ("b.heic", MockConverter::CORRUPT), ("c.heic", b"three")],
        )
        .await;
        let job_id = request.job_id;

        run_batch(ctx.clone(), request).await;

        let job = ctx.jobs.get(job_id).unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!((job.completed, job.failed), (2, 1));

        let archive = job.result_location.unwrap();
        assert_eq!(archive_names(&archive), vec!["a.png", "c.png"]);

        let mut zip = zip::ZipArchive::new(File::open(&archive).unwrap()).unwrap();
        let mut content = String::new();
        zip.by_name("c.png").unwrap().read_to_string(&mut content).unwrap();
        assert_eq!(content, "png:three");

        // Only the archive survives in the job directory.
        let remaining: Vec<_> = std::fs::read_dir(ctx.storage.job_dir(job_id))
            .unwrap()
            .collect();
        assert_eq!(remaining.len(), 1);
    }

    #[tokio::test]
    async fn all_failures_mark_job_failed() {
        let (ctx, _tmp) = test_context(MockConverter);
        let request = submit_raw(
            &ctx,
            &[("a.heic", MockConverter::CORRUPT), ("b.heic", MockConverter::CORRUPT)],
        )
        .await;
        let job_id = request.job_id;

        run_batch(ctx.clone(), request).await;

        let job = ctx.jobs.get(job_id).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!((job.completed, job.failed), (0, 2));
        assert!(job.error.unwrap().contains("No files"));
        assert!(job.result_location.is_none());
        assert!(!ctx.storage.job_dir(job_id).exists());
    }

    #[tokio::test]
    async fn duplicate_stems_get_suffixes() {
        let (ctx, _tmp) = test_context(MockConverter);
        let request = submit_raw(
            &ctx,
            &[("dir1/photo.heic", b"x"), ("photo.HEIC", b"y"), ("photo.heif", b"z")],
        )
        .await;
        let job_id = request.job_id;

        run_batch(ctx.clone(), request).await;

        let job = ctx.jobs.get(job_id).unwrap();
        assert_eq!(
            archive_names(&job.result_location.unwrap()),
            vec!["photo.png", "photo-2.png", "photo-3.png"]
        );
    }

    #[tokio::test]
    async fn missing_input_counts_as_failure() {
        let (ctx, _tmp) = test_context(MockConverter);
        let request = submit_raw(&ctx, &[("a.heic", b"ok"), ("b.heic", b"ok")]).await;
        std::fs::remove_file(&request.inputs[1].path).unwrap();
        let job_id = request.job_id;

        run_batch(ctx.clone(), request).await;

        let job = ctx.jobs.get(job_id).unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!((job.completed, job.failed), (1, 1));
    }

    #[tokio::test]
    async fn slow_conversion_times_out() {
        let (ctx, _tmp) = test_context(MockConverter);
        let result = convert_in_pool(
            &ctx,
            MockConverter::SLOW.to_vec(),
            None,
            TargetFormat::Jpeg,
            90,
            Duration::from_millis(50),
        )
        .await;
        assert!(matches!(result, Err(Error::Internal(ref m)) if m.contains("timed out")));
    }

    #[tokio::test]
    async fn timed_out_conversion_holds_its_slot() {
        let (ctx, _tmp) = crate::test_support::test_context_with(MockConverter, |c| {
            c.batch.max_concurrent_conversions = 1
        });
        let short = Duration::from_millis(50);

        let stuck =
            convert_in_pool(&ctx, MockConverter::SLOW.to_vec(), None, TargetFormat::Png, 90, short)
                .await;
        assert!(stuck.is_err());
        assert_eq!(ctx.conversion_slots.available_permits(), 0);

        // The only slot is still taken by the abandoned decode.
        let queued = convert_in_pool(&ctx, b"ok".to_vec(), None, TargetFormat::Png, 90, short).await;
        assert!(matches!(queued, Err(Error::Internal(ref m)) if m.contains("timed out")));

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(ctx.conversion_slots.available_permits(), 1);
        let ok = convert_in_pool(&ctx, b"ok".to_vec(), None, TargetFormat::Png, 90, short)
            .await
            .unwrap();
        assert_eq!(ok, b"png:ok");
    }

    #[tokio::test]
    async fn panicking_converter_is_a_file_failure() {
        let (ctx, _tmp) = test_context(MockConverter);
        let request = submit_raw(&ctx, &[("a.heic", MockConverter::PANIC), ("b.heic", b"ok")]).await;
        let job_id = request.job_id;

        run_batch(ctx.clone(), request).await;

        let job = ctx.jobs.get(job_id).unwrap();
        assert_eq!((job.completed, job.failed), (1, 1));
        assert_eq!(job.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn abort_job_is_idempotent_on_terminal_jobs() {
        let (ctx, _tmp) = test_context(MockConverter);
        let request = submit_raw(&ctx, &[("a.heic", b"ok")]).await;
        let job_id = request.job_id;
        run_batch(ctx.clone(), request).await;

        abort_job(&ctx, job_id, "late crash");
        let job = ctx.jobs.get(job_id).unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert!(job.error.is_none());
        assert!(job.result_location.unwrap().exists());
    }
}
