//! The job runner: turns one queued job into either a rename pass or an
//! encode through the frame pipeline.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tlq_media::{
    locate_ffmpeg_from, spawn_frame_source, spawn_stage, Crop, EncodeRequest, EncoderDriver,
    FrameRange, FrameStream, JobLogger, Resize, Rotate, Stacker,
};
use tlq_models::{ImageSequence, JobConfig, OutputProfile};
use tlq_queue::{JobRunner, ProgressReporter, RunContext};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::rename::rename_sequence;

/// Which program receives the raw frames.
#[derive(Debug, Clone, Default)]
pub enum EncoderCommand {
    /// FFmpeg, configured or found on `PATH`, writing the job's H.264 output
    #[default]
    Ffmpeg,
    /// Any program with fixed arguments, fed the same raw frames
    Custom { program: PathBuf, args: Vec<String> },
}

/// Runs conversion and rename jobs for the scheduler.
#[derive(Debug, Clone)]
pub struct ConvertRunner {
    config: WorkerConfig,
    encoder: EncoderCommand,
}

impl ConvertRunner {
    pub fn new(config: WorkerConfig) -> Self {
        Self {
            config,
            encoder: EncoderCommand::Ffmpeg,
        }
    }

    pub fn with_encoder(mut self, encoder: EncoderCommand) -> Self {
        self.encoder = encoder;
        self
    }

    fn encode_request(
        &self,
        job: &JobConfig,
        profile: &OutputProfile,
        output: PathBuf,
    ) -> WorkerResult<EncodeRequest> {
        let expected = job.expected_frames();
        Ok(match &self.encoder {
            EncoderCommand::Ffmpeg => EncodeRequest::h264(
                locate_ffmpeg_from(self.config.ffmpeg.clone())?,
                output,
                job.fps(),
                profile.ffmpeg_args.iter().copied(),
                expected,
            ),
            EncoderCommand::Custom { program, args } => {
                EncodeRequest::with_args(program, args.iter().cloned(), expected)
            }
        })
    }

    async fn convert(
        &self,
        job: &JobConfig,
        sequence: ImageSequence,
        progress: ProgressReporter,
        cancel: CancellationToken,
        log: &JobLogger,
    ) -> WorkerResult<()> {
        let profile = job.output_profile()?;
        let output = sequence.output_path(job.filename());
        if output.exists() {
            return Err(WorkerError::OutputExists(output));
        }

        let request = self.encode_request(job, profile, output)?;
        let frames = build_pipeline(job, profile, Arc::new(sequence), cancel.clone());

        EncoderDriver::new(self.config.driver_settings())
            .run(
                &request,
                frames,
                move |p| progress.report(p.percent),
                cancel,
                log,
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl JobRunner for ConvertRunner {
    async fn run(&self, ctx: RunContext) -> anyhow::Result<()> {
        let RunContext {
            job_id,
            config,
            sequence,
            cancel,
            progress,
            log_path,
        } = ctx;

        let operation = if config.rename_only { "rename" } else { "convert" };
        let log = JobLogger::with_file(&job_id, operation, &log_path)?;
        let span = log.create_span();
        log.log_start(&format!("Configuration: {}", serde_json::to_string(&config)?));

        let result = async {
            if config.rename_only {
                let reporter = progress.clone();
                rename_sequence(&config, &sequence, |p| reporter.report(p), &cancel, &log)
                    .await
                    .map(|_| ())
            } else {
                self.convert(&config, sequence, progress, cancel.clone(), &log)
                    .await
            }
        }
        .instrument(span)
        .await;

        match &result {
            Ok(()) => log.log_completion(&format!("Finished {}", config.filename())),
            Err(e) => log.log_error(&e.to_string()),
        }
        Ok(result?)
    }
}

/// Chain source, rotate, crop, resize and (optionally) stack for `job`.
///
/// Rotation happens first so the crop region is in rotated coordinates.
pub fn build_pipeline(
    job: &JobConfig,
    profile: &OutputProfile,
    sequence: Arc<ImageSequence>,
    cancel: CancellationToken,
) -> FrameStream {
    let mut frames = spawn_frame_source(sequence, FrameRange::from_config(job), cancel.clone());
    if job.rotation() % 360 != 0 {
        frames = spawn_stage(Rotate::new(job.rotation()), frames, cancel.clone());
    }
    frames = spawn_stage(Crop::new(job.region()), frames, cancel.clone());
    frames = spawn_stage(
        Resize::new(profile.width, profile.height),
        frames,
        cancel.clone(),
    );
    if let Some(stack) = job.stack_options() {
        frames = Stacker::from_config(&stack).spawn(frames, cancel);
    }
    frames
}
