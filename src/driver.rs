//! End-to-end renders: scene to markup, and markup to PDF through an engine.

use crate::builder::{self, Measurer, SessionOutcome};
use crate::error::PipelineError;
use log::{debug, info};
use pgfkit_online::process::engine_command;
use pgfkit_online::{OnlineError, Session, SessionConfig};
use pgfkit_render_core::{PgfWriter, Scene, document_tail, standalone_document};
use pgfkit_types::{OutputFormat, RenderOptions, Size};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// The options' size, or the scene's own when the options leave it at zero.
fn output_size(options: &RenderOptions, scene: &Scene) -> Size {
    if options.size == Size::zero() { scene.size } else { options.size }
}

fn picture(options: &RenderOptions, scene: &Scene) -> Result<String, PipelineError> {
    let markup = PgfWriter::new(options.profile.dialect)
        .with_readable(options.readable)
        .with_size(output_size(options, scene))
        .render(scene)?;
    Ok(markup)
}

/// Serializes `scene`, wrapped in a full document when `options.standalone` is set.
pub fn render_markup(options: &RenderOptions, scene: &Scene) -> Result<String, PipelineError> {
    let body = picture(options, scene)?;
    if options.standalone {
        Ok(standalone_document(&options.profile, output_size(options, scene), &body))
    } else {
        Ok(body)
    }
}

/// Writes `scene` to `target` as markup or, for a `.pdf` target, as a PDF
/// produced by a one-shot engine run.
pub async fn render_to_file(
    options: &RenderOptions,
    config: &SessionConfig,
    scene: &Scene,
    target: &Path,
) -> Result<(), PipelineError> {
    match OutputFormat::from_path(target) {
        OutputFormat::Markup => {
            let markup = render_markup(options, scene)?;
            tokio::fs::write(target, markup).await?;
            info!("Wrote markup to {}", target.display());
        }
        OutputFormat::Pdf => render_pdf(options, scene, target, config).await?,
    }
    Ok(())
}

/// Runs the engine once over a standalone document for `scene` and copies
/// the resulting PDF to `out_path`.
///
/// The engine runs in a scratch directory; relative inputs resolve against
/// the current directory and the directory of `out_path`.
pub async fn render_pdf(
    options: &RenderOptions,
    scene: &Scene,
    out_path: &Path,
    config: &SessionConfig,
) -> Result<(), PipelineError> {
    let profile = &options.profile;
    profile.validate()?;
    let document = render_markup(&options.clone().with_standalone(true), scene)?;

    let workdir = tempfile::Builder::new().prefix("pgfkit-").tempdir()?;
    let mut search_dirs = config.search_dirs.clone();
    search_dirs.extend(input_dirs(out_path)?);

    let mut command = engine_command(profile, workdir.path(), &search_dirs);
    let mut child = command.spawn().map_err(|e| OnlineError::SpawnFailed {
        command: profile.command.clone(),
        message: e.to_string(),
    })?;
    info!("Running '{}' once for {}", profile.command, out_path.display());

    let stdin = child.stdin.take();
    let feed = async move {
        if let Some(mut stdin) = stdin {
            // The leading \relax keeps the first line from being taken as a file name.
            stdin.write_all(b"\\relax\n").await?;
            stdin.write_all(document.as_bytes()).await?;
            stdin.flush().await?;
        }
        Ok::<(), std::io::Error>(())
    };
    let run = tokio::time::timeout(config.read_timeout, async {
        // Output is drained while input is fed, so neither pipe can fill up.
        let (fed, output) = tokio::join!(feed, child.wait_with_output());
        if let Err(e) = fed {
            debug!("Engine stopped reading its input: {}", e);
        }
        output
    });
    let output = match run.await {
        Ok(output) => output?,
        Err(_) => {
            return Err(OnlineError::Timeout { timeout: config.read_timeout, log: String::new() }.into());
        }
    };

    let log = String::from_utf8_lossy(&output.stdout).into_owned();
    let artifact = profile.artifact_name();
    let produced = workdir.path().join(&artifact);
    if !output.status.success() || !produced.is_file() {
        return Err(PipelineError::NoArtifact { artifact, log });
    }
    if let Some(parent) = out_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::copy(&produced, out_path).await?;
    info!("Wrote PDF to {}", out_path.display());
    Ok(())
}

/// Builds a scene with live measurements and writes it to `target`.
///
/// For a PDF target the measuring session also typesets the final document,
/// so only one engine process runs.
pub async fn render_online<F>(
    options: &RenderOptions,
    config: &SessionConfig,
    program: F,
    target: &Path,
) -> Result<SessionOutcome, PipelineError>
where
    F: FnOnce(&mut Measurer) -> Result<Scene, OnlineError> + Send + 'static,
{
    let mut config = config.clone();
    config.search_dirs.extend(input_dirs(target)?);
    let session = Session::open(options.profile.clone(), config).await?;
    render_online_with(session, options, program, target).await
}

/// [`render_online`] over an already opened session.
pub async fn render_online_with<C, F>(
    mut session: Session<C>,
    options: &RenderOptions,
    program: F,
    target: &Path,
) -> Result<SessionOutcome, PipelineError>
where
    C: pgfkit_traits::TexChannel,
    F: FnOnce(&mut Measurer) -> Result<Scene, OnlineError> + Send + 'static,
{
    let scene = builder::run_with_session(&mut session, program).await?;
    let measurements = session.queries();

    let result = match OutputFormat::from_path(target) {
        OutputFormat::Markup => {
            session.close().await?;
            let markup = render_markup(options, &scene)?;
            tokio::fs::write(target, markup).await?;
            Ok(())
        }
        OutputFormat::Pdf => finish_pdf(&mut session, options, &scene, target).await,
    };
    if result.is_err() {
        if let Err(e) = session.close().await {
            debug!("Closing session after a failed render: {}", e);
        }
    }
    result?;

    Ok(SessionOutcome {
        measurements,
        exit_code: session.exit().and_then(|e| e.code),
    })
}

async fn finish_pdf<C: pgfkit_traits::TexChannel>(
    session: &mut Session<C>,
    options: &RenderOptions,
    scene: &Scene,
    target: &Path,
) -> Result<(), PipelineError> {
    let body = picture(options, scene)?;
    let tail = document_tail(&options.profile, output_size(options, scene), &body);
    let pdf = session.finish_document(&tail).await?;
    if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(target, pdf).await?;
    info!("Wrote PDF to {}", target.display());
    Ok(())
}

/// The caller's current directory and the canonical directory of `target`.
fn input_dirs(target: &Path) -> Result<Vec<PathBuf>, PipelineError> {
    let cwd = std::env::current_dir()?;
    let mut dirs = vec![cwd.clone()];
    let parent = target
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or(cwd);
    if let Ok(canonical) = parent.canonicalize() {
        if !dirs.contains(&canonical) {
            dirs.push(canonical);
        }
    }
    Ok(dirs)
}
