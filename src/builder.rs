//! Scene construction that can stop mid-way to ask the engine for a box size.
//!
//! The builder program is ordinary synchronous code running on a blocking
//! worker thread. Each measurement point sends one request over a channel to
//! the task that owns the [`Session`] and blocks until the reply arrives, so the
//! engine only ever sees one query at a time, in program order.

use log::{debug, info, warn};
use pgfkit_online::{OnlineError, ProcessChannel, Session, SessionConfig};
use pgfkit_render_core::TextNode;
use pgfkit_traits::TexChannel;
use pgfkit_types::{EngineProfile, MeasureKind, MeasurementRequest, MeasurementResult};
use tokio::sync::oneshot;

/// What the session did over a whole builder run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionOutcome {
    /// Completed measurement round trips.
    pub measurements: usize,
    /// The engine's exit code once the session was closed.
    pub exit_code: Option<i32>,
}

impl SessionOutcome {
    fn of<C: TexChannel>(session: &Session<C>) -> Self {
        Self {
            measurements: session.queries(),
            exit_code: session.exit().and_then(|e| e.code),
        }
    }
}

struct MeasureCall {
    request: MeasurementRequest,
    reply: oneshot::Sender<Result<MeasurementResult, OnlineError>>,
}

/// Handle a builder program uses to reach the engine.
pub struct Measurer {
    tx: async_channel::Sender<MeasureCall>,
    failed: bool,
    calls: usize,
}

impl Measurer {
    fn new(tx: async_channel::Sender<MeasureCall>) -> Self {
        Self { tx, failed: false, calls: 0 }
    }

    /// Typesets `request` and blocks until the engine reports its size.
    ///
    /// Once a measurement has failed, every later call returns
    /// [`OnlineError::Aborted`] without reaching the engine.
    pub fn measure(&mut self, request: MeasurementRequest) -> Result<MeasurementResult, OnlineError> {
        if self.failed {
            return Err(OnlineError::Aborted);
        }
        self.calls += 1;
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.tx.send_blocking(MeasureCall { request, reply: reply_tx }).is_err() {
            self.failed = true;
            return Err(OnlineError::Aborted);
        }
        match reply_rx.blocking_recv() {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(err)) => {
                self.failed = true;
                Err(err)
            }
            Err(_) => {
                self.failed = true;
                Err(OnlineError::Aborted)
            }
        }
    }

    /// A text node sized by the engine, baseline at the origin.
    pub fn text(&mut self, content: impl Into<String>) -> Result<TextNode, OnlineError> {
        let content = content.into();
        let metrics = self.measure(MeasurementRequest::new(content.clone()).with_kind(MeasureKind::Baseline))?;
        Ok(TextNode::new(content).with_metrics(metrics))
    }

    /// Measurement points reached so far, including failed ones.
    pub fn calls(&self) -> usize {
        self.calls
    }
}

/// Runs `program` against a fresh engine session for `profile`.
///
/// The session is closed when the program finishes, whether it succeeded or not.
pub async fn run<T, F>(
    profile: EngineProfile,
    config: SessionConfig,
    program: F,
) -> Result<(T, SessionOutcome), OnlineError>
where
    T: Send + 'static,
    F: FnOnce(&mut Measurer) -> Result<T, OnlineError> + Send + 'static,
{
    let session = Session::<ProcessChannel>::open(profile, config).await?;
    run_session(session, program).await
}

/// Like [`run`], over an already opened session. The session is consumed and closed.
pub async fn run_session<C, T, F>(mut session: Session<C>, program: F) -> Result<(T, SessionOutcome), OnlineError>
where
    C: TexChannel,
    T: Send + 'static,
    F: FnOnce(&mut Measurer) -> Result<T, OnlineError> + Send + 'static,
{
    let value = run_with_session(&mut session, program).await?;
    session.close().await?;
    Ok((value, SessionOutcome::of(&session)))
}

/// Runs `program` against `session` and leaves it open on success, so the
/// caller can keep using the engine. On failure the session is closed before
/// the error is returned.
pub async fn run_with_session<C, T, F>(session: &mut Session<C>, program: F) -> Result<T, OnlineError>
where
    C: TexChannel,
    T: Send + 'static,
    F: FnOnce(&mut Measurer) -> Result<T, OnlineError> + Send + 'static,
{
    // Capacity one: the program blocks on each reply, so there is never a second request queued.
    let (tx, rx) = async_channel::bounded::<MeasureCall>(1);

    let worker = tokio::task::spawn_blocking(move || {
        let mut measurer = Measurer::new(tx);
        program(&mut measurer)
    });

    let mut failure: Option<OnlineError> = None;
    // Ends once the program returns (or unwinds) and drops its measurer.
    while let Ok(call) = rx.recv().await {
        let reply = if failure.is_some() {
            Err(OnlineError::Aborted)
        } else {
            match session.measure(&call.request).await {
                Ok(result) => Ok(result),
                Err(err) => {
                    warn!("Measurement of {:?} failed: {}", call.request.content, err);
                    let reply = err.clone();
                    failure = Some(err);
                    Err(reply)
                }
            }
        };
        if call.reply.send(reply).is_err() {
            debug!("Builder program stopped waiting for a measurement");
        }
    }

    let outcome = match worker.await {
        Ok(Ok(value)) => match failure {
            // The program swallowed a failed measurement; the run still fails.
            Some(err) => Err(err),
            None => Ok(value),
        },
        Ok(Err(err)) => Err(failure.unwrap_or(err)),
        Err(join_err) => Err(OnlineError::BuilderPanicked(panic_message(join_err))),
    };

    match outcome {
        Ok(value) => {
            info!("Builder finished after {} measurement(s)", session.queries());
            Ok(value)
        }
        Err(err) => {
            if let Err(close_err) = session.close().await {
                debug!("Closing session after builder failure: {}", close_err);
            }
            Err(err)
        }
    }
}

fn panic_message(err: tokio::task::JoinError) -> String {
    if !err.is_panic() {
        return err.to_string();
    }
    let payload = err.into_panic();
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
