//! Transfer orchestrator.
//!
//! Drives one session per call through negotiation, streaming and
//! confirmation, emitting lifecycle events and honouring cancellation.

use std::future::Future;
use std::path::{Path, PathBuf};

use qmanager_data_channel::{ReceiveOptions, connect, receive_file, send_file};
use qmanager_protocol::constants::DOWNLOAD_MIN_VERSION;
use qmanager_protocol::{Direction, ServerVersion, StorageScope, TransferVerdict};
use qmanager_transfer::{NoProgress, ProgressBar, ProgressSink, TransferError};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::control::ControlPlane;
use crate::error::SessionError;
use crate::types::{SessionPhase, TransferConfig, TransferEvent, TransferSession};

/// Runs upload and download sessions against one control plane.
///
/// Methods take `&self`: several sessions may run concurrently on the same
/// orchestrator. They share the event channel and the cancellation token.
pub struct TransferOrchestrator<C> {
    control: C,
    config: TransferConfig,
    events_tx: mpsc::Sender<TransferEvent>,
    events_rx: Option<mpsc::Receiver<TransferEvent>>,
    cancel: CancellationToken,
}

impl<C: ControlPlane> TransferOrchestrator<C> {
    pub fn new(control: C, config: TransferConfig) -> Self {
        let (events_tx, events_rx) = mpsc::channel(256);
        Self {
            control,
            config,
            events_tx,
            events_rx: Some(events_rx),
            cancel: CancellationToken::new(),
        }
    }

    /// Takes the event receiver. Can only be called once.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<TransferEvent>> {
        self.events_rx.take()
    }

    /// Returns the token that aborts every running session.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn control(&self) -> &C {
        &self.control
    }

    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    /// Uploads `path` into `user`'s storage.
    ///
    /// With `compress` configured, images that are neither ISO nor already
    /// compressed are gzipped first; the `.gz` is what gets uploaded, and it
    /// is removed when the session ends.
    pub async fn upload(
        &self,
        user: &str,
        path: &Path,
        scope: StorageScope,
    ) -> Result<TransferSession, SessionError> {
        let mut session = TransferSession::new(Direction::Upload, path, scope);
        let outcome = self.run_upload(&mut session, user).await;
        self.conclude(session, outcome)
    }

    /// Downloads the remote file named after `dst`'s base name to `dst`.
    ///
    /// If the service rejects the received bytes, `dst` is deleted.
    pub async fn download(
        &self,
        user: &str,
        dst: &Path,
        scope: StorageScope,
    ) -> Result<TransferSession, SessionError> {
        let mut session = TransferSession::new(Direction::Download, dst, scope);
        let outcome = self.run_download(&mut session, user).await;
        self.conclude(session, outcome)
    }

    /// Lists the files stored for `user`.
    pub async fn list_files(&self, user: &str) -> Result<Vec<String>, SessionError> {
        self.cancellable(self.control.list_files(user)).await
    }

    async fn run_upload(
        &self,
        session: &mut TransferSession,
        user: &str,
    ) -> Result<(), SessionError> {
        self.check_cancelled()?;

        let generated = if self.config.compress {
            self.compress(&session.local_path).await?
        } else {
            None
        };
        if let Some(artifact) = &generated {
            session.local_path = artifact.path().to_path_buf();
        }

        let remote_name = remote_name(session.scope, &session.local_path)?;
        session.remote_name = Some(remote_name.clone());

        // 1. Negotiate
        self.enter(session, SessionPhase::Negotiating);
        self.probe_server().await?;

        let size = tokio::fs::metadata(&session.local_path)
            .await
            .map_err(TransferError::from)?
            .len();
        let ticket = self
            .cancellable(self.control.prepare_upload(user, &remote_name, size))
            .await?;
        info!(
            user,
            file = %remote_name,
            scope = %session.scope,
            size,
            port = ticket.port,
            "upload negotiated"
        );
        session.session_id = Some(ticket.session_id);
        session.port = Some(ticket.port);
        session.expected_size = Some(size);

        // 2. Stream
        self.enter(session, SessionPhase::Transferring);
        let stream = self
            .cancellable(connect(
                &self.config.server_host,
                ticket.port,
                self.config.connect_timeout,
            ))
            .await?;

        let mut bar = self.progress_bar(size);
        let mut silent = NoProgress;
        let sink: &mut dyn ProgressSink = match bar.as_mut() {
            Some(bar) => bar,
            None => &mut silent,
        };
        let sent = self
            .cancellable(send_file(
                &session.local_path,
                stream,
                &self.config.retry,
                sink,
            ))
            .await;
        if let Some(bar) = bar.as_mut() {
            bar.finish();
        }
        session.result = Some(sent?);

        // 3. Confirm
        let verdict = self.confirm(session).await?;
        drop(generated);
        if !verdict.ok {
            return Err(SessionError::RemoteVerification(verdict.detail));
        }
        Ok(())
    }

    async fn run_download(
        &self,
        session: &mut TransferSession,
        user: &str,
    ) -> Result<(), SessionError> {
        self.check_cancelled()?;
        let remote_name = remote_name(session.scope, &session.local_path)?;
        session.remote_name = Some(remote_name.clone());

        // 1. Negotiate
        self.enter(session, SessionPhase::Negotiating);
        let info = self.probe_server().await?;
        let version = ServerVersion::parse(&info.server_version);
        if !version.at_least(DOWNLOAD_MIN_VERSION) {
            return Err(SessionError::Capability {
                feature: "download",
                found: info.server_version,
                required: DOWNLOAD_MIN_VERSION,
            });
        }

        let ticket = self
            .cancellable(self.control.prepare_download(user, &remote_name))
            .await?
            .ok_or_else(|| SessionError::FileNotFound {
                scope: session.scope.to_string(),
                name: remote_name.clone(),
            })?;
        info!(
            user,
            file = %remote_name,
            scope = %session.scope,
            size = ticket.file_size,
            port = ticket.port,
            "download negotiated"
        );
        session.session_id = Some(ticket.session_id);
        session.port = Some(ticket.port);
        session.expected_size = Some(ticket.file_size);

        // 2. Stream
        self.enter(session, SessionPhase::Transferring);
        let stream = self
            .cancellable(connect(
                &self.config.server_host,
                ticket.port,
                self.config.connect_timeout,
            ))
            .await?;

        let options = ReceiveOptions {
            temp_dir: self.config.temp_dir.clone(),
            read_timeout: self.config.read_timeout,
            retry: self.config.retry,
        };
        let mut bar = self.progress_bar(ticket.file_size);
        let mut silent = NoProgress;
        let sink: &mut dyn ProgressSink = match bar.as_mut() {
            Some(bar) => bar,
            None => &mut silent,
        };
        let received = self
            .cancellable(receive_file(stream, &session.local_path, &options, sink))
            .await;
        if let Some(bar) = bar.as_mut() {
            bar.finish();
        }
        session.result = Some(received?);

        // 3. Confirm. Until the service accepts the bytes, `dst` is removed
        // on every exit, including a dropped future.
        let unconfirmed = RemoveOnDrop::new(session.local_path.clone(), "unconfirmed download");
        let verdict = self.confirm(session).await?;
        if !verdict.ok {
            return Err(SessionError::RemoteVerification(verdict.detail));
        }
        unconfirmed.keep();
        Ok(())
    }

    /// Polls the service until it returns a verdict on the transferred bytes.
    async fn confirm(&self, session: &mut TransferSession) -> Result<TransferVerdict, SessionError> {
        self.enter(session, SessionPhase::Confirming);

        let (Some(session_id), Some(result)) = (session.session_id.clone(), session.result.clone())
        else {
            return Err(SessionError::ControlPlane(
                "confirmation requested before transfer".into(),
            ));
        };

        loop {
            session.polls += 1;
            let attempt = session.polls;
            self.emit(TransferEvent::Polling {
                direction: session.direction,
                file: file_label(session),
                attempt,
            });

            let reply = match session.direction {
                Direction::Upload => self
                    .control
                    .poll_upload_result(&session_id, &result.digest),
                Direction::Download => {
                    self.control
                        .poll_download_result(&session_id, &result.digest, result.size)
                }
            };
            if let Some(verdict) = self.cancellable(reply).await? {
                debug!(%session_id, attempt, ok = verdict.ok, detail = %verdict.detail, "verdict received");
                return Ok(verdict);
            }

            if let Some(max) = self.config.max_polls
                && attempt >= max
            {
                return Err(SessionError::ConfirmTimeout(attempt));
            }

            debug!(%session_id, attempt, "service still verifying");
            let interval = self.config.poll_interval;
            self.cancellable(async move {
                tokio::time::sleep(interval).await;
                Ok::<_, SessionError>(())
            })
            .await?;
        }
    }

    /// Calls `server_info`; any failure means the service is unreachable.
    async fn probe_server(&self) -> Result<qmanager_protocol::ServerInfo, SessionError> {
        match self.cancellable(self.control.server_info()).await {
            Ok(info) => {
                debug!(version = %info.server_version, "server reachable");
                Ok(info)
            }
            Err(SessionError::Cancelled) => Err(SessionError::Cancelled),
            Err(e) => Err(SessionError::Unreachable(e.to_string())),
        }
    }

    /// Gzips `path` on the blocking pool.
    ///
    /// The output stays under a temporary name until it is handed back
    /// here; if this future is gone by then, the staged file is dropped
    /// with the task's result.
    async fn compress(&self, path: &Path) -> Result<Option<RemoveOnDrop>, SessionError> {
        let src = path.to_path_buf();
        let staged = tokio::task::spawn_blocking(move || qmanager_transfer::compress_staged(&src))
            .await
            .map_err(|e| TransferError::Io(std::io::Error::other(e)))??;

        let Some(staged) = staged else {
            return Ok(None);
        };
        info!(src = %path.display(), dst = %staged.target().display(), "compressed for upload");
        let generated = RemoveOnDrop::new(staged.persist()?, "compressed copy");
        self.check_cancelled()?;
        Ok(Some(generated))
    }

    fn progress_bar(&self, total: u64) -> Option<ProgressBar> {
        if self.config.quiet {
            return None;
        }
        match ProgressBar::stdout(total, self.config.progress_units) {
            Ok(bar) => Some(bar),
            Err(e) => {
                debug!(error = %e, "progress bar disabled");
                None
            }
        }
    }

    /// Runs `fut` unless the session is cancelled first.
    async fn cancellable<T, E>(
        &self,
        fut: impl Future<Output = Result<T, E>>,
    ) -> Result<T, SessionError>
    where
        SessionError: From<E>,
    {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(SessionError::Cancelled),
            res = fut => res.map_err(SessionError::from),
        }
    }

    fn check_cancelled(&self) -> Result<(), SessionError> {
        if self.cancel.is_cancelled() {
            Err(SessionError::Cancelled)
        } else {
            Ok(())
        }
    }

    fn enter(&self, session: &mut TransferSession, phase: SessionPhase) {
        session.phase = phase;
        debug!(direction = %session.direction, file = %file_label(session), %phase, "session phase");
        self.emit(TransferEvent::Phase {
            direction: session.direction,
            file: file_label(session),
            phase,
        });
    }

    fn conclude(
        &self,
        mut session: TransferSession,
        outcome: Result<(), SessionError>,
    ) -> Result<TransferSession, SessionError> {
        match outcome {
            Ok(()) => {
                self.enter(&mut session, SessionPhase::Succeeded);
                if let Some(result) = &session.result {
                    info!(
                        direction = %session.direction,
                        file = %file_label(&session),
                        size = result.size,
                        digest = %result.digest,
                        polls = session.polls,
                        "transfer confirmed"
                    );
                    self.emit(TransferEvent::Completed {
                        direction: session.direction,
                        file: file_label(&session),
                        result: result.clone(),
                    });
                }
                Ok(session)
            }
            Err(e) => {
                let failed_in = session.phase;
                session.phase = SessionPhase::Failed;
                error!(
                    direction = %session.direction,
                    file = %file_label(&session),
                    phase = %failed_in,
                    error = %e,
                    "transfer failed"
                );
                self.emit(TransferEvent::Failed {
                    direction: session.direction,
                    file: file_label(&session),
                    phase: failed_in,
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    fn emit(&self, event: TransferEvent) {
        // Nobody may be listening; a full channel drops the event.
        if let Err(e) = self.events_tx.try_send(event) {
            debug!(error = %e, "transfer event dropped");
        }
    }
}

fn remote_name(scope: StorageScope, path: &Path) -> Result<String, SessionError> {
    scope
        .remote_name(path)
        .map_err(|e| TransferError::InvalidPath(e.to_string()).into())
}

fn file_label(session: &TransferSession) -> String {
    match &session.remote_name {
        Some(name) => name.clone(),
        None => session.local_path.display().to_string(),
    }
}

/// File owned by a session: deleted when dropped unless kept.
struct RemoveOnDrop {
    path: PathBuf,
    what: &'static str,
    keep: bool,
}

impl RemoveOnDrop {
    fn new(path: PathBuf, what: &'static str) -> Self {
        Self {
            path,
            what,
            keep: false,
        }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn keep(mut self) {
        self.keep = true;
    }
}

impl Drop for RemoveOnDrop {
    fn drop(&mut self) {
        if self.keep {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), what = self.what, "removed"),
            Err(e) => {
                warn!(path = %self.path.display(), what = self.what, error = %e, "failed to remove")
            }
        }
    }
}
