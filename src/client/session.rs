//! One interactive search surface: a single debounce timer and a single
//! in-flight request slot, driven by a background task.
//!
//! ```text
//! Idle -> Debouncing -> InFlight -> Settled | Failed
//!                    \-> Settled (empty text)
//! any  -> Cancelled (close)
//! ```
//!
//! Every request gets the next sequence number. A completion is applied only
//! if its number is still the current one, so a superseded request can never
//! overwrite newer results however late it arrives.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;

use super::{ClientQuery, FetchError, SearchFetcher};
use crate::search::{FallbackReason, SearchMode, SearchResponse, SearchResultItem, SearchScope};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(280);

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub debounce: Duration,
    pub mode: SearchMode,
    pub scope: Option<SearchScope>,
    pub limit: Option<usize>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            mode: SearchMode::Hybrid,
            scope: None,
            limit: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Phase {
    #[default]
    Idle,
    Debouncing,
    InFlight,
    Settled,
    Cancelled,
    Failed,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Sign in again; typing will not retry until then.
    #[error("must re-authenticate")]
    MustReauthenticate,

    /// Retry by typing or refreshing.
    #[error("search failed: {0}")]
    Failed(String),
}

/// Visible state of a session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub phase: Phase,
    pub query: String,
    /// Requested mode.
    pub mode: SearchMode,
    pub items: Vec<SearchResultItem>,
    /// Mode the server actually ran for the visible items.
    pub mode_used: Option<SearchMode>,
    pub fallback_reason: Option<FallbackReason>,
    pub error: Option<SessionError>,
    /// A manual refresh is outstanding.
    pub refreshing: bool,
    /// Sequence number of the latest request.
    pub generation: u64,
}

impl SessionSnapshot {
    fn new(mode: SearchMode) -> Self {
        Self {
            phase: Phase::Idle,
            query: String::new(),
            mode,
            items: vec![],
            mode_used: None,
            fallback_reason: None,
            error: None,
            refreshing: false,
            generation: 0,
        }
    }

    /// Whether to tell the user results came from a degraded mode.
    pub fn show_fallback_notice(&self) -> bool {
        self.fallback_reason.is_some() && self.mode_used.is_some_and(|used| used != self.mode)
    }
}

#[derive(Debug)]
enum Command {
    Input(String),
    SetMode(SearchMode),
    Refresh,
    Reauthenticated,
    Close,
}

#[derive(Debug)]
struct Completion {
    generation: u64,
    result: Result<SearchResponse, FetchError>,
}

/// Handle to a running session.
pub struct QuerySession {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<SessionSnapshot>,
    task: JoinHandle<()>,
}

impl QuerySession {
    /// Starts the session task on the current tokio runtime.
    pub fn spawn(fetcher: Arc<dyn SearchFetcher>, options: SessionOptions) -> Self {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (done_tx, done_rx) = mpsc::unbounded_channel();
        let controller = Controller::new(fetcher, options, done_tx);
        let (state_tx, state_rx) = watch::channel(controller.state.clone());

        let task = tokio::spawn(run(controller, commands_rx, done_rx, state_tx));

        Self {
            commands: commands_tx,
            state: state_rx,
            task,
        }
    }

    /// New text from the input box.
    pub fn input(&self, text: impl Into<String>) {
        self.send(Command::Input(text.into()));
    }

    pub fn set_mode(&self, mode: SearchMode) {
        self.send(Command::SetMode(mode));
    }

    /// Re-runs the current text immediately, skipping the debounce.
    pub fn refresh(&self) {
        self.send(Command::Refresh);
    }

    pub fn reauthenticated(&self) {
        self.send(Command::Reauthenticated);
    }

    /// Cancels outstanding work and stops the session task.
    pub async fn close(self) {
        self.send(Command::Close);
        if let Err(e) = self.task.await {
            log::error!("query session task failed: {e}");
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.state.clone()
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            log::debug!("query session already closed");
        }
    }
}

async fn run(
    mut controller: Controller,
    mut commands: mpsc::UnboundedReceiver<Command>,
    mut completions: mpsc::UnboundedReceiver<Completion>,
    state: watch::Sender<SessionSnapshot>,
) {
    loop {
        let deadline = controller.deadline;
        let closed = tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Close) | None => {
                    controller.close();
                    true
                }
                Some(command) => {
                    controller.handle(command);
                    false
                }
            },
            _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                controller.fire();
                false
            }
            Some(done) = completions.recv() => {
                controller.complete(done);
                false
            }
        };

        let next = controller.state.clone();
        state.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });

        if closed {
            break;
        }
    }
}

struct Controller {
    fetcher: Arc<dyn SearchFetcher>,
    options: SessionOptions,
    state: SessionSnapshot,
    deadline: Option<Instant>,
    in_flight: Option<CancellationToken>,
    needs_reauth: bool,
    completions: mpsc::UnboundedSender<Completion>,
}

impl Controller {
    fn new(
        fetcher: Arc<dyn SearchFetcher>,
        options: SessionOptions,
        completions: mpsc::UnboundedSender<Completion>,
    ) -> Self {
        let state = SessionSnapshot::new(options.mode);
        Self {
            fetcher,
            options,
            state,
            deadline: None,
            in_flight: None,
            needs_reauth: false,
            completions,
        }
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Input(text) => self.input(text),
            Command::SetMode(mode) => {
                self.options.mode = mode;
                self.state.mode = mode;
                if !self.state.query.trim().is_empty() {
                    self.input(self.state.query.clone());
                }
            }
            Command::Refresh => self.refresh(),
            Command::Reauthenticated => {
                self.needs_reauth = false;
                if self.state.error == Some(SessionError::MustReauthenticate) {
                    self.state.error = None;
                    self.input(self.state.query.clone());
                }
            }
            Command::Close => self.close(),
        }
    }

    fn auth_blocked(&self) -> bool {
        self.needs_reauth || !self.fetcher.has_credentials()
    }

    fn input(&mut self, text: String) {
        self.state.query = text;

        if self.state.query.trim().is_empty() {
            self.deadline = None;
            self.supersede();
            self.state.items.clear();
            self.state.mode_used = None;
            self.state.fallback_reason = None;
            self.state.error = None;
            self.state.phase = Phase::Settled;
            return;
        }

        if self.auth_blocked() {
            self.require_reauth();
            return;
        }

        self.deadline = Some(Instant::now() + self.options.debounce);
        self.state.phase = Phase::Debouncing;
    }

    fn refresh(&mut self) {
        if self.state.query.trim().is_empty() {
            return;
        }
        if self.auth_blocked() {
            self.require_reauth();
            return;
        }
        self.start_request(true);
    }

    /// The debounce timer expired.
    fn fire(&mut self) {
        self.deadline = None;
        self.start_request(false);
    }

    fn start_request(&mut self, refreshing: bool) {
        self.supersede();

        let generation = self.state.generation;
        let token = CancellationToken::new();
        self.in_flight = Some(token.clone());

        let query = ClientQuery {
            q: self.state.query.trim().to_string(),
            mode: self.options.mode,
            scope: self.options.scope,
            folder_id: None,
            kind: None,
            limit: self.options.limit,
        };
        log::debug!("request #{generation}: {:?} ({})", query.q, query.mode);

        let fetcher = self.fetcher.clone();
        let completions = self.completions.clone();
        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    log::debug!("request #{generation} aborted");
                }
                result = fetcher.fetch(query) => {
                    let _ = completions.send(Completion { generation, result });
                }
            }
        });

        self.state.phase = Phase::InFlight;
        self.state.refreshing = refreshing;
        self.state.error = None;
    }

    /// Aborts the outstanding request and invalidates its sequence number.
    fn supersede(&mut self) {
        if let Some(token) = self.in_flight.take() {
            token.cancel();
        }
        self.state.generation += 1;
        self.state.refreshing = false;
    }

    fn require_reauth(&mut self) {
        self.deadline = None;
        self.supersede();
        self.state.phase = Phase::Failed;
        self.state.error = Some(SessionError::MustReauthenticate);
    }

    fn complete(&mut self, done: Completion) {
        if done.generation != self.state.generation || self.in_flight.is_none() {
            log::debug!("discarding stale response #{}", done.generation);
            return;
        }

        self.in_flight = None;
        self.state.refreshing = false;
        let debouncing = self.deadline.is_some();

        match done.result {
            Ok(response) => {
                self.state.items = response.items;
                self.state.mode_used = Some(response.mode_used);
                self.state.fallback_reason = response.fallback_reason;
                self.state.error = None;
                self.state.phase = if debouncing {
                    Phase::Debouncing
                } else {
                    Phase::Settled
                };
            }
            Err(FetchError::Unauthenticated) => {
                self.needs_reauth = true;
                self.deadline = None;
                self.state.phase = Phase::Failed;
                self.state.error = Some(SessionError::MustReauthenticate);
            }
            Err(FetchError::Failed(message)) => {
                self.state.error = Some(SessionError::Failed(message));
                self.state.phase = if debouncing {
                    Phase::Debouncing
                } else {
                    Phase::Failed
                };
            }
        }
    }

    fn close(&mut self) {
        self.deadline = None;
        self.supersede();
        let generation = self.state.generation;
        self.state = SessionSnapshot {
            phase: Phase::Cancelled,
            generation,
            ..SessionSnapshot::new(self.options.mode)
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct NeverFetcher;

    #[async_trait]
    impl SearchFetcher for NeverFetcher {
        async fn fetch(&self, _query: ClientQuery) -> Result<SearchResponse, FetchError> {
            std::future::pending().await
        }
    }

    fn response(mode_used: SearchMode) -> SearchResponse {
        SearchResponse {
            items: vec![],
            mode_used,
            fallback_reason: None,
        }
    }

    fn controller() -> (Controller, mpsc::UnboundedReceiver<Completion>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Controller::new(Arc::new(NeverFetcher), SessionOptions::default(), tx),
            rx,
        )
    }

    #[tokio::test]
    async fn test_stale_completion_is_discarded() {
        let (mut ctl, _rx) = controller();

        ctl.handle(Command::Input("de".to_string()));
        ctl.fire();
        let first = ctl.state.generation;
        ctl.handle(Command::Input("design".to_string()));
        ctl.fire();
        let second = ctl.state.generation;
        assert!(second > first);

        ctl.complete(Completion {
            generation: second,
            result: Ok(response(SearchMode::Hybrid)),
        });
        assert_eq!(ctl.state.phase, Phase::Settled);
        assert_eq!(ctl.state.mode_used, Some(SearchMode::Hybrid));

        ctl.complete(Completion {
            generation: first,
            result: Ok(response(SearchMode::Keyword)),
        });
        assert_eq!(ctl.state.mode_used, Some(SearchMode::Hybrid));
        assert_eq!(ctl.state.phase, Phase::Settled);
    }

    #[tokio::test]
    async fn test_stale_error_is_discarded() {
        let (mut ctl, _rx) = controller();

        ctl.handle(Command::Input("a".to_string()));
        ctl.fire();
        let first = ctl.state.generation;
        ctl.handle(Command::Input("ab".to_string()));
        ctl.fire();

        ctl.complete(Completion {
            generation: first,
            result: Err(FetchError::Failed("boom".to_string())),
        });
        assert_eq!(ctl.state.phase, Phase::InFlight);
        assert!(ctl.state.error.is_none());
    }

    #[tokio::test]
    async fn test_empty_input_settles_and_invalidates_in_flight() {
        let (mut ctl, _rx) = controller();

        ctl.handle(Command::Input("rust".to_string()));
        ctl.fire();
        let in_flight = ctl.state.generation;

        ctl.handle(Command::Input("   ".to_string()));
        assert_eq!(ctl.state.phase, Phase::Settled);
        assert!(ctl.deadline.is_none());

        ctl.complete(Completion {
            generation: in_flight,
            result: Ok(response(SearchMode::Hybrid)),
        });
        assert_eq!(ctl.state.mode_used, None);
    }

    #[tokio::test]
    async fn test_response_during_debounce_keeps_debouncing() {
        let (mut ctl, _rx) = controller();

        ctl.handle(Command::Input("ru".to_string()));
        ctl.fire();
        let generation = ctl.state.generation;
        ctl.handle(Command::Input("rust".to_string()));
        assert_eq!(ctl.state.phase, Phase::Debouncing);

        ctl.complete(Completion {
            generation,
            result: Ok(response(SearchMode::Hybrid)),
        });
        assert_eq!(ctl.state.phase, Phase::Debouncing);
        assert_eq!(ctl.state.mode_used, Some(SearchMode::Hybrid));
    }

    #[tokio::test]
    async fn test_unauthenticated_latches() {
        let (mut ctl, _rx) = controller();

        ctl.handle(Command::Input("rust".to_string()));
        ctl.fire();
        let generation = ctl.state.generation;
        ctl.complete(Completion {
            generation,
            result: Err(FetchError::Unauthenticated),
        });
        assert_eq!(ctl.state.error, Some(SessionError::MustReauthenticate));

        ctl.handle(Command::Input("rust async".to_string()));
        assert_eq!(ctl.state.phase, Phase::Failed);
        assert!(ctl.deadline.is_none());

        ctl.handle(Command::Reauthenticated);
        assert_eq!(ctl.state.phase, Phase::Debouncing);
        assert!(ctl.state.error.is_none());
    }

    #[test]
    fn test_fallback_notice() {
        let mut snapshot = SessionSnapshot::new(SearchMode::Hybrid);
        assert!(!snapshot.show_fallback_notice());

        snapshot.mode_used = Some(SearchMode::Keyword);
        snapshot.fallback_reason = Some(FallbackReason::SemanticUnavailable);
        assert!(snapshot.show_fallback_notice());

        snapshot.mode = SearchMode::Keyword;
        assert!(!snapshot.show_fallback_notice());
    }
}
