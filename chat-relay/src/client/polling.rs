//! Polling controller: message state plus at most one periodic poll task.
//!
//! Each poll task is tagged with a generation number. Stopping or restarting
//! bumps the generation, and a cycle only applies its results while its
//! generation is still current, so a fetch that was in flight when polling
//! stopped can never overwrite newer state.
//!
//! One-shot operations (load, submit, clear) are tagged the same way with the
//! scope epoch, which `switch_scope` bumps, so a response for the previous
//! project or conversation is dropped once the switch has happened.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, warn};

use super::api::{ChatApi, ChatScope, InstructionRoute};
use super::images::prepare_images;
use crate::error::ClientError;
use crate::types::{ImageAttachment, InstructionRequest, SessionStatus};

/// Fixed delay between poll cycles.
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

const LOAD_FAILURE: &str = "Failed to load messages";
const CLEAR_FAILURE: &str = "Failed to clear messages";

/// Observable client state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatState {
    pub messages: Vec<Value>,
    pub is_loading: bool,
    pub error: Option<String>,
    pub current_session: Option<Value>,
    last_message_count: usize,
}

impl ChatState {
    /// Length of the last message list that was stored.
    pub const fn last_message_count(&self) -> usize {
        self.last_message_count
    }

    /// Alias of `is_loading`.
    pub const fn has_active_requests(&self) -> bool {
        self.is_loading
    }

    fn replace_messages(&mut self, messages: Vec<Value>) {
        self.last_message_count = messages.len();
        self.messages = messages;
    }

    /// Store a polled list only when its length changed.
    ///
    /// Edits that keep the count (a message finalized in place, a
    /// replacement) go unnoticed until the count moves.
    fn merge_polled_messages(&mut self, messages: Vec<Value>) {
        if messages.len() != self.last_message_count {
            self.replace_messages(messages);
        }
    }

    fn apply_status(&mut self, status: SessionStatus) {
        if status.has_active_session {
            self.is_loading = status.is_busy();
            self.current_session = status.session;
        } else {
            self.current_session = None;
            self.is_loading = false;
        }
    }
}

/// Per-submission options.
#[derive(Debug, Clone, Default)]
pub struct InstructionOptions {
    pub cli_preference: Option<String>,
    pub fallback_enabled: Option<bool>,
    pub images: Vec<ImageAttachment>,
}

struct Inner<A> {
    api: A,
    scope: RwLock<ChatScope>,
    state: RwLock<ChatState>,
    poller: Mutex<Option<JoinHandle<()>>>,
    generation: AtomicU64,
    epoch: AtomicU64,
}

impl<A: ChatApi> Inner<A> {
    fn poller(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.poller.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn poll_loop(self: Arc<Self>, scope: ChatScope, generation: u64) {
        let mut ticker = tokio::time::interval(POLL_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.poll_once(&scope, generation).await;
        }
    }

    /// One cycle: messages first, then status. Each fetch fails on its own.
    async fn poll_once(&self, scope: &ChatScope, generation: u64) {
        match self.api.fetch_messages(scope).await {
            Ok(messages) => {
                self.apply(generation, |state| state.merge_polled_messages(messages))
                    .await;
            }
            Err(e) => warn!("Polling error ({scope}): failed to fetch messages: {e}"),
        }

        match self.api.fetch_status(&scope.project_id).await {
            Ok(status) => self.apply(generation, |state| state.apply_status(status)).await,
            Err(e) => warn!("Polling error ({scope}): failed to fetch status: {e}"),
        }
    }

    async fn apply(&self, generation: u64, update: impl FnOnce(&mut ChatState) + Send) {
        let mut state = self.state.write().await;
        if self.generation.load(Ordering::SeqCst) != generation {
            debug!("Dropping results of stale poll generation {generation}");
            return;
        }
        update(&mut state);
    }

    /// Current scope together with its epoch.
    async fn current_scope(&self) -> (ChatScope, u64) {
        let scope = self.scope.read().await;
        (scope.clone(), self.epoch.load(Ordering::SeqCst))
    }

    /// Apply `update` unless the scope changed since `epoch` was read.
    async fn apply_in_scope(
        &self,
        epoch: u64,
        update: impl FnOnce(&mut ChatState) + Send,
    ) -> bool {
        let mut state = self.state.write().await;
        if self.epoch.load(Ordering::SeqCst) != epoch {
            debug!("Dropping results for previous scope (epoch {epoch})");
            return false;
        }
        update(&mut state);
        true
    }
}

/// Chat controller for one project/conversation at a time.
///
/// Dropping the client stops its poll task.
pub struct PollingClient<A: ChatApi + 'static> {
    inner: Arc<Inner<A>>,
}

impl<A: ChatApi + 'static> PollingClient<A> {
    pub fn new(api: A, scope: ChatScope) -> Self {
        Self {
            inner: Arc::new(Inner {
                api,
                scope: RwLock::new(scope),
                state: RwLock::new(ChatState::default()),
                poller: Mutex::new(None),
                generation: AtomicU64::new(0),
                epoch: AtomicU64::new(0),
            }),
        }
    }

    /// Load the history once and start polling.
    pub async fn mount(&self) {
        // Failure is recorded in `error`.
        let _ = self.load_messages().await;
        self.start_polling().await;
    }

    /// Move to another project/conversation.
    ///
    /// Polling for the old scope stops before anything for the new one runs,
    /// and the state starts over empty.
    pub async fn switch_scope(&self, scope: ChatScope) {
        if *self.inner.scope.read().await == scope {
            return;
        }
        self.stop_polling();
        {
            let mut current = self.inner.scope.write().await;
            *current = scope;
            self.inner.epoch.fetch_add(1, Ordering::SeqCst);
        }
        *self.inner.state.write().await = ChatState::default();
        self.mount().await;
    }

    pub async fn scope(&self) -> ChatScope {
        self.inner.scope.read().await.clone()
    }

    pub async fn snapshot(&self) -> ChatState {
        self.inner.state.read().await.clone()
    }

    pub fn is_polling(&self) -> bool {
        self.inner.poller().is_some()
    }

    /// Replace the stored messages with the backend's list.
    ///
    /// On failure the previous messages stay and `error` is set.
    pub async fn load_messages(&self) -> Result<(), ClientError> {
        let (scope, epoch) = self.inner.current_scope().await;
        match self.inner.api.fetch_messages(&scope).await {
            Ok(messages) => {
                self.inner
                    .apply_in_scope(epoch, |state| state.replace_messages(messages))
                    .await;
                Ok(())
            }
            Err(e) => {
                error!("Failed to load messages ({scope}): {e}");
                self.inner
                    .apply_in_scope(epoch, |state| state.error = Some(LOAD_FAILURE.to_string()))
                    .await;
                Err(e)
            }
        }
    }

    /// Start the poll task: one cycle now, then one per `POLL_INTERVAL`.
    ///
    /// No-op while a task is already running.
    pub async fn start_polling(&self) {
        let scope = self.scope().await;
        let mut poller = self.inner.poller();
        if poller.is_some() {
            return;
        }
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("Starting poll generation {generation} for {scope}");
        let inner = Arc::clone(&self.inner);
        *poller = Some(tokio::spawn(inner.poll_loop(scope, generation)));
    }

    /// Cancel the poll task. Safe to call when idle.
    pub fn stop_polling(&self) {
        let handle = self.inner.poller().take();
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(handle) = handle {
            handle.abort();
        }
    }

    pub async fn execute_chat(
        &self,
        instruction: &str,
        options: InstructionOptions,
    ) -> Result<Value, ClientError> {
        self.submit_instruction(InstructionRoute::Chat, instruction, options)
            .await
    }

    pub async fn execute_act(
        &self,
        instruction: &str,
        options: InstructionOptions,
    ) -> Result<Value, ClientError> {
        self.submit_instruction(InstructionRoute::Act, instruction, options)
            .await
    }

    /// Upload attachments, submit, store the returned session and poll.
    pub async fn submit_instruction(
        &self,
        route: InstructionRoute,
        instruction: &str,
        options: InstructionOptions,
    ) -> Result<Value, ClientError> {
        let (scope, epoch) = self.inner.current_scope().await;
        self.inner
            .apply_in_scope(epoch, |state| {
                state.is_loading = true;
                state.error = None;
            })
            .await;

        let images = if options.images.is_empty() {
            None
        } else {
            Some(prepare_images(&self.inner.api, &scope.project_id, &options.images).await)
        };

        let request = InstructionRequest {
            instruction: instruction.to_string(),
            conversation_id: scope.conversation_id.clone(),
            cli_preference: options.cli_preference,
            fallback_enabled: options.fallback_enabled,
            images,
            is_initial_prompt: false,
        };

        match self
            .inner
            .api
            .submit_instruction(route, &scope.project_id, &request)
            .await
        {
            Ok(session) => {
                let stored = session.clone();
                if self
                    .inner
                    .apply_in_scope(epoch, |state| state.current_session = Some(stored))
                    .await
                {
                    self.start_polling().await;
                }
                Ok(session)
            }
            Err(e) => {
                error!("Failed to execute {route} ({scope}): {e}");
                self.inner
                    .apply_in_scope(epoch, |state| {
                        state.error = Some(route.failure_message().to_string());
                        state.is_loading = false;
                    })
                    .await;
                Err(e)
            }
        }
    }

    /// Delete the history; local state is only reset on success.
    pub async fn clear_messages(&self) -> Result<(), ClientError> {
        let (scope, epoch) = self.inner.current_scope().await;
        match self.inner.api.clear_messages(&scope).await {
            Ok(()) => {
                self.inner
                    .apply_in_scope(epoch, |state| state.replace_messages(Vec::new()))
                    .await;
                Ok(())
            }
            Err(e) => {
                error!("Failed to clear messages ({scope}): {e}");
                self.inner
                    .apply_in_scope(epoch, |state| state.error = Some(CLEAR_FAILURE.to_string()))
                    .await;
                Err(e)
            }
        }
    }
}

impl<A: ChatApi + 'static> Drop for PollingClient<A> {
    fn drop(&mut self) {
        self.stop_polling();
    }
}
