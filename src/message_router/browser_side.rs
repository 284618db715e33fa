//! Browser-side query router
//!
//! Receives query requests from renderer processes, offers each one to the
//! registered [`QueryHandler`]s in order and tracks the claimed ones until
//! they complete or are canceled. Handlers answer through a [`Callback`],
//! which may be used from any thread: the response is encoded on the calling
//! thread and the table update is queued for the router's own thread, where
//! [`BrowserSideRouter::run_pending_tasks`] applies it.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

use super::browser_info_map::{BrowserInfoMap, Found};
use super::codec::{self, Payload, ResponseBuilder};
use super::config::MessageRouterConfig;
use super::{CANCELED_ERROR_CODE, CANCELED_ERROR_MESSAGE, ContextId, QueryId, RequestId};
use crate::process::{Browser, BrowserId, Frame, ProcessMessage, ProcessType};
use crate::utils::{IdGenerator, RESERVED_ID, Result};

/// Implemented by embedding code to answer script queries
#[cfg_attr(test, mockall::automock)]
pub trait QueryHandler: Send + Sync {
    /// Offer a new query. Return `true` to claim it; the handler must then
    /// eventually call [`Callback::success`] or [`Callback::failure`] unless
    /// the query is canceled first. Must not block.
    fn on_query(
        &self,
        browser: &Browser,
        frame: &Frame,
        query_id: QueryId,
        request: &Payload,
        persistent: bool,
        callback: Arc<Callback>,
    ) -> bool;

    /// A claimed query was canceled. Its callback is already detached.
    fn on_query_canceled(&self, _browser: &Browser, _frame: &Frame, _query_id: QueryId) {}
}

/// Completion work queued by callbacks for the router's thread
enum RouterTask {
    Success {
        browser_id: BrowserId,
        query_id: QueryId,
        response: ResponseBuilder,
    },
    Failure {
        browser_id: BrowserId,
        query_id: QueryId,
        error_code: i32,
        error_message: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CallbackState {
    Active,
    Completed,
    Canceled,
}

struct CallbackInner {
    state: CallbackState,
    tasks: Option<UnboundedSender<RouterTask>>,
}

/// Completion handle for one claimed query.
///
/// Once detached, by completion or by cancellation, every further call is
/// ignored. Dropping a callback that is still active is a handler bug and
/// trips a debug assertion.
pub struct Callback {
    browser_id: BrowserId,
    query_id: QueryId,
    persistent: bool,
    message_size_threshold: usize,
    message_name: String,
    inner: Mutex<CallbackInner>,
}

impl Callback {
    fn new(
        browser_id: BrowserId,
        query_id: QueryId,
        persistent: bool,
        config: &MessageRouterConfig,
        tasks: UnboundedSender<RouterTask>,
    ) -> Self {
        Self {
            browser_id,
            query_id,
            persistent,
            message_size_threshold: config.message_size_threshold,
            message_name: config.query_message_name(),
            inner: Mutex::new(CallbackInner {
                state: CallbackState::Active,
                tasks: Some(tasks),
            }),
        }
    }

    pub fn query_id(&self) -> QueryId {
        self.query_id
    }

    pub fn is_persistent(&self) -> bool {
        self.persistent
    }

    /// False once the callback has completed or been canceled
    pub fn is_active(&self) -> bool {
        self.lock().state == CallbackState::Active
    }

    /// Answer the query. A persistent query stays open for more answers.
    pub fn success(&self, response: impl Into<Payload>) {
        let tasks = {
            let mut inner = self.lock();
            let Some(tasks) = inner.tasks.clone() else {
                log::debug!("Ignoring success for detached query {}", self.query_id);
                return;
            };
            if !self.persistent {
                inner.state = CallbackState::Completed;
                inner.tasks = None;
            }
            tasks
        };

        let response = ResponseBuilder::new(self.message_size_threshold, &self.message_name, response.into());
        let task = RouterTask::Success {
            browser_id: self.browser_id,
            query_id: self.query_id,
            response,
        };
        if tasks.send(task).is_err() {
            log::debug!("Router is gone; dropping success for query {}", self.query_id);
        }
    }

    /// Fail the query. Always terminal.
    pub fn failure(&self, error_code: i32, error_message: &str) {
        let tasks = {
            let mut inner = self.lock();
            let Some(tasks) = inner.tasks.take() else {
                log::debug!("Ignoring failure for detached query {}", self.query_id);
                return;
            };
            inner.state = CallbackState::Completed;
            tasks
        };

        let task = RouterTask::Failure {
            browser_id: self.browser_id,
            query_id: self.query_id,
            error_code,
            error_message: error_message.to_string(),
        };
        if tasks.send(task).is_err() {
            log::debug!("Router is gone; dropping failure for query {}", self.query_id);
        }
    }

    fn detach(&self) {
        let mut inner = self.lock();
        if inner.state == CallbackState::Active {
            inner.state = CallbackState::Canceled;
        }
        inner.tasks = None;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CallbackInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Callback {
    fn drop(&mut self) {
        let inner = self.inner.get_mut().unwrap_or_else(PoisonError::into_inner);
        if !std::thread::panicking() {
            debug_assert!(
                inner.state != CallbackState::Active,
                "callback for query {} dropped without completing",
                self.query_id
            );
        }
    }
}

impl std::fmt::Debug for Callback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Callback")
            .field("browser_id", &self.browser_id)
            .field("query_id", &self.query_id)
            .field("persistent", &self.persistent)
            .field("state", &self.lock().state)
            .finish()
    }
}

struct PendingQuery {
    browser: Browser,
    frame: Frame,
    context_id: ContextId,
    request_id: RequestId,
    persistent: bool,
    callback: Arc<Callback>,
    handler: Arc<dyn QueryHandler>,
}

fn same_handler(a: &Arc<dyn QueryHandler>, b: &Arc<dyn QueryHandler>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// Router living in the browser process.
///
/// Every method taking `&mut self` must run on the router's own thread, and
/// so must [`Self::run_pending_tasks`].
pub struct BrowserSideRouter {
    config: MessageRouterConfig,
    query_message_name: String,
    cancel_message_name: String,
    handlers: Vec<Arc<dyn QueryHandler>>,
    query_ids: IdGenerator<QueryId>,
    pending: BrowserInfoMap<QueryId, PendingQuery>,
    task_sender: UnboundedSender<RouterTask>,
    task_receiver: UnboundedReceiver<RouterTask>,
}

impl BrowserSideRouter {
    /// Create a new router. Fails if the configuration is invalid.
    pub fn new(config: MessageRouterConfig) -> Result<Self> {
        config.validate()?;
        let (task_sender, task_receiver) = unbounded_channel();
        Ok(Self {
            query_message_name: config.query_message_name(),
            cancel_message_name: config.cancel_message_name(),
            config,
            handlers: Vec::new(),
            query_ids: IdGenerator::new(),
            pending: BrowserInfoMap::new(),
            task_sender,
            task_receiver,
        })
    }

    pub fn config(&self) -> &MessageRouterConfig {
        &self.config
    }

    /// Register a handler. With `first` it is offered queries before every
    /// handler already registered. Returns false if already registered.
    pub fn add_handler(&mut self, handler: Arc<dyn QueryHandler>, first: bool) -> bool {
        if self.handlers.iter().any(|h| same_handler(h, &handler)) {
            return false;
        }
        if first {
            self.handlers.insert(0, handler);
        } else {
            self.handlers.push(handler);
        }
        true
    }

    /// Unregister a handler and cancel every query it claimed, notifying
    /// the renderers
    pub fn remove_handler(&mut self, handler: &Arc<dyn QueryHandler>) -> bool {
        let Some(index) = self.handlers.iter().position(|h| same_handler(h, handler)) else {
            return false;
        };
        self.handlers.remove(index);
        self.cancel_pending_for(None, Some(handler), true);
        true
    }

    /// Cancel pending queries for `browser` and/or `handler`; both `None`
    /// cancels everything. Renderers receive a canceled failure.
    pub fn cancel_pending(&mut self, browser: Option<&Browser>, handler: Option<&Arc<dyn QueryHandler>>) {
        self.cancel_pending_for(browser.map(Browser::identifier), handler, true);
    }

    /// Number of pending queries matching the filters
    pub fn pending_count(&self, browser: Option<&Browser>, handler: Option<&Arc<dyn QueryHandler>>) -> usize {
        self.pending
            .count_where(browser.map(Browser::identifier), |_, query| {
                handler.is_none_or(|h| same_handler(h, &query.handler))
            })
    }

    /// The browser is closing
    pub fn on_before_close(&mut self, browser: &Browser) {
        self.cancel_pending_for(Some(browser.identifier()), None, false);
    }

    /// The browser's renderer process died
    pub fn on_render_process_terminated(&mut self, browser: &Browser) {
        self.cancel_pending_for(Some(browser.identifier()), None, false);
    }

    /// A navigation is starting in `frame`; top-level navigations end every
    /// pending query of the browser
    pub fn on_before_browse(&mut self, browser: &Browser, frame: &Frame) {
        if frame.is_main() {
            self.cancel_pending_for(Some(browser.identifier()), None, false);
        }
    }

    /// Dispatch a message from a renderer. Returns whether it was a router
    /// message.
    pub fn on_process_message_received(
        &mut self,
        browser: &Browser,
        frame: &Frame,
        source: ProcessType,
        message: &ProcessMessage,
    ) -> Result<bool> {
        if source != ProcessType::Renderer {
            return Ok(false);
        }

        if message.name() == self.query_message_name {
            let request = codec::parse_renderer_message(message).inspect_err(|err| {
                log::error!("Malformed query from browser {}: {}", browser.identifier(), err);
            })?;
            self.handle_query(browser, frame, request);
            return Ok(true);
        }

        if message.name() == self.cancel_message_name {
            let (context_id, request_id) = codec::parse_cancel_message(message).inspect_err(|err| {
                log::error!("Malformed cancel from browser {}: {}", browser.identifier(), err);
            })?;
            self.cancel_by_request(browser.identifier(), context_id, request_id);
            return Ok(true);
        }

        Ok(false)
    }

    /// Apply every completion queued by callbacks. Returns how many were
    /// applied.
    pub fn run_pending_tasks(&mut self) -> usize {
        let mut count = 0;
        while let Ok(task) = self.task_receiver.try_recv() {
            self.run_task(task);
            count += 1;
        }
        count
    }

    /// Wait for the next queued completion and apply it
    pub async fn run_next_task(&mut self) {
        if let Some(task) = self.task_receiver.recv().await {
            self.run_task(task);
        }
    }

    fn handle_query(&mut self, browser: &Browser, frame: &Frame, request: codec::RendererMessage) {
        let codec::RendererMessage {
            context_id,
            request_id,
            persistent,
            payload,
        } = request;

        if self.handlers.is_empty() {
            log::debug!("No handlers; canceling request {}:{}", context_id, request_id);
            self.send_canceled(frame, context_id, request_id);
            return;
        }

        let browser_id = browser.identifier();
        let query_id = self.query_ids.next_id();
        let callback = Arc::new(Callback::new(
            browser_id,
            query_id,
            persistent,
            &self.config,
            self.task_sender.clone(),
        ));

        let claimed = self
            .handlers
            .iter()
            .find(|handler| handler.on_query(browser, frame, query_id, &payload, persistent, Arc::clone(&callback)))
            .cloned();

        match claimed {
            Some(handler) => {
                log::debug!("Query {} claimed (browser {}, persistent {})", query_id, browser_id, persistent);
                self.pending.add(
                    browser_id,
                    query_id,
                    PendingQuery {
                        browser: browser.clone(),
                        frame: frame.clone(),
                        context_id,
                        request_id,
                        persistent,
                        callback,
                        handler,
                    },
                );
            }
            None => {
                log::debug!("Query {} not handled", query_id);
                callback.detach();
                self.send_canceled(frame, context_id, request_id);
            }
        }
    }

    fn run_task(&mut self, task: RouterTask) {
        match task {
            RouterTask::Success {
                browser_id,
                query_id,
                response,
            } => {
                let found = self.pending.find(browser_id, &query_id, |query| !query.persistent);
                let (frame, context_id, request_id) = match found {
                    Some(Found::Retained(query)) => (query.frame.clone(), query.context_id, query.request_id),
                    Some(Found::Removed(query)) => {
                        query.callback.detach();
                        (query.frame, query.context_id, query.request_id)
                    }
                    None => {
                        log::debug!("Dropping success for unknown query {}", query_id);
                        return;
                    }
                };

                match response.build(context_id, request_id) {
                    Some(message) => self.send(&frame, message),
                    None => log::warn!("Could not build response for query {}", query_id),
                }
            }
            RouterTask::Failure {
                browser_id,
                query_id,
                error_code,
                error_message,
            } => {
                let Some(query) = self.pending.remove(browser_id, &query_id) else {
                    log::debug!("Dropping failure for unknown query {}", query_id);
                    return;
                };
                query.callback.detach();
                self.send_failure(&query.frame, query.context_id, query.request_id, error_code, &error_message);
            }
        }
    }

    fn cancel_by_request(&mut self, browser_id: BrowserId, context_id: ContextId, request_id: RequestId) {
        let removed = self.pending.remove_where(Some(browser_id), |_, query| {
            query.context_id == context_id && (request_id == RESERVED_ID || query.request_id == request_id)
        });
        for (_, query_id, query) in removed {
            self.cancel_query(query_id, query, false);
        }
    }

    fn cancel_pending_for(
        &mut self,
        browser_id: Option<BrowserId>,
        handler: Option<&Arc<dyn QueryHandler>>,
        notify_renderer: bool,
    ) {
        let removed = self
            .pending
            .remove_where(browser_id, |_, query| handler.is_none_or(|h| same_handler(h, &query.handler)));
        for (_, query_id, query) in removed {
            self.cancel_query(query_id, query, notify_renderer);
        }
    }

    fn cancel_query(&self, query_id: QueryId, query: PendingQuery, notify_renderer: bool) {
        log::debug!("Canceling query {} (notify {})", query_id, notify_renderer);
        if notify_renderer {
            self.send_canceled(&query.frame, query.context_id, query.request_id);
        }
        query.handler.on_query_canceled(&query.browser, &query.frame, query_id);
        query.callback.detach();
    }

    fn send_canceled(&self, frame: &Frame, context_id: ContextId, request_id: RequestId) {
        self.send_failure(frame, context_id, request_id, CANCELED_ERROR_CODE, CANCELED_ERROR_MESSAGE);
    }

    fn send_failure(&self, frame: &Frame, context_id: ContextId, request_id: RequestId, code: i32, message: &str) {
        let message = codec::build_failure_message(&self.query_message_name, context_id, request_id, code, message);
        self.send(frame, message);
    }

    fn send(&self, frame: &Frame, message: ProcessMessage) {
        if let Err(err) = frame.send_process_message(ProcessType::Renderer, message) {
            log::warn!("Failed to send response to frame {}: {}", frame.identifier(), err);
        }
    }
}

impl Drop for BrowserSideRouter {
    fn drop(&mut self) {
        self.cancel_pending_for(None, None, false);
    }
}
