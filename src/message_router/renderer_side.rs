//! Renderer-side query router
//!
//! Installs the query and cancel functions into every script context,
//! forwards script queries to the browser process and delivers the answers
//! back to the script callbacks. Everything here runs on the renderer's
//! script thread.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use boa_engine::object::builtins::{AlignedVec, JsArrayBuffer, JsFunction};
use boa_engine::{Context, JsNativeError, JsObject, JsResult, JsString, JsValue, NativeFunction, js_string};
use boa_gc::{Finalize, Trace};

use super::browser_info_map::BrowserInfoMap;
use super::codec::{self, BrowserMessage, Payload, RendererMessage};
use super::config::MessageRouterConfig;
use super::{ContextId, RequestId};
use crate::js_engine::{ScriptContext, WeakScriptContext};
use crate::process::{Browser, Frame, ProcessMessage, ProcessType};
use crate::utils::{IdGenerator, RESERVED_ID, Result};

const EXPECTING_OBJECT: &str = "Invalid arguments; expecting a single object";
const EXPECTING_INTEGER: &str = "Invalid arguments; expecting a single integer";
const REQUEST_REQUIRED: &str =
    "Invalid arguments; object member 'request' is required and must have type string or ArrayBuffer";
const ON_SUCCESS_TYPE: &str = "Invalid arguments; object member 'onSuccess' must have type function";
const ON_FAILURE_TYPE: &str = "Invalid arguments; object member 'onFailure' must have type function";
const PERSISTENT_TYPE: &str = "Invalid arguments; object member 'persistent' must have type boolean";

/// A query sent from script that has not been answered for the last time
struct PendingRequest {
    persistent: bool,
    success_callback: Option<JsFunction>,
    failure_callback: Option<JsFunction>,
}

/// Validated argument of the query function
struct QueryArgs {
    request: Payload,
    persistent: bool,
    on_success: Option<JsFunction>,
    on_failure: Option<JsFunction>,
}

struct RendererState {
    config: MessageRouterConfig,
    query_message_name: String,
    cancel_message_name: String,
    context_ids: IdGenerator<ContextId>,
    request_ids: IdGenerator<RequestId>,
    /// Live contexts that have issued at least one query
    contexts: Vec<(ContextId, ScriptContext)>,
    pending: BrowserInfoMap<(ContextId, RequestId), PendingRequest>,
}

impl RendererState {
    /// Find the id of `context`, assigning one if `create` is set
    fn context_id(&mut self, context: &ScriptContext, create: bool) -> Option<ContextId> {
        if let Some((id, _)) = self.contexts.iter().find(|(_, known)| known.is_same(context)) {
            return Some(*id);
        }
        if !create {
            return None;
        }
        let id = self.context_ids.next_id();
        self.contexts.push((id, context.clone()));
        Some(id)
    }

    fn context_by_id(&self, context_id: ContextId) -> Option<ScriptContext> {
        self.contexts
            .iter()
            .find(|(id, _)| *id == context_id)
            .map(|(_, context)| context.clone())
    }

    fn send_query(&mut self, context: &ScriptContext, args: QueryArgs) -> RequestId {
        let browser_id = context.browser().identifier();
        let context_id = self.context_id(context, true).unwrap_or(RESERVED_ID);
        let request_id = self.request_ids.next_id();

        let message = codec::build_renderer_message(
            self.config.message_size_threshold,
            &self.query_message_name,
            &RendererMessage {
                context_id,
                request_id,
                persistent: args.persistent,
                payload: args.request,
            },
        );
        if let Err(err) = context.frame().send_process_message(ProcessType::Browser, message) {
            log::warn!("Failed to send query {}:{}: {}", context_id, request_id, err);
        }

        self.pending.add(
            browser_id,
            (context_id, request_id),
            PendingRequest {
                persistent: args.persistent,
                success_callback: args.on_success,
                failure_callback: args.on_failure,
            },
        );
        log::debug!("Sent query {}:{} (persistent {})", context_id, request_id, args.persistent);
        request_id
    }

    /// Drop one pending request, or every request of the context when
    /// `request_id` is reserved, and tell the browser with a single message
    fn send_cancel(&mut self, context: &ScriptContext, context_id: ContextId, request_id: RequestId) -> bool {
        let browser_id = context.browser().identifier();
        let canceled = if request_id == RESERVED_ID {
            self.pending
                .remove_where(Some(browser_id), |(id, _), _| *id == context_id)
                .len()
        } else {
            usize::from(self.pending.remove(browser_id, &(context_id, request_id)).is_some())
        };

        if canceled == 0 {
            return false;
        }

        log::debug!("Canceled {} request(s) in context {}", canceled, context_id);
        let message = codec::build_cancel_message(&self.cancel_message_name, context_id, request_id);
        if let Err(err) = context.frame().send_process_message(ProcessType::Browser, message) {
            log::warn!("Failed to send cancel for context {}: {}", context_id, err);
        }
        true
    }

    fn cancel_pending(&mut self, context: &ScriptContext, request_id: RequestId) -> bool {
        match self.context_id(context, false) {
            Some(context_id) => self.send_cancel(context, context_id, request_id),
            None => false,
        }
    }
}

/// What the native functions need to reach their router and context
#[derive(Clone, Trace, Finalize)]
struct Bindings {
    #[unsafe_ignore_trace]
    router: Weak<RefCell<RendererState>>,
    #[unsafe_ignore_trace]
    context: WeakScriptContext,
}

impl Bindings {
    fn resolve(&self) -> JsResult<(Rc<RefCell<RendererState>>, ScriptContext)> {
        let router = self.router.upgrade();
        let context = self.context.upgrade();
        match (router, context) {
            (Some(router), Some(context)) => Ok((router, context)),
            _ => Err(JsNativeError::error()
                .with_message("The message router is no longer available")
                .into()),
        }
    }
}

/// Router living in the renderer process. Cheap to clone; clones share
/// state.
#[derive(Clone)]
pub struct RendererSideRouter {
    state: Rc<RefCell<RendererState>>,
}

impl RendererSideRouter {
    /// Create a new router. Fails if the configuration is invalid.
    pub fn new(config: MessageRouterConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            state: Rc::new(RefCell::new(RendererState {
                query_message_name: config.query_message_name(),
                cancel_message_name: config.cancel_message_name(),
                config,
                context_ids: IdGenerator::new(),
                request_ids: IdGenerator::new(),
                contexts: Vec::new(),
                pending: BrowserInfoMap::new(),
            })),
        })
    }

    /// Install the query and cancel functions into a new context. The
    /// context gets an id only once it issues its first query.
    pub fn on_context_created(&self, context: &ScriptContext) -> Result<()> {
        let (query_function, cancel_function) = {
            let state = self.state.borrow();
            (state.config.js_query_function.clone(), state.config.js_cancel_function.clone())
        };

        let bindings = Bindings {
            router: Rc::downgrade(&self.state),
            context: context.downgrade(),
        };
        context.register_function(
            &query_function,
            1,
            NativeFunction::from_copy_closure_with_captures(query_native, bindings.clone()),
        )?;
        context.register_function(
            &cancel_function,
            1,
            NativeFunction::from_copy_closure_with_captures(cancel_native, bindings),
        )?;
        log::debug!("Installed '{}' and '{}'", query_function, cancel_function);
        Ok(())
    }

    /// A context is going away: cancel its requests and forget it
    pub fn on_context_released(&self, context: &ScriptContext) {
        let mut state = self.state.borrow_mut();
        let Some(context_id) = state.context_id(context, false) else {
            return;
        };
        state.send_cancel(context, context_id, RESERVED_ID);
        state.contexts.retain(|(id, _)| *id != context_id);
    }

    /// Cancel one request of `context`, or all of them when `request_id`
    /// is reserved. Returns whether anything was pending.
    pub fn cancel_pending(&self, context: &ScriptContext, request_id: RequestId) -> bool {
        self.state.borrow_mut().cancel_pending(context, request_id)
    }

    /// Number of unanswered requests for `browser`, optionally limited to
    /// one context
    pub fn pending_count(&self, browser: &Browser, context: Option<&ScriptContext>) -> usize {
        let mut state = self.state.borrow_mut();
        let browser_id = browser.identifier();
        match context {
            None => state.pending.size_for(browser_id),
            Some(context) => match state.context_id(context, false) {
                Some(context_id) => state.pending.count_where(Some(browser_id), |(id, _), _| *id == context_id),
                None => 0,
            },
        }
    }

    /// Deliver a response from the browser. Returns whether it was a
    /// router message.
    pub fn on_process_message_received(
        &self,
        browser: &Browser,
        _frame: &Frame,
        source: ProcessType,
        message: &ProcessMessage,
    ) -> Result<bool> {
        if source != ProcessType::Browser {
            return Ok(false);
        }

        let query_message_name = self.state.borrow().query_message_name.clone();
        if message.name() != query_message_name {
            return Ok(false);
        }

        let response = codec::parse_browser_message(message).inspect_err(|err| {
            log::error!("Malformed response for browser {}: {}", browser.identifier(), err);
        })?;
        self.deliver(browser, response);
        Ok(true)
    }

    fn deliver(&self, browser: &Browser, response: BrowserMessage) {
        let browser_id = browser.identifier();
        let key = (response.context_id(), response.request_id());

        // The state borrow ends before any script runs; callbacks may issue
        // new queries.
        let (callback, context) = {
            let state = &mut *self.state.borrow_mut();
            let callback = match &response {
                BrowserMessage::Success { .. } => state
                    .pending
                    .find(browser_id, &key, |request| !request.persistent)
                    .map(|request| request.success_callback.clone()),
                BrowserMessage::Failure { .. } => state
                    .pending
                    .remove(browser_id, &key)
                    .map(|request| request.failure_callback),
            };
            let Some(callback) = callback else {
                log::debug!("Dropping response for unknown request {}:{}", key.0, key.1);
                return;
            };
            (callback, state.context_by_id(key.0))
        };

        let (Some(callback), Some(context)) = (callback, context) else {
            return;
        };

        let result = context.with_context(|ctx| -> JsResult<JsValue> {
            let args = match response {
                BrowserMessage::Success { payload, .. } => vec![payload_to_js(payload, ctx)?],
                BrowserMessage::Failure {
                    error_code,
                    error_message,
                    ..
                } => vec![
                    JsValue::from(error_code),
                    JsValue::from(JsString::from(error_message.as_str())),
                ],
            };
            callback.call(&JsValue::undefined(), &args, ctx)
        });

        match result {
            Ok(Ok(_)) => {}
            Ok(Err(err)) => log::warn!("Query callback for {}:{} threw: {}", key.0, key.1, err),
            Err(err) => log::warn!("Could not run query callback for {}:{}: {}", key.0, key.1, err),
        }
    }
}

fn payload_to_js(payload: Payload, context: &mut Context) -> JsResult<JsValue> {
    Ok(match payload {
        Payload::Empty => JsValue::from(js_string!("")),
        Payload::String(value) => JsValue::from(JsString::from(value.as_str())),
        Payload::Binary(bytes) => JsValue::from(JsArrayBuffer::from_byte_block(AlignedVec::from_iter(0, bytes), context)?),
    })
}

fn type_error(message: &'static str) -> boa_engine::JsError {
    JsNativeError::typ().with_message(message).into()
}

/// Read an optional function member; undefined means absent
fn optional_function(config: &JsObject, name: JsString, error: &'static str, context: &mut Context) -> JsResult<Option<JsFunction>> {
    let value = config.get(name, context)?;
    if value.is_undefined() {
        return Ok(None);
    }
    value
        .as_object()
        .and_then(|object| JsFunction::from_object(object.clone()))
        .map(Some)
        .ok_or_else(|| type_error(error))
}

fn parse_query_args(args: &[JsValue], context: &mut Context) -> JsResult<QueryArgs> {
    let [config] = args else {
        return Err(type_error(EXPECTING_OBJECT));
    };
    let Some(config) = config.as_object() else {
        return Err(type_error(EXPECTING_OBJECT));
    };
    let config = config.clone();

    let request = config.get(js_string!("request"), context)?;
    let request = if let Some(value) = request.as_string() {
        Payload::String(value.to_std_string_escaped())
    } else if let Some(buffer) = request
        .as_object()
        .and_then(|object| JsArrayBuffer::from_object(object.clone()).ok())
    {
        Payload::Binary(buffer.data().map(|data| data.to_vec()).unwrap_or_default())
    } else {
        return Err(type_error(REQUEST_REQUIRED));
    };

    let on_success = optional_function(&config, js_string!("onSuccess"), ON_SUCCESS_TYPE, context)?;
    let on_failure = optional_function(&config, js_string!("onFailure"), ON_FAILURE_TYPE, context)?;

    let persistent = config.get(js_string!("persistent"), context)?;
    let persistent = if persistent.is_undefined() {
        false
    } else {
        persistent.as_boolean().ok_or_else(|| type_error(PERSISTENT_TYPE))?
    };

    Ok(QueryArgs {
        request,
        persistent,
        on_success,
        on_failure,
    })
}

fn query_native(_this: &JsValue, args: &[JsValue], bindings: &Bindings, context: &mut Context) -> JsResult<JsValue> {
    let args = parse_query_args(args, context)?;
    let (router, script_context) = bindings.resolve()?;
    let mut state = router
        .try_borrow_mut()
        .map_err(|_| JsNativeError::error().with_message("The message router is busy"))?;
    let request_id = state.send_query(&script_context, args);
    Ok(JsValue::from(request_id))
}

fn cancel_native(_this: &JsValue, args: &[JsValue], bindings: &Bindings, _context: &mut Context) -> JsResult<JsValue> {
    let request_id = match args {
        [value] => value
            .as_number()
            .filter(|n| n.fract() == 0.0 && *n >= f64::from(i32::MIN) && *n <= f64::from(i32::MAX))
            .map(|n| n as RequestId),
        _ => None,
    };
    let Some(request_id) = request_id else {
        return Err(type_error(EXPECTING_INTEGER));
    };
    if request_id == RESERVED_ID {
        return Ok(JsValue::from(false));
    }

    let (router, script_context) = bindings.resolve()?;
    let mut state = router
        .try_borrow_mut()
        .map_err(|_| JsNativeError::error().with_message("The message router is busy"))?;
    Ok(JsValue::from(state.cancel_pending(&script_context, request_id)))
}
