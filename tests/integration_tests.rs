//! Integration tests for the Binix query router
//!
//! These tests run both routers in one process, connected by an IPC channel
//! pair, and drive them from script.

use std::sync::{Arc, Mutex};

use binix_router::js_engine::{JsValue, ScriptContext};
use binix_router::message_router::codec::{self, BrowserMessage, RendererMessage};
use binix_router::message_router::{CANCELED_ERROR_MESSAGE, QueryId};
use binix_router::process::{Browser, Frame, IpcChannel, ProcessType};
use binix_router::{BrowserSideRouter, Callback, MessageRouterConfig, Payload, QueryHandler, RendererSideRouter};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

/// Echoes requests back. Persistent queries stay open until canceled.
#[derive(Default)]
struct Echo {
    spawn: bool,
    open: Mutex<Vec<Arc<Callback>>>,
    canceled: Mutex<Vec<QueryId>>,
}

impl QueryHandler for Echo {
    fn on_query(
        &self,
        _browser: &Browser,
        _frame: &Frame,
        _query_id: QueryId,
        request: &Payload,
        persistent: bool,
        callback: Arc<Callback>,
    ) -> bool {
        if persistent {
            callback.success(request.clone());
            self.open.lock().unwrap().push(callback);
        } else if self.spawn {
            let request = request.clone();
            tokio::spawn(async move { callback.success(request) });
        } else {
            callback.success(request.clone());
        }
        true
    }

    fn on_query_canceled(&self, _browser: &Browser, _frame: &Frame, query_id: QueryId) {
        self.canceled.lock().unwrap().push(query_id);
    }
}

/// Both routers and the channel between them
struct Link {
    browser: Browser,
    browser_router: BrowserSideRouter,
    renderer_router: RendererSideRouter,
    browser_end: Arc<IpcChannel>,
    renderer_end: Arc<IpcChannel>,
    browser_frame: Frame,
    renderer_frame: Frame,
}

impl Link {
    fn new(config: MessageRouterConfig) -> Self {
        let (browser_end, renderer_end) = IpcChannel::pair(ProcessType::Browser, ProcessType::Renderer);
        let browser_end = Arc::new(browser_end);
        let renderer_end = Arc::new(renderer_end);
        Self {
            browser: Browser::new(1),
            browser_router: BrowserSideRouter::new(config.clone()).unwrap(),
            renderer_router: RendererSideRouter::new(config).unwrap(),
            browser_frame: Frame::new(1, 1, true, ProcessType::Browser, browser_end.clone()),
            renderer_frame: Frame::new(1, 1, true, ProcessType::Renderer, renderer_end.clone()),
            browser_end,
            renderer_end,
        }
    }

    fn context(&self) -> ScriptContext {
        let context = ScriptContext::new(self.browser.clone(), self.renderer_frame.clone());
        self.renderer_router.on_context_created(&context).unwrap();
        context
            .execute(
                "var log = [];
                 function ask(request, persistent) {
                     return cefQuery({
                         request: request,
                         persistent: persistent,
                         onSuccess: function(r) { log.push('ok:' + (r instanceof ArrayBuffer ? r.byteLength : r)); },
                         onFailure: function(c, m) { log.push('err:' + c + ':' + m); }
                     });
                 }",
            )
            .unwrap();
        context
    }

    /// Deliver renderer → browser traffic
    fn to_browser(&mut self) -> bool {
        let envelopes = self.browser_end.drain();
        for envelope in &envelopes {
            assert_eq!(envelope.source_process, ProcessType::Renderer);
            self.browser_router
                .on_process_message_received(&self.browser, &self.browser_frame, envelope.source_process, &envelope.message)
                .unwrap();
        }
        !envelopes.is_empty()
    }

    /// Deliver browser → renderer traffic
    fn to_renderer(&mut self) -> bool {
        let envelopes = self.renderer_end.drain();
        for envelope in &envelopes {
            self.renderer_router
                .on_process_message_received(&self.browser, &self.renderer_frame, envelope.source_process, &envelope.message)
                .unwrap();
        }
        !envelopes.is_empty()
    }

    fn pump(&mut self) {
        loop {
            let mut progressed = self.to_browser();
            progressed |= self.browser_router.run_pending_tasks() > 0;
            progressed |= self.to_renderer();
            if !progressed {
                return;
            }
        }
    }
}

fn log(context: &ScriptContext) -> String {
    context.execute("log.join(';')").unwrap().to_js_string()
}

#[test]
fn test_query_round_trip() {
    let mut link = Link::new(MessageRouterConfig::default());
    link.browser_router.add_handler(Arc::new(Echo::default()), false);
    let context = link.context();

    assert_eq!(context.execute("ask('hello', false)").unwrap(), JsValue::Number(1.0));
    link.pump();

    assert_eq!(log(&context), "ok:hello");
    assert_eq!(link.browser_router.pending_count(None, None), 0);
    assert_eq!(link.renderer_router.pending_count(&link.browser, None), 0);
}

#[test]
fn test_large_payloads_round_trip() {
    let mut link = Link::new(MessageRouterConfig::default());
    link.browser_router.add_handler(Arc::new(Echo::default()), false);
    let context = link.context();

    context
        .execute("ask('y'.repeat(20000), false); ask(new ArrayBuffer(40000), false)")
        .unwrap();

    let sent = link.browser_end.drain();
    assert!(sent.iter().all(|envelope| envelope.message.shared_memory_region().is_some()));
    for envelope in &sent {
        link.browser_router
            .on_process_message_received(&link.browser, &link.browser_frame, envelope.source_process, &envelope.message)
            .unwrap();
    }
    link.pump();

    assert_eq!(log(&context), format!("ok:{};ok:40000", "y".repeat(20000)));
}

#[test]
fn test_unhandled_query_fails_in_script() {
    let mut link = Link::new(MessageRouterConfig::default());
    let context = link.context();

    context.execute("ask('anyone?', false)").unwrap();
    link.pump();

    assert_eq!(log(&context), format!("err:-1:{}", CANCELED_ERROR_MESSAGE));
    assert_eq!(link.renderer_router.pending_count(&link.browser, None), 0);
}

#[test]
fn test_script_cancel_reaches_handler() {
    let mut link = Link::new(MessageRouterConfig::default());
    let handler = Arc::new(Echo::default());
    link.browser_router.add_handler(handler.clone(), false);
    let context = link.context();

    context.execute("var stream = ask('tick', true)").unwrap();
    link.pump();
    assert_eq!(link.browser_router.pending_count(None, None), 1);

    assert_eq!(context.execute("cefQueryCancel(stream)").unwrap(), JsValue::Boolean(true));
    link.pump();

    assert_eq!(*handler.canceled.lock().unwrap(), vec![1]);
    assert_eq!(link.browser_router.pending_count(None, None), 0);
    assert_eq!(log(&context), "ok:tick");

    // A late answer from the handler goes nowhere
    handler.open.lock().unwrap()[0].success("late");
    link.pump();
    assert_eq!(log(&context), "ok:tick");
}

#[test]
fn test_context_release_sends_one_cancel() {
    let mut link = Link::new(MessageRouterConfig::default());
    let handler = Arc::new(Echo::default());
    link.browser_router.add_handler(handler.clone(), false);
    let context = link.context();

    context.execute("ask('a', true); ask('b', true); ask('c', true)").unwrap();
    link.pump();

    link.renderer_router.on_context_released(&context);
    let sent = link.browser_end.drain();
    assert_eq!(sent.len(), 1);
    assert_eq!(codec::parse_cancel_message(&sent[0].message).unwrap(), (1, 0));

    link.browser_router
        .on_process_message_received(&link.browser, &link.browser_frame, ProcessType::Renderer, &sent[0].message)
        .unwrap();
    assert_eq!(link.browser_router.pending_count(None, None), 0);

    let mut canceled = handler.canceled.lock().unwrap().clone();
    canceled.sort();
    assert_eq!(canceled, vec![1, 2, 3]);

    // The browser never answers a cancel initiated by the renderer
    assert!(link.renderer_end.drain().is_empty());
}

#[test]
fn test_navigation_cancels_without_notifying_renderer() {
    let mut link = Link::new(MessageRouterConfig::default());
    link.browser_router.add_handler(Arc::new(Echo::default()), false);
    let context = link.context();

    context.execute("ask('a', true)").unwrap();
    link.pump();

    let main_frame = link.browser_frame.clone();
    link.browser_router.on_before_browse(&link.browser, &main_frame);
    link.pump();

    assert_eq!(link.browser_router.pending_count(None, None), 0);
    assert_eq!(link.renderer_router.pending_count(&link.browser, None), 1);
    assert_eq!(log(&context), "ok:a");
}

#[tokio::test]
async fn test_handler_answers_from_async_task() {
    let mut link = Link::new(MessageRouterConfig::default());
    link.browser_router.add_handler(
        Arc::new(Echo {
            spawn: true,
            ..Default::default()
        }),
        false,
    );
    let context = link.context();

    context.execute("ask('later', false)").unwrap();
    link.to_browser();
    assert!(!link.to_renderer());

    link.browser_router.run_next_task().await;
    link.to_renderer();
    assert_eq!(log(&context), "ok:later");
}

fn payload() -> impl Strategy<Value = Payload> {
    prop_oneof![
        Just(Payload::Empty),
        "\\PC{0,48}".prop_map(Payload::String),
        proptest::collection::vec(any::<u8>(), 0..48).prop_map(Payload::Binary),
    ]
}

proptest! {
    #[test]
    fn test_request_codec_round_trip(
        context_id in 1..i32::MAX,
        request_id in 1..i32::MAX,
        persistent in any::<bool>(),
        payload in payload(),
        threshold in 0usize..64,
    ) {
        let request = RendererMessage { context_id, request_id, persistent, payload };
        let message = codec::build_renderer_message(threshold, "cefQueryMsg", &request);
        prop_assert_eq!(codec::parse_renderer_message(&message).unwrap(), request);
    }

    #[test]
    fn test_success_codec_round_trip(
        context_id in 1..i32::MAX,
        request_id in 1..i32::MAX,
        payload in payload(),
        threshold in 0usize..64,
    ) {
        let message = codec::build_success_message(threshold, "cefQueryMsg", context_id, request_id, payload.clone()).unwrap();
        prop_assert_eq!(
            codec::parse_browser_message(&message).unwrap(),
            BrowserMessage::Success { context_id, request_id, payload }
        );
    }
}
