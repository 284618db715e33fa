//! Binix Router demo
//!
//! Wires a browser-side and a renderer-side router over an in-process IPC
//! channel, runs a script that issues a few queries and prints what the
//! script observed. Pass a JSON file to override the router configuration.

use std::env;
use std::sync::Arc;

use binix_router::js_engine::ScriptContext;
use binix_router::message_router::QueryId;
use binix_router::process::{Browser, Frame, IpcChannel, ProcessType};
use binix_router::{
    BrowserSideRouter, Callback, MessageRouterConfig, NAME, Payload, QueryHandler, RendererSideRouter, Result,
    VERSION,
};

/// Echoes string requests back in upper case. Persistent queries get two
/// answers and stay open. Requests starting with "ignore" are declined.
struct EchoHandler;

impl QueryHandler for EchoHandler {
    fn on_query(
        &self,
        _browser: &Browser,
        _frame: &Frame,
        query_id: QueryId,
        request: &Payload,
        persistent: bool,
        callback: Arc<Callback>,
    ) -> bool {
        let Some(text) = request.as_str() else {
            callback.failure(1, "expected a string request");
            return true;
        };
        if text.starts_with("ignore") {
            return false;
        }

        log::info!("Answering query {} ({})", query_id, text);
        callback.success(text.to_uppercase());
        if persistent {
            callback.success(format!("{} again", text.to_uppercase()));
        }
        true
    }

    fn on_query_canceled(&self, _browser: &Browser, _frame: &Frame, query_id: QueryId) {
        log::info!("Query {} canceled", query_id);
    }
}

struct Demo {
    browser: Browser,
    browser_router: BrowserSideRouter,
    renderer_router: RendererSideRouter,
    browser_end: Arc<IpcChannel>,
    renderer_end: Arc<IpcChannel>,
    browser_frame: Frame,
    renderer_frame: Frame,
}

impl Demo {
    fn new(config: MessageRouterConfig) -> Result<Self> {
        let (browser_end, renderer_end) = IpcChannel::pair(ProcessType::Browser, ProcessType::Renderer);
        let browser_end = Arc::new(browser_end);
        let renderer_end = Arc::new(renderer_end);

        let mut browser_router = BrowserSideRouter::new(config.clone())?;
        browser_router.add_handler(Arc::new(EchoHandler), false);

        Ok(Self {
            browser: Browser::new(1),
            browser_router,
            renderer_router: RendererSideRouter::new(config)?,
            browser_frame: Frame::new(1, 1, true, ProcessType::Browser, browser_end.clone()),
            renderer_frame: Frame::new(1, 1, true, ProcessType::Renderer, renderer_end.clone()),
            browser_end,
            renderer_end,
        })
    }

    /// Move messages between the two sides until both are idle
    fn pump(&mut self) -> Result<()> {
        loop {
            let mut progressed = false;

            for envelope in self.browser_end.drain() {
                self.browser_router.on_process_message_received(
                    &self.browser,
                    &self.browser_frame,
                    envelope.source_process,
                    &envelope.message,
                )?;
                progressed = true;
            }

            progressed |= self.browser_router.run_pending_tasks() > 0;

            for envelope in self.renderer_end.drain() {
                self.renderer_router.on_process_message_received(
                    &self.browser,
                    &self.renderer_frame,
                    envelope.source_process,
                    &envelope.message,
                )?;
                progressed = true;
            }

            if !progressed {
                return Ok(());
            }
        }
    }
}

fn load_config() -> Result<MessageRouterConfig> {
    match env::args().nth(1) {
        Some(path) => {
            let json = std::fs::read_to_string(&path).unwrap_or_else(|e| {
                eprintln!("Failed to read {}: {}", path, e);
                std::process::exit(1);
            });
            MessageRouterConfig::from_json(&json)
        }
        None => Ok(MessageRouterConfig::default()),
    }
}

fn run() -> Result<()> {
    let config = load_config()?;
    let query = config.js_query_function.clone();
    let cancel = config.js_cancel_function.clone();

    let mut demo = Demo::new(config)?;
    let context = ScriptContext::new(demo.browser.clone(), demo.renderer_frame.clone());
    demo.renderer_router.on_context_created(&context)?;

    context.execute(&format!(
        r#"
        var log = [];
        function report(label) {{
            return {{
                onSuccess: function(response) {{ log.push(label + ' -> ' + response); }},
                onFailure: function(code, message) {{ log.push(label + ' failed: ' + code + ' ' + message); }}
            }};
        }}
        function ask(label, request, persistent) {{
            var options = report(label);
            options.request = request;
            options.persistent = persistent;
            return {query}(options);
        }}
        ask('hello', 'hello', false);
        ask('ignored', 'ignore me', false);
        ask('binary', new Uint8Array([1, 2, 3]).buffer, false);
        var stream = ask('stream', 'tick', true);
        "#
    ))?;
    demo.pump()?;

    let canceled = context.execute(&format!("{cancel}(stream)"))?;
    demo.pump()?;
    println!(
        "Pending after cancel: browser {}, renderer {} (cancel returned {})",
        demo.browser_router.pending_count(None, None),
        demo.renderer_router.pending_count(&demo.browser, None),
        canceled.to_js_string()
    );

    println!("Script saw:");
    println!("{}", context.execute("log.join('\\n')")?.to_js_string());

    demo.renderer_router.on_context_released(&context);
    demo.pump()
}

fn main() {
    env_logger::init();
    println!("{} v{}", NAME, VERSION);

    if let Err(e) = run() {
        eprintln!("Demo failed: {}", e);
        std::process::exit(1);
    }
}
