//! Script execution contexts backed by the Boa engine

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use boa_engine::{Context, JsString, JsValue as BoaJsValue, NativeFunction, Source};

use super::JsValue;
use crate::process::{Browser, Frame};
use crate::utils::{Result, ScriptError};

struct ScriptContextInner {
    context: RefCell<Context>,
    browser: Browser,
    frame: Frame,
}

/// One script execution context, bound to the browser and frame it lives in.
///
/// Clones refer to the same context. Two handles are the same context
/// exactly when [`ScriptContext::is_same`] says so.
#[derive(Clone)]
pub struct ScriptContext {
    inner: Rc<ScriptContextInner>,
}

impl ScriptContext {
    /// Create a new, empty context for `frame` of `browser`
    pub fn new(browser: Browser, frame: Frame) -> Self {
        Self {
            inner: Rc::new(ScriptContextInner {
                context: RefCell::new(Context::default()),
                browser,
                frame,
            }),
        }
    }

    pub fn browser(&self) -> &Browser {
        &self.inner.browser
    }

    pub fn frame(&self) -> &Frame {
        &self.inner.frame
    }

    /// Identity comparison
    pub fn is_same(&self, other: &ScriptContext) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn downgrade(&self) -> WeakScriptContext {
        WeakScriptContext {
            inner: Rc::downgrade(&self.inner),
        }
    }

    /// Run `f` with the engine context entered. Fails if the context is
    /// already executing further up the stack.
    pub fn with_context<R>(&self, f: impl FnOnce(&mut Context) -> R) -> Result<R> {
        let mut context = self
            .inner
            .context
            .try_borrow_mut()
            .map_err(|_| ScriptError::ContextBusy)?;
        Ok(f(&mut context))
    }

    /// Execute JavaScript code
    pub fn execute(&self, code: &str) -> Result<JsValue> {
        if code.trim().is_empty() {
            return Ok(JsValue::Undefined);
        }

        self.with_context(|context| -> Result<JsValue> {
            let source = Source::from_bytes(code);
            match context.eval(source) {
                Ok(result) => Ok(convert_boa_value(&result, context)),
                Err(e) => Err(ScriptError::Execution(e.to_string()).into()),
            }
        })?
    }

    /// Install `function` as a global callable named `name`
    pub fn register_function(&self, name: &str, length: usize, function: NativeFunction) -> Result<()> {
        self.with_context(|context| -> Result<()> {
            context
                .register_global_builtin_callable(JsString::from(name), length, function)
                .map_err(|e| {
                    log::warn!("Registering '{}' failed: {}", name, e);
                    ScriptError::Registration(name.to_string()).into()
                })
        })?
    }
}

impl fmt::Debug for ScriptContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptContext")
            .field("browser", &self.inner.browser)
            .field("frame", &self.inner.frame)
            .finish()
    }
}

/// Non-owning handle to a [`ScriptContext`]
#[derive(Clone, Default)]
pub struct WeakScriptContext {
    inner: Weak<ScriptContextInner>,
}

impl WeakScriptContext {
    pub fn upgrade(&self) -> Option<ScriptContext> {
        self.inner.upgrade().map(|inner| ScriptContext { inner })
    }
}

/// Convert Boa JsValue to our JsValue
pub(crate) fn convert_boa_value(value: &BoaJsValue, context: &mut Context) -> JsValue {
    if value.is_undefined() {
        JsValue::Undefined
    } else if value.is_null() {
        JsValue::Null
    } else if let Some(b) = value.as_boolean() {
        JsValue::Boolean(b)
    } else if let Some(n) = value.as_number() {
        JsValue::Number(n)
    } else if let Some(s) = value.as_string() {
        JsValue::String(s.to_std_string_escaped())
    } else if value.is_object() {
        // Check if it's an array
        if let Ok(array) = value.to_object(context) {
            if array.is_array() {
                if let Ok(length_val) = array.get(boa_engine::js_string!("length"), context) {
                    if let Some(length) = length_val.as_number() {
                        let mut items = Vec::new();
                        for i in 0..(length as u32) {
                            if let Ok(item) = array.get(i, context) {
                                items.push(convert_boa_value(&item, context));
                            }
                        }
                        return JsValue::Array(items);
                    }
                }
            }
        }
        JsValue::Object(HashMap::new())
    } else {
        JsValue::Undefined
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::{IpcChannel, ProcessType};
    use std::sync::Arc;

    fn context() -> ScriptContext {
        let (renderer_end, _browser_end) = IpcChannel::pair(ProcessType::Renderer, ProcessType::Browser);
        let frame = Frame::new(1, 1, true, ProcessType::Renderer, Arc::new(renderer_end));
        ScriptContext::new(Browser::new(1), frame)
    }

    #[test]
    fn test_eval_numbers() {
        let ctx = context();
        assert_eq!(ctx.execute("42").unwrap(), JsValue::Number(42.0));
        assert_eq!(ctx.execute("2 + 3").unwrap(), JsValue::Number(5.0));
    }

    #[test]
    fn test_eval_strings() {
        let ctx = context();
        assert_eq!(
            ctx.execute("\"hello\" + \" world\"").unwrap(),
            JsValue::String("hello world".to_string())
        );
    }

    #[test]
    fn test_state_persists_between_executions() {
        let ctx = context();
        ctx.execute("let x = 10;").unwrap();
        assert_eq!(ctx.execute("x + 5").unwrap(), JsValue::Number(15.0));
    }

    #[test]
    fn test_eval_arrays() {
        let ctx = context();
        assert_eq!(
            ctx.execute("[1, 'a', true]").unwrap(),
            JsValue::Array(vec![
                JsValue::Number(1.0),
                JsValue::String("a".to_string()),
                JsValue::Boolean(true),
            ])
        );
    }

    #[test]
    fn test_exception_is_error() {
        let ctx = context();
        let err = ctx.execute("throw new Error('boom')").unwrap_err();
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn test_identity() {
        let a = context();
        let b = context();
        assert!(a.is_same(&a.clone()));
        assert!(!a.is_same(&b));

        let weak = a.downgrade();
        assert!(weak.upgrade().unwrap().is_same(&a));
        drop(a);
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn test_reentry_is_busy() {
        let ctx = context();
        let inner = ctx.with_context(|_| ctx.execute("1")).unwrap();
        assert!(matches!(
            inner,
            Err(crate::utils::RouterError::Script(ScriptError::ContextBusy))
        ));
    }

    #[test]
    fn test_register_function() {
        let ctx = context();
        let double = NativeFunction::from_copy_closure(|_this, args, _ctx| {
            let n = args.first().and_then(|v| v.as_number()).unwrap_or_default();
            Ok(BoaJsValue::from(n * 2.0))
        });
        ctx.register_function("double", 1, double).unwrap();
        assert_eq!(ctx.execute("double(21)").unwrap(), JsValue::Number(42.0));
    }
}
