//! JavaScript engine integration
//!
//! Script contexts run on the Boa engine (pure Rust). Each context is bound
//! to the browser and frame that created it, which is what the renderer-side
//! router needs to route a script call to the right peer.

mod runtime;

pub use runtime::{ScriptContext, WeakScriptContext};

/// JavaScript value types, as seen from Rust after evaluation
#[derive(Debug, Clone, PartialEq)]
pub enum JsValue {
    Undefined,
    Null,
    Boolean(bool),
    Number(f64),
    String(String),
    Array(Vec<JsValue>),
    Object(std::collections::HashMap<String, JsValue>),
}

impl JsValue {
    /// Convert to string representation
    pub fn to_js_string(&self) -> String {
        match self {
            Self::Undefined => "undefined".to_string(),
            Self::Null => "null".to_string(),
            Self::Boolean(b) => b.to_string(),
            Self::Number(n) => n.to_string(),
            Self::String(s) => s.clone(),
            Self::Array(arr) => format!("[{}]", arr.iter().map(Self::to_js_string).collect::<Vec<_>>().join(",")),
            Self::Object(_) => "[object Object]".to_string(),
        }
    }
}
