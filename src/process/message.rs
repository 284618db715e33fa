//! Process messages and their structured argument lists

use super::shared_memory::SharedMemoryRegion;

/// Type tag of a single list entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Null,
    Bool,
    Int,
    String,
    Binary,
}

impl ValueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueType::Null => "null",
            ValueType::Bool => "bool",
            ValueType::Int => "int",
            ValueType::String => "string",
            ValueType::Binary => "binary",
        }
    }
}

/// A single entry in a [`ListValue`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i32),
    String(String),
    Binary(Vec<u8>),
}

impl Value {
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Null => ValueType::Null,
            Value::Bool(_) => ValueType::Bool,
            Value::Int(_) => ValueType::Int,
            Value::String(_) => ValueType::String,
            Value::Binary(_) => ValueType::Binary,
        }
    }
}

/// Ordered list of typed values addressed by index
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListValue {
    values: Vec<Value>,
}

impl ListValue {
    /// Create an empty list
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Set the value at `index`, growing the list with nulls if needed
    pub fn set(&mut self, index: usize, value: Value) {
        if self.values.len() <= index {
            self.values.resize(index + 1, Value::Null);
        }
        self.values[index] = value;
    }

    pub fn set_null(&mut self, index: usize) {
        self.set(index, Value::Null);
    }

    pub fn set_bool(&mut self, index: usize, value: bool) {
        self.set(index, Value::Bool(value));
    }

    pub fn set_int(&mut self, index: usize, value: i32) {
        self.set(index, Value::Int(value));
    }

    pub fn set_string(&mut self, index: usize, value: impl Into<String>) {
        self.set(index, Value::String(value.into()));
    }

    pub fn set_binary(&mut self, index: usize, value: impl Into<Vec<u8>>) {
        self.set(index, Value::Binary(value.into()));
    }

    /// Get the raw value at `index`
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Get the type tag at `index`
    pub fn get_type(&self, index: usize) -> Option<ValueType> {
        self.get(index).map(Value::value_type)
    }

    pub fn get_bool(&self, index: usize) -> Option<bool> {
        match self.get(index)? {
            Value::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn get_int(&self, index: usize) -> Option<i32> {
        match self.get(index)? {
            Value::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn get_string(&self, index: usize) -> Option<&str> {
        match self.get(index)? {
            Value::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn get_binary(&self, index: usize) -> Option<&[u8]> {
        match self.get(index)? {
            Value::Binary(value) => Some(value),
            _ => None,
        }
    }
}

/// Body of a process message
#[derive(Debug, Clone)]
enum MessageBody {
    Arguments(ListValue),
    SharedMemory(SharedMemoryRegion),
}

/// A named one-way message between processes. The body is either a
/// structured argument list or a sealed shared memory region, never both.
#[derive(Debug, Clone)]
pub struct ProcessMessage {
    name: String,
    body: MessageBody,
}

impl ProcessMessage {
    /// Create a message with an empty argument list
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            body: MessageBody::Arguments(ListValue::new()),
        }
    }

    /// Create a message backed by a shared memory region
    pub(crate) fn with_region(name: String, region: SharedMemoryRegion) -> Self {
        Self {
            name,
            body: MessageBody::SharedMemory(region),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The argument list, if this is a list-backed message
    pub fn argument_list(&self) -> Option<&ListValue> {
        match &self.body {
            MessageBody::Arguments(args) => Some(args),
            MessageBody::SharedMemory(_) => None,
        }
    }

    pub fn argument_list_mut(&mut self) -> Option<&mut ListValue> {
        match &mut self.body {
            MessageBody::Arguments(args) => Some(args),
            MessageBody::SharedMemory(_) => None,
        }
    }

    /// The shared memory region, if this is a region-backed message
    pub fn shared_memory_region(&self) -> Option<&SharedMemoryRegion> {
        match &self.body {
            MessageBody::Arguments(_) => None,
            MessageBody::SharedMemory(region) => Some(region),
        }
    }
}
