//! Command-line flags synthesized from schemas

pub mod clap;
pub mod synth;

use std::{cell::RefCell, rc::Rc};

use serde_json::Value;

use crate::{error::Result, schema::PrimitiveType};

pub use self::clap::ClapFlags;
pub use synth::{Binding, FlagSynthesizer, Materializer, Shape};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlagKind {
    String,
    Int,
    Bool,
    Float,
    StringSlice,
    IntSlice,
    BoolSlice,
    FloatSlice,
}

impl FlagKind {
    pub fn from_primitive(kind: PrimitiveType) -> Self {
        match kind {
            PrimitiveType::String => Self::String,
            PrimitiveType::Integer => Self::Int,
            PrimitiveType::Boolean => Self::Bool,
            PrimitiveType::Number => Self::Float,
        }
    }

    pub fn is_slice(&self) -> bool {
        matches!(
            self,
            Self::StringSlice | Self::IntSlice | Self::BoolSlice | Self::FloatSlice
        )
    }

    /// The slice variant of a scalar kind
    pub fn slice(self) -> Self {
        match self {
            Self::String => Self::StringSlice,
            Self::Int => Self::IntSlice,
            Self::Bool => Self::BoolSlice,
            Self::Float => Self::FloatSlice,
            slice => slice,
        }
    }

    /// Value a flag of this kind has when nothing is given
    pub fn zero(&self) -> FlagValue {
        match self {
            Self::String => FlagValue::String(String::new()),
            Self::Int => FlagValue::Int(0),
            Self::Bool => FlagValue::Bool(false),
            Self::Float => FlagValue::Float(0.0),
            Self::StringSlice => FlagValue::StringSlice(Vec::new()),
            Self::IntSlice => FlagValue::IntSlice(Vec::new()),
            Self::BoolSlice => FlagValue::BoolSlice(Vec::new()),
            Self::FloatSlice => FlagValue::FloatSlice(Vec::new()),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum FlagValue {
    String(String),
    Int(i64),
    Bool(bool),
    Float(f64),
    StringSlice(Vec<String>),
    IntSlice(Vec<i64>),
    BoolSlice(Vec<bool>),
    FloatSlice(Vec<f64>),
}

fn float_to_json(f: f64) -> Value {
    serde_json::Number::from_f64(f).map_or(Value::Null, Value::Number)
}

impl FlagValue {
    pub fn kind(&self) -> FlagKind {
        match self {
            Self::String(_) => FlagKind::String,
            Self::Int(_) => FlagKind::Int,
            Self::Bool(_) => FlagKind::Bool,
            Self::Float(_) => FlagKind::Float,
            Self::StringSlice(_) => FlagKind::StringSlice,
            Self::IntSlice(_) => FlagKind::IntSlice,
            Self::BoolSlice(_) => FlagKind::BoolSlice,
            Self::FloatSlice(_) => FlagKind::FloatSlice,
        }
    }

    /// Individual values, a scalar counts as a single element
    pub fn elements(&self) -> Vec<Value> {
        match self {
            Self::StringSlice(v) => v.iter().map(|s| Value::String(s.clone())).collect(),
            Self::IntSlice(v) => v.iter().map(|&i| Value::from(i)).collect(),
            Self::BoolSlice(v) => v.iter().map(|&b| Value::Bool(b)).collect(),
            Self::FloatSlice(v) => v.iter().map(|&f| float_to_json(f)).collect(),
            scalar => vec![scalar.to_json()],
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Self::String(s) => Value::String(s.clone()),
            Self::Int(i) => Value::from(*i),
            Self::Bool(b) => Value::Bool(*b),
            Self::Float(f) => float_to_json(*f),
            slice => Value::Array(slice.elements()),
        }
    }

    /// Rendering used for clap default values
    pub fn to_args(&self) -> Vec<String> {
        match self {
            Self::String(s) => vec![s.clone()],
            Self::Int(i) => vec![i.to_string()],
            Self::Bool(b) => vec![b.to_string()],
            Self::Float(f) => vec![f.to_string()],
            Self::StringSlice(v) => v.clone(),
            Self::IntSlice(v) => v.iter().map(ToString::to_string).collect(),
            Self::BoolSlice(v) => v.iter().map(ToString::to_string).collect(),
            Self::FloatSlice(v) => v.iter().map(ToString::to_string).collect(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct FlagSpec {
    pub name: String,
    pub description: String,
    pub default: FlagValue,
}

impl FlagSpec {
    pub fn new(name: &str, default: FlagValue, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            default,
        }
    }

    pub fn kind(&self) -> FlagKind {
        self.default.kind()
    }
}

#[derive(Debug)]
struct CellState {
    value: FlagValue,
    changed: bool,
}

/// Shared slot holding the current value of one registered flag.
///
/// The surface writes parsed values into the cell, materializers read them back when the
/// command runs.
#[derive(Clone, Debug)]
pub struct FlagCell(Rc<RefCell<CellState>>);

impl FlagCell {
    pub fn new(value: FlagValue) -> Self {
        Self(Rc::new(RefCell::new(CellState {
            value,
            changed: false,
        })))
    }

    pub fn get(&self) -> FlagValue {
        self.0.borrow().value.clone()
    }

    /// Store a value, `changed` tells whether it was given explicitly
    pub fn set(&self, value: FlagValue, changed: bool) {
        let mut state = self.0.borrow_mut();
        state.value = value;
        state.changed = changed;
    }

    pub fn changed(&self) -> bool {
        self.0.borrow().changed
    }

    pub fn ptr_eq(&self, other: &FlagCell) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

/// Registration surface of a command's flags
pub trait FlagSurface {
    /// Register a flag. Registering a name twice is a [`crate::Error::FlagConflict`].
    fn register(&mut self, spec: FlagSpec) -> Result<FlagCell>;

    /// Whether the flag was given explicitly by the caller
    fn changed(&self, name: &str) -> bool;

    fn string(&mut self, name: &str, default: &str, description: &str) -> Result<FlagCell> {
        self.register(FlagSpec::new(
            name,
            FlagValue::String(default.to_string()),
            description,
        ))
    }

    fn int32(&mut self, name: &str, default: i32, description: &str) -> Result<FlagCell> {
        self.register(FlagSpec::new(
            name,
            FlagValue::Int(default.into()),
            description,
        ))
    }

    fn bool(&mut self, name: &str, default: bool, description: &str) -> Result<FlagCell> {
        self.register(FlagSpec::new(name, FlagValue::Bool(default), description))
    }

    fn float64(&mut self, name: &str, default: f64, description: &str) -> Result<FlagCell> {
        self.register(FlagSpec::new(name, FlagValue::Float(default), description))
    }

    fn string_slice(&mut self, name: &str, description: &str) -> Result<FlagCell> {
        self.register(FlagSpec::new(
            name,
            FlagValue::StringSlice(Vec::new()),
            description,
        ))
    }

    fn int_slice(&mut self, name: &str, description: &str) -> Result<FlagCell> {
        self.register(FlagSpec::new(
            name,
            FlagValue::IntSlice(Vec::new()),
            description,
        ))
    }

    fn bool_slice(&mut self, name: &str, description: &str) -> Result<FlagCell> {
        self.register(FlagSpec::new(
            name,
            FlagValue::BoolSlice(Vec::new()),
            description,
        ))
    }

    fn float_slice(&mut self, name: &str, description: &str) -> Result<FlagCell> {
        self.register(FlagSpec::new(
            name,
            FlagValue::FloatSlice(Vec::new()),
            description,
        ))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_flag_value_json() {
        assert_eq!(FlagValue::Int(3).to_json(), json!(3));
        assert_eq!(
            FlagValue::StringSlice(vec!["a".into(), "b".into()]).to_json(),
            json!(["a", "b"])
        );
        assert_eq!(FlagValue::Float(f64::NAN).to_json(), Value::Null);
        assert_eq!(FlagValue::Bool(true).elements(), vec![json!(true)]);
        assert_eq!(FlagKind::Int.slice(), FlagKind::IntSlice);
        assert!(FlagKind::Int.slice().is_slice());
        assert_eq!(FlagKind::BoolSlice.zero(), FlagValue::BoolSlice(vec![]));
    }

    #[test]
    fn test_cell() {
        let cell = FlagCell::new(FlagValue::String("default".into()));
        let other = cell.clone();
        assert!(!cell.changed());
        other.set(FlagValue::String("kube-system".into()), true);
        assert!(cell.changed());
        assert_eq!(cell.get(), FlagValue::String("kube-system".into()));
        assert!(cell.ptr_eq(&other));
        assert!(!cell.ptr_eq(&FlagCell::new(FlagValue::Int(0))));
    }
}
