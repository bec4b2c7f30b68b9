//! The tagged-union value type carried by every [`crate::options::Option`],
//! and the type-directed operator fold applied when resolving an override
//! stack.

use std::collections::BTreeMap;
use std::fmt;

use crate::errors::{Error, Result};

/// A dynamically typed, immutable configuration value.
///
/// Sets and maps are kept in insertion order via `Vec`/`BTreeMap`-backed
/// storage rather than a true `HashSet`/`HashMap`, so two stacks folded in
/// the same order always interpolate and report identically.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Tuple(Vec<Value>),
    Set(ValueSet),
    Map(BTreeMap<ValueKey, Value>),
}

/// A canonical, hashable key usable in a [`Value::Set`] or as a
/// [`Value::Map`] key. Values that cannot be meaningfully ordered/hashed as
/// keys (lists, tuples containing floats, nested maps) are rejected at
/// construction with [`Error::InvalidOptionValue`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ValueKey {
    Null,
    Bool(bool),
    Int(i64),
    /// Bit pattern of the float, so it can be ordered/hashed; NaN is
    /// rejected before a `ValueKey` is constructed.
    FloatBits(u64),
    Str(String),
    Tuple(Vec<ValueKey>),
}

impl ValueKey {
    pub fn from_value(v: &Value) -> Result<ValueKey> {
        Ok(match v {
            Value::Null => ValueKey::Null,
            Value::Bool(b) => ValueKey::Bool(*b),
            Value::Int(i) => ValueKey::Int(*i),
            Value::Float(f) => {
                if f.is_nan() {
                    return Err(Error::InvalidOptionValue(
                        "NaN cannot be used as a set/map key".into(),
                    ));
                }
                ValueKey::FloatBits(f.to_bits())
            }
            Value::Str(s) => ValueKey::Str(s.clone()),
            Value::Tuple(items) => {
                let mut keys = Vec::with_capacity(items.len());
                for item in items {
                    keys.push(ValueKey::from_value(item)?);
                }
                ValueKey::Tuple(keys)
            }
            Value::List(_) | Value::Set(_) | Value::Map(_) => {
                return Err(Error::InvalidOptionValue(
                    "lists, sets, and maps cannot be used as set/map keys".into(),
                ))
            }
        })
    }

    pub fn to_value(&self) -> Value {
        match self {
            ValueKey::Null => Value::Null,
            ValueKey::Bool(b) => Value::Bool(*b),
            ValueKey::Int(i) => Value::Int(*i),
            ValueKey::FloatBits(bits) => Value::Float(f64::from_bits(*bits)),
            ValueKey::Str(s) => Value::Str(s.clone()),
            ValueKey::Tuple(items) => {
                Value::Tuple(items.iter().map(ValueKey::to_value).collect())
            }
        }
    }
}

/// A set of values, represented canonically so that equal sets compare
/// equal regardless of insertion order.
#[derive(Debug, Clone, Default)]
pub struct ValueSet {
    entries: Vec<ValueKey>,
}

impl ValueSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_values(values: impl IntoIterator<Item = Value>) -> Result<Self> {
        let mut set = ValueSet::new();
        for v in values {
            set.insert(ValueKey::from_value(&v)?);
        }
        Ok(set)
    }

    pub fn insert(&mut self, key: ValueKey) {
        if !self.entries.contains(&key) {
            self.entries.push(key);
        }
    }

    pub fn contains(&self, key: &ValueKey) -> bool {
        self.entries.contains(key)
    }

    pub fn remove(&mut self, key: &ValueKey) {
        self.entries.retain(|k| k != key);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ValueKey> {
        self.entries.iter()
    }

    pub fn union(&self, other: &ValueSet) -> ValueSet {
        let mut out = self.clone();
        for k in other.iter() {
            out.insert(k.clone());
        }
        out
    }

    pub fn intersect(&self, other: &ValueSet) -> ValueSet {
        ValueSet {
            entries: self
                .entries
                .iter()
                .filter(|k| other.contains(k))
                .cloned()
                .collect(),
        }
    }

    pub fn difference(&self, other: &ValueSet) -> ValueSet {
        ValueSet {
            entries: self
                .entries
                .iter()
                .filter(|k| !other.contains(k))
                .cloned()
                .collect(),
        }
    }

    pub fn symmetric_difference(&self, other: &ValueSet) -> ValueSet {
        let mut out = self.difference(other);
        for k in other.difference(self).iter() {
            out.insert(k.clone());
        }
        out
    }
}

impl PartialEq for ValueSet {
    fn eq(&self, other: &Self) -> bool {
        self.entries.len() == other.entries.len() && self.entries.iter().all(|k| other.contains(k))
    }
}
impl Eq for ValueSet {}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        use Value::*;
        match (self, other) {
            (Null, Null) => true,
            (Bool(a), Bool(b)) => a == b,
            (Int(a), Int(b)) => a == b,
            (Float(a), Float(b)) => a == b,
            (Int(a), Float(b)) | (Float(b), Int(a)) => (*a as f64) == *b,
            (Str(a), Str(b)) => a == b,
            (List(a), List(b)) => a == b,
            (Tuple(a), Tuple(b)) => a == b,
            (Set(a), Set(b)) => a == b,
            (Map(a), Map(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "none"),
            Value::Bool(b) => write!(f, "{}", if *b { "true" } else { "false" }),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Str(s) => write!(f, "{s}"),
            Value::List(items) => write_seq(f, '[', ']', items),
            Value::Tuple(items) => write_seq(f, '(', ')', items),
            Value::Set(set) => {
                write!(f, "{{")?;
                for (i, k) in set.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", k.to_value())?;
                }
                write!(f, "}}")
            }
            Value::Map(map) => {
                write!(f, "{{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k.to_value(), v)?;
                }
                write!(f, "}}")
            }
        }
    }
}

fn write_seq(f: &mut fmt::Formatter<'_>, open: char, close: char, items: &[Value]) -> fmt::Result {
    write!(f, "{open}")?;
    for (i, v) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{v}")?;
    }
    write!(f, "{close}")
}

/// The operators a pushed override entry can carry. `+=`/`-=`/`*=` are
/// deliberately overloaded between two operators apiece; [`OptionOp`] keeps
/// them distinct and the caller (the grammar parser, or a programmatic
/// `push`) picks the intended one from the RHS shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionOp {
    Replace,
    Not,
    Add,
    Sub,
    Mul,
    Div,
    Append,
    Extend,
    Remove,
    Union,
    Intersect,
    Diff,
    SymDiff,
}

impl OptionOp {
    pub fn symbol(self) -> &'static str {
        match self {
            OptionOp::Replace => "=",
            OptionOp::Not => "!=",
            OptionOp::Add | OptionOp::Append => "+=",
            OptionOp::Sub | OptionOp::Remove => "-=",
            OptionOp::Mul | OptionOp::Extend => "*=",
            OptionOp::Div => "/=",
            OptionOp::Union => "|=",
            OptionOp::Intersect => "&=",
            OptionOp::Diff => "\\=",
            OptionOp::SymDiff => "^=",
        }
    }
}

/// Fold `override_` onto `computed` using `op`, per the per-type operator
/// table. This is the Rust counterpart of `Options._apply_op` in the
/// source: every branch below corresponds to one cell of that table.
pub fn apply_op(computed: Value, override_: Value, op: OptionOp) -> Result<Value> {
    if op == OptionOp::Replace {
        return Ok(override_);
    }

    let type_err = |detail: &str| {
        Error::InvalidOptionOperation {
            op: op.symbol().to_string(),
            detail: detail.to_string(),
        }
    };

    match computed {
        Value::Bool(b) => match (op, override_) {
            (OptionOp::Not, Value::Bool(r)) => Ok(Value::Bool(!r)),
            _ => Err(type_err("operator on bools must be !=")),
        },
        Value::Int(i) => apply_numeric_op(Value::Int(i), override_, op, type_err),
        Value::Float(x) => apply_numeric_op(Value::Float(x), override_, op, type_err),
        Value::Str(s) => match (op, override_) {
            (OptionOp::Add, Value::Str(r)) => Ok(Value::Str(format!("{s}{r}"))),
            (OptionOp::Sub, r) => {
                let needle = r.to_string();
                Ok(match s.find(&needle) {
                    Some(idx) => {
                        let mut out = String::with_capacity(s.len());
                        out.push_str(&s[..idx]);
                        out.push_str(&s[idx + needle.len()..]);
                        Value::Str(out)
                    }
                    None => Value::Str(s),
                })
            }
            _ => Err(type_err("operators on strings must be + or -")),
        },
        Value::List(mut items) => match op {
            OptionOp::Append => {
                items.push(override_);
                Ok(Value::List(items))
            }
            OptionOp::Extend => match override_ {
                Value::List(rest) | Value::Tuple(rest) => {
                    items.extend(rest);
                    Ok(Value::List(items))
                }
                _ => Err(type_err("lists can be extended only by lists or tuples")),
            },
            OptionOp::Remove => {
                items.retain(|e| *e != override_);
                Ok(Value::List(items))
            }
            OptionOp::Diff => remove_by_index(Value::List(items), &override_, type_err),
            _ => Err(type_err("unsupported operator for list values")),
        },
        Value::Tuple(mut items) => match op {
            OptionOp::Append => {
                items.push(override_);
                Ok(Value::Tuple(items))
            }
            OptionOp::Extend => match override_ {
                Value::List(rest) | Value::Tuple(rest) => {
                    items.extend(rest);
                    Ok(Value::Tuple(items))
                }
                _ => Err(type_err("tuples can be extended only by lists or tuples")),
            },
            OptionOp::Remove => {
                items.retain(|e| *e != override_);
                Ok(Value::Tuple(items))
            }
            OptionOp::Diff => remove_by_index(Value::Tuple(items), &override_, type_err),
            _ => Err(type_err("unsupported operator for tuple values")),
        },
        Value::Set(set) => match op {
            OptionOp::Append => {
                let mut set = set;
                set.insert(ValueKey::from_value(&override_)?);
                Ok(Value::Set(set))
            }
            OptionOp::Remove => {
                let mut set = set;
                set.remove(&ValueKey::from_value(&override_)?);
                Ok(Value::Set(set))
            }
            OptionOp::Union => match override_ {
                Value::Set(rhs) => Ok(Value::Set(set.union(&rhs))),
                _ => Err(type_err("union operands must be sets")),
            },
            OptionOp::Intersect => match override_ {
                Value::Set(rhs) => Ok(Value::Set(set.intersect(&rhs))),
                _ => Err(type_err("intersect operands must be sets")),
            },
            OptionOp::Diff => match override_ {
                Value::Set(rhs) => Ok(Value::Set(set.difference(&rhs))),
                _ => Err(type_err("difference operands must be sets")),
            },
            OptionOp::SymDiff => match override_ {
                Value::Set(rhs) => Ok(Value::Set(set.symmetric_difference(&rhs))),
                _ => Err(type_err("symmetric difference operands must be sets")),
            },
            _ => Err(type_err("unsupported operator for set values")),
        },
        Value::Map(mut map) => match op {
            OptionOp::Append | OptionOp::Union => match override_ {
                Value::Map(rhs) => {
                    for (k, v) in rhs {
                        map.insert(k, v);
                    }
                    Ok(Value::Map(map))
                }
                _ => Err(type_err("append/union operands to maps must be maps")),
            },
            OptionOp::Remove => {
                match override_ {
                    Value::Set(keys) => {
                        map.retain(|k, _| !keys.contains(k));
                    }
                    other => {
                        let key = ValueKey::from_value(&other)?;
                        map.remove(&key);
                    }
                }
                Ok(Value::Map(map))
            }
            _ => Err(type_err("unsupported operator for map values")),
        },
        Value::Null => Err(type_err("null option values accept only =")),
    }
}

fn apply_numeric_op(
    computed: Value,
    override_: Value,
    op: OptionOp,
    type_err: impl Fn(&str) -> Error,
) -> Result<Value> {
    let lhs = as_f64(&computed);
    let rhs = match &override_ {
        Value::Int(_) | Value::Float(_) => as_f64(&override_),
        _ => return Err(type_err("operand must be a number")),
    };
    let result = match op {
        OptionOp::Add => lhs + rhs,
        OptionOp::Sub => lhs - rhs,
        OptionOp::Mul => lhs * rhs,
        OptionOp::Div => {
            if rhs == 0.0 {
                return Err(type_err("division by zero"));
            }
            lhs / rhs
        }
        _ => return Err(type_err("operators on numbers must be +, -, *, /")),
    };
    // Preserve integer-ness when both sides were integers and the op
    // didn't need to become fractional.
    if let (Value::Int(a), Value::Int(b)) = (&computed, &override_) {
        let exact = match op {
            OptionOp::Add => Some(a + b),
            OptionOp::Sub => Some(a - b),
            OptionOp::Mul => Some(a * b),
            OptionOp::Div if b != &0 && a % b == 0 => Some(a / b),
            _ => None,
        };
        if let Some(v) = exact {
            return Ok(Value::Int(v));
        }
    }
    Ok(Value::Float(result))
}

fn as_f64(v: &Value) -> f64 {
    match v {
        Value::Int(i) => *i as f64,
        Value::Float(f) => *f,
        _ => unreachable!("caller guarantees numeric value"),
    }
}

fn remove_by_index(
    value: Value,
    index_spec: &Value,
    type_err: impl Fn(&str) -> Error,
) -> Result<Value> {
    let indices: Vec<i64> = match index_spec {
        Value::Int(i) => vec![*i],
        Value::List(items) | Value::Tuple(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Value::Int(i) => out.push(*i),
                    _ => return Err(type_err("remove-by-index operands must be integers")),
                }
            }
            out
        }
        Value::Set(set) => {
            let mut out = Vec::with_capacity(set.len());
            for key in set.iter() {
                match key {
                    ValueKey::Int(i) => out.push(*i),
                    _ => return Err(type_err("remove-by-index operands must be integers")),
                }
            }
            out
        }
        _ => return Err(type_err("remove from list/tuple must be by integer index")),
    };
    let keep = |i: usize, len: usize| {
        let signed = i as i64;
        !indices
            .iter()
            .any(|idx| *idx == signed || *idx + len as i64 == signed)
    };
    Ok(match value {
        Value::List(items) => {
            let len = items.len();
            Value::List(
                items
                    .into_iter()
                    .enumerate()
                    .filter(|(i, _)| keep(*i, len))
                    .map(|(_, v)| v)
                    .collect(),
            )
        }
        Value::Tuple(items) => {
            let len = items.len();
            Value::Tuple(
                items
                    .into_iter()
                    .enumerate()
                    .filter(|(i, _)| keep(*i, len))
                    .map(|(_, v)| v)
                    .collect(),
            )
        }
        _ => unreachable!("caller guarantees list or tuple"),
    })
}
