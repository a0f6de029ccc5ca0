//! Evaluation of schema expressions against a stack of scopes.
//!
//! Each frame owns the value currently being processed. The top frame is `self`,
//! `up[0]` is `self`, `up[1]` its parent and so on. Named variables such as
//! `$length` live beside the frames.

use std::borrow::Cow;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use num_bigint::BigInt;
use num_traits::{ToPrimitive, Zero};

use crate::{
    compiled::ValidatedModel,
    errors::{CodecError, ExprError},
    expr::{self, BinaryOp, Expr, UnaryOp},
    schema::{Format, LengthKind, TypeKind},
    value::{StructValue, Value},
};

static NULL: Value = Value::Null;

/// Name of the variable holding the payload length (in bytes) of the innermost length-prefixed sequence.
pub const LENGTH_VARIABLE: &str = "$length";

/// The length a value has to occupy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclaredLength {
    /// Explicit length in bits.
    Exact(u64),
    /// Minimum length in bits.
    AtLeast(u64),
}

/// Scope stack, variables and a cache of parsed expressions.
#[derive(Debug)]
pub struct ExpressionContext {
    model: Arc<ValidatedModel>,
    frames: Vec<Value>,
    variables: HashMap<String, Value>,
    cache: HashMap<String, Expr>,
}

impl ExpressionContext {
    pub fn new(model: Arc<ValidatedModel>) -> Self {
        Self {
            model,
            frames: Vec::new(),
            variables: HashMap::new(),
            cache: HashMap::new(),
        }
    }

    pub fn push(&mut self, value: Value) {
        self.frames.push(value);
    }

    pub fn pop(&mut self) -> Option<Value> {
        self.frames.pop()
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// `up[depth]`: 0 is the top frame.
    pub fn frame(&self, depth: usize) -> Option<&Value> {
        self.frames.iter().rev().nth(depth)
    }

    fn current_struct_mut(&mut self) -> Option<&mut StructValue> {
        self.frames.last_mut().and_then(Value::as_struct_mut)
    }

    /// Field of the top frame; [Value::Null] when unset or when the frame is not a struct.
    pub fn field(&self, name: &str) -> &Value {
        match self.frames.last() {
            Some(Value::Struct(s)) => s.get(name),
            _ => &NULL,
        }
    }

    pub fn has_field(&self, name: &str) -> bool {
        matches!(self.frames.last(), Some(Value::Struct(s)) if s.contains(name))
    }

    /// Sets a field of the top frame. Ignored when the frame is not a struct.
    pub fn set_field(&mut self, name: &str, value: Value) {
        if let Some(s) = self.current_struct_mut() {
            s.set(name, value);
        }
    }

    /// Moves a field out of the top frame.
    pub fn take_field(&mut self, name: &str) -> Value {
        self.current_struct_mut()
            .map(|s| s.take(name))
            .unwrap_or_default()
    }

    /// Binds a variable and returns its previous binding.
    pub fn set_variable(&mut self, name: &str, value: Value) -> Option<Value> {
        self.variables.insert(name.to_string(), value)
    }

    /// Restores a binding returned by [ExpressionContext::set_variable].
    pub fn restore_variable(&mut self, name: &str, previous: Option<Value>) {
        match previous {
            Some(value) => {
                self.variables.insert(name.to_string(), value);
            }
            None => {
                self.variables.remove(name);
            }
        }
    }

    pub fn variable(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }

    fn parse_cached(&mut self, src: &str) -> Result<(), CodecError> {
        if !self.cache.contains_key(src) {
            let parsed = expr::parse(src).map_err(|source| CodecError::Expression {
                expr: src.to_string(),
                source,
            })?;
            self.cache.insert(src.to_string(), parsed);
        }

        Ok(())
    }

    /// Whether `src` reads the variable `name`.
    pub fn references(&mut self, src: &str, name: &str) -> Result<bool, CodecError> {
        self.parse_cached(src)?;
        Ok(self.cache[src].references(name))
    }

    /// Parses (once per distinct source) and evaluates `src` in the current scope.
    pub fn evaluate(&mut self, src: &str) -> Result<Value, CodecError> {
        self.parse_cached(src)?;

        let parsed = &self.cache[src];
        self.eval(parsed)
            .map(Cow::into_owned)
            .map_err(|source| CodecError::Expression {
                expr: src.to_string(),
                source,
            })
    }

    pub fn evaluate_bool(&mut self, src: &str) -> Result<bool, CodecError> {
        let value = self.evaluate(src)?;
        truthy(&value).map_err(|source| CodecError::Expression {
            expr: src.to_string(),
            source,
        })
    }

    /// Evaluates a length or count. Negative or oversized results are [ExprError::Overflow].
    pub fn evaluate_u64(&mut self, src: &str) -> Result<u64, CodecError> {
        let value = self.evaluate(src)?;
        let err = |source: ExprError| CodecError::Expression {
            expr: src.to_string(),
            source,
        };

        let number = value.as_big_int().ok_or_else(|| {
            err(ExprError::TypeMismatch {
                expected: "integer",
                found: value.kind_name(),
            })
        })?;
        number.to_u64().ok_or_else(|| err(ExprError::Overflow))
    }

    fn scaled(&mut self, expr: &str, format: &Format) -> Result<u64, CodecError> {
        let length = self.evaluate_u64(expr)?;
        length
            .checked_mul(format.length_unit().bits())
            .ok_or_else(|| CodecError::Expression {
                expr: expr.to_string(),
                source: ExprError::Overflow,
            })
    }

    /// Explicit length of `format` in bits; `None` unless its length kind is explicit.
    pub fn length_bits(&mut self, format: &Format) -> Result<Option<u64>, CodecError> {
        match &format.length {
            Some(expr) if format.length_kind() == LengthKind::Explicit => {
                self.scaled(expr, format).map(Some)
            }
            _ => Ok(None),
        }
    }

    /// Explicit length, or else the minimum length, of `format`.
    pub fn declared_length(&mut self, format: &Format) -> Result<Option<DeclaredLength>, CodecError> {
        if let Some(bits) = self.length_bits(format)? {
            return Ok(Some(DeclaredLength::Exact(bits)));
        }

        match &format.min_length {
            Some(expr) => Ok(Some(DeclaredLength::AtLeast(self.scaled(expr, format)?))),
            None => Ok(None),
        }
    }

    fn eval<'s>(&'s self, expr: &'s Expr) -> Result<Cow<'s, Value>, ExprError> {
        match expr {
            Expr::Literal(value) => Ok(Cow::Borrowed(value)),
            Expr::SelfRef => self.up(0),
            Expr::Up(index) => {
                let index = self.eval(index)?;
                let depth = index_of(&index)?;
                self.up(depth)
            }
            Expr::Variable(name) => self
                .variables
                .get(name)
                .map(Cow::Borrowed)
                .ok_or_else(|| ExprError::UnknownVariable(name.clone())),
            Expr::Property(target, name) => {
                let target = self.eval(target)?;
                self.property(target, name)
            }
            Expr::Index(target, index) => {
                let target = self.eval(target)?;
                let index = index_of(&*self.eval(index)?)?;
                element(target, index)
            }
            Expr::Unary(op, operand) => {
                let operand = self.eval(operand)?;
                let result = match op {
                    UnaryOp::Not => Value::Bool(!truthy(&operand)?),
                    UnaryOp::Neg => Value::from_big_int(-number(&operand)?),
                };
                Ok(Cow::Owned(result))
            }
            Expr::Binary(BinaryOp::Or, lhs, rhs) => {
                let result = truthy(&*self.eval(lhs)?)? || truthy(&*self.eval(rhs)?)?;
                Ok(Cow::Owned(Value::Bool(result)))
            }
            Expr::Binary(BinaryOp::And, lhs, rhs) => {
                let result = truthy(&*self.eval(lhs)?)? && truthy(&*self.eval(rhs)?)?;
                Ok(Cow::Owned(Value::Bool(result)))
            }
            Expr::Binary(op, lhs, rhs) => {
                let lhs = self.eval(lhs)?;
                let rhs = self.eval(rhs)?;
                binary(*op, &lhs, &rhs).map(Cow::Owned)
            }
            Expr::Call(_, args) => {
                // the parser only accepts `length`
                let arg = match args.as_slice() {
                    [arg] => self.eval(arg)?,
                    _ => {
                        return Err(ExprError::TypeMismatch {
                            expected: "one argument",
                            found: "argument list",
                        });
                    }
                };
                length(&arg).map(Cow::Owned)
            }
        }
    }

    fn up(&self, depth: usize) -> Result<Cow<'_, Value>, ExprError> {
        self.frame(depth)
            .map(Cow::Borrowed)
            .ok_or(ExprError::IndexOutOfRange {
                index: depth as i128,
                len: self.frames.len(),
            })
    }

    fn property<'v>(&self, target: Cow<'v, Value>, name: &str) -> Result<Cow<'v, Value>, ExprError> {
        match target {
            Cow::Borrowed(Value::Struct(s)) => Ok(Cow::Borrowed(s.get(name))),
            Cow::Owned(Value::Struct(mut s)) => Ok(Cow::Owned(s.take(name))),
            Cow::Borrowed(Value::Null) | Cow::Owned(Value::Null) => Ok(Cow::Owned(Value::Null)),
            other => self.enum_property(other.as_ref(), name).map(Cow::Owned),
        }
    }

    /// `.name` and `.value` of an enumeration constant.
    fn enum_property(&self, target: &Value, name: &str) -> Result<Value, ExprError> {
        let no_such = || ExprError::NoSuchProperty {
            property: name.to_string(),
            found: target.kind_name(),
        };

        let Value::Enum(constant) = target else {
            return Err(no_such());
        };

        match name {
            "name" => Ok(Value::Text(constant.name.clone())),
            "value" => {
                let def = self.model.get_type(&constant.type_name).ok_or_else(no_such)?;
                let TypeKind::Enumeration(enumeration) = &def.kind else {
                    return Err(no_such());
                };
                enumeration
                    .by_name(&constant.name)
                    .map(|e| e.value.clone())
                    .ok_or_else(no_such)
            }
            _ => Err(no_such()),
        }
    }
}

fn index_of(value: &Value) -> Result<usize, ExprError> {
    let index = number(value)?;
    index.to_usize().ok_or(ExprError::IndexOutOfRange {
        index: index.to_i128().unwrap_or(i128::MAX),
        len: 0,
    })
}

fn element(target: Cow<'_, Value>, index: usize) -> Result<Cow<'_, Value>, ExprError> {
    let len = match target.as_ref() {
        Value::List(items) => items.len(),
        Value::Bytes(bytes) => bytes.len(),
        other => {
            return Err(ExprError::TypeMismatch {
                expected: "list",
                found: other.kind_name(),
            });
        }
    };
    if index >= len {
        return Err(ExprError::IndexOutOfRange {
            index: index as i128,
            len,
        });
    }

    Ok(match target {
        Cow::Borrowed(Value::List(items)) => Cow::Borrowed(&items[index]),
        Cow::Owned(Value::List(mut items)) => Cow::Owned(items.swap_remove(index)),
        other => Cow::Owned(match other.as_ref() {
            Value::Bytes(bytes) => Value::UInt(u64::from(bytes[index])),
            _ => Value::Null,
        }),
    })
}

fn number(value: &Value) -> Result<BigInt, ExprError> {
    value.as_big_int().ok_or(ExprError::TypeMismatch {
        expected: "integer",
        found: value.kind_name(),
    })
}

fn truthy(value: &Value) -> Result<bool, ExprError> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Null => Ok(false),
        other => Err(ExprError::TypeMismatch {
            expected: "bool",
            found: other.kind_name(),
        }),
    }
}

fn length(value: &Value) -> Result<Value, ExprError> {
    let len = match value {
        Value::Null => 0,
        Value::List(items) => items.len(),
        Value::Bytes(bytes) => bytes.len(),
        Value::Text(text) => text.chars().count(),
        other => {
            return Err(ExprError::TypeMismatch {
                expected: "list",
                found: other.kind_name(),
            });
        }
    };

    Ok(Value::UInt(len as u64))
}

/// Equality, also matching an enumeration constant against its name.
fn equals(lhs: &Value, rhs: &Value) -> bool {
    match (lhs, rhs) {
        (Value::Enum(e), Value::Text(t)) | (Value::Text(t), Value::Enum(e)) => e.name == *t,
        _ => lhs == rhs,
    }
}

fn compare(lhs: &Value, rhs: &Value) -> Result<Ordering, ExprError> {
    match (lhs, rhs) {
        (Value::Text(a), Value::Text(b)) => Ok(a.cmp(b)),
        _ => Ok(number(lhs)?.cmp(&number(rhs)?)),
    }
}

fn binary(op: BinaryOp, lhs: &Value, rhs: &Value) -> Result<Value, ExprError> {
    let result = match op {
        BinaryOp::Eq => Value::Bool(equals(lhs, rhs)),
        BinaryOp::Ne => Value::Bool(!equals(lhs, rhs)),
        BinaryOp::Lt => Value::Bool(compare(lhs, rhs)?.is_lt()),
        BinaryOp::Le => Value::Bool(compare(lhs, rhs)?.is_le()),
        BinaryOp::Gt => Value::Bool(compare(lhs, rhs)?.is_gt()),
        BinaryOp::Ge => Value::Bool(compare(lhs, rhs)?.is_ge()),
        BinaryOp::Or | BinaryOp::And => {
            let (a, b) = (truthy(lhs)?, truthy(rhs)?);
            Value::Bool(if op == BinaryOp::Or { a || b } else { a && b })
        }
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => {
            let (a, b) = (number(lhs)?, number(rhs)?);
            let result = match op {
                BinaryOp::Add => a + b,
                BinaryOp::Sub => a - b,
                BinaryOp::Mul => a * b,
                _ if b.is_zero() => return Err(ExprError::DivisionByZero),
                BinaryOp::Div => a / b,
                _ => a % b,
            };
            Value::from_big_int(result)
        }
    };

    Ok(result)
}

#[cfg(test)]
mod tests {
    use crate::schema::{ContentKind, EnumerationElement, Schema, TypeDef};
    use crate::value::EnumValue;

    use super::*;

    fn context() -> ExpressionContext {
        let schema = Schema::new().with_type(TypeDef::enumeration(
            "Color",
            ContentKind::Integer,
            vec![
                EnumerationElement::new("RED", 1),
                EnumerationElement::new("GREEN", 2),
            ],
        ));
        ExpressionContext::new(Arc::new(ValidatedModel::compile(schema).unwrap()))
    }

    #[test]
    fn test_self_and_up() {
        let mut ctx = context();
        ctx.push(StructValue::new("Outer").with("n", 3).into());
        ctx.push(StructValue::new("Inner").with("n", 5).into());

        assert_eq!(ctx.evaluate("self.n").unwrap(), Value::Int(5));
        assert_eq!(ctx.evaluate("${up[0].n}").unwrap(), Value::Int(5));
        assert_eq!(ctx.evaluate("up[1].n + self.n").unwrap(), Value::Int(8));
        assert_eq!(ctx.evaluate("self.missing").unwrap(), Value::Null);
        assert!(matches!(
            ctx.evaluate("up[2]"),
            Err(CodecError::Expression {
                source: ExprError::IndexOutOfRange { index: 2, len: 2 },
                ..
            })
        ));
    }

    #[test]
    fn test_fields_and_variables() {
        let mut ctx = context();
        ctx.push(StructValue::new("S").into());
        ctx.set_field("a", Value::UInt(7));
        assert!(ctx.has_field("a"));
        assert_eq!(ctx.evaluate("self.a * 2").unwrap(), Value::Int(14));

        let previous = ctx.set_variable(LENGTH_VARIABLE, Value::UInt(11));
        assert_eq!(previous, None);
        assert_eq!(ctx.evaluate("$length - 4").unwrap(), Value::Int(7));
        assert!(ctx.references("$length - 4", LENGTH_VARIABLE).unwrap());
        assert!(!ctx.references("self.a * 2", LENGTH_VARIABLE).unwrap());
        ctx.restore_variable(LENGTH_VARIABLE, previous);
        assert!(matches!(
            ctx.evaluate("$length"),
            Err(CodecError::Expression {
                source: ExprError::UnknownVariable(_),
                ..
            })
        ));

        assert_eq!(ctx.take_field("a"), Value::UInt(7));
        assert_eq!(ctx.field("a"), &Value::Null);
    }

    #[test]
    fn test_operators() {
        let mut ctx = context();
        ctx.push(Value::Null);
        assert!(ctx.evaluate_bool("1 < 2 && 3 >= 3").unwrap());
        assert!(ctx.evaluate_bool("2 gt 1 and not (1 eq 2)").unwrap());
        assert!(ctx.evaluate_bool("7 mod 4 == 3 || false").unwrap());
        assert!(ctx.evaluate_bool("'abc' < 'abd'").unwrap());
        assert_eq!(ctx.evaluate("-(10 div 3)").unwrap(), Value::Int(-3));
        assert_eq!(ctx.evaluate_u64("0x10 + 1").unwrap(), 17);
        assert!(matches!(
            ctx.evaluate("1 / 0"),
            Err(CodecError::Expression {
                source: ExprError::DivisionByZero,
                ..
            })
        ));
        assert!(matches!(
            ctx.evaluate_u64("0 - 1"),
            Err(CodecError::Expression {
                source: ExprError::Overflow,
                ..
            })
        ));
    }

    #[test]
    fn test_length_and_index() {
        let mut ctx = context();
        let items = Value::List(vec![Value::Int(4), Value::Int(5), Value::Int(6)]);
        ctx.push(StructValue::new("NumberList").with("items", items).into());

        assert_eq!(ctx.evaluate("length(self.items)").unwrap(), Value::UInt(3));
        assert_eq!(ctx.evaluate("fn:length(self.items)").unwrap(), Value::UInt(3));
        assert_eq!(ctx.evaluate("self.items[2]").unwrap(), Value::Int(6));
        assert_eq!(ctx.evaluate("length(self.none)").unwrap(), Value::UInt(0));
    }

    #[test]
    fn test_enum_properties() {
        let mut ctx = context();
        let color = Value::Enum(EnumValue::new("Color", "GREEN"));
        ctx.push(StructValue::new("S").with("color", color).into());

        assert_eq!(ctx.evaluate("self.color.value").unwrap(), Value::Int(2));
        assert_eq!(
            ctx.evaluate("self.color.name").unwrap(),
            Value::Text("GREEN".to_string())
        );
        assert!(ctx.evaluate_bool("self.color == 'GREEN'").unwrap());
        assert!(matches!(
            ctx.evaluate("self.color.ordinal"),
            Err(CodecError::Expression {
                source: ExprError::NoSuchProperty { .. },
                ..
            })
        ));
    }

    #[test]
    fn test_declared_length() {
        use crate::schema::LengthUnit;

        let mut ctx = context();
        ctx.push(StructValue::new("S").with("len", 3).into());

        let format = Format::new().with_length("self.len", LengthUnit::Byte);
        assert_eq!(ctx.length_bits(&format).unwrap(), Some(24));
        assert_eq!(
            ctx.declared_length(&format).unwrap(),
            Some(DeclaredLength::Exact(24))
        );

        let format = Format::new().with_min_length("2");
        assert_eq!(ctx.length_bits(&format).unwrap(), None);
        assert_eq!(
            ctx.declared_length(&format).unwrap(),
            Some(DeclaredLength::AtLeast(16))
        );

        let format = Format::new()
            .with_length("4", LengthUnit::Bit)
            .with_length_kind(LengthKind::EndOfParent);
        assert_eq!(ctx.declared_length(&format).unwrap(), None);
    }

    #[test]
    fn test_syntax_error_is_reported_with_source() {
        let mut ctx = context();
        let err = ctx.evaluate("self.").unwrap_err();
        assert!(matches!(
            err,
            CodecError::Expression { ref expr, source: ExprError::Syntax { .. } } if expr == "self."
        ));
    }
}
