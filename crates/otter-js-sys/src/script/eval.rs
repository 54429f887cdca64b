//! Tree-walking evaluator. Every intermediate heap value is rooted in the
//! current handle scope so a `gc()` call mid-expression cannot free it.

use std::rc::Rc;

use num_bigint::BigInt;
use num_traits::Zero;

use super::parser::{BinaryOp, Expr, LogicalOp, PropName, Stmt, UnaryOp};
use crate::builtins::number_to_string;
use crate::env::{Completion, js_env_t};
use crate::heap::{ErrorKind, ObjectClass, PropertyKey, Value};
use crate::{
    js_bigint, js_boolean, js_external, js_function, js_null, js_number, js_object, js_string, js_symbol,
    js_undefined,
};

pub(crate) struct Interpreter<'e> {
    env: &'e js_env_t,
    global: Value,
}

impl<'e> Interpreter<'e> {
    pub(crate) fn new(env: &'e js_env_t) -> Self {
        Self {
            env,
            global: Value::Object(env.intrinsics.global),
        }
    }

    pub(crate) fn run(&self, program: &[Stmt]) -> Completion<Value> {
        let mut completion = Value::Undefined;
        for statement in program {
            match statement {
                Stmt::Expr(expression) => completion = self.eval(expression)?,
                Stmt::Throw(argument) => return Err(self.eval(argument)?),
                Stmt::Declare(name, initializer) => {
                    let value = match initializer {
                        Some(initializer) => self.eval(initializer)?,
                        None => Value::Undefined,
                    };
                    self.env
                        .set(&self.global, PropertyKey::String(name.clone()), value)?;
                }
                Stmt::Empty => {}
            }
        }
        Ok(completion)
    }

    fn eval(&self, expression: &Expr) -> Completion<Value> {
        let value = self.eval_unrooted(expression)?;
        Ok(self.env.root(value))
    }

    fn eval_unrooted(&self, expression: &Expr) -> Completion<Value> {
        match expression {
            Expr::Number(n) => Ok(Value::Number(*n)),
            Expr::BigInt(b) => Ok(Value::BigInt(b.clone())),
            Expr::String(s) => Ok(Value::String(s.clone())),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Null => Ok(Value::Null),
            Expr::This => Ok(self.global.clone()),
            Expr::Ident(name) => self.lookup(name),
            Expr::Array(elements) => {
                let values = elements
                    .iter()
                    .map(|element| self.eval(element))
                    .collect::<Completion<Vec<_>>>()?;
                Ok(self.env.alloc(ObjectClass::Array(values)))
            }
            Expr::Object(properties) => {
                let object = self.env.root(self.env.alloc(ObjectClass::Ordinary));
                for (name, value) in properties {
                    let key = match name {
                        PropName::Static(name) => PropertyKey::String(name.clone()),
                        PropName::Computed(key) => {
                            let key = self.eval(key)?;
                            self.env.to_property_key(&key)?
                        }
                    };
                    let value = self.eval(value)?;
                    self.env.set(&object, key, value)?;
                }
                Ok(object)
            }
            Expr::Member(object, name) => {
                let object = self.eval(object)?;
                self.env.get(&object, &PropertyKey::String(name.clone()))
            }
            Expr::Index(object, index) => {
                let object = self.eval(object)?;
                let index = self.eval(index)?;
                let key = self.env.to_property_key(&index)?;
                self.env.get(&object, &key)
            }
            Expr::Call(callee, arguments) => {
                let (function, receiver) = match &**callee {
                    Expr::Member(object, name) => {
                        let object = self.eval(object)?;
                        let function = self
                            .env
                            .get(&object, &PropertyKey::String(name.clone()))?;
                        (self.env.root(function), object)
                    }
                    Expr::Index(object, index) => {
                        let object = self.eval(object)?;
                        let index = self.eval(index)?;
                        let key = self.env.to_property_key(&index)?;
                        let function = self.env.get(&object, &key)?;
                        (self.env.root(function), object)
                    }
                    other => (self.eval(other)?, Value::Undefined),
                };
                let arguments = self.arguments(arguments)?;
                if !self.env.is_callable(&function) {
                    return self.env.throw(
                        ErrorKind::TypeError,
                        format!("{} is not a function", callee_name(callee)),
                    );
                }
                self.env.call(&function, receiver, &arguments)
            }
            Expr::New(callee, arguments) => {
                let constructor = self.eval(callee)?;
                let arguments = self.arguments(arguments)?;
                if !self.env.is_callable(&constructor) {
                    return self.env.throw(
                        ErrorKind::TypeError,
                        format!("{} is not a constructor", callee_name(callee)),
                    );
                }
                self.env.construct(&constructor, &arguments)
            }
            Expr::Unary(UnaryOp::TypeOf, operand) => {
                let value = match &**operand {
                    Expr::Ident(name) if !self.env.has(&self.global, &PropertyKey::String(name.clone()))? => {
                        Value::Undefined
                    }
                    other => self.eval(other)?,
                };
                Ok(Value::string(self.type_name(&value)))
            }
            Expr::Unary(op, operand) => {
                let value = self.eval(operand)?;
                self.unary(*op, value)
            }
            Expr::Binary(op, left, right) => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                self.binary(*op, &left, &right)
            }
            Expr::Logical(op, left, right) => {
                let left = self.eval(left)?;
                match (op, truthy(&left)) {
                    (LogicalOp::And, false) | (LogicalOp::Or, true) => Ok(left),
                    _ => self.eval(right),
                }
            }
            Expr::Conditional(test, consequent, alternate) => {
                if truthy(&self.eval(test)?) {
                    self.eval(consequent)
                } else {
                    self.eval(alternate)
                }
            }
            Expr::Assign(target, value) => self.assign(target, value),
        }
    }

    fn arguments(&self, arguments: &[Expr]) -> Completion<Vec<Value>> {
        arguments.iter().map(|argument| self.eval(argument)).collect()
    }

    fn lookup(&self, name: &Rc<str>) -> Completion<Value> {
        if name.as_ref() == "undefined" {
            return Ok(Value::Undefined);
        }
        let key = PropertyKey::String(name.clone());
        if !self.env.has(&self.global, &key)? {
            return self
                .env
                .throw(ErrorKind::ReferenceError, format!("{name} is not defined"));
        }
        self.env.get(&self.global, &key)
    }

    fn assign(&self, target: &Expr, value: &Expr) -> Completion<Value> {
        let (object, key) = match target {
            Expr::Ident(name) => (self.global.clone(), PropertyKey::String(name.clone())),
            Expr::Member(object, name) => (self.eval(object)?, PropertyKey::String(name.clone())),
            Expr::Index(object, index) => {
                let object = self.eval(object)?;
                let index = self.eval(index)?;
                (object, self.env.to_property_key(&index)?)
            }
            _ => {
                return self
                    .env
                    .throw(ErrorKind::SyntaxError, "Invalid left-hand side in assignment");
            }
        };
        let value = self.eval(value)?;
        self.env.set(&object, key, value.clone())?;
        Ok(value)
    }

    fn type_name(&self, value: &Value) -> &'static str {
        match self.env.type_of(value) {
            js_undefined => "undefined",
            js_null | js_object | js_external => "object",
            js_boolean => "boolean",
            js_number => "number",
            js_string => "string",
            js_symbol => "symbol",
            js_function => "function",
            js_bigint => "bigint",
            _ => "object",
        }
    }

    fn unary(&self, op: UnaryOp, value: Value) -> Completion<Value> {
        match op {
            UnaryOp::Not => Ok(Value::Bool(!truthy(&value))),
            UnaryOp::Void => Ok(Value::Undefined),
            UnaryOp::Negate => match value {
                Value::BigInt(b) => Ok(Value::BigInt(Rc::new(-(*b).clone()))),
                other => Ok(Value::Number(-self.env.to_number(&other)?)),
            },
            UnaryOp::Plus => Ok(Value::Number(self.env.to_number(&value)?)),
            UnaryOp::TypeOf => Ok(Value::string(self.type_name(&value))),
        }
    }

    fn binary(&self, op: BinaryOp, left: &Value, right: &Value) -> Completion<Value> {
        match op {
            BinaryOp::StrictEq => Ok(Value::Bool(self.env.strict_equals(left, right))),
            BinaryOp::StrictNe => Ok(Value::Bool(!self.env.strict_equals(left, right))),
            BinaryOp::LooseEq => Ok(Value::Bool(self.loose_equals(left, right)?)),
            BinaryOp::LooseNe => Ok(Value::Bool(!self.loose_equals(left, right)?)),
            BinaryOp::InstanceOf => Ok(Value::Bool(self.env.instance_of(left, right)?)),
            BinaryOp::In => {
                let key = self.env.to_property_key(left)?;
                Ok(Value::Bool(self.env.has(right, &key)?))
            }
            BinaryOp::Lt | BinaryOp::Gt | BinaryOp::Le | BinaryOp::Ge => self.compare(op, left, right),
            BinaryOp::Add => self.add(left, right),
            BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => self.arithmetic(op, left, right),
        }
    }

    fn add(&self, left: &Value, right: &Value) -> Completion<Value> {
        match (left, right) {
            (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a + b)),
            (Value::BigInt(a), Value::BigInt(b)) => Ok(Value::BigInt(Rc::new(&**a + &**b))),
            (Value::String(_) | Value::Object(_), _) | (_, Value::String(_) | Value::Object(_)) => {
                let a = self.env.to_string(left)?;
                let b = self.env.to_string(right)?;
                Ok(Value::String(Rc::from(format!("{a}{b}"))))
            }
            (Value::BigInt(_), _) | (_, Value::BigInt(_)) => self.mixed_bigint(),
            _ => Ok(Value::Number(self.env.to_number(left)? + self.env.to_number(right)?)),
        }
    }

    fn arithmetic(&self, op: BinaryOp, left: &Value, right: &Value) -> Completion<Value> {
        match (left, right) {
            (Value::BigInt(a), Value::BigInt(b)) => {
                if matches!(op, BinaryOp::Div | BinaryOp::Rem) && b.is_zero() {
                    return self.env.throw(ErrorKind::RangeError, "Division by zero");
                }
                let result: BigInt = match op {
                    BinaryOp::Sub => &**a - &**b,
                    BinaryOp::Mul => &**a * &**b,
                    BinaryOp::Div => &**a / &**b,
                    _ => &**a % &**b,
                };
                Ok(Value::BigInt(Rc::new(result)))
            }
            (Value::BigInt(_), _) | (_, Value::BigInt(_)) => self.mixed_bigint(),
            _ => {
                let a = self.env.to_number(left)?;
                let b = self.env.to_number(right)?;
                Ok(Value::Number(match op {
                    BinaryOp::Sub => a - b,
                    BinaryOp::Mul => a * b,
                    BinaryOp::Div => a / b,
                    _ => a % b,
                }))
            }
        }
    }

    fn mixed_bigint(&self) -> Completion<Value> {
        self.env.throw(
            ErrorKind::TypeError,
            "Cannot mix BigInt and other types, use explicit conversions",
        )
    }

    fn compare(&self, op: BinaryOp, left: &Value, right: &Value) -> Completion<Value> {
        let ordering = match (left, right) {
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::BigInt(a), Value::BigInt(b)) => Some(a.cmp(b)),
            _ => {
                let a = self.env.to_number(left)?;
                let b = self.env.to_number(right)?;
                a.partial_cmp(&b)
            }
        };
        let Some(ordering) = ordering else {
            return Ok(Value::Bool(false));
        };
        Ok(Value::Bool(match op {
            BinaryOp::Lt => ordering.is_lt(),
            BinaryOp::Gt => ordering.is_gt(),
            BinaryOp::Le => ordering.is_le(),
            _ => ordering.is_ge(),
        }))
    }

    fn loose_equals(&self, left: &Value, right: &Value) -> Completion<bool> {
        Ok(match (left, right) {
            (Value::Undefined | Value::Null, Value::Undefined | Value::Null) => true,
            (Value::Undefined | Value::Null, _) | (_, Value::Undefined | Value::Null) => false,
            (Value::Number(_), Value::String(_)) | (Value::String(_), Value::Number(_)) => {
                self.env.to_number(left)? == self.env.to_number(right)?
            }
            (Value::Bool(_), _) | (_, Value::Bool(_)) => {
                let a = Value::Number(self.env.to_number(left)?);
                let b = Value::Number(self.env.to_number(right)?);
                self.env.strict_equals(&a, &b)
            }
            _ => self.env.strict_equals(left, right),
        })
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Undefined | Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => *n != 0.0 && !n.is_nan(),
        Value::String(s) => !s.is_empty(),
        Value::BigInt(b) => !b.is_zero(),
        Value::Symbol(_) | Value::Object(_) => true,
    }
}

fn callee_name(callee: &Expr) -> String {
    match callee {
        Expr::Ident(name) => name.to_string(),
        Expr::Member(object, name) => format!("{}.{name}", callee_name(object)),
        Expr::Index(object, _) => format!("{}[...]", callee_name(object)),
        Expr::Number(n) => number_to_string(*n),
        Expr::String(s) => format!("\"{s}\""),
        _ => "expression".to_string(),
    }
}
