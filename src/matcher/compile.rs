//! Resolution of a parsed matcher AST into an evaluable tree.
//!
//! Field accesses become fixed indices into the request/policy value
//! vectors, `g`-style calls are bound to role-manager handles, and
//! built-in operator names are linked to their functions. The resolved
//! tree evaluates with no name lookups at request time.

use std::collections::HashMap;
use std::sync::Arc;

use crate::errors::EngineError;
use crate::matcher::ast::{BinOp, Expr, LitValue};
use crate::operators;
use crate::rbac::RoleManager;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Builtin {
    KeyMatch,
    KeyMatch2,
    KeyMatch3,
    RegexMatch,
    IpMatch,
}

impl Builtin {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "keyMatch" => Some(Builtin::KeyMatch),
            "keyMatch2" => Some(Builtin::KeyMatch2),
            "keyMatch3" => Some(Builtin::KeyMatch3),
            "regexMatch" => Some(Builtin::RegexMatch),
            "ipMatch" => Some(Builtin::IpMatch),
            _ => None,
        }
    }

    fn call(&self, key1: &str, key2: &str) -> bool {
        match self {
            Builtin::KeyMatch => operators::key_match(key1, key2),
            Builtin::KeyMatch2 => operators::key_match2(key1, key2),
            Builtin::KeyMatch3 => operators::key_match3(key1, key2),
            Builtin::RegexMatch => operators::regex_match(key1, key2),
            Builtin::IpMatch => operators::ip_match(key1, key2),
        }
    }
}

/// Evaluable node with all references resolved at compile time.
#[derive(Debug, Clone)]
pub(crate) enum Node {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    Request(usize),
    Policy(usize),
    RoleCheck {
        manager: Arc<RoleManager>,
        args: Vec<Node>,
    },
    Builtin {
        op: Builtin,
        args: Vec<Node>,
    },
    Bin {
        op: BinOp,
        left: Box<Node>,
        right: Box<Node>,
    },
    Not(Box<Node>),
}

pub(crate) fn resolve(
    expr: &Expr,
    request_fields: &HashMap<String, usize>,
    policy_fields: &HashMap<String, usize>,
    role_managers: &HashMap<String, Arc<RoleManager>>,
) -> Result<Node, EngineError> {
    match expr {
        Expr::Literal(LitValue::Int(n)) => Ok(Node::Int(*n)),
        Expr::Literal(LitValue::Float(f)) => Ok(Node::Float(*f)),
        Expr::Literal(LitValue::Str(s)) => Ok(Node::Str(s.clone())),
        Expr::Literal(LitValue::Bool(b)) => Ok(Node::Bool(*b)),

        Expr::Path(segments) => match segments.as_slice() {
            [owner, field] if owner == "r" => request_fields
                .get(field)
                .map(|idx| Node::Request(*idx))
                .ok_or_else(|| {
                    EngineError::Compile(format!("unknown request field `r.{field}`"))
                }),
            [owner, field] if owner == "p" => policy_fields
                .get(field)
                .map(|idx| Node::Policy(*idx))
                .ok_or_else(|| {
                    EngineError::Compile(format!("unknown policy field `p.{field}`"))
                }),
            _ => Err(EngineError::Compile(format!(
                "unresolved reference `{}`",
                segments.join(".")
            ))),
        },

        Expr::Call { name, args } => {
            let args: Vec<Node> = args
                .iter()
                .map(|a| resolve(a, request_fields, policy_fields, role_managers))
                .collect::<Result<_, _>>()?;

            if let Some(op) = Builtin::from_name(name) {
                if args.len() != 2 {
                    return Err(EngineError::Compile(format!(
                        "`{name}` takes 2 arguments, got {}",
                        args.len()
                    )));
                }
                return Ok(Node::Builtin { op, args });
            }

            if let Some(manager) = role_managers.get(name) {
                if args.len() != 2 && args.len() != 3 {
                    return Err(EngineError::Compile(format!(
                        "`{name}` takes 2 or 3 arguments, got {}",
                        args.len()
                    )));
                }
                return Ok(Node::RoleCheck {
                    manager: Arc::clone(manager),
                    args,
                });
            }

            // `g`-style names without a handle are a wiring mistake, not
            // an unknown function.
            if name.strip_prefix('g').is_some_and(|rest| rest.chars().all(|c| c.is_ascii_digit())) {
                return Err(EngineError::Compile(format!(
                    "RoleManager for '{name}' not found"
                )));
            }
            Err(EngineError::Compile(format!("unknown function `{name}`")))
        }

        Expr::BinOp { op, left, right } => Ok(Node::Bin {
            op: *op,
            left: Box::new(resolve(left, request_fields, policy_fields, role_managers)?),
            right: Box::new(resolve(right, request_fields, policy_fields, role_managers)?),
        }),

        Expr::UnaryNot(inner) => Ok(Node::Not(Box::new(resolve(
            inner,
            request_fields,
            policy_fields,
            role_managers,
        )?))),
    }
}

// ─── Evaluator ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub(crate) enum Value<'v> {
    Str(&'v str),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl<'v> Value<'v> {
    fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    fn as_str(&self) -> Option<&'v str> {
        match self {
            Value::Str(s) => Some(*s),
            _ => None,
        }
    }

    /// Equality with int/float coercion; mismatched kinds compare unequal
    /// rather than raising.
    fn loose_eq(&self, other: &Value<'_>) -> bool {
        match (self, other) {
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }
}

pub(crate) fn eval<'v>(
    node: &'v Node,
    request_values: &[&'v str],
    policy_values: &[&'v str],
) -> Result<Value<'v>, EngineError> {
    match node {
        Node::Int(n) => Ok(Value::Int(*n)),
        Node::Float(f) => Ok(Value::Float(*f)),
        Node::Str(s) => Ok(Value::Str(s)),
        Node::Bool(b) => Ok(Value::Bool(*b)),

        Node::Request(idx) => request_values
            .get(*idx)
            .copied()
            .map(Value::Str)
            .ok_or_else(|| {
                EngineError::Eval(format!(
                    "request value index {idx} out of range (got {} values)",
                    request_values.len()
                ))
            }),
        Node::Policy(idx) => policy_values
            .get(*idx)
            .copied()
            .map(Value::Str)
            .ok_or_else(|| {
                EngineError::Eval(format!(
                    "policy value index {idx} out of range (got {} values)",
                    policy_values.len()
                ))
            }),

        Node::RoleCheck { manager, args } => {
            let mut strings = Vec::with_capacity(args.len());
            for arg in args {
                match eval(arg, request_values, policy_values)?.as_str() {
                    Some(s) => strings.push(s),
                    // non-string operand matches nothing
                    None => return Ok(Value::Bool(false)),
                }
            }
            let domain = strings.get(2).copied();
            Ok(Value::Bool(manager.has_link(strings[0], strings[1], domain)))
        }

        Node::Builtin { op, args } => {
            let key1 = eval(&args[0], request_values, policy_values)?;
            let key2 = eval(&args[1], request_values, policy_values)?;
            match (key1.as_str(), key2.as_str()) {
                (Some(k1), Some(k2)) => Ok(Value::Bool(op.call(k1, k2))),
                _ => Ok(Value::Bool(false)),
            }
        }

        Node::Not(inner) => match eval(inner, request_values, policy_values)? {
            Value::Bool(b) => Ok(Value::Bool(!b)),
            _ => Err(EngineError::Eval("`!` operator requires a boolean operand".into())),
        },

        Node::Bin { op, left, right } => match op {
            BinOp::And => {
                match eval(left, request_values, policy_values)? {
                    Value::Bool(false) => Ok(Value::Bool(false)),
                    Value::Bool(true) => match eval(right, request_values, policy_values)? {
                        Value::Bool(b) => Ok(Value::Bool(b)),
                        _ => Err(EngineError::Eval("`&&` requires boolean operands".into())),
                    },
                    _ => Err(EngineError::Eval("`&&` requires boolean operands".into())),
                }
            }
            BinOp::Or => {
                match eval(left, request_values, policy_values)? {
                    Value::Bool(true) => Ok(Value::Bool(true)),
                    Value::Bool(false) => match eval(right, request_values, policy_values)? {
                        Value::Bool(b) => Ok(Value::Bool(b)),
                        _ => Err(EngineError::Eval("`||` requires boolean operands".into())),
                    },
                    _ => Err(EngineError::Eval("`||` requires boolean operands".into())),
                }
            }
            BinOp::Eq => {
                let l = eval(left, request_values, policy_values)?;
                let r = eval(right, request_values, policy_values)?;
                Ok(Value::Bool(l.loose_eq(&r)))
            }
            BinOp::Ne => {
                let l = eval(left, request_values, policy_values)?;
                let r = eval(right, request_values, policy_values)?;
                Ok(Value::Bool(!l.loose_eq(&r)))
            }
            BinOp::Gt | BinOp::Lt | BinOp::Ge | BinOp::Le => {
                let l = eval(left, request_values, policy_values)?
                    .as_f64()
                    .ok_or_else(|| {
                        EngineError::Eval("comparison operator requires numeric operands".into())
                    })?;
                let r = eval(right, request_values, policy_values)?
                    .as_f64()
                    .ok_or_else(|| {
                        EngineError::Eval("comparison operator requires numeric operands".into())
                    })?;
                let result = match op {
                    BinOp::Gt => l > r,
                    BinOp::Lt => l < r,
                    BinOp::Ge => l >= r,
                    BinOp::Le => l <= r,
                    _ => unreachable!(),
                };
                Ok(Value::Bool(result))
            }
        },
    }
}
