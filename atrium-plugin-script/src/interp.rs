//! Fuel-metered tree-walking evaluator.
//!
//! Every statement and expression evaluation charges one unit of fuel, so a
//! hostile program with an unbounded loop terminates with
//! [`ScriptError::FuelExhausted`] instead of hanging the host's render
//! thread. Call depth is capped separately to bound stack growth from
//! recursion.
//!
//! The interpreter holds no environment of its own: callers pass the root
//! environment in, which is how the host keeps the sandbox sealed.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::ast::{BinaryOp, Expr, LogicalOp, Program, Stmt, UnaryOp};
use crate::builtins;
use crate::env::Env;
use crate::error::ScriptError;
use crate::value::{ScriptFunction, Value, lock_list, lock_map};

/// Outcome of executing one statement.
enum Flow {
    Normal,
    Return(Value),
    Break,
    Continue,
}

#[derive(Debug)]
pub struct Interpreter {
    fuel: u64,
    fuel_budget: u64,
    depth: usize,
    max_depth: usize,
    default_export: Option<Value>,
}

impl Interpreter {
    #[must_use]
    pub fn new(fuel_budget: u64, max_call_depth: usize) -> Self {
        Self {
            fuel: fuel_budget,
            fuel_budget,
            depth: 0,
            max_depth: max_call_depth,
            default_export: None,
        }
    }

    /// Reset the step budget. The host calls this before every invocation so
    /// one render cannot starve the next.
    pub fn set_fuel(&mut self, fuel: u64) {
        self.fuel = fuel;
        self.fuel_budget = fuel;
    }

    #[must_use]
    pub fn fuel_remaining(&self) -> u64 {
        self.fuel
    }

    /// Steps consumed since construction or the last [`set_fuel`].
    ///
    /// [`set_fuel`]: Interpreter::set_fuel
    #[must_use]
    pub fn fuel_used(&self) -> u64 {
        self.fuel_budget - self.fuel
    }

    /// The value of the program's `export default`, if one executed.
    #[must_use]
    pub fn default_export(&self) -> Option<&Value> {
        self.default_export.as_ref()
    }

    pub fn take_default_export(&mut self) -> Option<Value> {
        self.default_export.take()
    }

    fn charge(&mut self) -> Result<(), ScriptError> {
        if self.fuel == 0 {
            return Err(ScriptError::FuelExhausted {
                budget: self.fuel_budget,
            });
        }
        self.fuel -= 1;
        Ok(())
    }

    /// Execute a whole program in `env`. Top-level function declarations are
    /// hoisted first, matching how plugin authors order their code.
    pub fn run_program(&mut self, program: &Program, env: &Env) -> Result<(), ScriptError> {
        hoist_functions(&program.body, env);
        for stmt in &program.body {
            match self.exec_stmt(stmt, env)? {
                Flow::Normal => {}
                Flow::Return(_) => {
                    return Err(ScriptError::runtime("return outside of function"));
                }
                Flow::Break => return Err(ScriptError::runtime("break outside of loop")),
                Flow::Continue => {
                    return Err(ScriptError::runtime("continue outside of loop"));
                }
            }
        }
        Ok(())
    }

    /// Invoke a callable value with the given arguments.
    pub fn call(&mut self, callee: &Value, args: &[Value]) -> Result<Value, ScriptError> {
        match callee {
            Value::Function(func) => {
                if self.depth >= self.max_depth {
                    return Err(ScriptError::DepthExceeded {
                        max_depth: self.max_depth,
                    });
                }
                let call_env = Env::child(&func.env);
                for (i, param) in func.params.iter().enumerate() {
                    call_env.define(param.clone(), args.get(i).cloned().unwrap_or(Value::Null));
                }
                self.depth += 1;
                let result = self.exec_stmts(&func.body, &call_env);
                self.depth -= 1;
                match result? {
                    Flow::Return(value) => Ok(value),
                    Flow::Normal => Ok(Value::Null),
                    Flow::Break => Err(ScriptError::runtime("break outside of loop")),
                    Flow::Continue => Err(ScriptError::runtime("continue outside of loop")),
                }
            }
            Value::Native(func) => {
                if self.depth >= self.max_depth {
                    return Err(ScriptError::DepthExceeded {
                        max_depth: self.max_depth,
                    });
                }
                self.depth += 1;
                let result = (func.func)(self, args);
                self.depth -= 1;
                result
            }
            other => Err(ScriptError::runtime(format!(
                "value of type {} is not callable",
                other.type_name()
            ))),
        }
    }

    // ================================================================
    // Statements
    // ================================================================

    fn exec_stmts(&mut self, stmts: &[Stmt], env: &Env) -> Result<Flow, ScriptError> {
        hoist_functions(stmts, env);
        for stmt in stmts {
            match self.exec_stmt(stmt, env)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_stmt(&mut self, stmt: &Stmt, env: &Env) -> Result<Flow, ScriptError> {
        self.charge()?;
        match stmt {
            Stmt::FunctionDecl { name, params, body } => {
                env.define(
                    name.clone(),
                    make_function(Some(name.clone()), params, body, env),
                );
                Ok(Flow::Normal)
            }
            Stmt::VarDecl { name, init } => {
                let value = match init {
                    Some(expr) => self.eval(expr, env)?,
                    None => Value::Null,
                };
                env.define(name.clone(), value);
                Ok(Flow::Normal)
            }
            Stmt::ExportDefault { value } => {
                let value = self.eval(value, env)?;
                self.default_export = Some(value);
                Ok(Flow::Normal)
            }
            Stmt::If {
                cond,
                then_branch,
                else_branch,
            } => {
                if self.eval(cond, env)?.is_truthy() {
                    self.exec_stmt(then_branch, env)
                } else if let Some(else_branch) = else_branch {
                    self.exec_stmt(else_branch, env)
                } else {
                    Ok(Flow::Normal)
                }
            }
            Stmt::While { cond, body } => {
                loop {
                    if !self.eval(cond, env)?.is_truthy() {
                        break;
                    }
                    match self.exec_stmt(body, env)? {
                        Flow::Normal | Flow::Continue => {}
                        Flow::Break => break,
                        flow @ Flow::Return(_) => return Ok(flow),
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::For {
                init,
                cond,
                step,
                body,
            } => {
                let scope = Env::child(env);
                if let Some(init) = init {
                    self.exec_stmt(init, &scope)?;
                }
                loop {
                    if let Some(cond) = cond {
                        if !self.eval(cond, &scope)?.is_truthy() {
                            break;
                        }
                    }
                    match self.exec_stmt(body, &scope)? {
                        Flow::Normal | Flow::Continue => {}
                        Flow::Break => break,
                        flow @ Flow::Return(_) => return Ok(flow),
                    }
                    if let Some(step) = step {
                        self.eval(step, &scope)?;
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::Return { value } => {
                let value = match value {
                    Some(expr) => self.eval(expr, env)?,
                    None => Value::Null,
                };
                Ok(Flow::Return(value))
            }
            Stmt::Break => Ok(Flow::Break),
            Stmt::Continue => Ok(Flow::Continue),
            Stmt::Throw { value } => {
                let value = self.eval(value, env)?;
                Err(ScriptError::Thrown {
                    message: thrown_message(&value),
                })
            }
            Stmt::Expr { expr } => {
                self.eval(expr, env)?;
                Ok(Flow::Normal)
            }
            Stmt::Block { body } => {
                let scope = Env::child(env);
                self.exec_stmts(body, &scope)
            }
        }
    }

    // ================================================================
    // Expressions
    // ================================================================

    fn eval(&mut self, expr: &Expr, env: &Env) -> Result<Value, ScriptError> {
        self.charge()?;
        match expr {
            Expr::Num(n) => Ok(Value::Num(*n)),
            Expr::Str(s) => Ok(Value::Str(s.clone())),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Null => Ok(Value::Null),
            Expr::Ident(name) => env
                .get(name)
                .ok_or_else(|| ScriptError::runtime(format!("'{name}' is not defined"))),
            Expr::Array(elements) => {
                let mut items = Vec::with_capacity(elements.len());
                for element in elements {
                    items.push(self.eval(element, env)?);
                }
                Ok(Value::list(items))
            }
            Expr::Object(entries) => {
                let mut map = BTreeMap::new();
                for (key, value) in entries {
                    map.insert(key.clone(), self.eval(value, env)?);
                }
                Ok(Value::map(map))
            }
            Expr::Function { params, body } => Ok(make_function(None, params, body, env)),
            Expr::Member { object, property } => {
                let object = self.eval(object, env)?;
                self.member_get(&object, property)
            }
            Expr::Index { object, index } => {
                let object = self.eval(object, env)?;
                let index = self.eval(index, env)?;
                self.index_get(&object, &index)
            }
            Expr::Call { callee, args } => {
                // Method calls dispatch on the receiver so built-in string
                // and list methods work without materializing bound values.
                if let Expr::Member { object, property } = callee.as_ref() {
                    let receiver = self.eval(object, env)?;
                    let argv = self.eval_args(args, env)?;
                    return self.call_member(&receiver, property, &argv);
                }
                let callee = self.eval(callee, env)?;
                let argv = self.eval_args(args, env)?;
                self.call(&callee, &argv)
            }
            Expr::New { callee, args } => {
                if callee == "Error" || callee.ends_with("Error") {
                    let argv = self.eval_args(args, env)?;
                    let message = argv
                        .first()
                        .map(Value::to_display_string)
                        .unwrap_or_default();
                    Ok(Value::map_of([
                        ("name".to_string(), Value::str(callee.clone())),
                        ("message".to_string(), Value::Str(message)),
                    ]))
                } else {
                    Err(ScriptError::runtime(format!(
                        "unknown constructor '{callee}'"
                    )))
                }
            }
            Expr::Unary { op, operand } => {
                let value = self.eval(operand, env)?;
                Ok(match op {
                    UnaryOp::Not => Value::Bool(!value.is_truthy()),
                    UnaryOp::Neg => Value::Num(-value.to_number()),
                    UnaryOp::TypeOf => Value::str(value.type_name()),
                })
            }
            Expr::Binary { op, left, right } => {
                let left = self.eval(left, env)?;
                let right = self.eval(right, env)?;
                Ok(binary_op(*op, &left, &right))
            }
            Expr::Logical { op, left, right } => {
                let left = self.eval(left, env)?;
                match op {
                    LogicalOp::And => {
                        if left.is_truthy() {
                            self.eval(right, env)
                        } else {
                            Ok(left)
                        }
                    }
                    LogicalOp::Or => {
                        if left.is_truthy() {
                            Ok(left)
                        } else {
                            self.eval(right, env)
                        }
                    }
                }
            }
            Expr::Ternary {
                cond,
                then_value,
                else_value,
            } => {
                if self.eval(cond, env)?.is_truthy() {
                    self.eval(then_value, env)
                } else {
                    self.eval(else_value, env)
                }
            }
            Expr::Assign { target, value } => {
                let value = self.eval(value, env)?;
                self.assign(target, value, env)
            }
        }
    }

    fn eval_args(&mut self, args: &[Expr], env: &Env) -> Result<Vec<Value>, ScriptError> {
        let mut argv = Vec::with_capacity(args.len());
        for arg in args {
            argv.push(self.eval(arg, env)?);
        }
        Ok(argv)
    }

    fn assign(&mut self, target: &Expr, value: Value, env: &Env) -> Result<Value, ScriptError> {
        match target {
            Expr::Ident(name) => {
                if env.assign(name, value.clone()) {
                    Ok(value)
                } else {
                    Err(ScriptError::runtime(format!(
                        "assignment to undeclared variable '{name}'"
                    )))
                }
            }
            Expr::Member { object, property } => {
                let object = self.eval(object, env)?;
                match &object {
                    Value::Map(entries) => {
                        lock_map(entries).insert(property.clone(), value.clone());
                        Ok(value)
                    }
                    other => Err(ScriptError::runtime(format!(
                        "cannot set property '{property}' on {}",
                        other.type_name()
                    ))),
                }
            }
            Expr::Index { object, index } => {
                let object = self.eval(object, env)?;
                let index = self.eval(index, env)?;
                match &object {
                    Value::List(items) => {
                        let idx = index.to_number();
                        if idx.is_nan() || idx < 0.0 || idx.fract() != 0.0 {
                            return Err(ScriptError::runtime(format!(
                                "invalid list index {}",
                                index.to_display_string()
                            )));
                        }
                        let idx = idx as usize;
                        let mut items = lock_list(items);
                        // Appending one past the end is allowed; sparse
                        // writes are not, so a plugin cannot balloon memory
                        // with a single huge index.
                        if idx < items.len() {
                            items[idx] = value.clone();
                        } else if idx == items.len() {
                            items.push(value.clone());
                        } else {
                            return Err(ScriptError::runtime(format!(
                                "list index {idx} out of bounds (len {})",
                                items.len()
                            )));
                        }
                        Ok(value)
                    }
                    Value::Map(entries) => {
                        let key = index.to_display_string();
                        lock_map(entries).insert(key, value.clone());
                        Ok(value)
                    }
                    other => Err(ScriptError::runtime(format!(
                        "cannot assign into a value of type {}",
                        other.type_name()
                    ))),
                }
            }
            _ => Err(ScriptError::runtime("invalid assignment target")),
        }
    }

    fn member_get(&self, object: &Value, property: &str) -> Result<Value, ScriptError> {
        match object {
            Value::Null => Err(ScriptError::runtime(format!(
                "cannot read property '{property}' of null"
            ))),
            Value::Map(entries) => Ok(lock_map(entries).get(property).cloned().unwrap_or_default()),
            Value::Str(s) if property == "length" => {
                Ok(Value::Num(s.chars().count() as f64))
            }
            Value::List(items) if property == "length" => {
                Ok(Value::Num(lock_list(items).len() as f64))
            }
            _ => Ok(Value::Null),
        }
    }

    fn index_get(&self, object: &Value, index: &Value) -> Result<Value, ScriptError> {
        match object {
            Value::Null => Err(ScriptError::runtime("cannot index into null")),
            Value::List(items) => {
                let idx = index.to_number();
                if idx.is_nan() || idx < 0.0 || idx.fract() != 0.0 {
                    return Ok(Value::Null);
                }
                Ok(lock_list(items)
                    .get(idx as usize)
                    .cloned()
                    .unwrap_or_default())
            }
            Value::Str(s) => {
                let idx = index.to_number();
                if idx.is_nan() || idx < 0.0 || idx.fract() != 0.0 {
                    return Ok(Value::Null);
                }
                Ok(s.chars()
                    .nth(idx as usize)
                    .map(|c| Value::Str(c.to_string()))
                    .unwrap_or_default())
            }
            Value::Map(entries) => {
                let key = index.to_display_string();
                Ok(lock_map(entries).get(&key).cloned().unwrap_or_default())
            }
            _ => Ok(Value::Null),
        }
    }

    fn call_member(
        &mut self,
        receiver: &Value,
        method: &str,
        args: &[Value],
    ) -> Result<Value, ScriptError> {
        match receiver {
            Value::Null => Err(ScriptError::runtime(format!(
                "cannot read property '{method}' of null"
            ))),
            Value::Map(entries) => {
                let member = lock_map(entries).get(method).cloned();
                match member {
                    Some(value) if value.is_callable() => self.call(&value, args),
                    _ => Err(ScriptError::runtime(format!(
                        "'{method}' is not a function"
                    ))),
                }
            }
            Value::Str(s) => builtins::str_method(s, method, args),
            Value::List(items) => builtins::list_method(self, items, method, args),
            Value::Num(n) => builtins::num_method(*n, method, args),
            other => Err(ScriptError::runtime(format!(
                "'{method}' is not a function on {}",
                other.type_name()
            ))),
        }
    }
}

/// Pre-define function declarations so plugins can order helpers after the
/// component that uses them.
fn hoist_functions(stmts: &[Stmt], env: &Env) {
    for stmt in stmts {
        if let Stmt::FunctionDecl { name, params, body } = stmt {
            env.define(
                name.clone(),
                make_function(Some(name.clone()), params, body, env),
            );
        }
    }
}

fn make_function(name: Option<String>, params: &[String], body: &[Stmt], env: &Env) -> Value {
    Value::Function(Arc::new(ScriptFunction {
        name,
        params: params.to_vec(),
        body: body.to_vec(),
        env: env.clone(),
    }))
}

/// Render a thrown value the way its `message` would read in a console.
fn thrown_message(value: &Value) -> String {
    if let Some(Value::Str(message)) = value.map_get("message") {
        return message;
    }
    value.to_display_string()
}

fn binary_op(op: BinaryOp, left: &Value, right: &Value) -> Value {
    match op {
        BinaryOp::Add => {
            if matches!(left, Value::Str(_)) || matches!(right, Value::Str(_)) {
                Value::Str(left.to_display_string() + &right.to_display_string())
            } else {
                Value::Num(left.to_number() + right.to_number())
            }
        }
        BinaryOp::Sub => Value::Num(left.to_number() - right.to_number()),
        BinaryOp::Mul => Value::Num(left.to_number() * right.to_number()),
        BinaryOp::Div => Value::Num(left.to_number() / right.to_number()),
        BinaryOp::Rem => Value::Num(left.to_number() % right.to_number()),
        BinaryOp::Eq => Value::Bool(left.loose_eq(right)),
        BinaryOp::StrictEq => Value::Bool(left.strict_eq(right)),
        BinaryOp::NotEq => Value::Bool(!left.loose_eq(right)),
        BinaryOp::StrictNotEq => Value::Bool(!left.strict_eq(right)),
        BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq => {
            Value::Bool(compare(op, left, right))
        }
    }
}

fn compare(op: BinaryOp, left: &Value, right: &Value) -> bool {
    if let (Value::Str(a), Value::Str(b)) = (left, right) {
        return match op {
            BinaryOp::Lt => a < b,
            BinaryOp::LtEq => a <= b,
            BinaryOp::Gt => a > b,
            BinaryOp::GtEq => a >= b,
            _ => false,
        };
    }
    let a = left.to_number();
    let b = right.to_number();
    if a.is_nan() || b.is_nan() {
        return false;
    }
    match op {
        BinaryOp::Lt => a < b,
        BinaryOp::LtEq => a <= b,
        BinaryOp::Gt => a > b,
        BinaryOp::GtEq => a >= b,
        _ => false,
    }
}
