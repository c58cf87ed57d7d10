use std::{
    cell::{Cell, RefCell},
    collections::BTreeMap,
    fmt,
    io::{self, Write},
    rc::Rc,
};

use crate::{
    ast::{BinaryOperator, Block, Expression, PrefixOperator, Program, Statement},
    builtins::BuiltinRegistry,
    config::Config,
    environment::Environment,
    error::RuntimeError,
    object::{Function, MapPair, Object, ObjectType},
    stack::ensure_sufficient_stack,
};

/// Why evaluation stopped before producing a value.
#[derive(Debug, Clone, PartialEq)]
pub enum Flow {
    /// `return`: unwinds to the nearest function boundary.
    Return(Object),
    /// Language-level failure: unwinds to the top level.
    Error(RuntimeError),
    /// `exit`/`panic`: unwinds everything, the host should terminate.
    Exit(i32),
}

impl From<RuntimeError> for Flow {
    fn from(err: RuntimeError) -> Self {
        Flow::Error(err)
    }
}

impl Flow {
    pub fn kind(&self) -> Option<ObjectType> {
        match self {
            Flow::Return(_) => Some(ObjectType::ReturnValue),
            Flow::Error(_) => Some(ObjectType::Error),
            Flow::Exit(_) => None,
        }
    }
}

impl fmt::Display for Flow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Flow::Return(value) => write!(f, "{}", value),
            Flow::Error(err) => write!(f, "{}", err),
            Flow::Exit(code) => write!(f, "exit({})", code),
        }
    }
}

pub type EvalResult<T = Object> = Result<T, Flow>;

/// Result of evaluating one top-level unit.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// `None` when the unit had no value to show (empty, or ended with a binding).
    Value(Option<Object>),
    Error(RuntimeError),
    Exit(i32),
}

/// Where builtins such as `print` write to.
pub type Output = Rc<RefCell<dyn Write>>;

fn error<T>(message: impl Into<String>) -> EvalResult<T> {
    Err(Flow::Error(RuntimeError::new(message)))
}

pub struct Interpreter {
    builtins: BuiltinRegistry,
    output: Output,
    depth: Cell<usize>,
    max_call_depth: usize,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new(&Config::default())
    }
}

impl Interpreter {
    pub fn new(config: &Config) -> Self {
        Self::with_output(config, Rc::new(RefCell::new(io::stdout())))
    }

    pub fn with_output(config: &Config, output: Output) -> Self {
        Self {
            builtins: BuiltinRegistry::new(),
            output,
            depth: Cell::new(0),
            max_call_depth: config.max_call_depth,
        }
    }

    pub fn eval_program(&self, program: &Program, env: &Rc<Environment>) -> Outcome {
        self.depth.set(0);
        let flow = match self.eval_statements(&program.statements, env) {
            Ok(value) => return Outcome::Value(value),
            Err(flow) => flow,
        };
        tracing::debug!(kind = ?flow.kind(), %flow, "unwound to top level");
        match flow {
            Flow::Return(value) => Outcome::Value(Some(value)),
            Flow::Error(err) => Outcome::Error(err),
            Flow::Exit(code) => Outcome::Exit(code),
        }
    }

    /// Value of the last statement, `None` if it was a binding.
    fn eval_statements(
        &self,
        statements: &[Statement],
        env: &Rc<Environment>,
    ) -> EvalResult<Option<Object>> {
        let mut last = None;
        for statement in statements {
            last = self.eval_statement(statement, env)?;
        }
        Ok(last)
    }

    fn eval_block(&self, block: &Block, env: &Rc<Environment>) -> EvalResult {
        Ok(self
            .eval_statements(&block.statements, env)?
            .unwrap_or(Object::Null))
    }

    fn eval_statement(
        &self,
        statement: &Statement,
        env: &Rc<Environment>,
    ) -> EvalResult<Option<Object>> {
        match statement {
            Statement::Declare { name, value } => {
                let value = self.eval_expression(value, env)?;
                env.set(name.clone(), value);
                Ok(None)
            }
            Statement::Assign { name, value } => {
                let value = self.eval_expression(value, env)?;
                env.assign(name, value);
                Ok(None)
            }
            Statement::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval_expression(expr, env)?,
                    None => Object::Null,
                };
                Err(Flow::Return(value))
            }
            Statement::Expression(expr) => Ok(Some(self.eval_expression(expr, env)?)),
        }
    }

    fn eval_expression(&self, expr: &Expression, env: &Rc<Environment>) -> EvalResult {
        ensure_sufficient_stack(|| self.eval_expression_inner(expr, env))
    }

    fn eval_expression_inner(&self, expr: &Expression, env: &Rc<Environment>) -> EvalResult {
        match expr {
            Expression::Integer(n) => Ok(Object::Integer(*n)),
            Expression::String(s) => Ok(Object::String(s.clone())),
            Expression::Boolean(b) => Ok(Object::Boolean(*b)),
            Expression::Null => Ok(Object::Null),
            Expression::Identifier(name) => self.eval_identifier(name, env),
            Expression::Prefix { op, right } => {
                let right = self.eval_expression(right, env)?;
                self.eval_prefix(*op, right)
            }
            Expression::Binary { left, op, right } => {
                let left = self.eval_expression(left, env)?;
                let right = self.eval_expression(right, env)?;
                self.eval_binary(*op, left, right)
            }
            Expression::If {
                condition,
                consequence,
                alternative,
            } => {
                let condition = self.eval_expression(condition, env)?;
                let branch = if condition.is_truthy() {
                    Some(consequence)
                } else {
                    alternative.as_ref()
                };
                match branch {
                    Some(block) => self.eval_block(block, &Environment::new_enclosed(env)),
                    None => Ok(Object::Null),
                }
            }
            Expression::Function { params, body } => Ok(Object::Function(Rc::new(Function {
                params: params.clone(),
                body: Rc::clone(body),
                env: Rc::clone(env),
            }))),
            Expression::Call { callee, args } => {
                let callee = self.eval_expression(callee, env)?;
                let args = args
                    .iter()
                    .map(|arg| self.eval_expression(arg, env))
                    .collect::<EvalResult<Vec<_>>>()?;
                self.call_callable(callee, args)
            }
            Expression::Index { target, index } => {
                let target = self.eval_expression(target, env)?;
                let index = self.eval_expression(index, env)?;
                self.eval_index(target, index)
            }
            Expression::List(elements) => Ok(Object::list(self.eval_all(elements, env)?)),
            Expression::Tuple(elements) => Ok(Object::tuple(self.eval_all(elements, env)?)),
            Expression::Map(pairs) => {
                let mut map = BTreeMap::new();
                for (key_expr, value_expr) in pairs {
                    let key = self.eval_expression(key_expr, env)?;
                    let hashed = match key.map_key() {
                        Some(hashed) => hashed,
                        None => return error(format!("unusable as map key: {}", key.kind())),
                    };
                    let value = self.eval_expression(value_expr, env)?;
                    map.insert(hashed, MapPair { key, value });
                }
                Ok(Object::Map(Rc::new(map)))
            }
        }
    }

    fn eval_all(&self, exprs: &[Expression], env: &Rc<Environment>) -> EvalResult<Vec<Object>> {
        exprs
            .iter()
            .map(|expr| self.eval_expression(expr, env))
            .collect()
    }

    fn eval_identifier(&self, name: &str, env: &Rc<Environment>) -> EvalResult {
        if let Some(value) = env.get(name) {
            return Ok(value);
        }
        if let Some(builtin) = self.builtins.get(name) {
            tracing::trace!(name, "resolved builtin");
            return Ok(Object::Builtin(builtin));
        }
        error(format!("identifier not found: {}", name))
    }

    fn eval_prefix(&self, op: PrefixOperator, right: Object) -> EvalResult {
        match (op, &right) {
            (PrefixOperator::Not, _) => Ok(Object::Boolean(!right.is_truthy())),
            (PrefixOperator::Negate, Object::Integer(n)) => match n.checked_neg() {
                Some(negated) => Ok(Object::Integer(negated)),
                None => error(format!("integer overflow: -{}", n)),
            },
            (PrefixOperator::Negate, other) => {
                error(format!("unknown operator: -{}", other.kind()))
            }
        }
    }

    fn eval_binary(&self, op: BinaryOperator, left: Object, right: Object) -> EvalResult {
        match (&left, &right) {
            (Object::Integer(l), Object::Integer(r)) => self.eval_integer_binary(op, *l, *r),
            (Object::String(l), Object::String(r)) => match op {
                BinaryOperator::Add => Ok(Object::String(format!("{}{}", l, r))),
                BinaryOperator::Eq => Ok(Object::Boolean(l == r)),
                BinaryOperator::NotEq => Ok(Object::Boolean(l != r)),
                _ => error(format!("unknown operator: STRING {} STRING", op.symbol())),
            },
            _ if op == BinaryOperator::Eq => Ok(Object::Boolean(left == right)),
            _ if op == BinaryOperator::NotEq => Ok(Object::Boolean(left != right)),
            _ if left.kind() != right.kind() => error(format!(
                "type mismatch: {} {} {}",
                left.kind(),
                op.symbol(),
                right.kind()
            )),
            _ => error(format!(
                "unknown operator: {} {} {}",
                left.kind(),
                op.symbol(),
                right.kind()
            )),
        }
    }

    /// Checked 64-bit arithmetic: overflow is an error, never a wrap.
    fn eval_integer_binary(&self, op: BinaryOperator, l: i64, r: i64) -> EvalResult {
        let checked = match op {
            BinaryOperator::Add => l.checked_add(r),
            BinaryOperator::Sub => l.checked_sub(r),
            BinaryOperator::Mul => l.checked_mul(r),
            BinaryOperator::Div | BinaryOperator::Rem if r == 0 => {
                return error("division by zero")
            }
            BinaryOperator::Div => l.checked_div(r),
            BinaryOperator::Rem => l.checked_rem(r),
            BinaryOperator::Eq => return Ok(Object::Boolean(l == r)),
            BinaryOperator::NotEq => return Ok(Object::Boolean(l != r)),
            BinaryOperator::LessThan => return Ok(Object::Boolean(l < r)),
            BinaryOperator::LessThanEq => return Ok(Object::Boolean(l <= r)),
            BinaryOperator::GreaterThan => return Ok(Object::Boolean(l > r)),
            BinaryOperator::GreaterThanEq => return Ok(Object::Boolean(l >= r)),
        };
        match checked {
            Some(n) => Ok(Object::Integer(n)),
            None => error(format!("integer overflow: {} {} {}", l, op.symbol(), r)),
        }
    }

    fn eval_index(&self, target: Object, index: Object) -> EvalResult {
        match (&target, &index) {
            (Object::List(elements) | Object::Tuple(elements), Object::Integer(i)) => {
                match usize::try_from(*i).ok().and_then(|i| elements.get(i)) {
                    Some(element) => Ok(element.clone()),
                    None => error(format!(
                        "index out of range: {} (len {})",
                        i,
                        elements.len()
                    )),
                }
            }
            (Object::List(_) | Object::Tuple(_), other) => error(format!(
                "index operator not supported: {}[{}]",
                target.kind(),
                other.kind()
            )),
            (Object::Map(pairs), _) => match index.map_key() {
                Some(key) => Ok(pairs
                    .get(&key)
                    .map(|pair| pair.value.clone())
                    .unwrap_or(Object::Null)),
                None => error(format!("unusable as map key: {}", index.kind())),
            },
            _ => error(format!("index operator not supported: {}", target.kind())),
        }
    }

    #[tracing::instrument(level = "debug", skip_all, fields(callee = %callee.kind(), arity = args.len()))]
    fn call_callable(&self, callee: Object, args: Vec<Object>) -> EvalResult {
        match callee {
            Object::Function(func) => self.call_function(&func, args),
            Object::Builtin(builtin) => {
                tracing::trace!(name = builtin.name, "dispatching builtin");
                let mut output = self.output.borrow_mut();
                builtin.call(&mut *output, args)
            }
            other => error(format!("not a function: {}", other.kind())),
        }
    }

    fn call_function(&self, func: &Function, args: Vec<Object>) -> EvalResult {
        if args.len() != func.params.len() {
            return error(format!(
                "wrong number of arguments: want={}, got={}",
                func.params.len(),
                args.len()
            ));
        }
        let depth = self.depth.get();
        if depth >= self.max_call_depth {
            return error(format!(
                "maximum call depth exceeded ({})",
                self.max_call_depth
            ));
        }

        let env = Environment::new_enclosed(&func.env);
        for (param, arg) in func.params.iter().zip(args) {
            env.set(param.clone(), arg);
        }

        self.depth.set(depth + 1);
        let result = self.eval_block(&func.body, &env);
        self.depth.set(depth);

        match result {
            Err(Flow::Return(value)) => Ok(value),
            other => other,
        }
    }
}
