use std::fmt;
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub statements: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Block {
    pub statements: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// `name := value`, always binds in the current scope.
    Declare { name: String, value: Expression },
    /// `name = value`, rebinds the nearest enclosing binding.
    Assign { name: String, value: Expression },
    Return(Option<Expression>),
    Expression(Expression),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Integer(i64),
    String(String),
    Boolean(bool),
    Null,
    Identifier(String),
    Prefix {
        op: PrefixOperator,
        right: Box<Expression>,
    },
    Binary {
        left: Box<Expression>,
        op: BinaryOperator,
        right: Box<Expression>,
    },
    If {
        condition: Box<Expression>,
        consequence: Block,
        alternative: Option<Block>,
    },
    Function {
        params: Vec<String>,
        body: Rc<Block>,
    },
    Call {
        callee: Box<Expression>,
        args: Vec<Expression>,
    },
    Index {
        target: Box<Expression>,
        index: Box<Expression>,
    },
    List(Vec<Expression>),
    Tuple(Vec<Expression>),
    Map(Vec<(Expression, Expression)>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefixOperator {
    Not,
    Negate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    NotEq,
    LessThan,
    LessThanEq,
    GreaterThan,
    GreaterThanEq,
}

impl BinaryOperator {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOperator::Add => "+",
            BinaryOperator::Sub => "-",
            BinaryOperator::Mul => "*",
            BinaryOperator::Div => "/",
            BinaryOperator::Rem => "%",
            BinaryOperator::Eq => "==",
            BinaryOperator::NotEq => "!=",
            BinaryOperator::LessThan => "<",
            BinaryOperator::LessThanEq => "<=",
            BinaryOperator::GreaterThan => ">",
            BinaryOperator::GreaterThanEq => ">=",
        }
    }
}

impl PrefixOperator {
    pub fn symbol(self) -> &'static str {
        match self {
            PrefixOperator::Not => "!",
            PrefixOperator::Negate => "-",
        }
    }
}

// Source-form rendering, used when a function object is displayed.

fn join<T: fmt::Display>(items: &[T], sep: &str) -> String {
    items
        .iter()
        .map(|item| item.to_string())
        .collect::<Vec<_>>()
        .join(sep)
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", join(&self.statements, "\n"))
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", join(&self.statements, "; "))
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Statement::Declare { name, value } => write!(f, "{} := {}", name, value),
            Statement::Assign { name, value } => write!(f, "{} = {}", name, value),
            Statement::Return(Some(value)) => write!(f, "return {}", value),
            Statement::Return(None) => write!(f, "return"),
            Statement::Expression(expr) => write!(f, "{}", expr),
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Integer(n) => write!(f, "{}", n),
            Expression::String(s) => write!(f, "{:?}", s),
            Expression::Boolean(b) => write!(f, "{}", b),
            Expression::Null => write!(f, "null"),
            Expression::Identifier(name) => write!(f, "{}", name),
            Expression::Prefix { op, right } => write!(f, "({}{})", op.symbol(), right),
            Expression::Binary { left, op, right } => {
                write!(f, "({} {} {})", left, op.symbol(), right)
            }
            Expression::If {
                condition,
                consequence,
                alternative,
            } => {
                write!(f, "if {} {{ {} }}", condition, consequence)?;
                if let Some(alternative) = alternative {
                    write!(f, " else {{ {} }}", alternative)?;
                }
                Ok(())
            }
            Expression::Function { params, body } => {
                write!(f, "fn({}) {{ {} }}", params.join(", "), body)
            }
            Expression::Call { callee, args } => write!(f, "{}({})", callee, join(args, ", ")),
            Expression::Index { target, index } => write!(f, "({}[{}])", target, index),
            Expression::List(elements) => write!(f, "[{}]", join(elements, ", ")),
            Expression::Tuple(elements) if elements.len() == 1 => {
                write!(f, "({},)", elements[0])
            }
            Expression::Tuple(elements) => write!(f, "({})", join(elements, ", ")),
            Expression::Map(pairs) => {
                let pairs = pairs
                    .iter()
                    .map(|(key, value)| format!("{}: {}", key, value))
                    .collect::<Vec<_>>();
                write!(f, "{{{}}}", pairs.join(", "))
            }
        }
    }
}
