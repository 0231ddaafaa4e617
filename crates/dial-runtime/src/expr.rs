use dial_core::Value;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EvalError {
    #[error("Invalid operation, '{op}' is missing an operand.")]
    StackUnderflow { op: &'static str },
    #[error("Operator '{op}' can't be applied to text.")]
    TextOperator { op: &'static str },
    #[error("Substring start {start} is outside of a text with {len} characters.")]
    SubstrStart { start: i64, len: usize },
    #[error("Mismatched parentheses.")]
    MismatchedParentheses,
    #[error("Lone comma outside of function parentheses.")]
    LoneComma,
    #[error("Assignment operator '{op}' can't be used inside an expression.")]
    AssignmentInExpression { op: String },
}

impl EvalError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::StackUnderflow { .. } => "EXPR_STACK_UNDERFLOW",
            Self::TextOperator { .. } => "EXPR_TEXT_OPERATOR",
            Self::SubstrStart { .. } => "EXPR_SUBSTR_START",
            Self::MismatchedParentheses => "EXPR_PARENTHESES",
            Self::LoneComma => "EXPR_LONE_COMMA",
            Self::AssignmentInExpression { .. } => "EXPR_ASSIGNMENT",
        }
    }
}

pub trait EvalContext {
    fn resolve(&mut self, name: &str) -> Value;
    fn warn(&mut self, code: &'static str, message: String);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Or,
    And,
    Eq,
    Neq,
    Gt,
    Ge,
    Lt,
    Le,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Not,
    Len,
    Str,
    Min,
    Max,
    Substr,
}

impl Operator {
    fn parse(text: &str) -> Option<Self> {
        let op = match text {
            "OR" => Self::Or,
            "AND" => Self::And,
            "==" => Self::Eq,
            "!=" => Self::Neq,
            ">" => Self::Gt,
            ">=" => Self::Ge,
            "<" => Self::Lt,
            "<=" => Self::Le,
            "+" => Self::Add,
            "-" => Self::Sub,
            "*" => Self::Mul,
            "/" => Self::Div,
            "%" => Self::Mod,
            "^" => Self::Pow,
            "NOT" => Self::Not,
            "LEN" => Self::Len,
            "STR" => Self::Str,
            "MIN" => Self::Min,
            "MAX" => Self::Max,
            "SUBSTR" => Self::Substr,
            _ => return None,
        };
        Some(op)
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Self::Or => "OR",
            Self::And => "AND",
            Self::Eq => "==",
            Self::Neq => "!=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Mod => "%",
            Self::Pow => "^",
            Self::Not => "NOT",
            Self::Len => "LEN",
            Self::Str => "STR",
            Self::Min => "MIN",
            Self::Max => "MAX",
            Self::Substr => "SUBSTR",
        }
    }

    fn precedence(self) -> u8 {
        match self {
            Self::Or => 1,
            Self::And => 2,
            Self::Eq | Self::Neq | Self::Gt | Self::Ge | Self::Lt | Self::Le => 3,
            Self::Add | Self::Sub => 4,
            Self::Mul | Self::Div | Self::Mod => 5,
            Self::Pow => 6,
            Self::Not | Self::Len | Self::Str | Self::Min | Self::Max | Self::Substr => 7,
        }
    }

    fn is_function(self) -> bool {
        matches!(
            self,
            Self::Not | Self::Len | Self::Str | Self::Min | Self::Max | Self::Substr
        )
    }

    fn is_right_associative(self) -> bool {
        self.is_function() || matches!(self, Self::Pow | Self::And | Self::Or)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Set,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
}

impl AssignOp {
    pub fn parse(text: &str) -> Option<Self> {
        let op = match text {
            "=" => Self::Set,
            "+=" => Self::Add,
            "-=" => Self::Sub,
            "*=" => Self::Mul,
            "/=" => Self::Div,
            "%=" => Self::Mod,
            "^=" => Self::Pow,
            _ => return None,
        };
        Some(op)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Postfix {
    Operand(String),
    Apply(Operator),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pending {
    Op(Operator),
    Paren,
}

fn needs_space(current: char, next: char, after: Option<char>) -> bool {
    (current == '(' && next != ' ')
        || (current != ' ' && current != '!' && next == '(')
        || (current != ' ' && next == '!' && after == Some('('))
        || (current != ' ' && next == ')')
        || (current == ')' && next != ' ')
        || (current != ' ' && next == ',')
        || (current == ',' && next != ' ')
}

pub fn split_segments(text: &str) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let mut spaced = String::with_capacity(text.len() + 8);
    let mut in_quote = false;
    for (i, &current) in chars.iter().enumerate() {
        spaced.push(current);
        if current == '"' {
            in_quote = !in_quote;
        }
        let Some(&next) = chars.get(i + 1) else {
            continue;
        };
        if !in_quote && needs_space(current, next, chars.get(i + 2).copied()) {
            spaced.push(' ');
        }
    }

    let mut segments = Vec::new();
    let mut segment = String::new();
    in_quote = false;
    for ch in spaced.chars() {
        if ch == '"' {
            in_quote = !in_quote;
        }
        if ch == ' ' && !in_quote {
            if !segment.is_empty() {
                segments.push(std::mem::take(&mut segment));
            }
            continue;
        }
        segment.push(ch);
    }
    if !segment.is_empty() {
        segments.push(segment);
    }
    segments
}

fn to_postfix(segments: &[String]) -> Result<Vec<Postfix>, EvalError> {
    let mut output = Vec::with_capacity(segments.len());
    let mut pending: Vec<Pending> = Vec::new();

    for segment in segments {
        match segment.as_str() {
            "(" => pending.push(Pending::Paren),
            "!(" => {
                pending.push(Pending::Op(Operator::Not));
                pending.push(Pending::Paren);
            }
            ")" => {
                while let Some(Pending::Op(op)) = pending.last().copied() {
                    output.push(Postfix::Apply(op));
                    pending.pop();
                }
                if pending.pop().is_none() {
                    return Err(EvalError::MismatchedParentheses);
                }
                if let Some(Pending::Op(op)) = pending.last().copied() {
                    if op.is_function() {
                        output.push(Postfix::Apply(op));
                        pending.pop();
                    }
                }
            }
            "," => {
                while let Some(Pending::Op(op)) = pending.last().copied() {
                    output.push(Postfix::Apply(op));
                    pending.pop();
                }
                if pending.is_empty() {
                    return Err(EvalError::LoneComma);
                }
            }
            text => match Operator::parse(text) {
                Some(op) if op.is_function() => pending.push(Pending::Op(op)),
                Some(op) => {
                    while let Some(Pending::Op(top)) = pending.last().copied() {
                        let outranks = top.precedence() > op.precedence()
                            || (top.precedence() == op.precedence() && !op.is_right_associative());
                        if !outranks {
                            break;
                        }
                        output.push(Postfix::Apply(top));
                        pending.pop();
                    }
                    pending.push(Pending::Op(op));
                }
                None if AssignOp::parse(text).is_some() => {
                    return Err(EvalError::AssignmentInExpression {
                        op: text.to_string(),
                    })
                }
                None => output.push(Postfix::Operand(text.to_string())),
            },
        }
    }

    while let Some(top) = pending.pop() {
        match top {
            Pending::Op(op) => output.push(Postfix::Apply(op)),
            Pending::Paren => return Err(EvalError::MismatchedParentheses),
        }
    }
    Ok(output)
}

pub fn read_operand(text: &str, ctx: &mut dyn EvalContext) -> Value {
    let (negated, body) = match text.strip_prefix('!') {
        Some(rest) => (true, rest),
        None => (false, text),
    };

    let value = if let Ok(number) = body.parse::<i64>() {
        Value::Int(number)
    } else if body.len() >= 2 && body.starts_with('"') && body.ends_with('"') {
        Value::Text(body[1..body.len() - 1].to_string())
    } else if let Some(name) = body.strip_prefix('-') {
        match ctx.resolve(name) {
            Value::Int(number) => Value::Int(number.wrapping_neg()),
            text => text,
        }
    } else {
        ctx.resolve(body)
    };

    if negated {
        Value::from(!value.is_truthy())
    } else {
        value
    }
}

pub(crate) fn int_pow(base: i64, exponent: i64) -> i64 {
    if exponent < 0 {
        return match base {
            1 => 1,
            -1 if exponent % 2 == 0 => 1,
            -1 => -1,
            _ => 0,
        };
    }
    let exponent = u32::try_from(exponent).unwrap_or(u32::MAX);
    base.wrapping_pow(exponent)
}

fn pop(stack: &mut Vec<Value>, op: Operator) -> Result<Value, EvalError> {
    stack
        .pop()
        .ok_or(EvalError::StackUnderflow { op: op.symbol() })
}

fn apply_unary(op: Operator, operand: Value) -> Value {
    match op {
        Operator::Not => Value::from(!operand.is_truthy()),
        Operator::Len => Value::Int(operand.to_string().chars().count() as i64),
        _ => Value::Text(operand.to_string()),
    }
}

fn apply_substr(length: Value, start: Value, source: Value) -> Result<Value, EvalError> {
    let op = Operator::Substr.symbol();
    let length = length.as_int().ok_or(EvalError::TextOperator { op })?;
    let start = start.as_int().ok_or(EvalError::TextOperator { op })?;
    let chars: Vec<char> = source.to_string().chars().collect();
    if start < 0 || start as usize > chars.len() {
        return Err(EvalError::SubstrStart {
            start,
            len: chars.len(),
        });
    }
    let start = start as usize;
    let end = if length < 0 {
        chars.len()
    } else {
        start.saturating_add(length as usize).min(chars.len())
    };
    Ok(Value::Text(chars[start..end].iter().collect()))
}

// `top` was popped first. Right-associative operators take it as the left
// operand, every other operator as the right one.
fn apply_binary(
    op: Operator,
    top: Value,
    below: Value,
    ctx: &mut dyn EvalContext,
) -> Result<Value, EvalError> {
    if top.is_text() || below.is_text() {
        return match op {
            Operator::Add => Ok(Value::Text(format!("{}{}", below, top))),
            Operator::Eq => Ok(Value::from(below.to_string() == top.to_string())),
            Operator::Neq => Ok(Value::from(below.to_string() != top.to_string())),
            _ => Err(EvalError::TextOperator { op: op.symbol() }),
        };
    }

    let top = top.as_int().unwrap_or_default();
    let below = below.as_int().unwrap_or_default();
    let (left, right) = if op.is_right_associative() {
        (top, below)
    } else {
        (below, top)
    };

    let result = match op {
        Operator::Or => i64::from(left != 0 || right != 0),
        Operator::And => i64::from(left != 0 && right != 0),
        Operator::Eq => i64::from(left == right),
        Operator::Neq => i64::from(left != right),
        Operator::Gt => i64::from(left > right),
        Operator::Ge => i64::from(left >= right),
        Operator::Lt => i64::from(left < right),
        Operator::Le => i64::from(left <= right),
        Operator::Add => left.wrapping_add(right),
        Operator::Sub => left.wrapping_sub(right),
        Operator::Mul => left.wrapping_mul(right),
        Operator::Div | Operator::Mod if right == 0 => {
            ctx.warn(
                "EXPR_DIVISION_BY_ZERO",
                format!("Division by zero in '{} {} {}'.", left, op.symbol(), right),
            );
            0
        }
        Operator::Div => left.wrapping_div(right),
        Operator::Mod => left.wrapping_rem(right),
        Operator::Pow => int_pow(left, right),
        Operator::Min => left.min(right),
        Operator::Max => left.max(right),
        Operator::Not | Operator::Len | Operator::Str | Operator::Substr => {
            return Ok(apply_unary(op, Value::Int(top)))
        }
    };
    Ok(Value::Int(result))
}

pub fn evaluate(segments: &[String], ctx: &mut dyn EvalContext) -> Result<Value, EvalError> {
    let postfix = to_postfix(segments)?;
    let mut stack: Vec<Value> = Vec::with_capacity(postfix.len());

    for item in postfix {
        match item {
            Postfix::Operand(text) => stack.push(read_operand(&text, ctx)),
            Postfix::Apply(op @ (Operator::Not | Operator::Len | Operator::Str)) => {
                let operand = pop(&mut stack, op)?;
                stack.push(apply_unary(op, operand));
            }
            Postfix::Apply(Operator::Substr) => {
                let length = pop(&mut stack, Operator::Substr)?;
                let start = pop(&mut stack, Operator::Substr)?;
                let source = pop(&mut stack, Operator::Substr)?;
                stack.push(apply_substr(length, start, source)?);
            }
            Postfix::Apply(op) => {
                let top = pop(&mut stack, op)?;
                let below = pop(&mut stack, op)?;
                stack.push(apply_binary(op, top, below, ctx)?);
            }
        }
    }

    Ok(stack.pop().unwrap_or_default())
}
