//! Arithmetic evaluation for quantity input fields.
//!
//! Users may type `12+2-3*2` into a quantity box instead of doing the math
//! themselves. Supported: non-negative integer literals, `+ - * /` and the
//! glyphs `x`, `X`, `×` (multiply) and `÷` (divide). No parentheses.
//!
//! A `+` or `-` at the start of the expression or right after another
//! operator gets an implicit `0` in front of it. That makes `-3+2` mean
//! `0-3+2`, but also makes `3*-2` mean `3*0-2` rather than `3*(-2)`.

/// Expression token after glyph normalization.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Token {
    Number(i64),
    Op(char),
}

fn normalize_glyphs(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| match c {
            'x' | 'X' | '×' => '*',
            '÷' => '/',
            other => other,
        })
        .collect()
}

/// Splits into numbers and operators; `None` on any other character.
///
/// Literals too large for `i64` saturate; the result is clamped anyway.
fn tokenize(expr: &str) -> Option<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut number: Option<i64> = None;

    for c in expr.chars() {
        match c {
            '0'..='9' => {
                let digit = i64::from(c as u8 - b'0');
                let current = number.unwrap_or(0);
                number = Some(current.saturating_mul(10).saturating_add(digit));
            }
            '+' | '-' | '*' | '/' => {
                if let Some(value) = number.take() {
                    tokens.push(Token::Number(value));
                }
                tokens.push(Token::Op(c));
            }
            _ => return None,
        }
    }
    if let Some(value) = number {
        tokens.push(Token::Number(value));
    }
    Some(tokens)
}

/// Inserts the implicit `0` before leading or doubled `+`/`-`.
fn insert_implicit_zeros(tokens: Vec<Token>) -> Vec<Token> {
    let mut out = Vec::with_capacity(tokens.len() + 2);
    for token in tokens {
        if let Token::Op('+' | '-') = token {
            if matches!(out.last(), None | Some(Token::Op(_))) {
                out.push(Token::Number(0));
            }
        }
        out.push(token);
    }
    out
}

/// Checks the `number (op number)*` shape.
fn is_well_formed(tokens: &[Token]) -> bool {
    if tokens.len() % 2 == 0 {
        return false;
    }
    tokens.iter().enumerate().all(|(i, token)| match token {
        Token::Number(_) => i % 2 == 0,
        Token::Op(_) => i % 2 == 1,
    })
}

fn apply(lhs: i64, op: char, rhs: i64) -> Option<i64> {
    match op {
        '+' => Some(lhs.saturating_add(rhs)),
        '-' => Some(lhs.saturating_sub(rhs)),
        '*' => Some(lhs.saturating_mul(rhs)),
        // i64 division truncates toward zero.
        '/' => lhs.checked_div(rhs),
        _ => None,
    }
}

/// Two passes: `*` and `/` first, then `+` and `-`, both left to right.
fn reduce(tokens: &[Token]) -> Option<i64> {
    let mut additive: Vec<(char, i64)> = Vec::new();
    let Token::Number(first) = *tokens.first()? else {
        return None;
    };
    let mut pending_op = '+';
    let mut term = first;

    for pair in tokens[1..].chunks(2) {
        let (Token::Op(op), Token::Number(value)) = (pair[0], *pair.get(1)?) else {
            return None;
        };
        match op {
            '*' | '/' => term = apply(term, op, value)?,
            _ => {
                additive.push((pending_op, term));
                pending_op = op;
                term = value;
            }
        }
    }
    additive.push((pending_op, term));

    additive
        .into_iter()
        .try_fold(0i64, |acc, (op, value)| apply(acc, op, value))
}

/// Evaluates a quantity expression and clamps it into `[min, max]`.
///
/// Returns `Some("")` for blank input, `None` for anything that is not a
/// well-formed expression or divides by zero. On `None` the caller keeps
/// the last committed value.
///
/// # Examples
/// ```
/// use fridge_inventory::expression::evaluate;
///
/// assert_eq!(evaluate("12+2-3*2", 0, 999).as_deref(), Some("8"));
/// assert_eq!(evaluate("5×3", 0, 10).as_deref(), Some("10"));
/// assert_eq!(evaluate("12/0", 0, 999), None);
/// ```
pub fn evaluate(text: &str, min: i64, max: i64) -> Option<String> {
    let expr = normalize_glyphs(text);
    if expr.is_empty() {
        return Some(String::new());
    }

    let tokens = insert_implicit_zeros(tokenize(&expr)?);
    if !is_well_formed(&tokens) {
        return None;
    }

    let value = reduce(&tokens)?;
    Some(value.max(min).min(max).to_string())
}

/// State of a single quantity input box.
///
/// Holds the last committed value; edits that fail to evaluate revert to it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QuantityInput {
    committed: i64,
    min: i64,
    max: i64,
}

impl QuantityInput {
    /// `min` must not exceed `max`; the initial value is clamped into range.
    pub fn new(value: i64, min: i64, max: i64) -> Result<Self, crate::model::ValidationError> {
        if min > max {
            return Err(crate::model::ValidationError::InvalidRange { min, max });
        }
        Ok(Self {
            committed: value.clamp(min, max),
            min,
            max,
        })
    }

    pub fn value(&self) -> i64 {
        self.committed
    }

    /// Evaluates `text` on blur or Enter.
    ///
    /// Invalid and blank input leave the committed value untouched. Returns
    /// the text the input box should show afterwards.
    pub fn commit(&mut self, text: &str) -> String {
        match evaluate(text, self.min, self.max) {
            Some(result) if !result.is_empty() => {
                if let Ok(value) = result.parse::<i64>() {
                    self.committed = value;
                }
            }
            _ => {}
        }
        self.committed.to_string()
    }

    pub fn increment(&mut self) -> i64 {
        self.committed = self.committed.saturating_add(1).min(self.max);
        self.committed
    }

    pub fn decrement(&mut self) -> i64 {
        self.committed = self.committed.saturating_sub(1).max(self.min);
        self.committed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(text: &str) -> Option<String> {
        evaluate(text, 0, 999)
    }

    #[test]
    fn respects_operator_precedence() {
        assert_eq!(eval("12+2-3*2").as_deref(), Some("8"));
        assert_eq!(eval("2+3*4-6/2").as_deref(), Some("11"));
        assert_eq!(eval("100/10/2").as_deref(), Some("5"));
        assert_eq!(eval("10-2-3").as_deref(), Some("5"));
    }

    #[test]
    fn blank_input_is_empty_not_invalid() {
        assert_eq!(eval("").as_deref(), Some(""));
        assert_eq!(eval("   ").as_deref(), Some(""));
    }

    #[test]
    fn division_by_zero_is_invalid() {
        assert_eq!(eval("12/0"), None);
        assert_eq!(eval("1+4/0*2"), None);
    }

    #[test]
    fn result_is_clamped() {
        assert_eq!(evaluate("5*3", 0, 10).as_deref(), Some("10"));
        assert_eq!(evaluate("2-9", 0, 10).as_deref(), Some("0"));
        assert_eq!(evaluate("2-9", -100, 10).as_deref(), Some("-7"));
    }

    #[test]
    fn rejects_foreign_characters() {
        assert_eq!(eval("abc"), None);
        assert_eq!(eval("3.5"), None);
        assert_eq!(eval("(1+2)"), None);
        assert_eq!(eval("2^3"), None);
    }

    #[test]
    fn accepts_alternate_glyphs_and_whitespace() {
        assert_eq!(eval("4 x 3").as_deref(), Some("12"));
        assert_eq!(eval("4X3").as_deref(), Some("12"));
        assert_eq!(eval("4×3").as_deref(), Some("12"));
        assert_eq!(eval("12 ÷ 4").as_deref(), Some("3"));
    }

    #[test]
    fn division_truncates_toward_zero() {
        assert_eq!(eval("7/2").as_deref(), Some("3"));
        assert_eq!(evaluate("0-7/2", -100, 100).as_deref(), Some("-3"));
        assert_eq!(evaluate("-7/2", -100, 100).as_deref(), Some("-3"));
    }

    #[test]
    fn leading_sign_gets_implicit_zero() {
        assert_eq!(evaluate("-3+2", -10, 10).as_deref(), Some("-1"));
        assert_eq!(eval("+5").as_deref(), Some("5"));
        assert_eq!(evaluate("3--2", -10, 10).as_deref(), Some("1"));
    }

    #[test]
    fn minus_after_multiplication_is_binary_minus_after_zero() {
        // 3*-2 reads as 3*0-2, not 3*(-2).
        assert_eq!(evaluate("3*-2", -10, 10).as_deref(), Some("-2"));
        // 8/-2 reads as 8/0-2 and therefore divides by zero.
        assert_eq!(evaluate("8/-2", -10, 10), None);
        assert_eq!(evaluate("3*+2", -10, 10).as_deref(), Some("2"));
    }

    #[test]
    fn malformed_expressions_are_invalid() {
        assert_eq!(eval("3+"), None);
        assert_eq!(eval("*3"), None);
        assert_eq!(eval("3**2"), None);
        assert_eq!(eval("3*/2"), None);
        assert_eq!(eval("-"), None);
    }

    #[test]
    fn huge_literals_saturate_then_clamp() {
        assert_eq!(eval("99999999999999999999999").as_deref(), Some("999"));
    }

    #[test]
    fn quantity_input_reverts_on_invalid_text() {
        let mut input = QuantityInput::new(5, 0, 20).unwrap();
        assert_eq!(input.commit("2*4"), "8");
        assert_eq!(input.commit("oops"), "8");
        assert_eq!(input.commit(""), "8");
        assert_eq!(input.commit("9/0"), "8");
        assert_eq!(input.commit("100"), "20");
        assert_eq!(input.value(), 20);
    }

    #[test]
    fn quantity_input_steps_are_clamped() {
        let mut input = QuantityInput::new(1, 0, 2).unwrap();
        assert_eq!(input.decrement(), 0);
        assert_eq!(input.decrement(), 0);
        assert_eq!(input.increment(), 1);
        assert_eq!(input.increment(), 2);
        assert_eq!(input.increment(), 2);
    }

    #[test]
    fn quantity_input_rejects_inverted_range() {
        assert!(QuantityInput::new(0, 5, 1).is_err());
    }
}
