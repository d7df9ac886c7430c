//! Amount parsing for the expense table.
//!
//! An amount cell holds either a plain digit string (`12000`, `12,000`) or a spreadsheet-style
//! formula prefixed with `=` (`=12000+3500`). Formulas are restricted to digits, `.`, the four
//! arithmetic operators and parentheses, and are evaluated with the usual precedence rules.
//!
//! Division by zero evaluates to `0` rather than failing, so a half-typed `=10/0` does not turn
//! the cell into an error.

use format_num::format_num;

/// Returns true if `s`, once trimmed, starts with `=`.
pub fn is_formula(s: &str) -> bool {
    s.trim().starts_with('=')
}

/// Evaluates a restricted arithmetic expression such as `=10+2*3`.
///
/// Returns `None` when the input contains anything other than digits, `.`, `+ - * /` and
/// parentheses, when the expression is malformed, or when the result is not finite.
///
/// ```
/// # use hodol_ledger::formula::evaluate;
/// assert_eq!(evaluate("=10+2*3"), Some(16.0));
/// assert_eq!(evaluate("=(10+2)*3"), Some(36.0));
/// assert_eq!(evaluate("=10/0"), Some(0.0));
/// assert_eq!(evaluate("=10+"), None);
/// ```
pub fn evaluate(input: &str) -> Option<f64> {
    let trimmed = input.trim();
    let body = trimmed.strip_prefix('=').unwrap_or(trimmed);
    let expr: String = body.chars().filter(|c| !c.is_whitespace()).collect();
    if expr.is_empty() || !expr.chars().all(is_formula_char) {
        return None;
    }
    let tokens = tokenize(&expr)?;
    let mut parser = Parser { tokens, pos: 0 };
    let value = parser.expr()?;
    if parser.pos != parser.tokens.len() || !value.is_finite() {
        return None;
    }
    Some(value)
}

/// Resolves the display value of an amount cell into a number.
///
/// Formulas go through [`evaluate`]. Anything else must be a non-negative integer, optionally
/// with `,` thousands separators. Empty input resolves to `None`.
pub fn resolve_amount(display: &str) -> Option<f64> {
    if is_formula(display) {
        return evaluate(display);
    }
    let digits = display.trim().replace(',', "");
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    digits
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
}

/// Formats an integer amount with thousands separators, e.g. `12000` -> `12,000`.
pub fn format_amount(amount: i64) -> String {
    format_num!(",d", amount as f64)
}

fn is_formula_char(c: char) -> bool {
    c.is_ascii_digit() || matches!(c, '+' | '-' | '*' | '/' | '(' | ')' | '.')
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Token {
    Num(f64),
    Plus,
    Minus,
    Star,
    Slash,
    Open,
    Close,
}

fn tokenize(expr: &str) -> Option<Vec<Token>> {
    let chars: Vec<char> = expr.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_ascii_digit() || c == '.' {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            let literal: String = chars[start..i].iter().collect();
            tokens.push(Token::Num(literal.parse().ok()?));
            continue;
        }
        tokens.push(match c {
            '+' => Token::Plus,
            '-' => Token::Minus,
            '*' => Token::Star,
            '/' => Token::Slash,
            '(' => Token::Open,
            ')' => Token::Close,
            _ => return None,
        });
        i += 1;
    }
    Some(tokens)
}

/// Recursive descent over the token list. Every production returns `None` on malformed input.
struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.pos).copied()
    }

    fn expr(&mut self) -> Option<f64> {
        let mut left = self.term()?;
        while let Some(op @ (Token::Plus | Token::Minus)) = self.peek() {
            self.pos += 1;
            let right = self.term()?;
            left = if op == Token::Plus {
                left + right
            } else {
                left - right
            };
        }
        Some(left)
    }

    fn term(&mut self) -> Option<f64> {
        let mut left = self.factor()?;
        while let Some(op @ (Token::Star | Token::Slash)) = self.peek() {
            self.pos += 1;
            let right = self.factor()?;
            left = match op {
                Token::Star => left * right,
                _ if right == 0.0 => 0.0,
                _ => left / right,
            };
        }
        Some(left)
    }

    fn factor(&mut self) -> Option<f64> {
        match self.peek()? {
            Token::Num(value) => {
                self.pos += 1;
                Some(value)
            }
            Token::Open => {
                self.pos += 1;
                let value = self.expr()?;
                if self.peek()? != Token::Close {
                    return None;
                }
                self.pos += 1;
                Some(value)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evaluate_precedence() {
        assert_eq!(evaluate("=10+2*3"), Some(16.0));
        assert_eq!(evaluate("=(10+2)*3"), Some(36.0));
        assert_eq!(evaluate("=100-20-30"), Some(50.0));
        assert_eq!(evaluate("=100/4/5"), Some(5.0));
    }

    #[test]
    fn test_evaluate_division_by_zero_is_zero() {
        assert_eq!(evaluate("=10/0"), Some(0.0));
        assert_eq!(evaluate("=5+10/(3-3)"), Some(5.0));
    }

    #[test]
    fn test_evaluate_malformed() {
        assert_eq!(evaluate("=10+"), None);
        assert_eq!(evaluate("=(10+2"), None);
        assert_eq!(evaluate("=10+2)"), None);
        assert_eq!(evaluate("=()"), None);
        assert_eq!(evaluate("="), None);
        assert_eq!(evaluate("=1.2.3"), None);
        assert_eq!(evaluate("=-5"), None);
        assert_eq!(evaluate("=2(3)"), None);
    }

    #[test]
    fn test_evaluate_rejects_other_characters() {
        assert_eq!(evaluate("=10+a"), None);
        assert_eq!(evaluate("=10%3"), None);
        assert_eq!(evaluate("=1,000+1"), None);
    }

    #[test]
    fn test_evaluate_whitespace_and_decimals() {
        assert_eq!(evaluate("  = 10 + 2 "), Some(12.0));
        assert_eq!(evaluate("=1.5*2"), Some(3.0));
        assert_eq!(evaluate("10+2"), Some(12.0));
    }

    #[test]
    fn test_evaluate_non_finite_is_none() {
        let huge = format!("={}*{}", "9".repeat(200), "9".repeat(200));
        assert_eq!(evaluate(&huge), None);
    }

    #[test]
    fn test_is_formula() {
        assert!(is_formula("=1+1"));
        assert!(is_formula("  =1"));
        assert!(!is_formula("10+2"));
        assert!(!is_formula(""));
    }

    #[test]
    fn test_resolve_amount() {
        assert_eq!(resolve_amount("12000"), Some(12000.0));
        assert_eq!(resolve_amount("12,000"), Some(12000.0));
        assert_eq!(resolve_amount(" 500 "), Some(500.0));
        assert_eq!(resolve_amount(""), None);
        assert_eq!(resolve_amount("   "), None);
        assert_eq!(resolve_amount("=1000*3"), Some(3000.0));
        assert_eq!(resolve_amount("0"), Some(0.0));
    }

    #[test]
    fn test_resolve_amount_plain_text_is_not_a_formula() {
        assert_eq!(resolve_amount("10+2"), None);
        assert_eq!(resolve_amount("-500"), None);
        assert_eq!(resolve_amount("12.5"), None);
        assert_eq!(resolve_amount("abc"), None);
    }

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(12000), "12,000");
        assert_eq!(format_amount(999), "999");
        assert_eq!(format_amount(1234567), "1,234,567");
    }
}
