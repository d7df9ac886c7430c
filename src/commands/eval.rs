use crate::args::EvalArgs;
use crate::commands::Out;
use crate::formula::{format_amount, is_formula, resolve_amount};
use crate::Result;
use anyhow::bail;

/// Resolves an amount the way an amount cell does and shows what would be saved.
pub fn eval(args: &EvalArgs) -> Result<Out<i64>> {
    let input = args.expression();
    let Some(value) = resolve_amount(input) else {
        if is_formula(input) {
            bail!("'{input}' is not a valid formula");
        }
        bail!("'{input}' is not a valid amount");
    };
    let saved = value.round() as i64;
    Ok(Out::new(format!("{input} = {}", format_amount(saved)), saved))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eval() {
        let out = eval(&EvalArgs::new("=(10+2)*3")).unwrap();
        assert_eq!(out.structure(), Some(&36));
        assert_eq!(out.message(), "=(10+2)*3 = 36");

        let out = eval(&EvalArgs::new("12,000")).unwrap();
        assert_eq!(out.message(), "12,000 = 12,000");

        assert!(eval(&EvalArgs::new("=10+"))
            .unwrap_err()
            .to_string()
            .contains("formula"));
        assert!(eval(&EvalArgs::new("ten")).is_err());
    }
}
