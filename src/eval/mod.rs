use crate::parser::ast::Expr;
use crate::store::VarStore;

/// Evaluate an argument expression to the string handed to a command.
///
/// Unknown or unset variables evaluate to the empty string, the way
/// shells substitute them.
pub fn eval_to_string(expr: &Expr, vars: &VarStore) -> String {
    match expr {
        Expr::Word(word) => word.clone(),
        Expr::Str(text) => text.clone(),
        Expr::Var(name) => vars.get_string(name).unwrap_or_default().to_string(),
    }
}
