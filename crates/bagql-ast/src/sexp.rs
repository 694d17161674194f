//! Portable s-expression rendering of the AST.
//!
//! The form is a stable interchange format for cross-tool tests: every
//! node becomes `(head child …)` with canonical lowercase heads. Metas are
//! not rendered.

use std::fmt::Write as _;

use crate::{
    CaseSensitivity, DataType, Expr, FromSource, GroupBy, GroupingStrategy, PathComponent,
    ScopeQualifier, Select, SelectListItem, SelectProjection, SetQuantifier, StructField,
    WhenBranch,
};

/// Render an expression tree to its s-expression form.
#[must_use]
pub fn to_sexp(expr: &Expr) -> String {
    let mut out = String::new();
    write_expr(&mut out, expr);
    out
}

fn write_expr(out: &mut String, expr: &Expr) {
    match expr {
        Expr::Lit { value, .. } => {
            let _ = write!(out, "(lit {value})");
        }
        Expr::LitMissing { .. } => out.push_str("(missing)"),
        Expr::VarRef {
            name, case, scope, ..
        } => {
            let case = match case {
                CaseSensitivity::Sensitive => "case_sensitive",
                CaseSensitivity::Insensitive => "case_insensitive",
            };
            let scope = match scope {
                ScopeQualifier::Unqualified => "unqualified",
                ScopeQualifier::Lexical => "lexical",
            };
            let _ = write!(out, "(id {name} {case} {scope})");
        }
        Expr::List { items, .. } => write_seq(out, "list", items),
        Expr::Bag { items, .. } => write_seq(out, "bag", items),
        Expr::Struct { fields, .. } => {
            out.push_str("(struct");
            for StructField { key, value } in fields {
                out.push_str(" (field ");
                write_expr(out, key);
                out.push(' ');
                write_expr(out, value);
                out.push(')');
            }
            out.push(')');
        }
        Expr::NAry { op, args, .. } => {
            let _ = write!(out, "({}", op.symbol());
            for arg in args {
                out.push(' ');
                write_expr(out, arg);
            }
            out.push(')');
        }
        Expr::Typed {
            op,
            expr,
            data_type,
            ..
        } => {
            let _ = write!(out, "({op} ");
            write_expr(out, expr);
            out.push(' ');
            write_type(out, data_type);
            out.push(')');
        }
        Expr::Path {
            root, components, ..
        } => {
            out.push_str("(path ");
            write_expr(out, root);
            for comp in components {
                out.push(' ');
                match comp {
                    PathComponent::Expr { expr, case } => match case {
                        CaseSensitivity::Sensitive => {
                            out.push_str("(case_sensitive ");
                            write_expr(out, expr);
                            out.push(')');
                        }
                        CaseSensitivity::Insensitive => write_expr(out, expr),
                    },
                    PathComponent::Wildcard => out.push_str("(wildcard)"),
                    PathComponent::Unpivot => out.push_str("(unpivot)"),
                }
            }
            out.push(')');
        }
        Expr::SimpleCase {
            operand,
            whens,
            else_expr,
            ..
        } => {
            out.push_str("(simple_case ");
            write_expr(out, operand);
            write_whens(out, whens, else_expr.as_deref());
            out.push(')');
        }
        Expr::SearchedCase {
            whens, else_expr, ..
        } => {
            out.push_str("(searched_case");
            write_whens(out, whens, else_expr.as_deref());
            out.push(')');
        }
        Expr::CallAgg {
            func,
            quantifier,
            arg,
            ..
        } => {
            let q = match quantifier {
                SetQuantifier::All => "all",
                SetQuantifier::Distinct => "distinct",
            };
            let _ = write!(out, "(call_agg {func} {q} ");
            write_expr(out, arg);
            out.push(')');
        }
        Expr::CallAggWildcard { func, .. } => {
            let _ = write!(out, "(call_agg_wildcard {func})");
        }
        Expr::Select(select) => write_select(out, select),
    }
}

fn write_seq(out: &mut String, head: &str, items: &[Expr]) {
    let _ = write!(out, "({head}");
    for item in items {
        out.push(' ');
        write_expr(out, item);
    }
    out.push(')');
}

fn write_whens(out: &mut String, whens: &[WhenBranch], else_expr: Option<&Expr>) {
    for WhenBranch { condition, result } in whens {
        out.push_str(" (when ");
        write_expr(out, condition);
        out.push(' ');
        write_expr(out, result);
        out.push(')');
    }
    if let Some(else_expr) = else_expr {
        out.push_str(" (else ");
        write_expr(out, else_expr);
        out.push(')');
    }
}

fn write_type(out: &mut String, data_type: &DataType) {
    let _ = write!(out, "(type {}", data_type.sql_type.name());
    for arg in &data_type.args {
        let _ = write!(out, " {arg}");
    }
    out.push(')');
}

fn write_select(out: &mut String, select: &Select) {
    out.push_str("(select ");
    let distinct = select.quantifier == SetQuantifier::Distinct;
    match &select.projection {
        SelectProjection::List(items) => {
            let head = if distinct { "project_distinct" } else { "project" };
            let _ = write!(out, "({head} (list");
            for item in items {
                out.push(' ');
                match item {
                    SelectListItem::Star { .. } => out.push_str("(project_all)"),
                    SelectListItem::ProjectAll { expr } => {
                        out.push_str("(project_all ");
                        write_expr(out, expr);
                        out.push(')');
                    }
                    SelectListItem::Expr { expr, as_alias } => {
                        write_aliased(out, expr, as_alias.as_deref());
                    }
                }
            }
            out.push_str("))");
        }
        SelectProjection::Value(expr) => {
            let head = if distinct { "value_distinct" } else { "value" };
            let _ = write!(out, "({head} ");
            write_expr(out, expr);
            out.push(')');
        }
        SelectProjection::Pivot { key, value } => {
            out.push_str("(pivot ");
            write_expr(out, key);
            out.push(' ');
            write_expr(out, value);
            out.push(')');
        }
    }

    out.push_str(" (from ");
    write_from(out, &select.from);
    out.push(')');

    if let Some(where_clause) = &select.where_clause {
        out.push_str(" (where ");
        write_expr(out, where_clause);
        out.push(')');
    }
    if let Some(group_by) = &select.group_by {
        write_group_by(out, group_by);
    }
    if let Some(having) = &select.having {
        out.push_str(" (having ");
        write_expr(out, having);
        out.push(')');
    }
    if let Some(limit) = &select.limit {
        out.push_str(" (limit ");
        write_expr(out, limit);
        out.push(')');
    }
    out.push(')');
}

fn write_aliased(out: &mut String, expr: &Expr, as_alias: Option<&str>) {
    if let Some(alias) = as_alias {
        let _ = write!(out, "(as {alias} ");
        write_expr(out, expr);
        out.push(')');
    } else {
        write_expr(out, expr);
    }
}

fn write_from(out: &mut String, from: &FromSource) {
    match from {
        FromSource::Expr {
            expr,
            as_alias,
            at_alias,
        } => write_from_item(out, "", expr, as_alias.as_deref(), at_alias.as_deref()),
        FromSource::Unpivot {
            expr,
            as_alias,
            at_alias,
            ..
        } => write_from_item(
            out,
            "unpivot ",
            expr,
            as_alias.as_deref(),
            at_alias.as_deref(),
        ),
        FromSource::Join {
            op,
            left,
            right,
            condition,
            ..
        } => {
            let _ = write!(out, "({op} ");
            write_from(out, left);
            out.push(' ');
            write_from(out, right);
            out.push(' ');
            write_expr(out, condition);
            out.push(')');
        }
    }
}

// AT wraps AS wraps the expression, matching binding order.
fn write_from_item(
    out: &mut String,
    head: &str,
    expr: &Expr,
    as_alias: Option<&str>,
    at_alias: Option<&str>,
) {
    if !head.is_empty() {
        let _ = write!(out, "({head}");
    }
    if let Some(at) = at_alias {
        let _ = write!(out, "(at {at} ");
    }
    write_aliased(out, expr, as_alias);
    if at_alias.is_some() {
        out.push(')');
    }
    if !head.is_empty() {
        out.push(')');
    }
}

fn write_group_by(out: &mut String, group_by: &GroupBy) {
    let head = match group_by.strategy {
        GroupingStrategy::Full => "group",
        GroupingStrategy::Partial => "group_partial",
    };
    let _ = write!(out, " ({head} (by");
    for item in &group_by.items {
        out.push(' ');
        write_aliased(out, &item.expr, item.as_alias.as_deref());
    }
    out.push(')');
    if let Some(name) = &group_by.group_as {
        let _ = write!(out, " (group_as {name})");
    }
    out.push(')');
}

#[cfg(test)]
mod tests {
    use bagql_value::Value;

    use super::*;
    use crate::{Metas, NAryOp};

    fn lit(i: i64) -> Expr {
        Expr::Lit {
            value: Value::integer(i),
            metas: Metas::none(),
        }
    }

    fn var(name: &str) -> Expr {
        Expr::VarRef {
            name: name.to_owned(),
            case: CaseSensitivity::Insensitive,
            scope: ScopeQualifier::Unqualified,
            metas: Metas::none(),
        }
    }

    #[test]
    fn test_lit_and_nary() {
        let e = Expr::NAry {
            op: NAryOp::Add,
            args: vec![lit(1), lit(2)],
            metas: Metas::none(),
        };
        assert_eq!(to_sexp(&e), "(+ (lit 1) (lit 2))");
    }

    #[test]
    fn test_var_ref() {
        assert_eq!(to_sexp(&var("x")), "(id x case_insensitive unqualified)");
    }

    #[test]
    fn test_path_components() {
        let e = Expr::Path {
            root: Box::new(var("a")),
            components: vec![
                PathComponent::Expr {
                    expr: Expr::Lit {
                        value: Value::string("b"),
                        metas: Metas::none(),
                    },
                    case: CaseSensitivity::Insensitive,
                },
                PathComponent::Wildcard,
                PathComponent::Unpivot,
            ],
            metas: Metas::none(),
        };
        assert_eq!(
            to_sexp(&e),
            "(path (id a case_insensitive unqualified) (lit 'b') (wildcard) (unpivot))"
        );
    }

    #[test]
    fn test_bag_of_lists() {
        let e = Expr::Bag {
            items: vec![Expr::List {
                items: vec![lit(1)],
                metas: Metas::none(),
            }],
            metas: Metas::none(),
        };
        assert_eq!(to_sexp(&e), "(bag (list (lit 1)))");
    }
}
