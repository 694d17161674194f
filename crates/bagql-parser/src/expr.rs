//! Pratt expression parser.
//!
//! Precedence table (lowest to highest):
//!   OR
//!   AND
//!   NOT (prefix)
//!   = <> != IS [NOT] (IS takes a type on the right)
//!   < <= > >=
//!   IN LIKE BETWEEN (and their NOT variants)
//!   || (concat)
//!   + - (binary)
//!   * / %
//!   unary + - @ (prefix)
//!   path suffixes: .name .* [expr] [*]
//!
//! Negated surface operators always lower to the positive operator wrapped
//! in `NAry(Not, …)` carrying the `legacy_logical_not` meta.

use bagql_ast::{
    CaseSensitivity, DataType, Expr, Meta, Metas, NAryOp, PathComponent, ScopeQualifier,
    SetQuantifier, SourceLocation, SqlType, StructField, TypedOp, WhenBranch,
};
use bagql_error::{ErrorCode, Property, Result};
use bagql_value::Value;

use crate::parser::Parser;
use crate::token::{Keyword, Token, TokenKind};

// Binding powers: higher = tighter. Left BP is compared against min_bp;
// right BP feeds the recursive call, so equal-level operators associate
// left.
mod bp {
    pub const OR: (u8, u8) = (1, 2);
    pub const AND: (u8, u8) = (3, 4);
    // Prefix NOT right BP: above AND, below equality.
    pub const NOT_PREFIX: u8 = 5;
    pub const EQUALITY: (u8, u8) = (7, 8);
    pub const COMPARISON: (u8, u8) = (9, 10);
    // IN / LIKE / BETWEEN bind tighter than comparisons.
    pub const MEMBERSHIP: (u8, u8) = (11, 12);
    pub const CONCAT: (u8, u8) = (13, 14);
    pub const ADD: (u8, u8) = (15, 16);
    pub const MUL: (u8, u8) = (17, 18);
    // Unary prefix + - @ right BP.
    pub const UNARY: u8 = 19;
}

impl Parser {
    /// Parse a single expression.
    pub fn parse_expr(&mut self) -> Result<Expr> {
        self.parse_expr_bp(0)
    }

    // ── Pratt core ──────────────────────────────────────────────────────

    fn parse_expr_bp(&mut self, min_bp: u8) -> Result<Expr> {
        self.enter_recursion()?;
        let result = self.parse_expr_bp_inner(min_bp);
        self.leave_recursion();
        result
    }

    fn parse_expr_bp_inner(&mut self, min_bp: u8) -> Result<Expr> {
        let mut lhs = self.parse_prefix()?;
        loop {
            let Some((l_bp, r_bp)) = self.infix_bp() else {
                break;
            };
            if l_bp < min_bp {
                break;
            }
            lhs = self.parse_infix(lhs, r_bp)?;
        }
        Ok(lhs)
    }

    /// A unary term with its path suffixes folded in.
    fn parse_prefix(&mut self) -> Result<Expr> {
        let term = self.parse_term()?;
        self.parse_path_suffixes(term)
    }

    // ── Terms ───────────────────────────────────────────────────────────

    #[allow(clippy::too_many_lines)]
    fn parse_term(&mut self) -> Result<Expr> {
        let tok = self.advance();
        let metas = Metas::at(tok.pos);
        match tok.kind {
            TokenKind::Literal(value) => Ok(Expr::Lit { value, metas }),
            TokenKind::Null => Ok(Expr::Lit {
                value: Value::Null,
                metas,
            }),
            TokenKind::Missing => Ok(Expr::LitMissing { metas }),
            TokenKind::Keyword(Keyword::True) => Ok(Expr::Lit {
                value: Value::Boolean(true),
                metas,
            }),
            TokenKind::Keyword(Keyword::False) => Ok(Expr::Lit {
                value: Value::Boolean(false),
                metas,
            }),

            TokenKind::Id(name) => {
                if self.check(&TokenKind::LeftParen) {
                    self.parse_call_or_aggregate(&name, tok.pos)
                } else {
                    Ok(Expr::VarRef {
                        name,
                        case: CaseSensitivity::Insensitive,
                        scope: ScopeQualifier::Unqualified,
                        metas,
                    })
                }
            }
            TokenKind::QuotedId(name) => Ok(Expr::VarRef {
                name,
                case: CaseSensitivity::Sensitive,
                scope: ScopeQualifier::Unqualified,
                metas,
            }),

            // Unary prefix operators.
            TokenKind::Minus => {
                let inner = self.parse_expr_bp(bp::UNARY)?;
                Ok(Expr::NAry {
                    op: NAryOp::Sub,
                    args: vec![inner],
                    metas,
                })
            }
            TokenKind::Plus => {
                let inner = self.parse_expr_bp(bp::UNARY)?;
                Ok(Expr::NAry {
                    op: NAryOp::Add,
                    args: vec![inner],
                    metas,
                })
            }
            TokenKind::Keyword(Keyword::Not) => {
                let inner = self.parse_expr_bp(bp::NOT_PREFIX)?;
                Ok(Expr::NAry {
                    op: NAryOp::Not,
                    args: vec![inner],
                    metas,
                })
            }

            // `@name`: lexically-scoped variable reference.
            TokenKind::AtSign => {
                if matches!(self.peek(), TokenKind::Id(_) | TokenKind::QuotedId(_)) {
                    let name_tok = self.advance();
                    let (name, case) = match name_tok.kind {
                        TokenKind::Id(name) => (name, CaseSensitivity::Insensitive),
                        TokenKind::QuotedId(name) => (name, CaseSensitivity::Sensitive),
                        _ => unreachable!("peeked identifier"),
                    };
                    Ok(Expr::VarRef {
                        name,
                        case,
                        scope: ScopeQualifier::Lexical,
                        metas,
                    })
                } else {
                    Err(self.err_here(
                        ErrorCode::ParseMissingIdentAfterAt,
                        format!(
                            "expected an identifier after `@`, got {}",
                            self.peek().describe()
                        ),
                    ))
                }
            }

            TokenKind::LeftParen => self.parse_paren_group(&tok),
            TokenKind::LeftBracket => {
                let items = self.parse_expr_list_until(&TokenKind::RightBracket, "the list")?;
                Ok(Expr::List { items, metas })
            }
            TokenKind::LeftDoubleAngle => {
                let items = self.parse_expr_list_until(&TokenKind::RightDoubleAngle, "the bag")?;
                Ok(Expr::Bag { items, metas })
            }
            TokenKind::LeftCurly => self.parse_struct(&tok),

            TokenKind::Keyword(Keyword::Case) => self.parse_case(&tok),
            TokenKind::Keyword(Keyword::Cast) => self.parse_cast(&tok),
            TokenKind::Keyword(Keyword::Select) => self.parse_select(&tok),
            TokenKind::Keyword(Keyword::Pivot) => self.parse_pivot(&tok),
            TokenKind::Keyword(Keyword::Values) => self.parse_values(&tok),
            TokenKind::Keyword(Keyword::Substring) => self.parse_substring(&tok),
            TokenKind::Keyword(Keyword::Trim) => self.parse_trim(&tok),
            TokenKind::Keyword(Keyword::Extract) => self.parse_extract(&tok),

            // Aggregate keywords in call position.
            TokenKind::Keyword(kw)
                if self.aggregates.contains(kw.canonical())
                    && self.check(&TokenKind::LeftParen) =>
            {
                self.parse_call_or_aggregate(kw.canonical(), tok.pos)
            }

            TokenKind::Eof => Err(self.err_at(
                ErrorCode::ParseExpectedExpression,
                "unexpected end of input, expected an expression",
                Some(tok.pos),
            )),
            other => Err(self
                .err_at(
                    ErrorCode::ParseUnexpectedTerm,
                    format!("{} cannot start an expression", other.describe()),
                    Some(tok.pos),
                )
                .with_text(Property::TokenType, other.type_name())),
        }
    }

    /// `( … )`: grouping for one element, a list for several.
    fn parse_paren_group(&mut self, open: &Token) -> Result<Expr> {
        if self.check(&TokenKind::RightParen) {
            return Err(self.err_here(
                ErrorCode::ParseExpectedExpression,
                "expected an expression inside `( )`",
            ));
        }
        let first = self.parse_expr()?;
        if self.check(&TokenKind::Comma) {
            let mut items = vec![first];
            while self.eat(&TokenKind::Comma) {
                items.push(self.parse_expr()?);
            }
            self.expect_right_paren(ErrorCode::ParseExpectedTokenType, "the expression list")?;
            Ok(Expr::List {
                items,
                metas: Metas::at(open.pos),
            })
        } else {
            self.expect_right_paren(ErrorCode::ParseExpectedTokenType, "the expression")?;
            Ok(first)
        }
    }

    /// Comma-separated expressions up to (and including) `close`.
    fn parse_expr_list_until(&mut self, close: &TokenKind, what: &str) -> Result<Vec<Expr>> {
        let mut items = Vec::new();
        if !self.check(close) {
            loop {
                items.push(self.parse_expr()?);
                if self.eat(&TokenKind::Comma) {
                    continue;
                }
                break;
            }
        }
        if self.eat(close) {
            Ok(items)
        } else {
            Err(self
                .err_here(
                    ErrorCode::ParseExpectedTokenType,
                    format!(
                        "expected `{}` to close {what}, got {}",
                        match close {
                            TokenKind::RightBracket => "]",
                            TokenKind::RightDoubleAngle => ">>",
                            _ => ")",
                        },
                        self.peek().describe()
                    ),
                )
                .with_text(Property::ExpectedTokenType, close.type_name()))
        }
    }

    /// `{ key : value, … }`.
    fn parse_struct(&mut self, open: &Token) -> Result<Expr> {
        let mut fields = Vec::new();
        if !self.check(&TokenKind::RightCurly) {
            loop {
                let key = self.parse_expr()?;
                if !self.eat(&TokenKind::Colon) {
                    return Err(self
                        .err_here(
                            ErrorCode::ParseExpectedTokenType,
                            format!(
                                "expected `:` after a struct field name, got {}",
                                self.peek().describe()
                            ),
                        )
                        .with_text(Property::ExpectedTokenType, "COLON"));
                }
                let value = self.parse_expr()?;
                fields.push(StructField { key, value });
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }
        if self.eat(&TokenKind::RightCurly) {
            Ok(Expr::Struct {
                fields,
                metas: Metas::at(open.pos),
            })
        } else {
            Err(self
                .err_here(
                    ErrorCode::ParseExpectedTokenType,
                    format!("expected `}}` to close the struct, got {}", self.peek().describe()),
                )
                .with_text(Property::ExpectedTokenType, "RIGHT_CURLY"))
        }
    }

    // ── Path suffixes ───────────────────────────────────────────────────

    /// Greedily fold `.name`, `."name"`, `.*`, `[expr]`, `[*]` onto a
    /// term. With zero suffixes the term is returned unchanged.
    fn parse_path_suffixes(&mut self, root: Expr) -> Result<Expr> {
        let mut components = Vec::new();
        loop {
            if self.check(&TokenKind::Dot) {
                self.advance();
                match self.peek() {
                    TokenKind::Id(_)
                    | TokenKind::QuotedId(_)
                    | TokenKind::Star
                    | TokenKind::DatePart(_)
                    | TokenKind::TrimSpec(_) => {}
                    other => {
                        return Err(self.err_here(
                            ErrorCode::ParseInvalidPathComponent,
                            format!("{} cannot follow `.` in a path", other.describe()),
                        ));
                    }
                }
                let comp = self.advance();
                let comp_metas = Metas::at(comp.pos);
                match comp.kind {
                    TokenKind::Id(name) => components.push(named_component(
                        name,
                        CaseSensitivity::Insensitive,
                        comp_metas,
                    )),
                    TokenKind::QuotedId(name) => components.push(named_component(
                        name,
                        CaseSensitivity::Sensitive,
                        comp_metas,
                    )),
                    // Date parts and trim specifications are ordinary
                    // member names when they appear in a path.
                    TokenKind::DatePart(part) => components.push(named_component(
                        part.canonical().to_owned(),
                        CaseSensitivity::Insensitive,
                        comp_metas,
                    )),
                    TokenKind::TrimSpec(spec) => components.push(named_component(
                        spec.canonical().to_owned(),
                        CaseSensitivity::Insensitive,
                        comp_metas,
                    )),
                    TokenKind::Star => components.push(PathComponent::Unpivot),
                    _ => unreachable!("peeked path component"),
                }
            } else if self.check(&TokenKind::LeftBracket) {
                self.advance();
                if self.check(&TokenKind::Star) {
                    self.advance();
                    self.expect_bracket_close()?;
                    components.push(PathComponent::Wildcard);
                } else {
                    let mut expr = self.parse_expr()?;
                    self.expect_bracket_close()?;
                    expr.metas_mut().insert(Meta::PathSubscript);
                    components.push(PathComponent::Expr {
                        expr,
                        case: CaseSensitivity::Sensitive,
                    });
                }
            } else {
                break;
            }
        }

        if components.is_empty() {
            Ok(root)
        } else {
            let metas = root.metas().clone();
            Ok(Expr::Path {
                root: Box::new(root),
                components,
                metas,
            })
        }
    }

    fn expect_bracket_close(&mut self) -> Result<()> {
        if self.eat(&TokenKind::RightBracket) {
            Ok(())
        } else {
            Err(self
                .err_here(
                    ErrorCode::ParseExpectedTokenType,
                    format!(
                        "expected `]` to close the path subscript, got {}",
                        self.peek().describe()
                    ),
                )
                .with_text(Property::ExpectedTokenType, "RIGHT_BRACKET"))
        }
    }

    // ── Infix operators ─────────────────────────────────────────────────

    fn infix_bp(&self) -> Option<(u8, u8)> {
        match self.peek() {
            TokenKind::Keyword(Keyword::Or) => Some(bp::OR),
            TokenKind::Keyword(Keyword::And) => Some(bp::AND),
            TokenKind::Eq | TokenKind::Ne => Some(bp::EQUALITY),
            TokenKind::Keyword(Keyword::Is | Keyword::IsNot) => Some(bp::EQUALITY),
            TokenKind::Lt | TokenKind::Le | TokenKind::Gt | TokenKind::Ge => Some(bp::COMPARISON),
            TokenKind::Keyword(
                Keyword::In
                | Keyword::NotIn
                | Keyword::Like
                | Keyword::NotLike
                | Keyword::Between
                | Keyword::NotBetween,
            ) => Some(bp::MEMBERSHIP),
            TokenKind::Concat => Some(bp::CONCAT),
            TokenKind::Plus | TokenKind::Minus => Some(bp::ADD),
            TokenKind::Star | TokenKind::Slash | TokenKind::Percent => Some(bp::MUL),
            _ => None,
        }
    }

    fn parse_infix(&mut self, lhs: Expr, r_bp: u8) -> Result<Expr> {
        let tok = self.advance();
        let metas = Metas::at(tok.pos);
        match &tok.kind {
            TokenKind::Plus => self.binary(NAryOp::Add, lhs, r_bp, metas),
            TokenKind::Minus => self.binary(NAryOp::Sub, lhs, r_bp, metas),
            TokenKind::Star => self.binary(NAryOp::Mul, lhs, r_bp, metas),
            TokenKind::Slash => self.binary(NAryOp::Div, lhs, r_bp, metas),
            TokenKind::Percent => self.binary(NAryOp::Mod, lhs, r_bp, metas),
            TokenKind::Concat => self.binary(NAryOp::Concat, lhs, r_bp, metas),
            TokenKind::Eq => self.binary(NAryOp::Eq, lhs, r_bp, metas),
            TokenKind::Ne => self.binary(NAryOp::Ne, lhs, r_bp, metas),
            TokenKind::Lt => self.binary(NAryOp::Lt, lhs, r_bp, metas),
            TokenKind::Le => self.binary(NAryOp::Lte, lhs, r_bp, metas),
            TokenKind::Gt => self.binary(NAryOp::Gt, lhs, r_bp, metas),
            TokenKind::Ge => self.binary(NAryOp::Gte, lhs, r_bp, metas),
            TokenKind::Keyword(Keyword::And) => self.binary(NAryOp::And, lhs, r_bp, metas),
            TokenKind::Keyword(Keyword::Or) => self.binary(NAryOp::Or, lhs, r_bp, metas),

            // IS / IS NOT take a data type on the right.
            TokenKind::Keyword(Keyword::Is) => {
                let data_type = self.parse_data_type()?;
                Ok(Expr::Typed {
                    op: TypedOp::Is,
                    expr: Box::new(lhs),
                    data_type,
                    metas,
                })
            }
            TokenKind::Keyword(Keyword::IsNot) => {
                let data_type = self.parse_data_type()?;
                let positive = Expr::Typed {
                    op: TypedOp::Is,
                    expr: Box::new(lhs),
                    data_type,
                    metas,
                };
                Ok(negate(positive, tok.pos))
            }

            TokenKind::Keyword(Keyword::Like) => self.parse_like(lhs, &tok, false),
            TokenKind::Keyword(Keyword::NotLike) => self.parse_like(lhs, &tok, true),
            TokenKind::Keyword(Keyword::Between) => self.parse_between(lhs, &tok, false),
            TokenKind::Keyword(Keyword::NotBetween) => self.parse_between(lhs, &tok, true),
            TokenKind::Keyword(Keyword::In) => self.parse_in(lhs, &tok, false),
            TokenKind::Keyword(Keyword::NotIn) => self.parse_in(lhs, &tok, true),

            other => Err(self.err_at(
                ErrorCode::ParseUnknownOperator,
                format!("{} is not an infix operator", other.describe()),
                Some(tok.pos),
            )),
        }
    }

    fn binary(&mut self, op: NAryOp, lhs: Expr, r_bp: u8, metas: Metas) -> Result<Expr> {
        let rhs = self.parse_expr_bp(r_bp)?;
        Ok(Expr::NAry {
            op,
            args: vec![lhs, rhs],
            metas,
        })
    }

    /// `LIKE pattern [ESCAPE escape]`, binary or ternary.
    fn parse_like(&mut self, lhs: Expr, tok: &Token, negated: bool) -> Result<Expr> {
        let pattern = self.parse_expr_bp(bp::MEMBERSHIP.1)?;
        let mut args = vec![lhs, pattern];
        if self.eat_kw(Keyword::Escape) {
            args.push(self.parse_expr_bp(bp::MEMBERSHIP.1)?);
        }
        let like = Expr::NAry {
            op: NAryOp::Like,
            args,
            metas: Metas::at(tok.pos),
        };
        Ok(if negated { negate(like, tok.pos) } else { like })
    }

    /// `BETWEEN low AND high`. The bounds parse above AND level, so the
    /// separating AND is never consumed by the low bound.
    fn parse_between(&mut self, lhs: Expr, tok: &Token, negated: bool) -> Result<Expr> {
        let low = self.parse_expr_bp(bp::MEMBERSHIP.1)?;
        self.expect_kw(Keyword::And)?;
        let high = self.parse_expr_bp(bp::MEMBERSHIP.1)?;
        let between = Expr::NAry {
            op: NAryOp::Between,
            args: vec![lhs, low, high],
            metas: Metas::at(tok.pos),
        };
        Ok(if negated {
            negate(between, tok.pos)
        } else {
            between
        })
    }

    /// `IN ( … )`: a parenthesized list becomes a `List` unless it starts
    /// a subquery or table-value constructor.
    fn parse_in(&mut self, lhs: Expr, tok: &Token, negated: bool) -> Result<Expr> {
        let rhs = if self.check(&TokenKind::LeftParen)
            && !matches!(
                self.peek_nth(1),
                TokenKind::Keyword(Keyword::Select | Keyword::Values)
            ) {
            let open = self.advance();
            let items = self.parse_expr_list_until(&TokenKind::RightParen, "the IN list")?;
            Expr::List {
                items,
                metas: Metas::at(open.pos),
            }
        } else {
            self.parse_expr_bp(bp::MEMBERSHIP.1)?
        };
        let in_expr = Expr::NAry {
            op: NAryOp::In,
            args: vec![lhs, rhs],
            metas: Metas::at(tok.pos),
        };
        Ok(if negated {
            negate(in_expr, tok.pos)
        } else {
            in_expr
        })
    }

    // ── CASE ────────────────────────────────────────────────────────────

    fn parse_case(&mut self, kw: &Token) -> Result<Expr> {
        let metas = Metas::at(kw.pos);
        if self.check_kw(Keyword::When) {
            let whens = self.parse_when_branches()?;
            let else_expr = self.parse_case_else()?;
            self.expect_kw(Keyword::End)?;
            Ok(Expr::SearchedCase {
                whens,
                else_expr,
                metas,
            })
        } else {
            let operand = Box::new(self.parse_expr()?);
            let whens = self.parse_when_branches()?;
            let else_expr = self.parse_case_else()?;
            self.expect_kw(Keyword::End)?;
            Ok(Expr::SimpleCase {
                operand,
                whens,
                else_expr,
                metas,
            })
        }
    }

    fn parse_when_branches(&mut self) -> Result<Vec<WhenBranch>> {
        let mut whens = Vec::new();
        while self.eat_kw(Keyword::When) {
            let condition = self.parse_expr()?;
            self.expect_kw(Keyword::Then)?;
            let result = self.parse_expr()?;
            whens.push(WhenBranch { condition, result });
        }
        if whens.is_empty() {
            return Err(self.err_here(
                ErrorCode::ParseExpectedWhenClause,
                "CASE requires at least one WHEN clause",
            ));
        }
        Ok(whens)
    }

    fn parse_case_else(&mut self) -> Result<Option<Box<Expr>>> {
        if self.eat_kw(Keyword::Else) {
            Ok(Some(Box::new(self.parse_expr()?)))
        } else {
            Ok(None)
        }
    }

    // ── CAST and data types ─────────────────────────────────────────────

    fn parse_cast(&mut self, kw: &Token) -> Result<Expr> {
        self.expect_left_paren(ErrorCode::ParseExpectedLeftParenAfterCast, "CAST")?;
        let expr = self.parse_expr()?;
        if !self.eat(&TokenKind::As) {
            return Err(self
                .err_here(
                    ErrorCode::ParseExpectedTokenType,
                    format!("expected `as` in CAST, got {}", self.peek().describe()),
                )
                .with_text(Property::ExpectedTokenType, "AS"));
        }
        let data_type = self.parse_data_type()?;
        self.expect_right_paren(
            ErrorCode::ParseExpectedRightParenBuiltinFunctionCall,
            "CAST",
        )?;
        Ok(Expr::Typed {
            op: TypedOp::Cast,
            expr: Box::new(expr),
            data_type,
            metas: Metas::at(kw.pos),
        })
    }

    /// A type name with optional integer parameters, arity-checked.
    pub(crate) fn parse_data_type(&mut self) -> Result<DataType> {
        let tok = self.advance();
        let sql_type = match &tok.kind {
            TokenKind::Null => SqlType::Null,
            TokenKind::Missing => SqlType::Missing,
            TokenKind::Keyword(kw) => match keyword_type(*kw) {
                Some(t) => t,
                None => {
                    return Err(self.err_at(
                        ErrorCode::ParseExpectedTypeName,
                        format!("`{}` is not a type name", kw.canonical()),
                        Some(tok.pos),
                    ));
                }
            },
            other => {
                return Err(self.err_at(
                    ErrorCode::ParseExpectedTypeName,
                    format!("expected a type name, got {}", other.describe()),
                    Some(tok.pos),
                ));
            }
        };

        let mut args = Vec::new();
        if self.eat(&TokenKind::LeftParen) {
            loop {
                let arg_tok = self.advance();
                match &arg_tok.kind {
                    TokenKind::Literal(value) if value.is_unsigned_integer() => {
                        if let Some(n) = value.as_i64() {
                            args.push(n.unsigned_abs());
                        }
                    }
                    other => {
                        return Err(self.err_at(
                            ErrorCode::ParseInvalidTypeParam,
                            format!(
                                "type parameters must be unsigned integers, got {}",
                                other.describe()
                            ),
                            Some(arg_tok.pos),
                        ));
                    }
                }
                if self.eat(&TokenKind::Comma) {
                    continue;
                }
                break;
            }
            self.expect_right_paren(ErrorCode::ParseExpectedTokenType, "the type parameters")?;
        }

        let (min, max) = sql_type.arity();
        if args.len() < min || args.len() > max {
            return Err(self
                .err_at(
                    ErrorCode::ParseCastArity,
                    format!(
                        "`{}` takes {min} to {max} parameters, got {}",
                        sql_type.name(),
                        args.len()
                    ),
                    Some(tok.pos),
                )
                .with_text(Property::CastTo, sql_type.name())
                .with_int(Property::ExpectedArityMin, min as i64)
                .with_int(Property::ExpectedArityMax, max as i64));
        }

        Ok(DataType {
            sql_type,
            args,
            metas: Metas::at(tok.pos),
        })
    }

    // ── VALUES ──────────────────────────────────────────────────────────

    /// `VALUES (a, b), (c, d)`: a bag of lists.
    fn parse_values(&mut self, kw: &Token) -> Result<Expr> {
        let mut rows = Vec::new();
        loop {
            let open = self.expect_left_paren(ErrorCode::ParseExpectedTokenType, "VALUES")?;
            let items = self.parse_expr_list_until(&TokenKind::RightParen, "the VALUES row")?;
            rows.push(Expr::List {
                items,
                metas: Metas::at(open.pos),
            });
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        Ok(Expr::Bag {
            items: rows,
            metas: Metas::at(kw.pos),
        })
    }

    // ── Calls and aggregates ────────────────────────────────────────────

    /// `name ( … )`. Names in the aggregate set build `CallAgg` nodes;
    /// everything else is an ordinary `call`.
    fn parse_call_or_aggregate(&mut self, name: &str, pos: SourceLocation) -> Result<Expr> {
        self.advance(); // (
        if self.aggregates.contains(&name.to_ascii_lowercase()) {
            return self.parse_aggregate_tail(name, pos);
        }

        let mut args = Vec::new();
        if !self.check(&TokenKind::RightParen) {
            loop {
                args.push(self.parse_expr()?);
                if self.eat(&TokenKind::Comma) {
                    continue;
                }
                if self.check(&TokenKind::RightParen) {
                    break;
                }
                return Err(self.err_here(
                    ErrorCode::ParseExpectedArgumentDelimiter,
                    format!(
                        "expected `,` between arguments, got {}",
                        self.peek().describe()
                    ),
                ));
            }
        }
        self.advance(); // )
        Ok(call_node(name, args, pos))
    }

    fn parse_aggregate_tail(&mut self, func: &str, pos: SourceLocation) -> Result<Expr> {
        let func = func.to_ascii_lowercase();
        let metas = Metas::at(pos);

        if self.check(&TokenKind::Star) {
            let star = self.advance();
            self.expect_right_paren(
                ErrorCode::ParseExpectedRightParenBuiltinFunctionCall,
                "the aggregate call",
            )?;
            if func == "count" {
                return Ok(Expr::CallAggWildcard { func, metas });
            }
            return Err(self.err_at(
                ErrorCode::ParseUnsupportedCallWithStar,
                format!("`{func}(*)` is not supported, only COUNT takes `*`"),
                Some(star.pos),
            ));
        }

        let quantifier = if self.eat_kw(Keyword::Distinct) {
            SetQuantifier::Distinct
        } else {
            let _ = self.eat_kw(Keyword::All);
            SetQuantifier::All
        };
        let arg = self.parse_expr()?;
        if self.check(&TokenKind::Comma) {
            return Err(self.err_here(
                ErrorCode::ParseNonUnaryAggregateFunctionCall,
                format!("aggregate `{func}` takes exactly one argument"),
            ));
        }
        self.expect_right_paren(
            ErrorCode::ParseExpectedRightParenBuiltinFunctionCall,
            "the aggregate call",
        )?;
        Ok(Expr::CallAgg {
            func,
            quantifier,
            arg: Box::new(arg),
            metas,
        })
    }

    // ── Built-in call forms ─────────────────────────────────────────────

    /// `SUBSTRING(s FROM start [FOR len])` or `SUBSTRING(s, start [, len])`.
    fn parse_substring(&mut self, kw: &Token) -> Result<Expr> {
        self.expect_left_paren(ErrorCode::ParseExpectedLeftParenBuiltinFunctionCall, "SUBSTRING")?;
        let mut args = vec![self.parse_expr()?];
        if self.eat_kw(Keyword::From) {
            args.push(self.parse_expr()?);
            if self.eat(&TokenKind::For) {
                args.push(self.parse_expr()?);
            }
        } else if self.eat(&TokenKind::Comma) {
            args.push(self.parse_expr()?);
            if self.eat(&TokenKind::Comma) {
                args.push(self.parse_expr()?);
            }
        } else {
            return Err(self
                .err_here(
                    ErrorCode::ParseExpected2TokenTypes,
                    format!(
                        "expected FROM or `,` in SUBSTRING, got {}",
                        self.peek().describe()
                    ),
                )
                .with_text(Property::ExpectedTokenType, "KEYWORD, COMMA"));
        }
        self.expect_right_paren(
            ErrorCode::ParseExpectedRightParenBuiltinFunctionCall,
            "SUBSTRING",
        )?;
        Ok(call_node("substring", args, kw.pos))
    }

    /// `TRIM([[spec] [chars] FROM] src)`, normalized to 1–3 arguments in
    /// (spec, chars, src) order with absent prefixes dropped.
    fn parse_trim(&mut self, kw: &Token) -> Result<Expr> {
        self.expect_left_paren(ErrorCode::ParseExpectedLeftParenBuiltinFunctionCall, "TRIM")?;
        let mut args = Vec::new();

        let spec = match self.peek() {
            TokenKind::TrimSpec(spec) => Some(*spec),
            _ => None,
        };
        if let Some(spec) = spec {
            let spec_tok = self.advance();
            args.push(Expr::Lit {
                value: Value::symbol(spec.canonical()),
                metas: Metas::at(spec_tok.pos),
            });
            if !self.eat_kw(Keyword::From) {
                args.push(self.parse_expr()?);
                self.expect_kw(Keyword::From)?;
            }
            args.push(self.parse_expr()?);
        } else if self.eat_kw(Keyword::From) {
            args.push(self.parse_expr()?);
        } else {
            let first = self.parse_expr()?;
            args.push(first);
            if self.eat_kw(Keyword::From) {
                args.push(self.parse_expr()?);
            }
        }

        self.expect_right_paren(ErrorCode::ParseExpectedRightParenBuiltinFunctionCall, "TRIM")?;
        Ok(call_node("trim", args, kw.pos))
    }

    /// `EXTRACT(date_part FROM timestamp)`.
    fn parse_extract(&mut self, kw: &Token) -> Result<Expr> {
        self.expect_left_paren(ErrorCode::ParseExpectedLeftParenBuiltinFunctionCall, "EXTRACT")?;
        let part = match self.peek() {
            TokenKind::DatePart(part) => Some(*part),
            _ => None,
        };
        let Some(part) = part else {
            return Err(self.err_here(
                ErrorCode::ParseExpectedDatePart,
                format!(
                    "expected a date part in EXTRACT, got {}",
                    self.peek().describe()
                ),
            ));
        };
        let part_tok = self.advance();
        let part = Expr::Lit {
            value: Value::symbol(part.canonical()),
            metas: Metas::at(part_tok.pos),
        };
        self.expect_kw(Keyword::From)?;
        let source = self.parse_expr()?;
        self.expect_right_paren(
            ErrorCode::ParseExpectedRightParenBuiltinFunctionCall,
            "EXTRACT",
        )?;
        Ok(call_node("extract", vec![part, source], kw.pos))
    }
}

// ---------------------------------------------------------------------------
// Node helpers
// ---------------------------------------------------------------------------

/// Wrap a positive operator in `NAry(Not, …)` with `legacy_logical_not`.
fn negate(positive: Expr, pos: SourceLocation) -> Expr {
    Expr::NAry {
        op: NAryOp::Not,
        args: vec![positive],
        metas: Metas::at(pos).with(Meta::LegacyLogicalNot),
    }
}

/// A `.name` path component: a string literal with the name's case rule.
fn named_component(name: String, case: CaseSensitivity, metas: Metas) -> PathComponent {
    PathComponent::Expr {
        expr: Expr::Lit {
            value: Value::String(name),
            metas,
        },
        case,
    }
}

/// `call` node: the function reference is the first argument.
fn call_node(name: &str, args: Vec<Expr>, pos: SourceLocation) -> Expr {
    let func_ref = Expr::VarRef {
        name: name.to_owned(),
        case: CaseSensitivity::Insensitive,
        scope: ScopeQualifier::Unqualified,
        metas: Metas::at(pos),
    };
    let mut all = Vec::with_capacity(args.len() + 1);
    all.push(func_ref);
    all.extend(args);
    Expr::NAry {
        op: NAryOp::Call,
        args: all,
        metas: Metas::at(pos),
    }
}

/// Keywords that name data types.
const fn keyword_type(kw: Keyword) -> Option<SqlType> {
    match kw {
        Keyword::Boolean => Some(SqlType::Boolean),
        Keyword::Smallint => Some(SqlType::SmallInt),
        Keyword::Int | Keyword::Integer => Some(SqlType::Integer),
        Keyword::Float => Some(SqlType::Float),
        Keyword::Real => Some(SqlType::Real),
        Keyword::DoublePrecision => Some(SqlType::DoublePrecision),
        Keyword::Decimal => Some(SqlType::Decimal),
        Keyword::Numeric => Some(SqlType::Numeric),
        Keyword::Timestamp => Some(SqlType::Timestamp),
        Keyword::Char | Keyword::Character => Some(SqlType::Character),
        Keyword::Varchar | Keyword::CharacterVarying => Some(SqlType::CharacterVarying),
        Keyword::String => Some(SqlType::String),
        Keyword::Symbol => Some(SqlType::Symbol),
        Keyword::Struct => Some(SqlType::Struct),
        Keyword::List => Some(SqlType::List),
        Keyword::Bag => Some(SqlType::Bag),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use bagql_error::{ErrorCode, ParserError, Property, PropertyValue};
    use bagql_value::TimestampPrecision;

    use super::*;
    use crate::parser::parse_expression;

    fn parse(text: &str) -> Expr {
        match parse_expression(text) {
            Ok(expr) => expr,
            Err(err) => unreachable!("parse error for `{text}`: {err}"),
        }
    }

    fn parse_err(text: &str) -> ParserError {
        match parse_expression(text) {
            Ok(expr) => unreachable!("expected error for `{text}`, got {expr:?}"),
            Err(err) => err,
        }
    }

    // ── Precedence (normative invariants) ───────────────────────────────

    #[test]
    fn test_and_binds_tighter_than_or() {
        // a OR b AND c → Or(a, And(b, c))
        match &parse("a OR b AND c") {
            Expr::NAry {
                op: NAryOp::Or,
                args,
                ..
            } => assert!(matches!(
                &args[1],
                Expr::NAry {
                    op: NAryOp::And,
                    ..
                }
            )),
            other => unreachable!("expected Or(a, And(b,c)), got {other:?}"),
        }
    }

    #[test]
    fn test_or_left_associative() {
        // a OR b OR c → Or(Or(a, b), c)
        match &parse("a OR b OR c") {
            Expr::NAry {
                op: NAryOp::Or,
                args,
                ..
            } => assert!(matches!(
                &args[0],
                Expr::NAry { op: NAryOp::Or, .. }
            )),
            other => unreachable!("expected Or(Or(a,b), c), got {other:?}"),
        }
    }

    #[test]
    fn test_not_binds_looser_than_equality() {
        // NOT x = y → Not(Eq(x, y))
        match &parse("NOT x = y") {
            Expr::NAry {
                op: NAryOp::Not,
                args,
                ..
            } => assert!(matches!(
                &args[0],
                Expr::NAry { op: NAryOp::Eq, .. }
            )),
            other => unreachable!("expected Not(Eq), got {other:?}"),
        }
    }

    #[test]
    fn test_equality_looser_than_comparison() {
        // a < b = c → Eq(Lt(a, b), c)
        match &parse("a < b = c") {
            Expr::NAry {
                op: NAryOp::Eq,
                args,
                ..
            } => assert!(matches!(
                &args[0],
                Expr::NAry { op: NAryOp::Lt, .. }
            )),
            other => unreachable!("expected Eq(Lt(a,b), c), got {other:?}"),
        }
    }

    #[test]
    fn test_membership_binds_tighter_than_comparison() {
        // a < b IN (1, 2) → Lt(a, In(b, [1, 2]))
        match &parse("a < b IN (1, 2)") {
            Expr::NAry {
                op: NAryOp::Lt,
                args,
                ..
            } => assert!(matches!(
                &args[1],
                Expr::NAry { op: NAryOp::In, .. }
            )),
            other => unreachable!("expected Lt(a, In(..)), got {other:?}"),
        }
    }

    #[test]
    fn test_add_binds_tighter_than_concat() {
        // a || b + c → Concat(a, Add(b, c))
        match &parse("a || b + c") {
            Expr::NAry {
                op: NAryOp::Concat,
                args,
                ..
            } => assert!(matches!(
                &args[1],
                Expr::NAry {
                    op: NAryOp::Add,
                    ..
                }
            )),
            other => unreachable!("expected Concat(a, Add(b,c)), got {other:?}"),
        }
    }

    #[test]
    fn test_mul_binds_tighter_than_add() {
        // 1 + 2 * 3 → Add(1, Mul(2, 3))
        match &parse("1 + 2 * 3") {
            Expr::NAry {
                op: NAryOp::Add,
                args,
                ..
            } => {
                assert!(matches!(&args[0], Expr::Lit { .. }));
                assert!(matches!(
                    &args[1],
                    Expr::NAry {
                        op: NAryOp::Mul,
                        ..
                    }
                ));
            }
            other => unreachable!("expected Add(1, Mul(2,3)), got {other:?}"),
        }
    }

    #[test]
    fn test_unary_minus() {
        // -2 + 3 → Add(Sub(2), 3)
        match &parse("-2 + 3") {
            Expr::NAry {
                op: NAryOp::Add,
                args,
                ..
            } => match &args[0] {
                Expr::NAry {
                    op: NAryOp::Sub,
                    args: inner,
                    ..
                } => assert_eq!(inner.len(), 1),
                other => unreachable!("expected unary Sub, got {other:?}"),
            },
            other => unreachable!("expected Add(Sub(2), 3), got {other:?}"),
        }
    }

    #[test]
    fn test_redundant_parens_do_not_change_shape() {
        assert_eq!(parse("a + b * c"), parse("a + (b * c)"));
        assert_eq!(parse("a OR b AND c"), parse("a OR (b AND c)"));
        assert_eq!(parse("x BETWEEN 1 AND 2 AND y"), parse("(x BETWEEN 1 AND 2) AND y"));
    }

    #[test]
    fn test_parens_that_change_grouping_change_shape() {
        assert_ne!(parse("a + b * c"), parse("(a + b) * c"));
    }

    // ── Terms ───────────────────────────────────────────────────────────

    #[test]
    fn test_literals() {
        assert!(matches!(
            parse("42"),
            Expr::Lit {
                value: Value::Integer(42),
                ..
            }
        ));
        assert!(matches!(
            parse("3.5"),
            Expr::Lit {
                value: Value::Decimal(_),
                ..
            }
        ));
        assert!(matches!(
            parse("'txt'"),
            Expr::Lit {
                value: Value::String(_),
                ..
            }
        ));
        assert!(matches!(
            parse("TRUE"),
            Expr::Lit {
                value: Value::Boolean(true),
                ..
            }
        ));
        assert!(matches!(
            parse("NULL"),
            Expr::Lit {
                value: Value::Null,
                ..
            }
        ));
        assert!(matches!(parse("MISSING"), Expr::LitMissing { .. }));
    }

    #[test]
    fn test_timestamp_literal_term() {
        match parse("`2001-07-01`") {
            Expr::Lit {
                value: Value::Timestamp(ts),
                ..
            } => {
                assert_eq!((ts.year, ts.month, ts.day), (2001, 7, 1));
                assert_eq!(ts.precision, TimestampPrecision::Day);
            }
            other => unreachable!("expected timestamp literal, got {other:?}"),
        }
    }

    #[test]
    fn test_variable_references() {
        assert!(matches!(
            parse("foo"),
            Expr::VarRef {
                case: CaseSensitivity::Insensitive,
                scope: ScopeQualifier::Unqualified,
                ..
            }
        ));
        assert!(matches!(
            parse("\"Foo\""),
            Expr::VarRef {
                case: CaseSensitivity::Sensitive,
                ..
            }
        ));
    }

    #[test]
    fn test_lexical_scope_qualifier() {
        match parse("@x") {
            Expr::VarRef { name, scope, .. } => {
                assert_eq!(name, "x");
                assert_eq!(scope, ScopeQualifier::Lexical);
            }
            other => unreachable!("expected lexical var ref, got {other:?}"),
        }
        assert_eq!(
            parse_err("@1").code,
            ErrorCode::ParseMissingIdentAfterAt
        );
    }

    #[test]
    fn test_collection_constructors() {
        match parse("[1, 2, 3]") {
            Expr::List { items, .. } => assert_eq!(items.len(), 3),
            other => unreachable!("expected list, got {other:?}"),
        }
        match parse("<<1, 2>>") {
            Expr::Bag { items, .. } => assert_eq!(items.len(), 2),
            other => unreachable!("expected bag, got {other:?}"),
        }
        match parse("{'a': 1, 'b': 2}") {
            Expr::Struct { fields, .. } => assert_eq!(fields.len(), 2),
            other => unreachable!("expected struct, got {other:?}"),
        }
    }

    #[test]
    fn test_paren_group_single_is_grouping() {
        assert!(matches!(parse("(x)"), Expr::VarRef { .. }));
    }

    #[test]
    fn test_paren_group_many_is_list() {
        match parse("(1, 2)") {
            Expr::List { items, .. } => assert_eq!(items.len(), 2),
            other => unreachable!("expected list, got {other:?}"),
        }
    }

    #[test]
    fn test_values_is_bag_of_lists() {
        match parse("VALUES (1, 2), (3)") {
            Expr::Bag { items, .. } => {
                assert_eq!(items.len(), 2);
                match &items[0] {
                    Expr::List { items, .. } => assert_eq!(items.len(), 2),
                    other => unreachable!("expected row list, got {other:?}"),
                }
            }
            other => unreachable!("expected bag, got {other:?}"),
        }
    }

    // ── Paths ───────────────────────────────────────────────────────────

    #[test]
    fn test_dotted_path() {
        match parse("a.b.c") {
            Expr::Path {
                root, components, ..
            } => {
                assert!(matches!(*root, Expr::VarRef { .. }));
                assert_eq!(components.len(), 2);
                assert!(matches!(
                    &components[0],
                    PathComponent::Expr {
                        case: CaseSensitivity::Insensitive,
                        ..
                    }
                ));
            }
            other => unreachable!("expected path, got {other:?}"),
        }
    }

    #[test]
    fn test_quoted_path_component_is_sensitive() {
        match parse("a.\"B\"") {
            Expr::Path { components, .. } => assert!(matches!(
                &components[0],
                PathComponent::Expr {
                    case: CaseSensitivity::Sensitive,
                    ..
                }
            )),
            other => unreachable!("expected path, got {other:?}"),
        }
    }

    #[test]
    fn test_subscript_and_wildcard_components() {
        match parse("a[0][*].b.*") {
            Expr::Path { components, .. } => {
                assert_eq!(components.len(), 4);
                assert!(matches!(&components[0], PathComponent::Expr { .. }));
                assert!(matches!(&components[1], PathComponent::Wildcard));
                assert!(matches!(&components[2], PathComponent::Expr { .. }));
                assert!(matches!(&components[3], PathComponent::Unpivot));
            }
            other => unreachable!("expected path, got {other:?}"),
        }
    }

    #[test]
    fn test_subscript_component_carries_surface_meta() {
        match parse("a['k']") {
            Expr::Path { components, .. } => match &components[0] {
                PathComponent::Expr { expr, case } => {
                    assert_eq!(*case, CaseSensitivity::Sensitive);
                    assert!(expr.metas().has("path_subscript"));
                }
                other => unreachable!("expected subscript component, got {other:?}"),
            },
            other => unreachable!("expected path, got {other:?}"),
        }
    }

    #[test]
    fn test_dotted_component_has_no_subscript_meta() {
        match parse("a.b") {
            Expr::Path { components, .. } => match &components[0] {
                PathComponent::Expr { expr, .. } => {
                    assert!(!expr.metas().has("path_subscript"));
                }
                other => unreachable!("expected named component, got {other:?}"),
            },
            other => unreachable!("expected path, got {other:?}"),
        }
    }

    #[test]
    fn test_date_part_name_is_ordinary_in_paths() {
        match parse("t.year") {
            Expr::Path { components, .. } => match &components[0] {
                PathComponent::Expr { expr, .. } => {
                    assert!(matches!(
                        expr,
                        Expr::Lit {
                            value: Value::String(s),
                            ..
                        } if s == "year"
                    ));
                }
                other => unreachable!("expected named component, got {other:?}"),
            },
            other => unreachable!("expected path, got {other:?}"),
        }
    }

    #[test]
    fn test_bare_term_is_not_a_path() {
        assert!(matches!(parse("a"), Expr::VarRef { .. }));
    }

    #[test]
    fn test_invalid_path_component() {
        let err = parse_err("a.1");
        assert_eq!(err.code, ErrorCode::ParseInvalidPathComponent);
    }

    // ── Contextual operators ────────────────────────────────────────────

    #[test]
    fn test_is_takes_a_type() {
        match parse("x IS NULL") {
            Expr::Typed {
                op: TypedOp::Is,
                data_type,
                ..
            } => assert_eq!(data_type.sql_type, SqlType::Null),
            other => unreachable!("expected Typed(Is), got {other:?}"),
        }
    }

    #[test]
    fn test_is_not_wraps_positive_in_not() {
        match parse("x IS NOT MISSING") {
            Expr::NAry {
                op: NAryOp::Not,
                args,
                metas,
            } => {
                assert!(metas.has("legacy_logical_not"));
                assert_eq!(args.len(), 1);
                assert!(matches!(
                    &args[0],
                    Expr::Typed {
                        op: TypedOp::Is,
                        ..
                    }
                ));
            }
            other => unreachable!("expected Not(Is), got {other:?}"),
        }
    }

    #[test]
    fn test_between_is_ternary() {
        match parse("x BETWEEN 1 AND 10") {
            Expr::NAry {
                op: NAryOp::Between,
                args,
                ..
            } => assert_eq!(args.len(), 3),
            other => unreachable!("expected Between, got {other:?}"),
        }
    }

    #[test]
    fn test_between_does_not_consume_outer_and() {
        // x BETWEEN 1 AND 10 AND y → And(Between(..), y)
        match parse("x BETWEEN 1 AND 10 AND y") {
            Expr::NAry {
                op: NAryOp::And,
                args,
                ..
            } => assert!(matches!(
                &args[0],
                Expr::NAry {
                    op: NAryOp::Between,
                    ..
                }
            )),
            other => unreachable!("expected And(Between, y), got {other:?}"),
        }
    }

    #[test]
    fn test_not_between_wraps() {
        match parse("x NOT BETWEEN 1 AND 2") {
            Expr::NAry {
                op: NAryOp::Not,
                args,
                metas,
            } => {
                assert!(metas.has("legacy_logical_not"));
                assert!(matches!(
                    &args[0],
                    Expr::NAry {
                        op: NAryOp::Between,
                        ..
                    }
                ));
            }
            other => unreachable!("expected Not(Between), got {other:?}"),
        }
    }

    #[test]
    fn test_like_binary_and_with_escape() {
        match parse("s LIKE '%a%'") {
            Expr::NAry {
                op: NAryOp::Like,
                args,
                ..
            } => assert_eq!(args.len(), 2),
            other => unreachable!("expected Like, got {other:?}"),
        }
        match parse("s LIKE '%a\\%' ESCAPE '\\'") {
            Expr::NAry {
                op: NAryOp::Like,
                args,
                ..
            } => assert_eq!(args.len(), 3),
            other => unreachable!("expected ternary Like, got {other:?}"),
        }
    }

    #[test]
    fn test_not_like_wraps() {
        match parse("s NOT LIKE 'a%'") {
            Expr::NAry {
                op: NAryOp::Not,
                args,
                metas,
            } => {
                assert!(metas.has("legacy_logical_not"));
                assert!(matches!(
                    &args[0],
                    Expr::NAry {
                        op: NAryOp::Like,
                        ..
                    }
                ));
            }
            other => unreachable!("expected Not(Like), got {other:?}"),
        }
    }

    #[test]
    fn test_in_paren_list_becomes_list() {
        match parse("x IN (1, 2, 3)") {
            Expr::NAry {
                op: NAryOp::In,
                args,
                ..
            } => match &args[1] {
                Expr::List { items, .. } => assert_eq!(items.len(), 3),
                other => unreachable!("expected IN list, got {other:?}"),
            },
            other => unreachable!("expected In, got {other:?}"),
        }
    }

    #[test]
    fn test_in_single_element_list() {
        match parse("x IN (1)") {
            Expr::NAry {
                op: NAryOp::In,
                args,
                ..
            } => assert!(matches!(&args[1], Expr::List { items, .. } if items.len() == 1)),
            other => unreachable!("expected In, got {other:?}"),
        }
    }

    #[test]
    fn test_in_subquery_stays_expression() {
        match parse("x IN (SELECT a FROM t)") {
            Expr::NAry {
                op: NAryOp::In,
                args,
                ..
            } => assert!(matches!(&args[1], Expr::Select(_))),
            other => unreachable!("expected In(subquery), got {other:?}"),
        }
    }

    #[test]
    fn test_in_values_stays_expression() {
        match parse("x IN (VALUES (1), (2))") {
            Expr::NAry {
                op: NAryOp::In,
                args,
                ..
            } => assert!(matches!(&args[1], Expr::Bag { .. })),
            other => unreachable!("expected In(values), got {other:?}"),
        }
    }

    #[test]
    fn test_not_in_wraps() {
        match parse("x NOT IN (1, 2)") {
            Expr::NAry {
                op: NAryOp::Not,
                args,
                metas,
            } => {
                assert!(metas.has("legacy_logical_not"));
                assert!(matches!(
                    &args[0],
                    Expr::NAry { op: NAryOp::In, .. }
                ));
            }
            other => unreachable!("expected Not(In), got {other:?}"),
        }
    }

    // ── CASE ────────────────────────────────────────────────────────────

    #[test]
    fn test_simple_case() {
        match parse("CASE x WHEN 1 THEN 'one' WHEN 2 THEN 'two' ELSE 'other' END") {
            Expr::SimpleCase {
                whens, else_expr, ..
            } => {
                assert_eq!(whens.len(), 2);
                assert!(else_expr.is_some());
            }
            other => unreachable!("expected simple case, got {other:?}"),
        }
    }

    #[test]
    fn test_searched_case() {
        match parse("CASE WHEN x > 0 THEN 'pos' ELSE 'neg' END") {
            Expr::SearchedCase {
                whens, else_expr, ..
            } => {
                assert_eq!(whens.len(), 1);
                assert!(else_expr.is_some());
                assert!(matches!(
                    &whens[0].condition,
                    Expr::NAry { op: NAryOp::Gt, .. }
                ));
            }
            other => unreachable!("expected searched case, got {other:?}"),
        }
    }

    #[test]
    fn test_case_requires_when() {
        assert_eq!(
            parse_err("CASE ELSE 1 END").code,
            ErrorCode::ParseExpectedWhenClause
        );
    }

    // ── CAST and types ──────────────────────────────────────────────────

    #[test]
    fn test_cast() {
        match parse("CAST(x AS integer)") {
            Expr::Typed {
                op: TypedOp::Cast,
                data_type,
                ..
            } => {
                assert_eq!(data_type.sql_type, SqlType::Integer);
                assert!(data_type.args.is_empty());
            }
            other => unreachable!("expected cast, got {other:?}"),
        }
    }

    #[test]
    fn test_cast_with_type_parameters() {
        match parse("CAST(x AS DECIMAL(10, 2))") {
            Expr::Typed { data_type, .. } => {
                assert_eq!(data_type.sql_type, SqlType::Decimal);
                assert_eq!(data_type.args, vec![10, 2]);
            }
            other => unreachable!("expected cast, got {other:?}"),
        }
    }

    #[test]
    fn test_cast_folded_type_names() {
        assert!(matches!(
            parse("CAST(x AS double precision)"),
            Expr::Typed { data_type, .. } if data_type.sql_type == SqlType::DoublePrecision
        ));
        assert!(matches!(
            parse("CAST(x AS character varying(5))"),
            Expr::Typed { data_type, .. } if data_type.sql_type == SqlType::CharacterVarying
        ));
    }

    #[test]
    fn test_cast_arity_error_carries_properties() {
        let err = parse_err("CAST(x AS DECIMAL(1, 2, 3))");
        assert_eq!(err.code, ErrorCode::ParseCastArity);
        assert_eq!(
            err.property(Property::CastTo),
            Some(PropertyValue::Text("decimal".to_owned()))
        );
        assert_eq!(
            err.property(Property::ExpectedArityMin),
            Some(PropertyValue::Int(0))
        );
        assert_eq!(
            err.property(Property::ExpectedArityMax),
            Some(PropertyValue::Int(2))
        );
    }

    #[test]
    fn test_type_parameter_must_be_unsigned_integer() {
        assert_eq!(
            parse_err("CAST(x AS CHAR(-1))").code,
            ErrorCode::ParseInvalidTypeParam
        );
        assert_eq!(
            parse_err("CAST(x AS CHAR('a'))").code,
            ErrorCode::ParseInvalidTypeParam
        );
    }

    #[test]
    fn test_cast_to_unknown_type() {
        assert_eq!(
            parse_err("CAST(x AS frobnicate)").code,
            ErrorCode::ParseExpectedTypeName
        );
    }

    #[test]
    fn test_cast_requires_parens() {
        assert_eq!(
            parse_err("CAST x AS integer").code,
            ErrorCode::ParseExpectedLeftParenAfterCast
        );
    }

    // ── Calls and aggregates ────────────────────────────────────────────

    #[test]
    fn test_plain_call() {
        match parse("char_length('abc')") {
            Expr::NAry {
                op: NAryOp::Call,
                args,
                ..
            } => {
                assert_eq!(args.len(), 2);
                assert!(matches!(
                    &args[0],
                    Expr::VarRef { name, .. } if name == "char_length"
                ));
            }
            other => unreachable!("expected call, got {other:?}"),
        }
    }

    #[test]
    fn test_zero_argument_call() {
        match parse("now()") {
            Expr::NAry {
                op: NAryOp::Call,
                args,
                ..
            } => assert_eq!(args.len(), 1),
            other => unreachable!("expected call, got {other:?}"),
        }
    }

    #[test]
    fn test_aggregate_call_defaults_to_all() {
        match parse("SUM(x)") {
            Expr::CallAgg {
                func, quantifier, ..
            } => {
                assert_eq!(func, "sum");
                assert_eq!(quantifier, SetQuantifier::All);
            }
            other => unreachable!("expected CallAgg, got {other:?}"),
        }
    }

    #[test]
    fn test_aggregate_distinct() {
        assert!(matches!(
            parse("COUNT(DISTINCT x)"),
            Expr::CallAgg {
                quantifier: SetQuantifier::Distinct,
                ..
            }
        ));
    }

    #[test]
    fn test_count_star() {
        match parse("COUNT(*)") {
            Expr::CallAggWildcard { func, .. } => assert_eq!(func, "count"),
            other => unreachable!("expected CallAggWildcard, got {other:?}"),
        }
    }

    #[test]
    fn test_star_rejected_for_other_aggregates() {
        assert_eq!(
            parse_err("SUM(*)").code,
            ErrorCode::ParseUnsupportedCallWithStar
        );
    }

    #[test]
    fn test_aggregates_are_unary() {
        assert_eq!(
            parse_err("MAX(a, b)").code,
            ErrorCode::ParseNonUnaryAggregateFunctionCall
        );
    }

    #[test]
    fn test_injected_aggregate_set() {
        let mut parser = match Parser::from_text("median(x)") {
            Ok(p) => p,
            Err(err) => unreachable!("lex error: {err}"),
        };
        parser = parser.with_aggregates(["median"]);
        match parser.parse_single_expression() {
            Ok(Expr::CallAgg { func, .. }) => assert_eq!(func, "median"),
            other => unreachable!("expected CallAgg, got {other:?}"),
        }

        // With the default set, the same call is an ordinary function.
        assert!(matches!(
            parse("median(x)"),
            Expr::NAry {
                op: NAryOp::Call,
                ..
            }
        ));
    }

    // ── Built-in call forms ─────────────────────────────────────────────

    fn call_args(expr: Expr) -> (String, Vec<Expr>) {
        match expr {
            Expr::NAry {
                op: NAryOp::Call,
                mut args,
                ..
            } => {
                let rest = args.split_off(1);
                match args.pop() {
                    Some(Expr::VarRef { name, .. }) => (name, rest),
                    other => unreachable!("expected function ref, got {other:?}"),
                }
            }
            other => unreachable!("expected call, got {other:?}"),
        }
    }

    #[test]
    fn test_substring_from_for_form() {
        let (name, args) = call_args(parse("SUBSTRING(s FROM 2 FOR 3)"));
        assert_eq!(name, "substring");
        assert_eq!(args.len(), 3);
    }

    #[test]
    fn test_substring_comma_form() {
        let (name, args) = call_args(parse("SUBSTRING(s, 2)"));
        assert_eq!(name, "substring");
        assert_eq!(args.len(), 2);
        let (_, args) = call_args(parse("SUBSTRING(s, 2, 3)"));
        assert_eq!(args.len(), 3);
    }

    #[test]
    fn test_trim_forms() {
        let (name, args) = call_args(parse("TRIM(s)"));
        assert_eq!(name, "trim");
        assert_eq!(args.len(), 1);

        let (_, args) = call_args(parse("TRIM(' ' FROM s)"));
        assert_eq!(args.len(), 2);

        let (_, args) = call_args(parse("TRIM(LEADING FROM s)"));
        assert_eq!(args.len(), 2);
        assert!(matches!(
            &args[0],
            Expr::Lit {
                value: Value::Symbol(s),
                ..
            } if s == "leading"
        ));

        let (_, args) = call_args(parse("TRIM(BOTH ' ' FROM s)"));
        assert_eq!(args.len(), 3);
    }

    #[test]
    fn test_extract() {
        let (name, args) = call_args(parse("EXTRACT(year FROM `2001T`)"));
        assert_eq!(name, "extract");
        assert_eq!(args.len(), 2);
        assert!(matches!(
            &args[0],
            Expr::Lit {
                value: Value::Symbol(s),
                ..
            } if s == "year"
        ));
    }

    #[test]
    fn test_extract_requires_date_part() {
        assert_eq!(
            parse_err("EXTRACT(fortnight FROM x)").code,
            ErrorCode::ParseExpectedDatePart
        );
    }

    // ── Structural errors ───────────────────────────────────────────────

    #[test]
    fn test_empty_parens_error() {
        assert_eq!(parse_err("()").code, ErrorCode::ParseExpectedExpression);
    }

    #[test]
    fn test_unexpected_term() {
        assert_eq!(parse_err("* 1").code, ErrorCode::ParseUnexpectedTerm);
    }

    #[test]
    fn test_expected_expression_at_eof() {
        assert_eq!(parse_err("1 +").code, ErrorCode::ParseExpectedExpression);
    }

    #[test]
    fn test_unclosed_list() {
        let err = parse_err("[1, 2");
        assert_eq!(err.code, ErrorCode::ParseExpectedTokenType);
        assert_eq!(
            err.property(Property::ExpectedTokenType),
            Some(PropertyValue::Text("RIGHT_BRACKET".to_owned()))
        );
    }

    #[test]
    fn test_error_positions_point_into_source() {
        let err = parse_err("1 +\n* 2");
        assert_eq!((err.line, err.column), (2, 1));
    }
}
