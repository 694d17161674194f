//! Parser core and SFW grammar.
//!
//! The parser drives a cursor over an immutable token vector and builds
//! the public AST directly. Expression parsing lives in `expr.rs`; this
//! module owns the [`Parser`] type, the select-from-where grammar, and the
//! public entry points.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};

use bagql_ast::{
    Expr, FromSource, GroupBy, GroupByItem, GroupingStrategy, JoinOp, Meta, Metas, PathComponent,
    Select, SelectListItem, SelectProjection, SetQuantifier, SourceLocation,
};
use bagql_error::{ErrorCode, ParserError, Property, Result};
use bagql_value::Value;

use crate::lexer::Lexer;
use crate::token::{Keyword, Token, TokenKind};

// ---------------------------------------------------------------------------
// Parse metrics
// ---------------------------------------------------------------------------

/// Monotonic counter of successfully parsed expressions.
static BAGQL_PARSE_EXPRESSIONS_TOTAL: AtomicU64 = AtomicU64::new(0);

/// Monotonic counter of failed parse attempts.
static BAGQL_PARSE_ERRORS_TOTAL: AtomicU64 = AtomicU64::new(0);

/// Point-in-time parse metrics snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ParseMetricsSnapshot {
    /// Total expressions successfully parsed.
    pub bagql_parse_expressions_total: u64,
    /// Total parse attempts that produced an error.
    pub bagql_parse_errors_total: u64,
}

/// Take a point-in-time snapshot of parse metrics.
#[must_use]
pub fn parse_metrics_snapshot() -> ParseMetricsSnapshot {
    ParseMetricsSnapshot {
        bagql_parse_expressions_total: BAGQL_PARSE_EXPRESSIONS_TOTAL.load(Ordering::Relaxed),
        bagql_parse_errors_total: BAGQL_PARSE_ERRORS_TOTAL.load(Ordering::Relaxed),
    }
}

/// Reset parse metrics (used by tests/diagnostics).
pub fn reset_parse_metrics() {
    BAGQL_PARSE_EXPRESSIONS_TOTAL.store(0, Ordering::Relaxed);
    BAGQL_PARSE_ERRORS_TOTAL.store(0, Ordering::Relaxed);
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

/// Nesting bound; inputs deeper than this are rejected rather than
/// overflowing the stack.
pub const MAX_PARSE_DEPTH: u32 = 500;

/// The default aggregate-function name set.
///
/// Part of the external contract. A different set may be injected with
/// [`Parser::with_aggregates`].
pub const STANDARD_AGGREGATE_FUNCTIONS: [&str; 5] = ["count", "sum", "min", "max", "avg"];

/// Parser over a token vector.
///
/// A `Parser` is single-use: it consumes its cursor while parsing one
/// expression. Independent inputs parse on independent parsers.
pub struct Parser {
    pub(crate) tokens: Vec<Token>,
    pub(crate) pos: usize,
    pub(crate) depth: u32,
    pub(crate) aggregates: HashSet<String>,
}

impl Parser {
    /// Create a parser over an already-lexed token vector.
    #[must_use]
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            depth: 0,
            aggregates: STANDARD_AGGREGATE_FUNCTIONS
                .iter()
                .map(|s| (*s).to_owned())
                .collect(),
        }
    }

    /// Lex the given text and create a parser for it.
    pub fn from_text(text: &str) -> Result<Self> {
        Ok(Self::new(Lexer::tokenize(text)?))
    }

    /// Replace the aggregate-function name set.
    #[must_use]
    pub fn with_aggregates<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.aggregates = names.into_iter().map(Into::into).collect();
        self
    }

    /// Parse one complete expression and require that nothing but an
    /// optional terminating `;` follows.
    pub fn parse_single_expression(&mut self) -> Result<Expr> {
        let expr = self.parse_expr()?;
        let _ = self.eat(&TokenKind::Semicolon);
        if self.at_eof() {
            Ok(expr)
        } else {
            Err(self.err_here(
                ErrorCode::ParseUnexpectedToken,
                format!("unexpected {} after expression", self.peek().describe()),
            ))
        }
    }

    // -----------------------------------------------------------------------
    // Token navigation
    // -----------------------------------------------------------------------

    pub(crate) fn peek(&self) -> &TokenKind {
        self.tokens
            .get(self.pos)
            .map_or(&TokenKind::Eof, |t| &t.kind)
    }

    pub(crate) fn peek_nth(&self, n: usize) -> &TokenKind {
        self.tokens
            .get(self.pos + n)
            .map_or(&TokenKind::Eof, |t| &t.kind)
    }

    pub(crate) fn at_eof(&self) -> bool {
        matches!(self.peek(), TokenKind::Eof)
    }

    /// The current token's position, or one past the input for EOF.
    pub(crate) fn current_pos(&self) -> SourceLocation {
        self.tokens
            .get(self.pos)
            .map_or(SourceLocation::new(0, 0), |t| t.pos)
    }

    /// Consume and return the current token. The cursor never moves past
    /// the trailing `Eof` token.
    pub(crate) fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos].clone();
        if tok.kind != TokenKind::Eof {
            self.pos += 1;
        }
        tok
    }

    pub(crate) fn check(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(self.peek()) == std::mem::discriminant(kind)
    }

    pub(crate) fn check_kw(&self, kw: Keyword) -> bool {
        matches!(self.peek(), TokenKind::Keyword(k) if *k == kw)
    }

    pub(crate) fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub(crate) fn eat_kw(&mut self, kw: Keyword) -> bool {
        if self.check_kw(kw) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub(crate) fn expect_kw(&mut self, kw: Keyword) -> Result<Token> {
        if self.check_kw(kw) {
            Ok(self.advance())
        } else {
            Err(self
                .err_here(
                    ErrorCode::ParseExpectedKeyword,
                    format!(
                        "expected keyword `{}`, got {}",
                        kw.canonical(),
                        self.peek().describe()
                    ),
                )
                .with_text(Property::ExpectedKeyword, kw.canonical()))
        }
    }

    /// Consume a `(`, reporting `code` on anything else.
    pub(crate) fn expect_left_paren(&mut self, code: ErrorCode, after: &str) -> Result<Token> {
        if self.check(&TokenKind::LeftParen) {
            Ok(self.advance())
        } else {
            Err(self
                .err_here(code, format!("expected `(` after {after}"))
                .with_text(Property::ExpectedTokenType, "LEFT_PAREN"))
        }
    }

    /// Consume a `)`, reporting `code` on anything else.
    pub(crate) fn expect_right_paren(&mut self, code: ErrorCode, closing: &str) -> Result<Token> {
        if self.check(&TokenKind::RightParen) {
            Ok(self.advance())
        } else {
            Err(self
                .err_here(code, format!("expected `)` to close {closing}"))
                .with_text(Property::ExpectedTokenType, "RIGHT_PAREN"))
        }
    }

    /// Consume an identifier (bare or quoted), reporting `code` otherwise.
    pub(crate) fn expect_ident(&mut self, code: ErrorCode, what: &str) -> Result<String> {
        match self.peek() {
            TokenKind::Id(_) | TokenKind::QuotedId(_) => {
                let tok = self.advance();
                match tok.kind {
                    TokenKind::Id(name) | TokenKind::QuotedId(name) => Ok(name),
                    _ => unreachable!("peeked identifier"),
                }
            }
            other => Err(self.err_here(
                code,
                format!("expected an identifier for {what}, got {}", other.describe()),
            )),
        }
    }

    // -----------------------------------------------------------------------
    // Recursion guard
    // -----------------------------------------------------------------------

    pub(crate) fn enter_recursion(&mut self) -> Result<()> {
        if self.depth >= MAX_PARSE_DEPTH {
            return Err(self.err_here(
                ErrorCode::ParseExpectedExpression,
                format!("expression is nested too deeply (maximum depth {MAX_PARSE_DEPTH})"),
            ));
        }
        self.depth += 1;
        Ok(())
    }

    pub(crate) fn leave_recursion(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    // -----------------------------------------------------------------------
    // Error construction
    // -----------------------------------------------------------------------

    /// An error at the current token, carrying its type and text.
    pub(crate) fn err_here(&self, code: ErrorCode, message: impl Into<String>) -> ParserError {
        let pos = self.current_pos();
        let err = ParserError::new(code, message, pos.line, pos.column)
            .with_text(Property::TokenType, self.peek().type_name());
        match self.peek() {
            TokenKind::Id(s) | TokenKind::QuotedId(s) => {
                err.with_text(Property::TokenString, s.as_str())
            }
            TokenKind::Keyword(k) => err.with_text(Property::TokenString, k.canonical()),
            _ => err,
        }
    }

    /// An error at an explicit location (e.g. a node parsed earlier).
    pub(crate) fn err_at(
        &self,
        code: ErrorCode,
        message: impl Into<String>,
        loc: Option<SourceLocation>,
    ) -> ParserError {
        let loc = loc.unwrap_or_else(|| self.current_pos());
        ParserError::new(code, message, loc.line, loc.column)
    }

    // -----------------------------------------------------------------------
    // SELECT / PIVOT
    // -----------------------------------------------------------------------

    /// Parse an SFW block. The `SELECT` keyword token is already consumed.
    pub(crate) fn parse_select(&mut self, kw: &Token) -> Result<Expr> {
        let quantifier = self.parse_set_quantifier();
        let projection = if self.eat_kw(Keyword::Value) {
            SelectProjection::Value(Box::new(self.parse_expr()?))
        } else {
            SelectProjection::List(self.parse_select_list()?)
        };
        self.parse_sfw_tail(quantifier, projection, Metas::at(kw.pos))
    }

    /// Parse `PIVOT value AT key <sfw tail>`. The `PIVOT` keyword token is
    /// already consumed.
    pub(crate) fn parse_pivot(&mut self, kw: &Token) -> Result<Expr> {
        let value = self.parse_expr()?;
        if !self.eat(&TokenKind::At) {
            return Err(self
                .err_here(
                    ErrorCode::ParseExpectedTokenType,
                    format!("expected `at` in PIVOT, got {}", self.peek().describe()),
                )
                .with_text(Property::ExpectedTokenType, "AT"));
        }
        let key = self.parse_expr()?;
        self.parse_sfw_tail(
            SetQuantifier::All,
            SelectProjection::Pivot {
                key: Box::new(key),
                value: Box::new(value),
            },
            Metas::at(kw.pos),
        )
    }

    fn parse_set_quantifier(&mut self) -> SetQuantifier {
        if self.eat_kw(Keyword::Distinct) {
            SetQuantifier::Distinct
        } else {
            let _ = self.eat_kw(Keyword::All);
            SetQuantifier::All
        }
    }

    /// FROM through LIMIT, then assemble the `Select` node.
    fn parse_sfw_tail(
        &mut self,
        quantifier: SetQuantifier,
        projection: SelectProjection,
        metas: Metas,
    ) -> Result<Expr> {
        if !self.eat_kw(Keyword::From) {
            return Err(self.err_here(
                ErrorCode::ParseSelectMissingFrom,
                format!("expected FROM clause, got {}", self.peek().describe()),
            ));
        }
        let from = self.parse_from_list()?;

        let where_clause = if self.eat_kw(Keyword::Where) {
            Some(Box::new(self.parse_expr()?))
        } else {
            None
        };
        let group_by = self.parse_group_by()?;
        let having = if self.eat_kw(Keyword::Having) {
            Some(Box::new(self.parse_expr()?))
        } else {
            None
        };
        let limit = if self.eat_kw(Keyword::Limit) {
            Some(Box::new(self.parse_expr()?))
        } else {
            None
        };

        Ok(Expr::Select(Box::new(Select {
            quantifier,
            projection,
            from,
            where_clause,
            group_by,
            having,
            limit,
            metas,
        })))
    }

    // -----------------------------------------------------------------------
    // Projection list
    // -----------------------------------------------------------------------

    fn parse_select_list(&mut self) -> Result<Vec<SelectListItem>> {
        if self.check_kw(Keyword::From) || self.at_eof() {
            return Err(self.err_here(ErrorCode::ParseEmptySelect, "select list is empty"));
        }

        let mut items = Vec::new();
        loop {
            if self.check(&TokenKind::Star) {
                let star = self.advance();
                items.push(SelectListItem::Star {
                    metas: Metas::at(star.pos),
                });
            } else {
                let expr = self.parse_expr()?;
                let item = match self.inspect_path_expression(expr)? {
                    SelectListItem::Expr { expr, .. } => SelectListItem::Expr {
                        expr,
                        as_alias: self.parse_optional_alias()?,
                    },
                    project_all => project_all,
                };
                items.push(item);
            }
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }

        if items.len() > 1 {
            if let Some(SelectListItem::Star { metas }) = items
                .iter()
                .find(|item| matches!(item, SelectListItem::Star { .. }))
            {
                return Err(self.err_at(
                    ErrorCode::ParseAsteriskIsNotAloneInSelectList,
                    "`*` must be the only item in the select list",
                    metas.source_location(),
                ));
            }
        }
        Ok(items)
    }

    /// Disambiguate `foo.bar.*`-style projection items.
    ///
    /// `[*]` is rejected outright; `.*` is only legal as the final
    /// component, provided no earlier component was a `[expr]` subscript.
    /// A trailing `.*` rewrites the item to project-all over the prefix.
    fn inspect_path_expression(&self, expr: Expr) -> Result<SelectListItem> {
        let (root, components, metas) = match expr {
            Expr::Path {
                root,
                components,
                metas,
            } => (root, components, metas),
            other => {
                return Ok(SelectListItem::Expr {
                    expr: other,
                    as_alias: None,
                });
            }
        };

        let loc = metas.source_location();
        let last = components.len() - 1;
        let ends_with_unpivot = matches!(components[last], PathComponent::Unpivot);
        for (i, comp) in components.iter().enumerate() {
            match comp {
                PathComponent::Wildcard => {
                    return Err(self.err_at(
                        ErrorCode::ParseInvalidContextForWildcardInSelectList,
                        "`[*]` is not allowed in the select list",
                        loc,
                    ));
                }
                PathComponent::Unpivot if i != last => {
                    return Err(self.err_at(
                        ErrorCode::ParseInvalidContextForWildcardInSelectList,
                        "`.*` may only appear at the end of a select-list path",
                        loc,
                    ));
                }
                PathComponent::Expr { expr, .. }
                    if ends_with_unpivot && expr.metas().has("path_subscript") =>
                {
                    return Err(self.err_at(
                        ErrorCode::ParseCannotMixSqbAndWildcardInSelectList,
                        "cannot mix `[...]` subscripts with a trailing `.*`",
                        loc,
                    ));
                }
                _ => {}
            }
        }

        if ends_with_unpivot {
            let mut components = components;
            components.pop();
            let expr = if components.is_empty() {
                *root
            } else {
                Expr::Path {
                    root,
                    components,
                    metas,
                }
            };
            Ok(SelectListItem::ProjectAll { expr })
        } else {
            Ok(SelectListItem::Expr {
                expr: Expr::Path {
                    root,
                    components,
                    metas,
                },
                as_alias: None,
            })
        }
    }

    /// `AS alias`, or an implicit alias when the next token is an
    /// identifier.
    fn parse_optional_alias(&mut self) -> Result<Option<String>> {
        if self.eat(&TokenKind::As) {
            return Ok(Some(
                self.expect_ident(ErrorCode::ParseExpectedIdentForAlias, "the alias")?,
            ));
        }
        match self.peek() {
            TokenKind::Id(_) | TokenKind::QuotedId(_) => {
                Ok(Some(self.expect_ident(
                    ErrorCode::ParseExpectedIdentForAlias,
                    "the alias",
                )?))
            }
            _ => Ok(None),
        }
    }

    // -----------------------------------------------------------------------
    // FROM list
    // -----------------------------------------------------------------------

    /// Comma- and JOIN-separated from-items, folded left-associatively.
    fn parse_from_list(&mut self) -> Result<FromSource> {
        let mut left = self.parse_from_item()?;
        loop {
            if self.check(&TokenKind::Comma) {
                let comma = self.advance();
                let right = self.parse_from_item()?;
                left = FromSource::Join {
                    op: JoinOp::Inner,
                    left: Box::new(left),
                    right: Box::new(right),
                    condition: Box::new(literal_true(comma.pos)),
                    metas: Metas::at(comma.pos).with(Meta::IsImplicitJoin),
                };
            } else if let Some(op) = join_op(self.peek()) {
                let kw = self.advance();
                let right = self.parse_from_item()?;
                let condition = if self.eat_kw(Keyword::On) {
                    self.parse_expr()?
                } else {
                    // CROSS JOIN folds to inner_join; no ON clause.
                    literal_true(kw.pos)
                };
                left = FromSource::Join {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                    condition: Box::new(condition),
                    metas: Metas::at(kw.pos),
                };
            } else {
                break;
            }
        }
        Ok(left)
    }

    fn parse_from_item(&mut self) -> Result<FromSource> {
        if self.check_kw(Keyword::Unpivot) {
            let kw = self.advance();
            let expr = self.parse_expr()?;
            let (as_alias, at_alias) = self.parse_from_aliases()?;
            Ok(FromSource::Unpivot {
                expr: Box::new(expr),
                as_alias,
                at_alias,
                metas: Metas::at(kw.pos),
            })
        } else {
            let expr = self.parse_expr()?;
            let (as_alias, at_alias) = self.parse_from_aliases()?;
            Ok(FromSource::Expr {
                expr: Box::new(expr),
                as_alias,
                at_alias,
            })
        }
    }

    /// `AS a`, `AT b`, both, in either order.
    fn parse_from_aliases(&mut self) -> Result<(Option<String>, Option<String>)> {
        let mut as_alias = None;
        let mut at_alias = None;
        loop {
            if as_alias.is_none() && self.check(&TokenKind::As) {
                self.advance();
                as_alias = Some(self.expect_ident(ErrorCode::ParseExpectedIdentForAlias, "the alias")?);
            } else if at_alias.is_none() && self.check(&TokenKind::At) {
                self.advance();
                at_alias =
                    Some(self.expect_ident(ErrorCode::ParseExpectedIdentForAt, "the AT binding")?);
            } else {
                break;
            }
        }
        Ok((as_alias, at_alias))
    }

    // -----------------------------------------------------------------------
    // GROUP BY
    // -----------------------------------------------------------------------

    fn parse_group_by(&mut self) -> Result<Option<GroupBy>> {
        if !self.check_kw(Keyword::Group) {
            return Ok(None);
        }
        self.advance();
        let strategy = if self.eat_kw(Keyword::Partial) {
            GroupingStrategy::Partial
        } else {
            GroupingStrategy::Full
        };
        self.expect_kw(Keyword::By)?;

        let mut items = Vec::new();
        loop {
            let expr = self.parse_expr()?;
            if matches!(expr, Expr::Lit { .. }) {
                return Err(self.err_at(
                    ErrorCode::ParseUnsupportedLiteralsGroupBy,
                    "literals cannot be grouping keys",
                    expr.source_location(),
                ));
            }
            let as_alias = if self.eat(&TokenKind::As) {
                Some(self.expect_ident(ErrorCode::ParseExpectedIdentForAlias, "the alias")?)
            } else {
                None
            };
            items.push(GroupByItem { expr, as_alias });
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }

        let group_as = if self.check_kw(Keyword::Group) && self.peek_nth(1) == &TokenKind::As {
            self.advance();
            self.advance();
            Some(self.expect_ident(
                ErrorCode::ParseExpectedIdentForGroupName,
                "the GROUP AS name",
            )?)
        } else {
            None
        };

        Ok(Some(GroupBy {
            strategy,
            items,
            group_as,
        }))
    }
}

/// The join operator for an explicit join keyword, if the token is one.
fn join_op(kind: &TokenKind) -> Option<JoinOp> {
    match kind {
        TokenKind::Keyword(Keyword::Join | Keyword::InnerJoin) => Some(JoinOp::Inner),
        TokenKind::Keyword(Keyword::LeftJoin) => Some(JoinOp::Left),
        TokenKind::Keyword(Keyword::RightJoin) => Some(JoinOp::Right),
        TokenKind::Keyword(Keyword::OuterJoin) => Some(JoinOp::Outer),
        _ => None,
    }
}

/// The literal `true`, positioned at the surface token it stands in for.
fn literal_true(pos: SourceLocation) -> Expr {
    Expr::Lit {
        value: Value::Boolean(true),
        metas: Metas::at(pos),
    }
}

// ---------------------------------------------------------------------------
// Public entry points
// ---------------------------------------------------------------------------

/// Parse one complete expression or query.
///
/// Trailing input beyond a single optional `;` is `PARSE_UNEXPECTED_TOKEN`.
/// On failure exactly one error is returned; no partial AST escapes.
pub fn parse_expression(text: &str) -> Result<Expr> {
    let span = tracing::debug_span!(
        target: "bagql.parse",
        "parse_expression",
        tokens = tracing::field::Empty,
        failed = tracing::field::Empty,
    );
    let guard = span.enter();

    let result = Parser::from_text(text).and_then(|mut parser| {
        span.record("tokens", parser.tokens.len() as u64);
        parser.parse_single_expression()
    });

    match &result {
        Ok(_) => {
            BAGQL_PARSE_EXPRESSIONS_TOTAL.fetch_add(1, Ordering::Relaxed);
        }
        Err(err) => {
            BAGQL_PARSE_ERRORS_TOTAL.fetch_add(1, Ordering::Relaxed);
            span.record("failed", true);
            tracing::warn!(target: "bagql.parse", error = %err, "parse failed");
        }
    }
    drop(guard);
    result
}
