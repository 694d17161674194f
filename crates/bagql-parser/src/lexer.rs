//! Lexer: query text to a flat token sequence.
//!
//! Two passes. The raw pass is a single-scan longest-match tokenizer using
//! memchr for accelerated quote searches; the folding pass collapses
//! multi-word keyword sequences (`IS NOT`, `LEFT OUTER JOIN`, …) into
//! single compound keywords carrying their canonical text.

use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use bagql_error::{ErrorCode, ParserError, Property, Result};
use bagql_value::{Timestamp, Value};
use memchr::memchr;
use rust_decimal::Decimal;

use crate::position::PositionMap;
use crate::token::{DatePart, Keyword, Token, TokenKind, TrimSpec};

// ---------------------------------------------------------------------------
// Lex metrics
// ---------------------------------------------------------------------------

/// Monotonic counter of tokens produced (folded, including EOF).
static BAGQL_LEX_TOKENS_TOTAL: AtomicU64 = AtomicU64::new(0);

/// Point-in-time lex metrics snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LexMetricsSnapshot {
    /// Total tokens produced across all inputs.
    pub bagql_lex_tokens_total: u64,
}

/// Take a point-in-time snapshot of lex metrics.
#[must_use]
pub fn lex_metrics_snapshot() -> LexMetricsSnapshot {
    LexMetricsSnapshot {
        bagql_lex_tokens_total: BAGQL_LEX_TOKENS_TOTAL.load(Ordering::Relaxed),
    }
}

/// Reset lex metrics (used by tests/diagnostics).
pub fn reset_lex_metrics() {
    BAGQL_LEX_TOKENS_TOTAL.store(0, Ordering::Relaxed);
}

// ---------------------------------------------------------------------------
// Lexer
// ---------------------------------------------------------------------------

/// Tokenizer over one query text.
pub struct Lexer<'a> {
    /// The source bytes (UTF-8).
    src: &'a [u8],
    /// Current byte offset into src.
    pos: usize,
    positions: PositionMap,
}

impl<'a> Lexer<'a> {
    /// Create a new lexer for the given query text.
    #[must_use]
    pub fn new(source: &'a str) -> Self {
        Self {
            src: source.as_bytes(),
            pos: 0,
            positions: PositionMap::new(source),
        }
    }

    /// Tokenize the entire input, including the folding pass.
    ///
    /// The returned vector always ends with an `Eof` token.
    pub fn tokenize(source: &'a str) -> Result<Vec<Token>> {
        let mut lexer = Self::new(source);
        let mut tokens = Vec::new();
        loop {
            let tok = lexer.next_token()?;
            let is_eof = tok.kind == TokenKind::Eof;
            tokens.push(tok);
            if is_eof {
                break;
            }
        }
        let folded = fold_keywords(tokens);
        BAGQL_LEX_TOKENS_TOTAL.fetch_add(folded.len() as u64, Ordering::Relaxed);
        Ok(folded)
    }

    /// Produce the next raw token.
    fn next_token(&mut self) -> Result<Token> {
        self.skip_whitespace_and_comments();

        let start = self.pos;
        if self.pos >= self.src.len() {
            return Ok(self.make_token(TokenKind::Eof, start));
        }

        let ch = self.src[self.pos];
        let kind = match ch {
            b'\'' => self.lex_string()?,
            b'"' => self.lex_quoted_id()?,
            b'`' => self.lex_timestamp()?,
            b'0'..=b'9' => self.lex_number()?,
            b'a'..=b'z' | b'A'..=b'Z' | b'_' => self.lex_word(),

            b'(' => self.single(TokenKind::LeftParen),
            b')' => self.single(TokenKind::RightParen),
            b'[' => self.single(TokenKind::LeftBracket),
            b']' => self.single(TokenKind::RightBracket),
            b'{' => self.single(TokenKind::LeftCurly),
            b'}' => self.single(TokenKind::RightCurly),
            b',' => self.single(TokenKind::Comma),
            b':' => self.single(TokenKind::Colon),
            b';' => self.single(TokenKind::Semicolon),
            b'.' => self.single(TokenKind::Dot),
            b'*' => self.single(TokenKind::Star),
            b'@' => self.single(TokenKind::AtSign),
            b'+' => self.single(TokenKind::Plus),
            b'-' => self.single(TokenKind::Minus),
            b'/' => self.single(TokenKind::Slash),
            b'%' => self.single(TokenKind::Percent),
            b'=' => self.single(TokenKind::Eq),

            b'<' => {
                self.pos += 1;
                match self.peek() {
                    Some(b'=') => self.single(TokenKind::Le),
                    Some(b'>') => self.single(TokenKind::Ne),
                    Some(b'<') => self.single(TokenKind::LeftDoubleAngle),
                    _ => TokenKind::Lt,
                }
            }
            b'>' => {
                self.pos += 1;
                match self.peek() {
                    Some(b'=') => self.single(TokenKind::Ge),
                    Some(b'>') => self.single(TokenKind::RightDoubleAngle),
                    _ => TokenKind::Gt,
                }
            }
            b'|' => {
                self.pos += 1;
                if self.peek() == Some(b'|') {
                    self.single(TokenKind::Concat)
                } else {
                    return Err(self.err_at(
                        ErrorCode::LexInvalidChar,
                        "unexpected `|`, did you mean `||`?",
                        start,
                    ));
                }
            }
            b'!' => {
                self.pos += 1;
                if self.peek() == Some(b'=') {
                    self.single(TokenKind::Ne)
                } else {
                    return Err(self.err_at(
                        ErrorCode::LexInvalidChar,
                        "unexpected `!`, did you mean `!=`?",
                        start,
                    ));
                }
            }

            _ => {
                // Step over one whole UTF-8 character for the message.
                let text = std::str::from_utf8(&self.src[start..])
                    .ok()
                    .and_then(|s| s.chars().next())
                    .map_or_else(|| "?".to_owned(), |c| c.to_string());
                return Err(self
                    .err_at(
                        ErrorCode::LexInvalidChar,
                        format!("invalid character `{text}`"),
                        start,
                    )
                    .with_text(Property::TokenString, text));
            }
        };

        Ok(self.make_token(kind, start))
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.src.get(self.pos + offset).copied()
    }

    /// Consume the current byte and return the given kind.
    fn single(&mut self, kind: TokenKind) -> TokenKind {
        self.pos += 1;
        kind
    }

    fn make_token(&self, kind: TokenKind, start: usize) -> Token {
        Token {
            kind,
            offset: start,
            pos: self.positions.lookup(start),
        }
    }

    fn err_at(&self, code: ErrorCode, message: impl Into<String>, offset: usize) -> ParserError {
        let pos = self.positions.lookup(offset);
        ParserError::new(code, message, pos.line, pos.column)
    }

    /// Skip whitespace, line comments (`-- …`), and block comments.
    fn skip_whitespace_and_comments(&mut self) {
        loop {
            while self.pos < self.src.len() && self.src[self.pos].is_ascii_whitespace() {
                self.pos += 1;
            }
            if self.src.get(self.pos) == Some(&b'-') && self.peek_at(1) == Some(b'-') {
                while self.pos < self.src.len() && self.src[self.pos] != b'\n' {
                    self.pos += 1;
                }
                continue;
            }
            if self.src.get(self.pos) == Some(&b'/') && self.peek_at(1) == Some(b'*') {
                self.pos += 2;
                while self.pos < self.src.len() {
                    if self.src[self.pos] == b'*' && self.peek_at(1) == Some(b'/') {
                        self.pos += 2;
                        break;
                    }
                    self.pos += 1;
                }
                continue;
            }
            break;
        }
    }

    /// Scan a quote-delimited region with doubled-quote escapes.
    /// On entry `self.pos` is at the opening quote.
    fn lex_delimited(&mut self, quote: u8) -> Option<String> {
        self.pos += 1;
        let mut value = String::new();
        loop {
            let remaining = &self.src[self.pos..];
            match memchr(quote, remaining) {
                Some(offset) => {
                    value.push_str(&String::from_utf8_lossy(
                        &self.src[self.pos..self.pos + offset],
                    ));
                    self.pos += offset + 1;
                    // Doubled quote is an escape.
                    if self.peek() == Some(quote) {
                        value.push(char::from(quote));
                        self.pos += 1;
                    } else {
                        return Some(value);
                    }
                }
                None => {
                    self.pos = self.src.len();
                    return None;
                }
            }
        }
    }

    /// Single-quoted string literal.
    fn lex_string(&mut self) -> Result<TokenKind> {
        let start = self.pos;
        match self.lex_delimited(b'\'') {
            Some(value) => Ok(TokenKind::Literal(Value::String(value))),
            None => Err(self.err_at(
                ErrorCode::LexUnterminatedString,
                "unterminated string literal",
                start,
            )),
        }
    }

    /// Double-quoted (case-sensitive) identifier.
    fn lex_quoted_id(&mut self) -> Result<TokenKind> {
        let start = self.pos;
        match self.lex_delimited(b'"') {
            Some(value) => Ok(TokenKind::QuotedId(value)),
            None => Err(self.err_at(
                ErrorCode::LexUnterminatedString,
                "unterminated quoted identifier",
                start,
            )),
        }
    }

    /// Backtick-delimited timestamp literal.
    fn lex_timestamp(&mut self) -> Result<TokenKind> {
        let start = self.pos;
        self.pos += 1;
        let remaining = &self.src[self.pos..];
        let Some(offset) = memchr(b'`', remaining) else {
            self.pos = self.src.len();
            return Err(self.err_at(
                ErrorCode::LexUnterminatedString,
                "unterminated timestamp literal",
                start,
            ));
        };
        let text = String::from_utf8_lossy(&self.src[self.pos..self.pos + offset]).into_owned();
        self.pos += offset + 1;
        match Timestamp::from_str(text.trim()) {
            Ok(ts) => Ok(TokenKind::Literal(Value::Timestamp(ts))),
            Err(err) => Err(self
                .err_at(ErrorCode::LexInvalidTimestamp, err.to_string(), start)
                .with_text(Property::TokenString, text)),
        }
    }

    /// Integer or decimal literal, with optional exponent.
    fn lex_number(&mut self) -> Result<TokenKind> {
        let start = self.pos;
        while self.pos < self.src.len() && self.src[self.pos].is_ascii_digit() {
            self.pos += 1;
        }

        let mut is_decimal = false;
        if self.peek() == Some(b'.') && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
            is_decimal = true;
            self.pos += 1;
            while self.pos < self.src.len() && self.src[self.pos].is_ascii_digit() {
                self.pos += 1;
            }
        }

        let mut has_exponent = false;
        if matches!(self.peek(), Some(b'e' | b'E')) {
            let exp_digit_at = match self.peek_at(1) {
                Some(b'+' | b'-') => 2,
                _ => 1,
            };
            if self.peek_at(exp_digit_at).is_some_and(|c| c.is_ascii_digit()) {
                is_decimal = true;
                has_exponent = true;
                self.pos += exp_digit_at;
                while self.pos < self.src.len() && self.src[self.pos].is_ascii_digit() {
                    self.pos += 1;
                }
            }
        }

        let text = String::from_utf8_lossy(&self.src[start..self.pos]).into_owned();
        if is_decimal {
            let parsed = if has_exponent {
                Decimal::from_scientific(&text)
            } else {
                Decimal::from_str(&text)
            };
            match parsed {
                Ok(d) => Ok(TokenKind::Literal(Value::Decimal(d))),
                Err(_) => Err(self
                    .err_at(
                        ErrorCode::LexInvalidLiteral,
                        format!("invalid decimal literal `{text}`"),
                        start,
                    )
                    .with_text(Property::TokenString, text)),
            }
        } else {
            match text.parse::<i64>() {
                Ok(i) => Ok(TokenKind::Literal(Value::Integer(i))),
                Err(_) => Err(self
                    .err_at(
                        ErrorCode::LexInvalidLiteral,
                        format!("integer literal `{text}` out of range"),
                        start,
                    )
                    .with_text(Property::TokenString, text)),
            }
        }
    }

    /// Identifier, keyword, trim specification, or date part.
    fn lex_word(&mut self) -> TokenKind {
        let start = self.pos;
        self.pos += 1;
        while self.pos < self.src.len() {
            let ch = self.src[self.pos];
            if ch.is_ascii_alphanumeric() || ch == b'_' {
                self.pos += 1;
            } else {
                break;
            }
        }
        let text = String::from_utf8_lossy(&self.src[start..self.pos]).into_owned();

        match text.to_ascii_lowercase().as_str() {
            "null" => TokenKind::Null,
            "missing" => TokenKind::Missing,
            "as" => TokenKind::As,
            "at" => TokenKind::At,
            "for" => TokenKind::For,
            lower => {
                if let Some(spec) = TrimSpec::lookup(lower) {
                    TokenKind::TrimSpec(spec)
                } else if let Some(part) = DatePart::lookup(lower) {
                    TokenKind::DatePart(part)
                } else if let Some(kw) = Keyword::lookup(lower) {
                    TokenKind::Keyword(kw)
                } else {
                    TokenKind::Id(text)
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Keyword folding
// ---------------------------------------------------------------------------

fn keyword_at(tokens: &[Token], idx: usize) -> Option<Keyword> {
    match tokens.get(idx).map(|t| &t.kind) {
        Some(TokenKind::Keyword(k)) => Some(*k),
        _ => None,
    }
}

/// Collapse multi-word keyword sequences into compound keywords.
///
/// The folded token takes the position of the first word. `CROSS JOIN`
/// folds to `inner_join`; the parser supplies its literal-`true` condition.
#[must_use]
pub fn fold_keywords(tokens: Vec<Token>) -> Vec<Token> {
    use Keyword::{
        Between, Character, CharacterVarying, Cross, Double, DoublePrecision, Full, In, Inner,
        InnerJoin, Is, IsNot, Join, Left, LeftJoin, Like, Not, NotBetween, NotIn, NotLike, Outer,
        OuterJoin, Precision, Right, RightJoin, Varying,
    };

    let mut out = Vec::with_capacity(tokens.len());
    let mut i = 0;
    while i < tokens.len() {
        let folded = keyword_at(&tokens, i).and_then(|kw| {
            let next = keyword_at(&tokens, i + 1);
            let after = keyword_at(&tokens, i + 2);
            match (kw, next, after) {
                (Is, Some(Not), _) => Some((IsNot, 2)),
                (Not, Some(Between), _) => Some((NotBetween, 2)),
                (Not, Some(Like), _) => Some((NotLike, 2)),
                (Not, Some(In), _) => Some((NotIn, 2)),
                (Left, Some(Outer), Some(Join)) => Some((LeftJoin, 3)),
                (Left, Some(Join), _) => Some((LeftJoin, 2)),
                (Right, Some(Outer), Some(Join)) => Some((RightJoin, 3)),
                (Right, Some(Join), _) => Some((RightJoin, 2)),
                (Full, Some(Outer), Some(Join)) => Some((OuterJoin, 3)),
                (Full, Some(Join), _) => Some((OuterJoin, 2)),
                (Inner, Some(Join), _) => Some((InnerJoin, 2)),
                (Cross, Some(Join), _) => Some((InnerJoin, 2)),
                (Double, Some(Precision), _) => Some((DoublePrecision, 2)),
                (Character, Some(Varying), _) => Some((CharacterVarying, 2)),
                _ => None,
            }
        });

        match folded {
            Some((compound, consumed)) => {
                out.push(Token {
                    kind: TokenKind::Keyword(compound),
                    offset: tokens[i].offset,
                    pos: tokens[i].pos,
                });
                i += consumed;
            }
            None => {
                out.push(tokens[i].clone());
                i += 1;
            }
        }
    }
    out
}
