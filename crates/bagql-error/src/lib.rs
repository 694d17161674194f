//! Structured errors for the BagQL front end.
//!
//! A failed lex or parse produces exactly one [`ParserError`]: a closed
//! [`ErrorCode`], a human-readable message, the best available source
//! position, and a small keyed property bag with code-specific details.
//! The catalogue is part of the external contract; adding or renaming a
//! code is a breaking change.

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

// ---------------------------------------------------------------------------
// Error codes
// ---------------------------------------------------------------------------

/// Closed catalogue of front-end error conditions.
///
/// `Semantic*` and `Evaluator*` codes are never raised by the parser; they
/// are defined here so downstream passes share one catalogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // Lexical
    LexInvalidChar,
    LexInvalidLiteral,
    LexUnterminatedString,
    LexInvalidTimestamp,

    // Parse, structural
    ParseExpectedTokenType,
    ParseExpected2TokenTypes,
    ParseExpectedExpression,
    ParseExpectedKeyword,
    ParseUnexpectedToken,
    ParseUnexpectedTerm,
    ParseUnknownOperator,
    ParseMalformedParseTree,

    // Parse, semantic
    ParseExpectedIdentForAlias,
    ParseExpectedIdentForAt,
    ParseExpectedIdentForGroupName,
    ParseEmptySelect,
    ParseSelectMissingFrom,
    ParseAsteriskIsNotAloneInSelectList,
    ParseInvalidPathComponent,
    ParseInvalidContextForWildcardInSelectList,
    ParseCannotMixSqbAndWildcardInSelectList,
    ParseUnsupportedLiteralsGroupBy,
    ParseNonUnaryAggregateFunctionCall,
    ParseUnsupportedCallWithStar,
    ParseCastArity,
    ParseInvalidTypeParam,
    ParseExpectedTypeName,
    ParseMissingIdentAfterAt,
    ParseExpectedLeftParenAfterCast,
    ParseExpectedLeftParenBuiltinFunctionCall,
    ParseExpectedRightParenBuiltinFunctionCall,
    ParseExpectedArgumentDelimiter,
    ParseExpectedWhenClause,
    ParseExpectedDatePart,

    // Downstream passes (interface completeness)
    SemanticHavingUsedWithoutGroupBy,
    EvaluatorBindingDoesNotExist,
}

impl ErrorCode {
    /// The stable wire name of this code.
    #[must_use]
    #[allow(clippy::too_many_lines)]
    pub const fn name(self) -> &'static str {
        match self {
            Self::LexInvalidChar => "LEX_INVALID_CHAR",
            Self::LexInvalidLiteral => "LEX_INVALID_LITERAL",
            Self::LexUnterminatedString => "LEX_UNTERMINATED_STRING",
            Self::LexInvalidTimestamp => "LEX_INVALID_TIMESTAMP",
            Self::ParseExpectedTokenType => "PARSE_EXPECTED_TOKEN_TYPE",
            Self::ParseExpected2TokenTypes => "PARSE_EXPECTED_2_TOKEN_TYPES",
            Self::ParseExpectedExpression => "PARSE_EXPECTED_EXPRESSION",
            Self::ParseExpectedKeyword => "PARSE_EXPECTED_KEYWORD",
            Self::ParseUnexpectedToken => "PARSE_UNEXPECTED_TOKEN",
            Self::ParseUnexpectedTerm => "PARSE_UNEXPECTED_TERM",
            Self::ParseUnknownOperator => "PARSE_UNKNOWN_OPERATOR",
            Self::ParseMalformedParseTree => "PARSE_MALFORMED_PARSE_TREE",
            Self::ParseExpectedIdentForAlias => "PARSE_EXPECTED_IDENT_FOR_ALIAS",
            Self::ParseExpectedIdentForAt => "PARSE_EXPECTED_IDENT_FOR_AT",
            Self::ParseExpectedIdentForGroupName => "PARSE_EXPECTED_IDENT_FOR_GROUP_NAME",
            Self::ParseEmptySelect => "PARSE_EMPTY_SELECT",
            Self::ParseSelectMissingFrom => "PARSE_SELECT_MISSING_FROM",
            Self::ParseAsteriskIsNotAloneInSelectList => {
                "PARSE_ASTERISK_IS_NOT_ALONE_IN_SELECT_LIST"
            }
            Self::ParseInvalidPathComponent => "PARSE_INVALID_PATH_COMPONENT",
            Self::ParseInvalidContextForWildcardInSelectList => {
                "PARSE_INVALID_CONTEXT_FOR_WILDCARD_IN_SELECT_LIST"
            }
            Self::ParseCannotMixSqbAndWildcardInSelectList => {
                "PARSE_CANNOT_MIX_SQB_AND_WILDCARD_IN_SELECT_LIST"
            }
            Self::ParseUnsupportedLiteralsGroupBy => "PARSE_UNSUPPORTED_LITERALS_GROUPBY",
            Self::ParseNonUnaryAggregateFunctionCall => {
                "PARSE_NON_UNARY_AGGREGATE_FUNCTION_CALL"
            }
            Self::ParseUnsupportedCallWithStar => "PARSE_UNSUPPORTED_CALL_WITH_STAR",
            Self::ParseCastArity => "PARSE_CAST_ARITY",
            Self::ParseInvalidTypeParam => "PARSE_INVALID_TYPE_PARAM",
            Self::ParseExpectedTypeName => "PARSE_EXPECTED_TYPE_NAME",
            Self::ParseMissingIdentAfterAt => "PARSE_MISSING_IDENT_AFTER_AT",
            Self::ParseExpectedLeftParenAfterCast => "PARSE_EXPECTED_LEFT_PAREN_AFTER_CAST",
            Self::ParseExpectedLeftParenBuiltinFunctionCall => {
                "PARSE_EXPECTED_LEFT_PAREN_BUILTIN_FUNCTION_CALL"
            }
            Self::ParseExpectedRightParenBuiltinFunctionCall => {
                "PARSE_EXPECTED_RIGHT_PAREN_BUILTIN_FUNCTION_CALL"
            }
            Self::ParseExpectedArgumentDelimiter => "PARSE_EXPECTED_ARGUMENT_DELIMITER",
            Self::ParseExpectedWhenClause => "PARSE_EXPECTED_WHEN_CLAUSE",
            Self::ParseExpectedDatePart => "PARSE_EXPECTED_DATE_PART",
            Self::SemanticHavingUsedWithoutGroupBy => "SEMANTIC_HAVING_USED_WITHOUT_GROUP_BY",
            Self::EvaluatorBindingDoesNotExist => "EVALUATOR_BINDING_DOES_NOT_EXIST",
        }
    }

    /// Whether this code is produced by the lexer.
    #[must_use]
    pub const fn is_lexical(self) -> bool {
        matches!(
            self,
            Self::LexInvalidChar
                | Self::LexInvalidLiteral
                | Self::LexUnterminatedString
                | Self::LexInvalidTimestamp
        )
    }

    /// Whether this code belongs to a downstream pass rather than the parser.
    #[must_use]
    pub const fn is_downstream(self) -> bool {
        matches!(
            self,
            Self::SemanticHavingUsedWithoutGroupBy | Self::EvaluatorBindingDoesNotExist
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Property bag
// ---------------------------------------------------------------------------

/// Keys of the per-error property bag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Property {
    LineNumber,
    ColumnNumber,
    TokenString,
    TokenType,
    ExpectedTokenType,
    ExpectedKeyword,
    CastTo,
    ExpectedArityMin,
    ExpectedArityMax,
    BindingName,
}

/// A scalar property value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyValue {
    Int(i64),
    Text(String),
}

impl PropertyValue {
    /// The integer payload, if any.
    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Text(_) => None,
        }
    }

    /// The text payload, if any.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Int(_) => None,
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(i) => write!(f, "{i}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

// ---------------------------------------------------------------------------
// ParserError
// ---------------------------------------------------------------------------

/// A single front-end failure.
///
/// Positions are 1-based; `(0, 0)` means no position was available.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code} at {line}:{column}: {message}")]
pub struct ParserError {
    /// The catalogue code.
    pub code: ErrorCode,
    /// Free-form description.
    pub message: String,
    /// 1-based source line.
    pub line: u32,
    /// 1-based source column.
    pub column: u32,
    properties: BTreeMap<Property, PropertyValue>,
}

impl ParserError {
    /// Create an error at the given source position.
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>, line: u32, column: u32) -> Self {
        Self {
            code,
            message: message.into(),
            line,
            column,
            properties: BTreeMap::new(),
        }
    }

    /// Attach a code-specific property.
    #[must_use]
    pub fn with(mut self, key: Property, value: PropertyValue) -> Self {
        self.properties.insert(key, value);
        self
    }

    /// Attach a text property.
    #[must_use]
    pub fn with_text(self, key: Property, value: impl Into<String>) -> Self {
        self.with(key, PropertyValue::Text(value.into()))
    }

    /// Attach an integer property.
    #[must_use]
    pub fn with_int(self, key: Property, value: i64) -> Self {
        self.with(key, PropertyValue::Int(value))
    }

    /// Look up a property. Positions are always present.
    #[must_use]
    pub fn property(&self, key: Property) -> Option<PropertyValue> {
        match key {
            Property::LineNumber => Some(PropertyValue::Int(i64::from(self.line))),
            Property::ColumnNumber => Some(PropertyValue::Int(i64::from(self.column))),
            _ => self.properties.get(&key).cloned(),
        }
    }
}

/// Result alias using [`ParserError`].
pub type Result<T> = std::result::Result<T, ParserError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_carries_code_and_position() {
        let err = ParserError::new(ErrorCode::ParseCastArity, "too many type arguments", 3, 14);
        assert_eq!(
            err.to_string(),
            "PARSE_CAST_ARITY at 3:14: too many type arguments"
        );
    }

    #[test]
    fn test_position_properties_always_present() {
        let err = ParserError::new(ErrorCode::LexInvalidChar, "bad char", 2, 7);
        assert_eq!(
            err.property(Property::LineNumber),
            Some(PropertyValue::Int(2))
        );
        assert_eq!(
            err.property(Property::ColumnNumber),
            Some(PropertyValue::Int(7))
        );
        assert_eq!(err.property(Property::CastTo), None);
    }

    #[test]
    fn test_code_specific_properties() {
        let err = ParserError::new(ErrorCode::ParseCastArity, "arity", 1, 1)
            .with_text(Property::CastTo, "decimal")
            .with_int(Property::ExpectedArityMin, 0)
            .with_int(Property::ExpectedArityMax, 2);
        assert_eq!(
            err.property(Property::CastTo).and_then(|v| v.as_text().map(str::to_owned)),
            Some("decimal".to_owned())
        );
        assert_eq!(
            err.property(Property::ExpectedArityMax).and_then(|v| v.as_int()),
            Some(2)
        );
    }

    #[test]
    fn test_code_classification() {
        assert!(ErrorCode::LexUnterminatedString.is_lexical());
        assert!(!ErrorCode::ParseEmptySelect.is_lexical());
        assert!(ErrorCode::SemanticHavingUsedWithoutGroupBy.is_downstream());
        assert!(!ErrorCode::ParseUnexpectedToken.is_downstream());
    }

    #[test]
    fn test_wire_names() {
        assert_eq!(ErrorCode::ParseEmptySelect.name(), "PARSE_EMPTY_SELECT");
        assert_eq!(
            ErrorCode::ParseCannotMixSqbAndWildcardInSelectList.name(),
            "PARSE_CANNOT_MIX_SQB_AND_WILDCARD_IN_SELECT_LIST"
        );
    }
}
