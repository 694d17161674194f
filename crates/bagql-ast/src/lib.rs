//! Abstract syntax tree node types for BagQL.
//!
//! The parser emits a tree of these nodes for every query. Each node
//! carries a [`Metas`] bag holding its source location and any semantic
//! markers picked up during parsing. One sum type per syntactic category
//! keeps downstream pattern matching exhaustive.

pub mod sexp;

use std::fmt;

use bagql_value::Value;

// ---------------------------------------------------------------------------
// Source locations and metas
// ---------------------------------------------------------------------------

/// A 1-based line/column position in the query text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceLocation {
    pub line: u32,
    pub column: u32,
}

impl SourceLocation {
    #[must_use]
    pub const fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A single annotation attached to an AST node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Meta {
    /// Where in the source the node's anchor token sits.
    SourceLocation(SourceLocation),
    /// The node is a `NOT` wrapper synthesized from a negated surface
    /// operator (`IS NOT`, `NOT LIKE`, `NOT BETWEEN`, `NOT IN`).
    LegacyLogicalNot,
    /// The join was written as a comma in the FROM list.
    IsImplicitJoin,
    /// The path component was written as a `[expr]` subscript rather than
    /// a dotted name. Select-list project-all validation needs this.
    PathSubscript,
}

impl Meta {
    /// Stable tag string for this annotation kind.
    #[must_use]
    pub const fn tag(&self) -> &'static str {
        match self {
            Self::SourceLocation(_) => "source_location",
            Self::LegacyLogicalNot => "legacy_logical_not",
            Self::IsImplicitJoin => "is_implicit_join",
            Self::PathSubscript => "path_subscript",
        }
    }
}

/// The keyed annotation bag carried by every AST node.
///
/// Metas are annotations, not semantics: two `Metas` values always compare
/// equal, so derived `PartialEq` on AST nodes is structural identity up to
/// metas.
#[derive(Debug, Clone, Default, Eq)]
pub struct Metas(Vec<Meta>);

impl PartialEq for Metas {
    fn eq(&self, _other: &Self) -> bool {
        true
    }
}

impl Metas {
    /// An empty bag, for synthetic nodes with no originating token.
    #[must_use]
    pub const fn none() -> Self {
        Self(Vec::new())
    }

    /// A bag holding just a source location.
    #[must_use]
    pub fn at(loc: SourceLocation) -> Self {
        Self(vec![Meta::SourceLocation(loc)])
    }

    /// Add an annotation, replacing any existing one with the same tag.
    #[must_use]
    pub fn with(mut self, meta: Meta) -> Self {
        self.insert(meta);
        self
    }

    /// In-place variant of [`Metas::with`].
    pub fn insert(&mut self, meta: Meta) {
        self.0.retain(|m| m.tag() != meta.tag());
        self.0.push(meta);
    }

    /// The source location, if one is attached.
    #[must_use]
    pub fn source_location(&self) -> Option<SourceLocation> {
        self.0.iter().find_map(|m| match m {
            Meta::SourceLocation(loc) => Some(*loc),
            _ => None,
        })
    }

    /// Whether an annotation with the given tag is present.
    #[must_use]
    pub fn has(&self, tag: &str) -> bool {
        self.0.iter().any(|m| m.tag() == tag)
    }

    /// Iterate over the annotations.
    pub fn iter(&self) -> impl Iterator<Item = &Meta> {
        self.0.iter()
    }
}

// ---------------------------------------------------------------------------
// Enumerations shared across node kinds
// ---------------------------------------------------------------------------

/// Whether an identifier matches bindings case-sensitively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CaseSensitivity {
    /// Written as a quoted identifier.
    Sensitive,
    /// Written bare.
    Insensitive,
}

/// How a variable reference resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeQualifier {
    /// Ordinary lookup through all enclosing scopes.
    Unqualified,
    /// `@name`: the lexically nearest binding only.
    Lexical,
}

/// `ALL` (the default) or `DISTINCT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SetQuantifier {
    #[default]
    All,
    Distinct,
}

/// Operator of an [`Expr::NAry`] node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NAryOp {
    Not,
    And,
    Or,
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Concat,
    Like,
    In,
    Between,
    /// Function call; `args[0]` is the function reference.
    Call,
}

impl NAryOp {
    /// The operator's surface/portable spelling.
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Not => "not",
            Self::And => "and",
            Self::Or => "or",
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Mod => "%",
            Self::Concat => "||",
            Self::Like => "like",
            Self::In => "in",
            Self::Between => "between",
            Self::Call => "call",
        }
    }
}

impl fmt::Display for NAryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Operator of an [`Expr::Typed`] node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypedOp {
    Cast,
    Is,
}

impl fmt::Display for TypedOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Cast => "cast",
            Self::Is => "is",
        })
    }
}

/// Join operator of a [`FromSource::Join`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinOp {
    Inner,
    Left,
    Right,
    Outer,
}

impl fmt::Display for JoinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Inner => "inner_join",
            Self::Left => "left_join",
            Self::Right => "right_join",
            Self::Outer => "outer_join",
        })
    }
}

// ---------------------------------------------------------------------------
// Data types
// ---------------------------------------------------------------------------

/// The SQL-92-plus-document type lexicon usable in `CAST` and `IS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlType {
    Null,
    Missing,
    Boolean,
    SmallInt,
    Integer,
    Float,
    Real,
    DoublePrecision,
    Decimal,
    Numeric,
    Timestamp,
    Character,
    CharacterVarying,
    String,
    Symbol,
    Struct,
    List,
    Bag,
}

impl SqlType {
    /// Canonical lowercase name, as used in the portable form.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Missing => "missing",
            Self::Boolean => "boolean",
            Self::SmallInt => "smallint",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Real => "real",
            Self::DoublePrecision => "double_precision",
            Self::Decimal => "decimal",
            Self::Numeric => "numeric",
            Self::Timestamp => "timestamp",
            Self::Character => "character",
            Self::CharacterVarying => "character_varying",
            Self::String => "string",
            Self::Symbol => "symbol",
            Self::Struct => "struct",
            Self::List => "list",
            Self::Bag => "bag",
        }
    }

    /// How many integer parameters the type accepts.
    ///
    /// Part of the external contract; see `PARSE_CAST_ARITY`.
    #[must_use]
    pub const fn arity(self) -> (usize, usize) {
        match self {
            Self::Character | Self::CharacterVarying | Self::Float | Self::Timestamp => (0, 1),
            Self::Decimal | Self::Numeric => (0, 2),
            _ => (0, 0),
        }
    }
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A type expression: a type name plus its integer parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct DataType {
    pub sql_type: SqlType,
    /// Parameters as written, e.g. `[10, 2]` for `DECIMAL(10, 2)`.
    pub args: Vec<u64>,
    pub metas: Metas,
}

// ---------------------------------------------------------------------------
// Expressions
// ---------------------------------------------------------------------------

/// An expression node.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A literal value.
    Lit { value: Value, metas: Metas },

    /// The `MISSING` literal. Distinct from `NULL` in the data model.
    LitMissing { metas: Metas },

    /// A variable (binding) reference.
    VarRef {
        name: String,
        case: CaseSensitivity,
        scope: ScopeQualifier,
        metas: Metas,
    },

    /// `[a, b, c]` or a parenthesized group of two or more expressions.
    List { items: Vec<Expr>, metas: Metas },

    /// `<< a, b, c >>`.
    Bag { items: Vec<Expr>, metas: Metas },

    /// `{ k1: v1, k2: v2 }`. Keys are expressions.
    Struct {
        fields: Vec<StructField>,
        metas: Metas,
    },

    /// An operator application, `NOT` wrapper, or function call.
    NAry {
        op: NAryOp,
        args: Vec<Expr>,
        metas: Metas,
    },

    /// `CAST(e AS t)` or `e IS t`.
    Typed {
        op: TypedOp,
        expr: Box<Expr>,
        data_type: DataType,
        metas: Metas,
    },

    /// Navigation into nested data. Always has at least one component;
    /// a suffix-free term stays a bare term instead.
    Path {
        root: Box<Expr>,
        components: Vec<PathComponent>,
        metas: Metas,
    },

    /// `CASE operand WHEN … THEN … [ELSE …] END`.
    SimpleCase {
        operand: Box<Expr>,
        whens: Vec<WhenBranch>,
        else_expr: Option<Box<Expr>>,
        metas: Metas,
    },

    /// `CASE WHEN cond THEN … [ELSE …] END`.
    SearchedCase {
        whens: Vec<WhenBranch>,
        else_expr: Option<Box<Expr>>,
        metas: Metas,
    },

    /// An aggregate call. Always unary.
    CallAgg {
        func: String,
        quantifier: SetQuantifier,
        arg: Box<Expr>,
        metas: Metas,
    },

    /// `COUNT(*)`, the only wildcard-argument aggregate.
    CallAggWildcard { func: String, metas: Metas },

    /// A select-from-where block.
    Select(Box<Select>),
}

impl Expr {
    /// The metas bag of this node.
    #[must_use]
    pub const fn metas(&self) -> &Metas {
        match self {
            Self::Lit { metas, .. }
            | Self::LitMissing { metas }
            | Self::VarRef { metas, .. }
            | Self::List { metas, .. }
            | Self::Bag { metas, .. }
            | Self::Struct { metas, .. }
            | Self::NAry { metas, .. }
            | Self::Typed { metas, .. }
            | Self::Path { metas, .. }
            | Self::SimpleCase { metas, .. }
            | Self::SearchedCase { metas, .. }
            | Self::CallAgg { metas, .. }
            | Self::CallAggWildcard { metas, .. } => metas,
            Self::Select(select) => &select.metas,
        }
    }

    /// Mutable access to the metas bag.
    pub fn metas_mut(&mut self) -> &mut Metas {
        match self {
            Self::Lit { metas, .. }
            | Self::LitMissing { metas }
            | Self::VarRef { metas, .. }
            | Self::List { metas, .. }
            | Self::Bag { metas, .. }
            | Self::Struct { metas, .. }
            | Self::NAry { metas, .. }
            | Self::Typed { metas, .. }
            | Self::Path { metas, .. }
            | Self::SimpleCase { metas, .. }
            | Self::SearchedCase { metas, .. }
            | Self::CallAgg { metas, .. }
            | Self::CallAggWildcard { metas, .. } => metas,
            Self::Select(select) => &mut select.metas,
        }
    }

    /// The node's source location, if its metas carry one.
    #[must_use]
    pub fn source_location(&self) -> Option<SourceLocation> {
        self.metas().source_location()
    }
}

/// One `key: value` member of a struct constructor.
#[derive(Debug, Clone, PartialEq)]
pub struct StructField {
    pub key: Expr,
    pub value: Expr,
}

/// One `WHEN … THEN …` arm of a CASE expression.
#[derive(Debug, Clone, PartialEq)]
pub struct WhenBranch {
    /// The comparand (simple CASE) or condition (searched CASE).
    pub condition: Expr,
    pub result: Expr,
}

/// One step of a path expression.
#[derive(Debug, Clone, PartialEq)]
pub enum PathComponent {
    /// `.name`, `."name"`, or `[expr]`.
    Expr { expr: Expr, case: CaseSensitivity },
    /// `[*]`.
    Wildcard,
    /// `.*`.
    Unpivot,
}

// ---------------------------------------------------------------------------
// SELECT
// ---------------------------------------------------------------------------

/// A select-from-where block.
#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    pub quantifier: SetQuantifier,
    pub projection: SelectProjection,
    pub from: FromSource,
    pub where_clause: Option<Box<Expr>>,
    pub group_by: Option<GroupBy>,
    pub having: Option<Box<Expr>>,
    pub limit: Option<Box<Expr>>,
    pub metas: Metas,
}

/// What a SELECT projects.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectProjection {
    /// `SELECT item, item, …`.
    List(Vec<SelectListItem>),
    /// `SELECT VALUE expr`.
    Value(Box<Expr>),
    /// `PIVOT value AT key`.
    Pivot { key: Box<Expr>, value: Box<Expr> },
}

/// One item of a projection list.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectListItem {
    /// Bare `*`. Only legal as the sole item.
    Star { metas: Metas },
    /// `expr.path.*`: project every attribute of the prefix.
    ProjectAll { expr: Expr },
    /// `expr [AS alias]`.
    Expr {
        expr: Expr,
        as_alias: Option<String>,
    },
}

/// One source in the FROM clause.
#[derive(Debug, Clone, PartialEq)]
pub enum FromSource {
    /// `expr [AS a] [AT b]`.
    Expr {
        expr: Box<Expr>,
        as_alias: Option<String>,
        at_alias: Option<String>,
    },
    /// `UNPIVOT expr [AS a] [AT b]`.
    Unpivot {
        expr: Box<Expr>,
        as_alias: Option<String>,
        at_alias: Option<String>,
        metas: Metas,
    },
    /// Two sources joined. Comma joins carry the `is_implicit_join` meta
    /// and a literal-`true` condition.
    Join {
        op: JoinOp,
        left: Box<FromSource>,
        right: Box<FromSource>,
        condition: Box<Expr>,
        metas: Metas,
    },
}

/// `GROUP [PARTIAL] BY` specification.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupBy {
    pub strategy: GroupingStrategy,
    pub items: Vec<GroupByItem>,
    /// `GROUP AS name`: binds each group's rows to a named bag.
    pub group_as: Option<String>,
}

/// `FULL` (plain `GROUP BY`) or `PARTIAL`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GroupingStrategy {
    Full,
    Partial,
}

/// One grouping key.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupByItem {
    pub expr: Expr,
    pub as_alias: Option<String>,
}
