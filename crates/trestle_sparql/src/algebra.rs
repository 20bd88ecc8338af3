//! SPARQL algebra.
//!
//! The parser produces these trees; the compiler turns them into plans over
//! term ids. Blank nodes written in a WHERE clause are already replaced by
//! hidden variables (names starting with `_:`), which never appear in
//! `SELECT *` results.

use indexmap::IndexSet;
use std::fmt;
use trestle_graph::rdf::RdfTriple;
use trestle_graph::Term;

/// A query variable, stored without its `?` sigil.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Variable(String);

impl Variable {
    /// Creates a variable.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The variable name.
    pub fn name(&self) -> &str {
        &self.0
    }

    /// True for variables the engine introduced (blank nodes, aggregates,
    /// collection cells). They are never projected by `SELECT *`.
    pub fn is_hidden(&self) -> bool {
        self.0.starts_with("_:")
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_hidden() {
            f.write_str(&self.0)
        } else {
            write!(f, "?{}", self.0)
        }
    }
}

/// One position of a triple pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TermPattern {
    Variable(Variable),
    Term(Term),
    /// A template blank node, fresh for every CONSTRUCT solution.
    BlankNode(String),
}

impl TermPattern {
    /// The variable at this position, if any.
    pub fn as_variable(&self) -> Option<&Variable> {
        match self {
            Self::Variable(v) => Some(v),
            _ => None,
        }
    }
}

impl From<Variable> for TermPattern {
    fn from(v: Variable) -> Self {
        Self::Variable(v)
    }
}

impl From<Term> for TermPattern {
    fn from(t: Term) -> Self {
        Self::Term(t)
    }
}

/// A triple pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TriplePattern {
    pub subject: TermPattern,
    pub predicate: TermPattern,
    pub object: TermPattern,
}

impl TriplePattern {
    pub fn new(
        subject: impl Into<TermPattern>,
        predicate: impl Into<TermPattern>,
        object: impl Into<TermPattern>,
    ) -> Self {
        Self {
            subject: subject.into(),
            predicate: predicate.into(),
            object: object.into(),
        }
    }

    /// Positions in subject, predicate, object order.
    pub fn positions(&self) -> [&TermPattern; 3] {
        [&self.subject, &self.predicate, &self.object]
    }

    /// Variables of this pattern, in position order.
    pub fn variables(&self) -> impl Iterator<Item = &Variable> {
        self.positions().into_iter().filter_map(TermPattern::as_variable)
    }
}

/// A graph pattern.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphPattern {
    /// The empty group: one solution binding nothing.
    Unit,
    /// A basic graph pattern, evaluated in the order written.
    Bgp(Vec<TriplePattern>),
    Join(Box<GraphPattern>, Box<GraphPattern>),
    /// OPTIONAL, with the FILTERs written inside the optional group.
    LeftJoin {
        left: Box<GraphPattern>,
        right: Box<GraphPattern>,
        filter: Option<Expression>,
    },
    Union(Box<GraphPattern>, Box<GraphPattern>),
    Minus(Box<GraphPattern>, Box<GraphPattern>),
    Filter {
        expr: Expression,
        inner: Box<GraphPattern>,
    },
    Graph {
        name: TermPattern,
        inner: Box<GraphPattern>,
    },
    /// BIND and `SELECT (expr AS ?v)`.
    Extend {
        inner: Box<GraphPattern>,
        variable: Variable,
        expr: Expression,
    },
    /// Inline data. `None` is UNDEF.
    Values {
        variables: Vec<Variable>,
        rows: Vec<Vec<Option<Term>>>,
    },
    Group {
        inner: Box<GraphPattern>,
        keys: Vec<Expression>,
        aggregates: Vec<(Variable, Aggregate)>,
    },
    OrderBy {
        inner: Box<GraphPattern>,
        conditions: Vec<OrderCondition>,
    },
    Project {
        inner: Box<GraphPattern>,
        variables: Vec<Variable>,
    },
    Distinct(Box<GraphPattern>),
    Reduced(Box<GraphPattern>),
    Slice {
        inner: Box<GraphPattern>,
        offset: usize,
        limit: Option<usize>,
    },
}

impl GraphPattern {
    /// Joins two patterns, dropping empty groups.
    pub fn join(left: GraphPattern, right: GraphPattern) -> GraphPattern {
        match (left, right) {
            (GraphPattern::Unit, right) => right,
            (left, GraphPattern::Unit) => left,
            (GraphPattern::Bgp(mut a), GraphPattern::Bgp(b)) => {
                a.extend(b);
                GraphPattern::Bgp(a)
            }
            (left, right) => GraphPattern::Join(Box::new(left), Box::new(right)),
        }
    }

    /// Variables that may be bound by solutions of this pattern, in order of
    /// first appearance. Hidden variables are included.
    pub fn visible_variables(&self) -> Vec<Variable> {
        let mut out = IndexSet::new();
        self.collect_visible(&mut out);
        out.into_iter().collect()
    }

    fn collect_visible(&self, out: &mut IndexSet<Variable>) {
        match self {
            GraphPattern::Unit => {}
            GraphPattern::Bgp(patterns) => {
                for pattern in patterns {
                    out.extend(pattern.variables().cloned());
                }
            }
            GraphPattern::Join(l, r) | GraphPattern::Union(l, r) => {
                l.collect_visible(out);
                r.collect_visible(out);
            }
            GraphPattern::LeftJoin { left, right, .. } => {
                left.collect_visible(out);
                right.collect_visible(out);
            }
            GraphPattern::Minus(l, _) => l.collect_visible(out),
            GraphPattern::Filter { inner, .. }
            | GraphPattern::OrderBy { inner, .. }
            | GraphPattern::Distinct(inner)
            | GraphPattern::Reduced(inner)
            | GraphPattern::Slice { inner, .. } => inner.collect_visible(out),
            GraphPattern::Graph { name, inner } => {
                if let TermPattern::Variable(v) = name {
                    out.insert(v.clone());
                }
                inner.collect_visible(out);
            }
            GraphPattern::Extend {
                inner, variable, ..
            } => {
                inner.collect_visible(out);
                out.insert(variable.clone());
            }
            GraphPattern::Values { variables, .. } => out.extend(variables.iter().cloned()),
            GraphPattern::Group {
                keys, aggregates, ..
            } => {
                for key in keys {
                    if let Expression::Variable(v) = key {
                        out.insert(v.clone());
                    }
                }
                out.extend(aggregates.iter().map(|(v, _)| v.clone()));
            }
            GraphPattern::Project { variables, .. } => out.extend(variables.iter().cloned()),
        }
    }
}

/// Binary operators, lowest precedence first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Minus,
    Plus,
}

/// Built-in functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Str,
    Lang,
    Datatype,
    LangMatches,
    SameTerm,
    IsIri,
    IsBlank,
    IsLiteral,
    IsNumeric,
    Regex,
    StrLen,
    UCase,
    LCase,
    Contains,
    StrStarts,
    StrEnds,
    Concat,
    Abs,
}

impl Function {
    /// Looks up a function by its case-insensitive keyword.
    pub fn from_name(name: &str) -> Option<Self> {
        let function = match name.to_ascii_uppercase().as_str() {
            "STR" => Self::Str,
            "LANG" => Self::Lang,
            "DATATYPE" => Self::Datatype,
            "LANGMATCHES" => Self::LangMatches,
            "SAMETERM" => Self::SameTerm,
            "ISIRI" | "ISURI" => Self::IsIri,
            "ISBLANK" => Self::IsBlank,
            "ISLITERAL" => Self::IsLiteral,
            "ISNUMERIC" => Self::IsNumeric,
            "REGEX" => Self::Regex,
            "STRLEN" => Self::StrLen,
            "UCASE" => Self::UCase,
            "LCASE" => Self::LCase,
            "CONTAINS" => Self::Contains,
            "STRSTARTS" => Self::StrStarts,
            "STRENDS" => Self::StrEnds,
            "CONCAT" => Self::Concat,
            "ABS" => Self::Abs,
            _ => return None,
        };
        Some(function)
    }

    /// Accepted argument counts, inclusive. `CONCAT` is variadic.
    pub fn arity(self) -> (usize, usize) {
        match self {
            Self::LangMatches
            | Self::SameTerm
            | Self::Contains
            | Self::StrStarts
            | Self::StrEnds => (2, 2),
            Self::Regex => (2, 3),
            Self::Concat => (0, usize::MAX),
            _ => (1, 1),
        }
    }
}

/// A filter or projection expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Variable(Variable),
    Term(Term),
    Binary(BinaryOp, Box<Expression>, Box<Expression>),
    Unary(UnaryOp, Box<Expression>),
    In(Box<Expression>, Vec<Expression>),
    NotIn(Box<Expression>, Vec<Expression>),
    Bound(Variable),
    If(Box<Expression>, Box<Expression>, Box<Expression>),
    Coalesce(Vec<Expression>),
    Function(Function, Vec<Expression>),
}

impl Expression {
    pub fn binary(op: BinaryOp, left: Expression, right: Expression) -> Self {
        Self::Binary(op, Box::new(left), Box::new(right))
    }

    /// Every variable mentioned by this expression.
    pub fn variables(&self, out: &mut Vec<Variable>) {
        match self {
            Expression::Variable(v) | Expression::Bound(v) => out.push(v.clone()),
            Expression::Term(_) => {}
            Expression::Binary(_, l, r) => {
                l.variables(out);
                r.variables(out);
            }
            Expression::Unary(_, e) => e.variables(out),
            Expression::In(e, list) | Expression::NotIn(e, list) => {
                e.variables(out);
                list.iter().for_each(|x| x.variables(out));
            }
            Expression::If(a, b, c) => {
                a.variables(out);
                b.variables(out);
                c.variables(out);
            }
            Expression::Coalesce(list) | Expression::Function(_, list) => {
                list.iter().for_each(|x| x.variables(out))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AggregateFunction {
    Count,
    Sum,
    Min,
    Max,
    Avg,
    Sample,
    GroupConcat { separator: String },
}

/// An aggregate call. `expr` is `None` only for `COUNT(*)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregate {
    pub function: AggregateFunction,
    pub distinct: bool,
    pub expr: Option<Expression>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderCondition {
    pub expr: Expression,
    pub descending: bool,
}

/// FROM and FROM NAMED clauses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dataset {
    pub default: Vec<Term>,
    pub named: Vec<Term>,
}

impl Dataset {
    /// True when the query names no dataset.
    pub fn is_empty(&self) -> bool {
        self.default.is_empty() && self.named.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueryForm {
    /// Projected variables in result order.
    Select { variables: Vec<Variable> },
    Ask,
    Construct { template: Vec<TriplePattern> },
}

/// A parsed query.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub form: QueryForm,
    pub dataset: Dataset,
    pub pattern: GraphPattern,
}

/// A triple with its target graph, `None` being the default graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Quad {
    pub triple: RdfTriple,
    pub graph: Option<Term>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOperation {
    InsertData(Vec<Quad>),
    DeleteData(Vec<Quad>),
}

/// A parsed update request: operations run in order.
#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    pub operations: Vec<UpdateOperation>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(name: &str) -> TermPattern {
        TermPattern::Variable(Variable::new(name))
    }

    #[test]
    fn test_hidden_variables() {
        assert!(Variable::new("_:b0").is_hidden());
        assert!(!Variable::new("x").is_hidden());
        assert_eq!(Variable::new("x").to_string(), "?x");
    }

    #[test]
    fn test_join_simplifies() {
        let bgp = GraphPattern::Bgp(vec![TriplePattern::new(var("s"), var("p"), var("o"))]);
        assert_eq!(GraphPattern::join(GraphPattern::Unit, bgp.clone()), bgp);
        match GraphPattern::join(bgp.clone(), bgp.clone()) {
            GraphPattern::Bgp(patterns) => assert_eq!(patterns.len(), 2),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_visible_variables_order() {
        let pattern = GraphPattern::LeftJoin {
            left: Box::new(GraphPattern::Bgp(vec![TriplePattern::new(
                var("s"),
                Term::iri("http://ex.org/p"),
                var("o"),
            )])),
            right: Box::new(GraphPattern::Bgp(vec![TriplePattern::new(
                var("o"),
                var("q"),
                var("s"),
            )])),
            filter: None,
        };
        let names: Vec<String> = pattern
            .visible_variables()
            .iter()
            .map(|v| v.name().to_string())
            .collect();
        assert_eq!(names, vec!["s", "o", "q"]);
    }

    #[test]
    fn test_minus_hides_right_side() {
        let pattern = GraphPattern::Minus(
            Box::new(GraphPattern::Bgp(vec![TriplePattern::new(var("a"), var("b"), var("c"))])),
            Box::new(GraphPattern::Bgp(vec![TriplePattern::new(var("a"), var("d"), var("e"))])),
        );
        assert_eq!(pattern.visible_variables().len(), 3);
    }

    #[test]
    fn test_function_lookup() {
        assert_eq!(Function::from_name("isURI"), Some(Function::IsIri));
        assert_eq!(Function::from_name("regex"), Some(Function::Regex));
        assert_eq!(Function::from_name("nope"), None);
        assert_eq!(Function::Regex.arity(), (2, 3));
    }
}
