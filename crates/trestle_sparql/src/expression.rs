//! Expression evaluation.
//!
//! Expressions are compiled against the variable slots of a plan, then
//! evaluated per solution. A type error ([`ExprError::Type`]) only
//! invalidates the current solution; storage faults ([`ExprError::Fault`])
//! abort the query.

use crate::algebra::{BinaryOp, Expression, Function, UnaryOp, Variable};
use crate::{Error, Result};
use regex::{Regex, RegexBuilder};
use std::cmp::Ordering;
use trestle_graph::rdf::namespace::{
    RDF_LANG_STRING, XSD_BOOLEAN, XSD_DECIMAL, XSD_DOUBLE, XSD_FLOAT, XSD_INTEGER_DERIVED,
    XSD_STRING,
};
use trestle_graph::{Literal, Term};

/// Why an expression has no value.
#[derive(Debug)]
pub enum ExprError {
    /// SPARQL type error: the solution is dropped (FILTER) or the variable
    /// left unbound (BIND).
    Type(String),
    /// Storage fault while resolving a binding.
    Fault(Error),
}

impl From<Error> for ExprError {
    fn from(err: Error) -> Self {
        Self::Fault(err)
    }
}

impl From<trestle_graph::Error> for ExprError {
    fn from(err: trestle_graph::Error) -> Self {
        Self::Fault(err.into())
    }
}

/// Result of evaluating an expression.
pub type EvalResult<T> = std::result::Result<T, ExprError>;

fn type_error<T>(message: impl Into<String>) -> EvalResult<T> {
    Err(ExprError::Type(message.into()))
}

/// Access to the bindings of one solution.
pub trait Bindings {
    /// The term bound to `slot`, if any.
    fn term(&self, slot: usize) -> Result<Option<Term>>;
}

/// Allocates slots for variables.
pub trait SlotAllocator {
    fn slot(&mut self, variable: &Variable) -> usize;
}

/// Where a REGEX pattern comes from.
#[derive(Debug, Clone)]
pub enum RegexSource {
    /// Constant pattern and flags, compiled once.
    Compiled(Regex),
    Dynamic {
        pattern: Box<Expr>,
        flags: Option<Box<Expr>>,
    },
}

/// A compiled expression.
#[derive(Debug, Clone)]
pub enum Expr {
    Slot(usize),
    Constant(Term),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Unary(UnaryOp, Box<Expr>),
    In {
        needle: Box<Expr>,
        list: Vec<Expr>,
        negated: bool,
    },
    Bound(usize),
    If(Box<Expr>, Box<Expr>, Box<Expr>),
    Coalesce(Vec<Expr>),
    Regex {
        text: Box<Expr>,
        regex: RegexSource,
    },
    Function(Function, Vec<Expr>),
}

impl Expr {
    /// Compiles `expression`, allocating slots for its variables.
    ///
    /// # Errors
    ///
    /// `Error::Evaluation` for a constant REGEX pattern that does not compile.
    pub fn compile(expression: &Expression, slots: &mut dyn SlotAllocator) -> Result<Expr> {
        Ok(match expression {
            Expression::Variable(v) => Expr::Slot(slots.slot(v)),
            Expression::Term(t) => Expr::Constant(t.clone()),
            Expression::Binary(op, l, r) => Expr::Binary(
                *op,
                Box::new(Expr::compile(l, slots)?),
                Box::new(Expr::compile(r, slots)?),
            ),
            Expression::Unary(op, e) => Expr::Unary(*op, Box::new(Expr::compile(e, slots)?)),
            Expression::In(e, list) | Expression::NotIn(e, list) => Expr::In {
                needle: Box::new(Expr::compile(e, slots)?),
                list: compile_list(list, slots)?,
                negated: matches!(expression, Expression::NotIn(..)),
            },
            Expression::Bound(v) => Expr::Bound(slots.slot(v)),
            Expression::If(c, t, e) => Expr::If(
                Box::new(Expr::compile(c, slots)?),
                Box::new(Expr::compile(t, slots)?),
                Box::new(Expr::compile(e, slots)?),
            ),
            Expression::Coalesce(list) => Expr::Coalesce(compile_list(list, slots)?),
            Expression::Function(Function::Regex, args) => {
                let mut args = compile_list(args, slots)?.into_iter();
                let (Some(text), Some(pattern)) = (args.next(), args.next()) else {
                    return Err(Error::Evaluation("REGEX takes 2 or 3 arguments".into()));
                };
                let flags = args.next();
                Expr::Regex {
                    text: Box::new(text),
                    regex: compile_regex_source(pattern, flags)?,
                }
            }
            Expression::Function(f, args) => Expr::Function(*f, compile_list(args, slots)?),
        })
    }

    /// Evaluates to a term.
    pub fn eval(&self, row: &dyn Bindings) -> EvalResult<Term> {
        match self {
            Expr::Slot(slot) => match row.term(*slot)? {
                Some(term) => Ok(term),
                None => type_error("unbound variable"),
            },
            Expr::Constant(term) => Ok(term.clone()),
            Expr::Binary(BinaryOp::Or, l, r) => {
                let left = l.ebv(row);
                if matches!(left, Ok(true)) {
                    return Ok(Term::boolean(true));
                }
                match (left, r.ebv(row)) {
                    (_, Ok(true)) => Ok(Term::boolean(true)),
                    (Ok(false), Ok(false)) => Ok(Term::boolean(false)),
                    (Err(ExprError::Fault(e)), _) | (_, Err(ExprError::Fault(e))) => {
                        Err(ExprError::Fault(e))
                    }
                    _ => type_error("error in ||"),
                }
            }
            Expr::Binary(BinaryOp::And, l, r) => {
                let left = l.ebv(row);
                if matches!(left, Ok(false)) {
                    return Ok(Term::boolean(false));
                }
                match (left, r.ebv(row)) {
                    (_, Ok(false)) => Ok(Term::boolean(false)),
                    (Ok(true), Ok(true)) => Ok(Term::boolean(true)),
                    (Err(ExprError::Fault(e)), _) | (_, Err(ExprError::Fault(e))) => {
                        Err(ExprError::Fault(e))
                    }
                    _ => type_error("error in &&"),
                }
            }
            Expr::Binary(op, l, r) => {
                let (a, b) = (l.eval(row)?, r.eval(row)?);
                match op {
                    BinaryOp::Eq => Ok(Term::boolean(equals(&a, &b)?)),
                    BinaryOp::Ne => Ok(Term::boolean(!equals(&a, &b)?)),
                    BinaryOp::Lt => Ok(Term::boolean(compare(&a, &b)? == Ordering::Less)),
                    BinaryOp::Le => Ok(Term::boolean(compare(&a, &b)? != Ordering::Greater)),
                    BinaryOp::Gt => Ok(Term::boolean(compare(&a, &b)? == Ordering::Greater)),
                    BinaryOp::Ge => Ok(Term::boolean(compare(&a, &b)? != Ordering::Less)),
                    _ => Ok(arithmetic(*op, numeric(&a)?, numeric(&b)?)?.to_term()),
                }
            }
            Expr::Unary(UnaryOp::Not, e) => Ok(Term::boolean(!e.ebv(row)?)),
            Expr::Unary(UnaryOp::Plus, e) => Ok(numeric(&e.eval(row)?)?.to_term()),
            Expr::Unary(UnaryOp::Minus, e) => Ok(numeric(&e.eval(row)?)?.negate()?.to_term()),
            Expr::In {
                needle,
                list,
                negated,
            } => {
                let value = needle.eval(row)?;
                let mut error = None;
                for candidate in list {
                    match candidate.eval(row).and_then(|c| equals(&value, &c)) {
                        Ok(true) => return Ok(Term::boolean(!negated)),
                        Ok(false) => {}
                        Err(ExprError::Fault(e)) => return Err(ExprError::Fault(e)),
                        Err(e) => error = Some(e),
                    }
                }
                match error {
                    Some(e) => Err(e),
                    None => Ok(Term::boolean(*negated)),
                }
            }
            Expr::Bound(slot) => Ok(Term::boolean(row.term(*slot)?.is_some())),
            Expr::If(cond, then, otherwise) => {
                if cond.ebv(row)? {
                    then.eval(row)
                } else {
                    otherwise.eval(row)
                }
            }
            Expr::Coalesce(list) => {
                for e in list {
                    match e.eval(row) {
                        Ok(term) => return Ok(term),
                        Err(ExprError::Fault(e)) => return Err(ExprError::Fault(e)),
                        Err(ExprError::Type(_)) => {}
                    }
                }
                type_error("no COALESCE argument has a value")
            }
            Expr::Regex { text, regex } => {
                let text = text.eval(row)?;
                let text = string_literal(&text)?;
                let matched = match regex {
                    RegexSource::Compiled(regex) => regex.is_match(text.lexical()),
                    RegexSource::Dynamic { pattern, flags } => {
                        let pattern = pattern.eval(row)?;
                        let flags = match flags {
                            Some(f) => Some(f.eval(row)?),
                            None => None,
                        };
                        let regex = build_regex(
                            simple_string(&pattern)?,
                            flags.as_ref().map(simple_string).transpose()?,
                        )
                        .map_err(ExprError::Type)?;
                        regex.is_match(text.lexical())
                    }
                };
                Ok(Term::boolean(matched))
            }
            Expr::Function(function, args) => {
                let values = args
                    .iter()
                    .map(|a| a.eval(row))
                    .collect::<EvalResult<Vec<_>>>()?;
                call(*function, &values)
            }
        }
    }

    /// Evaluates to an effective boolean value.
    pub fn ebv(&self, row: &dyn Bindings) -> EvalResult<bool> {
        effective_boolean_value(&self.eval(row)?)
    }
}

fn compile_list(list: &[Expression], slots: &mut dyn SlotAllocator) -> Result<Vec<Expr>> {
    list.iter().map(|e| Expr::compile(e, slots)).collect()
}

fn compile_regex_source(pattern: Expr, flags: Option<Expr>) -> Result<RegexSource> {
    let constant_flags = match &flags {
        None => Some(None),
        Some(Expr::Constant(f)) => Some(Some(f.clone())),
        Some(_) => None,
    };
    if let (Expr::Constant(p), Some(f)) = (&pattern, constant_flags) {
        let p = simple_string(p).map_err(|_| Error::Evaluation("REGEX pattern must be a string".into()))?;
        let f = f
            .as_ref()
            .map(simple_string)
            .transpose()
            .map_err(|_| Error::Evaluation("REGEX flags must be a string".into()))?;
        let regex = build_regex(p, f).map_err(Error::Evaluation)?;
        return Ok(RegexSource::Compiled(regex));
    }
    Ok(RegexSource::Dynamic {
        pattern: Box::new(pattern),
        flags: flags.map(Box::new),
    })
}

/// Builds a regex with XPath flags (`i`, `s`, `m`, `x`, `q`).
pub fn build_regex(pattern: &str, flags: Option<&str>) -> std::result::Result<Regex, String> {
    let flags = flags.unwrap_or("");
    let literal;
    let pattern = if flags.contains('q') {
        literal = regex::escape(pattern);
        literal.as_str()
    } else {
        pattern
    };
    let mut builder = RegexBuilder::new(pattern);
    for flag in flags.chars() {
        match flag {
            'i' => builder.case_insensitive(true),
            's' => builder.dot_matches_new_line(true),
            'm' => builder.multi_line(true),
            'x' => builder.ignore_whitespace(true),
            'q' => &mut builder,
            other => return Err(format!("unknown regex flag '{}'", other)),
        };
    }
    builder
        .build()
        .map_err(|e| format!("invalid regex {:?}: {}", pattern, e))
}

// ========== Values ==========

/// A numeric value with its promotion level.
///
/// `xsd:decimal` is evaluated as an `f64`. Stored literals keep their
/// lexical form, but arithmetic and comparison on decimals carry about 15
/// significant digits, so `1.00000000000000000001 = 1.0` holds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Numeric {
    Integer(i64),
    Decimal(f64),
    Double(f64),
}

impl Numeric {
    fn as_f64(self) -> f64 {
        match self {
            Numeric::Integer(i) => i as f64,
            Numeric::Decimal(d) | Numeric::Double(d) => d,
        }
    }

    fn negate(self) -> EvalResult<Numeric> {
        Ok(match self {
            Numeric::Integer(i) => match i.checked_neg() {
                Some(n) => Numeric::Integer(n),
                None => return type_error("integer overflow"),
            },
            Numeric::Decimal(d) => Numeric::Decimal(-d),
            Numeric::Double(d) => Numeric::Double(-d),
        })
    }

    pub fn to_term(self) -> Term {
        match self {
            Numeric::Integer(i) => Term::integer(i),
            Numeric::Decimal(d) => Term::decimal(d),
            Numeric::Double(d) => Term::double(d),
        }
    }

    fn cmp(self, other: Numeric) -> Option<Ordering> {
        match (self, other) {
            (Numeric::Integer(a), Numeric::Integer(b)) => Some(a.cmp(&b)),
            (a, b) => a.as_f64().partial_cmp(&b.as_f64()),
        }
    }
}

/// Parses a numeric literal, `None` for anything else.
pub fn as_numeric(term: &Term) -> Option<Numeric> {
    let lit = term.as_literal()?;
    let datatype = lit.datatype();
    let lexical = lit.lexical().trim();
    if XSD_INTEGER_DERIVED.contains(&datatype) {
        lexical.parse().ok().map(Numeric::Integer)
    } else if datatype == XSD_DECIMAL {
        if !lexical
            .bytes()
            .all(|b| b.is_ascii_digit() || matches!(b, b'.' | b'-' | b'+'))
        {
            return None;
        }
        lexical.parse().ok().map(Numeric::Decimal)
    } else if datatype == XSD_DOUBLE || datatype == XSD_FLOAT {
        let value = match lexical {
            "INF" | "+INF" => f64::INFINITY,
            "-INF" => f64::NEG_INFINITY,
            "NaN" => f64::NAN,
            other => other.parse().ok()?,
        };
        Some(Numeric::Double(value))
    } else {
        None
    }
}

fn numeric(term: &Term) -> EvalResult<Numeric> {
    match as_numeric(term) {
        Some(n) => Ok(n),
        None => type_error(format!("{} is not numeric", term)),
    }
}

/// Applies `+ - * /` with numeric type promotion.
pub fn arithmetic(op: BinaryOp, a: Numeric, b: Numeric) -> EvalResult<Numeric> {
    use Numeric::*;
    let result = match (a, b) {
        (Integer(x), Integer(y)) => match op {
            BinaryOp::Add => x.checked_add(y).map(Integer),
            BinaryOp::Sub => x.checked_sub(y).map(Integer),
            BinaryOp::Mul => x.checked_mul(y).map(Integer),
            BinaryOp::Div if y == 0 => None,
            BinaryOp::Div => Some(Decimal(x as f64 / y as f64)),
            _ => None,
        },
        (Double(_), _) | (_, Double(_)) => {
            let (x, y) = (a.as_f64(), b.as_f64());
            match op {
                BinaryOp::Add => Some(Double(x + y)),
                BinaryOp::Sub => Some(Double(x - y)),
                BinaryOp::Mul => Some(Double(x * y)),
                BinaryOp::Div => Some(Double(x / y)),
                _ => None,
            }
        }
        _ => {
            let (x, y) = (a.as_f64(), b.as_f64());
            match op {
                BinaryOp::Add => Some(Decimal(x + y)),
                BinaryOp::Sub => Some(Decimal(x - y)),
                BinaryOp::Mul => Some(Decimal(x * y)),
                BinaryOp::Div if y == 0.0 => None,
                BinaryOp::Div => Some(Decimal(x / y)),
                _ => None,
            }
        }
    };
    match result {
        Some(n) => Ok(n),
        None => type_error(format!("arithmetic error in {:?}", op)),
    }
}

fn is_string(lit: &Literal) -> bool {
    let datatype = lit.datatype();
    datatype == XSD_STRING || datatype == RDF_LANG_STRING
}

/// A simple or language-tagged literal.
fn string_literal(term: &Term) -> EvalResult<&Literal> {
    match term.as_literal() {
        Some(lit) if is_string(lit) => Ok(lit),
        _ => type_error(format!("{} is not a string", term)),
    }
}

/// The lexical form of a simple literal.
fn simple_string(term: &Term) -> EvalResult<&str> {
    match term.as_literal() {
        Some(lit) if lit.is_simple() => Ok(lit.lexical()),
        _ => type_error(format!("{} is not a simple literal", term)),
    }
}

fn boolean_value(lit: &Literal) -> Option<bool> {
    match lit.lexical() {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}

/// The effective boolean value of a term.
pub fn effective_boolean_value(term: &Term) -> EvalResult<bool> {
    let Some(lit) = term.as_literal() else {
        return type_error(format!("{} has no boolean value", term));
    };
    if lit.datatype() == XSD_BOOLEAN {
        return Ok(boolean_value(lit).unwrap_or(false));
    }
    if lit.datatype() == XSD_STRING {
        return Ok(!lit.lexical().is_empty());
    }
    if let Some(n) = as_numeric(term) {
        return Ok(match n {
            Numeric::Integer(i) => i != 0,
            Numeric::Decimal(d) | Numeric::Double(d) => d != 0.0 && !d.is_nan(),
        });
    }
    if XSD_INTEGER_DERIVED.contains(&lit.datatype())
        || lit.datatype() == XSD_DECIMAL
        || lit.datatype() == XSD_DOUBLE
        || lit.datatype() == XSD_FLOAT
    {
        // Ill-formed numeric literal.
        return Ok(false);
    }
    type_error(format!("{} has no boolean value", term))
}

/// RDF term equality with value comparison for numbers and booleans.
pub fn equals(a: &Term, b: &Term) -> EvalResult<bool> {
    if let (Some(x), Some(y)) = (as_numeric(a), as_numeric(b)) {
        return Ok(x.cmp(y) == Some(Ordering::Equal));
    }
    match (a.as_literal(), b.as_literal()) {
        (Some(x), Some(y)) => {
            if x == y {
                return Ok(true);
            }
            if x.datatype() == XSD_BOOLEAN && y.datatype() == XSD_BOOLEAN {
                return match (boolean_value(x), boolean_value(y)) {
                    (Some(p), Some(q)) => Ok(p == q),
                    _ => type_error("ill-formed boolean"),
                };
            }
            let known = |l: &Literal| {
                is_string(l) || l.datatype() == XSD_BOOLEAN || as_numeric(&Term::Literal(l.clone())).is_some()
            };
            if known(x) && known(y) {
                Ok(false)
            } else {
                type_error(format!("cannot compare {} and {}", a, b))
            }
        }
        _ => Ok(a == b),
    }
}

/// Ordering for `< <= > >=`: numbers, simple strings and booleans.
pub fn compare(a: &Term, b: &Term) -> EvalResult<Ordering> {
    if let (Some(x), Some(y)) = (as_numeric(a), as_numeric(b)) {
        return match x.cmp(y) {
            Some(ordering) => Ok(ordering),
            None => type_error("NaN is unordered"),
        };
    }
    match (a.as_literal(), b.as_literal()) {
        (Some(x), Some(y)) if x.is_simple() && y.is_simple() => Ok(x.lexical().cmp(y.lexical())),
        (Some(x), Some(y)) if x.datatype() == XSD_BOOLEAN && y.datatype() == XSD_BOOLEAN => {
            match (boolean_value(x), boolean_value(y)) {
                (Some(p), Some(q)) => Ok(p.cmp(&q)),
                _ => type_error("ill-formed boolean"),
            }
        }
        (Some(x), Some(y))
            if x.datatype() == y.datatype() && x.language().is_none() && !is_string(x) =>
        {
            // Same non-string datatype, e.g. xsd:dateTime in canonical form.
            Ok(x.lexical().cmp(y.lexical()))
        }
        _ => type_error(format!("cannot order {} and {}", a, b)),
    }
}

/// Total order used by ORDER BY: unbound, blank nodes, IRIs, literals.
pub fn order_terms(a: Option<&Term>, b: Option<&Term>) -> Ordering {
    fn rank(term: Option<&Term>) -> u8 {
        match term {
            None => 0,
            Some(Term::BlankNode(_)) => 1,
            Some(Term::NamedNode(_)) => 2,
            Some(Term::Literal(_)) => 3,
        }
    }
    match (a, b) {
        (Some(Term::Literal(x)), Some(Term::Literal(y))) => {
            let (ta, tb) = (Term::Literal(x.clone()), Term::Literal(y.clone()));
            if let Ok(ordering) = compare(&ta, &tb) {
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            x.lexical()
                .cmp(y.lexical())
                .then_with(|| x.datatype().cmp(y.datatype()))
                .then_with(|| x.language().cmp(&y.language()))
        }
        (Some(x), Some(y)) if rank(a) == rank(b) => x.value().cmp(y.value()),
        _ => rank(a).cmp(&rank(b)),
    }
}

// ========== Built-in functions ==========

fn with_lexical(source: &Literal, lexical: String) -> Term {
    match source.language() {
        Some(lang) => Term::lang_literal(lexical, lang),
        None => Term::literal(lexical),
    }
}

/// Two string arguments whose language tags are compatible.
fn compatible_strings<'a>(a: &'a Term, b: &'a Term) -> EvalResult<(&'a str, &'a str)> {
    let (x, y) = (string_literal(a)?, string_literal(b)?);
    match (x.language(), y.language()) {
        (_, None) => Ok((x.lexical(), y.lexical())),
        (Some(p), Some(q)) if p.eq_ignore_ascii_case(q) => Ok((x.lexical(), y.lexical())),
        _ => type_error("incompatible language tags"),
    }
}

fn lang_matches(tag: &str, range: &str) -> bool {
    if range == "*" {
        return !tag.is_empty();
    }
    let (tag, range) = (tag.to_ascii_lowercase(), range.to_ascii_lowercase());
    tag == range || (tag.starts_with(&range) && tag.as_bytes().get(range.len()) == Some(&b'-'))
}

fn call(function: Function, args: &[Term]) -> EvalResult<Term> {
    let arg = |i: usize| -> EvalResult<&Term> {
        match args.get(i) {
            Some(term) => Ok(term),
            None => type_error(format!("missing argument {} of {:?}", i + 1, function)),
        }
    };
    Ok(match function {
        Function::Str => match arg(0)? {
            Term::NamedNode(iri) => Term::literal(iri.clone()),
            Term::Literal(lit) => Term::literal(lit.lexical()),
            Term::BlankNode(_) => return type_error("STR of a blank node"),
        },
        Function::Lang => match arg(0)? {
            Term::Literal(lit) => Term::literal(lit.language().unwrap_or("")),
            other => return type_error(format!("LANG of {}", other)),
        },
        Function::Datatype => match arg(0)? {
            Term::Literal(lit) => Term::iri(lit.datatype()),
            other => return type_error(format!("DATATYPE of {}", other)),
        },
        Function::LangMatches => {
            let tag = simple_string(arg(0)?)?;
            let range = simple_string(arg(1)?)?;
            Term::boolean(lang_matches(tag, range))
        }
        Function::SameTerm => Term::boolean(arg(0)? == arg(1)?),
        Function::IsIri => Term::boolean(arg(0)?.is_named_node()),
        Function::IsBlank => Term::boolean(arg(0)?.is_blank_node()),
        Function::IsLiteral => Term::boolean(arg(0)?.is_literal()),
        Function::IsNumeric => Term::boolean(as_numeric(arg(0)?).is_some()),
        Function::StrLen => {
            let lit = string_literal(arg(0)?)?;
            Term::integer(lit.lexical().chars().count() as i64)
        }
        Function::UCase => {
            let lit = string_literal(arg(0)?)?;
            with_lexical(lit, lit.lexical().to_uppercase())
        }
        Function::LCase => {
            let lit = string_literal(arg(0)?)?;
            with_lexical(lit, lit.lexical().to_lowercase())
        }
        Function::Contains => {
            let (a, b) = compatible_strings(arg(0)?, arg(1)?)?;
            Term::boolean(a.contains(b))
        }
        Function::StrStarts => {
            let (a, b) = compatible_strings(arg(0)?, arg(1)?)?;
            Term::boolean(a.starts_with(b))
        }
        Function::StrEnds => {
            let (a, b) = compatible_strings(arg(0)?, arg(1)?)?;
            Term::boolean(a.ends_with(b))
        }
        Function::Concat => {
            let mut out = String::new();
            let mut language: Option<Option<&str>> = None;
            for term in args {
                let lit = string_literal(term)?;
                out.push_str(lit.lexical());
                language = match language {
                    None => Some(lit.language()),
                    Some(previous) if previous == lit.language() => Some(previous),
                    Some(_) => Some(None),
                };
            }
            match language.flatten() {
                Some(lang) => Term::lang_literal(out, lang),
                None => Term::literal(out),
            }
        }
        Function::Abs => match numeric(arg(0)?)? {
            Numeric::Integer(i) => match i.checked_abs() {
                Some(n) => Term::integer(n),
                None => return type_error("integer overflow"),
            },
            Numeric::Decimal(d) => Term::decimal(d.abs()),
            Numeric::Double(d) => Term::double(d.abs()),
        },
        Function::Regex => {
            let text = string_literal(arg(0)?)?;
            let flags = args.get(2).map(simple_string).transpose()?;
            let regex = build_regex(simple_string(arg(1)?)?, flags).map_err(ExprError::Type)?;
            Term::boolean(regex.is_match(text.lexical()))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;
    use trestle_graph::rdf::namespace::XSD_INTEGER;

    #[derive(Default)]
    struct Slots(IndexMap<Variable, usize>);

    impl SlotAllocator for Slots {
        fn slot(&mut self, variable: &Variable) -> usize {
            let next = self.0.len();
            *self.0.entry(variable.clone()).or_insert(next)
        }
    }

    struct Row(Vec<Option<Term>>);

    impl Bindings for Row {
        fn term(&self, slot: usize) -> Result<Option<Term>> {
            Ok(self.0.get(slot).cloned().flatten())
        }
    }

    fn eval(query_expr: &str, row: Vec<Option<Term>>) -> EvalResult<Term> {
        let query = crate::parse_query(&format!("ASK {{ FILTER({}) }}", query_expr)).unwrap();
        let crate::algebra::GraphPattern::Filter { expr, .. } = query.pattern else {
            panic!("expected filter");
        };
        let mut slots = Slots::default();
        slots.slot(&Variable::new("x"));
        slots.slot(&Variable::new("y"));
        Expr::compile(&expr, &mut slots).unwrap().eval(&Row(row))
    }

    fn truthy(query_expr: &str) -> bool {
        effective_boolean_value(&eval(query_expr, vec![]).unwrap()).unwrap()
    }

    #[test]
    fn test_numeric_promotion() {
        assert_eq!(eval("1 + 2", vec![]).unwrap(), Term::integer(3));
        assert_eq!(eval("7 / 2", vec![]).unwrap(), Term::decimal(3.5));
        assert_eq!(eval("1.5 * 2", vec![]).unwrap(), Term::decimal(3.0));
        assert!(matches!(
            eval("1 / 0", vec![]),
            Err(ExprError::Type(_))
        ));
        assert!(truthy("1 = 1.0"));
        assert!(truthy("2 < 10"));
        assert!(truthy("\"2\" > \"10\""));
    }

    #[test]
    fn test_decimal_precision() {
        assert_eq!(eval("1.5 + 1.25", vec![]).unwrap(), Term::decimal(2.75));
        let long = Term::typed_literal("1.00000000000000000001", XSD_DECIMAL);
        assert_eq!(as_numeric(&long), Some(Numeric::Decimal(1.0)));
        assert!(truthy("1.00000000000000000001 = 1.0"));
    }

    #[test]
    fn test_logical_error_handling() {
        // ?x unbound: error || true is true, error && false is false
        assert!(truthy("?x = 1 || true"));
        assert!(!truthy("?x = 1 && false"));
        assert!(matches!(eval("?x = 1 || false", vec![]), Err(ExprError::Type(_))));
    }

    #[test]
    fn test_equality_of_unknown_datatypes() {
        let row = vec![
            Some(Term::typed_literal("a", "http://ex.org/dt")),
            Some(Term::typed_literal("b", "http://ex.org/dt")),
        ];
        assert!(matches!(eval("?x = ?y", row.clone()), Err(ExprError::Type(_))));
        assert_eq!(eval("sameTerm(?x, ?x)", row).unwrap(), Term::boolean(true));
    }

    #[test]
    fn test_string_functions() {
        let row = vec![Some(Term::lang_literal("Chat", "fr")), None];
        assert_eq!(eval("UCASE(?x)", row.clone()).unwrap(), Term::lang_literal("CHAT", "fr"));
        assert_eq!(eval("STRLEN(?x)", row.clone()).unwrap(), Term::typed_literal("4", XSD_INTEGER));
        assert_eq!(eval("LANG(?x)", row.clone()).unwrap(), Term::literal("fr"));
        assert_eq!(eval("STR(?x)", row.clone()).unwrap(), Term::literal("Chat"));
        assert_eq!(eval("CONTAINS(?x, \"ha\")", row.clone()).unwrap(), Term::boolean(true));
        assert!(matches!(eval("CONTAINS(?x, \"ha\"@en)", row.clone()), Err(ExprError::Type(_))));
        assert_eq!(
            eval("CONCAT(\"a\", \"b\")", row).unwrap(),
            Term::literal("ab")
        );
        assert!(truthy("langMatches(\"en-GB\", \"en\")"));
        assert!(!truthy("langMatches(\"fr\", \"en\")"));
    }

    #[test]
    fn test_regex() {
        let row = vec![Some(Term::literal("Hello World")), None];
        assert_eq!(eval("REGEX(?x, \"^hello\", \"i\")", row.clone()).unwrap(), Term::boolean(true));
        assert_eq!(eval("REGEX(?x, \"^hello\")", row).unwrap(), Term::boolean(false));

        let query = crate::parse_query("ASK { FILTER(REGEX(?x, \"(\")) }").unwrap();
        let crate::algebra::GraphPattern::Filter { expr, .. } = query.pattern else {
            panic!("expected filter");
        };
        assert!(matches!(
            Expr::compile(&expr, &mut Slots::default()),
            Err(Error::Evaluation(_))
        ));
    }

    #[test]
    fn test_in_and_coalesce() {
        assert!(truthy("2 IN (1, 2, 3)"));
        assert!(truthy("4 NOT IN (1, 2, 3)"));
        assert_eq!(eval("COALESCE(?x, 5)", vec![]).unwrap(), Term::integer(5));
        assert_eq!(eval("IF(BOUND(?x), 1, 2)", vec![]).unwrap(), Term::integer(2));
    }

    #[test]
    fn test_effective_boolean_value() {
        assert!(effective_boolean_value(&Term::literal("x")).unwrap());
        assert!(!effective_boolean_value(&Term::literal("")).unwrap());
        assert!(!effective_boolean_value(&Term::integer(0)).unwrap());
        assert!(effective_boolean_value(&Term::iri("http://x")).is_err());
    }

    #[test]
    fn test_order_terms() {
        let mut terms = vec![
            Some(Term::literal("b")),
            Some(Term::integer(10)),
            None,
            Some(Term::iri("http://a")),
            Some(Term::blank("z")),
            Some(Term::integer(9)),
        ];
        terms.sort_by(|a, b| order_terms(a.as_ref(), b.as_ref()));
        assert_eq!(terms[0], None);
        assert_eq!(terms[1], Some(Term::blank("z")));
        assert_eq!(terms[2], Some(Term::iri("http://a")));
        assert_eq!(terms[3], Some(Term::integer(9)));
        assert_eq!(terms[4], Some(Term::integer(10)));
    }
}
