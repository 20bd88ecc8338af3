//! Recursive descent SPARQL parser.
//!
//! Produces the algebra of [`crate::algebra`] directly, following the
//! translation rules of SPARQL 1.1 section 18.2: a group starts from the
//! empty pattern, OPTIONAL becomes a left join (FILTERs of the optional group
//! become its condition), and the FILTERs of a group apply to the whole group.

use crate::algebra::{
    Aggregate, AggregateFunction, BinaryOp, Dataset, Expression, Function, GraphPattern,
    OrderCondition, Quad, Query, QueryForm, TermPattern, TriplePattern, UnaryOp, Update,
    UpdateOperation, Variable,
};
use crate::lexer::{tokenize, Spanned, Token};
use crate::{Error, Result};
use log::debug;
use trestle_graph::rdf::namespace::{
    RDF_FIRST, RDF_NIL, RDF_REST, RDF_TYPE, XSD_BOOLEAN, XSD_DECIMAL, XSD_DOUBLE, XSD_INTEGER,
};
use trestle_graph::rdf::{iri, BlankNodeGenerator, NamespaceMap, RdfTriple};
use trestle_graph::Term;

/// Parses a SELECT, ASK or CONSTRUCT query.
pub fn parse_query(text: &str) -> Result<Query> {
    let mut parser = Parser::new(text)?;
    let query = parser.query()?;
    debug!("parsed query: {:?}", query.form);
    Ok(query)
}

/// Parses an update request (`INSERT DATA` / `DELETE DATA`).
pub fn parse_update(text: &str) -> Result<Update> {
    let mut parser = Parser::new(text)?;
    let update = parser.update()?;
    debug!("parsed update with {} operations", update.operations.len());
    Ok(update)
}

/// How blank nodes and variables are read in a triples block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// WHERE clause: blank nodes are hidden variables.
    Pattern,
    /// CONSTRUCT template: blank nodes are fresh per solution.
    Template,
    /// INSERT DATA: blank nodes are new store nodes.
    InsertData,
    /// DELETE DATA: blank nodes are rejected.
    DeleteData,
}

impl Mode {
    fn is_data(self) -> bool {
        matches!(self, Mode::InsertData | Mode::DeleteData)
    }

    fn data_name(self) -> &'static str {
        match self {
            Mode::DeleteData => "DELETE DATA",
            _ => "INSERT DATA",
        }
    }
}

enum SelectItem {
    Variable(Variable),
    Expression(Expression, Variable),
}

struct SelectClause {
    distinct: bool,
    reduced: bool,
    /// `None` for `SELECT *`.
    items: Option<Vec<SelectItem>>,
}

#[derive(Default)]
struct Modifiers {
    group_by: Option<Vec<Expression>>,
    group_binds: Vec<(Variable, Expression)>,
    having: Vec<Expression>,
    order_by: Vec<OrderCondition>,
    limit: Option<usize>,
    offset: usize,
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    base: Option<String>,
    prefixes: NamespaceMap,
    mode: Mode,
    hidden: usize,
    aggregates: Vec<(Variable, Aggregate)>,
    aggregates_allowed: bool,
    blank_nodes: BlankNodeGenerator,
}

impl Parser {
    fn new(text: &str) -> Result<Self> {
        Ok(Self {
            tokens: tokenize(text)?,
            pos: 0,
            base: None,
            prefixes: NamespaceMap::with_defaults(),
            mode: Mode::Pattern,
            hidden: 0,
            aggregates: Vec::new(),
            aggregates_allowed: false,
            blank_nodes: BlankNodeGenerator::new(),
        })
    }

    // ========== Token helpers ==========

    fn peek(&self) -> &Token {
        self.peek_at(0)
    }

    fn peek_at(&self, n: usize) -> &Token {
        let index = (self.pos + n).min(self.tokens.len() - 1);
        &self.tokens[index].token
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn error(&self, message: impl Into<String>) -> Error {
        let spanned = &self.tokens[self.pos.min(self.tokens.len() - 1)];
        Error::syntax(spanned.line, spanned.column, spanned.offset, message)
    }

    fn unexpected(&self, expected: &str) -> Error {
        self.error(format!(
            "expected {}, found {}",
            expected,
            self.peek().describe()
        ))
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == token {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &Token, what: &str) -> Result<()> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(self.unexpected(what))
        }
    }

    fn at_keyword(&self, keyword: &str) -> bool {
        self.peek().is_keyword(keyword)
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.at_keyword(keyword) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<()> {
        if self.eat_keyword(keyword) {
            Ok(())
        } else {
            Err(self.unexpected(keyword))
        }
    }

    fn expect_eof(&mut self) -> Result<()> {
        if *self.peek() == Token::Eof {
            Ok(())
        } else {
            Err(self.unexpected("end of query"))
        }
    }

    /// A bare word that starts a built-in or aggregate call.
    fn is_call_start(&self) -> bool {
        const CALLS: &[&str] = &[
            "BOUND", "IF", "COALESCE", "EXISTS", "NOT", "COUNT", "SUM", "MIN", "MAX", "AVG",
            "SAMPLE", "GROUP_CONCAT",
        ];
        match self.peek() {
            Token::Name(name) => {
                Function::from_name(name).is_some()
                    || CALLS.iter().any(|call| name.eq_ignore_ascii_case(call))
            }
            _ => false,
        }
    }

    fn fresh_hidden(&mut self, kind: &str) -> Variable {
        self.hidden += 1;
        Variable::new(format!("_:{}{}", kind, self.hidden))
    }

    // ========== Prologue and terms ==========

    fn prologue(&mut self) -> Result<()> {
        loop {
            if self.eat_keyword("BASE") {
                let iri = self.iri_ref()?;
                self.base = Some(iri);
            } else if self.eat_keyword("PREFIX") {
                let prefix = match self.advance() {
                    Token::PrefixedName { prefix, local } if local.is_empty() => prefix,
                    _ => return Err(self.unexpected("prefix name")),
                };
                let iri = self.iri_ref()?;
                self.prefixes.add(&prefix, &iri);
            } else {
                return Ok(());
            }
        }
    }

    fn resolve_iri(&self, reference: &str) -> String {
        match &self.base {
            Some(base) if !iri::is_absolute(reference) => iri::resolve(base, reference),
            _ => reference.to_string(),
        }
    }

    /// `<iri>` only.
    fn iri_ref(&mut self) -> Result<String> {
        match self.peek().clone() {
            Token::Iri(raw) => {
                self.advance();
                Ok(self.resolve_iri(&raw))
            }
            _ => Err(self.unexpected("IRI")),
        }
    }

    /// `<iri>` or a prefixed name.
    fn iri(&mut self) -> Result<String> {
        match self.peek().clone() {
            Token::Iri(_) => self.iri_ref(),
            Token::PrefixedName { prefix, local } => {
                let expanded = self
                    .prefixes
                    .expand_parts(&prefix, &local)
                    .ok_or_else(|| self.error(format!("undeclared prefix '{}:'", prefix)))?;
                self.advance();
                Ok(expanded)
            }
            _ => Err(self.unexpected("IRI")),
        }
    }

    fn is_iri_start(&self) -> bool {
        matches!(self.peek(), Token::Iri(_) | Token::PrefixedName { .. })
    }

    /// A literal, with an optional leading sign for numbers.
    fn literal(&mut self) -> Result<Term> {
        let negative = match self.peek() {
            Token::Minus => true,
            Token::Plus => false,
            _ => return self.unsigned_literal(),
        };
        if !matches!(
            self.peek_at(1),
            Token::Integer(_) | Token::Decimal(_) | Token::Double(_)
        ) {
            return Err(self.unexpected("number"));
        }
        self.advance();
        let term = self.unsigned_literal()?;
        let Term::Literal(lit) = term else {
            return Err(self.unexpected("number"));
        };
        let sign = if negative { "-" } else { "+" };
        Ok(Term::typed_literal(
            format!("{}{}", sign, lit.lexical()),
            lit.datatype(),
        ))
    }

    fn unsigned_literal(&mut self) -> Result<Term> {
        let term = match self.peek().clone() {
            Token::String(value) => {
                self.advance();
                match self.peek().clone() {
                    Token::LangTag(lang) => {
                        self.advance();
                        Term::lang_literal(value, lang.to_ascii_lowercase())
                    }
                    Token::DoubleCaret => {
                        self.advance();
                        Term::typed_literal(value, self.iri()?)
                    }
                    _ => Term::literal(value),
                }
            }
            Token::Integer(lexical) => {
                self.advance();
                Term::typed_literal(lexical, XSD_INTEGER)
            }
            Token::Decimal(lexical) => {
                self.advance();
                Term::typed_literal(lexical, XSD_DECIMAL)
            }
            Token::Double(lexical) => {
                self.advance();
                Term::typed_literal(lexical, XSD_DOUBLE)
            }
            Token::Name(name) if name == "true" || name == "false" => {
                self.advance();
                Term::typed_literal(name, XSD_BOOLEAN)
            }
            _ => return Err(self.unexpected("literal")),
        };
        Ok(term)
    }

    fn is_literal_start(&self) -> bool {
        match self.peek() {
            Token::String(_) | Token::Integer(_) | Token::Decimal(_) | Token::Double(_) => true,
            Token::Name(name) => name == "true" || name == "false",
            Token::Minus | Token::Plus => matches!(
                self.peek_at(1),
                Token::Integer(_) | Token::Decimal(_) | Token::Double(_)
            ),
            _ => false,
        }
    }

    fn variable(&mut self) -> Result<Variable> {
        match self.peek().clone() {
            Token::Var(name) => {
                self.advance();
                Ok(Variable::new(name))
            }
            _ => Err(self.unexpected("variable")),
        }
    }

    fn blank_node(&mut self, label: Option<&str>) -> Result<TermPattern> {
        Ok(match (self.mode, label) {
            (Mode::Pattern, Some(label)) => TermPattern::Variable(Variable::new(format!("_:u{}", label))),
            (Mode::Pattern, None) => TermPattern::Variable(self.fresh_hidden("g")),
            (Mode::Template, Some(label)) => TermPattern::BlankNode(format!("u{}", label)),
            (Mode::Template, None) => {
                self.hidden += 1;
                TermPattern::BlankNode(format!("g{}", self.hidden))
            }
            (Mode::InsertData, Some(label)) => {
                TermPattern::Term(Term::blank(self.blank_nodes.scoped(label)))
            }
            (Mode::InsertData, None) => TermPattern::Term(Term::blank(self.blank_nodes.fresh())),
            (Mode::DeleteData, _) => {
                return Err(Error::Evaluation(
                    "blank nodes are not allowed in DELETE DATA".into(),
                ))
            }
        })
    }

    /// Variable, IRI, literal or blank node.
    fn var_or_term(&mut self) -> Result<TermPattern> {
        match self.peek().clone() {
            Token::Var(name) => {
                if self.mode.is_data() {
                    return Err(Error::Evaluation(format!(
                        "variable ?{} is not allowed in {}",
                        name,
                        self.mode.data_name()
                    )));
                }
                self.advance();
                Ok(TermPattern::Variable(Variable::new(name)))
            }
            Token::BlankLabel(label) => {
                self.advance();
                self.blank_node(Some(&label))
            }
            Token::OpenBracket if *self.peek_at(1) == Token::CloseBracket => {
                self.advance();
                self.advance();
                self.blank_node(None)
            }
            Token::OpenParen if *self.peek_at(1) == Token::CloseParen => {
                self.advance();
                self.advance();
                Ok(TermPattern::Term(Term::iri(RDF_NIL)))
            }
            Token::Iri(_) | Token::PrefixedName { .. } => Ok(TermPattern::Term(Term::iri(self.iri()?))),
            _ if self.is_literal_start() => Ok(TermPattern::Term(self.literal()?)),
            _ => Err(self.unexpected("variable or term")),
        }
    }

    fn var_or_iri(&mut self) -> Result<TermPattern> {
        match self.peek() {
            Token::Var(_) => Ok(TermPattern::Variable(self.variable()?)),
            _ => Ok(TermPattern::Term(Term::iri(self.iri()?))),
        }
    }

    // ========== Queries ==========

    fn query(&mut self) -> Result<Query> {
        self.prologue()?;
        let query = if self.at_keyword("SELECT") {
            self.select_query()?
        } else if self.eat_keyword("ASK") {
            let dataset = self.dataset_clauses()?;
            self.eat_keyword("WHERE");
            let pattern = self.group_graph_pattern()?;
            let modifiers = self.solution_modifiers()?;
            let pattern = self.values_clause(pattern)?;
            let pattern = self.apply_modifiers(pattern, None, modifiers)?;
            Query {
                form: QueryForm::Ask,
                dataset,
                pattern,
            }
        } else if self.eat_keyword("CONSTRUCT") {
            self.construct_query()?
        } else if self.at_keyword("DESCRIBE") {
            return Err(Error::Unsupported("DESCRIBE queries".into()));
        } else if self.at_keyword("INSERT") || self.at_keyword("DELETE") {
            return Err(self.error("update operations are not queries; use an update request"));
        } else {
            return Err(self.unexpected("SELECT, ASK or CONSTRUCT"));
        };
        self.expect_eof()?;
        Ok(query)
    }

    fn select_query(&mut self) -> Result<Query> {
        let select = self.select_clause()?;
        let dataset = self.dataset_clauses()?;
        self.eat_keyword("WHERE");
        let pattern = self.group_graph_pattern()?;
        let modifiers = self.solution_modifiers()?;
        let pattern = self.values_clause(pattern)?;

        let variables = match &select.items {
            None => pattern
                .visible_variables()
                .into_iter()
                .filter(|v| !v.is_hidden())
                .collect(),
            Some(items) => items
                .iter()
                .map(|item| match item {
                    SelectItem::Variable(v) | SelectItem::Expression(_, v) => v.clone(),
                })
                .collect(),
        };
        let pattern = self.apply_modifiers(pattern, Some(select), modifiers)?;
        Ok(Query {
            form: QueryForm::Select { variables },
            dataset,
            pattern,
        })
    }

    fn construct_query(&mut self) -> Result<Query> {
        if *self.peek() == Token::OpenBrace {
            self.advance();
            self.mode = Mode::Template;
            let template = self.triples_template(&Token::CloseBrace)?;
            self.mode = Mode::Pattern;
            self.expect(&Token::CloseBrace, "'}'")?;

            let dataset = self.dataset_clauses()?;
            self.eat_keyword("WHERE");
            let pattern = self.group_graph_pattern()?;
            let modifiers = self.solution_modifiers()?;
            let pattern = self.values_clause(pattern)?;
            let pattern = self.apply_modifiers(pattern, None, modifiers)?;
            return Ok(Query {
                form: QueryForm::Construct { template },
                dataset,
                pattern,
            });
        }

        // CONSTRUCT WHERE { triples }
        let dataset = self.dataset_clauses()?;
        self.expect_keyword("WHERE")?;
        self.expect(&Token::OpenBrace, "'{'")?;
        let triples = self.triples_template(&Token::CloseBrace)?;
        self.expect(&Token::CloseBrace, "'}'")?;
        let modifiers = self.solution_modifiers()?;
        let pattern = self.values_clause(GraphPattern::Bgp(triples.clone()))?;
        let pattern = self.apply_modifiers(pattern, None, modifiers)?;
        Ok(Query {
            form: QueryForm::Construct { template: triples },
            dataset,
            pattern,
        })
    }

    fn select_clause(&mut self) -> Result<SelectClause> {
        self.expect_keyword("SELECT")?;
        let distinct = self.eat_keyword("DISTINCT");
        let reduced = !distinct && self.eat_keyword("REDUCED");

        if self.eat(&Token::Star) {
            return Ok(SelectClause {
                distinct,
                reduced,
                items: None,
            });
        }

        let mut items = Vec::new();
        loop {
            match self.peek() {
                Token::Var(_) => items.push(SelectItem::Variable(self.variable()?)),
                Token::OpenParen => {
                    self.advance();
                    self.aggregates_allowed = true;
                    let expr = self.expression()?;
                    self.aggregates_allowed = false;
                    self.expect_keyword("AS")?;
                    let var = self.variable()?;
                    self.expect(&Token::CloseParen, "')'")?;
                    items.push(SelectItem::Expression(expr, var));
                }
                _ => break,
            }
        }
        if items.is_empty() {
            return Err(self.unexpected("'*' or projection variables"));
        }
        Ok(SelectClause {
            distinct,
            reduced,
            items: Some(items),
        })
    }

    fn dataset_clauses(&mut self) -> Result<Dataset> {
        let mut dataset = Dataset::default();
        while self.eat_keyword("FROM") {
            if self.eat_keyword("NAMED") {
                dataset.named.push(Term::iri(self.iri()?));
            } else {
                dataset.default.push(Term::iri(self.iri()?));
            }
        }
        Ok(dataset)
    }

    fn solution_modifiers(&mut self) -> Result<Modifiers> {
        let mut modifiers = Modifiers::default();

        if self.eat_keyword("GROUP") {
            self.expect_keyword("BY")?;
            let mut keys = Vec::new();
            loop {
                match self.peek() {
                    Token::Var(_) => keys.push(Expression::Variable(self.variable()?)),
                    Token::OpenParen => {
                        self.advance();
                        let expr = self.expression()?;
                        if self.eat_keyword("AS") {
                            let var = self.variable()?;
                            modifiers.group_binds.push((var.clone(), expr));
                            keys.push(Expression::Variable(var));
                        } else {
                            keys.push(expr);
                        }
                        self.expect(&Token::CloseParen, "')'")?;
                    }
                    Token::Name(_) if self.is_call_start() => keys.push(self.primary()?),
                    _ => break,
                }
            }
            if keys.is_empty() {
                return Err(self.unexpected("grouping condition"));
            }
            modifiers.group_by = Some(keys);
        }

        if self.eat_keyword("HAVING") {
            self.aggregates_allowed = true;
            loop {
                modifiers.having.push(self.constraint()?);
                if *self.peek() != Token::OpenParen && !self.is_call_start() {
                    break;
                }
            }
            self.aggregates_allowed = false;
        }

        if self.eat_keyword("ORDER") {
            self.expect_keyword("BY")?;
            self.aggregates_allowed = true;
            loop {
                let condition = if self.eat_keyword("ASC") {
                    OrderCondition {
                        expr: self.bracketted_expression()?,
                        descending: false,
                    }
                } else if self.eat_keyword("DESC") {
                    OrderCondition {
                        expr: self.bracketted_expression()?,
                        descending: true,
                    }
                } else if matches!(self.peek(), Token::Var(_)) {
                    OrderCondition {
                        expr: Expression::Variable(self.variable()?),
                        descending: false,
                    }
                } else if *self.peek() == Token::OpenParen || self.is_call_start() {
                    OrderCondition {
                        expr: self.constraint()?,
                        descending: false,
                    }
                } else {
                    break;
                };
                modifiers.order_by.push(condition);
            }
            self.aggregates_allowed = false;
            if modifiers.order_by.is_empty() {
                return Err(self.unexpected("order condition"));
            }
        }

        let mut seen_limit = false;
        let mut seen_offset = false;
        loop {
            if !seen_limit && self.eat_keyword("LIMIT") {
                modifiers.limit = Some(self.count()?);
                seen_limit = true;
            } else if !seen_offset && self.eat_keyword("OFFSET") {
                modifiers.offset = self.count()?;
                seen_offset = true;
            } else {
                break;
            }
        }
        Ok(modifiers)
    }

    fn count(&mut self) -> Result<usize> {
        match self.peek().clone() {
            Token::Integer(lexical) => {
                let value = lexical
                    .parse()
                    .map_err(|_| self.error(format!("count {} is out of range", lexical)))?;
                self.advance();
                Ok(value)
            }
            _ => Err(self.unexpected("integer")),
        }
    }

    /// Builds grouping, projection and slicing around the WHERE pattern.
    fn apply_modifiers(
        &mut self,
        mut pattern: GraphPattern,
        select: Option<SelectClause>,
        modifiers: Modifiers,
    ) -> Result<GraphPattern> {
        let aggregates = std::mem::take(&mut self.aggregates);
        let grouped = modifiers.group_by.is_some() || !aggregates.is_empty();

        if grouped {
            for (variable, expr) in modifiers.group_binds {
                pattern = extend(pattern, variable, expr)?;
            }
            let keys = modifiers.group_by.unwrap_or_default();
            pattern = GraphPattern::Group {
                inner: Box::new(pattern),
                keys,
                aggregates,
            };
        }

        for expr in modifiers.having {
            pattern = GraphPattern::Filter {
                expr,
                inner: Box::new(pattern),
            };
        }

        let mut projection = None;
        let (mut distinct, mut reduced) = (false, false);
        if let Some(select) = select {
            distinct = select.distinct;
            reduced = select.reduced;
            match select.items {
                None if grouped => {
                    return Err(Error::Evaluation(
                        "SELECT * is not allowed with GROUP BY or aggregates".into(),
                    ))
                }
                // hidden variables must not make rows distinct
                None if distinct || reduced => {
                    projection = Some(
                        pattern
                            .visible_variables()
                            .into_iter()
                            .filter(|v| !v.is_hidden())
                            .collect(),
                    );
                }
                None => {}
                Some(items) => {
                    let mut variables = Vec::with_capacity(items.len());
                    for item in items {
                        match item {
                            SelectItem::Variable(v) => {
                                if grouped && !pattern.visible_variables().contains(&v) {
                                    return Err(Error::Evaluation(format!(
                                        "{} is projected but not grouped",
                                        v
                                    )));
                                }
                                variables.push(v);
                            }
                            SelectItem::Expression(expr, v) => {
                                pattern = extend(pattern, v.clone(), expr)?;
                                variables.push(v);
                            }
                        }
                    }
                    projection = Some(variables);
                }
            }
        }

        if !modifiers.order_by.is_empty() {
            pattern = GraphPattern::OrderBy {
                inner: Box::new(pattern),
                conditions: modifiers.order_by,
            };
        }
        if let Some(variables) = projection {
            pattern = GraphPattern::Project {
                inner: Box::new(pattern),
                variables,
            };
        }
        if distinct {
            pattern = GraphPattern::Distinct(Box::new(pattern));
        } else if reduced {
            pattern = GraphPattern::Reduced(Box::new(pattern));
        }
        if modifiers.offset > 0 || modifiers.limit.is_some() {
            pattern = GraphPattern::Slice {
                inner: Box::new(pattern),
                offset: modifiers.offset,
                limit: modifiers.limit,
            };
        }
        Ok(pattern)
    }

    /// Joins a trailing VALUES clause, if present.
    fn values_clause(&mut self, pattern: GraphPattern) -> Result<GraphPattern> {
        if self.eat_keyword("VALUES") {
            let values = self.data_block()?;
            Ok(GraphPattern::join(pattern, values))
        } else {
            Ok(pattern)
        }
    }

    fn data_block(&mut self) -> Result<GraphPattern> {
        let mut variables = Vec::new();
        let single = matches!(self.peek(), Token::Var(_));
        if single {
            variables.push(self.variable()?);
        } else {
            self.expect(&Token::OpenParen, "variable list")?;
            while matches!(self.peek(), Token::Var(_)) {
                variables.push(self.variable()?);
            }
            self.expect(&Token::CloseParen, "')'")?;
        }

        self.expect(&Token::OpenBrace, "'{'")?;
        let mut rows = Vec::new();
        while !self.eat(&Token::CloseBrace) {
            if single {
                rows.push(vec![self.data_value()?]);
                continue;
            }
            self.expect(&Token::OpenParen, "'('")?;
            let mut row = Vec::with_capacity(variables.len());
            while !self.eat(&Token::CloseParen) {
                row.push(self.data_value()?);
            }
            if row.len() != variables.len() {
                return Err(self.error(format!(
                    "VALUES row has {} values for {} variables",
                    row.len(),
                    variables.len()
                )));
            }
            rows.push(row);
        }
        Ok(GraphPattern::Values { variables, rows })
    }

    fn data_value(&mut self) -> Result<Option<Term>> {
        if self.eat_keyword("UNDEF") {
            return Ok(None);
        }
        if self.is_iri_start() {
            return Ok(Some(Term::iri(self.iri()?)));
        }
        if self.is_literal_start() {
            return Ok(Some(self.literal()?));
        }
        Err(self.unexpected("data value"))
    }

    // ========== Graph patterns ==========

    fn group_graph_pattern(&mut self) -> Result<GraphPattern> {
        self.expect(&Token::OpenBrace, "'{'")?;
        if self.at_keyword("SELECT") {
            return Err(Error::Unsupported("subqueries".into()));
        }

        let mut group = GraphPattern::Unit;
        let mut filters: Vec<Expression> = Vec::new();
        loop {
            if self.eat(&Token::CloseBrace) {
                break;
            }
            if self.eat_keyword("OPTIONAL") {
                let (right, filter) = match self.group_graph_pattern()? {
                    GraphPattern::Filter { expr, inner } => (*inner, Some(expr)),
                    other => (other, None),
                };
                group = GraphPattern::LeftJoin {
                    left: Box::new(group),
                    right: Box::new(right),
                    filter,
                };
            } else if self.eat_keyword("MINUS") {
                let right = self.group_graph_pattern()?;
                group = GraphPattern::Minus(Box::new(group), Box::new(right));
            } else if self.eat_keyword("GRAPH") {
                let name = self.var_or_iri()?;
                let inner = self.group_graph_pattern()?;
                group = GraphPattern::join(
                    group,
                    GraphPattern::Graph {
                        name,
                        inner: Box::new(inner),
                    },
                );
            } else if self.eat_keyword("FILTER") {
                filters.push(self.constraint()?);
            } else if self.eat_keyword("BIND") {
                self.expect(&Token::OpenParen, "'('")?;
                let expr = self.expression()?;
                self.expect_keyword("AS")?;
                let variable = self.variable()?;
                self.expect(&Token::CloseParen, "')'")?;
                group = extend(group, variable, expr)?;
            } else if self.eat_keyword("VALUES") {
                let values = self.data_block()?;
                group = GraphPattern::join(group, values);
            } else if self.at_keyword("SERVICE") {
                return Err(Error::Unsupported("SERVICE".into()));
            } else if *self.peek() == Token::OpenBrace {
                let mut alternative = self.group_graph_pattern()?;
                while self.eat_keyword("UNION") {
                    let right = self.group_graph_pattern()?;
                    alternative = GraphPattern::Union(Box::new(alternative), Box::new(right));
                }
                group = GraphPattern::join(group, alternative);
            } else if *self.peek() == Token::Eof {
                return Err(self.unexpected("'}'"));
            } else {
                let mut triples = Vec::new();
                self.triples_same_subject(&mut triples)?;
                group = GraphPattern::join(group, GraphPattern::Bgp(triples));
            }
            self.eat(&Token::Dot);
        }

        Ok(match filters.into_iter().reduce(|a, b| Expression::binary(BinaryOp::And, a, b)) {
            Some(expr) => GraphPattern::Filter {
                expr,
                inner: Box::new(group),
            },
            None => group,
        })
    }

    /// Triples up to `end`, separated by dots.
    fn triples_template(&mut self, end: &Token) -> Result<Vec<TriplePattern>> {
        let mut triples = Vec::new();
        while self.peek() != end {
            if *self.peek() == Token::Eof {
                return Err(self.unexpected("'}'"));
            }
            self.triples_same_subject(&mut triples)?;
            if !self.eat(&Token::Dot) {
                break;
            }
        }
        Ok(triples)
    }

    fn triples_same_subject(&mut self, out: &mut Vec<TriplePattern>) -> Result<()> {
        let (subject, standalone) = match self.peek() {
            Token::OpenBracket if *self.peek_at(1) != Token::CloseBracket => {
                (self.blank_node_property_list(out)?, true)
            }
            Token::OpenParen if *self.peek_at(1) != Token::CloseParen => {
                (self.collection(out)?, true)
            }
            _ => (self.var_or_term()?, false),
        };
        if standalone && matches!(self.peek(), Token::Dot | Token::CloseBrace) {
            return Ok(());
        }
        if let TermPattern::Term(term) = &subject {
            if term.is_literal() {
                return Err(self.error(format!("literal {} cannot be a subject", term)));
            }
        }
        self.property_list(subject, out)
    }

    fn property_list(&mut self, subject: TermPattern, out: &mut Vec<TriplePattern>) -> Result<()> {
        loop {
            let predicate = self.verb()?;
            loop {
                let object = self.object(out)?;
                out.push(TriplePattern {
                    subject: subject.clone(),
                    predicate: predicate.clone(),
                    object,
                });
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
            if !self.eat(&Token::Semicolon) {
                return Ok(());
            }
            while self.eat(&Token::Semicolon) {}
            let continues = match self.peek() {
                Token::Var(_) | Token::Iri(_) | Token::PrefixedName { .. } => true,
                Token::Name(name) => name == "a",
                _ => false,
            };
            if !continues {
                return Ok(());
            }
        }
    }

    fn verb(&mut self) -> Result<TermPattern> {
        if matches!(self.peek(), Token::Caret | Token::Bang | Token::OpenParen) {
            return Err(Error::Unsupported("property paths".into()));
        }
        let verb = match self.peek() {
            Token::Name(name) if name == "a" => {
                self.advance();
                TermPattern::Term(Term::iri(RDF_TYPE))
            }
            Token::Var(_) => self.var_or_term()?,
            _ if self.is_iri_start() => TermPattern::Term(Term::iri(self.iri()?)),
            _ => return Err(self.unexpected("predicate")),
        };
        let path_operator = match self.peek() {
            Token::Slash | Token::Pipe | Token::Star | Token::Question => true,
            Token::Plus => !matches!(
                self.peek_at(1),
                Token::Integer(_) | Token::Decimal(_) | Token::Double(_)
            ),
            _ => false,
        };
        if path_operator {
            return Err(Error::Unsupported("property paths".into()));
        }
        Ok(verb)
    }

    fn object(&mut self, out: &mut Vec<TriplePattern>) -> Result<TermPattern> {
        match self.peek() {
            Token::OpenBracket if *self.peek_at(1) != Token::CloseBracket => {
                self.blank_node_property_list(out)
            }
            Token::OpenParen if *self.peek_at(1) != Token::CloseParen => self.collection(out),
            _ => self.var_or_term(),
        }
    }

    fn blank_node_property_list(&mut self, out: &mut Vec<TriplePattern>) -> Result<TermPattern> {
        self.expect(&Token::OpenBracket, "'['")?;
        let node = self.blank_node(None)?;
        self.property_list(node.clone(), out)?;
        self.expect(&Token::CloseBracket, "']'")?;
        Ok(node)
    }

    fn collection(&mut self, out: &mut Vec<TriplePattern>) -> Result<TermPattern> {
        self.expect(&Token::OpenParen, "'('")?;
        let mut items = Vec::new();
        while !self.eat(&Token::CloseParen) {
            if *self.peek() == Token::Eof {
                return Err(self.unexpected("')'"));
            }
            items.push(self.object(out)?);
        }

        let first = TermPattern::Term(Term::iri(RDF_FIRST));
        let rest = TermPattern::Term(Term::iri(RDF_REST));
        let mut next = TermPattern::Term(Term::iri(RDF_NIL));
        for item in items.into_iter().rev() {
            let cell = self.blank_node(None)?;
            out.push(TriplePattern {
                subject: cell.clone(),
                predicate: rest.clone(),
                object: next,
            });
            out.push(TriplePattern {
                subject: cell.clone(),
                predicate: first.clone(),
                object: item,
            });
            next = cell;
        }
        Ok(next)
    }

    // ========== Expressions ==========

    /// FILTER / HAVING argument: a bracketted expression or a call.
    fn constraint(&mut self) -> Result<Expression> {
        match self.peek() {
            Token::OpenParen => self.bracketted_expression(),
            Token::Name(_) => self.primary(),
            Token::Iri(_) | Token::PrefixedName { .. } => {
                Err(Error::Unsupported("extension function calls".into()))
            }
            _ => Err(self.unexpected("constraint")),
        }
    }

    fn bracketted_expression(&mut self) -> Result<Expression> {
        self.expect(&Token::OpenParen, "'('")?;
        let expr = self.expression()?;
        self.expect(&Token::CloseParen, "')'")?;
        Ok(expr)
    }

    fn expression(&mut self) -> Result<Expression> {
        let mut left = self.and_expression()?;
        while self.eat(&Token::Or) {
            let right = self.and_expression()?;
            left = Expression::binary(BinaryOp::Or, left, right);
        }
        Ok(left)
    }

    fn and_expression(&mut self) -> Result<Expression> {
        let mut left = self.relational_expression()?;
        while self.eat(&Token::And) {
            let right = self.relational_expression()?;
            left = Expression::binary(BinaryOp::And, left, right);
        }
        Ok(left)
    }

    fn relational_expression(&mut self) -> Result<Expression> {
        let left = self.additive_expression()?;
        let op = match self.peek() {
            Token::Eq => BinaryOp::Eq,
            Token::Ne => BinaryOp::Ne,
            Token::Lt => BinaryOp::Lt,
            Token::Le => BinaryOp::Le,
            Token::Gt => BinaryOp::Gt,
            Token::Ge => BinaryOp::Ge,
            _ if self.at_keyword("IN") => {
                self.advance();
                return Ok(Expression::In(Box::new(left), self.expression_list()?));
            }
            _ if self.at_keyword("NOT") && self.peek_at(1).is_keyword("IN") => {
                self.advance();
                self.advance();
                return Ok(Expression::NotIn(Box::new(left), self.expression_list()?));
            }
            _ => return Ok(left),
        };
        self.advance();
        let right = self.additive_expression()?;
        Ok(Expression::binary(op, left, right))
    }

    fn additive_expression(&mut self) -> Result<Expression> {
        let mut left = self.multiplicative_expression()?;
        loop {
            let op = match self.peek() {
                Token::Plus => BinaryOp::Add,
                Token::Minus => BinaryOp::Sub,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.multiplicative_expression()?;
            left = Expression::binary(op, left, right);
        }
    }

    fn multiplicative_expression(&mut self) -> Result<Expression> {
        let mut left = self.unary_expression()?;
        loop {
            let op = match self.peek() {
                Token::Star => BinaryOp::Mul,
                Token::Slash => BinaryOp::Div,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.unary_expression()?;
            left = Expression::binary(op, left, right);
        }
    }

    fn unary_expression(&mut self) -> Result<Expression> {
        let op = match self.peek() {
            Token::Bang => UnaryOp::Not,
            Token::Minus => UnaryOp::Minus,
            Token::Plus => UnaryOp::Plus,
            _ => return self.primary(),
        };
        self.advance();
        Ok(Expression::Unary(op, Box::new(self.unary_expression()?)))
    }

    fn expression_list(&mut self) -> Result<Vec<Expression>> {
        self.expect(&Token::OpenParen, "'('")?;
        let mut list = Vec::new();
        if self.eat(&Token::CloseParen) {
            return Ok(list);
        }
        loop {
            list.push(self.expression()?);
            if self.eat(&Token::CloseParen) {
                return Ok(list);
            }
            self.expect(&Token::Comma, "',' or ')'")?;
        }
    }

    fn primary(&mut self) -> Result<Expression> {
        match self.peek().clone() {
            Token::OpenParen => self.bracketted_expression(),
            Token::Var(name) => {
                self.advance();
                Ok(Expression::Variable(Variable::new(name)))
            }
            Token::Iri(_) | Token::PrefixedName { .. } => {
                let iri = self.iri()?;
                if *self.peek() == Token::OpenParen {
                    return Err(Error::Unsupported(format!("function <{}>", iri)));
                }
                Ok(Expression::Term(Term::iri(iri)))
            }
            Token::Name(name) if name == "true" || name == "false" => {
                Ok(Expression::Term(self.unsigned_literal()?))
            }
            Token::Name(name) => self.call(&name),
            _ if self.is_literal_start() => Ok(Expression::Term(self.unsigned_literal()?)),
            _ => Err(self.unexpected("expression")),
        }
    }

    fn call(&mut self, name: &str) -> Result<Expression> {
        let upper = name.to_ascii_uppercase();
        match upper.as_str() {
            "BOUND" => {
                self.advance();
                self.expect(&Token::OpenParen, "'('")?;
                let var = self.variable()?;
                self.expect(&Token::CloseParen, "')'")?;
                return Ok(Expression::Bound(var));
            }
            "IF" => {
                self.advance();
                let args = self.expression_list()?;
                let [cond, then, otherwise]: [Expression; 3] = args
                    .try_into()
                    .map_err(|_| self.error("IF takes 3 arguments"))?;
                return Ok(Expression::If(
                    Box::new(cond),
                    Box::new(then),
                    Box::new(otherwise),
                ));
            }
            "COALESCE" => {
                self.advance();
                return Ok(Expression::Coalesce(self.expression_list()?));
            }
            "EXISTS" | "NOT" => return Err(Error::Unsupported("EXISTS filters".into())),
            "COUNT" | "SUM" | "MIN" | "MAX" | "AVG" | "SAMPLE" | "GROUP_CONCAT" => {
                return self.aggregate(&upper);
            }
            _ => {}
        }

        let Some(function) = Function::from_name(name) else {
            return Err(Error::Unsupported(format!("function {}", name)));
        };
        self.advance();
        let args = self.expression_list()?;
        let (min, max) = function.arity();
        if args.len() < min || args.len() > max {
            return Err(self.error(format!(
                "{} takes {} arguments, got {}",
                upper,
                if min == max {
                    min.to_string()
                } else {
                    format!("{} to {}", min, max)
                },
                args.len()
            )));
        }
        Ok(Expression::Function(function, args))
    }

    fn aggregate(&mut self, name: &str) -> Result<Expression> {
        if !self.aggregates_allowed {
            return Err(self.error(format!("aggregate {} is not allowed here", name)));
        }
        self.advance();
        self.expect(&Token::OpenParen, "'('")?;
        let distinct = self.eat_keyword("DISTINCT");

        let expr = if name == "COUNT" && self.eat(&Token::Star) {
            None
        } else {
            // Aggregates do not nest.
            self.aggregates_allowed = false;
            let expr = self.expression()?;
            self.aggregates_allowed = true;
            Some(expr)
        };

        let function = match name {
            "COUNT" => AggregateFunction::Count,
            "SUM" => AggregateFunction::Sum,
            "MIN" => AggregateFunction::Min,
            "MAX" => AggregateFunction::Max,
            "AVG" => AggregateFunction::Avg,
            "SAMPLE" => AggregateFunction::Sample,
            _ => {
                let mut separator = " ".to_string();
                if self.eat(&Token::Semicolon) {
                    self.expect_keyword("SEPARATOR")?;
                    self.expect(&Token::Eq, "'='")?;
                    match self.advance() {
                        Token::String(s) => separator = s,
                        _ => return Err(self.unexpected("separator string")),
                    }
                }
                AggregateFunction::GroupConcat { separator }
            }
        };
        self.expect(&Token::CloseParen, "')'")?;

        let variable = self.fresh_hidden("agg");
        self.aggregates.push((
            variable.clone(),
            Aggregate {
                function,
                distinct,
                expr,
            },
        ));
        Ok(Expression::Variable(variable))
    }

    // ========== Updates ==========

    fn update(&mut self) -> Result<Update> {
        let mut operations = Vec::new();
        loop {
            self.prologue()?;
            if *self.peek() == Token::Eof {
                break;
            }
            let mode = if self.at_keyword("INSERT") && self.peek_at(1).is_keyword("DATA") {
                Mode::InsertData
            } else if self.at_keyword("DELETE") && self.peek_at(1).is_keyword("DATA") {
                Mode::DeleteData
            } else if let Token::Name(name) = self.peek() {
                return Err(Error::Unsupported(format!(
                    "update operation {}",
                    name.to_ascii_uppercase()
                )));
            } else {
                return Err(self.unexpected("INSERT DATA or DELETE DATA"));
            };
            self.advance();
            self.advance();

            self.mode = mode;
            let quads = self.quad_data();
            self.mode = Mode::Pattern;
            let quads = quads?;
            operations.push(match mode {
                Mode::DeleteData => UpdateOperation::DeleteData(quads),
                _ => UpdateOperation::InsertData(quads),
            });

            if !self.eat(&Token::Semicolon) {
                break;
            }
        }
        self.expect_eof()?;
        Ok(Update { operations })
    }

    fn quad_data(&mut self) -> Result<Vec<Quad>> {
        self.expect(&Token::OpenBrace, "'{'")?;
        let mut quads = Vec::new();
        loop {
            if self.eat(&Token::CloseBrace) {
                return Ok(quads);
            }
            let (graph, triples) = if self.eat_keyword("GRAPH") {
                let graph = Term::iri(self.iri()?);
                self.expect(&Token::OpenBrace, "'{'")?;
                let triples = self.triples_template(&Token::CloseBrace)?;
                self.expect(&Token::CloseBrace, "'}'")?;
                (Some(graph), triples)
            } else {
                let mut triples = Vec::new();
                self.triples_same_subject(&mut triples)?;
                (None, triples)
            };
            for pattern in triples {
                quads.push(Quad {
                    triple: ground(pattern)?,
                    graph: graph.clone(),
                });
            }
            self.eat(&Token::Dot);
        }
    }
}

/// `Extend`, rejecting a variable that is already in scope.
fn extend(inner: GraphPattern, variable: Variable, expr: Expression) -> Result<GraphPattern> {
    if inner.visible_variables().contains(&variable) {
        return Err(Error::Evaluation(format!(
            "{} is already bound in this scope",
            variable
        )));
    }
    Ok(GraphPattern::Extend {
        inner: Box::new(inner),
        variable,
        expr,
    })
}

fn ground(pattern: TriplePattern) -> Result<RdfTriple> {
    let term = |position: TermPattern| match position {
        TermPattern::Term(term) => Ok(term),
        other => Err(Error::Evaluation(format!(
            "data blocks must not contain {:?}",
            other
        ))),
    };
    Ok(RdfTriple::new(
        term(pattern.subject)?,
        term(pattern.predicate)?,
        term(pattern.object)?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ex(local: &str) -> Term {
        Term::iri(format!("http://example.org/{}", local))
    }

    fn v(name: &str) -> TermPattern {
        TermPattern::Variable(Variable::new(name))
    }

    fn select_vars(query: &Query) -> Vec<String> {
        match &query.form {
            QueryForm::Select { variables } => variables.iter().map(|v| v.name().to_string()).collect(),
            other => panic!("not a select: {:?}", other),
        }
    }

    #[test]
    fn test_simple_select() {
        let query = parse_query(
            "PREFIX ex: <http://example.org/>\nSELECT ?s ?o WHERE { ?s ex:p ?o }",
        )
        .unwrap();
        assert_eq!(select_vars(&query), vec!["s", "o"]);
        match query.pattern {
            GraphPattern::Project { inner, .. } => assert_eq!(
                *inner,
                GraphPattern::Bgp(vec![TriplePattern::new(v("s"), ex("p"), v("o"))])
            ),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_select_star_hides_blank_nodes() {
        let query = parse_query("SELECT * { _:x <http://p> ?o . [] <http://q> ?z }").unwrap();
        assert_eq!(select_vars(&query), vec!["o", "z"]);
    }

    #[test]
    fn test_property_and_object_lists() {
        let query = parse_query(
            "PREFIX ex: <http://example.org/> SELECT * { ?s a ex:T ; ex:p 1, -2.5 ; }",
        )
        .unwrap();
        match query.pattern {
            GraphPattern::Bgp(patterns) => {
                assert_eq!(patterns.len(), 3);
                assert_eq!(patterns[0].predicate, TermPattern::Term(Term::iri(RDF_TYPE)));
                assert_eq!(
                    patterns[2].object,
                    TermPattern::Term(Term::typed_literal("-2.5", XSD_DECIMAL))
                );
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_optional_filter_becomes_condition() {
        let query = parse_query(
            "SELECT * { ?s <http://p> ?o OPTIONAL { ?s <http://q> ?n FILTER(?n > 3) } }",
        )
        .unwrap();
        match query.pattern {
            GraphPattern::LeftJoin { filter, .. } => assert!(filter.is_some()),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_group_filters_apply_to_whole_group() {
        let query = parse_query("SELECT * { FILTER(?o = 1) ?s <http://p> ?o }").unwrap();
        match query.pattern {
            GraphPattern::Filter { inner, .. } => assert!(matches!(*inner, GraphPattern::Bgp(_))),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_union_and_graph() {
        let query = parse_query(
            "SELECT ?x { { ?x <http://a> ?y } UNION { GRAPH ?g { ?x <http://b> ?y } } }",
        )
        .unwrap();
        match query.pattern {
            GraphPattern::Project { inner, .. } => match *inner {
                GraphPattern::Union(_, right) => {
                    assert!(matches!(*right, GraphPattern::Graph { .. }))
                }
                other => panic!("unexpected {:?}", other),
            },
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_expression_precedence() {
        let query = parse_query("ASK { FILTER(1 + 2 * 3 = 7 || !false) }").unwrap();
        let GraphPattern::Filter { expr, .. } = query.pattern else {
            panic!("expected filter");
        };
        match expr {
            Expression::Binary(BinaryOp::Or, left, right) => {
                assert!(matches!(*left, Expression::Binary(BinaryOp::Eq, _, _)));
                assert!(matches!(*right, Expression::Unary(UnaryOp::Not, _)));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_aggregates_and_grouping() {
        let query = parse_query(
            "SELECT ?s (COUNT(*) AS ?n) { ?s ?p ?o } GROUP BY ?s HAVING (COUNT(*) > 1) ORDER BY DESC(?n) LIMIT 5",
        )
        .unwrap();
        assert_eq!(select_vars(&query), vec!["s", "n"]);
        let GraphPattern::Slice { inner, limit, .. } = query.pattern else {
            panic!("expected slice");
        };
        assert_eq!(limit, Some(5));
        let GraphPattern::Project { inner, .. } = *inner else {
            panic!("expected project");
        };
        let GraphPattern::OrderBy { inner, .. } = *inner else {
            panic!("expected order by");
        };
        let GraphPattern::Extend { inner, .. } = *inner else {
            panic!("expected extend");
        };
        let GraphPattern::Filter { inner, .. } = *inner else {
            panic!("expected having");
        };
        match *inner {
            GraphPattern::Group { keys, aggregates, .. } => {
                assert_eq!(keys.len(), 1);
                assert_eq!(aggregates.len(), 2);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_ungrouped_projection_is_rejected() {
        let err = parse_query("SELECT ?o (COUNT(?s) AS ?n) { ?s ?p ?o } GROUP BY ?s").unwrap_err();
        assert!(matches!(err, Error::Evaluation(_)));
    }

    #[test]
    fn test_aggregate_in_where_is_rejected() {
        let err = parse_query("SELECT * { ?s ?p ?o FILTER(COUNT(?s) > 1) }").unwrap_err();
        assert!(matches!(err, Error::Syntax { .. }));
    }

    #[test]
    fn test_collection_expands_to_list() {
        let query = parse_query("SELECT * { ?s <http://p> (1 2) }").unwrap();
        let GraphPattern::Bgp(patterns) = query.pattern else {
            panic!("expected bgp");
        };
        // two cells of first/rest plus the linking triple
        assert_eq!(patterns.len(), 5);
    }

    #[test]
    fn test_construct_template_blank_nodes() {
        let query = parse_query(
            "CONSTRUCT { _:b <http://p> ?o } WHERE { ?s <http://q> ?o }",
        )
        .unwrap();
        match query.form {
            QueryForm::Construct { template } => {
                assert_eq!(template[0].subject, TermPattern::BlankNode("ub".into()))
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_construct_where() {
        let query = parse_query("CONSTRUCT WHERE { ?s <http://p> ?o }").unwrap();
        assert!(matches!(query.form, QueryForm::Construct { .. }));
        assert!(matches!(query.pattern, GraphPattern::Bgp(_)));
    }

    #[test]
    fn test_dataset_clauses() {
        let query = parse_query(
            "SELECT * FROM <http://g1> FROM NAMED <http://g2> { ?s ?p ?o }",
        )
        .unwrap();
        assert_eq!(query.dataset.default, vec![Term::iri("http://g1")]);
        assert_eq!(query.dataset.named, vec![Term::iri("http://g2")]);
    }

    #[test]
    fn test_values() {
        let query = parse_query(
            "SELECT * { VALUES (?a ?b) { (1 UNDEF) (<http://x> \"y\") } }",
        )
        .unwrap();
        match query.pattern {
            GraphPattern::Values { variables, rows } => {
                assert_eq!(variables.len(), 2);
                assert_eq!(rows[0][1], None);
                assert_eq!(rows[1][0], Some(Term::iri("http://x")));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_base_resolution() {
        let query = parse_query("BASE <http://example.org/dir/> SELECT * { <a> ?p ?o }").unwrap();
        let GraphPattern::Bgp(patterns) = query.pattern else {
            panic!("expected bgp");
        };
        assert_eq!(patterns[0].subject, TermPattern::Term(ex("dir/a")));
    }

    #[test]
    fn test_syntax_error_position() {
        match parse_query("SELECT ?s\nWHERE { ?s ?p }").unwrap_err() {
            Error::Syntax { line, column, .. } => assert_eq!((line, column), (2, 15)),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_undeclared_prefix() {
        let err = parse_query("SELECT * { ?s nope:p ?o }").unwrap_err();
        assert!(err.to_string().contains("undeclared prefix"));
    }

    #[test]
    fn test_unsupported_constructs() {
        for query in [
            "DESCRIBE <http://x>",
            "SELECT * { ?s <http://a>/<http://b> ?o }",
            "SELECT * { SERVICE <http://remote> { ?s ?p ?o } }",
            "SELECT * { ?s ?p ?o FILTER EXISTS { ?s ?p ?o } }",
            "SELECT * { { SELECT ?s { ?s ?p ?o } } }",
        ] {
            assert!(
                matches!(parse_query(query), Err(Error::Unsupported(_))),
                "{}",
                query
            );
        }
    }

    #[test]
    fn test_bind_rejects_bound_variable() {
        let err = parse_query("SELECT * { ?s ?p ?o BIND(1 AS ?o) }").unwrap_err();
        assert!(matches!(err, Error::Evaluation(_)));
    }

    #[test]
    fn test_insert_and_delete_data() {
        let update = parse_update(
            r#"PREFIX ex: <http://example.org/>
               INSERT DATA { ex:a ex:p "1" . GRAPH ex:g { ex:a ex:p _:n } } ;
               DELETE DATA { ex:a ex:p "1" }"#,
        )
        .unwrap();
        assert_eq!(update.operations.len(), 2);
        match &update.operations[0] {
            UpdateOperation::InsertData(quads) => {
                assert_eq!(quads.len(), 2);
                assert_eq!(quads[1].graph, Some(ex("g")));
                assert!(quads[1].triple.object.is_blank_node());
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(update.operations[1], UpdateOperation::DeleteData(_)));
    }

    #[test]
    fn test_data_rejects_variables_and_delete_blanks() {
        assert!(matches!(
            parse_update("INSERT DATA { ?s <http://p> 1 }"),
            Err(Error::Evaluation(_))
        ));
        assert!(matches!(
            parse_update("DELETE DATA { _:x <http://p> 1 }"),
            Err(Error::Evaluation(_))
        ));
        assert!(matches!(
            parse_update("CLEAR ALL"),
            Err(Error::Unsupported(_))
        ));
    }
}
