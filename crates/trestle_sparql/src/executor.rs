//! Plan execution.
//!
//! Solutions stream lazily out of index scans. Basic graph patterns are
//! nested-loop joins: each solution of the patterns so far is substituted
//! into the next pattern before it is scanned. Only operators that need all
//! their input (grouping, ordering, the right side of MINUS and of non-BGP
//! joins) materialize.

use crate::algebra::{AggregateFunction, BinaryOp};
use crate::compile::{
    BoundValue, CompiledAggregate, GraphScope, GraphSet, Plan, PlanPattern, PlanTerm, Row,
    TemplateTerm,
};
use crate::expression::{
    arithmetic, as_numeric, order_terms, Bindings, EvalResult, ExprError, Expr, Numeric,
};
use crate::{CancelToken, Error, Result};
use indexmap::{IndexMap, IndexSet};
use log::{debug, trace};
use std::collections::{HashMap, HashSet};
use std::iter;
use trestle_graph::rdf::{BlankNodeGenerator, RdfTriple};
use trestle_graph::{Term, TermId, Triple, TriplePattern, TripleStore};

/// A stream of solutions.
pub type Solutions<'a> = Box<dyn Iterator<Item = Result<Row>> + 'a>;

fn empty<'a>() -> Solutions<'a> {
    Box::new(iter::empty())
}

fn single<'a>(item: Result<Row>) -> Solutions<'a> {
    Box::new(iter::once(item))
}

/// A solution row seen through the store's dictionary.
pub struct RowView<'r> {
    store: &'r TripleStore,
    row: &'r Row,
}

impl<'r> RowView<'r> {
    pub fn new(store: &'r TripleStore, row: &'r Row) -> Self {
        Self { store, row }
    }
}

impl Bindings for RowView<'_> {
    fn term(&self, slot: usize) -> Result<Option<Term>> {
        match self.row.get(slot).and_then(Option::as_ref) {
            Some(BoundValue::Id(id)) => Ok(Some(self.store.resolve(*id)?)),
            Some(BoundValue::Term(term)) => Ok(Some(term.clone())),
            None => Ok(None),
        }
    }
}

/// Merges two compatible rows, `None` when they disagree on a slot.
fn merge(left: &Row, right: &Row) -> Option<Row> {
    let mut merged = left.clone();
    for (slot, value) in right.iter().enumerate() {
        match (&merged[slot], value) {
            (Some(a), Some(b)) if a != b => return None,
            (None, Some(b)) => merged[slot] = Some(b.clone()),
            _ => {}
        }
    }
    Some(merged)
}

/// Evaluates plans against one store.
#[derive(Clone, Copy)]
pub struct Executor<'a> {
    store: &'a TripleStore,
    width: usize,
    cancel: Option<&'a CancelToken>,
}

impl<'a> Executor<'a> {
    /// `width` is the number of slots of the compiled query.
    pub fn new(store: &'a TripleStore, width: usize, cancel: Option<&'a CancelToken>) -> Self {
        Self {
            store,
            width,
            cancel,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_some_and(CancelToken::is_cancelled)
    }

    fn empty_row(&self) -> Row {
        vec![None; self.width]
    }

    /// Normalizes a computed term: ids for terms the dictionary knows.
    fn bind(&self, term: Term) -> Result<BoundValue> {
        Ok(match self.store.lookup_existing(&term)? {
            Some(id) => BoundValue::Id(id),
            None => BoundValue::Term(term),
        })
    }

    /// Resolves a bound value to its term.
    pub fn term(&self, value: &BoundValue) -> Result<Term> {
        match value {
            BoundValue::Id(id) => Ok(self.store.resolve(*id)?),
            BoundValue::Term(term) => Ok(term.clone()),
        }
    }

    /// Evaluates `plan` from scratch.
    pub fn execute(self, plan: &'a Plan) -> Solutions<'a> {
        match plan {
            Plan::Empty => empty(),
            Plan::Unit => single(Ok(self.empty_row())),
            Plan::Bgp(patterns) => self.bgp(patterns, self.empty_row()),
            Plan::Join(left, right) => self.join(left, right),
            Plan::LeftJoin {
                left,
                right,
                filter,
            } => self.left_join(left, right, filter.as_ref()),
            Plan::Union(left, right) => Box::new(self.execute(left).chain(self.execute(right))),
            Plan::Minus(left, right) => self.minus(left, right),
            Plan::Filter { expr, inner } => {
                Box::new(self.execute(inner).filter_map(move |row| {
                    let row = match row {
                        Ok(row) => row,
                        Err(e) => return Some(Err(e)),
                    };
                    match self.passes(expr, &row) {
                        Ok(true) => Some(Ok(row)),
                        Ok(false) => None,
                        Err(e) => Some(Err(e)),
                    }
                }))
            }
            Plan::Extend { inner, slot, expr } => {
                let slot = *slot;
                Box::new(self.execute(inner).map(move |row| {
                    let mut row = row?;
                    if row[slot].is_some() {
                        trace!("BIND target already bound, keeping it");
                        return Ok(row);
                    }
                    match expr.eval(&RowView::new(self.store, &row)) {
                        Ok(term) => row[slot] = Some(self.bind(term)?),
                        Err(ExprError::Type(reason)) => {
                            trace!("BIND left unbound: {}", reason)
                        }
                        Err(ExprError::Fault(e)) => return Err(e),
                    }
                    Ok(row)
                }))
            }
            Plan::Values(rows) => Box::new(rows.iter().map(move |assignments| {
                let mut row = self.empty_row();
                for (slot, value) in assignments {
                    row[*slot] = Some(value.clone());
                }
                Ok(row)
            })),
            Plan::Group {
                inner,
                keys,
                key_slots,
                aggregates,
            } => match self.group(inner, keys, key_slots, aggregates) {
                Ok(rows) => Box::new(rows.into_iter().map(Ok)),
                Err(e) => single(Err(e)),
            },
            Plan::OrderBy { inner, conditions } => match self.order_by(inner, conditions) {
                Ok(rows) => Box::new(rows.into_iter().map(Ok)),
                Err(e) => single(Err(e)),
            },
            Plan::Project { inner, slots } => Box::new(self.execute(inner).map(move |row| {
                let row = row?;
                let mut projected = self.empty_row();
                for slot in slots {
                    projected[*slot] = row[*slot].clone();
                }
                Ok(projected)
            })),
            Plan::Distinct(inner) => {
                let mut seen = HashSet::new();
                Box::new(self.execute(inner).filter(move |row| match row {
                    Ok(row) => seen.insert(row.clone()),
                    Err(_) => true,
                }))
            }
            Plan::Reduced(inner) => {
                let mut last: Option<Row> = None;
                Box::new(self.execute(inner).filter(move |row| match row {
                    Ok(row) if last.as_ref() == Some(row) => false,
                    Ok(row) => {
                        last = Some(row.clone());
                        true
                    }
                    Err(_) => true,
                }))
            }
            Plan::Slice {
                inner,
                offset,
                limit,
            } => {
                let rows = self.execute(inner).skip(*offset);
                match limit {
                    Some(limit) => Box::new(rows.take(*limit)),
                    None => Box::new(rows),
                }
            }
        }
    }

    fn passes(&self, expr: &Expr, row: &Row) -> Result<bool> {
        match expr.ebv(&RowView::new(self.store, row)) {
            Ok(keep) => Ok(keep),
            Err(ExprError::Type(reason)) => {
                trace!("FILTER dropped solution: {}", reason);
                Ok(false)
            }
            Err(ExprError::Fault(e)) => Err(e),
        }
    }

    fn materialize(&self, plan: &'a Plan) -> Result<Vec<Row>> {
        self.execute(plan).collect()
    }

    // ========== Basic graph patterns ==========

    /// Extends `seed` through every pattern in order.
    fn bgp(self, patterns: &'a [PlanPattern], seed: Row) -> Solutions<'a> {
        let mut solutions = single(Ok(seed));
        for pattern in patterns {
            solutions = Box::new(solutions.flat_map(move |row| match row {
                Ok(row) => self.match_pattern(pattern, row),
                Err(e) => single(Err(e)),
            }));
        }
        solutions
    }

    /// Scans one pattern under the bindings of `row`.
    fn match_pattern(self, pattern: &'a PlanPattern, row: Row) -> Solutions<'a> {
        if self.is_cancelled() {
            return empty();
        }
        let mut ids = [None; 4];
        // Slots the scan binds, with their position.
        let mut binds: Vec<(usize, usize)> = Vec::new();

        for (position, term) in pattern.terms.iter().enumerate() {
            match *term {
                PlanTerm::Const(id) => ids[position] = Some(id),
                PlanTerm::Slot(slot) => match &row[slot] {
                    Some(BoundValue::Id(id)) => ids[position] = Some(*id),
                    // bound to a term the store has never seen
                    Some(BoundValue::Term(_)) => return empty(),
                    None => binds.push((position, slot)),
                },
            }
        }

        // Graph filter applied to scanned triples, and whether duplicates
        // across graphs collapse.
        let mut allowed: Option<&'a GraphSet> = None;
        let mut named_only = false;
        let mut collapse_graphs = false;
        match &pattern.scope {
            GraphScope::Default(GraphSet::All) => collapse_graphs = true,
            GraphScope::Default(set @ GraphSet::Only(graphs)) => match graphs.as_slice() {
                [] => return empty(),
                [graph] => ids[3] = Some(*graph),
                _ => {
                    allowed = Some(set);
                    collapse_graphs = true;
                }
            },
            GraphScope::Named {
                graph: PlanTerm::Const(id),
                ..
            } => ids[3] = Some(*id),
            GraphScope::Named {
                graph: PlanTerm::Slot(slot),
                allowed: graphs,
            } => match &row[*slot] {
                Some(BoundValue::Id(id)) if !id.is_default_graph() && graphs.allows(*id) => {
                    ids[3] = Some(*id)
                }
                Some(_) => return empty(),
                None => {
                    binds.push((3, *slot));
                    allowed = Some(graphs);
                    named_only = true;
                }
            },
        }

        let scan_pattern = TriplePattern::from_array(ids);
        trace!("scanning {:?}", scan_pattern);
        let cancel = self.cancel;
        let mut last: Option<[TermId; 3]> = None;

        Box::new(
            self.store
                .scan(scan_pattern)
                .take_while(move |_| !cancel.is_some_and(CancelToken::is_cancelled))
                .filter(move |triple| match triple {
                    Ok(t) => {
                        !(named_only && t.graph.is_default_graph())
                            && allowed.map_or(true, |set| set.allows(t.graph))
                    }
                    Err(_) => true,
                })
                // Scans with an unbound graph are ordered with the graph
                // last, so equal triples from different graphs are adjacent.
                .filter(move |triple| match triple {
                    Ok(t) if collapse_graphs => {
                        let key = [t.subject, t.predicate, t.object];
                        if last == Some(key) {
                            false
                        } else {
                            last = Some(key);
                            true
                        }
                    }
                    _ => true,
                })
                .filter_map(move |triple| match triple {
                    Ok(triple) => extend_row(&row, &binds, &triple).map(Ok),
                    Err(e) => Some(Err(Error::from(e))),
                }),
        )
    }

    // ========== Joins ==========

    fn join(self, left: &'a Plan, right: &'a Plan) -> Solutions<'a> {
        if let Plan::Bgp(patterns) = right {
            return Box::new(self.execute(left).flat_map(move |row| match row {
                Ok(row) => self.bgp(patterns, row),
                Err(e) => single(Err(e)),
            }));
        }
        let right_rows = match self.materialize(right) {
            Ok(rows) => rows,
            Err(e) => return single(Err(e)),
        };
        Box::new(self.execute(left).flat_map(move |row| -> Solutions<'a> {
            match row {
                Ok(row) => Box::new(
                    right_rows
                        .iter()
                        .filter_map(|r| merge(&row, r))
                        .map(Ok)
                        .collect::<Vec<_>>()
                        .into_iter(),
                ),
                Err(e) => single(Err(e)),
            }
        }))
    }

    fn left_join(self, left: &'a Plan, right: &'a Plan, filter: Option<&'a Expr>) -> Solutions<'a> {
        let right_rows = match right {
            Plan::Bgp(_) => None,
            other => match self.materialize(other) {
                Ok(rows) => Some(rows),
                Err(e) => return single(Err(e)),
            },
        };

        Box::new(self.execute(left).flat_map(move |row| -> Solutions<'a> {
            let row = match row {
                Ok(row) => row,
                Err(e) => return single(Err(e)),
            };
            let candidates: Vec<Row> = match (&right_rows, right) {
                (Some(rows), _) => rows.iter().filter_map(|r| merge(&row, r)).collect(),
                (None, Plan::Bgp(patterns)) => {
                    match self.bgp(patterns, row.clone()).collect::<Result<_>>() {
                        Ok(rows) => rows,
                        Err(e) => return single(Err(e)),
                    }
                }
                (None, _) => Vec::new(),
            };

            let mut matched = Vec::with_capacity(candidates.len());
            for candidate in candidates {
                let keep = match filter {
                    Some(expr) => match self.passes(expr, &candidate) {
                        Ok(keep) => keep,
                        Err(e) => return single(Err(e)),
                    },
                    None => true,
                };
                if keep {
                    matched.push(Ok(candidate));
                }
            }
            if matched.is_empty() {
                single(Ok(row))
            } else {
                Box::new(matched.into_iter())
            }
        }))
    }

    fn minus(self, left: &'a Plan, right: &'a Plan) -> Solutions<'a> {
        let right_rows = match self.materialize(right) {
            Ok(rows) => rows,
            Err(e) => return single(Err(e)),
        };
        Box::new(self.execute(left).filter(move |row| match row {
            Ok(row) => !right_rows.iter().any(|r| {
                let mut shared = false;
                for (a, b) in row.iter().zip(r) {
                    if let (Some(a), Some(b)) = (a, b) {
                        if a != b {
                            return false;
                        }
                        shared = true;
                    }
                }
                shared
            }),
            Err(_) => true,
        }))
    }

    // ========== Grouping ==========

    fn group(
        &self,
        inner: &'a Plan,
        keys: &[Expr],
        key_slots: &[Option<usize>],
        aggregates: &[(usize, CompiledAggregate)],
    ) -> Result<Vec<Row>> {
        let mut groups: IndexMap<Vec<Option<Term>>, Vec<Row>> = IndexMap::new();
        for row in self.execute(inner) {
            let row = row?;
            let view = RowView::new(self.store, &row);
            let mut key = Vec::with_capacity(keys.len());
            for expr in keys {
                key.push(match expr.eval(&view) {
                    Ok(term) => Some(term),
                    Err(ExprError::Type(_)) => None,
                    Err(ExprError::Fault(e)) => return Err(e),
                });
            }
            groups.entry(key).or_default().push(row);
        }
        // Aggregating without GROUP BY yields one group even over no input.
        if groups.is_empty() && keys.is_empty() {
            groups.insert(Vec::new(), Vec::new());
        }
        debug!("grouped into {} groups", groups.len());

        let mut out = Vec::with_capacity(groups.len());
        for (key, rows) in groups {
            let mut row = self.empty_row();
            for (slot, value) in key_slots.iter().zip(key) {
                if let (Some(slot), Some(term)) = (slot, value) {
                    row[*slot] = Some(self.bind(term)?);
                }
            }
            for (slot, aggregate) in aggregates {
                match self.aggregate(aggregate, &rows) {
                    Ok(Some(term)) => row[*slot] = Some(self.bind(term)?),
                    Ok(None) | Err(ExprError::Type(_)) => {}
                    Err(ExprError::Fault(e)) => return Err(e),
                }
            }
            out.push(row);
        }
        Ok(out)
    }

    fn aggregate(&self, aggregate: &CompiledAggregate, rows: &[Row]) -> EvalResult<Option<Term>> {
        let Some(expr) = &aggregate.expr else {
            // COUNT(*)
            let count = if aggregate.distinct {
                rows.iter().collect::<HashSet<_>>().len()
            } else {
                rows.len()
            };
            return Ok(Some(Term::integer(count as i64)));
        };

        let mut values = Vec::with_capacity(rows.len());
        for row in rows {
            match expr.eval(&RowView::new(self.store, row)) {
                Ok(term) => values.push(term),
                // unbound or erroneous inputs are left out of the aggregate
                Err(ExprError::Type(_)) => {}
                Err(fault) => return Err(fault),
            }
        }
        if aggregate.distinct {
            let unique: IndexSet<Term> = values.into_iter().collect();
            values = unique.into_iter().collect();
        }

        Ok(match &aggregate.function {
            AggregateFunction::Count => Some(Term::integer(values.len() as i64)),
            AggregateFunction::Sum => Some(sum(&values)?.to_term()),
            AggregateFunction::Avg => {
                if values.is_empty() {
                    Some(Term::integer(0))
                } else {
                    let total = sum(&values)?;
                    let count = Numeric::Integer(values.len() as i64);
                    Some(arithmetic(BinaryOp::Div, total, count)?.to_term())
                }
            }
            AggregateFunction::Min => values
                .into_iter()
                .min_by(|a, b| order_terms(Some(a), Some(b))),
            AggregateFunction::Max => values
                .into_iter()
                .max_by(|a, b| order_terms(Some(a), Some(b))),
            AggregateFunction::Sample => values.into_iter().next(),
            AggregateFunction::GroupConcat { separator } => {
                let mut parts = Vec::with_capacity(values.len());
                for value in &values {
                    match value {
                        Term::Literal(lit) => parts.push(lit.lexical().to_string()),
                        Term::NamedNode(iri) => parts.push(iri.clone()),
                        Term::BlankNode(_) => {
                            return Err(ExprError::Type("GROUP_CONCAT over a blank node".into()))
                        }
                    }
                }
                Some(Term::literal(parts.join(separator)))
            }
        })
    }

    // ========== Ordering ==========

    fn order_by(&self, inner: &'a Plan, conditions: &[(Expr, bool)]) -> Result<Vec<Row>> {
        let mut keyed = Vec::new();
        for row in self.execute(inner) {
            let row = row?;
            let view = RowView::new(self.store, &row);
            let mut key = Vec::with_capacity(conditions.len());
            for (expr, _) in conditions {
                key.push(match expr.eval(&view) {
                    Ok(term) => Some(term),
                    Err(ExprError::Type(_)) => None,
                    Err(ExprError::Fault(e)) => return Err(e),
                });
            }
            keyed.push((key, row));
        }
        keyed.sort_by(|(a, _), (b, _)| {
            for ((x, y), (_, descending)) in a.iter().zip(b).zip(conditions) {
                let ordering = order_terms(x.as_ref(), y.as_ref());
                let ordering = if *descending {
                    ordering.reverse()
                } else {
                    ordering
                };
                if ordering.is_ne() {
                    return ordering;
                }
            }
            std::cmp::Ordering::Equal
        });
        Ok(keyed.into_iter().map(|(_, row)| row).collect())
    }

    // ========== Templates ==========

    /// Instantiates a CONSTRUCT template for each solution. Template blank
    /// nodes get fresh labels per solution; triples with unbound positions or
    /// that break the RDF position rules are skipped.
    pub fn construct(
        &self,
        template: &[[TemplateTerm; 3]],
        solutions: impl Iterator<Item = Result<Row>>,
    ) -> Result<Vec<RdfTriple>> {
        let mut generator = BlankNodeGenerator::new();
        let mut triples = IndexSet::new();
        for row in solutions {
            let row = row?;
            let mut blanks: HashMap<&str, Term> = HashMap::new();
            'triple: for positions in template {
                let mut terms = Vec::with_capacity(3);
                for position in positions {
                    let term = match position {
                        TemplateTerm::Slot(slot) => match &row[*slot] {
                            Some(value) => self.term(value)?,
                            None => continue 'triple,
                        },
                        TemplateTerm::Term(term) => term.clone(),
                        TemplateTerm::Blank(label) => blanks
                            .entry(label.as_str())
                            .or_insert_with(|| Term::blank(generator.fresh()))
                            .clone(),
                    };
                    terms.push(term);
                }
                let [subject, predicate, object]: [Term; 3] = match terms.try_into() {
                    Ok(terms) => terms,
                    Err(_) => continue,
                };
                let triple = RdfTriple::new(subject, predicate, object);
                if triple.validate().is_ok() {
                    triples.insert(triple);
                } else {
                    trace!("skipping invalid constructed triple {}", triple);
                }
            }
        }
        Ok(triples.into_iter().collect())
    }
}

/// Binds the unbound slots of `row` from `triple`. A variable repeated
/// within one pattern must see the same id in every position.
fn extend_row(row: &Row, binds: &[(usize, usize)], triple: &Triple) -> Option<Row> {
    let ids = triple.to_array();
    let mut next = row.clone();
    for &(position, slot) in binds {
        let id = ids[position];
        match &next[slot] {
            None => next[slot] = Some(BoundValue::Id(id)),
            Some(BoundValue::Id(existing)) if *existing == id => {}
            Some(_) => return None,
        }
    }
    Some(next)
}

fn sum(values: &[Term]) -> EvalResult<Numeric> {
    let mut total = Numeric::Integer(0);
    for value in values {
        let Some(n) = as_numeric(value) else {
            return Err(ExprError::Type(format!("{} is not numeric", value)));
        };
        total = arithmetic(BinaryOp::Add, total, n)?;
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u64) -> Option<BoundValue> {
        Some(BoundValue::Id(TermId::new(n)))
    }

    #[test]
    fn test_merge_compatible_rows() {
        let left = vec![id(1), None, id(3)];
        let right = vec![id(1), id(2), None];
        assert_eq!(merge(&left, &right), Some(vec![id(1), id(2), id(3)]));
        assert_eq!(merge(&left, &vec![id(9), None, None]), None);
    }

    #[test]
    fn test_extend_row_checks_repeated_variables() {
        let row = vec![None, None];
        let binds = [(0, 0), (1, 1), (2, 0)];
        let same = Triple::in_default_graph(TermId::new(5), TermId::new(6), TermId::new(5));
        let other = Triple::in_default_graph(TermId::new(5), TermId::new(6), TermId::new(7));
        assert_eq!(extend_row(&row, &binds, &same), Some(vec![id(5), id(6)]));
        assert_eq!(extend_row(&row, &binds, &other), None);
    }

    #[test]
    fn test_extend_keeps_bound_slot() {
        let store = TripleStore::memory().unwrap();
        let plan = Plan::Extend {
            inner: Box::new(Plan::Values(vec![
                vec![(0, BoundValue::Id(TermId::new(1)))],
                vec![],
            ])),
            slot: 0,
            expr: Expr::Constant(Term::integer(5)),
        };
        let rows: Vec<Row> = Executor::new(&store, 1, None)
            .execute(&plan)
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(rows[0], vec![id(1)]);
        assert_eq!(rows[1], vec![Some(BoundValue::Term(Term::integer(5)))]);
    }

    #[test]
    fn test_sum_promotes() {
        let total = sum(&[Term::integer(1), Term::decimal(1.5)]).unwrap();
        assert_eq!(total, Numeric::Decimal(2.5));
        assert!(sum(&[Term::literal("x")]).is_err());
    }
}
