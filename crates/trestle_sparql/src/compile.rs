//! Query compilation.
//!
//! Turns the algebra into a [`Plan`] over term ids. Every variable gets a
//! slot in the solution row. Concrete terms are resolved with
//! `lookup_existing`, never interned: a basic graph pattern naming a term the
//! store has never seen compiles to [`Plan::Empty`] and is never scanned.

use crate::algebra::{
    Aggregate, AggregateFunction, Expression, GraphPattern, Query, QueryForm, TermPattern,
    TriplePattern, Variable,
};
use crate::expression::{Expr, SlotAllocator};
use crate::{DefaultGraphMode, QueryOptions, Result};
use indexmap::IndexMap;
use log::{debug, trace};
use trestle_graph::{Term, TermId, TripleStore};

/// A value bound to a slot. Terms the store knows are carried as ids; terms
/// computed by expressions that are not in the dictionary stay as terms.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BoundValue {
    Id(TermId),
    Term(Term),
}

/// One solution: a value per slot.
pub type Row = Vec<Option<BoundValue>>;

/// Variable to slot assignment, in order of first use.
#[derive(Debug, Clone, Default)]
pub struct Slots {
    slots: IndexMap<Variable, usize>,
}

impl Slots {
    /// Number of slots, the width of every row.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// The slot of an already allocated variable.
    pub fn get(&self, variable: &Variable) -> Option<usize> {
        self.slots.get(variable).copied()
    }
}

impl SlotAllocator for Slots {
    fn slot(&mut self, variable: &Variable) -> usize {
        let next = self.slots.len();
        *self.slots.entry(variable.clone()).or_insert(next)
    }
}

/// One position of a compiled triple pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanTerm {
    Const(TermId),
    Slot(usize),
}

/// Graphs a pattern may match in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphSet {
    /// Every graph (for the default graph: the union of all graphs; for
    /// `GRAPH ?g`: every named graph).
    All,
    Only(Vec<TermId>),
}

impl GraphSet {
    pub fn allows(&self, graph: TermId) -> bool {
        match self {
            GraphSet::All => true,
            GraphSet::Only(graphs) => graphs.contains(&graph),
        }
    }
}

/// Where the triple patterns of a group are matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphScope {
    /// The query's default graph.
    Default(GraphSet),
    /// Inside `GRAPH`: a fixed graph or a graph variable ranging over the
    /// allowed named graphs.
    Named { graph: PlanTerm, allowed: GraphSet },
}

/// A triple pattern ready for scanning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanPattern {
    /// Subject, predicate, object.
    pub terms: [PlanTerm; 3],
    pub scope: GraphScope,
}

#[derive(Debug, Clone)]
pub struct CompiledAggregate {
    pub function: AggregateFunction,
    pub distinct: bool,
    /// `None` for `COUNT(*)`.
    pub expr: Option<Expr>,
}

/// An executable plan.
#[derive(Debug, Clone)]
pub enum Plan {
    /// Statically known to produce nothing.
    Empty,
    /// One solution binding nothing.
    Unit,
    Bgp(Vec<PlanPattern>),
    Join(Box<Plan>, Box<Plan>),
    LeftJoin {
        left: Box<Plan>,
        right: Box<Plan>,
        filter: Option<Expr>,
    },
    Union(Box<Plan>, Box<Plan>),
    Minus(Box<Plan>, Box<Plan>),
    Filter {
        expr: Expr,
        inner: Box<Plan>,
    },
    Extend {
        inner: Box<Plan>,
        slot: usize,
        expr: Expr,
    },
    /// Inline rows, as (slot, value) assignments.
    Values(Vec<Vec<(usize, BoundValue)>>),
    Group {
        inner: Box<Plan>,
        keys: Vec<Expr>,
        /// Output slot of each key that is a plain variable.
        key_slots: Vec<Option<usize>>,
        aggregates: Vec<(usize, CompiledAggregate)>,
    },
    OrderBy {
        inner: Box<Plan>,
        /// Expression and descending flag.
        conditions: Vec<(Expr, bool)>,
    },
    Project {
        inner: Box<Plan>,
        slots: Vec<usize>,
    },
    Distinct(Box<Plan>),
    Reduced(Box<Plan>),
    Slice {
        inner: Box<Plan>,
        offset: usize,
        limit: Option<usize>,
    },
}

/// A CONSTRUCT template position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateTerm {
    Slot(usize),
    Term(Term),
    /// Blank node label, replaced by a fresh node per solution.
    Blank(String),
}

#[derive(Debug, Clone)]
pub enum CompiledForm {
    Select {
        variables: Vec<Variable>,
        slots: Vec<usize>,
    },
    Ask,
    Construct {
        template: Vec<[TemplateTerm; 3]>,
    },
}

/// A query compiled against one store.
#[derive(Debug, Clone)]
pub struct CompiledQuery {
    pub form: CompiledForm,
    pub plan: Plan,
    pub slots: Slots,
}

/// Compiles `query` for execution against `store`.
pub fn compile_query(
    store: &TripleStore,
    query: &Query,
    options: &QueryOptions,
) -> Result<CompiledQuery> {
    let mut compiler = Compiler::new(store, options);
    compiler.dataset(&query.dataset.default, &query.dataset.named)?;

    let scope = GraphScope::Default(compiler.default_graphs.clone());
    let plan = compiler.pattern(&query.pattern, &scope)?;

    let form = match &query.form {
        QueryForm::Select { variables } => CompiledForm::Select {
            variables: variables.clone(),
            slots: variables.iter().map(|v| compiler.slots.slot(v)).collect(),
        },
        QueryForm::Ask => CompiledForm::Ask,
        QueryForm::Construct { template } => CompiledForm::Construct {
            template: template.iter().map(|t| compiler.template(t)).collect(),
        },
    };

    debug!(
        "compiled query: {} slots, plan {}",
        compiler.slots.len(),
        if matches!(plan, Plan::Empty) {
            "empty"
        } else {
            "ready"
        }
    );
    Ok(CompiledQuery {
        form,
        plan,
        slots: compiler.slots,
    })
}

struct Compiler<'a> {
    store: &'a TripleStore,
    options: &'a QueryOptions,
    slots: Slots,
    default_graphs: GraphSet,
    named_graphs: GraphSet,
}

impl<'a> Compiler<'a> {
    fn new(store: &'a TripleStore, options: &'a QueryOptions) -> Self {
        Self {
            store,
            options,
            slots: Slots::default(),
            default_graphs: GraphSet::All,
            named_graphs: GraphSet::All,
        }
    }

    /// Applies FROM / FROM NAMED. A dataset clause replaces the store's
    /// dataset entirely: FROM alone leaves no named graphs, FROM NAMED alone
    /// leaves an empty default graph.
    fn dataset(&mut self, default: &[Term], named: &[Term]) -> Result<()> {
        if default.is_empty() && named.is_empty() {
            self.default_graphs = match self.options.default_graph {
                DefaultGraphMode::Union => GraphSet::All,
                DefaultGraphMode::DefaultOnly => GraphSet::Only(vec![TermId::DEFAULT_GRAPH]),
            };
            self.named_graphs = GraphSet::All;
            return Ok(());
        }
        self.default_graphs = GraphSet::Only(self.existing_ids(default)?);
        self.named_graphs = GraphSet::Only(self.existing_ids(named)?);
        Ok(())
    }

    fn existing_ids(&self, terms: &[Term]) -> Result<Vec<TermId>> {
        let mut ids = Vec::with_capacity(terms.len());
        for term in terms {
            match self.store.lookup_existing(term)? {
                Some(id) if !ids.contains(&id) => ids.push(id),
                Some(_) => {}
                None => debug!("dataset graph {} is not in the store", term),
            }
        }
        Ok(ids)
    }

    fn value(&self, term: &Term) -> Result<BoundValue> {
        Ok(match self.store.lookup_existing(term)? {
            Some(id) => BoundValue::Id(id),
            None => BoundValue::Term(term.clone()),
        })
    }

    fn expr(&mut self, expression: &Expression) -> Result<Expr> {
        Expr::compile(expression, &mut self.slots)
    }

    fn boxed(&mut self, pattern: &GraphPattern, scope: &GraphScope) -> Result<Box<Plan>> {
        Ok(Box::new(self.pattern(pattern, scope)?))
    }

    fn pattern(&mut self, pattern: &GraphPattern, scope: &GraphScope) -> Result<Plan> {
        Ok(match pattern {
            GraphPattern::Unit => Plan::Unit,
            GraphPattern::Bgp(patterns) => self.bgp(patterns, scope)?,
            GraphPattern::Join(l, r) => {
                let left = self.pattern(l, scope)?;
                let right = self.pattern(r, scope)?;
                match (left, right) {
                    (Plan::Empty, _) | (_, Plan::Empty) => Plan::Empty,
                    (Plan::Unit, other) | (other, Plan::Unit) => other,
                    (left, right) => Plan::Join(Box::new(left), Box::new(right)),
                }
            }
            GraphPattern::LeftJoin {
                left,
                right,
                filter,
            } => {
                let left = self.pattern(left, scope)?;
                let right = self.boxed(right, scope)?;
                let filter = filter.as_ref().map(|f| self.expr(f)).transpose()?;
                if matches!(left, Plan::Empty) {
                    Plan::Empty
                } else {
                    Plan::LeftJoin {
                        left: Box::new(left),
                        right,
                        filter,
                    }
                }
            }
            GraphPattern::Union(l, r) => {
                let left = self.pattern(l, scope)?;
                let right = self.pattern(r, scope)?;
                match (left, right) {
                    (Plan::Empty, other) | (other, Plan::Empty) => other,
                    (left, right) => Plan::Union(Box::new(left), Box::new(right)),
                }
            }
            GraphPattern::Minus(l, r) => {
                let left = self.pattern(l, scope)?;
                let right = self.pattern(r, scope)?;
                match (left, right) {
                    (left, Plan::Empty) => left,
                    (left, right) => Plan::Minus(Box::new(left), Box::new(right)),
                }
            }
            GraphPattern::Filter { expr, inner } => {
                let inner = self.boxed(inner, scope)?;
                Plan::Filter {
                    expr: self.expr(expr)?,
                    inner,
                }
            }
            GraphPattern::Graph { name, inner } => self.graph(name, inner)?,
            GraphPattern::Extend {
                inner,
                variable,
                expr,
            } => {
                let inner = self.boxed(inner, scope)?;
                let expr = self.expr(expr)?;
                Plan::Extend {
                    inner,
                    slot: self.slots.slot(variable),
                    expr,
                }
            }
            GraphPattern::Values { variables, rows } => {
                let slots: Vec<usize> = variables.iter().map(|v| self.slots.slot(v)).collect();
                let mut compiled = Vec::with_capacity(rows.len());
                for row in rows {
                    let mut assignments = Vec::new();
                    for (slot, value) in slots.iter().zip(row) {
                        if let Some(term) = value {
                            assignments.push((*slot, self.value(term)?));
                        }
                    }
                    compiled.push(assignments);
                }
                Plan::Values(compiled)
            }
            GraphPattern::Group {
                inner,
                keys,
                aggregates,
            } => {
                let inner = self.boxed(inner, scope)?;
                let key_slots = keys
                    .iter()
                    .map(|k| match k {
                        Expression::Variable(v) => Some(self.slots.slot(v)),
                        _ => None,
                    })
                    .collect();
                let keys = keys.iter().map(|k| self.expr(k)).collect::<Result<_>>()?;
                let aggregates = aggregates
                    .iter()
                    .map(|(v, a)| Ok((self.slots.slot(v), self.aggregate(a)?)))
                    .collect::<Result<_>>()?;
                Plan::Group {
                    inner,
                    keys,
                    key_slots,
                    aggregates,
                }
            }
            GraphPattern::OrderBy { inner, conditions } => {
                let inner = self.boxed(inner, scope)?;
                let conditions = conditions
                    .iter()
                    .map(|c| Ok((self.expr(&c.expr)?, c.descending)))
                    .collect::<Result<_>>()?;
                Plan::OrderBy { inner, conditions }
            }
            GraphPattern::Project { inner, variables } => {
                let inner = self.boxed(inner, scope)?;
                Plan::Project {
                    inner,
                    slots: variables.iter().map(|v| self.slots.slot(v)).collect(),
                }
            }
            GraphPattern::Distinct(inner) => Plan::Distinct(self.boxed(inner, scope)?),
            GraphPattern::Reduced(inner) => Plan::Reduced(self.boxed(inner, scope)?),
            GraphPattern::Slice {
                inner,
                offset,
                limit,
            } => Plan::Slice {
                inner: self.boxed(inner, scope)?,
                offset: *offset,
                limit: *limit,
            },
        })
    }

    fn aggregate(&mut self, aggregate: &Aggregate) -> Result<CompiledAggregate> {
        Ok(CompiledAggregate {
            function: aggregate.function.clone(),
            distinct: aggregate.distinct,
            expr: aggregate.expr.as_ref().map(|e| self.expr(e)).transpose()?,
        })
    }

    fn graph(&mut self, name: &TermPattern, inner: &GraphPattern) -> Result<Plan> {
        let scope = match name {
            TermPattern::Variable(v) => {
                let slot = self.slots.slot(v);
                if matches!(inner, GraphPattern::Unit) {
                    // GRAPH ?g {} enumerates the named graphs.
                    let rows = self
                        .store
                        .graphs()?
                        .into_iter()
                        .filter(|g| self.named_graphs.allows(*g))
                        .map(|g| vec![(slot, BoundValue::Id(g))])
                        .collect();
                    return Ok(Plan::Values(rows));
                }
                GraphScope::Named {
                    graph: PlanTerm::Slot(slot),
                    allowed: self.named_graphs.clone(),
                }
            }
            TermPattern::Term(term) => match self.store.lookup_existing(term)? {
                Some(id) if self.named_graphs.allows(id) => GraphScope::Named {
                    graph: PlanTerm::Const(id),
                    allowed: GraphSet::All,
                },
                _ => {
                    debug!("graph {} is not in the dataset", term);
                    self.pattern(inner, &GraphScope::Default(GraphSet::Only(Vec::new())))?;
                    return Ok(Plan::Empty);
                }
            },
            TermPattern::BlankNode(_) => return Ok(Plan::Empty),
        };
        self.pattern(inner, &scope)
    }

    fn plan_term(&mut self, position: &TermPattern) -> Result<Option<PlanTerm>> {
        Ok(match position {
            TermPattern::Variable(v) => Some(PlanTerm::Slot(self.slots.slot(v))),
            TermPattern::Term(term) => self.store.lookup_existing(term)?.map(PlanTerm::Const),
            TermPattern::BlankNode(label) => {
                Some(PlanTerm::Slot(self.slots.slot(&Variable::new(format!("_:u{}", label)))))
            }
        })
    }

    fn bgp(&mut self, patterns: &[TriplePattern], scope: &GraphScope) -> Result<Plan> {
        let mut compiled = Vec::with_capacity(patterns.len());
        let mut missing = false;
        for pattern in patterns {
            // Slots are allocated even when the pattern is unsatisfiable so
            // that projections keep their columns.
            let terms = [
                self.plan_term(&pattern.subject)?,
                self.plan_term(&pattern.predicate)?,
                self.plan_term(&pattern.object)?,
            ];
            match terms {
                [Some(s), Some(p), Some(o)] => compiled.push(PlanPattern {
                    terms: [s, p, o],
                    scope: scope.clone(),
                }),
                _ => missing = true,
            }
        }

        if missing {
            debug!("basic graph pattern names a term absent from the store, skipping scans");
            return Ok(Plan::Empty);
        }
        if matches!(scope, GraphScope::Default(GraphSet::Only(graphs)) if graphs.is_empty()) {
            return Ok(if compiled.is_empty() {
                Plan::Unit
            } else {
                Plan::Empty
            });
        }
        if compiled.is_empty() {
            return Ok(Plan::Unit);
        }
        if self.options.reorder_patterns && compiled.len() > 1 {
            compiled = self.reorder(compiled)?;
        }
        Ok(Plan::Bgp(compiled))
    }

    /// Greedy ordering: cheapest pattern first, then the cheapest pattern
    /// sharing a variable with those already placed.
    fn reorder(&self, mut remaining: Vec<PlanPattern>) -> Result<Vec<PlanPattern>> {
        let mut estimates = Vec::with_capacity(remaining.len());
        for pattern in &remaining {
            estimates.push(self.estimate(pattern)?);
        }
        let mut ordered = Vec::with_capacity(remaining.len());
        let mut bound: Vec<usize> = Vec::new();

        while !remaining.is_empty() {
            let connected = |p: &PlanPattern| {
                pattern_slots(p).iter().any(|s| bound.contains(s))
            };
            let pick = (0..remaining.len())
                .min_by_key(|&i| {
                    let disconnected = !bound.is_empty() && !connected(&remaining[i]);
                    (disconnected, estimates[i], i)
                })
                .unwrap_or(0);
            let pattern = remaining.remove(pick);
            estimates.remove(pick);
            bound.extend(pattern_slots(&pattern));
            ordered.push(pattern);
        }
        trace!("reordered patterns: {:?}", ordered);
        Ok(ordered)
    }

    fn estimate(&self, pattern: &PlanPattern) -> Result<usize> {
        let mut ids = [None; 4];
        for (i, term) in pattern.terms.iter().enumerate() {
            if let PlanTerm::Const(id) = term {
                ids[i] = Some(*id);
            }
        }
        match &pattern.scope {
            GraphScope::Named {
                graph: PlanTerm::Const(g),
                ..
            } => ids[3] = Some(*g),
            GraphScope::Default(GraphSet::Only(graphs)) if graphs.len() == 1 => {
                ids[3] = Some(graphs[0])
            }
            _ => {}
        }
        Ok(self
            .store
            .count_matching(&trestle_graph::TriplePattern::from_array(ids))?)
    }

    fn template(&mut self, triple: &TriplePattern) -> [TemplateTerm; 3] {
        triple.positions().map(|position| match position {
            TermPattern::Variable(v) => TemplateTerm::Slot(self.slots.slot(v)),
            TermPattern::Term(t) => TemplateTerm::Term(t.clone()),
            TermPattern::BlankNode(label) => TemplateTerm::Blank(label.clone()),
        })
    }
}

fn pattern_slots(pattern: &PlanPattern) -> Vec<usize> {
    let mut slots: Vec<usize> = pattern
        .terms
        .iter()
        .filter_map(|t| match t {
            PlanTerm::Slot(s) => Some(*s),
            PlanTerm::Const(_) => None,
        })
        .collect();
    if let GraphScope::Named {
        graph: PlanTerm::Slot(s),
        ..
    } = pattern.scope
    {
        slots.push(s);
    }
    slots
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse_query;
    use trestle_graph::rdf::RdfTriple;

    fn ex(local: &str) -> Term {
        Term::iri(format!("http://example.org/{}", local))
    }

    fn store() -> TripleStore {
        let store = TripleStore::memory().unwrap();
        store
            .add_triple(&RdfTriple::new(ex("a"), ex("p"), Term::literal("1")), None)
            .unwrap();
        store
            .add_triple(&RdfTriple::new(ex("a"), ex("q"), ex("b")), Some(&ex("g")))
            .unwrap();
        store
    }

    fn compile(store: &TripleStore, text: &str, options: &QueryOptions) -> CompiledQuery {
        compile_query(store, &parse_query(text).unwrap(), options).unwrap()
    }

    #[test]
    fn test_absent_term_short_circuits() {
        let store = store();
        let compiled = compile(
            &store,
            "PREFIX ex: <http://example.org/> SELECT ?s { ?s ex:p ?o . ?s ex:missing ?x }",
            &QueryOptions::default(),
        );
        match compiled.plan {
            Plan::Project { inner, .. } => assert!(matches!(*inner, Plan::Empty)),
            other => panic!("unexpected {:?}", other),
        }
        // the dictionary was not touched
        assert_eq!(store.lookup_existing(&ex("missing")).unwrap(), None);
    }

    #[test]
    fn test_slots_follow_first_use() {
        let store = store();
        let compiled = compile(&store, "SELECT * { ?s ?p ?o }", &QueryOptions::default());
        assert_eq!(compiled.slots.get(&Variable::new("s")), Some(0));
        assert_eq!(compiled.slots.get(&Variable::new("o")), Some(2));
        match compiled.form {
            CompiledForm::Select { slots, .. } => assert_eq!(slots, vec![0, 1, 2]),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_default_graph_modes() {
        let store = store();
        let union = compile(&store, "SELECT * { ?s ?p ?o }", &QueryOptions::default());
        match union.plan {
            Plan::Bgp(patterns) => {
                assert_eq!(patterns[0].scope, GraphScope::Default(GraphSet::All))
            }
            other => panic!("unexpected {:?}", other),
        }

        let options = QueryOptions {
            default_graph: DefaultGraphMode::DefaultOnly,
            ..QueryOptions::default()
        };
        let only = compile(&store, "SELECT * { ?s ?p ?o }", &options);
        match only.plan {
            Plan::Bgp(patterns) => assert_eq!(
                patterns[0].scope,
                GraphScope::Default(GraphSet::Only(vec![TermId::DEFAULT_GRAPH]))
            ),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_unknown_graph_is_empty() {
        let store = store();
        let compiled = compile(
            &store,
            "SELECT * { GRAPH <http://example.org/nope> { ?s ?p ?o } }",
            &QueryOptions::default(),
        );
        assert!(matches!(compiled.plan, Plan::Empty));

        let compiled = compile(
            &store,
            "SELECT * FROM NAMED <http://example.org/other> { GRAPH <http://example.org/g> { ?s ?p ?o } }",
            &QueryOptions::default(),
        );
        assert!(matches!(compiled.plan, Plan::Empty));
    }

    #[test]
    fn test_reorder_prefers_selective_patterns() {
        let store = store();
        for n in 0..20 {
            store
                .add_triple(&RdfTriple::new(ex(&format!("s{}", n)), ex("p"), Term::integer(n)), None)
                .unwrap();
        }
        let options = QueryOptions {
            reorder_patterns: true,
            ..QueryOptions::default()
        };
        let compiled = compile(
            &store,
            "PREFIX ex: <http://example.org/> SELECT * { ?s ex:p ?o . ?s ex:q ex:b }",
            &options,
        );
        let q = store.lookup_existing(&ex("q")).unwrap().unwrap();
        match compiled.plan {
            Plan::Bgp(patterns) => assert_eq!(patterns[0].terms[1], PlanTerm::Const(q)),
            other => panic!("unexpected {:?}", other),
        }
    }
}
