/*!
A module to represent CNF formulas, assignments, and solver answers.
*/

use std::{collections::HashMap, fmt::Display, num::NonZeroU32, str::FromStr};

use crate::prelude::*;

#[derive(Debug, Snafu)]
pub enum LiteralParseError {
    #[snafu(display("'{}' is not a signed decimal literal", token))]
    MalformedLiteral { token: String },
    #[snafu(display("'{}' refers to variable 0, which is reserved as the clause terminator", token))]
    ZeroVariable { token: String },
}

/// Newtype wrapper for variable ID.
/// Invariant: 0 < ID <= MAX_VARIABLE_ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Variable(NonZeroU32);

impl Variable {
    pub const MAX_VARIABLE_ID: usize = u32::MAX as usize;

    /// Creates a variable from its DIMACS identifier.
    /// Returns `None` for the reserved identifier 0.
    pub fn new(id: u32) -> Option<Self> {
        NonZeroU32::new(id).map(Variable)
    }

    pub fn id(&self) -> u32 {
        self.0.get()
    }

    /// Zero-based position of this variable in a dense assignment.
    pub fn index(&self) -> usize {
        (self.0.get() - 1) as usize
    }
}

impl Display for Variable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "x{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Literal {
    var: Variable,
    positive: bool,
}

impl Literal {
    pub fn new(var: Variable, positive: bool) -> Self {
        Literal { var, positive }
    }

    pub fn variable(&self) -> Variable {
        self.var
    }

    pub fn positive(&self) -> bool {
        self.positive
    }

    pub fn to_dimacs(&self) -> String {
        format!("{}{}", if self.positive { "" } else { "-" }, self.var.id())
    }
}

impl FromStr for Literal {
    type Err = LiteralParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (positive, digits) = match s.strip_prefix('-') {
            Some(rest) => (false, rest),
            None => (true, s),
        };

        ensure!(
            !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()),
            MalformedLiteral {
                token: s.to_owned(),
            }
        );

        let id = digits.parse::<u32>().ok().context(MalformedLiteral {
            token: s.to_owned(),
        })?;
        let var = Variable::new(id).context(ZeroVariable {
            token: s.to_owned(),
        })?;

        Ok(Literal { var, positive })
    }
}

impl Display for Literal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", if self.positive { "" } else { "¬" }, self.var)
    }
}

impl std::ops::Not for Literal {
    type Output = Literal;

    fn not(self) -> Self::Output {
        Literal {
            var: self.var,
            positive: !self.positive,
        }
    }
}

/// Disjunction of literals
#[derive(Debug, Clone)]
pub struct Clause {
    literals: Vec<Literal>,
}

impl Clause {
    pub fn new(literals: Vec<Literal>) -> Self {
        Self { literals }
    }

    pub fn num_literals(&self) -> usize {
        self.literals.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = Literal> + '_ {
        self.literals.iter().copied()
    }

    pub fn to_dimacs(&self) -> String {
        let mut line = String::new();
        for literal in &self.literals {
            line.push_str(&literal.to_dimacs());
            line.push(' ');
        }
        line.push('0');
        line
    }
}

impl Display for Clause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "(")?;

        let mut iter = self.literals.iter();
        if let Some(first) = iter.next() {
            write!(f, "{}", first)?;
        }
        for literal in iter {
            write!(f, " ∨ {}", literal)?;
        }

        write!(f, ")")?;

        Ok(())
    }
}

/// Formula representation in Conjunctive Normal Form.
///
/// Keeps two variable counts that must never be conflated: the count scanned
/// from the literals actually present (`num_variables`) and the count the
/// `p cnf` header declared, if any (`declared_variables`).
#[derive(Debug, Clone)]
pub struct Cnf {
    declared_variables: Option<usize>,
    num_variables: usize,
    clauses: Vec<Clause>,
}

impl Cnf {
    pub fn new(declared_variables: Option<usize>) -> Self {
        Cnf {
            declared_variables,
            num_variables: 1,
            clauses: Vec::new(),
        }
    }

    /// The largest variable ID used anywhere in the formula (at least 1).
    pub fn num_variables(&self) -> usize {
        self.num_variables
    }

    /// The variable count from the `p cnf` header, if one was present.
    pub fn declared_variables(&self) -> Option<usize> {
        self.declared_variables
    }

    pub fn num_clauses(&self) -> usize {
        self.clauses.len()
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    pub fn add_clause(&mut self, clause: Clause) {
        for literal in clause.iter() {
            let id = literal.variable().id() as usize;
            if id > self.num_variables {
                self.num_variables = id;
            }
        }
        self.clauses.push(clause);
    }

    pub fn to_dimacs(&self) -> String {
        let mut text = format!("p cnf {} {}\n", self.num_variables, self.num_clauses());
        for clause in &self.clauses {
            text.push_str(&clause.to_dimacs());
            text.push('\n');
        }
        text
    }
}

impl Display for Cnf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CNF with {} variables (", self.num_variables)?;

        let mut iter = self.clauses.iter();
        if let Some(first) = iter.next() {
            write!(f, "{}", first)?;
        }
        for clause in iter {
            write!(f, " ∧ {}", clause)?;
        }

        write!(f, ")")?;

        Ok(())
    }
}

/// A total assignment over variables `1..=n`, as parsed from an answer file.
#[derive(Debug, Clone)]
pub struct Model {
    values: Vec<bool>,
}

impl Model {
    /// Builds a model from per-variable values, `values[0]` belonging to `x1`.
    pub fn new(values: Vec<bool>) -> Self {
        Model { values }
    }

    pub fn num_variables(&self) -> usize {
        self.values.len()
    }

    /// The assigned value, or `None` when the variable is outside the model.
    pub fn value(&self, var: Variable) -> Option<bool> {
        self.values.get(var.index()).copied()
    }
}

impl Display for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Assignment:")?;
        for (index, &value) in self.values.iter().enumerate() {
            write!(f, "\n  x{}: {}", index + 1, value)?;
        }

        Ok(())
    }
}

/// A parsed answer file: a verdict, with a model iff the verdict is SAT.
#[derive(Debug, Clone)]
pub enum Answer {
    Satisfiable(Model),
    Unsatisfiable,
}

impl Answer {
    pub fn claims_satisfiable(&self) -> bool {
        matches!(self, Answer::Satisfiable(_))
    }
}

/// Incremental model builder used by the answer parser.
///
/// Values arrive keyed by variable ID in arbitrary order; `finish` checks
/// that they cover `1..=n` contiguously.
#[derive(Debug, Default)]
pub struct ModelBuilder {
    values: HashMap<u32, bool>,
}

impl ModelBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a value for a variable. Fails if the variable was already set,
    /// returning its ID.
    pub fn assign(&mut self, var: Variable, value: bool) -> Result<(), u32> {
        if self.values.insert(var.id(), value).is_some() {
            return Err(var.id());
        }
        Ok(())
    }

    /// Finalizes the model. Fails with the first missing variable ID if the
    /// recorded values do not cover `1..=n`.
    pub fn finish(self) -> Result<Model, u32> {
        let mut values = Vec::with_capacity(self.values.len());
        for id in 1..=self.values.len() as u32 {
            match self.values.get(&id) {
                Some(&value) => values.push(value),
                None => return Err(id),
            }
        }
        Ok(Model::new(values))
    }
}
