/*!
Model validation and answer comparison.

`evaluate` is the only place the formula semantics live: a literal holds
iff the model's value matches its polarity, a clause iff some literal
holds, the formula iff every clause holds.
*/

use std::path::{Path, PathBuf};

use crate::formula::{Answer, Cnf, Model};
use crate::parser;
use crate::prelude::*;

#[derive(Debug, Snafu)]
pub enum EvalError {
    #[snafu(display("model provides no value for variable x{}", variable))]
    UnassignedVariable { variable: u32 },
}

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to parse the formula file '{}'", path.display()))]
    FormulaFile {
        path: PathBuf,
        source: parser::Error,
    },
    #[snafu(display("failed to parse the answer file '{}'", path.display()))]
    AnswerFile {
        path: PathBuf,
        source: parser::Error,
    },
}

/// Evaluates a formula under a model.
///
/// The formula's variable count is derived from its literals and may exceed
/// what the model covers when the two come from unrelated sources; looking
/// up such a variable is an error, not a default.
pub fn evaluate(formula: &Cnf, model: &Model) -> Result<bool, EvalError> {
    'clauses: for clause in formula.clauses() {
        for literal in clause.iter() {
            let value = model
                .value(literal.variable())
                .context(UnassignedVariable {
                    variable: literal.variable().id(),
                })?;

            if value == literal.positive() {
                continue 'clauses;
            }
        }

        // No literal of this clause holds.
        return Ok(false);
    }

    Ok(true)
}

/// Like `evaluate`, but an unassigned variable is reported and counted as
/// an invalid model instead of surfacing as an error.
pub fn validate_model(formula: &Cnf, model: &Model) -> bool {
    match evaluate(formula, model) {
        Ok(valid) => valid,
        Err(e) => {
            error!("{}", e);
            false
        }
    }
}

/// Checks an answer against a formula and the reference verdict.
///
/// Returns `(given_verdict, correct)`. A wrong verdict is never partially
/// correct; a matching UNSAT verdict is trusted unconditionally, since only
/// positive claims carry a machine-checkable certificate.
pub fn compare(formula: &Cnf, answer: &Answer, reference_verdict: bool) -> (bool, bool) {
    let verdict = answer.claims_satisfiable();
    if verdict != reference_verdict {
        info!("Wrong verdict given!");
        return (verdict, false);
    }

    match answer {
        Answer::Satisfiable(model) => (verdict, validate_model(formula, model)),
        Answer::Unsatisfiable => (verdict, true),
    }
}

/// Parses a formula file and an answer file, then compares them.
///
/// The two parse failures stay distinguishable so the caller can treat a
/// broken formula (test-suite misconfiguration) differently from a broken
/// answer (the submission's fault).
pub fn check_files(
    formula_path: impl AsRef<Path>,
    answer_path: impl AsRef<Path>,
    reference_verdict: bool,
) -> Result<(bool, bool), Error> {
    let formula_path = formula_path.as_ref();
    let answer_path = answer_path.as_ref();

    let formula = parser::parse_formula_file(formula_path).context(FormulaFile {
        path: formula_path.to_owned(),
    })?;
    let answer = parser::parse_answer_file(answer_path).context(AnswerFile {
        path: answer_path.to_owned(),
    })?;

    Ok(compare(&formula, &answer, reference_verdict))
}
