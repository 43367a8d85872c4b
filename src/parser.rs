/*!
Parsers for the two line-oriented grading inputs: DIMACS CNF formula files
and solver answer files (`s ...` / `v ...` lines).

Both parsers work on the comment-stripped line model: every line starting
with `c` is discarded up front, while the surviving lines keep their
original 1-based numbers for diagnostics.
*/

use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::formula::{Answer, Clause, Cnf, Literal, LiteralParseError, ModelBuilder};
use crate::prelude::*;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("I/O error occurred while reading '{}'", path.display()))]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("[line {}] invalid literal '{}'", line, token))]
    InvalidLiteral {
        line: usize,
        token: String,
        source: LiteralParseError,
    },
    #[snafu(display("[line {}] malformed problem line '{}', expected 'p cnf <num_variables> <num_clauses>'", line, header))]
    MalformedHeader { line: usize, header: String },
    #[snafu(display(
        "[line {}] literal '{}' exceeds the declared variable count {}",
        line,
        token,
        declared
    ))]
    VariableOutOfRange {
        line: usize,
        token: String,
        declared: usize,
    },
    #[snafu(display(
        "the problem line declared {} clauses, but {} are present",
        expected,
        found
    ))]
    ClauseCountMismatch { expected: usize, found: usize },
    #[snafu(display("[line {}] second status line", line))]
    MultipleStatusLines { line: usize },
    #[snafu(display("[line {}] malformed status line '{}'", line, content))]
    MalformedStatusLine { line: usize, content: String },
    #[snafu(display("[line {}] unknown verdict '{}'", line, verdict))]
    UnknownVerdict { line: usize, verdict: String },
    #[snafu(display("an UNSATISFIABLE answer must be the only line of the file"))]
    UnsatTrailingLines,
    #[snafu(display("[line {}] expected a status or value line, found '{}'", line, content))]
    UnexpectedLine { line: usize, content: String },
    #[snafu(display("no status line found"))]
    MissingStatusLine,
    #[snafu(display("[line {}] model already provides a value for variable {}", line, variable))]
    DuplicateAssignment { line: usize, variable: u32 },
    #[snafu(display("model does not provide a value for variable {}", variable))]
    IncompleteModel { variable: u32 },
}

/// Strips comment lines, keeping original 1-based line numbers.
///
/// Blank lines are content lines; only the comment filter runs before line
/// bookkeeping, so a clause may span lines with comments in between.
fn content_lines(text: &str) -> Vec<(usize, &str)> {
    text.lines()
        .enumerate()
        .map(|(index, line)| (index + 1, line))
        .filter(|(_, line)| !line.starts_with('c'))
        .collect()
}

fn parse_header(lineno: usize, line: &str) -> Result<(usize, usize), Error> {
    let fields: Vec<_> = line.split_whitespace().collect();

    let malformed = MalformedHeader {
        line: lineno,
        header: line.to_owned(),
    };

    ensure!(fields.len() == 4 && fields[0] == "p" && fields[1] == "cnf", malformed);

    match (fields[2].parse::<usize>(), fields[3].parse::<usize>()) {
        (Ok(num_variables), Ok(num_clauses)) => Ok((num_variables, num_clauses)),
        _ => malformed.fail(),
    }
}

/// Parses a CNF formula from text.
///
/// The grammar is deliberately permissive: a clause may be spread over
/// several lines, and a `%` on its own line ends the formula early,
/// discarding everything after it.
pub fn parse_formula(text: &str) -> Result<Cnf, Error> {
    let lines = content_lines(text);
    let mut lines = &lines[..];

    let mut declared = None;
    if let Some(&(lineno, first)) = lines.first() {
        if first.starts_with("p ") {
            declared = Some(parse_header(lineno, first)?);
            lines = &lines[1..];
        }
    }

    let mut cnf = Cnf::new(declared.map(|(num_variables, _)| num_variables));
    let mut literals: Vec<Literal> = Vec::new();

    'lines: for &(lineno, line) in lines {
        // Some test archives end in "%\n0"; accept and stop there.
        if line == "%" {
            break 'lines;
        }

        for token in line.split_whitespace() {
            if token == "0" {
                cnf.add_clause(Clause::new(std::mem::take(&mut literals)));
                continue;
            }

            let literal = token.parse::<Literal>().with_context(|| InvalidLiteral {
                line: lineno,
                token: token.to_owned(),
            })?;

            if let Some((num_variables, _)) = declared {
                ensure!(
                    literal.variable().id() as usize <= num_variables,
                    VariableOutOfRange {
                        line: lineno,
                        token: token.to_owned(),
                        declared: num_variables,
                    }
                );
            }

            literals.push(literal);
        }
    }

    // A trailing clause without its 0 terminator is dropped.
    if let Some((_, num_clauses)) = declared {
        ensure!(
            cnf.num_clauses() == num_clauses,
            ClauseCountMismatch {
                expected: num_clauses,
                found: cnf.num_clauses(),
            }
        );
    }

    Ok(cnf)
}

/// Parses a CNF formula from a file.
pub fn parse_formula_file(path: impl AsRef<Path>) -> Result<Cnf, Error> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).context(IoError {
        path: path.to_owned(),
    })?;
    parse_formula(&text)
}

/// Parses a solver answer from text.
///
/// Exactly one `s SATISFIABLE` or `s UNSATISFIABLE` status line is
/// required. A SAT answer collects its model from `v <lit> ... 0` lines;
/// an UNSAT answer must be the only content line of the file.
pub fn parse_answer(text: &str) -> Result<Answer, Error> {
    let lines = content_lines(text);

    let mut claimed_satisfiable = false;
    let mut seen_status = false;
    let mut builder = ModelBuilder::new();

    for &(lineno, line) in &lines {
        if let Some(rest) = line.strip_prefix("s ") {
            ensure!(!seen_status, MultipleStatusLines { line: lineno });
            seen_status = true;

            let mut fields = rest.split_whitespace();
            let verdict = fields.next().context(MalformedStatusLine {
                line: lineno,
                content: line.to_owned(),
            })?;
            ensure!(
                fields.next().is_none(),
                MalformedStatusLine {
                    line: lineno,
                    content: line.to_owned(),
                }
            );

            match verdict {
                "SATISFIABLE" => claimed_satisfiable = true,
                "UNSATISFIABLE" => {
                    ensure!(lines.len() == 1, UnsatTrailingLines);
                    return Ok(Answer::Unsatisfiable);
                }
                _ => {
                    return UnknownVerdict {
                        line: lineno,
                        verdict: verdict.to_owned(),
                    }
                    .fail()
                }
            }
        } else if let Some(rest) = line.strip_prefix("v ") {
            for token in rest.split_whitespace() {
                // 0 only separates values, it assigns nothing.
                if token == "0" {
                    continue;
                }

                let literal = token.parse::<Literal>().with_context(|| InvalidLiteral {
                    line: lineno,
                    token: token.to_owned(),
                })?;

                if let Err(variable) = builder.assign(literal.variable(), literal.positive()) {
                    return DuplicateAssignment {
                        line: lineno,
                        variable,
                    }
                    .fail();
                }
            }
        } else {
            return UnexpectedLine {
                line: lineno,
                content: line.to_owned(),
            }
            .fail();
        }
    }

    // A SAT claim is the only way to fall through the loop with a status.
    ensure!(claimed_satisfiable, MissingStatusLine);

    match builder.finish() {
        Ok(model) => Ok(Answer::Satisfiable(model)),
        Err(variable) => IncompleteModel { variable }.fail(),
    }
}

/// Parses a solver answer from a file.
pub fn parse_answer_file(path: impl AsRef<Path>) -> Result<Answer, Error> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).context(IoError {
        path: path.to_owned(),
    })?;
    parse_answer(&text)
}
