use std::{collections::HashMap, fs, path::Path};

use paste::paste;

use crate::{
    formula::{Answer, Clause, Cnf, Literal, Model, Variable},
    grade::{FinalResult, LevelResult, TestOutcome, MAX_SCORE},
    harness::{self, Checker, RunOutcome, SolverRunner},
    parser::{self, parse_answer, parse_answer_file, parse_formula, parse_formula_file},
    validate::{compare, evaluate, validate_model},
};

const EQUIV: &str = "p cnf 2 2\n1 -2 0\n-1 2 0\n";
const CONTRA: &str = "p cnf 1 2\n1 0\n-1 0\n";

const GOOD_SAT: &str = "s SATISFIABLE\nv 1 2 0\n";
const BAD_SAT: &str = "s SATISFIABLE\nv 1 -2 0\n";
const GOOD_UNSAT: &str = "s UNSATISFIABLE\n";

fn lit(n: i32) -> Literal {
    Literal::new(Variable::new(n.unsigned_abs()).unwrap(), n > 0)
}

fn assert_same_structure(left: &Cnf, right: &Cnf) {
    assert_eq!(left.num_clauses(), right.num_clauses());
    for (a, b) in left.clauses().iter().zip(right.clauses()) {
        assert_eq!(a.num_literals(), b.num_literals());
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(x, y);
        }
    }
}

macro_rules! formula_testcase {
    ($name:ident) => {
        paste! {
            #[test]
            fn [< parse_formula_ $name >]() {
                parse_formula_file(
                    concat!("testcases/formulas/", stringify!($name), ".cnf")
                ).unwrap();
            }
        }
    };
}

macro_rules! bad_formula_testcase {
    ($name:ident) => {
        paste! {
            #[test]
            fn [< reject_formula_ $name >]() {
                parse_formula_file(
                    concat!("testcases/formulas/", stringify!($name), ".cnf")
                ).unwrap_err();
            }
        }
    };
}

macro_rules! answer_testcase {
    ($name:ident) => {
        paste! {
            #[test]
            fn [< parse_answer_ $name >]() {
                parse_answer_file(
                    concat!("testcases/answers/", stringify!($name), ".answer")
                ).unwrap();
            }
        }
    };
}

macro_rules! bad_answer_testcase {
    ($name:ident) => {
        paste! {
            #[test]
            fn [< reject_answer_ $name >]() {
                parse_answer_file(
                    concat!("testcases/answers/", stringify!($name), ".answer")
                ).unwrap_err();
            }
        }
    };
}

formula_testcase!(simple);
formula_testcase!(multiline);
formula_testcase!(percent);
formula_testcase!(noheader);
bad_formula_testcase!(bad_count);
bad_formula_testcase!(bad_token);
bad_formula_testcase!(out_of_range);

answer_testcase!(sat);
answer_testcase!(sat_wrong);
answer_testcase!(unsat);
answer_testcase!(commented_unsat);
bad_answer_testcase!(unsat_extra);
bad_answer_testcase!(gap);
bad_answer_testcase!(dup);

#[test]
fn clause_may_span_lines() {
    let cnf = parse_formula("p cnf 3 2\n1 2\n3 0\n-1 -2 -3 0\n").unwrap();
    assert_eq!(cnf.num_clauses(), 2);
    let first: Vec<_> = cnf.clauses()[0].iter().collect();
    assert_eq!(first, vec![lit(1), lit(2), lit(3)]);
}

#[test]
fn percent_line_stops_parsing() {
    // Whatever follows the % is discarded, including the stray 0.
    let cnf = parse_formula("p cnf 2 1\n1 2 0\n%\n0\nnot even tokens\n").unwrap();
    assert_eq!(cnf.num_clauses(), 1);
}

#[test]
fn zero_terminates_an_empty_clause() {
    let cnf = parse_formula("1 0 0 2 0\n").unwrap();
    assert_eq!(cnf.num_clauses(), 3);
    assert_eq!(cnf.clauses()[1].num_literals(), 0);
}

#[test]
fn unterminated_trailing_clause_is_dropped() {
    let cnf = parse_formula("1 2 0\n-1 -2\n").unwrap();
    assert_eq!(cnf.num_clauses(), 1);
}

#[test]
fn variable_counts_stay_separate() {
    // The header may over-declare; the scanned count reflects usage.
    let cnf = parse_formula("p cnf 5 1\n1 2 0\n").unwrap();
    assert_eq!(cnf.declared_variables(), Some(5));
    assert_eq!(cnf.num_variables(), 2);
}

#[test]
fn literal_above_declared_count_is_rejected() {
    let error = parse_formula("p cnf 2 1\n1 3 0\n").unwrap_err();
    assert!(matches!(error, parser::Error::VariableOutOfRange { .. }));
}

#[test]
fn clause_count_mismatch_is_rejected() {
    let error = parse_formula("p cnf 2 3\n1 2 0\n-1 -2 0\n").unwrap_err();
    assert!(matches!(
        error,
        parser::Error::ClauseCountMismatch {
            expected: 3,
            found: 2,
        }
    ));
}

#[test]
fn malformed_header_is_rejected() {
    let error = parse_formula("p cnf two 1\n1 0\n").unwrap_err();
    assert!(matches!(error, parser::Error::MalformedHeader { .. }));
}

#[test]
fn negative_zero_is_not_a_literal() {
    parse_formula("p cnf 2 1\n1 -0 0\n").unwrap_err();
}

#[test]
fn dimacs_roundtrip_preserves_structure() {
    let original = parse_formula("c mixed polarities\n1 -2 3 0\n-1 0\n0\n2 2 0\n").unwrap();
    let rendered = original.to_dimacs();
    let reparsed = parse_formula(&rendered).unwrap();
    assert_same_structure(&original, &reparsed);
    assert_eq!(rendered, reparsed.to_dimacs());
}

#[test]
fn parsing_is_idempotent() {
    let first = parse_formula(EQUIV).unwrap();
    let second = parse_formula(EQUIV).unwrap();
    for values in [vec![true, true], vec![true, false], vec![false, false]] {
        let model = Model::new(values);
        assert_eq!(
            evaluate(&first, &model).unwrap(),
            evaluate(&second, &model).unwrap()
        );
    }
}

#[test]
fn answer_missing_status_line_is_rejected() {
    let error = parse_answer("v 1 2 0\n").unwrap_err();
    assert!(matches!(error, parser::Error::MissingStatusLine));
}

#[test]
fn answer_second_status_line_is_rejected() {
    let error = parse_answer("s SATISFIABLE\ns SATISFIABLE\n").unwrap_err();
    assert!(matches!(error, parser::Error::MultipleStatusLines { line: 2 }));
}

#[test]
fn answer_unknown_verdict_is_rejected() {
    let error = parse_answer("s MAYBE\n").unwrap_err();
    assert!(matches!(error, parser::Error::UnknownVerdict { .. }));
}

#[test]
fn answer_junk_line_is_rejected() {
    let error = parse_answer("s SATISFIABLE\nhello\n").unwrap_err();
    assert!(matches!(error, parser::Error::UnexpectedLine { line: 2, .. }));
}

#[test]
fn answer_gap_in_assignment_is_rejected() {
    // 1 and 3 are mentioned, so the model must cover 1..=2 contiguously.
    let error = parse_answer("s SATISFIABLE\nv 1 3 0\n").unwrap_err();
    assert!(matches!(error, parser::Error::IncompleteModel { variable: 2 }));
}

#[test]
fn answer_duplicate_assignment_is_rejected() {
    // Repeating a variable is an error even with the same polarity.
    let error = parse_answer("s SATISFIABLE\nv 1 0\nv 1 0\n").unwrap_err();
    assert!(matches!(
        error,
        parser::Error::DuplicateAssignment { variable: 1, .. }
    ));
}

#[test]
fn answer_model_spread_over_value_lines() {
    let answer = parse_answer("s SATISFIABLE\nv 1 0\nv -2 0\nv 3 0\n").unwrap();
    match answer {
        Answer::Satisfiable(model) => {
            assert_eq!(model.num_variables(), 3);
            assert_eq!(model.value(Variable::new(2).unwrap()), Some(false));
        }
        Answer::Unsatisfiable => panic!("expected a SAT answer"),
    }
}

#[test]
fn empty_clause_is_never_satisfied() {
    let cnf = parse_formula("1 0 0\n").unwrap();
    let model = Model::new(vec![true]);
    assert_eq!(evaluate(&cnf, &model).unwrap(), false);
}

#[test]
fn unassigned_variable_invalidates_the_model() {
    let cnf = parse_formula(EQUIV).unwrap();
    let model = Model::new(vec![true]);
    assert!(evaluate(&cnf, &model).is_err());
    assert!(!validate_model(&cnf, &model));
}

#[test]
fn satisfied_clauses_do_not_change_evaluation() {
    let satisfying = Model::new(vec![true, true]);
    let falsifying = Model::new(vec![true, false]);

    let mut cnf = parse_formula(EQUIV).unwrap();
    assert_eq!(evaluate(&cnf, &satisfying).unwrap(), true);
    assert_eq!(evaluate(&cnf, &falsifying).unwrap(), false);

    // x1 holds under both models, so adding the clause changes nothing.
    cnf.add_clause(Clause::new(vec![lit(1)]));
    assert_eq!(evaluate(&cnf, &satisfying).unwrap(), true);
    assert_eq!(evaluate(&cnf, &falsifying).unwrap(), false);
}

#[test]
fn comparator_accepts_a_satisfying_model() {
    let cnf = parse_formula(EQUIV).unwrap();
    let answer = parse_answer(GOOD_SAT).unwrap();
    assert_eq!(compare(&cnf, &answer, true), (true, true));
}

#[test]
fn comparator_rejects_a_falsifying_model() {
    let cnf = parse_formula(EQUIV).unwrap();
    let answer = parse_answer(BAD_SAT).unwrap();
    assert_eq!(compare(&cnf, &answer, true), (true, false));
}

#[test]
fn comparator_trusts_a_matching_unsat_verdict() {
    // No certificate is checked for UNSAT; even a satisfiable formula
    // passes when the reference verdict agrees.
    let cnf = parse_formula(EQUIV).unwrap();
    let answer = parse_answer(GOOD_UNSAT).unwrap();
    assert_eq!(compare(&cnf, &answer, false), (false, true));
}

#[test]
fn comparator_rejects_a_wrong_verdict() {
    let cnf = parse_formula(CONTRA).unwrap();
    let answer = parse_answer(GOOD_SAT).unwrap();
    assert_eq!(compare(&cnf, &answer, false), (true, false));
}

#[test]
fn timeout_outcome_scores_twice_the_limit() {
    let outcome = TestOutcome::new(3.0, 2.0, false, true, false);
    assert!(outcome.timed_out());
    assert_eq!(outcome.score(), 4.0);
    assert_eq!(outcome.charged_time(), 2.0);
    assert_eq!(outcome.to_string(), "TLE");
}

#[test]
fn outcome_display_reports_result() {
    assert_eq!(TestOutcome::new(1.234, 2.0, true, true, true).to_string(), "OK (1.23)");
    assert_eq!(TestOutcome::new(0.5, 2.0, false, true, true).to_string(), "WRONG");
}

#[test]
fn timeouts_never_disqualify_a_level() {
    let mut level = LevelResult::new();
    level.update(TestOutcome::new(f64::INFINITY, 2.0, false, true, false));
    level.update(TestOutcome::new(0.5, 2.0, true, true, true));
    assert!(level.valid());
    assert!(level.passed());
    assert_eq!(level.timeouts(), 1);
}

#[test]
fn wrong_answer_disqualifies_permanently() {
    let mut level = LevelResult::new();
    level.update(TestOutcome::new(0.5, 2.0, false, true, true));
    assert!(!level.valid());
    level.update(TestOutcome::new(0.1, 2.0, true, true, true));
    assert!(!level.valid());
    assert!(!level.passed());
}

#[test]
fn exceeded_timeout_budget_fails_but_keeps_validity() {
    let mut level = LevelResult::new();
    level.update(TestOutcome::new(f64::INFINITY, 2.0, false, true, false));
    level.update(TestOutcome::new(f64::INFINITY, 2.0, false, false, false));
    level.update(TestOutcome::new(0.5, 2.0, true, true, true));

    // Harness rule with timeouts_allowed = 1: 2 > 1, so the level fails.
    assert_eq!(level.timeouts(), 2);
    level.fail_timeout_budget();
    assert!(level.valid());
    assert!(!level.passed());
}

#[test]
fn level_counters_match_a_refold() {
    let outcomes = [
        TestOutcome::new(0.5, 2.0, true, true, true),
        TestOutcome::new(f64::INFINITY, 2.0, false, false, false),
        TestOutcome::new(1.0, 2.0, false, false, true),
        TestOutcome::new(0.2, 2.0, true, false, true),
    ];

    let mut batched = LevelResult::new();
    batched.batch_update(outcomes);

    let mut refolded = LevelResult::new();
    for outcome in batched.outcomes().iter().copied() {
        refolded.update(outcome);
    }

    assert_eq!(batched.total(), refolded.total());
    assert_eq!(batched.sat(), refolded.sat());
    assert_eq!(batched.unsat(), refolded.unsat());
    assert_eq!(batched.valid(), refolded.valid());
}

#[test]
fn practice_score_is_capped() {
    let mut level = LevelResult::new();
    for _ in 0..31 {
        level.update(TestOutcome::new(0.1, 2.0, true, true, true));
    }

    let mut final_result = FinalResult::new();
    final_result.absorb(&level);
    assert_eq!(final_result.practice_score(), MAX_SCORE);
}

#[test]
fn submission_payload_uses_the_leaderboard_keys() {
    let mut level = LevelResult::new();
    level.update(TestOutcome::new(0.5, 2.0, true, true, true));
    level.update(TestOutcome::new(f64::INFINITY, 2.0, false, false, false));

    let mut final_result = FinalResult::new();
    final_result.absorb(&level);
    final_result.advance_level();

    let payload = final_result.to_json();
    assert_eq!(payload["levels_passed"], 1);
    assert_eq!(payload["tests_run"], 2);
    assert_eq!(payload["sat_run"], 1);
    assert_eq!(payload["solved"], 1);
    assert_eq!(payload["unsat_tle"], 1);
    assert_eq!(payload["score"], 4.5);
}

/// Replays canned answers instead of running a real solver. Keyed by the
/// input file name; an infinite elapsed time simulates a forced kill.
struct ScriptedRunner {
    answers: HashMap<&'static str, (&'static str, f64)>,
}

impl ScriptedRunner {
    fn new(entries: &[(&'static str, &'static str, f64)]) -> Self {
        let answers = entries
            .iter()
            .map(|&(test, answer, elapsed)| (test, (answer, elapsed)))
            .collect();
        ScriptedRunner { answers }
    }
}

impl SolverRunner for ScriptedRunner {
    fn run(&self, input: &Path, output: &Path, limit: f64) -> Result<RunOutcome, harness::Error> {
        let name = input.file_name().unwrap().to_str().unwrap();
        let (answer, elapsed) = self.answers[name];
        fs::write(output, answer).unwrap();
        Ok(RunOutcome {
            elapsed,
            timed_out: elapsed > limit,
        })
    }
}

fn write_suite(root: &Path, levels: &[(&str, f64, u32, &[(&str, &str, bool)])]) {
    let in_dir = root.join("in");
    fs::create_dir_all(&in_dir).unwrap();

    let names: Vec<_> = levels.iter().map(|level| level.0).collect();
    let suite = serde_json::json!({ "levels": names });
    fs::write(in_dir.join("info.json"), suite.to_string()).unwrap();

    for (name, timeout, timeouts_allowed, tests) in levels {
        let level_dir = in_dir.join(name);
        fs::create_dir_all(&level_dir).unwrap();

        let mut manifest_tests = serde_json::Map::new();
        for (file, formula, verdict) in *tests {
            fs::write(level_dir.join(file), formula).unwrap();
            manifest_tests.insert((*file).to_owned(), serde_json::json!(verdict));
        }

        let manifest = serde_json::json!({
            "timeout": timeout,
            "timeouts_allowed": timeouts_allowed,
            "tests": manifest_tests,
        });
        fs::write(level_dir.join("info.json"), manifest.to_string()).unwrap();
    }
}

#[test]
fn competition_run_clears_every_level() {
    let dir = tempfile::tempdir().unwrap();
    write_suite(
        dir.path(),
        &[
            ("level1", 2.0, 0, &[("a.cnf", EQUIV, true), ("b.cnf", CONTRA, false)]),
            ("level2", 2.0, 0, &[("c.cnf", EQUIV, true)]),
        ],
    );

    let runner = ScriptedRunner::new(&[
        ("a.cnf", GOOD_SAT, 0.5),
        ("b.cnf", GOOD_UNSAT, 0.5),
        ("c.cnf", GOOD_SAT, 0.5),
    ]);

    let checker = Checker::new(dir.path(), runner);
    let final_result = checker.check(true).unwrap();

    assert!(final_result.valid());
    assert_eq!(final_result.levels_reached(), 2);
    assert_eq!(final_result.result().total().run, 3);
    assert_eq!(final_result.result().total().solved, 3);
}

#[test]
fn competition_stops_at_a_wrong_answer() {
    let dir = tempfile::tempdir().unwrap();
    write_suite(
        dir.path(),
        &[
            ("level1", 2.0, 0, &[("a.cnf", EQUIV, true), ("b.cnf", CONTRA, false)]),
            ("level2", 2.0, 0, &[("c.cnf", EQUIV, true)]),
        ],
    );

    // a.cnf gets a falsifying model; b.cnf and level2 must never run.
    let runner = ScriptedRunner::new(&[("a.cnf", BAD_SAT, 0.5)]);

    let checker = Checker::new(dir.path(), runner);
    let final_result = checker.check(true).unwrap();

    assert!(!final_result.valid());
    assert_eq!(final_result.levels_reached(), 1);
    assert_eq!(final_result.result().total().run, 1);
}

#[test]
fn competition_stops_when_the_timeout_budget_is_spent() {
    let dir = tempfile::tempdir().unwrap();
    write_suite(
        dir.path(),
        &[
            (
                "level1",
                2.0,
                1,
                &[
                    ("a.cnf", EQUIV, true),
                    ("b.cnf", CONTRA, false),
                    ("c.cnf", EQUIV, true),
                ],
            ),
            ("level2", 2.0, 0, &[("d.cnf", EQUIV, true)]),
        ],
    );

    let runner = ScriptedRunner::new(&[
        ("a.cnf", GOOD_SAT, f64::INFINITY),
        ("b.cnf", GOOD_UNSAT, f64::INFINITY),
        ("c.cnf", GOOD_SAT, 0.5),
    ]);

    let checker = Checker::new(dir.path(), runner);
    let final_result = checker.check(true).unwrap();

    // Not disqualified, but capped at the level that ran out of budget.
    assert!(final_result.valid());
    assert_eq!(final_result.levels_reached(), 1);
    assert_eq!(final_result.result().total().timeouts, 2);
}

#[test]
fn practice_mode_grades_only_the_first_level() {
    let dir = tempfile::tempdir().unwrap();
    write_suite(
        dir.path(),
        &[
            ("level1", 2.0, 0, &[("a.cnf", EQUIV, true), ("b.cnf", CONTRA, false)]),
            ("level2", 2.0, 0, &[("c.cnf", EQUIV, true)]),
        ],
    );

    let runner = ScriptedRunner::new(&[
        ("a.cnf", BAD_SAT, 0.5),
        ("b.cnf", GOOD_UNSAT, 0.5),
    ]);

    let checker = Checker::new(dir.path(), runner);
    let final_result = checker.check(false).unwrap();

    // Practice keeps going past the wrong answer and never reaches level2.
    assert_eq!(final_result.levels_reached(), 1);
    assert_eq!(final_result.result().total().run, 2);
    assert_eq!(final_result.result().total().solved, 1);
    assert_eq!(final_result.practice_score(), 3);
}

#[test]
fn garbage_answer_file_fails_only_its_test() {
    let dir = tempfile::tempdir().unwrap();
    write_suite(
        dir.path(),
        &[("level1", 2.0, 0, &[("a.cnf", EQUIV, true), ("b.cnf", CONTRA, false)])],
    );

    let runner = ScriptedRunner::new(&[
        ("a.cnf", "segfault backtrace\n", 0.5),
        ("b.cnf", GOOD_UNSAT, 0.5),
    ]);

    let checker = Checker::new(dir.path(), runner);
    let final_result = checker.check(false).unwrap();

    assert_eq!(final_result.result().total().run, 2);
    assert_eq!(final_result.result().total().solved, 1);
    assert!(!final_result.valid());
}

#[test]
fn missing_manifest_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let checker = Checker::new(dir.path(), ScriptedRunner::new(&[]));
    let error = checker.check(true).unwrap_err();
    assert!(matches!(error, harness::Error::MissingManifest { .. }));
}
