/*!
The grading state machine: per-test outcomes folded into level results,
level results folded into the final multi-level result.

All aggregate counters are caches over the recorded outcome list and can
be recomputed by re-folding it.
*/

use std::fmt::Display;

use serde_json::json;

/// Points awarded per correct test in practice mode.
pub const POINTS_PER_TEST: u32 = 3;
/// Practice-mode score cap.
pub const MAX_SCORE: u32 = 90;

/// Immutable record of a single graded test.
#[derive(Debug, Clone, Copy)]
pub struct TestOutcome {
    elapsed: f64,
    limit: f64,
    verdict: bool,
    reference_verdict: bool,
    valid: bool,
}

impl TestOutcome {
    /// `valid` is whether a claimed-SAT model actually satisfies the
    /// formula; it is irrelevant when the time limit was exceeded.
    pub fn new(elapsed: f64, limit: f64, verdict: bool, reference_verdict: bool, valid: bool) -> Self {
        TestOutcome {
            elapsed,
            limit,
            verdict,
            reference_verdict,
            valid,
        }
    }

    pub fn reference_verdict(&self) -> bool {
        self.reference_verdict
    }

    pub fn timed_out(&self) -> bool {
        self.elapsed > self.limit
    }

    pub fn correct(&self) -> bool {
        self.verdict == self.reference_verdict && self.valid
    }

    /// Score contribution: the elapsed time, or twice the limit on timeout.
    pub fn score(&self) -> f64 {
        if self.timed_out() {
            2.0 * self.limit
        } else {
            self.elapsed
        }
    }

    /// Wall time charged to the level; a timed-out test charges the limit,
    /// never the (possibly infinite) measured time.
    pub fn charged_time(&self) -> f64 {
        if self.timed_out() {
            self.limit
        } else {
            self.elapsed
        }
    }
}

impl Display for TestOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.timed_out() {
            write!(f, "TLE")
        } else if self.correct() {
            write!(f, "OK ({:.2})", self.elapsed)
        } else {
            write!(f, "WRONG")
        }
    }
}

/// Counter bundle kept per reference-verdict class (and combined).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Tally {
    pub run: u32,
    pub solved: u32,
    pub timeouts: u32,
    pub time: f64,
    pub score: f64,
}

impl Tally {
    fn add(&mut self, outcome: &TestOutcome) {
        self.run += 1;
        self.solved += outcome.correct() as u32;
        self.timeouts += outcome.timed_out() as u32;
        self.time += outcome.charged_time();
        self.score += outcome.score();
    }
}

/// Accumulator over the outcomes of one level.
#[derive(Debug)]
pub struct LevelResult {
    outcomes: Vec<TestOutcome>,

    valid: bool,
    passed: bool,

    total: Tally,
    sat: Tally,
    unsat: Tally,
}

impl LevelResult {
    pub fn new() -> Self {
        LevelResult {
            outcomes: Vec::new(),
            valid: true,
            passed: true,
            total: Tally::default(),
            sat: Tally::default(),
            unsat: Tally::default(),
        }
    }

    /// Folds one outcome in. A wrong non-timeout answer makes the level
    /// invalid permanently; a timeout never does.
    pub fn update(&mut self, outcome: TestOutcome) {
        self.total.add(&outcome);
        if outcome.reference_verdict() {
            self.sat.add(&outcome);
        } else {
            self.unsat.add(&outcome);
        }

        if !outcome.timed_out() && !outcome.correct() {
            self.valid = false;
            self.passed = false;
        }

        self.outcomes.push(outcome);
    }

    pub fn batch_update(&mut self, outcomes: impl IntoIterator<Item = TestOutcome>) {
        for outcome in outcomes {
            self.update(outcome);
        }
    }

    /// Marks the level as failed for exceeding its timeout budget. Does not
    /// touch `valid`: a timeout-heavy level is not a disqualification.
    pub fn fail_timeout_budget(&mut self) {
        self.passed = false;
    }

    pub fn valid(&self) -> bool {
        self.valid
    }

    pub fn passed(&self) -> bool {
        self.passed
    }

    pub fn timeouts(&self) -> u32 {
        self.total.timeouts
    }

    pub fn outcomes(&self) -> &[TestOutcome] {
        &self.outcomes
    }

    pub fn total(&self) -> &Tally {
        &self.total
    }

    pub fn sat(&self) -> &Tally {
        &self.sat
    }

    pub fn unsat(&self) -> &Tally {
        &self.unsat
    }
}

impl Default for LevelResult {
    fn default() -> Self {
        Self::new()
    }
}

/// The result of a whole run: every outcome re-folded, plus the number of
/// levels attempted before stopping.
#[derive(Debug, Default)]
pub struct FinalResult {
    result: LevelResult,
    levels_reached: u32,
}

impl FinalResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-folds a finished level's outcomes into the aggregate. Only the
    /// outcomes carry over: a level failed on its timeout budget alone does
    /// not invalidate the final result.
    pub fn absorb(&mut self, level: &LevelResult) {
        self.result.batch_update(level.outcomes().iter().copied());
    }

    pub fn advance_level(&mut self) {
        self.levels_reached += 1;
    }

    pub fn levels_reached(&self) -> u32 {
        self.levels_reached
    }

    pub fn valid(&self) -> bool {
        self.result.valid()
    }

    pub fn result(&self) -> &LevelResult {
        &self.result
    }

    /// Practice-mode point total: fixed points per correct test, capped.
    pub fn practice_score(&self) -> u32 {
        (self.result.total().solved * POINTS_PER_TEST).min(MAX_SCORE)
    }

    /// The leaderboard submission payload.
    pub fn to_json(&self) -> serde_json::Value {
        let (total, sat, unsat) = (self.result.total(), self.result.sat(), self.result.unsat());
        json!({
            "levels_passed": self.levels_reached,
            "tests_run": total.run,
            "sat_run": sat.run,
            "unsat_run": unsat.run,
            "solved": total.solved,
            "sat_solved": sat.solved,
            "unsat_solved": unsat.solved,
            "time": total.time,
            "sat_time": sat.time,
            "unsat_time": unsat.time,
            "tle": total.timeouts,
            "sat_tle": sat.timeouts,
            "unsat_tle": unsat.timeouts,
            "score": total.score,
            "sat_score": sat.score,
            "unsat_score": unsat.score,
        })
    }
}

impl Display for FinalResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (total, sat, unsat) = (self.result.total(), self.result.sat(), self.result.unsat());
        writeln!(f, "{}", if self.valid() { "OK" } else { "DISQUALIFIED" })?;
        writeln!(f, "Level reached: {}", self.levels_reached)?;
        writeln!(
            f,
            "Tests run: {} (SAT: {}, UNSAT: {})",
            total.run, sat.run, unsat.run
        )?;
        writeln!(
            f,
            "Tests solved: {} (SAT: {}, UNSAT: {})",
            total.solved, sat.solved, unsat.solved
        )?;
        writeln!(
            f,
            "Time: {:.2} (SAT: {:.2}, UNSAT: {:.2})",
            total.time, sat.time, unsat.time
        )?;
        writeln!(
            f,
            "TLEs: {} (SAT: {}, UNSAT: {})",
            total.timeouts, sat.timeouts, unsat.timeouts
        )?;
        write!(
            f,
            "Score: {:.2} (SAT: {:.2}, UNSAT: {:.2})",
            total.score, sat.score, unsat.score
        )
    }
}
