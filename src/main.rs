use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use pretty_env_logger::formatted_builder;
use satgrade::{
    grade,
    harness::{self, build_solver, Checker, MakeRunner},
    prelude::*,
    report::Report,
    submit::{self, SubmitConfig},
    validate,
};

#[derive(Debug, Parser)]
#[command(name = "satgrade", about = "Grade a SAT solver submission")]
struct Args {
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Debug, Subcommand)]
enum Cmd {
    /// Build the solver and grade it against the test suite
    Grade {
        /// Evaluate according to competition rules
        #[arg(long)]
        competition: bool,
        /// Submit the result to the leaderboard
        #[arg(long)]
        submit: bool,
        /// Root of the test-suite directory
        #[arg(long, default_value = "tests")]
        tests: PathBuf,
    },
    /// Check a single answer file against a formula
    Validate {
        /// The formula file in DIMACS CNF format
        formula: PathBuf,
        /// The answer file produced by the solver
        answer: PathBuf,
        /// The reference verdict for the formula
        #[arg(value_enum)]
        reference: Reference,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Reference {
    Sat,
    Unsat,
}

#[derive(Debug, Snafu)]
enum Error {
    #[snafu(display("Failed to grade the submission"))]
    Grading { source: harness::Error },
    #[snafu(display("Leaderboard submission is not configured"))]
    SubmitEnv { source: submit::Error },
    #[snafu(display("Failed to check the answer"))]
    Checking { source: validate::Error },
}

fn grade_submission(competition: bool, submit: bool, tests: PathBuf) -> Result<(), Error> {
    // Resolve the submission credentials first so a misconfigured
    // environment aborts before any solver run.
    let submit_config = if submit {
        Some(SubmitConfig::from_env().context(SubmitEnv)?)
    } else {
        None
    };

    build_solver().context(Grading)?;

    let checker = Checker::new(tests, MakeRunner);
    let final_result = checker.check(competition).context(Grading)?;

    if competition {
        println!("{}", final_result);

        if let Some(config) = submit_config {
            submit::submit(&config, &final_result);
        }
    } else {
        println!("\nTotal: {}/{}", final_result.practice_score(), grade::MAX_SCORE);
    }

    Ok(())
}

fn validate_answer(formula: PathBuf, answer: PathBuf, reference: Reference) -> Result<(), Error> {
    let reference_verdict = matches!(reference, Reference::Sat);
    let (_, correct) =
        validate::check_files(&formula, &answer, reference_verdict).context(Checking)?;

    if correct {
        println!("Answer is correct!");
    } else {
        println!("Answer is incorrect!");
    }

    Ok(())
}

fn init_logger() {
    let mut builder = formatted_builder();

    if let Ok(s) = ::std::env::var("RUST_LOG") {
        builder.parse_filters(&s);
    } else {
        if cfg!(debug_assertions) {
            builder.parse_filters("satgrade=debug");
        } else {
            builder.parse_filters("satgrade=warn");
        }
    }

    builder.try_init().expect("Failed to initialize the logger");
}

fn main() -> Result<(), Report> {
    init_logger();

    match Args::parse().command {
        Cmd::Grade {
            competition,
            submit,
            tests,
        } => grade_submission(competition, submit, tests)?,
        Cmd::Validate {
            formula,
            answer,
            reference,
        } => validate_answer(formula, answer, reference)?,
    }

    Ok(())
}
