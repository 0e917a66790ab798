use super::{Command, CommandError, CommandResult};
use crate::debugger::ThreadNum;
use chumsky::error::Rich;
use chumsky::prelude::{any, choice, end, just};
use chumsky::{extra, text, Boxed, Parser};
use std::fmt::Display;
use std::str::FromStr;

pub const QUIT_COMMAND: &str = "quit";
pub const JOIN_COMMAND: &str = "join";
pub const WAIT_COMMAND: &str = "wait";
pub const SUSPEND_COMMAND: &str = "suspend";
pub const RESUME_COMMAND: &str = "resume";
pub const STEP_COMMAND: &str = "step";
pub const STEP_OVER_COMMAND: &str = "stepo";
pub const STACK_COMMAND: &str = "stack";
pub const PRINT_COMMAND: &str = "print";
pub const BREAK_COMMAND: &str = "break";
pub const UNBREAK_COMMAND: &str = "unbreak";
pub const FACT_COMMAND: &str = "fact";
pub const ACTIVATION_COMMAND: &str = "activation";
pub const AGENDA_COMMAND: &str = "agenda";
pub const THREADS_COMMAND: &str = "threads";

const VERBS: [&str; 15] = [
    QUIT_COMMAND,
    JOIN_COMMAND,
    WAIT_COMMAND,
    SUSPEND_COMMAND,
    RESUME_COMMAND,
    STEP_COMMAND,
    STEP_OVER_COMMAND,
    STACK_COMMAND,
    PRINT_COMMAND,
    BREAK_COMMAND,
    UNBREAK_COMMAND,
    FACT_COMMAND,
    ACTIVATION_COMMAND,
    AGENDA_COMMAND,
    THREADS_COMMAND,
];

type Err<'a> = extra::Err<Rich<'a, char>>;

pub fn number<'a, T>() -> impl chumsky::Parser<'a, &'a str, T, Err<'a>> + Clone
where
    T: FromStr,
    T::Err: Display,
{
    text::int(10)
        .try_map(|s: &str, span| s.parse::<T>().map_err(|e| Rich::custom(span, e)))
        .padded()
        .labelled("number")
}

/// Sequence of non-whitespace characters.
pub fn word<'a>() -> impl chumsky::Parser<'a, &'a str, String, Err<'a>> + Clone {
    any()
        .filter(|c: &char| !c.is_whitespace())
        .repeated()
        .at_least(1)
        .to_slice()
        .map(ToString::to_string)
        .padded()
        .labelled("word")
}

/// Everything up to the end of line.
pub fn rest_of_line<'a>() -> impl chumsky::Parser<'a, &'a str, String, Err<'a>> + Clone {
    any()
        .repeated()
        .at_least(1)
        .to_slice()
        .map(|s: &str| s.trim().to_string())
        .filter(|s: &String| !s.is_empty())
        .labelled("text")
}

fn command<'a, I>(ctx: &'static str, inner: I) -> Boxed<'a, 'a, &'a str, Command, Err<'a>>
where
    I: chumsky::Parser<'a, &'a str, Command, Err<'a>> + 'a,
{
    inner.then_ignore(end()).labelled(ctx).boxed()
}

impl Command {
    /// Parse input line into command. Unknown verbs are not an error.
    pub fn parse(input: &str) -> CommandResult<Command> {
        let verb = input.split_whitespace().next().unwrap_or_default();
        if !VERBS.contains(&verb) {
            return Ok(Command::Unknown(verb.to_string()));
        }

        Self::parser()
            .parse(input)
            .into_result()
            .map_err(|e| {
                CommandError::Parsing(e.first().map(ToString::to_string).unwrap_or_default())
            })
    }

    fn parser<'a>() -> impl chumsky::Parser<'a, &'a str, Command, Err<'a>> {
        let op = |sym| just(sym).padded();

        let quit = op(QUIT_COMMAND).to(Command::Quit);
        let join = op(JOIN_COMMAND).ignore_then(number()).map(Command::Join);
        let wait = op(WAIT_COMMAND).ignore_then(number()).map(Command::Wait);
        let suspend = op(SUSPEND_COMMAND)
            .ignore_then(number())
            .map(Command::Suspend);
        let resume = op(RESUME_COMMAND).ignore_then(number()).map(Command::Resume);
        let step = op(STEP_COMMAND).ignore_then(number()).map(Command::Step);
        let step_over = op(STEP_OVER_COMMAND)
            .ignore_then(number())
            .map(Command::StepOver);
        let stack = op(STACK_COMMAND).ignore_then(number()).map(Command::Stack);

        let print = op(PRINT_COMMAND)
            .ignore_then(number::<ThreadNum>())
            .then(number::<u32>())
            .then(rest_of_line())
            .map(|((thread, level), expr)| Command::Print {
                thread,
                level,
                expr,
            })
            .boxed();

        let r#break = op(BREAK_COMMAND)
            .ignore_then(number::<u32>())
            .then(rest_of_line())
            .map(|(line, file)| Command::Break { line, file })
            .boxed();
        let unbreak = op(UNBREAK_COMMAND)
            .ignore_then(number::<u32>())
            .then(rest_of_line())
            .map(|(line, file)| Command::Unbreak { line, file })
            .boxed();

        let fact = op(FACT_COMMAND).ignore_then(number()).map(Command::Fact);
        let activation = op(ACTIVATION_COMMAND).to(Command::Activation);
        let agenda = op(AGENDA_COMMAND)
            .ignore_then(number::<usize>())
            .then(word().or_not())
            .map(|(count, module)| Command::Agenda { count, module })
            .boxed();
        let threads = op(THREADS_COMMAND).to(Command::Threads);

        choice((
            command(QUIT_COMMAND, quit),
            command(JOIN_COMMAND, join),
            command(WAIT_COMMAND, wait),
            command(SUSPEND_COMMAND, suspend),
            command(RESUME_COMMAND, resume),
            command(STEP_OVER_COMMAND, step_over),
            command(STEP_COMMAND, step),
            command(STACK_COMMAND, stack),
            command(PRINT_COMMAND, print),
            command(BREAK_COMMAND, r#break),
            command(UNBREAK_COMMAND, unbreak),
            command(FACT_COMMAND, fact),
            command(ACTIVATION_COMMAND, activation),
            command(AGENDA_COMMAND, agenda),
            command(THREADS_COMMAND, threads),
        ))
    }
}

#[test]
fn test_parser() {
    struct TestCase {
        inputs: Vec<&'static str>,
        command_matcher: fn(result: Result<Command, CommandError>),
    }
    let cases = vec![
        TestCase {
            inputs: vec!["quit", "  quit  "],
            command_matcher: |result| assert_eq!(result.unwrap(), Command::Quit),
        },
        TestCase {
            inputs: vec!["resume 0", "resume   0 "],
            command_matcher: |result| assert_eq!(result.unwrap(), Command::Resume(0)),
        },
        TestCase {
            inputs: vec!["step 3"],
            command_matcher: |result| assert_eq!(result.unwrap(), Command::Step(3)),
        },
        TestCase {
            inputs: vec!["stepo 3"],
            command_matcher: |result| assert_eq!(result.unwrap(), Command::StepOver(3)),
        },
        TestCase {
            inputs: vec!["join 12", "wait 12"],
            command_matcher: |result| {
                assert!(matches!(
                    result.unwrap(),
                    Command::Join(12) | Command::Wait(12)
                ))
            },
        },
        TestCase {
            inputs: vec!["print 1 2 (+ ?x 1)"],
            command_matcher: |result| {
                assert_eq!(
                    result.unwrap(),
                    Command::Print {
                        thread: 1,
                        level: 2,
                        expr: "(+ ?x 1)".to_string()
                    }
                )
            },
        },
        TestCase {
            inputs: vec!["break 42 rules.clp", "break 42   rules.clp  "],
            command_matcher: |result| {
                assert_eq!(
                    result.unwrap(),
                    Command::Break {
                        line: 42,
                        file: "rules.clp".to_string()
                    }
                )
            },
        },
        TestCase {
            inputs: vec!["unbreak 7 /home/user/my rules.clp"],
            command_matcher: |result| {
                assert_eq!(
                    result.unwrap(),
                    Command::Unbreak {
                        line: 7,
                        file: "/home/user/my rules.clp".to_string()
                    }
                )
            },
        },
        TestCase {
            inputs: vec!["agenda 5"],
            command_matcher: |result| {
                assert_eq!(
                    result.unwrap(),
                    Command::Agenda {
                        count: 5,
                        module: None
                    }
                )
            },
        },
        TestCase {
            inputs: vec!["agenda 5 SCORING"],
            command_matcher: |result| {
                assert_eq!(
                    result.unwrap(),
                    Command::Agenda {
                        count: 5,
                        module: Some("SCORING".to_string())
                    }
                )
            },
        },
        TestCase {
            inputs: vec!["fact 17"],
            command_matcher: |result| assert_eq!(result.unwrap(), Command::Fact(17)),
        },
        TestCase {
            inputs: vec!["activation", "threads"],
            command_matcher: |result| {
                assert!(matches!(
                    result.unwrap(),
                    Command::Activation | Command::Threads
                ))
            },
        },
        TestCase {
            inputs: vec!["frobnicate 1 2", "", "   ", "steps 1"],
            command_matcher: |result| assert!(matches!(result.unwrap(), Command::Unknown(_))),
        },
        TestCase {
            inputs: vec![
                "resume",
                "resume x",
                "resume 1 2",
                "resume 99999999999",
                "print 1 0",
                "break rules.clp 42",
                "agenda",
                "quit now",
            ],
            command_matcher: |result| assert!(result.is_err()),
        },
    ];

    for tc in cases {
        for input in tc.inputs {
            (tc.command_matcher)(Command::parse(input));
        }
    }
}
