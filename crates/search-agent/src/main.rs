//! An interactive web-search agent for the terminal.
//!
//! Questions passed as arguments are asked in order, sharing one
//! conversation. Without arguments, questions are read from stdin.

#[macro_use]
extern crate tracing;

use std::env;
use std::io::Write as _;
use std::pin::pin;
use std::process::ExitCode;
use std::time::Duration;

use dotenv::dotenv;
use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use search_agent::core::AgentError;
use search_agent::{Config, Session, SessionBuilder};
use tokio::io::{self, AsyncBufReadExt};
use tokio::select;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::time::sleep;

const BAR_CHAR: &str = "▎";

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    if let Err(err) = dotenv() {
        debug!("no .env file loaded: {err}");
    }
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{}", err.bright_red());
            eprintln!("Please check your .env file.");
            return ExitCode::FAILURE;
        }
    };
    debug!("loaded config: {config:?}");

    let (delta_tx, mut delta_rx) = mpsc::unbounded_channel();
    let mut session = SessionBuilder::from_config(&config)
        .on_transcript(move |delta| {
            delta_tx.send(delta).ok();
        })
        .build();

    let questions: Vec<String> = env::args().skip(1).collect();
    if !questions.is_empty() {
        for question in questions {
            println!("{} {}", ">".bright_black(), question.bright_white());
            if let Err(err) = ask(&mut session, &question, &mut delta_rx).await
            {
                return report(err);
            }
        }
        return ExitCode::SUCCESS;
    }

    loop {
        print!("> ");
        std::io::stdout().flush().ok();

        let Some(line) = read_line().await else {
            break;
        };
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if let Err(err) = ask(&mut session, question, &mut delta_rx).await {
            if matches!(err, AgentError::Configuration { .. }) {
                return report(err);
            }
            eprintln!("{}", format!("error: {err}").bright_red());
        }
    }
    ExitCode::SUCCESS
}

/// Asks one question, printing the answer as it streams in.
async fn ask(
    session: &mut Session,
    question: &str,
    delta_rx: &mut UnboundedReceiver<String>,
) -> Result<(), AgentError> {
    let progress_style = ProgressStyle::with_template("{spinner} {wide_msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");

    let mut run = pin!(session.send_message(question));
    let mut progress_bar = None;
    let mut streaming = false;

    let result = loop {
        if !streaming {
            progress_bar
                .get_or_insert_with(|| {
                    let progress_bar = ProgressBar::new_spinner();
                    progress_bar.set_style(progress_style.clone());
                    progress_bar.set_message("🔎 Thinking...");
                    progress_bar
                })
                .inc(1);
        }

        let sleep = sleep(Duration::from_millis(100));
        select! {
            result = &mut run => break result,
            Some(delta) = delta_rx.recv() => {
                // Finish the progress bar before printing anything else.
                if let Some(progress_bar) = progress_bar.take() {
                    progress_bar.finish_and_clear();
                }
                if !streaming {
                    print!("{}🤖 ", BAR_CHAR.bright_cyan());
                    streaming = true;
                }
                print!("{}", delta.bright_white());
                std::io::stdout().flush().ok();
            }
            _ = sleep => {}
        }
    };

    if let Some(progress_bar) = progress_bar.take() {
        progress_bar.finish_and_clear();
    }
    // Deltas may still be queued when the run resolves first.
    while let Ok(delta) = delta_rx.try_recv() {
        if !streaming {
            print!("{}🤖 ", BAR_CHAR.bright_cyan());
            streaming = true;
        }
        print!("{}", delta.bright_white());
    }
    if streaming {
        println!();
    }

    let answer = result?;
    if !streaming {
        println!("{}🤖 {}", BAR_CHAR.bright_cyan(), answer.bright_white());
    }
    Ok(())
}

fn report(err: AgentError) -> ExitCode {
    error!("run failed: {err}");
    eprintln!("{}", format!("Error running agent: {err}").bright_red());
    ExitCode::FAILURE
}

async fn read_line() -> Option<String> {
    let mut stdin = io::BufReader::new(io::stdin());
    let mut line = String::new();

    match stdin.read_line(&mut line).await {
        Ok(count) => {
            if count == 0 {
                return None;
            }
            Some(line)
        }
        Err(err) => {
            error!("error reading input: {}", err);
            None
        }
    }
}
