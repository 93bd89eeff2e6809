//! `docqa ask`, `docqa chat` and `docqa summarize`.

use anyhow::{bail, Result};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use docqa_core::pipeline::{Pipeline, QueryOutcome};
use docqa_core::progress::NoProgress;

use crate::config::Config;
use crate::runtime;

pub async fn run_ask(
    config: &Config,
    question: &str,
    k: Option<usize>,
    show_context: bool,
    json: bool,
) -> Result<()> {
    let question = question.trim();
    if question.is_empty() {
        bail!("Question must not be empty");
    }

    let mut pipeline = runtime::build_pipeline(config, Arc::new(NoProgress))?;
    let outcome = ask_once(&mut pipeline, question, k).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        print_outcome(&outcome);
        if show_context {
            print_context(&outcome);
        }
    }
    Ok(())
}

async fn ask_once(
    pipeline: &mut Pipeline,
    question: &str,
    k: Option<usize>,
) -> Result<QueryOutcome> {
    let k = k.unwrap_or(pipeline.settings().top_k);
    pipeline
        .ask_with_k(question, k)
        .await
        .map_err(|e| anyhow::anyhow!("{}", e.user_message()))
}

fn print_outcome(outcome: &QueryOutcome) {
    println!("{}", outcome.message());
    if let QueryOutcome::Answered { sources, .. } = outcome {
        println!();
        println!("Sources:");
        for hit in sources {
            println!(
                "  [{:.3}] {} #{}",
                hit.score, hit.chunk.source, hit.chunk.chunk_index
            );
        }
    }
}

fn print_context(outcome: &QueryOutcome) {
    if let QueryOutcome::Answered { sources, .. } = outcome {
        for hit in sources {
            println!();
            println!(
                "--- {} #{} (score {:.3})",
                hit.chunk.source, hit.chunk.chunk_index, hit.score
            );
            println!("{}", hit.chunk.text);
        }
    }
}

/// Interactive question loop over one session.
///
/// `:history` prints the session, `:clear` forgets it, `:quit` (or EOF) exits.
pub async fn run_chat(config: &Config) -> Result<()> {
    let mut pipeline = runtime::build_pipeline(config, Arc::new(NoProgress))?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    println!("Ask a question about your documents (:history, :clear, :quit).");
    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();
        match input {
            "" => continue,
            ":quit" | ":q" | ":exit" => break,
            ":history" => {
                if pipeline.history().is_empty() {
                    println!("(no questions yet)");
                }
                for (i, exchange) in pipeline.history().iter().enumerate() {
                    println!("Q{}: {}", i + 1, exchange.question);
                    println!("A{}: {}", i + 1, exchange.answer);
                }
            }
            ":clear" => {
                pipeline.clear_history();
                println!("(history cleared)");
            }
            question => match ask_once(&mut pipeline, question, None).await {
                Ok(outcome) => print_outcome(&outcome),
                // One failed question should not end the session.
                Err(e) => eprintln!("error: {}", e),
            },
        }
    }
    Ok(())
}

pub async fn run_summarize(config: &Config) -> Result<()> {
    let pipeline = runtime::build_pipeline(config, Arc::new(NoProgress))?;
    let summary = pipeline
        .summarize()
        .await
        .map_err(|e| anyhow::anyhow!("{}", e.user_message()))?;
    println!("{}", summary);
    Ok(())
}
