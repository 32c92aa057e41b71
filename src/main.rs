use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use newsletter_digest::config::AppConfig;
use newsletter_digest::job::{JobOptions, JobRunner, JobSource};
use newsletter_digest::llm::create_provider;
use newsletter_digest::mail::{GmailClient, GoogleAuth};
use newsletter_digest::output::{DEFAULT_WRAP, convert_file};
use newsletter_digest::summary::Summarizer;

const DEFAULT_LABEL: &str = "Joshua Clear";

/// Summarize Gmail newsletters with a language model.
#[derive(Parser, Debug)]
#[command(name = "newsletter-digest", version, about)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Summarize every message under a Gmail label (one-time backlog).
    Backlog {
        /// Gmail label name.
        #[arg(long)]
        label: String,

        /// Output JSONL file (appended to).
        #[arg(long, default_value = "summaries_backlog.jsonl")]
        out: PathBuf,
    },

    /// Summarize unread messages from one sender, then label and archive them.
    Once {
        /// Sender address to search for.
        #[arg(long)]
        from_addr: String,

        /// Label to apply after summarizing.
        #[arg(long, default_value = DEFAULT_LABEL)]
        apply_label: String,

        /// Leave messages in the inbox.
        #[arg(long, default_value = "false")]
        no_archive: bool,

        #[arg(long, default_value = "summaries_once.jsonl")]
        out: PathBuf,
    },

    /// Daily mode: unread from sender → summarize → label → archive.
    Daily {
        #[arg(long)]
        from_addr: String,

        #[arg(long, default_value = DEFAULT_LABEL)]
        apply_label: String,

        #[arg(long, default_value = "summaries_daily.jsonl")]
        out: PathBuf,
    },

    /// Convert a JSONL summary log into plain text for reading on a phone.
    ToText {
        #[arg(long = "in", default_value = "summaries_daily.jsonl")]
        input: PathBuf,

        #[arg(long, default_value = "summaries_for_phone.txt")]
        out: PathBuf,

        /// Line wrap width.
        #[arg(long, default_value_t = DEFAULT_WRAP)]
        wrap: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = Args::parse();

    let (source, options) = match args.command {
        Command::ToText { input, out, wrap } => {
            return to_text(&input, &out, wrap).await;
        }
        Command::Backlog { label, out } => (JobSource::Label(label), JobOptions::read_only(out)),
        Command::Once {
            from_addr,
            apply_label,
            no_archive,
            out,
        } => (
            JobSource::unread_from(&from_addr),
            JobOptions {
                apply_label: Some(apply_label),
                archive: !no_archive,
                output_path: out,
            },
        ),
        Command::Daily {
            from_addr,
            apply_label,
            out,
        } => (
            JobSource::unread_from(&from_addr),
            JobOptions {
                apply_label: Some(apply_label),
                archive: true,
                output_path: out,
            },
        ),
    };

    let config = AppConfig::from_env().context("loading configuration")?;

    let llm = create_provider(&config.llm).context("creating LLM provider")?;
    let summarizer = Arc::new(Summarizer::new(llm, config.summarizer.clone()));

    let auth = GoogleAuth::new(config.gmail.auth.clone()).context("configuring Gmail auth")?;
    let gmail = GmailClient::new(&config.gmail.api_base, Arc::new(auth))
        .context("creating Gmail client")?;

    let runner = JobRunner::new(Arc::new(gmail), summarizer);
    let report = runner.run(&source, &options).await?;

    if report.nothing_to_do() {
        eprintln!("{}", report.message());
    } else {
        eprintln!("✅ {}", report.message());
        eprintln!(
            "   {} LLM call(s), {} input / {} output tokens, ~${} estimated",
            report.usage.calls,
            report.usage.input_tokens,
            report.usage.output_tokens,
            report.usage.cost.round_dp(4)
        );
    }
    Ok(())
}

async fn to_text(input: &Path, out: &Path, wrap: usize) -> anyhow::Result<()> {
    let count = convert_file(input, out, wrap)
        .await
        .with_context(|| format!("converting {}", input.display()))?;
    eprintln!("✅ {count} summaries written → {}", out.display());
    Ok(())
}
