use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use sentiment_generator::cache::ModelCache;
use sentiment_generator::{ModelConfig, SamplingParams, SentimentGenerator, SentimentLabel};

/// Detect the sentiment of a prompt and write a paragraph in that tone.
#[derive(Parser, Debug)]
#[command(name = "sentiment-generator", version, about)]
struct Args {
    /// Prompt to write about. Starts an interactive session when omitted.
    prompt: Option<String>,

    /// Text generation model (GPT-2 family).
    #[arg(long, default_value = "gpt2")]
    gen_model: String,

    /// Sentiment classification model (DistilBERT family).
    #[arg(long, default_value = "distilbert-base-uncased-finetuned-sst-2-english")]
    sentiment_model: String,

    /// Device: -1 for CPU, 0 or above for a CUDA GPU.
    #[arg(long, default_value_t = -1, allow_negative_numbers = true)]
    device: i64,

    /// Length of the generated text, in tokens.
    #[arg(long, default_value_t = 120, value_parser = clap::value_parser!(u16).range(50..=300))]
    max_tokens: u16,

    /// Creativity of sampling.
    #[arg(long, default_value_t = 0.9, value_parser = bounded_f64(0.2, 1.5))]
    temperature: f64,

    /// Nucleus sampling threshold.
    #[arg(long, default_value_t = 0.95, value_parser = bounded_f64(0.1, 1.0))]
    top_p: f64,

    /// Sample only from the k most likely tokens.
    #[arg(long, default_value_t = 50, value_parser = clap::value_parser!(u16).range(10..=200))]
    top_k: u16,

    /// Seed for reproducible output.
    #[arg(long)]
    seed: Option<u64>,

    /// Tone override.
    #[arg(long, value_enum, default_value_t = SentimentChoice::Auto)]
    sentiment: SentimentChoice,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SentimentChoice {
    Auto,
    Positive,
    Negative,
    Neutral,
}

impl SentimentChoice {
    fn label(self) -> Option<SentimentLabel> {
        match self {
            SentimentChoice::Auto => None,
            SentimentChoice::Positive => Some(SentimentLabel::Positive),
            SentimentChoice::Negative => Some(SentimentLabel::Negative),
            SentimentChoice::Neutral => Some(SentimentLabel::Neutral),
        }
    }
}

fn bounded_f64(min: f64, max: f64) -> impl Fn(&str) -> std::result::Result<f64, String> + Clone {
    move |s| {
        let value: f64 = s.parse().map_err(|e| format!("{e}"))?;
        if (min..=max).contains(&value) {
            Ok(value)
        } else {
            Err(format!("must be between {min} and {max}"))
        }
    }
}

impl Args {
    fn model_config(&self) -> ModelConfig {
        ModelConfig::new(&self.sentiment_model, &self.gen_model, self.device)
    }

    fn sampling_params(&self) -> SamplingParams {
        let params = SamplingParams::default()
            .max_new_tokens(self.max_tokens as usize)
            .top_k(self.top_k as usize)
            .top_p(self.top_p)
            .temperature(self.temperature);
        match self.seed {
            Some(seed) => params.seed(seed),
            None => params,
        }
    }
}

struct Session {
    cache: ModelCache<SentimentGenerator>,
    config: ModelConfig,
    params: SamplingParams,
    sentiment: SentimentChoice,
}

impl Session {
    fn generator(&mut self) -> Result<Arc<SentimentGenerator>> {
        let generator = self.cache.get_or_create(&self.config, |config| {
            println!("{}", format!("Loading models on {}...", config.device).dimmed());
            let generator = SentimentGenerator::new(config.clone())?;
            if generator.used_fallback() {
                println!(
                    "{}",
                    format!(
                        "Using fallback models: {} / {}",
                        generator.sentiment_model_id(),
                        generator.generator_model_id()
                    )
                    .yellow()
                );
            }
            Ok(generator)
        })?;
        Ok(generator)
    }

    fn run_prompt(&mut self, prompt: &str) -> Result<()> {
        if prompt.trim().is_empty() {
            println!("{}", "Please enter a prompt first.".red());
            return Ok(());
        }

        let generator = self.generator()?;
        let detected = generator.predict_sentiment(prompt)?;
        println!(
            "Detected sentiment: {} (confidence {:.2})",
            detected.label.to_string().bold(),
            detected.score
        );

        let manual = self.sentiment.label();
        if let Some(label) = manual {
            println!("{}", format!("Manual override: {label}").yellow());
        }

        println!("{}", "Generating text...".dimmed());
        let text = generator.generate_text(
            prompt,
            Some(manual.unwrap_or(detected.label)),
            &self.params,
        )?;

        println!("\n{}", "Generated Text:".green().bold());
        println!("{text}\n");
        Ok(())
    }

    /// Returns `false` when the session should end.
    fn run_command(&mut self, line: &str) -> bool {
        let mut parts = line.split_whitespace();
        match (parts.next(), parts.next()) {
            (Some("/quit" | "/exit"), _) => return false,
            (Some("/sentiment"), Some(choice)) => match SentimentChoice::from_str(choice, true) {
                Ok(choice) => {
                    self.sentiment = choice;
                    println!("Sentiment: {choice:?}");
                }
                Err(e) => println!("{}", e.red()),
            },
            (Some("/model"), Some(model_id)) => {
                self.config = self.config.clone().gen_model(model_id);
                println!("Text model: {model_id}");
            }
            _ => println!(
                "Commands: /sentiment <auto|positive|negative|neutral>, /model <id>, /quit"
            ),
        }
        true
    }
}

fn interactive(session: &mut Session) -> Result<()> {
    let mut rl = DefaultEditor::new()?;
    println!(
        "{}",
        "Enter a prompt. Its sentiment steers the tone of the generated paragraph.".bold()
    );

    loop {
        match rl.readline("> ") {
            Ok(line) => {
                if line.starts_with('/') {
                    if !session.run_command(line.trim()) {
                        break;
                    }
                    continue;
                }
                if let Err(e) = rl.add_history_entry(line.as_str()) {
                    debug!(error = %e, "could not record history entry");
                }
                if let Err(e) = session.run_prompt(&line) {
                    println!("{}", format!("Error: {e}").red());
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let args = Args::parse();
    info!(?args, "starting");

    let mut session = Session {
        cache: ModelCache::new(),
        config: args.model_config(),
        params: args.sampling_params(),
        sentiment: args.sentiment,
    };

    match args.prompt.as_deref() {
        Some(prompt) => session.run_prompt(prompt),
        None => interactive(&mut session),
    }
}
