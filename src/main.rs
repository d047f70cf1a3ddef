use std::fs;
use std::path::PathBuf;
use anyhow::{Context, Result};
use clap::Parser;
use crossfill::{find_fill_with_options, render_grid, FillFailure, FillOptions, Puzzle, WordList};
use instant::Duration;
use log::info;

/// Fill a crossword grid from a word list.
#[derive(Parser, Debug)]
#[command(name = "crossfill", version, about)]
struct Args {
    /// Grid template: `#` for blocks, `_` or `.` for open cells, letters for pre-filled cells
    structure: PathBuf,

    /// Word list, one word per line
    words: PathBuf,

    /// Also write the filled grid to this file
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Don't re-establish arc consistency after each choice during search
    #[arg(long)]
    no_inference: bool,

    /// Give up after this many seconds
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let template = fs::read_to_string(&args.structure)
        .with_context(|| format!("failed to read grid template {}", args.structure.display()))?;
    let puzzle = Puzzle::from_template(&template)
        .with_context(|| format!("failed to parse grid template {}", args.structure.display()))?;

    let word_text = fs::read_to_string(&args.words)
        .with_context(|| format!("failed to read word list {}", args.words.display()))?;
    let words = WordList::from_text(&word_text)
        .with_context(|| format!("failed to parse word list {}", args.words.display()))?;

    info!("loaded {} slots and {} words", puzzle.slots().len(), words.len());

    let options = FillOptions {
        inference: !args.no_inference,
        deadline: args.timeout.map(Duration::from_secs),
    };

    match find_fill_with_options(&puzzle, &words, &options) {
        Ok(result) => {
            info!("{:?}", result.statistics);

            let display_grid = render_grid(&puzzle, &words, &result.assignment);
            println!("{}", display_grid);

            if let Some(output) = &args.output {
                fs::write(output, display_grid + "\n")
                    .with_context(|| format!("failed to write {}", output.display()))?;
                info!("written fill to {}", output.display());
            }
        }
        Err(FillFailure::NoSolution) => println!("No solution."),
        Err(failure) => return Err(failure.into()),
    }

    Ok(())
}
