use anyhow::Result;
use facegate_core::{CapturedFrame, FrameSource};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

/// Line-oriented operator input.
pub trait Ask {
    /// Print `message` and read one answer, trimmed. EOF reads as empty.
    async fn ask(&mut self, message: &str) -> Result<String>;
}

/// Operator input on stdin.
pub struct Console {
    lines: Lines<BufReader<Stdin>>,
}

impl Console {
    pub fn new() -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
        }
    }
}

impl Ask for Console {
    async fn ask(&mut self, message: &str) -> Result<String> {
        print!("{message}");
        std::io::stdout().flush()?;
        let line = self.lines.next_line().await?.unwrap_or_default();
        Ok(line.trim().to_string())
    }
}

/// Ask whether the frame just captured should be thrown away. Only `r`
/// (either case) means retake; anything else, EOF included, keeps it.
pub async fn wants_retake<A: Ask>(console: &mut A, question: &str) -> Result<bool> {
    let answer = console.ask(&format!("{question} [Y/r to retake] ")).await?;
    Ok(answer.eq_ignore_ascii_case("r"))
}

/// Capture the `label` face from `source`, retaking until the operator
/// keeps one.
pub async fn capture_confirmed<S, A>(source: &S, console: &mut A, label: &str) -> Result<CapturedFrame>
where
    S: FrameSource,
    A: Ask,
{
    loop {
        console
            .ask(&format!("Press Enter to capture the {label} face"))
            .await?;
        let frame = source.capture().await?;
        println!("Captured {}x{} frame", frame.width, frame.height);
        if !wants_retake(console, "Use this face?").await? {
            return Ok(frame);
        }
        tracing::debug!(label, "frame discarded; retaking");
    }
}
