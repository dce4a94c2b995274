use std::io::{self, BufRead, Write};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Answer {
    Capture,
    Skip,
    Finish,
}

/// Operator confirmation for calibration captures, one line per answer.
pub struct Prompt<R> {
    input: R,
}

impl Prompt<io::StdinLock<'static>> {
    pub fn stdin() -> Self {
        Self::new(io::stdin().lock())
    }
}

impl<R: BufRead> Prompt<R> {
    pub fn new(input: R) -> Self {
        Self { input }
    }

    /// Empty line or `c` captures, `s` skips, `q` or end of input finishes.
    /// Anything else asks again.
    pub fn ask(&mut self, what: &str) -> io::Result<Answer> {
        loop {
            eprint!("{what}: board found. [enter] capture, s skip, q finish > ");
            io::stderr().flush()?;
            let mut line = String::new();
            if self.input.read_line(&mut line)? == 0 {
                return Ok(Answer::Finish);
            }
            match line.trim() {
                "" | "c" => return Ok(Answer::Capture),
                "s" => return Ok(Answer::Skip),
                "q" => return Ok(Answer::Finish),
                other => eprintln!("unrecognised answer '{other}'"),
            }
        }
    }
}
