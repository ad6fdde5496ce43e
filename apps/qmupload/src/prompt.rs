//! Interactive confirmation prompts.

use std::io::{self, BufRead, Write};

/// Line-based prompts over any input/output pair.
pub struct Prompter<R, W> {
    input: R,
    output: W,
}

impl Prompter<io::StdinLock<'static>, io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> Prompter<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    /// Asks a yes/no question about `value`. An empty answer, or anything
    /// other than yes or no, takes `default`.
    pub fn confirm(&mut self, prompt: &str, value: &str, default: bool) -> io::Result<bool> {
        let hint = if default { "y" } else { "n" };
        write!(self.output, "{prompt} \"{value}\" (y/n) [{hint}]: ")?;
        self.output.flush()?;
        let answer = self.read_line()?.to_lowercase();
        Ok(match answer.as_str() {
            "y" | "yes" => true,
            "n" | "no" => false,
            _ => default,
        })
    }

    /// Asks for a value until a non-empty one is entered.
    pub fn ask(&mut self, prompt: &str) -> io::Result<String> {
        loop {
            write!(self.output, "{prompt}")?;
            self.output.flush()?;
            let answer = self.read_line()?;
            if !answer.is_empty() {
                return Ok(answer);
            }
        }
    }

    /// Lists `choices` numbered from 1 and asks for one until a valid
    /// number is entered.
    pub fn choose<'c>(&mut self, prompt: &str, choices: &'c [String]) -> io::Result<&'c str> {
        loop {
            for (i, choice) in choices.iter().enumerate() {
                writeln!(self.output, "[{}] {choice}", i + 1)?;
            }
            write!(self.output, "{prompt}: ")?;
            self.output.flush()?;
            let answer = self.read_line()?;
            if let Ok(n) = answer.parse::<usize>()
                && (1..=choices.len()).contains(&n)
            {
                return Ok(&choices[n - 1]);
            }
            writeln!(self.output)?;
        }
    }

    pub fn say(&mut self, line: &str) -> io::Result<()> {
        writeln!(self.output, "{line}")
    }

    fn read_line(&mut self) -> io::Result<String> {
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "input closed while waiting for an answer",
            ));
        }
        Ok(line.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn prompter(input: &str) -> Prompter<Cursor<Vec<u8>>, Vec<u8>> {
        Prompter::new(Cursor::new(input.as_bytes().to_vec()), Vec::new())
    }

    #[test]
    fn confirm_answers() {
        let mut p = prompter("y\nNO\n\nmaybe\n");
        assert!(p.confirm("Use QM server", "qm1", true).unwrap());
        assert!(!p.confirm("Use QM server", "qm1", true).unwrap());
        assert!(p.confirm("Use QM server", "qm1", true).unwrap());
        assert!(!p.confirm("Use QM server", "qm1", false).unwrap());

        let shown = String::from_utf8(p.output).unwrap();
        assert!(shown.starts_with("Use QM server \"qm1\" (y/n) [y]: "));
    }

    #[test]
    fn ask_skips_blank_lines() {
        let mut p = prompter("\n  \nalice\n");
        assert_eq!(p.ask("Enter user name: ").unwrap(), "alice");
    }

    #[test]
    fn choose_retries_until_valid() {
        let files = vec!["a.img".to_string(), "b.qcow2".to_string()];
        let mut p = prompter("0\nx\n2\n");
        assert_eq!(p.choose("choose file to download", &files).unwrap(), "b.qcow2");
        let shown = String::from_utf8(p.output).unwrap();
        assert_eq!(shown.matches("[1] a.img").count(), 3);
    }

    #[test]
    fn closed_input_is_an_error() {
        let mut p = prompter("");
        let err = p.ask("QM server: ").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }
}
