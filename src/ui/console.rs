use crate::wizard::{Answers, Field, FieldKind, Prompt, WizardUi};
use async_trait::async_trait;
use std::fmt::Write as _;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::debug;

/// Line-based wizard renderer; an empty line accepts the default.
pub struct ConsoleUi<R> {
    lines: Lines<R>,
}

impl ConsoleUi<BufReader<Stdin>> {
    pub fn stdin() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()))
    }
}

impl<R: AsyncBufRead + Unpin + Send> ConsoleUi<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
        }
    }

    /// `None` on end of input.
    async fn read_line(&mut self) -> Option<String> {
        match self.lines.next_line().await {
            Ok(line) => line,
            Err(e) => {
                debug!("Console input failed: {}", e);
                None
            }
        }
    }

    /// Yes/no question outside the wizard.
    pub async fn confirm(&mut self, question: &str, default: bool) -> bool {
        println!("{} [{}]", question, if default { "Y/n" } else { "y/N" });
        match self.read_line().await {
            Some(line) => match line.trim().to_ascii_lowercase().as_str() {
                "" => default,
                "y" | "yes" => true,
                _ => false,
            },
            None => default,
        }
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> WizardUi for ConsoleUi<R> {
    async fn ask(&mut self, prompt: &Prompt) -> Option<Answers> {
        print!("{}", render_header(prompt));

        let mut answers = Answers::new();
        for field in &prompt.fields {
            println!("{}", render_field(field));
            let line = self.read_line().await?;
            if let Some(value) = interpret(field, &line) {
                answers.insert(field.key.to_string(), value);
            }
        }
        Some(answers)
    }

    fn notify(&mut self, message: &str) {
        println!("{}", message);
    }
}

pub fn render_header(prompt: &Prompt) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "\n== {} ==", prompt.title);
    for (key, value) in &prompt.placeholders {
        let _ = writeln!(out, "  {}: {}", key, value);
    }
    for error in &prompt.errors {
        let _ = writeln!(out, "  ! {}", error);
    }
    out
}

pub fn render_field(field: &Field) -> String {
    let default = field.default.as_deref().unwrap_or("");
    match &field.kind {
        FieldKind::Text => format!("{} [{}]:", field.label, default),
        FieldKind::Toggle => format!("{} (y/n) [{}]:", field.label, default),
        FieldKind::Choice(options) => {
            let mut out = format!("{}:", field.label);
            for (i, option) in options.iter().enumerate() {
                let _ = write!(out, "\n  {}) {}", i + 1, option);
            }
            let _ = write!(out, "\n[{}]:", default);
            out
        }
    }
}

/// Maps one typed line to the answer value.
///
/// Blank input falls back to the default; choices accept the 1-based
/// option number as well as the option text.
pub fn interpret(field: &Field, line: &str) -> Option<String> {
    let line = line.trim();
    if line.is_empty() {
        return field.default.clone();
    }

    if let FieldKind::Choice(options) = &field.kind {
        if let Ok(number) = line.parse::<usize>() {
            if let Some(option) = number.checked_sub(1).and_then(|i| options.get(i)) {
                return Some(option.clone());
            }
        }
    }
    Some(line.to_string())
}
