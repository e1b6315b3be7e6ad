/// User-facing console messages (banners, prompts feedback, errors).
///
/// Diagnostics go through `tracing`; this is only for what the person at the
/// terminal is meant to read.

use std::io::IsTerminal;

const CENTER_SPACING: usize = 60;

const RESET: &str = "\x1b[0m";
const FG_WHITE: &str = "\x1b[37m";
const FG_CYAN: &str = "\x1b[36m";
const FG_RED: &str = "\x1b[31m";
const FG_GREEN: &str = "\x1b[32m";
const FG_YELLOW: &str = "\x1b[33m";
const FG_BLUE: &str = "\x1b[34m";
const BG_BLUE: &str = "\x1b[44m";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Title,
    Regular,
    Info,
    Error,
    Success,
    Warning,
    Divider,
}

#[derive(Debug, Clone, Copy)]
pub struct Console {
    color: bool,
}

impl Console {
    pub fn new(color: bool) -> Self {
        Self { color }
    }

    /// Colour when stdout is a terminal and `NO_COLOR` is unset.
    pub fn detect() -> Self {
        Self::new(std::io::stdout().is_terminal() && std::env::var_os("NO_COLOR").is_none())
    }

    pub fn render(&self, kind: Kind, msg: &str) -> String {
        let paint = |code: &str, text: String| {
            if self.color {
                format!("{code}{text}{RESET}")
            } else {
                text
            }
        };
        let rule = "-".repeat(CENTER_SPACING);
        match kind {
            Kind::Title => {
                let banner = if self.color {
                    format!("{BG_BLUE}{FG_WHITE} {:^CENTER_SPACING$} {RESET}", msg)
                } else {
                    format!(" {:^CENTER_SPACING$} ", msg)
                };
                format!("\n{}\n{}\n", banner, paint(FG_BLUE, rule))
            }
            Kind::Regular => paint(FG_WHITE, msg.to_string()),
            Kind::Info => paint(FG_CYAN, format!("ℹ  {msg}")),
            Kind::Error => paint(FG_RED, format!("✖  Error: {msg}")),
            Kind::Success => paint(FG_GREEN, format!("✔  Success: {msg}")),
            Kind::Warning => paint(FG_YELLOW, format!("⚠  Warning: {msg}")),
            Kind::Divider => format!("{}\n", paint(FG_BLUE, rule)),
        }
    }

    pub fn say(&self, kind: Kind, msg: &str) {
        let line = self.render(kind, msg);
        if kind == Kind::Error {
            eprintln!("{}", line);
        } else {
            println!("{}", line);
        }
    }

    pub fn title(&self, msg: &str) {
        self.say(Kind::Title, msg)
    }

    pub fn regular(&self, msg: &str) {
        self.say(Kind::Regular, msg)
    }

    pub fn info(&self, msg: &str) {
        self.say(Kind::Info, msg)
    }

    pub fn error(&self, msg: &str) {
        self.say(Kind::Error, msg)
    }

    pub fn success(&self, msg: &str) {
        self.say(Kind::Success, msg)
    }

    pub fn warning(&self, msg: &str) {
        self.say(Kind::Warning, msg)
    }

    pub fn divider(&self) {
        self.say(Kind::Divider, "")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_rendering() {
        let c = Console::new(false);
        assert_eq!(c.render(Kind::Info, "hi"), "ℹ  hi");
        assert_eq!(c.render(Kind::Error, "bad"), "✖  Error: bad");
        assert_eq!(c.render(Kind::Success, "ok"), "✔  Success: ok");
        assert_eq!(c.render(Kind::Warning, "hm"), "⚠  Warning: hm");
        assert_eq!(c.render(Kind::Divider, ""), format!("{}\n", "-".repeat(60)));
    }

    #[test]
    fn test_title_is_centered() {
        let c = Console::new(false);
        let out = c.render(Kind::Title, "Secure Home");
        let banner = out.lines().nth(1).unwrap();
        assert_eq!(banner.len(), 62);
        assert_eq!(banner.trim(), "Secure Home");
    }

    #[test]
    fn test_colored_rendering_resets() {
        let c = Console::new(true);
        let out = c.render(Kind::Warning, "x");
        assert!(out.starts_with(FG_YELLOW));
        assert!(out.ends_with(RESET));
    }
}
