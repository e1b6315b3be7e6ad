/// First-run configuration wizard behind `secure-home init`.
///
/// Reads answers line by line from any `BufRead` and writes prompts to any
/// `Write`, so the flow can be driven from a script in tests.

use std::fmt::Display;
use std::io::{BufRead, Write};
use std::path::Path;
use std::str::FromStr;

use anyhow::{bail, Result};

use crate::config::{self, StoredConfig};
use crate::console::{Console, Kind};

pub struct Wizard<'a, R, W> {
    input: R,
    output: W,
    console: Console,
    camera_available: &'a dyn Fn(u32) -> bool,
}

impl<'a, R: BufRead, W: Write> Wizard<'a, R, W> {
    pub fn new(
        input: R,
        output: W,
        console: Console,
        camera_available: &'a dyn Fn(u32) -> bool,
    ) -> Self {
        Self { input, output, console, camera_available }
    }

    /// Walk through every setting, starting from `defaults`.
    pub fn run(&mut self, defaults: StoredConfig) -> Result<StoredConfig> {
        let mut cfg = defaults;

        self.say(Kind::Divider, "")?;
        cfg.camera_id = loop {
            self.say(Kind::Info, "Enter the camera ID (usually 0 for built-in webcam): ")?;
            let id: i64 = self.prompt("Camera ID", cfg.camera_id)?;
            let Ok(id) = config::validate_camera_id(id) else {
                self.say(Kind::Error, "Camera ID must be 0 or greater.")?;
                continue;
            };
            self.say(Kind::Info, "Checking camera port availability...")?;
            if (self.camera_available)(id) {
                self.say(Kind::Success, &format!("Camera (ID: {}) is available!", id))?;
                break i64::from(id);
            }
            self.say(
                Kind::Error,
                &format!("Camera (ID: {}) is not available. Please try a different ID.", id),
            )?;
        };

        self.say(Kind::Divider, "")?;
        cfg.image_path = loop {
            self.say(Kind::Info, "Enter the directory for storing acceptable faces: ")?;
            let dir: String = self.prompt("Directory", cfg.image_path.clone())?;
            let path = Path::new(&dir);
            if !path.exists() {
                let question = format!("Directory '{}' does not exist. Create it?", dir);
                if !self.confirm(&question, true)? {
                    continue;
                }
                std::fs::create_dir_all(path)?;
                self.say(Kind::Success, &format!("Created directory: {}", dir))?;
            }
            if path.is_dir() {
                self.say(Kind::Success, "Directory confirmed!")?;
                break dir;
            }
            self.say(Kind::Error, "Invalid directory. Please try again.")?;
        };

        self.say(
            Kind::Info,
            "Enter the phone number to receive alerts (with country code, e.g., +1234567890): ",
        )?;
        cfg.alert_phone_number = self.prompt("Phone Number", cfg.alert_phone_number.clone())?;

        cfg.alert_cooldown = loop {
            let secs: i64 = self.prompt("Alert cooldown (in seconds)", cfg.alert_cooldown)?;
            match config::validate_cooldown(secs) {
                Ok(_) => break secs,
                Err(e) => self.say(Kind::Error, &e.to_string())?,
            }
        };

        cfg.unknown_threshold = loop {
            let n: i64 = self.prompt(
                "Number of consecutive unknown detections before alerting",
                cfg.unknown_threshold,
            )?;
            match config::validate_threshold(n) {
                Ok(_) => break n,
                Err(e) => self.say(Kind::Error, &e.to_string())?,
            }
        };

        Ok(cfg)
    }

    fn say(&mut self, kind: Kind, msg: &str) -> Result<()> {
        writeln!(self.output, "{}", self.console.render(kind, msg))?;
        Ok(())
    }

    fn read_line(&mut self) -> Result<String> {
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            bail!("input closed before setup finished");
        }
        Ok(line.trim().to_string())
    }

    /// `label [default]: `. An empty answer keeps the default; bad input re-asks.
    fn prompt<T>(&mut self, label: &str, default: T) -> Result<T>
    where
        T: FromStr + Display + Clone,
    {
        loop {
            write!(self.output, "{} [{}]: ", label, default)?;
            self.output.flush()?;
            let answer = self.read_line()?;
            if answer.is_empty() {
                return Ok(default);
            }
            match answer.parse() {
                Ok(v) => return Ok(v),
                Err(_) => self.say(Kind::Error, &format!("'{}' is not a valid value.", answer))?,
            }
        }
    }

    fn confirm(&mut self, question: &str, default: bool) -> Result<bool> {
        let hint = if default { "Y/n" } else { "y/N" };
        loop {
            write!(self.output, "{} [{}]: ", question, hint)?;
            self.output.flush()?;
            match self.read_line()?.to_ascii_lowercase().as_str() {
                "" => return Ok(default),
                "y" | "yes" => return Ok(true),
                "n" | "no" => return Ok(false),
                _ => self.say(Kind::Error, "Please answer y or n.")?,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn run_script(
        script: &str,
        available: &dyn Fn(u32) -> bool,
        defaults: StoredConfig,
    ) -> (Result<StoredConfig>, String) {
        let mut out = Vec::new();
        let input = Cursor::new(script.to_string());
        let result = Wizard::new(input, &mut out, Console::new(false), available).run(defaults);
        (result, String::from_utf8(out).unwrap())
    }

    #[test]
    fn test_accepts_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let defaults = StoredConfig {
            image_path: dir.path().display().to_string(),
            ..StoredConfig::default()
        };
        let (result, _) = run_script("\n\n\n\n\n", &|_| true, defaults.clone());
        assert_eq!(result.unwrap(), defaults);
    }

    #[test]
    fn test_reasks_unavailable_camera_and_bad_numbers() {
        let dir = tempfile::TempDir::new().unwrap();
        let faces = dir.path().join("faces");
        let script = format!(
            "3\nabc\n1\n{}\n\n+15550001111\n-1\n120\n0\n2\n",
            faces.display()
        );
        let (result, out) = run_script(&script, &|id| id == 1, StoredConfig::default());
        let cfg = result.unwrap();

        assert_eq!(cfg.camera_id, 1);
        assert_eq!(cfg.image_path, faces.display().to_string());
        assert!(faces.is_dir());
        assert_eq!(cfg.alert_phone_number, "+15550001111");
        assert_eq!(cfg.alert_cooldown, 120);
        assert_eq!(cfg.unknown_threshold, 2);
        assert!(out.contains("Camera (ID: 3) is not available"));
        assert!(out.contains("'abc' is not a valid value."));
        assert!(out.contains("Created directory"));
    }

    #[test]
    fn test_declined_directory_is_asked_again() {
        let dir = tempfile::TempDir::new().unwrap();
        let missing = dir.path().join("nope");
        let script = format!("\n{}\nn\n{}\n\n\n\n", missing.display(), dir.path().display());
        let (result, _) = run_script(&script, &|_| true, StoredConfig::default());
        assert_eq!(result.unwrap().image_path, dir.path().display().to_string());
        assert!(!missing.exists());
    }

    #[test]
    fn test_closed_input_aborts() {
        let (result, _) = run_script("0\n", &|_| true, StoredConfig::default());
        assert!(result.is_err());
    }

    #[test]
    fn test_file_path_is_not_a_directory() {
        let dir = tempfile::TempDir::new().unwrap();
        let file = dir.path().join("face.png");
        std::fs::write(&file, b"x").unwrap();
        let script = format!("\n{}\n{}\n\n\n\n", file.display(), dir.path().display());
        let (result, out) = run_script(&script, &|_| true, StoredConfig::default());
        assert!(result.is_ok());
        assert!(out.contains("Invalid directory"));
    }
}
