//! Verbosity-gated, ANSI-colored progress and error reporting.
//!
//! Grounded on `reporter.py`/`ansi.py`: the original keys a dict of named
//! ANSI escapes off a `colors_dict` option and looks colors up by name at
//! print time. This keeps the same named-color interface but resolves the
//! escape codes once, from a detected [`ColorTier`], rather than threading a
//! dict through the options store.

use std::io::IsTerminal;
use std::path::Path;

/// How much color the output stream can render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorTier {
    /// 24-bit `ESC[38;2;r;g;bm` sequences.
    TrueColor,
    /// 256-color palette.
    Ansi256,
    /// Plain 8/16-color escapes, safe almost everywhere a tty exists.
    Named,
    /// No escapes at all.
    None,
}

impl ColorTier {
    /// Detects the tier for `stream` from environment variables and whether
    /// the stream is a tty. Never shells out.
    pub fn detect(stream: &impl IsTerminal) -> ColorTier {
        if std::env::var_os("NO_COLOR").is_some() {
            return ColorTier::None;
        }
        if !stream.is_terminal() {
            return ColorTier::None;
        }
        let colorterm = std::env::var("COLORTERM").unwrap_or_default();
        if colorterm == "truecolor" || colorterm == "24bit" {
            return ColorTier::TrueColor;
        }
        let term = std::env::var("TERM").unwrap_or_default();
        if term.contains("256color") {
            return ColorTier::Ansi256;
        }
        if term == "dumb" || term.is_empty() {
            return ColorTier::None;
        }
        ColorTier::Named
    }
}

/// Named semantic colors used throughout phase/step reporting. Mirrors the
/// `colors_dict` keys the original looks up: a light/dark pair per category
/// plus two result colors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    Off,
    PathDk,
    PathLt,
    PhaseDk,
    PhaseLt,
    StepDk,
    StepLt,
    ActionDk,
    ActionLt,
    FileTypeDk,
    FileTypeLt,
    ShellCmd,
    Success,
    Fail,
}

fn rgb_fg(r: u8, g: u8, b: u8) -> String {
    format!("\x1b[38;2;{r};{g};{b}m")
}

fn named_fg(code: u8) -> String {
    format!("\x1b[{code}m")
}

/// Resolves a [`Color`] to its escape sequence for a given [`ColorTier`].
/// Returns the empty string at [`ColorTier::None`].
pub fn code(tier: ColorTier, color: Color) -> String {
    if tier == ColorTier::None {
        return String::new();
    }
    if color == Color::Off {
        return "\x1b[0m".to_string();
    }
    match tier {
        ColorTier::TrueColor | ColorTier::Ansi256 => match color {
            Color::PathDk => rgb_fg(90, 90, 90),
            Color::PathLt => rgb_fg(200, 200, 255),
            Color::PhaseDk => rgb_fg(100, 60, 0),
            Color::PhaseLt => rgb_fg(255, 180, 60),
            Color::StepDk => rgb_fg(70, 70, 70),
            Color::StepLt => rgb_fg(180, 180, 180),
            Color::ActionDk => rgb_fg(60, 60, 100),
            Color::ActionLt => rgb_fg(140, 140, 255),
            Color::FileTypeDk => rgb_fg(60, 90, 60),
            Color::FileTypeLt => rgb_fg(140, 220, 140),
            Color::ShellCmd => rgb_fg(150, 150, 200),
            Color::Success => rgb_fg(0, 255, 0),
            Color::Fail => rgb_fg(255, 0, 0),
            Color::Off => unreachable!(),
        },
        ColorTier::Named => match color {
            Color::PathDk | Color::StepDk | Color::ActionDk | Color::PhaseDk | Color::FileTypeDk => named_fg(90),
            Color::PathLt | Color::StepLt | Color::ActionLt | Color::PhaseLt | Color::FileTypeLt | Color::ShellCmd => {
                named_fg(37)
            }
            Color::Success => named_fg(32),
            Color::Fail => named_fg(31),
            Color::Off => unreachable!(),
        },
        ColorTier::None => unreachable!(),
    }
}

/// Prints formatted reports for phase/step/action progress, gated by
/// `verbosity` and colorized according to `tier`.
///
/// Grounded on `Reporter`.
pub struct Reporter {
    pub tier: ColorTier,
    pub verbosity: i64,
    pub report_relative_paths: bool,
}

impl Reporter {
    pub fn new(tier: ColorTier, verbosity: i64) -> Self {
        Reporter { tier, verbosity, report_relative_paths: true }
    }

    fn c(&self, color: Color) -> String {
        code(self.tier, color)
    }

    /// Colorizes a path, optionally relativizing it to the current directory.
    pub fn color_path(&self, path: &Path) -> String {
        let path = if self.report_relative_paths {
            pathdiff(path)
        } else {
            path.to_path_buf()
        };
        let parent = path.parent().map(|p| p.display().to_string()).unwrap_or_default();
        let name = path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
        format!("{}{parent}/{}{name}{}", self.c(Color::PathDk), self.c(Color::PathLt), self.c(Color::Off))
    }

    /// Colorizes a list of paths, or `[...]` when there's more than one.
    pub fn format_path_list(&self, paths: &[impl AsRef<Path>]) -> String {
        match paths {
            [] => String::new(),
            [one] => self.color_path(one.as_ref()),
            _ => format!("{}[{}...{}]{}", self.c(Color::PathDk), self.c(Color::PathLt), self.c(Color::PathDk), self.c(Color::Off)),
        }
    }

    fn color_phase(&self, phase_type: &str, phase_full_name: &str) -> String {
        format!(
            "{}{phase_full_name}{} ({}{phase_type}{}){}",
            self.c(Color::PhaseLt),
            self.c(Color::PhaseDk),
            self.c(Color::PhaseLt),
            self.c(Color::PhaseDk),
            self.c(Color::Off),
        )
    }

    fn format_action(&self, action_name: &str) -> String {
        format!("{}action: {}{action_name}{}", self.c(Color::ActionDk), self.c(Color::ActionLt), self.c(Color::Off))
    }

    fn format_phase(&self, phase_type: &str, phase_full_name: &str) -> String {
        format!("{}phase: {}{}:{}", self.c(Color::PhaseDk), self.color_phase(phase_type, phase_full_name), self.c(Color::PhaseDk), self.c(Color::Off))
    }

    /// Reports the start of a top-level action on a phase. Only prints at
    /// `verbosity > 0`.
    pub fn report_action_phase_start(&self, action: &str, phase_type: &str, phase_full_name: &str) {
        if self.verbosity > 0 {
            println!("{}{} - {}", self.format_action(action), self.c(Color::ActionDk), self.format_phase(phase_type, phase_full_name));
        }
    }

    /// Reports the end of a top-level action. Successes print only above
    /// `verbosity > 1`; failures print above `verbosity > 0`.
    pub fn report_action_phase_end(&self, succeeded: bool) {
        if succeeded && self.verbosity > 1 {
            println!("        {}... action {}succeeded{}", self.c(Color::ActionDk), self.c(Color::Success), self.c(Color::Off));
        } else if !succeeded && self.verbosity > 0 {
            println!("        {}... action {}failed{}", self.c(Color::ActionDk), self.c(Color::Fail), self.c(Color::Off));
        }
    }

    /// Reports the start of one step, given its declared inputs/outputs.
    pub fn report_step_start(&self, step_name: &str, inputs: &[impl AsRef<Path>], outputs: &[impl AsRef<Path>]) {
        if self.verbosity == 0 {
            return;
        }
        let inputs = self.format_path_list(inputs);
        let outputs = self.format_path_list(outputs);
        if !inputs.is_empty() || !outputs.is_empty() {
            print!(
                "{}{step_name}{}: {inputs}{} -> {}{outputs}{}",
                self.c(Color::StepLt),
                self.c(Color::StepDk),
                self.c(Color::StepDk),
                self.c(Color::StepLt),
                self.c(Color::Off),
            );
        }
    }

    /// Reports one step's result. At `verbosity > 1` the shell command is
    /// echoed first (unless the step was already up to date).
    pub fn report_step_end(&self, command: &str, succeeded: bool, message: &str, notes: Option<&str>) {
        if message != crate::step::ResultCode::AlreadyUpToDate.name() && self.verbosity > 1 && !command.is_empty() {
            print!("\n{}{command}{}", self.c(Color::ShellCmd), self.c(Color::Off));
        }
        if self.verbosity > 0 {
            let color = if succeeded { self.c(Color::Success) } else { self.c(Color::Fail) };
            println!(" - {color}{message}{}", self.c(Color::Off));
        }
        if !succeeded {
            if let Some(notes) = notes {
                eprintln!("{notes}");
            }
        }
    }

    /// Reports an error string against a phase, regardless of verbosity.
    pub fn report_error(&self, action: &str, phase_type: &str, phase_full_name: &str, err: &str) {
        println!("{}{} - {}", self.format_action(action), self.c(Color::ActionDk), self.format_phase(phase_type, phase_full_name));
        println!("{err}");
    }
}

/// Makes `path` relative to the current directory when it's a descendant of
/// it; otherwise returns it unchanged. Not a general-purpose `..`-climbing
/// relativizer, matching `relpath`'s common case for reported build paths,
/// which are almost always under the project root.
fn pathdiff(path: &Path) -> std::path::PathBuf {
    match std::env::current_dir() {
        Ok(cwd) => path.strip_prefix(&cwd).map(|p| p.to_path_buf()).unwrap_or_else(|_| path.to_path_buf()),
        Err(_) => path.to_path_buf(),
    }
}
