//! SGR escape decoding for captured job output.
//!
//! Only `ESC [ <digits and ;> m` is recognized. Anything else that starts with
//! an escape byte is kept as literal text so a stray byte can never swallow
//! the rest of a line.

const ESC: char = '\u{1b}';

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyledRun {
    pub text: String,
    /// Foreground color index 0-7, `None` for the terminal default.
    pub fg: Option<u8>,
    /// Background color index 0-7. Decoded but never drawn.
    pub bg: Option<u8>,
    pub bold: bool,
}

impl StyledRun {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            fg: None,
            bg: None,
            bold: false,
        }
    }

    pub fn colored(text: impl Into<String>, fg: u8) -> Self {
        Self {
            fg: Some(fg),
            ..Self::plain(text)
        }
    }

    pub fn bold(mut self) -> Self {
        self.bold = true;
        self
    }

    fn same_style(&self, style: &SgrState) -> bool {
        self.fg == style.fg && self.bg == style.bg && self.bold == style.bold
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct SgrState {
    fg: Option<u8>,
    bg: Option<u8>,
    bold: bool,
}

impl SgrState {
    fn apply(&mut self, params: &str) {
        for param in params.split(';') {
            // An empty parameter means 0, so `ESC[m` is a reset.
            let value = if param.is_empty() {
                Some(0)
            } else {
                param.parse::<u16>().ok()
            };
            match value {
                Some(0) => *self = SgrState::default(),
                Some(1) => self.bold = true,
                Some(22) => self.bold = false,
                Some(code @ 30..=37) => self.fg = Some((code - 30) as u8),
                Some(39) => self.fg = None,
                Some(code @ 40..=47) => self.bg = Some((code - 40) as u8),
                Some(49) => self.bg = None,
                _ => {}
            }
        }
    }
}

/// Parses a recognized SGR sequence starting at `start` (which holds ESC).
/// Returns the parameter text and the index just past the final `m`.
fn parse_sgr(chars: &[char], start: usize) -> Option<(String, usize)> {
    if chars.get(start + 1) != Some(&'[') {
        return None;
    }
    let mut params = String::new();
    let mut idx = start + 2;
    while let Some(&ch) = chars.get(idx) {
        match ch {
            'm' => return Some((params, idx + 1)),
            '0'..='9' | ';' => params.push(ch),
            _ => return None,
        }
        idx += 1;
    }
    None
}

pub fn decode(line: &str) -> Vec<StyledRun> {
    let chars = line.chars().collect::<Vec<char>>();
    let mut runs: Vec<StyledRun> = Vec::new();
    let mut style = SgrState::default();
    let mut idx = 0usize;

    while idx < chars.len() {
        if chars[idx] == ESC {
            if let Some((params, next)) = parse_sgr(&chars, idx) {
                style.apply(&params);
                idx = next;
                continue;
            }
        }
        match runs.last_mut() {
            Some(run) if run.same_style(&style) => run.text.push(chars[idx]),
            _ => runs.push(StyledRun {
                text: chars[idx].to_string(),
                fg: style.fg,
                bg: style.bg,
                bold: style.bold,
            }),
        }
        idx += 1;
    }

    if runs.is_empty() {
        runs.push(StyledRun::plain(""));
    }
    runs
}

/// Start of the complete SGR sequence that ends `chars`, if there is one.
/// Only called when the last char is `m`.
fn sgr_suffix_start(chars: &[char]) -> Option<usize> {
    let (_, params) = chars.split_last()?;
    let bracket = params
        .iter()
        .rposition(|ch| !matches!(ch, '0'..='9' | ';'))?;
    if params[bracket] != '[' || bracket == 0 || params[bracket - 1] != ESC {
        return None;
    }
    Some(bracket - 1)
}

/// Removes every recognized SGR sequence.
///
/// The output never contains a complete sequence, even when deleting one
/// joins the text around it into another (`ESC[` + `ESC[1m` + `m`). Each
/// pushed `m` is checked against the tail of the output, so text before the
/// splice point is never rescanned.
pub fn strip(line: &str) -> String {
    let mut out = Vec::with_capacity(line.len());
    for ch in line.chars() {
        out.push(ch);
        if ch == 'm' {
            if let Some(start) = sgr_suffix_start(&out) {
                out.truncate(start);
            }
        }
    }
    out.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bold_green_ok_decodes_to_single_run() {
        let line = "\u{1b}[1;32mOK\u{1b}[0m";
        let runs = decode(line);
        assert_eq!(
            runs,
            vec![StyledRun {
                text: "OK".to_owned(),
                fg: Some(2),
                bg: None,
                bold: true,
            }]
        );
        assert_eq!(strip(line), "OK");
    }

    #[test]
    fn plain_line_round_trips() {
        let line = "fetched 12 pages from example.org";
        assert_eq!(decode(line), vec![StyledRun::plain(line)]);
        assert_eq!(strip(line), line);
    }

    #[test]
    fn reset_splits_runs_and_restores_default() {
        let runs = decode("\u{1b}[31merror\u{1b}[0m ok");
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0], StyledRun::colored("error", 1));
        assert_eq!(runs[1], StyledRun::plain(" ok"));
    }

    #[test]
    fn empty_parameter_list_resets() {
        let runs = decode("\u{1b}[1mA\u{1b}[mB");
        assert_eq!(runs[0], StyledRun::plain("A").bold());
        assert_eq!(runs[1], StyledRun::plain("B"));
    }

    #[test]
    fn background_is_decoded_but_kept_separate_from_foreground() {
        let runs = decode("\u{1b}[44;33mwarn");
        assert_eq!(runs[0].fg, Some(3));
        assert_eq!(runs[0].bg, Some(4));
        assert_eq!(runs[0].text, "warn");
    }

    #[test]
    fn unknown_parameters_inside_sgr_are_ignored() {
        let runs = decode("\u{1b}[38;5;200;1mX");
        assert_eq!(runs, vec![StyledRun::plain("X").bold()]);
    }

    #[test]
    fn malformed_sequences_pass_through_as_text() {
        assert_eq!(strip("\u{1b}[2Kdone"), "\u{1b}[2Kdone");
        assert_eq!(strip("tail \u{1b}[31"), "tail \u{1b}[31");
        assert_eq!(strip("lone \u{1b} byte"), "lone \u{1b} byte");
        let runs = decode("\u{1b}[2Kdone");
        assert_eq!(runs, vec![StyledRun::plain("\u{1b}[2Kdone")]);
    }

    #[test]
    fn strip_is_idempotent_even_when_removal_splices_a_sequence() {
        let samples = [
            "\u{1b}[\u{1b}[1mm text",
            "\u{1b}[1;32mOK\u{1b}[0m",
            "a\u{1b}[31",
            "\u{1b}[\u{1b}[\u{1b}[0mmm",
        ];
        for sample in samples {
            let once = strip(sample);
            assert_eq!(strip(&once), once, "sample {sample:?}");
        }
        assert_eq!(strip("\u{1b}[\u{1b}[1mm text"), " text");
    }

    #[test]
    fn strip_handles_deeply_nested_openers() {
        let depth = 50_000;
        let line = format!("{}{}tail", "\u{1b}[1;".repeat(depth), "m".repeat(depth));
        let started = std::time::Instant::now();
        assert_eq!(strip(&line), "tail");
        assert!(started.elapsed() < std::time::Duration::from_secs(5));

        let kept = format!("x{}m", "1".repeat(depth));
        assert_eq!(strip(&kept), kept);
    }

    #[test]
    fn escape_only_line_yields_one_empty_run() {
        assert_eq!(decode("\u{1b}[0m"), vec![StyledRun::plain("")]);
        assert_eq!(decode(""), vec![StyledRun::plain("")]);
    }

    #[test]
    fn decoding_carries_no_state_between_lines() {
        let first = decode("\u{1b}[1;31munterminated style");
        assert!(first[0].bold);
        let second = decode("next line");
        assert_eq!(second, vec![StyledRun::plain("next line")]);
    }
}
