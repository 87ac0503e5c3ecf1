use crate::config::TeleprompterConfig;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeleprompterState {
    Ready,
    Scrolling,
    Paused,
    Finished,
}

impl fmt::Display for TeleprompterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TeleprompterState::Ready => write!(f, "ready"),
            TeleprompterState::Scrolling => write!(f, "scrolling"),
            TeleprompterState::Paused => write!(f, "paused"),
            TeleprompterState::Finished => write!(f, "finished"),
        }
    }
}

/// Script pacing at a words-per-minute rate
///
/// Tick-driven: the caller advances it with elapsed time, so pacing stays
/// deterministic and can follow the recording clock.
pub struct Teleprompter {
    lines: Vec<String>,
    /// Line index of every word, in reading order
    word_lines: Vec<usize>,
    words_per_minute: u32,
    position: f64,
    state: TeleprompterState,
}

impl Teleprompter {
    pub fn new(script: &str, words_per_minute: u32) -> Self {
        let lines: Vec<String> = script.lines().map(|l| l.trim().to_string()).collect();
        let word_lines = lines
            .iter()
            .enumerate()
            .flat_map(|(index, line)| std::iter::repeat(index).take(line.split_whitespace().count()))
            .collect();

        Self {
            lines,
            word_lines,
            words_per_minute: words_per_minute.max(1),
            position: 0.0,
            state: TeleprompterState::Ready,
        }
    }

    pub fn from_config(script: &str, config: &TeleprompterConfig) -> Self {
        Self::new(script, config.words_per_minute)
    }

    pub fn state(&self) -> TeleprompterState {
        self.state
    }

    pub fn words_per_minute(&self) -> u32 {
        self.words_per_minute
    }

    pub fn word_count(&self) -> usize {
        self.word_lines.len()
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Time to read the whole script at the current rate
    pub fn estimated_duration(&self) -> Duration {
        Duration::from_secs_f64(self.word_count() as f64 * 60.0 / self.words_per_minute as f64)
    }

    /// Time left at the current rate
    pub fn remaining(&self) -> Duration {
        let left = (self.word_count() as f64 - self.position).max(0.0);
        Duration::from_secs_f64(left * 60.0 / self.words_per_minute as f64)
    }

    pub fn start(&mut self) {
        match self.state {
            TeleprompterState::Ready | TeleprompterState::Paused => {
                if self.word_count() == 0 {
                    self.state = TeleprompterState::Finished;
                    return;
                }
                info!(
                    "Teleprompter scrolling {} words at {} wpm",
                    self.word_count(),
                    self.words_per_minute
                );
                self.state = TeleprompterState::Scrolling;
            }
            TeleprompterState::Scrolling | TeleprompterState::Finished => {}
        }
    }

    pub fn pause(&mut self) {
        if self.state == TeleprompterState::Scrolling {
            self.state = TeleprompterState::Paused;
            debug!("Teleprompter paused at word {:.1}", self.position);
        }
    }

    pub fn resume(&mut self) {
        if self.state == TeleprompterState::Paused {
            self.state = TeleprompterState::Scrolling;
        }
    }

    pub fn reset(&mut self) {
        self.position = 0.0;
        self.state = TeleprompterState::Ready;
    }

    /// Change the rate; the current position is kept
    pub fn set_speed(&mut self, words_per_minute: u32) {
        self.words_per_minute = words_per_minute.max(1);
        debug!("Teleprompter speed set to {} wpm", self.words_per_minute);
    }

    /// Advance by `elapsed` while scrolling; returns true when the current line changed
    pub fn tick(&mut self, elapsed: Duration) -> bool {
        if self.state != TeleprompterState::Scrolling {
            return false;
        }

        let before = self.current_line_index();
        self.position += elapsed.as_secs_f64() * self.words_per_minute as f64 / 60.0;
        if self.position >= self.word_count() as f64 {
            self.position = self.word_count() as f64;
            self.state = TeleprompterState::Finished;
            info!("Teleprompter reached the end of the script");
        }
        before != self.current_line_index()
    }

    /// Fraction of the script read, 0.0 to 1.0
    pub fn progress(&self) -> f64 {
        match self.word_count() {
            0 => 1.0,
            total => self.position / total as f64,
        }
    }

    /// Word being read, or `None` once finished
    pub fn current_word_index(&self) -> Option<usize> {
        let index = self.position.floor() as usize;
        (index < self.word_count()).then_some(index)
    }

    pub fn current_line_index(&self) -> Option<usize> {
        self.current_word_index().map(|word| self.word_lines[word])
    }

    pub fn current_line(&self) -> Option<&str> {
        self.current_line_index().map(|line| self.lines[line].as_str())
    }
}
